//! 스크린 캡처 백엔드.
//!
//! xcap 기반 창 영역 / 모니터 영역 캡처. 호출은 블로킹이다.

use autoapprove_core::error::CoreError;
use autoapprove_core::models::frame::{
    CaptureBackendKind, CaptureSession, CaptureTarget, MonitorInfo, RawCapture, Rect, ScreenRect,
};
use autoapprove_core::models::target::TargetIdentity;
use autoapprove_core::ports::capture::CaptureBackend;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;
use xcap::{Monitor, Window};

/// 캡처 좌표 → 입력 좌표 DPI 배율.
///
/// macOS는 캡처가 물리 픽셀, 입력이 논리 좌표이므로 모니터 배율을 쓴다.
/// 다른 플랫폼은 프로세스 DPI 인식이 시작 전에 외부에서 설정되므로 1.0이다.
fn dpi_scale_for(scale_factor: f32) -> f64 {
    if cfg!(target_os = "macos") && scale_factor.is_finite() && scale_factor > 0.0 {
        scale_factor as f64
    } else {
        1.0
    }
}

/// xcap 기반 캡처 백엔드
pub struct XcapCaptureBackend;

impl XcapCaptureBackend {
    /// 새 캡처 백엔드 생성
    pub fn new() -> Self {
        Self
    }

    fn find_window(identity: &TargetIdentity) -> Result<Option<Window>, CoreError> {
        let windows = Window::all()
            .map_err(|e| CoreError::CaptureUnavailable(format!("창 목록 조회 실패: {e}")))?;

        Ok(windows.into_iter().find(|w| {
            w.id().map(|id| id as u64 == identity.window_ref.0).unwrap_or(false)
                && w.pid().map(|pid| pid == identity.pid).unwrap_or(false)
        }))
    }

    fn find_monitor(index: usize) -> Result<Monitor, CoreError> {
        let monitors = Monitor::all()
            .map_err(|e| CoreError::CaptureUnavailable(format!("모니터 목록 조회 실패: {e}")))?;

        monitors
            .into_iter()
            .nth(index)
            .ok_or_else(|| CoreError::CaptureUnavailable(format!("모니터 인덱스 {index} 없음")))
    }

    fn window_geometry(window: &Window) -> Result<(ScreenRect, f64), String> {
        let rect = ScreenRect::new(
            window.x().map_err(|e| e.to_string())?,
            window.y().map_err(|e| e.to_string())?,
            window.width().map_err(|e| e.to_string())?,
            window.height().map_err(|e| e.to_string())?,
        );
        let scale = window
            .current_monitor()
            .and_then(|m| m.scale_factor())
            .unwrap_or(1.0);
        Ok((rect, dpi_scale_for(scale)))
    }

    fn monitor_geometry(monitor: &Monitor) -> Result<(ScreenRect, f64), String> {
        let rect = ScreenRect::new(
            monitor.x().map_err(|e| e.to_string())?,
            monitor.y().map_err(|e| e.to_string())?,
            monitor.width().map_err(|e| e.to_string())?,
            monitor.height().map_err(|e| e.to_string())?,
        );
        let scale = monitor.scale_factor().unwrap_or(1.0);
        Ok((rect, dpi_scale_for(scale)))
    }
}

impl Default for XcapCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for XcapCaptureBackend {
    fn open(&self, target: &CaptureTarget, roi: Rect) -> Result<CaptureSession, CoreError> {
        let (backend, identity, monitor_index, surface, dpi_scale) = match target {
            CaptureTarget::Window(identity) => {
                let window = Self::find_window(identity)?.ok_or_else(|| {
                    CoreError::CaptureUnavailable(format!("대상 창 없음: {identity}"))
                })?;
                if window.is_minimized().unwrap_or(false) {
                    return Err(CoreError::CaptureUnavailable(format!(
                        "대상 창 최소화됨: {identity}"
                    )));
                }
                let (surface, dpi) = Self::window_geometry(&window)
                    .map_err(|e| CoreError::CaptureUnavailable(format!("창 좌표 조회 실패: {e}")))?;
                (
                    CaptureBackendKind::WindowRegion,
                    Some(identity.clone()),
                    None,
                    surface,
                    dpi,
                )
            }
            CaptureTarget::Monitor(index) => {
                let monitor = Self::find_monitor(*index)?;
                let (surface, dpi) = Self::monitor_geometry(&monitor).map_err(|e| {
                    CoreError::CaptureUnavailable(format!("모니터 좌표 조회 실패: {e}"))
                })?;
                (CaptureBackendKind::MonitorRegion, None, Some(*index), surface, dpi)
            }
        };

        if surface.width == 0 || surface.height == 0 {
            return Err(CoreError::CaptureUnavailable("캡처 표면 크기 0".to_string()));
        }
        if roi.clamp_to(surface.width, surface.height).is_none() {
            return Err(CoreError::CaptureUnavailable(format!(
                "관심 영역이 표면 밖: {roi:?} / {}x{}",
                surface.width, surface.height
            )));
        }

        debug!(
            "캡처 세션 열림: {:?} {}x{} @ ({}, {}) dpi={}",
            backend, surface.width, surface.height, surface.x, surface.y, dpi_scale
        );

        Ok(CaptureSession {
            id: Uuid::new_v4(),
            backend,
            target: identity,
            monitor_index,
            surface,
            roi,
            dpi_scale,
            opened_at: Utc::now(),
        })
    }

    fn grab(&self, session: &CaptureSession) -> Result<RawCapture, CoreError> {
        match session.backend {
            CaptureBackendKind::WindowRegion => {
                let identity = session
                    .target
                    .as_ref()
                    .ok_or_else(|| CoreError::Internal("창 세션에 대상 없음".to_string()))?;
                let window = Self::find_window(identity)?
                    .ok_or_else(|| CoreError::SessionLost(format!("대상 창 사라짐: {identity}")))?;
                if window.is_minimized().unwrap_or(false) {
                    return Err(CoreError::SessionLost(format!("대상 창 최소화됨: {identity}")));
                }
                let (surface, dpi_scale) = Self::window_geometry(&window)
                    .map_err(|e| CoreError::SessionLost(format!("창 좌표 조회 실패: {e}")))?;
                let image = window
                    .capture_image()
                    .map_err(|e| CoreError::SessionLost(format!("창 캡처 실패: {e}")))?;
                Ok(RawCapture {
                    image,
                    surface,
                    dpi_scale,
                })
            }
            CaptureBackendKind::MonitorRegion => {
                let index = session.monitor_index.unwrap_or(0);
                let monitor = Self::find_monitor(index)
                    .map_err(|e| CoreError::SessionLost(e.to_string()))?;
                let (surface, dpi_scale) = Self::monitor_geometry(&monitor)
                    .map_err(|e| CoreError::SessionLost(format!("모니터 좌표 조회 실패: {e}")))?;
                let image = monitor
                    .capture_image()
                    .map_err(|e| CoreError::SessionLost(format!("스크린 캡처 실패: {e}")))?;
                Ok(RawCapture {
                    image,
                    surface,
                    dpi_scale,
                })
            }
        }
    }

    fn list_monitors(&self) -> Result<Vec<MonitorInfo>, CoreError> {
        let monitors = Monitor::all()
            .map_err(|e| CoreError::CaptureUnavailable(format!("모니터 목록 조회 실패: {e}")))?;

        Ok(monitors
            .iter()
            .enumerate()
            .map(|(index, m)| MonitorInfo {
                index,
                name: m.name().unwrap_or_default(),
                bounds: ScreenRect::new(
                    m.x().unwrap_or(0),
                    m.y().unwrap_or(0),
                    m.width().unwrap_or(0),
                    m.height().unwrap_or(0),
                ),
                scale_factor: m.scale_factor().unwrap_or(1.0),
                is_primary: m.is_primary().unwrap_or(false),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_scale_ignores_invalid_factor() {
        assert_eq!(dpi_scale_for(0.0), 1.0);
        assert_eq!(dpi_scale_for(f32::NAN), 1.0);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn dpi_scale_is_identity_off_macos() {
        assert_eq!(dpi_scale_for(1.5), 1.0);
    }
}
