//! 프레임 소스.
//!
//! 캡처 세션 하나를 열고 유지하며 프레임을 생산한다. 블로킹 백엔드 호출은
//! `spawn_blocking`으로 격리하고 타임아웃을 건다. 세션 유실(창 닫힘, 크기/DPI 변경)
//! 시 세션을 무효화하며, 호출자가 다시 `open`해야 한다.

use autoapprove_core::error::CoreError;
use autoapprove_core::models::frame::{CaptureSession, CaptureTarget, Frame, RawCapture, Rect};
use autoapprove_core::ports::capture::CaptureBackend;
use chrono::Utc;
use image::imageops;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::frame_cache::FrameCache;

/// DPI 배율 변경 판정 허용 오차
const DPI_EPSILON: f64 = 1e-3;

/// 캡처 세션 소유자 + 프레임 생산자
pub struct FrameSource {
    backend: Arc<dyn CaptureBackend>,
    cache: Arc<FrameCache>,
    session: Option<CaptureSession>,
    sequence: u64,
}

impl FrameSource {
    pub fn new(backend: Arc<dyn CaptureBackend>, cache: Arc<FrameCache>) -> Self {
        Self {
            backend,
            cache,
            session: None,
            sequence: 0,
        }
    }

    /// 대상에 새 캡처 세션을 연다. 기존 세션은 폐기된다.
    pub async fn open(
        &mut self,
        target: CaptureTarget,
        roi: Rect,
        timeout: Duration,
    ) -> Result<&CaptureSession, CoreError> {
        self.close();

        let backend = Arc::clone(&self.backend);
        let task = tokio::task::spawn_blocking(move || backend.open(&target, roi));
        let session = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(CoreError::CaptureUnavailable(format!(
                    "캡처 세션 작업 실패: {e}"
                )))
            }
            Err(_) => {
                return Err(CoreError::CaptureTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        info!(
            session = %session.id,
            "캡처 세션 시작: {:?} {}x{}",
            session.backend, session.surface.width, session.surface.height
        );
        Ok(self.session.insert(session))
    }

    /// 다음 프레임 획득 후 캐시에 게시
    pub async fn next_frame(&mut self, timeout: Duration) -> Result<Arc<Frame>, CoreError> {
        let session = self
            .session
            .clone()
            .ok_or_else(|| CoreError::SessionLost("열린 캡처 세션 없음".to_string()))?;

        let backend = Arc::clone(&self.backend);
        let grab_session = session.clone();
        let task = tokio::task::spawn_blocking(move || backend.grab(&grab_session));
        let raw = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(raw))) => raw,
            Ok(Ok(Err(e))) => {
                if e.requires_reopen() {
                    self.invalidate(&e);
                }
                return Err(e);
            }
            Ok(Err(e)) => {
                let err = CoreError::SessionLost(format!("캡처 작업 실패: {e}"));
                self.invalidate(&err);
                return Err(err);
            }
            Err(_) => {
                return Err(CoreError::CaptureTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        if let Some(reason) = geometry_change(&session, &raw) {
            let err = CoreError::SessionLost(reason);
            self.invalidate(&err);
            return Err(err);
        }

        let frame = self.build_frame(&session, raw)?;
        let frame = Arc::new(frame);
        self.cache.publish(Arc::clone(&frame));
        debug!(
            sequence = frame.sequence,
            "프레임 획득: {}x{}",
            frame.width(),
            frame.height()
        );
        Ok(frame)
    }

    fn build_frame(&mut self, session: &CaptureSession, raw: RawCapture) -> Result<Frame, CoreError> {
        let (img_w, img_h) = raw.image.dimensions();
        let region = session.roi.clamp_to(img_w, img_h).ok_or_else(|| {
            CoreError::CaptureUnavailable(format!(
                "관심 영역이 캡처 밖: {:?} / {img_w}x{img_h}",
                session.roi
            ))
        })?;

        let image = if session.roi.is_full() {
            raw.image
        } else {
            imageops::crop_imm(&raw.image, region.x, region.y, region.w, region.h).to_image()
        };

        self.sequence += 1;
        Ok(Frame {
            sequence: self.sequence,
            session_id: session.id,
            captured_at: Instant::now(),
            timestamp: Utc::now(),
            image,
            surface: raw.surface,
            roi_origin: (region.x, region.y),
            dpi_scale: raw.dpi_scale,
            target: session.target.clone(),
        })
    }

    fn invalidate(&mut self, reason: &CoreError) {
        if let Some(session) = self.session.take() {
            warn!(session = %session.id, "캡처 세션 무효화: {reason}");
        }
        self.cache.clear();
    }

    /// 세션 해제
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(session = %session.id, "캡처 세션 해제");
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

}

/// 세션을 다시 만들어야 하는 표면 변화 (크기 또는 DPI)
fn geometry_change(session: &CaptureSession, raw: &RawCapture) -> Option<String> {
    let before = session.surface;
    let after = raw.surface;
    if before.width != after.width || before.height != after.height {
        return Some(format!(
            "캡처 표면 크기 변경: {}x{} → {}x{}",
            before.width, before.height, after.width, after.height
        ));
    }
    if (session.dpi_scale - raw.dpi_scale).abs() > DPI_EPSILON {
        return Some(format!(
            "DPI 배율 변경: {} → {}",
            session.dpi_scale, raw.dpi_scale
        ));
    }
    None
}
