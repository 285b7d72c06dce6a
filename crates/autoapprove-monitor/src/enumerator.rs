//! 시스템 창 열거.
//!
//! `WindowEnumerator` 포트 구현. xcap으로 최상위 창을, sysinfo로 프로세스
//! 이름/경로/시작 시각을 조회한다. Windows에서는 클래스 이름도 채운다.

use async_trait::async_trait;
use autoapprove_core::error::CoreError;
use autoapprove_core::models::frame::ScreenRect;
use autoapprove_core::models::target::{WindowRef, WindowSnapshot};
use autoapprove_core::ports::window::WindowEnumerator;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;
use xcap::Window;

/// 시스템 창 열거기
pub struct SystemWindowEnumerator {
    sys: Arc<Mutex<System>>,
}

impl SystemWindowEnumerator {
    /// 새 열거기 생성
    pub fn new() -> Self {
        Self {
            sys: Arc::new(Mutex::new(System::new())),
        }
    }

    fn enumerate(sys: &Mutex<System>) -> Result<Vec<WindowSnapshot>, CoreError> {
        let windows = Window::all()
            .map_err(|e| CoreError::Internal(format!("창 목록 조회 실패: {e}")))?;

        let pids: Vec<Pid> = windows
            .iter()
            .filter_map(|w| w.pid().ok())
            .map(Pid::from_u32)
            .collect();

        let mut sys = sys.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&pids), true);

        #[cfg(target_os = "windows")]
        let foreground = crate::windows::foreground_window();

        let snapshots: Vec<WindowSnapshot> = windows
            .iter()
            .filter_map(|w| {
                let id = w.id().ok()?;
                let pid = w.pid().ok()?;
                let width = w.width().unwrap_or(0);
                let height = w.height().unwrap_or(0);
                if width == 0 || height == 0 {
                    return None;
                }

                let process = sys.process(Pid::from_u32(pid));
                let process_name = process
                    .map(|p| p.name().to_string_lossy().to_string())
                    .or_else(|| w.app_name().ok())
                    .unwrap_or_default();
                let process_path = process
                    .and_then(|p| p.exe())
                    .map(|path| path.to_string_lossy().to_string());
                let process_started_at = process.map(|p| p.start_time()).unwrap_or(0);

                #[cfg(target_os = "windows")]
                let (class_name, is_foreground) = (
                    crate::windows::class_name(id as u64),
                    foreground == Some(id as u64) || w.is_focused().unwrap_or(false),
                );
                #[cfg(not(target_os = "windows"))]
                let (class_name, is_foreground) = (None, w.is_focused().unwrap_or(false));

                Some(WindowSnapshot {
                    window_ref: WindowRef(id as u64),
                    pid,
                    process_name,
                    process_path,
                    title: w.title().unwrap_or_default(),
                    class_name,
                    bounds: ScreenRect::new(
                        w.x().unwrap_or(0),
                        w.y().unwrap_or(0),
                        width,
                        height,
                    ),
                    z_order: w.z().unwrap_or(0),
                    is_foreground,
                    is_minimized: w.is_minimized().unwrap_or(false),
                    process_started_at,
                    scale_factor: w
                        .current_monitor()
                        .and_then(|m| m.scale_factor())
                        .unwrap_or(1.0),
                })
            })
            .collect();

        debug!("창 {}개 열거", snapshots.len());
        Ok(snapshots)
    }
}

impl Default for SystemWindowEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowEnumerator for SystemWindowEnumerator {
    async fn list_windows(&self) -> Result<Vec<WindowSnapshot>, CoreError> {
        let sys = Arc::clone(&self.sys);
        tokio::task::spawn_blocking(move || Self::enumerate(&sys))
            .await
            .map_err(|e| CoreError::Internal(format!("창 열거 작업 실패: {e}")))?
    }
}
