//! 캡처 백엔드 포트.
//!
//! 구현: `autoapprove-vision` crate (xcap). 호출은 블로킹이며
//! 프레임 소스가 `spawn_blocking` + 타임아웃으로 감싼다.

use crate::error::CoreError;
use crate::models::frame::{CaptureSession, CaptureTarget, MonitorInfo, RawCapture, Rect};

/// 화면 캡처 백엔드
pub trait CaptureBackend: Send + Sync {
    /// 대상에 세션 연결. 연결 불가 시 `CaptureUnavailable`.
    fn open(&self, target: &CaptureTarget, roi: Rect) -> Result<CaptureSession, CoreError>;

    /// 세션의 표면 전체를 한 번 캡처.
    /// 대상이 사라졌으면 `SessionLost`를 반환한다.
    fn grab(&self, session: &CaptureSession) -> Result<RawCapture, CoreError>;

    /// 연결된 모니터 목록
    fn list_monitors(&self) -> Result<Vec<MonitorInfo>, CoreError>;
}
