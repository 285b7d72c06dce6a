//! 입력 드라이버 포트.
//!
//! 합성 마우스 입력을 위한 크로스 플랫폼 인터페이스를 정의한다.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::target::WindowRef;

/// 입력 드라이버: 마우스 시뮬레이션 인터페이스
///
/// 구현체: `EnigoInputDriver` (실제 입력), `NoOpInputDriver` (드라이런/테스트용)
#[async_trait]
pub trait InputDriver: Send + Sync {
    /// 마우스 클릭 (입력 좌표계). 커서를 (x, y)로 옮긴 뒤 누른다.
    async fn mouse_click(&self, button: &str, x: i32, y: i32) -> Result<(), CoreError>;

    /// 창 메시지 기반 클릭. 지원하지 않는 드라이버는 직접 클릭으로 대체한다.
    async fn post_click(&self, _window: WindowRef, x: i32, y: i32) -> Result<(), CoreError> {
        self.mouse_click("left", x, y).await
    }

    /// 플랫폼 이름 (예: "macos", "windows", "linux")
    fn platform(&self) -> &str;
}
