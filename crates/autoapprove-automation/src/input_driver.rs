//! 입력 드라이버 구현.
//!
//! `NoOpInputDriver` (드라이런/테스트용)와 `EnigoInputDriver` (실제 입력)를 제공한다.
//! 창 메시지 클릭은 Windows에서만 `PostMessageW`로 전달되고, 그 외에는 직접 클릭으로 대체된다.

use async_trait::async_trait;
use tracing::debug;

use autoapprove_core::error::CoreError;
use autoapprove_core::models::target::WindowRef;
use autoapprove_core::ports::input_driver::InputDriver;

// ============================================================
// NoOpInputDriver: 드라이런/디버깅용
// ============================================================

/// No-Op 입력 드라이버: 모든 입력을 로깅만 하고 실행하지 않음
///
/// `--dry-run`, 테스트, 로깅 전용 모드에서 사용.
pub struct NoOpInputDriver;

#[async_trait]
impl InputDriver for NoOpInputDriver {
    async fn mouse_click(&self, button: &str, x: i32, y: i32) -> Result<(), CoreError> {
        debug!(button, x, y, "[NoOp] 마우스 클릭");
        Ok(())
    }

    async fn post_click(&self, window: WindowRef, x: i32, y: i32) -> Result<(), CoreError> {
        debug!(%window, x, y, "[NoOp] 메시지 클릭");
        Ok(())
    }

    fn platform(&self) -> &str {
        "noop"
    }
}

// ============================================================
// EnigoInputDriver: 실제 마우스 입력
// ============================================================

/// 실제 마우스 입력 드라이버 (enigo 기반)
///
/// macOS: Accessibility 권한 필요
/// Windows: 대상이 관리자 권한이면 UIAccess 또는 관리자 권한 필요
/// Linux: X11 또는 Wayland + uinput 권한 필요
#[cfg(feature = "enigo")]
pub struct EnigoInputDriver {
    /// enigo 인스턴스 (Send지만 !Sync → tokio::sync::Mutex 사용)
    enigo: tokio::sync::Mutex<enigo::Enigo>,
}

#[cfg(feature = "enigo")]
impl EnigoInputDriver {
    /// 새 EnigoInputDriver 생성
    pub fn new() -> Result<Self, CoreError> {
        let settings = enigo::Settings::default();
        let enigo = enigo::Enigo::new(&settings)
            .map_err(|e| CoreError::Internal(format!("입력 드라이버 초기화 실패: {e}")))?;
        Ok(Self {
            enigo: tokio::sync::Mutex::new(enigo),
        })
    }
}

#[cfg(feature = "enigo")]
#[async_trait]
impl InputDriver for EnigoInputDriver {
    async fn mouse_click(&self, button: &str, x: i32, y: i32) -> Result<(), CoreError> {
        use enigo::Mouse;
        debug!(button, x, y, "[Enigo] 마우스 클릭");
        let mut enigo = self.enigo.lock().await;
        enigo
            .move_mouse(x, y, enigo::Coordinate::Abs)
            .map_err(|e| CoreError::DispatchFailed(format!("마우스 이동 실패: {e}")))?;
        let btn = match parse_mouse_button(button) {
            "right" => enigo::Button::Right,
            "middle" => enigo::Button::Middle,
            _ => enigo::Button::Left,
        };
        enigo
            .button(btn, enigo::Direction::Click)
            .map_err(|e| CoreError::DispatchFailed(format!("마우스 클릭 실패: {e}")))?;
        Ok(())
    }

    async fn post_click(&self, window: WindowRef, x: i32, y: i32) -> Result<(), CoreError> {
        #[cfg(target_os = "windows")]
        {
            debug!(%window, x, y, "[Enigo] 메시지 클릭");
            crate::windows::post_left_click(window, x, y)
        }
        #[cfg(not(target_os = "windows"))]
        {
            debug!(%window, "메시지 클릭 미지원 플랫폼, 직접 클릭으로 대체");
            self.mouse_click("left", x, y).await
        }
    }

    fn platform(&self) -> &str {
        #[cfg(target_os = "macos")]
        {
            "macos"
        }
        #[cfg(target_os = "windows")]
        {
            "windows"
        }
        #[cfg(target_os = "linux")]
        {
            "linux"
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        {
            "unknown"
        }
    }
}

// ============================================================
// 마우스 버튼 매핑 유틸
// ============================================================

/// 문자열 → 마우스 버튼 매핑
///
/// 인식 가능한 값: "left", "right", "middle"
pub fn parse_mouse_button(button: &str) -> &str {
    match button.to_lowercase().as_str() {
        "left" | "l" => "left",
        "right" | "r" => "right",
        "middle" | "m" => "middle",
        _ => "left", // 기본값
    }
}

/// 플랫폼별 입력 드라이버 생성 팩토리
///
/// `dry_run`이면 항상 NoOp 드라이버.
/// `enigo` feature 활성화 시 실제 입력 드라이버 반환, 초기화 실패 시 NoOp 폴백.
pub fn create_platform_input_driver(dry_run: bool) -> Box<dyn InputDriver> {
    if dry_run {
        tracing::info!("드라이런 모드: 입력을 전달하지 않음");
        return Box::new(NoOpInputDriver);
    }
    #[cfg(feature = "enigo")]
    {
        match EnigoInputDriver::new() {
            Ok(driver) => {
                tracing::info!("실제 입력 드라이버 (enigo) 초기화 완료");
                return Box::new(driver);
            }
            Err(e) => {
                tracing::warn!("enigo 초기화 실패, NoOp 폴백: {e}");
            }
        }
    }
    #[cfg(not(feature = "enigo"))]
    tracing::warn!("실제 입력 드라이버 없이 빌드됨, NoOp 사용");
    Box::new(NoOpInputDriver)
}

// ============================================================
// 테스트
// ============================================================
