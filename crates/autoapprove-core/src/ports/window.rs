//! 창 열거/대상 검증 포트.
//!
//! 구현: `autoapprove-monitor` crate (xcap 창 목록 + sysinfo 프로세스 정보)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::target::{TargetIdentity, WindowSnapshot};

/// 최상위 창 열거
#[async_trait]
pub trait WindowEnumerator: Send + Sync {
    /// 현재 보이는 최상위 창 목록 (프로세스 정보 포함)
    async fn list_windows(&self) -> Result<Vec<WindowSnapshot>, CoreError>;
}

/// 클릭 직전 대상 재검증
#[async_trait]
pub trait TargetVerifier: Send + Sync {
    /// 대상이 아직 살아 있고 판별 필드가 일치하면 `true`
    async fn verify(&self, identity: &TargetIdentity) -> bool;
}
