//! 클릭 이벤트 기록 모델.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// 클릭 전달 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ClickOutcome {
    /// 입력 전달 완료 (큐 방식은 큐 적재 완료)
    Clicked,
    /// 같은 위치 쿨다운 중이라 억제
    SuppressedCooldown,
    /// 클릭 직전 대상 재검증 실패로 억제
    SuppressedStale,
    /// 전달 실패
    Failed(String),
}

impl ClickOutcome {
    pub fn is_clicked(&self) -> bool {
        matches!(self, Self::Clicked)
    }
}

/// 클릭 이력 한 건. 결과와 무관하게 항상 기록된다.
#[derive(Debug, Clone)]
pub struct ClickRecord {
    /// 단조 시계 기준 시각 (쿨다운 판정)
    pub at: Instant,
    pub timestamp: DateTime<Utc>,
    /// 입력 좌표계 위치
    pub location: (i32, i32),
    pub outcome: ClickOutcome,
}
