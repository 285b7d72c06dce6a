//! 스케줄러 상태 머신 단계.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 적응형 스케줄러 단계
///
/// Idle → Polling (시작), Polling → Recovering (캡처/해석 실패),
/// Recovering → Polling | Backoff, Backoff → Recovering, 임의 단계 → Stopped (명시적 중지만).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    Idle,
    Polling,
    Recovering,
    Backoff,
    Stopped,
}

impl SchedulerPhase {
    /// 허용된 전이인지 여부
    pub fn can_transition_to(self, next: SchedulerPhase) -> bool {
        use SchedulerPhase::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Idle, Polling) => true,
            (Polling, Recovering) => true,
            (Recovering, Polling) | (Recovering, Backoff) | (Recovering, Recovering) => true,
            (Backoff, Recovering) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Recovering => "recovering",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::SchedulerPhase::*;

    #[test]
    fn backoff_never_stops_by_itself() {
        assert!(Backoff.can_transition_to(Recovering));
        assert!(!Backoff.can_transition_to(Polling));
        assert!(Backoff.can_transition_to(Stopped));
    }

    #[test]
    fn stopped_is_terminal() {
        for next in [Idle, Polling, Recovering, Backoff, Stopped] {
            assert!(!Stopped.can_transition_to(next));
        }
    }

    #[test]
    fn polling_only_leaves_via_recovery_or_stop() {
        assert!(Polling.can_transition_to(Recovering));
        assert!(!Polling.can_transition_to(Backoff));
        assert!(Idle.can_transition_to(Polling));
    }
}
