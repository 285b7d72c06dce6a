//! 세션 이벤트 모델.
//!
//! 코어가 외부 협력자(로그, 알림, 스냅샷 저장 등)에게 내보내는 구조화 이벤트.

use std::sync::Arc;

use super::candidate::MatchCandidate;
use super::click::ClickOutcome;
use super::frame::Frame;
use super::scheduler::SchedulerPhase;
use super::target::TargetIdentity;

/// 세션 이벤트 스트림 항목
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// 임계값 이상 후보 검출 (클릭 결과 포함)
    Hit(HitEvent),
    /// 검출 없음 (상관 타임아웃 포함)
    Miss {
        /// 다음 폴링 간격 (밀리초)
        next_interval_ms: u64,
        /// 상관 타임아웃으로 인한 미스 여부
        timed_out: bool,
    },
    /// 복구 성공
    Recovered {
        target: Option<TargetIdentity>,
        attempts: u32,
    },
    /// 복구 가능한 에러 (폴링은 계속됨)
    Error { kind: ErrorKind, message: String },
    /// 상태 머신 전이
    PhaseChanged {
        from: SchedulerPhase,
        to: SchedulerPhase,
    },
}

/// 히트 이벤트 상세
#[derive(Debug, Clone)]
pub struct HitEvent {
    pub candidate: MatchCandidate,
    /// 클릭 결과. 최소 연속 검출 수 미달이면 `None`
    pub outcome: Option<ClickOutcome>,
    /// 입력 좌표계 클릭 위치
    pub input_point: Option<(i32, i32)>,
    /// 디버그 스냅샷 활성화 시 원본 프레임
    pub frame: Option<Arc<Frame>>,
}

/// 에러 이벤트 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Capture,
    Target,
    Correlation,
    Dispatch,
}
