//! 적응형 스케줄러 상태.
//!
//! 폴링 간격, 연속 미스/실패/검출 수, 백오프 라운드를 보관하는 단일 권위 상태.
//! 세션 루프만 이 상태를 변경한다. 간격은 항상 [min, max] 안에 있다.

use std::time::Duration;

use autoapprove_core::config::{RecoveryConfig, SchedulerConfig};
use autoapprove_core::error::CoreError;
use autoapprove_core::models::scheduler::SchedulerPhase;
use tokio::time::Instant;
use tracing::{debug, info};

/// 스케줄러 상태
#[derive(Debug, Clone)]
pub struct SchedulerState {
    phase: SchedulerPhase,
    interval: Duration,
    base: Duration,
    min: Duration,
    max: Duration,
    growth: f64,
    consecutive_misses: u32,
    consecutive_failures: u32,
    consecutive_detections: u32,
    max_failures: u32,
    recovery_cooldown: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
    backoff_round: u32,
    cooldown_until: Option<Instant>,
}

impl SchedulerState {
    pub fn new(scheduler: &SchedulerConfig, recovery: &RecoveryConfig) -> Self {
        let min = Duration::from_millis(scheduler.min_interval_ms);
        let max = Duration::from_millis(scheduler.max_interval_ms.max(scheduler.min_interval_ms));
        let base = Duration::from_millis(scheduler.interval_ms).clamp(min, max);
        Self {
            phase: SchedulerPhase::Idle,
            interval: base,
            base,
            min,
            max,
            growth: scheduler.miss_growth_factor,
            consecutive_misses: 0,
            consecutive_failures: 0,
            consecutive_detections: 0,
            max_failures: recovery.max_recovery_attempts.max(1),
            recovery_cooldown: Duration::from_millis(recovery.recovery_cooldown_ms),
            backoff_base: Duration::from_millis(recovery.backoff_ms),
            backoff_max: Duration::from_millis(recovery.backoff_max_ms.max(recovery.backoff_ms)),
            backoff_round: 0,
            cooldown_until: None,
        }
    }

    // ============================================================
    // 단계 전이
    // ============================================================

    /// 단계 전이. 허용되지 않은 전이는 `Internal` 에러.
    pub fn transition(&mut self, next: SchedulerPhase) -> Result<SchedulerPhase, CoreError> {
        let from = self.phase;
        if !from.can_transition_to(next) {
            return Err(CoreError::Internal(format!(
                "허용되지 않은 스케줄러 전이: {from} → {next}"
            )));
        }
        self.phase = next;
        if from != next {
            info!("스케줄러 전이: {from} → {next}");
        }
        Ok(from)
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    // ============================================================
    // 폴링 피드백
    // ============================================================

    /// 임계값 이상 후보 검출: 간격을 기본값으로 되돌리고 연속 검출 수를 돌려준다
    pub fn on_hit(&mut self) -> u32 {
        self.consecutive_misses = 0;
        self.consecutive_detections = self.consecutive_detections.saturating_add(1);
        self.interval = self.base;
        self.consecutive_detections
    }

    /// 검출 없음 (타임아웃 포함): 간격을 기하급수로 늘린다
    pub fn on_miss(&mut self) -> Duration {
        self.consecutive_misses = self.consecutive_misses.saturating_add(1);
        self.consecutive_detections = 0;
        self.grow();
        self.interval
    }

    /// 오래된 결과 폐기: 검출 수는 유지하고 간격만 늘린다
    pub fn on_stale(&mut self) -> Duration {
        self.grow();
        self.interval
    }

    /// 클릭 전달 후 연속 검출 수 초기화
    pub fn on_dispatched(&mut self) {
        self.consecutive_detections = 0;
    }

    fn grow(&mut self) {
        let next = self.interval.as_secs_f64() * self.growth;
        let next = if next.is_finite() {
            Duration::from_secs_f64(next.min(self.max.as_secs_f64()))
        } else {
            self.max
        };
        self.interval = next.clamp(self.min, self.max);
        debug!(
            interval_ms = self.interval.as_millis() as u64,
            misses = self.consecutive_misses,
            "폴링 간격 증가"
        );
    }

    // ============================================================
    // 복구 / 백오프
    // ============================================================

    /// 캡처/해석 실패 기록. 최대 시도 수에 도달하면 `true` (Backoff 진입)
    pub fn on_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.cooldown_until = Some(Instant::now() + self.recovery_cooldown);
        self.consecutive_failures >= self.max_failures
    }

    /// 복구 성공: 실패 수, 백오프 라운드 초기화. 이번 라운드 시도 수를 돌려준다
    pub fn on_recovered(&mut self) -> u32 {
        let attempts = self.consecutive_failures;
        self.consecutive_failures = 0;
        self.backoff_round = 0;
        self.cooldown_until = None;
        self.consecutive_misses = 0;
        self.interval = self.base;
        attempts
    }

    /// Backoff 대기 시간. 라운드마다 두 배로 늘어 상한에서 멈춘다
    pub fn backoff_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.backoff_round.min(16));
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }

    /// Backoff 대기 종료: 새 복구 라운드 시작
    pub fn on_backoff_elapsed(&mut self) {
        self.backoff_round = self.backoff_round.saturating_add(1);
        self.consecutive_failures = 0;
        self.cooldown_until = None;
    }

    /// 다음 복구 시도까지 남은 시간
    pub fn recovery_wait(&self) -> Duration {
        self.cooldown_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    // ============================================================
    // 조회
    // ============================================================

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn consecutive_detections(&self) -> u32 {
        self.consecutive_detections
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }
}
