//! 자동 승인 세션.
//!
//! `start`가 세션 컨텍스트(프레임 소스, 리졸버, 상관 풀, 디스패처, 스케줄러 상태)를
//! 만들고 폴링 루프를 tokio 태스크로 띄운다. 루프는 틱, 상관 연산 완료, 취소를
//! 하나의 `select!`에서 직렬로 처리하므로 스케줄러 상태는 한 곳에서만 바뀐다.
//!
//! 상태 머신: Idle → Polling → (실패) Recovering → (성공) Polling | (한도 초과) Backoff
//! → Recovering … 중지는 `SessionHandle::stop`으로만 일어난다.

use std::sync::Arc;
use std::time::Duration;

use autoapprove_automation::dispatcher::ClickDispatcher;
use autoapprove_core::config::AppConfig;
use autoapprove_core::error::CoreError;
use autoapprove_core::models::click::ClickOutcome;
use autoapprove_core::models::event::{ErrorKind, HitEvent, SessionEvent};
use autoapprove_core::models::frame::{CaptureBackendKind, CaptureTarget, Frame};
use autoapprove_core::models::scheduler::SchedulerPhase;
use autoapprove_core::models::target::TargetIdentity;
use autoapprove_core::ports::capture::CaptureBackend;
use autoapprove_core::ports::input_driver::InputDriver;
use autoapprove_core::ports::window::{TargetVerifier, WindowEnumerator};
use autoapprove_monitor::resolver::WindowResolver;
use autoapprove_vision::frame_cache::FrameCache;
use autoapprove_vision::frame_source::FrameSource;
use autoapprove_vision::matcher::CorrelationEngine;
use autoapprove_vision::template::load_templates;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domains::{CorrelationJob, CorrelationPool, CorrelationResult};
use crate::event_bus::EventBus;
use crate::scheduler::SchedulerState;

// ============================================================
// 공개 타입
// ============================================================

/// 세션 외부 의존성 (포트 구현체)
pub struct SessionDeps {
    pub capture: Arc<dyn CaptureBackend>,
    pub windows: Arc<dyn WindowEnumerator>,
    pub input: Arc<dyn InputDriver>,
    /// 웜 재시작용 마지막 대상
    pub last_known: Option<TargetIdentity>,
    /// 이벤트 버스. `start` 전에 구독해 두면 첫 이벤트부터 받는다.
    pub events: EventBus,
}

/// 세션 상태 스냅샷 (watch 채널로 게시)
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub phase: SchedulerPhase,
    pub interval_ms: u64,
    pub consecutive_misses: u32,
    pub consecutive_failures: u32,
    pub capture_open: bool,
    pub correlation_in_flight: bool,
    pub target: Option<TargetIdentity>,
    pub polls: u64,
    pub clicks: u64,
}

/// 종료된 세션 요약
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: Uuid,
    /// 다음 세션에 넘길 마지막 대상
    pub last_target: Option<TargetIdentity>,
    pub polls: u64,
    pub clicks: u64,
}

/// 실행 중인 세션 핸들
pub struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    events: EventBus,
    status: watch::Receiver<SessionStatus>,
    task: Option<JoinHandle<SessionSummary>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// 현재 상태 스냅샷
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// 상태 변경 감시용 수신기
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.status.borrow().phase
    }

    /// 중지 요청. 즉시 반환하며 진행 중인 상관 연산은 협조적으로 취소된다.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!(session = %self.id, "세션 중지 요청");
            self.cancel.cancel();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// 세션 태스크 종료 대기. 중지 요청은 하지 않는다.
    pub async fn join(mut self) -> Result<SessionSummary, CoreError> {
        let task = self
            .task
            .take()
            .ok_or_else(|| CoreError::Internal("세션 태스크가 이미 회수됨".to_string()))?;
        task.await
            .map_err(|e| CoreError::Internal(format!("세션 태스크 실패: {e}")))
    }

    /// 중지 후 종료 대기
    pub async fn shutdown(self) -> Result<SessionSummary, CoreError> {
        self.stop();
        self.join().await
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================
// start
// ============================================================

/// 세션 시작
///
/// 설정 검증과 템플릿 로드는 여기서 동기적으로 끝난다. 읽을 수 없는 템플릿은
/// 치명적이며 `InvalidTemplate`으로 반환된다. 그 외 실패는 모두 루프 안에서 복구된다.
pub async fn start(config: AppConfig, deps: SessionDeps) -> Result<SessionHandle, CoreError> {
    config.validate()?;

    let paths = config.matching.template_paths.clone();
    let grayscale = config.matching.grayscale;
    let templates = tokio::task::spawn_blocking(move || load_templates(&paths, grayscale))
        .await
        .map_err(|e| CoreError::Internal(format!("템플릿 로드 작업 실패: {e}")))??;
    let engine = Arc::new(CorrelationEngine::new(&templates, &config.matching)?);
    let pool = CorrelationPool::new(engine, config.matching.worker_threads)?;

    let id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let cache = Arc::new(FrameCache::new(config.capture.frame_buffer_capacity));
    let source = FrameSource::new(deps.capture, Arc::clone(&cache));
    let resolver = Arc::new(WindowResolver::new(
        deps.windows,
        config.target.clone(),
        &config.recovery,
    ));
    let verifier: Arc<dyn TargetVerifier> = resolver.clone();
    let dispatcher = ClickDispatcher::new(config.click.clone(), deps.input, Some(verifier));
    let state = SchedulerState::new(&config.scheduler, &config.recovery);

    let (status_tx, status_rx) = watch::channel(SessionStatus {
        phase: SchedulerPhase::Idle,
        interval_ms: state.interval().as_millis() as u64,
        consecutive_misses: 0,
        consecutive_failures: 0,
        capture_open: false,
        correlation_in_flight: false,
        target: None,
        polls: 0,
        clicks: 0,
    });

    info!(
        session = %id,
        backend = ?config.capture.backend,
        templates = templates.len(),
        interval_ms = config.scheduler.interval_ms,
        "세션 시작"
    );

    let ctx = SessionContext {
        id,
        config,
        state,
        source,
        cache,
        resolver,
        dispatcher,
        pool,
        events: deps.events.clone(),
        status_tx,
        cancel: cancel.clone(),
        target: None,
        last_known: deps.last_known,
        in_flight: None,
        next_job_id: 0,
        last_tick: Instant::now(),
        polls: 0,
        clicks: 0,
    };
    let task = tokio::spawn(ctx.run());

    Ok(SessionHandle {
        id,
        cancel,
        events: deps.events,
        status: status_rx,
        task: Some(task),
    })
}

/// 세션 중지 요청. 블로킹하지 않으며 종료 대기는 `SessionHandle::join`으로 한다.
pub fn stop(handle: &SessionHandle) {
    handle.stop();
}

// ============================================================
// 세션 컨텍스트
// ============================================================

struct InFlight {
    job: CorrelationJob,
    deadline: Instant,
}

enum Completion {
    Done(CorrelationResult),
    TimedOut,
}

struct SessionContext {
    id: Uuid,
    config: AppConfig,
    state: SchedulerState,
    source: FrameSource,
    cache: Arc<FrameCache>,
    resolver: Arc<WindowResolver>,
    dispatcher: ClickDispatcher,
    pool: CorrelationPool,
    events: EventBus,
    status_tx: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
    /// 현재 검증된 대상 (창 캡처일 때)
    target: Option<TargetIdentity>,
    last_known: Option<TargetIdentity>,
    in_flight: Option<InFlight>,
    next_job_id: u64,
    last_tick: Instant,
    polls: u64,
    clicks: u64,
}

impl SessionContext {
    async fn run(mut self) -> SessionSummary {
        self.set_phase(SchedulerPhase::Polling);
        let mut next_tick = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                (id, completion) = next_completion(&mut self.in_flight) => {
                    self.on_completion(id, completion).await;
                    if self.state.phase() == SchedulerPhase::Polling {
                        next_tick = self.last_tick + self.state.interval();
                    }
                }
                _ = tokio::time::sleep_until(next_tick) => {
                    self.last_tick = Instant::now();
                    let delay = self.on_tick().await;
                    next_tick = Instant::now() + delay;
                }
            }
            self.publish_status();
        }

        self.finish()
    }

    async fn on_tick(&mut self) -> Duration {
        match self.state.phase() {
            SchedulerPhase::Polling => self.poll_once().await,
            SchedulerPhase::Recovering => self.recover_once().await,
            SchedulerPhase::Backoff => {
                self.state.on_backoff_elapsed();
                self.set_phase(SchedulerPhase::Recovering);
                Duration::ZERO
            }
            SchedulerPhase::Idle | SchedulerPhase::Stopped => self.state.interval(),
        }
    }

    // ============================================================
    // Polling
    // ============================================================

    async fn poll_once(&mut self) -> Duration {
        self.polls += 1;

        if !self.source.is_open() {
            if let Err(e) = self.establish().await {
                return self.enter_recovering(e);
            }
        }

        if let Some(target) = self.target.clone() {
            match self.resolver.validate(&target).await {
                Ok(true) => {}
                Ok(false) => {
                    return self.enter_recovering(CoreError::TargetNotFound(format!(
                        "대상 유실: {target}"
                    )))
                }
                Err(e) => return self.enter_recovering(e),
            }
        }

        let timeout = self.config.capture_timeout();
        let frame = match self.source.next_frame(timeout).await {
            Ok(frame) => frame,
            Err(e @ CoreError::CaptureTimeout { .. }) => {
                warn!("프레임 획득 타임아웃: {e}");
                self.emit_error(&e);
                return self.state.interval();
            }
            Err(e) => return self.enter_recovering(e),
        };

        if self.in_flight.is_none() {
            self.submit(frame);
        } else {
            debug!(sequence = frame.sequence, "상관 연산 진행 중, 프레임만 캐시");
        }
        self.state.interval()
    }

    fn submit(&mut self, frame: Arc<Frame>) {
        self.next_job_id += 1;
        let job = self.pool.submit(self.next_job_id, frame, &self.cancel);
        debug!(job = job.id, sequence = job.frame.sequence, "상관 연산 제출");
        self.in_flight = Some(InFlight {
            job,
            deadline: Instant::now() + self.config.correlation_timeout(),
        });
    }

    async fn on_completion(&mut self, id: u64, completion: Completion) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        if in_flight.job.id != id {
            self.in_flight = Some(in_flight);
            return;
        }
        let job = in_flight.job;

        if self.state.phase() != SchedulerPhase::Polling {
            debug!(job = id, "폴링 중이 아님, 결과 폐기");
            return;
        }

        let candidates = match completion {
            Completion::TimedOut => {
                job.cancel.cancel();
                let timeout = CoreError::CorrelationTimeout {
                    timeout_ms: self.config.matching.correlation_timeout_ms,
                };
                debug!("{timeout}: 미스로 처리");
                self.record_miss(true);
                return;
            }
            Completion::Done(Err(e)) => {
                warn!("상관 연산 실패: {e}");
                self.emit_error(&e);
                self.record_miss(false);
                return;
            }
            Completion::Done(Ok(candidates)) => candidates,
        };

        if self.cache.has_newer_than(&job.frame) {
            let interval = self.state.on_stale();
            debug!(
                sequence = job.frame.sequence,
                interval_ms = interval.as_millis() as u64,
                "오래된 결과 폐기"
            );
            if let Some(latest) = self.cache.latest() {
                self.submit(latest);
            }
            return;
        }

        let Some(best) = candidates.into_iter().next() else {
            self.record_miss(false);
            return;
        };

        let detections = self.state.on_hit();
        debug!(score = best.score, detections, "후보 검출");

        let (outcome, input_point) = if detections >= self.config.click.min_detections.max(1) {
            let report = self
                .dispatcher
                .dispatch(&best, &job.frame, self.target.as_ref())
                .await;
            if report.outcome.is_clicked() {
                self.clicks += 1;
                self.state.on_dispatched();
            }
            if let ClickOutcome::Failed(message) = &report.outcome {
                self.events.publish(SessionEvent::Error {
                    kind: ErrorKind::Dispatch,
                    message: message.clone(),
                });
            }
            (Some(report.outcome), Some(report.point))
        } else {
            (None, None)
        };

        let frame = self
            .config
            .debug
            .save_snapshots
            .then(|| Arc::clone(&job.frame));
        self.events.publish(SessionEvent::Hit(HitEvent {
            candidate: best,
            outcome,
            input_point,
            frame,
        }));
    }

    fn record_miss(&mut self, timed_out: bool) {
        let interval = self.state.on_miss();
        self.events.publish(SessionEvent::Miss {
            next_interval_ms: interval.as_millis() as u64,
            timed_out,
        });
    }

    // ============================================================
    // Recovering / Backoff
    // ============================================================

    /// 대상 해석 + 캡처 세션 열기
    async fn establish(&mut self) -> Result<(), CoreError> {
        let roi = self.config.capture.roi;
        let timeout = self.config.capture_timeout();
        let capture_target = match self.config.capture.backend {
            CaptureBackendKind::WindowRegion => {
                let identity = self.resolver.resolve(self.last_known.as_ref()).await?;
                self.last_known = Some(identity.clone());
                self.target = Some(identity.clone());
                CaptureTarget::Window(identity)
            }
            CaptureBackendKind::MonitorRegion => {
                CaptureTarget::Monitor(self.config.capture.monitor_index)
            }
        };
        self.source.open(capture_target, roi, timeout).await?;
        Ok(())
    }

    fn enter_recovering(&mut self, err: CoreError) -> Duration {
        if err.is_recoverable() {
            warn!("폴링 실패, 복구 시작: {err}");
        } else {
            error!("예상치 못한 폴링 실패, 복구 시도: {err}");
        }
        self.emit_error(&err);
        self.abandon_in_flight();
        self.source.close();
        self.target = None;
        self.set_phase(SchedulerPhase::Recovering);
        self.after_failure()
    }

    async fn recover_once(&mut self) -> Duration {
        match self.establish().await {
            Ok(()) => {
                let attempts = self.state.on_recovered();
                info!(attempts, "복구 성공");
                self.set_phase(SchedulerPhase::Polling);
                self.events.publish(SessionEvent::Recovered {
                    target: self.target.clone(),
                    attempts,
                });
                Duration::ZERO
            }
            Err(e) => {
                debug!(
                    attempt = self.state.consecutive_failures() + 1,
                    "복구 시도 실패: {e}"
                );
                self.emit_error(&e);
                self.source.close();
                self.target = None;
                self.after_failure()
            }
        }
    }

    /// 실패 기록 후 다음 대기 시간. 한도에 도달하면 Backoff 진입.
    fn after_failure(&mut self) -> Duration {
        if self.state.on_failure() {
            let delay = self.state.backoff_delay();
            warn!(
                attempts = self.state.consecutive_failures(),
                backoff_ms = delay.as_millis() as u64,
                "복구 한도 도달, 백오프"
            );
            self.set_phase(SchedulerPhase::Backoff);
            delay
        } else {
            self.state.recovery_wait()
        }
    }

    fn abandon_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!(job = in_flight.job.id, "진행 중인 상관 연산 포기");
            in_flight.job.cancel.cancel();
        }
    }

    // ============================================================
    // 공통
    // ============================================================

    fn set_phase(&mut self, next: SchedulerPhase) {
        match self.state.transition(next) {
            Ok(from) if from != next => {
                self.events
                    .publish(SessionEvent::PhaseChanged { from, to: next });
            }
            Ok(_) => {}
            Err(e) => error!("{e}"),
        }
    }

    fn emit_error(&self, err: &CoreError) {
        self.events.publish(SessionEvent::Error {
            kind: error_kind(err),
            message: err.to_string(),
        });
    }

    fn publish_status(&self) {
        let status = SessionStatus {
            phase: self.state.phase(),
            interval_ms: self.state.interval().as_millis() as u64,
            consecutive_misses: self.state.consecutive_misses(),
            consecutive_failures: self.state.consecutive_failures(),
            capture_open: self.source.is_open(),
            correlation_in_flight: self.in_flight.is_some(),
            target: self.target.clone(),
            polls: self.polls,
            clicks: self.clicks,
        };
        self.status_tx.send_replace(status);
    }

    fn finish(mut self) -> SessionSummary {
        self.abandon_in_flight();
        self.source.close();
        self.cache.clear();
        self.set_phase(SchedulerPhase::Stopped);
        self.publish_status();
        info!(
            session = %self.id,
            polls = self.polls,
            clicks = self.clicks,
            "세션 종료"
        );
        SessionSummary {
            id: self.id,
            last_target: self.last_known.take(),
            polls: self.polls,
            clicks: self.clicks,
        }
    }
}

/// 진행 중인 상관 연산의 완료 또는 타임아웃. 작업이 없으면 영원히 대기.
async fn next_completion(in_flight: &mut Option<InFlight>) -> (u64, Completion) {
    match in_flight {
        Some(f) => {
            let id = f.job.id;
            tokio::select! {
                result = &mut f.job.result => {
                    let result = result.unwrap_or_else(|_| {
                        Err(CoreError::CorrelationFailed("워커가 결과 없이 종료됨".to_string()))
                    });
                    (id, Completion::Done(result))
                }
                _ = tokio::time::sleep_until(f.deadline) => (id, Completion::TimedOut),
            }
        }
        None => std::future::pending().await,
    }
}

fn error_kind(err: &CoreError) -> ErrorKind {
    match err {
        CoreError::TargetNotFound(_) => ErrorKind::Target,
        CoreError::CorrelationTimeout { .. } | CoreError::CorrelationFailed(_) => {
            ErrorKind::Correlation
        }
        CoreError::DispatchFailed(_) => ErrorKind::Dispatch,
        _ => ErrorKind::Capture,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(
            error_kind(&CoreError::TargetNotFound("x".into())),
            ErrorKind::Target
        );
        assert_eq!(
            error_kind(&CoreError::SessionLost("x".into())),
            ErrorKind::Capture
        );
        assert_eq!(
            error_kind(&CoreError::CorrelationFailed("x".into())),
            ErrorKind::Correlation
        );
        assert_eq!(
            error_kind(&CoreError::DispatchFailed("x".into())),
            ErrorKind::Dispatch
        );
    }
}
