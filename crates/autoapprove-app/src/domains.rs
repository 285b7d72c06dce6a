//! 실행 도메인.
//!
//! 캡처/검증/클릭 같은 가벼운 단계는 tokio 태스크에서, 상관 연산은
//! 전용 rayon 워커 풀에서 실행한다. 프레임은 `Arc<Frame>`으로 넘어가며
//! 결과는 oneshot 채널로 돌아온다.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use autoapprove_core::error::CoreError;
use autoapprove_core::models::candidate::MatchCandidate;
use autoapprove_core::models::frame::Frame;
use autoapprove_vision::matcher::CorrelationEngine;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// 상관 연산 결과
pub type CorrelationResult = Result<Vec<MatchCandidate>, CoreError>;

/// 상관 연산 작업 하나
pub struct CorrelationJob {
    /// 세션 내 작업 번호 (늦게 도착한 결과 식별)
    pub id: u64,
    pub frame: Arc<Frame>,
    /// 작업별 취소 토큰 (세션 토큰의 자식)
    pub cancel: CancellationToken,
    pub result: oneshot::Receiver<CorrelationResult>,
}

/// 상관 연산 전용 워커 풀
pub struct CorrelationPool {
    pool: rayon::ThreadPool,
    engine: Arc<CorrelationEngine>,
}

impl CorrelationPool {
    /// `worker_threads`가 0이면 rayon 기본값 (논리 코어 수)
    pub fn new(engine: Arc<CorrelationEngine>, worker_threads: usize) -> Result<Self, CoreError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("autoapprove-correlate-{i}"))
            .build()
            .map_err(|e| CoreError::Internal(format!("상관 워커 풀 생성 실패: {e}")))?;
        debug!("상관 워커 풀: 스레드 {}개", pool.current_num_threads());
        Ok(Self { pool, engine })
    }

    /// 프레임을 워커 풀에 넘기고 즉시 반환
    ///
    /// 작업 안의 패닉은 `CorrelationFailed`로 바뀌어 채널로 전달된다.
    pub fn submit(&self, id: u64, frame: Arc<Frame>, parent: &CancellationToken) -> CorrelationJob {
        let (tx, rx) = oneshot::channel();
        let cancel = parent.child_token();

        let engine = Arc::clone(&self.engine);
        let job_frame = Arc::clone(&frame);
        let job_cancel = cancel.clone();
        self.pool.spawn(move || {
            let is_cancelled = || job_cancel.is_cancelled();
            let result = catch_unwind(AssertUnwindSafe(|| engine.find(&job_frame, &is_cancelled)))
                .unwrap_or_else(|_| {
                    error!(job = id, "상관 연산 패닉");
                    Err(CoreError::CorrelationFailed("상관 연산 패닉".to_string()))
                });
            // 수신자가 이미 포기했으면 결과는 버려진다
            let _ = tx.send(result);
        });

        CorrelationJob {
            id,
            frame,
            cancel,
            result: rx,
        }
    }
}
