//! 클릭 디스패처.
//!
//! 후보 위치를 캡처 좌표에서 입력 좌표로 변환하고, 대상 재검증과 쿨다운을
//! 거쳐 설정된 전달 방식으로 합성 클릭을 보낸다. 결과는 항상 이력에 남긴다.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use autoapprove_core::config::{ClickConfig, ClickMethod, CoordinateMode};
use autoapprove_core::error::CoreError;
use autoapprove_core::models::candidate::MatchCandidate;
use autoapprove_core::models::click::{ClickOutcome, ClickRecord};
use autoapprove_core::models::frame::Frame;
use autoapprove_core::models::target::TargetIdentity;
use autoapprove_core::ports::input_driver::InputDriver;
use autoapprove_core::ports::window::TargetVerifier;

use crate::history::ClickHistory;

/// 큐 전달 대기열 크기
const QUEUE_CAPACITY: usize = 16;

/// 한 번의 디스패치 결과
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub outcome: ClickOutcome,
    /// 변환된 입력 좌표
    pub point: (i32, i32),
}

struct QueuedClick {
    point: (i32, i32),
}

// ============================================================
// 좌표 변환
// ============================================================

/// 캡처 좌표계의 후보 → 입력 좌표계
///
/// 캡처 픽셀 = ROI 원점 + 후보 중심 + 클릭 오프셋.
/// `Auto`는 표면 원점 + 픽셀 / DPI, `Manual`은 여기에 보정 오프셋을 더하고,
/// `Disabled`는 DPI 보정 없이 표면 원점만 더한다.
pub fn to_input_point(candidate: &MatchCandidate, frame: &Frame, config: &ClickConfig) -> (i32, i32) {
    let (cx, cy) = candidate.center();
    let px = frame.roi_origin.0 as f64 + cx + config.click_offset.0 as f64;
    let py = frame.roi_origin.1 as f64 + cy + config.click_offset.1 as f64;

    let scale = if frame.dpi_scale > 0.0 && frame.dpi_scale.is_finite() {
        frame.dpi_scale
    } else {
        1.0
    };

    let (x, y) = match config.coordinate_mode {
        CoordinateMode::Disabled => (frame.surface.x as f64 + px, frame.surface.y as f64 + py),
        CoordinateMode::Auto => (
            frame.surface.x as f64 + px / scale,
            frame.surface.y as f64 + py / scale,
        ),
        CoordinateMode::Manual => (
            frame.surface.x as f64 + px / scale + config.coordinate_offset.0 as f64,
            frame.surface.y as f64 + py / scale + config.coordinate_offset.1 as f64,
        ),
    };
    (x.round() as i32, y.round() as i32)
}

// ============================================================
// ClickDispatcher
// ============================================================

/// 클릭 디스패처
pub struct ClickDispatcher {
    config: ClickConfig,
    cooldown: Duration,
    driver: Arc<dyn InputDriver>,
    verifier: Option<Arc<dyn TargetVerifier>>,
    history: Mutex<ClickHistory>,
    queue: Option<mpsc::Sender<QueuedClick>>,
}

impl ClickDispatcher {
    /// 새 디스패처 생성
    ///
    /// `Queued` 방식이면 전달 워커 태스크를 띄우므로 tokio 런타임 안에서 호출해야 한다.
    /// 워커는 디스패처가 drop되면 종료된다.
    pub fn new(
        config: ClickConfig,
        driver: Arc<dyn InputDriver>,
        verifier: Option<Arc<dyn TargetVerifier>>,
    ) -> Self {
        let queue = if config.method == ClickMethod::Queued {
            let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
            tokio::spawn(run_queue(rx, Arc::clone(&driver)));
            Some(tx)
        } else {
            None
        };

        info!(
            method = ?config.method,
            mode = ?config.coordinate_mode,
            cooldown_ms = config.cooldown_ms,
            driver = driver.platform(),
            "클릭 디스패처 생성"
        );

        Self {
            cooldown: Duration::from_millis(config.cooldown_ms),
            history: Mutex::new(ClickHistory::new(config.history_capacity)),
            config,
            driver,
            verifier,
            queue,
        }
    }

    /// 후보 하나를 클릭으로 전달
    ///
    /// 변환 → (선택) 대상 재검증 → 쿨다운 확인 → 전달 → 기록.
    pub async fn dispatch(
        &self,
        candidate: &MatchCandidate,
        frame: &Frame,
        identity: Option<&TargetIdentity>,
    ) -> DispatchReport {
        let point = to_input_point(candidate, frame, &self.config);
        let outcome = self.deliver_checked(point, identity).await;

        match &outcome {
            ClickOutcome::Clicked => info!(
                x = point.0,
                y = point.1,
                score = candidate.score,
                template = %candidate.template_id,
                "클릭 전달"
            ),
            ClickOutcome::SuppressedCooldown => {
                debug!(x = point.0, y = point.1, "쿨다운 중, 클릭 억제")
            }
            ClickOutcome::SuppressedStale => {
                warn!(x = point.0, y = point.1, "대상 재검증 실패, 클릭 억제")
            }
            ClickOutcome::Failed(e) => warn!(x = point.0, y = point.1, "클릭 전달 실패: {e}"),
        }

        self.history
            .lock()
            .record(Instant::now(), point, outcome.clone());
        DispatchReport { outcome, point }
    }

    async fn deliver_checked(
        &self,
        point: (i32, i32),
        identity: Option<&TargetIdentity>,
    ) -> ClickOutcome {
        if self.config.verify_window_before_click {
            if let (Some(verifier), Some(identity)) = (&self.verifier, identity) {
                if !verifier.verify(identity).await {
                    return ClickOutcome::SuppressedStale;
                }
            }
        }

        let cooling = self.history.lock().is_cooling_down(
            point,
            self.config.dedup_radius_px,
            self.cooldown,
            Instant::now(),
        );
        if cooling {
            return ClickOutcome::SuppressedCooldown;
        }

        let window = identity.map(|t| t.window_ref);
        match self.config.method {
            ClickMethod::Direct => outcome_of(self.driver.mouse_click("left", point.0, point.1).await),
            ClickMethod::Message => match window {
                Some(window) => outcome_of(self.driver.post_click(window, point.0, point.1).await),
                None => {
                    debug!("대상 창 없음, 메시지 클릭 대신 직접 클릭");
                    outcome_of(self.driver.mouse_click("left", point.0, point.1).await)
                }
            },
            ClickMethod::Queued => match &self.queue {
                Some(tx) => match tx.try_send(QueuedClick { point }) {
                    Ok(()) => ClickOutcome::Clicked,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        ClickOutcome::Failed("클릭 대기열 가득 참".to_string())
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        ClickOutcome::Failed("클릭 대기열 닫힘".to_string())
                    }
                },
                None => ClickOutcome::Failed("클릭 대기열 없음".to_string()),
            },
        }
    }

    /// 가장 최근 클릭 기록
    pub fn last_record(&self) -> Option<ClickRecord> {
        self.history.lock().last().cloned()
    }

    /// 이력 전체 복사본
    pub fn history(&self) -> Vec<ClickRecord> {
        self.history.lock().entries().cloned().collect()
    }

    pub fn config(&self) -> &ClickConfig {
        &self.config
    }
}

fn outcome_of(result: Result<(), CoreError>) -> ClickOutcome {
    match result {
        Ok(()) => ClickOutcome::Clicked,
        Err(e) => ClickOutcome::Failed(e.to_string()),
    }
}

async fn run_queue(mut rx: mpsc::Receiver<QueuedClick>, driver: Arc<dyn InputDriver>) {
    while let Some(QueuedClick { point: (x, y) }) = rx.recv().await {
        if let Err(e) = driver.mouse_click("left", x, y).await {
            warn!(x, y, "큐 클릭 전달 실패: {e}");
        }
    }
    debug!("클릭 큐 워커 종료");
}

// ============================================================
// 테스트
// ============================================================
