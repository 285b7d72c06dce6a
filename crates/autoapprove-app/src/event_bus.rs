//! 세션 이벤트 버스.
//!
//! `tokio::broadcast` 기반. 세션 루프가 `SessionEvent`를 발행하고
//! 로그/알림/스냅샷 저장 같은 협력자가 구독한다.

use autoapprove_core::models::event::SessionEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// 세션 이벤트 버스
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// 새 이벤트 버스 생성
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 이벤트 발행. 구독자가 없으면 버려진다.
    pub fn publish(&self, event: SessionEvent) {
        debug!("이벤트 발행: {}", event_name(&event));
        let _ = self.tx.send(event);
    }

    /// 구독자 생성
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(128)
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Hit(_) => "hit",
        SessionEvent::Miss { .. } => "miss",
        SessionEvent::Recovered { .. } => "recovered",
        SessionEvent::Error { .. } => "error",
        SessionEvent::PhaseChanged { .. } => "phase_changed",
    }
}
