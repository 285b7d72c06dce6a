//! # autoapprove-app
//!
//! 세션 오케스트레이션 라이브러리.
//! 실행 도메인(tokio 태스크 + rayon 상관 풀), 적응형 스케줄러 상태 머신,
//! 세션 `start`/`stop`, 이벤트 버스, 라이프사이클, 웜 재시작 저장소를 제공한다.
//! 바이너리 `autoapprove`(main.rs)가 어댑터를 와이어링한다.

pub mod domains;
pub mod event_bus;
pub mod lifecycle;
pub mod scheduler;
pub mod session;
pub mod target_store;

pub use session::{start, stop, SessionDeps, SessionHandle, SessionStatus, SessionSummary};
