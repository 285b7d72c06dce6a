//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! 각 어댑터 crate가 이 trait들을 구현하며,
//! `autoapprove-app`에서 `Arc<dyn T>`로 와이어링한다.
//!
//! 캡처 백엔드는 전용 블로킹 스레드에서 호출되므로 동기 trait이고,
//! 나머지는 `async_trait`으로 object safety를 보장한다.

pub mod capture;
pub mod input_driver;
pub mod window;
