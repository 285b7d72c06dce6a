//! AUTOAPPROVE 도메인 모델.
//!
//! 프레임, 대상 식별자, 매칭 후보, 클릭 기록, 스케줄러 단계, 세션 이벤트.

pub mod candidate;
pub mod click;
pub mod event;
pub mod frame;
pub mod scheduler;
pub mod target;
