//! # autoapprove-automation
//!
//! 합성 입력 전달 크레이트.
//! 매칭 후보를 입력 좌표로 변환하고, 대상 재검증과 쿨다운을 거쳐
//! 직접/큐/창 메시지 방식으로 클릭을 전달한다.

pub mod dispatcher;
pub mod history;
pub mod input_driver;

#[cfg(target_os = "windows")]
pub mod windows;
