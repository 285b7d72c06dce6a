//! # autoapprove-monitor
//!
//! 창 열거 어댑터와 대상 창 해석기.
//! xcap 창 목록과 sysinfo 프로세스 정보로 창 스냅샷을 만들고,
//! 전략 체인으로 자동화 대상 창을 해석/재검증한다.

pub mod enumerator;
pub mod resolver;

#[cfg(target_os = "windows")]
pub mod windows;
