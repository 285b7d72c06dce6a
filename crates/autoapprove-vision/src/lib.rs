//! # autoapprove-vision
//!
//! 화면 캡처와 템플릿 상관 연산 크레이트.
//! 캡처 세션/프레임 소스, 프레임 캐시, 템플릿 로드, 다중 스케일 상관 엔진,
//! 디버그 스냅샷 저장을 담당한다.

pub mod capture;
pub mod frame_cache;
pub mod frame_source;
pub mod matcher;
pub mod snapshot;
pub mod template;
