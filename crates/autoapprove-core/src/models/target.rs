//! 대상 창 모델.
//!
//! OS 창 참조는 재활용될 수 있으므로 참조 + 판별 필드(pid, 프로세스 이름,
//! 프로세스 시작 시각, 클래스)로 구성된 태그형 식별자로 다룬다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::frame::ScreenRect;

/// 불투명 OS 창 참조 (HWND, CGWindowID, X11 window id 등)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowRef(pub u64);

impl fmt::Display for WindowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// 열거 시점의 창 상태
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub window_ref: WindowRef,
    pub pid: u32,
    /// 프로세스 이름 (예: "Code.exe")
    pub process_name: String,
    /// 실행 파일 경로
    pub process_path: Option<String>,
    pub title: String,
    /// 창 클래스 이름 (Windows 외 플랫폼은 `None`)
    pub class_name: Option<String>,
    /// 화면 좌표
    pub bounds: ScreenRect,
    /// z-순서 (클수록 위)
    pub z_order: i32,
    pub is_foreground: bool,
    pub is_minimized: bool,
    /// 프로세스 시작 시각 (유닉스 초)
    pub process_started_at: u64,
    /// 창이 위치한 모니터의 배율
    pub scale_factor: f32,
}

/// 대상 해석에 사용된 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStrategy {
    ProcessName,
    ProcessPath,
    TitleExact,
    TitleFuzzy,
    ClassName,
}

/// 해석된 대상 식별자. 사용 전마다 재검증해야 한다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetIdentity {
    pub window_ref: WindowRef,
    pub pid: u32,
    pub process_name: String,
    pub process_path: Option<String>,
    pub title: String,
    pub class_name: Option<String>,
    /// 프로세스 시작 시각 (유닉스 초): pid 재활용 판별
    pub process_started_at: u64,
    /// 해석에 성공한 전략
    pub matched_by: ResolveStrategy,
    /// 마지막 확인 시각
    pub last_seen: DateTime<Utc>,
}

impl TargetIdentity {
    /// 스냅샷으로부터 식별자 생성
    pub fn from_snapshot(snapshot: &WindowSnapshot, matched_by: ResolveStrategy) -> Self {
        Self {
            window_ref: snapshot.window_ref,
            pid: snapshot.pid,
            process_name: snapshot.process_name.clone(),
            process_path: snapshot.process_path.clone(),
            title: snapshot.title.clone(),
            class_name: snapshot.class_name.clone(),
            process_started_at: snapshot.process_started_at,
            matched_by,
            last_seen: Utc::now(),
        }
    }

    /// 스냅샷이 같은 창(같은 참조 + 판별 필드 일치)인지 여부.
    /// 제목은 런타임에 바뀌므로 비교하지 않는다.
    pub fn matches(&self, snapshot: &WindowSnapshot) -> bool {
        self.window_ref == snapshot.window_ref
            && self.pid == snapshot.pid
            && self.process_name == snapshot.process_name
            && self.process_started_at == snapshot.process_started_at
            && self.class_name == snapshot.class_name
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (pid {}, window {}) \"{}\"",
            self.process_name, self.pid, self.window_ref, self.title
        )
    }
}
