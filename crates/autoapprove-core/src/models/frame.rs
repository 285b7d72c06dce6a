//! 프레임 및 캡처 세션 모델.
//!
//! 프레임은 생성 후 변경되지 않으며 `Arc<Frame>`으로 실행 도메인 사이를 이동한다.

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use super::target::TargetIdentity;

/// 캡처 백엔드 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureBackendKind {
    /// 대상 창 영역 캡처
    #[default]
    #[serde(rename = "window")]
    WindowRegion,
    /// 모니터 영역 캡처
    #[serde(rename = "monitor")]
    MonitorRegion,
}

/// 캡처 표면 좌표계의 사각형 (관심 영역)
///
/// `w` 또는 `h`가 0이면 표면 전체를 의미한다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// 표면 전체를 의미하는지 여부
    pub fn is_full(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// 표면 크기에 맞춰 잘라낸 실제 영역. 표면 밖이면 `None`.
    pub fn clamp_to(&self, surface_w: u32, surface_h: u32) -> Option<Rect> {
        if self.is_full() {
            return Some(Rect::new(0, 0, surface_w, surface_h));
        }
        if self.x >= surface_w || self.y >= surface_h {
            return None;
        }
        let w = self.w.min(surface_w - self.x);
        let h = self.h.min(surface_h - self.y);
        Some(Rect::new(self.x, self.y, w, h))
    }
}

/// 화면(가상 데스크톱) 좌표계의 사각형. 다중 모니터에서 음수 좌표가 가능하다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x
            && py >= self.y
            && (px as i64) < self.x as i64 + self.width as i64
            && (py as i64) < self.y as i64 + self.height as i64
    }
}

/// 캡처 대상
#[derive(Debug, Clone)]
pub enum CaptureTarget {
    /// 해석된 대상 창
    Window(TargetIdentity),
    /// 모니터 인덱스 (0부터)
    Monitor(usize),
}

/// 캡처 세션: 대상 하나당 하나만 활성. 실패 시 패치하지 않고 통째로 재생성한다.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    /// 세션 ID
    pub id: Uuid,
    /// 백엔드 종류
    pub backend: CaptureBackendKind,
    /// 창 캡처일 때의 대상
    pub target: Option<TargetIdentity>,
    /// 모니터 캡처일 때의 인덱스
    pub monitor_index: Option<usize>,
    /// 세션 생성 시점의 캡처 표면 화면 좌표
    pub surface: ScreenRect,
    /// 관심 영역 (표면 좌표계)
    pub roi: Rect,
    /// 표면 좌표 → 입력 좌표 DPI 배율
    pub dpi_scale: f64,
    /// 세션 생성 시각
    pub opened_at: DateTime<Utc>,
}

/// 백엔드가 반환하는 원시 캡처 결과 (표면 전체)
#[derive(Debug, Clone)]
pub struct RawCapture {
    /// 표면 전체 픽셀
    pub image: RgbaImage,
    /// 캡처 시점의 표면 화면 좌표
    pub surface: ScreenRect,
    /// 캡처 시점의 DPI 배율
    pub dpi_scale: f64,
}

/// 불변 프레임
#[derive(Debug)]
pub struct Frame {
    /// 세션 내 단조 증가 번호
    pub sequence: u64,
    /// 생성한 캡처 세션 ID
    pub session_id: Uuid,
    /// 단조 시계 기준 캡처 시각 (신선도 비교용)
    pub captured_at: Instant,
    /// 벽시계 캡처 시각 (이벤트/스냅샷용)
    pub timestamp: DateTime<Utc>,
    /// 관심 영역으로 잘라낸 픽셀
    pub image: RgbaImage,
    /// 캡처 표면의 화면 좌표
    pub surface: ScreenRect,
    /// 표면 좌표계에서 관심 영역의 원점
    pub roi_origin: (u32, u32),
    /// DPI 배율
    pub dpi_scale: f64,
    /// 캡처 대상 창 (창 캡처일 때)
    pub target: Option<TargetIdentity>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// `other`보다 나중에 캡처된 프레임인지 여부
    pub fn is_newer_than(&self, other: &Frame) -> bool {
        self.captured_at > other.captured_at
            || (self.captured_at == other.captured_at && self.sequence > other.sequence)
    }
}

/// 모니터 정보 (목록 조회용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub index: usize,
    pub name: String,
    pub bounds: ScreenRect,
    pub scale_factor: f32,
    pub is_primary: bool,
}
