//! 세션 통합 테스트 공용 목 포트와 헬퍼.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoapprove_app::event_bus::EventBus;
use autoapprove_app::SessionDeps;
use autoapprove_core::config::AppConfig;
use autoapprove_core::error::CoreError;
use autoapprove_core::models::event::{HitEvent, SessionEvent};
use autoapprove_core::models::frame::{
    CaptureBackendKind, CaptureSession, CaptureTarget, MonitorInfo, RawCapture, Rect, ScreenRect,
};
use autoapprove_core::models::target::{TargetIdentity, WindowRef, WindowSnapshot};
use autoapprove_core::ports::capture::CaptureBackend;
use autoapprove_core::ports::input_driver::InputDriver;
use autoapprove_core::ports::window::WindowEnumerator;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub const BUTTON_AT: (u32, u32) = (50, 40);
pub const BUTTON_SIZE: (u32, u32) = (24, 16);
pub const SURFACE: ScreenRect = ScreenRect {
    x: 100,
    y: 50,
    width: 200,
    height: 120,
};

// ============================================================
// 이미지
// ============================================================

/// 승인 버튼 역할의 무늬
pub fn button() -> RgbaImage {
    RgbaImage::from_fn(BUTTON_SIZE.0, BUTTON_SIZE.1, |x, y| {
        let v = ((x * 37 + y * 91) % 251) as u8;
        Rgba([v, v.wrapping_mul(3), 255 - v, 255])
    })
}

/// 회색 배경 화면. `with_button`이면 `BUTTON_AT`에 버튼을 그린다.
pub fn scene(with_button: bool) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(SURFACE.width, SURFACE.height, Rgba([128, 128, 128, 255]));
    if with_button {
        image::imageops::replace(&mut image, &button(), BUTTON_AT.0 as i64, BUTTON_AT.1 as i64);
    }
    image
}

/// 질감 있는 큰 화면. 평탄한 창이 없어 상관 연산이 모든 위치를 계산한다.
pub fn busy_scene(width: u32, height: u32, with_button: bool) -> RgbaImage {
    let mut state = 0x2545_f491u32;
    let mut image = RgbaImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgba([r, g, b, 255])
    });
    if with_button {
        image::imageops::replace(&mut image, &button(), BUTTON_AT.0 as i64, BUTTON_AT.1 as i64);
    }
    image
}

/// 템플릿 PNG 기록
pub fn write_template(dir: &Path) -> PathBuf {
    let path = dir.join("approve.png");
    button().save(&path).unwrap();
    path
}

/// 버튼 중심의 입력 좌표 (DPI 1.0)
pub fn expected_click_point() -> (i32, i32) {
    (
        SURFACE.x + (BUTTON_AT.0 + BUTTON_SIZE.0 / 2) as i32,
        SURFACE.y + (BUTTON_AT.1 + BUTTON_SIZE.1 / 2) as i32,
    )
}

// ============================================================
// 설정
// ============================================================

/// 짧은 간격의 테스트용 설정
pub fn fast_config(template: PathBuf, backend: CaptureBackendKind) -> AppConfig {
    let mut config = AppConfig::default_config();
    config.capture.backend = backend;
    config.capture.capture_timeout_ms = 2_000;
    config.matching.template_paths = vec![template];
    config.matching.correlation_timeout_ms = 5_000;
    config.matching.worker_threads = 2;
    config.scheduler.interval_ms = 20;
    config.scheduler.min_interval_ms = 10;
    config.scheduler.max_interval_ms = 200;
    config.click.cooldown_ms = 60_000;
    config.click.min_detections = 1;
    config.recovery.recovery_cooldown_ms = 10;
    config.recovery.backoff_ms = 50;
    config.recovery.backoff_max_ms = 100;
    config.recovery.resolver_max_cold_failures = 1_000;
    config.recovery.resolver_cooldown_ms = 10;
    if backend == CaptureBackendKind::WindowRegion {
        config.target.process_name = Some("Code.exe".to_string());
    }
    config
}

// ============================================================
// 목 캡처 백엔드
// ============================================================

/// 화면 이미지를 바꿔 가며 돌려주는 캡처 백엔드
pub struct ScriptedCapture {
    image: Mutex<RgbaImage>,
    fail_open: AtomicBool,
    fail_next_grabs: AtomicU32,
    opens: AtomicU32,
    grabs: AtomicU32,
}

impl ScriptedCapture {
    pub fn new(image: RgbaImage) -> Arc<Self> {
        Arc::new(Self {
            image: Mutex::new(image),
            fail_open: AtomicBool::new(false),
            fail_next_grabs: AtomicU32::new(0),
            opens: AtomicU32::new(0),
            grabs: AtomicU32::new(0),
        })
    }

    pub fn set_image(&self, image: RgbaImage) {
        *self.image.lock() = image;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// 다음 `n`번의 grab을 `SessionLost`로 실패시킨다
    pub fn fail_next_grabs(&self, n: u32) {
        self.fail_next_grabs.store(n, Ordering::SeqCst);
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn grabs(&self) -> u32 {
        self.grabs.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for ScriptedCapture {
    fn open(&self, target: &CaptureTarget, roi: Rect) -> Result<CaptureSession, CoreError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CoreError::CaptureUnavailable("모니터 없음".to_string()));
        }
        let (backend, target, monitor_index) = match target {
            CaptureTarget::Window(identity) => {
                (CaptureBackendKind::WindowRegion, Some(identity.clone()), None)
            }
            CaptureTarget::Monitor(index) => (CaptureBackendKind::MonitorRegion, None, Some(*index)),
        };
        Ok(CaptureSession {
            id: uuid::Uuid::new_v4(),
            backend,
            target,
            monitor_index,
            surface: SURFACE,
            roi,
            dpi_scale: 1.0,
            opened_at: chrono::Utc::now(),
        })
    }

    fn grab(&self, _session: &CaptureSession) -> Result<RawCapture, CoreError> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let pending = self.fail_next_grabs.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_grabs.store(pending - 1, Ordering::SeqCst);
            return Err(CoreError::SessionLost("창 닫힘".to_string()));
        }
        Ok(RawCapture {
            image: self.image.lock().clone(),
            surface: SURFACE,
            dpi_scale: 1.0,
        })
    }

    fn list_monitors(&self) -> Result<Vec<MonitorInfo>, CoreError> {
        Ok(vec![MonitorInfo {
            index: 0,
            name: "test".to_string(),
            bounds: SURFACE,
            scale_factor: 1.0,
            is_primary: true,
        }])
    }
}

// ============================================================
// 목 창 열거기
// ============================================================

/// 창 목록을 바꿀 수 있는 열거기
pub struct ScriptedWindows {
    windows: Mutex<Vec<WindowSnapshot>>,
}

impl ScriptedWindows {
    pub fn new(windows: Vec<WindowSnapshot>) -> Arc<Self> {
        Arc::new(Self {
            windows: Mutex::new(windows),
        })
    }

    pub fn set(&self, windows: Vec<WindowSnapshot>) {
        *self.windows.lock() = windows;
    }
}

#[async_trait]
impl WindowEnumerator for ScriptedWindows {
    async fn list_windows(&self) -> Result<Vec<WindowSnapshot>, CoreError> {
        Ok(self.windows.lock().clone())
    }
}

pub fn editor_window(id: u64, pid: u32) -> WindowSnapshot {
    WindowSnapshot {
        window_ref: WindowRef(id),
        pid,
        process_name: "Code.exe".to_string(),
        process_path: Some("C:\\Apps\\Code.exe".to_string()),
        title: format!("project {id} - Editor"),
        class_name: Some("Chrome_WidgetWin_1".to_string()),
        bounds: SURFACE,
        z_order: id as i32,
        is_foreground: false,
        is_minimized: false,
        process_started_at: 1_700_000_000 + pid as u64,
        scale_factor: 1.0,
    }
}

// ============================================================
// 기록용 입력 드라이버
// ============================================================

#[derive(Default)]
pub struct RecordingDriver {
    clicks: Mutex<Vec<(i32, i32)>>,
}

impl RecordingDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.clicks.lock().clone()
    }
}

#[async_trait]
impl InputDriver for RecordingDriver {
    async fn mouse_click(&self, _button: &str, x: i32, y: i32) -> Result<(), CoreError> {
        self.clicks.lock().push((x, y));
        Ok(())
    }

    async fn post_click(&self, _window: WindowRef, x: i32, y: i32) -> Result<(), CoreError> {
        self.clicks.lock().push((x, y));
        Ok(())
    }

    fn platform(&self) -> &str {
        "test"
    }
}

// ============================================================
// 조립 / 이벤트 대기
// ============================================================

pub fn deps(
    capture: Arc<ScriptedCapture>,
    windows: Arc<ScriptedWindows>,
    input: Arc<RecordingDriver>,
    last_known: Option<TargetIdentity>,
    events: EventBus,
) -> SessionDeps {
    SessionDeps {
        capture,
        windows,
        input,
        last_known,
        events,
    }
}

/// 조건을 만족하는 이벤트가 올 때까지 대기 (5초 제한)
pub async fn wait_for_event<T>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut pick: impl FnMut(SessionEvent) -> Option<T>,
) -> T {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(event) {
                        return found;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("이벤트 버스 닫힘"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("이벤트 대기 시간 초과")
}

pub async fn next_hit(rx: &mut broadcast::Receiver<SessionEvent>) -> HitEvent {
    wait_for_event(rx, |event| match event {
        SessionEvent::Hit(hit) => Some(hit),
        _ => None,
    })
    .await
}
