//! 세션 폴링 흐름 통합 테스트.
//!
//! 목 캡처 백엔드 위에서 템플릿 로드 → 상관 연산 → 클릭 → 쿨다운,
//! 미스 시 간격 증가를 검증한다. 상관 연산이 rayon 풀에서 돌기 때문에 실제 시간을 쓴다.

mod common;

use std::time::Duration;

use autoapprove_app::event_bus::EventBus;
use autoapprove_app::start;
use autoapprove_core::error::CoreError;
use autoapprove_core::models::click::ClickOutcome;
use autoapprove_core::models::event::SessionEvent;
use autoapprove_core::models::frame::CaptureBackendKind;
use autoapprove_core::models::scheduler::SchedulerPhase;
use common::*;
use tempfile::TempDir;

#[tokio::test]
async fn unreadable_template_is_fatal_at_start() {
    let dir = TempDir::new().unwrap();
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"not an image").unwrap();

    let config = fast_config(broken, CaptureBackendKind::MonitorRegion);
    let capture = ScriptedCapture::new(scene(true));
    let result = start(
        config,
        deps(
            capture.clone(),
            ScriptedWindows::new(vec![]),
            RecordingDriver::new(),
            None,
            EventBus::default(),
        ),
    )
    .await;

    assert!(matches!(result, Err(CoreError::InvalidTemplate { .. })));
    assert_eq!(capture.opens(), 0);
}

#[tokio::test]
async fn missing_template_is_fatal_at_start() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path().join("nope.png"), CaptureBackendKind::MonitorRegion);
    let result = start(
        config,
        deps(
            ScriptedCapture::new(scene(true)),
            ScriptedWindows::new(vec![]),
            RecordingDriver::new(),
            None,
            EventBus::default(),
        ),
    )
    .await;
    assert!(matches!(result, Err(CoreError::InvalidTemplate { .. })));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(write_template(dir.path()), CaptureBackendKind::MonitorRegion);
    config.scheduler.min_interval_ms = 0;
    let result = start(
        config,
        deps(
            ScriptedCapture::new(scene(true)),
            ScriptedWindows::new(vec![]),
            RecordingDriver::new(),
            None,
            EventBus::default(),
        ),
    )
    .await;
    assert!(matches!(result, Err(CoreError::Validation { .. })));
}

#[tokio::test]
async fn hit_is_clicked_once_then_cooldown_suppresses() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(write_template(dir.path()), CaptureBackendKind::MonitorRegion);
    let driver = RecordingDriver::new();
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let handle = start(
        config,
        deps(
            ScriptedCapture::new(scene(true)),
            ScriptedWindows::new(vec![]),
            driver.clone(),
            None,
            events,
        ),
    )
    .await
    .unwrap();

    let first = next_hit(&mut rx).await;
    assert_eq!(first.outcome, Some(ClickOutcome::Clicked));
    assert_eq!(first.candidate.template_id, "approve.png");
    assert!(first.candidate.score > 0.99);
    assert!(first.frame.is_none());

    let (ex, ey) = expected_click_point();
    let (x, y) = first.input_point.unwrap();
    assert!((x - ex).abs() <= 1 && (y - ey).abs() <= 1, "({x}, {y})");

    let second = next_hit(&mut rx).await;
    assert_eq!(second.outcome, Some(ClickOutcome::SuppressedCooldown));

    let summary = tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.clicks, 1);
    assert!(summary.polls >= 2);
    assert_eq!(driver.clicks().len(), 1);
}

#[tokio::test]
async fn min_detections_delays_first_click() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(write_template(dir.path()), CaptureBackendKind::MonitorRegion);
    config.click.min_detections = 2;
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let handle = start(
        config,
        deps(
            ScriptedCapture::new(scene(true)),
            ScriptedWindows::new(vec![]),
            RecordingDriver::new(),
            None,
            events,
        ),
    )
    .await
    .unwrap();

    let first = next_hit(&mut rx).await;
    assert_eq!(first.outcome, None);
    let second = next_hit(&mut rx).await;
    assert_eq!(second.outcome, Some(ClickOutcome::Clicked));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn misses_grow_interval_until_hit() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(write_template(dir.path()), CaptureBackendKind::MonitorRegion);
    let capture = ScriptedCapture::new(scene(false));
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let handle = start(
        config,
        deps(
            capture.clone(),
            ScriptedWindows::new(vec![]),
            RecordingDriver::new(),
            None,
            events,
        ),
    )
    .await
    .unwrap();

    let mut intervals = Vec::new();
    for _ in 0..3 {
        let interval = wait_for_event(&mut rx, |event| match event {
            SessionEvent::Miss {
                next_interval_ms,
                timed_out,
            } => {
                assert!(!timed_out);
                Some(next_interval_ms)
            }
            _ => None,
        })
        .await;
        intervals.push(interval);
    }
    assert!(intervals[0] > 20);
    assert!(intervals.windows(2).all(|w| w[1] >= w[0]));
    assert!(intervals.iter().all(|i| *i <= 200));
    assert!(handle.status().consecutive_misses >= 1);

    capture.set_image(scene(true));
    let hit = next_hit(&mut rx).await;
    assert_eq!(hit.outcome, Some(ClickOutcome::Clicked));

    let mut status = handle.watch_status();
    tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|s| s.clicks == 1 && s.consecutive_misses == 0),
    )
    .await
    .unwrap()
    .unwrap();

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn superseded_results_are_never_clicked() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(write_template(dir.path()), CaptureBackendKind::MonitorRegion);
    // 상관 연산이 폴링 간격보다 길어 결과가 올 때마다 더 새 프레임이 캐시에 있다
    config.scheduler.interval_ms = 1;
    config.scheduler.min_interval_ms = 1;
    config.scheduler.max_interval_ms = 3;
    config.scheduler.miss_growth_factor = 3.0;
    let capture = ScriptedCapture::new(busy_scene(800, 600, true));
    let driver = RecordingDriver::new();
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let handle = start(
        config,
        deps(
            capture.clone(),
            ScriptedWindows::new(vec![]),
            driver.clone(),
            None,
            events,
        ),
    )
    .await
    .unwrap();

    // 버튼이 항상 보이므로 미스는 없다. 간격이 늘었다면 폐기된 결과 때문이다.
    let mut status = handle.watch_status();
    let current = tokio::time::timeout(
        Duration::from_secs(20),
        status.wait_for(|s| s.interval_ms == 3),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(current.phase, SchedulerPhase::Polling);
    assert_eq!(current.consecutive_misses, 0);
    assert_eq!(current.clicks, 0);
    assert!(capture.grabs() >= 2);

    while let Ok(event) = rx.try_recv() {
        assert!(
            !matches!(event, SessionEvent::Hit(_) | SessionEvent::Miss { .. }),
            "{event:?}"
        );
    }
    assert!(driver.clicks().is_empty());

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.clicks, 0);
}

#[tokio::test]
async fn correlation_timeout_counts_as_miss() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(write_template(dir.path()), CaptureBackendKind::MonitorRegion);
    config.matching.correlation_timeout_ms = 1;
    let capture = ScriptedCapture::new(busy_scene(800, 600, false));
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let handle = start(
        config,
        deps(
            capture,
            ScriptedWindows::new(vec![]),
            RecordingDriver::new(),
            None,
            events,
        ),
    )
    .await
    .unwrap();

    let next_interval_ms = wait_for_event(&mut rx, |event| match event {
        SessionEvent::Error { kind, message } => panic!("에러로 처리됨: {kind:?} {message}"),
        SessionEvent::Miss {
            next_interval_ms,
            timed_out,
        } => {
            assert!(timed_out);
            Some(next_interval_ms)
        }
        _ => None,
    })
    .await;
    assert!(next_interval_ms > 20);

    let mut status = handle.watch_status();
    let current = tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|s| s.consecutive_misses >= 1),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(current.phase, SchedulerPhase::Polling);
    assert_eq!(current.consecutive_failures, 0);
    assert!(current.capture_open);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn stop_reaches_stopped_and_releases_capture() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(write_template(dir.path()), CaptureBackendKind::MonitorRegion);
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let handle = start(
        config,
        deps(
            ScriptedCapture::new(scene(false)),
            ScriptedWindows::new(vec![]),
            RecordingDriver::new(),
            None,
            events,
        ),
    )
    .await
    .unwrap();

    let mut status = handle.watch_status();
    status.wait_for(|s| s.capture_open).await.unwrap();

    autoapprove_app::stop(&handle);
    handle.stop();
    tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .unwrap()
        .unwrap();

    wait_for_event(&mut rx, |event| match event {
        SessionEvent::PhaseChanged { to, .. } if to == SchedulerPhase::Stopped => Some(()),
        _ => None,
    })
    .await;

    let last = status.borrow().clone();
    assert_eq!(last.phase, SchedulerPhase::Stopped);
    assert!(!last.capture_open);
    assert!(!last.correlation_in_flight);
}

#[tokio::test]
async fn snapshot_frame_attached_when_enabled() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(write_template(dir.path()), CaptureBackendKind::MonitorRegion);
    config.debug.save_snapshots = true;
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let handle = start(
        config,
        deps(
            ScriptedCapture::new(scene(true)),
            ScriptedWindows::new(vec![]),
            RecordingDriver::new(),
            None,
            events,
        ),
    )
    .await
    .unwrap();

    let hit = next_hit(&mut rx).await;
    let frame = hit.frame.expect("스냅샷 프레임");
    assert_eq!(frame.width(), SURFACE.width);
    assert_eq!(frame.height(), SURFACE.height);

    handle.shutdown().await.unwrap();
}
