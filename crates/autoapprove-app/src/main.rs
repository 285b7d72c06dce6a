//! # autoapprove
//!
//! AUTOAPPROVE 바이너리 진입점.
//! 설정 로드, 어댑터 와이어링, 세션 라이프사이클, 이벤트 로깅/디버그 스냅샷 저장.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use autoapprove_app::event_bus::EventBus;
use autoapprove_app::lifecycle::LifecycleManager;
use autoapprove_app::target_store::TargetStore;
use autoapprove_app::{start, SessionDeps};
use autoapprove_automation::input_driver::create_platform_input_driver;
use autoapprove_core::config::AppConfig;
use autoapprove_core::config_manager::ConfigManager;
use autoapprove_core::models::event::SessionEvent;
use autoapprove_core::ports::capture::CaptureBackend;
use autoapprove_core::ports::input_driver::InputDriver;
use autoapprove_core::ports::window::WindowEnumerator;
use autoapprove_monitor::enumerator::SystemWindowEnumerator;
use autoapprove_monitor::resolver::resolve_from;
use autoapprove_vision::capture::XcapCaptureBackend;
use autoapprove_vision::snapshot::SnapshotWriter;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// AUTOAPPROVE 데스크톱 에이전트
///
/// 대상 창에서 반복되는 승인 버튼을 템플릿 매칭으로 찾아 클릭한다.
#[derive(Parser, Debug)]
#[command(name = "autoapprove")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리의 config.json)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 감시 세션 실행 (기본 명령)
    Run {
        /// 입력을 전달하지 않고 검출만 수행
        #[arg(long)]
        dry_run: bool,

        /// 마지막 대상 기억을 무시하고 새로 해석
        #[arg(long)]
        fresh: bool,
    },
    /// 보이는 최상위 창 목록과 현재 설정이 선택할 대상 출력
    ListWindows,
    /// 모니터 목록 출력 (capture.monitor_index 참고용)
    ListMonitors,
}

fn init_tracing(log_level: &str) {
    let log_filter = format!(
        "autoapprove={lvl},autoapprove_app={lvl},autoapprove_core={lvl},autoapprove_vision={lvl},autoapprove_monitor={lvl},autoapprove_automation={lvl}",
        lvl = log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let manager = match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    }
    .map_err(|e| anyhow!("설정 로드 실패: {e}"))?;
    info!("설정 파일: {}", manager.config_path().display());
    Ok(manager.snapshot())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = load_config(args.config)?;

    match args.command.unwrap_or(Command::Run {
        dry_run: false,
        fresh: false,
    }) {
        Command::Run { dry_run, fresh } => run(config, dry_run, fresh).await,
        Command::ListWindows => list_windows(&config).await,
        Command::ListMonitors => list_monitors(),
    }
}

// ============================================================
// run
// ============================================================

async fn run(config: AppConfig, dry_run: bool, fresh: bool) -> Result<()> {
    let store = TargetStore::default_location();
    let last_known = if fresh { None } else { store.load() };
    if let Some(target) = &last_known {
        info!("마지막 대상으로 웜 재시작: {target}");
    }

    let events = EventBus::new(256);
    let snapshots = config
        .debug
        .save_snapshots
        .then(|| Arc::new(SnapshotWriter::new(config.debug.snapshot_dir.clone())));
    let logger = tokio::spawn(log_events(events.subscribe(), snapshots));

    let input: Arc<dyn InputDriver> = Arc::from(create_platform_input_driver(dry_run));
    let deps = SessionDeps {
        capture: Arc::new(XcapCaptureBackend::new()),
        windows: Arc::new(SystemWindowEnumerator::new()),
        input,
        last_known,
        events,
    };

    let handle = match start(config, deps).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("세션 시작 실패: {e}");
            return Err(anyhow!("세션 시작 실패: {e}"));
        }
    };
    info!(session = %handle.id(), "감시 중 (Ctrl+C로 종료)");

    let lifecycle = LifecycleManager::new();
    lifecycle.wait_for_signal().await;

    let summary = handle
        .shutdown()
        .await
        .map_err(|e| anyhow!("세션 종료 실패: {e}"))?;
    info!(polls = summary.polls, clicks = summary.clicks, "세션 요약");

    if let Some(target) = &summary.last_target {
        if let Err(e) = store.save(target) {
            warn!("마지막 대상 저장 실패: {e}");
        }
    }

    // 마지막 송신자(세션 태스크, 핸들)가 사라졌으므로 로거는 남은 이벤트를 비우고 끝난다.
    match logger.await {
        Ok(logged) => debug!(logged, "이벤트 로거 종료"),
        Err(e) => warn!("이벤트 로거 실패: {e}"),
    }
    Ok(())
}

/// 세션 이벤트를 로그로 남기고, 켜져 있으면 히트 프레임을 스냅샷으로 저장
///
/// 모든 송신자가 drop될 때까지 돌며 처리한 이벤트 수를 반환한다.
async fn log_events(
    mut rx: broadcast::Receiver<SessionEvent>,
    snapshots: Option<Arc<SnapshotWriter>>,
) -> u64 {
    let mut logged = 0u64;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("이벤트 {n}개 누락");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        logged += 1;

        match event {
            SessionEvent::Hit(hit) => {
                info!(
                    score = hit.candidate.score,
                    template = %hit.candidate.template_id,
                    outcome = ?hit.outcome,
                    point = ?hit.input_point,
                    "히트"
                );
                if let (Some(writer), Some(frame)) = (&snapshots, hit.frame) {
                    let writer = Arc::clone(writer);
                    let candidate = hit.candidate;
                    let saved =
                        tokio::task::spawn_blocking(move || writer.save(&frame, &candidate)).await;
                    match saved {
                        Ok(Ok(path)) => debug!("스냅샷: {}", path.display()),
                        Ok(Err(e)) => warn!("스냅샷 저장 실패: {e}"),
                        Err(e) => warn!("스냅샷 작업 실패: {e}"),
                    }
                }
            }
            SessionEvent::Miss {
                next_interval_ms,
                timed_out,
            } => debug!(next_interval_ms, timed_out, "미스"),
            SessionEvent::Recovered { target, attempts } => match target {
                Some(target) => info!(attempts, "복구됨: {target}"),
                None => info!(attempts, "복구됨"),
            },
            SessionEvent::Error { kind, message } => warn!(?kind, "{message}"),
            SessionEvent::PhaseChanged { from, to } => info!("상태: {from} → {to}"),
        }
    }
    logged
}

// ============================================================
// 조회 명령
// ============================================================

async fn list_windows(config: &AppConfig) -> Result<()> {
    let enumerator = SystemWindowEnumerator::new();
    let windows = enumerator
        .list_windows()
        .await
        .map_err(|e| anyhow!("창 목록 조회 실패: {e}"))?;

    let selected = resolve_from(&windows, &config.target, None);

    println!(
        "{:<3} {:<12} {:<8} {:<24} {:<28} {}",
        "", "HANDLE", "PID", "PROCESS", "CLASS", "TITLE"
    );
    for w in &windows {
        let mark = match &selected {
            Some(t) if t.window_ref == w.window_ref => "*",
            _ if w.is_foreground => ">",
            _ => "",
        };
        println!(
            "{:<3} {:<12} {:<8} {:<24} {:<28} {}{}",
            mark,
            w.window_ref.to_string(),
            w.pid,
            w.process_name,
            w.class_name.as_deref().unwrap_or("-"),
            w.title,
            if w.is_minimized { " (최소화)" } else { "" }
        );
    }

    println!();
    match selected {
        Some(t) => println!("현재 설정이 선택할 대상: {t} ({:?})", t.matched_by),
        None if config.target.has_descriptor() => println!("현재 설정과 일치하는 창 없음"),
        None => println!("대상 기술자가 설정되지 않음 (target.process_name 등)"),
    }
    Ok(())
}

fn list_monitors() -> Result<()> {
    let monitors = XcapCaptureBackend::new()
        .list_monitors()
        .map_err(|e| anyhow!("모니터 목록 조회 실패: {e}"))?;
    for m in monitors {
        println!(
            "[{}] {} {}x{} @ ({}, {}) scale={:.2}{}",
            m.index,
            m.name,
            m.bounds.width,
            m.bounds.height,
            m.bounds.x,
            m.bounds.y,
            m.scale_factor,
            if m.is_primary { " (주 모니터)" } else { "" }
        );
    }
    Ok(())
}

// ============================================================
// 테스트
// ============================================================
