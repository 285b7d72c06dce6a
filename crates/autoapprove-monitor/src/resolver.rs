//! 대상 창 해석기.
//!
//! 고정 우선순위 전략 체인으로 대상 창을 찾는다:
//! 프로세스 이름 → 프로세스 경로 → 창 제목(정확 → 부분 일치) → 창 클래스.
//! 유일하게 매칭되는 첫 전략이 승리하며, 모든 전략이 여러 후보만 낸 경우
//! 첫 모호 집합에서 이전 대상 → 포그라운드 → 최상위 z → 최신 프로세스 순으로 고른다.
//!
//! 콜드 해석이 연속으로 실패하면 연장 쿨다운 동안 해석을 건너뛴다.

use async_trait::async_trait;
use autoapprove_core::config::{RecoveryConfig, TargetConfig};
use autoapprove_core::error::CoreError;
use autoapprove_core::models::target::{ResolveStrategy, TargetIdentity, WindowSnapshot};
use autoapprove_core::ports::window::{TargetVerifier, WindowEnumerator};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 해석기 내부 상태
#[derive(Debug, Default)]
struct ColdState {
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
}

/// 대상 창 해석기
pub struct WindowResolver {
    enumerator: Arc<dyn WindowEnumerator>,
    target: TargetConfig,
    max_cold_failures: u32,
    cold_cooldown: Duration,
    state: Mutex<ColdState>,
}

impl WindowResolver {
    pub fn new(
        enumerator: Arc<dyn WindowEnumerator>,
        target: TargetConfig,
        recovery: &RecoveryConfig,
    ) -> Self {
        Self {
            enumerator,
            target,
            max_cold_failures: recovery.resolver_max_cold_failures.max(1),
            cold_cooldown: Duration::from_millis(recovery.resolver_cooldown_ms),
            state: Mutex::new(ColdState::default()),
        }
    }

    /// 대상 해석. 실패 시 `TargetNotFound`.
    pub async fn resolve(
        &self,
        last_known: Option<&TargetIdentity>,
    ) -> Result<TargetIdentity, CoreError> {
        if let Some(until) = self.state.lock().cooldown_until {
            if Instant::now() < until {
                return Err(CoreError::TargetNotFound(
                    "연속 해석 실패로 쿨다운 중".to_string(),
                ));
            }
        }

        let windows = self.enumerator.list_windows().await?;
        match resolve_from(&windows, &self.target, last_known) {
            Some(identity) => {
                let mut state = self.state.lock();
                state.consecutive_failures = 0;
                state.cooldown_until = None;
                info!(strategy = ?identity.matched_by, "대상 해석 성공: {identity}");
                Ok(identity)
            }
            None => {
                let mut state = self.state.lock();
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.max_cold_failures {
                    warn!(
                        "대상 해석 {}회 연속 실패: {:?} 쿨다운",
                        state.consecutive_failures, self.cold_cooldown
                    );
                    state.consecutive_failures = 0;
                    state.cooldown_until = Some(Instant::now() + self.cold_cooldown);
                }
                Err(CoreError::TargetNotFound(describe(&self.target)))
            }
        }
    }

    /// 대상이 살아 있고 판별 필드가 일치하는지 재검증
    pub async fn validate(&self, identity: &TargetIdentity) -> Result<bool, CoreError> {
        let windows = self.enumerator.list_windows().await?;
        let alive = windows.iter().any(|w| identity.matches(w) && !w.is_minimized);
        if !alive {
            debug!("대상 재검증 실패: {identity}");
        }
        Ok(alive)
    }

    /// 연장 쿨다운 중인지 여부
    pub fn in_cooldown(&self) -> bool {
        self.state
            .lock()
            .cooldown_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }
}

#[async_trait]
impl TargetVerifier for WindowResolver {
    async fn verify(&self, identity: &TargetIdentity) -> bool {
        match self.validate(identity).await {
            Ok(alive) => alive,
            Err(e) => {
                warn!("대상 재검증 중 에러: {e}");
                false
            }
        }
    }
}

fn describe(target: &TargetConfig) -> String {
    let mut parts = Vec::new();
    if let Some(name) = &target.process_name {
        parts.push(format!("process={name}"));
    }
    if let Some(path) = &target.process_path {
        parts.push(format!("path={path}"));
    }
    if let Some(title) = &target.window_title {
        parts.push(format!("title={title}"));
    }
    if let Some(class) = &target.class_name {
        parts.push(format!("class={class}"));
    }
    if parts.is_empty() {
        "대상 기술자 없음".to_string()
    } else {
        parts.join(", ")
    }
}

// ============================================================
// 전략 체인 (순수 함수)
// ============================================================

fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    lower.strip_suffix(".exe").map(str::to_string).unwrap_or(lower)
}

fn normalize_path(path: &str) -> String {
    path.trim().replace('\\', "/").to_lowercase()
}

/// 전략 하나가 고른 창 목록
fn candidates_for<'a>(
    strategy: ResolveStrategy,
    windows: &'a [WindowSnapshot],
    target: &TargetConfig,
) -> Vec<&'a WindowSnapshot> {
    let toggles = &target.strategies;
    let filter: Box<dyn Fn(&WindowSnapshot) -> bool> = match strategy {
        ResolveStrategy::ProcessName => match (&target.process_name, toggles.process_name) {
            (Some(name), true) => {
                let wanted = normalize_process_name(name);
                Box::new(move |w| normalize_process_name(&w.process_name) == wanted)
            }
            _ => return Vec::new(),
        },
        ResolveStrategy::ProcessPath => match (&target.process_path, toggles.process_path) {
            (Some(path), true) => {
                let wanted = normalize_path(path);
                Box::new(move |w| {
                    w.process_path
                        .as_deref()
                        .map(|p| normalize_path(p) == wanted)
                        .unwrap_or(false)
                })
            }
            _ => return Vec::new(),
        },
        ResolveStrategy::TitleExact => match (&target.window_title, toggles.window_title) {
            (Some(title), true) => {
                let wanted = title.clone();
                Box::new(move |w| w.title == wanted)
            }
            _ => return Vec::new(),
        },
        ResolveStrategy::TitleFuzzy => {
            match (&target.window_title, toggles.window_title && target.fuzzy_title) {
                (Some(title), true) if !title.is_empty() => {
                    let wanted = title.to_lowercase();
                    Box::new(move |w| w.title.to_lowercase().contains(&wanted))
                }
                _ => return Vec::new(),
            }
        }
        ResolveStrategy::ClassName => match (&target.class_name, toggles.class_name) {
            (Some(class), true) => {
                let wanted = class.clone();
                Box::new(move |w| w.class_name.as_deref() == Some(wanted.as_str()))
            }
            _ => return Vec::new(),
        },
    };

    windows
        .iter()
        .filter(|w| !w.is_minimized && filter(*w))
        .collect()
}

/// 전략 우선순위
pub const STRATEGY_ORDER: [ResolveStrategy; 5] = [
    ResolveStrategy::ProcessName,
    ResolveStrategy::ProcessPath,
    ResolveStrategy::TitleExact,
    ResolveStrategy::TitleFuzzy,
    ResolveStrategy::ClassName,
];

/// 창 목록에서 대상 해석
pub fn resolve_from(
    windows: &[WindowSnapshot],
    target: &TargetConfig,
    last_known: Option<&TargetIdentity>,
) -> Option<TargetIdentity> {
    let mut first_ambiguous: Option<(ResolveStrategy, Vec<&WindowSnapshot>)> = None;

    for strategy in STRATEGY_ORDER {
        let matches = candidates_for(strategy, windows, target);
        match matches.len() {
            0 => continue,
            1 => return Some(TargetIdentity::from_snapshot(matches[0], strategy)),
            n => {
                debug!(?strategy, "후보 {n}개: 다음 전략 시도");
                if first_ambiguous.is_none() {
                    first_ambiguous = Some((strategy, matches));
                }
            }
        }
    }

    let (strategy, set) = first_ambiguous?;
    let chosen = disambiguate(&set, last_known)?;
    Some(TargetIdentity::from_snapshot(chosen, strategy))
}

/// 여러 후보 중 선택: 이전 대상 → 포그라운드 → 최상위 z → 최신 프로세스
fn disambiguate<'a>(
    set: &[&'a WindowSnapshot],
    last_known: Option<&TargetIdentity>,
) -> Option<&'a WindowSnapshot> {
    if let Some(previous) = last_known {
        if let Some(w) = set.iter().find(|w| previous.matches(w)) {
            return Some(*w);
        }
    }
    set.iter()
        .max_by(|a, b| {
            a.is_foreground
                .cmp(&b.is_foreground)
                .then_with(|| a.z_order.cmp(&b.z_order))
                .then_with(|| a.process_started_at.cmp(&b.process_started_at))
        })
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoapprove_core::models::frame::ScreenRect;
    use autoapprove_core::models::target::WindowRef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn window(id: u64, pid: u32, process: &str, title: &str) -> WindowSnapshot {
        WindowSnapshot {
            window_ref: WindowRef(id),
            pid,
            process_name: process.to_string(),
            process_path: Some(format!("C:\\Apps\\{process}")),
            title: title.to_string(),
            class_name: Some("Chrome_WidgetWin_1".to_string()),
            bounds: ScreenRect::new(0, 0, 800, 600),
            z_order: 0,
            is_foreground: false,
            is_minimized: false,
            process_started_at: 1_000,
            scale_factor: 1.0,
        }
    }

    fn by_title(title: &str) -> TargetConfig {
        TargetConfig {
            window_title: Some(title.to_string()),
            ..TargetConfig::default()
        }
    }

    struct StaticEnumerator {
        windows: parking_lot::Mutex<Vec<WindowSnapshot>>,
        calls: AtomicUsize,
    }

    impl StaticEnumerator {
        fn new(windows: Vec<WindowSnapshot>) -> Arc<Self> {
            Arc::new(Self {
                windows: parking_lot::Mutex::new(windows),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WindowEnumerator for StaticEnumerator {
        async fn list_windows(&self) -> Result<Vec<WindowSnapshot>, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.windows.lock().clone())
        }
    }

    #[test]
    fn exact_title_beats_fuzzy() {
        let windows = vec![
            window(1, 10, "Code.exe", "Approve - Visual Studio Code"),
            window(2, 20, "Cursor.exe", "Approve"),
        ];
        let identity = resolve_from(&windows, &by_title("Approve"), None).unwrap();
        assert_eq!(identity.window_ref, WindowRef(2));
        assert_eq!(identity.matched_by, ResolveStrategy::TitleExact);
    }

    #[test]
    fn fuzzy_title_when_enabled() {
        let windows = vec![window(1, 10, "Code.exe", "main.rs - Visual Studio Code")];
        let identity = resolve_from(&windows, &by_title("visual studio"), None).unwrap();
        assert_eq!(identity.matched_by, ResolveStrategy::TitleFuzzy);

        let mut strict = by_title("visual studio");
        strict.fuzzy_title = false;
        assert!(resolve_from(&windows, &strict, None).is_none());
    }

    #[test]
    fn process_name_has_priority_over_title() {
        let windows = vec![
            window(1, 10, "Code.exe", "editor"),
            window(2, 20, "notepad.exe", "Code"),
        ];
        let target = TargetConfig {
            process_name: Some("code".to_string()),
            window_title: Some("Code".to_string()),
            ..TargetConfig::default()
        };
        let identity = resolve_from(&windows, &target, None).unwrap();
        assert_eq!(identity.window_ref, WindowRef(1));
        assert_eq!(identity.matched_by, ResolveStrategy::ProcessName);
    }

    #[test]
    fn ambiguous_process_resolved_by_later_unique_strategy() {
        let windows = vec![
            window(1, 10, "Code.exe", "project-a"),
            window(2, 11, "Code.exe", "project-b"),
        ];
        let target = TargetConfig {
            process_name: Some("Code.exe".to_string()),
            window_title: Some("project-b".to_string()),
            ..TargetConfig::default()
        };
        let identity = resolve_from(&windows, &target, None).unwrap();
        assert_eq!(identity.window_ref, WindowRef(2));
    }

    #[test]
    fn disambiguation_prefers_previous_then_foreground_then_z_then_newest() {
        let mut a = window(1, 10, "Code.exe", "a");
        let mut b = window(2, 11, "Code.exe", "b");
        let c = window(3, 12, "Code.exe", "c");
        let target = TargetConfig {
            process_name: Some("Code.exe".to_string()),
            ..TargetConfig::default()
        };

        // 최신 프로세스
        b.process_started_at = 2_000;
        let windows = vec![a.clone(), b.clone(), c.clone()];
        assert_eq!(
            resolve_from(&windows, &target, None).unwrap().window_ref,
            WindowRef(2)
        );

        // z-순서가 시작 시각보다 우선
        a.z_order = 5;
        let windows = vec![a.clone(), b.clone(), c.clone()];
        assert_eq!(
            resolve_from(&windows, &target, None).unwrap().window_ref,
            WindowRef(1)
        );

        // 포그라운드가 z-순서보다 우선
        let mut c_fg = c.clone();
        c_fg.is_foreground = true;
        let windows = vec![a.clone(), b.clone(), c_fg];
        assert_eq!(
            resolve_from(&windows, &target, None).unwrap().window_ref,
            WindowRef(3)
        );

        // 이전 대상이 살아 있으면 최우선
        let previous = TargetIdentity::from_snapshot(&b, ResolveStrategy::ProcessName);
        let mut c_fg = c;
        c_fg.is_foreground = true;
        let windows = vec![a, b, c_fg];
        assert_eq!(
            resolve_from(&windows, &target, Some(&previous))
                .unwrap()
                .window_ref,
            WindowRef(2)
        );
    }

    #[test]
    fn minimized_windows_ignored() {
        let mut w = window(1, 10, "Code.exe", "x");
        w.is_minimized = true;
        let target = TargetConfig {
            process_name: Some("Code.exe".to_string()),
            ..TargetConfig::default()
        };
        assert!(resolve_from(&[w], &target, None).is_none());
    }

    #[test]
    fn disabled_strategy_skipped() {
        let windows = vec![window(1, 10, "Code.exe", "x")];
        let mut target = TargetConfig {
            process_name: Some("Code.exe".to_string()),
            ..TargetConfig::default()
        };
        target.strategies.process_name = false;
        assert!(resolve_from(&windows, &target, None).is_none());
    }

    #[test]
    fn class_name_strategy() {
        let windows = vec![window(7, 10, "app.exe", "")];
        let target = TargetConfig {
            class_name: Some("Chrome_WidgetWin_1".to_string()),
            ..TargetConfig::default()
        };
        let identity = resolve_from(&windows, &target, None).unwrap();
        assert_eq!(identity.matched_by, ResolveStrategy::ClassName);
    }

    #[tokio::test]
    async fn validate_detects_recycled_reference() {
        let original = window(1, 10, "Code.exe", "x");
        let enumerator = StaticEnumerator::new(vec![original.clone()]);
        let resolver = WindowResolver::new(
            enumerator.clone(),
            by_title("x"),
            &RecoveryConfig::default(),
        );
        let identity = resolver.resolve(None).await.unwrap();
        assert!(resolver.validate(&identity).await.unwrap());

        // 같은 핸들을 다른 프로세스가 재사용
        let mut recycled = original;
        recycled.pid = 99;
        recycled.process_started_at = 5_000;
        *enumerator.windows.lock() = vec![recycled];
        assert!(!resolver.verify(&identity).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_failures_trigger_cooldown() {
        let enumerator = StaticEnumerator::new(Vec::new());
        let recovery = RecoveryConfig {
            resolver_max_cold_failures: 3,
            resolver_cooldown_ms: 10_000,
            ..RecoveryConfig::default()
        };
        let resolver = WindowResolver::new(enumerator.clone(), by_title("x"), &recovery);

        for _ in 0..3 {
            assert!(matches!(
                resolver.resolve(None).await,
                Err(CoreError::TargetNotFound(_))
            ));
        }
        assert!(resolver.in_cooldown());
        assert_eq!(enumerator.calls.load(Ordering::SeqCst), 3);

        // 쿨다운 중에는 열거하지 않는다
        assert!(resolver.resolve(None).await.is_err());
        assert_eq!(enumerator.calls.load(Ordering::SeqCst), 3);

        tokio::time::advance(Duration::from_millis(10_001)).await;
        *enumerator.windows.lock() = vec![window(1, 10, "Code.exe", "x")];
        assert!(resolver.resolve(None).await.is_ok());
        assert!(!resolver.in_cooldown());
    }
}
