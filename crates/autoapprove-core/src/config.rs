//! 애플리케이션 설정 구조체.
//!
//! 캡처 대상/영역, 템플릿 매칭, 클릭 전달, 대상 해석, 폴링 주기, 복구 정책 등
//! 세션 단위 설정을 정의한다. 세션은 시작 시점의 스냅샷을 불변으로 소비하며,
//! 설정 변경은 세션 사이에서만 반영된다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;
use crate::models::frame::{CaptureBackendKind, Rect};

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 캡처 설정
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 템플릿 매칭 설정
    #[serde(default)]
    pub matching: MatchingConfig,
    /// 클릭 전달 설정
    #[serde(default)]
    pub click: ClickConfig,
    /// 대상 창 해석 설정
    #[serde(default)]
    pub target: TargetConfig,
    /// 폴링 스케줄러 설정
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// 복구/백오프 설정
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// 디버그 설정
    #[serde(default)]
    pub debug: DebugConfig,
}

// ============================================================
// 캡처 설정
// ============================================================

/// 캡처 설정: 백엔드 종류, 모니터 선택, 관심 영역
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// 캡처 백엔드 (창 영역 / 모니터 영역)
    #[serde(default)]
    pub backend: CaptureBackendKind,
    /// 모니터 인덱스 (0부터 시작, 모니터 캡처에서만 사용)
    #[serde(default)]
    pub monitor_index: usize,
    /// 관심 영역: 캡처 표면 자체 좌표계 기준. w 또는 h가 0이면 전체 표면
    #[serde(default)]
    pub roi: Rect,
    /// 단일 프레임 획득 타임아웃 (밀리초)
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    /// 프레임 캐시 링 버퍼 크기
    #[serde(default = "default_frame_buffer_capacity")]
    pub frame_buffer_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackendKind::default(),
            monitor_index: 0,
            roi: Rect::default(),
            capture_timeout_ms: default_capture_timeout_ms(),
            frame_buffer_capacity: default_frame_buffer_capacity(),
        }
    }
}

fn default_capture_timeout_ms() -> u64 {
    5_000
}

fn default_frame_buffer_capacity() -> usize {
    3
}

// ============================================================
// 템플릿 매칭 설정
// ============================================================

/// 여러 템플릿이 같은 영역에서 겹쳐 매칭될 때의 선택 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// 템플릿 목록 순서(우선순위) 우선, 동순위면 점수
    #[default]
    PriorityThenScore,
    /// 점수 우선, 동점이면 템플릿 순서
    ScoreThenPriority,
}

/// 템플릿 매칭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// 템플릿 이미지 경로 (목록 순서가 우선순위)
    #[serde(default = "default_template_paths")]
    pub template_paths: Vec<PathBuf>,
    /// 매칭 임계값 [0, 1]
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// 그레이스케일 변환 후 매칭 (연산량 감소)
    #[serde(default = "default_true")]
    pub grayscale: bool,
    /// 다중 스케일 매칭 여부
    #[serde(default)]
    pub multi_scale: bool,
    /// 다중 스케일 목록 (multi_scale = true일 때만 사용)
    #[serde(default = "default_scales")]
    pub scales: Vec<f32>,
    /// 템플릿·스케일당 최대 후보 수
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// 템플릿 간 겹침 처리 정책
    #[serde(default)]
    pub merge_policy: MergePolicy,
    /// 상관 연산 타임아웃 (밀리초): 초과 시 미스로 처리
    #[serde(default = "default_correlation_timeout_ms")]
    pub correlation_timeout_ms: u64,
    /// 상관 연산 워커 스레드 수 (0 = 자동)
    #[serde(default)]
    pub worker_threads: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            template_paths: default_template_paths(),
            threshold: default_threshold(),
            grayscale: true,
            multi_scale: false,
            scales: default_scales(),
            max_candidates: default_max_candidates(),
            merge_policy: MergePolicy::default(),
            correlation_timeout_ms: default_correlation_timeout_ms(),
            worker_threads: 0,
        }
    }
}

impl MatchingConfig {
    /// 실제로 사용할 스케일 목록 (multi_scale 비활성 시 1.0 단일)
    pub fn effective_scales(&self) -> Vec<f32> {
        if self.multi_scale && !self.scales.is_empty() {
            self.scales.clone()
        } else {
            vec![1.0]
        }
    }
}

fn default_template_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("assets/images/approve_pix.png")]
}

fn default_threshold() -> f32 {
    0.88
}

fn default_scales() -> Vec<f32> {
    vec![1.0, 1.25, 0.8]
}

fn default_max_candidates() -> usize {
    5
}

fn default_correlation_timeout_ms() -> u64 {
    2_000
}

// ============================================================
// 클릭 설정
// ============================================================

/// 합성 입력 전달 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickMethod {
    /// 동기 직접 전달: 전달 완료까지 대기
    #[default]
    Direct,
    /// 비동기 큐 전달: 큐에 넣고 즉시 반환
    Queued,
    /// 창 메시지 전달 (Windows `PostMessageW`), 그 외 플랫폼은 직접 전달로 폴백
    Message,
}

/// 캡처 좌표 → 입력 좌표 변환 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateMode {
    /// 모니터/창 오프셋 + DPI 스케일 자동 적용
    #[default]
    Auto,
    /// 자동 변환 + 수동 보정 오프셋
    Manual,
    /// DPI 보정 없음 (캡처 원점 오프셋만 적용)
    Disabled,
}

/// 클릭 전달 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickConfig {
    /// 전달 방식
    #[serde(default)]
    pub method: ClickMethod,
    /// 템플릿 중심 기준 클릭 오프셋 (캡처 픽셀)
    #[serde(default)]
    pub click_offset: (i32, i32),
    /// 같은 위치 재클릭 억제 시간 (밀리초)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// 같은 논리적 위치로 간주하는 반경 (입력 좌표 픽셀)
    #[serde(default = "default_dedup_radius_px")]
    pub dedup_radius_px: u32,
    /// 연속 검출 N회 이상일 때만 클릭 (오탐 감소)
    #[serde(default = "default_min_detections")]
    pub min_detections: u32,
    /// 클릭 직전 대상 창 재검증
    #[serde(default = "default_true")]
    pub verify_window_before_click: bool,
    /// 좌표 변환 모드
    #[serde(default)]
    pub coordinate_mode: CoordinateMode,
    /// 수동 보정 오프셋 (Manual 모드)
    #[serde(default)]
    pub coordinate_offset: (i32, i32),
    /// 클릭 이력 보관 개수
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            method: ClickMethod::default(),
            click_offset: (0, 0),
            cooldown_ms: default_cooldown_ms(),
            dedup_radius_px: default_dedup_radius_px(),
            min_detections: default_min_detections(),
            verify_window_before_click: true,
            coordinate_mode: CoordinateMode::default(),
            coordinate_offset: (0, 0),
            history_capacity: default_history_capacity(),
        }
    }
}

fn default_cooldown_ms() -> u64 {
    5_000
}

fn default_dedup_radius_px() -> u32 {
    12
}

fn default_min_detections() -> u32 {
    1
}

fn default_history_capacity() -> usize {
    64
}

// ============================================================
// 대상 해석 설정
// ============================================================

/// 해석 전략별 활성화 토글
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyToggles {
    #[serde(default = "default_true")]
    pub process_name: bool,
    #[serde(default = "default_true")]
    pub process_path: bool,
    #[serde(default = "default_true")]
    pub window_title: bool,
    #[serde(default = "default_true")]
    pub class_name: bool,
}

impl Default for StrategyToggles {
    fn default() -> Self {
        Self {
            process_name: true,
            process_path: true,
            window_title: true,
            class_name: true,
        }
    }
}

/// 대상 창 기술자: 지정된 필드만 전략 체인에 참여한다
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// 프로세스 이름 (예: "Code.exe")
    #[serde(default)]
    pub process_name: Option<String>,
    /// 프로세스 실행 경로
    #[serde(default)]
    pub process_path: Option<String>,
    /// 창 제목
    #[serde(default)]
    pub window_title: Option<String>,
    /// 창 클래스 이름 (Windows)
    #[serde(default)]
    pub class_name: Option<String>,
    /// 제목 부분 일치(퍼지) 허용
    #[serde(default = "default_true")]
    pub fuzzy_title: bool,
    /// 전략 토글
    #[serde(default)]
    pub strategies: StrategyToggles,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            process_name: None,
            process_path: None,
            window_title: None,
            class_name: None,
            fuzzy_title: true,
            strategies: StrategyToggles::default(),
        }
    }
}

impl TargetConfig {
    /// 기술자가 하나라도 지정되었는지 여부
    pub fn has_descriptor(&self) -> bool {
        self.process_name.is_some()
            || self.process_path.is_some()
            || self.window_title.is_some()
            || self.class_name.is_some()
    }
}

// ============================================================
// 스케줄러 설정
// ============================================================

/// 적응형 폴링 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 기본 폴링 간격 (밀리초): 히트 시 이 값으로 복귀
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 최소 폴링 간격 (밀리초)
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// 최대 폴링 간격 (밀리초)
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// 연속 미스 시 간격 증가 배수
    #[serde(default = "default_miss_growth_factor")]
    pub miss_growth_factor: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            miss_growth_factor: default_miss_growth_factor(),
        }
    }
}

fn default_interval_ms() -> u64 {
    800
}

fn default_min_interval_ms() -> u64 {
    500
}

fn default_max_interval_ms() -> u64 {
    5_000
}

fn default_miss_growth_factor() -> f64 {
    1.5
}

// ============================================================
// 복구 설정
// ============================================================

/// 복구/백오프 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Recovering 상태 최대 연속 시도 횟수 (초과 시 Backoff)
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
    /// 복구 시도 간 대기 (밀리초)
    #[serde(default = "default_recovery_cooldown_ms")]
    pub recovery_cooldown_ms: u64,
    /// 첫 Backoff 대기 (밀리초)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Backoff 대기 상한 (밀리초)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// 리졸버 콜드 해석 연속 실패 허용 횟수
    #[serde(default = "default_resolver_max_cold_failures")]
    pub resolver_max_cold_failures: u32,
    /// 리졸버 연장 쿨다운 (밀리초)
    #[serde(default = "default_resolver_cooldown_ms")]
    pub resolver_cooldown_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_recovery_attempts: default_max_recovery_attempts(),
            recovery_cooldown_ms: default_recovery_cooldown_ms(),
            backoff_ms: default_backoff_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            resolver_max_cold_failures: default_resolver_max_cold_failures(),
            resolver_cooldown_ms: default_resolver_cooldown_ms(),
        }
    }
}

fn default_max_recovery_attempts() -> u32 {
    5
}

fn default_recovery_cooldown_ms() -> u64 {
    1_000
}

fn default_backoff_ms() -> u64 {
    10_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_resolver_max_cold_failures() -> u32 {
    3
}

fn default_resolver_cooldown_ms() -> u64 {
    10_000
}

// ============================================================
// 디버그 설정
// ============================================================

/// 디버그 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// 히트 시 디버그 스냅샷 저장 (명시적으로 켠 경우에만)
    #[serde(default)]
    pub save_snapshots: bool,
    /// 스냅샷 저장 디렉토리
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            save_snapshots: false,
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("debug_images")
}

fn default_true() -> bool {
    true
}

// ============================================================
// AppConfig 편의 메서드
// ============================================================

impl AppConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self {
            capture: CaptureConfig::default(),
            matching: MatchingConfig::default(),
            click: ClickConfig::default(),
            target: TargetConfig::default(),
            scheduler: SchedulerConfig::default(),
            recovery: RecoveryConfig::default(),
            debug: DebugConfig::default(),
        }
    }

    /// 프레임 획득 타임아웃
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture.capture_timeout_ms)
    }

    /// 상관 연산 타임아웃
    pub fn correlation_timeout(&self) -> Duration {
        Duration::from_millis(self.matching.correlation_timeout_ms)
    }

    /// 클릭 쿨다운
    pub fn click_cooldown(&self) -> Duration {
        Duration::from_millis(self.click.cooldown_ms)
    }

    /// 복구 시도 간 대기
    pub fn recovery_cooldown(&self) -> Duration {
        Duration::from_millis(self.recovery.recovery_cooldown_ms)
    }

    /// 설정 값 검증. 세션 시작 전에 호출된다.
    pub fn validate(&self) -> Result<(), CoreError> {
        let s = &self.scheduler;
        if s.min_interval_ms == 0 {
            return Err(CoreError::validation(
                "scheduler.min_interval_ms",
                "0보다 커야 합니다",
            ));
        }
        if s.min_interval_ms > s.max_interval_ms {
            return Err(CoreError::validation(
                "scheduler.min_interval_ms",
                format!(
                    "최소 간격({})이 최대 간격({})보다 큽니다",
                    s.min_interval_ms, s.max_interval_ms
                ),
            ));
        }
        if s.interval_ms < s.min_interval_ms || s.interval_ms > s.max_interval_ms {
            return Err(CoreError::validation(
                "scheduler.interval_ms",
                format!(
                    "기본 간격({})이 [{}, {}] 범위를 벗어났습니다",
                    s.interval_ms, s.min_interval_ms, s.max_interval_ms
                ),
            ));
        }
        if s.miss_growth_factor.is_nan() || s.miss_growth_factor <= 1.0 {
            return Err(CoreError::validation(
                "scheduler.miss_growth_factor",
                "1.0보다 커야 합니다",
            ));
        }

        let m = &self.matching;
        if !(0.0..=1.0).contains(&m.threshold) {
            return Err(CoreError::validation(
                "matching.threshold",
                format!("[0, 1] 범위여야 합니다: {}", m.threshold),
            ));
        }
        if m.template_paths.is_empty() {
            return Err(CoreError::validation(
                "matching.template_paths",
                "템플릿이 하나 이상 필요합니다",
            ));
        }
        if m.multi_scale && m.scales.is_empty() {
            return Err(CoreError::validation(
                "matching.scales",
                "다중 스케일 활성화 시 스케일 목록이 필요합니다",
            ));
        }
        if let Some(bad) = m.scales.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(CoreError::validation(
                "matching.scales",
                format!("양수여야 합니다: {bad}"),
            ));
        }
        if m.max_candidates == 0 {
            return Err(CoreError::validation(
                "matching.max_candidates",
                "0보다 커야 합니다",
            ));
        }

        if self.capture.frame_buffer_capacity == 0 {
            return Err(CoreError::validation(
                "capture.frame_buffer_capacity",
                "0보다 커야 합니다",
            ));
        }
        if self.capture.backend == CaptureBackendKind::WindowRegion && !self.target.has_descriptor()
        {
            return Err(CoreError::validation(
                "target",
                "창 캡처 모드에는 대상 기술자(프로세스/경로/제목/클래스)가 필요합니다",
            ));
        }

        let r = &self.recovery;
        if r.max_recovery_attempts == 0 {
            return Err(CoreError::validation(
                "recovery.max_recovery_attempts",
                "0보다 커야 합니다",
            ));
        }
        if r.backoff_ms > r.backoff_max_ms {
            return Err(CoreError::validation(
                "recovery.backoff_ms",
                "backoff_max_ms보다 클 수 없습니다",
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_config() -> AppConfig {
        let mut config = AppConfig::default_config();
        config.target.process_name = Some("Code.exe".to_string());
        config
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default_config();
        assert_eq!(config.scheduler.interval_ms, 800);
        assert!((config.matching.threshold - 0.88).abs() < f32::EPSILON);
        assert_eq!(config.click.cooldown_ms, 5_000);
        assert!(config.matching.grayscale);
        assert!(!config.matching.multi_scale);
        assert_eq!(config.recovery.max_recovery_attempts, 5);
        assert!(!config.debug.save_snapshots);
    }

    #[test]
    fn window_mode_requires_descriptor() {
        let config = AppConfig::default_config();
        assert!(config.validate().is_err());
        assert!(window_config().validate().is_ok());
    }

    #[test]
    fn monitor_mode_needs_no_descriptor() {
        let mut config = AppConfig::default_config();
        config.capture.backend = CaptureBackendKind::MonitorRegion;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn interval_bounds_validated() {
        let mut config = window_config();
        config.scheduler.min_interval_ms = 6_000;
        assert!(matches!(
            config.validate(),
            Err(CoreError::Validation { ref field, .. }) if field == "scheduler.min_interval_ms"
        ));

        let mut config = window_config();
        config.scheduler.interval_ms = 100;
        assert!(config.validate().is_err());

        let mut config = window_config();
        config.scheduler.miss_growth_factor = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let mut config = window_config();
        config.matching.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_scales_respect_flag() {
        let mut matching = MatchingConfig::default();
        assert_eq!(matching.effective_scales(), vec![1.0]);
        matching.multi_scale = true;
        assert_eq!(matching.effective_scales(), vec![1.0, 1.25, 0.8]);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let json = r#"{ "matching": { "threshold": 0.9 }, "target": { "process_name": "Code" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert!((config.matching.threshold - 0.9).abs() < f32::EPSILON);
        assert!(config.matching.grayscale);
        assert_eq!(config.scheduler.max_interval_ms, 5_000);
        assert_eq!(config.target.process_name.as_deref(), Some("Code"));
        assert!(config.target.strategies.window_title);
    }

    #[test]
    fn enums_use_lowercase_names() {
        let json = r#"{ "method": "queued", "coordinate_mode": "manual" }"#;
        let click: ClickConfig = serde_json::from_str(json).unwrap();
        assert_eq!(click.method, ClickMethod::Queued);
        assert_eq!(click.coordinate_mode, CoordinateMode::Manual);
    }
}
