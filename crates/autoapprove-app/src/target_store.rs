//! 마지막 대상 저장소 (웜 재시작).
//!
//! 종료 시 마지막으로 해석된 `TargetIdentity`를 JSON으로 남기고,
//! 다음 세션이 이를 `last_known`으로 받아 같은 창을 우선 선택한다.

use std::fs;
use std::path::{Path, PathBuf};

use autoapprove_core::config_manager::project_dirs;
use autoapprove_core::error::CoreError;
use autoapprove_core::models::target::TargetIdentity;
use tracing::{debug, warn};

const FILE_NAME: &str = "last_target.json";

/// 마지막 대상 저장소
pub struct TargetStore {
    path: PathBuf,
}

impl TargetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 플랫폼별 데이터 디렉토리의 기본 저장소
    ///
    /// 설정 파일과 같은 프로젝트 디렉토리를 쓴다.
    ///
    /// - macOS: `~/Library/Application Support/com.autoapprove.autoapprove/last_target.json`
    /// - Windows: `%APPDATA%\autoapprove\autoapprove\data\last_target.json`
    /// - Linux: `~/.local/share/autoapprove/last_target.json`
    pub fn default_location() -> Self {
        let path = project_dirs()
            .map(|p| p.data_dir().join(FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(".").join(FILE_NAME));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 저장된 대상 로드. 없거나 손상되었으면 `None`
    pub fn load(&self) -> Option<TargetIdentity> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("마지막 대상 읽기 실패: {e}");
                return None;
            }
        };
        match serde_json::from_str::<TargetIdentity>(&content) {
            Ok(identity) => {
                debug!("마지막 대상 로드: {identity}");
                Some(identity)
            }
            Err(e) => {
                warn!("마지막 대상 파일 손상, 무시: {e}");
                None
            }
        }
    }

    /// 대상 저장 (부모 디렉토리 자동 생성)
    pub fn save(&self, identity: &TargetIdentity) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(identity)?;
        fs::write(&self.path, json)?;
        debug!("마지막 대상 저장: {}", self.path.display());
        Ok(())
    }

    /// 저장된 대상 삭제
    pub fn clear(&self) -> Result<(), CoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
