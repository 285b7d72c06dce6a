//! 디버그 스냅샷 저장.
//!
//! 히트가 난 프레임을 매칭 영역 테두리와 함께 PNG로 저장한다.
//! 설정에서 명시적으로 켠 경우에만 사용된다.

use autoapprove_core::error::CoreError;
use autoapprove_core::models::candidate::MatchCandidate;
use autoapprove_core::models::frame::Frame;
use image::{Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

const OUTLINE: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// 디버그 스냅샷 저장기
pub struct SnapshotWriter {
    base_dir: PathBuf,
    counter: AtomicU32,
}

impl SnapshotWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            counter: AtomicU32::new(0),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// 스냅샷 저장 후 파일 경로 반환 (`<base>/<YYYY-MM-DD>/HH-MM-SS-NNN_<score>.png`)
    pub fn save(&self, frame: &Frame, candidate: &MatchCandidate) -> Result<PathBuf, CoreError> {
        let date_str = frame.timestamp.format("%Y-%m-%d").to_string();
        let day_dir = self.base_dir.join(&date_str);
        fs::create_dir_all(&day_dir)
            .map_err(|e| CoreError::Internal(format!("스냅샷 폴더 생성 실패: {e}")))?;

        let counter = self.counter.fetch_add(1, Ordering::SeqCst) % 1000;
        let time_str = frame.timestamp.format("%H-%M-%S").to_string();
        let filename = format!("{time_str}-{counter:03}_{:.3}.png", candidate.score);
        let path = day_dir.join(filename);

        let mut image = frame.image.clone();
        draw_outline(&mut image, candidate);
        image
            .save(&path)
            .map_err(|e| CoreError::Internal(format!("스냅샷 저장 실패: {e}")))?;

        debug!("디버그 스냅샷 저장: {}", path.display());
        Ok(path)
    }
}

/// 후보 영역에 2px 테두리를 그린다 (이미지 밖은 잘림)
fn draw_outline(image: &mut RgbaImage, candidate: &MatchCandidate) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || candidate.width == 0 || candidate.height == 0 {
        return;
    }
    let x0 = candidate.x.min(w - 1);
    let y0 = candidate.y.min(h - 1);
    let x1 = (candidate.x + candidate.width - 1).min(w - 1);
    let y1 = (candidate.y + candidate.height - 1).min(h - 1);

    for t in 0..2u32 {
        for x in x0..=x1 {
            image.put_pixel(x, (y0 + t).min(y1), OUTLINE);
            image.put_pixel(x, y1.saturating_sub(t).max(y0), OUTLINE);
        }
        for y in y0..=y1 {
            image.put_pixel((x0 + t).min(x1), y, OUTLINE);
            image.put_pixel(x1.saturating_sub(t).max(x0), y, OUTLINE);
        }
    }
}
