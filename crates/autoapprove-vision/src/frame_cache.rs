//! 프레임 캐시.
//!
//! 최근 프레임을 `Arc<Frame>`으로 보관하는 고정 크기 링 버퍼.
//! 가득 차면 가장 오래된 프레임을 버리며 생산자를 막지 않는다.
//! 프레임은 생성이 끝난 뒤에만 게시되므로 부분 기록된 프레임은 노출되지 않는다.

use autoapprove_core::models::frame::Frame;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// 최근 프레임 링 버퍼
pub struct FrameCache {
    frames: Mutex<VecDeque<Arc<Frame>>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameCache {
    /// 새 캐시 생성 (capacity 최소 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// 프레임 게시. 가득 찼으면 가장 오래된 프레임을 버린다.
    pub fn publish(&self, frame: Arc<Frame>) {
        let mut frames = self.frames.lock();
        while frames.len() >= self.capacity {
            if let Some(old) = frames.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(sequence = old.sequence, "오래된 프레임 폐기");
            }
        }
        frames.push_back(frame);
    }

    /// 가장 최근 프레임
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frames.lock().back().cloned()
    }

    /// `frame`보다 새로운 프레임이 게시되었는지 여부 (캡처 시각 비교)
    pub fn has_newer_than(&self, frame: &Frame) -> bool {
        self.frames
            .lock()
            .back()
            .map(|latest| latest.is_newer_than(frame))
            .unwrap_or(false)
    }

    /// 모든 프레임 제거 (세션 재생성 시)
    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 용량 초과로 버려진 프레임 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use autoapprove_core::models::frame::{Frame, ScreenRect};
    use chrono::Utc;
    use image::RgbaImage;
    use tokio::time::{Duration, Instant};
    use uuid::Uuid;

    /// 테스트용 프레임 (기준 시각 + offset_ms)
    pub fn frame_at(sequence: u64, base: Instant, offset_ms: u64, image: RgbaImage) -> Frame {
        Frame {
            sequence,
            session_id: Uuid::nil(),
            captured_at: base + Duration::from_millis(offset_ms),
            timestamp: Utc::now(),
            surface: ScreenRect::new(0, 0, image.width(), image.height()),
            image,
            roi_origin: (0, 0),
            dpi_scale: 1.0,
            target: None,
        }
    }
}
