//! 클릭 이력.
//!
//! 결과와 무관하게 모든 디스패치를 기록하는 고정 크기 버퍼와,
//! 같은 논리적 위치의 쿨다운 판정에 쓰는 전달 클릭 목록.
//! 쿨다운 목록은 용량이 아니라 경과 시간으로만 정리된다.

use std::collections::VecDeque;
use std::time::Duration;

use autoapprove_core::models::click::{ClickOutcome, ClickRecord};
use chrono::Utc;
use tokio::time::Instant;

/// 클릭 이력: 가득 차면 가장 오래된 항목부터 버림
pub struct ClickHistory {
    entries: VecDeque<ClickRecord>,
    capacity: usize,
    /// 실제 전달된 클릭 (시각, 위치). 감사 기록의 축출과 무관하다.
    delivered: VecDeque<(Instant, (i32, i32))>,
}

impl ClickHistory {
    /// 새 이력 생성 (최소 1개 보관)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            delivered: VecDeque::new(),
        }
    }

    /// 결과 기록
    pub fn record(&mut self, at: Instant, location: (i32, i32), outcome: ClickOutcome) {
        if outcome.is_clicked() {
            self.delivered.push_back((at, location));
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ClickRecord {
            at,
            timestamp: Utc::now(),
            location,
            outcome,
        });
    }

    /// `location` 반경 안에서 `cooldown` 이내에 전달된 클릭이 있는지
    ///
    /// 실제 전달(`Clicked`)된 기록만 쿨다운을 건다.
    /// 쿨다운이 지난 전달 기록은 이 호출에서 정리된다.
    pub fn is_cooling_down(
        &mut self,
        location: (i32, i32),
        radius_px: u32,
        cooldown: Duration,
        now: Instant,
    ) -> bool {
        self.delivered
            .retain(|(at, _)| now.saturating_duration_since(*at) < cooldown);

        let radius_sq = (radius_px as i64) * (radius_px as i64);
        self.delivered.iter().any(|(_, at_location)| {
            let dx = (at_location.0 - location.0) as i64;
            let dy = (at_location.1 - location.1) as i64;
            dx * dx + dy * dy <= radius_sq
        })
    }

    /// 가장 최근 기록
    pub fn last(&self) -> Option<&ClickRecord> {
        self.entries.back()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ClickRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
