//! 매칭 후보 모델.

use serde::{Deserialize, Serialize};

/// 상관 연산이 찾은 후보. 폴링 사이클 안에서 소비되거나 폐기된다.
///
/// 좌표는 프레임(관심 영역) 좌표계의 좌상단 기준이다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub x: u32,
    pub y: u32,
    /// 리샘플된 템플릿 크기
    pub width: u32,
    pub height: u32,
    /// 템플릿 리샘플 배율
    pub scale: f32,
    /// 정규화 상관 점수 [0, 1]
    pub score: f32,
    /// 템플릿 목록 내 인덱스 (우선순위)
    pub template_index: usize,
    /// 템플릿 식별자 (파일 이름)
    pub template_id: String,
}

impl MatchCandidate {
    /// 프레임 좌표계의 중심점
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// 다른 후보와 영역이 겹치는지 여부
    pub fn overlaps(&self, other: &MatchCandidate) -> bool {
        let ax2 = self.x + self.width;
        let ay2 = self.y + self.height;
        let bx2 = other.x + other.width;
        let by2 = other.y + other.height;
        self.x < bx2 && other.x < ax2 && self.y < by2 && other.y < ay2
    }
}
