//! 상관 엔진: 다중 스케일 템플릿 매칭.
//!
//! 영평균 정규화 상호상관(ZNCC)을 적분 영상으로 계산한다. 템플릿이 충분히 크면
//! 축소 피라미드에서 후보 위치를 찾은 뒤 원본 해상도에서 주변만 정밀 탐색한다.
//! 행 단위로 rayon 병렬 처리하며, 호출 스레드의 rayon 풀을 그대로 사용한다.
//!
//! 점수는 `max(0, zncc)`로 [0, 1]에 정규화된다. 음의 상관은 0이다.

use autoapprove_core::config::{MatchingConfig, MergePolicy};
use autoapprove_core::error::CoreError;
use autoapprove_core::models::candidate::MatchCandidate;
use autoapprove_core::models::frame::Frame;
use image::RgbaImage;
use rayon::prelude::*;
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::template::{resample, validate_template, Template};

/// 분산이 이 값(픽셀당) 이하면 평탄 영역으로 보고 점수 0
const FLAT_VARIANCE: f64 = 1e-6;

/// 피라미드 축소 후 템플릿 짧은 변의 목표 크기
const COARSE_TARGET_SIDE: u32 = 12;

/// 피라미드 최대 축소 배율
const MAX_PYRAMID_FACTOR: u32 = 4;

/// 축소 단계 후보 최소 개수
const MIN_COARSE_PEAKS: usize = 16;

// ============================================================
// 평면 / 적분 영상
// ============================================================

#[derive(Debug, Clone, Copy)]
enum Channel {
    Luma,
    Red,
    Green,
    Blue,
}

/// 단일 채널 f32 평면
#[derive(Debug, Clone)]
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_rgba(image: &RgbaImage, channel: Channel) -> Self {
        let data = image
            .pixels()
            .map(|p| {
                let [r, g, b, _] = p.0;
                match channel {
                    Channel::Luma => 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32,
                    Channel::Red => r as f32,
                    Channel::Green => g as f32,
                    Channel::Blue => b as f32,
                }
            })
            .collect();
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data,
        }
    }

    /// f×f 블록 평균으로 축소 (나머지 픽셀은 버림)
    fn downsample(&self, factor: usize) -> Self {
        if factor <= 1 {
            return self.clone();
        }
        let width = self.width / factor;
        let height = self.height / factor;
        let area = (factor * factor) as f32;
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let mut acc = 0.0f32;
                for dy in 0..factor {
                    let row = (y * factor + dy) * self.width + x * factor;
                    acc += self.data[row..row + factor].iter().sum::<f32>();
                }
                data.push(acc / area);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }
}

fn planes_of(image: &RgbaImage, grayscale: bool) -> Vec<Plane> {
    if grayscale {
        vec![Plane::from_rgba(image, Channel::Luma)]
    } else {
        [Channel::Red, Channel::Green, Channel::Blue]
            .into_iter()
            .map(|c| Plane::from_rgba(image, c))
            .collect()
    }
}

/// 합 / 제곱합 적분 영상
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(plane: &Plane) -> Self {
        let stride = plane.width + 1;
        let len = stride * (plane.height + 1);
        let mut sum = vec![0.0f64; len];
        let mut sq = vec![0.0f64; len];
        for y in 0..plane.height {
            let mut row_sum = 0.0f64;
            let mut row_sq = 0.0f64;
            for x in 0..plane.width {
                let v = plane.data[y * plane.width + x] as f64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq[idx] = sq[idx - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    /// (x, y, w, h) 창의 (합, 제곱합)
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let a = y * self.stride + x;
        let b = a + w;
        let c = (y + h) * self.stride + x;
        let d = c + w;
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

/// 검색 대상 영상 (채널별 평면 + 적분 영상)
struct SearchImage {
    planes: Vec<Plane>,
    integrals: Vec<Integral>,
}

impl SearchImage {
    fn new(planes: Vec<Plane>) -> Self {
        let integrals = planes.iter().map(Integral::new).collect();
        Self { planes, integrals }
    }

    fn width(&self) -> usize {
        self.planes.first().map(|p| p.width).unwrap_or(0)
    }

    fn height(&self) -> usize {
        self.planes.first().map(|p| p.height).unwrap_or(0)
    }

    fn downsample(&self, factor: usize) -> Self {
        Self::new(self.planes.iter().map(|p| p.downsample(factor)).collect())
    }

    /// 전체 영상이 평탄(빈 화면)한지 여부
    fn is_blank(&self) -> bool {
        let (w, h) = (self.width(), self.height());
        if w == 0 || h == 0 {
            return true;
        }
        let n = (w * h) as f64;
        self.integrals.iter().all(|integral| {
            let (s, sq) = integral.window(0, 0, w, h);
            sq - s * s / n <= FLAT_VARIANCE * n
        })
    }
}

/// 평균을 뺀 템플릿 평면
#[derive(Debug, Clone)]
struct TemplatePlane {
    width: usize,
    height: usize,
    centered: Vec<f32>,
    norm: f64,
}

impl TemplatePlane {
    fn new(plane: &Plane) -> Self {
        let n = plane.data.len().max(1) as f64;
        let mean = plane.data.iter().map(|v| *v as f64).sum::<f64>() / n;
        let centered: Vec<f32> = plane.data.iter().map(|v| (*v as f64 - mean) as f32).collect();
        let norm = centered
            .iter()
            .map(|v| (*v as f64) * (*v as f64))
            .sum::<f64>()
            .sqrt();
        Self {
            width: plane.width,
            height: plane.height,
            centered,
            norm,
        }
    }

    fn is_flat(&self) -> bool {
        let n = (self.width * self.height).max(1) as f64;
        self.norm * self.norm <= FLAT_VARIANCE * n
    }
}

/// 해당 모드의 평면 중 하나라도 대비가 있는지
pub(crate) fn has_contrast(image: &RgbaImage, grayscale: bool) -> bool {
    planes_of(image, grayscale)
        .iter()
        .any(|p| !TemplatePlane::new(p).is_flat())
}

/// (x, y) 위치의 채널 평균 ZNCC, [0, 1]로 클램프
///
/// 템플릿이 평탄한 채널은 평균에서 빠진다. 창만 평탄한 채널은 0으로 계산된다.
fn score_at(image: &SearchImage, template: &[TemplatePlane], x: usize, y: usize) -> f32 {
    let mut total = 0.0f64;
    let mut channels = 0usize;
    for ((plane, integral), tpl) in image.planes.iter().zip(&image.integrals).zip(template) {
        if tpl.is_flat() {
            continue;
        }
        channels += 1;
        let (tw, th) = (tpl.width, tpl.height);
        let n = (tw * th) as f64;
        let (s, sq) = integral.window(x, y, tw, th);
        let variance = sq - s * s / n;
        if variance <= FLAT_VARIANCE * n {
            continue;
        }
        let mut cross = 0.0f64;
        for ty in 0..th {
            let start = (y + ty) * plane.width + x;
            let row = &plane.data[start..start + tw];
            let trow = &tpl.centered[ty * tw..(ty + 1) * tw];
            cross += row.iter().zip(trow).map(|(a, b)| a * b).sum::<f32>() as f64;
        }
        total += cross / (variance.sqrt() * tpl.norm);
    }
    if channels == 0 {
        return 0.0;
    }
    let mean = total / channels as f64;
    (mean as f32).clamp(0.0, 1.0)
}

// ============================================================
// 점수 맵 / 피크
// ============================================================

struct ScoreMap {
    width: usize,
    data: Vec<f32>,
}

/// 모든 위치의 점수를 행 단위 병렬로 계산. 행마다 취소를 확인한다.
fn dense_scores(
    image: &SearchImage,
    template: &[TemplatePlane],
    is_cancelled: &(dyn Fn() -> bool + Sync),
) -> Result<Option<ScoreMap>, CoreError> {
    let (tw, th) = match template.first() {
        Some(t) => (t.width, t.height),
        None => return Ok(None),
    };
    let (iw, ih) = (image.width(), image.height());
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return Ok(None);
    }
    let width = iw - tw + 1;
    let height = ih - th + 1;

    let rows: Vec<Option<Vec<f32>>> = (0..height)
        .into_par_iter()
        .map(|y| {
            if is_cancelled() {
                return None;
            }
            Some((0..width).map(|x| score_at(image, template, x, y)).collect())
        })
        .collect();

    let mut data = Vec::with_capacity(width * height);
    for row in rows {
        data.extend(row.ok_or_else(cancelled)?);
    }
    Ok(Some(ScoreMap { width, data }))
}

fn cancelled() -> CoreError {
    CoreError::CorrelationFailed("상관 연산 취소됨".to_string())
}

/// 점수 내림차순 비교 (동점이면 위치 순서로 결정적 정렬)
fn by_score_desc(a: &(usize, usize, f32), b: &(usize, usize, f32)) -> Ordering {
    b.2.total_cmp(&a.2)
        .then_with(|| a.1.cmp(&b.1))
        .then_with(|| a.0.cmp(&b.0))
}

/// 임계값 이상 위치를 점수순으로 고르고 win_w×win_h 창 안의 중복을 억제한다.
fn select_peaks(
    mut points: Vec<(usize, usize, f32)>,
    win_w: usize,
    win_h: usize,
    limit: usize,
) -> Vec<(usize, usize, f32)> {
    points.sort_by(by_score_desc);
    let mut kept: Vec<(usize, usize, f32)> = Vec::new();
    for p in points {
        if kept.len() >= limit {
            break;
        }
        let overlaps = kept
            .iter()
            .any(|k| k.0.abs_diff(p.0) < win_w && k.1.abs_diff(p.1) < win_h);
        if !overlaps {
            kept.push(p);
        }
    }
    kept
}

fn threshold_points(map: &ScoreMap, floor: f32) -> Vec<(usize, usize, f32)> {
    map.data
        .iter()
        .enumerate()
        .filter(|(_, s)| **s >= floor)
        .map(|(i, s)| (i % map.width, i / map.width, *s))
        .collect()
}

// ============================================================
// 준비된 템플릿
// ============================================================

/// 특정 배율로 리샘플되어 상관 연산 준비가 끝난 템플릿
struct ScaledTemplate {
    template_index: usize,
    template_id: String,
    scale: f32,
    width: u32,
    height: u32,
    full: Vec<TemplatePlane>,
    /// (축소 배율, 축소 평면). 템플릿이 작으면 `None`
    coarse: Option<(usize, Vec<TemplatePlane>)>,
}

fn pyramid_factor(width: u32, height: u32) -> u32 {
    (width.min(height) / COARSE_TARGET_SIDE).clamp(1, MAX_PYRAMID_FACTOR)
}

impl ScaledTemplate {
    fn prepare(template: &Template, scale: f32, grayscale: bool) -> Result<Option<Self>, CoreError> {
        let image = resample(&template.image, scale)?;
        if let Err(reason) = validate_template(&image, grayscale) {
            warn!(
                "템플릿 {} 배율 {scale} 건너뜀: {reason}",
                template.id
            );
            return Ok(None);
        }

        let planes = planes_of(&image, grayscale);
        let full: Vec<TemplatePlane> = planes.iter().map(TemplatePlane::new).collect();
        let factor = pyramid_factor(image.width(), image.height()) as usize;
        let coarse = (factor > 1).then(|| {
            let coarse: Vec<TemplatePlane> = planes
                .iter()
                .map(|p| TemplatePlane::new(&p.downsample(factor)))
                .collect();
            (factor, coarse)
        });

        Ok(Some(Self {
            template_index: template.index,
            template_id: template.id.clone(),
            scale,
            width: image.width(),
            height: image.height(),
            full,
            coarse,
        }))
    }

    fn candidate(&self, x: usize, y: usize, score: f32) -> MatchCandidate {
        MatchCandidate {
            x: x as u32,
            y: y as u32,
            width: self.width,
            height: self.height,
            scale: self.scale,
            score,
            template_index: self.template_index,
            template_id: self.template_id.clone(),
        }
    }
}

// ============================================================
// 상관 엔진
// ============================================================

/// 상관 엔진. 세션 시작 시 한 번 준비되고 이후 프레임마다 재사용된다.
pub struct CorrelationEngine {
    variants: Vec<ScaledTemplate>,
    threshold: f32,
    grayscale: bool,
    max_candidates: usize,
    merge_policy: MergePolicy,
}

impl CorrelationEngine {
    /// 템플릿을 스케일별로 리샘플해 준비한다.
    pub fn new(templates: &[Template], config: &MatchingConfig) -> Result<Self, CoreError> {
        if templates.is_empty() {
            return Err(CoreError::Config("템플릿이 없습니다".to_string()));
        }

        let scales = config.effective_scales();
        let mut variants = Vec::new();
        for template in templates {
            let before = variants.len();
            for &scale in &scales {
                if let Some(v) = ScaledTemplate::prepare(template, scale, config.grayscale)? {
                    variants.push(v);
                }
            }
            if variants.len() == before {
                return Err(CoreError::InvalidTemplate {
                    path: template.id.clone(),
                    reason: "사용 가능한 스케일이 없음".to_string(),
                });
            }
        }

        debug!(
            "상관 엔진 준비: 템플릿 {}개, 변형 {}개, 임계값 {}",
            templates.len(),
            variants.len(),
            config.threshold
        );

        Ok(Self {
            variants,
            threshold: config.threshold,
            grayscale: config.grayscale,
            max_candidates: config.max_candidates.max(1),
            merge_policy: config.merge_policy,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 프레임에서 후보 검색. 점수 내림차순, 빈 결과 가능.
    pub fn find(
        &self,
        frame: &Frame,
        is_cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Vec<MatchCandidate>, CoreError> {
        self.find_in_image(&frame.image, is_cancelled)
    }

    /// 이미지에서 후보 검색. 빈(평탄) 이미지는 에러 없이 빈 결과를 돌려준다.
    pub fn find_in_image(
        &self,
        image: &RgbaImage,
        is_cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Vec<MatchCandidate>, CoreError> {
        if is_cancelled() {
            return Err(cancelled());
        }
        let search = SearchImage::new(planes_of(image, self.grayscale));
        if search.is_blank() {
            debug!("빈 프레임: 상관 연산 생략");
            return Ok(Vec::new());
        }

        let mut coarse_images: Vec<(usize, SearchImage)> = Vec::new();
        let mut found = Vec::new();

        for variant in &self.variants {
            if is_cancelled() {
                return Err(cancelled());
            }
            let hits = match &variant.coarse {
                None => self.search_dense(&search, variant, is_cancelled)?,
                Some((factor, coarse_tpl)) => {
                    let coarse_image = match coarse_images.iter().position(|(f, _)| f == factor) {
                        Some(i) => &coarse_images[i].1,
                        None => {
                            coarse_images.push((*factor, search.downsample(*factor)));
                            &coarse_images[coarse_images.len() - 1].1
                        }
                    };
                    self.search_pyramid(
                        &search,
                        coarse_image,
                        *factor,
                        coarse_tpl,
                        variant,
                        is_cancelled,
                    )?
                }
            };
            found.extend(hits);
        }

        let merged = merge_candidates(found, self.threshold, self.merge_policy, self.max_candidates);
        if let Some(best) = merged.first() {
            debug!(
                score = best.score,
                scale = best.scale,
                template = %best.template_id,
                "후보 {}개",
                merged.len()
            );
        }
        Ok(merged)
    }

    fn search_dense(
        &self,
        search: &SearchImage,
        variant: &ScaledTemplate,
        is_cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Vec<MatchCandidate>, CoreError> {
        let Some(map) = dense_scores(search, &variant.full, is_cancelled)? else {
            return Ok(Vec::new());
        };
        let peaks = select_peaks(
            threshold_points(&map, self.threshold),
            variant.width as usize,
            variant.height as usize,
            self.max_candidates,
        );
        Ok(peaks
            .into_iter()
            .map(|(x, y, s)| variant.candidate(x, y, s))
            .collect())
    }

    fn search_pyramid(
        &self,
        search: &SearchImage,
        coarse_image: &SearchImage,
        factor: usize,
        coarse_tpl: &[TemplatePlane],
        variant: &ScaledTemplate,
        is_cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Vec<MatchCandidate>, CoreError> {
        let Some(coarse_map) = dense_scores(coarse_image, coarse_tpl, is_cancelled)? else {
            return self.search_dense(search, variant, is_cancelled);
        };

        let (tw, th) = (variant.width as usize, variant.height as usize);
        let max_x = search.width().saturating_sub(tw);
        let max_y = search.height().saturating_sub(th);

        // 축소 단계는 느슨한 하한으로 상위 피크만 고른다
        let coarse_floor = self.threshold * 0.5;
        let coarse_peaks = select_peaks(
            threshold_points(&coarse_map, coarse_floor),
            (tw / factor).max(1),
            (th / factor).max(1),
            (self.max_candidates * 4).max(MIN_COARSE_PEAKS),
        );

        let refined: Vec<(usize, usize, f32)> = coarse_peaks
            .par_iter()
            .filter_map(|&(cx, cy, _)| {
                if is_cancelled() {
                    return None;
                }
                let (fx, fy) = (cx * factor, cy * factor);
                let xs = fx.saturating_sub(factor)..=(fx + factor).min(max_x);
                let ys = fy.saturating_sub(factor)..=(fy + factor).min(max_y);
                let mut best: Option<(usize, usize, f32)> = None;
                for y in ys {
                    for x in xs.clone() {
                        let s = score_at(search, &variant.full, x, y);
                        if best.map_or(true, |b| s > b.2) {
                            best = Some((x, y, s));
                        }
                    }
                }
                best.filter(|b| b.2 >= self.threshold)
            })
            .collect();

        if is_cancelled() {
            return Err(cancelled());
        }

        Ok(select_peaks(refined, tw, th, self.max_candidates)
            .into_iter()
            .map(|(x, y, s)| variant.candidate(x, y, s))
            .collect())
    }
}

/// 설정으로 엔진을 만들어 한 번 검색하는 편의 함수 (취소 없음)
pub fn match_templates(
    image: &RgbaImage,
    templates: &[Template],
    config: &MatchingConfig,
) -> Result<Vec<MatchCandidate>, CoreError> {
    CorrelationEngine::new(templates, config)?.find_in_image(image, &|| false)
}

// ============================================================
// 병합
// ============================================================

fn scale_deviation(c: &MatchCandidate) -> f32 {
    (c.scale - 1.0).abs()
}

/// 최종 순서: 점수 내림차순 → 배율 편차 오름차순 → 템플릿 순서
fn final_order(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| scale_deviation(a).total_cmp(&scale_deviation(b)))
        .then_with(|| a.template_index.cmp(&b.template_index))
}

/// 임계값 필터 → 겹침 억제(정책 순서) → 점수순 정렬 → 상위 `limit`개
pub(crate) fn merge_candidates(
    candidates: Vec<MatchCandidate>,
    threshold: f32,
    policy: MergePolicy,
    limit: usize,
) -> Vec<MatchCandidate> {
    let mut pool: Vec<MatchCandidate> = candidates
        .into_iter()
        .filter(|c| c.score >= threshold)
        .collect();

    match policy {
        MergePolicy::PriorityThenScore => pool.sort_by(|a, b| {
            a.template_index
                .cmp(&b.template_index)
                .then_with(|| final_order(a, b))
        }),
        MergePolicy::ScoreThenPriority => pool.sort_by(final_order),
    }

    let mut kept: Vec<MatchCandidate> = Vec::new();
    for c in pool {
        if !kept.iter().any(|k| k.overlaps(&c)) {
            kept.push(c);
        }
    }

    kept.sort_by(final_order);
    kept.truncate(limit);
    kept
}
