//! 템플릿 로드 및 리샘플.
//!
//! fast_image_resize 기반 고속 리사이즈로 스케일별 템플릿을 만든다.
//! 읽을 수 없거나 유효하지 않은 템플릿은 세션 시작 시 치명적 에러다.

use autoapprove_core::error::CoreError;
use crate::matcher::has_contrast;
use fast_image_resize::{images::Image as FirImage, ResizeAlg, ResizeOptions, Resizer};
use image::RgbaImage;
use std::path::Path;
use tracing::{debug, info};

/// 템플릿 최소 크기 (픽셀)
pub const MIN_TEMPLATE_SIDE: u32 = 4;

/// 로드된 템플릿
#[derive(Debug, Clone)]
pub struct Template {
    /// 목록 내 인덱스 (우선순위)
    pub index: usize,
    /// 식별자 (파일 이름)
    pub id: String,
    pub image: RgbaImage,
}

/// 경로 목록에서 템플릿 로드. 하나라도 실패하면 전체 실패.
///
/// `grayscale`은 상관 연산 모드와 같아야 한다. 그 모드에서 대비가 없는 템플릿은 거부된다.
pub fn load_templates<P: AsRef<Path>>(
    paths: &[P],
    grayscale: bool,
) -> Result<Vec<Template>, CoreError> {
    let templates = paths
        .iter()
        .enumerate()
        .map(|(index, path)| load_template(index, path.as_ref(), grayscale))
        .collect::<Result<Vec<_>, _>>()?;
    info!("템플릿 {}개 로드 완료", templates.len());
    Ok(templates)
}

/// 템플릿 하나 로드
pub fn load_template(index: usize, path: &Path, grayscale: bool) -> Result<Template, CoreError> {
    let invalid = |reason: String| CoreError::InvalidTemplate {
        path: path.display().to_string(),
        reason,
    };

    let image = image::open(path)
        .map_err(|e| invalid(format!("이미지 읽기 실패: {e}")))?
        .to_rgba8();

    validate_template(&image, grayscale).map_err(invalid)?;

    let id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("template-{index}"));

    debug!("템플릿 로드: {id} {}x{}", image.width(), image.height());
    Ok(Template { index, id, image })
}

/// 템플릿 유효성 검사: 최소 크기, 사용할 평면의 대비
///
/// 그레이스케일 모드는 밝기 평면만, 컬러 모드는 RGB 중 하나라도 대비가 있어야 한다.
pub fn validate_template(image: &RgbaImage, grayscale: bool) -> Result<(), String> {
    let (w, h) = image.dimensions();
    if w < MIN_TEMPLATE_SIDE || h < MIN_TEMPLATE_SIDE {
        return Err(format!(
            "크기가 너무 작음: {w}x{h} (최소 {MIN_TEMPLATE_SIDE}x{MIN_TEMPLATE_SIDE})"
        ));
    }
    if !has_contrast(image, grayscale) {
        let reason = if grayscale {
            "밝기가 균일한 이미지는 그레이스케일 상관 연산에 사용할 수 없음"
        } else {
            "단색 이미지는 상관 연산에 사용할 수 없음"
        };
        return Err(reason.to_string());
    }
    Ok(())
}

/// 배율에 맞춰 리샘플. 배율 1.0이면 복제한다.
pub fn resample(image: &RgbaImage, scale: f32) -> Result<RgbaImage, CoreError> {
    let (src_w, src_h) = image.dimensions();
    let width = ((src_w as f32) * scale).round().max(1.0) as u32;
    let height = ((src_h as f32) * scale).round().max(1.0) as u32;
    resize_rgba(image, width, height)
}

/// 고속 리사이즈 (바이리니어)
pub fn resize_rgba(image: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage, CoreError> {
    let (src_w, src_h) = image.dimensions();

    if src_w == width && src_h == height {
        return Ok(image.clone());
    }
    if src_w == 0 || src_h == 0 {
        return Err(CoreError::Internal("소스 이미지 크기 0".to_string()));
    }
    if width == 0 || height == 0 {
        return Err(CoreError::Internal("목표 이미지 크기 0".to_string()));
    }

    let src_image = FirImage::from_vec_u8(
        src_w,
        src_h,
        image.as_raw().clone(),
        fast_image_resize::PixelType::U8x4,
    )
    .map_err(|e| CoreError::Internal(format!("소스 이미지 생성 실패: {e}")))?;

    let mut dst_image = FirImage::new(width, height, fast_image_resize::PixelType::U8x4);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(
        fast_image_resize::FilterType::Bilinear,
    ));

    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| CoreError::Internal(format!("리사이즈 실패: {e}")))?;

    RgbaImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| CoreError::Internal("결과 이미지 생성 실패".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    #[test]
    fn load_valid_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("approve.png");
        checker(32, 16).save(&path).unwrap();

        let templates = load_templates(&[path], true).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].id, "approve.png");
        assert_eq!(templates[0].image.dimensions(), (32, 16));
    }

    #[test]
    fn missing_template_is_invalid() {
        let result = load_templates(&["/nonexistent/approve.png"], true);
        assert!(matches!(result, Err(CoreError::InvalidTemplate { .. })));
    }

    #[test]
    fn garbage_file_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        let err = load_template(0, &path, true).unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn flat_template_rejected() {
        let flat = RgbaImage::from_pixel(16, 16, Rgba([120, 120, 120, 255]));
        assert!(validate_template(&flat, true).is_err());
        assert!(validate_template(&flat, false).is_err());
        assert!(validate_template(&RgbaImage::new(2, 2), true).is_err());
        assert!(validate_template(&checker(8, 8), true).is_ok());
    }

    #[test]
    fn constant_luma_rejected_only_in_grayscale() {
        // 두 색의 밝기(0.299R + 0.587G + 0.114B)가 모두 100
        let hues = RgbaImage::from_fn(16, 16, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgba([100, 100, 100, 255])
            } else {
                Rgba([85, 109, 93, 255])
            }
        });
        assert!(validate_template(&hues, true).is_err());
        assert!(validate_template(&hues, false).is_ok());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hue.png");
        hues.save(&path).unwrap();
        assert!(matches!(
            load_templates(&[&path], true),
            Err(CoreError::InvalidTemplate { .. })
        ));
        assert_eq!(load_templates(&[&path], false).unwrap().len(), 1);
    }

    #[test]
    fn resample_scales_dimensions() {
        let img = checker(40, 20);
        let up = resample(&img, 1.25).unwrap();
        assert_eq!(up.dimensions(), (50, 25));
        let down = resample(&img, 0.8).unwrap();
        assert_eq!(down.dimensions(), (32, 16));
        let same = resample(&img, 1.0).unwrap();
        assert_eq!(same, img);
    }
}
