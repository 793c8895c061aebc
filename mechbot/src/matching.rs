use {
    image::{DynamicImage, GrayImage, Luma, RgbaImage},
    imageproc::{
        definitions::Image,
        integral_image::{integral_image, integral_squared_image},
        template_matching::{match_template_parallel, MatchTemplateMethod},
    },
};

/// Best alignment of a template over an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Top-left corner of the best-aligned template position.
    pub x: u32,
    pub y: u32,
    /// Correlation score at that position, in [0, 1].
    pub score: f32,
}

/// Correlates a template against a captured image.
///
/// Implementations must be deterministic: the same inputs always produce the
/// same peak. `None` means the template cannot be aligned at all (it is empty,
/// larger than the image or has no contrast).
pub trait Correlator {
    fn best_match(&self, image: &RgbaImage, template: &RgbaImage) -> Option<Peak>;
}

/// Single-scale zero-mean normalized cross-correlation over luminance.
///
/// Scores are comparable across templates: 1.0 is a pixel-exact match,
/// unrelated content stays near 0 regardless of overall brightness.
/// Negative correlation is reported as 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedCrossCorrelation;

const MIN_VARIANCE: f64 = 1e-6;

impl Correlator for NormalizedCrossCorrelation {
    fn best_match(&self, image: &RgbaImage, template: &RgbaImage) -> Option<Peak> {
        let (width, height) = template.dimensions();
        if width == 0 || height == 0 || width > image.width() || height > image.height() {
            return None;
        }
        let image = luma(image);
        let template = luma(template);

        let n = f64::from(width) * f64::from(height);
        let (template_sum, template_sum_sq) = template.pixels().fold((0.0, 0.0), |(s, sq), p| {
            let v = f64::from(p.0[0]);
            (s + v, sq + v * v)
        });
        let template_variance = template_sum_sq - template_sum * template_sum / n;
        if template_variance <= MIN_VARIANCE {
            return None;
        }

        // Direct correlation: cost is image area times template area.
        let cross =
            match_template_parallel(&image, &template, MatchTemplateMethod::CrossCorrelation);
        let sums = integral_image::<_, u64>(&image);
        let squares = integral_squared_image::<_, u64>(&image);

        let mut best: Option<Peak> = None;
        for (x, y, cross) in cross.enumerate_pixels() {
            let window_sum = window(&sums, x, y, width, height);
            let window_sum_sq = window(&squares, x, y, width, height);
            let variance = window_sum_sq - window_sum * window_sum / n;
            let score = if variance > MIN_VARIANCE {
                let numerator = f64::from(cross.0[0]) - window_sum * template_sum / n;
                numerator / (variance * template_variance).sqrt()
            } else {
                0.0
            };
            let score = if score.is_finite() {
                score.clamp(0.0, 1.0) as f32
            } else {
                0.0
            };
            // Strictly greater keeps the first (top-most, left-most) peak on ties.
            if best.is_none_or(|best| score > best.score) {
                best = Some(Peak { x, y, score });
            }
        }
        best
    }
}

/// Sum over the `width`×`height` window at (`x`, `y`) from an integral image.
fn window(integral: &Image<Luma<u64>>, x: u32, y: u32, width: u32, height: u32) -> f64 {
    let at = |x, y| integral.get_pixel(x, y).0[0];
    let sum = at(x + width, y + height) + at(x, y) - at(x, y + height) - at(x + width, y);
    sum as f64
}

fn luma(image: &RgbaImage) -> GrayImage {
    DynamicImage::ImageRgba8(image.clone()).into_luma8()
}
