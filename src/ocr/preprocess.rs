//! Image preprocessing.
//!
//! Two consumers:
//! - the ddddocr model wants a single-channel float tensor, height 64,
//!   width scaled to keep the aspect ratio, values in [-1, 1];
//! - platform OCR (Vision) reads noisy captchas better after binarization,
//!   so the fallback path tries several black-on-white variants.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma};
use ndarray::Array4;

use crate::error::OcrError;

const BLACK: Luma<u8> = Luma([0]);
const WHITE: Luma<u8> = Luma([255]);

/// Window size for the local-mean threshold in `Binarization::Enhanced`.
const LOCAL_BLOCK: u32 = 15;
const LOCAL_FACTOR: f32 = 0.85;
const SIMPLE_THRESHOLD: u8 = 128;

/// Colour-extract quantization: 32 levels per channel.
const QUANT_STEP: u8 = 32;
const DARK_COLOR_LIMIT: usize = 5;
const DARK_BRIGHTNESS: u32 = 180;
/// A colour must cover more than this share of the image to count as ink.
const DARK_MIN_SHARE: f64 = 0.005;
const COLOR_TOLERANCE: i32 = 50;

/// Runs shorter than this survive `remove_thin_lines`.
const MIN_LINE_LENGTH: u32 = 6;

/// ITU-R BT.601 luma, the weighting ddddocr was trained with.
fn luma_bt601([r, g, b]: [u8; 3]) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Convert to 8-bit grayscale with BT.601 weights, truncating.
pub fn grayscale(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let gray = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
        Luma([gray as u8])
    })
}

/// Width after scaling to `target_height`, never below 1.
pub fn scaled_width(width: u32, height: u32, target_height: u32) -> u32 {
    if height == 0 {
        return 1;
    }
    let scale = target_height as f32 / height as f32;
    ((width as f32 * scale) as u32).max(1)
}

/// Build the `[1, 1, H, W]` model input.
pub fn model_input(image: &DynamicImage, target_height: u32) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let target_width = scaled_width(width, height, target_height);
    let resized = image::imageops::resize(
        &image.to_rgb8(),
        target_width,
        target_height,
        FilterType::Triangle,
    );

    let mut input = Array4::<f32>::zeros((1, 1, target_height as usize, target_width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let gray = luma_bt601(pixel.0);
        input[[0, 0, y as usize, x as usize]] = (gray / 255.0 - 0.5) / 0.5;
    }
    input
}

/// Otsu's threshold: maximizes between-class variance of the histogram.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &n)| i as f64 * n as f64)
        .sum();

    let mut sum_background = 0.0;
    let mut weight_background = 0u64;
    let mut best_variance = 0.0;
    let mut threshold = 0u8;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0 {
            break;
        }
        sum_background += t as f64 * count as f64;

        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum - sum_background) / weight_foreground as f64;
        let diff = mean_background - mean_foreground;
        let variance = weight_background as f64 * weight_foreground as f64 * diff * diff;

        if variance > best_variance {
            best_variance = variance;
            threshold = t as u8;
        }
    }
    threshold
}

fn binarize(gray: &GrayImage, is_ink: impl Fn(u8) -> bool) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if is_ink(gray.get_pixel(x, y).0[0]) {
            BLACK
        } else {
            WHITE
        }
    })
}

/// Pixels at or below `level` become black, the rest white.
pub fn threshold(gray: &GrayImage, level: u8) -> GrayImage {
    binarize(gray, |v| v <= level)
}

fn is_black(image: &GrayImage, x: u32, y: u32) -> bool {
    image.get_pixel(x, y).0[0] == 0
}

/// 3×3 neighbourhood clipped to the image bounds.
fn neighbours(width: u32, height: u32, x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> {
    let xs = x.saturating_sub(1)..=(x + 1).min(width - 1);
    let ys = y.saturating_sub(1)..=(y + 1).min(height - 1);
    ys.flat_map(move |ny| xs.clone().map(move |nx| (nx, ny)))
}

/// Shrink black strokes: a pixel stays black only if its whole 3×3
/// neighbourhood is black.
pub fn erode(binary: &GrayImage) -> GrayImage {
    let (w, h) = binary.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        if neighbours(w, h, x, y).all(|(nx, ny)| is_black(binary, nx, ny)) {
            BLACK
        } else {
            WHITE
        }
    })
}

/// Grow black strokes: a pixel becomes black if any 3×3 neighbour is black.
pub fn dilate(binary: &GrayImage) -> GrayImage {
    let (w, h) = binary.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        if neighbours(w, h, x, y).any(|(nx, ny)| is_black(binary, nx, ny)) {
            BLACK
        } else {
            WHITE
        }
    })
}

/// Morphological opening (erode then dilate); removes isolated specks.
pub fn open(binary: &GrayImage) -> GrayImage {
    dilate(&erode(binary))
}

/// Linear histogram stretch to the full 0..=255 range.
pub fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if max <= min {
        return gray.clone();
    }
    let range = (max - min) as u32;
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = (gray.get_pixel(x, y).0[0] - min) as u32;
        Luma([(v * 255 / range) as u8])
    })
}

/// Threshold each pixel against `factor` × the mean of its `block`×`block`
/// window (clipped at the borders). Uses a summed-area table.
pub fn local_mean_threshold(gray: &GrayImage, block: u32, factor: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut integral = vec![0u64; stride * (h + 1) as usize];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let i = (y + 1) as usize * stride + (x + 1) as usize;
            integral[i] = integral[i - stride] + row_sum;
        }
    }

    let half = block / 2;
    GrayImage::from_fn(w, h, |x, y| {
        let x0 = x.saturating_sub(half) as usize;
        let y0 = y.saturating_sub(half) as usize;
        let x1 = (x + half + 1).min(w) as usize;
        let y1 = (y + half + 1).min(h) as usize;
        let area = ((x1 - x0) * (y1 - y0)) as u64;
        let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
            - integral[y0 * stride + x1]
            - integral[y1 * stride + x0];
        let mean = sum / area;
        let local = (mean as f32 * factor) as u32;
        if (gray.get_pixel(x, y).0[0] as u32) < local {
            BLACK
        } else {
            WHITE
        }
    })
}

fn quantize([r, g, b]: [u8; 3]) -> usize {
    let q = |c: u8| (c / QUANT_STEP) as usize;
    (q(r) << 10) | (q(g) << 5) | q(b)
}

/// Representative colour of a quantized bucket (its lower corner).
fn bucket_color(key: usize) -> [i32; 3] {
    let channel = |shift: usize| ((key >> shift) & 0x1F) as i32 * QUANT_STEP as i32;
    [channel(10), channel(5), channel(0)]
}

/// Keep pixels close to one of the dominant dark colours.
///
/// Colours are bucketed at 32 levels per channel. Up to five buckets that
/// are darker than 180 on average and cover more than 0.5% of the image
/// are taken as ink; any pixel within ±50 per channel of one of them turns
/// black. Ties in frequency keep first-seen order.
pub fn extract_dark_colors(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let mut counts = vec![0u32; 1 << 15];
    let mut seen = Vec::new();
    for pixel in rgb.pixels() {
        let key = quantize(pixel.0);
        if counts[key] == 0 {
            seen.push(key);
        }
        counts[key] += 1;
    }

    let min_count = rgb.width() as f64 * rgb.height() as f64 * DARK_MIN_SHARE;
    let mut dark: Vec<usize> = seen
        .into_iter()
        .filter(|&key| {
            let [r, g, b] = bucket_color(key);
            ((r + g + b) / 3) < DARK_BRIGHTNESS as i32 && f64::from(counts[key]) > min_count
        })
        .collect();
    dark.sort_by(|a, b| counts[*b].cmp(&counts[*a]));
    dark.truncate(DARK_COLOR_LIMIT);
    let targets: Vec<[i32; 3]> = dark.into_iter().map(bucket_color).collect();
    log::debug!("[Preprocess] Ink colours: {:?}", targets);

    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0.map(i32::from);
        let is_ink = targets.iter().any(|[tr, tg, tb]| {
            (r - tr).abs() < COLOR_TOLERANCE
                && (g - tg).abs() < COLOR_TOLERANCE
                && (b - tb).abs() < COLOR_TOLERANCE
        });
        if is_ink {
            BLACK
        } else {
            WHITE
        }
    })
}

/// Flip isolated pixels, judged on the 3×3 window including the pixel
/// itself: black with at most 2 black pixels turns white, white with at
/// least 7 turns black. The one-pixel border is left as is.
pub fn remove_specks(binary: &GrayImage) -> GrayImage {
    let (w, h) = binary.dimensions();
    let mut out = binary.clone();
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let blacks = neighbours(w, h, x, y)
                .filter(|&(nx, ny)| is_black(binary, nx, ny))
                .count();
            let pixel = binary.get_pixel(x, y).0[0];
            if pixel == 0 && blacks <= 2 {
                out.put_pixel(x, y, WHITE);
            } else if pixel == 255 && blacks >= 7 {
                out.put_pixel(x, y, BLACK);
            }
        }
    }
    out
}

/// Erase one-pixel-thick horizontal and vertical runs of at least
/// `MIN_LINE_LENGTH` pixels that touch nothing across their direction.
///
/// Rows are scanned against the input; columns are then scanned against
/// the row-cleaned result. The outermost rows (and columns) are not
/// scanned.
pub fn remove_thin_lines(binary: &GrayImage) -> GrayImage {
    let (w, h) = binary.dimensions();
    let mut out = binary.clone();

    let isolated_in_row = |img: &GrayImage, x: u32, y: u32| {
        !is_black(img, x, y - 1) && !is_black(img, x, y + 1)
    };
    for y in 1..h.saturating_sub(1) {
        for x in 0..w {
            if !is_black(binary, x, y) || !isolated_in_row(binary, x, y) {
                continue;
            }
            let mut end = x + 1;
            while end < w && is_black(binary, end, y) && isolated_in_row(binary, end, y) {
                end += 1;
            }
            if end - x >= MIN_LINE_LENGTH {
                for lx in x..end {
                    out.put_pixel(lx, y, WHITE);
                }
            }
        }
    }

    let isolated_in_column = |img: &GrayImage, x: u32, y: u32| {
        !is_black(img, x - 1, y) && !is_black(img, x + 1, y)
    };
    for x in 1..w.saturating_sub(1) {
        for y in 0..h {
            if !is_black(&out, x, y) || !isolated_in_column(&out, x, y) {
                continue;
            }
            let mut end = y + 1;
            while end < h && is_black(&out, x, end) && isolated_in_column(&out, x, end) {
                end += 1;
            }
            if end - y >= MIN_LINE_LENGTH {
                for ly in y..end {
                    out.put_pixel(x, ly, WHITE);
                }
            }
        }
    }
    out
}

/// Binarization variants tried by the platform OCR fallback, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binarization {
    /// Otsu threshold followed by an opening.
    Adaptive,
    /// Dominant dark colours as ink, then speck removal.
    ColorExtract,
    /// Contrast stretch, local-mean threshold, thin line removal.
    Enhanced,
    /// Fixed mid-gray threshold.
    Simple,
}

impl Binarization {
    pub const ALL: [Binarization; 4] = [
        Binarization::Adaptive,
        Binarization::ColorExtract,
        Binarization::Enhanced,
        Binarization::Simple,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Binarization::Adaptive => "adaptive",
            Binarization::ColorExtract => "color_extract",
            Binarization::Enhanced => "enhanced",
            Binarization::Simple => "simple",
        }
    }

    pub fn apply(self, image: &DynamicImage) -> GrayImage {
        match self {
            Binarization::Adaptive => {
                let gray = grayscale(image);
                let t = otsu_threshold(&gray);
                log::debug!("[Preprocess] Otsu threshold: {}", t);
                open(&threshold(&gray, t))
            }
            Binarization::ColorExtract => remove_specks(&extract_dark_colors(image)),
            Binarization::Enhanced => {
                let stretched = stretch_contrast(&grayscale(image));
                remove_thin_lines(&local_mean_threshold(&stretched, LOCAL_BLOCK, LOCAL_FACTOR))
            }
            Binarization::Simple => binarize(&grayscale(image), |v| v < SIMPLE_THRESHOLD),
        }
    }
}

/// Encode a grayscale image as PNG bytes.
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// White canvas with a dark rectangle in the middle.
    fn sample_image(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([240, 240, 240]));
        for y in height / 4..height * 3 / 4 {
            for x in width / 4..width * 3 / 4 {
                img.put_pixel(x, y, Rgb([20, 30, 40]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn model_input_keeps_aspect_ratio() {
        let input = model_input(&sample_image(120, 40), 64);
        assert_eq!(input.shape(), &[1, 1, 64, 192]);
    }

    #[test]
    fn model_input_values_are_normalized() {
        let input = model_input(&sample_image(120, 40), 64);
        assert!(input.iter().all(|v| (-1.0..=1.0).contains(v)));
        // Corner is the light background, center is the dark box.
        assert!(input[[0, 0, 0, 0]] > 0.8);
        assert!(input[[0, 0, 32, 96]] < -0.7);
    }

    #[test]
    fn scaled_width_never_zero() {
        assert_eq!(scaled_width(1, 1000, 64), 1);
        assert_eq!(scaled_width(100, 0, 64), 1);
        assert_eq!(scaled_width(100, 50, 64), 128);
    }

    #[test]
    fn otsu_separates_two_levels() {
        let gray = grayscale(&sample_image(40, 40));
        let t = otsu_threshold(&gray);
        let dark = gray.get_pixel(20, 20).0[0];
        let light = gray.get_pixel(0, 0).0[0];
        assert!(dark <= t && t < light, "dark={dark} t={t} light={light}");
    }

    #[test]
    fn opening_removes_isolated_speck() {
        let mut binary = GrayImage::from_pixel(9, 9, WHITE);
        binary.put_pixel(4, 4, BLACK);
        let opened = open(&binary);
        assert!(opened.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn opening_keeps_solid_block() {
        let mut binary = GrayImage::from_pixel(12, 12, WHITE);
        for y in 3..9 {
            for x in 3..9 {
                binary.put_pixel(x, y, BLACK);
            }
        }
        let opened = open(&binary);
        assert_eq!(opened.get_pixel(5, 5).0[0], 0);
        assert_eq!(opened.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn stretch_contrast_spans_full_range() {
        let mut gray = GrayImage::from_pixel(4, 1, Luma([100]));
        gray.put_pixel(3, 0, Luma([150]));
        let stretched = stretch_contrast(&gray);
        assert_eq!(stretched.get_pixel(0, 0).0[0], 0);
        assert_eq!(stretched.get_pixel(3, 0).0[0], 255);
    }

    #[test]
    fn every_binarization_is_black_and_white() {
        let image = sample_image(60, 30);
        for strategy in Binarization::ALL {
            let out = strategy.apply(&image);
            assert_eq!(out.dimensions(), (60, 30), "{}", strategy.name());
            assert!(
                out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255),
                "{} produced gray pixels",
                strategy.name()
            );
            assert_eq!(out.get_pixel(30, 15).0[0], 0, "{} lost the text", strategy.name());
        }
    }

    #[test]
    fn grayscale_truncates() {
        let green = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([0, 255, 0])));
        assert_eq!(grayscale(&green).get_pixel(0, 0).0[0], 149);
    }

    #[test]
    fn simple_threshold_keeps_mid_gray_white() {
        let mid = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([128, 128, 128])));
        assert!(Binarization::Simple.apply(&mid).pixels().all(|p| p.0[0] == 255));

        let darker = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([127, 127, 127])));
        assert!(Binarization::Simple.apply(&darker).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn color_extract_keeps_dominant_dark_colour() {
        // Light background, a blue glyph block and a faint red speck colour
        // covering too few pixels to count as ink.
        let mut img = RgbImage::from_pixel(40, 20, Rgb([235, 235, 230]));
        for y in 5..15 {
            for x in 10..20 {
                img.put_pixel(x, y, Rgb([30, 40, 150]));
            }
        }
        img.put_pixel(35, 10, Rgb([200, 20, 20]));

        let out = Binarization::ColorExtract.apply(&DynamicImage::ImageRgb8(img));
        assert_eq!(out.get_pixel(15, 10).0[0], 0, "glyph should be ink");
        assert_eq!(out.get_pixel(2, 2).0[0], 255, "background should be white");
        assert_eq!(out.get_pixel(35, 10).0[0], 255, "rare colour should be dropped");
    }

    #[test]
    fn color_extract_without_dark_colours_is_blank() {
        let light = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([250, 250, 250])));
        let out = extract_dark_colors(&light);
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn speck_cleanup_flips_isolated_pixels() {
        let mut binary = GrayImage::from_pixel(9, 9, WHITE);
        binary.put_pixel(2, 2, BLACK);
        // White hole inside a black 3×3 block.
        for y in 5..8 {
            for x in 5..8 {
                binary.put_pixel(x, y, BLACK);
            }
        }
        binary.put_pixel(6, 6, WHITE);

        let out = remove_specks(&binary);
        assert_eq!(out.get_pixel(2, 2).0[0], 255);
        assert_eq!(out.get_pixel(6, 6).0[0], 0);
    }

    #[test]
    fn thin_line_is_removed_but_thick_stroke_kept() {
        let mut binary = GrayImage::from_pixel(60, 30, WHITE);
        for x in 5..40 {
            binary.put_pixel(x, 15, BLACK);
        }
        for y in 8..22 {
            for x in 48..56 {
                binary.put_pixel(x, y, BLACK);
            }
        }

        let out = remove_thin_lines(&binary);
        assert!((5..40).all(|x| out.get_pixel(x, 15).0[0] == 255));
        assert!((8..22).all(|y| (48..56).all(|x| out.get_pixel(x, y).0[0] == 0)));
    }

    #[test]
    fn short_runs_and_vertical_lines() {
        let mut binary = GrayImage::from_pixel(30, 30, WHITE);
        for x in 3..8 {
            binary.put_pixel(x, 4, BLACK);
        }
        for y in 10..25 {
            binary.put_pixel(20, y, BLACK);
        }

        let out = remove_thin_lines(&binary);
        assert!((3..8).all(|x| out.get_pixel(x, 4).0[0] == 0), "5-pixel run survives");
        assert!((10..25).all(|y| out.get_pixel(20, y).0[0] == 255));
    }

    #[test]
    fn enhanced_pass_drops_interference_line() {
        let mut img = RgbImage::from_pixel(60, 30, Rgb([255, 255, 255]));
        for x in 15..45 {
            img.put_pixel(x, 15, Rgb([0, 0, 0]));
        }
        let out = Binarization::Enhanced.apply(&DynamicImage::ImageRgb8(img));
        let still_black = (15..45).filter(|&x| out.get_pixel(x, 15).0[0] == 0).count();
        assert_eq!(still_black, 0);
    }

    #[test]
    fn passes_run_in_fallback_order() {
        let names: Vec<_> = Binarization::ALL.iter().map(|b| b.name()).collect();
        assert_eq!(names, ["adaptive", "color_extract", "enhanced", "simple"]);
    }

    #[test]
    fn encoded_png_decodes_back() {
        let gray = Binarization::Simple.apply(&sample_image(20, 10));
        let png = encode_png(&gray).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.dimensions(), (20, 10));
    }
}
