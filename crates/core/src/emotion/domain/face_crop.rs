use image::imageops::FilterType;
use image::GrayImage;

use crate::shared::constants::CLASSIFIER_INPUT_SIZE;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Fixed-size grayscale face crop, histogram-equalised, as f32 in 0–255.
///
/// Row-major, `size * size` values.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceCrop {
    pixels: Vec<f32>,
    size: u32,
}

impl FaceCrop {
    /// Extracts `roi` from the frame and prepares it for classification:
    /// luma conversion, bilinear resize to the classifier input size,
    /// then histogram equalisation.
    ///
    /// Returns `None` when the ROI does not overlap the frame.
    pub fn extract(frame: &Frame, roi: &Rect) -> Option<FaceCrop> {
        let roi = roi.clamp_to_frame(frame.width(), frame.height());
        if roi.is_empty() || frame.is_empty() {
            return None;
        }

        let gray = grayscale_region(frame, &roi)?;
        let resized = image::imageops::resize(
            &gray,
            CLASSIFIER_INPUT_SIZE,
            CLASSIFIER_INPUT_SIZE,
            FilterType::Triangle,
        );
        let equalized = equalize_histogram(resized.as_raw());

        Some(FaceCrop {
            pixels: equalized.into_iter().map(f32::from).collect(),
            size: CLASSIFIER_INPUT_SIZE,
        })
    }

    pub fn from_pixels(pixels: Vec<f32>, size: u32) -> Self {
        debug_assert_eq!(pixels.len(), (size * size) as usize);
        Self { pixels, size }
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// BT.601 luma of the ROI, rounded to 8 bits.
fn grayscale_region(frame: &Frame, roi: &Rect) -> Option<GrayImage> {
    let src = frame.as_ndarray().ok()?;
    let (x0, y0) = (roi.x as usize, roi.y as usize);
    let gray = GrayImage::from_fn(roi.width as u32, roi.height as u32, |x, y| {
        let (row, col) = (y0 + y as usize, x0 + x as usize);
        let r = src[[row, col, 0]] as f32;
        let g = src[[row, col, 1]] as f32;
        let b = src[[row, col, 2]] as f32;
        image::Luma([(0.299 * r + 0.587 * g + 0.114 * b).round().min(255.0) as u8])
    });
    Some(gray)
}

/// Histogram equalisation over 256 bins.
///
/// The darkest occupied bin maps to 0 and the cumulative distribution is
/// stretched across the full range; a single-valued image keeps its value.
pub fn equalize_histogram(pixels: &[u8]) -> Vec<u8> {
    let total = pixels.len();
    if total == 0 {
        return Vec::new();
    }

    let mut hist = [0usize; 256];
    for &p in pixels {
        hist[p as usize] += 1;
    }

    let first = hist.iter().position(|&count| count > 0).unwrap_or(0);
    if hist[first] == total {
        return vec![first as u8; total];
    }

    let scale = 255.0 / (total - hist[first]) as f64;
    let mut lut = [0u8; 256];
    let mut cumulative = 0usize;
    for value in (first + 1)..256 {
        cumulative += hist[value];
        lut[value] = (cumulative as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }

    pixels.iter().map(|&p| lut[p as usize]).collect()
}
