use crate::shared::constants::{DETECTION_ROW_LEN, DETECTION_SCORE_INDEX};
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// One detector output row: `(x, y, width, height, …, score)` in the
/// coordinate space of the image that was passed to the detector.
pub type DetectionRow = Vec<f32>;

/// Domain interface for face localisation.
///
/// Implementations may hold inference state, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionRow>, Box<dyn std::error::Error>>;
}

/// Maps a detector row back into source-frame coordinates.
///
/// Rows that are too short or carry a non-positive score are rejected, as
/// are boxes that end up empty after clipping to the source frame.
/// `scale` is the downscale factor that was applied before detection.
pub fn row_to_source_rect(
    row: &[f32],
    scale: f64,
    source_width: u32,
    source_height: u32,
) -> Option<Rect> {
    if row.len() < DETECTION_ROW_LEN {
        return None;
    }
    let score = row[DETECTION_SCORE_INDEX];
    if !(score > 0.0) {
        return None;
    }

    let map = |v: f32| -> Option<i32> {
        let mapped = (v as f64 / scale).round();
        mapped.is_finite().then_some(mapped as i32)
    };
    let rect = Rect::new(map(row[0])?, map(row[1])?, map(row[2])?, map(row[3])?)
        .clamp_to_frame(source_width, source_height);
    (!rect.is_empty()).then_some(rect)
}
