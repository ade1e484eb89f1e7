use image::imageops::FilterType;

use crate::detection::domain::detected_face::RawDetection;
use crate::detection::domain::face_detector::{row_to_source_rect, FaceDetector};
use crate::emotion::domain::emotion::EmotionProbabilities;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::emotion::domain::face_crop::FaceCrop;
use crate::emotion::domain::probability_normalizer::normalize;
use crate::shared::constants::EMOTION_CLASS_COUNT;
use crate::shared::frame::Frame;

/// Detection plus per-face classification for one frame.
///
/// Owns both model capabilities; lives on the worker thread.
pub struct FaceAnalyzer {
    detector: Box<dyn FaceDetector>,
    classifier: Box<dyn EmotionClassifier>,
}

impl FaceAnalyzer {
    pub fn new(detector: Box<dyn FaceDetector>, classifier: Box<dyn EmotionClassifier>) -> Self {
        Self {
            detector,
            classifier,
        }
    }

    /// Find faces in `frame` and classify each one.
    ///
    /// Detection runs on a copy downscaled to `inference_width` when the
    /// frame is wider; boxes come back in source coordinates. Malformed
    /// rows and faces without a usable crop are skipped.
    pub fn analyze(
        &mut self,
        frame: &Frame,
        inference_width: u32,
    ) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let (scaled, scale) = downscale(frame, inference_width)?;
        let rows = self.detector.detect(scaled.as_ref().unwrap_or(frame))?;

        let mut detections = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(bbox) = row_to_source_rect(row, scale, frame.width(), frame.height()) else {
                continue;
            };
            let roi = bbox.square_roi(frame.width(), frame.height());
            let Some(crop) = FaceCrop::extract(frame, &roi) else {
                continue;
            };
            let raw = self.classifier.classify(&crop)?;
            detections.push(RawDetection {
                bbox,
                probabilities: normalize(&fit_class_count(&raw)),
            });
        }
        Ok(detections)
    }
}

/// Returns the downscaled copy (if one was needed) and the scale factor
/// that maps source coordinates onto it.
fn downscale(
    frame: &Frame,
    inference_width: u32,
) -> Result<(Option<Frame>, f64), Box<dyn std::error::Error>> {
    if inference_width == 0 || frame.width() <= inference_width {
        return Ok((None, 1.0));
    }

    let scale = inference_width as f64 / frame.width() as f64;
    let height = ((frame.height() as f64 * scale).round() as u32).max(1);
    let image = frame
        .to_rgb_image()
        .ok_or("frame buffer does not match its dimensions")?;
    let resized = image::imageops::resize(&image, inference_width, height, FilterType::Triangle);
    Ok((
        Some(Frame::from_rgb_image(resized, frame.timestamp_ns())),
        scale,
    ))
}

/// First eight classifier values, zero-filled when the model emits fewer.
fn fit_class_count(raw: &[f32]) -> EmotionProbabilities {
    let mut fitted = [0.0; EMOTION_CLASS_COUNT];
    for (dst, &src) in fitted.iter_mut().zip(raw) {
        *dst = src;
    }
    fitted
}
