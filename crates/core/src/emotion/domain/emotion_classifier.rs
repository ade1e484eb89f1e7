use crate::emotion::domain::face_crop::FaceCrop;

/// Domain interface for per-face emotion classification.
///
/// Returns the model's raw output values in class order. No range or length
/// is guaranteed; callers fit and normalise the result.
pub trait EmotionClassifier: Send {
    fn classify(&mut self, crop: &FaceCrop) -> Result<Vec<f32>, Box<dyn std::error::Error>>;
}
