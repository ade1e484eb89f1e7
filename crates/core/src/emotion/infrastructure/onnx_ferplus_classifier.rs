/// FER+ emotion classifier using ONNX Runtime via `ort`.
///
/// Consumes a 64×64 equalised grayscale crop as a `[1, 1, 64, 64]` tensor
/// of raw 0–255 values and returns the flattened model output unchanged.
use std::path::Path;

use crate::detection::infrastructure::execution_provider::load_session;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::emotion::domain::face_crop::FaceCrop;

pub struct OnnxFerPlusClassifier {
    session: ort::session::Session,
}

impl OnnxFerPlusClassifier {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        Ok(Self { session })
    }
}

impl EmotionClassifier for OnnxFerPlusClassifier {
    fn classify(&mut self, crop: &FaceCrop) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let tensor = to_tensor(crop)?;
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("emotion model produced no outputs".into());
        }
        let scores = outputs[0].try_extract_array::<f32>()?;
        Ok(scores.iter().copied().collect())
    }
}

fn to_tensor(crop: &FaceCrop) -> Result<ndarray::Array4<f32>, ndarray::ShapeError> {
    let side = crop.size() as usize;
    ndarray::Array4::from_shape_vec((1, 1, side, side), crop.pixels().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_layout_is_single_channel_nchw() {
        let mut pixels = vec![0.0f32; 16];
        pixels[5] = 200.0; // row 1, col 1
        let crop = FaceCrop::from_pixels(pixels, 4);
        let tensor = to_tensor(&crop).unwrap();
        assert_eq!(tensor.shape(), &[1, 1, 4, 4]);
        assert_eq!(tensor[[0, 0, 1, 1]], 200.0);
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        assert!(OnnxFerPlusClassifier::new(Path::new("/nonexistent/ferplus.onnx")).is_err());
    }
}
