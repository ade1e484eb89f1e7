pub mod emotion;
pub mod emotion_classifier;
pub mod face_crop;
pub mod probability_normalizer;
