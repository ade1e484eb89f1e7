use serde::{Deserialize, Serialize};

use crate::shared::constants::EMOTION_CLASS_COUNT;

/// Per-class probabilities in classifier model order.
pub type EmotionProbabilities = [f32; EMOTION_CLASS_COUNT];

/// Emotion reported for a face.
///
/// `Uncertain` is the sentinel used when the winning class is below the
/// confidence threshold, and for model classes without a counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Neutral,
    Uncertain,
}

impl Emotion {
    /// Maps a FER+ output index to the reported emotion.
    ///
    /// Index 7 ("contempt") and anything out of range report `Uncertain`.
    pub fn from_model_index(index: usize) -> Emotion {
        match index {
            0 => Emotion::Neutral,
            1 => Emotion::Joy,
            2 => Emotion::Surprise,
            3 => Emotion::Sadness,
            4 => Emotion::Anger,
            5 => Emotion::Disgust,
            6 => Emotion::Fear,
            _ => Emotion::Uncertain,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Joy => "Joy",
            Emotion::Sadness => "Sadness",
            Emotion::Anger => "Anger",
            Emotion::Fear => "Fear",
            Emotion::Surprise => "Surprise",
            Emotion::Disgust => "Disgust",
            Emotion::Neutral => "Neutral",
            Emotion::Uncertain => "Uncertain",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
