use serde::{Deserialize, Serialize};

use crate::emotion::domain::emotion::{Emotion, EmotionProbabilities};
use crate::shared::rect::Rect;

/// A face found in one frame, before identity association.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: Rect,
    pub probabilities: EmotionProbabilities,
}

/// A tracked face as reported to the host for one completed cycle.
///
/// `probabilities` is this frame's normalised classification; `label` and
/// `confidence` come from the track's smoothed state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub track_id: u32,
    pub bbox: Rect,
    pub probabilities: EmotionProbabilities,
    pub label: Emotion,
    pub confidence: f32,
    pub timestamp_ns: u64,
}
