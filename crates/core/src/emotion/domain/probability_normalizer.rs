//! Reconciles classifier outputs into a probability distribution.
//!
//! Some classifier exports emit already-softmaxed probabilities, others
//! emit raw logits. Inputs that look like a distribution are clamped and
//! renormalised; everything else goes through a numerically stable softmax.

use crate::emotion::domain::emotion::EmotionProbabilities;
use crate::shared::constants::EMOTION_CLASS_COUNT;

const VALUE_LOWER_BOUND: f32 = -0.001;
const VALUE_UPPER_BOUND: f32 = 1.001;
const SUM_LOWER_BOUND: f32 = 0.85;
const SUM_UPPER_BOUND: f32 = 1.15;

/// Converts a raw classifier output into values in [0, 1] summing to 1.
pub fn normalize(raw: &EmotionProbabilities) -> EmotionProbabilities {
    if looks_like_probabilities(raw) {
        if let Some(probs) = renormalize(raw) {
            return probs;
        }
    }
    softmax(raw)
}

/// Every value finite and within [-0.001, 1.001], with a sum in [0.85, 1.15].
pub fn looks_like_probabilities(values: &EmotionProbabilities) -> bool {
    let mut sum = 0.0f32;
    for &value in values {
        if !value.is_finite() || !(VALUE_LOWER_BOUND..=VALUE_UPPER_BOUND).contains(&value) {
            return false;
        }
        sum += value;
    }
    (SUM_LOWER_BOUND..=SUM_UPPER_BOUND).contains(&sum)
}

fn renormalize(raw: &EmotionProbabilities) -> Option<EmotionProbabilities> {
    let mut probs = raw.map(|v| v.clamp(0.0, 1.0));
    let sum: f32 = probs.iter().sum();
    if sum <= f32::EPSILON {
        return None;
    }
    for p in &mut probs {
        *p /= sum;
    }
    Some(probs)
}

fn softmax(raw: &EmotionProbabilities) -> EmotionProbabilities {
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut probs = raw.map(|v| (v - max).exp());
    let sum: f32 = probs.iter().sum();

    // NaN sums land here too
    if !(sum > f32::EPSILON) || !sum.is_finite() {
        return uniform();
    }
    for p in &mut probs {
        *p /= sum;
    }
    probs
}

fn uniform() -> EmotionProbabilities {
    [1.0 / EMOTION_CLASS_COUNT as f32; EMOTION_CLASS_COUNT]
}
