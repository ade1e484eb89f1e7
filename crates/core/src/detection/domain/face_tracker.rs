/// Greedy IoU tracker with exponential smoothing of emotion probabilities.
///
/// Each cycle associates the frame's detections with the live tracks by
/// repeatedly taking the best-overlapping remaining pair. Matched tracks
/// blend the new probabilities in with a time-based EMA; unmatched
/// detections start new tracks and unmatched tracks are dropped. A frame
/// with no detections clears every track.
use crate::emotion::domain::emotion::{Emotion, EmotionProbabilities};
use crate::shared::constants::{
    DEFAULT_FRAME_INTERVAL_SECONDS, MIN_SMOOTHING_TAU_SECONDS, NANOS_PER_SECOND,
    TRACK_IOU_THRESHOLD,
};
use crate::shared::rect::Rect;

use super::detected_face::{DetectedFace, RawDetection};

/// Per-cycle tracker parameters, copied out of the worker configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerSettings {
    pub max_faces: usize,
    pub smoothing_seconds: f32,
    pub confidence_threshold: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: u32,
    pub bbox: Rect,
    pub smoothed: EmotionProbabilities,
    pub label: Emotion,
    pub confidence: f32,
    pub last_seen_ns: Option<u64>,
}

pub struct FaceTracker {
    tracks: Vec<Track>,
    next_id: u32,
}

impl Default for FaceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceTracker {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Drops every track. Ids keep counting from where they were.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    pub fn update(
        &mut self,
        detections: &[RawDetection],
        timestamp_ns: u64,
        settings: &TrackerSettings,
    ) -> Vec<DetectedFace> {
        let mut limited: Vec<&RawDetection> = detections.iter().collect();
        limited.sort_by(|a, b| b.bbox.area().cmp(&a.bbox.area()));
        limited.truncate(settings.max_faces.max(1));

        if limited.is_empty() {
            self.tracks.clear();
            return Vec::new();
        }

        let assignment = self.associate(&limited);
        let mut detection_used = vec![false; limited.len()];
        let mut next_tracks = Vec::with_capacity(limited.len());
        let mut faces = Vec::with_capacity(limited.len());

        for (track, matched) in self.tracks.iter().zip(&assignment) {
            let Some(di) = *matched else {
                continue;
            };
            detection_used[di] = true;
            let detection = limited[di];

            let mut track = track.clone();
            let dt = elapsed_seconds(track.last_seen_ns, timestamp_ns);
            let alpha = smoothing_alpha(dt, settings.smoothing_seconds);
            for (s, &p) in track.smoothed.iter_mut().zip(&detection.probabilities) {
                *s = alpha * p + (1.0 - alpha) * *s;
            }
            track.bbox = detection.bbox;
            track.last_seen_ns = Some(timestamp_ns);
            (track.label, track.confidence) =
                stable_label(&track.smoothed, settings.confidence_threshold);

            faces.push(to_face(&track, detection, timestamp_ns));
            next_tracks.push(track);
        }

        for (di, detection) in limited.iter().enumerate() {
            if detection_used[di] {
                continue;
            }
            let (label, confidence) =
                stable_label(&detection.probabilities, settings.confidence_threshold);
            let track = Track {
                id: self.next_id,
                bbox: detection.bbox,
                smoothed: detection.probabilities,
                label,
                confidence,
                last_seen_ns: Some(timestamp_ns),
            };
            self.next_id += 1;
            log::debug!("New track {} at {:?}", track.id, track.bbox);

            faces.push(to_face(&track, detection, timestamp_ns));
            next_tracks.push(track);
        }

        self.tracks = next_tracks;
        faces.sort_by(|a, b| b.bbox.area().cmp(&a.bbox.area()));
        faces
    }

    /// Greedy best-pair assignment. Returns, per track, the index of the
    /// detection it continues.
    ///
    /// Pairs are scanned track-major; only a strictly greater IoU replaces
    /// the current best, so ties go to the earliest track and detection.
    fn associate(&self, detections: &[&RawDetection]) -> Vec<Option<usize>> {
        let mut assignment = vec![None; self.tracks.len()];
        let mut detection_used = vec![false; detections.len()];

        loop {
            let mut best: Option<(usize, usize)> = None;
            let mut best_iou = TRACK_IOU_THRESHOLD;
            for (ti, track) in self.tracks.iter().enumerate() {
                if assignment[ti].is_some() {
                    continue;
                }
                for (di, detection) in detections.iter().enumerate() {
                    if detection_used[di] {
                        continue;
                    }
                    let iou = track.bbox.iou(&detection.bbox);
                    if iou > best_iou {
                        best_iou = iou;
                        best = Some((ti, di));
                    }
                }
            }

            let Some((ti, di)) = best else {
                break;
            };
            assignment[ti] = Some(di);
            detection_used[di] = true;
        }

        assignment
    }
}

fn to_face(track: &Track, detection: &RawDetection, timestamp_ns: u64) -> DetectedFace {
    DetectedFace {
        track_id: track.id,
        bbox: detection.bbox,
        probabilities: detection.probabilities,
        label: track.label,
        confidence: track.confidence,
        timestamp_ns,
    }
}

/// Seconds since `last_seen_ns`, or the default frame interval when the
/// track has no usable prior timestamp (never seen, or time went backwards).
///
/// A track last seen at exactly t=0 counts as stamped; zero is not treated
/// as a "never seen" sentinel.
fn elapsed_seconds(last_seen_ns: Option<u64>, now_ns: u64) -> f64 {
    match last_seen_ns {
        Some(prev) if now_ns >= prev => (now_ns - prev) as f64 / NANOS_PER_SECOND as f64,
        _ => DEFAULT_FRAME_INTERVAL_SECONDS,
    }
}

/// EMA weight for the new observation after `dt_seconds`.
///
/// A smoothing window of zero or less disables smoothing (`1.0`).
pub fn smoothing_alpha(dt_seconds: f64, smoothing_seconds: f32) -> f32 {
    if !(smoothing_seconds > 0.0) {
        return 1.0;
    }
    let tau = (smoothing_seconds as f64).max(MIN_SMOOTHING_TAU_SECONDS);
    let alpha = 1.0 - (-dt_seconds.max(0.0) / tau).exp();
    alpha.clamp(0.0, 1.0) as f32
}

/// Winning emotion of a smoothed vector and its confidence in `[0, 1]`.
///
/// Below `threshold` the label is `Uncertain`, whichever class won.
pub fn stable_label(probabilities: &EmotionProbabilities, threshold: f32) -> (Emotion, f32) {
    let (best_index, best) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        });

    let label = if best < threshold {
        Emotion::Uncertain
    } else {
        Emotion::from_model_index(best_index)
    };
    let confidence = if best.is_finite() {
        best.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (label, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const MS: u64 = 1_000_000;

    fn settings(max_faces: usize, smoothing_seconds: f32) -> TrackerSettings {
        TrackerSettings {
            max_faces,
            smoothing_seconds,
            confidence_threshold: 0.3,
        }
    }

    fn one_hot(index: usize) -> EmotionProbabilities {
        let mut p = [0.0; 8];
        p[index] = 1.0;
        p
    }

    fn det(x: i32, y: i32, w: i32, h: i32, probabilities: EmotionProbabilities) -> RawDetection {
        RawDetection {
            bbox: Rect::new(x, y, w, h),
            probabilities,
        }
    }

    #[test]
    fn test_first_detection_creates_track_one() {
        let mut tracker = FaceTracker::new();
        let faces = tracker.update(&[det(10, 10, 50, 50, one_hot(0))], 0, &settings(3, 0.6));

        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].track_id, 1);
        assert_eq!(faces[0].label, Emotion::Neutral);
        assert_relative_eq!(faces[0].confidence, 1.0);
        assert_eq!(faces[0].bbox, Rect::new(10, 10, 50, 50));
    }

    #[test]
    fn test_overlapping_detection_keeps_id_and_saturated_vector() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(10, 10, 50, 50, one_hot(0))], 0, &settings(3, 0.6));
        let faces = tracker.update(&[det(12, 11, 50, 50, one_hot(0))], 200 * MS, &settings(3, 0.6));

        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].track_id, 1);
        assert_eq!(faces[0].bbox, Rect::new(12, 11, 50, 50));
        let track = &tracker.tracks()[0];
        for (i, &v) in track.smoothed.iter().enumerate() {
            assert_relative_eq!(v, if i == 0 { 1.0 } else { 0.0 }, epsilon = 1e-6);
        }
        assert_eq!(track.last_seen_ns, Some(200 * MS));
    }

    #[test]
    fn test_low_overlap_spawns_new_id_and_drops_old() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(0, 0, 50, 50, one_hot(1))], 0, &settings(3, 0.6));
        // IoU = 500 / 4500 ≈ 0.11
        let faces = tracker.update(&[det(40, 0, 50, 50, one_hot(1))], 100 * MS, &settings(3, 0.6));

        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].track_id, 2);
        assert_eq!(tracker.tracks().len(), 1);
        assert_eq!(tracker.tracks()[0].id, 2);
    }

    #[test]
    fn test_iou_exactly_at_threshold_does_not_match() {
        // (0,0,60,10) vs (40,0,60,10): inter 200, union 1000 → IoU 0.2
        let a = Rect::new(0, 0, 60, 10);
        let b = Rect::new(40, 0, 60, 10);
        assert_relative_eq!(a.iou(&b), 0.2);

        let mut tracker = FaceTracker::new();
        tracker.update(&[det(0, 0, 60, 10, one_hot(0))], 0, &settings(3, 0.6));
        let faces = tracker.update(&[det(40, 0, 60, 10, one_hot(0))], 100 * MS, &settings(3, 0.6));
        assert_eq!(faces[0].track_id, 2);
    }

    #[test]
    fn test_zero_smoothing_takes_raw_vector() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(10, 10, 50, 50, one_hot(0))], 0, &settings(3, 0.0));
        let raw = [0.1, 0.5, 0.1, 0.1, 0.05, 0.05, 0.05, 0.05];
        tracker.update(&[det(10, 10, 50, 50, raw)], 10 * MS, &settings(3, 0.0));

        assert_eq!(tracker.tracks()[0].smoothed, raw);
        assert_eq!(tracker.tracks()[0].label, Emotion::Joy);
    }

    #[test]
    fn test_smoothing_blends_with_time_based_alpha() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(10, 10, 50, 50, one_hot(0))], 0, &settings(3, 0.5));
        tracker.update(&[det(10, 10, 50, 50, one_hot(1))], 500 * MS, &settings(3, 0.5));

        let alpha = 1.0 - (-1.0f64).exp() as f32;
        let smoothed = tracker.tracks()[0].smoothed;
        assert_relative_eq!(smoothed[0], 1.0 - alpha, epsilon = 1e-6);
        assert_relative_eq!(smoothed[1], alpha, epsilon = 1e-6);
        // alpha ≈ 0.632, so index 1 wins
        assert_eq!(tracker.tracks()[0].label, Emotion::Joy);
    }

    #[test]
    fn test_empty_frame_clears_tracks_and_ids_continue() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(10, 10, 50, 50, one_hot(0))], 0, &settings(3, 0.6));

        let faces = tracker.update(&[], 100 * MS, &settings(3, 0.6));
        assert!(faces.is_empty());
        assert!(tracker.tracks().is_empty());

        let faces = tracker.update(&[det(10, 10, 50, 50, one_hot(0))], 200 * MS, &settings(3, 0.6));
        assert_eq!(faces[0].track_id, 2);
    }

    #[test]
    fn test_reset_keeps_id_sequence() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(10, 10, 50, 50, one_hot(0))], 0, &settings(3, 0.6));
        tracker.reset();
        assert!(tracker.tracks().is_empty());

        let faces = tracker.update(&[det(10, 10, 50, 50, one_hot(0))], MS, &settings(3, 0.6));
        assert_eq!(faces[0].track_id, 2);
    }

    #[test]
    fn test_detections_truncated_to_largest_max_faces() {
        let mut tracker = FaceTracker::new();
        let detections = [
            det(0, 0, 10, 10, one_hot(0)),
            det(100, 0, 40, 40, one_hot(1)),
            det(200, 0, 20, 20, one_hot(2)),
            det(300, 0, 30, 30, one_hot(3)),
        ];
        let faces = tracker.update(&detections, 0, &settings(2, 0.6));

        assert_eq!(faces.len(), 2);
        assert_eq!(tracker.tracks().len(), 2);
        assert_eq!(faces[0].bbox.width, 40);
        assert_eq!(faces[1].bbox.width, 30);
    }

    #[test]
    fn test_max_faces_zero_still_tracks_one() {
        let mut tracker = FaceTracker::new();
        let faces = tracker.update(
            &[det(0, 0, 10, 10, one_hot(0)), det(50, 0, 20, 20, one_hot(0))],
            0,
            &settings(0, 0.6),
        );
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].bbox.width, 20);
    }

    #[test]
    fn test_output_sorted_by_area_descending() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(0, 0, 20, 20, one_hot(0))], 0, &settings(3, 0.6));
        // the existing small track matches first, the larger new face must still lead
        let faces = tracker.update(
            &[det(0, 0, 20, 20, one_hot(0)), det(200, 0, 60, 60, one_hot(1))],
            MS,
            &settings(3, 0.6),
        );

        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].track_id, 2);
        assert_eq!(faces[1].track_id, 1);
    }

    #[test]
    fn test_greedy_prefers_global_best_pair() {
        let mut tracker = FaceTracker::new();
        tracker.update(
            &[det(0, 0, 100, 100, one_hot(0)), det(300, 0, 90, 90, one_hot(1))],
            0,
            &settings(3, 0.6),
        );
        let ids: Vec<u32> = tracker.tracks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);

        // both faces shift a little; each must keep its own id
        let faces = tracker.update(
            &[det(305, 2, 90, 90, one_hot(1)), det(4, 3, 100, 100, one_hot(0))],
            MS,
            &settings(3, 0.6),
        );
        assert_eq!(faces[0].track_id, 1);
        assert_eq!(faces[0].bbox.x, 4);
        assert_eq!(faces[1].track_id, 2);
        assert_eq!(faces[1].bbox.x, 305);
    }

    #[test]
    fn test_assignment_is_one_to_one() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(0, 0, 100, 100, one_hot(0))], 0, &settings(3, 0.6));
        // two detections overlap the single track; only one may continue it
        let faces = tracker.update(
            &[det(0, 0, 100, 100, one_hot(0)), det(10, 10, 90, 90, one_hot(0))],
            MS,
            &settings(3, 0.6),
        );

        let mut ids: Vec<u32> = faces.iter().map(|f| f.track_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(faces[0].track_id, 1);
    }

    #[test]
    fn test_output_carries_raw_probabilities() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(10, 10, 50, 50, one_hot(0))], 0, &settings(3, 2.0));
        let faces = tracker.update(&[det(10, 10, 50, 50, one_hot(3))], 10 * MS, &settings(3, 2.0));

        assert_eq!(faces[0].probabilities, one_hot(3));
        assert_eq!(faces[0].label, Emotion::Neutral);
        assert_eq!(faces[0].timestamp_ns, 10 * MS);
    }

    #[test]
    fn test_backwards_timestamp_uses_default_interval() {
        let mut tracker = FaceTracker::new();
        tracker.update(&[det(10, 10, 50, 50, one_hot(0))], 1_000 * MS, &settings(3, 0.5));
        tracker.update(&[det(10, 10, 50, 50, one_hot(1))], 0, &settings(3, 0.5));

        let alpha = smoothing_alpha(DEFAULT_FRAME_INTERVAL_SECONDS, 0.5);
        assert_relative_eq!(tracker.tracks()[0].smoothed[1], alpha, epsilon = 1e-6);
    }

    #[rstest]
    #[case::never_seen(None, 500 * MS, DEFAULT_FRAME_INTERVAL_SECONDS)]
    #[case::seen_at_zero(Some(0), 500 * MS, 0.5)]
    #[case::same_instant(Some(0), 0, 0.0)]
    #[case::backwards(Some(500 * MS), 100 * MS, DEFAULT_FRAME_INTERVAL_SECONDS)]
    fn test_elapsed_seconds(#[case] last: Option<u64>, #[case] now: u64, #[case] expected: f64) {
        assert_relative_eq!(elapsed_seconds(last, now), expected);
    }

    #[test]
    fn test_low_confidence_becomes_uncertain() {
        let mut tracker = FaceTracker::new();
        let flat = [0.125; 8];
        let faces = tracker.update(&[det(10, 10, 50, 50, flat)], 0, &settings(3, 0.6));
        assert_eq!(faces[0].label, Emotion::Uncertain);
        assert_relative_eq!(faces[0].confidence, 0.125);
    }

    #[rstest]
    #[case(0.1, 0.0, 1.0)]
    #[case(0.1, -1.0, 1.0)]
    #[case(0.0, 0.5, 0.0)]
    #[case(1.0, 0.0005, 1.0)]
    fn test_smoothing_alpha_edges(#[case] dt: f64, #[case] tau: f32, #[case] expected: f32) {
        assert_relative_eq!(smoothing_alpha(dt, tau), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_smoothing_alpha_matches_exponential() {
        let expected = 1.0 - (-0.2f64 / 0.6).exp();
        assert_relative_eq!(smoothing_alpha(0.2, 0.6), expected as f32, epsilon = 1e-6);
    }

    #[rstest]
    #[case(one_hot(6), 0.3, Emotion::Fear, 1.0)]
    #[case(one_hot(7), 0.3, Emotion::Uncertain, 1.0)]
    #[case([0.29, 0.2, 0.1, 0.1, 0.1, 0.1, 0.1, 0.01], 0.3, Emotion::Uncertain, 0.29)]
    #[case([0.3, 0.2, 0.1, 0.1, 0.1, 0.1, 0.1, 0.0], 0.3, Emotion::Neutral, 0.3)]
    #[case([0.2, 0.2, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1], 0.0, Emotion::Neutral, 0.2)]
    fn test_stable_label(
        #[case] probabilities: EmotionProbabilities,
        #[case] threshold: f32,
        #[case] label: Emotion,
        #[case] confidence: f32,
    ) {
        let (l, c) = stable_label(&probabilities, threshold);
        assert_eq!(l, label);
        assert_relative_eq!(c, confidence);
    }
}
