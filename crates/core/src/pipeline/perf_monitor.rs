use crate::detection::domain::detected_face::DetectedFace;
use crate::emotion::domain::emotion::Emotion;
use crate::shared::constants::{NANOS_PER_SECOND, PERF_REPORT_INTERVAL_NS};

/// One reporting window's worth of inference statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct PerfReport {
    pub avg_inference_ms: f64,
    pub inference_fps: f64,
    pub queue_len: usize,
    pub top: Option<(Emotion, f32)>,
}

impl std::fmt::Display for PerfReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (label, confidence) = match self.top {
            Some((emotion, confidence)) => (emotion.label(), confidence),
            None => ("none", 0.0),
        };
        write!(
            f,
            "perf avg_inference_ms={:.2} inference_fps={:.2} queue={} top_label={} top_conf={:.2}",
            self.avg_inference_ms, self.inference_fps, self.queue_len, label, confidence
        )
    }
}

/// Accumulates consumed-result timings and reports them on a fixed
/// frame-time interval.
pub struct PerfMonitor {
    interval_ns: u64,
    window_start_ns: Option<u64>,
    total_ms: f64,
    results: usize,
}

impl Default for PerfMonitor {
    fn default() -> Self {
        Self::new(PERF_REPORT_INTERVAL_NS)
    }
}

impl PerfMonitor {
    pub fn new(interval_ns: u64) -> Self {
        Self {
            interval_ns: interval_ns.max(1),
            window_start_ns: None,
            total_ms: 0.0,
            results: 0,
        }
    }

    /// Count one consumed worker result.
    pub fn record(&mut self, inference_ms: f64) {
        self.total_ms += inference_ms;
        self.results += 1;
    }

    /// Advance to `now_ns`. Once a full interval has elapsed, returns (and
    /// logs) the window's report and starts a new window.
    ///
    /// `top_face` is the largest face of the newest result, if any.
    pub fn tick(
        &mut self,
        now_ns: u64,
        queue_len: usize,
        top_face: Option<&DetectedFace>,
    ) -> Option<PerfReport> {
        let Some(start) = self.window_start_ns else {
            self.window_start_ns = Some(now_ns);
            return None;
        };
        let elapsed_ns = now_ns.saturating_sub(start);
        if elapsed_ns < self.interval_ns {
            return None;
        }

        let elapsed_seconds = elapsed_ns as f64 / NANOS_PER_SECOND as f64;
        let report = PerfReport {
            avg_inference_ms: if self.results > 0 {
                self.total_ms / self.results as f64
            } else {
                0.0
            },
            inference_fps: self.results as f64 / elapsed_seconds,
            queue_len,
            top: top_face.map(|face| (face.label, face.confidence)),
        };
        log::info!("{report}");

        self.window_start_ns = Some(now_ns);
        self.total_ms = 0.0;
        self.results = 0;
        Some(report)
    }
}
