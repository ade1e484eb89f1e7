use std::path::PathBuf;

/// Describes an opened frame source.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Capture timestamp of frame `index` at the source's nominal rate.
    ///
    /// Sources without a rate (`fps <= 0`) stamp every frame at zero.
    pub fn timestamp_ns(&self, index: usize) -> u64 {
        if self.fps <= 0.0 || !self.fps.is_finite() {
            return 0;
        }
        (index as f64 * 1e9 / self.fps).round() as u64
    }
}
