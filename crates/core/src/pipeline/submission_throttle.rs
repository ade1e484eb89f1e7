use crate::shared::constants::NANOS_PER_SECOND;

/// Limits how often frames are handed to the worker, in frame time.
///
/// With `fps == 0` every frame passes.
#[derive(Clone, Debug, Default)]
pub struct SubmissionThrottle {
    interval_ns: u64,
    last_submitted_ns: Option<u64>,
}

impl SubmissionThrottle {
    pub fn new(fps: u32) -> Self {
        Self {
            interval_ns: if fps == 0 {
                0
            } else {
                NANOS_PER_SECOND / fps as u64
            },
            last_submitted_ns: None,
        }
    }

    /// Whether the frame at `timestamp_ns` should be submitted. A `true`
    /// answer counts as a submission.
    pub fn should_submit(&mut self, timestamp_ns: u64) -> bool {
        if self.interval_ns == 0 {
            return true;
        }
        let due = match self.last_submitted_ns {
            None => true,
            Some(last) => timestamp_ns >= last.saturating_add(self.interval_ns),
        };
        if due {
            self.last_submitted_ns = Some(timestamp_ns);
        }
        due
    }
}
