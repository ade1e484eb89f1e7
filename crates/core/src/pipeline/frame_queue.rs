use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::shared::frame::Frame;

/// Single-slot, drop-oldest frame buffer between the caller and the worker.
///
/// `push` never blocks: a pending frame that the worker has not picked up
/// yet is replaced by the new one.
pub struct FrameQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        Self { tx, rx }
    }

    /// Enqueue `frame`, evicting the pending one if present.
    ///
    /// Returns `true` when an older frame was discarded.
    pub fn push(&self, frame: Frame) -> bool {
        let mut frame = frame;
        let mut displaced = false;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return displaced,
                Err(TrySendError::Full(rejected)) => {
                    // the worker may have taken the pending frame meanwhile
                    if let Ok(old) = self.rx.try_recv() {
                        log::trace!("Dropping pending frame at {} ns", old.timestamp_ns());
                        displaced = true;
                    }
                    frame = rejected;
                }
                // both ends live in `self`
                Err(TrySendError::Disconnected(_)) => return displaced,
            }
        }
    }

    /// Consumer end for the worker thread.
    pub fn receiver(&self) -> Receiver<Frame> {
        self.rx.clone()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}
