use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use thiserror::Error;

use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_tracker::FaceTracker;
use crate::detection::infrastructure::onnx_yunet_detector::{
    OnnxYunetDetector, DEFAULT_SCORE_THRESHOLD,
};
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::emotion::infrastructure::onnx_ferplus_classifier::OnnxFerPlusClassifier;
use crate::pipeline::face_analyzer::FaceAnalyzer;
use crate::pipeline::frame_queue::FrameQueue;
use crate::pipeline::result_mailbox::ResultMailbox;
use crate::pipeline::worker_config::WorkerConfig;
use crate::shared::frame::Frame;

const WORKER_THREAD_NAME: &str = "face-emotion-inference";

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to load face detector from {path}: {message}")]
    DetectorLoad { path: PathBuf, message: String },
    #[error("failed to load emotion classifier from {path}: {message}")]
    ClassifierLoad { path: PathBuf, message: String },
    #[error("failed to spawn inference thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("inference worker is not running")]
    NotRunning,
    #[error("rejected empty frame ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("rejected frame with {actual} bytes, expected {expected}")]
    MalformedFrame { expected: usize, actual: usize },
}

/// Output of one completed worker cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultPacket {
    pub faces: Vec<DetectedFace>,
    pub inference_ms: f64,
    pub timestamp_ns: u64,
}

/// Runs detection, classification and tracking on a dedicated thread.
///
/// The caller submits frames and polls results without ever waiting on
/// inference: submissions go through a single-slot drop-oldest queue and
/// results through a single-slot latest-wins mailbox.
pub struct InferenceWorker {
    config: Arc<Mutex<WorkerConfig>>,
    queue: FrameQueue,
    mailbox: Arc<ResultMailbox<ResultPacket>>,
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Default for InferenceWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceWorker {
    pub fn new() -> Self {
        Self {
            config: Arc::new(Mutex::new(WorkerConfig::default())),
            queue: FrameQueue::new(),
            mailbox: Arc::new(ResultMailbox::new()),
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Load the YuNet and FER+ models and start the worker.
    ///
    /// Both models are loaded before anything starts; on failure the
    /// worker stays stopped.
    pub fn start(
        &mut self,
        face_model: &Path,
        emotion_model: &Path,
        config: WorkerConfig,
    ) -> Result<(), WorkerError> {
        self.stop();

        let detector = OnnxYunetDetector::new(face_model, DEFAULT_SCORE_THRESHOLD).map_err(|e| {
            WorkerError::DetectorLoad {
                path: face_model.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        let classifier =
            OnnxFerPlusClassifier::new(emotion_model).map_err(|e| WorkerError::ClassifierLoad {
                path: emotion_model.to_path_buf(),
                message: e.to_string(),
            })?;

        self.start_with(Box::new(detector), Box::new(classifier), config)
    }

    /// Start the worker with already-constructed model capabilities.
    ///
    /// A running worker is stopped first. Tracking starts from scratch, so
    /// track ids begin at 1 again.
    pub fn start_with(
        &mut self,
        detector: Box<dyn FaceDetector>,
        classifier: Box<dyn EmotionClassifier>,
        config: WorkerConfig,
    ) -> Result<(), WorkerError> {
        self.stop();
        *lock(&self.config) = config;

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let context = WorkerContext {
            analyzer: FaceAnalyzer::new(detector, classifier),
            tracker: FaceTracker::new(),
            frames: self.queue.receiver(),
            shutdown: shutdown_rx,
            config: self.config.clone(),
            mailbox: self.mailbox.clone(),
        };

        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || context.run())
            .map_err(WorkerError::Spawn)?;

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        log::info!(
            "Inference worker started (max_faces={}, inference_width={}, confidence={:.2}, smoothing={:.2}s)",
            config.max_faces,
            config.inference_width,
            config.confidence_threshold,
            config.smoothing_seconds
        );
        Ok(())
    }

    /// Signal the worker, wait for its current cycle to finish, then drop
    /// any pending frame and unread result.
    pub fn stop(&mut self) {
        // dropping the sender disconnects the channel and wakes the worker
        drop(self.shutdown_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Inference worker thread panicked");
            }
            log::info!("Inference worker stopped");
        }
        self.queue.clear();
        self.mailbox.clear();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Replace the configuration. Takes effect from the next cycle.
    pub fn update_config(&self, config: WorkerConfig) {
        *lock(&self.config) = config;
    }

    pub fn config(&self) -> WorkerConfig {
        *lock(&self.config)
    }

    /// Hand a frame to the worker without blocking.
    ///
    /// A frame still waiting from an earlier call is discarded. Frames
    /// whose buffer is not exactly `width * height * 3` bytes never enter
    /// the queue.
    pub fn submit_frame(&self, frame: Frame) -> Result<(), SubmitError> {
        if frame.is_empty() {
            return Err(SubmitError::EmptyFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }
        if !frame.is_well_formed() {
            return Err(SubmitError::MalformedFrame {
                expected: frame.expected_len(),
                actual: frame.data().len(),
            });
        }
        if !self.is_running() {
            return Err(SubmitError::NotRunning);
        }
        self.queue.push(frame);
        Ok(())
    }

    /// Newest unread result, if a cycle completed since the last call.
    pub fn try_consume_latest(&self) -> Option<ResultPacket> {
        self.mailbox.take()
    }

    /// Number of frames waiting for the worker (0 or 1).
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved onto the worker thread.
struct WorkerContext {
    analyzer: FaceAnalyzer,
    tracker: FaceTracker,
    frames: Receiver<Frame>,
    shutdown: Receiver<()>,
    config: Arc<Mutex<WorkerConfig>>,
    mailbox: Arc<ResultMailbox<ResultPacket>>,
}

impl WorkerContext {
    fn run(mut self) {
        loop {
            let frame = crossbeam_channel::select! {
                recv(self.shutdown) -> _ => break,
                recv(self.frames) -> msg => match msg {
                    Ok(frame) => frame,
                    Err(_) => break,
                },
            };

            let config = *lock(&self.config);
            let started = Instant::now();
            let faces = self.run_cycle(&frame, &config);
            let packet = ResultPacket {
                faces,
                inference_ms: started.elapsed().as_secs_f64() * 1000.0,
                timestamp_ns: frame.timestamp_ns(),
            };
            log::trace!(
                "Cycle at {} ns: {} face(s) in {:.1}ms",
                packet.timestamp_ns,
                packet.faces.len(),
                packet.inference_ms
            );
            self.mailbox.publish(packet);
        }
    }

    /// One detect → classify → track pass. Errors and panics count as a
    /// cycle that found nothing and reset tracking.
    fn run_cycle(&mut self, frame: &Frame, config: &WorkerConfig) -> Vec<DetectedFace> {
        let analyzer = &mut self.analyzer;
        let tracker = &mut self.tracker;
        let outcome = catch_unwind(AssertUnwindSafe(
            || -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
                let detections = analyzer.analyze(frame, config.inference_width)?;
                Ok(tracker.update(
                    &detections,
                    frame.timestamp_ns(),
                    &config.tracker_settings(),
                ))
            },
        ));

        match outcome {
            Ok(Ok(faces)) => faces,
            Ok(Err(e)) => {
                log::warn!("Inference cycle failed: {e}");
                self.tracker.reset();
                Vec::new()
            }
            Err(_) => {
                log::warn!("Inference cycle panicked");
                self.tracker.reset();
                Vec::new()
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_detector::DetectionRow;
    use crate::emotion::domain::emotion::Emotion;
    use crate::emotion::domain::face_crop::FaceCrop;
    use crate::shared::constants::{DETECTION_ROW_LEN, DETECTION_SCORE_INDEX};
    use rstest::rstest;
    use std::time::Duration;

    fn row(x: f32, y: f32, w: f32, h: f32) -> DetectionRow {
        let mut r = vec![0.0; DETECTION_ROW_LEN];
        r[..4].copy_from_slice(&[x, y, w, h]);
        r[DETECTION_SCORE_INDEX] = 0.9;
        r
    }

    fn frame(ts: u64) -> Frame {
        Frame::new(vec![100; 160 * 120 * 3], 160, 120, ts)
    }

    /// Returns the same rows every call, failing or panicking on chosen
    /// timestamps.
    struct StubDetector {
        rows: Vec<DetectionRow>,
        fail_at: Option<u64>,
        panic_at: Option<u64>,
    }

    impl StubDetector {
        fn faces(rows: Vec<DetectionRow>) -> Box<Self> {
            Box::new(Self {
                rows,
                fail_at: None,
                panic_at: None,
            })
        }
    }

    impl FaceDetector for StubDetector {
        fn detect(
            &mut self,
            frame: &Frame,
        ) -> Result<Vec<DetectionRow>, Box<dyn std::error::Error>> {
            if self.panic_at == Some(frame.timestamp_ns()) {
                panic!("detector panic");
            }
            if self.fail_at == Some(frame.timestamp_ns()) {
                return Err("detector failure".into());
            }
            Ok(self.rows.clone())
        }
    }

    /// Reports each frame it starts on, then waits for the test to let it
    /// finish.
    struct GatedDetector {
        rows: Vec<DetectionRow>,
        entered: Sender<u64>,
        gate: Receiver<()>,
    }

    impl FaceDetector for GatedDetector {
        fn detect(
            &mut self,
            frame: &Frame,
        ) -> Result<Vec<DetectionRow>, Box<dyn std::error::Error>> {
            let _ = self.entered.send(frame.timestamp_ns());
            let _ = self.gate.recv();
            Ok(self.rows.clone())
        }
    }

    struct JoyClassifier;

    impl EmotionClassifier for JoyClassifier {
        fn classify(&mut self, _crop: &FaceCrop) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
            Ok(vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
        }
    }

    fn wait_for_result(worker: &InferenceWorker) -> ResultPacket {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(packet) = worker.try_consume_latest() {
                return packet;
            }
            assert!(Instant::now() < deadline, "timed out waiting for result");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn submit_and_wait(worker: &InferenceWorker, ts: u64) -> ResultPacket {
        worker.submit_frame(frame(ts)).unwrap();
        let packet = wait_for_result(worker);
        assert_eq!(packet.timestamp_ns, ts);
        packet
    }

    #[test]
    fn test_submit_before_start_is_rejected() {
        let worker = InferenceWorker::new();
        assert!(!worker.is_running());
        assert_eq!(worker.submit_frame(frame(1)), Err(SubmitError::NotRunning));
        assert_eq!(worker.queue_len(), 0);
    }

    #[test]
    fn test_empty_frame_is_rejected() {
        let mut worker = InferenceWorker::new();
        worker
            .start_with(StubDetector::faces(Vec::new()), Box::new(JoyClassifier), WorkerConfig::default())
            .unwrap();

        let empty = Frame::new(Vec::new(), 0, 0, 1);
        assert_eq!(
            worker.submit_frame(empty),
            Err(SubmitError::EmptyFrame {
                width: 0,
                height: 0
            })
        );
        assert_eq!(worker.queue_len(), 0);
    }

    #[rstest]
    #[case::oversized(160 * 120 * 3 + 1)]
    #[case::short(160 * 120 * 3 - 3)]
    fn test_frame_with_wrong_buffer_length_is_rejected(#[case] len: usize) {
        let mut worker = InferenceWorker::new();
        worker
            .start_with(
                StubDetector::faces(vec![row(20.0, 20.0, 40.0, 40.0)]),
                Box::new(JoyClassifier),
                WorkerConfig::default(),
            )
            .unwrap();

        let malformed = Frame::new(vec![100; len], 160, 120, 1);
        assert_eq!(
            worker.submit_frame(malformed),
            Err(SubmitError::MalformedFrame {
                expected: 160 * 120 * 3,
                actual: len
            })
        );
        assert_eq!(worker.queue_len(), 0);

        // tracking is untouched by the rejected frame
        assert_eq!(submit_and_wait(&worker, 2).faces[0].track_id, 1);
    }

    #[test]
    fn test_result_carries_tracked_faces() {
        let mut worker = InferenceWorker::new();
        worker
            .start_with(
                StubDetector::faces(vec![row(20.0, 20.0, 40.0, 40.0)]),
                Box::new(JoyClassifier),
                WorkerConfig::default(),
            )
            .unwrap();

        let packet = submit_and_wait(&worker, 7);
        assert_eq!(packet.faces.len(), 1);
        let face = &packet.faces[0];
        assert_eq!(face.track_id, 1);
        assert_eq!(face.label, Emotion::Joy);
        assert_eq!(face.timestamp_ns, 7);
        assert!(packet.inference_ms >= 0.0);

        // same box again keeps the identity
        let packet = submit_and_wait(&worker, 8);
        assert_eq!(packet.faces[0].track_id, 1);
        assert_eq!(worker.try_consume_latest(), None);
    }

    #[test]
    fn test_pending_frame_is_replaced_by_newer_one() {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let mut worker = InferenceWorker::new();
        let (gate_tx, gate_rx) = crossbeam_channel::bounded(0);
        worker
            .start_with(
                Box::new(GatedDetector {
                    rows: Vec::new(),
                    entered: entered_tx,
                    gate: gate_rx,
                }),
                Box::new(JoyClassifier),
                WorkerConfig::default(),
            )
            .unwrap();

        worker.submit_frame(frame(1)).unwrap();
        let timeout = Duration::from_secs(5);
        assert_eq!(entered_rx.recv_timeout(timeout), Ok(1));

        // worker is busy with frame 1; frame 2 is overwritten by frame 3
        worker.submit_frame(frame(2)).unwrap();
        worker.submit_frame(frame(3)).unwrap();
        assert!(worker.queue_len() <= 1);

        gate_tx.send(()).unwrap();
        assert_eq!(entered_rx.recv_timeout(timeout), Ok(3));
        gate_tx.send(()).unwrap();

        let mut delivered = Vec::new();
        while delivered.last() != Some(&3) {
            delivered.push(wait_for_result(&worker).timestamp_ns);
        }
        assert!(!delivered.contains(&2));

        worker.stop();
        assert!(entered_rx.try_recv().is_err());
    }

    #[test]
    fn test_failed_cycle_yields_empty_result_and_worker_continues() {
        let mut worker = InferenceWorker::new();
        worker
            .start_with(
                Box::new(StubDetector {
                    rows: vec![row(20.0, 20.0, 40.0, 40.0)],
                    fail_at: Some(2),
                    panic_at: None,
                }),
                Box::new(JoyClassifier),
                WorkerConfig::default(),
            )
            .unwrap();

        assert_eq!(submit_and_wait(&worker, 1).faces[0].track_id, 1);
        assert!(submit_and_wait(&worker, 2).faces.is_empty());
        // tracking was reset, ids are not reused
        assert_eq!(submit_and_wait(&worker, 3).faces[0].track_id, 2);
    }

    #[test]
    fn test_panicking_cycle_is_contained() {
        let mut worker = InferenceWorker::new();
        worker
            .start_with(
                Box::new(StubDetector {
                    rows: vec![row(20.0, 20.0, 40.0, 40.0)],
                    fail_at: None,
                    panic_at: Some(1),
                }),
                Box::new(JoyClassifier),
                WorkerConfig::default(),
            )
            .unwrap();

        assert!(submit_and_wait(&worker, 1).faces.is_empty());
        assert_eq!(submit_and_wait(&worker, 2).faces.len(), 1);
        assert!(worker.is_running());
    }

    #[test]
    fn test_config_update_applies_to_next_cycle() {
        let mut worker = InferenceWorker::new();
        worker
            .start_with(
                StubDetector::faces(vec![
                    row(0.0, 0.0, 30.0, 30.0),
                    row(60.0, 0.0, 40.0, 40.0),
                    row(110.0, 60.0, 20.0, 20.0),
                ]),
                Box::new(JoyClassifier),
                WorkerConfig::default(),
            )
            .unwrap();

        assert_eq!(submit_and_wait(&worker, 1).faces.len(), 3);

        worker.update_config(WorkerConfig {
            max_faces: 1,
            ..WorkerConfig::default()
        });
        assert_eq!(worker.config().max_faces, 1);
        let packet = submit_and_wait(&worker, 2);
        assert_eq!(packet.faces.len(), 1);
        assert_eq!(packet.faces[0].bbox.width, 40);
    }

    #[test]
    fn test_config_update_during_cycle_waits_for_next_cycle() {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::bounded(0);
        let mut worker = InferenceWorker::new();
        worker
            .start_with(
                Box::new(GatedDetector {
                    rows: vec![
                        row(0.0, 0.0, 30.0, 30.0),
                        row(60.0, 0.0, 40.0, 40.0),
                        row(110.0, 60.0, 20.0, 20.0),
                    ],
                    entered: entered_tx,
                    gate: gate_rx,
                }),
                Box::new(JoyClassifier),
                WorkerConfig::default(),
            )
            .unwrap();
        let timeout = Duration::from_secs(5);

        worker.submit_frame(frame(1)).unwrap();
        assert_eq!(entered_rx.recv_timeout(timeout), Ok(1));
        worker.update_config(WorkerConfig {
            max_faces: 1,
            ..WorkerConfig::default()
        });
        gate_tx.send(()).unwrap();
        let packet = wait_for_result(&worker);
        assert_eq!(packet.timestamp_ns, 1);
        assert_eq!(packet.faces.len(), 3);

        worker.submit_frame(frame(2)).unwrap();
        assert_eq!(entered_rx.recv_timeout(timeout), Ok(2));
        gate_tx.send(()).unwrap();
        let packet = wait_for_result(&worker);
        assert_eq!(packet.timestamp_ns, 2);
        assert_eq!(packet.faces.len(), 1);
        assert_eq!(packet.faces[0].bbox.width, 40);
    }

    #[test]
    fn test_restart_resets_ids_and_buffers() {
        let mut worker = InferenceWorker::new();
        let config = WorkerConfig::default();
        worker
            .start_with(
                StubDetector::faces(vec![row(20.0, 20.0, 40.0, 40.0)]),
                Box::new(JoyClassifier),
                config,
            )
            .unwrap();
        submit_and_wait(&worker, 1);
        worker.submit_frame(frame(2)).unwrap();

        worker.stop();
        assert!(!worker.is_running());
        assert_eq!(worker.queue_len(), 0);
        assert_eq!(worker.try_consume_latest(), None);
        assert_eq!(worker.submit_frame(frame(3)), Err(SubmitError::NotRunning));

        // new detector with a disjoint box: a carried-over tracker would say 2
        worker
            .start_with(
                StubDetector::faces(vec![row(100.0, 60.0, 30.0, 30.0)]),
                Box::new(JoyClassifier),
                config,
            )
            .unwrap();
        assert_eq!(submit_and_wait(&worker, 4).faces[0].track_id, 1);
    }

    #[test]
    fn test_start_with_missing_models_fails_without_starting() {
        let mut worker = InferenceWorker::new();
        let err = worker
            .start(
                Path::new("/nonexistent/yunet.onnx"),
                Path::new("/nonexistent/ferplus.onnx"),
                WorkerConfig::default(),
            )
            .unwrap_err();

        assert!(matches!(err, WorkerError::DetectorLoad { .. }));
        assert!(!worker.is_running());
    }
}
