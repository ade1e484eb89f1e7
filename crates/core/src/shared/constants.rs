pub const FACE_MODEL_NAME: &str = "face_detection_yunet_2023mar.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/opencv/opencv_zoo/raw/main/models/face_detection_yunet/face_detection_yunet_2023mar.onnx";

pub const EMOTION_MODEL_NAME: &str = "emotion-ferplus-8.onnx";
pub const EMOTION_MODEL_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/emotion_ferplus/model/emotion-ferplus-8.onnx";

/// Number of values the emotion classifier emits per face.
pub const EMOTION_CLASS_COUNT: usize = 8;

/// Side length of the square grayscale crop fed to the classifier.
pub const CLASSIFIER_INPUT_SIZE: u32 = 64;

/// Values per detector row: box (4), five landmarks (10), score (1).
pub const DETECTION_ROW_LEN: usize = 15;

/// Column of the confidence score within a detector row.
pub const DETECTION_SCORE_INDEX: usize = 14;

/// Minimum IoU (exclusive) for a detection to continue an existing track.
pub const TRACK_IOU_THRESHOLD: f64 = 0.2;

/// Elapsed time assumed for a track without a usable prior timestamp.
pub const DEFAULT_FRAME_INTERVAL_SECONDS: f64 = 1.0 / 15.0;

/// Floor for the smoothing time constant.
pub const MIN_SMOOTHING_TAU_SECONDS: f64 = 0.001;

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Interval between performance reports, in frame time.
pub const PERF_REPORT_INTERVAL_NS: u64 = 5 * NANOS_PER_SECOND;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
