/// YuNet face detector using ONNX Runtime via `ort`.
///
/// Handles stride-aligned padding, inference, anchor-free decoding of the
/// per-stride heads and NMS. Emits one 15-value row per face in the input
/// image's coordinates: `[x, y, w, h, 5 × (lx, ly), score]`.
use std::path::Path;

use crate::detection::domain::face_detector::{DetectionRow, FaceDetector};
use crate::shared::constants::DETECTION_ROW_LEN;
use crate::shared::frame::Frame;

use super::execution_provider::load_session;
use super::math::nms;

/// Feature-map strides of the 2023mar model, one head set per stride.
const STRIDES: [u32; 3] = [8, 16, 32];

/// Input dimensions are padded up to a multiple of the largest stride.
const PAD_ALIGNMENT: u32 = 32;

/// Minimum `sqrt(cls * obj)` for a candidate to enter NMS.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;

const NMS_IOU_THRESH: f32 = 0.3;
const NMS_TOP_K: usize = 5000;

const NUM_LANDMARKS: usize = 5;

/// YuNet face detector backed by an ONNX Runtime session.
pub struct OnnxYunetDetector {
    session: ort::session::Session,
    score_threshold: f32,
}

impl OnnxYunetDetector {
    /// Load a YuNet ONNX model and check it exposes the expected heads.
    pub fn new(model_path: &Path, score_threshold: f32) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;

        let output_names: Vec<&str> = session.outputs().iter().map(|o| o.name()).collect();
        for name in head_names() {
            if !output_names.contains(&name.as_str()) {
                return Err(format!(
                    "{} is not a YuNet model: output `{name}` missing",
                    model_path.display()
                )
                .into());
            }
        }

        Ok(Self {
            session,
            score_threshold,
        })
    }
}

impl FaceDetector for OnnxYunetDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionRow>, Box<dyn std::error::Error>> {
        let (input_tensor, pad_w, pad_h) = pad_to_stride(frame)?;

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        let extract = |name: String| -> Result<Vec<f32>, Box<dyn std::error::Error>> {
            let array = outputs[name.as_str()].try_extract_array::<f32>()?;
            Ok(array.iter().copied().collect())
        };

        let mut candidates = Vec::new();
        for stride in STRIDES {
            let heads = StrideHeads {
                stride,
                cls: extract(format!("cls_{stride}"))?,
                obj: extract(format!("obj_{stride}"))?,
                bbox: extract(format!("bbox_{stride}"))?,
                kps: extract(format!("kps_{stride}"))?,
            };
            heads.decode(pad_w, pad_h, self.score_threshold, &mut candidates)?;
        }

        Ok(suppress(candidates))
    }
}

fn head_names() -> Vec<String> {
    ["cls", "obj", "bbox", "kps"]
        .iter()
        .flat_map(|head| STRIDES.iter().map(move |s| format!("{head}_{s}")))
        .collect()
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Copy the frame into the top-left of a zero tensor whose sides are padded
/// up to a multiple of 32.
///
/// Returns `(NCHW float32 BGR tensor in 0–255, padded width, padded height)`.
fn pad_to_stride(frame: &Frame) -> Result<(ndarray::Array4<f32>, u32, u32), ndarray::ShapeError> {
    let pad_w = align_up(frame.width());
    let pad_h = align_up(frame.height());

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, pad_h as usize, pad_w as usize));
    let src = frame.as_ndarray()?; // [H, W, C] RGB
    for y in 0..frame.height() as usize {
        for x in 0..frame.width() as usize {
            // BGR channel order
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[y, x, 2 - c]] as f32;
            }
        }
    }

    Ok((tensor, pad_w, pad_h))
}

fn align_up(value: u32) -> u32 {
    value.max(1).div_ceil(PAD_ALIGNMENT) * PAD_ALIGNMENT
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

struct StrideHeads {
    stride: u32,
    cls: Vec<f32>,
    obj: Vec<f32>,
    bbox: Vec<f32>,
    kps: Vec<f32>,
}

type Candidate = [f32; DETECTION_ROW_LEN];

impl StrideHeads {
    fn decode(
        &self,
        pad_w: u32,
        pad_h: u32,
        score_threshold: f32,
        out: &mut Vec<Candidate>,
    ) -> Result<(), String> {
        let cols = (pad_w / self.stride) as usize;
        let rows = (pad_h / self.stride) as usize;
        let anchors = cols * rows;
        if self.cls.len() < anchors
            || self.obj.len() < anchors
            || self.bbox.len() < anchors * 4
            || self.kps.len() < anchors * NUM_LANDMARKS * 2
        {
            return Err(format!(
                "YuNet stride {} heads too short for {cols}x{rows} anchors",
                self.stride
            ));
        }

        let s = self.stride as f32;
        for r in 0..rows {
            for c in 0..cols {
                let idx = r * cols + c;
                let score = (self.cls[idx].clamp(0.0, 1.0) * self.obj[idx].clamp(0.0, 1.0)).sqrt();
                if score < score_threshold {
                    continue;
                }

                let b = &self.bbox[idx * 4..idx * 4 + 4];
                let cx = (c as f32 + b[0]) * s;
                let cy = (r as f32 + b[1]) * s;
                let w = b[2].exp() * s;
                let h = b[3].exp() * s;

                let mut row = [0.0f32; DETECTION_ROW_LEN];
                row[0] = cx - w / 2.0;
                row[1] = cy - h / 2.0;
                row[2] = w;
                row[3] = h;
                let k = &self.kps[idx * 10..idx * 10 + 10];
                for n in 0..NUM_LANDMARKS {
                    row[4 + n * 2] = (k[n * 2] + c as f32) * s;
                    row[4 + n * 2 + 1] = (k[n * 2 + 1] + r as f32) * s;
                }
                row[DETECTION_ROW_LEN - 1] = score;
                out.push(row);
            }
        }
        Ok(())
    }
}

fn suppress(candidates: Vec<Candidate>) -> Vec<DetectionRow> {
    let boxes: Vec<([f32; 4], f32)> = candidates
        .iter()
        .map(|c| ([c[0], c[1], c[0] + c[2], c[1] + c[3]], c[DETECTION_ROW_LEN - 1]))
        .collect();
    nms(&boxes, NMS_IOU_THRESH, NMS_TOP_K)
        .into_iter()
        .map(|i| candidates[i].to_vec())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
