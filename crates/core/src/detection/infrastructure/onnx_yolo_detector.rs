//! YOLO face detector using ONNX Runtime via `ort`.
//!
//! Only the number of faces matters for check-in, so post-processing stops
//! after confidence filtering and NMS.
use std::path::Path;

use crate::detection::domain::face_detector::{Detection, FaceDetector};
use crate::shared::frame::Frame;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const NMS_IOU_THRESH: f64 = 0.45;

/// Row layout: `[cx, cy, w, h, conf, ...keypoints]`.
const MIN_ROW_LEN: usize = 5;

pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Loads the model. Input resolution comes from the NCHW input shape,
    /// falling back to 640 for dynamic shapes.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { ref shape, .. }
                    if shape.len() >= 4 && shape[2] > 0 =>
                {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded face model {} (input {input_size}px, confidence {confidence:.2})",
            model_path.display()
        );

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detection, Box<dyn std::error::Error>> {
        let letterboxed = letterbox(frame, self.input_size);
        log::trace!(
            "Letterbox scale {:.3}, padding ({}, {})",
            letterboxed.scale,
            letterboxed.pad_x,
            letterboxed.pad_y
        );

        let input_value = ort::value::Tensor::from_array(letterboxed.tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let layout = OutputLayout::from_shape(tensor.shape())?;
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut boxes = parse_boxes(data, layout, self.confidence);
        let kept = nms(&mut boxes, NMS_IOU_THRESH);

        Ok(Detection {
            face_count: kept.len(),
        })
    }
}

/// Hardware acceleration per platform; an empty list means CPU.
fn execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

struct Letterboxed {
    tensor: ndarray::Array4<f32>,
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

/// Aspect-preserving resize into a `target_size` square padded with YOLO gray,
/// normalised to `[0, 1]` in NCHW order.
fn letterbox(frame: &Frame, target_size: u32) -> Letterboxed {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = (fw * scale).round() as u32;
    let new_h = (fh * scale).round() as u32;
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, pad_y as usize + y, pad_x as usize + x]] =
                    src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Letterboxed {
        tensor,
        scale,
        pad_x,
        pad_y,
    }
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

/// YOLO exports emit `[1, features, detections]` or `[1, detections, features]`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct OutputLayout {
    num_dets: usize,
    num_feats: usize,
    transposed: bool,
}

impl OutputLayout {
    fn from_shape(shape: &[usize]) -> Result<Self, Box<dyn std::error::Error>> {
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        Ok(Self {
            num_dets,
            num_feats,
            transposed,
        })
    }

    fn value(&self, data: &[f32], det: usize, feat: usize) -> f32 {
        if self.transposed {
            data[feat * self.num_dets + det]
        } else {
            data[det * self.num_feats + feat]
        }
    }
}

/// Box in letterbox coordinates. Counting faces does not need the mapping
/// back to frame coordinates, and IoU is scale-invariant.
#[derive(Clone, Debug)]
struct ScoredBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

fn parse_boxes(data: &[f32], layout: OutputLayout, confidence: f64) -> Vec<ScoredBox> {
    if layout.num_feats < MIN_ROW_LEN {
        return Vec::new();
    }
    (0..layout.num_dets)
        .filter_map(|i| {
            let conf = layout.value(data, i, 4) as f64;
            if conf < confidence {
                return None;
            }
            let cx = layout.value(data, i, 0) as f64;
            let cy = layout.value(data, i, 1) as f64;
            let w = layout.value(data, i, 2) as f64;
            let h = layout.value(data, i, 3) as f64;
            Some(ScoredBox {
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
                confidence: conf,
            })
        })
        .collect()
}

/// Greedy NMS: highest confidence first, drop boxes overlapping a kept one.
fn nms(boxes: &mut [ScoredBox], iou_thresh: f64) -> Vec<ScoredBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<ScoredBox> = Vec::new();
    for candidate in boxes.iter() {
        if keep.iter().all(|k| iou(k, candidate) <= iou_thresh) {
            keep.push(candidate.clone());
        }
    }
    keep
}

fn iou(a: &ScoredBox, b: &ScoredBox) -> f64 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}
