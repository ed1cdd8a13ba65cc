/// Face detection plus identity embedding on ONNX Runtime via `ort`.
///
/// A YOLO face model finds boxes (letterbox preprocessing, confidence
/// filter, greedy NMS); each surviving box is cropped and run through an
/// ArcFace model to produce its embedding.
use std::path::Path;

use crate::detection::domain::face_embedder::{FaceEmbedder, FaceObservation};
use crate::shared::bbox::bbox_iou;
use crate::shared::frame::Frame;

/// Fallback YOLO input resolution when the model shape is dynamic.
const DEFAULT_INPUT_SIZE: u32 = 640;

const NMS_IOU_THRESH: f64 = 0.45;

/// YOLO pads the letterbox with this gray level.
const LETTERBOX_FILL: f32 = 114.0 / 255.0;

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_NORM_MEAN: f32 = 127.5;
const EMBED_NORM_STD: f32 = 127.5;

pub struct OnnxFaceEmbedder {
    detector: ort::session::Session,
    embedder: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceEmbedder {
    /// Loads both models. `confidence` is the minimum YOLO face score.
    pub fn new(
        detector_model: &Path,
        embedding_model: &Path,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let detector = build_session(detector_model)?;
        let embedder = build_session(embedding_model)?;

        // NCHW: [1, 3, H, W]
        let input_size = detector
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

        log::debug!(
            "Loaded detector {} (input {input_size}) and embedder {}",
            detector_model.display(),
            embedding_model.display()
        );

        Ok(Self {
            detector,
            embedder,
            confidence,
            input_size,
        })
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let letterboxed = letterbox(frame, self.input_size);
        let input_value = ort::value::Tensor::from_array(letterboxed.tensor)?;
        let outputs = self.detector.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut dets = parse_yolo_output(
            data,
            &shape,
            self.confidence,
            &letterboxed.mapping,
            frame.width(),
            frame.height(),
        )?;
        Ok(nms(&mut dets, NMS_IOU_THRESH))
    }

    fn embed(&mut self, crop: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let tensor = preprocess_face(crop);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.embedder.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("Embedding model produced no outputs".into());
        }
        let embedding = outputs[0].try_extract_array::<f32>()?;
        let slice = embedding.as_slice().ok_or("Cannot get embedding slice")?;
        Ok(slice.to_vec())
    }
}

impl FaceEmbedder for OnnxFaceEmbedder {
    fn detect_and_embed(
        &mut self,
        frame: &Frame,
    ) -> Result<Vec<FaceObservation>, Box<dyn std::error::Error>> {
        let dets = self.detect(frame)?;
        let mut faces = Vec::with_capacity(dets.len());
        for det in dets {
            let Some(crop) = frame.crop(&det.bbox) else {
                continue;
            };
            faces.push(FaceObservation {
                bbox: det.bbox,
                embedding: self.embed(&crop)?,
            });
        }
        Ok(faces)
    }
}

fn build_session(model_path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Hardware provider for the current platform. ort falls back to CPU when
/// it is unavailable.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
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
// Detection preprocessing
// ---------------------------------------------------------------------------

/// Maps letterbox coordinates back onto the source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
struct LetterboxMapping {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl LetterboxMapping {
    fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

struct Letterboxed {
    tensor: ndarray::Array4<f32>,
    mapping: LetterboxMapping,
}

/// Nearest-neighbor resize into a `target_size` square, preserving aspect
/// ratio and padding the remainder. Output is NCHW in `[0, 1]`.
fn letterbox(frame: &Frame, target_size: u32) -> Letterboxed {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        LETTERBOX_FILL,
    );

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Letterboxed {
        tensor,
        mapping: LetterboxMapping {
            scale,
            pad_x,
            pad_y,
        },
    }
}

// ---------------------------------------------------------------------------
// Detection postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
struct RawDetection {
    bbox: [f64; 4],
    confidence: f64,
}

/// Decodes YOLO rows of `[cx, cy, w, h, conf, ...]` into frame-space boxes.
///
/// Accepts both `[1, features, detections]` and `[1, detections, features]`
/// layouts. Boxes are clamped to the frame; degenerate ones are dropped.
fn parse_yolo_output(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    mapping: &LetterboxMapping,
    frame_width: u32,
    frame_height: u32,
) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 || data.len() < num_dets * num_feats {
        return Err(format!("YOLO output too small for shape {shape:?}").into());
    }

    let feature = |det: usize, f: usize| -> f64 {
        if transposed {
            data[f * num_dets + det] as f64
        } else {
            data[det * num_feats + f] as f64
        }
    };

    let fw = frame_width as f64;
    let fh = frame_height as f64;
    let mut dets = Vec::new();
    for i in 0..num_dets {
        let conf = feature(i, 4);
        if conf < confidence {
            continue;
        }
        let (cx, cy, w, h) = (feature(i, 0), feature(i, 1), feature(i, 2), feature(i, 3));
        let (x1, y1) = mapping.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = mapping.to_frame(cx + w / 2.0, cy + h / 2.0);
        let bbox = [
            x1.clamp(0.0, fw),
            y1.clamp(0.0, fh),
            x2.clamp(0.0, fw),
            y2.clamp(0.0, fh),
        ];
        if bbox[2] - bbox[0] < 1.0 || bbox[3] - bbox[1] < 1.0 {
            continue;
        }
        dets.push(RawDetection {
            bbox,
            confidence: conf,
        });
    }
    Ok(dets)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| bbox_iou(&k.bbox, &det.bbox) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

// ---------------------------------------------------------------------------
// Embedding preprocessing
// ---------------------------------------------------------------------------

/// Resize crop to 112x112, normalize to `[-1, 1]`, NCHW layout.
fn preprocess_face(crop: &Frame) -> ndarray::Array4<f32> {
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;
    let channels = crop.channels() as usize;
    let data = crop.data();

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE));

    for y in 0..EMBED_INPUT_SIZE {
        let src_y =
            (((y as f64 + 0.5) * src_h as f64 / EMBED_INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..EMBED_INPUT_SIZE {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / EMBED_INPUT_SIZE as f64) as usize)
                .min(src_w - 1);
            let offset = (src_y * src_w + src_x) * channels;
            for c in 0..3 {
                tensor[[0, c, y, x]] = (data[offset + c] as f32 - EMBED_NORM_MEAN) / EMBED_NORM_STD;
            }
        }
    }

    tensor
}
