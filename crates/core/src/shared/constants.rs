pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Minimum cosine similarity to the reference face for a detection to count.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Consecutive matched frames before a track is confirmed.
pub const DEFAULT_N_INIT: usize = 3;

/// Consecutive missed frames before a track is deleted (~1 second at 30 fps).
pub const DEFAULT_MAX_AGE: usize = 30;

pub const DEFAULT_CLIP_EXTENSION: &str = "mp4";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
