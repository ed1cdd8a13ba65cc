pub mod model_resolver;
pub mod onnx_face_embedder;
