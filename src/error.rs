//! Error taxonomy for the recognition pipeline.
//!
//! These errors never cross the C boundary: the bridge collapses every
//! variant into an absent result and logs the cause.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("image payload is empty")]
    EmptyInput,

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid charset: {0}")]
    Charset(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("ONNX Runtime error: {0}")]
    Runtime(String),

    #[error("unexpected model output shape {0:?}")]
    OutputShape(Vec<i64>),

    #[error("no text recognized")]
    NoText,

    #[error("no recognizer available")]
    NoRecognizer,

    #[error("recognizer lock poisoned")]
    LockPoisoned,

    #[error("platform OCR failed: {0}")]
    Platform(String),
}

impl OcrError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OcrError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn runtime(e: impl std::fmt::Display) -> Self {
        OcrError::Runtime(e.to_string())
    }
}
