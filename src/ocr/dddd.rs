//! ddddocr engine: CRNN captcha model executed with ONNX Runtime.
//!
//! Input is a `[1, 1, 64, W]` grayscale tensor, output is either per-step
//! class scores or argmax indices depending on how the model was exported.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ort::logging::LogLevel;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use sha2::{Digest, Sha256};

use super::charset::Charset;
use super::ctc;
use super::engine::{CaptchaImage, CaptchaRecognizer};
use super::preprocess;
use crate::config::BridgeConfig;
use crate::error::OcrError;

/// Lowercase hex SHA-256 of the model bytes.
pub fn model_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fail if a pinned digest is configured and does not match.
pub fn verify_digest(bytes: &[u8], expected: Option<&str>) -> Result<String, OcrError> {
    let actual = model_digest(bytes);
    match expected {
        Some(expected) if expected != actual => Err(OcrError::ChecksumMismatch {
            expected: format!("sha256:{}", expected),
            actual: format!("sha256:{}", actual),
        }),
        _ => Ok(actual),
    }
}

/// Lock the session even if a previous run panicked while holding it.
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DdddOcrEngine {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    charset: Charset,
    target_height: u32,
}

impl DdddOcrEngine {
    /// Load model and charset as described by `config`.
    pub fn load(config: &BridgeConfig) -> Result<Self, OcrError> {
        let model_path = &config.model_path;
        if !config.has_model() {
            return Err(OcrError::ModelNotFound(model_path.clone()));
        }

        let bytes = std::fs::read(model_path).map_err(|e| OcrError::io(model_path, e))?;
        let digest = verify_digest(&bytes, config.model_sha256.as_deref())?;
        log::info!(
            "[DdddOcr] Loading {} ({} bytes, sha256:{})",
            model_path.display(),
            bytes.len(),
            digest
        );

        let charset = Charset::load_or_builtin(&config.charset_path);

        let session = Session::builder()
            .map_err(OcrError::runtime)?
            .with_log_level(LogLevel::Error)
            .map_err(OcrError::runtime)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(OcrError::runtime)?
            .with_intra_threads(config.intra_threads)
            .map_err(OcrError::runtime)?
            .commit_from_memory(&bytes)
            .map_err(OcrError::runtime)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| OcrError::InvalidModel("model declares no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| OcrError::InvalidModel("model declares no outputs".to_string()))?;

        log::info!(
            "[DdddOcr] Model ready: input '{}', output '{}', {} charset symbols",
            input_name,
            output_name,
            charset.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            charset,
            target_height: config.target_height,
        })
    }

    pub fn charset(&self) -> &Charset {
        &self.charset
    }
}

impl CaptchaRecognizer for DdddOcrEngine {
    fn name(&self) -> &str {
        "ddddocr"
    }

    fn recognize(&self, image: &CaptchaImage<'_>) -> Result<String, OcrError> {
        log::debug!("[DdddOcr] Input image {}x{}", image.width(), image.height());
        let input = preprocess::model_input(image.decoded(), self.target_height);
        let tensor = TensorRef::from_array_view(input.view()).map_err(OcrError::runtime)?;

        let mut session = lock_session(&self.session);
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(OcrError::runtime)?;
        let output = &outputs[self.output_name.as_str()];

        let text = if let Ok((shape, scores)) = output.try_extract_tensor::<f32>() {
            ctc::decode_logits(shape, scores, &self.charset)?
        } else {
            let (_, indices) = output
                .try_extract_tensor::<i64>()
                .map_err(OcrError::runtime)?;
            ctc::decode_indices(indices, &self.charset)
        };

        log::info!("[DdddOcr] Result: '{}'", text);
        if text.is_empty() {
            return Err(OcrError::NoText);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_lowercase_hex_sha256() {
        assert_eq!(
            model_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn poisoned_session_lock_is_recovered() {
        let session = std::sync::Arc::new(Mutex::new(7u32));
        let held = session.clone();
        let _ = std::thread::spawn(move || {
            let _guard = held.lock().unwrap();
            panic!("inference panicked");
        })
        .join();
        assert!(session.is_poisoned());

        *lock_session(&session) += 1;
        assert_eq!(*lock_session(&session), 8);
    }

    #[test]
    fn pinned_digest_must_match() {
        let actual = model_digest(b"model");
        assert_eq!(verify_digest(b"model", Some(&actual)).unwrap(), actual);
        assert_eq!(verify_digest(b"model", None).unwrap(), actual);

        let err = verify_digest(b"model", Some("deadbeef")).unwrap_err();
        assert!(matches!(err, OcrError::ChecksumMismatch { .. }));
        assert!(err.to_string().contains("sha256:deadbeef"));
    }

    #[test]
    fn missing_model_is_reported_before_runtime_load() {
        let config = BridgeConfig::with_resource_dir("/nonexistent/captcha-ocr-dddd-test");
        match DdddOcrEngine::load(&config) {
            Err(OcrError::ModelNotFound(path)) => assert!(path.ends_with("common_old.onnx")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("model should not load"),
        }
    }

    #[test]
    fn checksum_mismatch_stops_loading() {
        let dir = std::env::temp_dir().join("captcha-ocr-test-checksum");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("common_old.onnx"), b"not really a model").unwrap();

        let mut config = BridgeConfig::with_resource_dir(&dir);
        config.model_sha256 = Some("00".repeat(32));
        let result = DdddOcrEngine::load(&config);
        assert!(matches!(result, Err(OcrError::ChecksumMismatch { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
