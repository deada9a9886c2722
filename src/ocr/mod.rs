//! OCR domain: captcha recognizers and the pieces they are built from.
//!
//! The bridge composes these into a fallback chain:
//!   - `dddd`          ddddocr CRNN model on ONNX Runtime (primary)
//!   - `foreign`       recognizer supplied by the host over the C ABI
//!   - `apple_vision`  Apple Vision fallback (macOS, feature `apple-vision`)

#[cfg(all(target_os = "macos", feature = "apple-vision"))]
pub mod apple_vision;
pub mod charset;
pub mod ctc;
pub mod dddd;
pub mod engine;
pub mod foreign;
pub mod preprocess;
pub mod strategies;
pub mod text;

pub use charset::Charset;
pub use dddd::DdddOcrEngine;
pub use engine::{CaptchaImage, CaptchaRecognizer};
pub use foreign::{ForeignRecognizer, RecognizeCallback};
pub use strategies::{MultiPassRecognizer, Pass, TextReader};

use crate::config::BridgeConfig;

/// Build the platform OCR fallback, if this build has one.
#[cfg(all(target_os = "macos", feature = "apple-vision"))]
pub fn platform_fallback() -> Option<Box<dyn CaptchaRecognizer>> {
    apple_vision::warm_up();
    Some(Box::new(apple_vision::recognizer()))
}

#[cfg(not(all(target_os = "macos", feature = "apple-vision")))]
pub fn platform_fallback() -> Option<Box<dyn CaptchaRecognizer>> {
    None
}

/// Recognizer chain for `config`, in priority order.
pub fn build_chain(config: &BridgeConfig) -> Vec<Box<dyn CaptchaRecognizer>> {
    let mut chain: Vec<Box<dyn CaptchaRecognizer>> = Vec::new();

    if config.has_model() {
        // ONNX Runtime is loaded dynamically and panics if the library is missing.
        match std::panic::catch_unwind(|| DdddOcrEngine::load(config)) {
            Ok(Ok(engine)) => {
                log::info!("[CaptchaOCR] ddddocr ready, using ONNX model");
                chain.push(Box::new(engine));
            }
            Ok(Err(e)) => log::warn!("[CaptchaOCR] ddddocr failed to load, skipping: {}", e),
            Err(_) => log::error!(
                "[CaptchaOCR] ONNX Runtime library could not be loaded (set ORT_DYLIB_PATH), skipping ddddocr"
            ),
        }
    } else {
        log::warn!(
            "[CaptchaOCR] ddddocr model not found at {}",
            config.model_path.display()
        );
    }

    if config.platform_fallback {
        match platform_fallback() {
            Some(fallback) => {
                log::info!("[CaptchaOCR] Platform fallback enabled: {}", fallback.name());
                chain.push(fallback);
            }
            None => log::debug!("[CaptchaOCR] No platform OCR fallback in this build"),
        }
    }

    chain
}
