//! macOS OCR fallback via Apple Vision Framework (swift-bridge FFI).
//!
//! Only compiled on macOS with the `apple-vision` feature. The Swift side
//! (swift-src/vision_bridge.swift) runs VNRecognizeTextRequest in accurate
//! mode, en-US, without language correction, and returns the raw text.

use super::strategies::{MultiPassRecognizer, TextReader};
use crate::error::OcrError;

#[swift_bridge::bridge]
mod ffi {
    extern "Swift" {
        fn vision_recognize_image_data(data: Vec<u8>) -> String;
        fn warm_up_vision();
    }
}

pub struct VisionReader;

impl TextReader for VisionReader {
    fn name(&self) -> &str {
        "vision"
    }

    fn read_text(&self, image_data: &[u8]) -> Result<String, OcrError> {
        let start = std::time::Instant::now();
        let text = ffi::vision_recognize_image_data(image_data.to_vec());
        log::debug!(
            "[Vision] Recognized {} chars in {}ms",
            text.chars().count(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

/// Vision wrapped in the multi-pass captcha strategy.
pub fn recognizer() -> MultiPassRecognizer<VisionReader> {
    MultiPassRecognizer::new(VisionReader)
}

/// Warm up Vision Framework with a throwaway recognition request.
pub fn warm_up() {
    let start = std::time::Instant::now();
    ffi::warm_up_vision();
    log::info!("[Vision] Warm-up complete in {}ms", start.elapsed().as_millis());
}
