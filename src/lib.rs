//! captcha-ocr-bridge: process-wide captcha recognition for foreign runtimes.
//!
//! One shared recognizer, lazily built, callable from Rust or over the C ABI:
//!
//! ```no_run
//! use captcha_ocr_bridge::CaptchaOcrBridge;
//!
//! let png = std::fs::read("captcha.png").unwrap();
//! match CaptchaOcrBridge::shared().recognize(&png) {
//!     Some(text) => println!("captcha: {text}"),
//!     None => println!("not recognized"),
//! }
//! ```
//!
//! Layout:
//!   - bridge.rs singleton and fallback chain
//!   - ffi.rs    exported C functions (include/captcha_ocr_bridge.h)
//!   - config.rs CAPTCHA_OCR_* environment configuration
//!   - ocr/      recognizers, preprocessing, CTC decoding

pub mod bridge;
pub mod config;
pub mod error;
pub mod ffi;
pub mod ocr;

pub use bridge::CaptchaOcrBridge;
pub use config::BridgeConfig;
pub use error::OcrError;
pub use ocr::{CaptchaImage, CaptchaRecognizer};
