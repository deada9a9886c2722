//! Recognizer trait shared by every engine in the fallback chain.

use image::DynamicImage;

use crate::error::OcrError;

/// A captcha payload that has already been decoded.
///
/// Engines that run on pixels use `decoded()`; engines living in another
/// runtime (host callbacks, platform OCR) may prefer the original bytes.
pub struct CaptchaImage<'a> {
    raw: &'a [u8],
    decoded: DynamicImage,
}

impl<'a> CaptchaImage<'a> {
    /// Decode PNG or JPEG bytes.
    pub fn decode(raw: &'a [u8]) -> Result<Self, OcrError> {
        if raw.is_empty() {
            return Err(OcrError::EmptyInput);
        }
        let decoded = image::load_from_memory(raw)?;
        Ok(Self { raw, decoded })
    }

    pub fn raw(&self) -> &[u8] {
        self.raw
    }

    pub fn decoded(&self) -> &DynamicImage {
        &self.decoded
    }

    pub fn width(&self) -> u32 {
        self.decoded.width()
    }

    pub fn height(&self) -> u32 {
        self.decoded.height()
    }
}

/// One link in the recognition chain.
///
/// Implementations must be callable from any thread; engines that wrap a
/// non-reentrant runtime serialize internally.
pub trait CaptchaRecognizer: Send + Sync {
    /// Short identifier used in logs (e.g. "ddddocr", "vision").
    fn name(&self) -> &str;

    /// Recognize the captcha text. An empty string counts as a failure.
    fn recognize(&self, image: &CaptchaImage<'_>) -> Result<String, OcrError>;
}
