//! Recognizer implemented by the host application through a C callback.
//!
//! Lets the host plug in whatever engine it already ships (a Swift ddddocr
//! port, Vision, ML Kit) ahead of the built-in chain.

use std::ffi::{c_char, c_void};

use super::engine::{CaptchaImage, CaptchaRecognizer};
use crate::error::OcrError;

/// Capacity of the output buffer handed to the callback, in bytes.
pub const OUTPUT_CAPACITY: usize = 256;

/// `isize callback(void *context, const uint8_t *data, size_t len, char *out, size_t out_capacity)`
///
/// Writes UTF-8 text into `out` (no terminator needed) and returns the number
/// of bytes written, or a negative value on failure.
pub type RecognizeCallback = unsafe extern "C" fn(
    context: *mut c_void,
    data: *const u8,
    len: usize,
    out: *mut c_char,
    out_capacity: usize,
) -> isize;

pub struct ForeignRecognizer {
    callback: RecognizeCallback,
    context: *mut c_void,
}

// SAFETY: the registration contract (see include/captcha_ocr_bridge.h)
// requires the callback and its context to be usable from any thread.
unsafe impl Send for ForeignRecognizer {}
unsafe impl Sync for ForeignRecognizer {}

impl ForeignRecognizer {
    /// # Safety
    ///
    /// `callback` must honour the contract of `RecognizeCallback`, and
    /// `context` must stay valid for as long as the recognizer is registered.
    pub unsafe fn new(callback: RecognizeCallback, context: *mut c_void) -> Self {
        Self { callback, context }
    }
}

impl CaptchaRecognizer for ForeignRecognizer {
    fn name(&self) -> &str {
        "host"
    }

    fn recognize(&self, image: &CaptchaImage<'_>) -> Result<String, OcrError> {
        let data = image.raw();
        let mut out = vec![0u8; OUTPUT_CAPACITY];

        // SAFETY: `data` and `out` are valid for the advertised lengths for
        // the duration of the call; see `ForeignRecognizer::new` for the rest.
        let written = unsafe {
            (self.callback)(
                self.context,
                data.as_ptr(),
                data.len(),
                out.as_mut_ptr().cast::<c_char>(),
                out.len(),
            )
        };

        let written = usize::try_from(written)
            .map_err(|_| OcrError::Platform(format!("host recognizer returned {}", written)))?;
        if written > out.len() {
            return Err(OcrError::Platform(format!(
                "host recognizer wrote {} bytes into a {} byte buffer",
                written,
                out.len()
            )));
        }
        out.truncate(written);

        let text = String::from_utf8(out)
            .map_err(|e| OcrError::Platform(format!("host recognizer returned invalid UTF-8: {}", e)))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(OcrError::NoText);
        }
        Ok(text.to_string())
    }
}
