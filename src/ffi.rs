//! C ABI for hosts in other runtimes (Kotlin/Native, Swift, C).
//!
//! Mirrors the Objective-C bridging contract:
//!   `+ (instancetype)shared`                        → `captcha_ocr_bridge_shared`
//!   `- (nullable NSString *)recognizeWithImageData:` → `captcha_ocr_bridge_recognize`
//!
//! Strings returned to the caller are owned by Rust and must be released
//! with `captcha_ocr_string_free`. No panic crosses this boundary.
//! The matching header is include/captcha_ocr_bridge.h.

use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use crate::bridge::CaptchaOcrBridge;
use crate::config;
use crate::ocr::{ForeignRecognizer, RecognizeCallback};

/// Returns the shared bridge, building it on first call. Never null unless
/// construction panicked.
#[no_mangle]
pub extern "C" fn captcha_ocr_bridge_shared() -> *const CaptchaOcrBridge {
    catch_unwind(|| CaptchaOcrBridge::shared() as *const CaptchaOcrBridge).unwrap_or_else(|_| {
        log::error!("[FFI] Bridge construction panicked");
        std::ptr::null()
    })
}

/// Recognize the captcha in `data[0..len]`.
///
/// Returns a NUL-terminated UTF-8 string to free with
/// `captcha_ocr_string_free`, or null when nothing was recognized.
///
/// # Safety
///
/// `bridge` must come from `captcha_ocr_bridge_shared`; `data` must point to
/// `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn captcha_ocr_bridge_recognize(
    bridge: *const CaptchaOcrBridge,
    data: *const u8,
    len: usize,
) -> *mut c_char {
    if bridge.is_null() || data.is_null() || len == 0 {
        return std::ptr::null_mut();
    }
    let bridge = &*bridge;
    let image_data = std::slice::from_raw_parts(data, len);

    let result = catch_unwind(AssertUnwindSafe(|| bridge.recognize(image_data)))
        .ok()
        .flatten();
    match result.map(CString::new) {
        Some(Ok(text)) => text.into_raw(),
        Some(Err(_)) => {
            log::warn!("[FFI] Result contains an interior NUL, dropping it");
            std::ptr::null_mut()
        }
        None => std::ptr::null_mut(),
    }
}

/// Free a string returned by `captcha_ocr_bridge_recognize`. Null is a no-op.
///
/// # Safety
///
/// `text` must be null or a pointer previously returned by
/// `captcha_ocr_bridge_recognize` that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn captcha_ocr_string_free(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

/// Point the bridge at the directory holding `common_old.onnx` and
/// `charsets_old.json` (e.g. the app bundle's resource path).
///
/// Must be called before the first `captcha_ocr_bridge_shared`. Returns
/// false if it is too late, the path was already set, or `path` is invalid.
///
/// # Safety
///
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn captcha_ocr_bridge_set_resource_dir(path: *const c_char) -> bool {
    if path.is_null() {
        return false;
    }
    if CaptchaOcrBridge::is_initialized() {
        log::warn!("[FFI] Resource dir set after the bridge was built; ignoring");
        return false;
    }
    let Ok(path) = CStr::from_ptr(path).to_str() else {
        log::warn!("[FFI] Resource dir is not valid UTF-8");
        return false;
    };
    if path.is_empty() {
        return false;
    }
    config::set_resource_dir(PathBuf::from(path))
}

/// Register a host recognizer that runs before the built-in engines.
///
/// # Safety
///
/// `bridge` must come from `captcha_ocr_bridge_shared`. `callback` must be
/// callable from any thread and `context` must outlive the registration.
#[no_mangle]
pub unsafe extern "C" fn captcha_ocr_bridge_register_recognizer(
    bridge: *const CaptchaOcrBridge,
    callback: Option<RecognizeCallback>,
    context: *mut c_void,
) -> bool {
    let (Some(bridge), Some(callback)) = (bridge.as_ref(), callback) else {
        return false;
    };
    let recognizer = ForeignRecognizer::new(callback, context);
    match bridge.register_recognizer(Box::new(recognizer)) {
        Ok(()) => true,
        Err(e) => {
            log::error!("[FFI] Failed to register recognizer: {}", e);
            false
        }
    }
}

/// Initialize `env_logger` (reads `RUST_LOG`). Safe to call more than once.
#[no_mangle]
pub extern "C" fn captcha_ocr_init_logging() {
    let _ = env_logger::try_init();
}
