//! Recognition bridge: the process-wide captcha recognizer.
//!
//! `CaptchaOcrBridge::shared()` lazily builds one instance from the
//! environment and keeps it for the life of the process. `recognize` takes
//! encoded PNG/JPEG bytes and returns the text, or `None` for any failure.

use std::panic::AssertUnwindSafe;
use std::sync::{OnceLock, RwLock};
use std::time::Instant;

use crate::config::BridgeConfig;
use crate::error::OcrError;
use crate::ocr::{self, CaptchaImage, CaptchaRecognizer};

static SHARED: OnceLock<CaptchaOcrBridge> = OnceLock::new();

pub struct CaptchaOcrBridge {
    chain: Vec<Box<dyn CaptchaRecognizer>>,
    /// Host-registered recognizer, tried before `chain`.
    registered: RwLock<Option<Box<dyn CaptchaRecognizer>>>,
}

impl CaptchaOcrBridge {
    /// The process-wide instance, built on first call.
    pub fn shared() -> &'static CaptchaOcrBridge {
        SHARED.get_or_init(|| {
            let config = BridgeConfig::from_env();
            log::info!(
                "[CaptchaOCR] Building shared bridge (resources: {})",
                config.resource_dir.display()
            );
            let bridge = Self::new(&config);
            if bridge.chain.is_empty() {
                log::warn!(
                    "[CaptchaOCR] No built-in recognizer available; results depend on a registered host recognizer"
                );
            }
            bridge
        })
    }

    /// Whether `shared()` has already built the instance.
    pub fn is_initialized() -> bool {
        SHARED.get().is_some()
    }

    /// Bridge with the recognizer chain described by `config`.
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_recognizers(ocr::build_chain(config))
    }

    /// Bridge with an explicit chain, tried in order.
    pub fn with_recognizers(chain: Vec<Box<dyn CaptchaRecognizer>>) -> Self {
        Self {
            chain,
            registered: RwLock::new(None),
        }
    }

    /// Install a recognizer that runs before the built-in chain.
    ///
    /// Replaces any previously registered recognizer.
    pub fn register_recognizer(&self, recognizer: Box<dyn CaptchaRecognizer>) -> Result<(), OcrError> {
        let name = recognizer.name().to_string();
        let mut slot = self.registered.write().map_err(|_| OcrError::LockPoisoned)?;
        if let Some(previous) = slot.replace(recognizer) {
            log::info!("[CaptchaOCR] Replaced registered recognizer '{}'", previous.name());
        }
        log::info!("[CaptchaOCR] Registered external recognizer '{}'", name);
        Ok(())
    }

    /// Remove the registered recognizer, if any.
    pub fn clear_registered_recognizer(&self) -> Result<(), OcrError> {
        let mut slot = self.registered.write().map_err(|_| OcrError::LockPoisoned)?;
        *slot = None;
        Ok(())
    }

    /// Names of the recognizers that will be tried, in order.
    pub fn recognizer_names(&self) -> Vec<String> {
        let registered = self
            .registered
            .read()
            .map(|slot| slot.as_ref().map(|r| r.name().to_string()))
            .unwrap_or(None);
        registered
            .into_iter()
            .chain(self.chain.iter().map(|r| r.name().to_string()))
            .collect()
    }

    /// Recognize the captcha in `image_data`.
    ///
    /// Returns `None` when the payload is empty or undecodable, when no
    /// recognizer produced text, or when a recognizer failed. The cause is
    /// logged; use `try_recognize` to inspect it.
    pub fn recognize(&self, image_data: &[u8]) -> Option<String> {
        let start = Instant::now();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.try_recognize(image_data)));
        match outcome {
            Ok(Ok(text)) => {
                log::info!(
                    "[CaptchaOCR] Recognized '{}' in {}ms",
                    text,
                    start.elapsed().as_millis()
                );
                Some(text)
            }
            Ok(Err(e)) => {
                log::warn!("[CaptchaOCR] Recognition failed: {}", e);
                None
            }
            Err(_) => {
                log::error!("[CaptchaOCR] Recognizer panicked");
                None
            }
        }
    }

    /// Like `recognize`, but keeps the failure cause.
    pub fn try_recognize(&self, image_data: &[u8]) -> Result<String, OcrError> {
        let image = CaptchaImage::decode(image_data)?;
        log::debug!(
            "[CaptchaOCR] Decoded {} bytes into {}x{}",
            image_data.len(),
            image.width(),
            image.height()
        );

        let registered = self.registered.read().map_err(|_| OcrError::LockPoisoned)?;
        let recognizers = registered
            .iter()
            .map(|r| &**r)
            .chain(self.chain.iter().map(|r| &**r));

        let mut last_error = None;
        for recognizer in recognizers {
            match recognizer.recognize(&image) {
                Ok(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        log::debug!("[CaptchaOCR] '{}' answered '{}'", recognizer.name(), text);
                        return Ok(text.to_string());
                    }
                    log::debug!("[CaptchaOCR] '{}' returned empty text", recognizer.name());
                    last_error = Some(OcrError::NoText);
                }
                Err(e) => {
                    log::debug!("[CaptchaOCR] '{}' failed: {}", recognizer.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(OcrError::NoRecognizer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl CaptchaRecognizer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn recognize(&self, _image: &CaptchaImage<'_>) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn empty_payload_is_empty_input() {
        let bridge = CaptchaOcrBridge::with_recognizers(vec![Box::new(Fixed("AB12"))]);
        assert!(matches!(bridge.try_recognize(&[]), Err(OcrError::EmptyInput)));
        assert_eq!(bridge.recognize(&[]), None);
    }

    #[test]
    fn garbage_payload_is_decode_error() {
        let bridge = CaptchaOcrBridge::with_recognizers(vec![Box::new(Fixed("AB12"))]);
        assert!(matches!(
            bridge.try_recognize(b"definitely not an image"),
            Err(OcrError::Decode(_))
        ));
    }

    #[test]
    fn registered_recognizer_is_listed_first() {
        let bridge = CaptchaOcrBridge::with_recognizers(vec![Box::new(Fixed("AB12"))]);
        assert_eq!(bridge.recognizer_names(), vec!["fixed"]);

        struct Host;
        impl CaptchaRecognizer for Host {
            fn name(&self) -> &str {
                "host"
            }
            fn recognize(&self, _image: &CaptchaImage<'_>) -> Result<String, OcrError> {
                Err(OcrError::NoText)
            }
        }

        bridge.register_recognizer(Box::new(Host)).unwrap();
        assert_eq!(bridge.recognizer_names(), vec!["host", "fixed"]);
        bridge.clear_registered_recognizer().unwrap();
        assert_eq!(bridge.recognizer_names(), vec!["fixed"]);
    }
}
