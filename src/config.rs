//! Runtime configuration for the recognition bridge.
//!
//! Everything is read from environment variables so the host app can
//! configure the bridge without a config file. Model and charset default
//! to files inside a resource directory:
//!   1. `CAPTCHA_OCR_RESOURCE_DIR`
//!   2. the directory set via `set_resource_dir` (C: `captcha_ocr_bridge_set_resource_dir`)
//!   3. `~/.local/share/captcha-ocr` (platform data dir)

use std::path::PathBuf;
use std::sync::OnceLock;

/// Default ddddocr model filename.
pub const MODEL_FILENAME: &str = "common_old.onnx";

/// Default charset filename.
pub const CHARSET_FILENAME: &str = "charsets_old.json";

/// Model input height expected by the ddddocr CRNN.
pub const DEFAULT_TARGET_HEIGHT: u32 = 64;

static RESOURCE_DIR_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

/// Set the resource directory before the shared bridge is built.
///
/// Returns false if a directory was already set.
pub fn set_resource_dir(dir: PathBuf) -> bool {
    let accepted = RESOURCE_DIR_OVERRIDE.set(dir).is_ok();
    if accepted {
        log::info!(
            "[CONFIG] Resource dir set to {}",
            RESOURCE_DIR_OVERRIDE.get().map(|d| d.display().to_string()).unwrap_or_default()
        );
    }
    accepted
}

fn default_resource_dir() -> PathBuf {
    if let Some(dir) = RESOURCE_DIR_OVERRIDE.get() {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("captcha-ocr")
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub resource_dir: PathBuf,
    pub model_path: PathBuf,
    pub charset_path: PathBuf,
    /// Pinned model digest, lowercase hex without the `sha256:` prefix.
    pub model_sha256: Option<String>,
    pub target_height: u32,
    pub intra_threads: usize,
    pub platform_fallback: bool,
}

impl BridgeConfig {
    /// Config rooted at `resource_dir` with all other values at their defaults.
    pub fn with_resource_dir(resource_dir: impl Into<PathBuf>) -> Self {
        let resource_dir = resource_dir.into();
        Self {
            model_path: resource_dir.join(MODEL_FILENAME),
            charset_path: resource_dir.join(CHARSET_FILENAME),
            resource_dir,
            model_sha256: None,
            target_height: DEFAULT_TARGET_HEIGHT,
            intra_threads: 1,
            platform_fallback: true,
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let resource_dir = get("CAPTCHA_OCR_RESOURCE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_resource_dir);
        let mut config = Self::with_resource_dir(resource_dir);

        if let Some(path) = get("CAPTCHA_OCR_MODEL") {
            config.model_path = PathBuf::from(path);
        }
        if let Some(path) = get("CAPTCHA_OCR_CHARSET") {
            config.charset_path = PathBuf::from(path);
        }
        config.model_sha256 = get("CAPTCHA_OCR_MODEL_SHA256").map(|d| normalize_digest(&d));

        if let Some(raw) = get("CAPTCHA_OCR_TARGET_HEIGHT") {
            match raw.parse::<u32>() {
                Ok(h) if h > 0 => config.target_height = h,
                _ => log::warn!(
                    "[CONFIG] Ignoring CAPTCHA_OCR_TARGET_HEIGHT={}, using {}",
                    raw,
                    DEFAULT_TARGET_HEIGHT
                ),
            }
        }
        if let Some(raw) = get("CAPTCHA_OCR_THREADS") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.intra_threads = n,
                _ => log::warn!("[CONFIG] Ignoring CAPTCHA_OCR_THREADS={}, using 1", raw),
            }
        }
        if let Some(raw) = get("CAPTCHA_OCR_PLATFORM_FALLBACK") {
            match parse_bool(&raw) {
                Some(enabled) => config.platform_fallback = enabled,
                None => log::warn!(
                    "[CONFIG] Ignoring CAPTCHA_OCR_PLATFORM_FALLBACK={}, using true",
                    raw
                ),
            }
        }

        config
    }

    /// Whether the model file is present on disk.
    pub fn has_model(&self) -> bool {
        self.model_path.is_file()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::with_resource_dir(default_resource_dir())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Accepts `sha256:<hex>` or bare hex, returns lowercase bare hex.
pub(crate) fn normalize_digest(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("sha256:")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_derive_from_resource_dir() {
        let config = BridgeConfig::from_lookup(lookup_from(&[(
            "CAPTCHA_OCR_RESOURCE_DIR",
            "/opt/captcha",
        )]));
        assert_eq!(config.model_path, PathBuf::from("/opt/captcha/common_old.onnx"));
        assert_eq!(config.charset_path, PathBuf::from("/opt/captcha/charsets_old.json"));
        assert_eq!(config.target_height, 64);
        assert_eq!(config.intra_threads, 1);
        assert!(config.platform_fallback);
        assert!(config.model_sha256.is_none());
    }

    #[test]
    fn explicit_paths_override_resource_dir() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("CAPTCHA_OCR_RESOURCE_DIR", "/opt/captcha"),
            ("CAPTCHA_OCR_MODEL", "/models/custom.onnx"),
            ("CAPTCHA_OCR_CHARSET", "/models/custom.json"),
        ]));
        assert_eq!(config.model_path, PathBuf::from("/models/custom.onnx"));
        assert_eq!(config.charset_path, PathBuf::from("/models/custom.json"));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("CAPTCHA_OCR_TARGET_HEIGHT", "tall"),
            ("CAPTCHA_OCR_THREADS", "0"),
            ("CAPTCHA_OCR_PLATFORM_FALLBACK", "maybe"),
        ]));
        assert_eq!(config.target_height, DEFAULT_TARGET_HEIGHT);
        assert_eq!(config.intra_threads, 1);
        assert!(config.platform_fallback);
    }

    #[test]
    fn parses_fallback_switch_and_digest() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("CAPTCHA_OCR_PLATFORM_FALLBACK", "off"),
            ("CAPTCHA_OCR_MODEL_SHA256", "sha256:ABCDEF01"),
            ("CAPTCHA_OCR_TARGET_HEIGHT", "32"),
        ]));
        assert!(!config.platform_fallback);
        assert_eq!(config.model_sha256.as_deref(), Some("abcdef01"));
        assert_eq!(config.target_height, 32);
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("CAPTCHA_OCR_RESOURCE_DIR", "/opt/captcha"),
            ("CAPTCHA_OCR_MODEL", "   "),
        ]));
        assert_eq!(config.model_path, PathBuf::from("/opt/captcha/common_old.onnx"));
    }

    #[test]
    fn missing_model_is_reported() {
        let config = BridgeConfig::with_resource_dir("/nonexistent/captcha-ocr-test");
        assert!(!config.has_model());
    }
}
