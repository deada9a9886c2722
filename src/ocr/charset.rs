//! ddddocr charset loading.
//!
//! The model's class index `i` maps to `charset[i]`; index 0 is the CTC
//! blank. The full charset ships as a JSON array of strings alongside the
//! model. When it is missing we fall back to a plain alphanumeric set.

use std::path::Path;

use serde::Deserialize;

use crate::error::OcrError;

const BUILTIN_CHARS: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Charset {
    symbols: Vec<String>,
}

impl Charset {
    /// Built-in set: blank followed by digits, lowercase, uppercase.
    pub fn builtin() -> Self {
        let symbols = std::iter::once(String::new())
            .chain(BUILTIN_CHARS.chars().map(|c| c.to_string()))
            .collect();
        Self { symbols }
    }

    /// Parse a JSON array of strings.
    pub fn from_json(raw: &str) -> Result<Self, OcrError> {
        let charset: Charset =
            serde_json::from_str(raw).map_err(|e| OcrError::Charset(e.to_string()))?;
        if charset.len() < 2 {
            return Err(OcrError::Charset(format!(
                "expected blank plus at least one symbol, got {} entries",
                charset.len()
            )));
        }
        Ok(charset)
    }

    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, OcrError> {
        let raw = std::fs::read_to_string(path).map_err(|e| OcrError::io(path, e))?;
        Self::from_json(&raw)
    }

    /// Load from `path`, or fall back to the built-in set.
    pub fn load_or_builtin(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(charset) => {
                log::info!(
                    "[DdddOcr] Loaded charset from {} ({} symbols)",
                    path.display(),
                    charset.len()
                );
                charset
            }
            Err(e) => {
                log::warn!("[DdddOcr] Using built-in charset: {}", e);
                Self::builtin()
            }
        }
    }

    /// Symbol for a class index. Blank, out-of-range and empty symbols are `None`.
    pub fn symbol(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.symbols
            .get(index)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
