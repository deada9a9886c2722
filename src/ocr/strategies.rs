//! Multi-pass recognition on top of a general-purpose text reader.
//!
//! A platform OCR engine is run over the original captcha and over several
//! binarized variants. Each answer is cleaned and scored; a confident
//! answer stops the search, otherwise the best non-empty one wins.

use super::engine::{CaptchaImage, CaptchaRecognizer};
use super::preprocess::{encode_png, Binarization};
use super::text::{candidate_score, clean_captcha_text, CONFIDENT_SCORE};
use crate::error::OcrError;

/// A general-purpose OCR engine that reads text out of PNG/JPEG bytes.
pub trait TextReader: Send + Sync {
    fn name(&self) -> &str;

    /// Raw recognized text, possibly empty.
    fn read_text(&self, image_data: &[u8]) -> Result<String, OcrError>;
}

/// Which image a pass feeds to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Original,
    Binarized(Binarization),
}

impl Pass {
    pub fn name(self) -> &'static str {
        match self {
            Pass::Original => "original",
            Pass::Binarized(b) => b.name(),
        }
    }

    /// Original image first, then every binarization.
    pub fn default_order() -> Vec<Pass> {
        std::iter::once(Pass::Original)
            .chain(Binarization::ALL.into_iter().map(Pass::Binarized))
            .collect()
    }
}

pub struct MultiPassRecognizer<R> {
    reader: R,
    passes: Vec<Pass>,
}

impl<R: TextReader> MultiPassRecognizer<R> {
    pub fn new(reader: R) -> Self {
        Self::with_passes(reader, Pass::default_order())
    }

    pub fn with_passes(reader: R, passes: Vec<Pass>) -> Self {
        Self { reader, passes }
    }

    fn run_pass(&self, pass: Pass, image: &CaptchaImage<'_>) -> Result<String, OcrError> {
        let raw = match pass {
            Pass::Original => self.reader.read_text(image.raw())?,
            Pass::Binarized(b) => {
                let png = encode_png(&b.apply(image.decoded()))?;
                self.reader.read_text(&png)?
            }
        };
        let cleaned = clean_captcha_text(&raw);
        log::debug!(
            "[{}] pass[{}] raw='{}' cleaned='{}'",
            self.reader.name(),
            pass.name(),
            raw.trim(),
            cleaned
        );
        Ok(cleaned)
    }
}

impl<R: TextReader> CaptchaRecognizer for MultiPassRecognizer<R> {
    fn name(&self) -> &str {
        self.reader.name()
    }

    fn recognize(&self, image: &CaptchaImage<'_>) -> Result<String, OcrError> {
        let mut best: Option<(u8, String)> = None;
        let mut last_error = None;

        for &pass in &self.passes {
            let candidate = match self.run_pass(pass, image) {
                Ok(text) => text,
                Err(e) => {
                    log::debug!("[{}] pass[{}] failed: {}", self.reader.name(), pass.name(), e);
                    last_error = Some(e);
                    continue;
                }
            };

            let score = candidate_score(&candidate);
            if score >= CONFIDENT_SCORE {
                return Ok(candidate);
            }
            if score > best.as_ref().map_or(0, |(s, _)| *s) {
                best = Some((score, candidate));
            }
        }

        match best {
            Some((score, text)) => {
                log::info!("[{}] Best candidate '{}' (score {})", self.reader.name(), text, score);
                Ok(text)
            }
            None => Err(last_error.unwrap_or(OcrError::NoText)),
        }
    }
}
