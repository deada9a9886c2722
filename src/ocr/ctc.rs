//! Greedy CTC decoding of ddddocr model output.
//!
//! Rules: take the argmax class per time step, drop blanks (class 0),
//! collapse consecutive repeats.

use super::charset::Charset;
use crate::error::OcrError;

/// Decode raw logits/probabilities.
///
/// Accepted layouts: `[T, 1, C]`, `[1, T, C]`, `[T, C]`. Data is row-major
/// with one row of `C` classes per time step.
pub fn decode_logits(shape: &[i64], data: &[f32], charset: &Charset) -> Result<String, OcrError> {
    let (seq_len, num_classes) = match *shape {
        [t, 1, c] => (t, c),
        [_, t, c] => (t, c),
        [t, c] => (t, c),
        _ => return Err(OcrError::OutputShape(shape.to_vec())),
    };
    if seq_len < 0 || num_classes <= 0 {
        return Err(OcrError::OutputShape(shape.to_vec()));
    }
    let (seq_len, num_classes) = (seq_len as usize, num_classes as usize);
    if data.len() < seq_len * num_classes {
        return Err(OcrError::OutputShape(shape.to_vec()));
    }

    log::debug!(
        "[DdddOcr] Output shape {:?}, seq_len={}, classes={}, charset={}",
        shape,
        seq_len,
        num_classes,
        charset.len()
    );

    let indices = data
        .chunks_exact(num_classes)
        .take(seq_len)
        .map(argmax);
    Ok(collapse(indices, charset))
}

/// Decode a model that already emits argmax class indices.
pub fn decode_indices(data: &[i64], charset: &Charset) -> String {
    let indices = data.iter().map(|&i| usize::try_from(i).unwrap_or(0));
    collapse(indices, charset)
}

fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &value) in row.iter().enumerate() {
        if value > best_value {
            best_value = value;
            best = i;
        }
    }
    best
}

fn collapse(indices: impl Iterator<Item = usize>, charset: &Charset) -> String {
    let mut out = String::new();
    let mut prev: Option<usize> = None;
    for index in indices {
        if prev != Some(index) {
            if let Some(symbol) = charset.symbol(index) {
                out.push_str(symbol);
            }
        }
        prev = Some(index);
    }
    out
}
