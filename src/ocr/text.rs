//! Cleanup and plausibility scoring for platform OCR output.
//!
//! General-purpose text recognizers read captchas as words: they insert
//! spaces, apply language guesses and confuse letters with digits. These
//! helpers normalize their output to the captcha alphabet and rank
//! candidates from different preprocessing passes.

/// Normalize raw OCR text to a captcha answer.
///
/// Drops whitespace and anything that is not a letter or digit, maps
/// common digit look-alikes back to digits and uppercases the rest.
pub fn clean_captcha_text(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .map(fix_confusable)
        .flat_map(char::to_uppercase)
        .collect()
}

fn fix_confusable(c: char) -> char {
    match c {
        'O' | 'o' | 'D' => '0',
        'l' | 'I' => '1',
        'Z' => '2',
        'S' => '5',
        'B' => '8',
        'G' => '6',
        'q' => '9',
        other => other,
    }
}

/// How plausible a cleaned candidate is as a captcha answer (0..=100).
///
/// Captchas are almost always 4 characters, sometimes 5 or 6.
pub fn candidate_score(text: &str) -> u8 {
    match text.chars().count() {
        0 => 0,
        4 => 100,
        5 => 90,
        6 => 85,
        3 => 50,
        n if n > 6 => 30,
        _ => 20,
    }
}

/// Score at which a candidate is accepted without trying further passes.
pub const CONFIDENT_SCORE: u8 = 100;
