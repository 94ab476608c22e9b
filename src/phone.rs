//! Loose mobile number validation.
//!
//! Accepts the common written forms of international mobile numbers
//! (`+44 7911 123456`, `(415) 555-2671`, `07911.123.456`) without knowing
//! per-country numbering plans. A leading `+` is optional.

use std::sync::OnceLock;

use regex::Regex;

/// Fewest digits accepted; shorter strings are service codes, not mobiles.
pub const MIN_DIGITS: usize = 7;

/// Most digits accepted (E.164 limit).
pub const MAX_DIGITS: usize = 15;

fn shape() -> Option<&'static Regex> {
    static SHAPE: OnceLock<Option<Regex>> = OnceLock::new();
    SHAPE
        .get_or_init(|| {
            // Optional +, then digits joined by single separators; a short
            // parenthesised area code may appear in place of a digit.
            Regex::new(r"^\+?(\d|\(\d{1,5}\))([ .\-]?(\d|\(\d{1,5}\)))*$").ok()
        })
        .as_ref()
}

/// Whether `number` is a plausible mobile phone number.
///
/// Pure predicate: no normalization is returned, the caller keeps sending
/// the string it was given.
pub fn is_valid(number: &str) -> bool {
    let trimmed = number.trim();
    if trimmed.is_empty() || trimmed.len() != number.len() {
        return false;
    }

    let digits = trimmed.chars().filter(char::is_ascii_digit).count();
    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits) {
        return false;
    }

    if trimmed.matches('(').count() > 1 {
        return false;
    }

    shape().is_some_and(|re| re.is_match(trimmed))
}
