//! Redaction chokepoint for anything that reaches the logs.
//!
//! Recipients are masked down to their last four characters; provider error
//! bodies are scrubbed of known credentials and token-like patterns.

use regex::Regex;

/// Canonical replacement marker for redacted content.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Character substituted for hidden recipient characters.
pub const MASK_CHAR: char = '*';

/// Characters left visible at the end of a masked recipient.
pub const VISIBLE_SUFFIX: usize = 4;

/// Longest provider error body kept after scrubbing.
pub const MAX_ERROR_BODY_CHARS: usize = 256;

/// Mask a recipient so only the last four characters remain visible.
///
/// Inputs of four characters or fewer are fully masked.
pub fn mask_recipient(recipient: &str) -> String {
    let total = recipient.chars().count();
    if total <= VISIBLE_SUFFIX {
        return MASK_CHAR.to_string().repeat(total);
    }
    let hidden = total.saturating_sub(VISIBLE_SUFFIX);
    recipient
        .chars()
        .enumerate()
        .map(|(i, c)| if i < hidden { MASK_CHAR } else { c })
        .collect()
}

/// Mask every occurrence of `recipient` inside `text`.
///
/// Providers echo numbers back normalized (`(415) 555-2671` comes back as
/// `+14155552671`), so the bare digit run is masked as well as the string
/// exactly as given.
pub fn mask_recipient_in(text: &str, recipient: &str) -> String {
    let mut masked = text.to_owned();
    if recipient.chars().count() > VISIBLE_SUFFIX {
        masked = masked.replace(recipient, &mask_recipient(recipient));
    }
    let digits: String = recipient.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > VISIBLE_SUFFIX {
        masked = masked.replace(&digits, &mask_recipient(&digits));
    }
    masked
}

/// Redacts known secret values and token-like patterns from text.
#[derive(Debug, Clone)]
pub struct Redactor {
    exact_secrets: Vec<String>,
    patterns: Vec<Regex>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Redactor {
    /// Create a redactor from known secret values.
    pub fn new(exact_secrets: Vec<String>) -> Self {
        let patterns = default_patterns();
        Self {
            exact_secrets,
            patterns,
        }
    }

    /// Redact exact known secrets and known secret patterns.
    pub fn redact(&self, text: &str) -> String {
        let mut sanitized = text.to_owned();
        for secret in &self.exact_secrets {
            if !secret.is_empty() {
                sanitized = sanitized.replace(secret, REDACTION_MARKER);
            }
        }
        for pattern in &self.patterns {
            sanitized = pattern
                .replace_all(&sanitized, REDACTION_MARKER)
                .to_string();
        }
        sanitized
    }

    /// Redact, collapse whitespace, and truncate a raw provider payload.
    pub fn scrub_error_body(&self, raw: &str) -> String {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let sanitized = self.redact(&collapsed);

        if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
            let shortened = sanitized
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect::<String>();
            return format!("{shortened}...[truncated]");
        }

        sanitized
    }
}

fn default_patterns() -> Vec<Regex> {
    let patterns = [
        // Twilio account and API key SIDs.
        r"\bAC[0-9a-fA-F]{32}\b",
        r"\bSK[0-9a-fA-F]{32}\b",
        // Basic auth embedded in URLs.
        r"https?://[^/\s:@]+:[^/\s@]+@",
    ];

    patterns
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}
