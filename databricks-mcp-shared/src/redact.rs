//! Secret redaction for diagnostic text
//!
//! Error bodies returned by the workspace or the identity endpoint are logged
//! and echoed back to MCP clients. Anything that looks like a bearer token,
//! personal access token or OAuth secret is replaced before that happens.

use regex::Regex;
use std::sync::OnceLock;

/// Maximum number of characters of a response body kept for diagnostics
pub const MAX_DIAGNOSTIC_BODY_CHARS: usize = 500;

const PLACEHOLDER: &str = "[REDACTED]";

struct Pattern {
    regex: Regex,
    replacement: &'static str,
}

fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();

    PATTERNS.get_or_init(|| {
        let rules: [(&str, &'static str); 3] = [
            // Authorization header values
            (r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+", "Bearer [REDACTED]"),
            // Databricks personal access tokens
            (r"\bdapi[0-9a-f]{32}(-\d+)?\b", PLACEHOLDER),
            // Credential-bearing JSON fields
            (
                r#"(?i)"(access_token|refresh_token|client_secret|token|password)"\s*:\s*"[^"]*""#,
                r#""$1":"[REDACTED]""#,
            ),
        ];

        rules
            .into_iter()
            .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
                Ok(regex) => Some(Pattern { regex, replacement }),
                Err(e) => {
                    tracing::error!("Invalid redaction pattern {}: {}", pattern, e);
                    None
                }
            })
            .collect()
    })
}

/// Replace secret-looking substrings in `text`
pub fn redact(text: &str) -> String {
    patterns().iter().fold(text.to_string(), |acc, pattern| {
        pattern
            .regex
            .replace_all(&acc, pattern.replacement)
            .into_owned()
    })
}

/// Truncate to at most `max_chars` characters, on a char boundary
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Redacted and truncated response body suitable for errors and logs
pub fn diagnostic_body(body: &str) -> String {
    truncate(&redact(body), MAX_DIAGNOSTIC_BODY_CHARS)
}
