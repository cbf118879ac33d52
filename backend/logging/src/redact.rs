//! Log Redaction
//!
//! Scrubs Discord bot tokens and authorization headers from strings before they are logged.

use regex::Regex;
use std::sync::LazyLock;

static DISCORD_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_-]{23,28}\.[A-Za-z0-9_-]{6,7}\.[A-Za-z0-9_-]{27,}")
        .expect("discord token pattern is valid")
});
static AUTH_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Bot|Bearer)\s+[A-Za-z0-9\-\._~+/]+=*").expect("auth header pattern is valid")
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = AUTH_HEADER_RE.replace_all(input, "$1 [REDACTED_TOKEN]");
    DISCORD_TOKEN_RE
        .replace_all(&redacted, "[REDACTED_TOKEN]")
        .into_owned()
}
