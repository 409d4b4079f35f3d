//! Session key derivation from timestamp directory names
//!
//! `2011-04-05_14_45_45.0` → `20110405`. Names without a leading
//! `YYYY-MM-DD` fall back to a compaction of the raw string: separators
//! (`-`, `_`, `.`) removed, truncated to 8 characters and right-padded with
//! `0` so the key is never empty.

use once_cell::sync::Lazy;
use regex::Regex;

/// Length of every session key
pub const SESSION_KEY_LEN: usize = 8;

static LEADING_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{4})-([0-9]{2})-([0-9]{2})").expect("static regex"));

/// Derive the 8-character session key for a timestamp-like name
pub fn derive_session_key(timestamp: &str) -> String {
    if let Some(caps) = LEADING_DATE.captures(timestamp) {
        return format!("{}{}{}", &caps[1], &caps[2], &caps[3]);
    }

    let mut key: String = timestamp
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | '.'))
        .take(SESSION_KEY_LEN)
        .collect();
    while key.chars().count() < SESSION_KEY_LEN {
        key.push('0');
    }
    key
}
