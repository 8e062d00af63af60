//! Content-derived job identity.
//!
//! The fingerprint is the only deduplication key in the system. Stored rows carry it in a
//! UNIQUE column, so any change to [`slugify`] or to the field layout below orphans every
//! fingerprint already on disk.

use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: char = '|';
const SLUG_MARKER: char = '-';

/// Lowercase `text`, then map every non-alphanumeric char to `-`, one-for-one.
///
/// Alphanumeric is the Unicode property, so Polish letters survive: `"Łódź"` stays
/// `"łódź"`. Runs are not collapsed: `"Kierowca!!"` becomes `"kierowca--"`.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { SLUG_MARKER })
        .collect()
}

/// SHA-256 over `company|city|slug(title)`, rendered as 64 lowercase hex chars.
///
/// An absent city hashes as the empty string.
pub fn fingerprint(company: &str, city: Option<&str>, title: &str) -> String {
    let base = format!(
        "{company}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
        city.unwrap_or_default(),
        slugify(title)
    );
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hex::encode(hasher.finalize())
}
