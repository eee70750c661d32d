//! Pure input validation for revisions and versions.
//!
//! Both checks are total functions with no I/O; providers short-circuit to
//! `ContinueSearch` on invalid input without touching storage.

use std::sync::LazyLock;

use regex::Regex;

/// Canonical revision length. Early releases used 6-character short hashes.
pub const REVISION_LEN: usize = 40;

/// Legacy short-form revision length.
pub const SHORT_REVISION_LEN: usize = 6;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9]\d*\.\d+\.[1-9]\d*\.\d+$").expect("version pattern"));

/// Validate that a revision is an exact-length lowercase hex string.
pub fn is_valid_revision(revision: &str, length: usize) -> bool {
    revision.len() == length
        && revision
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Validate a `<major.minor.build.patch>` version string.
///
/// Major and build must be strictly positive; no component may carry a
/// leading zero (checked by reconstructing the string from parsed parts).
pub fn is_valid_version(version: &str) -> bool {
    if !VERSION_PATTERN.is_match(version) {
        return false;
    }

    let mut parts = [0u64; 4];
    for (slot, part) in parts.iter_mut().zip(version.split('.')) {
        match part.parse::<u64>() {
            Ok(value) => *slot = value,
            Err(_) => return false,
        }
    }

    version == format!("{}.{}.{}.{}", parts[0], parts[1], parts[2], parts[3])
}
