//! Content identities that survive search-path rewrites.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, ops::Range};

/// Hex-encoded SHA-256 fingerprint of an artifact's stable content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Finalizes a hasher into an identity.
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first twelve hex digits, for log output.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Feeds `bytes` into `hasher`, skipping the given byte ranges.
///
/// Ranges may overlap and may be unsorted. Ranges reaching past the end of
/// `bytes` are clamped.
pub fn hash_masked(hasher: &mut Sha256, bytes: &[u8], masked: &[Range<usize>]) {
    let mut spans: Vec<Range<usize>> = masked
        .iter()
        .map(|r| r.start.min(bytes.len())..r.end.min(bytes.len()))
        .filter(|r| r.start < r.end)
        .collect();
    spans.sort_by_key(|r| r.start);

    let mut cursor = 0;
    for span in spans {
        if span.start > cursor {
            hasher.update(&bytes[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    if cursor < bytes.len() {
        hasher.update(&bytes[cursor..]);
    }
}
