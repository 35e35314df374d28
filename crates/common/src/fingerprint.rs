//! Question fingerprinting for the answer cache

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Canonical form of a question: trimmed, inner whitespace collapsed, lowercased.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// SHA-256 hex digest of a normalized question.
///
/// Questions differing only in case or surrounding whitespace share a
/// fingerprint, so they share a cache entry for the same paper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(question: &str) -> Self {
        let digest = Sha256::digest(normalize_question(question).as_bytes());
        Self(hex::encode(digest))
    }

    /// Wrap a digest previously produced by [`Fingerprint::of`]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
