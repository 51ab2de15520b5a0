//! Content fingerprints for fusion and caching
//!
//! Two chunks with the same text modulo case and whitespace share a
//! fingerprint, so the same document found by both search branches (or
//! chunked twice) merges into one record.

use std::fmt::{self, Display, Formatter};

/// Blake3 hash over normalised content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of `content` after normalisation
    #[must_use]
    pub fn of(content: &str) -> Self {
        let normalised = normalise(content);
        Self(*blake3::hash(normalised.as_bytes()).as_bytes())
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Lowercase, collapse whitespace runs to one space, trim
#[must_use]
pub fn normalise(content: &str) -> String {
    content
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_and_case_do_not_matter() {
        let a = Fingerprint::of("Redis connection   timeout\n after 5s");
        let b = Fingerprint::of("  redis CONNECTION timeout after 5s ");
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_differs() {
        assert_ne!(Fingerprint::of("cpu high"), Fingerprint::of("cpu low"));
    }

    #[test]
    fn cjk_content_is_preserved() {
        assert_eq!(normalise("  内存 溢出  "), "内存 溢出");
        assert_ne!(Fingerprint::of("内存溢出"), Fingerprint::of("磁盘已满"));
    }

    #[test]
    fn short_is_prefix_of_display() {
        let fp = Fingerprint::of("x");
        assert!(fp.to_string().starts_with(&fp.short()));
        assert_eq!(fp.short().len(), 16);
    }
}
