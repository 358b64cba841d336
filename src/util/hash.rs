//! Hashing utilities for statement and graph digests.

use sha2::{Digest, Sha256};

/// A hasher for building digests from multiple components.
///
/// Components are NUL-separated so `("ab", "c")` and `("a", "bc")`
/// hash differently.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Create a new fingerprint builder.
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short digest (first 16 chars).
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_stable() {
        let fp1 = {
            let mut fp = Fingerprint::new();
            fp.update_str("javac").update_str("a.java");
            fp.finish()
        };

        let fp2 = {
            let mut fp = Fingerprint::new();
            fp.update_str("javac").update_str("a.java");
            fp.finish()
        };

        assert_eq!(fp1, fp2);
    }

    #[test]
    fn test_fingerprint_separator() {
        let joined = {
            let mut fp = Fingerprint::new();
            fp.update_str("ab").update_str("c");
            fp.finish()
        };

        let split = {
            let mut fp = Fingerprint::new();
            fp.update_str("a").update_str("bc");
            fp.finish()
        };

        assert_ne!(joined, split);
    }
}
