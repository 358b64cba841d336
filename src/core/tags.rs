//! Dependency tags.
//!
//! Every edge carries a tag that decides two things: whether the edge
//! resolves across variant axes (a far edge), and how the producer's
//! outputs are consumed. The set is closed so every dispatch site is an
//! exhaustive `match`.

use std::fmt;

use serde::Serialize;

/// Classifier on a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepTag {
    /// Ordinary link dependency: producer's primary artifact joins the
    /// consumer's classpath/link line.
    Link,
    /// Static link dependency: like `Link`, and the producer's exported
    /// flag files are folded into the consumer's.
    StaticLink,
    /// Referenced on the classpath only; never linked in or bundled.
    ClasspathOnly,
    /// Native library packaged into an app. Far edge: resolves to
    /// per-arch shared variants regardless of the consumer's tuple.
    EmbeddedNative,
    /// Tool that must be built for the host before the consumer runs
    /// its actions. Far edge: pinned to the host OS class.
    HostTool,
    /// Signing credential pair. Resolves to exactly one producing
    /// variant whose only observable output is the pair.
    Certificate,
}

impl DepTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepTag::Link => "link",
            DepTag::StaticLink => "static-link",
            DepTag::ClasspathOnly => "classpath-only",
            DepTag::EmbeddedNative => "embedded-native",
            DepTag::HostTool => "host-tool",
            DepTag::Certificate => "certificate",
        }
    }

    /// Far edges deliberately resolve to a different variant tuple than
    /// the consumer's.
    pub fn is_far(&self) -> bool {
        matches!(self, DepTag::EmbeddedNative | DepTag::HostTool)
    }
}

impl fmt::Display for DepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_far_classification() {
        assert!(DepTag::EmbeddedNative.is_far());
        assert!(DepTag::HostTool.is_far());
        assert!(!DepTag::Link.is_far());
        assert!(!DepTag::Certificate.is_far());
    }
}
