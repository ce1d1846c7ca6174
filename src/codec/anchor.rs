//! Paragraph anchor tokens.
//!
//! An anchor is the only stable join key between the flat anchored-text
//! representation and the structured document model. Anchors are assigned
//! densely from 1, one per paragraph, strictly increasing, and regenerated
//! fresh on every encode.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Matches an anchor token: `⟦P-` + 5-digit zero-padded integer + `⟧`.
pub static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"⟦P-(\d{5})⟧").unwrap_or_else(|e| panic!("anchor regex: {e}")));

/// A 1-based paragraph anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Anchor(pub u32);

impl Anchor {
    /// First anchor of any encoding pass.
    pub const FIRST: Anchor = Anchor(1);

    /// Render the wire token, e.g. `⟦P-00042⟧`.
    pub fn token(&self) -> String {
        format!("⟦P-{:05}⟧", self.0)
    }

    /// Parse an anchor out of its wire token. Accepts only the exact
    /// `⟦P-NNNNN⟧` form.
    pub fn parse(token: &str) -> Option<Anchor> {
        let caps = ANCHOR_RE.captures(token)?;
        if caps.get(0)?.as_str() != token {
            return None;
        }
        caps[1].parse().ok().map(Anchor)
    }

    /// The anchor after this one.
    pub fn next(&self) -> Anchor {
        Anchor(self.0 + 1)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{:05}", self.0)
    }
}

/// Scan all anchor tokens in `text`, in order of appearance.
pub fn scan_anchors(text: &str) -> Vec<Anchor> {
    ANCHOR_RE
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok().map(Anchor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips() {
        let a = Anchor(42);
        assert_eq!(a.token(), "⟦P-00042⟧");
        assert_eq!(Anchor::parse(&a.token()), Some(a));
    }

    #[test]
    fn parse_rejects_trailing_garbage() {
        assert_eq!(Anchor::parse("⟦P-00001⟧x"), None);
        assert_eq!(Anchor::parse("P-00001"), None);
    }

    #[test]
    fn scan_preserves_order() {
        let text = "⟦P-00001⟧first\n\n⟦P-00002⟧second\n\n⟦P-00003⟧third";
        assert_eq!(
            scan_anchors(text),
            vec![Anchor(1), Anchor(2), Anchor(3)]
        );
    }
}
