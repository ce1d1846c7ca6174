//! Lossless anchored-text codec.
//!
//! The flat representation that stands between the structured document and
//! the language model: one `⟦P-NNNNN⟧` anchor per paragraph, inline
//! formatting as nestable `<name>…</name>` tag pairs, paragraphs joined with
//! a double line break. [`encode`] and [`decode`] round-trip exactly for the
//! supported formatting subset (see [`crate::document::Document::normalize`]
//! for the equality normal form).

pub mod anchor;
pub mod decode;
pub mod encode;
pub mod escape;

pub use anchor::{scan_anchors, Anchor};
pub use decode::decode;
pub use encode::encode;

use once_cell::sync::Lazy;
use regex::Regex;

static ANY_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?[a-z_]+[^>]*>").unwrap_or_else(|e| panic!("tag regex: {e}"))
});

/// Remove all formatting tags and anchor tokens, keeping literal content.
/// Useful for human-readable previews of anchored text.
pub fn strip_markup(text: &str) -> String {
    let no_tags = ANY_TAG_RE.replace_all(text, "");
    let no_anchors = anchor::ANCHOR_RE.replace_all(&no_tags, "");
    escape::unescape(&no_anchors)
}
