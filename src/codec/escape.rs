//! Escaping of markup metacharacters inside literal span text.
//!
//! Literal `&`, `<`, `>` must not collide with the formatting-tag vocabulary,
//! so they are entity-escaped on encode and restored on decode. The pair
//! round-trips exactly for any text that does not itself contain the tag
//! vocabulary.

/// Escape markup metacharacters. `&` first so entities are not double-escaped.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Undo [`escape`]. `&amp;` last, mirroring the escape order.
pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Escape for XML attribute values (adds quote escaping on top of [`escape`]).
pub fn escape_attr(text: &str) -> String {
    escape(text).replace('"', "&quot;").replace('\'', "&apos;")
}
