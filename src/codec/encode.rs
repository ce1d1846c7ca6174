//! Document → anchored text.
//!
//! Pure function of the document model: one anchor token per paragraph,
//! deterministic tag nesting, paragraphs joined with a double line break
//! (the decoder's only paragraph delimiter).

use crate::codec::anchor::Anchor;
use crate::codec::escape::escape;
use crate::document::{Document, FormattedSpan, Paragraph};

/// Encode a document into anchored tagged text.
///
/// Anchors are assigned fresh, starting at `P-00001`, one per paragraph
/// regardless of content (empty paragraphs still get an anchor so that
/// positional realignment on decode stays trivial).
pub fn encode(doc: &Document) -> String {
    let mut out = Vec::with_capacity(doc.paragraphs.len());
    let mut anchor = Anchor::FIRST;
    for para in &doc.paragraphs {
        out.push(format!("{}{}", anchor.token(), encode_paragraph(para)));
        anchor = anchor.next();
    }
    out.join("\n\n")
}

fn encode_paragraph(para: &Paragraph) -> String {
    let mut body = String::new();

    // Tab runs carry all their information in the attributes; the tag pair
    // itself is empty.
    if let Some(tabs) = &para.tabs {
        body.push_str(&format!(
            "<tabbed_content count=\"{}\" spacing=\"{}\"></tabbed_content>",
            tabs.count, tabs.spacing
        ));
    }

    for span in &para.spans {
        body.push_str(&encode_span(span));
    }

    if let Some(list) = &para.list {
        body = format!(
            "<list_item type=\"{}\" level=\"{}\">{}{}</list_item>",
            list.kind.as_str(),
            list.level,
            list.marker(),
            body
        );
    }

    if let Some(suffix) = para.justification.tag_suffix() {
        body = format!("<justify_{suffix}>{body}</justify_{suffix}>");
    }

    body
}

/// Wrap one span's escaped text in its formatting tags.
///
/// The nesting order is fixed (bold innermost, font_name outermost) so the
/// decoder's tag grammar is unambiguous: multiple flags on one span always
/// produce the same tag sequence.
fn encode_span(span: &FormattedSpan) -> String {
    let mut text = escape(&span.text);
    if span.bold {
        text = format!("<bold>{text}</bold>");
    }
    if span.italic {
        text = format!("<italic>{text}</italic>");
    }
    if span.underline {
        text = format!("<underline>{text}</underline>");
    }
    if span.small_caps {
        text = format!("<smallcaps>{text}</smallcaps>");
    }
    if span.superscript {
        text = format!("<superscript>{text}</superscript>");
    }
    if span.subscript {
        text = format!("<subscript>{text}</subscript>");
    }
    if let Some(size) = span.font_size {
        text = format!("<font_size={size}>{text}</font_size>");
    }
    if let Some(name) = &span.font_name {
        text = format!("<font_name='{name}'>{text}</font_name>");
    }
    text
}
