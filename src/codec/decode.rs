//! Anchored text → document, realigned against the original structure.
//!
//! Edited text coming back from a model may mangle anchors, so paragraphs
//! are realigned **positionally**: the Nth edited paragraph maps to the Nth
//! template paragraph. This assumes the model neither reorders nor deletes
//! paragraphs, a documented simplification of the edit flow.
//!
//! The tag scanner is deliberately forgiving: unknown or mis-nested tags are
//! dropped with their content preserved as plain text. A single garbled tag
//! should never cost the whole document.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::codec::anchor::ANCHOR_RE;
use crate::codec::escape::unescape;
use crate::document::{
    Document, FormattedSpan, Justification, ListInfo, ListKind, Paragraph, TabRun,
};

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\w+)="([^"]*)""#).unwrap_or_else(|e| panic!("attr regex: {e}"))
});
static NUMBER_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.\s").unwrap_or_else(|e| panic!("marker regex: {e}")));

/// Decode anchored text back into a document, using `template` for
/// positional realignment and the footnote table.
///
/// Paragraphs are split at anchor tokens when any are present, falling back
/// to double-line-break splitting when the model stripped every anchor. Text
/// before the first anchor (model preamble) is discarded.
pub fn decode(text: &str, template: &Document) -> Document {
    let pieces: Vec<&str> = if ANCHOR_RE.is_match(text) {
        ANCHOR_RE.split(text).skip(1).collect()
    } else {
        text.split("\n\n").collect()
    };

    let paragraphs = pieces
        .iter()
        .zip(&template.paragraphs)
        .map(|(piece, _)| decode_paragraph(piece.trim_matches(['\n', '\r'])))
        .collect();

    Document {
        paragraphs,
        footnotes: template.footnotes.clone(),
    }
}

/// One style frame on the scanner stack: which tag opened it plus the
/// formatting in effect beneath it.
struct Frame {
    tag: String,
    style: FormattedSpan,
}

fn decode_paragraph(text: &str) -> Paragraph {
    let mut para = Paragraph::default();
    let mut stack: Vec<Frame> = vec![Frame {
        tag: String::new(),
        style: FormattedSpan::default(),
    }];
    let mut buf = String::new();
    // Set when a <list_item> just opened: its literal marker prefix must be
    // stripped from the next text chunk.
    let mut strip_marker = false;

    let flush = |buf: &mut String, stack: &[Frame], para: &mut Paragraph| {
        if buf.is_empty() {
            return;
        }
        let style = &stack[stack.len() - 1].style;
        para.spans.push(FormattedSpan {
            text: unescape(buf),
            ..style.clone()
        });
        buf.clear();
    };

    let mut rest = text;
    while let Some(lt) = rest.find('<') {
        let (literal, after) = rest.split_at(lt);
        push_text(literal, &mut buf, &mut para, &mut strip_marker);

        let Some(gt) = after.find('>') else {
            // No closing bracket: the rest is literal text.
            push_text(after, &mut buf, &mut para, &mut strip_marker);
            rest = "";
            break;
        };
        let token = &after[1..gt];
        rest = &after[gt + 1..];

        if let Some(name) = token.strip_prefix('/') {
            if is_inline_tag(name) {
                // Pop down to the matching frame; mismatched closes of tags
                // that were never opened are skipped.
                if let Some(pos) = stack.iter().rposition(|f| f.tag == name) {
                    if pos > 0 {
                        flush(&mut buf, &stack, &mut para);
                        stack.truncate(pos);
                    }
                }
            }
            // Block-tag closes carry no state; unknown closes are dropped.
            continue;
        }

        match classify_open(token) {
            OpenTag::Inline(style_delta) => {
                flush(&mut buf, &stack, &mut para);
                let mut style = stack[stack.len() - 1].style.clone();
                style_delta.apply(&mut style);
                stack.push(Frame {
                    tag: style_delta.tag_name().to_string(),
                    style,
                });
            }
            OpenTag::Justify(j) => {
                para.justification = j;
            }
            OpenTag::List(info) => {
                if para.list.is_none() {
                    para.list = Some(info);
                    strip_marker = true;
                }
            }
            OpenTag::Tabs(run) => {
                if para.tabs.is_none() {
                    para.tabs = Some(run);
                }
            }
            OpenTag::Unknown => {}
        }
    }
    push_text(rest, &mut buf, &mut para, &mut strip_marker);
    flush(&mut buf, &stack, &mut para);
    para
}

/// Accumulate a literal chunk, stripping the list marker when one is pending.
fn push_text(chunk: &str, buf: &mut String, para: &mut Paragraph, strip_marker: &mut bool) {
    if chunk.is_empty() {
        return;
    }
    let mut chunk = chunk;
    if *strip_marker && buf.is_empty() {
        *strip_marker = false;
        match para.list.map(|l| l.kind) {
            Some(ListKind::Bullet) => {
                chunk = chunk.strip_prefix("• ").unwrap_or(chunk);
            }
            Some(ListKind::Number) => {
                if let Some(caps) = NUMBER_MARKER_RE.captures(chunk) {
                    if let (Some(list), Ok(n)) = (&mut para.list, caps[1].parse()) {
                        list.ordinal = Some(n);
                    }
                    chunk = &chunk[caps[0].len()..];
                }
            }
            None => {}
        }
    }
    buf.push_str(chunk);
}

/// The formatting change an inline open tag introduces.
enum StyleDelta {
    Bold,
    Italic,
    Underline,
    SmallCaps,
    Superscript,
    Subscript,
    FontSize(u32),
    FontName(String),
}

impl StyleDelta {
    fn apply(&self, style: &mut FormattedSpan) {
        match self {
            StyleDelta::Bold => style.bold = true,
            StyleDelta::Italic => style.italic = true,
            StyleDelta::Underline => style.underline = true,
            StyleDelta::SmallCaps => style.small_caps = true,
            StyleDelta::Superscript => style.superscript = true,
            StyleDelta::Subscript => style.subscript = true,
            StyleDelta::FontSize(n) => style.font_size = Some(*n),
            StyleDelta::FontName(name) => style.font_name = Some(name.clone()),
        }
    }

    fn tag_name(&self) -> &'static str {
        match self {
            StyleDelta::Bold => "bold",
            StyleDelta::Italic => "italic",
            StyleDelta::Underline => "underline",
            StyleDelta::SmallCaps => "smallcaps",
            StyleDelta::Superscript => "superscript",
            StyleDelta::Subscript => "subscript",
            StyleDelta::FontSize(_) => "font_size",
            StyleDelta::FontName(_) => "font_name",
        }
    }
}

enum OpenTag {
    Inline(StyleDelta),
    Justify(Justification),
    List(ListInfo),
    Tabs(TabRun),
    Unknown,
}

fn is_inline_tag(name: &str) -> bool {
    matches!(
        name,
        "bold" | "italic" | "underline" | "smallcaps" | "superscript" | "subscript"
            | "font_size"
            | "font_name"
    )
}

fn classify_open(token: &str) -> OpenTag {
    match token {
        "bold" => return OpenTag::Inline(StyleDelta::Bold),
        "italic" => return OpenTag::Inline(StyleDelta::Italic),
        "underline" => return OpenTag::Inline(StyleDelta::Underline),
        "smallcaps" => return OpenTag::Inline(StyleDelta::SmallCaps),
        "superscript" => return OpenTag::Inline(StyleDelta::Superscript),
        "subscript" => return OpenTag::Inline(StyleDelta::Subscript),
        _ => {}
    }

    if let Some(rest) = token.strip_prefix("font_size=") {
        if let Ok(n) = rest.trim().parse() {
            return OpenTag::Inline(StyleDelta::FontSize(n));
        }
        return OpenTag::Unknown;
    }
    if let Some(rest) = token.strip_prefix("font_name=") {
        let name = rest.trim().trim_matches('\'');
        if !name.is_empty() {
            return OpenTag::Inline(StyleDelta::FontName(name.to_string()));
        }
        return OpenTag::Unknown;
    }
    if let Some(suffix) = token.strip_prefix("justify_") {
        if let Some(j) = Justification::from_tag_suffix(suffix) {
            return OpenTag::Justify(j);
        }
        return OpenTag::Unknown;
    }
    if token.starts_with("list_item") {
        let mut kind = None;
        let mut level = 0u32;
        for caps in ATTR_RE.captures_iter(token) {
            match &caps[1] {
                "type" => {
                    kind = match &caps[2] {
                        "bullet" => Some(ListKind::Bullet),
                        "number" => Some(ListKind::Number),
                        _ => None,
                    }
                }
                "level" => level = caps[2].parse().unwrap_or(0),
                _ => {}
            }
        }
        if let Some(kind) = kind {
            return OpenTag::List(ListInfo {
                kind,
                level,
                ordinal: None,
            });
        }
        return OpenTag::Unknown;
    }
    if token.starts_with("tabbed_content") {
        let mut count = 0u32;
        let mut spacing = 0u32;
        for caps in ATTR_RE.captures_iter(token) {
            match &caps[1] {
                "count" => count = caps[2].parse().unwrap_or(0),
                "spacing" => spacing = caps[2].parse().unwrap_or(0),
                _ => {}
            }
        }
        if count > 0 {
            return OpenTag::Tabs(TabRun { count, spacing });
        }
        return OpenTag::Unknown;
    }

    OpenTag::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(n: usize) -> Document {
        Document {
            paragraphs: vec![Paragraph::default(); n],
            footnotes: vec![],
        }
    }

    #[test]
    fn bold_and_italic_reconstruct_two_spans() {
        let doc = decode(
            "⟦P-00001⟧<bold>bold</bold> and <italic>italic</italic>",
            &template(1),
        );
        let spans = &doc.paragraphs[0].spans;
        assert_eq!(spans.len(), 3);
        assert!(spans[0].bold);
        assert_eq!(spans[0].text, "bold");
        assert_eq!(spans[1].text, " and ");
        assert!(spans[1].is_plain());
        assert!(spans[2].italic);
        assert_eq!(spans[2].text, "italic");
    }

    #[test]
    fn nested_tags_compose_flags() {
        let doc = decode(
            "⟦P-00001⟧<font_name='Garamond'><font_size=24><bold>x</bold></font_size></font_name>",
            &template(1),
        );
        let span = &doc.paragraphs[0].spans[0];
        assert!(span.bold);
        assert_eq!(span.font_size, Some(24));
        assert_eq!(span.font_name.as_deref(), Some("Garamond"));
    }

    #[test]
    fn block_tags_set_paragraph_attributes() {
        let doc = decode(
            "⟦P-00001⟧<justify_center><list_item type=\"number\" level=\"0\">3. \
             <tabbed_content count=\"2\" spacing=\"1\"></tabbed_content>body</list_item></justify_center>",
            &template(1),
        );
        let p = &doc.paragraphs[0];
        assert_eq!(p.justification, Justification::Center);
        assert_eq!(
            p.list,
            Some(ListInfo {
                kind: ListKind::Number,
                level: 0,
                ordinal: Some(3),
            })
        );
        assert_eq!(p.tabs, Some(TabRun { count: 2, spacing: 1 }));
        assert_eq!(p.spans.len(), 1);
        assert_eq!(p.spans[0].text, "body");
    }

    #[test]
    fn unknown_tags_drop_but_keep_content() {
        let doc = decode("⟦P-00001⟧<mystery>kept text</mystery>", &template(1));
        assert_eq!(doc.paragraphs[0].spans.len(), 1);
        assert_eq!(doc.paragraphs[0].spans[0].text, "kept text");
        assert!(doc.paragraphs[0].spans[0].is_plain());
    }

    #[test]
    fn entities_unescape() {
        let doc = decode("⟦P-00001⟧AT&amp;T &lt;plaintiff&gt;", &template(1));
        assert_eq!(doc.paragraphs[0].spans[0].text, "AT&T <plaintiff>");
    }

    #[test]
    fn positional_realignment_ignores_extra_model_paragraphs() {
        let doc = decode(
            "Sure, here is the edited text:\n\n⟦P-00001⟧one\n\n⟦P-00002⟧two\n\n⟦P-00003⟧extra",
            &template(2),
        );
        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(doc.paragraphs[0].plain_text(), "one");
        assert_eq!(doc.paragraphs[1].plain_text(), "two");
    }

    #[test]
    fn anchorless_text_falls_back_to_blank_line_split() {
        let doc = decode("first paragraph\n\nsecond paragraph", &template(2));
        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(doc.paragraphs[1].plain_text(), "second paragraph");
    }

    #[test]
    fn footnotes_carry_over_from_template() {
        let mut tpl = template(1);
        tpl.footnotes.push(crate::document::Footnote {
            id: "2".into(),
            content: "See id.".into(),
        });
        let doc = decode("⟦P-00001⟧text", &tpl);
        assert_eq!(doc.footnotes.len(), 1);
    }
}
