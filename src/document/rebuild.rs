//! Document model → WordprocessingML.
//!
//! The inverse of extraction for the modelled subset: paragraph properties,
//! run formatting, tab runs, list markers, and inlined footnote references
//! are turned back into the XML parts a repackaged document needs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::codec::escape::{escape, escape_attr};
use crate::document::{Document, FormattedSpan, Justification, ListKind, Paragraph};

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

/// A span produced by footnote inlining: superscript text of the form
/// `[n] (Footnote: content)`. On rebuild it becomes a reference again.
static FOOTNOTE_BACKREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\[(\d+)\] \(Footnote: (.*)\)$")
        .unwrap_or_else(|e| panic!("footnote backref regex: {e}"))
});

/// Serialize the main document part.
pub fn rebuild_document_xml(doc: &Document) -> String {
    let mut xml = String::with_capacity(4096);
    xml.push_str(XML_DECL);
    xml.push_str(&format!("<w:document {W_NS}><w:body>"));
    for paragraph in &doc.paragraphs {
        write_paragraph(&mut xml, paragraph, doc);
    }
    xml.push_str("</w:body></w:document>");
    xml
}

/// Serialize the footnotes part, or `None` when the document has no
/// footnotes. IDs are reissued sequentially from 1, preceded by the two
/// separator pseudo-footnotes every footnotes part carries.
pub fn rebuild_footnotes_xml(doc: &Document) -> Option<String> {
    if doc.footnotes.is_empty() {
        return None;
    }
    let mut xml = String::with_capacity(1024);
    xml.push_str(XML_DECL);
    xml.push_str(&format!("<w:footnotes {W_NS}>"));
    xml.push_str(concat!(
        r#"<w:footnote w:type="separator" w:id="-1"><w:p><w:r><w:separator/></w:r></w:p></w:footnote>"#,
        r#"<w:footnote w:type="continuationSeparator" w:id="0"><w:p><w:r><w:continuationSeparator/></w:r></w:p></w:footnote>"#,
    ));
    for (i, footnote) in doc.footnotes.iter().enumerate() {
        let id = i + 1;
        xml.push_str(&format!(
            r#"<w:footnote w:id="{id}"><w:p><w:r><w:rPr><w:vertAlign w:val="superscript"/></w:rPr><w:footnoteRef/></w:r><w:r><w:t xml:space="preserve"> {}</w:t></w:r></w:p></w:footnote>"#,
            escape(&footnote.content),
        ));
    }
    xml.push_str("</w:footnotes>");
    Some(xml)
}

// ── Paragraphs and runs ──────────────────────────────────────────────────

fn write_paragraph(xml: &mut String, paragraph: &Paragraph, doc: &Document) {
    xml.push_str("<w:p>");
    write_paragraph_properties(xml, paragraph);

    if let Some(tabs) = &paragraph.tabs {
        xml.push_str("<w:r>");
        for _ in 0..tabs.count {
            xml.push_str("<w:tab/>");
        }
        xml.push_str("</w:r>");
        if tabs.spacing > 0 {
            xml.push_str(&format!(
                r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#,
                " ".repeat(tabs.spacing as usize),
            ));
        }
    }

    // Extraction folds the literal marker into the list info; emit it back
    // as leading run text so the visible document is unchanged.
    if let Some(list) = paragraph.list {
        xml.push_str(&format!(
            r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#,
            escape(&list.marker()),
        ));
    }

    for span in &paragraph.spans {
        write_run(xml, span, doc);
    }
    xml.push_str("</w:p>");
}

fn write_paragraph_properties(xml: &mut String, paragraph: &Paragraph) {
    let jc = match paragraph.justification {
        Justification::Left => None,
        Justification::Center => Some("center"),
        Justification::Right => Some("right"),
        Justification::Justify => Some("both"),
    };
    if jc.is_none() && paragraph.list.is_none() {
        return;
    }
    xml.push_str("<w:pPr>");
    if let Some(list) = paragraph.list {
        // numId 1 for bullets, 2 for numbered items; the numbering part is
        // passed through from the source package untouched.
        let num_id = match list.kind {
            ListKind::Bullet => 1,
            ListKind::Number => 2,
        };
        xml.push_str(&format!(
            r#"<w:numPr><w:ilvl w:val="{}"/><w:numId w:val="{num_id}"/></w:numPr>"#,
            list.level,
        ));
    }
    if let Some(val) = jc {
        xml.push_str(&format!(r#"<w:jc w:val="{val}"/>"#));
    }
    xml.push_str("</w:pPr>");
}

fn write_run(xml: &mut String, span: &FormattedSpan, doc: &Document) {
    if span.superscript {
        if let Some(caps) = FOOTNOTE_BACKREF_RE.captures(&span.text) {
            let content = &caps[2];
            // Prefer the table position so reference IDs line up with the
            // reissued footnote IDs; the display number is the fallback for
            // a span whose content drifted during editing.
            let id = doc
                .footnotes
                .iter()
                .position(|f| f.content == content)
                .map(|i| i + 1)
                .or_else(|| caps[1].parse().ok())
                .unwrap_or(1);
            xml.push_str(&format!(
                r#"<w:r><w:rPr><w:vertAlign w:val="superscript"/></w:rPr><w:footnoteReference w:id="{id}"/></w:r>"#,
            ));
            return;
        }
    }

    xml.push_str("<w:r>");
    let rpr = run_properties(span);
    if !rpr.is_empty() {
        xml.push_str(&format!("<w:rPr>{rpr}</w:rPr>"));
    }
    xml.push_str(&format!(
        r#"<w:t xml:space="preserve">{}</w:t>"#,
        escape(&span.text),
    ));
    xml.push_str("</w:r>");
}

fn run_properties(span: &FormattedSpan) -> String {
    let mut rpr = String::new();
    if let Some(name) = &span.font_name {
        rpr.push_str(&format!(
            r#"<w:rFonts w:ascii="{0}" w:hAnsi="{0}"/>"#,
            escape_attr(name),
        ));
    }
    if span.bold {
        rpr.push_str("<w:b/>");
    }
    if span.italic {
        rpr.push_str("<w:i/>");
    }
    if span.underline {
        rpr.push_str(r#"<w:u w:val="single"/>"#);
    }
    if span.small_caps {
        rpr.push_str("<w:smallCaps/>");
    }
    if span.superscript {
        rpr.push_str(r#"<w:vertAlign w:val="superscript"/>"#);
    } else if span.subscript {
        rpr.push_str(r#"<w:vertAlign w:val="subscript"/>"#);
    }
    if let Some(size) = span.font_size {
        rpr.push_str(&format!(r#"<w:sz w:val="{size}"/>"#));
    }
    rpr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{extract_document, Footnote, ListInfo, TabRun};

    fn span(text: &str) -> FormattedSpan {
        FormattedSpan {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn plain_paragraph_serializes_minimally() {
        let doc = Document {
            paragraphs: vec![Paragraph {
                spans: vec![span("Hello")],
                ..Default::default()
            }],
            footnotes: vec![],
        };
        let xml = rebuild_document_xml(&doc);
        assert!(xml.contains(r#"<w:p><w:r><w:t xml:space="preserve">Hello</w:t></w:r></w:p>"#));
        assert!(!xml.contains("<w:pPr>"));
    }

    #[test]
    fn run_properties_cover_the_formatting_subset() {
        let s = FormattedSpan {
            text: "x".into(),
            bold: true,
            underline: true,
            font_size: Some(28),
            font_name: Some("Garamond".into()),
            ..Default::default()
        };
        let rpr = run_properties(&s);
        assert!(rpr.starts_with(r#"<w:rFonts w:ascii="Garamond""#));
        assert!(rpr.contains("<w:b/>"));
        assert!(rpr.contains(r#"<w:u w:val="single"/>"#));
        assert!(rpr.ends_with(r#"<w:sz w:val="28"/>"#));
    }

    #[test]
    fn text_is_xml_escaped() {
        let doc = Document {
            paragraphs: vec![Paragraph {
                spans: vec![span("Smith & Sons <Ltd>")],
                ..Default::default()
            }],
            footnotes: vec![],
        };
        let xml = rebuild_document_xml(&doc);
        assert!(xml.contains("Smith &amp; Sons &lt;Ltd&gt;"));
    }

    #[test]
    fn no_footnotes_means_no_footnotes_part() {
        assert_eq!(rebuild_footnotes_xml(&Document::default()), None);
    }

    #[test]
    fn footnote_backref_becomes_a_reference() {
        let doc = Document {
            paragraphs: vec![Paragraph {
                spans: vec![
                    span("As held"),
                    FormattedSpan {
                        text: "[1] (Footnote: See id. at 12.)".into(),
                        superscript: true,
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            footnotes: vec![Footnote {
                id: "5".into(),
                content: "See id. at 12.".into(),
            }],
        };
        let xml = rebuild_document_xml(&doc);
        assert!(xml.contains(r#"<w:footnoteReference w:id="1"/>"#));
        assert!(!xml.contains("(Footnote:"));

        let notes = rebuild_footnotes_xml(&doc).unwrap();
        assert!(notes.contains(r#"<w:footnote w:id="1">"#));
        assert!(notes.contains("See id. at 12."));
        assert!(notes.contains(r#"w:id="-1""#));
    }

    #[test]
    fn rebuild_then_extract_round_trips() {
        let doc = Document {
            paragraphs: vec![
                Paragraph {
                    spans: vec![FormattedSpan {
                        text: "CAPTION".into(),
                        bold: true,
                        font_size: Some(28),
                        ..Default::default()
                    }],
                    justification: Justification::Center,
                    ..Default::default()
                },
                Paragraph {
                    spans: vec![span("Plaintiff,")],
                    tabs: Some(TabRun {
                        count: 2,
                        spacing: 3,
                    }),
                    ..Default::default()
                },
                Paragraph {
                    spans: vec![span("The second point.")],
                    list: Some(ListInfo {
                        kind: ListKind::Number,
                        level: 0,
                        ordinal: Some(2),
                    }),
                    ..Default::default()
                },
            ],
            footnotes: vec![],
        };
        let xml = rebuild_document_xml(&doc);
        let round = extract_document(xml.as_bytes(), None).unwrap();
        assert_eq!(round, doc);
    }
}
