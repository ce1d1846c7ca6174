//! WordprocessingML → document model.
//!
//! Extraction degrades gracefully per feature: a missing footnotes part
//! yields an empty table, a paragraph without numbering properties is just
//! not a list item, and unrecognized markup is ignored. Only a malformed
//! main document part is fatal.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::document::{
    Document, Footnote, FormattedSpan, Justification, ListInfo, ListKind, Paragraph, TabRun,
};
use crate::error::AnchorDocError;

const BULLET_GLYPHS: &[&str] = &["•", "◦", "▪", "▫", "-", "*"];

/// Parse the main document part (and the footnotes part, when present)
/// into a [`Document`]. Footnote display numbers are assigned in encounter
/// order, independent of the package's internal IDs.
pub fn extract_document(
    document_xml: &[u8],
    footnotes_xml: Option<&[u8]>,
) -> Result<Document, AnchorDocError> {
    let footnotes = footnotes_xml.map(extract_footnotes).unwrap_or_default();
    let paragraphs = extract_paragraphs(document_xml, &footnotes)?;
    debug!(
        paragraphs = paragraphs.len(),
        footnotes = footnotes.len(),
        "extracted document"
    );
    Ok(Document {
        paragraphs,
        footnotes,
    })
}

// ── Footnotes ────────────────────────────────────────────────────────────

/// Read the footnote table. Any parse failure degrades to an empty table;
/// the separator pseudo-footnotes (ids -1 and 0) are skipped.
fn extract_footnotes(xml: &[u8]) -> Vec<Footnote> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut footnotes = Vec::new();

    let mut current_id: Option<String> = None;
    let mut content = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"footnote" => {
                    let id = attr(&e, b"id");
                    current_id = match id.as_deref() {
                        Some("-1") | Some("0") | None => None,
                        Some(_) => id,
                    };
                    content.clear();
                }
                b"t" if current_id.is_some() => in_text = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                if let Ok(text) = t.unescape() {
                    content.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"footnote" => {
                    if let Some(id) = current_id.take() {
                        let trimmed = content.trim();
                        if !trimmed.is_empty() {
                            footnotes.push(Footnote {
                                id,
                                content: trimmed.to_string(),
                            });
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "could not parse footnotes part; continuing without footnotes");
                return Vec::new();
            }
        }
        buf.clear();
    }
    footnotes
}

// ── Paragraphs ───────────────────────────────────────────────────────────

/// Content item collected while walking a paragraph's runs, finalized once
/// the paragraph closes.
enum RunItem {
    Tab,
    Text(FormattedSpan),
    FootnoteRef(String),
}

#[derive(Default)]
struct ParagraphState {
    items: Vec<RunItem>,
    jc: Option<String>,
    ind_left: Option<i64>,
    ind_right: Option<i64>,
    has_num_pr: bool,
    has_num_id: bool,
    level: u32,
}

#[derive(Default)]
struct RunState {
    style: FormattedSpan,
    text: String,
}

fn extract_paragraphs(
    xml: &[u8],
    footnotes: &[Footnote],
) -> Result<Vec<Paragraph>, AnchorDocError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut paragraphs = Vec::new();
    let mut para: Option<ParagraphState> = None;
    let mut run: Option<RunState> = None;
    let mut in_ppr = false;
    let mut in_rpr = false;
    let mut in_text = false;
    // Display number for the next footnote reference, in encounter order.
    let mut footnote_counter = 1usize;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| AnchorDocError::XmlParse {
                part: "word/document.xml".to_string(),
                detail: e.to_string(),
            })?;
        match event {
            Event::Start(e) => {
                handle_open(
                    &e, true, &mut para, &mut run, &mut in_ppr, &mut in_rpr, &mut in_text,
                );
            }
            Event::Empty(e) => {
                handle_open(
                    &e, false, &mut para, &mut run, &mut in_ppr, &mut in_rpr, &mut in_text,
                );
            }
            Event::Text(t) => {
                if in_text {
                    if let (Some(run), Ok(text)) = (&mut run, t.unescape()) {
                        run.text.push_str(&text);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"pPr" => in_ppr = false,
                b"rPr" => in_rpr = false,
                b"t" => in_text = false,
                b"r" => {
                    if let (Some(para), Some(run)) = (&mut para, run.take()) {
                        if !run.text.is_empty() {
                            para.items.push(RunItem::Text(FormattedSpan {
                                text: run.text,
                                ..run.style
                            }));
                        }
                    }
                }
                b"p" => {
                    if let Some(state) = para.take() {
                        if let Some(p) =
                            finish_paragraph(state, footnotes, &mut footnote_counter)
                        {
                            paragraphs.push(p);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

fn handle_open(
    e: &BytesStart,
    has_body: bool,
    para: &mut Option<ParagraphState>,
    run: &mut Option<RunState>,
    in_ppr: &mut bool,
    in_rpr: &mut bool,
    in_text: &mut bool,
) {
    match e.local_name().as_ref() {
        b"p" if has_body => {
            *para = Some(ParagraphState::default());
            *run = None;
            *in_ppr = false;
            *in_rpr = false;
        }
        b"pPr" if has_body => *in_ppr = true,
        b"r" if has_body && para.is_some() && !*in_ppr => {
            *run = Some(RunState::default());
            *in_rpr = false;
        }
        b"rPr" if has_body => *in_rpr = true,
        // A self-closing <w:t/> carries no text and must not leave the
        // scanner expecting character data.
        b"t" if has_body && run.is_some() => *in_text = true,
        b"tab" if run.is_some() && !*in_ppr => {
            // w:tab inside pPr/w:tabs is a tab-stop definition, not content.
            if let Some(para) = para {
                para.items.push(RunItem::Tab);
            }
        }
        b"footnoteReference" => {
            if let (Some(para), Some(id)) = (para.as_mut(), attr(e, b"id")) {
                para.items.push(RunItem::FootnoteRef(id));
            }
        }
        b"jc" if *in_ppr => {
            if let (Some(para), Some(val)) = (para.as_mut(), attr(e, b"val")) {
                para.jc = Some(val);
            }
        }
        b"ind" if *in_ppr => {
            if let Some(para) = para {
                para.ind_left = attr(e, b"left").and_then(|v| v.parse().ok());
                para.ind_right = attr(e, b"right").and_then(|v| v.parse().ok());
            }
        }
        b"numPr" if *in_ppr => {
            if let Some(para) = para {
                para.has_num_pr = true;
            }
        }
        b"ilvl" if *in_ppr => {
            if let (Some(para), Some(val)) = (para.as_mut(), attr(e, b"val")) {
                para.level = val.parse().unwrap_or(0);
            }
        }
        b"numId" if *in_ppr => {
            if let Some(para) = para {
                para.has_num_id = true;
            }
        }
        b"b" if *in_rpr => set_style(run, |s| s.bold = true),
        b"i" if *in_rpr => set_style(run, |s| s.italic = true),
        b"u" if *in_rpr => set_style(run, |s| s.underline = true),
        b"smallCaps" if *in_rpr => set_style(run, |s| s.small_caps = true),
        b"vertAlign" if *in_rpr => {
            let val = attr(e, b"val");
            set_style(run, |s| match val.as_deref() {
                Some("superscript") => s.superscript = true,
                Some("subscript") => s.subscript = true,
                _ => {}
            });
        }
        b"sz" if *in_rpr => {
            let size = attr(e, b"val").and_then(|v| v.parse().ok());
            set_style(run, |s| s.font_size = size);
        }
        b"rFonts" if *in_rpr => {
            let name = attr(e, b"ascii").or_else(|| attr(e, b"eastAsia"));
            set_style(run, |s| s.font_name = name.clone());
        }
        _ => {}
    }
}

fn set_style(run: &mut Option<RunState>, f: impl FnOnce(&mut FormattedSpan)) {
    if let Some(run) = run {
        f(&mut run.style);
    }
}

fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == name {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// Turn the collected run items into a [`Paragraph`]: collapse the leading
/// tab run, inline footnote references, infer list membership, and resolve
/// justification. Paragraphs with no content at all are dropped.
fn finish_paragraph(
    state: ParagraphState,
    footnotes: &[Footnote],
    footnote_counter: &mut usize,
) -> Option<Paragraph> {
    let mut para = Paragraph {
        justification: resolve_justification(&state),
        list: infer_list(&state),
        ..Default::default()
    };

    let mut items = state.items.into_iter().peekable();
    while let Some(item) = items.next() {
        match item {
            RunItem::Tab => {
                let mut count = 1u32;
                let mut spacing = 0u32;
                // Absorb consecutive tabs, then whitespace-only runs
                // immediately following them.
                loop {
                    match items.peek() {
                        Some(RunItem::Tab) => {
                            count += 1;
                            items.next();
                        }
                        Some(RunItem::Text(span))
                            if !span.text.is_empty()
                                && span.text.chars().all(|c| c == ' ') =>
                        {
                            spacing += span.text.chars().count() as u32;
                            items.next();
                        }
                        _ => break,
                    }
                }
                if para.tabs.is_none() {
                    para.tabs = Some(TabRun { count, spacing });
                }
            }
            RunItem::Text(span) => para.spans.push(span),
            RunItem::FootnoteRef(id) => {
                let Some(footnote) = footnotes.iter().find(|f| f.id == id) else {
                    continue;
                };
                para.spans.push(FormattedSpan {
                    text: format!("[{}] (Footnote: {})", footnote_counter, footnote.content),
                    superscript: true,
                    ..Default::default()
                });
                *footnote_counter += 1;
            }
        }
    }

    // A detected literal marker is folded into the list info; the encoder
    // regenerates it from there.
    if para.list.is_some() {
        strip_list_marker(&mut para);
    }

    if para.spans.is_empty() && para.tabs.is_none() {
        return None;
    }
    Some(para)
}

fn resolve_justification(state: &ParagraphState) -> Justification {
    match state.jc.as_deref() {
        Some("center") => Justification::Center,
        Some("right") => Justification::Right,
        Some("justify") | Some("both") | Some("distribute") => Justification::Justify,
        Some(_) => Justification::Left,
        None => {
            // Asymmetric indentation is a weak centering signal.
            match (state.ind_left, state.ind_right) {
                (Some(l), Some(r)) if l != r => Justification::Center,
                _ => Justification::Left,
            }
        }
    }
}

/// A numbering-property block marks a list item. Kind and ordinal are
/// inferred from the first run's literal text; with no literal evidence the
/// item defaults to a numbered entry (ordinal filled in at encode time).
fn infer_list(state: &ParagraphState) -> Option<ListInfo> {
    if !state.has_num_pr || !state.has_num_id {
        return None;
    }
    let mut kind = ListKind::Number;
    let mut ordinal = None;
    for item in &state.items {
        let RunItem::Text(span) = item else { continue };
        let text = span.text.trim();
        if text.is_empty() {
            continue;
        }
        if BULLET_GLYPHS.contains(&text) {
            kind = ListKind::Bullet;
        } else if text.starts_with(|c: char| c.is_ascii_digit()) && text.contains('.') {
            if let Ok(n) = text.split('.').next().unwrap_or_default().parse() {
                ordinal = Some(n);
            }
        }
        break;
    }
    Some(ListInfo {
        kind,
        level: state.level,
        ordinal,
    })
}

/// Remove the literal marker text from the first span so the encoder does
/// not emit it twice.
fn strip_list_marker(para: &mut Paragraph) {
    let Some(list) = para.list else { return };
    let Some(first) = para.spans.first_mut() else {
        return;
    };
    let stripped = match list.kind {
        ListKind::Bullet => {
            let t = first.text.trim_start();
            BULLET_GLYPHS
                .iter()
                .find_map(|g| t.strip_prefix(g))
                .map(|rest| rest.trim_start().to_string())
        }
        ListKind::Number => {
            let t = first.text.trim_start();
            list.ordinal.and_then(|n| {
                t.strip_prefix(&format!("{n}."))
                    .map(|rest| rest.trim_start().to_string())
            })
        }
    };
    if let Some(rest) = stripped {
        if rest.is_empty() {
            para.spans.remove(0);
        } else {
            first.text = rest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

    fn doc(body: &str) -> String {
        format!(r#"<?xml version="1.0"?><w:document {W}><w:body>{body}</w:body></w:document>"#)
    }

    #[test]
    fn plain_paragraph_with_formatting() {
        let xml = doc(
            r#"<w:p>
                 <w:r><w:rPr><w:b/></w:rPr><w:t>Order</w:t></w:r>
                 <w:r><w:t xml:space="preserve"> of the court</w:t></w:r>
               </w:p>"#,
        );
        let d = extract_document(xml.as_bytes(), None).unwrap();
        assert_eq!(d.paragraphs.len(), 1);
        let spans = &d.paragraphs[0].spans;
        assert_eq!(spans.len(), 2);
        assert!(spans[0].bold);
        assert_eq!(spans[0].text, "Order");
        assert_eq!(spans[1].text, " of the court");
        assert!(!spans[1].bold);
    }

    #[test]
    fn justification_and_fonts() {
        let xml = doc(
            r#"<w:p>
                 <w:pPr><w:jc w:val="center"/></w:pPr>
                 <w:r><w:rPr><w:sz w:val="28"/><w:rFonts w:ascii="Garamond"/></w:rPr>
                   <w:t>CAPTION</w:t></w:r>
               </w:p>"#,
        );
        let d = extract_document(xml.as_bytes(), None).unwrap();
        let p = &d.paragraphs[0];
        assert_eq!(p.justification, Justification::Center);
        assert_eq!(p.spans[0].font_size, Some(28));
        assert_eq!(p.spans[0].font_name.as_deref(), Some("Garamond"));
    }

    #[test]
    fn consecutive_tabs_collapse_with_spacing() {
        let xml = doc(
            r#"<w:p>
                 <w:r><w:tab/></w:r>
                 <w:r><w:tab/></w:r>
                 <w:r><w:t xml:space="preserve">   </w:t></w:r>
                 <w:r><w:t>Plaintiff,</w:t></w:r>
               </w:p>"#,
        );
        let d = extract_document(xml.as_bytes(), None).unwrap();
        let p = &d.paragraphs[0];
        assert_eq!(p.tabs, Some(TabRun { count: 2, spacing: 3 }));
        assert_eq!(p.spans.len(), 1);
        assert_eq!(p.spans[0].text, "Plaintiff,");
    }

    #[test]
    fn numbered_list_with_literal_marker() {
        let xml = doc(
            r#"<w:p>
                 <w:pPr><w:numPr><w:ilvl w:val="1"/><w:numId w:val="3"/></w:numPr></w:pPr>
                 <w:r><w:t>2. The second point.</w:t></w:r>
               </w:p>"#,
        );
        let d = extract_document(xml.as_bytes(), None).unwrap();
        let p = &d.paragraphs[0];
        assert_eq!(
            p.list,
            Some(ListInfo {
                kind: ListKind::Number,
                level: 1,
                ordinal: Some(2),
            })
        );
        assert_eq!(p.spans[0].text, "The second point.");
    }

    #[test]
    fn bullet_glyph_marks_bullet_list() {
        let xml = doc(
            r#"<w:p>
                 <w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr>
                 <w:r><w:t>•</w:t></w:r>
                 <w:r><w:t xml:space="preserve"> bullet text</w:t></w:r>
               </w:p>"#,
        );
        let d = extract_document(xml.as_bytes(), None).unwrap();
        let p = &d.paragraphs[0];
        assert_eq!(p.list.map(|l| l.kind), Some(ListKind::Bullet));
        // The glyph-only run is consumed entirely.
        assert_eq!(p.spans[0].text, " bullet text");
    }

    #[test]
    fn paragraph_without_numbering_is_not_a_list() {
        let xml = doc(r#"<w:p><w:r><w:t>1. Looks like a list but is not.</w:t></w:r></w:p>"#);
        let d = extract_document(xml.as_bytes(), None).unwrap();
        assert_eq!(d.paragraphs[0].list, None);
    }

    #[test]
    fn footnotes_inline_in_encounter_order() {
        let footnotes = format!(
            r#"<?xml version="1.0"?><w:footnotes {W}>
                 <w:footnote w:id="-1"><w:p><w:r><w:separator/></w:r></w:p></w:footnote>
                 <w:footnote w:id="5"><w:p><w:r><w:t>See id. at 12.</w:t></w:r></w:p></w:footnote>
               </w:footnotes>"#
        );
        let xml = doc(
            r#"<w:p>
                 <w:r><w:t>As held before</w:t></w:r>
                 <w:r><w:footnoteReference w:id="5"/></w:r>
               </w:p>"#,
        );
        let d = extract_document(xml.as_bytes(), Some(footnotes.as_bytes())).unwrap();
        assert_eq!(d.footnotes.len(), 1);
        let span = &d.paragraphs[0].spans[1];
        assert!(span.superscript);
        assert_eq!(span.text, "[1] (Footnote: See id. at 12.)");
    }

    #[test]
    fn malformed_footnotes_degrade_to_empty() {
        let xml = doc(r#"<w:p><w:r><w:t>text</w:t></w:r></w:p>"#);
        let d = extract_document(xml.as_bytes(), Some(b"<not-closed")).unwrap();
        assert!(d.footnotes.is_empty());
        assert_eq!(d.paragraphs.len(), 1);
    }

    #[test]
    fn empty_paragraphs_are_skipped() {
        let xml = doc(r#"<w:p></w:p><w:p><w:r><w:t>only</w:t></w:r></w:p>"#);
        let d = extract_document(xml.as_bytes(), None).unwrap();
        assert_eq!(d.paragraphs.len(), 1);
    }
}
