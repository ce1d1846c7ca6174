//! In-memory document model.
//!
//! A [`Document`] is an ordered list of [`Paragraph`]s plus a footnote table.
//! Paragraphs own an ordered list of [`FormattedSpan`]s; everything the codec
//! round-trips lives in these types. The model covers the paragraph / run /
//! footnote / list / tab / justification subset of WordprocessingML that
//! typical legal documents actually use — it is not a general OOXML model.

mod extract;
mod package;
mod rebuild;

pub use extract::extract_document;
pub use package::{DocxPackage, DOCUMENT_PART, FOOTNOTES_PART};
pub use rebuild::{rebuild_document_xml, rebuild_footnotes_xml};

use serde::{Deserialize, Serialize};

/// Paragraph alignment. `Left` is the unmarked default and is never tagged
/// in the anchored-text representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Justification {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Justification {
    /// The suffix used in `<justify_X>` tags. `None` for left.
    pub fn tag_suffix(&self) -> Option<&'static str> {
        match self {
            Justification::Left => None,
            Justification::Center => Some("center"),
            Justification::Right => Some("right"),
            Justification::Justify => Some("justify"),
        }
    }

    /// Parse a tag suffix back into a justification.
    pub fn from_tag_suffix(s: &str) -> Option<Self> {
        match s {
            "center" => Some(Justification::Center),
            "right" => Some(Justification::Right),
            "justify" => Some(Justification::Justify),
            _ => None,
        }
    }
}

/// Bullet vs. numbered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Bullet,
    Number,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Bullet => "bullet",
            ListKind::Number => "number",
        }
    }
}

/// List membership for a paragraph. Absence means "not a list item".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    pub kind: ListKind,
    /// Nesting level, 0-based.
    pub level: u32,
    /// Numeric ordinal for numbered lists, when the source text shows one.
    pub ordinal: Option<u32>,
}

impl ListInfo {
    /// The literal marker prefix the encoder emits inside `<list_item>`.
    pub fn marker(&self) -> String {
        match self.kind {
            ListKind::Bullet => "• ".to_string(),
            ListKind::Number => format!("{}. ", self.ordinal.unwrap_or(1)),
        }
    }
}

/// A collapsed run of consecutive tab characters plus any whitespace-only
/// runs immediately following them. Collapsing avoids one marker per
/// physical tab in deeply indented captions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabRun {
    pub count: u32,
    /// Number of trailing space characters after the tabs.
    pub spacing: u32,
}

/// A run of literal text with independent, composable formatting flags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormattedSpan {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub small_caps: bool,
    pub superscript: bool,
    pub subscript: bool,
    /// Font size in half-points, as WordprocessingML stores it.
    pub font_size: Option<u32>,
    pub font_name: Option<String>,
}

impl FormattedSpan {
    /// A plain unformatted span.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// True when two spans carry identical formatting (text ignored).
    pub fn same_style(&self, other: &Self) -> bool {
        self.bold == other.bold
            && self.italic == other.italic
            && self.underline == other.underline
            && self.small_caps == other.small_caps
            && self.superscript == other.superscript
            && self.subscript == other.subscript
            && self.font_size == other.font_size
            && self.font_name == other.font_name
    }

    /// True when no formatting is applied at all.
    pub fn is_plain(&self) -> bool {
        self.same_style(&Self::default())
    }
}

/// One paragraph: spans plus paragraph-level attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Paragraph {
    pub spans: Vec<FormattedSpan>,
    pub justification: Justification,
    /// `Some` when the paragraph carries a numbering-property block.
    pub list: Option<ListInfo>,
    /// Leading tab run, collapsed per the tab-detection rule.
    pub tabs: Option<TabRun>,
}

impl Paragraph {
    /// Concatenated literal text of all spans.
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

/// A footnote, keyed by its source package ID. Display numbering is assigned
/// in encounter order at extraction time, independent of this ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footnote {
    pub id: String,
    pub content: String,
}

/// The whole document: paragraphs in order plus the footnote table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    pub paragraphs: Vec<Paragraph>,
    pub footnotes: Vec<Footnote>,
}

impl Document {
    /// Merge adjacent spans with identical formatting inside each paragraph
    /// and drop empty spans.
    ///
    /// The decoder always produces this normal form, so round-trip equality
    /// (`decode(encode(d), d) == d`) holds for normalized documents. Callers
    /// comparing documents should normalize both sides first.
    pub fn normalize(mut self) -> Self {
        for para in &mut self.paragraphs {
            let mut merged: Vec<FormattedSpan> = Vec::with_capacity(para.spans.len());
            for span in para.spans.drain(..) {
                if span.text.is_empty() {
                    continue;
                }
                match merged.last_mut() {
                    Some(last) if last.same_style(&span) => last.text.push_str(&span.text),
                    _ => merged.push(span),
                }
            }
            para.spans = merged;
            // A numbered item with no recorded ordinal encodes as "1. ", so
            // the normal form carries the explicit ordinal.
            if let Some(list) = &mut para.list {
                if list.kind == ListKind::Number {
                    list.ordinal.get_or_insert(1);
                }
            }
        }
        self
    }

    /// Total paragraph count.
    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }
}
