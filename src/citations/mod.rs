//! Citation records and reports.
//!
//! A [`CitationRecord`] is created per-batch by parsing model output. The
//! same citation can arrive in multiple competing instances when batches
//! overlap; the reconciler collapses each group to one authoritative record.

mod pipeline;
mod reconcile;

pub use pipeline::check_citations;
pub use reconcile::reconcile;

use serde::{Deserialize, Serialize};

use crate::codec::anchor::Anchor;
use crate::error::BatchError;

/// Model's verdict on one citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CitationStatus {
    #[serde(alias = "correct")]
    Correct,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "uncertain")]
    Uncertain,
    #[serde(alias = "not_a_citation", alias = "NotCitation")]
    NotACitation,
}

/// One analyzed citation, pinned to a paragraph anchor and a character span
/// within that paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    #[serde(with = "anchor_label")]
    pub anchor: Anchor,
    #[serde(default)]
    pub start_offset: usize,
    #[serde(default)]
    pub end_offset: usize,
    /// Citation kind as the model reports it, e.g. "case", "statute".
    #[serde(rename = "type", default)]
    pub citation_type: String,
    pub status: CitationStatus,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub suggested_text: Option<String>,
}

impl CitationRecord {
    /// The grouping key for reconciliation: competing instances of the same
    /// citation share anchor and starting offset.
    pub fn conflict_key(&self) -> (Anchor, usize) {
        (self.anchor, self.start_offset)
    }
}

/// Anchor fields on the wire use the display label (`P-00012`); the raw
/// token and a bare number are accepted too, since models take liberties.
mod anchor_label {
    use super::Anchor;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(anchor: &Anchor, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&anchor.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Anchor, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u32),
            Label(String),
        }
        match Raw::deserialize(de)? {
            Raw::Num(n) => Ok(Anchor(n)),
            Raw::Label(s) => {
                let trimmed = s.trim().trim_matches(['⟦', '⟧']);
                let digits = trimmed.strip_prefix("P-").unwrap_or(trimmed);
                digits
                    .parse()
                    .map(Anchor)
                    .map_err(|_| D::Error::custom(format!("invalid anchor label '{s}'")))
            }
        }
    }
}

/// Aggregate counts over the final reconciled citation set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total: usize,
    pub with_errors: usize,
    pub correct: usize,
    /// Present only when the text was batched.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub batches_processed: Option<usize>,
}

/// The citation pipeline's terminal artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationReport {
    pub analysis_summary: AnalysisSummary,
    pub citations: Vec<CitationRecord>,
    pub recommendations: Vec<String>,
    /// Batches that failed transport or output parsing; their anchors are
    /// absent from `citations`. Partial failure is preferred to total
    /// failure, so a report with entries here is still a valid report.
    #[serde(default)]
    pub failed_batches: Vec<BatchError>,
}

impl CitationReport {
    /// Build the summary from the reconciled record set.
    pub(crate) fn summarize(
        citations: Vec<CitationRecord>,
        recommendations: Vec<String>,
        failed_batches: Vec<BatchError>,
        batches_processed: Option<usize>,
    ) -> Self {
        let with_errors = citations
            .iter()
            .filter(|c| c.status == CitationStatus::Error)
            .count();
        let correct = citations
            .iter()
            .filter(|c| c.status == CitationStatus::Correct)
            .count();
        Self {
            analysis_summary: AnalysisSummary {
                total: citations.len(),
                with_errors,
                correct,
                batches_processed,
            },
            citations,
            recommendations,
            failed_batches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_deserializes_from_model_shapes() {
        let json = r#"{
            "anchor": "P-00012",
            "start_offset": 10,
            "end_offset": 42,
            "type": "case",
            "status": "Error",
            "errors": ["reporter abbreviation"],
            "original_text": "Smith v Jones, 5 US 137",
            "suggested_text": "Smith v. Jones, 5 U.S. 137"
        }"#;
        let rec: CitationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.anchor, Anchor(12));
        assert_eq!(rec.status, CitationStatus::Error);
        assert_eq!(rec.conflict_key(), (Anchor(12), 10));
    }

    #[test]
    fn anchor_accepts_token_and_number() {
        let rec: CitationRecord =
            serde_json::from_str(r#"{"anchor": "⟦P-00003⟧", "status": "Correct"}"#).unwrap();
        assert_eq!(rec.anchor, Anchor(3));
        let rec: CitationRecord =
            serde_json::from_str(r#"{"anchor": 7, "status": "uncertain"}"#).unwrap();
        assert_eq!(rec.anchor, Anchor(7));
        assert_eq!(rec.status, CitationStatus::Uncertain);
    }

    #[test]
    fn summary_counts_by_status() {
        let make = |status| CitationRecord {
            anchor: Anchor(1),
            start_offset: 0,
            end_offset: 0,
            citation_type: String::new(),
            status,
            errors: vec![],
            original_text: String::new(),
            suggested_text: None,
        };
        let report = CitationReport::summarize(
            vec![
                make(CitationStatus::Correct),
                make(CitationStatus::Error),
                make(CitationStatus::Uncertain),
            ],
            vec![],
            vec![],
            Some(2),
        );
        assert_eq!(report.analysis_summary.total, 3);
        assert_eq!(report.analysis_summary.with_errors, 1);
        assert_eq!(report.analysis_summary.correct, 1);
        assert_eq!(report.analysis_summary.batches_processed, Some(2));
    }
}
