//! Error types for the anchordoc library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnchorDocError`] — **Fatal**: the operation cannot proceed at all
//!   (missing file, unreadable package, no client configured). Returned as
//!   `Err(AnchorDocError)` from the top-level `processor` functions.
//!
//! * [`BatchError`] — **Non-fatal**: a single batch failed (transport error
//!   after retries, unparseable model output) but every other batch is fine.
//!   Stored inside [`crate::citations::CitationReport`] so callers can inspect
//!   partial success rather than losing the whole document to one bad batch.
//!
//! The separation lets callers decide their own tolerance: abort on the first
//! batch failure, log and continue, or collect all failures for a post-run
//! report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the anchordoc library.
///
/// Batch-level failures use [`BatchError`] and are stored in
/// [`crate::citations::CitationReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum AnchorDocError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file exists but is not a readable zip container.
    #[error("'{path}' is not a valid document package: {detail}")]
    InvalidPackage { path: PathBuf, detail: String },

    /// A required package part is missing (e.g. word/document.xml).
    #[error("Package is missing required part '{part}'")]
    MissingPart { part: String },

    /// A package part exists but its XML cannot be parsed.
    #[error("Failed to parse '{part}': {detail}")]
    XmlParse { part: String, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider cannot be constructed (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ClientNotConfigured { provider: String, hint: String },

    /// A transport-level failure that exhausted all retries on a call the
    /// pipeline cannot proceed without (e.g. the edit flow).
    #[error("LLM call failed after {retries} retries: {detail}")]
    LlmFailed { retries: u32, detail: String },

    /// Every batch failed; there is no result to assemble.
    #[error("All {total} batches failed.\nFirst error: {first_error}")]
    AllBatchesFailed { total: usize, first_error: String },

    /// Model output could not be parsed by any extraction strategy on a call
    /// the pipeline cannot proceed without.
    #[error("Model response contained no parseable JSON{}", saved_to_note(.saved_to))]
    UnparseableResponse { saved_to: Option<PathBuf> },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn saved_to_note(saved_to: &Option<PathBuf>) -> String {
    match saved_to {
        Some(p) => format!("\nRaw response saved to: {}", p.display()),
        None => String::new(),
    }
}

/// A non-fatal error for a single batch.
///
/// Stored in the report when a batch fails. The overall pipeline continues
/// unless ALL batches fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BatchError {
    /// LLM call failed after retries.
    #[error("Batch {batch}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        batch: usize,
        retries: u32,
        detail: String,
    },

    /// Model output matched none of the JSON extraction strategies.
    /// The raw response is kept on disk for forensic inspection.
    #[error("Batch {batch}: model response contained no parseable JSON{}", raw_note(.raw_saved_to))]
    Unparseable {
        batch: usize,
        raw_saved_to: Option<PathBuf>,
    },
}

fn raw_note(raw_saved_to: &Option<PathBuf>) -> String {
    match raw_saved_to {
        Some(p) => format!(" (raw output: {})", p.display()),
        None => String::new(),
    }
}

impl BatchError {
    /// The 1-indexed batch number this error belongs to.
    pub fn batch(&self) -> usize {
        match self {
            BatchError::LlmFailed { batch, .. } => *batch,
            BatchError::Unparseable { batch, .. } => *batch,
        }
    }
}
