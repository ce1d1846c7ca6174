//! # anchordoc
//!
//! Edit and audit Word documents with large language models — without letting
//! the model touch the formatting.
//!
//! ## Why this crate?
//!
//! LLMs are good at prose and terrible at OOXML. Feed a model raw
//! `document.xml` and it will happily drop namespaces, reorder runs, and
//! invent attributes. This crate keeps the XML out of the model's hands:
//! each paragraph is flattened to tagged text behind a stable anchor token,
//! the model edits only the prose between the anchors, and the decoder
//! realigns the result against the original document structure before the
//! package is rebuilt.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX
//!  │
//!  ├─ 1. Package  unzip, read document.xml + footnotes.xml
//!  ├─ 2. Extract  WordprocessingML → Document model
//!  ├─ 3. Encode   Document → anchored text  ⟦P-00001⟧<bold>…</bold>
//!  ├─ 4. Batch    token-estimate, split at anchors if over budget
//!  ├─ 5. LLM      sequential edit / citation-analysis calls
//!  ├─ 6. Decode   anchored text + template → edited Document
//!  └─ 7. Rebuild  Document → XML parts → repackaged DOCX
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use anchordoc::{edit_to_file, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials from LLAMA_API_KEY / OPENAI_API_KEY
//!     let config = PipelineConfig::default();
//!     let stats = edit_to_file(
//!         "brief.docx",
//!         "brief.edited.docx",
//!         "Fix grammatical errors. Do not change legal terms of art.",
//!         &config,
//!     )
//!     .await?;
//!     eprintln!("{} batches, {} failed", stats.batches, stats.failed_batches);
//!     Ok(())
//! }
//! ```
//!
//! Citation auditing works on the same anchored text:
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = anchordoc::PipelineConfig::default();
//! let report = anchordoc::check_citations("brief.docx", &config).await?;
//! println!("{} citations, {} with errors",
//!     report.analysis_summary.total,
//!     report.analysis_summary.with_errors);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `anchordoc` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! anchordoc = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod citations;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod llm;
pub mod processor;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{estimate_tokens, split_by_anchor, Batch, SizeAnalysis, TokenEstimator};
pub use citations::{CitationRecord, CitationReport, CitationStatus};
pub use codec::{decode, encode, strip_markup, Anchor};
pub use config::{PipelineConfig, PipelineConfigBuilder, Provider};
pub use document::{Document, DocxPackage, FormattedSpan, Paragraph};
pub use error::{AnchorDocError, BatchError};
pub use llm::{client_from_config, ChatCompletionClient, CompletionRequest};
pub use processor::{
    check_citations, check_citations_sync, check_citations_text, edit, edit_to_file,
    edit_to_file_sync, encode_docx, EditOutput, EditStats,
};
