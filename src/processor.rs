//! Top-level document operations.
//!
//! Everything here is eager: open the package, run the whole flow, return.
//! The edit flow is the long pole — extract, encode, batched LLM edit calls,
//! decode against the template, rebuild the XML parts, repackage — and it
//! survives partial failure: a batch whose edit call fails (or whose output
//! mangles the anchors) keeps its original text, and the operation only
//! errors out when every batch failed.

use std::path::Path;
use std::time::Instant;

use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::batch::{split_by_anchor, TokenEstimator};
use crate::citations::{self, CitationReport};
use crate::codec::{decode, encode, scan_anchors};
use crate::config::PipelineConfig;
use crate::document::{
    extract_document, rebuild_document_xml, rebuild_footnotes_xml, Document, DocxPackage,
    DOCUMENT_PART, FOOTNOTES_PART,
};
use crate::error::AnchorDocError;
use crate::llm::{client_from_config, ChatCompletionClient, CompletionRequest};
use crate::prompts;

/// Result of an edit run.
#[derive(Debug)]
pub struct EditOutput {
    /// The edited document, realigned against the source structure.
    pub document: Document,
    /// The edited anchored text the model returned (batches rejoined).
    pub anchored_text: String,
    pub stats: EditStats,
}

/// Counters and timings for one edit run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditStats {
    pub paragraphs: usize,
    pub batches: usize,
    /// Batches that kept their original text because the edit call failed
    /// or its output broke anchor alignment.
    pub failed_batches: usize,
    pub total_duration_ms: u64,
    pub llm_duration_ms: u64,
}

/// Extract a document and render it as anchored text. No LLM involved.
pub fn encode_docx(input: impl AsRef<Path>) -> Result<String, AnchorDocError> {
    let package = DocxPackage::open(input.as_ref())?;
    let document = extract_document(package.document_xml()?, package.footnotes_xml())?;
    info!(
        paragraphs = document.len(),
        footnotes = document.footnotes.len(),
        "encoded document"
    );
    Ok(encode(&document))
}

/// Apply an editing instruction to a document, returning the edited model
/// and text without writing anything to disk.
pub async fn edit(
    input: impl AsRef<Path>,
    instruction: &str,
    config: &PipelineConfig,
) -> Result<EditOutput, AnchorDocError> {
    let package = DocxPackage::open(input.as_ref())?;
    let client = client_from_config(config)?;
    edit_package(&package, instruction, client.as_ref(), config).await
}

/// Apply an editing instruction and write the edited package to
/// `output_path`. The write is atomic (temp sibling + rename).
pub async fn edit_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    instruction: &str,
    config: &PipelineConfig,
) -> Result<EditStats, AnchorDocError> {
    let package = DocxPackage::open(input.as_ref())?;
    let client = client_from_config(config)?;
    let output = edit_package(&package, instruction, client.as_ref(), config).await?;

    let path = output_path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| AnchorDocError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }

    let document_xml = rebuild_document_xml(&output.document);
    let footnotes_xml = rebuild_footnotes_xml(&output.document);
    let mut replacements: Vec<(&str, &[u8])> = vec![(DOCUMENT_PART, document_xml.as_bytes())];
    if let Some(xml) = &footnotes_xml {
        replacements.push((FOOTNOTES_PART, xml.as_bytes()));
    }
    package.repackage(path, &replacements)?;
    info!(path = %path.display(), "wrote edited document");
    Ok(output.stats)
}

/// Synchronous wrapper around [`edit_to_file`]. Creates a temporary tokio
/// runtime internally.
pub fn edit_to_file_sync(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    instruction: &str,
    config: &PipelineConfig,
) -> Result<EditStats, AnchorDocError> {
    runtime()?.block_on(edit_to_file(input, output_path, instruction, config))
}

/// Analyze citations in a document package.
pub async fn check_citations(
    input: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<CitationReport, AnchorDocError> {
    let text = encode_docx(input)?;
    check_citations_text(&text, config).await
}

/// Analyze citations in already-anchored text.
pub async fn check_citations_text(
    text: &str,
    config: &PipelineConfig,
) -> Result<CitationReport, AnchorDocError> {
    let client = client_from_config(config)?;
    citations::check_citations(text, client.as_ref(), config).await
}

/// Synchronous wrapper around [`check_citations`].
pub fn check_citations_sync(
    input: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<CitationReport, AnchorDocError> {
    runtime()?.block_on(check_citations(input, config))
}

fn runtime() -> Result<tokio::runtime::Runtime, AnchorDocError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnchorDocError::Internal(format!("failed to create tokio runtime: {e}")))
}

// ── Edit flow internals ──────────────────────────────────────────────────

async fn edit_package(
    package: &DocxPackage,
    instruction: &str,
    client: &dyn ChatCompletionClient,
    config: &PipelineConfig,
) -> Result<EditOutput, AnchorDocError> {
    let total_start = Instant::now();

    // ── Step 1: Extract and encode ───────────────────────────────────────
    let template = extract_document(package.document_xml()?, package.footnotes_xml())?;
    let encoded = encode(&template);
    info!(paragraphs = template.len(), "extracted document for editing");

    // ── Step 2: Plan batches ─────────────────────────────────────────────
    let estimator = TokenEstimator::new(config);
    let prompt_probe = prompts::edit_user_prompt(instruction, "");
    let analysis = estimator.analyze(&encoded, &prompt_probe);
    let chunks: Vec<String> = if analysis.fits_in_context {
        debug!(tokens = analysis.text_tokens, "editing in a single call");
        vec![encoded.clone()]
    } else {
        let batches = split_by_anchor(&encoded, analysis.available_tokens);
        info!(
            tokens = analysis.text_tokens,
            budget = analysis.available_tokens,
            batches = batches.len(),
            "editing in batches"
        );
        batches.into_iter().map(|b| b.text).collect()
    };

    // ── Step 3: Dispatch edit calls sequentially ─────────────────────────
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(prompts::DEFAULT_EDIT_SYSTEM_PROMPT);

    let llm_start = Instant::now();
    let total = chunks.len();
    let mut edited_chunks: Vec<String> = Vec::with_capacity(total);
    let mut failed = 0usize;
    let mut first_error: Option<String> = None;

    for (i, chunk) in chunks.iter().enumerate() {
        let number = i + 1;
        if i > 0 && config.batch_delay_ms > 0 {
            sleep(Duration::from_millis(config.batch_delay_ms)).await;
        }
        info!(batch = number, total, "dispatching edit batch");

        let request = CompletionRequest::new(
            system_prompt,
            prompts::edit_user_prompt(instruction, chunk),
            config,
        );

        match client.complete(&request).await {
            Ok(response) => {
                let edited = response.trim().to_string();
                if scan_anchors(&edited) == scan_anchors(chunk) {
                    edited_chunks.push(edited);
                } else {
                    // Broken anchors would shift every following paragraph
                    // at decode time; the original text is the safe choice.
                    warn!(batch = number, "edit response broke anchor alignment; keeping original");
                    failed += 1;
                    first_error
                        .get_or_insert_with(|| "edit response broke anchor alignment".to_string());
                    edited_chunks.push(chunk.trim_matches(['\n', '\r']).to_string());
                }
            }
            Err(e) => {
                warn!(batch = number, error = %e, "edit batch failed; keeping original");
                failed += 1;
                first_error.get_or_insert_with(|| e.to_string());
                edited_chunks.push(chunk.trim_matches(['\n', '\r']).to_string());
            }
        }
    }
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    if failed == total {
        return Err(AnchorDocError::AllBatchesFailed {
            total,
            first_error: first_error.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    // ── Step 4: Decode against the template ──────────────────────────────
    let anchored_text = edited_chunks.join("\n\n");
    let document = decode(&anchored_text, &template);

    let stats = EditStats {
        paragraphs: document.len(),
        batches: total,
        failed_batches: failed,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        llm_duration_ms,
    };
    info!(
        batches = stats.batches,
        failed = stats.failed_batches,
        duration_ms = stats.total_duration_ms,
        "edit complete"
    );
    Ok(EditOutput {
        document,
        anchored_text,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const SAMPLE_DOCUMENT_XML: &str = concat!(
        r#"<?xml version="1.0"?>"#,
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
        "<w:body>",
        "<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>ORDER</w:t></w:r></w:p>",
        r#"<w:p><w:r><w:t xml:space="preserve">The motion is granted.</w:t></w:r></w:p>"#,
        "</w:body></w:document>",
    );

    fn sample_package() -> DocxPackage {
        DocxPackage::from_parts(vec![(
            DOCUMENT_PART.to_string(),
            SAMPLE_DOCUMENT_XML.as_bytes().to_vec(),
        )])
    }

    /// Returns the anchored text from the user prompt unchanged, as a model
    /// that made no edits would.
    struct IdentityClient;

    #[async_trait]
    impl ChatCompletionClient for IdentityClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, AnchorDocError> {
            let text = request
                .user_prompt
                .split_once("Text to edit:\n")
                .map(|(_, t)| t)
                .unwrap_or_default();
            Ok(text.to_string())
        }
        fn model(&self) -> &str {
            "mock"
        }
    }

    /// Uppercases the prose but keeps anchors and tags intact.
    struct ShoutingClient;

    #[async_trait]
    impl ChatCompletionClient for ShoutingClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, AnchorDocError> {
            let text = request
                .user_prompt
                .split_once("Text to edit:\n")
                .map(|(_, t)| t)
                .unwrap_or_default();
            Ok(text.replace("granted", "GRANTED"))
        }
        fn model(&self) -> &str {
            "mock"
        }
    }

    /// Drops every anchor token from its output.
    struct AnchorEatingClient;

    #[async_trait]
    impl ChatCompletionClient for AnchorEatingClient {
        async fn complete(&self, _: &CompletionRequest) -> Result<String, AnchorDocError> {
            Ok("all the anchors are gone".to_string())
        }
        fn model(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn identity_edit_round_trips_the_document() {
        let package = sample_package();
        let config = PipelineConfig::default();
        let out = edit_package(&package, "change nothing", &IdentityClient, &config)
            .await
            .unwrap();
        let template = extract_document(package.document_xml().unwrap(), None).unwrap();
        assert_eq!(out.document, template.normalize());
        assert_eq!(out.stats.failed_batches, 0);
        assert_eq!(out.stats.batches, 1);
    }

    #[tokio::test]
    async fn prose_edits_land_in_the_right_paragraph() {
        let package = sample_package();
        let config = PipelineConfig::default();
        let out = edit_package(&package, "capitalize rulings", &ShoutingClient, &config)
            .await
            .unwrap();
        assert_eq!(out.document.paragraphs[1].plain_text(), "The motion is GRANTED.");
        // First paragraph untouched, formatting preserved.
        assert!(out.document.paragraphs[0].spans[0].bold);
    }

    #[tokio::test]
    async fn anchor_loss_in_the_only_batch_is_fatal() {
        let package = sample_package();
        let config = PipelineConfig::default();
        let err = edit_package(&package, "edit", &AnchorEatingClient, &config)
            .await
            .err();
        // Single batch, single failure: everything failed.
        assert!(matches!(err, Some(AnchorDocError::AllBatchesFailed { total: 1, .. })));
    }

    #[test]
    fn encode_docx_missing_file_is_file_not_found() {
        let err = encode_docx("/nonexistent/file.docx").err();
        assert!(matches!(err, Some(AnchorDocError::FileNotFound { .. })));
    }
}
