//! The citation-analysis flow: single call or batched-with-overlap, then
//! reconciliation.
//!
//! Batches are dispatched strictly one at a time, in order, with a fixed
//! delay between calls to respect external rate limits. A failed batch is
//! recorded and skipped; the pipeline only errors out when every batch
//! failed.

use serde::Deserialize;
use std::path::PathBuf;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::batch::{split_by_anchor, Batch, TokenEstimator};
use crate::citations::{reconcile, CitationRecord, CitationReport};
use crate::codec::anchor::{Anchor, ANCHOR_RE};
use crate::config::PipelineConfig;
use crate::error::{AnchorDocError, BatchError};
use crate::llm::{extract_json, ChatCompletionClient, CompletionRequest};
use crate::prompts;

/// What the model is asked to return per call. Counts in any
/// model-supplied summary are ignored; the final summary is computed from
/// the reconciled records.
#[derive(Debug, Deserialize)]
struct BatchPayload {
    #[serde(default)]
    citations: Vec<CitationRecord>,
    #[serde(default)]
    recommendations: Vec<String>,
}

/// A batch prepared for dispatch: request text (with overlap context) plus
/// the authoritative anchor span the batch may report citations for.
struct PreparedBatch {
    request_text: String,
    authoritative: Option<(Anchor, Anchor)>,
}

/// Analyze citations in anchored text.
///
/// Fits-in-context text goes out as one call; anything larger is split at
/// anchors, dispatched sequentially, filtered to each batch's authoritative
/// span, merged, and reconciled.
pub async fn check_citations(
    text: &str,
    client: &dyn ChatCompletionClient,
    config: &PipelineConfig,
) -> Result<CitationReport, AnchorDocError> {
    let estimator = TokenEstimator::new(config);
    let prompt_probe = prompts::citation_user_prompt("");
    let analysis = estimator.analyze(text, &prompt_probe);

    let (prepared, batched) = if analysis.fits_in_context {
        info!(tokens = analysis.text_tokens, "text fits in a single call");
        (
            vec![PreparedBatch {
                request_text: text.to_string(),
                authoritative: None,
            }],
            false,
        )
    } else {
        let budget = analysis.available_tokens;
        let batches = split_by_anchor(text, budget);
        info!(
            tokens = analysis.text_tokens,
            budget,
            batches = batches.len(),
            "text requires batching"
        );
        (prepare_with_overlap(&batches, config.context_overlap), true)
    };

    let total = prepared.len();
    let mut citations: Vec<CitationRecord> = Vec::new();
    let mut recommendations: Vec<String> = Vec::new();
    let mut failures: Vec<BatchError> = Vec::new();

    for (i, batch) in prepared.iter().enumerate() {
        let number = i + 1;
        if i > 0 && config.batch_delay_ms > 0 {
            sleep(Duration::from_millis(config.batch_delay_ms)).await;
        }
        info!(batch = number, total, "dispatching citation batch");

        let request = CompletionRequest::new(
            prompts::CITATION_SYSTEM_PROMPT,
            prompts::citation_user_prompt(&batch.request_text),
            config,
        );

        let response = match client.complete(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(batch = number, error = %e, "batch failed");
                failures.push(BatchError::LlmFailed {
                    batch: number,
                    retries: config.max_retries,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        let Some(value) = extract_json(&response) else {
            let saved = persist_raw_response(config, number, &response);
            warn!(batch = number, "no parseable JSON in batch response");
            failures.push(BatchError::Unparseable {
                batch: number,
                raw_saved_to: saved,
            });
            continue;
        };

        let payload: BatchPayload = match serde_json::from_value(value) {
            Ok(p) => p,
            Err(e) => {
                let saved = persist_raw_response(config, number, &response);
                warn!(batch = number, error = %e, "batch JSON did not match the expected shape");
                failures.push(BatchError::Unparseable {
                    batch: number,
                    raw_saved_to: saved,
                });
                continue;
            }
        };

        // Overlap paragraphs are context only: a citation whose anchor
        // falls outside this batch's authoritative span belongs to the
        // neighbouring batch and is discarded here.
        let kept = payload.citations.into_iter().filter(|c| {
            batch
                .authoritative
                .map(|(start, end)| c.anchor >= start && c.anchor <= end)
                .unwrap_or(true)
        });
        citations.extend(kept);

        for rec in payload.recommendations {
            if !recommendations.contains(&rec) {
                recommendations.push(rec);
            }
        }
    }

    if !failures.is_empty() && failures.len() == total {
        return Err(AnchorDocError::AllBatchesFailed {
            total,
            first_error: failures[0].to_string(),
        });
    }

    let reconciled = reconcile(citations, client, config).await;
    Ok(CitationReport::summarize(
        reconciled,
        recommendations,
        failures,
        batched.then_some(total),
    ))
}

/// Attach `overlap` paragraphs of context from each neighbour to every
/// batch. The batch's own anchors stay the authoritative span.
fn prepare_with_overlap(batches: &[Batch], overlap: usize) -> Vec<PreparedBatch> {
    batches
        .iter()
        .enumerate()
        .map(|(i, batch)| {
            let mut request_text = String::new();
            if overlap > 0 {
                if let Some(prev) = i.checked_sub(1).and_then(|p| batches.get(p)) {
                    for seg in tail_segments(&prev.text, overlap) {
                        request_text.push_str(seg);
                    }
                }
            }
            request_text.push_str(&batch.text);
            if overlap > 0 {
                if let Some(next) = batches.get(i + 1) {
                    for seg in head_segments(&next.text, overlap) {
                        request_text.push_str(seg);
                    }
                }
            }
            PreparedBatch {
                request_text,
                authoritative: batch.start_anchor.zip(batch.end_anchor),
            }
        })
        .collect()
}

/// Split batch text into its anchor-to-next-anchor segments.
fn anchor_segments(text: &str) -> Vec<&str> {
    let starts: Vec<usize> = ANCHOR_RE.find_iter(text).map(|m| m.start()).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            &text[start..end]
        })
        .collect()
}

fn head_segments(text: &str, n: usize) -> Vec<&str> {
    let segs = anchor_segments(text);
    segs.into_iter().take(n).collect()
}

fn tail_segments(text: &str, n: usize) -> Vec<&str> {
    let segs = anchor_segments(text);
    let skip = segs.len().saturating_sub(n);
    segs.into_iter().skip(skip).collect()
}

/// Write an unparseable response to `<raw_output_dir>/batch-NNN.raw.txt`
/// for forensic inspection. Returns the path on success.
fn persist_raw_response(
    config: &PipelineConfig,
    batch_number: usize,
    response: &str,
) -> Option<PathBuf> {
    let dir = config.raw_output_dir.as_ref()?;
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(error = %e, "could not create raw output directory");
        return None;
    }
    let path = dir.join(format!("batch-{batch_number:03}.raw.txt"));
    match std::fs::write(&path, response) {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "could not persist raw response");
            None
        }
    }
}
