//! Collapsing competing citation analyses into one record each.
//!
//! Overlapping batches can analyze the same citation twice and disagree.
//! Records are grouped by `(anchor, start_offset)`; a group of one is
//! accepted as-is, and a conflicted group is put to the model once more in a
//! small adjudication call. When that call fails or returns nothing
//! parseable, the first competing record by arrival order wins — a
//! deterministic fallback, deliberately not a vote.

use tracing::{debug, warn};

use crate::citations::CitationRecord;
use crate::config::PipelineConfig;
use crate::llm::{extract_json, ChatCompletionClient, CompletionRequest};
use crate::prompts;

/// Reduce `records` to one authoritative record per citation. Output order
/// follows each group's first arrival.
pub async fn reconcile(
    records: Vec<CitationRecord>,
    client: &dyn ChatCompletionClient,
    config: &PipelineConfig,
) -> Vec<CitationRecord> {
    // Group by conflict key, preserving first-arrival order of groups and
    // of records within each group.
    let mut groups: Vec<Vec<CitationRecord>> = Vec::new();
    for record in records {
        match groups
            .iter_mut()
            .find(|g| g[0].conflict_key() == record.conflict_key())
        {
            Some(group) => group.push(record),
            None => groups.push(vec![record]),
        }
    }

    let mut resolved = Vec::with_capacity(groups.len());
    for group in groups {
        if group.len() == 1 {
            resolved.extend(group);
            continue;
        }
        debug!(
            anchor = %group[0].anchor,
            offset = group[0].start_offset,
            competing = group.len(),
            "resolving citation conflict"
        );
        resolved.push(resolve_conflict(group, client, config).await);
    }
    resolved
}

/// One extra, smaller LLM call enumerating all competing analyses. Any
/// failure falls back to the first record.
async fn resolve_conflict(
    group: Vec<CitationRecord>,
    client: &dyn ChatCompletionClient,
    config: &PipelineConfig,
) -> CitationRecord {
    let competing_json = match serde_json::to_string_pretty(&group) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "could not serialize competing records; using first arrival");
            return first_of(group);
        }
    };

    let request = CompletionRequest::new(
        prompts::RECONCILE_SYSTEM_PROMPT,
        prompts::reconcile_user_prompt(&competing_json),
        config,
    );

    match client.complete(&request).await {
        Ok(response) => match extract_json(&response)
            .and_then(|v| serde_json::from_value::<CitationRecord>(v).ok())
        {
            Some(record) => record,
            None => {
                warn!("resolver output unparseable; using first arrival");
                first_of(group)
            }
        },
        Err(e) => {
            warn!(error = %e, "resolver call failed; using first arrival");
            first_of(group)
        }
    }
}

// Conflict groups are built non-empty.
fn first_of(mut group: Vec<CitationRecord>) -> CitationRecord {
    group.swap_remove(0)
}
