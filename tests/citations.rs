//! Citation pipeline tests against mock chat-completion clients.
//!
//! No network: each client scripts the model's behaviour, which is the only
//! non-deterministic part of the pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use anchordoc::citations::check_citations;
use anchordoc::codec::{scan_anchors, Anchor};
use anchordoc::{
    AnchorDocError, ChatCompletionClient, CitationStatus, CompletionRequest, PipelineConfig,
};

fn anchored_text(paragraphs: u32) -> String {
    (1..=paragraphs)
        .map(|i| {
            format!(
                "{}Paragraph {i} cites Marbury v. Madison, 5 U.S. 137 (1803). {}",
                Anchor(i).token(),
                "Further discussion follows at some length in this paragraph. ".repeat(6),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Forces batching: small context limit, no inter-batch delay.
fn batching_config() -> PipelineConfig {
    PipelineConfig::builder()
        .context_limit(800)
        .batch_delay_ms(0)
        .build()
        .unwrap()
}

fn citation_json(anchor: Anchor, offset: usize, status: &str, text: &str) -> String {
    format!(
        r#"{{"anchor": "{anchor}", "start_offset": {offset}, "end_offset": {end},
            "type": "case", "status": "{status}", "errors": [],
            "original_text": "{text}", "suggested_text": null}}"#,
        end = offset + text.len(),
    )
}

/// Reports one citation per anchor visible in the request, including the
/// overlap context it is not supposed to be authoritative for.
struct OvereagerClient;

#[async_trait]
impl ChatCompletionClient for OvereagerClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AnchorDocError> {
        let citations: Vec<String> = scan_anchors(&request.user_prompt)
            .into_iter()
            .map(|a| citation_json(a, 17, "Correct", "5 U.S. 137"))
            .collect();
        Ok(format!(
            r#"{{"citations": [{}], "recommendations": ["Use official reporters."]}}"#,
            citations.join(",")
        ))
    }
    fn model(&self) -> &str {
        "mock"
    }
}

/// Fails the first `failures` calls, then behaves like [`OvereagerClient`].
struct FlakyClient {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatCompletionClient for FlakyClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AnchorDocError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(AnchorDocError::LlmFailed {
                retries: 3,
                detail: "connection reset".into(),
            });
        }
        OvereagerClient.complete(request).await
    }
    fn model(&self) -> &str {
        "mock"
    }
}

/// Pops scripted responses in order.
struct ScriptedClient(Mutex<Vec<String>>);

#[async_trait]
impl ChatCompletionClient for ScriptedClient {
    async fn complete(&self, _: &CompletionRequest) -> Result<String, AnchorDocError> {
        let mut responses = self.0.lock().unwrap();
        if responses.is_empty() {
            return Err(AnchorDocError::LlmFailed {
                retries: 0,
                detail: "script exhausted".into(),
            });
        }
        Ok(responses.remove(0))
    }
    fn model(&self) -> &str {
        "mock"
    }
}

#[tokio::test]
async fn overlap_reports_are_filtered_to_one_record_per_anchor() {
    let text = anchored_text(12);
    let config = batching_config();
    let report = check_citations(&text, &OvereagerClient, &config)
        .await
        .unwrap();

    let batches = report.analysis_summary.batches_processed.unwrap();
    assert!(batches > 1, "expected batching, got {batches} batch(es)");

    // Every anchor exactly once despite the overlap duplicates.
    let mut anchors: Vec<Anchor> = report.citations.iter().map(|c| c.anchor).collect();
    anchors.sort_by_key(|a| a.0);
    assert_eq!(anchors, (1..=12).map(Anchor).collect::<Vec<_>>());

    assert_eq!(report.analysis_summary.total, 12);
    assert_eq!(report.analysis_summary.correct, 12);
    assert_eq!(report.analysis_summary.with_errors, 0);
    // Identical recommendation from every batch, merged once.
    assert_eq!(report.recommendations, vec!["Use official reporters."]);
    assert!(report.failed_batches.is_empty());
}

#[tokio::test]
async fn one_failed_batch_yields_a_partial_report() {
    let text = anchored_text(12);
    let config = batching_config();
    let client = FlakyClient {
        failures: 1,
        calls: AtomicUsize::new(0),
    };
    let report = check_citations(&text, &client, &config).await.unwrap();

    assert_eq!(report.failed_batches.len(), 1);
    assert_eq!(report.failed_batches[0].batch(), 1);
    // The failed batch's authoritative anchors are simply absent.
    let anchors: Vec<u32> = report.citations.iter().map(|c| c.anchor.0).collect();
    assert!(!anchors.is_empty());
    assert!(anchors.len() < 12);
}

#[tokio::test]
async fn all_batches_failing_is_fatal() {
    let text = anchored_text(12);
    let config = batching_config();
    let client = FlakyClient {
        failures: usize::MAX,
        calls: AtomicUsize::new(0),
    };
    let err = check_citations(&text, &client, &config).await.err();
    assert!(matches!(
        err,
        Some(AnchorDocError::AllBatchesFailed { total, .. }) if total > 1
    ));
}

#[tokio::test]
async fn unparseable_single_response_is_fatal_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .batch_delay_ms(0)
        .raw_output_dir(dir.path())
        .build()
        .unwrap();
    let client = ScriptedClient(Mutex::new(vec![
        "I could not find any JSON worth returning.".to_string(),
    ]));

    let text = format!("{}One short paragraph.", Anchor(1).token());
    let err = check_citations(&text, &client, &config).await.err();
    assert!(matches!(
        err,
        Some(AnchorDocError::AllBatchesFailed { total: 1, .. })
    ));
    assert!(dir.path().join("batch-001.raw.txt").exists());
}

#[tokio::test]
async fn duplicate_reports_in_one_call_are_adjudicated() {
    // Single call reporting the same citation twice with conflicting
    // statuses, then the resolver's verdict.
    let first = format!(
        r#"{{"citations": [{}, {}], "recommendations": []}}"#,
        citation_json(Anchor(1), 17, "Error", "5 US 137"),
        citation_json(Anchor(1), 17, "Correct", "5 U.S. 137"),
    );
    let verdict = citation_json(Anchor(1), 17, "Correct", "5 U.S. 137");
    let client = ScriptedClient(Mutex::new(vec![first, verdict]));

    let config = PipelineConfig::builder().batch_delay_ms(0).build().unwrap();
    let text = format!("{}Cites Marbury v. Madison, 5 U.S. 137 (1803).", Anchor(1).token());
    let report = check_citations(&text, &client, &config).await.unwrap();

    assert_eq!(report.citations.len(), 1);
    assert_eq!(report.citations[0].status, CitationStatus::Correct);
    assert_eq!(report.citations[0].original_text, "5 U.S. 137");
    assert!(report.analysis_summary.batches_processed.is_none());
}
