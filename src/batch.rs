//! Token estimation and anchor-aligned batching.
//!
//! The estimator is a deterministic heuristic, not a real tokenizer: roughly
//! four characters per token, with a surcharge per markup tag and per anchor
//! token since dense markup costs proportionally more than prose. Estimates
//! only need to be conservative enough that a batch never overflows the
//! model's context window after the safety margin.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::codec::anchor::{Anchor, ANCHOR_RE};
use crate::config::PipelineConfig;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?[a-z_]+[^>]*>").unwrap_or_else(|e| panic!("tag regex: {e}"))
});

/// Conservative context limits per model family. Unknown models fall back
/// to 8 000 tokens.
pub fn model_context_limit(model: &str) -> usize {
    match model {
        "llama3.2-3b" | "llama3.2-7b" | "llama3.2-70b" => 8000,
        "gpt-4" => 8192,
        "gpt-3.5-turbo" => 4096,
        _ => 8000,
    }
}

/// Estimate the token cost of `text`.
///
/// Base cost is one token per four characters (floor), plus 2 tokens per
/// markup tag and 3 per anchor token. `estimate("")` is 0.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let base = text.chars().count() / 4;
    let tags = TAG_RE.find_iter(text).count();
    let anchors = ANCHOR_RE.find_iter(text).count();
    base + tags * 2 + anchors * 3
}

/// A token-budget-bounded contiguous slice of anchors, sent to the model in
/// one call.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub text: String,
    pub start_anchor: Option<Anchor>,
    pub end_anchor: Option<Anchor>,
    pub anchor_count: usize,
    pub estimated_tokens: usize,
    /// True when this batch is a single paragraph that alone exceeds the
    /// budget. Oversized batches are emitted whole rather than truncated;
    /// callers must treat the flag as a reportable condition.
    pub oversized: bool,
}

/// Size analysis for a text against a model's context budget.
#[derive(Debug, Clone, Serialize)]
pub struct SizeAnalysis {
    pub text_tokens: usize,
    pub prompt_tokens: usize,
    pub total_tokens: usize,
    pub available_tokens: usize,
    pub context_limit: usize,
    pub fits_in_context: bool,
    pub utilization_percent: f64,
}

/// Token budgeting for one model, parameterised by the pipeline config.
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    context_limit: usize,
    safety_margin: f64,
}

impl TokenEstimator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            context_limit: config
                .context_limit
                .unwrap_or_else(|| model_context_limit(&config.model)),
            safety_margin: config.safety_margin,
        }
    }

    /// The model's context limit after any config override.
    pub fn context_limit(&self) -> usize {
        self.context_limit
    }

    /// Tokens available for content: `floor(limit × margin) − prompt_tokens`.
    /// Saturates at zero rather than going negative.
    pub fn available_budget(&self, prompt_tokens: usize) -> usize {
        let usable = (self.context_limit as f64 * self.safety_margin) as usize;
        usable.saturating_sub(prompt_tokens)
    }

    /// Analyze whether `text` plus `prompt` fits in one call.
    pub fn analyze(&self, text: &str, prompt: &str) -> SizeAnalysis {
        let text_tokens = estimate_tokens(text);
        let prompt_tokens = estimate_tokens(prompt);
        let total_tokens = text_tokens + prompt_tokens;
        let available_tokens = self.available_budget(prompt_tokens);
        SizeAnalysis {
            text_tokens,
            prompt_tokens,
            total_tokens,
            available_tokens,
            context_limit: self.context_limit,
            fits_in_context: text_tokens <= available_tokens,
            utilization_percent: total_tokens as f64 / self.context_limit as f64 * 100.0,
        }
    }
}

/// Split anchored text into batches that each fit `budget` tokens.
///
/// Whole anchor-to-next-anchor segments are accumulated greedily; a segment
/// is never split mid-anchor. Text before the first anchor rides along with
/// the first segment. With no anchors at all, splitting falls back to
/// paragraph boundaries under the same greedy rule.
pub fn split_by_anchor(text: &str, budget: usize) -> Vec<Batch> {
    if text.is_empty() {
        return Vec::new();
    }

    let anchor_starts: Vec<(usize, Anchor)> = ANCHOR_RE
        .captures_iter(text)
        .filter_map(|c| {
            let m = c.get(0)?;
            let n: u32 = c[1].parse().ok()?;
            Some((m.start(), Anchor(n)))
        })
        .collect();

    if anchor_starts.is_empty() {
        return split_by_paragraph(text, budget);
    }

    // Segment i runs from anchor i's start to anchor i+1's start; the
    // preamble before the first anchor joins segment 0.
    let segments: Vec<(&str, Anchor)> = anchor_starts
        .iter()
        .enumerate()
        .map(|(i, &(start, anchor))| {
            let seg_start = if i == 0 { 0 } else { start };
            let seg_end = anchor_starts
                .get(i + 1)
                .map(|&(next, _)| next)
                .unwrap_or(text.len());
            (&text[seg_start..seg_end], anchor)
        })
        .collect();

    let mut batches = Vec::new();
    let mut current = String::new();
    let mut anchors: Vec<Anchor> = Vec::new();

    for (seg, anchor) in segments {
        // Estimate the concatenation itself: token counts are not additive
        // under floor division, and the budget bound is on the batch text.
        let would_be = estimate_tokens(&format!("{current}{seg}"));
        if would_be > budget && !current.is_empty() {
            batches.push(close_batch(current, &anchors, budget));
            current = String::new();
            anchors.clear();
        }
        current.push_str(seg);
        anchors.push(anchor);
    }
    if !current.is_empty() {
        batches.push(close_batch(current, &anchors, budget));
    }
    batches
}

fn close_batch(text: String, anchors: &[Anchor], budget: usize) -> Batch {
    let estimated_tokens = estimate_tokens(&text);
    let oversized = estimated_tokens > budget;
    if oversized {
        warn!(
            tokens = estimated_tokens,
            budget,
            anchors = anchors.len(),
            "batch exceeds budget and cannot be split further"
        );
    }
    Batch {
        text,
        start_anchor: anchors.first().copied(),
        end_anchor: anchors.last().copied(),
        anchor_count: anchors.len(),
        estimated_tokens,
        oversized,
    }
}

fn split_by_paragraph(text: &str, budget: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let seg = format!("{para}\n\n");
        if estimate_tokens(&format!("{current}{seg}")) > budget && !current.is_empty() {
            batches.push(close_batch(current.trim_end().to_string(), &[], budget));
            current = String::new();
        }
        current.push_str(&seg);
    }
    if !current.trim().is_empty() {
        batches.push(close_batch(current.trim_end().to_string(), &[], budget));
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_hundred_chars_is_about_one_hundred_tokens() {
        let text = "a".repeat(400);
        assert_eq!(estimate_tokens(&text), 100);
    }

    #[test]
    fn tags_and_anchors_carry_a_surcharge() {
        // 8 non-markup chars in tags are still counted in the base.
        let plain = estimate_tokens("word");
        let tagged = estimate_tokens("<bold>word</bold>");
        assert!(tagged > plain + 2);
        let anchored = estimate_tokens("⟦P-00001⟧word");
        assert_eq!(anchored, 13 / 4 + 3);
    }

    #[test]
    fn unknown_model_falls_back_to_default_limit() {
        assert_eq!(model_context_limit("mystery-model-9000"), 8000);
        assert_eq!(model_context_limit("gpt-3.5-turbo"), 4096);
    }

    #[test]
    fn no_anchors_falls_back_to_paragraph_split() {
        let text = format!("{}\n\n{}", "a".repeat(400), "b".repeat(400));
        let batches = split_by_anchor(&text, 110);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].anchor_count, 0);
    }

    #[test]
    fn single_oversized_paragraph_is_flagged_not_truncated() {
        let text = format!("⟦P-00001⟧{}", "x".repeat(4000));
        let batches = split_by_anchor(&text, 100);
        assert_eq!(batches.len(), 1);
        assert!(batches[0].oversized);
        assert_eq!(batches[0].anchor_count, 1);
        assert_eq!(batches[0].text, text);
    }

    #[test]
    fn fifty_uniform_paragraphs_make_ten_batches_of_five() {
        // Each segment: 9-char anchor + 777 chars + separator = 788 chars
        // = 197 base + 3 anchor = 200 tokens. Budget 1000 → 5 per batch.
        let text = (1..=50)
            .map(|i| format!("{}{}", Anchor(i).token(), "x".repeat(777)))
            .collect::<Vec<_>>()
            .join("\n\n");
        let batches = split_by_anchor(&text, 1000);
        assert_eq!(batches.len(), 10);
        for batch in &batches {
            assert_eq!(batch.anchor_count, 5);
            assert!(batch.estimated_tokens <= 1000);
            assert!(!batch.oversized);
        }
        assert_eq!(batches[0].start_anchor, Some(Anchor(1)));
        assert_eq!(batches[9].end_anchor, Some(Anchor(50)));
    }

    #[test]
    fn batches_cover_every_anchor_in_order() {
        let text = (1..=23)
            .map(|i| format!("{}{}", Anchor(i).token(), "y".repeat(100 + i as usize * 7)))
            .collect::<Vec<_>>()
            .join("\n\n");
        let batches = split_by_anchor(&text, 200);
        let mut seen = Vec::new();
        for batch in &batches {
            seen.extend(crate::codec::scan_anchors(&batch.text));
        }
        let expected: Vec<Anchor> = (1..=23).map(Anchor).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn budget_honoured_except_oversized() {
        let text = (1..=8)
            .map(|i| format!("{}{}", Anchor(i).token(), "z".repeat(if i == 4 { 3000 } else { 200 })))
            .collect::<Vec<_>>()
            .join("\n\n");
        let batches = split_by_anchor(&text, 300);
        for batch in &batches {
            if batch.oversized {
                assert_eq!(batch.anchor_count, 1);
            } else {
                assert!(batch.estimated_tokens <= 300);
            }
        }
    }

    #[test]
    fn analyze_reports_fit() {
        let config = PipelineConfig::default();
        let est = TokenEstimator::new(&config);
        let analysis = est.analyze("short text", "prompt");
        assert!(analysis.fits_in_context);
        assert_eq!(est.context_limit(), 8000);
        assert_eq!(est.available_budget(0), 6400);
    }
}
