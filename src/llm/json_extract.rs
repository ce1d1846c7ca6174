//! Pulling JSON out of free-form model output.
//!
//! Model responses are plain text that "probably contains JSON somewhere".
//! Extraction is an ordered list of strategies, tried in sequence; the first
//! successful parse wins. Strategies, in order:
//!
//! 1. a fenced code block containing JSON,
//! 2. the first syntactically balanced `[...]`/`{...}` span anywhere,
//! 3. the entire response as JSON.
//!
//! A text that defeats all three is an output-format failure, which callers
//! treat as a failed batch — never as a transport error to retry.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

static FENCED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*([\[{].*?[\]}])\s*```")
        .unwrap_or_else(|e| panic!("fence regex: {e}"))
});

/// Try each extraction strategy in order; first successful parse wins.
pub fn extract_json(text: &str) -> Option<Value> {
    static STRATEGIES: &[(&str, fn(&str) -> Option<Value>)] = &[
        ("fenced_block", fenced_block),
        ("balanced_span", balanced_span),
        ("whole_response", whole_response),
    ];
    for (name, strategy) in STRATEGIES {
        if let Some(value) = strategy(text) {
            debug!(strategy = name, "extracted JSON from model response");
            return Some(value);
        }
    }
    None
}

fn fenced_block(text: &str) -> Option<Value> {
    let caps = FENCED_RE.captures(text)?;
    serde_json::from_str(&caps[1]).ok()
}

fn balanced_span(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    for (start, &b) in bytes.iter().enumerate() {
        if b != b'{' && b != b'[' {
            continue;
        }
        if let Some(span) = balanced_from(text, start) {
            if let Ok(value) = serde_json::from_str(span) {
                return Some(value);
            }
        }
    }
    None
}

/// Scan forward from an opening bracket to its balanced close, respecting
/// string literals and escapes.
fn balanced_from(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn whole_response(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}
