//! Prompts for the edit, citation-analysis, and reconciliation calls.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tightening an instruction or changing the
//!    requested JSON schema requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the exact text a stage sends
//!    without spinning up a real model.
//!
//! The edit system prompt can be overridden via
//! [`crate::config::PipelineConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for the document edit flow.
///
/// Anchors and formatting tags must survive the edit verbatim: the decoder
/// realigns paragraphs positionally and strips the tags itself, so the
/// model's only job is to change the prose between them.
pub const DEFAULT_EDIT_SYSTEM_PROMPT: &str = r#"You are a document editor working on anchored text.

The text contains paragraph anchor tokens of the form ⟦P-00001⟧ and formatting tags such as <bold>…</bold>. Follow these rules precisely:

1. Keep every anchor token exactly where it is. Never add, remove, renumber, or reorder anchors.
2. Keep every formatting tag pair around the text it wraps. You may edit the text inside a tag pair.
3. Keep paragraphs separated by one blank line.
4. Apply the user's editing instruction to the prose only.
5. Output ONLY the edited anchored text. No commentary, no fences."#;

/// System prompt for citation analysis calls.
pub const CITATION_SYSTEM_PROMPT: &str = "You are a legal citation expert.";

/// System prompt for conflict-resolution calls.
pub const RECONCILE_SYSTEM_PROMPT: &str =
    "You are a legal citation expert adjudicating between competing analyses.";

/// Build the user prompt for the edit flow.
pub fn edit_user_prompt(instruction: &str, anchored_text: &str) -> String {
    format!("Instruction: {instruction}\n\nText to edit:\n{anchored_text}")
}

/// Build the user prompt for one citation-analysis call.
///
/// The JSON schema requested here must stay in sync with
/// [`crate::citations::CitationRecord`]'s field names.
pub fn citation_user_prompt(anchored_text: &str) -> String {
    format!(
        r#"Analyze the following anchored legal text for Bluebook citation violations.

Each paragraph starts with an anchor token like ⟦P-00001⟧. For every citation you find, report the anchor of its paragraph and its character offsets within that paragraph (counting from the character after the anchor token).

Return ONLY a JSON object with this exact shape:
{{
  "citations": [
    {{
      "anchor": "P-00001",
      "start_offset": 0,
      "end_offset": 0,
      "type": "case | statute | regulation | other",
      "status": "Correct | Error | Uncertain | NotACitation",
      "errors": ["description of each violation"],
      "original_text": "the citation as it appears",
      "suggested_text": "the corrected citation, or null if none needed"
    }}
  ],
  "recommendations": ["document-wide suggestions"]
}}

Text to analyze:
{anchored_text}"#
    )
}

/// Build the user prompt for a reconciliation call: enumerate the competing
/// analyses for one citation and ask for a single best answer.
pub fn reconcile_user_prompt(competing_json: &str) -> String {
    format!(
        r#"The following JSON array contains competing analyses of the SAME citation, produced by separate passes over overlapping text. Pick or synthesize the single best analysis.

Return ONLY one JSON object with the same fields as the inputs (anchor, start_offset, end_offset, type, status, errors, original_text, suggested_text).

Competing analyses:
{competing_json}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_prompt_embeds_text_and_schema() {
        let p = citation_user_prompt("⟦P-00001⟧See Marbury v. Madison.");
        assert!(p.contains("⟦P-00001⟧See Marbury v. Madison."));
        assert!(p.contains("\"citations\""));
        assert!(p.contains("NotACitation"));
    }

    #[test]
    fn edit_prompt_orders_instruction_before_text() {
        let p = edit_user_prompt("fix typos", "⟦P-00001⟧teh text");
        let i = p.find("fix typos").unwrap();
        let t = p.find("teh text").unwrap();
        assert!(i < t);
    }
}
