//! LLM collaborator boundary: clients and output parsing.

pub mod client;
pub mod json_extract;

pub use client::{client_from_config, ChatCompletionClient, CompletionRequest};
pub use json_extract::extract_json;
