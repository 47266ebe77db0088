//! Structured extraction of prescription fields from a transcript.
//!
//! The completion service returns free-form text, not guaranteed valid JSON;
//! the parser slices the first `{` .. last `}` span and everything downstream
//! works on the normalized [`FieldMap`](crate::fields::FieldMap).

mod client;
mod parse;

pub use client::ExtractionClient;
pub use parse::{extract_json_object, normalize};

use thiserror::Error;

/// Extraction failures. All of them surface as transient notifications and
/// leave previously extracted state untouched.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The remote completion call itself failed.
    #[error("completion request failed: {0}")]
    Transport(#[from] rig::completion::PromptError),

    /// No `{ ... }` span was found in the response text.
    #[error("no JSON object found in the model response")]
    NoJsonObject,

    /// The sliced span was not a valid JSON object.
    #[error("model response contained invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
