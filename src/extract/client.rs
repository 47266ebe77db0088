//! Extraction client using RIG with the Gemini provider.

use anyhow::{Context, Result};
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::gemini;
use tracing::{debug, info};

use super::ExtractError;
use super::parse::{build_prompt, extract_json_object, normalize};
use crate::config::AppConfig;
use crate::fields::FieldMap;

/// Client for the remote completion service.
///
/// Constructed once at startup and passed in explicitly; parsing and
/// normalization are pure functions so the remote call is the only
/// untestable seam.
pub struct ExtractionClient {
    agent: Agent<gemini::completion::CompletionModel>, // RIG agent with Gemini backend
    model: String,                                     // Model identifier, for logging
}

impl ExtractionClient {
    /// Create a new extraction client.
    ///
    /// # Errors
    /// Returns an error if the Gemini client cannot be constructed.
    pub fn new(config: &AppConfig) -> Result<Self> {
        info!("Using completion model: {}", config.gemini_model);

        let client = gemini::Client::builder()
            .api_key(config.gemini_api_key.as_str())
            .build()
            .context("Failed to create Gemini client")?;

        // Low temperature: extraction should be faithful, not creative
        let agent = client.agent(&config.gemini_model).temperature(config.temperature as f64).build();

        Ok(Self { agent, model: config.gemini_model.clone() })
    }

    /// Send the transcript through the instruction template and normalize the
    /// response into a complete [`FieldMap`].
    ///
    /// # Errors
    /// [`ExtractError::Transport`] when the remote call fails,
    /// [`ExtractError::NoJsonObject`] / [`ExtractError::InvalidJson`] when the
    /// response contains no parseable JSON object.
    pub async fn extract(&self, transcript: &str) -> Result<FieldMap, ExtractError> {
        debug!("Extracting fields with {} from {} chars of transcript", self.model, transcript.len());

        let response = self.agent.prompt(build_prompt(transcript)).await?;
        debug!("Model response: {}", response);

        let object = extract_json_object(&response)?;
        Ok(normalize(&object))
    }
}
