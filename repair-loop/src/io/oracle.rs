//! Patch oracle clients.
//!
//! The [`PatchOracle`] trait hides the AI fixer behind a single
//! request/response call. Failures never escape as errors: they come back as
//! [`FixResult::TransportError`] so a flaky oracle only costs an iteration.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::core::extract::extract_fix;
use crate::core::language::LanguageProfile;
use crate::core::types::FixResult;
use crate::io::config::OracleConfig;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Source of candidate replacement artifacts.
pub trait PatchOracle {
    /// Ask for a fixed version of `current` given the repair `prompt`.
    fn request_fix(&self, prompt: &str, current: &str) -> FixResult;
}

/// Classify an extracted candidate against the current content.
///
/// A candidate identical to `current` is not progress and counts as no fix.
/// Trailing whitespace is ignored, since extracted code is always trimmed.
pub fn classify_candidate(candidate: Option<String>, current: &str) -> FixResult {
    match candidate {
        Some(fixed) if !same_content(&fixed, current) => FixResult::Applied(fixed),
        _ => FixResult::NoFix,
    }
}

/// Equal once trailing whitespace is dropped from both sides.
pub fn same_content(candidate: &str, current: &str) -> bool {
    candidate.trim_end() == current.trim_end()
}

/// Oracle for runs that must never consult the network (dry-run).
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledOracle;

impl PatchOracle for DisabledOracle {
    fn request_fix(&self, _prompt: &str, _current: &str) -> FixResult {
        warn!("patch oracle disabled, no fix requested");
        FixResult::TransportError("oracle disabled".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Oracle backed by the Anthropic Messages API.
pub struct AnthropicOracle {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    language: LanguageProfile,
}

impl AnthropicOracle {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        config: &OracleConfig,
        language: LanguageProfile,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            language,
        })
    }

    /// Build from `ANTHROPIC_API_KEY` and, unless the config sets one, `ANTHROPIC_BASE_URL`.
    pub fn from_env(config: &OracleConfig, language: LanguageProfile) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("ANTHROPIC_API_KEY environment variable is required"))?;
        let base_url = config
            .base_url
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_BASE_URL").ok());
        Self::new(api_key, base_url, config, language)
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).context("invalid api key header")?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "messages": [
                    {"role": "user", "content": prompt}
                ]
            }))
            .send()
            .context("call messages api")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("messages api returned HTTP {status}: {}", truncate(&body, 300));
        }

        let body = response.text().context("read messages response")?;
        response_text(&body)
    }
}

impl PatchOracle for AnthropicOracle {
    #[instrument(skip_all, fields(model = %self.model, prompt_bytes = prompt.len()))]
    fn request_fix(&self, prompt: &str, current: &str) -> FixResult {
        let text = match self.complete(prompt) {
            Ok(text) => text,
            Err(err) => {
                let detail = format!("{err:#}");
                warn!(err = %detail, "oracle request failed");
                return FixResult::TransportError(detail);
            }
        };
        debug!(response_bytes = text.len(), "oracle responded");

        let candidate = extract_fix(&text, &self.language.fence_tag, &self.language.prologue);
        let result = classify_candidate(candidate, current);
        info!(outcome = result.kind(), "oracle fix classified");
        result
    }
}

/// Text of the first `text` content block of a Messages API response body.
///
/// A blank text block is an error, like a missing one.
pub fn response_text(body: &str) -> Result<String> {
    let parsed: MessagesResponse =
        serde_json::from_str(body).context("decode messages response")?;
    parsed
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| anyhow!("messages response has no text content"))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
