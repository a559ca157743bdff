//! DashScope text-generation backend.
//!
//! Sends a system + user message pair to the DashScope generation API and
//! returns the first choice's message content as the edit plan.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::generator::{unwrap_code_fence, EditPlanGenerator, GenerationRequest};
use crate::core::config::GeneratorConfig;
use crate::error::{PatchError, Result};

/// Generator talking to DashScope directly
pub struct DashScopeGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

// -- DashScope API request/response types --

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    model: &'a str,
    input: Input<'a>,
    parameters: Parameters,
}

#[derive(Debug, Serialize)]
struct Input<'a> {
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Parameters {
    temperature: f32,
    max_tokens: u32,
    result_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    output: Option<Output>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Output {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl DashScopeGenerator {
    pub fn new(config: &GeneratorConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PatchError::GenerationFailed(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn extract_plan(resp: GenerationResponse) -> Result<String> {
        let content = resp
            .output
            .and_then(|o| o.choices.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content);

        match content {
            Some(content) if !content.trim().is_empty() => Ok(unwrap_code_fence(&content)),
            Some(_) => Err(PatchError::GenerationFailed(
                "DashScope returned empty content".to_string(),
            )),
            None => match (resp.code, resp.message) {
                (Some(code), message) => Err(PatchError::GenerationFailed(format!(
                    "DashScope API error: {}",
                    message.unwrap_or(code)
                ))),
                (None, _) => Err(PatchError::GenerationFailed(
                    "DashScope response has no output content".to_string(),
                )),
            },
        }
    }
}

#[async_trait]
impl EditPlanGenerator for DashScopeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let system = request.system_prompt();
        let user = request.user_prompt();
        let body = GenerationBody {
            model: request.model.as_deref().unwrap_or(&self.model),
            input: Input {
                messages: vec![
                    Message {
                        role: "system",
                        content: &system,
                    },
                    Message {
                        role: "user",
                        content: &user,
                    },
                ],
            },
            parameters: Parameters {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                result_format: "message",
            },
        };

        tracing::debug!(
            "DashScope request: mode={:?} model={} prompt_len={}",
            request.mode(),
            body.model,
            user.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PatchError::GenerationFailed(format!("DashScope request failed: {e}")))?;

        // Error bodies still carry code/message, so parse before checking status.
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            PatchError::GenerationFailed(format!("Failed to read DashScope response: {e}"))
        })?;
        let parsed: GenerationResponse = serde_json::from_str(&text).map_err(|e| {
            PatchError::GenerationFailed(format!(
                "Failed to parse DashScope response (HTTP {status}): {e}"
            ))
        })?;

        Self::extract_plan(parsed)
    }

    fn name(&self) -> &str {
        "dashscope"
    }
}
