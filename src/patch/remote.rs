//! Generate-edit envelope: the wire contract between edit clients and a generation service.
//!
//! The same types back [`RemoteGenerator`] (client side) and the server's
//! generate-edit route.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::generator::{EditPlanGenerator, GenerationRequest};
use crate::core::config::GeneratorConfig;
use crate::error::{PatchError, Result};

pub const CODE_OK: u32 = 20000;
pub const CODE_FAILED: u32 = 50000;

/// Body of a generate-edit call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateEditRequest {
    /// Absent or empty selects creation mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    pub edit_requirements: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl From<GenerateEditRequest> for GenerationRequest {
    fn from(req: GenerateEditRequest) -> Self {
        Self {
            original_content: req.original_content.unwrap_or_default(),
            edit_requirements: req.edit_requirements,
            model: req.model,
            system_prompt: req.system_prompt,
        }
    }
}

impl From<&GenerationRequest> for GenerateEditRequest {
    fn from(req: &GenerationRequest) -> Self {
        Self {
            original_content: Some(req.original_content.clone()),
            edit_requirements: req.edit_requirements.clone(),
            model: req.model.clone(),
            system_prompt: Some(req.system_prompt()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputText {
    #[serde(default)]
    pub output_text: Option<String>,
}

/// Response envelope of a generate-edit call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateEditEnvelope {
    pub success: bool,
    pub code: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<OutputText>,
    #[serde(default)]
    pub timestamp: i64,
}

impl GenerateEditEnvelope {
    pub fn ok(output_text: String) -> Self {
        Self {
            success: true,
            code: CODE_OK,
            message: "edit plan generated".to_string(),
            data: Some(OutputText {
                output_text: Some(output_text),
            }),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            success: false,
            code: CODE_FAILED,
            message,
            data: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// The edit plan, if this envelope reports a usable success.
    pub fn into_plan(self) -> Result<String> {
        if !self.success || self.code != CODE_OK {
            let message = if self.message.is_empty() {
                format!("collaborator reported failure (code {})", self.code)
            } else {
                self.message
            };
            return Err(PatchError::GenerationFailed(message));
        }

        self.data
            .and_then(|d| d.output_text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                PatchError::GenerationFailed("response is missing output_text".to_string())
            })
    }
}

/// Generator delegating to a remote generate-edit endpoint
pub struct RemoteGenerator {
    client: Client,
    endpoint: String,
    default_model: String,
}

impl RemoteGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PatchError::GenerationFailed(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            default_model: config.model.clone(),
        })
    }
}

#[async_trait]
impl EditPlanGenerator for RemoteGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let mut body = GenerateEditRequest::from(request);
        body.model.get_or_insert_with(|| self.default_model.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PatchError::GenerationFailed(format!("generate-edit request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PatchError::GenerationFailed(format!(
                "generate-edit HTTP {status}: {text}"
            )));
        }

        let envelope: GenerateEditEnvelope = response.json().await.map_err(|e| {
            PatchError::GenerationFailed(format!("Failed to parse generate-edit response: {e}"))
        })?;
        envelope.into_plan()
    }

    fn name(&self) -> &str {
        "remote"
    }
}
