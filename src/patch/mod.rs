//! Document patch protocol: edit plans, elision markers and the edit flow

pub mod cancel;
pub mod dashscope;
pub mod generator;
pub mod marker;
pub mod naming;
pub mod orchestrator;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::{GeneratorBackend, GeneratorConfig};
use crate::error::{PatchError, Result};
use dashscope::DashScopeGenerator;
use generator::{EditPlanGenerator, GenerationRequest};
use remote::RemoteGenerator;

/// Stand-in used when the DashScope backend has no API key.
///
/// Reads and writes keep working; every generation fails with a clear reason.
struct MissingApiKey {
    env_names: Vec<String>,
}

#[async_trait]
impl EditPlanGenerator for MissingApiKey {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Err(PatchError::GenerationFailed(format!(
            "API key not configured; set one of: {}",
            self.env_names.join(", ")
        )))
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}

/// Build the generator selected by `config`.
pub fn build_generator(config: &GeneratorConfig) -> Result<Arc<dyn EditPlanGenerator>> {
    match config.backend {
        GeneratorBackend::DashScope => match config.api_key() {
            Some(key) => Ok(Arc::new(DashScopeGenerator::new(config, key)?)),
            None => {
                tracing::warn!(
                    "No API key in {:?}; edit generation is disabled",
                    config.api_key_env
                );
                Ok(Arc::new(MissingApiKey {
                    env_names: config.api_key_env.clone(),
                }))
            }
        },
        GeneratorBackend::Remote => Ok(Arc::new(RemoteGenerator::new(config)?)),
    }
}
