//! Application configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Document namespace settings
    pub workspace: WorkspaceConfig,
    /// HTTP server settings
    pub server: ServerConfig,
    /// Generative collaborator settings
    pub generator: GeneratorConfig,
}

/// Document namespace settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root directory every document path resolves under
    pub root: PathBuf,
    /// Keep an in-process read cache
    pub read_cache: bool,
    /// Directory (relative to root) for documents created without a path
    pub new_document_dir: String,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Value of `Access-Control-Allow-Origin`
    pub allow_origin: String,
}

/// Which collaborator protocol to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// DashScope text-generation API
    DashScope,
    /// Another service exposing the generate-edit envelope
    Remote,
}

/// Generative collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub backend: GeneratorBackend,
    /// Endpoint URL for the selected backend
    pub endpoint: String,
    /// Default model name
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Environment variables checked, in order, for the API key
    pub api_key_env: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("workspace"),
            read_cache: false,
            new_document_dir: "reports".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5173".to_string(),
            allow_origin: "*".to_string(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::DashScope,
            endpoint: "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation"
                .to_string(),
            model: "qwen-plus".to_string(),
            temperature: 0.1,
            max_tokens: 8000,
            timeout_secs: 120,
            api_key_env: vec!["QWEN_API_KEY".to_string(), "DASH_SCOPE_API_KEY".to_string()],
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// First non-empty API key found in the configured environment variables
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}

impl AppConfig {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "docpatch", "Docpatch")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from `path`, or the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()
                .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
        };

        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to `path`, or the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()
                .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
        };

        // Ensure config directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(path)
    }

    /// Make the workspace root absolute against `base`.
    ///
    /// Called once at startup; the result is what the store is built with.
    pub fn resolve_root(&mut self, base: &Path) {
        if self.workspace.root.is_relative() {
            self.workspace.root = base.join(&self.workspace.root);
        }
    }
}
