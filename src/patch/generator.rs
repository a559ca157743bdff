//! Edit plan generation through a generative collaborator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::marker::ELISION_MARKER;
use crate::error::Result;

/// Which instruction a generation request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    /// Modify an existing document; unchanged spans become elision markers
    Edit,
    /// Produce a complete new document
    Create,
}

impl EditMode {
    pub fn for_original(original: &str) -> Self {
        if original.trim().is_empty() {
            Self::Create
        } else {
            Self::Edit
        }
    }

    /// Default system instruction for this mode
    pub fn instruction(self) -> String {
        match self {
            Self::Edit => format!(
                "You are a precise document editing assistant. You receive the original \
                 content of a file and a change request. Return the full modified document, \
                 rewriting only the parts the request requires. Every unchanged span must be \
                 replaced by the literal marker {ELISION_MARKER} to keep the output short. Use \
                 the marker only where the text is truly unchanged and write every changed \
                 part out in full."
            ),
            Self::Create => "You are a professional quantitative analyst. Turn the user's \
                             question into quantitative factors, strategies and code. Answer \
                             in Markdown; tables, images and code blocks are welcome."
                .to_string(),
        }
    }
}

/// One change request as handed to a collaborator
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Current document body, empty in creation mode
    pub original_content: String,
    /// Natural-language description of the change
    pub edit_requirements: String,
    /// Model override
    pub model: Option<String>,
    /// System instruction override
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new(original_content: impl Into<String>, edit_requirements: impl Into<String>) -> Self {
        Self {
            original_content: original_content.into(),
            edit_requirements: edit_requirements.into(),
            ..Default::default()
        }
    }

    pub fn mode(&self) -> EditMode {
        EditMode::for_original(&self.original_content)
    }

    /// Caller-supplied instruction, or the default for the mode.
    pub fn system_prompt(&self) -> String {
        match self.system_prompt.as_deref().map(str::trim) {
            Some(prompt) if !prompt.is_empty() => prompt.to_string(),
            _ => self.mode().instruction(),
        }
    }

    /// User-turn text sent alongside the system instruction.
    pub fn user_prompt(&self) -> String {
        match self.mode() {
            EditMode::Create => self.edit_requirements.clone(),
            EditMode::Edit => format!(
                "Modify the file below according to the change request. Replace every \
                 unchanged part with the marker \"{ELISION_MARKER}\" to keep the output short.\n\n\
                 Change request:\n{}\n\n\
                 Original file content:\n```\n{}\n```\n\n\
                 Return the complete modified file, with unchanged parts written as \
                 \"{ELISION_MARKER}\".",
                self.edit_requirements, self.original_content
            ),
        }
    }
}

/// Produces one edit plan per change request
#[async_trait]
pub trait EditPlanGenerator: Send + Sync {
    /// Raw collaborator output. Markers are left for the materializer.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Strip a fence wrapping the whole output (```lang ... ```) and trim.
///
/// Fenced blocks inside a larger document are kept as they are.
pub fn unwrap_code_fence(output: &str) -> String {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let Some((info, body)) = rest.split_once('\n') else {
        return trimmed.to_string();
    };
    if info.contains('`') || info.trim().contains(char::is_whitespace) {
        return trimmed.to_string();
    }
    let Some(body) = body.strip_suffix("```") else {
        return trimmed.to_string();
    };
    if body.contains("\n```") {
        return trimmed.to_string();
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_original() {
        assert_eq!(EditMode::for_original(""), EditMode::Create);
        assert_eq!(EditMode::for_original(" \n\t"), EditMode::Create);
        assert_eq!(EditMode::for_original("# Report"), EditMode::Edit);
    }

    #[test]
    fn test_edit_prompt_embeds_original_and_marker() {
        let request = GenerationRequest::new("# Report\nLine1\n", "add a conclusion");
        let prompt = request.user_prompt();
        assert!(prompt.contains("add a conclusion"));
        assert!(prompt.contains("```\n# Report\nLine1\n\n```"));
        assert!(prompt.contains(ELISION_MARKER));
        assert!(request.system_prompt().contains(ELISION_MARKER));
    }

    #[test]
    fn test_create_prompt_is_the_request() {
        let request = GenerationRequest::new("", "analyze stock X valuation");
        assert_eq!(request.mode(), EditMode::Create);
        assert_eq!(request.user_prompt(), "analyze stock X valuation");
        assert!(!request.system_prompt().contains(ELISION_MARKER));
    }

    #[test]
    fn test_system_prompt_override() {
        let mut request = GenerationRequest::new("body", "change");
        request.system_prompt = Some("  custom instruction ".to_string());
        assert_eq!(request.system_prompt(), "custom instruction");

        request.system_prompt = Some("   ".to_string());
        assert_eq!(request.system_prompt(), EditMode::Edit.instruction());
    }

    #[test]
    fn test_unwrap_whole_output_fence() {
        assert_eq!(unwrap_code_fence("```markdown\n# Title\nbody\n```\n"), "# Title\nbody");
        assert_eq!(unwrap_code_fence("```\nplain\n```"), "plain");
        assert_eq!(unwrap_code_fence("  no fence here  \n"), "no fence here");
    }

    #[test]
    fn test_inner_fences_are_kept() {
        let doc = "# Factors\n\n```python\nprint(1)\n```\n\nMore text.";
        assert_eq!(unwrap_code_fence(doc), doc);

        let two_blocks = "```python\na = 1\n```\n\ntext\n\n```python\nb = 2\n```";
        assert_eq!(unwrap_code_fence(two_blocks), two_blocks);
    }
}
