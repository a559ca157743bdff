//! Edit orchestration: read, generate, materialize, commit, verify

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::cancel::EditToken;
use super::generator::{EditMode, EditPlanGenerator, GenerationRequest};
use super::marker::{count_markers, materialize};
use crate::core::path::DocPath;
use crate::core::store::{ContentStore, Freshness};
use crate::error::{PatchError, Result};

/// Caller overrides for one edit
#[derive(Debug, Clone, Default)]
pub struct EditOptions {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// Generate a new document without reading what is stored at the path
    pub force_create: bool,
}

/// A generated but not yet committed edit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditProposal {
    #[serde(serialize_with = "serialize_display")]
    pub path: DocPath,
    pub mode: EditMode,
    /// Document body the plan was generated against
    #[serde(skip_serializing)]
    pub original: String,
    /// Raw collaborator output
    pub plan: String,
    pub markers: usize,
}

/// Result of re-reading a document right after committing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Verification {
    Matched,
    /// The re-read body differs from what was written
    #[serde(rename_all = "camelCase")]
    Mismatch {
        expected_len: usize,
        observed_len: usize,
    },
    /// The re-read itself failed
    Unverified { reason: String },
}

/// A committed edit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    #[serde(serialize_with = "serialize_display")]
    pub path: DocPath,
    pub mode: EditMode,
    pub markers_expanded: usize,
    pub bytes_written: usize,
    pub verification: Verification,
}

/// Counters for the edit flow
#[derive(Debug, Default)]
pub struct EditStats {
    applied: AtomicU64,
    created: AtomicU64,
    generation_failures: AtomicU64,
    apply_failures: AtomicU64,
    cancelled: AtomicU64,
    verification_mismatches: AtomicU64,
}

/// Point-in-time copy of [`EditStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub applied: u64,
    pub created: u64,
    pub generation_failures: u64,
    pub apply_failures: u64,
    pub cancelled: u64,
    pub verification_mismatches: u64,
}

impl EditStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            apply_failures: self.apply_failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            verification_mismatches: self.verification_mismatches.load(Ordering::Relaxed),
        }
    }
}

/// Sequences one edit request end to end.
///
/// Holds no per-request state; concurrent requests share only the store.
pub struct EditOrchestrator {
    store: Arc<dyn ContentStore>,
    generator: Arc<dyn EditPlanGenerator>,
    stats: EditStats,
}

impl EditOrchestrator {
    pub fn new(store: Arc<dyn ContentStore>, generator: Arc<dyn EditPlanGenerator>) -> Self {
        Self {
            store,
            generator,
            stats: EditStats::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn generator(&self) -> &Arc<dyn EditPlanGenerator> {
        &self.generator
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Read the current document and generate a plan against it.
    ///
    /// A missing or blank document selects creation mode, as does
    /// `options.force_create`.
    pub async fn plan_edit(
        &self,
        path: &DocPath,
        change_request: &str,
        options: &EditOptions,
    ) -> Result<EditProposal> {
        let original = if options.force_create {
            String::new()
        } else {
            match self.store.get(path, Freshness::Revalidate).await {
                Ok(document) => document.content,
                Err(PatchError::NotFound(_)) => String::new(),
                Err(e) => return Err(e),
            }
        };
        let mode = EditMode::for_original(&original);
        tracing::info!("Planning {:?} for {} via {}", mode, path, self.generator.name());

        let request = GenerationRequest {
            model: options.model.clone(),
            system_prompt: options.system_prompt.clone(),
            ..GenerationRequest::new(original.clone(), change_request)
        };
        let plan = self.generator.generate(&request).await.map_err(|e| {
            EditStats::bump(&self.stats.generation_failures);
            tracing::error!("Edit plan generation failed for {}: {}", path, e);
            e
        })?;

        let markers = count_markers(&plan);
        if mode == EditMode::Edit && markers == 0 {
            tracing::warn!(
                "Edit plan for {} has no elision markers; committing it as the full body",
                path
            );
        }

        Ok(EditProposal {
            path: path.clone(),
            mode,
            original,
            plan,
            markers,
        })
    }

    /// Materialize, commit and verify a proposal.
    pub async fn apply_proposal(
        &self,
        proposal: &EditProposal,
        token: &EditToken,
    ) -> Result<EditOutcome> {
        self.ensure_live(token, &proposal.path)?;

        let candidate = materialize(&proposal.plan, &proposal.original);
        if proposal.markers > 1 {
            tracing::warn!(
                "{} elision markers in plan for {}; each expands to the whole original",
                proposal.markers,
                proposal.path
            );
        }

        self.ensure_live(token, &proposal.path)?;
        let written = self
            .store
            .put(&proposal.path, &candidate)
            .await
            .map_err(|e| {
                EditStats::bump(&self.stats.apply_failures);
                match e {
                    e @ (PatchError::ApplyFailed { .. } | PatchError::PathRejected { .. }) => e,
                    other => PatchError::ApplyFailed {
                        path: proposal.path.to_string(),
                        reason: other.to_string(),
                    },
                }
            })?;

        EditStats::bump(&self.stats.applied);
        if proposal.mode == EditMode::Create {
            EditStats::bump(&self.stats.created);
        }

        let verification = self.verify(&written, &candidate).await;
        tracing::info!(
            "Applied {:?} to {} ({} bytes, {} markers expanded, {:?})",
            proposal.mode,
            written,
            candidate.len(),
            proposal.markers,
            verification
        );

        Ok(EditOutcome {
            path: written,
            mode: proposal.mode,
            markers_expanded: proposal.markers,
            bytes_written: candidate.len(),
            verification,
        })
    }

    /// Run the whole flow for one change request.
    pub async fn request_edit(
        &self,
        path: &DocPath,
        change_request: &str,
        options: &EditOptions,
        token: &EditToken,
    ) -> Result<EditOutcome> {
        let proposal = self.plan_edit(path, change_request, options).await?;
        self.apply_proposal(&proposal, token).await
    }

    fn ensure_live(&self, token: &EditToken, path: &DocPath) -> Result<()> {
        if token.is_cancelled() {
            EditStats::bump(&self.stats.cancelled);
            tracing::info!("Discarding edit plan for {}: request {} cancelled", path, token.id());
            return Err(PatchError::Cancelled(token.id()));
        }
        Ok(())
    }

    async fn verify(&self, path: &DocPath, expected: &str) -> Verification {
        match self.store.get(path, Freshness::Revalidate).await {
            Ok(document) if document.content == expected => Verification::Matched,
            Ok(document) => {
                EditStats::bump(&self.stats.verification_mismatches);
                tracing::warn!(
                    "Verification mismatch for {}: wrote {} bytes, read back {}",
                    path,
                    expected.len(),
                    document.content.len()
                );
                Verification::Mismatch {
                    expected_len: expected.len(),
                    observed_len: document.content.len(),
                }
            }
            Err(e) => {
                EditStats::bump(&self.stats.verification_mismatches);
                tracing::warn!("Could not re-read {} after commit: {}", path, e);
                Verification::Unverified {
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn serialize_display<S: serde::Serializer>(path: &DocPath, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(path)
}
