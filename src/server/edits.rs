//! Generation and edit-flow routes

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::response::failure;
use crate::app::DocpatchApp;
use crate::error::PatchError;
use crate::patch::generator::GenerationRequest;
use crate::patch::orchestrator::{EditOptions, EditOutcome, EditProposal};
use crate::patch::remote::{GenerateEditEnvelope, GenerateEditRequest};

/// Body of an orchestrated edit or plan request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequestBody {
    /// Target document; derived from the request text when absent
    #[serde(default)]
    pub path: Option<String>,
    pub edit_requirements: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Caller-chosen id, usable to cancel the request
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

impl EditRequestBody {
    fn options(&self, force_create: bool) -> EditOptions {
        EditOptions {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            force_create,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditResponse {
    success: bool,
    request_id: Uuid,
    #[serde(flatten)]
    outcome: EditOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanResponse {
    success: bool,
    id: Uuid,
    #[serde(flatten)]
    proposal: EditProposal,
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, String> {
    serde_json::from_slice(body).map_err(|e| format!("invalid request body: {e}"))
}

/// Generate-edit: delegate one request to the configured collaborator.
pub async fn generate_edit(State(app): State<Arc<DocpatchApp>>, body: Bytes) -> Response {
    let request: GenerateEditRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(GenerateEditEnvelope::failed(message)))
                .into_response()
        }
    };
    if request.edit_requirements.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(GenerateEditEnvelope::failed("editRequirements is required".to_string())),
        )
            .into_response();
    }

    let request = GenerationRequest::from(request);
    tracing::info!(
        "generate-edit: mode={:?} requirements_len={}",
        request.mode(),
        request.edit_requirements.len()
    );

    match app.orchestrator.generator().generate(&request).await {
        Ok(plan) => Json(GenerateEditEnvelope::ok(plan)).into_response(),
        Err(e) => {
            tracing::error!("generate-edit failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GenerateEditEnvelope::failed(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Full edit flow: read, generate, materialize, commit, verify.
///
/// The flow runs on its own task. If the client goes away the token is
/// cancelled, so a late plan is discarded instead of committed.
pub async fn request_edit(State(app): State<Arc<DocpatchApp>>, body: Bytes) -> Response {
    let body: EditRequestBody = match parse_body(&body) {
        Ok(body) => body,
        Err(message) => return failure(StatusCode::BAD_REQUEST, &message),
    };
    if body.edit_requirements.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "editRequirements is required");
    }
    let (path, derived) = match app.target_path(body.path.as_deref(), &body.edit_requirements) {
        Ok(target) => target,
        Err(e) => return e.into_response(),
    };
    let Some(token) = app.tokens.issue(body.request_id) else {
        return failure(StatusCode::CONFLICT, "a request with this id is already in flight");
    };

    let guard = token.cancel_on_drop();
    let request_id = token.id();
    let task = {
        let app = app.clone();
        let options = body.options(derived);
        tokio::spawn(async move {
            let result = app
                .orchestrator
                .request_edit(&path, &body.edit_requirements, &options, &token)
                .await;
            app.tokens.release(token.id());
            result
        })
    };

    let result = task.await;
    guard.disarm();

    match result {
        Ok(Ok(outcome)) => Json(EditResponse {
            success: true,
            request_id,
            outcome,
        })
        .into_response(),
        Ok(Err(e)) => {
            tracing::warn!("Edit {} failed (retryable: {}): {}", request_id, e.is_retryable(), e);
            e.into_response()
        }
        Err(e) => {
            tracing::error!("Edit task for {} failed: {}", request_id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "edit task failed")
        }
    }
}

/// First half of the interactive flow: generate and hold a proposal.
pub async fn plan_edit(State(app): State<Arc<DocpatchApp>>, body: Bytes) -> Response {
    let body: EditRequestBody = match parse_body(&body) {
        Ok(body) => body,
        Err(message) => return failure(StatusCode::BAD_REQUEST, &message),
    };
    if body.edit_requirements.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "editRequirements is required");
    }
    let (path, derived) = match app.target_path(body.path.as_deref(), &body.edit_requirements) {
        Ok(target) => target,
        Err(e) => return e.into_response(),
    };

    match app
        .orchestrator
        .plan_edit(&path, &body.edit_requirements, &body.options(derived))
        .await
    {
        Ok(proposal) => {
            let id = app.hold_proposal(proposal.clone());
            Json(PlanResponse {
                success: true,
                id,
                proposal,
            })
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Second half of the interactive flow: commit a held proposal.
pub async fn apply_edit(State(app): State<Arc<DocpatchApp>>, Path(id): Path<Uuid>) -> Response {
    let Some(proposal) = app.take_proposal(id) else {
        return failure(StatusCode::NOT_FOUND, "no pending edit with this id");
    };
    let Some(token) = app.tokens.issue(Some(id)) else {
        return failure(StatusCode::CONFLICT, "this edit is already being applied");
    };

    let guard = token.cancel_on_drop();
    let task = {
        let app = app.clone();
        tokio::spawn(async move {
            let result = app.orchestrator.apply_proposal(&proposal, &token).await;
            app.tokens.release(token.id());
            result
        })
    };

    let result = task.await;
    guard.disarm();

    match result {
        Ok(Ok(outcome)) => Json(EditResponse {
            success: true,
            request_id: id,
            outcome,
        })
        .into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!("Apply task for {} failed: {}", id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "apply task failed")
        }
    }
}

/// Discard a held proposal and/or cancel an in-flight request.
pub async fn cancel_edit(State(app): State<Arc<DocpatchApp>>, Path(id): Path<Uuid>) -> Response {
    let discarded = app.take_proposal(id).is_some();
    let cancelled = app.tokens.cancel(id);
    if !discarded && !cancelled {
        return PatchError::NotFound(id.to_string()).into_response();
    }
    tracing::info!("Edit {} cancelled (pending={}, in_flight={})", id, discarded, cancelled);
    Json(json!({ "success": true, "discarded": discarded, "cancelled": cancelled })).into_response()
}
