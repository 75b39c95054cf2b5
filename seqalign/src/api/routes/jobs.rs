//! Job submission and polling routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::job::PollResponse;

/// Response to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/align/{accession}", post(submit_alignment))
        .route("/poll/{task_id}", get(poll_job))
}

/// Start aligning `accession`. Responds as soon as the job is registered.
async fn submit_alignment(
    State(state): State<AppState>,
    Path(accession): Path<String>,
) -> ApiResult<Json<SubmitResponse>> {
    tracing::info!(accession = %accession, "Aligning accession to reference genome");
    let task_id = state.registry.submit(&accession)?;
    Ok(Json(SubmitResponse { task_id }))
}

/// Report a job's status, log and progress. Unknown ids are not an HTTP error.
async fn poll_job(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<PollResponse> {
    Json(state.registry.poll(&task_id).await)
}
