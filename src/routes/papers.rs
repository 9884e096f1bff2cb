use super::{success, MultipartForm};
use crate::db::SubmissionStatus;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::submissions::{AuthorInput, NewSubmission};
use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::JsonRejection,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub async fn allocate_reference(State(state): State<Arc<AppState>>) -> Result<Response> {
    let reference = state.submissions.allocate_reference().await?;
    Ok(success(json!({ "referenceNumber": reference.to_string() })).into_response())
}

async fn read_submission(
    multipart: std::result::Result<Multipart, MultipartRejection>,
    default_filename: &str,
) -> Result<NewSubmission> {
    let mut form = MultipartForm::read(multipart?, default_filename).await?;
    let authors: Vec<AuthorInput> = serde_json::from_str(&form.require("authors")?)
        .map_err(|e| AppError::validation(format!("authors must be a JSON list: {}", e)))?;

    Ok(NewSubmission {
        owner: form.require("userId")?,
        title: form.text("title").unwrap_or_default().to_string(),
        authors,
        reference_number: form.text("referenceNumber").map(str::to_string),
        file: form.take_file()?,
    })
}

pub async fn create_abstract(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let request = read_submission(multipart, "abstract.pdf").await?;
    let submission = state.submissions.create_abstract(request).await?;
    Ok(success(json!({ "submission": submission })).into_response())
}

pub async fn create_full_paper(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let request = read_submission(multipart, "paper.pdf").await?;
    let submission = state.submissions.create_full_paper(request).await?;
    Ok(success(json!({ "submission": submission })).into_response())
}

pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    let submission = state.submissions.get(&id).await?;
    Ok(success(json!({ "submission": submission })).into_response())
}

pub async fn list_for_owner(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Response> {
    let submissions = state.submissions.list_for_owner(&user_id).await?;
    Ok(success(json!({ "submissions": submissions })).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReviewRequest {
    pub admin_id: String,
}

pub async fn start_review(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
    body: std::result::Result<Json<StartReviewRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = body?;
    let admin = state.authorizer.require_admin(&req.admin_id).await?;
    let submission = state.submissions.start_review(&submission_id, &admin).await?;
    Ok(success(json!({ "submission": submission })).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub admin_id: String,
    pub status: String,
    #[serde(default)]
    pub comments: Option<String>,
}

pub async fn review(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
    body: std::result::Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = body?;
    let admin = state.authorizer.require_admin(&req.admin_id).await?;
    let outcome: SubmissionStatus = req.status.parse().map_err(AppError::validation)?;

    let submission = state
        .submissions
        .review(&submission_id, &admin, outcome, req.comments)
        .await?;
    Ok(success(json!({ "submission": submission })).into_response())
}

pub async fn resubmit(
    State(state): State<Arc<AppState>>,
    Path(paper_id): Path<String>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let mut form = MultipartForm::read(multipart?, "revision.pdf").await?;
    let owner = form.require("userId")?;
    let file = form.take_file()?;

    let version = state.submissions.resubmit(&paper_id, &owner, file).await?;
    Ok(success(json!({
        "message": "Revised paper submitted",
        "version": version.version,
        "fileUrl": version.file_url,
        "status": SubmissionStatus::PendingReview,
    }))
    .into_response())
}

pub async fn versions(
    State(state): State<Arc<AppState>>,
    Path(paper_id): Path<String>,
) -> Result<Response> {
    let history = state.submissions.versions(&paper_id).await?;
    Ok(success(history).into_response())
}
