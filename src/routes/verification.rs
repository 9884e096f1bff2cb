use super::{success, MultipartForm};
use crate::db::{DocumentKind, VerificationStatus};
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::JsonRejection,
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

async fn upload(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
    kind: DocumentKind,
) -> Result<Response> {
    let mut form = MultipartForm::read(multipart?, "upload.jpg").await?;
    let user_id = form.require("userId")?;
    let file = form.take_file()?;

    let uploaded = state
        .verification
        .upload_document(&user_id, kind, file.bytes, &file.filename)
        .await?;

    let url_field = match kind {
        DocumentKind::IdCard => "idCardUrl",
        DocumentKind::Receipt => "paymentReceiptImageUrl",
    };
    Ok(success(json!({
        url_field: uploaded.url,
        "verificationStatus": uploaded.verification_status,
    }))
    .into_response())
}

pub async fn upload_id_card(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    upload(&state, multipart, DocumentKind::IdCard).await
}

pub async fn upload_payment_receipt(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    upload(&state, multipart, DocumentKind::Receipt).await
}

pub async fn verification_status(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Response> {
    let record = state.verification.status(&user_id).await?;
    Ok(success(record).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUserRequest {
    pub user_id: String,
    pub action: String,
    pub admin_id: String,
}

pub async fn verify_user(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<VerifyUserRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = body?;
    let admin = state.authorizer.require_admin(&req.admin_id).await?;
    let action: VerificationStatus = req.action.parse().map_err(AppError::validation)?;

    let record = state
        .verification
        .admin_decision(&req.user_id, &admin, action)
        .await?;
    Ok(success(json!({
        "message": format!("User verification {}", record.verification_status),
        "verificationStatus": record.verification_status,
        "verifiedBy": record.verified_by,
        "verificationDate": record.verification_date,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQuery {
    #[serde(default)]
    pub admin_id: String,
}

pub async fn verification_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<Response> {
    let admin = state.authorizer.require_admin(&query.admin_id).await?;
    let users = state.verification.list_for_admin(&admin).await?;
    Ok(success(json!({ "users": users })).into_response())
}
