use super::success;
use crate::error::Result;
use crate::payment::{
    format_amount, AttendeeRegistration, CallbackKind, CallbackPayload, CallbackResult,
    InitiationOutcome,
};
use crate::state::AppState;
use axum::{
    extract::rejection::{FormRejection, JsonRejection},
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub uid: String,
    #[serde(default)]
    pub frontend_url: Option<String>,
}

pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = body?;

    let response = match state
        .payments
        .initiate(&req.uid, req.frontend_url.as_deref())
        .await?
    {
        InitiationOutcome::Required(session) => success(json!({
            "paymentRequired": true,
            "paymentUrl": session.payment_url,
            "accessKey": session.access_key,
            "txnid": session.txnid,
            "amount": session.amount,
            "role": session.role,
        })),
        InitiationOutcome::NotRequired { reason } => success(json!({
            "paymentRequired": false,
            "reason": reason,
        })),
    };
    Ok(response.into_response())
}

pub async fn create_attendee_payment(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<AttendeeRegistration>, JsonRejection>,
) -> Result<Response> {
    let Json(registration) = body?;
    let session = state.payments.initiate_attendee(registration).await?;
    Ok(success(session).into_response())
}

pub async fn payment_success(
    State(state): State<Arc<AppState>>,
    form: std::result::Result<Form<CallbackPayload>, FormRejection>,
) -> Result<Redirect> {
    settle_and_redirect(&state, form, CallbackKind::Success).await
}

pub async fn payment_failure(
    State(state): State<Arc<AppState>>,
    form: std::result::Result<Form<CallbackPayload>, FormRejection>,
) -> Result<Redirect> {
    settle_and_redirect(&state, form, CallbackKind::Failure).await
}

/// The gateway always gets a redirect, even for callbacks that were
/// discarded, so it stops redelivering them.
async fn settle_and_redirect(
    state: &AppState,
    form: std::result::Result<Form<CallbackPayload>, FormRejection>,
    kind: CallbackKind,
) -> Result<Redirect> {
    let payload = match form {
        Ok(Form(payload)) => payload,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable gateway callback body");
            CallbackPayload::default()
        }
    };

    let target = match state.payments.handle_callback(&payload, kind).await? {
        CallbackResult::Settled(tx) | CallbackResult::Duplicate(tx) => {
            state.payments.result_redirect(
                Some(&tx.frontend_url),
                tx.status.as_str(),
                &tx.txnid,
                &format_amount(tx.amount),
                tx.failure_reason.as_deref().unwrap_or(""),
            )
        }
        CallbackResult::Rejected(failure) => {
            let frontend_url = if payload.txnid.is_empty() {
                None
            } else {
                state
                    .payments
                    .status_for_txn(&payload.txnid)
                    .await
                    .ok()
                    .map(|tx| tx.frontend_url)
            };
            state.payments.result_redirect(
                frontend_url.as_deref(),
                "failure",
                &payload.txnid,
                "",
                failure.as_str(),
            )
        }
    };

    Ok(Redirect::to(&target))
}

pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Response> {
    let view = state.payments.status_for_uid(&uid).await?;
    Ok(success(view).into_response())
}

pub async fn transaction_status(
    State(state): State<Arc<AppState>>,
    Path(txnid): Path<String>,
) -> Result<Response> {
    let tx = state.payments.status_for_txn(&txnid).await?;
    Ok(success(json!({
        "txnid": tx.txnid,
        "paymentStatus": tx.status,
        "paymentAmount": tx.amount,
        "role": tx.role,
        "paymentDate": tx.settled_at.unwrap_or(tx.created_at),
    }))
    .into_response())
}
