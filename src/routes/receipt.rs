use super::success;
use crate::error::{AppError, Result};
use crate::pdf;
use crate::receipt::{Receipt, ReceiptKey};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

fn text_response(receipt: &Receipt) -> Result<Response> {
    let body = receipt.to_text()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

async fn pdf_response(receipt: Receipt) -> Result<Response> {
    let filename = format!("{}.pdf", receipt.receipt_number);
    // genpdf layout is CPU-bound
    let bytes = tokio::task::spawn_blocking(move || pdf::render_receipt(&receipt))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("receipt render task failed: {}", e),
        })??;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal {
            message: e.to_string(),
        })
}

pub async fn receipt_text(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Response> {
    let receipt = state.receipts.render(&ReceiptKey::Uid(uid)).await?;
    text_response(&receipt)
}

pub async fn receipt_download(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Response> {
    let receipt = state.receipts.render(&ReceiptKey::Uid(uid)).await?;
    pdf_response(receipt).await
}

pub async fn receipt_status(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Response> {
    let availability = state.receipts.availability(&uid).await?;
    Ok(success(availability).into_response())
}

pub async fn attendee_receipt_text(
    State(state): State<Arc<AppState>>,
    Path(txnid): Path<String>,
) -> Result<Response> {
    let receipt = state.receipts.render(&ReceiptKey::Txn(txnid)).await?;
    text_response(&receipt)
}

pub async fn attendee_receipt_download(
    State(state): State<Arc<AppState>>,
    Path(txnid): Path<String>,
) -> Result<Response> {
    let receipt = state.receipts.render(&ReceiptKey::Txn(txnid)).await?;
    pdf_response(receipt).await
}
