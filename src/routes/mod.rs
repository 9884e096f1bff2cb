mod health;
mod papers;
mod payment;
mod receipt;
mod verification;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::submissions::UploadedFile;
use axum::{
    extract::{DefaultBodyLimit, Multipart},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Above every per-file limit, so oversized uploads reach the handlers and are
/// reported as `PAYLOAD_TOO_LARGE` rather than cut off by the transport.
const BODY_LIMIT_BYTES: usize = 12 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let files = ServeDir::new(state.config.upload_folder.clone());

    Router::new()
        .route("/health", get(health::health))
        // Payments
        .route("/create-payment", post(payment::create_payment))
        .route("/create-attendee-payment", post(payment::create_attendee_payment))
        .route("/payment-success", post(payment::payment_success))
        .route("/payment-failure", post(payment::payment_failure))
        .route("/payment-status/:uid", get(payment::payment_status))
        .route("/transaction/:txnid", get(payment::transaction_status))
        // Receipts
        .route("/receipt/:uid", get(receipt::receipt_text))
        .route("/receipt/download/:uid", get(receipt::receipt_download))
        .route("/receipt/status/:uid", get(receipt::receipt_status))
        .route("/attendee-receipt/:txnid", get(receipt::attendee_receipt_text))
        .route(
            "/attendee-receipt/download/:txnid",
            get(receipt::attendee_receipt_download),
        )
        // Verification
        .route("/upload-id-card", post(verification::upload_id_card))
        .route("/upload-payment-receipt", post(verification::upload_payment_receipt))
        .route("/verification-status/:user_id", get(verification::verification_status))
        .route("/admin/verify-user", post(verification::verify_user))
        .route("/admin/verification-list", get(verification::verification_list))
        // Submissions
        .route("/submissions/reference", post(papers::allocate_reference))
        .route("/submissions/abstract", post(papers::create_abstract))
        .route("/submissions/full-paper", post(papers::create_full_paper))
        .route("/submissions/user/:user_id", get(papers::list_for_owner))
        .route("/submissions/:id", get(papers::get_submission))
        .route("/admin/start-review/:submission_id", post(papers::start_review))
        .route("/admin/review/:submission_id", post(papers::review))
        .route("/paper/resubmit/:paper_id", post(papers::resubmit))
        .route("/paper/versions/:paper_id", get(papers::versions))
        .nest_service("/files", files)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `{"success": true, ...fields of data}`
#[derive(Debug, Serialize)]
pub(crate) struct Success<T> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

pub(crate) fn success<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        data,
    })
}

/// Text fields and at most one file from a multipart body.
#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    fields: HashMap<String, String>,
    file: Option<UploadedFile>,
}

impl MultipartForm {
    pub(crate) async fn read(mut multipart: Multipart, default_filename: &str) -> Result<Self> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let bytes = field.bytes().await?;
                    let filename = if filename.is_empty() {
                        default_filename.to_string()
                    } else {
                        filename
                    };
                    form.file = Some(UploadedFile {
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    pub(crate) fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub(crate) fn require(&self, name: &str) -> Result<String> {
        self.text(name)
            .map(str::to_string)
            .ok_or_else(|| AppError::validation(format!("{} is required", name)))
    }

    pub(crate) fn take_file(&mut self) -> Result<UploadedFile> {
        self.file
            .take()
            .ok_or_else(|| AppError::validation("no file uploaded"))
    }
}
