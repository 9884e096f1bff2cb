use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Form fields posted to the gateway's initiation endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InitiationRequest {
    pub key: String,
    pub txnid: String,
    pub amount: String,
    pub productinfo: String,
    pub firstname: String,
    pub phone: String,
    pub email: String,
    pub surl: String,
    pub furl: String,
    pub hash: String,
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Opens a checkout session and returns its access key.
    async fn initiate(&self, request: &InitiationRequest) -> Result<String>;

    /// Hosted checkout page for an access key.
    fn payment_url(&self, access_key: &str) -> String;
}

pub type GatewayClientRef = Arc<dyn GatewayClient>;

#[derive(Debug, Deserialize)]
struct InitiationResponse {
    status: i64,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error_desc: Option<String>,
}

/// Gateway client over HTTPS. Initiation calls are never retried here: a
/// failed attempt is reported and the caller starts over with a new txnid.
pub struct HttpGatewayClient {
    client: Client,
    base_url: String,
}

impl HttpGatewayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn upstream(message: impl Into<String>) -> AppError {
    AppError::UpstreamGateway {
        message: message.into(),
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn initiate(&self, request: &InitiationRequest) -> Result<String> {
        info!(txnid = %request.txnid, amount = %request.amount, "Initiating gateway checkout");

        let response = self
            .client
            .post(format!("{}/payment/initiateLink", self.base_url))
            .header("accept", "application/json")
            .form(request)
            .send()
            .await
            .map_err(|e| upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| upstream(format!("response read failed: {}", e)))?;

        if !status.is_success() {
            warn!(txnid = %request.txnid, status = status.as_u16(), "Gateway rejected initiation");
            return Err(upstream(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let parsed: InitiationResponse =
            serde_json::from_str(&text).map_err(|e| upstream(format!("parse error: {}", e)))?;

        match (parsed.status, parsed.data) {
            (1, Some(serde_json::Value::String(access_key))) if !access_key.is_empty() => {
                Ok(access_key)
            }
            (_, data) => {
                let detail = parsed
                    .error_desc
                    .or_else(|| data.map(|d| d.to_string()))
                    .unwrap_or_else(|| "no access key returned".to_string());
                warn!(txnid = %request.txnid, detail = %detail, "Gateway initiation failed");
                Err(upstream(detail))
            }
        }
    }

    fn payment_url(&self, access_key: &str) -> String {
        format!("{}/pay/{}", self.base_url, access_key)
    }
}
