use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};

use ghostsky_core::domain::comments::CreateCommentRequest;
use ghostsky_core::error::PortError;
use ghostsky_core::ports::CommentAdapter;

pub const SIGNATURE_HEADER: &str = "x-ghostsky-signature";
const USER_AGENT: &str = "ghostsky";

#[derive(Debug, Error)]
pub enum ShimError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("shim rejected comment: status {status}, body {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<ShimError> for PortError {
    fn from(err: ShimError) -> Self {
        match err {
            ShimError::Http(err) if err.is_timeout() || err.is_connect() => {
                PortError::Unavailable(err.to_string())
            }
            ShimError::InvalidResponse(message) => PortError::InvalidResponse(message),
            err => PortError::Rejected(err.to_string()),
        }
    }
}

/// Client for the comment shim sitting in front of the content platform.
#[derive(Clone)]
pub struct ShimClient {
    http: reqwest::Client,
    base_url: String,
    secret: Option<String>,
    health_timeout: Duration,
}

impl std::fmt::Debug for ShimClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShimClient")
            .field("base_url", &self.base_url)
            .field("signed", &self.secret.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct CreateCommentResponse {
    #[serde(alias = "id")]
    comment_id: String,
}

impl ShimClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        secret: Option<String>,
        health_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.filter(|value| !value.is_empty()),
            health_timeout,
        }
    }

    async fn post_comment(&self, request: &CreateCommentRequest) -> Result<String, ShimError> {
        let body = serde_json::to_vec(request)?;
        let mut builder = self
            .http
            .post(format!("{}/comments", self.base_url))
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/json");
        if let Some(secret) = self.secret.as_deref() {
            builder = builder.header(SIGNATURE_HEADER, sign_body(secret, &body));
        }
        let response = builder.body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ShimError::Status {
                status: status.as_u16(),
                body: text.chars().take(300).collect(),
            });
        }
        let payload: CreateCommentResponse = serde_json::from_str(&text)
            .map_err(|_| ShimError::InvalidResponse(format!("invalid comment payload: {text}")))?;
        let comment_id = payload.comment_id.trim();
        if comment_id.is_empty() {
            return Err(ShimError::InvalidResponse("missing comment_id".to_string()));
        }
        Ok(comment_id.to_string())
    }
}

#[async_trait]
impl CommentAdapter for ShimClient {
    async fn health_check(&self) -> bool {
        let result = self
            .http
            .get(format!("{}/health", self.base_url))
            .header("User-Agent", USER_AGENT)
            .timeout(self.health_timeout)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = response.status().as_u16(), base_url = %self.base_url, "shim health check failed");
                false
            }
            Err(err) => {
                warn!(error = %err, base_url = %self.base_url, "shim unreachable");
                false
            }
        }
    }

    async fn create_comment(&self, request: &CreateCommentRequest) -> Result<String, PortError> {
        let comment_id = self.post_comment(request).await?;
        debug!(comment_id = %comment_id, post_id = %request.post_id, "shim created comment");
        Ok(comment_id)
    }
}

/// `sha256=<hex>` HMAC of the raw request body.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("hmac can take key of any size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
