use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::types::{
    CreateSessionRequest, CreateSessionResponse, GetPostThreadResponse,
    ListNotificationsResponse, Notification, ThreadNode, XrpcErrorBody,
};
use ghostsky_core::error::PortError;
use ghostsky_core::types::at_uri::AtUri;
use ghostsky_core::types::backoff::BackoffPolicy;

const USER_AGENT: &str = "ghostsky";
const SESSION_REFRESH_MARGIN_SECS: i64 = 60;
const FALLBACK_SESSION_TTL_MINS: i64 = 30;
const AUTH_ERROR_CODES: [&str; 3] = ["AuthenticationRequired", "ExpiredToken", "InvalidToken"];

#[derive(Debug, Error)]
pub enum BlueskyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("xrpc {method} failed: status {status}, {message}")]
    Status {
        method: &'static str,
        status: u16,
        message: String,
    },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl BlueskyError {
    fn is_transient(&self) -> bool {
        match self {
            BlueskyError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            BlueskyError::Status { status, .. } => is_transient_status(*status),
            BlueskyError::Auth(_) | BlueskyError::InvalidResponse(_) => false,
        }
    }
}

impl From<BlueskyError> for PortError {
    fn from(err: BlueskyError) -> Self {
        match err {
            BlueskyError::Auth(message) => PortError::Unauthorized(message),
            BlueskyError::InvalidResponse(message) => PortError::InvalidResponse(message),
            err @ BlueskyError::Status { .. } if !err.is_transient() => {
                PortError::Rejected(err.to_string())
            }
            err => PortError::Unavailable(err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct BlueskyCredentials {
    pub service_url: String,
    pub identifier: String,
    pub app_password: String,
}

impl std::fmt::Debug for BlueskyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueskyCredentials")
            .field("service_url", &self.service_url)
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct Session {
    access_jwt: String,
    expires_at: DateTime<Utc>,
}

/// XRPC client for one account. Holds its own session; build one per run and
/// per tenant.
#[derive(Debug)]
pub struct BlueskyClient {
    http: reqwest::Client,
    credentials: BlueskyCredentials,
    backoff: BackoffPolicy,
    session: Mutex<Option<Session>>,
}

impl BlueskyClient {
    pub fn new(http: reqwest::Client, credentials: BlueskyCredentials, backoff: BackoffPolicy) -> Self {
        Self {
            http,
            credentials,
            backoff,
            session: Mutex::new(None),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.credentials.identifier
    }

    /// Makes sure a usable session exists, logging in when needed.
    pub async fn authenticate(&self) -> Result<(), BlueskyError> {
        self.access_token().await.map(|_| ())
    }

    pub(crate) async fn get_post_thread(
        &self,
        uri: &AtUri,
        depth: u16,
    ) -> Result<ThreadNode, BlueskyError> {
        let query = [
            ("uri", uri.to_string()),
            ("depth", depth.to_string()),
            ("parentHeight", "0".to_string()),
        ];
        let response: GetPostThreadResponse =
            self.xrpc_get("app.bsky.feed.getPostThread", &query).await?;
        Ok(response.thread)
    }

    pub(crate) async fn list_notifications(
        &self,
        limit: u16,
    ) -> Result<Vec<Notification>, BlueskyError> {
        let query = [("limit", limit.clamp(1, 100).to_string())];
        let response: ListNotificationsResponse = self
            .xrpc_get("app.bsky.notification.listNotifications", &query)
            .await?;
        Ok(response.notifications)
    }

    async fn xrpc_get<T>(&self, method: &'static str, query: &[(&str, String)]) -> Result<T, BlueskyError>
    where
        T: DeserializeOwned,
    {
        let url = self.xrpc_url(method);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let token = self.access_token().await?;
            let result = match self
                .http
                .get(&url)
                .query(query)
                .bearer_auth(&token)
                .header("User-Agent", USER_AGENT)
                .send()
                .await
            {
                Ok(response) => read_json(method, response).await,
                Err(err) => Err(BlueskyError::Http(err)),
            };
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if matches!(err, BlueskyError::Auth(_)) {
                self.session.lock().await.take();
                return Err(err);
            }
            match self.backoff.delay_after(attempt) {
                Some(delay) if err.is_transient() => {
                    warn!(
                        error = %err,
                        method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "xrpc request failed; backing off"
                    );
                    sleep(delay).await;
                }
                _ => return Err(err),
            }
        }
    }

    async fn access_token(&self) -> Result<String, BlueskyError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            let margin = ChronoDuration::seconds(SESSION_REFRESH_MARGIN_SECS);
            if session.expires_at - margin > Utc::now() {
                return Ok(session.access_jwt.clone());
            }
            debug!(identifier = %self.credentials.identifier, "bluesky session near expiry");
        }
        let session = self.create_session().await?;
        let token = session.access_jwt.clone();
        *guard = Some(session);
        Ok(token)
    }

    async fn create_session(&self) -> Result<Session, BlueskyError> {
        let method = "com.atproto.server.createSession";
        let response = self
            .http
            .post(self.xrpc_url(method))
            .header("User-Agent", USER_AGENT)
            .json(&CreateSessionRequest {
                identifier: &self.credentials.identifier,
                password: &self.credentials.app_password,
            })
            .send()
            .await?;
        let payload: CreateSessionResponse = match read_json(method, response).await {
            Ok(payload) => payload,
            Err(BlueskyError::Status { status, message, .. }) if is_credential_status(status) => {
                return Err(BlueskyError::Auth(message));
            }
            Err(err) => return Err(err),
        };
        if payload.access_jwt.trim().is_empty() {
            return Err(BlueskyError::InvalidResponse("missing accessJwt".to_string()));
        }
        let expires_at = token_expiry(&payload.access_jwt)
            .unwrap_or_else(|| Utc::now() + ChronoDuration::minutes(FALLBACK_SESSION_TTL_MINS));
        info!(did = %payload.did, handle = %payload.handle, %expires_at, "bluesky session created");
        Ok(Session {
            access_jwt: payload.access_jwt,
            expires_at,
        })
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!(
            "{}/xrpc/{method}",
            self.credentials.service_url.trim_end_matches('/')
        )
    }
}

async fn read_json<T>(method: &'static str, response: reqwest::Response) -> Result<T, BlueskyError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return serde_json::from_str(&body)
            .map_err(|err| BlueskyError::InvalidResponse(format!("{method}: {err}")));
    }
    Err(classify_failure(method, status, &body))
}

fn classify_failure(method: &'static str, status: StatusCode, body: &str) -> BlueskyError {
    let parsed: XrpcErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error.unwrap_or_default();
    let message = match parsed.message {
        Some(message) if !code.is_empty() => format!("{code}: {message}"),
        Some(message) => message,
        None if !code.is_empty() => code.clone(),
        None => body.chars().take(200).collect(),
    };
    if status == StatusCode::UNAUTHORIZED || AUTH_ERROR_CODES.contains(&code.as_str()) {
        return BlueskyError::Auth(message);
    }
    BlueskyError::Status {
        method,
        status: status.as_u16(),
        message,
    }
}

fn is_transient_status(status: u16) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(&status)
}

fn is_credential_status(status: u16) -> bool {
    status == StatusCode::BAD_REQUEST.as_u16() || status == StatusCode::FORBIDDEN.as_u16()
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

/// Reads `exp` without verifying the signature; the PDS is the authority and
/// only the refresh timing depends on it.
fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data = decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::from_timestamp(data.claims.exp, 0)
}
