//! HTTP client for the guide backend.
//!
//! All endpoints are bearer-token authenticated JSON POSTs. Flush and
//! step-update failures are best-effort telemetry for the callers: they
//! log and retry, they never abort a running guide.

use async_trait::async_trait;
use cicerone_common::protocol::{
    LifecycleEvent, PageMetadata, RecordedEvent, SessionCredentials, SessionStart, Step,
};
use serde_json::json;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid endpoint URL: {0}")]
    Endpoint(String),
}

#[async_trait]
pub trait GuideApi: Send + Sync {
    /// Create a guide session; the backend plans the step list.
    async fn start_session(
        &self,
        instructions: &str,
        conversation_slug: Option<&str>,
    ) -> Result<SessionStart, ApiError>;

    /// Persist the current step list so the session can be resumed.
    async fn update_steps(
        &self,
        credentials: &SessionCredentials,
        steps: &[Step],
    ) -> Result<(), ApiError>;

    /// Deliver a batch of recorded replay events.
    async fn post_recorded(
        &self,
        credentials: &SessionCredentials,
        events: &[RecordedEvent],
        metadata: &PageMetadata,
    ) -> Result<(), ApiError>;

    /// Deliver a discrete lifecycle event.
    async fn post_lifecycle(
        &self,
        credentials: &SessionCredentials,
        event: &LifecycleEvent,
    ) -> Result<(), ApiError>;
}

pub struct GuideApiClient {
    http: reqwest::Client,
    origin: Url,
    token: String,
}

impl GuideApiClient {
    pub fn new(origin: Url, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            origin,
            token: token.into(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.origin
            .join(path)
            .map_err(|e| ApiError::Endpoint(format!("{path}: {e}")))
    }

    async fn post(
        &self,
        path: &str,
        token: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ApiError> {
        let endpoint = self.endpoint(path)?;
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl GuideApi for GuideApiClient {
    async fn start_session(
        &self,
        instructions: &str,
        conversation_slug: Option<&str>,
    ) -> Result<SessionStart, ApiError> {
        let response = self
            .post(
                "/api/guide/start",
                &self.token,
                json!({
                    "instructions": instructions,
                    "conversationSlug": conversation_slug,
                }),
            )
            .await?;

        Ok(response.json::<SessionStart>().await?)
    }

    async fn update_steps(
        &self,
        credentials: &SessionCredentials,
        steps: &[Step],
    ) -> Result<(), ApiError> {
        self.post(
            "/api/guide/update",
            &credentials.token,
            json!({
                "sessionId": credentials.session_id,
                "steps": steps,
            }),
        )
        .await?;
        Ok(())
    }

    async fn post_recorded(
        &self,
        credentials: &SessionCredentials,
        events: &[RecordedEvent],
        metadata: &PageMetadata,
    ) -> Result<(), ApiError> {
        self.post(
            "/api/guide/event",
            &credentials.token,
            json!({
                "isRecording": true,
                "sessionId": credentials.session_id,
                "events": events,
                "metadata": metadata,
            }),
        )
        .await?;
        Ok(())
    }

    async fn post_lifecycle(
        &self,
        credentials: &SessionCredentials,
        event: &LifecycleEvent,
    ) -> Result<(), ApiError> {
        self.post(
            "/api/guide/event",
            &credentials.token,
            json!({
                "isRecording": false,
                "sessionId": credentials.session_id,
                "events": [event],
            }),
        )
        .await?;
        Ok(())
    }
}
