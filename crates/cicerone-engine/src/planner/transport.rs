//! Chat-completion transport for the planning loop.
//!
//! The tool-call protocol itself is an external collaborator: the
//! planner only supplies the per-call request augmentation (session id,
//! step list, conversation slug) and consumes assistant text and tool
//! calls.

use async_trait::async_trait;
use cicerone_common::protocol::Step;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {0} from chat endpoint")]
    Status(u16),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            tool_call_id: None,
        }
    }

    /// A tool result answering a previous tool call.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Request body augmented per call with the guide session context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub id: String,
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_slug: Option<String>,
}

/// A tool call emitted by the model. `args` carries the raw
/// `{ action, current_state }` payload; the planner parses it so an
/// unknown action is a failed parse, not a dispatched action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&mut self, request: ChatRequest) -> Result<ChatResponse, TransportError>;
}

pub struct HttpChatTransport {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
}

impl HttpChatTransport {
    pub fn new(endpoint: Url, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            token: token.into(),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(&mut self, request: ChatRequest) -> Result<ChatResponse, TransportError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        Ok(response.json::<ChatResponse>().await?)
    }
}
