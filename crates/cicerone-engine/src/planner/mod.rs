//! The planning loop: plan → act → observe.
//!
//! Drives a chat-completion session with a remote planner. Each tool
//! call carries one action plus the planner's view of step progress; the
//! engine executes the action, re-reads the page, and feeds a
//! description of the new state back as the tool result — the planner's
//! only way to "see" the effect of its action. A retry budget bounds the
//! loop, and side-effecting clicks are gated on human confirmation.

pub mod gate;
pub mod prompt;
pub mod steps;
pub mod transport;

use crate::api::{ApiError, GuideApi};
use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::manager::GuideManager;
use crate::session_store::{SessionStore, StoredGuide};
use cicerone_common::protocol::{
    ActionOutcome, CurrentState, GuideAction, GuideEventType, GuideStatus, SessionCredentials,
    Step,
};
use gate::{Confirmation, ConfirmationDecision, ConfirmationGate, PendingConfirmation};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use steps::StepSync;
use thiserror::Error;
use tokio::sync::oneshot;
use transport::{ChatMessage, ChatRequest, ChatResponse, ChatTransport, ToolCall, TransportError};

#[derive(Debug, Error)]
pub enum GuideError {
    #[error("Failed to start guide session: {0}")]
    SessionStart(#[source] ApiError),

    #[error("Chat transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No stored guide to resume")]
    NoResumeState,
}

/// What the guide reports back to the hosting conversation when it ends.
#[derive(Debug, Clone)]
pub struct GuideOutcome {
    pub status: GuideStatus,
    pub message: Option<String>,
}

/// Raw `{ action, current_state }` payload of a tool call. An action
/// string the client does not implement fails to parse here, before
/// anything can dispatch.
#[derive(Debug, Deserialize)]
struct ToolArgs {
    #[serde(default)]
    action: Option<GuideAction>,
    #[serde(default)]
    current_state: Option<CurrentState>,
}

pub struct GuidePlanner<B: Backend, T: ChatTransport> {
    manager: GuideManager<B>,
    transport: T,
    gate: Box<dyn ConfirmationGate>,
    api: Arc<dyn GuideApi>,
    store: Option<SessionStore>,
    status: GuideStatus,
    steps: Vec<Step>,
    step_sync: StepSync,
    confirmation: Confirmation,
    tool_result_count: u32,
    retry_budget: u32,
    instructions: String,
    conversation_slug: Option<String>,
    token: String,
    resume_from: Option<StoredGuide>,
    next_message: Option<ChatMessage>,
    outcome_message: Option<String>,
    message_seq: u64,
}

impl<B: Backend, T: ChatTransport> GuidePlanner<B, T> {
    /// Planner for a fresh guide session.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: GuideManager<B>,
        transport: T,
        gate: Box<dyn ConfirmationGate>,
        api: Arc<dyn GuideApi>,
        config: &EngineConfig,
        token: impl Into<String>,
        instructions: impl Into<String>,
        conversation_slug: Option<String>,
    ) -> Self {
        Self {
            manager,
            transport,
            gate,
            api: Arc::clone(&api),
            store: None,
            status: GuideStatus::Initializing,
            steps: Vec::new(),
            step_sync: StepSync::new(api, config.step_sync_debounce()),
            confirmation: Confirmation::None,
            tool_result_count: 0,
            retry_budget: config.retry_budget,
            instructions: instructions.into(),
            conversation_slug,
            token: token.into(),
            resume_from: None,
            next_message: None,
            outcome_message: None,
            message_seq: 0,
        }
    }

    /// Planner resuming a previously stored guide session.
    #[allow(clippy::too_many_arguments)]
    pub fn resuming(
        manager: GuideManager<B>,
        transport: T,
        gate: Box<dyn ConfirmationGate>,
        api: Arc<dyn GuideApi>,
        config: &EngineConfig,
        stored: StoredGuide,
        conversation_slug: Option<String>,
    ) -> Self {
        let token = stored.credentials.token.clone();
        let instructions = stored.instructions.clone();
        let mut planner = Self::new(
            manager,
            transport,
            gate,
            api,
            config,
            token,
            instructions,
            conversation_slug,
        );
        planner.status = GuideStatus::PendingResume;
        planner.resume_from = Some(stored);
        planner
    }

    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn status(&self) -> GuideStatus {
        self.status
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn tool_result_count(&self) -> u32 {
        self.tool_result_count
    }

    pub fn pending_confirmation(&self) -> Option<&PendingConfirmation> {
        match &self.confirmation {
            Confirmation::Awaiting(pending) => Some(pending),
            Confirmation::None => None,
        }
    }

    pub fn manager(&self) -> &GuideManager<B> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut GuideManager<B> {
        &mut self.manager
    }

    /// Release the manager for teardown once the guide has finished.
    pub fn into_manager(self) -> GuideManager<B> {
        self.manager
    }

    /// Run the guide to completion. `cancel` is the explicit
    /// "just tell me how" affordance: when it fires, the guide stops and
    /// the outcome tells the hosting chat to fall back to text
    /// instructions.
    pub async fn run(
        &mut self,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<GuideOutcome, GuideError> {
        match self.status {
            GuideStatus::Initializing => self.initialize().await?,
            GuideStatus::PendingResume => self.resume().await?,
            _ => {}
        }

        self.drive(&mut cancel).await?;
        Ok(self.outcome())
    }

    pub fn outcome(&self) -> GuideOutcome {
        GuideOutcome {
            status: self.status,
            message: self.outcome_message.clone(),
        }
    }

    async fn initialize(&mut self) -> Result<(), GuideError> {
        self.status = GuideStatus::Initializing;

        let start = match self
            .api
            .start_session(&self.instructions, self.conversation_slug.as_deref())
            .await
        {
            Ok(start) => start,
            Err(e) => {
                tracing::error!("failed to create guide session: {e}");
                self.status = GuideStatus::Error;
                return Err(GuideError::SessionStart(e));
            }
        };

        let credentials = SessionCredentials {
            session_id: start.session_id,
            token: self.token.clone(),
        };

        self.steps = start
            .steps
            .into_iter()
            .map(|description| Step {
                description,
                completed: false,
            })
            .collect();

        self.step_sync.set_session(credentials.clone());

        if let Some(store) = &self.store {
            let stored = StoredGuide {
                credentials: credentials.clone(),
                instructions: self.instructions.clone(),
                steps: self.steps.clone(),
            };
            if let Err(e) = store.save(&stored).await {
                tracing::warn!("failed to persist guide session: {e}");
            }
        }

        self.status = GuideStatus::Running;
        self.manager.start(credentials).await;
        self.send_initial_prompt(false).await;
        Ok(())
    }

    /// Resume handshake: restore the stored step list and credentials,
    /// then re-send the initial prompt annotated as a resumption so the
    /// planner re-validates the steps against the live page rather than
    /// blindly continuing.
    async fn resume(&mut self) -> Result<(), GuideError> {
        let Some(stored) = self.resume_from.take() else {
            self.status = GuideStatus::Error;
            return Err(GuideError::NoResumeState);
        };

        self.steps = stored.steps;
        self.step_sync.set_session(stored.credentials.clone());
        self.status = GuideStatus::Running;
        self.manager.start(stored.credentials).await;

        let details = self.send_initial_prompt(true).await;
        self.manager
            .send_guide_event(
                GuideEventType::Resumed,
                json!({
                    "pageDetails": details.as_ref().map(|d| json!({
                        "url": d.url,
                        "title": d.title,
                    })),
                }),
            )
            .await;
        Ok(())
    }

    async fn send_initial_prompt(
        &mut self,
        resumed: bool,
    ) -> Option<cicerone_common::protocol::PageDetails> {
        let details = self.manager.refresh_page_details().await;
        let content = prompt::initial_prompt(&self.instructions, &self.steps, details.as_ref(), resumed);
        self.next_message = Some(ChatMessage::user(content));
        details
    }

    async fn drive(&mut self, cancel: &mut oneshot::Receiver<()>) -> Result<(), GuideError> {
        while self.status == GuideStatus::Running {
            let Some(message) = self.next_message.take() else {
                break;
            };

            self.message_seq += 1;
            let request = ChatRequest {
                id: format!("client_{}", self.message_seq),
                message,
                session_id: self.manager.session().map(|c| c.session_id.clone()),
                steps: self.steps.clone(),
                conversation_slug: self.conversation_slug.clone(),
            };

            enum LoopEvent {
                Response(Result<ChatResponse, TransportError>),
                Cancelled,
            }

            // Cancellation takes precedence when both are ready.
            let event = tokio::select! {
                biased;
                _ = &mut *cancel => LoopEvent::Cancelled,
                response = self.transport.send(request) => LoopEvent::Response(response),
            };

            let response = match event {
                LoopEvent::Cancelled => {
                    self.handle_user_cancel().await;
                    break;
                }
                LoopEvent::Response(Ok(response)) => response,
                LoopEvent::Response(Err(e)) => {
                    tracing::error!("chat transport failed: {e}");
                    self.status = GuideStatus::Error;
                    self.manager.cancel().await;
                    return Err(e.into());
                }
            };

            match response.tool_calls.into_iter().next() {
                Some(call) => self.handle_tool_call(call).await,
                None => {
                    if self.status == GuideStatus::Running {
                        self.finish_with_text(response.text).await;
                    }
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_tool_call(&mut self, call: ToolCall) {
        let args: ToolArgs = match serde_json::from_value(call.args.clone()) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!("unsupported tool call: {e}");
                let details = self.manager.refresh_page_details().await;
                self.track_tool_result(call.id, prompt::action_failure(details.as_ref()))
                    .await;
                return;
            }
        };

        if let Some(state) = &args.current_state {
            self.apply_completed_steps(state);
        }
        let context = args.current_state.unwrap_or_default();

        let Some(action) = args.action else {
            self.track_tool_result(call.id, "No action provided in tool call.".to_string())
                .await;
            return;
        };

        match action {
            GuideAction::Done(req) => {
                let message = req
                    .text
                    .unwrap_or_else(|| "Task completed successfully".to_string());
                self.finish(req.success, message).await;
            }
            GuideAction::ClickElement(ref click) if click.has_side_effects => {
                let pending = PendingConfirmation {
                    tool_call_id: call.id,
                    action: action.clone(),
                    context,
                    description: click
                        .side_effect_description
                        .clone()
                        .unwrap_or_else(|| "This action may have side effects".to_string()),
                };
                self.confirmation = Confirmation::Awaiting(pending.clone());

                match self.gate.review(&pending).await {
                    ConfirmationDecision::Approved => self.handle_confirm_action().await,
                    ConfirmationDecision::Cancelled => self.handle_cancel_action().await,
                }
            }
            action => {
                self.execute_action_and_track_result(action, context, call.id)
                    .await;
            }
        }
    }

    /// Execute the held side-effecting action, identically to the
    /// unconfirmed path.
    pub async fn handle_confirm_action(&mut self) {
        let Confirmation::Awaiting(pending) =
            std::mem::replace(&mut self.confirmation, Confirmation::None)
        else {
            return;
        };

        self.execute_action_and_track_result(pending.action, pending.context, pending.tool_call_id)
            .await;
    }

    /// Reject the held action: the planner is told as if the action had
    /// been attempted and refused, so the plan can adapt. The DOM is not
    /// touched.
    pub async fn handle_cancel_action(&mut self) {
        let Confirmation::Awaiting(pending) =
            std::mem::replace(&mut self.confirmation, Confirmation::None)
        else {
            return;
        };

        let details = self.manager.refresh_page_details().await;
        self.track_tool_result(pending.tool_call_id, prompt::action_cancelled(details.as_ref()))
            .await;
    }

    async fn execute_action_and_track_result(
        &mut self,
        action: GuideAction,
        context: CurrentState,
        tool_call_id: String,
    ) {
        let outcome = self.manager.execute(&action, &context).await;

        let additional = if matches!(action, GuideAction::InputText(_)) {
            prompt::REQUIRED_INPUTS_HINT
        } else {
            ""
        };

        let details = self.manager.refresh_page_details().await;
        let result = match &outcome {
            ActionOutcome::Performed => {
                prompt::action_result(action.name(), None, details.as_ref(), additional)
            }
            ActionOutcome::Value(value) => {
                prompt::action_result(action.name(), Some(value), details.as_ref(), additional)
            }
            ActionOutcome::Failed => prompt::action_failure(details.as_ref()),
        };

        self.track_tool_result(tool_call_id, result).await;
    }

    /// Queue a tool result for the next loop turn, counting it against
    /// the retry budget. Once the budget is exhausted the guide gives up
    /// and tells the hosting chat to fall back to text instructions.
    pub async fn track_tool_result(&mut self, tool_call_id: String, result: String) -> bool {
        if self.tool_result_count >= self.retry_budget {
            let message = "Failed to complete the task, too many attempts";
            self.manager.done(false, Some(message)).await;
            self.clear_store().await;
            self.step_sync.abort_pending();
            self.status = GuideStatus::Error;
            self.outcome_message = Some(
                "Failed to complete the task, too many attempts. Return the text instructions \
                 instead and inform about the issue"
                    .to_string(),
            );
            return false;
        }

        self.tool_result_count += 1;
        self.next_message = Some(ChatMessage::tool(tool_call_id, result));
        true
    }

    /// Recompute the step list from the planner's 1-based completed
    /// indices (membership, not a field-by-field merge) and schedule the
    /// debounced backend sync.
    fn apply_completed_steps(&mut self, state: &CurrentState) {
        let new_steps: Vec<Step> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| Step {
                description: step.description.clone(),
                completed: state.completed_steps.contains(&(i + 1)),
            })
            .collect();

        if new_steps != self.steps {
            for (old, new) in self.steps.iter().zip(&new_steps) {
                if !old.completed && new.completed {
                    tracing::info!("step completed: {}", new.description);
                }
            }
            self.steps = new_steps;
            self.step_sync.schedule(&self.steps);
        }
    }

    async fn finish(&mut self, success: bool, message: String) {
        self.manager.done(success, Some(&message)).await;
        self.clear_store().await;
        self.step_sync.abort_pending();
        self.status = GuideStatus::Done;
        self.outcome_message = Some(message);
    }

    async fn finish_with_text(&mut self, text: Option<String>) {
        let message = text.unwrap_or_else(|| "Task completed successfully".to_string());
        self.finish(true, message).await;
    }

    async fn handle_user_cancel(&mut self) {
        self.manager.cancel().await;
        self.clear_store().await;
        self.step_sync.abort_pending();
        self.status = GuideStatus::Cancelled;
        self.outcome_message =
            Some("User cancelled the guide. Send text instructions instead.".to_string());
    }

    async fn clear_store(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear().await {
                tracing::warn!("failed to clear stored guide session: {e}");
            }
        }
    }
}
