//! Guide session orchestration: snapshot ownership, action dispatch,
//! lifecycle events, recording, and teardown.

use crate::api::GuideApi;
use crate::backend::Backend;
use crate::config::{EngineConfig, Timings};
use crate::cursor::CursorAnimator;
use crate::executor::ActionExecutor;
use crate::recorder::{RecorderConfig, SessionRecorder};
use cicerone_common::mask;
use cicerone_common::protocol::{
    ActionOutcome, CurrentState, DomSnapshot, GuideAction, GuideEventType, LifecycleEvent,
    PageDetails, SessionCredentials, unix_millis,
};
use serde_json::json;
use std::sync::Arc;

pub struct GuideManager<B: Backend> {
    backend: B,
    api: Arc<dyn GuideApi>,
    snapshot: Option<DomSnapshot>,
    cursor: CursorAnimator,
    recorder: SessionRecorder,
    session: Option<SessionCredentials>,
    timings: Timings,
    running: bool,
}

impl<B: Backend> GuideManager<B> {
    pub fn new(backend: B, api: Arc<dyn GuideApi>, config: &EngineConfig) -> Self {
        let timings = config.timings();
        Self {
            backend,
            api: Arc::clone(&api),
            snapshot: None,
            cursor: CursorAnimator::new(timings.clone()),
            recorder: SessionRecorder::new(
                api,
                RecorderConfig {
                    flush_interval: config.flush_interval(),
                    flush_threshold: config.flush_threshold,
                },
            ),
            session: None,
            timings,
            running: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn session(&self) -> Option<&SessionCredentials> {
        self.session.as_ref()
    }

    pub fn snapshot(&self) -> Option<&DomSnapshot> {
        self.snapshot.as_ref()
    }

    /// Replace the page snapshot wholesale. Indices handed out against
    /// the previous snapshot become meaningless.
    pub fn set_snapshot(&mut self, snapshot: DomSnapshot) {
        self.snapshot = Some(snapshot);
    }

    /// Begin the guide session: remember credentials and start the
    /// ambient session recording.
    pub async fn start(&mut self, credentials: SessionCredentials) {
        self.running = true;
        self.session = Some(credentials.clone());
        self.recorder.attach_session(credentials).await;
        if let Err(e) = self.recorder.start(&mut self.backend).await {
            tracing::error!("failed to start session recording: {e}");
        }
    }

    /// Execute a planner action against the page.
    ///
    /// The `action_performed` lifecycle event is reported before
    /// dispatching, so the session trace records intent even when
    /// execution fails afterwards.
    pub async fn execute(
        &mut self,
        action: &GuideAction,
        current_state: &CurrentState,
    ) -> ActionOutcome {
        if !self.running {
            return ActionOutcome::Failed;
        }

        let details = self.refresh_page_details().await;

        self.send_guide_event(
            GuideEventType::ActionPerformed,
            json!({
                "actionType": action.name(),
                "params": self.masked_params(action),
                "currentState": current_state,
                "pageDetails": details.as_ref().map(|d| json!({
                    "url": d.url,
                    "title": d.title,
                    "elements": d.clickable_elements,
                })),
            }),
        )
        .await;

        ActionExecutor::execute(
            &mut self.backend,
            self.snapshot.as_ref(),
            &mut self.cursor,
            &self.timings,
            action,
        )
        .await
    }

    /// Re-index the page, refresh the recorder's flush metadata, and
    /// return the current page details.
    pub async fn refresh_page_details(&mut self) -> Option<PageDetails> {
        match self.backend.take_snapshot().await {
            Ok(snapshot) => self.snapshot = Some(snapshot),
            Err(e) => tracing::warn!("failed to take page snapshot: {e}"),
        }

        let details = match self.backend.page_details().await {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!("failed to read page details: {e}");
                return None;
            }
        };

        match self.backend.page_metadata().await {
            Ok(metadata) => self.recorder.update_metadata(metadata).await,
            Err(e) => tracing::debug!("failed to read page metadata: {e}"),
        }

        Some(details)
    }

    /// Fire-and-forget lifecycle event. Requires an active session.
    pub async fn send_guide_event(&self, kind: GuideEventType, data: serde_json::Value) {
        let Some(credentials) = &self.session else {
            tracing::error!("cannot send guide event: session not started");
            return;
        };

        let event = LifecycleEvent {
            kind,
            timestamp: unix_millis(),
            data,
        };

        if let Err(e) = self.api.post_lifecycle(credentials, &event).await {
            tracing::error!("failed to send guide event: {e}");
        }
    }

    /// Finish the guide: report completion, stop recording, hide the
    /// cursor. Terminal.
    pub async fn done(&mut self, success: bool, message: Option<&str>) {
        let details = self.backend.page_details().await.ok();
        self.send_guide_event(
            GuideEventType::Completed,
            json!({
                "success": success,
                "message": message,
                "url": details.as_ref().map(|d| d.url.clone()),
                "title": details.as_ref().map(|d| d.title.clone()),
            }),
        )
        .await;

        self.teardown().await;
    }

    /// Abort the guide without a completion event.
    pub async fn cancel(&mut self) {
        if !self.running {
            return;
        }
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        self.running = false;
        self.recorder.stop(&mut self.backend).await;
        self.cursor.hide(&mut self.backend).await;
        self.session = None;
    }

    /// Release everything. Safe to call even when never fully
    /// initialized.
    pub async fn destroy(&mut self) {
        self.cursor.destroy(&mut self.backend).await;
        if self.recorder.is_recording() {
            self.recorder.stop(&mut self.backend).await;
        }
    }

    /// Action parameters for the session trace, with text destined for
    /// credential-looking fields masked.
    fn masked_params(&self, action: &GuideAction) -> serde_json::Value {
        let mut params = match serde_json::to_value(action) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("type");
                serde_json::Value::Object(map)
            }
            _ => json!({}),
        };

        if let (Some(index), Some(obj)) = (action.target_index(), params.as_object_mut()) {
            if let Some(serde_json::Value::String(text)) = obj.get("text") {
                let field_name = self
                    .snapshot
                    .as_ref()
                    .and_then(|s| s.node_by_index(index))
                    .map(|node| {
                        let mut name = String::new();
                        for key in ["name", "type", "aria-label", "placeholder"] {
                            if let Some(value) = node.attributes.get(key) {
                                name.push_str(value);
                                name.push(' ');
                            }
                        }
                        name
                    })
                    .unwrap_or_default();

                let masked = mask::mask_sensitive(text, &field_name);
                obj.insert("text".into(), serde_json::Value::String(masked));
            }
        }

        params
    }
}
