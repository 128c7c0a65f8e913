//! Debounced persistence of the step list.
//!
//! Every change restarts a short timer; only the state at the quiet end
//! of a burst is written. Serialized forms are compared so identical
//! lists do not produce redundant writes, and a failed write is only
//! logged: step persistence is best-effort telemetry.

use crate::api::GuideApi;
use cicerone_common::protocol::{SessionCredentials, Step};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct StepSync {
    api: Arc<dyn GuideApi>,
    session: Option<SessionCredentials>,
    last_serialized: String,
    pending: Option<JoinHandle<()>>,
    debounce: Duration,
}

impl StepSync {
    pub fn new(api: Arc<dyn GuideApi>, debounce: Duration) -> Self {
        Self {
            api,
            session: None,
            last_serialized: "[]".to_string(),
            pending: None,
            debounce,
        }
    }

    pub fn set_session(&mut self, credentials: SessionCredentials) {
        self.session = Some(credentials);
    }

    /// Schedule a write of the given step list, superseding any write
    /// still waiting on the debounce timer.
    pub fn schedule(&mut self, steps: &[Step]) {
        let Some(credentials) = self.session.clone() else {
            return;
        };

        let serialized = match serde_json::to_string(steps) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::error!("failed to serialize steps: {e}");
                return;
            }
        };
        if serialized == self.last_serialized {
            return;
        }

        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.last_serialized = serialized;

        let api = Arc::clone(&self.api);
        let steps = steps.to_vec();
        let debounce = self.debounce;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = api.update_steps(&credentials, &steps).await {
                tracing::error!("failed to update guide steps: {e}");
            }
        }));
    }

    /// Drop any write still pending. Used on terminal transitions where
    /// the session is already closed server-side.
    pub fn abort_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}
