//! Session recording: a replayable stream of ambient DOM events.
//!
//! Independent of the action-execution path; it captures what actually
//! happened on the page for human review, not the planner-directed
//! actions. Delivery is at-least-once: events leave the buffer only
//! after a confirmed successful flush.

use crate::api::{ApiError, GuideApi};
use crate::backend::Backend;
use cicerone_common::protocol::{PageMetadata, RecordedEvent, SessionCredentials};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub flush_interval: Duration,
    pub flush_threshold: usize,
}

struct RecorderShared {
    buffer: Mutex<Vec<RecordedEvent>>,
    in_flight: AtomicBool,
    api: Arc<dyn GuideApi>,
    session: Mutex<Option<SessionCredentials>>,
    metadata: Mutex<PageMetadata>,
}

impl RecorderShared {
    /// Send the currently buffered events. No-op when the buffer is
    /// empty, no session is attached, or another flush is already in
    /// flight. On success exactly the sent events are removed; events
    /// appended during the network round-trip stay queued. On failure
    /// the buffer is left untouched for the next tick.
    async fn flush(&self) -> Result<(), ApiError> {
        let Some(credentials) = self.session.lock().await.clone() else {
            return Ok(());
        };

        let count = {
            let buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return Ok(());
            }
            buffer.len()
        };

        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let batch: Vec<RecordedEvent> = {
            let buffer = self.buffer.lock().await;
            buffer[..count.min(buffer.len())].to_vec()
        };
        let sent = batch.len();
        let metadata = self.metadata.lock().await.clone();

        let result = self.api.post_recorded(&credentials, &batch, &metadata).await;

        if result.is_ok() {
            self.buffer.lock().await.drain(..sent);
        }
        self.in_flight.store(false, Ordering::SeqCst);

        result
    }

    async fn append(&self, event: RecordedEvent) -> usize {
        let mut buffer = self.buffer.lock().await;
        buffer.push(event);
        buffer.len()
    }
}

pub struct SessionRecorder {
    shared: Arc<RecorderShared>,
    config: RecorderConfig,
    capture_task: Option<JoinHandle<()>>,
    flush_task: Option<JoinHandle<()>>,
}

impl SessionRecorder {
    pub fn new(api: Arc<dyn GuideApi>, config: RecorderConfig) -> Self {
        Self {
            shared: Arc::new(RecorderShared {
                buffer: Mutex::new(Vec::new()),
                in_flight: AtomicBool::new(false),
                api,
                session: Mutex::new(None),
                metadata: Mutex::new(PageMetadata::default()),
            }),
            config,
            capture_task: None,
            flush_task: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.capture_task.is_some()
    }

    pub async fn attach_session(&self, credentials: SessionCredentials) {
        *self.shared.session.lock().await = Some(credentials);
    }

    pub async fn update_metadata(&self, metadata: PageMetadata) {
        *self.shared.metadata.lock().await = metadata;
    }

    pub async fn pending_events(&self) -> usize {
        self.shared.buffer.lock().await.len()
    }

    /// Append an event as the capture stream would. Exposed for capture
    /// sources that do not go through `Backend::start_event_capture`.
    pub async fn push_event(&self, event: RecordedEvent) {
        let len = self.shared.append(event).await;
        if len >= self.config.flush_threshold {
            if let Err(e) = self.shared.flush().await {
                tracing::warn!("recorded-event flush failed: {e}");
            }
        }
    }

    /// Begin capturing. No-op when already recording: no duplicate
    /// capture stream, no duplicate flush timer.
    pub async fn start<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<(), crate::backend::BackendError> {
        if self.capture_task.is_some() {
            return Ok(());
        }

        let mut rx = backend.start_event_capture().await?;

        let shared = Arc::clone(&self.shared);
        let threshold = self.config.flush_threshold;
        self.capture_task = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let len = shared.append(event).await;
                if len >= threshold {
                    if let Err(e) = shared.flush().await {
                        tracing::warn!("recorded-event flush failed: {e}");
                    }
                }
            }
        }));

        let shared = Arc::clone(&self.shared);
        let interval = self.config.flush_interval;
        self.flush_task = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                if let Err(e) = shared.flush().await {
                    tracing::warn!("recorded-event flush failed: {e}");
                }
            }
        }));

        Ok(())
    }

    /// Stop capturing. No-op when inactive. Performs one final flush of
    /// anything still buffered.
    pub async fn stop<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        let Some(capture) = self.capture_task.take() else {
            return;
        };

        if let Err(e) = backend.stop_event_capture().await {
            tracing::debug!("failed to stop event capture: {e}");
        }
        capture.abort();

        if let Some(flush_task) = self.flush_task.take() {
            flush_task.abort();
        }

        if let Err(e) = self.shared.flush().await {
            tracing::warn!("final recorded-event flush failed: {e}");
        }
    }

    pub async fn flush(&self) -> Result<(), ApiError> {
        self.shared.flush().await
    }
}
