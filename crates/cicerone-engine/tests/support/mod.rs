#![allow(dead_code)]

use async_trait::async_trait;
use cicerone_engine::api::{ApiError, GuideApi};
use cicerone_engine::backend::{Backend, BackendError, NavigationResult};
use cicerone_engine::config::EngineConfig;
use cicerone_engine::planner::gate::{
    ConfirmationDecision, ConfirmationGate, PendingConfirmation,
};
use cicerone_engine::planner::transport::{
    ChatRequest, ChatResponse, ChatTransport, ToolCall, TransportError,
};
use cicerone_engine::protocol::{
    DomSnapshot, DropdownOption, ElementHandle, ElementLayout, LayoutStyle, LifecycleEvent,
    PageDetails, PageMetadata, RecordedEvent, Rect, SessionCredentials, SessionStart,
    SnapshotNode, Step, Viewport,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub fn test_config() -> EngineConfig {
    EngineConfig::default()
}

pub fn credentials() -> SessionCredentials {
    SessionCredentials {
        session_id: "s1".into(),
        token: "t1".into(),
    }
}

pub fn event(n: usize) -> RecordedEvent {
    RecordedEvent {
        kind: "click".into(),
        timestamp: n as i64,
        data: serde_json::json!({ "n": n }),
    }
}

pub fn visible_layout() -> ElementLayout {
    ElementLayout {
        rect: Rect {
            x: 10.0,
            y: 10.0,
            width: 100.0,
            height: 20.0,
        },
        offset_width: 100.0,
        offset_height: 20.0,
        style: LayoutStyle::default(),
        ancestors: Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Click(u32),
    Focus(u32),
    SetValue(u32, String),
    ChooseOption(u32, String),
    ScrollIntoView(u32),
    GoBack,
    MountCursor,
    MoveCursor,
    CursorPressed(bool),
    HideCursor,
    UnmountCursor,
}

#[derive(Debug, Clone)]
pub enum MockElementKind {
    Text,
    Select(Vec<DropdownOption>),
    Other,
}

#[derive(Debug, Clone)]
pub struct MockElement {
    pub xpath: String,
    pub kind: MockElementKind,
    pub value: String,
    pub layout: ElementLayout,
}

impl MockElement {
    pub fn text_input(xpath: &str) -> Self {
        Self {
            xpath: xpath.into(),
            kind: MockElementKind::Text,
            value: String::new(),
            layout: visible_layout(),
        }
    }

    pub fn select(xpath: &str, options: &[(&str, &str)]) -> Self {
        Self {
            xpath: xpath.into(),
            kind: MockElementKind::Select(
                options
                    .iter()
                    .map(|(label, value)| DropdownOption {
                        label: (*label).into(),
                        value: (*value).into(),
                    })
                    .collect(),
            ),
            value: String::new(),
            layout: visible_layout(),
        }
    }

    pub fn other(xpath: &str) -> Self {
        Self {
            xpath: xpath.into(),
            kind: MockElementKind::Other,
            value: String::new(),
            layout: visible_layout(),
        }
    }
}

/// Scripted in-memory page. Handle ids are the element's position in
/// `elements`, so re-resolving the same element yields an equal handle.
pub struct MockBackend {
    pub elements: Vec<MockElement>,
    pub snapshot: DomSnapshot,
    pub calls: Vec<MockCall>,
    pub viewport: Viewport,
    pub details: PageDetails,
    pub capture_tx: Option<mpsc::UnboundedSender<RecordedEvent>>,
    pub capture_starts: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_elements(Vec::new())
    }

    /// Build a backend plus a snapshot mapping `highlight_index` to each
    /// element's XPath.
    pub fn with_elements(indexed: Vec<(u32, MockElement)>) -> Self {
        let mut map = HashMap::new();
        let mut elements = Vec::new();
        for (key, (index, element)) in indexed.into_iter().enumerate() {
            map.insert(
                key.to_string(),
                SnapshotNode {
                    highlight_index: Some(index),
                    xpath: element.xpath.clone(),
                    tag_name: None,
                    attributes: HashMap::new(),
                },
            );
            elements.push(element);
        }

        Self {
            elements,
            snapshot: DomSnapshot { map },
            calls: Vec::new(),
            viewport: Viewport {
                width: 1280.0,
                height: 720.0,
            },
            details: PageDetails {
                url: "https://app.example.com/settings".into(),
                title: "Settings".into(),
                clickable_elements: "[0]<input name=\"email\"/>".into(),
            },
            capture_tx: None,
            capture_starts: 0,
        }
    }

    pub fn set_node_attribute(&mut self, index: u32, name: &str, value: &str) {
        for node in self.snapshot.map.values_mut() {
            if node.highlight_index == Some(index) {
                node.attributes.insert(name.into(), value.into());
            }
        }
    }

    fn element(&self, handle: ElementHandle) -> Option<&MockElement> {
        self.elements.get(handle.id as usize)
    }

    fn element_mut(&mut self, handle: ElementHandle) -> Option<&mut MockElement> {
        self.elements.get_mut(handle.id as usize)
    }

    pub fn mutation_calls(&self) -> Vec<&MockCall> {
        self.calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    MockCall::Click(_)
                        | MockCall::SetValue(_, _)
                        | MockCall::ChooseOption(_, _)
                        | MockCall::GoBack
                )
            })
            .collect()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn navigate(&mut self, _url: &str) -> Result<NavigationResult, BackendError> {
        Err(BackendError::NotSupported("navigate".into()))
    }

    async fn go_back(&mut self) -> Result<(), BackendError> {
        self.calls.push(MockCall::GoBack);
        Ok(())
    }

    async fn take_snapshot(&mut self) -> Result<DomSnapshot, BackendError> {
        Ok(self.snapshot.clone())
    }

    async fn page_details(&mut self) -> Result<PageDetails, BackendError> {
        Ok(self.details.clone())
    }

    async fn page_metadata(&mut self) -> Result<PageMetadata, BackendError> {
        Ok(PageMetadata {
            url: self.details.url.clone(),
            title: self.details.title.clone(),
            user_agent: "mock".into(),
            screen_resolution: "1280x720".into(),
        })
    }

    async fn resolve_xpath(
        &mut self,
        xpath: &str,
    ) -> Result<Option<ElementHandle>, BackendError> {
        Ok(self
            .elements
            .iter()
            .position(|e| e.xpath == xpath)
            .map(|id| ElementHandle { id: id as u32 }))
    }

    async fn element_layout(
        &mut self,
        handle: ElementHandle,
    ) -> Result<Option<ElementLayout>, BackendError> {
        Ok(self.element(handle).map(|e| e.layout.clone()))
    }

    async fn viewport(&mut self) -> Result<Viewport, BackendError> {
        Ok(self.viewport)
    }

    async fn click(&mut self, handle: ElementHandle) -> Result<(), BackendError> {
        self.calls.push(MockCall::Click(handle.id));
        Ok(())
    }

    async fn focus(&mut self, handle: ElementHandle) -> Result<(), BackendError> {
        self.calls.push(MockCall::Focus(handle.id));
        Ok(())
    }

    async fn focusable_elements(&mut self) -> Result<Vec<ElementHandle>, BackendError> {
        Ok((0..self.elements.len())
            .map(|id| ElementHandle { id: id as u32 })
            .collect())
    }

    async fn set_text_value(
        &mut self,
        handle: ElementHandle,
        text: &str,
    ) -> Result<bool, BackendError> {
        let Some(element) = self.element_mut(handle) else {
            return Err(BackendError::Script("no such element".into()));
        };
        if !matches!(element.kind, MockElementKind::Text) {
            return Ok(false);
        }
        element.value = text.to_string();
        self.calls.push(MockCall::SetValue(handle.id, text.into()));
        Ok(true)
    }

    async fn text_value(
        &mut self,
        handle: ElementHandle,
    ) -> Result<Option<String>, BackendError> {
        Ok(self.element(handle).and_then(|e| {
            matches!(e.kind, MockElementKind::Text).then(|| e.value.clone())
        }))
    }

    async fn dropdown_options(
        &mut self,
        handle: ElementHandle,
    ) -> Result<Option<Vec<DropdownOption>>, BackendError> {
        Ok(self.element(handle).and_then(|e| match &e.kind {
            MockElementKind::Select(options) => Some(options.clone()),
            _ => None,
        }))
    }

    async fn choose_option(
        &mut self,
        handle: ElementHandle,
        value: &str,
    ) -> Result<(), BackendError> {
        if let Some(element) = self.element_mut(handle) {
            element.value = value.to_string();
        }
        self.calls
            .push(MockCall::ChooseOption(handle.id, value.into()));
        Ok(())
    }

    async fn scroll_into_view(&mut self, handle: ElementHandle) -> Result<(), BackendError> {
        self.calls.push(MockCall::ScrollIntoView(handle.id));
        Ok(())
    }

    async fn mount_cursor(&mut self) -> Result<(), BackendError> {
        self.calls.push(MockCall::MountCursor);
        Ok(())
    }

    async fn move_cursor(&mut self, _x: f64, _y: f64) -> Result<(), BackendError> {
        self.calls.push(MockCall::MoveCursor);
        Ok(())
    }

    async fn set_cursor_pressed(&mut self, pressed: bool) -> Result<(), BackendError> {
        self.calls.push(MockCall::CursorPressed(pressed));
        Ok(())
    }

    async fn hide_cursor(&mut self) -> Result<(), BackendError> {
        self.calls.push(MockCall::HideCursor);
        Ok(())
    }

    async fn unmount_cursor(&mut self) -> Result<(), BackendError> {
        self.calls.push(MockCall::UnmountCursor);
        Ok(())
    }

    async fn start_event_capture(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<RecordedEvent>, BackendError> {
        self.capture_starts += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.capture_tx = Some(tx);
        Ok(rx)
    }

    async fn stop_event_capture(&mut self) -> Result<(), BackendError> {
        self.capture_tx = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockApi {
    pub start_response: Mutex<Option<SessionStart>>,
    pub fail_start: AtomicBool,
    pub fail_recorded: AtomicBool,
    pub lifecycle: Mutex<Vec<LifecycleEvent>>,
    pub recorded_batches: Mutex<Vec<Vec<RecordedEvent>>>,
    pub step_updates: Mutex<Vec<Vec<Step>>>,
}

impl MockApi {
    pub fn with_start(session_id: &str, steps: &[&str]) -> Arc<Self> {
        let api = Self::default();
        *api.start_response.lock().unwrap() = Some(SessionStart {
            session_id: session_id.into(),
            steps: steps.iter().map(|s| (*s).into()).collect(),
        });
        Arc::new(api)
    }

    pub fn lifecycle_kinds(&self) -> Vec<cicerone_engine::protocol::GuideEventType> {
        self.lifecycle.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl GuideApi for MockApi {
    async fn start_session(
        &self,
        _instructions: &str,
        _conversation_slug: Option<&str>,
    ) -> Result<SessionStart, ApiError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                endpoint: "/api/guide/start".into(),
                status: 500,
            });
        }
        self.start_response
            .lock()
            .unwrap()
            .clone()
            .ok_or(ApiError::Status {
                endpoint: "/api/guide/start".into(),
                status: 404,
            })
    }

    async fn update_steps(
        &self,
        _credentials: &SessionCredentials,
        steps: &[Step],
    ) -> Result<(), ApiError> {
        self.step_updates.lock().unwrap().push(steps.to_vec());
        Ok(())
    }

    async fn post_recorded(
        &self,
        _credentials: &SessionCredentials,
        events: &[RecordedEvent],
        _metadata: &PageMetadata,
    ) -> Result<(), ApiError> {
        if self.fail_recorded.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                endpoint: "/api/guide/event".into(),
                status: 503,
            });
        }
        self.recorded_batches.lock().unwrap().push(events.to_vec());
        Ok(())
    }

    async fn post_lifecycle(
        &self,
        _credentials: &SessionCredentials,
        event: &LifecycleEvent,
    ) -> Result<(), ApiError> {
        self.lifecycle.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct ScriptedTransport {
    responses: VecDeque<ChatResponse>,
    pub requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: responses.into(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&mut self, request: ChatRequest) -> Result<ChatResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.responses.pop_front().unwrap_or_default())
    }
}

/// One tool call carrying `{ action, current_state }`.
pub fn tool_call_response(
    id: &str,
    action: serde_json::Value,
    completed_steps: &[usize],
) -> ChatResponse {
    ChatResponse {
        text: None,
        tool_calls: vec![ToolCall {
            id: id.into(),
            args: serde_json::json!({
                "action": action,
                "current_state": { "completed_steps": completed_steps },
            }),
        }],
    }
}

pub struct DecisionGate {
    pub decision: ConfirmationDecision,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl DecisionGate {
    pub fn approving(seen: Arc<Mutex<Vec<String>>>) -> Box<Self> {
        Box::new(Self {
            decision: ConfirmationDecision::Approved,
            seen,
        })
    }

    pub fn cancelling(seen: Arc<Mutex<Vec<String>>>) -> Box<Self> {
        Box::new(Self {
            decision: ConfirmationDecision::Cancelled,
            seen,
        })
    }
}

#[async_trait]
impl ConfirmationGate for DecisionGate {
    async fn review(&mut self, pending: &PendingConfirmation) -> ConfirmationDecision {
        self.seen.lock().unwrap().push(pending.description.clone());
        self.decision
    }
}
