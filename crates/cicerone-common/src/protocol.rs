use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom deserializer for HashMap<String, String> that filters out null values.
/// The page indexer reports missing attributes as null rather than omitting them.
fn deserialize_nullable_string_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: HashMap<String, Option<String>> = HashMap::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| v.map(|val| (k, val)))
        .collect())
}

/// Milliseconds since the Unix epoch, for event timestamps.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// An action requested by the planner against the live page.
///
/// Serialized with a `type` tag matching the tool-call wire format, so an
/// action string the client does not implement fails to parse instead of
/// silently dispatching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuideAction {
    ClickElement(ClickRequest),
    SelectOption(SelectRequest),
    InputText(InputTextRequest),
    GetDropdownOptions(DropdownRequest),
    SendKeys(SendKeysRequest),
    ScrollToElement(ScrollRequest),
    GoBack(GoBackRequest),
    Wait(WaitRequest),
    Done(DoneRequest),
}

impl GuideAction {
    /// Wire name of the action, as reported in lifecycle events.
    pub fn name(&self) -> &'static str {
        match self {
            GuideAction::ClickElement(_) => "click_element",
            GuideAction::SelectOption(_) => "select_option",
            GuideAction::InputText(_) => "input_text",
            GuideAction::GetDropdownOptions(_) => "get_dropdown_options",
            GuideAction::SendKeys(_) => "send_keys",
            GuideAction::ScrollToElement(_) => "scroll_to_element",
            GuideAction::GoBack(_) => "go_back",
            GuideAction::Wait(_) => "wait",
            GuideAction::Done(_) => "done",
        }
    }

    /// Snapshot index this action targets, if it targets one.
    pub fn target_index(&self) -> Option<u32> {
        match self {
            GuideAction::ClickElement(r) => Some(r.index),
            GuideAction::SelectOption(r) => Some(r.index),
            GuideAction::InputText(r) => Some(r.index),
            GuideAction::GetDropdownOptions(r) => Some(r.index),
            GuideAction::SendKeys(r) => Some(r.index),
            GuideAction::ScrollToElement(r) => Some(r.index),
            GuideAction::GoBack(_) | GuideAction::Wait(_) | GuideAction::Done(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickRequest {
    pub index: u32,
    #[serde(default)]
    pub has_side_effects: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effect_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub index: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputTextRequest {
    pub index: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropdownRequest {
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendKeysRequest {
    pub index: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollRequest {
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoBackRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitRequest {
    pub seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneRequest {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Planner-reported progress carried alongside every action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_previous_goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_goal: Option<String>,
    /// 1-based indices of steps the planner considers complete.
    #[serde(default)]
    pub completed_steps: Vec<usize>,
}

/// Result of executing an action. The boolean-or-string contract of the
/// tool protocol, as a sum type.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Performed,
    Failed,
    Value(String),
}

impl ActionOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, ActionOutcome::Failed)
    }
}

/// Index of currently interactable elements, produced by the page
/// indexer. Indices are only meaningful against the snapshot that
/// produced them; callers re-fetch after any action that could mutate
/// the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomSnapshot {
    #[serde(default)]
    pub map: HashMap<String, SnapshotNode>,
}

impl DomSnapshot {
    pub fn node_by_index(&self, index: u32) -> Option<&SnapshotNode> {
        self.map
            .values()
            .find(|node| node.highlight_index == Some(index))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    #[serde(default)]
    pub highlight_index: Option<u32>,
    #[serde(default)]
    pub xpath: String,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_nullable_string_map")]
    pub attributes: HashMap<String, String>,
}

/// Opaque reference to a live element held by the backend. The backend
/// keeps the id stable for the lifetime of the underlying node, so
/// resolving the same element twice yields an equal handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn left(&self) -> f64 {
        self.x
    }
    pub fn top(&self) -> f64 {
        self.y
    }
    pub fn right(&self) -> f64 {
        self.x + self.width
    }
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Computed-style subset the visibility check reads. Values are the raw
/// CSS strings so the check mirrors what the page actually reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub overflow_x: String,
    pub overflow_y: String,
}

impl Default for LayoutStyle {
    fn default() -> Self {
        Self {
            display: "block".into(),
            visibility: "visible".into(),
            opacity: "1".into(),
            overflow_x: "visible".into(),
            overflow_y: "visible".into(),
        }
    }
}

/// Geometry and style of an element plus its ancestor chain, extracted
/// in one round-trip so visibility can be decided without further
/// backend calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementLayout {
    pub rect: Rect,
    pub offset_width: f64,
    pub offset_height: f64,
    pub style: LayoutStyle,
    pub ancestors: Vec<AncestorLayout>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AncestorLayout {
    pub rect: Rect,
    pub offset_width: f64,
    pub offset_height: f64,
    pub style: LayoutStyle,
    pub scroll_top: f64,
    pub scroll_left: f64,
    pub client_width: f64,
    pub client_height: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropdownOption {
    pub label: String,
    pub value: String,
}

/// Current page identity plus the rendered list of clickable elements
/// fed back to the planner after every action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageDetails {
    pub url: String,
    pub title: String,
    pub clickable_elements: String,
}

/// Environment metadata attached to recorded-event flushes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMetadata {
    pub url: String,
    pub title: String,
    pub user_agent: String,
    pub screen_resolution: String,
}

/// One captured DOM interaction/mutation event, buffered for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: i64,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Discrete lifecycle events appended to the server-side session trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuideEventType {
    SessionStarted,
    ActionPerformed,
    Completed,
    Abandoned,
    Resumed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub kind: GuideEventType,
    pub timestamp: i64,
    pub data: serde_json::Value,
}

/// One planned step of a guide, mutated in place as the planner reports
/// progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub description: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    pub session_id: String,
    pub token: String,
}

/// Response to a session-start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    pub session_id: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideStatus {
    Initializing,
    Running,
    Error,
    Done,
    Cancelled,
    PendingResume,
}
