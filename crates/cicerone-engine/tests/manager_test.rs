mod support;

use cicerone_engine::config::EngineConfig;
use cicerone_engine::manager::GuideManager;
use cicerone_engine::protocol::{
    ActionOutcome, CurrentState, DoneRequest, GuideAction, GuideEventType, InputTextRequest,
    WaitRequest,
};
use serde_json::json;
use std::sync::Arc;
use support::{MockApi, MockBackend, MockElement, credentials};

fn manager_with(
    backend: MockBackend,
    api: Arc<MockApi>,
) -> GuideManager<MockBackend> {
    GuideManager::new(backend, api, &EngineConfig::default())
}

#[tokio::test(start_paused = true)]
async fn execute_refuses_when_not_running() {
    let api = Arc::new(MockApi::default());
    let backend = MockBackend::with_elements(vec![(
        0,
        MockElement::text_input("//input[@id='email']"),
    )]);
    let mut manager = manager_with(backend, api.clone());

    let action = GuideAction::InputText(InputTextRequest {
        index: 0,
        text: "a@b.com".into(),
    });
    let outcome = manager.execute(&action, &CurrentState::default()).await;

    assert_eq!(outcome, ActionOutcome::Failed);
    assert!(api.lifecycle.lock().unwrap().is_empty());
    assert!(manager.backend().mutation_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn action_performed_is_reported_even_when_execution_fails() {
    let api = Arc::new(MockApi::default());
    let mut manager = manager_with(MockBackend::new(), api.clone());
    manager.start(credentials()).await;

    let action = GuideAction::InputText(InputTextRequest {
        index: 7,
        text: "a@b.com".into(),
    });
    let outcome = manager.execute(&action, &CurrentState::default()).await;

    // Index 7 does not exist, so execution fails, but the intent was
    // traced first.
    assert_eq!(outcome, ActionOutcome::Failed);
    let events = api.lifecycle.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, GuideEventType::ActionPerformed);
    assert_eq!(events[0].data.get("actionType"), Some(&json!("input_text")));
}

#[tokio::test(start_paused = true)]
async fn done_action_is_not_dispatched_to_the_dom() {
    let api = Arc::new(MockApi::default());
    let mut manager = manager_with(MockBackend::new(), api.clone());
    manager.start(credentials()).await;

    let action = GuideAction::Done(DoneRequest {
        success: true,
        text: None,
    });
    let outcome = manager.execute(&action, &CurrentState::default()).await;

    assert_eq!(outcome, ActionOutcome::Failed);
    assert!(manager.backend().mutation_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sensitive_input_is_masked_in_the_session_trace() {
    let api = Arc::new(MockApi::default());
    let mut backend = MockBackend::with_elements(vec![(
        0,
        MockElement::text_input("//input[@id='pw']"),
    )]);
    backend.set_node_attribute(0, "name", "current_password");
    let mut manager = manager_with(backend, api.clone());
    manager.start(credentials()).await;

    let action = GuideAction::InputText(InputTextRequest {
        index: 0,
        text: "hunter2".into(),
    });
    manager.execute(&action, &CurrentState::default()).await;

    let events = api.lifecycle.lock().unwrap();
    let params = events[0].data.get("params").unwrap();
    assert_eq!(params.get("text"), Some(&json!("••••••••")));

    // The real value still reached the page.
    drop(events);
    assert_eq!(manager.backend().elements[0].value, "hunter2");
}

#[tokio::test(start_paused = true)]
async fn wait_executes_without_a_target() {
    let api = Arc::new(MockApi::default());
    let mut manager = manager_with(MockBackend::new(), api.clone());
    manager.start(credentials()).await;

    let action = GuideAction::Wait(WaitRequest { seconds: 0.1 });
    let outcome = manager.execute(&action, &CurrentState::default()).await;
    assert_eq!(outcome, ActionOutcome::Performed);
}

#[tokio::test(start_paused = true)]
async fn done_reports_completion_and_stops_the_session() {
    let api = Arc::new(MockApi::default());
    let mut manager = manager_with(MockBackend::new(), api.clone());
    manager.start(credentials()).await;
    assert!(manager.is_running());

    manager.done(true, Some("All set")).await;

    assert!(!manager.is_running());
    let kinds = api.lifecycle_kinds();
    assert_eq!(kinds, vec![GuideEventType::Completed]);

    let events = api.lifecycle.lock().unwrap();
    assert_eq!(events[0].data.get("success"), Some(&json!(true)));
    assert_eq!(events[0].data.get("message"), Some(&json!("All set")));
}

#[tokio::test(start_paused = true)]
async fn lifecycle_events_require_an_active_session() {
    let api = Arc::new(MockApi::default());
    let manager = manager_with(MockBackend::new(), api.clone());

    manager
        .send_guide_event(GuideEventType::ActionPerformed, json!({}))
        .await;

    assert!(api.lifecycle.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn starting_twice_does_not_duplicate_recording() {
    let api = Arc::new(MockApi::default());
    let mut manager = manager_with(MockBackend::new(), api.clone());

    manager.start(credentials()).await;
    manager.start(credentials()).await;

    assert_eq!(manager.backend().capture_starts, 1);
}

#[tokio::test(start_paused = true)]
async fn destroy_is_safe_when_never_initialized() {
    let api = Arc::new(MockApi::default());
    let mut manager = manager_with(MockBackend::new(), api);
    manager.destroy().await;
    assert!(!manager.is_running());
}
