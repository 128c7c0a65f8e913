//! Action execution against resolved elements.
//!
//! One function per action type, all returning `ActionOutcome`. Expected
//! failure modes (missing element, non-matching option) come back as
//! `Failed`, and backend faults are logged and folded into `Failed` as
//! well: the ultimate handler of these failures is the planner, which
//! needs a tool result describing what went wrong, not an unwound stack.

use crate::backend::Backend;
use crate::config::Timings;
use crate::cursor::CursorAnimator;
use crate::locator::ElementLocator;
use cicerone_common::protocol::{ActionOutcome, DomSnapshot, ElementHandle, GuideAction};

const TAB_SENTINEL: &str = "[Tab]";

pub struct ActionExecutor;

impl ActionExecutor {
    pub async fn execute<B: Backend + ?Sized>(
        backend: &mut B,
        snapshot: Option<&DomSnapshot>,
        cursor: &mut CursorAnimator,
        timings: &Timings,
        action: &GuideAction,
    ) -> ActionOutcome {
        match action {
            GuideAction::ClickElement(req) => {
                Self::click_element(backend, snapshot, cursor, req.index).await
            }
            GuideAction::SelectOption(req) => {
                Self::select_option(backend, snapshot, cursor, req.index, &req.text).await
            }
            GuideAction::InputText(req) => {
                Self::input_text(backend, snapshot, cursor, timings, req.index, &req.text).await
            }
            GuideAction::GetDropdownOptions(req) => {
                Self::get_dropdown_options(backend, snapshot, req.index).await
            }
            GuideAction::SendKeys(req) => {
                Self::send_keys(backend, snapshot, cursor, timings, req.index, &req.text).await
            }
            GuideAction::ScrollToElement(req) => {
                Self::scroll_to_element(backend, snapshot, timings, req.index).await
            }
            GuideAction::GoBack(_) => Self::go_back(backend).await,
            GuideAction::Wait(req) => Self::wait(req.seconds).await,
            GuideAction::Done(_) => {
                // The planner finishes the guide on `done` itself; it is
                // not a DOM action.
                tracing::warn!("done action reached the executor");
                ActionOutcome::Failed
            }
        }
    }

    pub async fn click_element<B: Backend + ?Sized>(
        backend: &mut B,
        snapshot: Option<&DomSnapshot>,
        cursor: &mut CursorAnimator,
        index: u32,
    ) -> ActionOutcome {
        cursor.ensure_indicator(backend).await;

        let Some(handle) = ElementLocator::resolve(snapshot, backend, index).await else {
            return ActionOutcome::Failed;
        };

        cursor.animate_to_element(backend, snapshot, index).await;

        match backend.click(handle).await {
            Ok(()) => ActionOutcome::Performed,
            Err(e) => {
                tracing::warn!("click failed for index {index}: {e}");
                ActionOutcome::Failed
            }
        }
    }

    pub async fn select_option<B: Backend + ?Sized>(
        backend: &mut B,
        snapshot: Option<&DomSnapshot>,
        cursor: &mut CursorAnimator,
        index: u32,
        text: &str,
    ) -> ActionOutcome {
        cursor.ensure_indicator(backend).await;

        let Some(handle) = ElementLocator::resolve(snapshot, backend, index).await else {
            return ActionOutcome::Failed;
        };

        let options = match backend.dropdown_options(handle).await {
            Ok(options) => options,
            Err(e) => {
                tracing::warn!("failed to read options for index {index}: {e}");
                return ActionOutcome::Failed;
            }
        };

        let Some(options) = options else {
            // Not a select: fall back to a plain click (custom dropdown
            // widgets open on click).
            cursor.animate_to_element(backend, snapshot, index).await;
            return match backend.click(handle).await {
                Ok(()) => ActionOutcome::Performed,
                Err(e) => {
                    tracing::warn!("fallback click failed for index {index}: {e}");
                    ActionOutcome::Failed
                }
            };
        };

        cursor.animate_to_element(backend, snapshot, index).await;

        let Some(option) = options
            .iter()
            .find(|o| o.label == text || o.value == text)
        else {
            return ActionOutcome::Failed;
        };

        match backend.choose_option(handle, &option.value).await {
            Ok(()) => ActionOutcome::Performed,
            Err(e) => {
                tracing::warn!("select failed for index {index}: {e}");
                ActionOutcome::Failed
            }
        }
    }

    pub async fn input_text<B: Backend + ?Sized>(
        backend: &mut B,
        snapshot: Option<&DomSnapshot>,
        cursor: &mut CursorAnimator,
        timings: &Timings,
        index: u32,
        text: &str,
    ) -> ActionOutcome {
        Self::apply_text(backend, snapshot, cursor, timings, index, text, false).await
    }

    /// Like `input_text` but appends to the existing value.
    pub async fn send_keys<B: Backend + ?Sized>(
        backend: &mut B,
        snapshot: Option<&DomSnapshot>,
        cursor: &mut CursorAnimator,
        timings: &Timings,
        index: u32,
        text: &str,
    ) -> ActionOutcome {
        Self::apply_text(backend, snapshot, cursor, timings, index, text, true).await
    }

    async fn apply_text<B: Backend + ?Sized>(
        backend: &mut B,
        snapshot: Option<&DomSnapshot>,
        cursor: &mut CursorAnimator,
        timings: &Timings,
        index: u32,
        text: &str,
        append: bool,
    ) -> ActionOutcome {
        let Some(handle) = ElementLocator::resolve(snapshot, backend, index).await else {
            return ActionOutcome::Failed;
        };

        cursor.animate_to_element(backend, snapshot, index).await;

        if let Err(e) = backend.focus(handle).await {
            tracing::warn!("focus failed for index {index}: {e}");
        }

        let (value, advance_focus) = match text.strip_suffix(TAB_SENTINEL) {
            Some(stripped) => (stripped.to_string(), true),
            None => (text.to_string(), false),
        };

        let value = if append {
            let existing = match backend.text_value(handle).await {
                Ok(Some(existing)) => existing,
                Ok(None) => return ActionOutcome::Failed,
                Err(e) => {
                    tracing::warn!("failed to read value for index {index}: {e}");
                    return ActionOutcome::Failed;
                }
            };
            format!("{existing}{value}")
        } else {
            value
        };

        match backend.set_text_value(handle, &value).await {
            Ok(true) => {}
            Ok(false) => return ActionOutcome::Failed,
            Err(e) => {
                tracing::warn!("failed to set value for index {index}: {e}");
                return ActionOutcome::Failed;
            }
        }

        if advance_focus {
            Self::focus_next(backend, handle).await;
        }

        tokio::time::sleep(timings.input_settle).await;
        ActionOutcome::Performed
    }

    /// Move focus to the next focusable element in document tab order,
    /// wrapping to the first when the current element is last.
    async fn focus_next<B: Backend + ?Sized>(backend: &mut B, current: ElementHandle) {
        let focusable = match backend.focusable_elements().await {
            Ok(focusable) => focusable,
            Err(e) => {
                tracing::warn!("failed to list focusable elements: {e}");
                return;
            }
        };
        if focusable.is_empty() {
            return;
        }

        let next = match focusable.iter().position(|h| *h == current) {
            Some(pos) if pos + 1 < focusable.len() => focusable[pos + 1],
            _ => focusable[0],
        };

        if let Err(e) = backend.focus(next).await {
            tracing::warn!("failed to advance focus: {e}");
        }
    }

    pub async fn get_dropdown_options<B: Backend + ?Sized>(
        backend: &mut B,
        snapshot: Option<&DomSnapshot>,
        index: u32,
    ) -> ActionOutcome {
        let Some(handle) = ElementLocator::resolve(snapshot, backend, index).await else {
            return ActionOutcome::Failed;
        };

        match backend.dropdown_options(handle).await {
            Ok(Some(options)) => {
                let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
                ActionOutcome::Value(labels.join(", "))
            }
            Ok(None) => ActionOutcome::Failed,
            Err(e) => {
                tracing::warn!("failed to read options for index {index}: {e}");
                ActionOutcome::Failed
            }
        }
    }

    pub async fn scroll_to_element<B: Backend + ?Sized>(
        backend: &mut B,
        snapshot: Option<&DomSnapshot>,
        timings: &Timings,
        index: u32,
    ) -> ActionOutcome {
        let Some(handle) = ElementLocator::resolve(snapshot, backend, index).await else {
            return ActionOutcome::Failed;
        };

        if let Err(e) = backend.scroll_into_view(handle).await {
            tracing::warn!("scroll failed for index {index}: {e}");
            return ActionOutcome::Failed;
        }

        tokio::time::sleep(timings.scroll_settle).await;
        ActionOutcome::Performed
    }

    pub async fn go_back<B: Backend + ?Sized>(backend: &mut B) -> ActionOutcome {
        if let Err(e) = backend.go_back().await {
            tracing::warn!("history back failed: {e}");
        }
        ActionOutcome::Performed
    }

    pub async fn wait(seconds: f64) -> ActionOutcome {
        tokio::time::sleep(std::time::Duration::from_secs_f64(seconds.max(0.0))).await;
        ActionOutcome::Performed
    }
}
