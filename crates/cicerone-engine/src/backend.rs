use async_trait::async_trait;
pub use cicerone_common::error::BackendError;
use cicerone_common::protocol::{
    DomSnapshot, DropdownOption, ElementHandle, ElementLayout, PageDetails, PageMetadata,
    RecordedEvent, Viewport,
};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

/// The seam between guide semantics and a live page. The engine resolves
/// elements, decides visibility, and sequences actions; a backend turns
/// those decisions into real DOM operations.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Launch the backend (start a browser, attach to a page, etc.)
    async fn launch(&mut self) -> Result<(), BackendError>;

    /// Close the backend and clean up resources.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Whether the backend is ready to accept commands.
    async fn is_ready(&self) -> bool;

    /// Navigate to a specific URL.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError>;

    /// Navigate back in history.
    async fn go_back(&mut self) -> Result<(), BackendError>;

    /// Index the currently interactable elements of the page.
    async fn take_snapshot(&mut self) -> Result<DomSnapshot, BackendError>;

    /// Current URL/title plus the rendered clickable-elements listing.
    async fn page_details(&mut self) -> Result<PageDetails, BackendError>;

    /// Environment metadata attached to recorded-event flushes.
    async fn page_metadata(&mut self) -> Result<PageMetadata, BackendError> {
        Err(BackendError::NotSupported("page_metadata".into()))
    }

    /// Evaluate an XPath against the live document. `None` when the
    /// expression matches nothing.
    async fn resolve_xpath(&mut self, xpath: &str)
    -> Result<Option<ElementHandle>, BackendError>;

    /// Geometry + style of an element and its ancestor chain. `None`
    /// when the handle no longer refers to a live node.
    async fn element_layout(
        &mut self,
        handle: ElementHandle,
    ) -> Result<Option<ElementLayout>, BackendError>;

    async fn viewport(&mut self) -> Result<Viewport, BackendError>;

    /// Dispatch a native click on the element.
    async fn click(&mut self, handle: ElementHandle) -> Result<(), BackendError>;

    async fn focus(&mut self, handle: ElementHandle) -> Result<(), BackendError>;

    /// Visible focusable elements in document tab order.
    async fn focusable_elements(&mut self) -> Result<Vec<ElementHandle>, BackendError>;

    /// Set the value of a text input through the native value setter and
    /// dispatch `input` + `change`, so framework-bound listeners observe
    /// a real change. `Ok(false)` when the element is not text-editable.
    async fn set_text_value(
        &mut self,
        handle: ElementHandle,
        text: &str,
    ) -> Result<bool, BackendError>;

    /// Current value of a text input. `None` when the element is not
    /// text-editable.
    async fn text_value(&mut self, handle: ElementHandle)
    -> Result<Option<String>, BackendError>;

    /// Options of a `<select>`. `None` when the element is not a select.
    async fn dropdown_options(
        &mut self,
        handle: ElementHandle,
    ) -> Result<Option<Vec<DropdownOption>>, BackendError>;

    /// Set a `<select>` to the option with the given value and dispatch
    /// `change`.
    async fn choose_option(
        &mut self,
        handle: ElementHandle,
        value: &str,
    ) -> Result<(), BackendError>;

    /// Smooth-scroll the element into the center of the viewport.
    async fn scroll_into_view(&mut self, handle: ElementHandle) -> Result<(), BackendError>;

    // Cursor indicator primitives. Purely cosmetic; backends without a
    // visual surface keep the no-op defaults.

    /// Mount the synthetic cursor node. Idempotent.
    async fn mount_cursor(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn move_cursor(&mut self, _x: f64, _y: f64) -> Result<(), BackendError> {
        Ok(())
    }

    async fn set_cursor_pressed(&mut self, _pressed: bool) -> Result<(), BackendError> {
        Ok(())
    }

    async fn hide_cursor(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn unmount_cursor(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Begin streaming ambient DOM interaction events for session replay.
    async fn start_event_capture(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<RecordedEvent>, BackendError> {
        Err(BackendError::NotSupported("start_event_capture".into()))
    }

    async fn stop_event_capture(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
