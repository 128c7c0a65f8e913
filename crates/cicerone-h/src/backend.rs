use crate::cdp::CdpClient;
use crate::inject::call_runtime;
use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use cicerone_engine::backend::{Backend, BackendError, NavigationResult};
use cicerone_engine::protocol::{
    DomSnapshot, DropdownOption, ElementHandle, ElementLayout, PageDetails, PageMetadata,
    RecordedEvent, Viewport,
};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

const EMIT_BINDING: &str = "__ciceroneEmit";

pub struct HeadlessBackend {
    client: Option<CdpClient>,
    visible: bool,
    binding_installed: bool,
    forward_task: Option<JoinHandle<()>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            client: None,
            visible: false,
            binding_installed: false,
            forward_task: None,
        }
    }

    pub fn new_with_visibility(visible: bool) -> Self {
        Self {
            client: None,
            visible,
            binding_installed: false,
            forward_task: None,
        }
    }

    pub fn get_client(&self) -> Option<&CdpClient> {
        self.client.as_ref()
    }

    fn client(&self) -> Result<&CdpClient, BackendError> {
        self.client.as_ref().ok_or(BackendError::NotReady)
    }

    async fn call(
        &self,
        method: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, BackendError> {
        let client = self.client()?;
        call_runtime(&client.page, method, args)
            .await
            .map_err(|e| BackendError::Script(e.to_string()))
    }

    async fn get_navigation_result(
        page: &chromiumoxide::Page,
    ) -> Result<NavigationResult, BackendError> {
        let title = page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = page
            .url()
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult { url, title })
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for HeadlessBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        info!("Launching headless backend (Chromium)...");
        let client = CdpClient::launch(self.visible)
            .await
            .map_err(|e| BackendError::Other(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        let client = self.client()?;

        info!("Navigating to: {}", url);
        client
            .page
            .goto(url)
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?;

        Self::get_navigation_result(&client.page).await
    }

    async fn go_back(&mut self) -> Result<(), BackendError> {
        self.call("goBack", &[]).await?;
        tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;
        Ok(())
    }

    async fn take_snapshot(&mut self) -> Result<DomSnapshot, BackendError> {
        let value = self.call("snapshot", &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn page_details(&mut self) -> Result<PageDetails, BackendError> {
        let value = self.call("pageDetails", &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn page_metadata(&mut self) -> Result<PageMetadata, BackendError> {
        let value = self.call("pageMetadata", &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn resolve_xpath(
        &mut self,
        xpath: &str,
    ) -> Result<Option<ElementHandle>, BackendError> {
        let value = self.call("resolveXpath", &[json!(xpath)]).await?;
        if value.get("found").and_then(|v| v.as_bool()) != Some(true) {
            return Ok(None);
        }
        let id = value
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| BackendError::Script("resolveXpath returned no id".into()))?;
        Ok(Some(ElementHandle { id: id as u32 }))
    }

    async fn element_layout(
        &mut self,
        handle: ElementHandle,
    ) -> Result<Option<ElementLayout>, BackendError> {
        let value = self.call("layout", &[json!(handle.id)]).await?;
        if value.get("found").and_then(|v| v.as_bool()) != Some(true) {
            return Ok(None);
        }
        let layout = value
            .get("layout")
            .cloned()
            .ok_or_else(|| BackendError::Script("layout response missing body".into()))?;
        Ok(Some(serde_json::from_value(layout)?))
    }

    async fn viewport(&mut self) -> Result<Viewport, BackendError> {
        let value = self.call("viewport", &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn click(&mut self, handle: ElementHandle) -> Result<(), BackendError> {
        let value = self.call("click", &[json!(handle.id)]).await?;
        if value.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(BackendError::Script("click target no longer exists".into()));
        }
        Ok(())
    }

    async fn focus(&mut self, handle: ElementHandle) -> Result<(), BackendError> {
        self.call("focus", &[json!(handle.id)]).await?;
        Ok(())
    }

    async fn focusable_elements(&mut self) -> Result<Vec<ElementHandle>, BackendError> {
        let value = self.call("focusableElements", &[]).await?;
        let ids = value
            .get("ids")
            .and_then(|v| v.as_array())
            .ok_or_else(|| BackendError::Script("focusableElements returned no ids".into()))?;
        Ok(ids
            .iter()
            .filter_map(|v| v.as_u64())
            .map(|id| ElementHandle { id: id as u32 })
            .collect())
    }

    async fn set_text_value(
        &mut self,
        handle: ElementHandle,
        text: &str,
    ) -> Result<bool, BackendError> {
        let value = self
            .call("setValue", &[json!(handle.id), json!(text)])
            .await?;
        if value.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(BackendError::Script("setValue target no longer exists".into()));
        }
        Ok(value.get("applied").and_then(|v| v.as_bool()) == Some(true))
    }

    async fn text_value(
        &mut self,
        handle: ElementHandle,
    ) -> Result<Option<String>, BackendError> {
        let value = self.call("getValue", &[json!(handle.id)]).await?;
        if value.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(BackendError::Script("getValue target no longer exists".into()));
        }
        Ok(value
            .get("value")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    async fn dropdown_options(
        &mut self,
        handle: ElementHandle,
    ) -> Result<Option<Vec<DropdownOption>>, BackendError> {
        let value = self.call("options", &[json!(handle.id)]).await?;
        if value.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(BackendError::Script("options target no longer exists".into()));
        }
        match value.get("options") {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(options) => Ok(Some(serde_json::from_value(options.clone())?)),
        }
    }

    async fn choose_option(
        &mut self,
        handle: ElementHandle,
        value: &str,
    ) -> Result<(), BackendError> {
        let response = self
            .call("chooseOption", &[json!(handle.id), json!(value)])
            .await?;
        if response.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(BackendError::Script(
                "chooseOption target is not a select".into(),
            ));
        }
        Ok(())
    }

    async fn scroll_into_view(&mut self, handle: ElementHandle) -> Result<(), BackendError> {
        self.call("scrollIntoView", &[json!(handle.id)]).await?;
        Ok(())
    }

    async fn mount_cursor(&mut self) -> Result<(), BackendError> {
        self.call("mountCursor", &[]).await?;
        Ok(())
    }

    async fn move_cursor(&mut self, x: f64, y: f64) -> Result<(), BackendError> {
        self.call("moveCursor", &[json!(x), json!(y)]).await?;
        Ok(())
    }

    async fn set_cursor_pressed(&mut self, pressed: bool) -> Result<(), BackendError> {
        self.call("setCursorPressed", &[json!(pressed)]).await?;
        Ok(())
    }

    async fn hide_cursor(&mut self) -> Result<(), BackendError> {
        self.call("hideCursor", &[]).await?;
        Ok(())
    }

    async fn unmount_cursor(&mut self) -> Result<(), BackendError> {
        self.call("unmountCursor", &[]).await?;
        Ok(())
    }

    async fn start_event_capture(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<RecordedEvent>, BackendError> {
        if !self.binding_installed {
            self.client()?
                .page
                .execute(AddBindingParams::new(EMIT_BINDING))
                .await
                .map_err(|e| BackendError::Other(format!("Failed to add binding: {e}")))?;
            self.binding_installed = true;
        }

        let mut binding_events = self
            .client()?
            .page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(|e| BackendError::Other(format!("Failed to subscribe to binding: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.forward_task = Some(tokio::spawn(async move {
            while let Some(event) = binding_events.next().await {
                if event.name != EMIT_BINDING {
                    continue;
                }
                match serde_json::from_str::<RecordedEvent>(&event.payload) {
                    Ok(recorded) => {
                        if tx.send(recorded).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!("dropping malformed capture event: {e}"),
                }
            }
            tracing::debug!("capture event stream ended");
        }));

        self.call("startCapture", &[]).await?;
        Ok(rx)
    }

    async fn stop_event_capture(&mut self) -> Result<(), BackendError> {
        if self.client.is_some() {
            self.call("stopCapture", &[]).await?;
        }
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
        Ok(())
    }
}
