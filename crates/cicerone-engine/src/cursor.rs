//! Synthetic on-screen cursor.
//!
//! Cosmetic feedback only, decoupled from actual event dispatch: the
//! indicator approaches the target, pulses, and the real DOM operation
//! follows separately. Every DOM action routes through the animation
//! first, so its fixed delays are the per-action latency floor that
//! keeps the automation observable to a human.

use crate::backend::Backend;
use crate::config::Timings;
use crate::locator::ElementLocator;
use cicerone_common::protocol::DomSnapshot;

pub struct CursorAnimator {
    timings: Timings,
    mounted: bool,
}

impl CursorAnimator {
    pub fn new(timings: Timings) -> Self {
        Self {
            timings,
            mounted: false,
        }
    }

    /// Mount the indicator node. Idempotent: repeat calls reuse the
    /// existing node.
    pub async fn ensure_indicator<B: Backend + ?Sized>(&mut self, backend: &mut B) -> bool {
        if self.mounted {
            return true;
        }
        match backend.mount_cursor().await {
            Ok(()) => {
                self.mounted = true;
                true
            }
            Err(e) => {
                tracing::warn!("failed to mount cursor indicator: {e}");
                false
            }
        }
    }

    /// Move the indicator to the element's center, scrolling it into
    /// view first when needed, then play the click pulse. Resolves
    /// `false` whenever the element cannot be found.
    pub async fn animate_to_element<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        snapshot: Option<&DomSnapshot>,
        index: u32,
    ) -> bool {
        let Some(mut handle) = ElementLocator::resolve(snapshot, backend, index).await else {
            return false;
        };

        let Some(mut layout) = fetch_layout(backend, handle).await else {
            return false;
        };
        let Some(viewport) = fetch_viewport(backend).await else {
            return false;
        };

        if !ElementLocator::is_visible(&layout, &viewport) {
            if let Err(e) = backend.scroll_into_view(handle).await {
                tracing::warn!("scroll_into_view failed: {e}");
            }
            tokio::time::sleep(self.timings.scroll_settle).await;

            // Scroll-triggered reflows can replace the node (virtualized
            // lists), so resolve again before reading its position.
            let Some(fresh) = ElementLocator::resolve(snapshot, backend, index).await else {
                return false;
            };
            handle = fresh;
            let Some(fresh_layout) = fetch_layout(backend, handle).await else {
                return false;
            };
            layout = fresh_layout;
        }

        let (x, y) = layout.rect.center();

        self.ensure_indicator(backend).await;
        if let Err(e) = backend.move_cursor(x, y).await {
            tracing::warn!("failed to move cursor: {e}");
        }
        tokio::time::sleep(self.timings.approach).await;

        if let Err(e) = backend.set_cursor_pressed(true).await {
            tracing::warn!("failed to start click pulse: {e}");
        }
        tokio::time::sleep(self.timings.click_pulse).await;
        if let Err(e) = backend.set_cursor_pressed(false).await {
            tracing::warn!("failed to end click pulse: {e}");
        }

        true
    }

    pub async fn hide<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        if let Err(e) = backend.hide_cursor().await {
            tracing::debug!("failed to hide cursor: {e}");
        }
    }

    /// Remove the indicator node. Safe to call when never mounted.
    pub async fn destroy<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        if !self.mounted {
            return;
        }
        if let Err(e) = backend.unmount_cursor().await {
            tracing::debug!("failed to remove cursor node: {e}");
        }
        self.mounted = false;
    }
}

async fn fetch_layout<B: Backend + ?Sized>(
    backend: &mut B,
    handle: cicerone_common::protocol::ElementHandle,
) -> Option<cicerone_common::protocol::ElementLayout> {
    match backend.element_layout(handle).await {
        Ok(layout) => layout,
        Err(e) => {
            tracing::warn!("failed to read element layout: {e}");
            None
        }
    }
}

async fn fetch_viewport<B: Backend + ?Sized>(
    backend: &mut B,
) -> Option<cicerone_common::protocol::Viewport> {
    match backend.viewport().await {
        Ok(viewport) => Some(viewport),
        Err(e) => {
            tracing::warn!("failed to read viewport: {e}");
            None
        }
    }
}
