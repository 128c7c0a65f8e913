//! Element resolution and visibility classification.
//!
//! Resolution failure is not exceptional: an absent snapshot, an unknown
//! index, or an XPath that matches nothing all come back as `None` and
//! are reported upward as failed actions, never as errors.

use crate::backend::Backend;
use cicerone_common::protocol::{DomSnapshot, ElementHandle, ElementLayout, LayoutStyle, Viewport};

pub struct ElementLocator;

impl ElementLocator {
    /// Resolve a snapshot index to a live element via its stored XPath.
    pub async fn resolve<B: Backend + ?Sized>(
        snapshot: Option<&DomSnapshot>,
        backend: &mut B,
        index: u32,
    ) -> Option<ElementHandle> {
        let snapshot = snapshot?;
        let node = snapshot.node_by_index(index)?;
        if node.xpath.trim().is_empty() {
            return None;
        }
        match backend.resolve_xpath(&node.xpath).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("xpath resolution failed for index {index}: {e}");
                None
            }
        }
    }

    /// Whether an element counts as visible for interaction purposes.
    ///
    /// An element inside a scrollable ancestor whose scroll content
    /// contains it still counts as visible even when it sits outside the
    /// ancestor's on-screen box: that distinguishes "needs a scroll"
    /// from "is permanently hidden". The content check compares
    /// viewport-space coordinates against content-space scroll offsets
    /// and returns per-ancestor, which classifies leniently when an
    /// element is clipped by a different ancestor than the one under
    /// examination.
    pub fn is_visible(layout: &ElementLayout, viewport: &Viewport) -> bool {
        if layout.offset_width == 0.0 || layout.offset_height == 0.0 {
            return false;
        }

        if style_hidden(&layout.style) {
            return false;
        }

        let rect = &layout.rect;
        if rect.bottom() < 0.0
            || rect.top() > viewport.height
            || rect.right() < 0.0
            || rect.left() > viewport.width
        {
            return false;
        }

        for parent in &layout.ancestors {
            if style_hidden(&parent.style)
                || parent.offset_width == 0.0
                || parent.offset_height == 0.0
            {
                return false;
            }

            let scrollable =
                is_scroll_overflow(&parent.style.overflow_y) || is_scroll_overflow(&parent.style.overflow_x);

            if scrollable {
                let visible_top = parent.rect.top().max(0.0);
                let visible_bottom = parent.rect.bottom().min(viewport.height);
                let visible_left = parent.rect.left().max(0.0);
                let visible_right = parent.rect.right().min(viewport.width);

                let outside_visible = rect.bottom() < visible_top
                    || rect.top() > visible_bottom
                    || rect.right() < visible_left
                    || rect.left() > visible_right;

                if outside_visible {
                    let outside_content = rect.bottom() < parent.scroll_top
                        || rect.top() > parent.scroll_top + parent.client_height
                        || rect.right() < parent.scroll_left
                        || rect.left() > parent.scroll_left + parent.client_width;

                    if outside_content {
                        return false;
                    }
                }
            }
        }

        true
    }
}

fn style_hidden(style: &LayoutStyle) -> bool {
    style.display == "none" || style.visibility == "hidden" || style.opacity == "0"
}

fn is_scroll_overflow(overflow: &str) -> bool {
    matches!(overflow, "auto" | "scroll")
}
