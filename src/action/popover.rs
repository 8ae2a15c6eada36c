//! Anchored overlay ("popover") bound to a trigger invocation.
//!
//! At most one popover is visible at a time. Its identity is
//! `"<triggerId or default>#<event>"`: re-triggering the visible identity is a
//! no-op, any other identity first tears the visible one down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ActionDefinition, ActionError, raw_config};
use crate::content::{ContentConfig, render};
use crate::expression::compile_str;
use crate::host::pointer::{Point, UiPointerState};
use crate::host::{OverlayId, OverlaySpec, UiHost};
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

/// Estimated overlay height used for placement.
const POPOVER_HEIGHT: f64 = 50.0;
/// Distance kept from the viewport edges and from the anchor.
const MARGIN: f64 = 10.0;
const EDGE_OFFSET: f64 = 20.0;
/// Average glyph width used to estimate the caret position in a text input.
const CHAR_WIDTH: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Above the focused component, falling back to the pointer.
    #[default]
    Component,
    Mouse,
    /// Above the estimated caret of the focused input.
    Cursor,
    Center,
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PopoverSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl PopoverSize {
    fn width(self) -> u32 {
        match self {
            PopoverSize::Small => 200,
            PopoverSize::Medium => 300,
            PopoverSize::Large => 400,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PopoverConfig {
    title: Option<String>,
    #[serde(flatten)]
    content: ContentConfig,
    auto_close: bool,
    /// Milliseconds.
    duration: u64,
    position: Placement,
    size: PopoverSize,
    show_close_button: bool,
    /// Caret offset in the focused input, for `cursor` placement.
    caret: Option<usize>,
}

impl Default for PopoverConfig {
    fn default() -> Self {
        Self {
            title: None,
            content: ContentConfig::default(),
            auto_close: true,
            duration: 3000,
            position: Placement::Component,
            size: PopoverSize::Medium,
            show_close_button: true,
            caret: None,
        }
    }
}

/// Top-left corner of an overlay of `width` placed with `mode`, clamped to
/// the viewport.
pub fn place(mode: Placement, state: &UiPointerState, width: f64, caret: Option<usize>) -> Point {
    let vp = state.viewport;
    let height = POPOVER_HEIGHT;
    let above = |p: Point| Point::new(p.x - width / 2.0, p.y - height - MARGIN);
    let pointer = || {
        state
            .pointer
            .map(above)
            .unwrap_or_else(|| Point::new(vp.x + (vp.width - width) / 2.0, vp.y + (vp.height - height) / 2.0))
    };

    let raw = match mode {
        Placement::Center => Point::new(vp.x + (vp.width - width) / 2.0, vp.y + (vp.height - height) / 2.0),
        Placement::Top => Point::new(vp.x + (vp.width - width) / 2.0, vp.y + EDGE_OFFSET),
        Placement::Bottom => Point::new(
            vp.x + (vp.width - width) / 2.0,
            vp.y + vp.height - height - EDGE_OFFSET,
        ),
        Placement::Mouse => pointer(),
        Placement::Cursor => match state.focused {
            Some(rect) => {
                let offset = caret
                    .map(|c| (c as f64 * CHAR_WIDTH).min(rect.width - EDGE_OFFSET))
                    .unwrap_or(0.0);
                above(Point::new(rect.x + offset + EDGE_OFFSET, rect.y))
            }
            None => pointer(),
        },
        Placement::Component => match state.focused {
            Some(rect) if rect.width > 0.0 && rect.height > 0.0 => {
                above(Point::new(rect.center().x, rect.y))
            }
            _ => pointer(),
        },
    };

    let max_x = vp.x + vp.width - width - MARGIN;
    let max_y = vp.y + vp.height - height - MARGIN;
    Point::new(
        raw.x.min(max_x).max(vp.x + MARGIN),
        raw.y.min(max_y).max(vp.y + MARGIN),
    )
}

struct ActiveOverlay {
    identity: String,
    id: OverlayId,
    ui: Arc<dyn UiHost>,
    timer: Option<CancellationToken>,
}

impl ActiveOverlay {
    fn tear_down(self) {
        if let Some(timer) = self.timer {
            timer.cancel();
        }
        self.ui.remove_overlay(self.id);
        debug!(target: "uiflow::actions::popover", identity = %self.identity, id = %self.id, "Popover removed");
    }
}

pub struct PopoverAction {
    active: Arc<Mutex<Option<ActiveOverlay>>>,
}

impl Default for PopoverAction {
    fn default() -> Self {
        Self::new()
    }
}

impl PopoverAction {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn identity(ctx: &ExecutionContext) -> String {
        format!("{}#{}", ctx.trigger_id.as_deref().unwrap_or("default"), ctx.event)
    }

    /// Identity of the visible popover, if any.
    pub fn active_identity(&self) -> Option<String> {
        self.active
            .lock()
            .as_ref()
            .filter(|a| a.ui.overlay_visible(a.id))
            .map(|a| a.identity.clone())
    }

    /// Remove the visible popover.
    pub fn dismiss(&self) {
        if let Some(active) = self.active.lock().take() {
            active.tear_down();
        }
    }

    fn schedule_close(&self, id: OverlayId, ui: Arc<dyn UiHost>, after: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let active = self.active.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    let mut slot = active.lock();
                    if slot.as_ref().is_some_and(|a| a.id == id) {
                        *slot = None;
                    }
                    drop(slot);
                    ui.remove_overlay(id);
                    debug!(target: "uiflow::actions::popover", %id, "Popover auto-closed");
                }
            }
        });
        token
    }
}

#[async_trait]
impl ActionDefinition for PopoverAction {
    fn label(&self) -> &str {
        "Popover"
    }

    fn description(&self) -> Option<&str> {
        Some("Show a popover next to the triggering component")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let identity = Self::identity(ctx);
        let config: PopoverConfig = raw_config(self.key(), ctx)?;

        let mut slot = self.active.lock();
        if let Some(current) = slot.take() {
            if current.identity == identity && current.ui.overlay_visible(current.id) {
                debug!(target: "uiflow::actions::popover", %identity, "Popover already visible, skipping");
                *slot = Some(current);
                return Ok(());
            }
            current.tear_down();
        }

        let width = config.size.width();
        let position = place(config.position, &UiPointerState::snapshot(), f64::from(width), config.caret);
        let spec = OverlaySpec {
            identity: identity.clone(),
            title: config.title.as_deref().map(|t| compile_str(t, ctx)),
            content: render(&config.content, ctx),
            position,
            width,
            closable: config.show_close_button || !config.auto_close,
        };
        let ui = ctx.host.ui.clone();
        let id = ui.show_overlay(spec)?;
        info!(target: "uiflow::actions::popover", %identity, %id, placement = ?config.position, "Popover shown");

        let timer = (config.auto_close && config.duration > 0)
            .then(|| self.schedule_close(id, ui.clone(), Duration::from_millis(config.duration)));
        *slot = Some(ActiveOverlay {
            identity,
            id,
            ui,
            timer,
        });
        Ok(())
    }
}

impl Keyed for PopoverAction {
    fn key(&self) -> &str {
        "popover"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::pointer::Rect;
    use crate::testing::{RecordingHost, test_context_with};
    use serde_json::json;

    fn state(pointer: Option<Point>, focused: Option<Rect>) -> UiPointerState {
        UiPointerState {
            pointer,
            focused,
            viewport: Rect::new(0.0, 0.0, 1000.0, 600.0),
        }
    }

    #[test]
    fn test_fixed_placements() {
        let s = state(None, None);
        assert_eq!(place(Placement::Center, &s, 200.0, None), Point::new(400.0, 275.0));
        assert_eq!(place(Placement::Top, &s, 200.0, None), Point::new(400.0, 20.0));
        assert_eq!(place(Placement::Bottom, &s, 200.0, None), Point::new(400.0, 530.0));
    }

    #[test]
    fn test_anchored_placements() {
        let field = Rect::new(100.0, 300.0, 200.0, 30.0);
        let s = state(Some(Point::new(500.0, 400.0)), Some(field));
        assert_eq!(place(Placement::Component, &s, 200.0, None), Point::new(100.0, 240.0));
        assert_eq!(place(Placement::Mouse, &s, 200.0, None), Point::new(400.0, 340.0));
        // Caret 5 chars in: 100 + 40 + 20 - 100.
        assert_eq!(place(Placement::Cursor, &s, 200.0, Some(5)), Point::new(60.0, 240.0));
    }

    #[test]
    fn test_fallbacks_and_clamping() {
        let s = state(Some(Point::new(5.0, 5.0)), None);
        assert_eq!(place(Placement::Component, &s, 200.0, None), Point::new(10.0, 10.0));
        let s = state(None, None);
        assert_eq!(place(Placement::Mouse, &s, 200.0, None), Point::new(400.0, 275.0));
    }

    fn ctx_for(host: &Arc<RecordingHost>, trigger_id: &str) -> ExecutionContext {
        let mut ctx = test_context_with(host.clone(), "onClick", json!({})).with_trigger_id(trigger_id);
        ctx.config = json!({"content": "Saved", "autoClose": false});
        ctx
    }

    #[tokio::test]
    async fn test_same_identity_is_a_no_op() {
        let host = Arc::new(RecordingHost::default());
        let action = PopoverAction::new();
        action.execute(&json!({}), &ctx_for(&host, "btn")).await.unwrap();
        action.execute(&json!({}), &ctx_for(&host, "btn")).await.unwrap();
        assert_eq!(host.overlays().len(), 1);
        assert_eq!(host.visible_overlays(), 1);
        assert_eq!(action.active_identity().as_deref(), Some("btn#onClick"));
    }

    #[tokio::test]
    async fn test_new_identity_replaces_previous() {
        let host = Arc::new(RecordingHost::default());
        let action = PopoverAction::new();
        action.execute(&json!({}), &ctx_for(&host, "a")).await.unwrap();
        action.execute(&json!({}), &ctx_for(&host, "b")).await.unwrap();
        assert_eq!(host.overlays().len(), 2);
        assert_eq!(host.visible_overlays(), 1);
        assert_eq!(action.active_identity().as_deref(), Some("b#onClick"));

        action.dismiss();
        assert_eq!(host.visible_overlays(), 0);
        assert_eq!(action.active_identity(), None);
    }

    #[tokio::test]
    async fn test_auto_close() {
        let host = Arc::new(RecordingHost::default());
        let action = PopoverAction::new();
        let mut ctx = ctx_for(&host, "t");
        ctx.config = json!({"content": "bye", "duration": 20});
        action.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(host.visible_overlays(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(host.visible_overlays(), 0);
        assert_eq!(action.active_identity(), None);

        // A closed popover can be shown again under the same identity.
        action.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(host.overlays().len(), 2);
    }
}
