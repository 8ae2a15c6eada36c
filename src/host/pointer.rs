//! Process-wide record of the last pointer position and focused input.
//!
//! Hosts feed it from their input events; overlay placement reads it. It is
//! meant for a single UI event loop: concurrent request contexts must not
//! share it.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn bottom_left(&self) -> Point {
        Point::new(self.x, self.y + self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UiPointerState {
    pub pointer: Option<Point>,
    pub focused: Option<Rect>,
    pub viewport: Rect,
}

impl Default for UiPointerState {
    fn default() -> Self {
        Self {
            pointer: None,
            focused: None,
            viewport: Rect::new(0.0, 0.0, 1280.0, 800.0),
        }
    }
}

static STATE: Lazy<Mutex<UiPointerState>> = Lazy::new(|| Mutex::new(UiPointerState::default()));

impl UiPointerState {
    pub fn record_pointer(p: Point) {
        trace!(target: "uiflow::pointer", x = p.x, y = p.y, "Pointer moved");
        STATE.lock().pointer = Some(p);
    }

    pub fn record_focus(rect: Rect) {
        trace!(target: "uiflow::pointer", ?rect, "Input focused");
        STATE.lock().focused = Some(rect);
    }

    pub fn clear_focus() {
        STATE.lock().focused = None;
    }

    pub fn set_viewport(rect: Rect) {
        STATE.lock().viewport = rect;
    }

    pub fn snapshot() -> UiPointerState {
        *STATE.lock()
    }

    pub fn reset() {
        *STATE.lock() = UiPointerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_helpers() {
        let r = Rect::new(10.0, 20.0, 100.0, 40.0);
        assert_eq!(r.center(), Point::new(60.0, 40.0));
        assert_eq!(r.bottom_left(), Point::new(10.0, 60.0));
    }

    #[test]
    fn test_default_viewport() {
        let s = UiPointerState::default();
        assert!(s.pointer.is_none());
        assert_eq!(s.viewport.width, 1280.0);
    }
}
