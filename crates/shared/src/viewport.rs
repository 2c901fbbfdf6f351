//! Viewport geometry for the map view.
//!
//! The map container is partly covered on the left by the chat side panel and
//! the sidebar. Everything here is pure arithmetic in CSS pixels.

use serde::{Deserialize, Serialize};

/// Overlay scale never drops below this, however far the map is zoomed out.
pub const MIN_OVERLAY_SCALE: f64 = 0.05;
/// Overlay scale never exceeds this, however far the map is zoomed in.
pub const MAX_OVERLAY_SCALE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Pixel offset applied to a camera target or an anchored element.
/// Positive `y` moves the target down the screen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelOffset {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub container: ScreenSize,
    pub side_panel_width: f64,
    pub sidebar_width: f64,
}

impl Viewport {
    pub fn new(container: ScreenSize, side_panel_width: f64, sidebar_width: f64) -> Self {
        Viewport {
            container,
            side_panel_width,
            sidebar_width,
        }
    }

    /// Left edge of the unobstructed map area, clamped to the container.
    pub fn left_edge(&self) -> f64 {
        let edge = self.side_panel_width.max(0.0) + self.sidebar_width.max(0.0);
        edge.clamp(0.0, self.container.width.max(0.0))
    }

    pub fn visible_width(&self) -> f64 {
        (self.container.width - self.left_edge()).max(0.0)
    }

    /// Horizontal shift that lands a target in the middle of the visible area
    /// instead of the middle of the whole container.
    pub fn horizontal_offset(&self) -> f64 {
        let container_center = self.container.width / 2.0;
        (self.left_edge() + self.visible_width() / 2.0) - container_center
    }
}

/// Vertical shift that centres the pin together with the overlay card sitting
/// above it: the pin drops by half the card height.
pub fn vertical_offset(overlay_height: f64) -> f64 {
    overlay_height.max(0.0) / 2.0
}

/// Full camera offset for flying to an entity.
pub fn camera_offset(viewport: &Viewport, overlay_height: f64) -> PixelOffset {
    PixelOffset {
        x: viewport.horizontal_offset(),
        y: vertical_offset(overlay_height),
    }
}

/// Overlay scale that keeps a constant geographic footprint:
/// `2^(current - reference)` clamped to `[min, max]`.
pub fn overlay_scale(current_zoom: f64, reference_zoom: f64, min: f64, max: f64) -> f64 {
    let raw = 2f64.powf(current_zoom - reference_zoom);
    if raw.is_nan() {
        return 1.0f64.clamp(min, max);
    }
    raw.clamp(min, max)
}

/// Offset of the detail panel relative to the title overlay's anchor: directly
/// above the card, separated by `gap`.
pub fn panel_offset(overlay_height: f64, scale: f64, gap: f64) -> PixelOffset {
    PixelOffset {
        x: 0.0,
        y: -(overlay_height * scale + gap),
    }
}

/// Whether `point` falls inside a card of `size` (already scaled) whose
/// bottom-centre sits on `anchor`.
pub fn card_contains(anchor: ScreenPoint, size: ScreenSize, point: ScreenPoint) -> bool {
    let half_w = size.width / 2.0;
    point.x >= anchor.x - half_w
        && point.x <= anchor.x + half_w
        && point.y >= anchor.y - size.height
        && point.y <= anchor.y
}
