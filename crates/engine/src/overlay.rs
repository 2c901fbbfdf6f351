use std::sync::{Arc, Weak};

use propmap_shared::models::{Coordinates, EntityRecord};
use propmap_shared::viewport::{self, PixelOffset, ScreenPoint, ScreenSize};

use crate::config::EngineConfig;
use crate::surface::{Anchor, ListenerId, OverlayContent, OverlayHandle, PanelHandle, RenderSurface};

#[derive(Debug, Clone, PartialEq)]
struct MountedOverlay {
    handle: OverlayHandle,
    entity_id: String,
    coordinates: Coordinates,
    /// Zoom at mount time; the overlay is drawn at scale 1 there.
    reference_zoom: f64,
    listener: ListenerId,
}

#[derive(Debug, Clone, PartialEq)]
struct OpenPanel {
    handle: PanelHandle,
    entity_id: String,
    /// Offset from the overlay anchor the surface placed the panel at.
    offset: PixelOffset,
}

/// Owns the single title overlay and the detail panel stacked above it.
///
/// Only acts when told to. Mounting always tears down the previous overlay,
/// panel and zoom listener first, so there is never more than one overlay.
pub struct OverlayManager<S> {
    surface: Arc<S>,
    card: ScreenSize,
    panel: ScreenSize,
    panel_gap: f64,
    min_scale: f64,
    max_scale: f64,
    mounted: Option<MountedOverlay>,
    open: Option<OpenPanel>,
}

impl<S: RenderSurface> OverlayManager<S> {
    pub fn new(surface: Arc<S>, config: &EngineConfig) -> Self {
        OverlayManager {
            surface,
            card: ScreenSize {
                width: config.overlay_width_px,
                height: config.overlay_height_px,
            },
            panel: ScreenSize {
                width: config.detail_panel_width_px,
                height: config.detail_panel_height_px,
            },
            panel_gap: config.detail_panel_gap_px,
            min_scale: config.min_overlay_scale,
            max_scale: config.max_overlay_scale,
            mounted: None,
            open: None,
        }
    }

    /// Mount the title overlay for `record` at `coordinates`.
    pub fn mount(&mut self, record: &EntityRecord, coordinates: Coordinates) -> OverlayHandle {
        self.teardown();

        let content = OverlayContent {
            entity_id: record.id.clone(),
            title: record.title().to_string(),
            subtitle: record.address.clone(),
        };
        let handle = self
            .surface
            .place_overlay(&content, coordinates, Anchor::Bottom, PixelOffset::default());
        let reference_zoom = self.surface.zoom();
        self.surface.set_overlay_scale(handle, 1.0);

        let weak: Weak<S> = Arc::downgrade(&self.surface);
        let (min, max) = (self.min_scale, self.max_scale);
        let listener = self.surface.on_zoom(Box::new(move |zoom| {
            if let Some(surface) = weak.upgrade() {
                let scale = viewport::overlay_scale(zoom, reference_zoom, min, max);
                surface.set_overlay_scale(handle, scale);
            }
        }));

        tracing::debug!(entity_id = %record.id, handle = handle.0, "overlay mounted");
        self.mounted = Some(MountedOverlay {
            handle,
            entity_id: record.id.clone(),
            coordinates,
            reference_zoom,
            listener,
        });
        handle
    }

    /// Move the mounted overlay to refined coordinates without remounting.
    pub fn reposition(&mut self, entity_id: &str, coordinates: Coordinates) -> bool {
        let Some(mounted) = self.mounted.as_mut().filter(|m| m.entity_id == entity_id) else {
            return false;
        };
        if mounted.coordinates == coordinates {
            return false;
        }
        mounted.coordinates = coordinates;
        let moved = self.surface.move_overlay(mounted.handle, coordinates);
        tracing::debug!(entity_id = %entity_id, %coordinates, moved, "overlay repositioned");
        moved
    }

    /// Apply the scale for `current_zoom` to the mounted overlay.
    pub fn rescale(&self, current_zoom: f64) -> Option<f64> {
        let mounted = self.mounted.as_ref()?;
        let scale = self.scale_at(mounted, current_zoom);
        self.surface.set_overlay_scale(mounted.handle, scale);
        Some(scale)
    }

    fn scale_at(&self, mounted: &MountedOverlay, zoom: f64) -> f64 {
        viewport::overlay_scale(zoom, mounted.reference_zoom, self.min_scale, self.max_scale)
    }

    /// Remove the overlay and its zoom listener. Safe to call repeatedly.
    pub fn unmount(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            if !self.surface.off(mounted.listener) {
                tracing::debug!(listener = mounted.listener.0, "zoom listener already removed");
            }
            if !self.surface.remove_overlay(mounted.handle) {
                tracing::debug!(handle = mounted.handle.0, "overlay already detached");
            }
            tracing::debug!(entity_id = %mounted.entity_id, "overlay unmounted");
        }
    }

    /// Close the panel, then unmount the overlay.
    pub fn teardown(&mut self) {
        self.close_panel();
        self.unmount();
    }

    /// Open the detail panel above the mounted overlay. Requires the overlay
    /// for the same entity to be mounted.
    pub fn open_panel(&mut self, entity_id: &str) -> Option<PanelHandle> {
        let mounted = self.mounted.as_ref().filter(|m| m.entity_id == entity_id)?;
        if let Some(panel) = self.open.as_ref().filter(|p| p.entity_id == entity_id) {
            return Some(panel.handle);
        }
        let scale = self.scale_at(mounted, self.surface.zoom());
        let offset = viewport::panel_offset(self.card.height, scale, self.panel_gap);
        let coordinates = mounted.coordinates;
        self.close_panel();
        let handle = self.surface.open_panel(entity_id, coordinates, offset);
        self.open = Some(OpenPanel {
            handle,
            entity_id: entity_id.to_string(),
            offset,
        });
        Some(handle)
    }

    pub fn close_panel(&mut self) {
        if let Some(panel) = self.open.take() {
            if !self.surface.close_panel(panel.handle) {
                tracing::debug!(handle = panel.handle.0, "detail panel already closed");
            }
        }
    }

    pub fn mounted_entity(&self) -> Option<&str> {
        self.mounted.as_ref().map(|m| m.entity_id.as_str())
    }

    pub fn mounted_coordinates(&self) -> Option<Coordinates> {
        self.mounted.as_ref().map(|m| m.coordinates)
    }

    pub fn panel_open(&self) -> bool {
        self.open.is_some()
    }

    /// Whether a screen point falls on overlay content: the card at its
    /// current scale, or the detail panel stacked above it.
    pub fn contains_point(&self, point: ScreenPoint) -> bool {
        let Some(mounted) = self.mounted.as_ref() else {
            return false;
        };
        let scale = self.scale_at(mounted, self.surface.zoom());
        let size = ScreenSize {
            width: self.card.width * scale,
            height: self.card.height * scale,
        };
        let anchor = self.surface.project(mounted.coordinates);
        if viewport::card_contains(anchor, size, point) {
            return true;
        }
        self.open.as_ref().is_some_and(|panel| {
            let panel_anchor = ScreenPoint {
                x: anchor.x + panel.offset.x,
                y: anchor.y + panel.offset.y,
            };
            viewport::card_contains(panel_anchor, self.panel, point)
        })
    }

    pub fn overlay_count(&self) -> usize {
        usize::from(self.mounted.is_some())
    }
}
