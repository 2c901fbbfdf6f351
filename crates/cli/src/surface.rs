use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use propmap_engine::surface::{
    Anchor, CameraTarget, ListenerId, Marker, OverlayContent, OverlayHandle, PanelHandle,
    RenderSurface, ZoomListener,
};
use propmap_engine::Coordinates;
use propmap_shared::viewport::{PixelOffset, ScreenPoint, ScreenSize};

/// Web-mercator tile size in pixels at zoom 0.
const TILE_SIZE: f64 = 512.0;

/// Rendering surface with no screen: every instruction is logged and camera
/// moves complete immediately.
pub struct HeadlessSurface {
    size: ScreenSize,
    zoom: Mutex<f64>,
    next_id: AtomicU64,
    overlays: Mutex<HashMap<u64, Coordinates>>,
    panels: Mutex<HashMap<u64, String>>,
    listeners: Mutex<HashMap<u64, ZoomListener>>,
}

impl HeadlessSurface {
    pub fn new(size: ScreenSize, zoom: f64) -> Self {
        HeadlessSurface {
            size,
            zoom: Mutex::new(zoom),
            next_id: AtomicU64::new(1),
            overlays: Mutex::new(HashMap::new()),
            panels: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn set_zoom(&self, zoom: f64) {
        *self.zoom.lock().unwrap_or_else(PoisonError::into_inner) = zoom;
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.values() {
            listener(zoom);
        }
    }
}

/// World pixel position of a coordinate at `zoom`.
pub fn mercator(coordinates: Coordinates, zoom: f64) -> ScreenPoint {
    let world = TILE_SIZE * 2f64.powf(zoom);
    let sin_lat = coordinates.lat.to_radians().sin().clamp(-0.9999, 0.9999);
    ScreenPoint {
        x: (coordinates.lng + 180.0) / 360.0 * world,
        y: (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI)) * world,
    }
}

#[async_trait]
impl RenderSurface for HeadlessSurface {
    fn is_ready(&self) -> bool {
        true
    }

    fn container_size(&self) -> ScreenSize {
        self.size
    }

    fn zoom(&self) -> f64 {
        *self.zoom.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn project(&self, coordinates: Coordinates) -> ScreenPoint {
        mercator(coordinates, self.zoom())
    }

    async fn fly_to(&self, target: CameraTarget) {
        tracing::info!(
            center = %target.center,
            zoom = target.zoom,
            offset_x = target.offset.x,
            offset_y = target.offset.y,
            duration_ms = target.duration_ms,
            "fly to"
        );
        self.set_zoom(target.zoom);
    }

    fn set_markers(&self, markers: &[Marker]) {
        tracing::info!(count = markers.len(), "markers published");
    }

    fn place_overlay(
        &self,
        content: &OverlayContent,
        at: Coordinates,
        anchor: Anchor,
        _offset: PixelOffset,
    ) -> OverlayHandle {
        let handle = OverlayHandle(self.next());
        self.overlays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.0, at);
        tracing::info!(entity_id = %content.entity_id, title = %content.title, %at, ?anchor, "overlay placed");
        handle
    }

    fn move_overlay(&self, handle: OverlayHandle, at: Coordinates) -> bool {
        let mut overlays = self.overlays.lock().unwrap_or_else(PoisonError::into_inner);
        match overlays.get_mut(&handle.0) {
            Some(current) => {
                *current = at;
                tracing::info!(handle = handle.0, %at, "overlay moved");
                true
            }
            None => false,
        }
    }

    fn set_overlay_scale(&self, handle: OverlayHandle, scale: f64) -> bool {
        tracing::debug!(handle = handle.0, scale, "overlay scaled");
        self.overlays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&handle.0)
    }

    fn remove_overlay(&self, handle: OverlayHandle) -> bool {
        let removed = self
            .overlays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0)
            .is_some();
        if removed {
            tracing::info!(handle = handle.0, "overlay removed");
        }
        removed
    }

    fn open_panel(&self, entity_id: &str, at: Coordinates, offset: PixelOffset) -> PanelHandle {
        let handle = PanelHandle(self.next());
        self.panels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.0, entity_id.to_string());
        tracing::info!(entity_id, %at, offset_y = offset.y, "detail panel opened");
        handle
    }

    fn close_panel(&self, handle: PanelHandle) -> bool {
        self.panels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0)
            .is_some()
    }

    fn on_zoom(&self, listener: ZoomListener) -> ListenerId {
        let id = ListenerId(self.next());
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.0, listener);
        id
    }

    fn off(&self, id: ListenerId) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.0)
            .is_some()
    }
}
