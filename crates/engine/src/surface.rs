use async_trait::async_trait;
use propmap_shared::models::Coordinates;
use propmap_shared::viewport::{PixelOffset, ScreenPoint, ScreenSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PanelHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Called with the new zoom level whenever the map zoom changes.
pub type ZoomListener = Box<dyn Fn(f64) + Send + Sync>;

/// Which point of an overlay element sits on its coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Bottom,
    Top,
    Center,
}

/// One camera move: where to look, at which zoom, and how long to take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTarget {
    pub center: Coordinates,
    pub zoom: f64,
    pub offset: PixelOffset,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub entity_id: String,
    pub coordinates: Coordinates,
    pub label: String,
}

/// What the title overlay card shows.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayContent {
    pub entity_id: String,
    pub title: String,
    pub subtitle: Option<String>,
}

/// The map drawing surface.
///
/// The engine only issues instructions through this contract; it never reaches
/// into a particular mapping library. Removal methods return `false` when the
/// element or listener is already gone, which callers treat as a no-op.
#[async_trait]
pub trait RenderSurface: Send + Sync + 'static {
    /// Style and sources loaded; overlays and markers can be placed.
    fn is_ready(&self) -> bool;
    fn container_size(&self) -> ScreenSize;
    fn zoom(&self) -> f64;
    fn project(&self, coordinates: Coordinates) -> ScreenPoint;

    /// Animate the camera; resolves once the animation has finished.
    async fn fly_to(&self, target: CameraTarget);

    /// Replace the marker layer.
    fn set_markers(&self, markers: &[Marker]);

    fn place_overlay(
        &self,
        content: &OverlayContent,
        at: Coordinates,
        anchor: Anchor,
        offset: PixelOffset,
    ) -> OverlayHandle;
    fn move_overlay(&self, handle: OverlayHandle, at: Coordinates) -> bool;
    fn set_overlay_scale(&self, handle: OverlayHandle, scale: f64) -> bool;
    fn remove_overlay(&self, handle: OverlayHandle) -> bool;

    fn open_panel(&self, entity_id: &str, at: Coordinates, offset: PixelOffset) -> PanelHandle;
    fn close_panel(&self, handle: PanelHandle) -> bool;

    fn on_zoom(&self, listener: ZoomListener) -> ListenerId;
    fn off(&self, id: ListenerId) -> bool;
}
