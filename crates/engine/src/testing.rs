//! Recording fakes for the engine's collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use propmap_shared::models::Coordinates;
use propmap_shared::viewport::{PixelOffset, ScreenPoint, ScreenSize};
use serde_json::Value;

use crate::backend::PropertyBackend;
use crate::error::BackendError;
use crate::surface::{
    Anchor, CameraTarget, ListenerId, Marker, OverlayContent, OverlayHandle, PanelHandle,
    RenderSurface, ZoomListener,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    FlyTo(CameraTarget),
    SetMarkers(Vec<String>),
    PlaceOverlay { handle: OverlayHandle, entity_id: String, at: Coordinates },
    MoveOverlay { handle: OverlayHandle, at: Coordinates },
    SetScale { handle: OverlayHandle, scale: f64 },
    RemoveOverlay(OverlayHandle),
    OpenPanel { handle: PanelHandle, entity_id: String, offset: PixelOffset },
    ClosePanel(PanelHandle),
    OnZoom(ListenerId),
    Off(ListenerId),
}

/// Pixels per degree used by `FakeSurface::project`.
pub const PX_PER_DEGREE: f64 = 10_000.0;

pub struct FakeSurface {
    ready: AtomicBool,
    size: ScreenSize,
    zoom: Mutex<f64>,
    next_id: AtomicU64,
    calls: Mutex<Vec<SurfaceCall>>,
    overlays: Mutex<HashSet<u64>>,
    panels: Mutex<HashSet<u64>>,
    listeners: Mutex<HashMap<u64, Arc<dyn Fn(f64) + Send + Sync>>>,
}

impl FakeSurface {
    pub fn new(ready: bool) -> Self {
        FakeSurface {
            ready: AtomicBool::new(ready),
            size: ScreenSize {
                width: 1200.0,
                height: 800.0,
            },
            zoom: Mutex::new(12.0),
            next_id: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
            overlays: Mutex::new(HashSet::new()),
            panels: Mutex::new(HashSet::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fly_to_calls(&self) -> Vec<CameraTarget> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::FlyTo(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn placed_overlays(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::PlaceOverlay { entity_id, .. } => Some(entity_id),
                _ => None,
            })
            .collect()
    }

    pub fn live_overlays(&self) -> usize {
        self.overlays.lock().unwrap().len()
    }

    pub fn live_panels(&self) -> usize {
        self.panels.lock().unwrap().len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Change the zoom and notify listeners, as a user scroll would.
    pub fn fire_zoom(&self, zoom: f64) {
        *self.zoom.lock().unwrap() = zoom;
        let listeners: Vec<_> = self.listeners.lock().unwrap().values().cloned().collect();
        for listener in listeners {
            listener(zoom);
        }
    }
}

#[async_trait]
impl RenderSurface for FakeSurface {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn container_size(&self) -> ScreenSize {
        self.size
    }

    fn zoom(&self) -> f64 {
        *self.zoom.lock().unwrap()
    }

    fn project(&self, coordinates: Coordinates) -> ScreenPoint {
        ScreenPoint {
            x: coordinates.lng * PX_PER_DEGREE,
            y: -coordinates.lat * PX_PER_DEGREE,
        }
    }

    async fn fly_to(&self, target: CameraTarget) {
        self.record(SurfaceCall::FlyTo(target));
        tokio::time::sleep(Duration::from_millis(target.duration_ms)).await;
        *self.zoom.lock().unwrap() = target.zoom;
    }

    fn set_markers(&self, markers: &[Marker]) {
        self.record(SurfaceCall::SetMarkers(
            markers.iter().map(|m| m.entity_id.clone()).collect(),
        ));
    }

    fn place_overlay(
        &self,
        content: &OverlayContent,
        at: Coordinates,
        _anchor: Anchor,
        _offset: PixelOffset,
    ) -> OverlayHandle {
        let handle = OverlayHandle(self.next());
        self.overlays.lock().unwrap().insert(handle.0);
        self.record(SurfaceCall::PlaceOverlay {
            handle,
            entity_id: content.entity_id.clone(),
            at,
        });
        handle
    }

    fn move_overlay(&self, handle: OverlayHandle, at: Coordinates) -> bool {
        self.record(SurfaceCall::MoveOverlay { handle, at });
        self.overlays.lock().unwrap().contains(&handle.0)
    }

    fn set_overlay_scale(&self, handle: OverlayHandle, scale: f64) -> bool {
        self.record(SurfaceCall::SetScale { handle, scale });
        self.overlays.lock().unwrap().contains(&handle.0)
    }

    fn remove_overlay(&self, handle: OverlayHandle) -> bool {
        self.record(SurfaceCall::RemoveOverlay(handle));
        self.overlays.lock().unwrap().remove(&handle.0)
    }

    fn open_panel(&self, entity_id: &str, _at: Coordinates, offset: PixelOffset) -> PanelHandle {
        let handle = PanelHandle(self.next());
        self.panels.lock().unwrap().insert(handle.0);
        self.record(SurfaceCall::OpenPanel {
            handle,
            entity_id: entity_id.to_string(),
            offset,
        });
        handle
    }

    fn close_panel(&self, handle: PanelHandle) -> bool {
        self.record(SurfaceCall::ClosePanel(handle));
        self.panels.lock().unwrap().remove(&handle.0)
    }

    fn on_zoom(&self, listener: ZoomListener) -> ListenerId {
        let id = ListenerId(self.next());
        self.listeners.lock().unwrap().insert(id.0, Arc::from(listener));
        self.record(SurfaceCall::OnZoom(id));
        id
    }

    fn off(&self, id: ListenerId) -> bool {
        self.record(SurfaceCall::Off(id));
        self.listeners.lock().unwrap().remove(&id.0).is_some()
    }
}

/// Scripted property service.
pub struct FakeBackend {
    entities: Mutex<Result<Value, String>>,
    details: Mutex<HashMap<String, Value>>,
    documents: Mutex<HashMap<String, Value>>,
    list_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    document_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(entities: Value) -> Self {
        FakeBackend {
            entities: Mutex::new(Ok(entities)),
            details: Mutex::new(HashMap::new()),
            documents: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            document_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        let backend = FakeBackend::new(Value::Null);
        *backend.entities.lock().unwrap() = Err(message.to_string());
        backend
    }

    pub fn set_entities(&self, entities: Value) {
        *self.entities.lock().unwrap() = Ok(entities);
    }

    pub fn set_detail(&self, id: &str, detail: Value) {
        self.details.lock().unwrap().insert(id.to_string(), detail);
    }

    pub fn set_documents(&self, id: &str, documents: Value) {
        self.documents.lock().unwrap().insert(id.to_string(), documents);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn document_calls(&self) -> usize {
        self.document_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PropertyBackend for FakeBackend {
    async fn get_all_entities(&self) -> Result<Value, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.entities
            .lock()
            .unwrap()
            .clone()
            .map_err(BackendError::Unavailable)
    }

    async fn get_entity_detail(&self, id: &str) -> Result<Value, BackendError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.details.lock().unwrap().get(id).cloned().unwrap_or(Value::Null))
    }

    async fn get_documents(&self, id: &str) -> Result<Value, BackendError> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.documents.lock().unwrap().get(id).cloned().unwrap_or(Value::Null))
    }
}

/// JSON for one entity as the property service would send it.
pub fn entity_json(id: &str, lat: f64, lng: f64) -> Value {
    serde_json::json!({
        "id": id,
        "displayName": format!("Property {}", id),
        "lat": lat,
        "lng": lng,
        "documentCount": 2
    })
}
