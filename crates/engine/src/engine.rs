use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use propmap_shared::models::{Coordinates, DocumentCover, EntityRecord};
use propmap_shared::viewport::{ScreenPoint, Viewport};
use tokio::sync::broadcast;

use crate::backend::PropertyBackend;
use crate::cache::EntityCache;
use crate::camera::{CameraSequencer, FlightOutcome, RecenterGate, RecenterSkip};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::loader::{Loader, Lookup, Readiness};
use crate::overlay::OverlayManager;
use crate::pending::{PendingSelection, PendingSlot, SelectRequest};
use crate::recent::RecentSelections;
use crate::selection::{next, ClickGuard, SelectionChange, SelectionEvent, SelectionState, Transition};
use crate::store::KeyValueStore;
use crate::surface::{Marker, RenderSurface};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Camera arrived and the title overlay is mounted.
    Shown(String),
    /// Navigation-only request: the camera moved, nothing was selected.
    Navigated(String),
    AlreadySelected,
    /// The click toggled the current selection off.
    Deselected,
    /// The surface was not ready; the request waits as the pending selection.
    Deferred,
    NotFound,
    /// A newer request or a deselect took over before this one finished.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    DetailOpened,
    Deselected,
    /// Outside click swallowed by the guard window after an overlay or marker click.
    Suppressed,
    /// The click landed on the overlay card and is not an outside click.
    OverlayHit,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecenterOutcome {
    Animated,
    Skipped(RecenterSkip),
    NothingSelected,
    Unchanged,
}

struct Inner<S, K> {
    selection: SelectionState,
    /// Bumped by every new select request and every deselect. Async work
    /// started under an older generation must not touch the selection.
    generation: u64,
    guard: ClickGuard,
    pending: PendingSlot,
    overlay: OverlayManager<S>,
    gate: RecenterGate,
    side_panel_width: f64,
    sidebar_width: f64,
    markers: Vec<Marker>,
    recents: RecentSelections<K>,
}

/// Coordinates selection, overlay and camera for the map view.
///
/// The engine is the only writer of the selection and the mounted overlay.
/// All state lives behind one lock that is never held across an await; each
/// async step re-checks the generation before acting on what it found.
pub struct MapEngine<B, S, K, C> {
    surface: Arc<S>,
    clock: Arc<C>,
    cache: Arc<EntityCache<K, C>>,
    loader: Loader<B, S, K, C>,
    camera: CameraSequencer<S>,
    config: EngineConfig,
    inner: Mutex<Inner<S, K>>,
    changes: broadcast::Sender<SelectionChange>,
}

impl<B, S, K, C> MapEngine<B, S, K, C>
where
    B: PropertyBackend,
    S: RenderSurface,
    K: KeyValueStore,
    C: Clock,
{
    pub fn new(backend: Arc<B>, surface: Arc<S>, store: Arc<K>, clock: Arc<C>, config: EngineConfig) -> Self {
        let cache = Arc::new(EntityCache::new(store.clone(), clock.clone(), config.entity_ttl_ms));
        let loader = Loader::new(backend, surface.clone(), cache.clone(), config.clone());
        let camera = CameraSequencer::new(surface.clone(), config.clone());
        let inner = Inner {
            selection: SelectionState::Idle,
            generation: 0,
            guard: ClickGuard::default(),
            pending: PendingSlot::default(),
            overlay: OverlayManager::new(surface.clone(), &config),
            gate: RecenterGate::default(),
            side_panel_width: 0.0,
            sidebar_width: 0.0,
            markers: Vec::new(),
            recents: RecentSelections::load(store, config.recent_capacity),
        };
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        MapEngine {
            surface,
            clock,
            cache,
            loader,
            camera,
            config,
            inner: Mutex::new(inner),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S, K>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    fn set_state(&self, inner: &mut Inner<S, K>, to: SelectionState) {
        if inner.selection == to {
            return;
        }
        let from = std::mem::replace(&mut inner.selection, to.clone());
        tracing::info!(%from, %to, generation = inner.generation, "selection changed");
        // no subscribers is fine
        let _ = self.changes.send(SelectionChange {
            from,
            to,
            generation: inner.generation,
        });
    }

    fn viewport(&self, inner: &Inner<S, K>) -> Viewport {
        Viewport::new(self.surface.container_size(), inner.side_panel_width, inner.sidebar_width)
    }

    pub fn state(&self) -> SelectionState {
        self.lock().selection.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SelectionChange> {
        self.changes.subscribe()
    }

    /// Load every entity, publish the placeable ones as markers and replay a
    /// deferred selection if the surface is ready for it.
    pub async fn load_entities(&self) -> Vec<EntityRecord> {
        let records = self.loader.load_all().await;
        let markers: Vec<Marker> = records
            .iter()
            .filter_map(|r| {
                Some(Marker {
                    entity_id: r.id.clone(),
                    coordinates: r.placeable_coordinates()?,
                    label: r.title().to_string(),
                })
            })
            .collect();
        if markers.len() < records.len() {
            tracing::debug!(skipped = records.len() - markers.len(), "entities without coordinates left off the map");
        }
        self.lock().markers = markers.clone();

        if self.surface.is_ready() {
            self.surface.set_markers(&markers);
            self.replay_pending().await;
        }
        records
    }

    /// The host reports that the surface finished initialising.
    pub async fn surface_ready(&self) -> Option<SelectOutcome> {
        let markers = self.lock().markers.clone();
        if !markers.is_empty() {
            self.surface.set_markers(&markers);
        }
        self.replay_pending().await
    }

    async fn replay_pending(&self) -> Option<SelectOutcome> {
        let request = self
            .lock()
            .pending
            .take(self.clock.now_ms(), self.config.pending_max_age_ms)?;
        tracing::info!(entity = %request.target, "replaying deferred selection");
        Some(self.select_entity(request).await)
    }

    /// Select an entity, whatever asked for it: pin, recents, search or deep link.
    ///
    /// Waits for the surface, resolves the entity (cache, placeholder or
    /// bounded lookup), tears down the previous selection, flies the camera
    /// and only then mounts the title overlay.
    pub async fn select_entity(&self, request: SelectRequest) -> SelectOutcome {
        let generation = {
            let mut inner = self.lock();
            if let Some(id) = request.target.id() {
                if !request.navigation_only
                    && next(&inner.selection, SelectionEvent::Programmatic(id)) == Transition::Stay
                {
                    return SelectOutcome::AlreadySelected;
                }
            }
            inner.generation += 1;
            inner.pending.clear();
            inner.generation
        };
        let still_current = || self.is_current(generation);
        tracing::debug!(entity = %request.target, generation, "select requested");

        match self.loader.wait_until_ready(&still_current).await {
            Readiness::Ready => {}
            Readiness::Superseded => return SelectOutcome::Superseded,
            Readiness::NotReady => {
                let mut inner = self.lock();
                if inner.generation != generation {
                    return SelectOutcome::Superseded;
                }
                tracing::warn!(entity = %request.target, "surface not ready, deferring selection");
                inner.pending.record(request, self.clock.now_ms());
                return SelectOutcome::Deferred;
            }
        }

        let (record, mut provisional) = match (self.cache.find(&request.target), request.target.id(), request.coordinates) {
            (Some(record), _, _) => (record, false),
            (None, Some(id), Some(hint)) => {
                let coordinates = self.cache.confirmed(id).unwrap_or(hint);
                (EntityRecord::placeholder(id, coordinates), true)
            }
            (None, _, _) => match self.loader.find(&request.target, &still_current).await {
                Lookup::Found(record) => (record, false),
                Lookup::Superseded => return SelectOutcome::Superseded,
                Lookup::NotFound => {
                    tracing::info!(entity = %request.target, "entity not found, nothing to select");
                    return SelectOutcome::NotFound;
                }
            },
        };
        let coordinates = match (record.placeable_coordinates(), request.coordinates) {
            (Some(known), _) => known,
            (None, Some(hint)) => {
                provisional = true;
                hint
            }
            (None, None) => {
                tracing::info!(entity_id = %record.id, "entity has no usable coordinates");
                return SelectOutcome::NotFound;
            }
        };
        let id = record.id.clone();

        let viewport = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return SelectOutcome::Superseded;
            }
            inner.overlay.teardown();
            self.set_state(&mut inner, SelectionState::Idle);
            if !request.navigation_only {
                self.set_state(&mut inner, SelectionState::TitleShown(id.clone()));
                inner.recents.record(&id);
            }
            inner.gate.begin_flight(generation);
            self.viewport(&inner)
        };

        let flight = self.camera.fly_to_entity(coordinates, &viewport, &still_current).await;

        {
            let mut inner = self.lock();
            inner.gate.end_flight(generation);
            if flight == FlightOutcome::Superseded || inner.generation != generation {
                return SelectOutcome::Superseded;
            }
            if request.navigation_only {
                return SelectOutcome::Navigated(id);
            }
            inner.overlay.mount(&record, coordinates);
        }

        if provisional {
            self.refine(&id, generation).await;
        }
        SelectOutcome::Shown(id)
    }

    /// Fetch the full record behind a placeholder and move the overlay if the
    /// canonical coordinates differ.
    async fn refine(&self, id: &str, generation: u64) {
        let Some(record) = self.loader.fetch_detail(id).await else {
            return;
        };
        let Some(coordinates) = record.placeable_coordinates() else {
            return;
        };
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        if inner.overlay.reposition(id, coordinates) {
            tracing::info!(entity_id = %id, %coordinates, "placeholder refined");
        }
        if let Some(marker) = inner
            .markers
            .iter_mut()
            .find(|m| m.entity_id == id && m.coordinates != coordinates)
        {
            marker.coordinates = coordinates;
            self.surface.set_markers(&inner.markers);
        }
    }

    /// A marker was clicked.
    pub async fn pin_click(&self, id: &str) -> SelectOutcome {
        let (transition, known) = {
            let mut inner = self.lock();
            inner.guard.arm(self.clock.now_ms());
            let known = inner
                .markers
                .iter()
                .find(|m| m.entity_id == id)
                .map(|m| m.coordinates);
            (next(&inner.selection, SelectionEvent::PinClick(id)), known)
        };

        match transition {
            Transition::Deselect => {
                self.deselect();
                SelectOutcome::Deselected
            }
            Transition::Select(id) => {
                let mut request = SelectRequest::id(id);
                if let Some(coordinates) = known {
                    request = request.with_coordinates(coordinates);
                }
                self.select_entity(request).await
            }
            Transition::Stay | Transition::OpenDetail(_) => SelectOutcome::AlreadySelected,
        }
    }

    /// The title overlay was clicked: open the detail panel above it and warm
    /// the entity's documents.
    pub async fn overlay_click(&self) -> ClickOutcome {
        let id = {
            let mut inner = self.lock();
            inner.guard.arm(self.clock.now_ms());
            match next(&inner.selection, SelectionEvent::OverlayClick) {
                Transition::OpenDetail(id) => {
                    if inner.overlay.open_panel(&id).is_none() {
                        // camera still flying, no card to open from yet
                        return ClickOutcome::Ignored;
                    }
                    self.set_state(&mut inner, SelectionState::DetailOpen(id.clone()));
                    id
                }
                _ if !inner.selection.is_idle() => return ClickOutcome::OverlayHit,
                _ => return ClickOutcome::Ignored,
            }
        };

        let documents = self.loader.documents(&id).await;
        tracing::debug!(entity_id = %id, count = documents.len(), "documents warmed");
        ClickOutcome::DetailOpened
    }

    /// A click on the map itself. `point` is where it landed, when known.
    pub fn map_click(&self, point: Option<ScreenPoint>) -> ClickOutcome {
        let mut inner = self.lock();
        if point.is_some_and(|p| inner.overlay.contains_point(p)) {
            return ClickOutcome::OverlayHit;
        }
        if inner.guard.suppresses(self.clock.now_ms(), self.config.click_guard_ms) {
            tracing::debug!("outside click suppressed");
            return ClickOutcome::Suppressed;
        }
        match next(&inner.selection, SelectionEvent::OutsideClick) {
            Transition::Deselect => {
                self.deselect_locked(&mut inner);
                ClickOutcome::Deselected
            }
            _ => ClickOutcome::Ignored,
        }
    }

    /// Close the detail panel, ending the selection. Returns whether anything closed.
    pub fn close_detail(&self) -> bool {
        let mut inner = self.lock();
        match next(&inner.selection, SelectionEvent::ExplicitClose) {
            Transition::Deselect => {
                self.deselect_locked(&mut inner);
                true
            }
            _ => false,
        }
    }

    /// Drop the current selection and cancel any selection still in progress.
    pub fn deselect(&self) {
        let mut inner = self.lock();
        self.deselect_locked(&mut inner);
    }

    fn deselect_locked(&self, inner: &mut Inner<S, K>) {
        inner.generation += 1;
        inner.pending.clear();
        inner.overlay.teardown();
        self.set_state(inner, SelectionState::Idle);
    }

    /// The side panel or sidebar changed width: keep the selection centred
    /// in the visible area with one short, debounced move.
    pub async fn resize_panels(&self, side_panel_width: f64, sidebar_width: f64) -> RecenterOutcome {
        let (coordinates, viewport) = {
            let mut inner = self.lock();
            if inner.side_panel_width == side_panel_width && inner.sidebar_width == sidebar_width {
                return RecenterOutcome::Unchanged;
            }
            inner.side_panel_width = side_panel_width;
            inner.sidebar_width = sidebar_width;

            if inner.selection.is_idle() {
                return RecenterOutcome::NothingSelected;
            }
            if inner.gate.in_flight() {
                tracing::debug!("recenter skipped, flight in progress");
                return RecenterOutcome::Skipped(RecenterSkip::InFlight);
            }
            let Some(coordinates) = inner.overlay.mounted_coordinates() else {
                return RecenterOutcome::NothingSelected;
            };
            if let Err(skip) = inner.gate.try_recenter(self.clock.now_ms(), self.config.recenter_debounce_ms) {
                tracing::debug!(?skip, "recenter skipped");
                return RecenterOutcome::Skipped(skip);
            }
            (coordinates, self.viewport(&inner))
        };

        tracing::debug!(side_panel_width, sidebar_width, "recentering selection");
        self.camera.recenter(coordinates, &viewport).await;
        RecenterOutcome::Animated
    }

    /// The map style reloaded: custom layers are gone, the overlay is not.
    pub fn style_changed(&self) {
        let inner = self.lock();
        self.surface.set_markers(&inner.markers);
        inner.overlay.rescale(self.surface.zoom());
    }

    /// Pin the user-confirmed location of an entity and move its pin and
    /// overlay there.
    pub fn confirm_location(&self, id: &str, coordinates: Coordinates) -> bool {
        if !coordinates.is_valid() {
            tracing::warn!(entity_id = %id, %coordinates, "refusing invalid confirmed location");
            return false;
        }
        self.cache.confirm_location(id, coordinates);

        let mut inner = self.lock();
        inner.overlay.reposition(id, coordinates);
        if let Some(marker) = inner.markers.iter_mut().find(|m| m.entity_id == id) {
            marker.coordinates = coordinates;
            self.surface.set_markers(&inner.markers);
        }
        true
    }

    pub async fn documents(&self, id: &str) -> Vec<DocumentCover> {
        self.loader.documents(id).await
    }

    /// Recently selected entity ids, newest first.
    pub fn recent(&self) -> Vec<String> {
        self.lock().recents.list()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn overlay_count(&self) -> usize {
        self.lock().overlay.overlay_count()
    }

    pub fn pending(&self) -> Option<PendingSelection> {
        self.lock().pending.peek().cloned()
    }
}
