//! Map selection and overlay-placement engine for the property search view.
//!
//! `MapEngine` owns the entity cache, the retrying loader, the single floating
//! overlay and the camera sequencing. The rendering surface, property backend
//! and persistent store are supplied by the host through traits.

pub mod backend;
pub mod cache;
pub mod camera;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod overlay;
pub mod pending;
pub mod recent;
pub mod selection;
pub mod store;
pub mod surface;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{graphql::GraphqlBackend, PropertyBackend};
pub use cache::EntityCache;
pub use camera::{FlightOutcome, RecenterSkip};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{ClickOutcome, MapEngine, RecenterOutcome, SelectOutcome};
pub use error::{BackendError, StoreError};
pub use pending::{PendingSelection, SelectRequest};
pub use selection::{SelectionChange, SelectionState};
pub use store::{KeyValueStore, MemoryStore, RedbStore};
pub use surface::RenderSurface;

pub use propmap_shared::models::{Coordinates, DocumentCover, EntityRecord, EntityRef};
