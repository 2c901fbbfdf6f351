use std::sync::Arc;
use std::time::Duration;

use propmap_shared::models::{parse_documents, parse_entity, parse_entity_list, DocumentCover, EntityRecord, EntityRef};

use crate::backend::PropertyBackend;
use crate::cache::EntityCache;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::store::KeyValueStore;
use crate::surface::RenderSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
    /// The request that was waiting has been replaced by a newer one.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(EntityRecord),
    NotFound,
    Superseded,
}

/// Fetches entities from the backend, preferring the cache, and absorbs the
/// "not ready yet" conditions with bounded retries.
pub struct Loader<B, S, K, C> {
    backend: Arc<B>,
    surface: Arc<S>,
    cache: Arc<EntityCache<K, C>>,
    config: EngineConfig,
}

impl<B, S, K, C> Loader<B, S, K, C>
where
    B: PropertyBackend,
    S: RenderSurface,
    K: KeyValueStore,
    C: Clock,
{
    pub fn new(backend: Arc<B>, surface: Arc<S>, cache: Arc<EntityCache<K, C>>, config: EngineConfig) -> Self {
        Loader {
            backend,
            surface,
            cache,
            config,
        }
    }

    /// All entities, from the cache when the last load is fresh and fully
    /// placeable, otherwise from the backend.
    ///
    /// Never fails: a backend error or a surface that never becomes ready
    /// degrades to whatever fresh records the cache holds, or nothing.
    pub async fn load_all(&self) -> Vec<EntityRecord> {
        if let Some(cached) = self.cache.all() {
            if !cached.is_empty() && cached.iter().all(EntityRecord::is_placeable) {
                tracing::debug!(count = cached.len(), "serving entities from cache");
                return cached;
            }
        }

        if self.wait_until_ready(|| true).await != Readiness::Ready {
            tracing::warn!(
                attempts = self.config.surface_retry_attempts,
                "map surface never became ready, abandoning entity load"
            );
            return self.cache.all().unwrap_or_default();
        }

        match self.backend.get_all_entities().await {
            Ok(payload) => {
                if !payload.is_array() {
                    tracing::warn!("entity list payload was not an array, treating as empty");
                }
                let records = parse_entity_list(&payload);
                tracing::info!(count = records.len(), "loaded entities from backend");
                self.cache.put_all(records)
            }
            Err(e) => {
                tracing::warn!(error = %e, "entity load failed");
                self.cache.all().unwrap_or_default()
            }
        }
    }

    /// Poll surface readiness with linear, capped backoff. `still_current` is
    /// checked before every wait so an abandoned request stops early.
    pub async fn wait_until_ready(&self, still_current: impl Fn() -> bool) -> Readiness {
        let attempts = self.config.surface_retry_attempts;
        for attempt in 0..=attempts {
            if self.surface.is_ready() {
                return Readiness::Ready;
            }
            if attempt == attempts {
                break;
            }
            if !still_current() {
                return Readiness::Superseded;
            }
            let delay = self.config.retry_delay(attempt);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "surface not ready, retrying");
            tokio::time::sleep(delay).await;
        }
        Readiness::NotReady
    }

    /// Resolve an entity, waiting for a bulk load in flight to deliver it.
    ///
    /// An explicit id gets one direct detail fetch and the larger polling
    /// budget; a free-text address only polls the cache, with the smaller one.
    pub async fn find(&self, entity: &EntityRef, still_current: impl Fn() -> bool) -> Lookup {
        let attempts = match entity {
            EntityRef::Id(_) => self.config.lookup_attempts_by_id,
            EntityRef::Address(_) => self.config.lookup_attempts_by_address,
        };
        let interval = Duration::from_millis(self.config.lookup_interval_ms);

        for attempt in 0..attempts.max(1) {
            if !still_current() {
                return Lookup::Superseded;
            }
            if let Some(record) = self.cache.find(entity) {
                return Lookup::Found(record);
            }
            if attempt == 0 {
                if let EntityRef::Id(id) = entity {
                    if let Some(record) = self.fetch_detail(id).await {
                        return if still_current() {
                            Lookup::Found(record)
                        } else {
                            Lookup::Superseded
                        };
                    }
                }
            }
            tokio::time::sleep(interval).await;
        }

        tracing::debug!(entity = %entity, attempts, "entity not found after waiting");
        Lookup::NotFound
    }

    /// Fetch one entity's full record and merge it into the cache.
    pub async fn fetch_detail(&self, id: &str) -> Option<EntityRecord> {
        match self.backend.get_entity_detail(id).await {
            Ok(payload) => {
                let record = parse_entity(&payload)?;
                if record.id != id {
                    tracing::warn!(requested = %id, returned = %record.id, "detail response for a different entity");
                    return None;
                }
                Some(self.cache.put(record))
            }
            Err(e) => {
                tracing::warn!(entity_id = %id, error = %e, "entity detail fetch failed");
                None
            }
        }
    }

    /// Document covers for an entity, cached. Failures are not cached.
    pub async fn documents(&self, id: &str) -> Vec<DocumentCover> {
        if let Some(documents) = self.cache.get_documents(id) {
            return documents;
        }
        match self.backend.get_documents(id).await {
            Ok(payload) => {
                let documents = parse_documents(&payload);
                self.cache.put_documents(id, documents.clone());
                documents
            }
            Err(e) => {
                tracing::warn!(entity_id = %id, error = %e, "document fetch failed");
                Vec::new()
            }
        }
    }
}
