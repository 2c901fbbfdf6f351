use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use propmap_shared::models::{dedupe_by_id, Coordinates, DocumentCover, EntityRecord, EntityRef};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::KeyValueStore;

const INDEX_KEY: &str = "entities:index";

fn entity_key(id: &str) -> String {
    format!("entity:{}", id)
}

fn documents_key(id: &str) -> String {
    format!("documents:{}", id)
}

fn confirmed_key(id: &str) -> String {
    format!("confirmed:{}", id)
}

/// A cached value stamped with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub timestamp_ms: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, timestamp_ms: i64) -> Self {
        CacheEntry { value, timestamp_ms }
    }

    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.timestamp_ms < ttl_ms
    }
}

#[derive(Default)]
struct CacheState {
    entities: HashMap<String, CacheEntry<EntityRecord>>,
    documents: HashMap<String, CacheEntry<Vec<DocumentCover>>>,
    confirmed: HashMap<String, Coordinates>,
    index: Option<CacheEntry<Vec<String>>>,
}

/// Entity and document cache with TTL, written through to a persistent store.
///
/// Lookups never fail: a store error is logged and treated as a miss, and an
/// expired entry is never served. Coordinates the user confirmed for an entity
/// win over whatever a later record carries.
pub struct EntityCache<K, C> {
    store: Arc<K>,
    clock: Arc<C>,
    ttl_ms: i64,
    state: Mutex<CacheState>,
}

impl<K: KeyValueStore, C: Clock> EntityCache<K, C> {
    pub fn new(store: Arc<K>, clock: Arc<C>, ttl_ms: i64) -> Self {
        EntityCache {
            store,
            clock,
            ttl_ms,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Fresh record for `id`, from memory or the persistent store.
    pub fn get(&self, id: &str) -> Option<EntityRecord> {
        let now = self.now();
        {
            let mut state = self.lock();
            if let Some(entry) = state.entities.get(id) {
                if entry.is_fresh(now, self.ttl_ms) {
                    return Some(entry.value.clone());
                }
                tracing::debug!(entity_id = %id, "cache entry expired");
                state.entities.remove(id);
                return None;
            }
        }

        let entry: CacheEntry<EntityRecord> = self.read_persisted(&entity_key(id))?;
        if !entry.is_fresh(now, self.ttl_ms) {
            return None;
        }
        let mut record = entry.value.clone();
        if let Some(confirmed) = self.confirmed(id) {
            record.coordinates = Some(confirmed);
        }
        self.lock()
            .entities
            .insert(id.to_string(), CacheEntry::new(record.clone(), entry.timestamp_ms));
        Some(record)
    }

    /// Upsert a record and return what was actually stored.
    ///
    /// A confirmed coordinate always replaces the incoming one, and a record
    /// without coordinates keeps the coordinates already known for the id.
    pub fn put(&self, record: EntityRecord) -> EntityRecord {
        let now = self.now();
        let confirmed = self.confirmed(&record.id);
        let merged = {
            let mut state = self.lock();
            let previous = state
                .entities
                .get(&record.id)
                .and_then(|e| e.value.placeable_coordinates());
            let mut merged = record;
            merged.coordinates = match (confirmed, merged.placeable_coordinates()) {
                (Some(pinned), incoming) => {
                    if incoming.is_some_and(|c| c != pinned) {
                        tracing::debug!(entity_id = %merged.id, "keeping confirmed coordinates over incoming");
                    }
                    Some(pinned)
                }
                (None, Some(incoming)) => Some(incoming),
                (None, None) => previous,
            };
            state
                .entities
                .insert(merged.id.clone(), CacheEntry::new(merged.clone(), now));
            merged
        };
        self.write_persisted(&entity_key(&merged.id), &CacheEntry::new(&merged, now));
        merged
    }

    /// Store a bulk load: dedupe, upsert each record and remember the id list so
    /// `all` can answer without the backend.
    pub fn put_all(&self, records: Vec<EntityRecord>) -> Vec<EntityRecord> {
        let now = self.now();
        let stored: Vec<EntityRecord> = dedupe_by_id(records)
            .into_iter()
            .map(|r| self.put(r))
            .collect();
        let ids: Vec<String> = stored.iter().map(|r| r.id.clone()).collect();
        self.write_persisted(INDEX_KEY, &CacheEntry::new(&ids, now));
        self.lock().index = Some(CacheEntry::new(ids, now));
        stored
    }

    /// Every record of the last bulk load, if the load is still fresh and each
    /// record is still cached.
    pub fn all(&self) -> Option<Vec<EntityRecord>> {
        let now = self.now();
        let cached_index = self.lock().index.clone();
        let index = match cached_index {
            Some(index) => index,
            None => {
                let index: CacheEntry<Vec<String>> = self.read_persisted(INDEX_KEY)?;
                self.lock().index = Some(index.clone());
                index
            }
        };
        if !index.is_fresh(now, self.ttl_ms) {
            return None;
        }
        index.value.iter().map(|id| self.get(id)).collect()
    }

    /// Resolve an entity reference against cached records.
    pub fn find(&self, entity: &EntityRef) -> Option<EntityRecord> {
        match entity {
            EntityRef::Id(id) => self.get(id),
            EntityRef::Address(_) => {
                let now = self.now();
                let state = self.lock();
                let mut hits: Vec<&EntityRecord> = state
                    .entities
                    .values()
                    .filter(|e| e.is_fresh(now, self.ttl_ms))
                    .map(|e| &e.value)
                    .filter(|r| entity.matches(r))
                    .collect();
                // deterministic pick when several records match
                hits.sort_by(|a, b| a.id.cmp(&b.id));
                hits.first().map(|r| (*r).clone())
            }
        }
    }

    pub fn get_documents(&self, id: &str) -> Option<Vec<DocumentCover>> {
        let now = self.now();
        {
            let mut state = self.lock();
            if let Some(entry) = state.documents.get(id) {
                if entry.is_fresh(now, self.ttl_ms) {
                    return Some(entry.value.clone());
                }
                state.documents.remove(id);
                return None;
            }
        }
        let entry: CacheEntry<Vec<DocumentCover>> = self.read_persisted(&documents_key(id))?;
        if !entry.is_fresh(now, self.ttl_ms) {
            return None;
        }
        self.lock().documents.insert(id.to_string(), entry.clone());
        Some(entry.value)
    }

    pub fn put_documents(&self, id: &str, documents: Vec<DocumentCover>) {
        let entry = CacheEntry::new(documents, self.now());
        self.write_persisted(&documents_key(id), &entry);
        self.lock().documents.insert(id.to_string(), entry);
    }

    /// Pin the user-confirmed location of an entity. Later `put`s cannot move it.
    pub fn confirm_location(&self, id: &str, coordinates: Coordinates) {
        self.write_persisted(&confirmed_key(id), &coordinates);
        let mut state = self.lock();
        state.confirmed.insert(id.to_string(), coordinates);
        if let Some(entry) = state.entities.get_mut(id) {
            entry.value.coordinates = Some(coordinates);
        }
    }

    pub fn confirmed(&self, id: &str) -> Option<Coordinates> {
        if let Some(c) = self.lock().confirmed.get(id) {
            return Some(*c);
        }
        let coordinates: Coordinates = self.read_persisted(&confirmed_key(id))?;
        self.lock().confirmed.insert(id.to_string(), coordinates);
        Some(coordinates)
    }

    /// Drop cached entities and documents, in memory and in the store.
    /// Confirmed locations are user data and are kept.
    pub fn clear(&self) {
        let (entity_ids, document_ids) = {
            let mut state = self.lock();
            let mut entity_ids: Vec<String> = state.entities.drain().map(|(id, _)| id).collect();
            if let Some(index) = state.index.take() {
                entity_ids.extend(index.value);
            }
            let document_ids: Vec<String> = state.documents.drain().map(|(id, _)| id).collect();
            (entity_ids, document_ids)
        };
        for id in entity_ids {
            self.remove_persisted(&entity_key(&id));
        }
        for id in document_ids {
            self.remove_persisted(&documents_key(&id));
        }
        self.remove_persisted(INDEX_KEY);
        tracing::info!("entity cache cleared");
    }

    fn read_persisted<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_read(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache store read failed");
                None
            }
        }
    }

    fn try_read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_persisted<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(StoreError::from)
            .and_then(|raw| self.store.set(key, &raw));
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "cache store write failed");
        }
    }

    fn remove_persisted(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!(key, error = %e, "cache store remove failed");
        }
    }
}
