use std::sync::Arc;

use crate::error::StoreError;
use crate::store::KeyValueStore;

const RECENT_KEY: &str = "recent";

/// Most-recently-selected entity ids, newest first, persisted in the store.
pub struct RecentSelections<K> {
    store: Arc<K>,
    capacity: usize,
    ids: Vec<String>,
}

impl<K: KeyValueStore> RecentSelections<K> {
    /// Load the persisted list. An unreadable list starts empty.
    pub fn load(store: Arc<K>, capacity: usize) -> Self {
        let ids = match read_ids(store.as_ref()) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "could not read recent selections");
                Vec::new()
            }
        };
        let mut recents = RecentSelections { store, capacity, ids };
        recents.ids.truncate(capacity);
        recents
    }

    pub fn record(&mut self, id: &str) {
        self.ids.retain(|existing| existing != id);
        self.ids.insert(0, id.to_string());
        self.ids.truncate(self.capacity);
        if let Err(e) = self.persist() {
            tracing::warn!(entity_id = %id, error = %e, "could not persist recent selections");
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.ids.clone()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&self.ids)?;
        self.store.set(RECENT_KEY, &raw)
    }
}

fn read_ids<K: KeyValueStore>(store: &K) -> Result<Vec<String>, StoreError> {
    match store.get(RECENT_KEY)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}
