pub mod graphql;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendError;

/// Property service the engine loads entities and documents from.
///
/// Payloads are returned as raw JSON: the loader owns the tolerant parsing, so
/// a non-array or garbled response degrades to "nothing" instead of an error.
#[async_trait]
pub trait PropertyBackend: Send + Sync + 'static {
    async fn get_all_entities(&self) -> Result<Value, BackendError>;
    /// `Value::Null` when the service does not know the id.
    async fn get_entity_detail(&self, id: &str) -> Result<Value, BackendError>;
    async fn get_documents(&self, id: &str) -> Result<Value, BackendError>;
}
