use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PropertyBackend;
use crate::error::BackendError;

const PROPERTIES_QUERY: &str = r#"query {
    properties {
        id displayName address price lat lng
        documentCount completenessScore attributes
    }
}"#;

const PROPERTY_QUERY: &str = r#"query Property($id: ID!) {
    property(id: $id) {
        id displayName address price lat lng
        documentCount completenessScore attributes
    }
}"#;

const DOCUMENTS_QUERY: &str = r#"query Documents($id: ID!) {
    documents(propertyId: $id) { id kind title thumbnail }
}"#;

#[derive(Debug, Clone, Serialize)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLError {
    pub message: String,
}

/// Build the variables JSON for queries keyed by a property id.
pub fn build_id_variables(id: &str) -> Value {
    serde_json::json!({ "id": id })
}

/// Unwrap a GraphQL envelope and pull out `field` from its data.
/// A missing field comes back as `Value::Null` for the loader to coerce.
pub fn extract_field(response: GraphQLResponse<Value>, field: &str) -> Result<Value, BackendError> {
    if let Some(errors) = response.errors {
        if let Some(first) = errors.first() {
            return Err(BackendError::Query(first.message.clone()));
        }
    }
    let mut data = response.data.ok_or(BackendError::MissingData)?;
    Ok(data.get_mut(field).map(Value::take).unwrap_or(Value::Null))
}

/// `PropertyBackend` over a GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl GraphqlBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        GraphqlBackend {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn query(&self, query: &str, variables: Option<Value>, field: &str) -> Result<Value, BackendError> {
        let req = GraphQLRequest {
            query: query.to_string(),
            variables,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&req)
            .send()
            .await?
            .error_for_status()?;

        let envelope: GraphQLResponse<Value> = resp.json().await?;
        extract_field(envelope, field)
    }
}

#[async_trait]
impl PropertyBackend for GraphqlBackend {
    async fn get_all_entities(&self) -> Result<Value, BackendError> {
        self.query(PROPERTIES_QUERY, None, "properties").await
    }

    async fn get_entity_detail(&self, id: &str) -> Result<Value, BackendError> {
        self.query(PROPERTY_QUERY, Some(build_id_variables(id)), "property")
            .await
    }

    async fn get_documents(&self, id: &str) -> Result<Value, BackendError> {
        self.query(DOCUMENTS_QUERY, Some(build_id_variables(id)), "documents")
            .await
    }
}
