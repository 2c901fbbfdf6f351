use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude", alias = "lon")]
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Coordinates { lat, lng }
    }

    /// Finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lng)
    }
}

/// A selectable map item. Only `id` and `coordinates` drive the engine; the
/// rest is display payload carried through to overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub document_count: u32,
    #[serde(default)]
    pub completeness_score: Option<f64>,
}

impl EntityRecord {
    /// Record known only by id and location, used until the full record arrives.
    pub fn placeholder(id: &str, coordinates: Coordinates) -> Self {
        EntityRecord {
            id: id.to_string(),
            coordinates: Some(coordinates),
            display_name: String::new(),
            address: None,
            price: None,
            attributes: BTreeMap::new(),
            document_count: 0,
            completeness_score: None,
        }
    }

    /// Coordinates that can actually be placed on the map.
    pub fn placeable_coordinates(&self) -> Option<Coordinates> {
        self.coordinates.filter(Coordinates::is_valid)
    }

    pub fn is_placeable(&self) -> bool {
        self.placeable_coordinates().is_some()
    }

    /// Title shown on the overlay card; falls back to the address, then the id.
    pub fn title(&self) -> &str {
        if !self.display_name.trim().is_empty() {
            &self.display_name
        } else if let Some(address) = self.address.as_deref().filter(|a| !a.trim().is_empty()) {
            address
        } else {
            &self.id
        }
    }
}

/// Entity payload as the property service sends it. Field names drift between
/// endpoints, so the common aliases are accepted and normalised by `into_record`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntity {
    pub id: Value,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default, alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(default, alias = "longitude")]
    pub lng: Option<f64>,
    #[serde(default, alias = "name", alias = "title")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub document_count: Option<u32>,
    #[serde(default)]
    pub completeness_score: Option<f64>,
}

impl RawEntity {
    /// Normalise into an `EntityRecord`. Returns `None` when the id is unusable.
    pub fn into_record(self) -> Option<EntityRecord> {
        let id = match &self.id {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let nested = self.coordinates.filter(Coordinates::is_valid);
        let flat = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)).filter(Coordinates::is_valid),
            _ => None,
        };

        Some(EntityRecord {
            id,
            coordinates: nested.or(flat),
            display_name: self.display_name.unwrap_or_default(),
            address: self.address,
            price: self.price,
            attributes: self.attributes,
            document_count: self.document_count.unwrap_or(0),
            completeness_score: self.completeness_score,
        })
    }
}

/// Parse a single entity payload. `null` and garbled payloads yield `None`.
pub fn parse_entity(value: &Value) -> Option<EntityRecord> {
    if !value.is_object() {
        return None;
    }
    RawEntity::deserialize(value).ok()?.into_record()
}

/// Parse an entity list. Anything that is not an array is treated as empty, and
/// malformed elements are skipped. The result is deduplicated by id.
pub fn parse_entity_list(value: &Value) -> Vec<EntityRecord> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    dedupe_by_id(items.iter().filter_map(parse_entity).collect())
}

/// Keep one record per id. The last occurrence wins but keeps the position of
/// the first, so list order stays stable.
pub fn dedupe_by_id(records: Vec<EntityRecord>) -> Vec<EntityRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<EntityRecord> = Vec::with_capacity(records.len());
    for record in records {
        match index.get(&record.id) {
            Some(&i) => out[i] = record,
            None => {
                index.insert(record.id.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Image,
    Pdf,
    #[serde(other)]
    Other,
}

/// Cover of a document attached to an entity: an image, or a PDF's first-page thumbnail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCover {
    pub id: String,
    pub kind: DocumentKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Parse document covers, skipping malformed entries. Non-arrays are empty.
pub fn parse_documents(value: &Value) -> Vec<DocumentCover> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| DocumentCover::deserialize(v).ok())
        .collect()
}

/// How a caller names the entity it wants selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityRef {
    Id(String),
    Address(String),
}

impl EntityRef {
    pub fn id(&self) -> Option<&str> {
        match self {
            EntityRef::Id(id) => Some(id),
            EntityRef::Address(_) => None,
        }
    }

    /// Id refs match exactly. Address refs match the record's address or
    /// display name, ignoring case and repeated whitespace.
    pub fn matches(&self, record: &EntityRecord) -> bool {
        match self {
            EntityRef::Id(id) => record.id == *id,
            EntityRef::Address(query) => {
                let query = normalize_address(query);
                if query.is_empty() {
                    return false;
                }
                let address_hit = record
                    .address
                    .as_deref()
                    .map(normalize_address)
                    .is_some_and(|a| a == query || a.contains(&query));
                address_hit || normalize_address(&record.display_name) == query
            }
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Id(id) => write!(f, "id:{}", id),
            EntityRef::Address(address) => write!(f, "address:{}", address),
        }
    }
}

fn normalize_address(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, address: Option<&str>) -> EntityRecord {
        EntityRecord {
            address: address.map(str::to_string),
            ..EntityRecord::placeholder(id, Coordinates::new(51.45, -2.59))
        }
    }

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates::new(51.45, -2.59).is_valid());
        assert!(Coordinates::new(0.0, 0.0).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -180.5).is_valid());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_parse_entity_numeric_id_and_flat_coords() {
        let v = json!({"id": 42, "latitude": 51.45, "longitude": -2.59, "name": "Harbour Loft"});
        let r = parse_entity(&v).unwrap();
        assert_eq!(r.id, "42");
        assert_eq!(r.coordinates, Some(Coordinates::new(51.45, -2.59)));
        assert_eq!(r.display_name, "Harbour Loft");
    }

    #[test]
    fn test_parse_entity_prefers_nested_coordinates() {
        let v = json!({"id": "a", "coordinates": {"lat": 1.0, "lng": 2.0}, "lat": 3.0, "lng": 4.0});
        let r = parse_entity(&v).unwrap();
        assert_eq!(r.coordinates, Some(Coordinates::new(1.0, 2.0)));
    }

    #[test]
    fn test_parse_entity_drops_invalid_coordinates() {
        let v = json!({"id": "a", "lat": 200.0, "lng": 4.0});
        let r = parse_entity(&v).unwrap();
        assert!(r.coordinates.is_none());
        assert!(!r.is_placeable());
    }

    #[test]
    fn test_parse_entity_rejects_missing_id() {
        assert!(parse_entity(&json!({"id": null, "lat": 1.0, "lng": 1.0})).is_none());
        assert!(parse_entity(&json!({"id": "  "})).is_none());
        assert!(parse_entity(&Value::Null).is_none());
    }

    #[test]
    fn test_parse_entity_list_non_array_is_empty() {
        assert!(parse_entity_list(&json!({"error": "boom"})).is_empty());
        assert!(parse_entity_list(&json!("garbage")).is_empty());
        assert!(parse_entity_list(&Value::Null).is_empty());
    }

    #[test]
    fn test_parse_entity_list_skips_garbled_elements() {
        let v = json!([
            {"id": "1", "lat": 1.0, "lng": 1.0},
            "not an entity",
            {"id": "2", "lat": "north", "lng": 1.0},
            {"id": "3"}
        ]);
        let ids: Vec<_> = parse_entity_list(&v).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_dedupe_last_write_wins_keeps_first_position() {
        let mut first = record("a", None);
        first.display_name = "old".to_string();
        let mut last = record("a", None);
        last.display_name = "new".to_string();
        let out = dedupe_by_id(vec![first, record("b", None), last]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[0].display_name, "new");
    }

    #[test]
    fn test_title_fallbacks() {
        let mut r = record("7", Some("1 Quay St"));
        assert_eq!(r.title(), "1 Quay St");
        r.display_name = "Quay House".to_string();
        assert_eq!(r.title(), "Quay House");
        r.display_name.clear();
        r.address = None;
        assert_eq!(r.title(), "7");
    }

    #[test]
    fn test_parse_documents_skips_bad_entries() {
        let v = json!([
            {"id": "d1", "kind": "pdf", "title": "Survey"},
            {"id": "d2", "kind": "spreadsheet"},
            {"kind": "image"}
        ]);
        let docs = parse_documents(&v);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].kind, DocumentKind::Pdf);
        assert_eq!(docs[1].kind, DocumentKind::Other);
        assert!(parse_documents(&json!({"documents": []})).is_empty());
    }

    #[test]
    fn test_address_ref_matching() {
        let r = record("1", Some("12  Harbour Road, Bristol"));
        assert!(EntityRef::Address("12 harbour road, bristol".to_string()).matches(&r));
        assert!(EntityRef::Address("Harbour Road".to_string()).matches(&r));
        assert!(!EntityRef::Address("Mill Lane".to_string()).matches(&r));
        assert!(!EntityRef::Address("   ".to_string()).matches(&r));
        assert!(EntityRef::Id("1".to_string()).matches(&r));
    }
}
