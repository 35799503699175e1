//! Catalog resource types
//!
//! Explicit structs per resource kind, with named typed fields and explicit
//! envelope encode/decode. The catalog wraps every record in
//! `{"data": {"id", "type", "attributes": {...}}}`; attributes not modeled
//! here ride along in `extra` so clones and updates round-trip them intact.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Common capabilities shared by the closed set of catalog resource kinds.
/// Each kind supplies its own endpoint formatting; there is no inheritance.
pub trait Resource: Sized {
    /// Resource kind name as the catalog spells it
    fn kind(&self) -> &'static str;

    /// Identifier, present only after creation
    fn id(&self) -> Option<&str>;

    /// Endpoint for fetching this resource
    fn fetch_endpoint(&self) -> Result<String>;

    /// Endpoint for create (no id yet), update and delete
    fn mutate_endpoint(&self) -> Result<String>;

    /// Attribute payload as submitted to the catalog
    fn attributes_value(&self) -> Result<Value>;

    /// Decode from the `data` object of a catalog envelope
    fn from_data(data: &Value) -> Result<Self>;
}

fn require_id<'a>(id: Option<&'a str>, kind: &str) -> Result<&'a str> {
    id.ok_or_else(|| Error::Resource(format!("{} has no id yet", kind)))
}

/// Extract the `data` object from a catalog envelope
pub fn envelope_data(value: &Value) -> Result<&Value> {
    value
        .get("data")
        .ok_or_else(|| Error::Resource("catalog envelope has no data object".to_string()))
}

/// Extract the `data` array from a catalog list envelope
pub fn envelope_list(value: &Value) -> Result<&Vec<Value>> {
    envelope_data(value)?
        .as_array()
        .ok_or_else(|| Error::Resource("catalog envelope data is not a list".to_string()))
}

fn decode_id(data: &Value) -> Option<String> {
    data.get("id").and_then(Value::as_str).map(String::from)
}

fn decode_attributes(data: &Value) -> Result<Value> {
    data.get("attributes")
        .cloned()
        .ok_or_else(|| Error::Resource("catalog envelope has no attributes".to_string()))
}

/// Typed attributes of a map layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerAttributes {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Owning dataset, a non-owning back-reference resolved on demand
    #[serde(rename = "dataset")]
    pub dataset_id: String,
    #[serde(default)]
    pub application: Vec<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub protected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(rename = "default", default)]
    pub default_layer: bool,
    /// Visualization body; the embedded SQL query lives inside it
    #[serde(default)]
    pub layer_config: Value,
    /// Unmodeled attributes, preserved across clone/update
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A published map visualization referencing a query over a dataset
#[derive(Debug, Clone)]
pub struct Layer {
    pub id: Option<String>,
    pub attributes: LayerAttributes,
}

const SQL_POINTER: &str = "/body/layers/0/options/sql";

impl Layer {
    pub fn from_envelope(value: &Value) -> Result<Self> {
        Self::from_data(envelope_data(value)?)
    }

    pub fn dataset_id(&self) -> &str {
        &self.attributes.dataset_id
    }

    /// The SQL query embedded in the layer configuration
    pub fn sql(&self) -> Result<&str> {
        self.attributes
            .layer_config
            .pointer(SQL_POINTER)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Resource("layer config carries no sql query".to_string()))
    }

    pub fn set_sql(&mut self, sql: &str) -> Result<()> {
        match self.attributes.layer_config.pointer_mut(SQL_POINTER) {
            Some(slot) => {
                *slot = Value::String(sql.to_string());
                Ok(())
            }
            None => Err(Error::Resource("layer config carries no sql query".to_string())),
        }
    }

    /// Deep copy under a new name, with no id or slug, ready for creation
    pub fn clone_for(&self, name: &str) -> Self {
        let mut attributes = self.attributes.clone();
        attributes.name = name.to_string();
        attributes.slug = None;
        Self {
            id: None,
            attributes,
        }
    }
}

impl Resource for Layer {
    fn kind(&self) -> &'static str {
        "layer"
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn fetch_endpoint(&self) -> Result<String> {
        Ok(format!("layer/{}", require_id(self.id(), "layer")?))
    }

    fn mutate_endpoint(&self) -> Result<String> {
        Ok(match self.id() {
            Some(id) => format!("dataset/{}/layer/{}", self.dataset_id(), id),
            None => format!("dataset/{}/layer", self.dataset_id()),
        })
    }

    fn attributes_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.attributes)?)
    }

    fn from_data(data: &Value) -> Result<Self> {
        let attributes = serde_json::from_value(decode_attributes(data)?)?;
        Ok(Self {
            id: decode_id(data),
            attributes,
        })
    }
}

/// Typed attributes of a dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetAttributes {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Backing table in the execution engine
    #[serde(default)]
    pub table_name: String,
    /// Default time column for freeze windows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_date_field: Option<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default)]
    pub application: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A registered tabular data source
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: Option<String>,
    pub attributes: DatasetAttributes,
    /// Layers embedded by an `includes=layer` fetch
    pub layers: HashMap<String, Layer>,
    /// Metadata embedded by an `includes=metadata` fetch
    pub metadata: HashMap<String, Metadata>,
    /// Widgets embedded by an `includes=widget` fetch
    pub widgets: HashMap<String, Widget>,
}

impl Dataset {
    pub fn from_envelope(value: &Value) -> Result<Self> {
        Self::from_data(envelope_data(value)?)
    }
}

/// Split embedded sub-resource arrays out of a dataset's attribute object so
/// they do not ride along on later updates.
fn extract_embedded<R: Resource>(attributes: &mut Map<String, Value>, key: &str) -> HashMap<String, R> {
    let mut out = HashMap::new();
    if let Some(Value::Array(items)) = attributes.remove(key) {
        for item in &items {
            if let (Some(id), Ok(resource)) = (decode_id(item), R::from_data(item)) {
                out.insert(id, resource);
            }
        }
    }
    out
}

impl Resource for Dataset {
    fn kind(&self) -> &'static str {
        "dataset"
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn fetch_endpoint(&self) -> Result<String> {
        Ok(format!("dataset/{}", require_id(self.id(), "dataset")?))
    }

    fn mutate_endpoint(&self) -> Result<String> {
        Ok(match self.id() {
            Some(id) => format!("dataset/{}", id),
            None => "dataset".to_string(),
        })
    }

    fn attributes_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.attributes)?)
    }

    fn from_data(data: &Value) -> Result<Self> {
        let mut raw = match decode_attributes(data)? {
            Value::Object(map) => map,
            _ => return Err(Error::Resource("dataset attributes is not an object".to_string())),
        };
        let layers = extract_embedded(&mut raw, "layer");
        let metadata = extract_embedded(&mut raw, "metadata");
        let widgets = extract_embedded(&mut raw, "widget");
        let attributes = serde_json::from_value(Value::Object(raw))?;
        Ok(Self {
            id: decode_id(data),
            attributes,
            layers,
            metadata,
            widgets,
        })
    }
}

/// Free-form metadata record attached to a dataset
#[derive(Debug, Clone)]
pub struct Metadata {
    pub id: Option<String>,
    pub dataset_id: String,
    pub attributes: Value,
}

impl Resource for Metadata {
    fn kind(&self) -> &'static str {
        "metadata"
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn fetch_endpoint(&self) -> Result<String> {
        Ok(format!("metadata/{}", require_id(self.id(), "metadata")?))
    }

    fn mutate_endpoint(&self) -> Result<String> {
        Ok(match self.id() {
            Some(id) => format!("dataset/{}/metadata/{}", self.dataset_id, id),
            None => format!("dataset/{}/metadata", self.dataset_id),
        })
    }

    fn attributes_value(&self) -> Result<Value> {
        Ok(self.attributes.clone())
    }

    fn from_data(data: &Value) -> Result<Self> {
        let attributes = decode_attributes(data)?;
        let dataset_id = attributes
            .get("dataset")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            id: decode_id(data),
            dataset_id,
            attributes,
        })
    }
}

/// Saved chart or other visual widget attached to a dataset
#[derive(Debug, Clone)]
pub struct Widget {
    pub id: Option<String>,
    pub dataset_id: String,
    pub attributes: Value,
}

impl Resource for Widget {
    fn kind(&self) -> &'static str {
        "widget"
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn fetch_endpoint(&self) -> Result<String> {
        Ok(format!("widget/{}", require_id(self.id(), "widget")?))
    }

    fn mutate_endpoint(&self) -> Result<String> {
        Ok(match self.id() {
            Some(id) => format!("dataset/{}/widget/{}", self.dataset_id, id),
            None => format!("dataset/{}/widget", self.dataset_id),
        })
    }

    fn attributes_value(&self) -> Result<Value> {
        Ok(self.attributes.clone())
    }

    fn from_data(data: &Value) -> Result<Self> {
        let attributes = decode_attributes(data)?;
        let dataset_id = attributes
            .get("dataset")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            id: decode_id(data),
            dataset_id,
            attributes,
        })
    }
}

/// Line-level diff of two resources' attribute payloads; refuses to compare
/// across resource kinds.
pub fn diff_resources<A: Resource, B: Resource>(a: &A, b: &B) -> Result<Vec<String>> {
    if a.kind() != b.kind() {
        return Err(Error::Integrity(format!(
            "cannot diff {} against {}",
            a.kind(),
            b.kind()
        )));
    }
    let left = serde_json::to_string_pretty(&a.attributes_value()?)?;
    let right = serde_json::to_string_pretty(&b.attributes_value()?)?;
    Ok(line_diff(&left, &right))
}

fn line_diff(left: &str, right: &str) -> Vec<String> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for line in right.lines() {
        *counts.entry(line).or_default() += 1;
    }
    let mut out = Vec::new();
    for line in left.lines() {
        let count = counts.entry(line).or_default();
        if *count > 0 {
            *count -= 1;
        } else {
            out.push(format!("- {}", line));
        }
    }
    let mut remaining: HashMap<&str, i64> = HashMap::new();
    for line in left.lines() {
        *remaining.entry(line).or_default() += 1;
    }
    for line in right.lines() {
        let count = remaining.entry(line).or_default();
        if *count > 0 {
            *count -= 1;
        } else {
            out.push(format!("+ {}", line));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer_envelope() -> Value {
        json!({
            "data": {
                "id": "abc-123",
                "type": "layer",
                "attributes": {
                    "name": "Air quality",
                    "slug": "air-quality",
                    "dataset": "ds-9",
                    "application": ["rw"],
                    "provider": "cartodb",
                    "published": true,
                    "protected": false,
                    "default": true,
                    "layerConfig": {
                        "body": {
                            "layers": [
                                {"options": {"sql": "select * from air where utc_time > 'x'"}}
                            ]
                        }
                    },
                    "legendConfig": {"type": "basic"}
                }
            }
        })
    }

    #[test]
    fn test_layer_envelope_decode() {
        let layer = Layer::from_envelope(&layer_envelope()).unwrap();
        assert_eq!(layer.id.as_deref(), Some("abc-123"));
        assert_eq!(layer.attributes.name, "Air quality");
        assert_eq!(layer.dataset_id(), "ds-9");
        assert_eq!(layer.attributes.provider, "cartodb");
        assert!(layer.attributes.default_layer);
        assert_eq!(layer.sql().unwrap(), "select * from air where utc_time > 'x'");
    }

    #[test]
    fn test_layer_encode_preserves_unmodeled_attributes() {
        let layer = Layer::from_envelope(&layer_envelope()).unwrap();
        let value = layer.attributes_value().unwrap();
        assert_eq!(value["legendConfig"]["type"], "basic");
        assert_eq!(value["dataset"], "ds-9");
        assert_eq!(value["default"], true);
    }

    #[test]
    fn test_clone_for_strips_id_and_slug() {
        let layer = Layer::from_envelope(&layer_envelope()).unwrap();
        let copy = layer.clone_for("Air quality (frozen)");
        assert_eq!(copy.id, None);
        assert_eq!(copy.attributes.slug, None);
        assert_eq!(copy.attributes.name, "Air quality (frozen)");
        assert_eq!(copy.sql().unwrap(), layer.sql().unwrap());
    }

    #[test]
    fn test_set_sql_rewrites_embedded_query() {
        let mut layer = Layer::from_envelope(&layer_envelope()).unwrap();
        layer.set_sql("SELECT * FROM frozen").unwrap();
        assert_eq!(layer.sql().unwrap(), "SELECT * FROM frozen");
    }

    #[test]
    fn test_layer_endpoints() {
        let layer = Layer::from_envelope(&layer_envelope()).unwrap();
        assert_eq!(layer.fetch_endpoint().unwrap(), "layer/abc-123");
        assert_eq!(layer.mutate_endpoint().unwrap(), "dataset/ds-9/layer/abc-123");
        let copy = layer.clone_for("copy");
        assert_eq!(copy.mutate_endpoint().unwrap(), "dataset/ds-9/layer");
        assert!(copy.fetch_endpoint().is_err());
    }

    #[test]
    fn test_dataset_decode_extracts_embedded_layers() {
        let envelope = json!({
            "data": {
                "id": "ds-9",
                "type": "dataset",
                "attributes": {
                    "name": "Air quality stations",
                    "tableName": "air_quality",
                    "mainDateField": "utc_time",
                    "provider": "cartodb",
                    "layer": [layer_envelope()["data"]]
                }
            }
        });
        let dataset = Dataset::from_envelope(&envelope).unwrap();
        assert_eq!(dataset.attributes.table_name, "air_quality");
        assert_eq!(dataset.attributes.main_date_field.as_deref(), Some("utc_time"));
        assert_eq!(dataset.layers.len(), 1);
        assert!(dataset.layers.contains_key("abc-123"));
        // extracted sub-resources must not ride along on updates
        let value = dataset.attributes_value().unwrap();
        assert!(value.get("layer").is_none());
    }

    #[test]
    fn test_diff_same_kind_reports_changed_lines() {
        let a = Layer::from_envelope(&layer_envelope()).unwrap();
        let b = a.clone_for("Renamed");
        let diff = diff_resources(&a, &b).unwrap();
        assert!(diff.iter().any(|l| l.starts_with('-') && l.contains("Air quality")));
        assert!(diff.iter().any(|l| l.starts_with('+') && l.contains("Renamed")));
    }

    #[test]
    fn test_diff_across_kinds_is_an_integrity_error() {
        let layer = Layer::from_envelope(&layer_envelope()).unwrap();
        let widget = Widget {
            id: None,
            dataset_id: "ds-9".to_string(),
            attributes: json!({}),
        };
        let err = diff_resources(&layer, &widget).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }
}
