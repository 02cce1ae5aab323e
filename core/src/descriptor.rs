use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    GeoPoint,
    Long,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub fields: Vec<(String, FieldType)>,
}

impl FieldMapping {
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    /// Body of a put-mapping request.
    pub fn to_json(&self) -> Value {
        let mut props = serde_json::Map::new();
        for (name, ty) in &self.fields {
            props.insert(name.clone(), json!({ "type": ty }));
        }
        json!({ "properties": props })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSettings {
    pub shards: u32,
    pub replicas: u32,
    pub max_result_window: u64,
}

impl Default for IndexSettings {
    fn default() -> Self { Self { shards: 1, replicas: 1, max_result_window: 20_000 } }
}

impl IndexSettings {
    /// Body of a create-index request; settings ride along so they exist before any document does.
    pub fn to_json(&self) -> Value {
        json!({
            "settings": {
                "number_of_shards": self.shards,
                "number_of_replicas": self.replicas,
                "max_result_window": self.max_result_window,
            }
        })
    }
}

/// Everything needed to (re)create the target index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    pub settings: IndexSettings,
    pub mapping: FieldMapping,
    pub geo_field: String,
}

impl IndexDescriptor {
    /// Descriptor for `Place` documents.
    pub fn places(name: impl Into<String>) -> Self {
        let fields = [
            ("address", FieldType::Text),
            ("phone", FieldType::Text),
            ("name", FieldType::Text),
            ("location", FieldType::GeoPoint),
            ("id", FieldType::Long),
        ]
        .into_iter()
        .map(|(n, t)| (n.to_string(), t))
        .collect();
        Self { name: name.into(), settings: IndexSettings::default(), mapping: FieldMapping { fields }, geo_field: "location".into() }
    }

    pub fn with_settings(mut self, settings: IndexSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::config::validate_index_name(&self.name)?;
        if self.mapping.field_type(&self.geo_field) != Some(FieldType::GeoPoint) {
            return Err(ConfigError::MissingGeoField { field: self.geo_field.clone() });
        }
        if self.settings.shards == 0 {
            return Err(ConfigError::InvalidSetting { name: "shards", reason: "must be at least 1".into() });
        }
        if self.settings.max_result_window == 0 {
            return Err(ConfigError::InvalidSetting { name: "max_result_window", reason: "must be at least 1".into() });
        }
        Ok(())
    }
}
