use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance of a set of field values: which document they were extracted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSource {
    #[serde(default = "new_source_id")]
    pub source_id: String,

    #[serde(default)]
    pub origin_file: String,

    #[serde(default)]
    pub origin_file_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,

    #[serde(default)]
    pub extraction_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,

    #[serde(default)]
    pub confidence_score: f32,

    #[serde(default)]
    pub fields_extracted: Vec<String>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ProductSource {
    pub fn new(origin_file: impl Into<String>, extraction_type: impl Into<String>) -> Self {
        let origin_file = origin_file.into();
        let origin_file_type = origin_file
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        Self {
            source_id: new_source_id(),
            origin_file,
            origin_file_type,
            page_number: None,
            extraction_type: extraction_type.into(),
            extracted_text: None,
            confidence_score: 0.0,
            fields_extracted: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

fn new_source_id() -> String {
    Uuid::new_v4().to_string()
}
