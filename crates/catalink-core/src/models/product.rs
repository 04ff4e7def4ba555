use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::{FieldConfidence, FieldValue, IdentityField, ProductField, ProductSource, is_blank_text};

/// The identifying and descriptive fields of a product.
///
/// Used both as the query record handed to the matcher and as the field set
/// of a stored product. Unknown keys are kept in `extra` and passed through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_text")]
    pub default_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_text")]
    pub barcode: Option<String>,

    #[serde(
        default,
        alias = "Code_EAN",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_text"
    )]
    pub code_ean: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_text")]
    pub name: Option<String>,

    #[serde(
        default,
        alias = "constructeur",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_text"
    )]
    pub manufacturer: Option<String>,

    #[serde(
        default,
        alias = "refConstructeur",
        alias = "ref_constructeur",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_text"
    )]
    pub manufacturer_ref: Option<String>,

    #[serde(
        default,
        alias = "categ_id",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_text"
    )]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_text")]
    pub country_of_origin: Option<String>,

    #[serde(
        default,
        alias = "description_courte",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_text"
    )]
    pub short_description: Option<String>,

    #[serde(
        default,
        alias = "description_ecommerce",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_text"
    )]
    pub ecommerce_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_text")]
    pub features_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_text")]
    pub hs_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_number")]
    pub length: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_number")]
    pub width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_number")]
    pub height: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_number")]
    pub weight: Option<f64>,

    #[serde(
        default,
        alias = "lst_price",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_number"
    )]
    pub list_price: Option<f64>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProductRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: ProductField, value: impl Into<FieldValue>) -> Self {
        self.set(field, value.into());
        self
    }

    /// Present, non-blank value of `field`.
    pub fn get(&self, field: ProductField) -> Option<FieldValue> {
        if let Some(slot) = self.text_slot(field) {
            return slot
                .as_deref()
                .filter(|s| !is_blank_text(s))
                .map(|s| FieldValue::Text(s.to_string()));
        }
        self.number_slot(field)
            .and_then(|n| *n)
            .filter(|n| n.is_finite())
            .map(FieldValue::Number)
    }

    /// Trimmed text of a text field, `None` when absent or blank.
    pub fn text(&self, field: ProductField) -> Option<&str> {
        self.text_slot(field)
            .and_then(|slot| slot.as_deref())
            .map(str::trim)
            .filter(|s| !is_blank_text(s))
    }

    /// Write `value` into `field`. Numeric fields accept numeric text; text
    /// that doesn't parse leaves the field untouched.
    pub fn set(&mut self, field: ProductField, value: FieldValue) {
        if field.is_numeric() {
            let number = match value {
                FieldValue::Number(n) => Some(n),
                FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            };
            if let (Some(n), Some(slot)) = (number, self.number_slot_mut(field)) {
                *slot = Some(n);
            }
        } else if let Some(slot) = self.text_slot_mut(field) {
            *slot = Some(value.to_string());
        }
    }

    /// First present identity field by precedence (internal code, barcode, EAN).
    pub fn identity(&self) -> Option<(IdentityField, &str)> {
        IdentityField::PRECEDENCE
            .into_iter()
            .find_map(|id| self.text(id.field()).map(|v| (id, v)))
    }

    /// Known fields carrying a value, in declaration order.
    pub fn present_fields(&self) -> Vec<(ProductField, FieldValue)> {
        ProductField::ALL
            .into_iter()
            .filter_map(|f| self.get(f).map(|v| (f, v)))
            .collect()
    }

    /// Drop blank and `"null"` text values and non-finite numbers.
    pub fn clean(&mut self) {
        for field in ProductField::ALL {
            if let Some(slot) = self.text_slot_mut(field) {
                match slot.as_deref() {
                    Some(s) if is_blank_text(s) => *slot = None,
                    Some(s) if s.len() != s.trim().len() => *slot = Some(s.trim().to_string()),
                    _ => {}
                }
            } else if let Some(slot) = self.number_slot_mut(field) {
                if slot.is_some_and(|n| !n.is_finite()) {
                    *slot = None;
                }
            }
        }
        self.extra
            .retain(|_, v| !v.is_null() && v.as_str().is_none_or(|s| !is_blank_text(s)));
    }

    fn text_slot(&self, field: ProductField) -> Option<&Option<String>> {
        match field {
            ProductField::DefaultCode => Some(&self.default_code),
            ProductField::Barcode => Some(&self.barcode),
            ProductField::CodeEan => Some(&self.code_ean),
            ProductField::Name => Some(&self.name),
            ProductField::Manufacturer => Some(&self.manufacturer),
            ProductField::ManufacturerRef => Some(&self.manufacturer_ref),
            ProductField::Category => Some(&self.category),
            ProductField::CountryOfOrigin => Some(&self.country_of_origin),
            ProductField::ShortDescription => Some(&self.short_description),
            ProductField::EcommerceDescription => Some(&self.ecommerce_description),
            ProductField::FeaturesDescription => Some(&self.features_description),
            ProductField::HsCode => Some(&self.hs_code),
            _ => None,
        }
    }

    fn text_slot_mut(&mut self, field: ProductField) -> Option<&mut Option<String>> {
        match field {
            ProductField::DefaultCode => Some(&mut self.default_code),
            ProductField::Barcode => Some(&mut self.barcode),
            ProductField::CodeEan => Some(&mut self.code_ean),
            ProductField::Name => Some(&mut self.name),
            ProductField::Manufacturer => Some(&mut self.manufacturer),
            ProductField::ManufacturerRef => Some(&mut self.manufacturer_ref),
            ProductField::Category => Some(&mut self.category),
            ProductField::CountryOfOrigin => Some(&mut self.country_of_origin),
            ProductField::ShortDescription => Some(&mut self.short_description),
            ProductField::EcommerceDescription => Some(&mut self.ecommerce_description),
            ProductField::FeaturesDescription => Some(&mut self.features_description),
            ProductField::HsCode => Some(&mut self.hs_code),
            _ => None,
        }
    }

    fn number_slot(&self, field: ProductField) -> Option<&Option<f64>> {
        match field {
            ProductField::Length => Some(&self.length),
            ProductField::Width => Some(&self.width),
            ProductField::Height => Some(&self.height),
            ProductField::Weight => Some(&self.weight),
            ProductField::ListPrice => Some(&self.list_price),
            _ => None,
        }
    }

    fn number_slot_mut(&mut self, field: ProductField) -> Option<&mut Option<f64>> {
        match field {
            ProductField::Length => Some(&mut self.length),
            ProductField::Width => Some(&mut self.width),
            ProductField::Height => Some(&mut self.height),
            ProductField::Weight => Some(&mut self.weight),
            ProductField::ListPrice => Some(&mut self.list_price),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// Lifecycle of a product record through the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    #[default]
    Raw,
    Enriched,
    Validated,
    Exported,
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Enriched => write!(f, "enriched"),
            Self::Validated => write!(f, "validated"),
            Self::Exported => write!(f, "exported"),
        }
    }
}

impl std::str::FromStr for ExtractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "enriched" => Ok(Self::Enriched),
            "validated" => Ok(Self::Validated),
            "exported" => Ok(Self::Exported),
            _ => Err(format!("Invalid ExtractionStatus: {s}")),
        }
    }
}

/// A product as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProduct {
    pub id: Uuid,

    #[serde(flatten)]
    pub record: ProductRecord,

    #[serde(default, alias = "confidence_scores")]
    pub confidence: FieldConfidence,

    #[serde(default)]
    pub sources: Vec<ProductSource>,

    #[serde(default)]
    pub status: ExtractionStatus,

    #[serde(default)]
    pub image_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredProduct {
    pub fn new(mut record: ProductRecord) -> Self {
        record.clean();
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            record,
            confidence: FieldConfidence::default(),
            sources: Vec::new(),
            status: ExtractionStatus::default(),
            image_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_confidence(mut self, confidence: FieldConfidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_sources(mut self, sources: Vec<ProductSource>) -> Self {
        self.sources = sources;
        self
    }

}

/// Lightweight projection used in match results and duplicate groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub default_code: Option<String>,
    pub barcode: Option<String>,
    pub manufacturer: Option<String>,
    pub status: ExtractionStatus,
    pub image_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&StoredProduct> for ProductSummary {
    fn from(product: &StoredProduct) -> Self {
        Self {
            id: product.id,
            name: product.record.name.clone(),
            default_code: product.record.default_code.clone(),
            barcode: product.record.barcode.clone(),
            manufacturer: product.record.manufacturer.clone(),
            status: product.status,
            image_count: product.image_count,
            created_at: product.created_at,
        }
    }
}

/// A record arriving from the catalog connector or the extraction pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingProduct {
    #[serde(flatten)]
    pub record: ProductRecord,

    #[serde(default, alias = "confidence_scores")]
    pub confidence: FieldConfidence,

    #[serde(default)]
    pub sources: Vec<ProductSource>,
}

impl IncomingProduct {
    pub fn new(record: ProductRecord) -> Self {
        Self {
            record,
            confidence: FieldConfidence::default(),
            sources: Vec::new(),
        }
    }
}

/// A partial update applied to one stored product in a single statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductPatch {
    pub fields: BTreeMap<ProductField, FieldValue>,
    /// Replaces the stored confidence map when set.
    pub confidence: Option<FieldConfidence>,
    /// Replaces the stored sources list when set.
    pub sources: Option<Vec<ProductSource>>,
    pub status: Option<ExtractionStatus>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ProductPatch {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            confidence: None,
            sources: None,
            status: None,
            updated_at: Utc::now(),
        }
    }
}

fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !is_blank_text(&s) => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accepts_connector_aliases() {
        let json = r#"{
            "default_code": "AB-1234",
            "Code_EAN": "4006381333931",
            "constructeur": "Acme",
            "refConstructeur": "X-99",
            "lst_price": "12,50",
            "weight": 1.2,
            "colour": "red"
        }"#;
        let record: ProductRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.default_code.as_deref(), Some("AB-1234"));
        assert_eq!(record.code_ean.as_deref(), Some("4006381333931"));
        assert_eq!(record.manufacturer.as_deref(), Some("Acme"));
        assert_eq!(record.manufacturer_ref.as_deref(), Some("X-99"));
        assert_eq!(record.list_price, Some(12.5));
        assert_eq!(record.weight, Some(1.2));
        assert_eq!(record.extra.get("colour"), Some(&serde_json::json!("red")));
    }

    #[test]
    fn test_null_strings_are_absent() {
        let json = r#"{"name": "null", "barcode": "  ", "default_code": 42, "width": "null"}"#;
        let record: ProductRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.name, None);
        assert_eq!(record.barcode, None);
        assert_eq!(record.default_code.as_deref(), Some("42"));
        assert_eq!(record.width, None);
    }

    #[test]
    fn test_identity_precedence() {
        let record = ProductRecord::new()
            .with(ProductField::CodeEan, "4006381333931")
            .with(ProductField::Barcode, "123");
        assert_eq!(record.identity(), Some((IdentityField::Barcode, "123")));

        let record = record.with(ProductField::DefaultCode, "AB-1");
        assert_eq!(record.identity(), Some((IdentityField::DefaultCode, "AB-1")));

        assert_eq!(ProductRecord::new().identity(), None);
    }

    #[test]
    fn test_set_numeric_field_from_text() {
        let mut record = ProductRecord::new();
        record.set(ProductField::Height, FieldValue::Text("3.5".to_string()));
        record.set(ProductField::Width, FieldValue::Text("wide".to_string()));
        assert_eq!(record.height, Some(3.5));
        assert_eq!(record.width, None);
        assert_eq!(record.get(ProductField::Height), Some(FieldValue::Number(3.5)));
    }

    #[test]
    fn test_clean_drops_blank_values() {
        let mut record = ProductRecord {
            name: Some(" Widget ".to_string()),
            manufacturer: Some("null".to_string()),
            weight: Some(f64::NAN),
            ..Default::default()
        };
        record.extra.insert("note".to_string(), serde_json::json!("null"));
        record.clean();
        assert_eq!(record.name.as_deref(), Some("Widget"));
        assert_eq!(record.manufacturer, None);
        assert_eq!(record.weight, None);
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_incoming_product_reads_confidence_scores() {
        let json = r#"{
            "name": "Widget Pro",
            "barcode": "123",
            "confidence_scores": {"name": 0.9, "constructeur": 0.4}
        }"#;
        let incoming: IncomingProduct = serde_json::from_str(json).unwrap();
        assert_eq!(incoming.record.name.as_deref(), Some("Widget Pro"));
        assert_eq!(incoming.confidence.get(ProductField::Name), Some(0.9));
        assert_eq!(incoming.confidence.get(ProductField::Manufacturer), Some(0.4));
        assert!(incoming.record.extra.is_empty());
    }

    #[test]
    fn test_stored_product_new() {
        let product = StoredProduct::new(ProductRecord::new().with(ProductField::Name, "Widget"));
        assert_eq!(product.status, ExtractionStatus::Raw);
        assert_eq!(product.image_count, 0);
        assert_eq!(product.created_at, product.updated_at);

        let summary = ProductSummary::from(&product);
        assert_eq!(summary.id, product.id);
        assert_eq!(summary.name.as_deref(), Some("Widget"));
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Enriched".parse::<ExtractionStatus>().unwrap(), ExtractionStatus::Enriched);
        assert!("done".parse::<ExtractionStatus>().is_err());
        assert_eq!(ExtractionStatus::Exported.to_string(), "exported");
    }
}
