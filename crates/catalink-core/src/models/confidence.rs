use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ProductField;

/// Per-field confidence in `[0, 1]`, keyed by canonical field name.
///
/// Keys in upstream spellings (`constructeur`, `Code_EAN`, ...) are folded to
/// their canonical name on the way in; unknown keys are kept as given. A
/// `null` score means the field was not scored and is dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Option<f32>>")]
pub struct FieldConfidence(BTreeMap<String, f32>);

impl FieldConfidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: ProductField) -> Option<f32> {
        self.0.get(field.as_str()).copied()
    }

    pub fn set(&mut self, field: ProductField, score: f32) {
        self.0.insert(field.as_str().to_string(), clamp_score(score));
    }

    pub fn with(mut self, field: ProductField, score: f32) -> Self {
        self.set(field, score);
        self
    }

    /// Stored score for `field`, or `default` when the field was never scored.
    pub fn score_or(&self, field: ProductField, default: f32) -> f32 {
        self.get(field).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Option<f32>>> for FieldConfidence {
    fn from(raw: BTreeMap<String, Option<f32>>) -> Self {
        Self(
            raw.into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .filter(|(_, v)| v.is_finite())
                .map(|(k, v)| (canonical_key(&k), clamp_score(v)))
                .collect(),
        )
    }
}

fn canonical_key(key: &str) -> String {
    ProductField::from_key(key)
        .map(|f| f.as_str().to_string())
        .unwrap_or_else(|| key.to_string())
}

fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_fold_to_canonical_keys() {
        let conf: FieldConfidence =
            serde_json::from_str(r#"{"constructeur": 0.8, "Code_EAN": 0.6, "custom": 0.1}"#)
                .unwrap();
        assert_eq!(conf.get(ProductField::Manufacturer), Some(0.8));
        assert_eq!(conf.get(ProductField::CodeEan), Some(0.6));
        assert_eq!(conf.get(ProductField::ManufacturerRef), None);
        assert_eq!(conf.len(), 3);
    }

    #[test]
    fn test_null_scores_are_dropped() {
        let conf: FieldConfidence =
            serde_json::from_str(r#"{"name": null, "constructeur": 0.8}"#).unwrap();
        assert_eq!(conf.get(ProductField::Name), None);
        assert_eq!(conf.get(ProductField::Manufacturer), Some(0.8));
        assert_eq!(conf.len(), 1);

        let conf: FieldConfidence = serde_json::from_str(r#"{"name": null}"#).unwrap();
        assert!(conf.is_empty());
    }

    #[test]
    fn test_scores_are_clamped() {
        let conf: FieldConfidence = serde_json::from_str(r#"{"name": 1.7, "weight": -2}"#).unwrap();
        assert_eq!(conf.get(ProductField::Name), Some(1.0));
        assert_eq!(conf.get(ProductField::Weight), Some(0.0));

        let conf = FieldConfidence::new().with(ProductField::Barcode, 3.0);
        assert_eq!(conf.get(ProductField::Barcode), Some(1.0));
    }

    #[test]
    fn test_score_or_default() {
        let conf = FieldConfidence::new().with(ProductField::Name, 0.9);
        assert_eq!(conf.score_or(ProductField::Name, 0.5), 0.9);
        assert_eq!(conf.score_or(ProductField::Barcode, 0.5), 0.5);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let conf = FieldConfidence::new().with(ProductField::Name, 0.5);
        let json = serde_json::to_string(&conf).unwrap();
        assert_eq!(json, r#"{"name":0.5}"#);
    }
}
