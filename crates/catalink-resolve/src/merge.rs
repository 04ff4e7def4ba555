//! Confidence-weighted merge of an incoming record into the stored product
//! that already owns its identity.

use catalink_core::{
    CatalinkError, ExtractionStatus, FieldConfidence, Filter, IncomingProduct, ProductField,
    ProductPatch, ProductRecord, ProductSource, ProductStore, StoredProduct,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ResolveError, Result};

/// Errors kept in an `ImportReport`; later failures are only counted.
pub const MAX_REPORTED_ERRORS: usize = 10;

/// The update that merging an incoming record into `existing` amounts to.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub patch: ProductPatch,
    pub fields_updated: Vec<ProductField>,
}

/// Decide, field by field, which incoming values replace stored ones.
///
/// A non-blank incoming value wins when the stored field is empty or when its
/// confidence is strictly higher than the stored confidence; fields without a
/// score count as `default_confidence`. Incoming sources are appended.
pub fn plan_merge(
    existing: &StoredProduct,
    incoming: &ProductRecord,
    confidence: &FieldConfidence,
    sources: &[ProductSource],
    default_confidence: f32,
) -> MergePlan {
    let mut patch = ProductPatch::default();
    let mut merged_confidence = existing.confidence.clone();
    let mut fields_updated = Vec::new();

    for (field, value) in incoming.present_fields() {
        let existing_conf = existing.confidence.score_or(field, default_confidence);
        let new_conf = confidence.score_or(field, default_confidence);
        let existing_empty = existing.record.get(field).is_none();

        if existing_empty || new_conf > existing_conf {
            patch.fields.insert(field, value);
            merged_confidence.set(field, new_conf);
            fields_updated.push(field);
        }
    }

    if !fields_updated.is_empty() {
        patch.confidence = Some(merged_confidence);
        if existing.status == ExtractionStatus::Raw {
            patch.status = Some(ExtractionStatus::Enriched);
        }
    }
    if !sources.is_empty() {
        let mut all_sources = existing.sources.clone();
        all_sources.extend_from_slice(sources);
        patch.sources = Some(all_sources);
    }

    MergePlan {
        patch,
        fields_updated,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedProduct {
    pub product: StoredProduct,
    pub fields_updated: Vec<ProductField>,
}

#[derive(Debug)]
pub enum CreateOutcome {
    Created(StoredProduct),
    Merged {
        product: StoredProduct,
        fields_updated: Vec<ProductField>,
    },
    Failed(ResolveError),
}

impl CreateOutcome {
    pub fn product(&self) -> Option<&StoredProduct> {
        match self {
            Self::Created(product) | Self::Merged { product, .. } => Some(product),
            Self::Failed(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Merged { .. } => "merged",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportError {
    pub index: usize,
    pub identity: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub total: usize,
    pub created: usize,
    pub merged: usize,
    pub failed: usize,
    /// The first `MAX_REPORTED_ERRORS` failures.
    pub errors: Vec<ImportError>,
}

/// Creates products, falling back to a merge when the store reports that the
/// identity is already taken.
pub struct FieldMerger<'a, S: ProductStore + ?Sized> {
    store: &'a S,
    default_confidence: f32,
}

impl<'a, S: ProductStore + ?Sized> FieldMerger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            default_confidence: 0.5,
        }
    }

    pub fn with_default_confidence(mut self, confidence: f32) -> Self {
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Merge `incoming` into the stored product owning its identity and return
    /// the product as stored afterwards.
    ///
    /// The identity is the first present of internal code, barcode, EAN. The
    /// merge is written as one update; on any failure nothing is written.
    pub fn merge_into_existing(&self, incoming: &IncomingProduct) -> Result<MergedProduct> {
        let (field, value) = incoming.record.identity().ok_or_else(|| {
            ResolveError::Validation(
                "record has no default_code, barcode or code_ean to merge on".to_string(),
            )
        })?;
        let not_found = || ResolveError::NotFound {
            field,
            value: value.to_string(),
        };

        let existing = self
            .store
            .find_one(&Filter::eq(field.field(), value))?
            .ok_or_else(not_found)?;

        let plan = plan_merge(
            &existing,
            &incoming.record,
            &incoming.confidence,
            &incoming.sources,
            self.default_confidence,
        );

        let modified = self
            .store
            .update(&existing.id, &plan.patch)
            .map_err(|e| match e {
                CatalinkError::UniqueViolation { field, value } => {
                    ResolveError::StoreConflict { field, value }
                }
                other => ResolveError::Store(other),
            })?;
        if modified == 0 {
            return Err(not_found());
        }

        let product = self.store.get(&existing.id)?.ok_or_else(not_found)?;
        info!(
            id = %product.id,
            identity = %field,
            fields_updated = plan.fields_updated.len(),
            "merged into existing product"
        );

        Ok(MergedProduct {
            product,
            fields_updated: plan.fields_updated,
        })
    }

    /// Insert `incoming` as a new product, or merge it when its identity is taken.
    pub fn create_or_merge(&self, incoming: &IncomingProduct) -> CreateOutcome {
        let product = StoredProduct::new(incoming.record.clone())
            .with_confidence(incoming.confidence.clone())
            .with_sources(incoming.sources.clone());

        match self.store.insert(product) {
            Ok(created) => CreateOutcome::Created(created),
            Err(CatalinkError::UniqueViolation { field, value }) => {
                warn!(identity = %field, value = %value, "identity taken, merging into existing product");
                match self.merge_into_existing(incoming) {
                    Ok(merged) => CreateOutcome::Merged {
                        product: merged.product,
                        fields_updated: merged.fields_updated,
                    },
                    Err(e) => CreateOutcome::Failed(e),
                }
            }
            Err(e) => CreateOutcome::Failed(ResolveError::Store(e)),
        }
    }

    /// Create-or-merge every record in order.
    pub fn import_batch(&self, records: &[IncomingProduct]) -> ImportReport {
        let mut report = ImportReport {
            total: records.len(),
            ..Default::default()
        };

        for (index, incoming) in records.iter().enumerate() {
            match self.create_or_merge(incoming) {
                CreateOutcome::Created(_) => report.created += 1,
                CreateOutcome::Merged { .. } => report.merged += 1,
                CreateOutcome::Failed(e) => {
                    report.failed += 1;
                    if report.errors.len() < MAX_REPORTED_ERRORS {
                        report.errors.push(ImportError {
                            index,
                            identity: incoming.record.identity().map(|(_, v)| v.to_string()),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            total = report.total,
            created = report.created,
            merged = report.merged,
            failed = report.failed,
            "import finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalink_core::{Database, FieldValue, IdentityField};

    fn stored(name: &str, conf: f32) -> StoredProduct {
        StoredProduct::new(
            ProductRecord::new()
                .with(ProductField::DefaultCode, "AB-1")
                .with(ProductField::Name, name),
        )
        .with_confidence(FieldConfidence::new().with(ProductField::Name, conf))
    }

    #[test]
    fn higher_confidence_overwrites() {
        let existing = stored("Widget", 0.5);
        let incoming = ProductRecord::new().with(ProductField::Name, "Widget Pro");
        let conf = FieldConfidence::new().with(ProductField::Name, 0.9);

        let plan = plan_merge(&existing, &incoming, &conf, &[], 0.5);
        assert_eq!(plan.fields_updated, vec![ProductField::Name]);
        assert_eq!(
            plan.patch.fields.get(&ProductField::Name),
            Some(&FieldValue::from("Widget Pro"))
        );
        let merged_conf = plan.patch.confidence.unwrap();
        assert_eq!(merged_conf.get(ProductField::Name), Some(0.9));
        assert_eq!(plan.patch.status, Some(ExtractionStatus::Enriched));
    }

    #[test]
    fn lower_confidence_is_ignored() {
        let existing = stored("Widget", 0.9);
        let incoming = ProductRecord::new().with(ProductField::Name, "Widget2");
        let conf = FieldConfidence::new().with(ProductField::Name, 0.3);

        let plan = plan_merge(&existing, &incoming, &conf, &[], 0.5);
        assert!(plan.fields_updated.is_empty());
        assert!(plan.patch.fields.is_empty());
        assert!(plan.patch.confidence.is_none());
    }

    #[test]
    fn equal_confidence_keeps_existing() {
        let existing = stored("Widget", 0.5);
        let incoming = ProductRecord::new().with(ProductField::Name, "Other");
        let plan = plan_merge(&existing, &incoming, &FieldConfidence::new(), &[], 0.5);
        assert!(plan.fields_updated.is_empty());
    }

    #[test]
    fn empty_existing_field_is_filled_regardless_of_confidence() {
        let existing = stored("Widget", 0.9);
        let incoming = ProductRecord::new().with(ProductField::Manufacturer, "Acme");
        let conf = FieldConfidence::new().with(ProductField::Manufacturer, 0.1);

        let plan = plan_merge(&existing, &incoming, &conf, &[], 0.5);
        assert_eq!(plan.fields_updated, vec![ProductField::Manufacturer]);
        let merged_conf = plan.patch.confidence.unwrap();
        assert_eq!(merged_conf.get(ProductField::Manufacturer), Some(0.1));
        assert_eq!(merged_conf.get(ProductField::Name), Some(0.9));
    }

    #[test]
    fn blank_and_null_incoming_values_are_skipped() {
        let existing = stored("Widget", 0.1);
        let mut incoming = ProductRecord::new();
        incoming.name = Some("null".to_string());
        incoming.manufacturer = Some("   ".to_string());
        let conf = FieldConfidence::new()
            .with(ProductField::Name, 1.0)
            .with(ProductField::Manufacturer, 1.0);

        let plan = plan_merge(&existing, &incoming, &conf, &[], 0.5);
        assert!(plan.fields_updated.is_empty());
    }

    #[test]
    fn sources_are_concatenated() {
        let mut existing = stored("Widget", 0.5);
        existing.sources = vec![ProductSource::new("a.pdf", "llm")];
        let extra = vec![ProductSource::new("a.pdf", "llm"), ProductSource::new("b.xlsx", "table")];

        let plan = plan_merge(&existing, &ProductRecord::new(), &FieldConfidence::new(), &extra, 0.5);
        assert_eq!(plan.patch.sources.unwrap().len(), 3);
        assert!(plan.fields_updated.is_empty());
    }

    #[test]
    fn validated_status_is_not_downgraded() {
        let mut existing = stored("Widget", 0.5);
        existing.status = ExtractionStatus::Validated;
        let incoming = ProductRecord::new().with(ProductField::Weight, 1.5);
        let plan = plan_merge(&existing, &incoming, &FieldConfidence::new(), &[], 0.5);
        assert_eq!(plan.fields_updated, vec![ProductField::Weight]);
        assert_eq!(plan.patch.status, None);
    }

    #[test]
    fn merge_without_identity_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let incoming = IncomingProduct::new(ProductRecord::new().with(ProductField::Name, "Widget"));
        let err = FieldMerger::new(&db).merge_into_existing(&incoming).unwrap_err();
        assert!(matches!(err, ResolveError::Validation(_)));
    }

    #[test]
    fn merge_without_existing_record_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let incoming =
            IncomingProduct::new(ProductRecord::new().with(ProductField::Barcode, "123"));
        let err = FieldMerger::new(&db).merge_into_existing(&incoming).unwrap_err();
        match err {
            ResolveError::NotFound { field, value } => {
                assert_eq!(field, IdentityField::Barcode);
                assert_eq!(value, "123");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn create_then_merge() {
        let db = Database::open_in_memory().unwrap();
        let merger = FieldMerger::new(&db);

        let first = IncomingProduct::new(
            ProductRecord::new()
                .with(ProductField::DefaultCode, "AB-1")
                .with(ProductField::Name, "Widget"),
        );
        assert!(matches!(merger.create_or_merge(&first), CreateOutcome::Created(_)));

        let mut second = IncomingProduct::new(
            ProductRecord::new()
                .with(ProductField::DefaultCode, "AB-1")
                .with(ProductField::Name, "Widget Pro")
                .with(ProductField::Manufacturer, "Acme"),
        );
        second.confidence = FieldConfidence::new().with(ProductField::Name, 0.9);
        second.sources = vec![ProductSource::new("catalogue.pdf", "llm")];

        match merger.create_or_merge(&second) {
            CreateOutcome::Merged {
                product,
                fields_updated,
            } => {
                assert_eq!(product.record.name.as_deref(), Some("Widget Pro"));
                assert_eq!(product.record.manufacturer.as_deref(), Some("Acme"));
                assert_eq!(product.confidence.get(ProductField::Name), Some(0.9));
                assert_eq!(product.sources.len(), 1);
                assert_eq!(product.status, ExtractionStatus::Enriched);
                assert!(fields_updated.contains(&ProductField::Name));
                assert!(!fields_updated.contains(&ProductField::DefaultCode));
            }
            other => panic!("expected merge, got {}", other.label()),
        }
        assert_eq!(db.count(&Filter::all()).unwrap(), 1);
    }

    #[test]
    fn import_batch_counts_outcomes() {
        let db = Database::open_in_memory().unwrap();
        let merger = FieldMerger::new(&db);
        let records: Vec<IncomingProduct> = ["AB-1", "AB-2", "AB-1", "AB-3", "AB-2"]
            .iter()
            .map(|code| {
                IncomingProduct::new(ProductRecord::new().with(ProductField::DefaultCode, *code))
            })
            .collect();

        let report = merger.import_batch(&records);
        assert_eq!(report.total, 5);
        assert_eq!(report.created, 3);
        assert_eq!(report.merged, 2);
        assert_eq!(report.failed, 0);
        assert!(report.errors.is_empty());
    }
}
