use catalink_core::{GroupSpec, IdentityField, IdentityGroupRow, ProductStore, ProductSummary};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;

/// Stored products sharing one identity value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub identity_value: String,
    pub member_count: usize,
    /// Oldest first.
    pub members: Vec<ProductSummary>,
}

impl From<IdentityGroupRow> for DuplicateGroup {
    fn from(row: IdentityGroupRow) -> Self {
        Self {
            identity_value: row.value,
            member_count: row.count,
            members: row.members,
        }
    }
}

/// Surfaces clusters of products that share an identity value, for review.
pub struct DuplicateGrouper<'a, S: ProductStore + ?Sized> {
    store: &'a S,
    field: IdentityField,
}

impl<'a, S: ProductStore + ?Sized> DuplicateGrouper<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            field: IdentityField::DefaultCode,
        }
    }

    pub fn with_field(mut self, field: IdentityField) -> Self {
        self.field = field;
        self
    }

    pub fn field(&self) -> IdentityField {
        self.field
    }

    /// Groups with at least `min_count` members (never fewer than two),
    /// largest first, then by identity value. Returns one page of groups and
    /// the number of qualifying groups before pagination.
    pub fn find_duplicate_groups(
        &self,
        min_count: usize,
        skip: usize,
        limit: usize,
    ) -> Result<(Vec<DuplicateGroup>, usize)> {
        let spec = GroupSpec {
            field: self.field,
            min_count: min_count.max(2),
            skip,
            limit,
        };
        debug!(field = %spec.field, min_count = spec.min_count, skip, limit, "grouping by identity");

        let (rows, total) = self.store.aggregate_groups(&spec)?;
        let groups: Vec<DuplicateGroup> = rows.into_iter().map(DuplicateGroup::from).collect();

        info!(field = %self.field, total, returned = groups.len(), "duplicate groups found");
        Ok((groups, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalink_core::{Database, DatabaseConfig, ProductField, ProductRecord, StoredProduct};

    fn audit_db() -> Database {
        Database::open_in_memory_with(&DatabaseConfig {
            unique_identity: false,
        })
        .unwrap()
    }

    fn add(db: &Database, field: ProductField, value: &str, name: &str) {
        let record = ProductRecord::new()
            .with(field, value)
            .with(ProductField::Name, name);
        db.insert(StoredProduct::new(record)).unwrap();
    }

    #[test]
    fn groups_by_internal_code() {
        let db = audit_db();
        for name in ["one", "two", "three"] {
            add(&db, ProductField::DefaultCode, "A1", name);
        }
        add(&db, ProductField::DefaultCode, "B2", "four");

        let (groups, total) = DuplicateGrouper::new(&db)
            .find_duplicate_groups(2, 0, 50)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].identity_value, "A1");
        assert_eq!(groups[0].member_count, 3);
        let names: Vec<_> = groups[0]
            .members
            .iter()
            .map(|m| m.name.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn min_count_below_two_is_raised() {
        let db = audit_db();
        add(&db, ProductField::DefaultCode, "A1", "solo");
        let (groups, total) = DuplicateGrouper::new(&db)
            .find_duplicate_groups(1, 0, 50)
            .unwrap();
        assert!(groups.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn pagination_keeps_total() {
        let db = audit_db();
        for code in ["C3", "A1", "B2"] {
            add(&db, ProductField::DefaultCode, code, "x");
            add(&db, ProductField::DefaultCode, code, "y");
        }
        add(&db, ProductField::DefaultCode, "B2", "z");

        let grouper = DuplicateGrouper::new(&db);
        let (first, total) = grouper.find_duplicate_groups(2, 0, 2).unwrap();
        assert_eq!(total, 3);
        let values: Vec<_> = first.iter().map(|g| g.identity_value.as_str()).collect();
        assert_eq!(values, vec!["B2", "A1"]);

        let (rest, total) = grouper.find_duplicate_groups(2, 2, 2).unwrap();
        assert_eq!(total, 3);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].identity_value, "C3");
    }

    #[test]
    fn groups_by_barcode() {
        let db = audit_db();
        add(&db, ProductField::Barcode, "4006381333931", "a");
        add(&db, ProductField::Barcode, "4006381333931", "b");
        add(&db, ProductField::DefaultCode, "A1", "c");

        let grouper = DuplicateGrouper::new(&db).with_field(IdentityField::Barcode);
        assert_eq!(grouper.field(), IdentityField::Barcode);
        let (groups, total) = grouper.find_duplicate_groups(2, 0, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(groups[0].identity_value, "4006381333931");
        assert_eq!(groups[0].members[0].barcode.as_deref(), Some("4006381333931"));
    }

    #[test]
    fn unique_store_has_no_groups() {
        let db = Database::open_in_memory().unwrap();
        add(&db, ProductField::DefaultCode, "A1", "only");
        let (groups, total) = DuplicateGrouper::new(&db)
            .find_duplicate_groups(2, 0, 50)
            .unwrap();
        assert!(groups.is_empty());
        assert_eq!(total, 0);
    }
}
