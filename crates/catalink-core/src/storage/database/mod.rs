mod connection;
mod migrations;
pub mod schema;

pub use connection::ConnectionPool;
pub use migrations::{Migration, get_applied_versions, run_migrations};
pub use schema::{SCHEMA_VERSION, init_schema};

use std::path::Path;

use uuid::Uuid;

use crate::error::{CatalinkError, Result};
use crate::models::{ProductPatch, StoredProduct};

use super::filter::Filter;
use super::queries::{GroupSpec, IdentityGroupQuery, IdentityGroupRow, ProductStats, ProductStatsQuery};
use super::repositories::{ProductRepository, Repository, SqliteProductRepository};
use super::store::ProductStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Reject a second product with the same identity value. Fixed when the
    /// database file is created; audit copies of legacy data turn it off.
    pub unique_identity: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            unique_identity: true,
        }
    }
}

fn prepare(pool: &ConnectionPool, config: &DatabaseConfig) -> Result<()> {
    let conn = pool.get_connection();
    migrations::run_migrations(&conn)?;
    schema::create_identity_indexes(&conn, config.unique_identity)?;
    Ok(())
}

pub fn open_database(path: &Path, config: &DatabaseConfig) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    prepare(&pool, config)?;
    Ok(pool)
}

pub fn open_in_memory(config: &DatabaseConfig) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    prepare(&pool, config)?;
    Ok(pool)
}

/// SQLite-backed product store.
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &DatabaseConfig::default())
    }

    pub fn open_with(path: &Path, config: &DatabaseConfig) -> Result<Self> {
        let pool = open_database(path, config)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(&DatabaseConfig::default())
    }

    pub fn open_in_memory_with(config: &DatabaseConfig) -> Result<Self> {
        let pool = open_in_memory(config)?;
        Ok(Self { pool })
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }

    pub fn identity_is_unique(&self) -> Result<bool> {
        let conn = self.pool.get_connection();
        schema::identity_is_unique(&conn)
    }

    pub fn schema_versions(&self) -> Result<Vec<u32>> {
        let conn = self.pool.get_connection();
        migrations::get_applied_versions(&conn)
    }

    pub fn get_product(&self, id: &str) -> Result<StoredProduct> {
        let uuid =
            Uuid::parse_str(id).map_err(|_| CatalinkError::ProductNotFound(id.to_string()))?;
        self.get(&uuid)?
            .ok_or_else(|| CatalinkError::ProductNotFound(id.to_string()))
    }

    pub fn stats(&self) -> Result<ProductStats> {
        let conn = self.pool.get_connection();
        ProductStatsQuery::new(conn).get_stats()
    }
}

impl ProductStore for Database {
    fn find(&self, filter: &Filter, limit: usize) -> Result<Vec<StoredProduct>> {
        let conn = self.pool.get_connection();
        let repo = SqliteProductRepository::new(conn);
        repo.find(filter, limit)
    }

    fn get(&self, id: &Uuid) -> Result<Option<StoredProduct>> {
        let conn = self.pool.get_connection();
        let repo = SqliteProductRepository::new(conn);
        repo.find_by_id(id)
    }

    fn count(&self, filter: &Filter) -> Result<usize> {
        let conn = self.pool.get_connection();
        let repo = SqliteProductRepository::new(conn);
        repo.count(filter)
    }

    fn insert(&self, product: StoredProduct) -> Result<StoredProduct> {
        let conn = self.pool.get_connection();
        let repo = SqliteProductRepository::new(conn);
        repo.insert(&product)?;
        repo.find_by_id(&product.id)?
            .ok_or_else(|| CatalinkError::ProductNotFound(product.id.to_string()))
    }

    fn update(&self, id: &Uuid, patch: &ProductPatch) -> Result<usize> {
        let conn = self.pool.get_connection();
        let repo = SqliteProductRepository::new(conn);
        repo.update(id, patch)
    }

    fn aggregate_groups(&self, spec: &GroupSpec) -> Result<(Vec<IdentityGroupRow>, usize)> {
        let conn = self.pool.get_connection();
        IdentityGroupQuery::new(conn).run(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionStatus, IdentityField, ProductField, ProductRecord};
    use tempfile::TempDir;

    fn coded(code: &str) -> StoredProduct {
        StoredProduct::new(ProductRecord::new().with(ProductField::DefaultCode, code))
    }

    #[test]
    fn test_open_in_memory_applies_schema() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_versions().unwrap(), vec![SCHEMA_VERSION]);
        assert!(db.identity_is_unique().unwrap());
        assert!(db.path().is_none());
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("catalink.db");

        let id = {
            let db = Database::open(&path).unwrap();
            db.insert(coded("AB-1")).unwrap().id
        };

        let db = Database::open(&path).unwrap();
        let product = db.get_product(&id.to_string()).unwrap();
        assert_eq!(product.record.default_code.as_deref(), Some("AB-1"));
        assert_eq!(db.count(&Filter::all()).unwrap(), 1);
    }

    #[test]
    fn test_insert_returns_stored_product() {
        let db = Database::open_in_memory().unwrap();
        let product = coded("AB-1");
        let stored = db.insert(product.clone()).unwrap();
        assert_eq!(stored.id, product.id);
        assert_eq!(db.get(&stored.id).unwrap(), Some(stored));
    }

    #[test]
    fn test_find_one() {
        let db = Database::open_in_memory().unwrap();
        db.insert(coded("AB-1")).unwrap();
        let hit = db
            .find_one(&Filter::eq(ProductField::DefaultCode, "AB-1"))
            .unwrap();
        assert!(hit.is_some());
        let miss = db
            .find_one(&Filter::eq(ProductField::DefaultCode, "ZZ-9"))
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_get_product_rejects_bad_ids() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_product("not-a-uuid"),
            Err(CatalinkError::ProductNotFound(_))
        ));
        assert!(matches!(
            db.get_product(&Uuid::now_v7().to_string()),
            Err(CatalinkError::ProductNotFound(_))
        ));
    }

    #[test]
    fn test_aggregate_groups_without_unique_identity() {
        let db = Database::open_in_memory_with(&DatabaseConfig {
            unique_identity: false,
        })
        .unwrap();
        assert!(!db.identity_is_unique().unwrap());

        for code in ["A1", "A1", "A1", "B2", "C3", "C3"] {
            db.insert(coded(code)).unwrap();
        }

        let spec = GroupSpec::new(IdentityField::DefaultCode);
        let (groups, total) = db.aggregate_groups(&spec).unwrap();
        assert_eq!(total, 2);
        assert_eq!(groups[0].value, "A1");
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[0].members.len(), 3);
        assert_eq!(groups[1].value, "C3");

        let page = GroupSpec {
            skip: 1,
            limit: 1,
            ..spec
        };
        let (groups, total) = db.aggregate_groups(&page).unwrap();
        assert_eq!(total, 2);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].value, "C3");
    }

    #[test]
    fn test_stats() {
        let db = Database::open_in_memory().unwrap();
        db.insert(coded("AB-1")).unwrap();
        let mut enriched = StoredProduct::new(ProductRecord::new().with(ProductField::Barcode, "123"));
        enriched.status = ExtractionStatus::Enriched;
        enriched.image_count = 2;
        db.insert(enriched).unwrap();
        db.insert(StoredProduct::new(ProductRecord::new().with(ProductField::Name, "Loose")))
            .unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.with_default_code, 1);
        assert_eq!(stats.with_barcode, 1);
        assert_eq!(stats.without_identity, 1);
        assert_eq!(stats.enriched, 1);
        assert_eq!(stats.raw, 2);
        assert_eq!(stats.with_images, 1);
    }
}
