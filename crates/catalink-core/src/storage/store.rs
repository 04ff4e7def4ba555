use uuid::Uuid;

use crate::error::Result;
use crate::models::{ProductPatch, StoredProduct};
use crate::storage::filter::Filter;
use crate::storage::queries::{GroupSpec, IdentityGroupRow};

/// The operations resolution needs from product storage.
///
/// Implementations must enforce identity uniqueness atomically on `insert`
/// and `update`, reporting a collision as `CatalinkError::UniqueViolation`,
/// and return `find` results in creation order.
pub trait ProductStore {
    fn find(&self, filter: &Filter, limit: usize) -> Result<Vec<StoredProduct>>;

    fn find_one(&self, filter: &Filter) -> Result<Option<StoredProduct>> {
        Ok(self.find(filter, 1)?.into_iter().next())
    }

    fn get(&self, id: &Uuid) -> Result<Option<StoredProduct>>;

    fn count(&self, filter: &Filter) -> Result<usize>;

    /// Persist a new product and return it as stored.
    fn insert(&self, product: StoredProduct) -> Result<StoredProduct>;

    /// Apply `patch` to one product; returns the number of records modified.
    fn update(&self, id: &Uuid, patch: &ProductPatch) -> Result<usize>;

    fn aggregate_groups(&self, spec: &GroupSpec) -> Result<(Vec<IdentityGroupRow>, usize)>;
}
