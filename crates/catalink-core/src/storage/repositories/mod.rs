pub(crate) mod product_repository;

pub use product_repository::{ProductRepository, SqliteProductRepository};

use crate::error::Result;

pub trait Repository {
    type Entity;
    type Id;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>>;
    fn insert(&self, entity: &Self::Entity) -> Result<()>;
}
