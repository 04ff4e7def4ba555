pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AppConfig, SimilarityMetric};
pub use error::{CatalinkError, ExitCode, Result};
pub use models::*;

pub use storage::database::{ConnectionPool, Database, DatabaseConfig, open_database, open_in_memory};
pub use storage::filter::Filter;
pub use storage::queries::{
    GroupSpec, IdentityGroupQuery, IdentityGroupRow, ProductStats, ProductStatsQuery,
};
pub use storage::repositories::{ProductRepository, Repository, SqliteProductRepository};
pub use storage::store::ProductStore;
