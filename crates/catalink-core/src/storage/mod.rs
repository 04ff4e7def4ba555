pub mod database;
pub mod filter;
pub mod queries;
pub mod repositories;
pub mod store;
