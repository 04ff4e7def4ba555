pub mod gtin;

pub use gtin::{Gtin, lookup_values};
