mod duplicates;
mod stats;

pub use duplicates::{GroupSpec, IdentityGroupQuery, IdentityGroupRow};
pub use stats::{ProductStats, ProductStatsQuery};
