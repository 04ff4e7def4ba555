//! Catalink resolution: candidate matching, confidence-weighted merging and
//! duplicate grouping over a `ProductStore`.

pub mod dedup;
pub mod error;
pub mod identifiers;
pub mod matching;
pub mod merge;

pub use dedup::{DuplicateGroup, DuplicateGrouper};
pub use error::{ResolveError, Result};
pub use identifiers::Gtin;
pub use matching::{MatchEvaluator, MatchResult, MatchType};
pub use merge::{
    CreateOutcome, FieldMerger, ImportError, ImportReport, MergePlan, MergedProduct, plan_merge,
};
