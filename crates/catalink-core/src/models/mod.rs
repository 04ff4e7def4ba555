pub mod confidence;
pub mod field;
pub mod product;
pub mod source;

pub use confidence::*;
pub use field::*;
pub use product::*;
pub use source::*;
