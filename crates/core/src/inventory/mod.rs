//! Items, storage units and their meta vocabularies.

mod decode;
mod meta;
mod model;

pub use decode::*;
pub use meta::*;
pub use model::*;
