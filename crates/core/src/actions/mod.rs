//! Action model: the mutation vocabulary, its validation and deterministic replay.

mod model;
mod replay;
mod validation;

pub use model::*;
pub use replay::{apply_actions, compare_actions, sort_actions, Replayed};
pub use validation::{validate, Field, ValidationErrors};
