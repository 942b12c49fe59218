//! Inventora core: the event-sourced inventory domain.
//!
//! This crate is free of I/O. It defines the inventory and storage model, the
//! action vocabulary with its validation rules, the deterministic replay that
//! folds an action log into snapshots, and the client-side session state the
//! sync engine drives.

pub mod actions;
pub mod errors;
pub mod inventory;
pub mod sync;
pub mod time;

pub use errors::{Error, Result};
