//! Drive-backed sync for Inventora.
//!
//! Pushes locally queued actions as immutable log blobs, folds remote history
//! into the client session, and periodically compacts the shared log into the
//! master snapshots. Storage goes through [`BlobStore`]; [`DriveClient`] is the
//! production implementation.

pub mod auth;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod store;
pub mod types;

pub use auth::{AuthSession, SharedAuthSession};
pub use client::DriveClient;
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncScheduler};
pub use error::{DriveSyncError, Result};
pub use store::{BlobRef, BlobStore, MemoryBlobStore};
