//! Named-blob storage used by the sync engine.
//!
//! The engine only needs flat CRUD on named blobs inside folders; it never
//! deletes anything.

mod drive;
mod memory;

pub use memory::MemoryBlobStore;

use async_trait::async_trait;

use crate::error::Result;

/// A blob (or folder) as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Finds the folder `name` under `parent` (top level when `None`),
    /// creating it when missing. Returns the folder id.
    async fn ensure_folder(&self, name: &str, parent: Option<&str>) -> Result<String>;

    /// The blob named exactly `name` in `folder_id`.
    async fn find(&self, folder_id: &str, name: &str) -> Result<Option<BlobRef>>;

    /// Every blob in `folder_id` whose name starts with `prefix`.
    async fn list(&self, folder_id: &str, prefix: &str) -> Result<Vec<BlobRef>>;

    async fn read_text(&self, blob_id: &str) -> Result<String>;

    async fn create(&self, folder_id: &str, name: &str, content: &str) -> Result<BlobRef>;

    async fn overwrite(&self, blob_id: &str, content: &str) -> Result<()>;
}
