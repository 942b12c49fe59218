//! In-process [`BlobStore`] for tests and offline hosts.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BlobRef, BlobStore};
use crate::error::{DriveSyncError, Result};

#[derive(Debug)]
struct Folder {
    id: String,
    name: String,
    parent: Option<String>,
}

#[derive(Debug)]
struct Blob {
    id: String,
    folder_id: String,
    name: String,
    content: String,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    folders: Vec<Folder>,
    blobs: Vec<Blob>,
    creates: usize,
    overwrites: usize,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn insert_blob(&mut self, folder_id: &str, name: &str, content: &str) -> BlobRef {
        let id = self.next_id("blob");
        self.blobs.push(Blob {
            id: id.clone(),
            folder_id: folder_id.to_string(),
            name: name.to_string(),
            content: content.to_string(),
        });
        BlobRef {
            id,
            name: name.to_string(),
        }
    }
}

/// Blob store kept in memory. Counts writes and can simulate outages.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    inner: Mutex<Inner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

fn unavailable() -> DriveSyncError {
    DriveSyncError::api(503, "blob store unavailable")
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every read (`read_text`) fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every write (`create`, `overwrite`) fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seeds a blob without counting it as a write.
    pub async fn insert(&self, folder_id: &str, name: &str, content: &str) -> BlobRef {
        self.inner.lock().await.insert_blob(folder_id, name, content)
    }

    /// Creates and overwrites performed through [`BlobStore`].
    pub async fn write_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.creates + inner.overwrites
    }

    pub async fn folder_id(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .folders
            .iter()
            .find(|folder| folder.name == name)
            .map(|folder| folder.id.clone())
    }

    pub async fn content(&self, folder_id: &str, name: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .blobs
            .iter()
            .find(|blob| blob.folder_id == folder_id && blob.name == name)
            .map(|blob| blob.content.clone())
    }

    pub async fn blob_names(&self, folder_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .blobs
            .iter()
            .filter(|blob| blob.folder_id == folder_id)
            .map(|blob| blob.name.clone())
            .collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn ensure_folder(&self, name: &str, parent: Option<&str>) -> Result<String> {
        let mut inner = self.inner.lock().await;
        if let Some(folder) = inner
            .folders
            .iter()
            .find(|folder| folder.name == name && folder.parent.as_deref() == parent)
        {
            return Ok(folder.id.clone());
        }
        let id = inner.next_id("folder");
        inner.folders.push(Folder {
            id: id.clone(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
        });
        Ok(id)
    }

    async fn find(&self, folder_id: &str, name: &str) -> Result<Option<BlobRef>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .blobs
            .iter()
            .find(|blob| blob.folder_id == folder_id && blob.name == name)
            .map(|blob| BlobRef {
                id: blob.id.clone(),
                name: blob.name.clone(),
            }))
    }

    async fn list(&self, folder_id: &str, prefix: &str) -> Result<Vec<BlobRef>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .blobs
            .iter()
            .filter(|blob| blob.folder_id == folder_id && blob.name.starts_with(prefix))
            .map(|blob| BlobRef {
                id: blob.id.clone(),
                name: blob.name.clone(),
            })
            .collect())
    }

    async fn read_text(&self, blob_id: &str) -> Result<String> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let inner = self.inner.lock().await;
        inner
            .blobs
            .iter()
            .find(|blob| blob.id == blob_id)
            .map(|blob| blob.content.clone())
            .ok_or_else(|| DriveSyncError::api(404, format!("File not found: {}", blob_id)))
    }

    async fn create(&self, folder_id: &str, name: &str, content: &str) -> Result<BlobRef> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut inner = self.inner.lock().await;
        inner.creates += 1;
        Ok(inner.insert_blob(folder_id, name, content))
    }

    async fn overwrite(&self, blob_id: &str, content: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut inner = self.inner.lock().await;
        let blob = inner
            .blobs
            .iter_mut()
            .find(|blob| blob.id == blob_id)
            .ok_or_else(|| DriveSyncError::api(404, format!("File not found: {}", blob_id)))?;
        blob.content = content.to_string();
        inner.overwrites += 1;
        Ok(())
    }
}
