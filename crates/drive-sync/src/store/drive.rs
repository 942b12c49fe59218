//! [`BlobStore`] over the Drive REST client.

use async_trait::async_trait;

use super::{BlobRef, BlobStore};
use crate::client::DriveClient;
use crate::error::Result;
use crate::types::DriveFile;

const JSON_MIME_TYPE: &str = "application/json";

impl From<DriveFile> for BlobRef {
    fn from(file: DriveFile) -> Self {
        Self {
            id: file.id,
            name: file.name,
        }
    }
}

#[async_trait]
impl BlobStore for DriveClient {
    async fn ensure_folder(&self, name: &str, parent: Option<&str>) -> Result<String> {
        if let Some(folder) = self.find_by_name(parent, name, true).await? {
            return Ok(folder.id);
        }
        let folder = self.create_folder(name, parent).await?;
        log::info!("[InventorySync] Created Drive folder {} ({})", name, folder.id);
        Ok(folder.id)
    }

    async fn find(&self, folder_id: &str, name: &str) -> Result<Option<BlobRef>> {
        Ok(self
            .find_by_name(Some(folder_id), name, false)
            .await?
            .map(BlobRef::from))
    }

    async fn list(&self, folder_id: &str, prefix: &str) -> Result<Vec<BlobRef>> {
        // Drive only offers `contains`; the prefix is enforced here.
        Ok(self
            .list_in_folder(folder_id, prefix)
            .await?
            .into_iter()
            .filter(|file| file.name.starts_with(prefix))
            .map(BlobRef::from)
            .collect())
    }

    async fn read_text(&self, blob_id: &str) -> Result<String> {
        self.download_text(blob_id).await
    }

    async fn create(&self, folder_id: &str, name: &str, content: &str) -> Result<BlobRef> {
        Ok(self
            .create_file(folder_id, name, JSON_MIME_TYPE, content)
            .await?
            .into())
    }

    async fn overwrite(&self, blob_id: &str, content: &str) -> Result<()> {
        self.update_file(blob_id, JSON_MIME_TYPE, content).await
    }
}
