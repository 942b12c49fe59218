//! Drive REST API request and response types.

use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// File resource fields requested from Drive.
pub const FILE_FIELDS: &str = "id,name,mimeType";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// One page of `files.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata part of a multipart create request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileMetadata<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<&'a str>,
}

/// Google API error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// OpenID Connect userinfo response.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserInfo {
    /// Identity recorded as the actor of new actions.
    pub fn actor_id(&self) -> &str {
        self.email
            .as_deref()
            .filter(|email| !email.is_empty())
            .unwrap_or(&self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_list_without_token_is_last_page() {
        let page: FileList = serde_json::from_str(
            r#"{"files": [{"id": "1", "name": "inventory.json", "mimeType": "application/json"}]}"#,
        )
        .expect("decode page");
        assert_eq!(page.files.len(), 1);
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn actor_falls_back_to_subject() {
        let info: UserInfo = serde_json::from_str(r#"{"sub": "1234"}"#).expect("decode");
        assert_eq!(info.actor_id(), "1234");
        let info: UserInfo =
            serde_json::from_str(r#"{"sub": "1234", "email": "ana@example.com"}"#).expect("decode");
        assert_eq!(info.actor_id(), "ana@example.com");
    }
}
