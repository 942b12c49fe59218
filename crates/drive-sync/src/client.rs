//! Drive REST client for the shared inventory folder.
//!
//! Only the handful of calls the sync engine needs: list a folder by name
//! query (following page tokens), read a file's content, create a file or
//! folder, overwrite a file's content, and resolve the signed-in identity.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::config::SyncConfig;
use crate::error::{DriveSyncError, Result};
use crate::types::*;
use inventora_core::sync::{classify_http_status, SyncRetryClass};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
const LIST_PAGE_SIZE: u32 = 1000;

/// Status shown to the user after Drive rejected the access token.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please sign in again.";

/// Escapes a literal for use inside a single-quoted Drive query string.
fn query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_body(boundary: &str, metadata: &str, mime_type: &str, content: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{b}\r\nContent-Type: {mime_type}\r\n\r\n{content}\r\n--{b}--\r\n",
        b = boundary,
        metadata = metadata,
        mime_type = mime_type,
        content = content
    )
}

/// Client for the Drive v3 API.
#[derive(Clone)]
pub struct DriveClient {
    client: reqwest::Client,
    api_url: String,
    upload_url: String,
    userinfo_url: String,
    auth: Arc<dyn AuthSession>,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("api_url", &self.api_url)
            .field("upload_url", &self.upload_url)
            .finish_non_exhaustive()
    }
}

impl DriveClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("Drive response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("Drive response error ({}): {}", status, preview);
    }

    /// Create a new Drive client using the endpoints from `config`.
    pub fn new(config: &SyncConfig, auth: Arc<dyn AuthSession>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_url: config.drive_api_url.trim_end_matches('/').to_string(),
            upload_url: config.drive_upload_url.trim_end_matches('/').to_string(),
            userinfo_url: config.userinfo_url.clone(),
            auth,
        })
    }

    /// Create headers for an API request.
    async fn headers(&self, content_type: Option<&str>) -> Result<HeaderMap> {
        let token = self
            .auth
            .access_token()
            .await
            .ok_or_else(|| DriveSyncError::auth("Not signed in"))?;

        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| DriveSyncError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        if let Some(content_type) = content_type {
            let value = HeaderValue::from_str(content_type)
                .map_err(|_| DriveSyncError::invalid_request("Invalid content type"))?;
            headers.insert(CONTENT_TYPE, value);
        }

        Ok(headers)
    }

    /// Read a response body, mapping failures to errors.
    ///
    /// 401/403 force a sign-out through the auth session.
    async fn read_body(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if status.is_success() {
            return Ok(body);
        }

        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(error) => match error.error.status {
                Some(code) => format!("{}: {}", code, error.error.message),
                None => error.error.message,
            },
            Err(_) => format!("Request failed: {}", body),
        };

        if classify_http_status(status.as_u16()) == SyncRetryClass::ReauthRequired {
            self.auth.sign_out(SESSION_EXPIRED_MESSAGE).await;
            return Err(DriveSyncError::auth(format!(
                "Drive rejected the session ({}): {}",
                status.as_u16(),
                message
            )));
        }

        Err(DriveSyncError::api(status.as_u16(), message))
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = self.read_body(response).await?;

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize Drive response. Body: {}, Error: {}",
                body,
                e
            );
            DriveSyncError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────

    /// List every file matching a Drive query, following page tokens.
    ///
    /// GET /files?q=...
    pub async fn list_files(&self, query: &str) -> Result<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/files?q={}&fields={}&pageSize={}&spaces=drive",
                self.api_url,
                urlencoding::encode(query),
                urlencoding::encode(&format!("nextPageToken,files({})", FILE_FIELDS)),
                LIST_PAGE_SIZE
            );
            if let Some(token) = page_token.as_deref() {
                url.push_str("&pageToken=");
                url.push_str(&urlencoding::encode(token));
            }

            let response = self
                .client
                .get(&url)
                .headers(self.headers(None).await?)
                .send()
                .await?;
            let page: FileList = self.parse_response(response).await?;
            files.extend(page.files);

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} Drive files for query {}", files.len(), query);
        Ok(files)
    }

    /// Files in `parent_id` (or in My Drive root) whose name matches exactly.
    pub async fn find_by_name(
        &self,
        parent_id: Option<&str>,
        name: &str,
        folders_only: bool,
    ) -> Result<Option<DriveFile>> {
        let mut query = format!("name = '{}' and trashed = false", query_literal(name));
        if let Some(parent_id) = parent_id {
            query.push_str(&format!(" and '{}' in parents", query_literal(parent_id)));
        }
        if folders_only {
            query.push_str(&format!(" and mimeType = '{}'", FOLDER_MIME_TYPE));
        }
        Ok(self.list_files(&query).await?.into_iter().next())
    }

    /// Files in `parent_id` whose name contains `fragment`.
    pub async fn list_in_folder(&self, parent_id: &str, fragment: &str) -> Result<Vec<DriveFile>> {
        let query = format!(
            "'{}' in parents and trashed = false and name contains '{}'",
            query_literal(parent_id),
            query_literal(fragment)
        );
        self.list_files(&query).await
    }

    /// Download a file's content as text.
    ///
    /// GET /files/{id}?alt=media
    pub async fn download_text(&self, file_id: &str) -> Result<String> {
        let url = format!(
            "{}/files/{}?alt=media",
            self.api_url,
            urlencoding::encode(file_id)
        );
        let response = self
            .client
            .get(&url)
            .headers(self.headers(None).await?)
            .send()
            .await?;
        self.read_body(response).await
    }

    /// Create a folder.
    ///
    /// POST /files
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<DriveFile> {
        let url = format!(
            "{}/files?fields={}",
            self.api_url,
            urlencoding::encode(FILE_FIELDS)
        );
        let metadata = CreateFileMetadata {
            name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: parent_id.into_iter().collect(),
        };
        debug!("Creating Drive folder {}", name);

        let response = self
            .client
            .post(&url)
            .headers(self.headers(Some("application/json")).await?)
            .json(&metadata)
            .send()
            .await?;
        self.parse_response(response).await
    }

    /// Create a file with content in one multipart request.
    ///
    /// POST /upload/files?uploadType=multipart
    pub async fn create_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        content: &str,
    ) -> Result<DriveFile> {
        let url = format!(
            "{}/files?uploadType=multipart&fields={}",
            self.upload_url,
            urlencoding::encode(FILE_FIELDS)
        );
        let metadata = serde_json::to_string(&CreateFileMetadata {
            name,
            mime_type: Some(mime_type),
            parents: vec![parent_id],
        })?;
        let boundary = format!("inventora-{}", Uuid::new_v4().simple());
        let body = multipart_body(&boundary, &metadata, mime_type, content);
        debug!("Creating Drive file {} ({} bytes)", name, content.len());

        let response = self
            .client
            .post(&url)
            .headers(
                self.headers(Some(&format!("multipart/related; boundary={}", boundary)))
                    .await?,
            )
            .body(body)
            .send()
            .await?;
        self.parse_response(response).await
    }

    /// Replace a file's content.
    ///
    /// PATCH /upload/files/{id}?uploadType=media
    pub async fn update_file(&self, file_id: &str, mime_type: &str, content: &str) -> Result<()> {
        let url = format!(
            "{}/files/{}?uploadType=media&fields={}",
            self.upload_url,
            urlencoding::encode(file_id),
            urlencoding::encode(FILE_FIELDS)
        );
        debug!("Updating Drive file {} ({} bytes)", file_id, content.len());

        let response = self
            .client
            .patch(&url)
            .headers(self.headers(Some(mime_type)).await?)
            .body(content.to_string())
            .send()
            .await?;
        let _: DriveFile = self.parse_response(response).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve the signed-in user.
    ///
    /// GET userinfo
    pub async fn fetch_user_identity(&self) -> Result<UserInfo> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .headers(self.headers(None).await?)
            .send()
            .await?;
        self.parse_response(response).await
    }
}
