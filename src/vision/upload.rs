//! Image upload via brokered signed URLs
//!
//! The client asks the issuing service for a short-lived write URL, then
//! PUTs the bytes to storage directly. Credentials stay server-side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::UPLOAD_TIMEOUT;
use crate::vision::{upload_filename, ImageReference, Photo};
use crate::{Error, Result};

/// Pushes a captured photo to durable storage
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Upload a photo, returning durable read references
    ///
    /// # Errors
    ///
    /// Returns `UploadFailed` if the issuing service or the byte transfer fails
    async fn upload(&self, photo: &Photo) -> Result<ImageReference>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlRequest<'a> {
    filename: &'a str,
    content_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlResponse {
    signed_url: String,
    gs_uri: String,
    https_url: String,
}

/// Uploads through the signed-URL issuing service
pub struct SignedUrlUploader {
    client: reqwest::Client,
    backend_url: String,
}

impl SignedUrlUploader {
    /// Create a new uploader pointed at the issuing service
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(backend_url: String) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(UPLOAD_TIMEOUT).build()?,
            backend_url: backend_url.trim_end_matches('/').to_string(),
        })
    }

    /// Ask the issuing service for an upload target
    async fn issue_upload_target(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadUrlResponse> {
        let response = self
            .client
            .post(format!("{}/api/get-upload-url", self.backend_url))
            .json(&UploadUrlRequest {
                filename,
                content_type,
            })
            .send()
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UploadFailed(format!(
                "issuing service error {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::UploadFailed(format!("malformed issuing response: {e}")))
    }
}

#[async_trait]
impl ImageUploader for SignedUrlUploader {
    async fn upload(&self, photo: &Photo) -> Result<ImageReference> {
        let bytes = tokio::fs::read(&photo.path)
            .await
            .map_err(|e| Error::UploadFailed(format!("cannot read photo: {e}")))?;

        let filename = upload_filename(&photo.path);
        tracing::debug!(filename = %filename, bytes = bytes.len(), "requesting upload target");

        let target = self
            .issue_upload_target(&filename, photo.content_type)
            .await?;

        let response = self
            .client
            .put(&target.signed_url)
            .header("Content-Type", photo.content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UploadFailed(format!(
                "storage error {status}: {body}"
            )));
        }

        tracing::info!(gs_uri = %target.gs_uri, "photo uploaded");
        Ok(ImageReference {
            gs_uri: target.gs_uri,
            https_url: target.https_url,
        })
    }
}
