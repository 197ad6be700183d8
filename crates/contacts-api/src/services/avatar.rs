//! Avatar image hosting
//!
//! [`CloudinaryStore`] performs a signed upload to Cloudinary and returns a
//! 250x250 cropped delivery URL. [`MemoryAvatarStore`] keeps images in
//! memory for tests and for running without image host credentials.

use async_trait::async_trait;
use contacts_core::UploadConfig;
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Largest accepted avatar
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

const AVATAR_SIZE: u32 = 250;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Image upload is not configured")]
    NotConfigured,

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Image host error: {0}")]
    Upstream(String),
}

/// Image received from a client
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

impl AvatarUpload {
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.bytes.is_empty() {
            return Err(UploadError::InvalidImage("empty file".to_string()));
        }
        if self.bytes.len() > MAX_AVATAR_BYTES {
            return Err(UploadError::InvalidImage(format!(
                "file larger than {MAX_AVATAR_BYTES} bytes"
            )));
        }
        match self.content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => Ok(()),
            Some(ct) => Err(UploadError::InvalidImage(format!(
                "unsupported content type {ct}"
            ))),
            None => Err(UploadError::InvalidImage("missing content type".to_string())),
        }
    }
}

#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Store the avatar for `username` and return its public URL
    async fn upload(&self, username: &str, image: AvatarUpload) -> Result<String, UploadError>;
}

/// Signed uploads to the Cloudinary image API
pub struct CloudinaryStore {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    version: u64,
}

impl CloudinaryStore {
    pub fn from_config(config: &UploadConfig) -> Result<Self, UploadError> {
        match (&config.cloud_name, &config.api_key, &config.api_secret) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Ok(Self {
                client: reqwest::Client::new(),
                cloud_name: cloud_name.clone(),
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
            }),
            _ => Err(UploadError::NotConfigured),
        }
    }

    fn public_id(username: &str) -> String {
        format!("ContactsApp/{username}")
    }

    /// SHA-256 over the sorted parameters followed by the secret
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let digest = Sha256::digest(format!("{joined}{}", self.api_secret).as_bytes());
        format!("{digest:x}")
    }

    fn delivery_url(&self, public_id: &str, version: u64) -> String {
        format!(
            "https://res.cloudinary.com/{}/image/upload/c_fill,h_{AVATAR_SIZE},w_{AVATAR_SIZE}/v{version}/{public_id}",
            self.cloud_name
        )
    }
}

#[async_trait]
impl AvatarStore for CloudinaryStore {
    async fn upload(&self, username: &str, image: AvatarUpload) -> Result<String, UploadError> {
        image.validate()?;

        let public_id = Self::public_id(username);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| UploadError::Upstream(e.to_string()))?
            .as_secs()
            .to_string();
        let signature = self.sign(&[
            ("overwrite", "true"),
            ("public_id", public_id.as_str()),
            ("timestamp", timestamp.as_str()),
        ]);

        let mut part = reqwest::multipart::Part::bytes(image.bytes)
            .file_name(image.file_name.unwrap_or_else(|| "avatar".to_string()));
        if let Some(ct) = image.content_type.as_deref() {
            part = part
                .mime_str(ct)
                .map_err(|e| UploadError::InvalidImage(e.to_string()))?;
        }

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("public_id", public_id)
            .text("overwrite", "true")
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Upstream(format!("{status}: {body}")));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Upstream(e.to_string()))?;

        tracing::info!(public_id = %uploaded.public_id, "avatar uploaded");
        Ok(self.delivery_url(&uploaded.public_id, uploaded.version))
    }
}

/// In-process avatar storage
#[derive(Default)]
pub struct MemoryAvatarStore {
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAvatarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str) -> Option<Vec<u8>> {
        self.images.lock().get(username).cloned()
    }
}

#[async_trait]
impl AvatarStore for MemoryAvatarStore {
    async fn upload(&self, username: &str, image: AvatarUpload) -> Result<String, UploadError> {
        image.validate()?;
        let size = image.bytes.len();
        self.images.lock().insert(username.to_string(), image.bytes);
        Ok(format!(
            "memory://avatars/{username}?size={AVATAR_SIZE}x{AVATAR_SIZE}&bytes={size}"
        ))
    }
}
