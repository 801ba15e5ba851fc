//! Cloudinary upload client.
//!
//! Direct REST integration with the signed upload endpoint; credentials come
//! from an explicit [`CloudinaryConfig`] instead of process-wide state.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use super::domain::StoredImage;
use super::images::{ImageStore, ImageStoreError};
use crate::config::{CloudinaryConfig, SignatureAlgorithm};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Signed uploads against a single Cloudinary cloud.
#[derive(Clone)]
pub struct CloudinaryImageStore {
    http: Client,
    config: CloudinaryConfig,
}

impl std::fmt::Debug for CloudinaryImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryImageStore")
            .field("cloud_name", &self.config.cloud_name)
            .finish_non_exhaustive()
    }
}

impl CloudinaryImageStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self, ImageStoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.upload_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/{}/image/upload",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name
        )
    }

    /// Sorted `key=value` pairs joined by `&`, followed by the API secret,
    /// digested with the configured algorithm.
    fn signature(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = sorted
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        match self.config.signature_algorithm {
            SignatureAlgorithm::Sha1 => digest::<Sha1>(&to_sign, &self.config.api_secret),
            SignatureAlgorithm::Sha256 => digest::<Sha256>(&to_sign, &self.config.api_secret),
        }
    }
}

fn digest<D: Digest>(to_sign: &str, secret: &str) -> String {
    let mut hasher = D::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ImageStore for CloudinaryImageStore {
    async fn upload(&self, file: &Path) -> Result<StoredImage, ImageStoreError> {
        let contents = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("photo")
            .to_string();

        let mut params = vec![("timestamp", chrono::Utc::now().timestamp().to_string())];
        if let Some(folder) = &self.config.folder {
            params.push(("folder", folder.clone()));
        }
        let signature = self.signature(&params);

        let mut form = Form::new()
            .part("file", Part::bytes(contents).file_name(file_name))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text(
                "signature_algorithm",
                self.config.signature_algorithm.label(),
            );
        for (key, value) in params {
            form = form.text(key, value);
        }

        let response = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.error.message)
                .unwrap_or(body);
            return Err(ImageStoreError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let uploaded: UploadResponse = response.json().await?;
        tracing::debug!(public_id = %uploaded.public_id, bytes = uploaded.bytes, "photo uploaded");

        Ok(StoredImage {
            public_id: uploaded.public_id,
            secure_url: uploaded.secure_url,
            format: uploaded.format,
            bytes: uploaded.bytes,
            width: uploaded.width,
            height: uploaded.height,
        })
    }
}
