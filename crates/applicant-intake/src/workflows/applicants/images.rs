use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::domain::StoredImage;

/// Outbound hosted-image boundary. Uploads are not transactional: once
/// `upload` returns, the remote resource exists regardless of what the caller
/// does next.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, file: &Path) -> Result<StoredImage, ImageStoreError>;
}

/// Image upload error.
#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("failed to read upload source: {0}")]
    Io(#[from] std::io::Error),
    #[error("image host request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("image host rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("image host unavailable: {0}")]
    Unavailable(String),
}

/// Keeps uploads in memory so routes, tests, and the demo can assert the
/// integration boundary without network access.
#[derive(Debug, Default, Clone)]
pub struct MemoryImageStore {
    uploads: Arc<Mutex<Vec<StoredImage>>>,
    sequence: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following upload fails with [`ImageStoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    pub fn uploads(&self) -> Vec<StoredImage> {
        self.uploads.lock().expect("image store mutex poisoned").clone()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn upload(&self, file: &Path) -> Result<StoredImage, ImageStoreError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(ImageStoreError::Unavailable("image host offline".to_string()));
        }

        let contents = tokio::fs::read(file).await?;
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let format = file
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let public_id = format!("applicants/photo-{id:06}");
        let secure_url = match &format {
            Some(ext) => format!("memory://images/{public_id}.{ext}"),
            None => format!("memory://images/{public_id}"),
        };

        let stored = StoredImage {
            public_id,
            secure_url,
            format,
            bytes: contents.len() as u64,
            width: None,
            height: None,
        };
        self.uploads
            .lock()
            .expect("image store mutex poisoned")
            .push(stored.clone());
        Ok(stored)
    }
}
