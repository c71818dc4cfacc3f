use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::BoxFuture;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use roster_types::api::{FileRecord, UploadReceipt};

use crate::error::BackendError;

/// 50 MB upload limit for files
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

const FILE_ID_LEN: usize = 9;
const FILE_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A file handed to the upload service.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub owner_id: String,
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Object storage collaborator.
///
/// Every returned future resolves exactly once. Dropping it before it resolves
/// cancels the operation.
pub trait Uploader: Send + Sync {
    fn upload(&self, file: UploadFile) -> BoxFuture<'_, Result<UploadReceipt, BackendError>>;

    fn delete<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Result<(), BackendError>>;

    fn files<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<Vec<FileRecord>, BackendError>>;

    fn find<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Result<Option<FileRecord>, BackendError>>;

    /// Total bytes currently held.
    fn usage(&self) -> BoxFuture<'_, Result<u64, BackendError>>;
}

/// Stand-in for real object storage: waits a fixed latency, keeps an index in
/// memory and hands out synthetic URLs. Accepted uploads never fail.
pub struct MockUploader {
    latency: Duration,
    base_url: String,
    files: Mutex<Vec<FileRecord>>,
}

impl MockUploader {
    pub fn new(latency: Duration, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("Mock uploader: {}ms latency, serving {}", latency.as_millis(), base_url);
        Self {
            latency,
            base_url,
            files: Mutex::new(Vec::new()),
        }
    }

    fn index(&self) -> Result<std::sync::MutexGuard<'_, Vec<FileRecord>>, BackendError> {
        self.files
            .lock()
            .map_err(|e| BackendError::Storage(anyhow::anyhow!("Upload index lock poisoned: {}", e)))
    }
}

impl Uploader for MockUploader {
    fn upload(&self, file: UploadFile) -> BoxFuture<'_, Result<UploadReceipt, BackendError>> {
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;

            let now = chrono::Utc::now();
            let sha256 = hex::encode(Sha256::digest(&file.bytes));
            let name = sanitize_name(&file.name);

            let mut index = self.index()?;
            let file_id = loop {
                let candidate = new_file_id();
                if !index.iter().any(|f| f.file_id == candidate) {
                    break candidate;
                }
            };
            let url = format!("{}/{}/{}", self.base_url, file_id, name);

            index.push(FileRecord {
                file_id: file_id.clone(),
                owner_id: file.owner_id.clone(),
                name,
                content_type: file.content_type,
                size: file.bytes.len() as u64,
                sha256,
                url: url.clone(),
                uploaded_at: now,
            });

            info!("Stored upload {} for {} ({} bytes)", file_id, file.owner_id, file.bytes.len());

            Ok(UploadReceipt {
                success: true,
                url,
                file_id,
                timestamp: now,
            })
        })
    }

    fn delete<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;

            let mut index = self.index()?;
            let before = index.len();
            index.retain(|f| f.file_id != file_id);
            if index.len() == before {
                return Err(BackendError::NotFound(format!("file {}", file_id)));
            }

            debug!("Deleted upload {}", file_id);
            Ok(())
        })
    }

    fn files<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<Vec<FileRecord>, BackendError>> {
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;

            let index = self.index()?;
            Ok(index.iter().filter(|f| f.owner_id == owner_id).cloned().collect())
        })
    }

    fn find<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Result<Option<FileRecord>, BackendError>> {
        Box::pin(async move {
            let index = self.index()?;
            Ok(index.iter().find(|f| f.file_id == file_id).cloned())
        })
    }

    fn usage(&self) -> BoxFuture<'_, Result<u64, BackendError>> {
        Box::pin(async move {
            let index = self.index()?;
            Ok(index.iter().map(|f| f.size).sum())
        })
    }
}

/// Best-effort removal of an upload whose owning record could not be written.
pub async fn discard_upload(uploader: &dyn Uploader, file_id: &str) {
    match uploader.delete(file_id).await {
        Ok(()) => debug!("Discarded orphaned upload {}", file_id),
        Err(e) => warn!("Failed to discard orphaned upload {}: {}", file_id, e),
    }
}

fn new_file_id() -> String {
    let mut rng = rand::rng();
    (0..FILE_ID_LEN)
        .map(|_| FILE_ID_ALPHABET[rng.random_range(0..FILE_ID_ALPHABET.len())] as char)
        .collect()
}

/// Keep names URL-safe: anything outside `[A-Za-z0-9._-]` becomes `_`.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        cleaned
    }
}
