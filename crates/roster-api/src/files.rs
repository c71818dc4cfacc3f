use anyhow::Result;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use serde::Deserialize;

use roster_db::{Database, keys, records};
use roster_types::api::{Ack, FileRecord};
use roster_types::models::{MediaItem, MediaLogEntry, MediaOwner};

use crate::error::BackendError;
use crate::state::{AppState, Backend};
use crate::storage::{MAX_FILE_SIZE, UploadFile};

pub fn media_log(db: &Database) -> Result<Vec<MediaLogEntry>> {
    Ok(db.get_json(keys::MEDIA_LOG)?.unwrap_or_default())
}

/// The media log with `item` appended, ready for a batched write alongside
/// the record that owns the item.
pub(crate) fn media_log_entry(
    db: &Database,
    owner: MediaOwner,
    item: MediaItem,
) -> Result<(String, String)> {
    let mut log = media_log(db)?;
    log.push(MediaLogEntry { owner, item });
    records::entry(keys::MEDIA_LOG, &log)
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub name: Option<String>,
}

/// Turn a raw request body into an [`UploadFile`].
pub(crate) fn upload_from_request(
    owner_id: &str,
    query: UploadQuery,
    headers: &HeaderMap,
    bytes: Bytes,
) -> Result<UploadFile, BackendError> {
    if bytes.is_empty() {
        return Err(BackendError::BadRequest("empty upload".into()));
    }

    if bytes.len() > MAX_FILE_SIZE {
        return Err(BackendError::UploadFailure(format!(
            "file exceeds the {} MB limit",
            MAX_FILE_SIZE / (1024 * 1024)
        )));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    Ok(UploadFile {
        owner_id: owner_id.to_string(),
        name: query.name.unwrap_or_else(|| "upload".to_string()),
        content_type,
        bytes: bytes.to_vec(),
    })
}

impl Backend {
    pub async fn list_files(&self, owner_id: &str) -> Result<Vec<FileRecord>, BackendError> {
        self.sessions.require(owner_id)?;
        self.uploader.files(owner_id).await
    }

    /// Remove an uploaded file. The caller must be allowed to act for its owner.
    pub async fn delete_file(&self, file_id: &str) -> Result<(), BackendError> {
        let file = self
            .uploader
            .find(file_id)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("file {}", file_id)))?;

        self.sessions.require(&file.owner_id)?;
        self.uploader.delete(file_id).await
    }
}

// -- Handlers --

pub async fn list_files(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<impl IntoResponse, BackendError> {
    Ok(Json(state.list_files(&owner_id).await?))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, BackendError> {
    state.delete_file(&file_id).await?;
    Ok(Json(Ack::ok()))
}
