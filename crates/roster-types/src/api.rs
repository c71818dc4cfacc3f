use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MediaLogEntry, Role};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Directory listing row; the credential record minus password material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub username: String,
    pub role: Role,
    pub member_id: String,
    pub display_name: String,
    pub avatar_glyph: String,
}

// -- Profiles --

/// Partial profile edit; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileEdit {
    pub display_name: Option<String>,
    pub avatar_glyph: Option<String>,
    pub bio: Option<String>,
    pub hobbies: Option<Vec<String>>,
}

/// Platform -> URL pairs merged into a profile's social links.
pub type SocialLinks = BTreeMap<String, String>;

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinGroupRequest {
    pub member_id: String,
}

// -- Uploads --

/// Result handed back by the upload service once a file is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub success: bool,
    pub url: String,
    pub file_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Index entry for an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_id: String,
    pub owner_id: String,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

// -- Admin --

/// Read-only report for administrators. Not authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: usize,
    pub member_count: usize,
    pub group_count: usize,
    pub storage_used_bytes: u64,
    pub recent_activity: Vec<MediaLogEntry>,
}

// -- Responses --

#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailureResponse {
    pub success: bool,
    pub message: String,
}
