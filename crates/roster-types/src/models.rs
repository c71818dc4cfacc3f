use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Glyph shown for members that never picked one.
pub const DEFAULT_AVATAR_GLYPH: &str = "🐵";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

/// One entry of the directory, keyed by username.
///
/// `password_hash` is an Argon2id PHC string. Plaintext passwords are never
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub member_id: String,
    pub display_name: String,
    pub avatar_glyph: String,
}

impl CredentialRecord {
    pub fn to_session(&self) -> Session {
        Session {
            username: self.username.clone(),
            role: self.role,
            member_id: self.member_id.clone(),
            display_name: self.display_name.clone(),
            avatar_glyph: self.avatar_glyph.clone(),
        }
    }
}

/// The full directory as persisted: username -> credential record.
pub type Directory = BTreeMap<String, CredentialRecord>;

/// The authenticated identity of the active user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub member_id: String,
    pub display_name: String,
    pub avatar_glyph: String,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// `video/*` content types are videos, everything else is treated as an image.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.trim().to_ascii_lowercase().starts_with("video/") {
            Self::Video
        } else {
            Self::Image
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub url: String,
    pub kind: MediaKind,
    pub uploader_id: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A group a member belongs to, as seen from the member's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    pub group_id: String,
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

/// Per-member profile document.
///
/// Older records were written with `name`/`avatar` keys and only a handful of
/// fields, so every field except the id falls back to a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    #[serde(default)]
    pub member_id: String,
    #[serde(default, alias = "name")]
    pub display_name: String,
    #[serde(default = "default_glyph", alias = "avatar")]
    pub avatar_glyph: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub join_date: Option<NaiveDate>,
    #[serde(default)]
    pub hobbies: Vec<String>,
    #[serde(default)]
    pub social_links: BTreeMap<String, String>,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub groups: Vec<GroupRef>,
}

fn default_glyph() -> String {
    DEFAULT_AVATAR_GLYPH.to_string()
}

impl MemberProfile {
    /// Placeholder profile for a member that has no stored record yet.
    pub fn template(member_id: &str) -> Self {
        Self {
            member_id: member_id.to_string(),
            display_name: format!("Member {}", member_id),
            avatar_glyph: default_glyph(),
            avatar_url: None,
            bio: String::new(),
            join_date: None,
            hobbies: Vec::new(),
            social_links: BTreeMap::new(),
            media: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn is_in_group(&self, group_id: &str) -> bool {
        self.groups.iter().any(|g| g.group_id == group_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: String,
    pub members: BTreeSet<String>,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub media: Vec<MediaItem>,
}

/// All groups as persisted: group id -> group.
pub type GroupCollection = BTreeMap<String, Group>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum MediaOwner {
    Member(String),
    Group(String),
}

/// One line of the central media audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaLogEntry {
    pub owner: MediaOwner,
    pub item: MediaItem,
}
