//! Key layout of the local store.

/// The signed-in user, if any.
pub const ACTIVE_SESSION: &str = "current_user";

/// Every credential record, keyed by username.
pub const DIRECTORY: &str = "directory";

/// Every group, keyed by group id.
pub const GROUPS: &str = "groups";

/// Set once the local member records have been mirrored remotely.
pub const SYNC_CURSOR: &str = "remote_sync_done";

/// Append-only record of every media upload.
pub const MEDIA_LOG: &str = "media_log";

pub const MEMBER_PREFIX: &str = "member_";

pub fn member(member_id: &str) -> String {
    format!("{}{}", MEMBER_PREFIX, member_id)
}

pub fn member_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(MEMBER_PREFIX).filter(|id| !id.is_empty())
}
