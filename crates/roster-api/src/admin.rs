use axum::{Json, extract::State, response::IntoResponse};

use roster_types::api::AdminStats;
use roster_types::models::Role;

use crate::error::BackendError;
use crate::files::media_log;
use crate::state::{AppState, Backend};

const RECENT_ACTIVITY_LIMIT: usize = 10;

impl Backend {
    /// Read-only overview for administrators.
    pub async fn admin_stats(&self) -> Result<AdminStats, BackendError> {
        self.sessions.require_admin()?;

        let directory = self.sessions.directory_listing()?;
        let member_count = directory.iter().filter(|e| e.role == Role::Member).count();
        let group_count = self.groups.list_groups()?.len();
        let storage_used_bytes = self.uploader.usage().await?;

        let mut recent_activity = media_log(&self.db)?;
        recent_activity.reverse();
        recent_activity.truncate(RECENT_ACTIVITY_LIMIT);

        Ok(AdminStats {
            total_users: directory.len(),
            member_count,
            group_count,
            storage_used_bytes,
            recent_activity,
        })
    }
}

pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, BackendError> {
    Ok(Json(state.admin_stats().await?))
}
