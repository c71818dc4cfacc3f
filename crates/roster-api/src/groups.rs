use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use roster_db::{Database, keys, records};
use roster_types::api::{CreateGroupRequest, JoinGroupRequest};
use roster_types::models::{Group, GroupCollection, GroupRef, MediaItem, MediaKind, MediaOwner, MemberProfile};

use crate::error::BackendError;
use crate::files::{UploadQuery, media_log_entry, upload_from_request};
use crate::session::SessionStore;
use crate::state::AppState;
use crate::members::check_member_id;
use crate::storage::{UploadFile, Uploader, discard_upload};

/// Groups live in a single collection record. Joining touches both that
/// record and the member's profile, so both go out in one transaction.
pub struct GroupStore {
    db: Arc<Database>,
    sessions: Arc<SessionStore>,
    uploader: Arc<dyn Uploader>,
}

impl GroupStore {
    pub fn new(db: Arc<Database>, sessions: Arc<SessionStore>, uploader: Arc<dyn Uploader>) -> Self {
        Self {
            db,
            sessions,
            uploader,
        }
    }

    fn collection(&self) -> Result<GroupCollection, BackendError> {
        Ok(self.db.get_json(keys::GROUPS)?.unwrap_or_default())
    }

    fn profile(&self, member_id: &str) -> Result<MemberProfile, BackendError> {
        let stored: Option<MemberProfile> = self.db.get_json(&keys::member(member_id))?;
        let mut profile = stored.unwrap_or_else(|| MemberProfile::template(member_id));
        profile.member_id = member_id.to_string();
        if profile.join_date.is_none() {
            profile.join_date = Some(chrono::Utc::now().date_naive());
        }
        Ok(profile)
    }

    pub fn list_groups(&self) -> Result<Vec<Group>, BackendError> {
        let mut groups: Vec<Group> = self.collection()?.into_values().collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(groups)
    }

    pub fn get_group(&self, group_id: &str) -> Result<Group, BackendError> {
        self.collection()?
            .remove(group_id)
            .ok_or_else(|| BackendError::NotFound(format!("group {}", group_id)))
    }

    /// Any signed-in user may create a group; the creator becomes its first
    /// member.
    pub fn create_group(&self, name: &str, description: &str) -> Result<Group, BackendError> {
        let session = self.sessions.require_session()?;

        let name = name.trim();
        if name.is_empty() {
            return Err(BackendError::BadRequest("group name must not be empty".into()));
        }

        let now = chrono::Utc::now();
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.trim().to_string(),
            members: BTreeSet::from([session.member_id.clone()]),
            creator_id: session.member_id.clone(),
            created_at: now,
            media: Vec::new(),
        };

        self.db.exclusive(|| -> Result<(), BackendError> {
            let mut collection = self.collection()?;
            collection.insert(group.id.clone(), group.clone());

            let mut profile = self.profile(&session.member_id)?;
            profile.groups.push(GroupRef {
                group_id: group.id.clone(),
                name: group.name.clone(),
                joined_at: now,
            });

            self.db.put_values(&[
                records::entry(keys::GROUPS, &collection)?,
                records::entry(keys::member(&session.member_id), &profile)?,
            ])?;
            Ok(())
        })?;

        info!("{} created group '{}' ({})", session.username, group.name, group.id);
        Ok(group)
    }

    /// Add a member to a group. Joining a group twice is a no-op.
    pub fn join_group(&self, group_id: &str, member_id: &str) -> Result<Group, BackendError> {
        self.sessions.require(member_id)?;
        check_member_id(member_id)?;

        self.db.exclusive(|| -> Result<Group, BackendError> {
            let mut collection = self.collection()?;
            let group = collection
                .get_mut(group_id)
                .ok_or_else(|| BackendError::NotFound(format!("group {}", group_id)))?;

            let mut profile = self.profile(member_id)?;
            let newly_added = group.members.insert(member_id.to_string());
            let needs_ref = !profile.is_in_group(group_id);
            if !newly_added && !needs_ref {
                return Ok(group.clone());
            }

            if needs_ref {
                profile.groups.push(GroupRef {
                    group_id: group.id.clone(),
                    name: group.name.clone(),
                    joined_at: chrono::Utc::now(),
                });
            }
            let joined = group.clone();

            self.db.put_values(&[
                records::entry(keys::GROUPS, &collection)?,
                records::entry(keys::member(member_id), &profile)?,
            ])?;

            info!("Member {} joined group {}", member_id, group_id);
            Ok(joined)
        })
    }

    /// Upload media into a group. Allowed for admins and for group members.
    /// The file is owned by the uploader, who can list and delete it later.
    pub async fn upload_media(&self, group_id: &str, mut file: UploadFile) -> Result<MediaItem, BackendError> {
        let session = self.sessions.require_session()?;
        self.check_group_access(group_id)?;

        let kind = MediaKind::from_content_type(&file.content_type);
        file.owner_id = session.member_id.clone();
        let receipt = self.uploader.upload(file).await?;

        let item = MediaItem {
            id: Uuid::new_v4().to_string(),
            url: receipt.url,
            kind,
            uploader_id: session.member_id,
            uploaded_at: receipt.timestamp,
        };

        if let Err(e) = self.attach_media(group_id, &item) {
            discard_upload(self.uploader.as_ref(), &receipt.file_id).await;
            return Err(e);
        }

        info!("Group {} received {:?} {}", group_id, kind, item.id);
        Ok(item)
    }

    fn attach_media(&self, group_id: &str, item: &MediaItem) -> Result<(), BackendError> {
        self.db.exclusive(|| -> Result<(), BackendError> {
            // Membership may have changed while the upload was in flight
            self.check_group_access(group_id)?;

            let mut collection = self.collection()?;
            let group = collection
                .get_mut(group_id)
                .ok_or_else(|| BackendError::NotFound(format!("group {}", group_id)))?;
            group.media.push(item.clone());

            self.db.put_values(&[
                records::entry(keys::GROUPS, &collection)?,
                media_log_entry(&self.db, MediaOwner::Group(group_id.to_string()), item.clone())?,
            ])?;
            Ok(())
        })
    }

    /// Some member of the group must pass the authorization rule, which holds
    /// for admins and for the group's own members. Groups are never empty.
    fn check_group_access(&self, group_id: &str) -> Result<(), BackendError> {
        let group = self.get_group(group_id)?;
        if group.members.iter().any(|m| self.sessions.authorize(m)) {
            Ok(())
        } else {
            Err(BackendError::Forbidden)
        }
    }
}

// -- Handlers --

pub async fn list_groups(State(state): State<AppState>) -> Result<impl IntoResponse, BackendError> {
    Ok(Json(state.groups.list_groups()?))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<impl IntoResponse, BackendError> {
    Ok(Json(state.groups.get_group(&group_id)?))
}

pub async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, BackendError> {
    let group = state.groups.create_group(&req.name, &req.description)?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn join_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(req): Json<JoinGroupRequest>,
) -> Result<impl IntoResponse, BackendError> {
    Ok(Json(state.groups.join_group(&group_id, &req.member_id)?))
}

pub async fn upload_media(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, BackendError> {
    let file = upload_from_request(&group_id, query, &headers, bytes)?;
    let item = state.groups.upload_media(&group_id, file).await?;
    Ok((StatusCode::CREATED, Json(item)))
}
