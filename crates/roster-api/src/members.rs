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
use roster_types::api::{ProfileEdit, SocialLinks};
use roster_types::models::{MediaItem, MediaKind, MediaOwner, MemberProfile};

use crate::error::BackendError;
use crate::files::{UploadQuery, media_log_entry, upload_from_request};
use crate::session::SessionStore;
use crate::state::AppState;
use crate::storage::{UploadFile, Uploader, discard_upload};

/// Per-member profile documents.
///
/// Reads never write. Every mutation loads the whole record, changes it and
/// writes the whole record back.
pub struct MemberStore {
    db: Arc<Database>,
    sessions: Arc<SessionStore>,
    uploader: Arc<dyn Uploader>,
}

impl MemberStore {
    pub fn new(db: Arc<Database>, sessions: Arc<SessionStore>, uploader: Arc<dyn Uploader>) -> Self {
        Self {
            db,
            sessions,
            uploader,
        }
    }

    /// Stored profile, or the placeholder template when there is none yet.
    pub fn get_profile(&self, member_id: &str) -> Result<MemberProfile, BackendError> {
        let stored: Option<MemberProfile> = self.db.get_json(&keys::member(member_id))?;
        Ok(match stored {
            Some(mut profile) => {
                profile.member_id = member_id.to_string();
                profile
            }
            None => MemberProfile::template(member_id),
        })
    }

    /// Overwrite the full record. Performs no permission check.
    pub fn put_profile(&self, member_id: &str, mut profile: MemberProfile) -> Result<(), BackendError> {
        check_member_id(member_id)?;
        profile.member_id = member_id.to_string();
        self.db.put_json(&keys::member(member_id), &profile)?;
        Ok(())
    }

    /// Profile to mutate; a first write stamps the join date.
    fn load_for_update(&self, member_id: &str) -> Result<MemberProfile, BackendError> {
        check_member_id(member_id)?;
        let mut profile = self.get_profile(member_id)?;
        if profile.join_date.is_none() {
            profile.join_date = Some(chrono::Utc::now().date_naive());
        }
        Ok(profile)
    }

    pub fn update_profile(&self, member_id: &str, edit: ProfileEdit) -> Result<MemberProfile, BackendError> {
        self.sessions.require(member_id)?;

        let display_name = match edit.display_name {
            Some(name) if name.trim().is_empty() => {
                return Err(BackendError::BadRequest("display name must not be empty".into()));
            }
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };

        self.db.exclusive(|| -> Result<MemberProfile, BackendError> {
            let mut profile = self.load_for_update(member_id)?;
            if let Some(name) = display_name {
                profile.display_name = name;
            }
            if let Some(glyph) = edit.avatar_glyph {
                profile.avatar_glyph = glyph;
            }
            if let Some(bio) = edit.bio {
                profile.bio = bio;
            }
            if let Some(hobbies) = edit.hobbies {
                profile.hobbies = hobbies;
            }

            self.put_profile(member_id, profile.clone())?;
            Ok(profile)
        })
    }

    /// Shallow merge: given platforms are added or replaced, others kept.
    pub fn update_social_links(&self, member_id: &str, links: SocialLinks) -> Result<MemberProfile, BackendError> {
        self.sessions.require(member_id)?;

        if links.keys().any(|platform| platform.trim().is_empty()) {
            return Err(BackendError::BadRequest("platform name must not be empty".into()));
        }

        self.db.exclusive(|| -> Result<MemberProfile, BackendError> {
            let mut profile = self.load_for_update(member_id)?;
            profile.social_links.extend(links);
            self.put_profile(member_id, profile.clone())?;
            Ok(profile)
        })
    }

    /// Append a media item to the member's profile and the media log, in one
    /// transaction.
    pub fn record_upload(&self, member_id: &str, item: MediaItem) -> Result<MemberProfile, BackendError> {
        self.sessions.require(member_id)?;

        self.db.exclusive(|| -> Result<MemberProfile, BackendError> {
            let mut profile = self.load_for_update(member_id)?;
            profile.media.push(item.clone());

            let writes = [
                records::entry(keys::member(member_id), &profile)?,
                media_log_entry(&self.db, MediaOwner::Member(member_id.to_string()), item)?,
            ];
            self.db.put_values(&writes)?;
            Ok(profile)
        })
    }

    pub async fn set_avatar(&self, member_id: &str, mut file: UploadFile) -> Result<MemberProfile, BackendError> {
        self.sessions.require(member_id)?;
        check_member_id(member_id)?;

        if !file.content_type.trim().to_ascii_lowercase().starts_with("image/") {
            return Err(BackendError::BadRequest("avatar must be an image".into()));
        }

        file.owner_id = member_id.to_string();
        let receipt = self.uploader.upload(file).await?;

        match self.attach_avatar(member_id, &receipt.url) {
            Ok(profile) => {
                info!("Member {} has a new avatar ({})", member_id, receipt.file_id);
                Ok(profile)
            }
            Err(e) => {
                discard_upload(self.uploader.as_ref(), &receipt.file_id).await;
                Err(e)
            }
        }
    }

    fn attach_avatar(&self, member_id: &str, url: &str) -> Result<MemberProfile, BackendError> {
        // The session may have changed while the upload was in flight
        self.sessions.require(member_id)?;

        self.db.exclusive(|| -> Result<MemberProfile, BackendError> {
            let mut profile = self.load_for_update(member_id)?;
            profile.avatar_url = Some(url.to_string());
            self.put_profile(member_id, profile.clone())?;
            Ok(profile)
        })
    }

    pub async fn upload_media(&self, member_id: &str, mut file: UploadFile) -> Result<MediaItem, BackendError> {
        let session = self.sessions.require(member_id)?;
        check_member_id(member_id)?;

        let kind = MediaKind::from_content_type(&file.content_type);
        file.owner_id = member_id.to_string();
        let receipt = self.uploader.upload(file).await?;

        let item = MediaItem {
            id: Uuid::new_v4().to_string(),
            url: receipt.url,
            kind,
            uploader_id: session.member_id,
            uploaded_at: receipt.timestamp,
        };
        if let Err(e) = self.record_upload(member_id, item.clone()) {
            discard_upload(self.uploader.as_ref(), &receipt.file_id).await;
            return Err(e);
        }

        info!("Member {} uploaded {:?} {}", member_id, kind, item.id);
        Ok(item)
    }
}

/// Member ids double as key suffixes and remote path segments, so they may
/// not contain path separators or the characters remote paths reject.
pub(crate) fn check_member_id(member_id: &str) -> Result<(), BackendError> {
    let invalid = member_id.trim().is_empty()
        || member_id
            .chars()
            .any(|c| matches!(c, '.' | '#' | '$' | '[' | ']' | '/') || c.is_control());

    if invalid {
        Err(BackendError::BadRequest(format!("invalid member id '{}'", member_id)))
    } else {
        Ok(())
    }
}

// -- Handlers --

pub async fn get_profile(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
) -> Result<impl IntoResponse, BackendError> {
    Ok(Json(state.members.get_profile(&member_id)?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    Json(edit): Json<ProfileEdit>,
) -> Result<impl IntoResponse, BackendError> {
    Ok(Json(state.members.update_profile(&member_id, edit)?))
}

pub async fn update_social_links(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    Json(links): Json<SocialLinks>,
) -> Result<impl IntoResponse, BackendError> {
    Ok(Json(state.members.update_social_links(&member_id, links)?))
}

pub async fn upload_avatar(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, BackendError> {
    let file = upload_from_request(&member_id, query, &headers, bytes)?;
    Ok(Json(state.members.set_avatar(&member_id, file).await?))
}

pub async fn upload_media(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, BackendError> {
    let file = upload_from_request(&member_id, query, &headers, bytes)?;
    let item = state.members.upload_media(&member_id, file).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::files::media_log;
    use crate::testing::{ADMIN_PASSWORD, image, seeded_backend, seeded_backend_with_latency};

    fn links(pairs: &[(&str, &str)]) -> SocialLinks {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn unknown_member_gets_template_without_write() {
        let backend = seeded_backend(&["01"]);
        let profile = backend.members.get_profile("77").unwrap();

        assert_eq!(profile.member_id, "77");
        assert_eq!(backend.db.get_value(&keys::member("77")).unwrap(), None);
    }

    #[test]
    fn put_then_get_returns_record() {
        let backend = seeded_backend(&["01"]);
        let mut profile = MemberProfile::template("01");
        profile.bio = "Loves hiking".into();
        backend.members.put_profile("01", profile.clone()).unwrap();

        assert_eq!(backend.members.get_profile("01").unwrap(), profile);
    }

    #[test]
    fn social_links_merge() {
        let backend = seeded_backend(&["03"]);
        backend.sessions.authenticate("03", "user03").unwrap();

        backend
            .members
            .update_social_links("03", links(&[("a", "x"), ("c", "old")]))
            .unwrap();
        let profile = backend
            .members
            .update_social_links("03", links(&[("b", "y"), ("c", "new")]))
            .unwrap();

        assert_eq!(profile.social_links, links(&[("a", "x"), ("b", "y"), ("c", "new")]));
        assert_eq!(backend.members.get_profile("03").unwrap().social_links, profile.social_links);
    }

    #[test]
    fn mutations_require_authorization() {
        let backend = seeded_backend(&["01", "02"]);
        let link = links(&[("a", "x")]);

        assert!(matches!(
            backend.members.update_social_links("01", link.clone()),
            Err(BackendError::Forbidden)
        ));

        backend.sessions.authenticate("02", "user02").unwrap();
        assert!(matches!(
            backend.members.update_social_links("01", link.clone()),
            Err(BackendError::Forbidden)
        ));
        assert!(matches!(
            backend.members.update_profile("01", ProfileEdit::default()),
            Err(BackendError::Forbidden)
        ));
        assert_eq!(backend.db.get_value(&keys::member("01")).unwrap(), None);

        backend.sessions.authenticate("admin", ADMIN_PASSWORD).unwrap();
        backend.members.update_social_links("01", link).unwrap();
    }

    #[test]
    fn profile_edit_applies_present_fields() {
        let backend = seeded_backend(&["04"]);
        backend.sessions.authenticate("04", "user04").unwrap();

        let profile = backend
            .members
            .update_profile(
                "04",
                ProfileEdit {
                    bio: Some("hello".into()),
                    hobbies: Some(vec!["go".into(), "tennis".into()]),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(profile.display_name, "Member 04");
        assert_eq!(profile.bio, "hello");
        assert_eq!(profile.hobbies, vec!["go".to_string(), "tennis".to_string()]);
        assert!(profile.join_date.is_some());

        let blank = ProfileEdit {
            display_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(
            backend.members.update_profile("04", blank),
            Err(BackendError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn media_upload_lands_in_profile_and_log() {
        let backend = seeded_backend(&["06"]);
        backend.sessions.authenticate("06", "user06").unwrap();

        let item = backend.members.upload_media("06", image("06", "beach.jpg")).await.unwrap();
        assert_eq!(item.kind, MediaKind::Image);
        assert_eq!(item.uploader_id, "06");

        let profile = backend.members.get_profile("06").unwrap();
        assert_eq!(profile.media, vec![item.clone()]);

        let log = media_log(&backend.db).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].owner, MediaOwner::Member("06".into()));
        assert_eq!(log[0].item, item);
    }

    #[tokio::test]
    async fn avatar_upload_sets_url() {
        let backend = seeded_backend(&["08"]);
        backend.sessions.authenticate("08", "user08").unwrap();

        let profile = backend.members.set_avatar("08", image("08", "me.jpg")).await.unwrap();
        let url = profile.avatar_url.unwrap();
        assert!(url.starts_with("mock://uploads/"));
        assert!(url.ends_with("/me.jpg"));

        let mut clip = image("08", "clip.mp4");
        clip.content_type = "video/mp4".into();
        assert!(matches!(
            backend.members.set_avatar("08", clip).await,
            Err(BackendError::BadRequest(_))
        ));
    }

    #[test]
    fn unmappable_member_ids_are_rejected() {
        let backend = seeded_backend(&["01"]);
        backend.sessions.authenticate("admin", ADMIN_PASSWORD).unwrap();

        for id in ["a.b", "x/y", "$root", "[0]", "#tag", ""] {
            assert!(matches!(
                backend.members.put_profile(id, MemberProfile::template(id)),
                Err(BackendError::BadRequest(_))
            ));
            assert!(matches!(
                backend.members.update_social_links(id, links(&[("a", "x")])),
                Err(BackendError::BadRequest(_))
            ));
        }
        assert!(backend.db.keys_with_prefix(keys::MEMBER_PREFIX).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_uploads_are_all_recorded() {
        let backend = Arc::new(seeded_backend(&["01"]));
        backend.sessions.authenticate("01", "user01").unwrap();

        let uploads: Vec<_> = (0..64)
            .map(|i| {
                let backend = backend.clone();
                tokio::spawn(async move {
                    backend
                        .members
                        .upload_media("01", image("01", &format!("{}.jpg", i)))
                        .await
                })
            })
            .collect();
        for upload in uploads {
            upload.await.unwrap().unwrap();
        }

        assert_eq!(backend.members.get_profile("01").unwrap().media.len(), 64);
        assert_eq!(media_log(&backend.db).unwrap().len(), 64);
    }

    #[tokio::test]
    async fn upload_is_discarded_when_session_changes_mid_flight() {
        let backend = seeded_backend_with_latency(&["01", "02"], Duration::from_millis(50));
        backend.sessions.authenticate("01", "user01").unwrap();

        let (result, _) = tokio::join!(
            backend.members.upload_media("01", image("01", "a.jpg")),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                backend.sessions.authenticate("02", "user02").unwrap();
            }
        );

        assert!(matches!(result, Err(BackendError::Forbidden)));
        assert_eq!(backend.uploader.usage().await.unwrap(), 0);
        assert!(backend.members.get_profile("01").unwrap().media.is_empty());
        assert!(media_log(&backend.db).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_upload_never_reaches_uploader() {
        let backend = seeded_backend(&["01", "02"]);
        backend.sessions.authenticate("02", "user02").unwrap();

        assert!(matches!(
            backend.members.upload_media("01", image("01", "x.jpg")).await,
            Err(BackendError::Forbidden)
        ));
        assert_eq!(backend.uploader.usage().await.unwrap(), 0);
    }
}
