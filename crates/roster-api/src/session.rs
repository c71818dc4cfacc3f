use std::sync::{Arc, RwLock};

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::{Path, State}, response::IntoResponse};
use tracing::{error, info, warn};

use roster_db::{Database, keys};
use roster_types::api::{Ack, DirectoryEntry, LoginRequest};
use roster_types::models::{CredentialRecord, DEFAULT_AVATAR_GLYPH, Directory, Role, Session};

use crate::error::BackendError;
use crate::members::check_member_id;
use crate::state::AppState;

pub const ADMIN_USERNAME: &str = "admin";
const ADMIN_GLYPH: &str = "👑";

/// Argon2 cost used for new password hashes.
///
/// Verification always uses the parameters embedded in the stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCost {
    /// OWASP-recommended Argon2id defaults.
    Standard,
    /// Smallest parameters argon2 accepts. Only for tests and local demos.
    Minimal,
}

impl PasswordCost {
    fn hasher(self) -> anyhow::Result<Argon2<'static>> {
        match self {
            Self::Standard => Ok(Argon2::default()),
            Self::Minimal => {
                let params = Params::new(
                    Params::MIN_M_COST,
                    Params::MIN_T_COST,
                    Params::MIN_P_COST,
                    None,
                )
                .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {}", e))?;
                Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
            }
        }
    }

    fn hash(self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?;
        Ok(hash.to_string())
    }
}

/// Password a member account gets at seed time and after an admin reset.
pub fn default_password(member_id: &str) -> String {
    format!("user{}", member_id)
}

/// Directory of credentials plus the single active session.
///
/// The active session is read from the store once, at construction, and
/// every change to it is written through before the call returns.
pub struct SessionStore {
    db: Arc<Database>,
    active: RwLock<Option<Session>>,
    cost: PasswordCost,
}

impl SessionStore {
    pub fn load(db: Arc<Database>, cost: PasswordCost) -> anyhow::Result<Self> {
        let active: Option<Session> = match db.get_json(keys::ACTIVE_SESSION) {
            Ok(session) => session,
            Err(e) => {
                // A corrupt session record only costs the user a fresh login
                warn!("Discarding unreadable session record: {:#}", e);
                db.remove_value(keys::ACTIVE_SESSION)?;
                None
            }
        };

        if let Some(session) = &active {
            info!("Restored session for {}", session.username);
        }

        Ok(Self {
            db,
            active: RwLock::new(active),
            cost,
        })
    }

    fn directory(&self) -> Result<Directory, BackendError> {
        Ok(self.db.get_json(keys::DIRECTORY)?.unwrap_or_default())
    }

    /// Create the directory if it does not exist yet: one admin account and
    /// one member account per id. Returns how many records were written.
    pub fn seed<I>(&self, admin_password: &str, member_ids: I) -> Result<usize, BackendError>
    where
        I: IntoIterator<Item = String>,
    {
        if !self.directory()?.is_empty() {
            return Ok(0);
        }

        if admin_password.is_empty() {
            return Err(BackendError::BadRequest("admin password must not be empty".into()));
        }

        let mut directory = Directory::new();
        directory.insert(
            ADMIN_USERNAME.to_string(),
            CredentialRecord {
                username: ADMIN_USERNAME.to_string(),
                password_hash: self.cost.hash(admin_password)?,
                role: Role::Admin,
                member_id: ADMIN_USERNAME.to_string(),
                display_name: "Administrator".to_string(),
                avatar_glyph: ADMIN_GLYPH.to_string(),
            },
        );

        for member_id in member_ids {
            if check_member_id(&member_id).is_err() || directory.contains_key(&member_id) {
                warn!("Skipping duplicate or invalid seed id '{}'", member_id);
                continue;
            }
            directory.insert(
                member_id.clone(),
                CredentialRecord {
                    username: member_id.clone(),
                    password_hash: self.cost.hash(&default_password(&member_id))?,
                    role: Role::Member,
                    display_name: format!("Member {}", member_id),
                    avatar_glyph: DEFAULT_AVATAR_GLYPH.to_string(),
                    member_id,
                },
            );
        }

        self.db.put_json(keys::DIRECTORY, &directory)?;
        info!("Seeded directory with {} accounts", directory.len());
        Ok(directory.len())
    }

    /// Check a username/password pair and make it the active session.
    ///
    /// A failed attempt leaves the current session in place.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Session, BackendError> {
        let directory = self.directory()?;
        let record = directory
            .get(username)
            .ok_or(BackendError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&record.password_hash).map_err(|e| {
            error!("Unparseable password hash for {}: {}", username, e);
            BackendError::InvalidCredentials
        })?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| BackendError::InvalidCredentials)?;

        let session = record.to_session();
        self.db.put_json(keys::ACTIVE_SESSION, &session)?;
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());

        info!("{} signed in as {:?}", session.username, session.role);
        Ok(session)
    }

    /// Clear the active session. Safe to call when nobody is signed in.
    pub fn end_session(&self) -> Result<(), BackendError> {
        self.db.remove_value(keys::ACTIVE_SESSION)?;
        if let Some(session) = self.active.write().unwrap_or_else(|e| e.into_inner()).take() {
            info!("{} signed out", session.username);
        }
        Ok(())
    }

    pub fn current_session(&self) -> Option<Session> {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The one permission rule: admins may act on anyone, members only on
    /// themselves, nobody without a session.
    pub fn authorize(&self, member_id: &str) -> bool {
        match self.active.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(session) => session.is_admin() || session.member_id == member_id,
            None => false,
        }
    }

    /// [`authorize`](Self::authorize) as a `Result`, returning the session.
    pub fn require(&self, member_id: &str) -> Result<Session, BackendError> {
        if !self.authorize(member_id) {
            return Err(BackendError::Forbidden);
        }
        self.current_session().ok_or(BackendError::Forbidden)
    }

    pub fn require_session(&self) -> Result<Session, BackendError> {
        self.current_session().ok_or(BackendError::Forbidden)
    }

    pub fn require_admin(&self) -> Result<Session, BackendError> {
        match self.current_session() {
            Some(session) if session.is_admin() => Ok(session),
            _ => Err(BackendError::Forbidden),
        }
    }

    /// Admin only: set a member account's password back to [`default_password`].
    pub fn reset_password(&self, member_id: &str) -> Result<(), BackendError> {
        let admin = self.require_admin()?;

        let password_hash = self.cost.hash(&default_password(member_id))?;

        self.db.exclusive(|| -> Result<(), BackendError> {
            let mut directory = self.directory()?;
            let record = directory
                .values_mut()
                .find(|r| r.role == Role::Member && r.member_id == member_id)
                .ok_or_else(|| BackendError::NotFound(format!("member {}", member_id)))?;

            record.password_hash = password_hash;
            self.db.put_json(keys::DIRECTORY, &directory)?;
            Ok(())
        })?;

        info!("{} reset the password of member {}", admin.username, member_id);
        Ok(())
    }

    pub fn directory_listing(&self) -> Result<Vec<DirectoryEntry>, BackendError> {
        Ok(self
            .directory()?
            .into_values()
            .map(|r| DirectoryEntry {
                username: r.username,
                role: r.role,
                member_id: r.member_id,
                display_name: r.display_name,
                avatar_glyph: r.avatar_glyph,
            })
            .collect())
    }
}

// -- Handlers --

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, BackendError> {
    // Argon2 verification is CPU-bound; keep it off the async workers
    let sessions = state.sessions.clone();
    let session = tokio::task::spawn_blocking(move || {
        sessions.authenticate(&req.username, &req.password)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(session))
}

pub async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse, BackendError> {
    state.sessions.end_session()?;
    Ok(Json(Ack::ok()))
}

pub async fn current(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sessions.current_session())
}

pub async fn directory(State(state): State<AppState>) -> Result<impl IntoResponse, BackendError> {
    Ok(Json(state.sessions.directory_listing()?))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
) -> Result<impl IntoResponse, BackendError> {
    let sessions = state.sessions.clone();
    tokio::task::spawn_blocking(move || sessions.reset_password(&member_id))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(Ack::ok()))
}
