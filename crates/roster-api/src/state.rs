use std::sync::Arc;

use roster_db::Database;

use crate::groups::GroupStore;
use crate::members::MemberStore;
use crate::session::{PasswordCost, SessionStore};
use crate::storage::Uploader;

pub type AppState = Arc<Backend>;

/// Everything a request handler needs, built once per process.
pub struct Backend {
    pub db: Arc<Database>,
    pub sessions: Arc<SessionStore>,
    pub members: MemberStore,
    pub groups: GroupStore,
    pub uploader: Arc<dyn Uploader>,
}

impl Backend {
    pub fn new(
        db: Arc<Database>,
        uploader: Arc<dyn Uploader>,
        cost: PasswordCost,
    ) -> anyhow::Result<Self> {
        let sessions = Arc::new(SessionStore::load(db.clone(), cost)?);
        let members = MemberStore::new(db.clone(), sessions.clone(), uploader.clone());
        let groups = GroupStore::new(db.clone(), sessions.clone(), uploader.clone());

        Ok(Self {
            db,
            sessions,
            members,
            groups,
            uploader,
        })
    }
}
