use std::sync::Arc;
use std::time::Duration;

use roster_db::Database;

use crate::session::{PasswordCost, SessionStore};
use crate::state::Backend;
use crate::storage::{MockUploader, UploadFile};

pub const ADMIN_PASSWORD: &str = "admin-pass";

pub fn seeded_sessions(member_ids: &[&str]) -> (Arc<Database>, SessionStore) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let sessions = SessionStore::load(db.clone(), PasswordCost::Minimal).unwrap();
    sessions
        .seed(ADMIN_PASSWORD, member_ids.iter().map(|id| id.to_string()))
        .unwrap();
    (db, sessions)
}

pub fn seeded_backend(member_ids: &[&str]) -> Backend {
    seeded_backend_with_latency(member_ids, Duration::ZERO)
}

pub fn seeded_backend_with_latency(member_ids: &[&str], latency: Duration) -> Backend {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let uploader = Arc::new(MockUploader::new(latency, "mock://uploads"));
    let backend = Backend::new(db, uploader, PasswordCost::Minimal).unwrap();
    backend
        .sessions
        .seed(ADMIN_PASSWORD, member_ids.iter().map(|id| id.to_string()))
        .unwrap();
    backend
}

pub fn image(owner: &str, name: &str) -> UploadFile {
    UploadFile {
        owner_id: owner.to_string(),
        name: name.to_string(),
        content_type: "image/jpeg".to_string(),
        bytes: vec![0xff, 0xd8, 0xff, 0xe0],
    }
}
