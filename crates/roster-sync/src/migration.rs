use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use roster_db::{Database, keys};

use crate::remote::{RemoteStore, Updates, path_segments};

/// Remote collection member records are mirrored into.
pub const MEMBERS_PATH: &str = "members";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cursor was already set; nothing was read or written.
    AlreadyDone,
    /// Every local record was checked; `written` of them were missing
    /// remotely. `skipped` records have ids no remote path can hold.
    Completed {
        scanned: usize,
        written: usize,
        skipped: usize,
    },
}

/// One-time copy of local member records into the remote store.
///
/// Records already present remotely are left alone, so an interrupted run can
/// simply start over. Two processes sharing one local store can both see the
/// cursor unset and race on the same records; that is not guarded against.
pub struct MigrationSync<R> {
    db: Arc<Database>,
    remote: R,
}

impl<R: RemoteStore> MigrationSync<R> {
    pub fn new(db: Arc<Database>, remote: R) -> Self {
        Self { db, remote }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn is_done(&self) -> Result<bool> {
        Ok(self
            .db
            .get_value(keys::SYNC_CURSOR)?
            .is_some_and(|v| !v.is_empty()))
    }

    /// Run the migration unless it already completed. On error the cursor is
    /// left unset.
    pub async fn run(&self) -> Result<SyncOutcome> {
        if self.is_done()? {
            debug!("Remote sync already completed, skipping");
            return Ok(SyncOutcome::AlreadyDone);
        }

        info!("Syncing local member records to the remote store");

        let mut staged = Updates::new();
        let mut scanned = 0;
        let mut skipped = 0;

        for key in self.db.keys_with_prefix(keys::MEMBER_PREFIX)? {
            let Some(member_id) = keys::member_id_from_key(&key) else {
                continue;
            };
            let Some(raw) = self.db.get_value(&key)? else {
                continue;
            };

            let path = format!("{}/{}", MEMBERS_PATH, member_id);
            if let Err(e) = path_segments(&path) {
                warn!("Skipping member record {}: {:#}", key, e);
                skipped += 1;
                continue;
            }

            let record: Value = serde_json::from_str(&raw)
                .with_context(|| format!("Local record for member {} is not valid JSON", member_id))?;
            scanned += 1;

            if !self.remote.exists(&path).await? {
                staged.insert(path, record);
            }
        }

        let written = staged.len();
        if written > 0 {
            self.remote.update(staged).await?;
        }

        self.db.put_value(keys::SYNC_CURSOR, "true")?;
        info!(
            "Remote sync complete: {} of {} member records written, {} skipped",
            written, scanned, skipped
        );

        Ok(SyncOutcome::Completed {
            scanned,
            written,
            skipped,
        })
    }

    /// [`run`](Self::run) for background use: failures are logged, never
    /// propagated.
    pub async fn run_logged(&self) {
        if let Err(e) = self.run().await {
            error!("Remote sync failed, will retry on next start: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRemote;
    use serde_json::json;

    fn local_with(ids: &[&str]) -> Arc<Database> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for id in ids {
            db.put_value(&keys::member(id), &json!({ "memberId": id, "bio": format!("bio {}", id) }).to_string())
                .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn skips_records_already_remote() {
        let db = local_with(&["01", "02"]);
        let remote = MemoryRemote::with_data(json!({ "members": { "01": { "bio": "remote wins" } } }));
        let sync = MigrationSync::new(db, remote);

        let outcome = sync.run().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Completed { scanned: 2, written: 1, skipped: 0 });

        let tree = sync.remote().snapshot().unwrap();
        assert_eq!(tree["members"]["01"], json!({ "bio": "remote wins" }));
        assert_eq!(tree["members"]["02"]["bio"], "bio 02");
    }

    #[tokio::test]
    async fn empty_local_store_still_sets_cursor() {
        let db = local_with(&[]);
        let sync = MigrationSync::new(db.clone(), MemoryRemote::new());

        assert_eq!(sync.run().await.unwrap(), SyncOutcome::Completed { scanned: 0, written: 0, skipped: 0 });
        assert_eq!(sync.remote().update_calls(), 0);
        assert!(sync.is_done().unwrap());
        assert_eq!(sync.run().await.unwrap(), SyncOutcome::AlreadyDone);
    }

    #[tokio::test]
    async fn corrupt_local_record_aborts_without_cursor() {
        let db = local_with(&["01"]);
        db.put_value(&keys::member("02"), "{oops").unwrap();
        let sync = MigrationSync::new(db.clone(), MemoryRemote::new());

        assert!(sync.run().await.is_err());
        assert!(!sync.is_done().unwrap());
        assert_eq!(sync.remote().update_calls(), 0);

        // run_logged swallows the same failure
        sync.run_logged().await;
        assert!(!sync.is_done().unwrap());
    }

    #[tokio::test]
    async fn unmappable_ids_are_skipped_not_fatal() {
        let db = local_with(&["01"]);
        db.put_value(&keys::member("a.b"), r#"{"memberId":"a.b"}"#).unwrap();
        let sync = MigrationSync::new(db.clone(), MemoryRemote::new());

        let outcome = sync.run().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Completed { scanned: 1, written: 1, skipped: 1 });
        assert!(sync.is_done().unwrap());
        assert_eq!(sync.remote().snapshot().unwrap()["members"]["01"]["bio"], "bio 01");
    }

    #[tokio::test]
    async fn rerun_without_cursor_writes_nothing() {
        let db = local_with(&["01", "02", "03"]);
        let sync = MigrationSync::new(db.clone(), MemoryRemote::new());
        sync.run().await.unwrap();
        let after_first = sync.remote().snapshot().unwrap();

        db.remove_value(keys::SYNC_CURSOR).unwrap();
        let outcome = sync.run().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Completed { scanned: 3, written: 0, skipped: 0 });
        assert_eq!(sync.remote().update_calls(), 1);
        assert_eq!(sync.remote().snapshot().unwrap(), after_first);
    }
}
