use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use roster_db::{Database, keys};
use roster_sync::remote::Updates;
use roster_sync::{MemoryRemote, MigrationSync, RemoteStore, SyncOutcome};

fn local_members(ids: &[&str]) -> Arc<Database> {
    let db = Arc::new(Database::open_in_memory().unwrap());
    for id in ids {
        let profile = json!({
            "memberId": id,
            "displayName": format!("Member {}", id),
            "hobbies": ["reading"],
        });
        db.put_value(&keys::member(id), &profile.to_string()).unwrap();
    }
    db
}

/// Remote whose reads start failing after `fail_after` successful calls.
struct FlakyRemote {
    inner: MemoryRemote,
    reads: AtomicUsize,
    fail_after: usize,
}

impl RemoteStore for FlakyRemote {
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
        Box::pin(async move {
            if self.reads.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
                bail!("connection reset");
            }
            self.inner.get(path).await
        })
    }

    fn update(&self, updates: Updates) -> BoxFuture<'_, Result<()>> {
        self.inner.update(updates)
    }
}

#[tokio::test]
async fn five_local_members_reach_empty_remote() {
    let ids = ["01", "02", "03", "04", "05"];
    let db = local_members(&ids);
    let sync = MigrationSync::new(db.clone(), MemoryRemote::new());

    let outcome = sync.run().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Completed { scanned: 5, written: 5, skipped: 0 });
    assert_eq!(sync.remote().update_calls(), 1);

    let tree = sync.remote().snapshot().unwrap();
    let members = tree["members"].as_object().unwrap();
    let remote_ids: Vec<&str> = members.keys().map(String::as_str).collect();
    assert_eq!(remote_ids, ids);
    assert_eq!(members["03"]["displayName"], "Member 03");

    assert_eq!(db.get_value(keys::SYNC_CURSOR).unwrap().as_deref(), Some("true"));

    // Second run: terminal state, no remote traffic
    assert_eq!(sync.run().await.unwrap(), SyncOutcome::AlreadyDone);
    assert_eq!(sync.remote().update_calls(), 1);
    assert_eq!(sync.remote().paths_written(), 5);
    assert_eq!(sync.remote().snapshot().unwrap(), tree);
}

#[tokio::test]
async fn remote_failure_leaves_cursor_unset_and_retry_completes() {
    let db = local_members(&["01", "02", "03"]);

    let flaky = MigrationSync::new(
        db.clone(),
        FlakyRemote {
            inner: MemoryRemote::new(),
            reads: AtomicUsize::new(0),
            fail_after: 2,
        },
    );
    assert!(flaky.run().await.is_err());
    assert_eq!(db.get_value(keys::SYNC_CURSOR).unwrap(), None);
    assert_eq!(flaky.remote().inner.update_calls(), 0);

    let sync = MigrationSync::new(db.clone(), MemoryRemote::new());
    assert_eq!(
        sync.run().await.unwrap(),
        SyncOutcome::Completed { scanned: 3, written: 3, skipped: 0 }
    );
    assert!(sync.is_done().unwrap());
}

#[tokio::test]
async fn non_member_keys_are_ignored() {
    let db = local_members(&["10"]);
    db.put_value(keys::DIRECTORY, "{}").unwrap();
    db.put_value(keys::GROUPS, "{}").unwrap();
    db.put_value(keys::MEDIA_LOG, "[]").unwrap();

    let sync = MigrationSync::new(db, MemoryRemote::new());
    sync.run().await.unwrap();

    let tree = sync.remote().snapshot().unwrap();
    assert_eq!(tree.as_object().unwrap().len(), 1);
    assert_eq!(tree["members"].as_object().unwrap().len(), 1);
}
