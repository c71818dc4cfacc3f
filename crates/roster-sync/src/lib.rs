//! Mirrors local member records into a remote real-time store.
//!
//! The migration runs once per local store: a persisted cursor stops it from
//! scanning again after the first successful pass.

pub mod memory;
pub mod migration;
pub mod remote;
pub mod rest;

pub use memory::MemoryRemote;
pub use migration::{MigrationSync, SyncOutcome};
pub use remote::RemoteStore;
pub use rest::RestRemote;
