//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use crate::models::{Thread, ThreadFilter, ThreadId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Data persistence contract for thread blobs.
///
/// `Ok(None)` / `Ok(false)` mean "no affected row"; `Err` is reserved for
/// infrastructure failures.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ThreadRepo: Send + Sync {
    /// Inserts a new, non-archived thread whose blob is `dat`.
    /// Ids are `max(now in seconds, last id + 1)`.
    async fn create_thread(
        &self,
        board: &str,
        dat: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<ThreadId>>;

    async fn get_thread(&self, id: ThreadId) -> anyhow::Result<Option<Thread>>;

    /// Appends `line` and bumps `updated_at` in one atomic step, only while
    /// the thread is not archived. Returns the row as it is after the append.
    async fn append(
        &self,
        id: ThreadId,
        line: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Thread>>;

    /// Overwrites the whole blob without touching `updated_at` or `archived`,
    /// but only while it still equals `expected`. `Ok(false)` covers both a
    /// missing row and a blob that changed since it was read.
    async fn replace_dat(&self, id: ThreadId, expected: &str, dat: &str) -> anyhow::Result<bool>;

    async fn set_archived(&self, id: ThreadId, archived: bool) -> anyhow::Result<bool>;

    async fn delete_thread(&self, id: ThreadId) -> anyhow::Result<bool>;

    /// Threads matching `filter`, most recently updated first.
    async fn list_threads(&self, filter: ThreadFilter) -> anyhow::Result<Vec<Thread>>;
}

/// Poster identity contract.
pub trait IdentityProvider: Send + Sync {
    /// Short per-poster token, stable for one board during one JST calendar day.
    fn derive_identity(&self, network_address: &str, board: &str, at: DateTime<Utc>) -> String;
}
