//! # Thread lifecycle
//!
//! ```text
//!   create ──► Active ──append (count < max)──► Active
//!                │
//!                └──append (count >= max)──► Archived ──unarchive (admin)──► Active
//! ```
//!
//! Archival happens right after the append that reaches the limit. Appends
//! to an archived thread fail with [`AppError::Archived`]; redaction and
//! removal work in either state.

use crate::board;
use crate::dat::{self, Redaction};
use crate::error::{AppError, Result};
use crate::models::{
    AppendRequest, BoardStats, CreateRequest, Thread, ThreadFilter, ThreadId, ThreadSummary,
    ThreadView,
};
use crate::range::RangeQuery;
use crate::traits::ThreadRepo;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default post limit before a thread is archived.
pub const DEFAULT_MAX_POSTS: usize = 1000;

/// Admin search returns at most this many threads.
pub const SEARCH_LIMIT: usize = 100;

/// Rewrites attempted by [`ThreadLifecycle::redact`] before giving up on a
/// thread that keeps changing underneath it.
pub const REDACT_ATTEMPTS: usize = 3;

/// Coordinates the DAT codec with the persistence port.
#[derive(Clone)]
pub struct ThreadLifecycle {
    repo: Arc<dyn ThreadRepo>,
    max_posts: usize,
}

impl ThreadLifecycle {
    pub fn new(repo: Arc<dyn ThreadRepo>) -> Self {
        Self {
            repo,
            max_posts: DEFAULT_MAX_POSTS,
        }
    }

    pub fn with_max_posts(mut self, max_posts: usize) -> Self {
        self.max_posts = max_posts.max(1);
        self
    }

    pub fn max_posts(&self) -> usize {
        self.max_posts
    }

    /// Opens a thread whose first line carries the subject.
    pub async fn create(&self, req: CreateRequest) -> Result<ThreadId> {
        let line = dat::encode(&req.fields, Some(&req.subject));
        let id = self
            .repo
            .create_thread(&req.board, &line, Utc::now())
            .await
            .map_err(AppError::internal)?
            .ok_or_else(|| {
                AppError::WriteFailed(format!("could not create thread on {}", req.board))
            })?;

        info!(thread_id = id, board = %req.board, "thread created");
        Ok(id)
    }

    /// Appends a reply and returns the updated blob.
    pub async fn append(&self, req: AppendRequest) -> Result<String> {
        let id = req.thread_id;
        let thread = self.fetch(id).await?;
        if thread.board != req.board {
            return Err(AppError::Conflict(format!(
                "thread {id} belongs to {}, not {}",
                thread.board, req.board
            )));
        }
        if thread.archived {
            return Err(AppError::Archived(id));
        }

        let line = dat::encode(&req.fields, None);
        let updated = match self
            .repo
            .append(id, &line, Utc::now())
            .await
            .map_err(AppError::internal)?
        {
            Some(updated) => updated,
            // Lost a race with archival or removal.
            None => return Err(self.classify_rejected_append(id).await),
        };

        let count = dat::count_records(&updated.dat);
        debug!(thread_id = id, count, "reply appended");
        if count >= self.max_posts {
            self.repo
                .set_archived(id, true)
                .await
                .map_err(AppError::internal)?;
            info!(thread_id = id, count, max = self.max_posts, "thread archived");
        }

        Ok(updated.dat)
    }

    async fn classify_rejected_append(&self, id: ThreadId) -> AppError {
        match self.repo.get_thread(id).await {
            Ok(Some(thread)) if thread.archived => AppError::Archived(id),
            Ok(Some(_)) => AppError::WriteFailed(format!("append to thread {id} affected no row")),
            Ok(None) => AppError::thread_not_found(id),
            Err(err) => AppError::internal(err),
        }
    }

    /// Tombstones post `ordinal`. Returns whether the post exists.
    ///
    /// The rewrite only lands if the blob is still the one it was computed
    /// from, so a reply appended in between is never overwritten. A changed
    /// blob is re-read and the rewrite retried.
    pub async fn redact(&self, id: ThreadId, ordinal: usize) -> Result<bool> {
        for attempt in 1..=REDACT_ATTEMPTS {
            let thread = self.fetch(id).await?;
            let rewritten = match dat::redact_line(&thread.dat, ordinal) {
                Redaction::Missing => return Ok(false),
                Redaction::Degenerate => {
                    warn!(thread_id = id, ordinal, "post too malformed to redact");
                    return Ok(true);
                }
                Redaction::Redacted(rewritten) => rewritten,
            };

            let written = self
                .repo
                .replace_dat(id, &thread.dat, &rewritten)
                .await
                .map_err(AppError::internal)?;
            if written {
                info!(thread_id = id, ordinal, "post redacted");
                return Ok(true);
            }
            debug!(thread_id = id, attempt, "thread changed during redaction");
        }

        Err(AppError::WriteFailed(format!("thread {id} kept changing during redaction")))
    }

    /// Deletes a thread entirely.
    pub async fn remove(&self, id: ThreadId) -> Result<bool> {
        let removed = self.repo.delete_thread(id).await.map_err(AppError::internal)?;
        if removed {
            info!(thread_id = id, "thread removed");
        }
        Ok(removed)
    }

    /// Administrative `Archived -> Active`. The post limit is not re-checked.
    pub async fn unarchive(&self, id: ThreadId) -> Result<bool> {
        let changed = self
            .repo
            .set_archived(id, false)
            .await
            .map_err(AppError::internal)?;
        if changed {
            info!(thread_id = id, "thread unarchived");
        }
        Ok(changed)
    }

    /// Raw row, for callers that serve the blob as-is.
    pub async fn get(&self, board: &str, id: ThreadId) -> Result<Thread> {
        let thread = self.fetch(id).await?;
        if thread.board != board {
            return Err(AppError::thread_not_found(id));
        }
        Ok(thread)
    }

    /// Decodes one snapshot of a thread and applies `query`.
    pub async fn read(&self, board: &str, id: ThreadId, query: &RangeQuery) -> Result<ThreadView> {
        let thread = self.get(board, id).await?;
        let parsed = dat::decode(&thread.dat);
        let total = parsed.res();
        Ok(ThreadView {
            id: thread.id,
            board: thread.board,
            subject: parsed.subject,
            archived: thread.archived,
            total,
            records: query.select(parsed.records),
        })
    }

    /// Every thread on `board`, newest activity first, archived ones included.
    pub async fn subjects(&self, board: &str) -> Result<Vec<ThreadSummary>> {
        let threads = self
            .repo
            .list_threads(ThreadFilter::board(board))
            .await
            .map_err(AppError::internal)?;
        Ok(threads.iter().map(ThreadSummary::from_thread).collect())
    }

    pub async fn subject_txt(&self, board: &str) -> Result<String> {
        Ok(board::subject_txt(&self.subjects(board).await?))
    }

    /// Counters across one board, or all boards when `board` is `None`.
    pub async fn stats(&self, board: Option<&str>) -> Result<BoardStats> {
        let filter = ThreadFilter {
            board: board.map(str::to_string),
            ..ThreadFilter::default()
        };
        let threads = self.repo.list_threads(filter).await.map_err(AppError::internal)?;

        let archived_threads = threads.iter().filter(|t| t.archived).count();
        Ok(BoardStats {
            total_threads: threads.len(),
            active_threads: threads.len() - archived_threads,
            archived_threads,
            total_posts: threads.iter().map(|t| dat::count_records(&t.dat)).sum(),
        })
    }

    /// Threads whose raw text contains `needle`.
    pub async fn search(&self, needle: &str, board: Option<&str>) -> Result<Vec<ThreadSummary>> {
        let filter = ThreadFilter {
            board: board.map(str::to_string),
            contains: Some(needle.to_string()),
            limit: Some(SEARCH_LIMIT),
        };
        let threads = self.repo.list_threads(filter).await.map_err(AppError::internal)?;
        Ok(threads.iter().map(ThreadSummary::from_thread).collect())
    }

    async fn fetch(&self, id: ThreadId) -> Result<Thread> {
        self.repo
            .get_thread(id)
            .await
            .map_err(AppError::internal)?
            .ok_or_else(|| AppError::thread_not_found(id))
    }
}
