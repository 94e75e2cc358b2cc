//! # Domain Models
//!
//! These structs represent the core entities of Goblin-Board.
//! A thread is a single text blob in DAT format; posts only exist as lines
//! of that blob and are materialized on read.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Numeric thread key. Time-seeded at creation and never reused.
pub type ThreadId = i64;

/// A thread row as held by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    /// Key into the board registry (e.g. "poverty")
    pub board: String,
    /// Newline-terminated DAT lines, append-only.
    pub dat: String,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    /// The timestamp used for sorting threads by activity
    pub updated_at: DateTime<Utc>,
}

/// The fields of one post before it is written as a DAT line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFields {
    pub name: String,
    pub mail: String,
    /// Display date, already in legacy format (see [`crate::datetime::format_dat_date`]).
    pub date: String,
    /// Per-poster identity token shown after ` ID:`.
    pub uid: String,
    /// Optional secondary badge shown after ` BE:`.
    pub be: Option<String>,
    /// Raw user text; newlines are allowed here.
    pub body: String,
}

/// One decoded post. `id` is the 1-based ordinal within the thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: usize,
    pub name: String,
    pub mail: String,
    /// Parsed display date, if it matched the legacy pattern.
    pub date: Option<DateTime<FixedOffset>>,
    pub raw_date: String,
    pub uid: String,
    pub be: Option<String>,
    /// Body as stored, with `<br>` markers.
    pub message: String,
}

/// A decoded thread blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedDat {
    pub subject: String,
    pub records: Vec<Record>,
}

impl ParsedDat {
    /// Number of posts ("res") in the thread.
    pub fn res(&self) -> usize {
        self.records.len()
    }
}

/// Listing entry used by `subject.txt` and the JSON thread poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub subject: String,
    /// Post count, OP included.
    pub length: usize,
    pub archived: bool,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    pub total_threads: usize,
    pub active_threads: usize,
    pub archived_threads: usize,
    pub total_posts: usize,
}

/// A range-filtered snapshot of one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadView {
    pub id: ThreadId,
    pub board: String,
    pub subject: String,
    pub archived: bool,
    /// Post count before filtering.
    pub total: usize,
    pub records: Vec<Record>,
}

/// Listing filter passed to [`crate::traits::ThreadRepo::list_threads`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadFilter {
    pub board: Option<String>,
    /// Substring that must appear somewhere in the raw DAT text.
    pub contains: Option<String>,
    pub limit: Option<usize>,
}

impl ThreadFilter {
    pub fn board(board: impl Into<String>) -> Self {
        Self {
            board: Some(board.into()),
            ..Self::default()
        }
    }
}

/// Parameters for opening a new thread.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub board: String,
    pub subject: String,
    pub fields: PostFields,
}

/// Parameters for replying to an existing thread.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub thread_id: ThreadId,
    /// Board the poster believes the thread lives on.
    pub board: String,
    pub fields: PostFields,
}
