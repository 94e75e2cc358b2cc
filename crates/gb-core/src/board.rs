//! Static board registry and the two board-level legacy files,
//! `SETTING.TXT` and `subject.txt`.

use crate::dat;
use crate::models::{Thread, ThreadSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Board title as shown to legacy browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardTitle {
    pub name: String,
    pub logo: Option<String>,
}

impl Default for BoardTitle {
    fn default() -> Self {
        Self {
            name: "ゴブリン掲示板".to_string(),
            logo: None,
        }
    }
}

/// Character limits per field, plus the thread-creation cooldown in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardLimits {
    pub subject: usize,
    pub name: usize,
    pub mail: usize,
    pub message: usize,
    pub thread: u64,
}

impl Default for BoardLimits {
    fn default() -> Self {
        Self {
            subject: 128,
            name: 96,
            mail: 96,
            message: 4096,
            thread: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub title: BoardTitle,
    /// Name used when a poster leaves `FROM` empty.
    pub nanashi: String,
    pub description: String,
    pub limit: BoardLimits,
    pub rules: Vec<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            title: BoardTitle::default(),
            nanashi: "名無し".to_string(),
            description: String::new(),
            limit: BoardLimits::default(),
            rules: Vec::new(),
        }
    }
}

/// Board key → configuration. Boards are fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct BoardRegistry {
    boards: BTreeMap<String, BoardConfig>,
}

impl BoardRegistry {
    pub fn new(boards: BTreeMap<String, BoardConfig>) -> Self {
        Self { boards }
    }

    pub fn get(&self, key: &str) -> Option<&BoardConfig> {
        self.boards.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.boards.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.boards.keys().map(String::as_str)
    }
}

/// Renders `SETTING.TXT` for `board`.
pub fn setting_txt(board: &str, config: &BoardConfig) -> String {
    let title = &config.title.name;
    let limit = &config.limit;
    [
        board.to_string(),
        format!("BBS_TITLE={title}"),
        format!("BBS_TITLE_ORIG={title}"),
        format!("BBS_TITLE_PICTURE={}", config.title.logo.as_deref().unwrap_or_default()),
        format!("BBS_NONAME_NAME={}", config.nanashi),
        format!("BBS_SUBJECT_COUNT={}", limit.subject),
        format!("BBS_NAME_COUNT={}", limit.name),
        format!("BBS_MAIL_COUNT={}", limit.mail),
        format!("BBS_MESSAGE_COUNT={}", limit.message),
        format!("BBS_THREAD_TATESUGI={}", limit.thread),
    ]
    .join("\n")
}

impl ThreadSummary {
    pub fn from_thread(thread: &Thread) -> Self {
        Self {
            id: thread.id,
            subject: dat::subject_of(&thread.dat),
            length: dat::count_records(&thread.dat),
            archived: thread.archived,
            updated_at: thread.updated_at,
        }
    }
}

/// Renders `subject.txt`: active threads only, in the order given.
pub fn subject_txt(summaries: &[ThreadSummary]) -> String {
    summaries
        .iter()
        .filter(|summary| !summary.archived)
        .map(|summary| format!("{}.dat<>{} ({})\n", summary.id, summary.subject, summary.length))
        .collect()
}
