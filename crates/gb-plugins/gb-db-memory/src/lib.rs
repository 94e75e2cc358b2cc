//! # gb-db-memory
//!
//! Process-local `ThreadRepo` backed by a `DashMap`. Used for development
//! runs and for exercising the lifecycle end-to-end in tests. Nothing
//! survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gb_core::models::{Thread, ThreadFilter, ThreadId};
use gb_core::traits::ThreadRepo;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Default)]
pub struct MemoryThreadRepo {
    threads: DashMap<ThreadId, Thread>,
    last_id: AtomicI64,
}

impl MemoryThreadRepo {
    pub fn new() -> Self {
        tracing::info!("in-memory thread store ready");
        Self::default()
    }

    /// `max(now_secs, last + 1)`, claimed atomically.
    fn next_id(&self, now: DateTime<Utc>) -> ThreadId {
        let seed = now.timestamp();
        let previous = self
            .last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(seed.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        seed.max(previous + 1)
    }
}

#[async_trait]
impl ThreadRepo for MemoryThreadRepo {
    async fn create_thread(
        &self,
        board: &str,
        dat: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<ThreadId>> {
        let id = self.next_id(now);
        let thread = Thread {
            id,
            board: board.to_string(),
            dat: dat.to_string(),
            archived: false,
            created_at: now,
            updated_at: now,
        };
        if self.threads.insert(id, thread).is_some() {
            anyhow::bail!("thread id {id} was already taken");
        }
        Ok(Some(id))
    }

    async fn get_thread(&self, id: ThreadId) -> anyhow::Result<Option<Thread>> {
        Ok(self.threads.get(&id).map(|entry| entry.value().clone()))
    }

    /// The shard lock is held across the archived check and the write.
    async fn append(
        &self,
        id: ThreadId,
        line: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Thread>> {
        let Some(mut entry) = self.threads.get_mut(&id) else {
            return Ok(None);
        };
        if entry.archived {
            return Ok(None);
        }
        entry.dat.push_str(line);
        entry.updated_at = now;
        Ok(Some(entry.clone()))
    }

    /// Compared and written under the same shard lock as `append`.
    async fn replace_dat(&self, id: ThreadId, expected: &str, dat: &str) -> anyhow::Result<bool> {
        let Some(mut entry) = self.threads.get_mut(&id) else {
            return Ok(false);
        };
        if entry.dat != expected {
            return Ok(false);
        }
        entry.dat = dat.to_string();
        Ok(true)
    }

    async fn set_archived(&self, id: ThreadId, archived: bool) -> anyhow::Result<bool> {
        Ok(self
            .threads
            .get_mut(&id)
            .map(|mut entry| entry.archived = archived)
            .is_some())
    }

    async fn delete_thread(&self, id: ThreadId) -> anyhow::Result<bool> {
        Ok(self.threads.remove(&id).is_some())
    }

    async fn list_threads(&self, filter: ThreadFilter) -> anyhow::Result<Vec<Thread>> {
        let mut threads: Vec<Thread> = self
            .threads
            .iter()
            .filter(|entry| filter.board.as_deref().is_none_or(|board| entry.board == board))
            .filter(|entry| {
                filter
                    .contains
                    .as_deref()
                    .is_none_or(|needle| entry.dat.contains(needle))
            })
            .map(|entry| entry.value().clone())
            .collect();

        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            threads.truncate(limit);
        }
        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gb_core::dat::{redact_line, Redaction};
    use gb_core::datetime::format_dat_date;
    use gb_core::models::{AppendRequest, CreateRequest, PostFields};
    use gb_core::{AppError, RangeQuery, ThreadLifecycle};
    use std::sync::Arc;
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn fields(body: &str) -> PostFields {
        PostFields {
            name: "名無し".to_string(),
            date: format_dat_date(&Utc::now()),
            uid: "abcd1234".to_string(),
            body: body.to_string(),
            ..PostFields::default()
        }
    }

    fn lifecycle(max_posts: usize) -> ThreadLifecycle {
        ThreadLifecycle::new(Arc::new(MemoryThreadRepo::new())).with_max_posts(max_posts)
    }

    async fn open(lifecycle: &ThreadLifecycle, board: &str, subject: &str) -> ThreadId {
        lifecycle
            .create(CreateRequest {
                board: board.to_string(),
                subject: subject.to_string(),
                fields: fields("op"),
            })
            .await
            .unwrap()
    }

    async fn reply(
        lifecycle: &ThreadLifecycle,
        id: ThreadId,
        body: &str,
    ) -> gb_core::Result<String> {
        lifecycle
            .append(AppendRequest {
                thread_id: id,
                board: "poverty".to_string(),
                fields: fields(body),
            })
            .await
    }

    #[tokio::test]
    async fn ids_are_time_seeded_and_strictly_increasing() {
        let repo = MemoryThreadRepo::new();
        let first = repo.create_thread("b", "x\n", at(0)).await.unwrap().unwrap();
        let second = repo.create_thread("b", "y\n", at(0)).await.unwrap().unwrap();
        let earlier_clock = repo.create_thread("b", "z\n", at(-60)).await.unwrap().unwrap();
        assert_eq!(first, 1_700_000_000);
        assert_eq!(second, first + 1);
        assert_eq!(earlier_clock, first + 2);
    }

    #[tokio::test]
    async fn deleted_ids_are_not_handed_out_again() {
        let repo = MemoryThreadRepo::new();
        let first = repo.create_thread("b", "x\n", at(0)).await.unwrap().unwrap();
        let newest = repo.create_thread("b", "y\n", at(0)).await.unwrap().unwrap();
        assert!(repo.delete_thread(newest).await.unwrap());

        let next = repo.create_thread("b", "z\n", at(0)).await.unwrap().unwrap();
        assert_eq!(newest, first + 1);
        assert_eq!(next, newest + 1);
    }

    #[tokio::test]
    async fn replace_only_applies_to_the_blob_it_was_computed_from() {
        let repo = MemoryThreadRepo::new();
        let id = repo.create_thread("b", "op\n", at(0)).await.unwrap().unwrap();
        repo.append(id, "reply\n", at(1)).await.unwrap();

        assert!(!repo.replace_dat(id, "op\n", "redacted\n").await.unwrap());
        assert_eq!(repo.get_thread(id).await.unwrap().unwrap().dat, "op\nreply\n");

        assert!(repo.replace_dat(id, "op\nreply\n", "redacted\nreply\n").await.unwrap());
        assert_eq!(repo.get_thread(id).await.unwrap().unwrap().dat, "redacted\nreply\n");
        assert!(!repo.replace_dat(id + 1, "", "x\n").await.unwrap());
    }

    #[tokio::test]
    async fn redaction_keeps_a_reply_that_landed_after_the_read() {
        let repo = Arc::new(MemoryThreadRepo::new());
        let lifecycle = ThreadLifecycle::new(repo.clone());
        let id = open(&lifecycle, "poverty", "subject").await;
        let stale = repo.get_thread(id).await.unwrap().unwrap().dat;
        reply(&lifecycle, id, "acknowledged").await.unwrap();

        let Redaction::Redacted(rewritten) = redact_line(&stale, 1) else {
            panic!("op line should be redactable");
        };
        assert!(!repo.replace_dat(id, &stale, &rewritten).await.unwrap());

        assert!(lifecycle.redact(id, 1).await.unwrap());
        let view = lifecycle.read("poverty", id, &RangeQuery::All).await.unwrap();
        assert_eq!(view.total, 2);
        assert_eq!(view.records[0].name, "あぼーん");
        assert_eq!(view.records[1].message, "acknowledged");
    }

    #[tokio::test]
    async fn append_refuses_archived_and_missing_threads() {
        let repo = MemoryThreadRepo::new();
        let id = repo.create_thread("b", "op\n", at(0)).await.unwrap().unwrap();

        let updated = repo.append(id, "reply\n", at(5)).await.unwrap().unwrap();
        assert_eq!(updated.dat, "op\nreply\n");
        assert_eq!(updated.updated_at, at(5));

        assert!(repo.set_archived(id, true).await.unwrap());
        assert!(repo.append(id, "late\n", at(6)).await.unwrap().is_none());
        assert!(repo.append(id + 1, "nowhere\n", at(6)).await.unwrap().is_none());
        assert_eq!(repo.get_thread(id).await.unwrap().unwrap().dat, "op\nreply\n");
    }

    #[tokio::test]
    async fn list_orders_by_activity_then_id() {
        let repo = MemoryThreadRepo::new();
        let a = repo.create_thread("b", "a\n", at(0)).await.unwrap().unwrap();
        let b = repo.create_thread("b", "b\n", at(0)).await.unwrap().unwrap();
        let c = repo.create_thread("c", "c\n", at(10)).await.unwrap().unwrap();
        repo.append(a, "bump\n", at(20)).await.unwrap();

        let ids = |threads: Vec<Thread>| threads.iter().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(ids(repo.list_threads(ThreadFilter::default()).await.unwrap()), vec![a, c, b]);
        assert_eq!(ids(repo.list_threads(ThreadFilter::board("b")).await.unwrap()), vec![a, b]);

        let limited = ThreadFilter {
            contains: Some("b".to_string()),
            limit: Some(1),
            ..ThreadFilter::default()
        };
        assert_eq!(ids(repo.list_threads(limited).await.unwrap()), vec![a]);
    }

    #[tokio::test]
    async fn thread_archives_at_the_limit() {
        let lifecycle = lifecycle(3);
        let id = open(&lifecycle, "poverty", "short thread").await;

        reply(&lifecycle, id, "2").await.unwrap();
        let blob = reply(&lifecycle, id, "3").await.unwrap();
        assert_eq!(blob.lines().count(), 3);

        let view = lifecycle.read("poverty", id, &RangeQuery::All).await.unwrap();
        assert!(view.archived);
        assert_eq!(view.total, 3);

        let err = reply(&lifecycle, id, "4").await.unwrap_err();
        assert!(matches!(err, AppError::Archived(archived) if archived == id));

        assert!(lifecycle.unarchive(id).await.unwrap());
        // The limit is not re-checked on unarchive, so one more reply lands
        // and immediately archives again.
        reply(&lifecycle, id, "4").await.unwrap();
        let view = lifecycle.read("poverty", id, &RangeQuery::All).await.unwrap();
        assert!(view.archived);
        assert_eq!(view.total, 4);
    }

    #[tokio::test]
    async fn redaction_keeps_other_posts_and_works_when_archived() {
        let lifecycle = lifecycle(2);
        let id = open(&lifecycle, "poverty", "subject").await;
        reply(&lifecycle, id, "secret").await.unwrap();

        assert!(lifecycle.redact(id, 2).await.unwrap());
        assert!(!lifecycle.redact(id, 9).await.unwrap());

        let view = lifecycle.read("poverty", id, &RangeQuery::All).await.unwrap();
        assert!(view.archived);
        assert_eq!(view.subject, "subject");
        assert_eq!(view.records[0].message, "op");
        assert_eq!(view.records[1].name, "あぼーん");
        assert_eq!(view.records[1].message, "あぼーん");
        assert_eq!(view.records[1].uid, "abcd1234");

        let err = lifecycle.redact(id + 1, 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn subject_txt_lists_active_threads_by_activity() {
        let lifecycle = lifecycle(2);
        let older = open(&lifecycle, "poverty", "older").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer = open(&lifecycle, "poverty", "newer").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let full = open(&lifecycle, "poverty", "full").await;
        reply(&lifecycle, full, "fills it").await.unwrap();
        open(&lifecycle, "news", "elsewhere").await;

        let text = lifecycle.subject_txt("poverty").await.unwrap();
        assert_eq!(text, format!("{newer}.dat<>newer (1)\n{older}.dat<>older (1)\n"));

        let summaries = lifecycle.subjects("poverty").await.unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].id, full);
        assert!(summaries[0].archived);
    }

    #[tokio::test]
    async fn remove_stats_and_search() {
        let lifecycle = lifecycle(2);
        let a = open(&lifecycle, "poverty", "cats").await;
        reply(&lifecycle, a, "meow").await.unwrap();
        let b = open(&lifecycle, "poverty", "dogs").await;
        open(&lifecycle, "news", "weather").await;

        let stats = lifecycle.stats(Some("poverty")).await.unwrap();
        assert_eq!(stats.total_threads, 2);
        assert_eq!(stats.archived_threads, 1);
        assert_eq!(stats.active_threads, 1);
        assert_eq!(stats.total_posts, 3);
        assert_eq!(lifecycle.stats(None).await.unwrap().total_threads, 3);

        let hits = lifecycle.search("meow", None).await.unwrap();
        assert_eq!(hits.iter().map(|s| s.id).collect::<Vec<_>>(), vec![a]);

        assert!(lifecycle.remove(b).await.unwrap());
        assert!(!lifecycle.remove(b).await.unwrap());
        let err = lifecycle.read("poverty", b, &RangeQuery::All).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn read_is_scoped_to_the_board() {
        let lifecycle = lifecycle(10);
        let id = open(&lifecycle, "news", "s").await;
        let err = lifecycle.read("poverty", id, &RangeQuery::All).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(..)));

        let err = reply(&lifecycle, id, "wrong board").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
