//! Post de-duplication: one lock guarding two sets (`inflight`, `seen`) so
//! a post is admitted at most once even under duplicate chat delivery or
//! concurrent callback invocation, plus a TTL-pruned persisted mirror so a
//! restart doesn't reopen the dedup window for posts processed moments
//! before the process exited.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use covenant_store::Store;
use tracing::instrument;

use crate::error::Result;
use crate::types::{SeenPostEntry, SeenPostsFile};

const SEEN_POSTS_PATH: &str = "tasks/seen_posts.json";

/// Thread-safe admission guard for inbound chat post ids.
pub struct PostDedupGuard {
    inflight: Mutex<HashSet<String>>,
    seen: Mutex<HashSet<String>>,
    max_entries: usize,
}

impl PostDedupGuard {
    pub fn new(max_entries: usize) -> Self {
        Self { inflight: Mutex::new(HashSet::new()), seen: Mutex::new(HashSet::new()), max_entries }
    }

    /// Loads the persisted mirror, keeping only entries within `ttl_seconds`,
    /// so dedup survives a restart.
    pub fn hydrate(store: &dyn Store, max_entries: usize, ttl_seconds: i64) -> Result<Self> {
        let guard = Self::new(max_entries);
        let Some(value) = store.read_json_value(SEEN_POSTS_PATH)? else { return Ok(guard) };
        let Ok(file) = serde_json::from_value::<SeenPostsFile>(value) else { return Ok(guard) };

        let now = Utc::now();
        let mut seen = guard.seen.lock().unwrap();
        for entry in file.posts {
            let Ok(ts) = DateTime::parse_from_rfc3339(&entry.ts) else { continue };
            if now.signed_duration_since(ts.with_timezone(&Utc)).num_seconds() <= ttl_seconds {
                seen.insert(entry.post_id);
            }
        }
        drop(seen);
        Ok(guard)
    }

    /// Returns `true` if `post_id` is neither in-flight nor already
    /// processed, admitting it into `inflight` atomically under one lock.
    #[instrument(skip(self), fields(post_id))]
    pub fn try_admit(&self, post_id: &str) -> bool {
        if post_id.is_empty() {
            return true;
        }
        let mut inflight = self.inflight.lock().unwrap();
        let seen = self.seen.lock().unwrap();
        if seen.contains(post_id) || inflight.contains(post_id) {
            return false;
        }
        inflight.insert(post_id.to_string());
        true
    }

    /// Moves `post_id` from in-flight to seen, half-discarding the seen set
    /// when it grows past `max_entries`, and persists the mirror so a
    /// restart picks up where this one left off.
    pub fn mark_processed(&self, store: &dyn Store, post_id: &str) -> Result<()> {
        if post_id.is_empty() {
            return Ok(());
        }

        {
            let mut inflight = self.inflight.lock().unwrap();
            let mut seen = self.seen.lock().unwrap();
            inflight.remove(post_id);
            seen.insert(post_id.to_string());
            if seen.len() > self.max_entries {
                let keep = self.max_entries / 2;
                let trimmed: HashSet<String> = seen.iter().cloned().take(keep).collect();
                *seen = trimmed;
                seen.insert(post_id.to_string());
            }
        }

        self.persist(store, post_id)
    }

    fn persist(&self, store: &dyn Store, post_id: &str) -> Result<()> {
        let mut file: SeenPostsFile = store
            .read_json_value(SEEN_POSTS_PATH)?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        file.posts.push(SeenPostEntry { post_id: post_id.to_string(), ts: Utc::now().to_rfc3339() });
        if file.posts.len() > self.max_entries {
            let drop_count = file.posts.len() - self.max_entries / 2;
            file.posts.drain(0..drop_count);
        }

        Ok(store.write_json_value(SEEN_POSTS_PATH, &serde_json::to_value(&file).expect("serializable"))?)
    }
}

#[cfg(test)]
mod tests {
    use covenant_store::FileTreeStore;

    use super::*;

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.01);
        (dir, store)
    }

    #[test]
    fn duplicate_post_is_rejected_once_admitted() {
        let guard = PostDedupGuard::new(4000);
        assert!(guard.try_admit("p1"));
        assert!(!guard.try_admit("p1"));
    }

    #[test]
    fn seen_post_is_rejected_after_mark_processed() {
        let (_dir, store) = store();
        let guard = PostDedupGuard::new(4000);
        assert!(guard.try_admit("p1"));
        guard.mark_processed(&store, "p1").unwrap();
        assert!(!guard.try_admit("p1"));
    }

    #[test]
    fn hydrate_restores_recent_entries_across_restart() {
        let (_dir, store) = store();
        let guard1 = PostDedupGuard::new(4000);
        guard1.try_admit("p1");
        guard1.mark_processed(&store, "p1").unwrap();

        let guard2 = PostDedupGuard::hydrate(&store, 4000, 86400).unwrap();
        assert!(!guard2.try_admit("p1"));
    }

    #[test]
    fn empty_post_id_is_always_admitted() {
        let guard = PostDedupGuard::new(4000);
        assert!(guard.try_admit(""));
        assert!(guard.try_admit(""));
    }
}
