use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One entry of `tasks/active_threads.json`: the thread a contract's
/// ongoing discussion is currently attached to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveThreadEntry {
    pub root_post_id: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActiveThreadsFile {
    #[serde(default)]
    pub threads: HashMap<String, ActiveThreadEntry>,
}

/// One entry of `tasks/seen_posts.json`: the persisted mirror of the
/// Listener's in-memory dedup set, so a restart doesn't reopen the dedup
/// window for posts processed moments before.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenPostEntry {
    pub post_id: String,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeenPostsFile {
    #[serde(default)]
    pub posts: Vec<SeenPostEntry>,
}
