//! The no-LLM gather step: pulls everything the scoring and planning steps
//! need out of the store in one pass, before any model call is made.

use std::rc::Rc;

use chrono::Utc;
use covenant_governance::analyzer::{detect_conflicts, Conflict};
use covenant_governance::governance::{find_contracts_requiring_review, ReviewItem};
use covenant_governance::suggestions::{coverage_scan, SuggestionCandidate};
use covenant_governance::tree::{self, TreeNode};
use covenant_store::types::{ContractIndexEntry, QueueItem, Reminder};
use covenant_store::Store;

const METRICS_TREE_PATH: &str = "context/metrics_tree.md";
const CIRCLES_PATH: &str = "context/circles.md";

pub struct Gathered {
    pub contracts: Vec<ContractIndexEntry>,
    pub tree_md: String,
    pub circles_md: String,
    pub queue: Vec<QueueItem>,
    pub reminders: Vec<Reminder>,
    pub conflicts: Vec<Conflict>,
    pub uncovered: Vec<SuggestionCandidate>,
    pub stale_reviews: Vec<ReviewItem>,
}

impl Gathered {
    pub fn depth_of(&self, contract_id: &str) -> Option<i64> {
        let root = tree::parse_tree(&self.tree_md)?;
        let node = tree::find_node_by_id(&root, contract_id)?;
        Some(depth(&node))
    }
}

fn depth(node: &Rc<TreeNode>) -> i64 {
    let mut d = 0i64;
    let mut current = node.parent.borrow().upgrade();
    while let Some(p) = current {
        if p.short_name.is_empty() {
            break;
        }
        d += 1;
        current = p.parent.borrow().upgrade();
    }
    d
}

pub fn gather(store: &dyn Store, stale_review_days: i64) -> crate::error::Result<Gathered> {
    let contracts = store.list_contracts()?;
    let tree_md = store.read_file(METRICS_TREE_PATH)?.unwrap_or_default();
    let circles_md = store.read_file(CIRCLES_PATH)?.unwrap_or_default();
    let queue = store.get_queue()?;
    let reminders = store.get_reminders()?;

    let conflicts = detect_conflicts(&contracts, None, |id| store.get_contract(id).ok().flatten());
    let uncovered = coverage_scan(&tree_md, &contracts, &circles_md, &queue);
    let stale_reviews = find_contracts_requiring_review(&contracts, Utc::now(), stale_review_days);

    Ok(Gathered { contracts, tree_md, circles_md, queue, reminders, conflicts, uncovered, stale_reviews })
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_store::FileTreeStore;

    #[test]
    fn gather_on_empty_store_returns_empty_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.01);
        let gathered = gather(&store, 180).unwrap();
        assert!(gathered.contracts.is_empty());
        assert!(gathered.conflicts.is_empty());
        assert!(gathered.uncovered.is_empty());
        assert!(gathered.stale_reviews.is_empty());
    }

    #[test]
    fn depth_of_unknown_contract_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.01);
        let gathered = gather(&store, 180).unwrap();
        assert_eq!(gathered.depth_of("does-not-exist"), None);
    }
}
