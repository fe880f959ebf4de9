//! Priority scoring for planner candidates: a fixed weighted sum over six
//! clamped [0,1] signals, ranked descending.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub tree_depth: f64,
    pub queue_priority: f64,
    pub blocker_age: f64,
    pub stakeholder_avail: f64,
    pub has_conflicts: f64,
    pub in_progress: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CandidateType {
    NewContract,
    ConflictResolution,
    StaleReview,
}

impl CandidateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateType::NewContract => "new_contract",
            CandidateType::ConflictResolution => "conflict_resolution",
            CandidateType::StaleReview => "stale_review",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub contract_id: String,
    pub metric_name: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub candidate_type: CandidateType,
    pub tree_depth: Option<i64>,
    pub conflict_types: Vec<String>,
    pub stakeholders: Vec<String>,
}

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Closer to root = higher score. depth=0 -> 1.0, depth=max_depth -> 0.0.
pub fn tree_depth_score(depth: Option<i64>, max_depth: f64) -> f64 {
    match depth {
        Some(d) => clamp(1.0 - d as f64 / max_depth),
        None => 0.0,
    }
}

/// Lower priority number = higher score. priority=1 -> 1.0, priority=max -> 0.0.
pub fn queue_priority_score(priority: Option<u8>, max_priority: f64) -> f64 {
    match priority {
        Some(p) => clamp(1.0 - (p as f64 - 1.0) / (max_priority - 1.0).max(1.0)),
        None => 0.0,
    }
}

/// Longer blocked = more urgent. 0 days -> 0.0, 14+ days -> 1.0.
pub fn blocker_age_score(days_blocked: f64) -> f64 {
    clamp(days_blocked / 14.0)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInputs {
    pub depth: Option<i64>,
    pub priority: Option<u8>,
    pub days_blocked: f64,
    pub stakeholder_available: bool,
    pub has_conflicts: bool,
    pub is_in_progress: bool,
}

pub fn compute_priority_score(inputs: ScoreInputs) -> (f64, ScoreBreakdown) {
    let td = tree_depth_score(inputs.depth, 6.0);
    let qp = queue_priority_score(inputs.priority, 20.0);
    let ba = blocker_age_score(inputs.days_blocked);
    let sa = if inputs.stakeholder_available { 1.0 } else { 0.0 };
    let cs = if inputs.has_conflicts { 1.0 } else { 0.0 };
    let ip = if inputs.is_in_progress { 1.0 } else { 0.0 };

    let score = 0.30 * td + 0.25 * qp + 0.15 * ba + 0.15 * sa + 0.10 * cs + 0.05 * ip;
    let breakdown =
        ScoreBreakdown { tree_depth: td, queue_priority: qp, blocker_age: ba, stakeholder_avail: sa, has_conflicts: cs, in_progress: ip };

    ((score * 10000.0).round() / 10000.0, breakdown)
}

pub fn rank_candidates(mut candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_depth_root_scores_highest() {
        assert_eq!(tree_depth_score(Some(0), 6.0), 1.0);
        assert_eq!(tree_depth_score(Some(6), 6.0), 0.0);
    }

    #[test]
    fn queue_priority_top_item_scores_highest() {
        assert_eq!(queue_priority_score(Some(1), 20.0), 1.0);
        assert!(queue_priority_score(Some(20), 20.0) < 0.1);
    }

    #[test]
    fn blocker_age_saturates_at_two_weeks() {
        assert_eq!(blocker_age_score(0.0), 0.0);
        assert_eq!(blocker_age_score(30.0), 1.0);
    }

    #[test]
    fn rank_candidates_sorts_descending() {
        let low = ScoredCandidate {
            contract_id: "low".into(),
            metric_name: "low".into(),
            score: 0.1,
            breakdown: compute_priority_score(ScoreInputs::default()).1,
            candidate_type: CandidateType::NewContract,
            tree_depth: None,
            conflict_types: vec![],
            stakeholders: vec![],
        };
        let mut high = low.clone();
        high.score = 0.9;
        let ranked = rank_candidates(vec![low, high]);
        assert_eq!(ranked[0].score, 0.9);
    }
}
