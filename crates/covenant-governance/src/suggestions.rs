//! Proactive suggestion of the next Data Contract to agree on: nearby
//! uncovered tree nodes after an agreement, a periodic coverage scan, and
//! the triple-dedup / daily-cap gate before a suggestion is actually sent.

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use covenant_store::types::{ContractIndexEntry, QueueItem, SuggestionRecord};

use crate::tree::{self, TreeNode};

const ACTIVE_STATUSES: &[&str] = &["draft", "in_review", "approved", "active", "agreed"];

const CIRCLE_KEYWORDS: &[(&str, &[&str])] = &[
    ("Sales", &["WIN", "NI", "pipeline", "conversion", "sales", "acquisition", "новых клиентов"]),
    ("Product", &["MAU", "activation", "feature", "adoption", "product", "onboarding"]),
    ("Customer Success", &["Churn", "Retention", "NPS", "CSAT", "REC", "renewal"]),
    ("Analytics & Data", &["data", "quality", "metric", "analytics", "reporting"]),
    ("Engineering", &["uptime", "deployment", "infrastructure", "SLA", "error rate", "load time"]),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionCandidate {
    pub contract_id: String,
    pub metric_name: String,
    pub tree_path: String,
    pub priority: Option<u8>,
    pub reason: String,
    pub stakeholders: Vec<String>,
    pub related_to: Option<String>,
}

fn parse_circles(circles_md: &str) -> BTreeMap<String, String> {
    let lead_re = Regex::new(r"@(\S+)").unwrap();
    let mut result = BTreeMap::new();
    let mut current_circle: Option<String> = None;

    for line in circles_md.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            current_circle = Some(heading.trim().to_string());
        } else if let Some(circle) = &current_circle {
            if line.contains("Ответственный:") {
                if let Some(cap) = lead_re.captures(line) {
                    result.insert(circle.clone(), cap[1].to_string());
                }
            }
        }
    }
    result
}

fn resolve_stakeholders(metric_name: &str, circles_md: &str) -> Vec<String> {
    let circle_leads = parse_circles(circles_md);
    if circle_leads.is_empty() {
        return Vec::new();
    }

    let name_lower = metric_name.to_lowercase();
    let mut matched = Vec::new();

    for (circle, keywords) in CIRCLE_KEYWORDS {
        if keywords.iter().any(|kw| name_lower.contains(&kw.to_lowercase())) {
            if let Some(lead) = circle_leads.get(*circle) {
                if !matched.contains(lead) {
                    matched.push(lead.clone());
                }
            }
        }
    }
    matched
}

const SLUG_MAX_LEN: usize = 64;

/// Slugifies a metric's display name to the contract-id form used
/// elsewhere in the index and queue (lowercase, ASCII, underscore-joined).
pub fn slugify_metric(name: &str) -> String {
    covenant_core::ContractId::slugify(name, SLUG_MAX_LEN).as_str().to_string()
}

fn priority_map(queue: &[QueueItem]) -> BTreeMap<String, u8> {
    queue.iter().filter_map(|q| q.priority.map(|p| (q.contract_id.clone(), p))).collect()
}

fn tree_depth(tree_path: &str) -> usize {
    tree_path.matches('→').count()
}

fn sort_candidates(candidates: &mut [SuggestionCandidate]) {
    candidates.sort_by_key(|c| (c.priority.unwrap_or(u8::MAX), tree_depth(&c.tree_path)));
}

/// Walks siblings, sibling-children, and parent-sibling-children
/// ("cousins") of the just-agreed node for nearby uncovered contracts,
/// capped to the top 2 by (queue priority, tree depth).
pub fn suggest_after_agreement(
    tree_md: &str,
    agreed_id: &str,
    circles_md: &str,
    queue: &[QueueItem],
) -> Vec<SuggestionCandidate> {
    let Some(root) = tree::parse_tree(tree_md) else { return Vec::new() };
    let Some(node) = tree::find_node_by_id(&root, agreed_id) else { return Vec::new() };

    let mut nearby: Vec<Rc<TreeNode>> = Vec::new();
    for sib in tree::get_siblings(&node) {
        if sib.has_contract_marker && !sib.is_agreed {
            nearby.push(sib.clone());
        }
        for child in sib.children.borrow().iter() {
            if child.has_contract_marker && !child.is_agreed {
                nearby.push(child.clone());
            }
        }
    }

    if let Some(parent) = node.parent.borrow().upgrade() {
        if !parent.short_name.is_empty() || !Rc::ptr_eq(&parent, &root) {
            for uncle in tree::get_siblings(&parent) {
                for child in uncle.children.borrow().iter() {
                    if child.has_contract_marker && !child.is_agreed {
                        nearby.push(child.clone());
                    }
                }
            }
        }
    }

    if nearby.is_empty() {
        return Vec::new();
    }

    let queue_map = priority_map(queue);
    let mut candidates = Vec::new();
    let mut seen_ids = HashSet::new();

    for tn in &nearby {
        let cid = slugify_metric(&tn.short_name);
        if !seen_ids.insert(cid.clone()) {
            continue;
        }
        let priority = queue_map.get(&cid).copied();
        let stakeholders = resolve_stakeholders(&tn.short_name, circles_md);

        candidates.push(SuggestionCandidate {
            contract_id: cid,
            metric_name: tn.short_name.clone(),
            tree_path: tree::get_path_to_root(tn),
            priority,
            reason: format!("Связан с только что согласованным контрактом {agreed_id}"),
            stakeholders,
            related_to: Some(agreed_id.to_string()),
        });
    }

    sort_candidates(&mut candidates);
    candidates.truncate(2);
    candidates
}

/// Scans the whole tree for marked-but-unagreed nodes, excluding those
/// already active in the contract index. Uncapped — callers decide how
/// much of the result to actually display.
pub fn coverage_scan(
    tree_md: &str,
    contracts: &[ContractIndexEntry],
    circles_md: &str,
    queue: &[QueueItem],
) -> Vec<SuggestionCandidate> {
    let Some(root) = tree::parse_tree(tree_md) else { return Vec::new() };
    let uncovered = tree::get_uncovered_nodes(&root);
    if uncovered.is_empty() {
        return Vec::new();
    }

    let active_ids: HashSet<String> = contracts
        .iter()
        .filter(|c| c.status.as_deref().map(|s| ACTIVE_STATUSES.contains(&s)).unwrap_or(false))
        .map(|c| c.id.to_lowercase())
        .collect();

    let queue_map = priority_map(queue);
    let mut candidates = Vec::new();

    for tn in &uncovered {
        let cid = slugify_metric(&tn.short_name);
        if active_ids.contains(&cid) {
            continue;
        }
        let priority = queue_map.get(&cid).copied();
        let stakeholders = resolve_stakeholders(&tn.short_name, circles_md);

        candidates.push(SuggestionCandidate {
            contract_id: cid,
            metric_name: tn.short_name.clone(),
            tree_path: tree::get_path_to_root(tn),
            priority,
            reason: "Метрика отмечена для контракта, но ещё не согласована".to_string(),
            stakeholders,
            related_to: None,
        });
    }

    sort_candidates(&mut candidates);
    candidates
}

/// Triple dedup: drop candidates already active in the index, recently
/// suggested/accepted, or recently dismissed.
pub fn filter_already_suggested(
    candidates: Vec<SuggestionCandidate>,
    contracts: &[ContractIndexEntry],
    suggestions: &[SuggestionRecord],
    now: DateTime<Utc>,
    cooldown_days: i64,
    dismiss_cooldown_days: i64,
) -> Vec<SuggestionCandidate> {
    if candidates.is_empty() {
        return candidates;
    }

    let active_ids: HashSet<String> = contracts
        .iter()
        .filter(|c| c.status.as_deref().map(|s| ACTIVE_STATUSES.contains(&s)).unwrap_or(false))
        .map(|c| c.id.to_lowercase())
        .collect();

    let mut recent_ids = HashSet::new();
    let mut dismissed_ids = HashSet::new();

    for s in suggestions {
        let Ok(dt) = DateTime::parse_from_rfc3339(&s.suggested_at) else { continue };
        let dt = dt.with_timezone(&Utc);
        match s.status.as_str() {
            "dismissed" => {
                if now - dt < Duration::days(dismiss_cooldown_days) {
                    dismissed_ids.insert(s.contract_id.clone());
                }
            }
            "suggested" | "accepted" => {
                if now - dt < Duration::days(cooldown_days) {
                    recent_ids.insert(s.contract_id.clone());
                }
            }
            _ => {}
        }
    }

    candidates
        .into_iter()
        .filter(|c| {
            !active_ids.contains(&c.contract_id)
                && !recent_ids.contains(&c.contract_id)
                && !dismissed_ids.contains(&c.contract_id)
        })
        .collect()
}

/// Rate limit: at most `max_per_day` suggestions recorded per UTC day.
pub fn can_suggest_today(suggestions: &[SuggestionRecord], now: DateTime<Utc>, max_per_day: usize) -> bool {
    let today = now.format("%Y-%m-%d").to_string();
    let count = suggestions.iter().filter(|s| s.suggested_at.starts_with(&today)).count();
    count < max_per_day
}

/// Builds the `tasks/suggestions.json` rows for `candidates`, with
/// sequential per-day ids (`sug_<YYYYMMDD>_<seq:03>`).
pub fn build_suggestion_records(
    existing: &[SuggestionRecord],
    candidates: &[SuggestionCandidate],
    trigger: &str,
    thread_id: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<SuggestionRecord> {
    let today = now.format("%Y%m%d").to_string();
    let prefix = format!("sug_{today}");
    let existing_today = existing.iter().filter(|s| s.id.starts_with(&prefix)).count();

    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let seq = existing_today + i + 1;
            SuggestionRecord {
                id: format!("{prefix}_{seq:03}"),
                contract_id: c.contract_id.clone(),
                metric_name: Some(c.metric_name.clone()),
                trigger: trigger.to_string(),
                suggested_at: now.to_rfc3339(),
                thread_id: thread_id.map(String::from),
                status: "suggested".to_string(),
                status_updated_at: Some(now.to_rfc3339()),
            }
        })
        .collect()
}

pub fn format_suggestion_message(candidates: &[SuggestionCandidate]) -> String {
    if candidates.is_empty() {
        return String::new();
    }

    candidates
        .iter()
        .map(|c| {
            let stakeholders_str = if c.stakeholders.is_empty() {
                "—".to_string()
            } else {
                c.stakeholders.iter().map(|s| format!("@{s}")).collect::<Vec<_>>().join(", ")
            };
            format!(
                ":dart: **Предложение: следующий Data Contract**\n\n**{}** (`{}`)\n\nПочему сейчас: {}\nПуть: {}\nОтветственные: {stakeholders_str}\n\n> Хотите начать? Ответьте здесь или: `начни контракт {}`",
                c.metric_name, c.contract_id, c.reason, c.tree_path, c.contract_id,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub fn format_coverage_message(candidates: &[SuggestionCandidate]) -> String {
    if candidates.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        ":bar_chart: **Обзор покрытия метрик контрактами**\n".to_string(),
        format!("Найдено {} метрик без согласованного контракта:\n", candidates.len()),
    ];

    for (i, c) in candidates.iter().enumerate() {
        let priority_str = c.priority.map(|p| format!(" (приоритет {p})")).unwrap_or_default();
        lines.push(format!("{}. **{}**{priority_str} — {}", i + 1, c.metric_name, c.tree_path));
        if !c.stakeholders.is_empty() {
            let stakeholders_str = c.stakeholders.iter().map(|s| format!("@{s}")).collect::<Vec<_>>().join(", ");
            lines.push(format!("   Ответственные: {stakeholders_str}"));
        }
    }

    lines.push("\n> Хотите начать с какого-то? Напишите: `начни контракт <id>`".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TREE: &str = "\
Metrics
├── Activation
│   ├── MAU ← DATA CONTRACT ✅
│   └── WIN NI ← DATA CONTRACT
└── Churn ← DATA CONTRACT
";

    const CIRCLES: &str = "## Sales\nОтветственный: @bob\n\n## Product\nОтветственный: @alice\n";

    #[test]
    fn suggest_after_agreement_picks_uncovered_siblings() {
        let candidates = suggest_after_agreement(TREE, "mau", CIRCLES, &[]);
        assert!(candidates.iter().any(|c| c.metric_name == "WIN NI"));
    }

    #[test]
    fn coverage_scan_excludes_active_contracts() {
        let contracts = vec![ContractIndexEntry {
            id: slugify_metric("WIN NI"),
            status: Some("active".to_string()),
            tier: None,
            agreed_date: None,
            owner: None,
            versions_dir: None,
            history_file: None,
            extra: serde_json::Map::new(),
        }];
        let candidates = coverage_scan(TREE, &contracts, CIRCLES, &[]);
        assert!(!candidates.iter().any(|c| c.metric_name == "WIN NI"));
        assert!(candidates.iter().any(|c| c.metric_name == "Churn"));
    }

    #[test]
    fn stakeholders_resolve_from_circle_keywords() {
        let stakeholders = resolve_stakeholders("WIN NI", CIRCLES);
        assert_eq!(stakeholders, vec!["bob".to_string()]);
    }

    #[test]
    fn suggestion_ids_are_sequential_per_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let candidates = vec![
            SuggestionCandidate {
                contract_id: "a".into(),
                metric_name: "A".into(),
                tree_path: "A".into(),
                priority: None,
                reason: "x".into(),
                stakeholders: vec![],
                related_to: None,
            },
            SuggestionCandidate {
                contract_id: "b".into(),
                metric_name: "B".into(),
                tree_path: "B".into(),
                priority: None,
                reason: "x".into(),
                stakeholders: vec![],
                related_to: None,
            },
        ];
        let records = build_suggestion_records(&[], &candidates, "coverage_scan", None, now);
        assert_eq!(records[0].id, "sug_20260301_001");
        assert_eq!(records[1].id, "sug_20260301_002");
    }

    #[test]
    fn can_suggest_today_enforces_daily_cap() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let existing = vec![SuggestionRecord {
            id: "sug_20260301_001".into(),
            contract_id: "a".into(),
            metric_name: None,
            trigger: "x".into(),
            suggested_at: now.to_rfc3339(),
            thread_id: None,
            status: "suggested".into(),
            status_updated_at: None,
        }];
        assert!(!can_suggest_today(&existing, now, 1));
        assert!(can_suggest_today(&existing, now, 2));
    }
}
