//! Periodic review triggers and tier-based approval quorum checks.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use covenant_store::types::ContractIndexEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub contract_id: String,
    pub name: String,
    pub agreed_date: Option<String>,
    pub days: i64,
    pub reason: String,
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
}

/// Contracts whose `agreed_date` is more than `days_threshold` days in the
/// past, sorted oldest-first.
pub fn find_contracts_requiring_review(
    contracts: &[ContractIndexEntry],
    now: DateTime<Utc>,
    days_threshold: i64,
) -> Vec<ReviewItem> {
    let mut items: Vec<ReviewItem> = contracts
        .iter()
        .filter_map(|c| {
            let agreed_date = c.agreed_date.as_ref()?;
            let dt = parse_date(agreed_date)?;
            let days = (now - dt).num_days();
            if days <= days_threshold {
                return None;
            }
            let name = c
                .extra
                .get("name")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| c.id.clone());
            Some(ReviewItem {
                contract_id: c.id.clone(),
                name,
                agreed_date: Some(agreed_date.clone()),
                days,
                reason: format!("прошло {days} дней с согласования (> {days_threshold})"),
            })
        })
        .collect();

    items.sort_by(|a, b| b.days.cmp(&a.days));
    items
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub tier: String,
    pub approval_required: Vec<String>,
    pub consensus_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalCheck {
    pub ok: bool,
    pub missing_roles: Vec<String>,
    pub threshold: f64,
    pub have_ratio: f64,
}

fn extract_approvers(contract_md: &str) -> Vec<String> {
    let handle_re = Regex::new(r"(?i)@([a-z0-9_.-]+)").unwrap();
    let mut in_section = false;
    let mut seen = HashSet::new();
    let mut users = Vec::new();

    for line in contract_md.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("## ") {
            in_section = trimmed.to_lowercase().starts_with("## согласовано");
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some(cap) = handle_re.captures(line) {
            let handle = cap[1].to_lowercase();
            if seen.insert(handle.clone()) {
                users.push(handle);
            }
        }
    }
    users
}

/// Checks whether a contract's "## Согласовано" approvers satisfy the
/// tier's required roles, per `role_map` (username → role key).
pub fn check_approval_policy(
    contract_md: &str,
    policy: &ApprovalPolicy,
    role_map: &std::collections::HashMap<String, String>,
) -> ApprovalCheck {
    let approvers = extract_approvers(contract_md);
    let have_roles: HashSet<&str> = approvers
        .iter()
        .filter_map(|u| role_map.get(u).map(|s| s.as_str()))
        .collect();

    let mut required = Vec::new();
    let mut seen = HashSet::new();
    for role in &policy.approval_required {
        if !role.is_empty() && seen.insert(role.clone()) {
            required.push(role.clone());
        }
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|r| !have_roles.contains(r.as_str()))
        .cloned()
        .collect();

    let have = required.len() - missing.len();
    let ratio = if required.is_empty() { 1.0 } else { have as f64 / required.len() as f64 };

    let ok = if policy.consensus_threshold == 1.0 {
        missing.is_empty()
    } else {
        ratio >= policy.consensus_threshold
    };

    ApprovalCheck { ok, missing_roles: missing, threshold: policy.consensus_threshold, have_ratio: ratio }
}

pub fn render_review_report(items: &[ReviewItem], days_threshold: i64) -> String {
    if items.is_empty() {
        return format!("✅ Нет контрактов, требующих пересмотра (порог {days_threshold} дней).");
    }

    let mut lines = vec![
        format!("⏰ Контракты, требующие пересмотра (порог {days_threshold} дней):"),
        String::new(),
    ];
    for item in items.iter().take(20) {
        lines.push(format!(
            "- `{}` ({}) — {} — agreed_date={}",
            item.contract_id,
            item.name,
            item.reason,
            item.agreed_date.as_deref().unwrap_or("—"),
        ));
    }
    if items.len() > 20 {
        lines.push(format!("…и ещё {}", items.len() - 20));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: &str, agreed_date: Option<&str>) -> ContractIndexEntry {
        ContractIndexEntry {
            id: id.to_string(),
            status: None,
            tier: None,
            agreed_date: agreed_date.map(String::from),
            owner: None,
            versions_dir: None,
            history_file: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn old_agreed_date_requires_review() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let contracts = vec![entry("mau", Some("2025-01-01"))];
        let items = find_contracts_requiring_review(&contracts, now, 180);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].contract_id, "mau");
    }

    #[test]
    fn recent_agreed_date_does_not_require_review() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let contracts = vec![entry("mau", Some("2025-12-01"))];
        assert!(find_contracts_requiring_review(&contracts, now, 180).is_empty());
    }

    #[test]
    fn tier1_policy_requires_every_role_explicitly() {
        let md = "## Согласовано\n@alice approved\n";
        let policy = ApprovalPolicy {
            tier: "tier_1".into(),
            approval_required: vec!["ceo".into(), "cfo".into()],
            consensus_threshold: 1.0,
        };
        let mut role_map = std::collections::HashMap::new();
        role_map.insert("alice".to_string(), "ceo".to_string());

        let check = check_approval_policy(md, &policy, &role_map);
        assert!(!check.ok);
        assert_eq!(check.missing_roles, vec!["cfo".to_string()]);
    }

    #[test]
    fn ratio_threshold_below_one_allows_partial_quorum() {
        let md = "## Согласовано\n@alice approved\n";
        let policy = ApprovalPolicy {
            tier: "tier_2".into(),
            approval_required: vec!["circle_lead".into(), "data_lead".into()],
            consensus_threshold: 0.5,
        };
        let mut role_map = std::collections::HashMap::new();
        role_map.insert("alice".to_string(), "circle_lead".to_string());

        let check = check_approval_policy(md, &policy, &role_map);
        assert!(check.ok);
        assert_eq!(check.have_ratio, 0.5);
    }
}
