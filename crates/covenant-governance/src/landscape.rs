//! The "landscape" block the Agent appends to its system prompt before a
//! tool-loop call: one-line deterministic summaries of every indexed
//! contract, grouped by status, so the model doesn't redefine a metric
//! that's already agreed or collide with terminology already in flight.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

const DEFINITION_LIMIT: usize = 120;
const FORMULA_LIMIT: usize = 100;
const DATA_SOURCE_LIMIT: usize = 80;
const EXTRA_TIME_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub definition: String,
    pub formula: String,
    pub data_source: String,
    pub extra_time_path: String,
}

fn snippet(text: &str, max_len: usize) -> String {
    let Some(first) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return String::new();
    };
    if first.chars().count() > max_len {
        let truncated: String = first.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    } else {
        first.to_string()
    }
}

fn extract_sections(md: &str) -> BTreeMap<String, String> {
    let h2 = Regex::new(r"^##\s+(.+?)\s*$").unwrap();
    let mut sections: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    let mut current: Option<String> = None;
    for line in md.lines() {
        if let Some(cap) = h2.captures(line) {
            let name = cap[1].trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if let Some(ref name) = current {
            sections.entry(name.clone()).or_default().push(line);
        }
    }
    sections
        .into_iter()
        .map(|(k, v)| (k, v.join("\n").trim().to_string()))
        .collect()
}

/// Deterministic extraction of the fields the landscape block needs from
/// one contract's markdown — no LLM involved.
pub fn generate_summary(contract_id: &str, markdown: &str, status: &str) -> ContractSummary {
    let h1 = Regex::new(r"(?m)^#\s+Data Contract:\s*(.+?)\s*$").unwrap();
    let name = h1
        .captures(markdown)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| contract_id.to_string());

    let sections = extract_sections(markdown);
    let get = |key: &str| sections.get(key).cloned().unwrap_or_default();

    ContractSummary {
        id: contract_id.to_string(),
        name,
        status: status.to_string(),
        definition: snippet(&get("Определение"), DEFINITION_LIMIT),
        formula: snippet(&get("Формула"), FORMULA_LIMIT),
        data_source: snippet(&get("Источник данных"), DATA_SOURCE_LIMIT),
        extra_time_path: snippet(&get("Связь с Extra Time"), EXTRA_TIME_LIMIT),
    }
}

fn status_rank(status: &str) -> u8 {
    match status {
        "agreed" => 0,
        "in_review" => 1,
        "draft" => 2,
        _ => 99,
    }
}

fn status_label(status: &str) -> String {
    match status {
        "agreed" => "Согласованные".to_string(),
        "in_review" => "На ревью".to_string(),
        "draft" => "Черновики".to_string(),
        other => other.to_string(),
    }
}

/// Renders the full landscape block, grouped by status and sorted within
/// each group by contract id. Returns `""` for an empty summary set.
pub fn format_summaries_for_prompt(summaries: &[ContractSummary]) -> String {
    if summaries.is_empty() {
        return String::new();
    }

    let mut groups: BTreeMap<String, Vec<&ContractSummary>> = BTreeMap::new();
    for s in summaries {
        groups.entry(s.status.clone()).or_default().push(s);
    }

    let mut statuses: Vec<&String> = groups.keys().collect();
    statuses.sort_by_key(|s| status_rank(s));

    let mut lines = vec![
        "# Ландшафт контрактов".to_string(),
        String::new(),
        "Ниже — краткие суммари всех контрактов. Используй их чтобы:".to_string(),
        "- НЕ дублировать определения, которые уже зафиксированы".to_string(),
        "- Сохранять единую терминологию".to_string(),
        "- Ссылаться на связанные контракты".to_string(),
        "- Для полного текста используй `read_contract` / `read_draft`".to_string(),
        String::new(),
    ];

    for status in statuses {
        let mut items = groups[status].clone();
        items.sort_by(|a, b| a.id.cmp(&b.id));

        lines.push(format!("## {}", status_label(status)));
        lines.push(String::new());
        for s in items {
            let mut parts = vec![format!("`{}` — {}", s.id, s.name)];
            if !s.definition.is_empty() {
                parts.push(format!("Опр: {}", s.definition));
            }
            if !s.formula.is_empty() {
                parts.push(format!("Формула: {}", s.formula));
            }
            if !s.extra_time_path.is_empty() {
                parts.push(format!("ET: {}", s.extra_time_path));
            }
            lines.push(parts.join(" | "));
        }
        lines.push(String::new());
    }

    lines.join("\n").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_and_section_snippets() {
        let md = "# Data Contract: MAU\n\n## Определение\nДоля активных пользователей.\nВторая строка игнорируется тут.\n\n## Формула\nЧеловеческая: count(active)/count(total)\n";
        let s = generate_summary("mau", md, "agreed");
        assert_eq!(s.name, "MAU");
        assert_eq!(s.definition, "Доля активных пользователей.");
        assert!(s.formula.starts_with("Человеческая"));
    }

    #[test]
    fn falls_back_to_id_when_h1_missing() {
        let s = generate_summary("mau", "no heading here", "draft");
        assert_eq!(s.name, "mau");
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(format_summaries_for_prompt(&[]), "");
    }

    #[test]
    fn groups_by_status_agreed_first() {
        let a = generate_summary("a", "# Data Contract: A\n## Определение\nx", "draft");
        let b = generate_summary("b", "# Data Contract: B\n## Определение\ny", "agreed");
        let rendered = format_summaries_for_prompt(&[a, b]);
        let agreed_pos = rendered.find("Согласованные").unwrap();
        let draft_pos = rendered.find("Черновики").unwrap();
        assert!(agreed_pos < draft_pos);
    }
}
