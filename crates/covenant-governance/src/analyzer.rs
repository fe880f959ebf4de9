//! Deterministic conflict detection across agreed/active contracts: name
//! collisions with diverging formulas, broken or missing Extra Time
//! linkage, dangling/self/cyclic related-contract references, and an
//! overlapping-definitions heuristic over tokenized "Определение" text.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use covenant_store::types::ContractIndexEntry;

use crate::markdown::{extract_name, extract_sections};

const STOP_WORDS_RU: &[&str] = &[
    "и", "в", "во", "на", "по", "из", "для", "что", "это", "как", "когда", "где", "или", "а",
    "мы", "вы", "они", "он", "она", "оно", "этот", "эта", "эти", "тот", "та", "те", "не", "нет",
    "да", "же", "ли", "бы", "секция", "контракт", "метрика", "показатель",
];

const AMBIGUOUS_WORDS: &[&str] =
    &["примерно", "около", "приблизительно", "где-то", "как-то", "иногда"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    High,
    Medium,
    Low,
}

impl ConflictSeverity {
    fn rank(self) -> u8 {
        match self {
            ConflictSeverity::High => 0,
            ConflictSeverity::Medium => 1,
            ConflictSeverity::Low => 2,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ConflictSeverity::High => "high",
            ConflictSeverity::Medium => "medium",
            ConflictSeverity::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub conflict_type: String,
    pub severity: ConflictSeverity,
    pub title: String,
    pub details: String,
    pub contracts: Vec<String>,
}

fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let punct_re = Regex::new(r"[\-_/:]+").unwrap();
    let non_alnum_re = Regex::new(r"[^a-z0-9\s]").unwrap();
    let ws_re = Regex::new(r"\s+").unwrap();

    let s = punct_re.replace_all(&lower, " ");
    let s = non_alnum_re.replace_all(&s, " ");
    ws_re.replace_all(&s, " ").trim().to_string()
}

fn tokenize_definition(text: &str) -> HashSet<String> {
    let token_re = Regex::new(r"(?i)[a-zа-я0-9_-]+").unwrap();
    let mut out = HashSet::new();
    for m in token_re.find_iter(&text.to_lowercase()) {
        let t = m.as_str().trim_matches(|c| c == '-' || c == '_');
        if t.chars().count() < 3 {
            continue;
        }
        if STOP_WORDS_RU.contains(&t) {
            continue;
        }
        out.insert(t.to_string());
    }
    out
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 { 0.0 } else { inter as f64 / union as f64 }
}

fn extract_related_contract_ids(contract_md: &str) -> Vec<String> {
    let sections = extract_sections(contract_md);
    let Some(rel) = sections.get("Связанные контракты") else { return Vec::new() };

    let bullet_re = Regex::new(r"^[\-*•]\s+").unwrap();
    let non_id_re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();

    rel.lines()
        .filter_map(|line| {
            let s = line.trim();
            if s.is_empty() {
                return None;
            }
            let s = bullet_re.replace(s, "");
            let s = s.split('(').next().unwrap_or("").trim();
            let s = non_id_re.replace_all(s, "");
            if s.is_empty() { None } else { Some(s.to_lowercase()) }
        })
        .collect()
}

struct LoadedContract {
    id: String,
    name: String,
    name_norm: String,
    formula: String,
    linkage: String,
    related: Vec<String>,
    def_tokens: HashSet<String>,
}

/// Detects conflicts across `contracts`, restricted to `only_contract_ids`
/// when given. `get_contract` fetches a contract's markdown body by id.
pub fn detect_conflicts(
    contracts: &[ContractIndexEntry],
    only_contract_ids: Option<&[String]>,
    get_contract: impl Fn(&str) -> Option<String>,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    let filtered: Vec<&ContractIndexEntry> = contracts
        .iter()
        .filter(|c| only_contract_ids.map(|ids| ids.iter().any(|i| i == &c.id)).unwrap_or(true))
        .collect();

    let mut loaded: HashMap<String, LoadedContract> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for c in &filtered {
        let md = get_contract(&c.id).unwrap_or_default();
        let sections = extract_sections(&md);
        let name = extract_name(&md)
            .or_else(|| c.extra.get("name").and_then(|v| v.as_str()).map(String::from))
            .unwrap_or_else(|| c.id.clone());
        let formula = sections.get("Формула").cloned().unwrap_or_default();
        let linkage = sections.get("Связь с Extra Time").cloned().unwrap_or_default();
        let definition = sections.get("Определение").cloned().unwrap_or_default();

        order.push(c.id.clone());
        loaded.insert(
            c.id.clone(),
            LoadedContract {
                id: c.id.clone(),
                name_norm: normalize_name(&name),
                name,
                formula: formula.trim().to_string(),
                linkage: linkage.trim().to_string(),
                related: extract_related_contract_ids(&md),
                def_tokens: tokenize_definition(&definition),
            },
        );
    }

    // Missing/empty key sections and formula quality.
    for cid in &order {
        let d = &loaded[cid];
        let md = get_contract(cid).unwrap_or_default();
        let sections = extract_sections(&md);

        if d.formula.is_empty() {
            conflicts.push(Conflict {
                conflict_type: "missing_formula".into(),
                severity: ConflictSeverity::High,
                title: format!("Нет формулы: {}", d.name),
                details: "Секция «Формула» пустая или отсутствует.".into(),
                contracts: vec![cid.clone()],
            });
        } else {
            let lowf = d.formula.to_lowercase();
            if AMBIGUOUS_WORDS.iter().any(|w| lowf.contains(w)) {
                conflicts.push(Conflict {
                    conflict_type: "ambiguous_formula".into(),
                    severity: ConflictSeverity::Medium,
                    title: format!("Неоднозначная формула: {}", d.name),
                    details: "В формуле есть слова неопределённости (например: 'примерно/около'). Лучше сделать формулу однозначной.".into(),
                    contracts: vec![cid.clone()],
                });
            }
        }

        let definition = sections.get("Определение").map(|s| s.trim()).unwrap_or("");
        if definition.is_empty() {
            conflicts.push(Conflict {
                conflict_type: "missing_definition".into(),
                severity: ConflictSeverity::High,
                title: format!("Нет определения: {}", d.name),
                details: "Секция «Определение» пустая или отсутствует.".into(),
                contracts: vec![cid.clone()],
            });
        }

        let src = sections.get("Источник данных").map(|s| s.trim()).unwrap_or("");
        if src.is_empty() {
            conflicts.push(Conflict {
                conflict_type: "missing_data_source".into(),
                severity: ConflictSeverity::High,
                title: format!("Нет источника данных: {}", d.name),
                details: "Секция «Источник данных» пустая или отсутствует.".into(),
                contracts: vec![cid.clone()],
            });
        }
    }

    // Extra Time linkage.
    for cid in &order {
        let d = &loaded[cid];
        if d.linkage.is_empty() {
            conflicts.push(Conflict {
                conflict_type: "missing_extra_time_linkage".into(),
                severity: ConflictSeverity::High,
                title: format!("Нет связи с Extra Time: {}", d.name),
                details: "Секция «Связь с Extra Time» пустая или отсутствует. Нужен путь вида: X → ... → Extra Time.".into(),
                contracts: vec![cid.clone()],
            });
            continue;
        }

        let low_link = d.linkage.to_lowercase();
        if !low_link.contains("extra time") || !d.linkage.contains('→') {
            conflicts.push(Conflict {
                conflict_type: "invalid_extra_time_linkage".into(),
                severity: ConflictSeverity::Medium,
                title: format!("Неочевидный путь к Extra Time: {}", d.name),
                details: "В «Связь с Extra Time» должен быть путь вида: X → ... → Extra Time.".into(),
                contracts: vec![cid.clone()],
            });
            continue;
        }

        let parts: Vec<&str> = d.linkage.split('→').map(|p| p.trim()).filter(|p| !p.is_empty()).collect();
        if parts.len() < 2 {
            conflicts.push(Conflict {
                conflict_type: "extra_time_path_too_short".into(),
                severity: ConflictSeverity::Low,
                title: format!("Слишком короткий путь к Extra Time: {}", d.name),
                details: "Ожидается путь вида «X → ... → Extra Time» (минимум 2 узла).".into(),
                contracts: vec![cid.clone()],
            });
            continue;
        }

        if normalize_name(parts[parts.len() - 1]) != normalize_name("Extra Time") {
            conflicts.push(Conflict {
                conflict_type: "extra_time_path_not_ending".into(),
                severity: ConflictSeverity::Medium,
                title: format!("Путь не заканчивается на Extra Time: {}", d.name),
                details: format!("Последний узел пути должен быть 'Extra Time'. Сейчас: '{}'.", parts[parts.len() - 1]),
                contracts: vec![cid.clone()],
            });
        }

        if normalize_name(parts[0]) != normalize_name(&d.name) {
            conflicts.push(Conflict {
                conflict_type: "extra_time_path_not_starting".into(),
                severity: ConflictSeverity::Low,
                title: format!("Путь к Extra Time не начинается с метрики: {}", d.name),
                details: format!("Первый узел пути должен быть названием метрики ('{}'). Сейчас: '{}'.", d.name, parts[0]),
                contracts: vec![cid.clone()],
            });
        }
    }

    // Name collisions with diverging formulas.
    let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
    for cid in &order {
        by_name.entry(loaded[cid].name_norm.clone()).or_default().push(cid.clone());
    }
    for (_name_norm, cids) in &by_name {
        if cids.len() < 2 {
            continue;
        }
        let formulas: HashSet<&str> = cids.iter().map(|c| loaded[c].formula.as_str()).collect();
        if formulas.len() <= 1 {
            continue;
        }
        let name = loaded[&cids[0]].name.clone();
        let mut details_lines = vec!["Одинаковое название метрики, но разные формулы:".to_string(), String::new()];
        for cid in cids {
            let f = &loaded[cid].formula;
            let f = if f.is_empty() { "(пусто)".to_string() } else { f.clone() };
            let f_short = if f.chars().count() > 240 {
                format!("{}…", f.chars().take(240).collect::<String>())
            } else {
                f
            };
            details_lines.push(format!("- {cid}: {f_short}"));
        }
        conflicts.push(Conflict {
            conflict_type: "same_name_different_formula".into(),
            severity: ConflictSeverity::High,
            title: format!("Конфликт формулы: {name}"),
            details: details_lines.join("\n"),
            contracts: cids.clone(),
        });
    }

    // Related-contract reference checks + dependency graph.
    let mut graph: HashMap<String, Vec<String>> = HashMap::new();
    for cid in &order {
        let d = &loaded[cid];
        if d.related.iter().any(|r| r == cid) {
            conflicts.push(Conflict {
                conflict_type: "self_related_reference".into(),
                severity: ConflictSeverity::Medium,
                title: format!("Самоссылка в связанных контрактах: {}", d.name),
                details: "В «Связанные контракты» указан сам контракт. Это почти всегда ошибка.".into(),
                contracts: vec![cid.clone()],
            });
        }

        let unknown: Vec<&String> = d.related.iter().filter(|r| !loaded.contains_key(*r)).collect();
        if !unknown.is_empty() {
            let ids = unknown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
            conflicts.push(Conflict {
                conflict_type: "unknown_related_contract".into(),
                severity: ConflictSeverity::Low,
                title: format!("Неизвестные связанные контракты: {}", d.name),
                details: format!("В «Связанные контракты» есть id, которых нет в contracts/index.json: {ids}"),
                contracts: vec![cid.clone()],
            });
        }

        graph.insert(cid.clone(), d.related.iter().filter(|r| loaded.contains_key(*r)).cloned().collect());
    }

    detect_cycles(&graph, &order, &mut conflicts);

    // Overlapping definitions heuristic.
    for i in 0..order.len() {
        for j in (i + 1)..order.len() {
            let a = &loaded[&order[i]];
            let b = &loaded[&order[j]];
            if a.name_norm == b.name_norm {
                continue;
            }
            let sim = jaccard(&a.def_tokens, &b.def_tokens);
            let inter: HashSet<&String> = a.def_tokens.intersection(&b.def_tokens).collect();

            let strong_jaccard = sim >= 0.45 && a.def_tokens.len() >= 6 && b.def_tokens.len() >= 6;
            let enough_shared = inter.len() >= 5;
            if !strong_jaccard && !enough_shared {
                continue;
            }

            let mut shared: Vec<&str> = inter.iter().map(|s| s.as_str()).collect();
            shared.sort_unstable();
            shared.truncate(12);
            let shared_preview = if shared.is_empty() { "(нет)".to_string() } else { shared.join(", ") };

            conflicts.push(Conflict {
                conflict_type: "overlapping_definitions".into(),
                severity: ConflictSeverity::Medium,
                title: format!("Похоже пересекающиеся определения: {} ↔ {}", a.name, b.name),
                details: format!("Эвристика: сходство определений (Jaccard) = {sim:.2}. Общие термины: {shared_preview}"),
                contracts: vec![a.id.clone(), b.id.clone()],
            });
        }
    }

    info!(contract_count = order.len(), conflict_count = conflicts.len(), "conflict scan complete");
    conflicts
}

/// DFS cycle detection over the related-contracts graph, deduped by
/// canonical (rotation-minimal) cycle key so A→B→A and B→A→B collapse.
fn detect_cycles(graph: &HashMap<String, Vec<String>>, order: &[String], conflicts: &mut Vec<Conflict>) {
    fn canon_cycle(cycle: &[String]) -> Vec<String> {
        if cycle.len() < 3 {
            return cycle.to_vec();
        }
        let core: Vec<String> = if cycle.first() == cycle.last() {
            cycle[..cycle.len() - 1].to_vec()
        } else {
            cycle.to_vec()
        };
        if core.is_empty() {
            return Vec::new();
        }
        (0..core.len())
            .map(|i| {
                let mut rotated = core[i..].to_vec();
                rotated.extend_from_slice(&core[..i]);
                rotated
            })
            .min()
            .unwrap()
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut reported: HashSet<Vec<String>> = HashSet::new();

    fn dfs(
        u: &str,
        graph: &HashMap<String, Vec<String>>,
        seen: &mut HashSet<String>,
        stack: &mut HashSet<String>,
        path: &mut Vec<String>,
        reported: &mut HashSet<Vec<String>>,
        conflicts: &mut Vec<Conflict>,
    ) {
        seen.insert(u.to_string());
        stack.insert(u.to_string());
        path.push(u.to_string());

        if let Some(neighbors) = graph.get(u) {
            for v in neighbors {
                if !seen.contains(v) {
                    dfs(v, graph, seen, stack, path, reported, conflicts);
                } else if stack.contains(v) {
                    let idx = path.iter().position(|p| p == v).unwrap_or(0);
                    let mut cycle = path[idx..].to_vec();
                    cycle.push(v.clone());
                    let key = canon_cycle(&cycle);
                    if !key.is_empty() && reported.insert(key) {
                        let mut dedup_contracts = Vec::new();
                        for c in &cycle {
                            if !dedup_contracts.contains(c) {
                                dedup_contracts.push(c.clone());
                            }
                        }
                        conflicts.push(Conflict {
                            conflict_type: "cyclic_dependency".into(),
                            severity: ConflictSeverity::High,
                            title: "Циклическая зависимость контрактов".into(),
                            details: format!(
                                "Обнаружен цикл по секции «Связанные контракты»: {}",
                                cycle.join(" → ")
                            ),
                            contracts: dedup_contracts,
                        });
                    }
                }
            }
        }

        stack.remove(u);
        path.pop();
    }

    let mut stack: HashSet<String> = HashSet::new();
    let mut path: Vec<String> = Vec::new();
    for cid in order {
        if !seen.contains(cid) {
            dfs(cid, graph, &mut seen, &mut stack, &mut path, &mut reported, conflicts);
        }
    }
}

pub fn render_conflicts(conflicts: &[Conflict]) -> String {
    if conflicts.is_empty() {
        return "✅ Конфликтов не найдено.".to_string();
    }

    let mut per_contract: HashMap<String, Vec<&Conflict>> = HashMap::new();
    let mut cross: Vec<&Conflict> = Vec::new();
    for c in conflicts {
        if c.contracts.len() == 1 {
            per_contract.entry(c.contracts[0].clone()).or_default().push(c);
        } else {
            cross.push(c);
        }
    }

    let mut lines = vec![format!("🔍 Проактивный аудит: найдено проблем: {}", conflicts.len()), String::new()];

    if !cross.is_empty() {
        let mut cross_sorted = cross.clone();
        cross_sorted.sort_by_key(|c| (c.severity.rank(), c.conflict_type.clone(), c.title.clone()));
        lines.push("### Межконтрактные конфликты".to_string());
        for c in cross_sorted.iter().take(8) {
            let ids = c.contracts.iter().map(|x| format!("`{x}`")).collect::<Vec<_>>().join(", ");
            lines.push(format!("- [{}] {} ({ids})", c.severity.as_str(), c.title));
        }
        if cross_sorted.len() > 8 {
            lines.push(format!("…и ещё {}", cross_sorted.len() - 8));
        }
        lines.push(String::new());
    }

    if !per_contract.is_empty() {
        lines.push("### Проблемы по контрактам".to_string());
        let mut groups: Vec<(&String, &Vec<&Conflict>)> = per_contract.iter().collect();
        groups.sort_by_key(|(cid, items)| {
            let max_rank = items.iter().map(|c| c.severity.rank()).min().unwrap_or(9);
            (max_rank, (*cid).clone())
        });

        let total_groups = groups.len();
        for (cid, items) in groups.iter().take(10) {
            let mut sorted_items = (*items).clone();
            sorted_items.sort_by_key(|c| (c.severity.rank(), c.conflict_type.clone(), c.title.clone()));
            let titles = sorted_items.iter().take(3).map(|c| c.title.clone()).collect::<Vec<_>>().join("; ");
            let more = if sorted_items.len() <= 3 { String::new() } else { format!("; …+{}", sorted_items.len() - 3) };
            lines.push(format!("- [{}] `{cid}`: {titles}{more}", sorted_items[0].severity.as_str()));
        }
        if total_groups > 10 {
            lines.push(format!("…и ещё {} контракт(ов) с проблемами", total_groups - 10));
        }
    }

    lines.push(String::new());
    lines.push("Если хочешь — напиши: «покажи детали конфликтов», и я разверну список с подробностями.".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> ContractIndexEntry {
        ContractIndexEntry {
            id: id.to_string(),
            status: None,
            tier: None,
            agreed_date: None,
            owner: None,
            versions_dir: None,
            history_file: None,
            extra: serde_json::Map::new(),
        }
    }

    fn md(name: &str, formula: &str, linkage: &str, definition: &str, src: &str, related: &str) -> String {
        format!(
            "# Data Contract: {name}\n\n## Определение\n{definition}\n\n## Формула\n{formula}\n\n## Источник данных\n{src}\n\n## Связь с Extra Time\n{linkage}\n\n## Связанные контракты\n{related}\n"
        )
    }

    #[test]
    fn same_name_different_formula_is_flagged() {
        let contracts = vec![entry("mau_a"), entry("mau_b")];
        let docs: HashMap<&str, String> = [
            ("mau_a", md("MAU", "count(distinct user_id)", "MAU → Activation → Extra Time", "def a aaaaaaa bbbbbbb", "events.mau", "")),
            ("mau_b", md("MAU", "sum(sessions)", "MAU → Activation → Extra Time", "def b ccccccc ddddddd", "events.mau2", "")),
        ]
        .into_iter()
        .collect();

        let conflicts = detect_conflicts(&contracts, None, |id| docs.get(id).cloned());
        assert!(conflicts.iter().any(|c| c.conflict_type == "same_name_different_formula"));
    }

    #[test]
    fn self_reference_is_flagged() {
        let contracts = vec![entry("mau")];
        let docs: HashMap<&str, String> = [(
            "mau",
            md("MAU", "f", "MAU → Extra Time", "d", "s", "- mau"),
        )]
        .into_iter()
        .collect();
        let conflicts = detect_conflicts(&contracts, None, |id| docs.get(id).cloned());
        assert!(conflicts.iter().any(|c| c.conflict_type == "self_related_reference"));
    }

    #[test]
    fn cyclic_dependency_is_detected_once() {
        let contracts = vec![entry("a"), entry("b")];
        let docs: HashMap<&str, String> = [
            ("a", md("A", "f", "A → Extra Time", "d", "s", "- b")),
            ("b", md("B", "f", "B → Extra Time", "d", "s", "- a")),
        ]
        .into_iter()
        .collect();
        let conflicts = detect_conflicts(&contracts, None, |id| docs.get(id).cloned());
        let cycles: Vec<_> = conflicts.iter().filter(|c| c.conflict_type == "cyclic_dependency").collect();
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn missing_formula_is_flagged() {
        let contracts = vec![entry("x")];
        let docs: HashMap<&str, String> = [("x", md("X", "", "X → Extra Time", "d", "s", ""))].into_iter().collect();
        let conflicts = detect_conflicts(&contracts, None, |id| docs.get(id).cloned());
        assert!(conflicts.iter().any(|c| c.conflict_type == "missing_formula"));
    }

    #[test]
    fn empty_conflicts_render_ok_message() {
        assert_eq!(render_conflicts(&[]), "✅ Конфликтов не найдено.");
    }
}
