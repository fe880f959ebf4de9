//! Semantic links between contracts: a deterministic whole-word mention
//! detector that runs on every save, plus the LLM-proposed variant the
//! `relationships_show` fast-path can trigger on demand.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const ALLOWED_REL_TYPES: [&str; 5] =
    ["mentions", "subset_of", "aggregates", "inverse", "depends_on"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// Finds every known contract id mentioned as a whole word in `contract_md`,
/// other than `contract_id` itself.
pub fn detect_mentions(contract_id: &str, contract_md: &str, known_contract_ids: &[String]) -> Vec<Relationship> {
    let cid = contract_id.trim().to_lowercase();
    let text = contract_md.to_lowercase();
    let mut rels = Vec::new();

    for other in known_contract_ids {
        let oid = other.trim().to_lowercase();
        if oid.is_empty() || oid == cid {
            continue;
        }
        let Ok(re) = Regex::new(&format!(r"\b{}\b", regex::escape(&oid))) else { continue };
        if re.is_match(&text) {
            rels.push(Relationship {
                from: cid.clone(),
                to: oid.clone(),
                kind: "mentions".to_string(),
                description: format!("{cid} mentions {oid} in contract text"),
            });
        }
    }

    rels
}

/// Merges `new_rels` into the `relationships.json` document, de-duplicating
/// on `(from, to, type)`. Returns the updated document and how many were
/// actually added.
pub fn upsert_relationships(mut index: Value, new_rels: &[Relationship]) -> (Value, usize) {
    if !index.is_object() {
        index = json!({ "relationships": [] });
    }
    let obj = index.as_object_mut().expect("just ensured object");
    let items = obj.entry("relationships").or_insert_with(|| json!([]));
    if !items.is_array() {
        *items = json!([]);
    }
    let arr = items.as_array_mut().expect("just ensured array");

    let mut existing: HashSet<(String, String, String)> = arr
        .iter()
        .filter_map(|r| {
            let f = r.get("from")?.as_str()?.to_string();
            let t = r.get("to")?.as_str()?.to_string();
            let ty = r.get("type")?.as_str()?.to_string();
            Some((f, t, ty))
        })
        .collect();

    let mut added = 0;
    for r in new_rels {
        let key = (r.from.clone(), r.to.clone(), r.kind.clone());
        if existing.contains(&key) {
            continue;
        }
        arr.push(json!({
            "from": r.from,
            "to": r.to,
            "type": r.kind,
            "description": r.description,
        }));
        existing.insert(key);
        added += 1;
    }

    (index, added)
}

#[derive(Debug, Clone)]
pub struct ProposedRelationship {
    pub from: String,
    pub to: String,
    pub kind: String,
    pub description: String,
}

/// Builds the (system, user) prompt pair asking the heavy model to propose
/// additional relationships beyond plain mentions.
pub fn build_relationships_prompt(
    contract_id: &str,
    contract_md: &str,
    known_contracts: &[(String, String, String)],
) -> (String, String) {
    let known: Vec<Value> = known_contracts
        .iter()
        .map(|(id, name, status)| json!({ "id": id, "name": name, "status": status }))
        .collect();

    let system = "Ты — Data Architect. Твоя задача: предложить семантические связи между метриками (Data Contracts).\n\n\
Верни СТРОГО JSON без markdown и без пояснений. Схема:\n\
{\n  \"relationships\": [\n    {\"from\": \"<id>\", \"to\": \"<id>\", \"type\": \"mentions|subset_of|aggregates|inverse|depends_on\", \"description\": \"...\"}\n  ]\n}\n\n\
Правила:\n\
- Используй только id из списка известных контрактов.\n\
- Допускай максимум 10 связей.\n\
- from должен быть текущий contract_id.\n\
- type выбирай осмысленно: subset_of (подмножество), aggregates (агрегирует сущность), inverse (обратная связь), depends_on (нужен для расчёта/определения).\n\
- description: 1 короткое предложение по-русски.".to_string();

    let user = format!(
        "Текущий контракт id: {contract_id}\n\n\
Текст текущего контракта (markdown):\n---\n{contract_md}\n---\n\n\
Известные контракты (id+name+status):\n{}",
        serde_json::to_string_pretty(&known).unwrap_or_default()
    );

    (system, user)
}

fn strip_code_fence(raw: &str) -> String {
    let raw = raw.trim();
    if !raw.starts_with("```") {
        return raw.to_string();
    }
    raw.lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parses the model's proposed relationships, defensively: unparsable JSON,
/// an unknown `to` id, a bad `type`, or `from` not matching `contract_id`
/// are all silently dropped rather than erroring.
pub fn parse_relationships_llm(
    raw: &str,
    contract_id: &str,
    known_ids: &HashSet<String>,
) -> Vec<ProposedRelationship> {
    let cleaned = strip_code_fence(raw);
    let Ok(data) = serde_json::from_str::<Value>(&cleaned) else { return Vec::new() };
    let Some(rels) = data.get("relationships").and_then(Value::as_array) else { return Vec::new() };

    let cid_lower = contract_id.trim().to_lowercase();
    let allowed: HashSet<&str> = ALLOWED_REL_TYPES.into_iter().collect();

    let mut out = Vec::new();
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    for item in rels.iter().take(10) {
        let Some(obj) = item.as_object() else { continue };
        let f = obj.get("from").and_then(Value::as_str).unwrap_or("").trim().to_lowercase();
        let t = obj.get("to").and_then(Value::as_str).unwrap_or("").trim().to_lowercase();
        let ty = obj.get("type").and_then(Value::as_str).unwrap_or("").trim().to_string();
        let mut desc = obj.get("description").and_then(Value::as_str).unwrap_or("").trim().to_string();

        if f != cid_lower {
            continue;
        }
        if t.is_empty() || !known_ids.contains(&t) {
            continue;
        }
        if !allowed.contains(ty.as_str()) {
            continue;
        }
        if desc.is_empty() {
            desc = format!("{cid_lower} → {t} ({ty})");
        }

        let key = (f.clone(), t.clone(), ty.clone());
        if seen.insert(key) {
            out.push(ProposedRelationship { from: f, to: t, kind: ty, description: desc });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_whole_word_mentions_only() {
        let known = vec!["mau".to_string(), "dau_total".to_string()];
        let rels = detect_mentions("mau_weekly", "считаем как mau за неделю, не dau", &known);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].to, "mau");
    }

    #[test]
    fn upsert_dedups_by_from_to_type() {
        let rel = Relationship { from: "a".into(), to: "b".into(), kind: "mentions".into(), description: "x".into() };
        let (idx, added1) = upsert_relationships(json!({}), &[rel.clone()]);
        assert_eq!(added1, 1);
        let (_idx2, added2) = upsert_relationships(idx, &[rel]);
        assert_eq!(added2, 0);
    }

    #[test]
    fn parse_llm_drops_unknown_target_and_bad_type() {
        let known: HashSet<String> = ["a".to_string()].into_iter().collect();
        let raw = r#"{"relationships": [
            {"from": "a", "to": "a", "type": "mentions", "description": "self, should still be dropped? no self allowed"},
            {"from": "a", "to": "unknown", "type": "mentions", "description": "bad target"},
            {"from": "a", "to": "a", "type": "bogus", "description": "bad type"}
        ]}"#;
        let out = parse_relationships_llm(raw, "a", &known);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn parse_llm_strips_code_fence() {
        let known: HashSet<String> = ["b".to_string()].into_iter().collect();
        let raw = "```json\n{\"relationships\": [{\"from\": \"a\", \"to\": \"b\", \"type\": \"depends_on\", \"description\": \"\"}]}\n```";
        let out = parse_relationships_llm(raw, "a", &known);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description, "a → b (depends_on)");
    }
}
