//! Non-LLM intent handlers. Each function here may only read or write the
//! specific state its intent implies, per the fast-path contract the
//! Router hands off to.

use covenant_chat::ChatClient;
use covenant_governance::{
    check_approval_policy, detect_conflicts, find_contracts_requiring_review,
    render_conflicts, render_review_report, ApprovalPolicy,
};
use covenant_store::Store;
use serde_json::Value;

use crate::relationships::detect_mentions;
use crate::router::{extract_role_assign_lines, RouteDecision};

/// The result of a fast-path handler: a reply to send, plus whether the
/// handler short-circuited the normal flow (always `true` today — every
/// fast-path is terminal, none fall through to the LLM).
pub struct FastPathReply {
    pub text: String,
}

fn reply(text: impl Into<String>) -> FastPathReply {
    FastPathReply { text: text.into() }
}

pub fn contract_history(store: &dyn Store, contract_id: &str) -> FastPathReply {
    match store.get_contract_history(contract_id) {
        Ok(entries) if entries.is_empty() => reply(format!("У контракта `{contract_id}` пока нет истории версий.")),
        Ok(entries) => {
            let lines: Vec<String> = entries
                .iter()
                .map(|e| format!("- {} · {} · {} байт", e.ts, e.kind, e.bytes))
                .collect();
            reply(format!("История `{contract_id}`:\n{}", lines.join("\n")))
        }
        Err(e) => reply(format!("Не удалось получить историю `{contract_id}`: {e}")),
    }
}

/// `entity` is `"<contract_id>:<timestamp>"`, as produced by the router's
/// regex capture-join.
pub fn contract_version(store: &dyn Store, entity: &str) -> FastPathReply {
    let Some((contract_id, ts)) = entity.split_once(':') else {
        return reply("Не удалось разобрать запрос версии контракта.");
    };
    match store.get_contract_version(contract_id, ts) {
        Ok(Some(md)) => reply(format!("Версия `{contract_id}` от {ts}:\n\n{md}")),
        Ok(None) => reply(format!("Версия {ts} контракта `{contract_id}` не найдена.")),
        Err(e) => reply(format!("Ошибка при чтении версии: {e}")),
    }
}

pub fn contract_diff(store: &dyn Store, contract_id: &str) -> FastPathReply {
    let history = match store.get_contract_history(contract_id) {
        Ok(h) => h,
        Err(e) => return reply(format!("Ошибка при чтении истории: {e}")),
    };
    if history.len() < 2 {
        return reply(format!("У `{contract_id}` недостаточно версий для сравнения."));
    }
    let prev_ts = &history[history.len() - 2].ts;
    let curr_ts = &history[history.len() - 1].ts;
    let prev = store.get_contract_version(contract_id, prev_ts).ok().flatten();
    let curr = store.get_contract_version(contract_id, curr_ts).ok().flatten();
    match (prev, curr) {
        (Some(p), Some(c)) => {
            let p_lines: Vec<&str> = p.lines().collect();
            let c_lines: Vec<&str> = c.lines().collect();
            let added = c_lines.iter().filter(|l| !p_lines.contains(l)).count();
            let removed = p_lines.iter().filter(|l| !c_lines.contains(l)).count();
            reply(format!(
                "Сравнение `{contract_id}` ({prev_ts} → {curr_ts}): +{added} строк, -{removed} строк."
            ))
        }
        _ => reply(format!("Не удалось загрузить обе версии `{contract_id}` для сравнения.")),
    }
}

pub fn show_contract(store: &dyn Store, contract_id: &str) -> FastPathReply {
    match store.get_contract(contract_id) {
        Ok(Some(md)) => reply(md),
        Ok(None) => reply(format!("Контракт `{contract_id}` не найден.")),
        Err(e) => reply(format!("Ошибка при чтении контракта: {e}")),
    }
}

pub fn show_draft(store: &dyn Store, contract_id: &str) -> FastPathReply {
    match store.get_draft(contract_id) {
        Ok(Some(md)) => reply(md),
        Ok(None) => reply(format!("Черновик `{contract_id}` не найден.")),
        Err(e) => reply(format!("Ошибка при чтении черновика: {e}")),
    }
}

pub fn conflicts_audit(store: &dyn Store, only_contract_id: Option<&str>) -> FastPathReply {
    let contracts = match store.list_contracts() {
        Ok(c) => c,
        Err(e) => return reply(format!("Ошибка при чтении реестра контрактов: {e}")),
    };
    let only = only_contract_id.map(|id| vec![id.to_string()]);
    let conflicts = detect_conflicts(&contracts, only.as_deref(), |id| store.get_contract(id).ok().flatten());
    if conflicts.is_empty() {
        reply("Конфликтов не найдено.")
    } else {
        reply(render_conflicts(&conflicts))
    }
}

pub fn relationships_show(store: &dyn Store, contract_id: &str) -> FastPathReply {
    let rel_path = "context/relationships.json";
    let index = match store.read_json_value(rel_path) {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return reply(format!("Ошибка при чтении связей: {e}")),
    };
    let existing: Vec<String> = index
        .get("relationships")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter(|r| r.get("from").and_then(Value::as_str) == Some(contract_id))
                .map(|r| {
                    format!(
                        "- {} → {} ({})",
                        r.get("from").and_then(Value::as_str).unwrap_or(""),
                        r.get("to").and_then(Value::as_str).unwrap_or(""),
                        r.get("type").and_then(Value::as_str).unwrap_or(""),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let contracts = store.list_contracts().unwrap_or_default();
    let known_ids: Vec<String> = contracts.iter().map(|c| c.id.clone()).collect();
    let md = store.get_contract(contract_id).ok().flatten().unwrap_or_default();
    let detected = detect_mentions(contract_id, &md, &known_ids);

    let mut lines = existing;
    for rel in &detected {
        let line = format!("- {} → {} ({})", rel.from, rel.to, rel.kind);
        if !lines.contains(&line) {
            lines.push(line);
        }
    }

    if lines.is_empty() {
        reply(format!("У `{contract_id}` пока нет известных связей."))
    } else {
        reply(format!("Связи `{contract_id}`:\n{}", lines.join("\n")))
    }
}

pub fn governance_review_audit(store: &dyn Store, days_threshold: i64) -> FastPathReply {
    let contracts = match store.list_contracts() {
        Ok(c) => c,
        Err(e) => return reply(format!("Ошибка при чтении реестра контрактов: {e}")),
    };
    let items = find_contracts_requiring_review(&contracts, chrono::Utc::now(), days_threshold);
    reply(render_review_report(&items, days_threshold))
}

pub fn governance_policy_show(store: &dyn Store) -> FastPathReply {
    match store.read_json_value("context/governance_policy.json") {
        Ok(Some(v)) => reply(serde_json::to_string_pretty(&v).unwrap_or_default()),
        Ok(None) => reply("Политика управления пока не настроена."),
        Err(e) => reply(format!("Ошибка при чтении политики: {e}")),
    }
}

pub fn governance_requirements_for(store: &dyn Store, contract_id: &str, role_map: &std::collections::HashMap<String, String>) -> FastPathReply {
    let policy_value = match store.read_json_value("context/governance_policy.json") {
        Ok(Some(v)) => v,
        Ok(None) => return reply("Политика управления пока не настроена."),
        Err(e) => return reply(format!("Ошибка при чтении политики: {e}")),
    };
    let contracts = store.list_contracts().unwrap_or_default();
    let tier = contracts
        .iter()
        .find(|c| c.id == contract_id)
        .and_then(|c| c.tier.clone())
        .unwrap_or_else(|| "tier_2".to_string());

    let Some(policy_for_tier) = policy_value.get(&tier) else {
        return reply(format!("Нет политики для tier `{tier}`."));
    };
    let Ok(policy) = serde_json::from_value::<ApprovalPolicy>(policy_for_tier.clone()) else {
        return reply("Не удалось разобрать политику управления.".to_string());
    };

    let md = store.get_contract(contract_id).ok().flatten().unwrap_or_default();
    let check = check_approval_policy(&md, &policy, role_map);
    if check.ok {
        reply(format!("`{contract_id}` удовлетворяет требованиям tier `{tier}`."))
    } else {
        reply(format!(
            "`{contract_id}` (tier `{tier}`) не хватает ролей: {}",
            check.missing_roles.join(", ")
        ))
    }
}

pub fn lifecycle_get_status(store: &dyn Store, contract_id: &str) -> FastPathReply {
    match store.list_contracts() {
        Ok(contracts) => match contracts.iter().find(|c| c.id == contract_id).and_then(|c| c.status.clone()) {
            Some(status) => reply(format!("Статус `{contract_id}`: {status}.")),
            None => reply(format!("Контракт `{contract_id}` не найден в реестре.")),
        },
        Err(e) => reply(format!("Ошибка при чтении реестра: {e}")),
    }
}

pub fn lifecycle_set_status(store: &dyn Store, contract_id: &str, status: &str) -> FastPathReply {
    match covenant_governance::set_status(store, contract_id, status) {
        Ok(result) if result.ok => reply(result.message),
        Ok(result) => reply(format!("Не удалось изменить статус: {}", result.message)),
        Err(e) => reply(format!("Ошибка при изменении статуса: {e}")),
    }
}

/// Resolves and persists every `Role — @mention` line in the message,
/// short-circuiting with a precise error on the first unresolvable mention.
pub async fn roles_assign(store: &dyn Store, chat: &dyn ChatClient, message: &str) -> FastPathReply {
    let lines = extract_role_assign_lines(message);
    if lines.is_empty() {
        return reply("Не нашёл строк вида «Роль — @пользователь» в сообщении.");
    }

    let mut confirmations = Vec::new();
    for line in &lines {
        match covenant_participants::assign_role(store, chat, &line.role, &line.mention).await {
            Ok(outcome) => confirmations.push(format!("- {} → @{}", outcome.role, outcome.username)),
            Err(e) => return reply(format!("Не удалось назначить роль «{}»: {e}", line.role)),
        }
    }

    reply(format!("Назначено:\n{}", confirmations.join("\n")))
}

/// `decision.entity` is `"<contract_id>:<new_status>"` for `lifecycle_set_status`.
pub fn split_entity_pair(entity: &str) -> Option<(&str, &str)> {
    entity.split_once(':')
}

pub fn entity_required(decision: &RouteDecision) -> Option<&str> {
    decision.entity.as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_store::FileTreeStore;

    fn store() -> (tempfile::TempDir, FileTreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path(), 3, 0.01);
        (dir, store)
    }

    #[test]
    fn contract_history_reports_empty_history() {
        let (_dir, store) = store();
        let r = contract_history(&store, "mau");
        assert!(r.text.contains("пока нет истории"));
    }

    #[test]
    fn lifecycle_get_status_reports_missing_contract() {
        let (_dir, store) = store();
        let r = lifecycle_get_status(&store, "mau");
        assert!(r.text.contains("не найден"));
    }

    #[test]
    fn lifecycle_set_status_round_trips() {
        let (_dir, store) = store();
        let r = lifecycle_set_status(&store, "mau", "in_review");
        assert!(r.text.contains("in_review"));
        let r2 = lifecycle_get_status(&store, "mau");
        assert!(r2.text.contains("in_review"));
    }
}
