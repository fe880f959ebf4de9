use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `context/roles.json` / `tasks/roles.json` on-disk shape: `{"roles": {role: [username, ...]}}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesFile {
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,
}

/// The merged role → usernames map: read-only defaults from
/// `context/roles.json` unioned with mutable runtime assignments from
/// `tasks/roles.json`, de-duplicated case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct RoleMap(pub HashMap<String, Vec<String>>);

impl RoleMap {
    /// Inverts to `username (lowercase) → role`, the shape the governance
    /// tier-policy check consumes. When a username holds more than one role
    /// the first one encountered during the merge wins.
    pub fn to_username_role_map(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for (role, users) in &self.0 {
            for u in users {
                out.entry(u.to_lowercase()).or_insert_with(|| role.clone());
            }
        }
        out
    }

    pub fn users_for_role(&self, role: &str) -> Vec<String> {
        self.0.get(role).cloned().unwrap_or_default()
    }
}

pub(crate) const ONBOARD_TEMPLATE: &str = "Привет, {display_name}! Я AI-архитектор метрик в канале Data Contracts.\nПомогаю команде согласовывать определения данных и метрик.\n\nРасскажи коротко:\n1. Какая у тебя роль? За какой круг/домен отвечаешь?\n2. Какие данные и метрики используешь чаще всего?\n3. Есть ли боли с данными, которые хотелось бы решить?";

pub(crate) const PARTICIPANT_TEMPLATE: &str = "# {display_name} (@{username})\n\n## Базовое\n- В канале с: {date}\n\n## Домен и данные\n- Метрики: (не заполнено)\n\n## Профиль коммуникации\n- Скорость ответа: неизвестно\n\n## Позиции по контрактам\n(нет данных)\n";

pub fn render_participant_profile(display_name: &str, username: &str, date: &str) -> String {
    PARTICIPANT_TEMPLATE
        .replace("{display_name}", display_name)
        .replace("{username}", username)
        .replace("{date}", date)
}

pub fn render_onboard_welcome(display_name: &str) -> String {
    ONBOARD_TEMPLATE.replace("{display_name}", display_name)
}
