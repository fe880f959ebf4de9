//! Structural validation of a Data Contract's markdown body against the
//! required section set and a handful of content-shape rules.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::markdown::extract_sections;

/// Sections a contract must contain to be saved at all. "Known Issues" and
/// "Related Contracts" are checked separately as recommended-only.
const REQUIRED_SECTIONS: &[&str] = &[
    "Статус",
    "Определение",
    "Формула",
    "Источник данных",
    "Включает",
    "Исключения",
    "Гранулярность",
    "Ответственный за данные",
    "Ответственный за расчёт",
    "Связь с Extra Time",
    "Потребители",
    "Состояние данных",
    "Согласовано",
    "История изменений",
];

const RECOMMENDED_SECTIONS: &[&str] = &["Известные проблемы", "Связанные контракты"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    fn error(code: &str, message: impl Into<String>) -> Self {
        Self { code: code.to_string(), message: message.into(), severity: Severity::Error }
    }

    fn warning(code: &str, message: impl Into<String>) -> Self {
        Self { code: code.to_string(), message: message.into(), severity: Severity::Warning }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<ValidationIssue>,
}

pub fn validate_contract(contract_md: &str) -> ValidationReport {
    let sections = extract_sections(contract_md);
    let mut issues = Vec::new();

    for required in REQUIRED_SECTIONS {
        match sections.get(*required) {
            None => issues.push(ValidationIssue::error(
                "missing_section",
                format!("Отсутствует обязательная секция: {required}"),
            )),
            Some(body) if body.is_empty() => issues.push(ValidationIssue::error(
                "empty_section",
                format!("Секция пуста: {required}"),
            )),
            Some(_) => {}
        }
    }

    for recommended in RECOMMENDED_SECTIONS {
        if sections.get(*recommended).map(|b| b.is_empty()).unwrap_or(true) {
            issues.push(ValidationIssue::warning(
                "missing_recommended_section",
                format!("Рекомендуемая секция отсутствует или пуста: {recommended}"),
            ));
        }
    }

    if let Some(formula) = sections.get("Формула") {
        let lower = formula.to_lowercase();
        if !lower.contains("человеческая") {
            issues.push(ValidationIssue::warning(
                "formula_missing_human",
                "В секции «Формула» нет человекочитаемого описания (\"человеческая\")",
            ));
        }
        if !(lower.contains("псевдо") && lower.contains("sql")) {
            issues.push(ValidationIssue::warning(
                "formula_missing_sql",
                "В секции «Формула» нет псевдо-SQL версии",
            ));
        }
    }

    if let Some(extra_time) = sections.get("Связь с Extra Time") {
        let lower = extra_time.to_lowercase();
        let has_arrow = ["→", "->", "—>", "=>"].iter().any(|a| extra_time.contains(a));
        if !lower.contains("extra time") || !has_arrow {
            issues.push(ValidationIssue::error(
                "extra_time_not_linked",
                "Секция «Связь с Extra Time» должна содержать путь к узлу Extra Time (со стрелкой и словами \"extra time\")",
            ));
        }
    }

    let ok = !issues.iter().any(|i| i.severity == Severity::Error);
    debug!(ok, issue_count = issues.len(), "validated contract");
    ValidationReport { ok, issues }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract_with(sections: &[(&str, &str)]) -> String {
        let mut md = String::from("# Data Contract: Test Metric\n\n");
        for (name, body) in sections {
            md.push_str(&format!("## {name}\n{body}\n\n"));
        }
        md
    }

    fn all_required_filled() -> Vec<(&'static str, &'static str)> {
        REQUIRED_SECTIONS.iter().map(|s| (*s, "x")).collect()
    }

    #[test]
    fn missing_required_section_is_an_error() {
        let mut sections = all_required_filled();
        sections.retain(|(name, _)| *name != "Ответственный за данные");
        let report = validate_contract(&contract_with(&sections));
        assert!(!report.ok);
        assert!(report.issues.iter().any(|i| i.code == "missing_section"));
    }

    #[test]
    fn missing_recommended_section_is_a_warning_not_blocking() {
        let sections = all_required_filled();
        let report = validate_contract(&contract_with(&sections));
        assert!(report.ok);
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == "missing_recommended_section" && i.severity == Severity::Warning));
    }

    #[test]
    fn extra_time_without_arrow_is_an_error() {
        let mut sections = all_required_filled();
        sections.retain(|(name, _)| *name != "Связь с Extra Time");
        sections.push(("Связь с Extra Time", "Extra Time is important"));
        let report = validate_contract(&contract_with(&sections));
        assert!(!report.ok);
        assert!(report.issues.iter().any(|i| i.code == "extra_time_not_linked"));
    }

    #[test]
    fn extra_time_with_arrow_and_phrase_passes() {
        let mut sections = all_required_filled();
        sections.retain(|(name, _)| *name != "Связь с Extra Time");
        sections.push(("Связь с Extra Time", "Metric → Parent → Extra Time"));
        let report = validate_contract(&contract_with(&sections));
        assert!(!report.issues.iter().any(|i| i.code == "extra_time_not_linked"));
    }
}
