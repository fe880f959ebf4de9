//! Deterministic ambiguity checking against `context/glossary.json`: if a
//! term with declared disambiguation groups appears in a contract but none
//! of its groups' keywords do, the contract is flagged for clarification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryIssue {
    pub canonical: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlossaryTerm {
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub disambiguation: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Glossary {
    #[serde(default)]
    pub terms: Vec<GlossaryTerm>,
}

fn find_any(haystack_lower: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| haystack_lower.contains(p.to_lowercase().as_str()))
}

pub fn check_ambiguity(contract_md: &str, glossary: Option<&Glossary>) -> Vec<GlossaryIssue> {
    let Some(glossary) = glossary else { return Vec::new() };
    let low = contract_md.to_lowercase();
    let mut issues = Vec::new();

    for term in &glossary.terms {
        let canonical = term.canonical.trim();
        if canonical.is_empty() || term.disambiguation.is_empty() {
            continue;
        }

        let mut term_patterns: Vec<String> = vec![canonical.to_string()];
        term_patterns.extend(term.aliases.iter().cloned());
        if !find_any(&low, &term_patterns) {
            continue;
        }

        if term.disambiguation.is_empty() {
            continue;
        }

        let any_group_mentioned = term
            .disambiguation
            .values()
            .any(|keywords| find_any(&low, keywords));
        if any_group_mentioned {
            continue;
        }

        let opts: Vec<&str> = term.disambiguation.keys().map(|s| s.as_str()).collect();
        let message = format!(
            "Термин «{canonical}» выглядит неоднозначно. Уточни, что именно имеется в виду: {}. После уточнения обновим контракт.",
            opts.join("; "),
        );
        issues.push(GlossaryIssue { canonical: canonical.to_string(), message });
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glossary_with_client_term() -> Glossary {
        let mut dis = BTreeMap::new();
        dis.insert("Юрлицо".to_string(), vec!["юридическое лицо".to_string(), "юрлицо".to_string()]);
        dis.insert("Пользователь".to_string(), vec!["пользователь".to_string(), "user".to_string()]);
        Glossary {
            terms: vec![GlossaryTerm {
                canonical: "Клиент".to_string(),
                aliases: vec!["клиент".to_string(), "customer".to_string()],
                disambiguation: dis,
            }],
        }
    }

    #[test]
    fn ambiguous_term_without_disambiguation_keyword_is_flagged() {
        let md = "Метрика считает активных клиентов за период.";
        let issues = check_ambiguity(md, Some(&glossary_with_client_term()));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].canonical, "Клиент");
    }

    #[test]
    fn disambiguated_term_is_not_flagged() {
        let md = "Метрика считает активных клиентов-пользователей (не юрлиц) за период.";
        let issues = check_ambiguity(md, Some(&glossary_with_client_term()));
        assert!(issues.is_empty());
    }

    #[test]
    fn term_not_present_is_not_flagged() {
        let md = "Метрика считает количество заказов.";
        let issues = check_ambiguity(md, Some(&glossary_with_client_term()));
        assert!(issues.is_empty());
    }

    #[test]
    fn no_glossary_means_no_issues() {
        assert!(check_ambiguity("клиент", None).is_empty());
    }
}
