//! Shared `## Heading` → body extraction used by the validator and the
//! conflict analyzer.

use std::collections::HashMap;

use regex::Regex;

/// Splits a contract's body into `## Heading` → trimmed body text. A body
/// runs until the next `## ` heading or EOF.
pub fn extract_sections(contract_md: &str) -> HashMap<String, String> {
    let heading_re = Regex::new(r"(?m)^##\s+(.+?)\s*$").unwrap();
    let mut sections = HashMap::new();

    let matches: Vec<_> = heading_re.captures_iter(contract_md).collect();
    for (i, cap) in matches.iter().enumerate() {
        let name = cap[1].trim().to_string();
        let start = cap.get(0).unwrap().end();
        let end = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(contract_md.len());
        let body = contract_md[start..end].trim().to_string();
        sections.insert(name, body);
    }
    sections
}

/// Extracts the metric name from a contract's `# Data Contract: <Name>` H1.
pub fn extract_name(contract_md: &str) -> Option<String> {
    for line in contract_md.lines() {
        let s = line.trim();
        if s.is_empty() {
            continue;
        }
        if s.to_lowercase().starts_with("# data contract:") {
            let name = s.splitn(2, ':').nth(1)?.trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}
