//! Placeholder substitution for dunning-ladder messages. An external
//! template file may wrap a step's base text behind a marker (e.g.
//! `{SOFT_REMINDER}`); when it doesn't, substitution runs directly on the
//! base text. Both modes end up running the same placeholder pass.

use std::collections::HashMap;

fn render(text: &str, ctx: &HashMap<&str, String>) -> String {
    let mut out = text.to_string();
    for (k, v) in ctx {
        out = out.replace(&format!("{{{k}}}"), v);
    }
    out
}

/// Applies `ctx` to `base_text`, first wrapping it behind `marker` inside
/// `templates` if the marker is present there.
pub fn apply_template(templates: &str, marker: &str, base_text: &str, ctx: &HashMap<&str, String>) -> String {
    if !templates.is_empty() && templates.contains(marker) {
        let wrapped = templates.replace(marker, base_text);
        render(&wrapped, ctx).trim().to_string()
    } else {
        render(base_text, ctx).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_placeholders_directly_without_a_template_file() {
        let mut ctx = HashMap::new();
        ctx.insert("CONTRACT_ID", "headcount".to_string());
        let out = apply_template("", "{SOFT_REMINDER}", "ping about {CONTRACT_ID}", &ctx);
        assert_eq!(out, "ping about headcount");
    }

    #[test]
    fn wraps_base_text_behind_a_marker_when_present() {
        let mut ctx = HashMap::new();
        ctx.insert("CONTRACT_ID", "headcount".to_string());
        let templates = "prefix\n{SOFT_REMINDER}\nsuffix";
        let out = apply_template(templates, "{SOFT_REMINDER}", "about {CONTRACT_ID}", &ctx);
        assert_eq!(out, "prefix\nabout headcount\nsuffix");
    }
}
