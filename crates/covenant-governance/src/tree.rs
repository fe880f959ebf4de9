//! Parsing and querying of `context/metrics_tree.md`, a text tree of
//! metrics where some nodes are marked as backed by a Data Contract.
//!
//! Tree lines use 4-character prefix chunks per depth level (`"│   "` or
//! `"    "` for continuation, `"├── "` or `"└── "` for a node at the
//! current depth); a node's parent is the most recently seen node at
//! `depth - 1`.

use std::rc::{Rc, Weak};
use std::cell::RefCell;

#[derive(Debug)]
pub struct TreeNode {
    pub short_name: String,
    pub raw_line: String,
    pub has_contract_marker: bool,
    pub is_agreed: bool,
    pub children: RefCell<Vec<Rc<TreeNode>>>,
    pub parent: RefCell<Weak<TreeNode>>,
}

impl TreeNode {
    fn new(short_name: String, raw_line: String) -> Rc<Self> {
        let has_contract_marker = is_contract_line(&raw_line);
        let is_agreed = raw_line.contains('✅');
        Rc::new(Self {
            short_name,
            raw_line,
            has_contract_marker,
            is_agreed,
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
        })
    }
}

fn is_contract_line(line: &str) -> bool {
    let low = line.to_lowercase();
    low.contains("data contract") || line.contains('←') || low.contains("контракт")
}

/// Strips the branch prefix (`├── `/`└── `) and trailing markers, returning
/// the bare node label.
fn strip_node_text(line: &str) -> String {
    let trimmed = line.trim_start_matches(|c: char| c == '│' || c == ' ');
    let trimmed = trimmed.strip_prefix("├── ").or_else(|| trimmed.strip_prefix("└── ")).unwrap_or(trimmed);
    let without_marker = trimmed.split("←").next().unwrap_or(trimmed);
    without_marker.replace('✅', "").trim().to_string()
}

fn line_depth(line: &str) -> Option<usize> {
    let mut rest = line;
    let mut depth = 0;
    loop {
        if let Some(tail) = rest.strip_prefix("├── ").or_else(|| rest.strip_prefix("└── ")) {
            let _ = tail;
            return Some(depth);
        }
        if let Some(tail) = rest.strip_prefix("│   ").or_else(|| rest.strip_prefix("    ")) {
            rest = tail;
            depth += 1;
            continue;
        }
        return None;
    }
}

/// Parses `tree_md` into a synthetic root holding the top-level nodes as
/// children. Returns `None` if the text has no recognizable node lines.
pub fn parse_tree(tree_md: &str) -> Option<Rc<TreeNode>> {
    let root = TreeNode::new(String::new(), String::new());
    let mut last_at_depth: Vec<Rc<TreeNode>> = Vec::new();
    let mut found_any = false;

    for line in tree_md.lines() {
        let Some(depth) = line_depth(line) else { continue };
        found_any = true;
        let short_name = strip_node_text(line);
        let node = TreeNode::new(short_name, line.to_string());

        let parent = if depth == 0 {
            root.clone()
        } else {
            last_at_depth.get(depth - 1).cloned().unwrap_or_else(|| root.clone())
        };
        *node.parent.borrow_mut() = Rc::downgrade(&parent);
        parent.children.borrow_mut().push(node.clone());

        if last_at_depth.len() > depth {
            last_at_depth.truncate(depth);
        }
        last_at_depth.push(node);
    }

    if found_any { Some(root) } else { None }
}

pub fn find_node_by_id(root: &Rc<TreeNode>, contract_name_or_id: &str) -> Option<Rc<TreeNode>> {
    let target = contract_name_or_id.trim().to_lowercase();
    fn walk(node: &Rc<TreeNode>, target: &str) -> Option<Rc<TreeNode>> {
        if node.has_contract_marker && node.short_name.to_lowercase().contains(target) {
            return Some(node.clone());
        }
        for child in node.children.borrow().iter() {
            if let Some(found) = walk(child, target) {
                return Some(found);
            }
        }
        None
    }
    walk(root, &target)
}

pub fn get_siblings(node: &Rc<TreeNode>) -> Vec<Rc<TreeNode>> {
    let Some(parent) = node.parent.borrow().upgrade() else { return Vec::new() };
    let siblings = parent
        .children
        .borrow()
        .iter()
        .filter(|c| !Rc::ptr_eq(c, node))
        .cloned()
        .collect();
    siblings
}

pub fn get_path_to_root(node: &Rc<TreeNode>) -> String {
    let mut names = vec![node.short_name.clone()];
    let mut current = node.parent.borrow().upgrade();
    while let Some(p) = current {
        if p.short_name.is_empty() {
            break;
        }
        names.push(p.short_name.clone());
        current = p.parent.borrow().upgrade();
    }
    names.reverse();
    names.join(" → ")
}

/// All nodes in the tree that carry a contract marker but aren't agreed.
pub fn get_uncovered_nodes(root: &Rc<TreeNode>) -> Vec<Rc<TreeNode>> {
    let mut out = Vec::new();
    fn walk(node: &Rc<TreeNode>, out: &mut Vec<Rc<TreeNode>>) {
        if node.has_contract_marker && !node.is_agreed {
            out.push(node.clone());
        }
        for child in node.children.borrow().iter() {
            walk(child, out);
        }
    }
    walk(root, &mut out);
    out
}

#[derive(Debug, Clone)]
struct LineNode {
    depth: usize,
    name: String,
    parent: Option<usize>,
}

/// Re-derives the same depth/parent structure `parse_tree` builds, but keeps
/// line indices instead of `Rc` nodes so the source text can be edited in
/// place. `out[i]` is `Some` iff `text`'s line `i` is a recognizable node line.
fn index_lines(text: &str) -> Vec<Option<LineNode>> {
    let mut out = Vec::new();
    let mut last_at_depth: Vec<usize> = Vec::new();
    for line in text.lines() {
        match line_depth(line) {
            None => out.push(None),
            Some(depth) => {
                let parent = if depth == 0 { None } else { last_at_depth.get(depth - 1).copied() };
                out.push(Some(LineNode { depth, name: strip_node_text(line), parent }));
                if last_at_depth.len() > depth {
                    last_at_depth.truncate(depth);
                }
                last_at_depth.push(out.len() - 1);
            }
        }
    }
    out
}

fn find_child_idx(infos: &[Option<LineNode>], parent: Option<usize>, name: &str) -> Option<usize> {
    let target = name.trim().to_lowercase();
    infos.iter().enumerate().find_map(|(i, info)| {
        let info = info.as_ref()?;
        (info.parent == parent && info.name.trim().to_lowercase() == target).then_some(i)
    })
}

fn last_child_idx(infos: &[Option<LineNode>], parent: Option<usize>) -> Option<usize> {
    infos
        .iter()
        .enumerate()
        .filter_map(|(i, info)| (info.as_ref()?.parent == parent).then_some(i))
        .last()
}

fn is_last_sibling(infos: &[Option<LineNode>], idx: usize) -> bool {
    let parent = infos[idx].as_ref().expect("idx must be a node line").parent;
    last_child_idx(infos, parent) == Some(idx)
}

/// Last line index belonging to `idx`'s subtree (itself if it has no children).
fn subtree_end(infos: &[Option<LineNode>], idx: usize) -> usize {
    let depth = infos[idx].as_ref().expect("idx must be a node line").depth;
    let mut end = idx;
    for (j, info) in infos.iter().enumerate().skip(idx + 1) {
        match info {
            Some(node) if node.depth <= depth => break,
            _ => end = j,
        }
    }
    end
}

fn rewrite_last_branch_to_continuation(line: &str) -> String {
    match line.find("└── ") {
        Some(pos) => {
            let mut s = line.to_string();
            s.replace_range(pos..pos + "└── ".len(), "├── ");
            s
        }
        None => line.to_string(),
    }
}

/// Flips the continuation chunk at 4-char column `depth` from `"    "` to
/// `"│   "`, leaving any other chunk (including an actual branch marker)
/// untouched.
fn flip_continuation_column(line: &str, depth: usize) -> String {
    let offset = depth * 4;
    let mut chars: Vec<char> = line.chars().collect();
    if chars.len() < offset + 4 {
        return line.to_string();
    }
    let chunk: String = chars[offset..offset + 4].iter().collect();
    if chunk == "    " {
        for (i, c) in "│   ".chars().enumerate() {
            chars[offset + i] = c;
        }
    }
    chars.into_iter().collect()
}

fn insert_child_line(text: &str, infos: &[Option<LineNode>], parent: Option<usize>, chain: &[usize], name: &str) -> String {
    let depth = chain.len();
    let prefix: String = chain.iter().map(|&idx| if is_last_sibling(infos, idx) { "    " } else { "│   " }).collect();
    let new_line = format!("{prefix}└── {name}");

    let mut lines: Vec<String> = text.lines().map(String::from).collect();
    let insert_at = match last_child_idx(infos, parent) {
        Some(last) => {
            let end = subtree_end(infos, last);
            lines[last] = rewrite_last_branch_to_continuation(&lines[last]);
            for line in lines.iter_mut().take(end + 1).skip(last + 1) {
                *line = flip_continuation_column(line, depth);
            }
            end + 1
        }
        None => match parent {
            Some(p) => subtree_end(infos, p) + 1,
            None => lines.len(),
        },
    };

    lines.insert(insert_at, new_line);
    let mut joined = lines.join("\n");
    if text.ends_with('\n') && !joined.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

/// Inserts every node along `path_leaf_to_root` (given deepest-first, as the
/// name suggests) that isn't already present, each as the new last child of
/// its parent. When a node is added under a parent that already had
/// children, the previously-last child's `└──` is rewritten to `├──` and its
/// descendant continuation columns change from `"    "` to `"│   "`, per the
/// standard tree-drawing rule.
pub fn ensure_path_in_tree(tree_md: &str, path_leaf_to_root: &[&str]) -> MetricsTreePatchResult {
    if path_leaf_to_root.is_empty() || path_leaf_to_root.iter().any(|s| s.trim().is_empty()) {
        return MetricsTreePatchResult {
            ok: false,
            changed: false,
            message: "empty path".to_string(),
            new_text: tree_md.to_string(),
        };
    }

    let path: Vec<&str> = path_leaf_to_root.iter().rev().copied().collect();
    let mut text = tree_md.to_string();
    let mut changed = false;
    let mut inserted = Vec::new();

    for depth in 0..path.len() {
        let infos = index_lines(&text);
        let mut chain = Vec::with_capacity(depth);
        let mut parent = None;
        for ancestor in &path[..depth] {
            let idx = find_child_idx(&infos, parent, ancestor).expect("ancestor inserted in a prior step");
            chain.push(idx);
            parent = Some(idx);
        }

        let name = path[depth];
        if find_child_idx(&infos, parent, name).is_some() {
            continue;
        }
        text = insert_child_line(&text, &infos, parent, &chain, name);
        changed = true;
        inserted.push(name.to_string());
    }

    let message = if changed {
        format!("Добавлены узлы дерева: {}", inserted.join(", "))
    } else {
        "Путь уже присутствует в дереве метрик".to_string()
    };
    MetricsTreePatchResult { ok: true, changed, message, new_text: text }
}

#[derive(Debug, Clone)]
pub struct MetricsTreePatchResult {
    pub ok: bool,
    pub changed: bool,
    pub message: String,
    pub new_text: String,
}

/// Marks a contract node as agreed (✅) in `tree_md`: finds the first line
/// matching `contract_name_or_id` case-insensitively that also satisfies
/// the contract-marker heuristic, and appends `" ✅"` if not already
/// present. Conservative by design — never edits a non-contract line.
pub fn mark_contract_agreed(tree_md: &str, contract_name_or_id: &str) -> MetricsTreePatchResult {
    if tree_md.is_empty() {
        return MetricsTreePatchResult {
            ok: false,
            changed: false,
            message: "metrics_tree.md is empty".to_string(),
            new_text: tree_md.to_string(),
        };
    }

    let target = contract_name_or_id.trim();
    if target.is_empty() {
        return MetricsTreePatchResult {
            ok: false,
            changed: false,
            message: "missing contract identifier".to_string(),
            new_text: tree_md.to_string(),
        };
    }
    let target_lower = target.to_lowercase();

    let mut lines: Vec<String> = tree_md.lines().map(String::from).collect();

    for i in 0..lines.len() {
        if !lines[i].to_lowercase().contains(&target_lower) {
            continue;
        }
        if !is_contract_line(&lines[i]) {
            continue;
        }
        if lines[i].contains('✅') {
            return MetricsTreePatchResult {
                ok: true,
                changed: false,
                message: format!("Already marked ✅ for {target}"),
                new_text: tree_md.to_string(),
            };
        }
        lines[i] = format!("{} ✅", lines[i].trim_end());
        let trailing_newline = if tree_md.ends_with('\n') { "\n" } else { "" };
        return MetricsTreePatchResult {
            ok: true,
            changed: true,
            message: format!("Marked ✅ for {target}"),
            new_text: format!("{}{trailing_newline}", lines.join("\n")),
        };
    }

    MetricsTreePatchResult {
        ok: false,
        changed: false,
        message: format!("Could not find contract node for '{target}' in metrics_tree.md"),
        new_text: tree_md.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Metrics
├── Activation
│   ├── MAU ← DATA CONTRACT
│   │   └── Extra Time
│   └── WIN NI ← DATA CONTRACT
└── Churn ← DATA CONTRACT ✅
";

    #[test]
    fn parse_tree_builds_hierarchy() {
        let root = parse_tree(SAMPLE).unwrap();
        assert_eq!(root.children.borrow().len(), 1);
        let activation = root.children.borrow()[0].clone();
        assert_eq!(activation.short_name, "Activation");
        assert_eq!(activation.children.borrow().len(), 2);
    }

    #[test]
    fn find_node_by_id_matches_case_insensitively() {
        let root = parse_tree(SAMPLE).unwrap();
        let node = find_node_by_id(&root, "mau").unwrap();
        assert!(node.has_contract_marker);
        assert!(!node.is_agreed);
    }

    #[test]
    fn uncovered_nodes_excludes_agreed() {
        let root = parse_tree(SAMPLE).unwrap();
        let uncovered = get_uncovered_nodes(&root);
        assert_eq!(uncovered.len(), 2);
        assert!(uncovered.iter().all(|n| !n.is_agreed));
    }

    #[test]
    fn mark_contract_agreed_appends_checkmark_once() {
        let first = mark_contract_agreed(SAMPLE, "WIN NI");
        assert!(first.ok);
        assert!(first.changed);
        assert!(first.new_text.contains("WIN NI ← DATA CONTRACT ✅"));

        let second = mark_contract_agreed(&first.new_text, "WIN NI");
        assert!(second.ok);
        assert!(!second.changed);
    }

    #[test]
    fn mark_contract_agreed_reports_not_found() {
        let result = mark_contract_agreed(SAMPLE, "Nonexistent Metric");
        assert!(!result.ok);
        assert!(!result.changed);
    }

    #[test]
    fn path_to_root_joins_with_arrows() {
        let root = parse_tree(SAMPLE).unwrap();
        let mau = find_node_by_id(&root, "mau").unwrap();
        assert_eq!(get_path_to_root(&mau), "Activation → MAU");
    }

    #[test]
    fn ensure_path_in_tree_inserts_under_existing_parent_and_flips_last_child() {
        let result = ensure_path_in_tree(SAMPLE, &["Retention ← DATA CONTRACT", "Activation"]);
        assert!(result.ok);
        assert!(result.changed);
        assert!(result.new_text.contains("│   ├── WIN NI ← DATA CONTRACT"));
        assert!(result.new_text.contains("│   └── Retention ← DATA CONTRACT"));

        let root = parse_tree(&result.new_text).unwrap();
        let retention = find_node_by_id(&root, "retention").unwrap();
        assert_eq!(get_path_to_root(&retention), "Activation → Retention");
    }

    #[test]
    fn ensure_path_in_tree_inserts_new_top_level_node_and_flips_prior_last() {
        let result = ensure_path_in_tree(SAMPLE, &["NewMetric ← DATA CONTRACT"]);
        assert!(result.ok);
        assert!(result.changed);
        assert!(result.new_text.contains("├── Churn ← DATA CONTRACT ✅"));
        assert!(result.new_text.contains("└── NewMetric ← DATA CONTRACT"));
        assert!(!result.new_text.contains("└── Churn"));
    }

    #[test]
    fn ensure_path_in_tree_is_a_noop_when_path_already_present() {
        let result = ensure_path_in_tree(SAMPLE, &["MAU ← DATA CONTRACT", "Activation"]);
        assert!(result.ok);
        assert!(!result.changed);
        assert_eq!(result.new_text, SAMPLE);
    }
}
