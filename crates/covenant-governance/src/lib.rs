pub mod analyzer;
pub mod glossary;
pub mod governance;
pub mod landscape;
pub mod lifecycle;
pub mod markdown;
pub mod suggestions;
pub mod tree;
pub mod validator;

pub use analyzer::{detect_conflicts, render_conflicts, Conflict, ConflictSeverity};
pub use glossary::{check_ambiguity, Glossary, GlossaryIssue, GlossaryTerm};
pub use governance::{
    check_approval_policy, find_contracts_requiring_review, render_review_report, ApprovalCheck,
    ApprovalPolicy, ReviewItem,
};
pub use landscape::{format_summaries_for_prompt, generate_summary, ContractSummary};
pub use lifecycle::{ensure_in_review, set_status, StatusUpdateResult};
pub use suggestions::{
    build_suggestion_records, can_suggest_today, coverage_scan, filter_already_suggested,
    format_coverage_message, format_suggestion_message, slugify_metric, suggest_after_agreement,
    SuggestionCandidate,
};
pub use tree::{
    ensure_path_in_tree, find_node_by_id, get_path_to_root, get_siblings, get_uncovered_nodes,
    mark_contract_agreed, parse_tree, MetricsTreePatchResult, TreeNode,
};
pub use validator::{validate_contract, Severity, ValidationIssue, ValidationReport};
