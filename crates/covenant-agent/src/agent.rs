//! The Agent: routes an inbound message, dispatches the fast-path handlers
//! the Router selected, or falls through to the heavy-model tool loop.

use std::sync::Arc;

use covenant_chat::ChatClient;
use covenant_core::{ChannelKind, Config};
use covenant_governance::{format_summaries_for_prompt, generate_summary};
use covenant_llm::{run_tool_loop, ChatRequest, LlmProvider, Message, Role};
use covenant_store::Store;
use covenant_threads::{get_active_thread, set_active_thread};
use tracing::{info, warn};

use crate::fastpath;
use crate::router::{self, Intent, RouteDecision};
use crate::tools::build_tools;

/// Intents whose reply/thread attachment should re-attach to an existing
/// open thread for the same entity, and register the thread afterward.
fn is_discussion_shaped(intent: Intent) -> bool {
    matches!(intent, Intent::ContractDiscussion | Intent::NewContractInit | Intent::ProblemReport)
}

pub struct AgentReply {
    pub text: String,
    pub thread_root: Option<String>,
}

pub struct Agent {
    store: Arc<dyn Store>,
    chat: Arc<dyn ChatClient>,
    cheap: Arc<dyn LlmProvider>,
    heavy: Arc<dyn LlmProvider>,
    config: Config,
}

impl Agent {
    pub fn new(
        store: Arc<dyn Store>,
        chat: Arc<dyn ChatClient>,
        cheap: Arc<dyn LlmProvider>,
        heavy: Arc<dyn LlmProvider>,
        config: Config,
    ) -> Self {
        Self { store, chat, cheap, heavy, config }
    }

    fn landscape_block(&self) -> String {
        let Ok(contracts) = self.store.list_contracts() else { return String::new() };
        let summaries: Vec<_> = contracts
            .iter()
            .filter_map(|c| {
                let md = self.store.get_contract(&c.id).ok().flatten().or_else(|| self.store.get_draft(&c.id).ok().flatten())?;
                Some(generate_summary(&c.id, &md, c.status.as_deref().unwrap_or("draft")))
            })
            .collect();
        format_summaries_for_prompt(&summaries)
    }

    async fn dispatch_fast_path(
        &self,
        decision: &RouteDecision,
        message: &str,
    ) -> Option<fastpath::FastPathReply> {
        let entity = decision.entity.as_deref();
        Some(match decision.intent {
            Intent::ContractHistory => fastpath::contract_history(self.store.as_ref(), entity?),
            Intent::ContractVersion => fastpath::contract_version(self.store.as_ref(), entity?),
            Intent::ContractDiff => fastpath::contract_diff(self.store.as_ref(), entity?),
            Intent::ShowContract => fastpath::show_contract(self.store.as_ref(), entity?),
            Intent::ShowDraft => fastpath::show_draft(self.store.as_ref(), entity?),
            Intent::ConflictsAudit => fastpath::conflicts_audit(self.store.as_ref(), entity),
            Intent::RelationshipsShow => fastpath::relationships_show(self.store.as_ref(), entity?),
            Intent::GovernanceReviewAudit => {
                fastpath::governance_review_audit(self.store.as_ref(), self.config.governance_review_threshold_days)
            }
            Intent::GovernancePolicyShow => fastpath::governance_policy_show(self.store.as_ref()),
            Intent::GovernanceRequirementsFor => {
                let roles = covenant_participants::merge_role_map(self.store.as_ref()).unwrap_or_default();
                fastpath::governance_requirements_for(self.store.as_ref(), entity?, &roles.to_username_role_map())
            }
            Intent::LifecycleGetStatus => fastpath::lifecycle_get_status(self.store.as_ref(), entity?),
            Intent::LifecycleSetStatus => {
                let (cid, status) = fastpath::split_entity_pair(entity?)?;
                fastpath::lifecycle_set_status(self.store.as_ref(), cid, status)
            }
            Intent::RolesAssign => fastpath::roles_assign(self.store.as_ref(), self.chat.as_ref(), message).await,
            _ => return None,
        })
    }

    /// Promotes a contract still in `draft` (or with no status yet) to
    /// `in_review` the moment discussion starts on it.
    fn auto_promote_to_review(&self, decision: &RouteDecision) {
        if !matches!(decision.intent, Intent::NewContractInit | Intent::ContractDiscussion | Intent::ProblemReport) {
            return;
        }
        let Some(entity) = decision.entity.as_deref() else { return };
        if entity.is_empty() {
            return;
        }
        if let Err(e) = covenant_governance::ensure_in_review(self.store.as_ref(), entity) {
            warn!(contract_id = entity, error = %e, "failed to auto-promote to in_review");
        }
    }

    fn system_prompt_template(&self, model_name: &covenant_core::ModelTier) -> String {
        let path = match model_name {
            covenant_core::ModelTier::Cheap => "prompts/system_short.md",
            covenant_core::ModelTier::Heavy => "prompts/system_full.md",
        };
        self.store.read_file(path).ok().flatten().unwrap_or_default()
    }

    /// Runs the full pipeline for one inbound message: route, maybe
    /// fast-path, otherwise build context and run the tool loop.
    pub async fn process_message(
        &self,
        username: &str,
        message: &str,
        channel_kind: ChannelKind,
        incoming_root_id: Option<&str>,
    ) -> AgentReply {
        let router_prompt = self.store.read_file("prompts/router.md").ok().flatten().unwrap_or_default();
        let early_thread_context = None;
        let decision = router::route(
            self.cheap.as_ref(),
            &router_prompt,
            username,
            message,
            channel_kind,
            early_thread_context,
            &self.config.llm_cheap_model,
        )
        .await;

        self.auto_promote_to_review(&decision);

        if let Some(reply) = self.dispatch_fast_path(&decision, message).await {
            return AgentReply { text: reply.text, thread_root: incoming_root_id.map(str::to_string) };
        }

        let mut existing_root: Option<String> = None;
        let thread_context = if is_discussion_shaped(decision.intent) {
            if let Some(entity) = decision.entity.as_deref() {
                existing_root = get_active_thread(self.store.as_ref(), entity, self.config.thread_ttl_days).ok().flatten();
                if let Some(root) = existing_root.as_deref() {
                    self.chat.get_thread(root).await.ok().map(|msgs| {
                        let mut text = msgs.iter().map(|m| format!("{}: {}", m.user_id, m.message)).collect::<Vec<_>>().join("\n");
                        text.truncate(self.config.thread_max_chars.min(text.len()));
                        text
                    })
                } else {
                    None
                }
            } else {
                None
            }
        } else {
            None
        };

        let model_name = match decision.model {
            covenant_core::ModelTier::Cheap => self.config.llm_cheap_model.clone(),
            covenant_core::ModelTier::Heavy => self.config.llm_heavy_model.clone(),
        };

        let mut system_prompt = self.system_prompt_template(&decision.model);
        let landscape = self.landscape_block();
        if !landscape.is_empty() {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&landscape);
        }

        if !decision.load_files.is_empty() {
            let files_ref: Vec<&str> = decision.load_files.iter().map(String::as_str).collect();
            if let Ok(loaded) = self.store.load_files(&files_ref) {
                if !loaded.is_empty() {
                    system_prompt.push_str("\n\n# Загруженный контекст\n\n");
                    system_prompt.push_str(&loaded);
                }
            }
        }

        if let Ok(Some(profile)) = self.store.get_participant(username) {
            system_prompt.push_str(&format!("\n\n--- participants/{username}.md ---\n{profile}"));
        }

        let mut user_msg = format!("@{username}: {message}");
        if let Some(ctx) = thread_context.as_deref() {
            user_msg = format!("Контекст треда:\n{ctx}\n\nНовое сообщение:\n{user_msg}");
        }

        let provider: &dyn LlmProvider = match decision.model {
            covenant_core::ModelTier::Cheap => self.cheap.as_ref(),
            covenant_core::ModelTier::Heavy => self.heavy.as_ref(),
        };

        let tools = build_tools(self.store.clone(), self.chat.clone(), self.heavy.clone(), &self.config.llm_heavy_model, channel_kind);

        let mut req = ChatRequest::new(model_name, system_prompt, 4096);
        req.tools = covenant_llm::tools::to_definitions(&tools);
        req.messages.push(Message { role: Role::User, content: user_msg });

        let reply_text = match run_tool_loop(provider, req, &tools, self.config.llm_max_tool_iterations).await {
            Ok(resp) => resp.content,
            Err(e) => {
                warn!(error = %e, "tool loop failed");
                "Извините, произошла ошибка при обработке запроса.".to_string()
            }
        };

        let root = incoming_root_id
            .map(str::to_string)
            .or_else(|| existing_root.clone());

        if is_discussion_shaped(decision.intent) {
            if let (Some(entity), Some(root_id)) = (decision.entity.as_deref(), root.as_deref()) {
                if let Err(e) = set_active_thread(self.store.as_ref(), entity, root_id) {
                    warn!(entity, error = %e, "failed to register active thread");
                }
            }
        }

        info!(username, intent = ?decision.intent, "processed message");
        AgentReply { text: reply_text, thread_root: root }
    }

    /// Delegates to the onboarding flow, idempotent against repeated calls.
    pub async fn onboard_participant(&self, user_id: &str, username: &str, display_name: &str) {
        if let Err(e) =
            covenant_participants::onboard_participant(self.store.as_ref(), self.chat.as_ref(), user_id, username, display_name)
                .await
        {
            warn!(username, error = %e, "onboarding failed");
        }
    }
}
