//! The concrete tool catalog the executor exposes to the heavy model's
//! tool loop: one [`covenant_llm::Tool`] per named operation in the
//! catalog, each closing over exactly the collaborators it needs.

pub mod approval;
pub mod read;
pub mod write;

use std::sync::Arc;

use covenant_chat::ChatClient;
use covenant_core::ChannelKind;
use covenant_llm::{LlmProvider, Tool};
use covenant_store::Store;

/// Assembles the tool catalog for one agent turn. Write tools (including
/// approval and role-assignment tools) are omitted entirely in a DM, per
/// the channel-kind gating the tool loop path requires.
pub fn build_tools(
    store: Arc<dyn Store>,
    chat: Arc<dyn ChatClient>,
    llm: Arc<dyn LlmProvider>,
    heavy_model: &str,
    channel_kind: ChannelKind,
) -> Vec<Box<dyn Tool>> {
    let mut tools: Vec<Box<dyn Tool>> = vec![
        Box::new(read::ReadContractTool::new(store.clone())),
        Box::new(read::ReadDraftTool::new(store.clone())),
        Box::new(read::ReadDiscussionTool::new(store.clone())),
        Box::new(read::ReadGovernancePolicyTool::new(store.clone())),
        Box::new(read::ReadRolesTool::new(store.clone())),
        Box::new(read::ValidateContractTool::new()),
        Box::new(read::CheckApprovalTool::new(store.clone())),
        Box::new(read::DiffContractTool::new(store.clone())),
        Box::new(read::ListContractsTool::new(store.clone())),
        Box::new(read::GenerateContractTemplateTool::new()),
        Box::new(read::ParticipantStatsTool::new(store.clone())),
    ];

    if matches!(channel_kind, ChannelKind::Channel) {
        tools.push(Box::new(write::SaveDraftTool::new(store.clone())));
        tools.push(Box::new(write::SaveContractTool::new(store.clone(), llm.clone(), heavy_model)));
        tools.push(Box::new(write::UpdateDiscussionTool::new(store.clone())));
        tools.push(Box::new(write::AddReminderTool::new(store.clone())));
        tools.push(Box::new(write::UpdateParticipantTool::new(store.clone())));
        tools.push(Box::new(write::SaveDecisionTool::new(store.clone())));
        tools.push(Box::new(write::AssignRoleTool::new(store.clone(), chat.clone())));
        tools.push(Box::new(write::SetContractStatusTool::new(store.clone())));
        tools.push(Box::new(approval::RequestApprovalTool::new(store.clone(), chat.clone())));
        tools.push(Box::new(approval::ApproveContractTool::new(store.clone())));
        tools.push(Box::new(write::CreatePollTool::new(chat.clone())));
    }

    tools
}
