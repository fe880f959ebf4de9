//! The agentic tool execution loop.
//!
//! Flow: prompt → LLM → if tool calls → execute tools → inject results → LLM
//! → repeat. Stops when the model returns content without tool calls, or the
//! configurable turn cap is hit (§6: "terminates when the model returns
//! content without tool calls or after a configurable turn cap").

use tracing::{debug, info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ToolCall};

use super::{Tool, ToolResult};

/// Run the tool execution loop. `initial_request` must have `messages` or
/// `raw_messages` set. Returns the final response — the one whose
/// `stop_reason` is not `"tool_use"` — or the last response seen if the
/// turn cap is exhausted first.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    initial_request: ChatRequest,
    tools: &[Box<dyn Tool>],
    max_iterations: usize,
) -> Result<ChatResponse, crate::provider::ProviderError> {
    let mut raw_messages: Vec<serde_json::Value> =
        if let Some(ref raw) = initial_request.raw_messages {
            raw.clone()
        } else {
            initial_request
                .messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect()
        };

    let mut last_response: Option<ChatResponse> = None;

    for iteration in 0..max_iterations {
        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(iteration, "tool loop iteration");

        let response = provider.send(&req).await?;

        if response.tool_calls.is_empty() || response.stop_reason != "tool_use" {
            info!(iteration, "tool loop complete — no more tool calls");
            return Ok(response);
        }

        let mut assistant_content: Vec<serde_json::Value> = Vec::new();
        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({
                "type": "text",
                "text": response.content,
            }));
        }
        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }
        raw_messages.push(serde_json::json!({
            "role": "assistant",
            "content": assistant_content,
        }));

        let mut tool_result_content: Vec<serde_json::Value> = Vec::new();
        for call in &response.tool_calls {
            let result = execute_tool(tools, call).await;
            tool_result_content.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": call.id,
                "content": result.content,
                "is_error": result.is_error,
            }));
        }
        raw_messages.push(serde_json::json!({
            "role": "user",
            "content": tool_result_content,
        }));

        last_response = Some(response);
    }

    warn!(max_iterations, "tool loop hit maximum iterations");

    if let Some(resp) = last_response {
        Ok(resp)
    } else {
        Err(crate::provider::ProviderError::Parse(format!(
            "tool loop exceeded {max_iterations} iterations without a final response"
        )))
    }
}

/// Find and execute the named tool. Returns an error result if not found —
/// the executor relays this back to the model as a `tool` message so it can
/// correct the call.
async fn execute_tool(tools: &[Box<dyn Tool>], call: &ToolCall) -> ToolResult {
    match tools.iter().find(|t| t.name() == call.name) {
        Some(tool) => {
            debug!(tool = %call.name, "executing tool");
            tool.execute(call.input.clone()).await
        }
        None => ToolResult::error(format!("unknown tool: {}", call.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::provider::{ProviderError, Role, Message};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, input: serde_json::Value) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    struct OneShotToolCaller;

    #[async_trait]
    impl LlmProvider for OneShotToolCaller {
        fn name(&self) -> &str {
            "test"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let already_called = req
                .raw_messages
                .as_ref()
                .map(|m| m.len() > 1)
                .unwrap_or(false);
            if already_called {
                return Ok(ChatResponse {
                    content: "done".to_string(),
                    model: req.model.clone(),
                    tokens_in: 1,
                    tokens_out: 1,
                    stop_reason: "end_turn".to_string(),
                    tool_calls: Vec::new(),
                });
            }
            Ok(ChatResponse {
                content: String::new(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "tool_use".to_string(),
                tool_calls: vec![crate::provider::ToolCall {
                    id: "call_1".to_string(),
                    name: "echo".to_string(),
                    input: serde_json::json!({"x": 1}),
                }],
            })
        }
    }

    #[tokio::test]
    async fn loop_executes_tool_then_terminates() {
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(Echo)];
        let mut req = ChatRequest::new("test-model", "system", 64);
        req.messages.push(Message { role: Role::User, content: "hi".to_string() });

        let resp = run_tool_loop(&OneShotToolCaller, req, &tools, 10)
            .await
            .unwrap();
        assert_eq!(resp.content, "done");
        assert!(resp.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_reports_error_without_crashing() {
        let tools: Vec<Box<dyn Tool>> = vec![];
        let result = execute_tool(&tools, &crate::provider::ToolCall {
            id: "1".to_string(),
            name: "missing".to_string(),
            input: serde_json::json!({}),
        }).await;
        assert!(result.is_error);
    }
}
