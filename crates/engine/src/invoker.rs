//! Tool invoker: resolves and executes the calls requested by the last
//! assistant reply, converting per-call failures into in-band error
//! results.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use parley_core::error::{ConfigError, Error, Result};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::message::{Message, Role, ToolCallRequest};
use parley_core::state::TurnState;
use parley_core::tool::{Tool, ToolCatalog};
use tracing::{debug, warn};

/// Prefix marking an in-band tool failure, so the backend can see the
/// call went wrong and recover.
pub const ERROR_MARKER: &str = "Error: ";

/// Execute one round of tool calls.
///
/// Precondition: the last assistant message in `history` carries at least
/// one pending call; entering without one is an internal error. Every
/// call is resolved against the catalog before anything executes; an
/// unresolved name aborts the whole turn. Resolved calls run
/// concurrently; results come back in original call order, failures
/// downgraded to `Error: `-prefixed tool results.
///
/// The produced messages are returned (not appended): the caller threads
/// them through the sequential on-tool-messages pipeline first.
pub async fn execute_tool_round(
    state: &TurnState,
    catalog: &ToolCatalog,
    events: &EventBus,
) -> Result<Vec<Message>> {
    let assistant = state
        .history
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .ok_or_else(|| {
            Error::Invariant("tool round entered with no assistant message in history".into())
        })?;

    if assistant.tool_calls.is_empty() {
        return Err(Error::Invariant(
            "tool round entered with no pending tool calls".into(),
        ));
    }

    // Resolve everything up front; a missing tool is a configuration
    // fault, not a runtime hiccup.
    let mut resolved: Vec<(ToolCallRequest, Arc<dyn Tool>)> =
        Vec::with_capacity(assistant.tool_calls.len());
    for call in &assistant.tool_calls {
        let tool = catalog
            .get(&call.name)
            .ok_or_else(|| Error::Config(ConfigError::UnknownTool(call.name.clone())))?;
        resolved.push((call.clone(), tool));
    }

    debug!(calls = resolved.len(), "Executing tool round");

    let executions = resolved.into_iter().map(|(call, tool)| async move {
        let start = Instant::now();
        let result = tool.execute(call.arguments.clone()).await;
        (call, result, start.elapsed().as_millis() as u64)
    });
    let outcomes = join_all(executions).await;

    let mut messages = Vec::with_capacity(outcomes.len());
    for (call, result, duration_ms) in outcomes {
        match result {
            Ok(output) => {
                events.publish(DomainEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                    success: true,
                    duration_ms,
                    timestamp: Utc::now(),
                });

                let mut message = Message::tool_result(&call.id, output.content);
                if let Some(data) = output.data {
                    message.meta.extra.insert("data".into(), data);
                }
                messages.push(message);
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");

                events.publish(DomainEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                    success: false,
                    duration_ms,
                    timestamp: Utc::now(),
                });

                // Downgraded in-band so the turn continues.
                messages.push(Message::tool_result(
                    &call.id,
                    format!("{ERROR_MARKER}{e}"),
                ));
            }
        }
    }

    Ok(messages)
}
