//! The turn state machine: drives one full processing cycle for an
//! inbound message.
//!
//! The cycle is an explicit phase enum plus a trampoline loop with two
//! conditional back-edges: a tool round (`ModelCall → ExecuteTools →
//! OnToolMessages → ModelCall`) and a repeat round (`OnReply → ModelCall`
//! when a contributor asked for another pass). The whole cycle, repeats
//! and tool rounds combined, is bounded by an explicit step counter.
//!
//! Phase dispatch follows the contributor protocol: the context-setting
//! phases before the backend call fan out in ascending priority order,
//! the reacting phases after it in descending order; `transform_history`
//! and `on_tool_messages` are strictly sequential pipelines. Concurrent
//! phases see a read-only snapshot of the state and their results are
//! merged in contributor order once the full set completes.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_config::EngineConfig;
use parley_core::backend::{Backend, BackendRequest, TranscriptPayload};
use parley_core::contributor::{Contributor, SortDirection, order_by_priority};
use parley_core::error::{Error, Result};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::format::FormatScheme;
use parley_core::message::Message;
use parley_core::state::TurnState;
use parley_core::tool::{Tool, ToolCatalog};

use crate::insertion::insert_contributions;
use crate::invoker::execute_tool_round;
use crate::repair::repair;

/// The states of the turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Start,
    ProvideTools,
    InitializeTurn,
    BeforeCall,
    TransformHistory,
    ContributeMessages,
    ModelCall,
    ExecuteTools,
    OnToolMessages,
    OnReply,
    OnTurnComplete,
    End,
}

/// Everything one turn needs: the conversation so far, the inbound
/// message, and the per-turn participants. Contributors and tools are
/// borrowed for this turn only; the core keeps nothing across turns.
pub struct TurnRequest {
    /// The persisted conversation.
    pub history: Vec<Message>,

    /// The message that triggered this turn.
    pub inbound: Message,

    /// Participants for this turn, in registration order.
    pub contributors: Vec<Arc<dyn Contributor>>,

    /// Baseline tools; contributors add more during provide-tools.
    pub tools: Vec<Arc<dyn Tool>>,

    /// Per-turn flattening scheme; overrides the engine's configured one.
    pub format: Option<FormatScheme>,

    /// Caller-supplied cancellation signal, observed during streaming
    /// backend calls.
    pub cancel: Option<CancellationToken>,
}

impl TurnRequest {
    pub fn new(history: Vec<Message>, inbound: Message) -> Self {
        Self {
            history,
            inbound,
            contributors: Vec::new(),
            tools: Vec::new(),
            format: None,
            cancel: None,
        }
    }

    pub fn with_contributor(mut self, contributor: Arc<dyn Contributor>) -> Self {
        self.contributors.push(contributor);
        self
    }

    pub fn with_contributors(mut self, contributors: Vec<Arc<dyn Contributor>>) -> Self {
        self.contributors.extend(contributors);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_format(mut self, scheme: FormatScheme) -> Self {
        self.format = Some(scheme);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What a finished turn hands back. Persisting `history` and delivering
/// `new_messages` are entirely the caller's responsibility.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    /// The updated conversation.
    pub history: Vec<Message>,

    /// Messages produced by this turn, in production order.
    pub new_messages: Vec<Message>,

    /// How many repeat rounds ran.
    pub reply_count: u32,

    /// The turn exited early on the caller's cancellation signal.
    pub cancelled: bool,
}

/// The engine that runs turn cycles against one backend.
pub struct TurnEngine {
    backend: Arc<dyn Backend>,
    events: Arc<EventBus>,
    max_steps: u32,
    default_format: Option<FormatScheme>,
}

impl TurnEngine {
    pub const DEFAULT_MAX_STEPS: u32 = 100;

    /// Create an engine with default settings.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            events: Arc::new(EventBus::default()),
            max_steps: Self::DEFAULT_MAX_STEPS,
            default_format: None,
        }
    }

    /// Create an engine from a validated configuration.
    pub fn from_config(backend: Arc<dyn Backend>, config: &EngineConfig) -> Self {
        Self {
            backend,
            events: Arc::new(EventBus::new(config.event_capacity)),
            max_steps: config.max_steps,
            default_format: config.format_scheme(),
        }
    }

    /// Override the step cap.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// The engine's event bus, for subscribing to domain events.
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Run one full turn cycle.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutput> {
        let TurnRequest {
            history,
            inbound,
            contributors,
            tools,
            format,
            cancel,
        } = request;

        let ascending = order_by_priority(&contributors, SortDirection::Ascending);
        let descending = order_by_priority(&contributors, SortDirection::Descending);

        let format = format.or_else(|| self.default_format.clone());
        let mut state = TurnState::new(history, inbound, format);
        let mut catalog = ToolCatalog::new();
        for tool in tools {
            catalog.register(tool);
        }

        info!(
            history_len = state.history.len(),
            contributors = contributors.len(),
            "Processing turn"
        );

        let mut phase = TurnPhase::Start;
        let mut steps: u32 = 0;
        let mut last_reply: Option<Message> = None;
        let mut pending_tool_messages: Vec<Message> = Vec::new();
        let mut cancelled = false;

        loop {
            if phase == TurnPhase::End {
                break;
            }
            steps += 1;
            if steps > self.max_steps {
                return Err(Error::StepLimitExceeded(self.max_steps));
            }
            debug!(?phase, step = steps, "Turn phase");

            phase = match phase {
                TurnPhase::Start => {
                    self.events.publish(DomainEvent::TurnStarted {
                        history_len: state.history.len(),
                        contributor_count: contributors.len(),
                        timestamp: Utc::now(),
                    });
                    TurnPhase::ProvideTools
                }

                TurnPhase::ProvideTools => {
                    let provided =
                        join_all(ascending.iter().map(|c| c.provide_tools(&state))).await;
                    for result in provided {
                        for tool in result? {
                            catalog.register(tool);
                        }
                    }
                    TurnPhase::InitializeTurn
                }

                TurnPhase::InitializeTurn => {
                    for result in
                        join_all(ascending.iter().map(|c| c.initialize_turn(&state))).await
                    {
                        result?;
                    }
                    TurnPhase::BeforeCall
                }

                TurnPhase::BeforeCall => {
                    for result in join_all(ascending.iter().map(|c| c.before_call(&state))).await {
                        result?;
                    }
                    TurnPhase::TransformHistory
                }

                TurnPhase::TransformHistory => {
                    let mut working = std::mem::take(&mut state.working_list);
                    for contributor in &ascending {
                        working = contributor.transform_history(working).await?;
                    }
                    state.working_list = working;
                    TurnPhase::ContributeMessages
                }

                TurnPhase::ContributeMessages => {
                    let contributions =
                        join_all(ascending.iter().map(|c| c.contribute_messages(&state))).await;
                    let mut batch = Vec::new();
                    for result in contributions {
                        batch.extend(result?);
                    }
                    insert_contributions(&mut state.working_list, batch);
                    TurnPhase::ModelCall
                }

                TurnPhase::ModelCall => {
                    repair(&mut state.working_list);
                    for result in join_all(
                        descending
                            .iter()
                            .map(|c| c.inspect_call_messages(&state.working_list)),
                    )
                    .await
                    {
                        result?;
                    }

                    let (reply, call_cancelled) =
                        self.call_backend(&state, &catalog, cancel.as_ref()).await?;

                    if call_cancelled {
                        warn!(
                            partial_len = reply.content.len(),
                            "Turn cancelled during backend call"
                        );
                        self.events.publish(DomainEvent::TurnCancelled {
                            partial_len: reply.content.len(),
                            timestamp: Utc::now(),
                        });
                        state.push_produced(reply);
                        cancelled = true;
                        TurnPhase::End
                    } else {
                        self.events.publish(DomainEvent::ReplyGenerated {
                            tool_call_count: reply.tool_calls.len(),
                            reply_index: state.reply_count,
                            timestamp: Utc::now(),
                        });
                        let requests_tools = reply.requests_tools();
                        state.push_produced(reply.clone());
                        last_reply = Some(reply);
                        if requests_tools {
                            TurnPhase::ExecuteTools
                        } else {
                            TurnPhase::OnReply
                        }
                    }
                }

                TurnPhase::ExecuteTools => {
                    pending_tool_messages =
                        execute_tool_round(&state, &catalog, &self.events).await?;
                    TurnPhase::OnToolMessages
                }

                TurnPhase::OnToolMessages => {
                    for contributor in &descending {
                        contributor
                            .on_tool_messages(&mut pending_tool_messages)
                            .await?;
                    }
                    state.extend_produced(std::mem::take(&mut pending_tool_messages));
                    TurnPhase::ModelCall
                }

                TurnPhase::OnReply => {
                    let reply = last_reply
                        .clone()
                        .ok_or_else(|| Error::Invariant("on-reply phase without a reply".into()))?;
                    let outcomes =
                        join_all(descending.iter().map(|c| c.on_reply(&reply, &state))).await;

                    let mut merged: Vec<Message> = Vec::new();
                    let mut repeat = false;
                    for outcome in outcomes {
                        if let Some(outcome) = outcome? {
                            merged.extend(outcome.messages);
                            repeat |= outcome.repeat;
                        }
                    }
                    state.extend_produced(merged);
                    state.repeat_requested = repeat;

                    if state.repeat_requested {
                        state.repeat_requested = false;
                        state.reply_count += 1;
                        debug!(reply_count = state.reply_count, "Repeat round requested");
                        TurnPhase::ModelCall
                    } else {
                        TurnPhase::OnTurnComplete
                    }
                }

                TurnPhase::OnTurnComplete => {
                    for result in
                        join_all(descending.iter().map(|c| c.on_turn_complete(&state))).await
                    {
                        result?;
                    }
                    TurnPhase::End
                }

                TurnPhase::End => break,
            };
        }

        info!(
            reply_count = state.reply_count,
            new_messages = state.new_messages.len(),
            cancelled,
            "Turn finished"
        );
        if !cancelled {
            self.events.publish(DomainEvent::TurnCompleted {
                reply_count: state.reply_count,
                new_message_count: state.new_messages.len(),
                timestamp: Utc::now(),
            });
        }

        Ok(TurnOutput {
            history: state.history,
            new_messages: state.new_messages,
            reply_count: state.reply_count,
            cancelled,
        })
    }

    /// Invoke the backend over its streaming interface, folding chunks
    /// into an assistant message and watching the cancellation signal
    /// between chunks. Received chunks are always drained before the
    /// signal is observed, so a cancelled call still keeps the partial
    /// text that made it through.
    async fn call_backend(
        &self,
        state: &TurnState,
        catalog: &ToolCatalog,
        cancel: Option<&CancellationToken>,
    ) -> Result<(Message, bool)> {
        let payload = match &state.format {
            Some(scheme) if !scheme.is_trivial() => TranscriptPayload::Flattened {
                text: scheme.render(&state.working_list),
            },
            _ => TranscriptPayload::Messages {
                messages: state.working_list.clone(),
            },
        };
        let flattened = payload.is_flattened();
        let request = BackendRequest {
            payload,
            tools: catalog.definitions(),
        };

        self.events.publish(DomainEvent::BackendCalled {
            message_count: state.working_list.len(),
            tool_count: request.tools.len(),
            flattened,
            timestamp: Utc::now(),
        });
        debug!(
            messages = state.working_list.len(),
            tools = request.tools.len(),
            flattened,
            backend = self.backend.name(),
            "Invoking backend"
        );

        let mut rx = self.backend.stream(request).await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut was_cancelled = false;

        loop {
            let chunk = match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        chunk = rx.recv() => chunk,
                        _ = token.cancelled() => {
                            was_cancelled = true;
                            break;
                        }
                    }
                }
                None => rx.recv().await,
            };

            match chunk {
                Some(Ok(chunk)) => {
                    if let Some(delta) = chunk.content {
                        content.push_str(&delta);
                    }
                    tool_calls.extend(chunk.tool_calls);
                    if chunk.done {
                        break;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        let message = if was_cancelled {
            // Partial text only; half-received tool calls are discarded.
            Message::assistant(content)
        } else {
            Message::assistant(content).with_tool_calls(tool_calls)
        };
        Ok((message, was_cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::backend::BackendReply;
    use parley_core::contributor::ReplyOutcome;
    use parley_core::error::{BackendError, ToolError};
    use parley_core::message::ToolCallRequest;
    use parley_core::tool::ToolOutput;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns scripted replies in sequence, then repeats the last one.
    struct ScriptedBackend {
        replies: Mutex<Vec<Message>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Message>) -> Self {
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: BackendRequest,
        ) -> std::result::Result<BackendReply, BackendError> {
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            };
            Ok(BackendReply::new(reply))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, args: serde_json::Value) -> std::result::Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(args["text"].as_str().unwrap_or("")))
        }
    }

    struct RepeatOnce;

    #[async_trait]
    impl Contributor for RepeatOnce {
        fn name(&self) -> &str {
            "repeat_once"
        }
        async fn on_reply(
            &self,
            _reply: &Message,
            state: &TurnState,
        ) -> Result<Option<ReplyOutcome>> {
            if state.reply_count == 0 {
                Ok(Some(ReplyOutcome::repeat()))
            } else {
                Ok(None)
            }
        }
    }

    #[tokio::test]
    async fn plain_reply_runs_one_cycle() {
        let backend = Arc::new(ScriptedBackend::new(vec![Message::assistant("hello")]));
        let engine = TurnEngine::new(backend);

        let output = engine
            .run_turn(TurnRequest::new(vec![], Message::user("hi")))
            .await
            .unwrap();

        assert_eq!(output.history.len(), 2);
        assert_eq!(output.new_messages.len(), 1);
        assert_eq!(output.new_messages[0].content, "hello");
        assert_eq!(output.reply_count, 0);
        assert!(!output.cancelled);
    }

    #[tokio::test]
    async fn tool_round_loops_back_to_the_backend() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Message::assistant("").with_tool_calls(vec![ToolCallRequest::new(
                "c1",
                "echo",
                json!({"text": "pong"}),
            )]),
            Message::assistant("done"),
        ]));
        let engine = TurnEngine::new(backend);

        let output = engine
            .run_turn(TurnRequest::new(vec![], Message::user("ping")).with_tool(Arc::new(EchoTool)))
            .await
            .unwrap();

        // assistant(with call) + tool result + final assistant
        assert_eq!(output.new_messages.len(), 3);
        assert!(output.new_messages[0].requests_tools());
        assert_eq!(output.new_messages[1].content, "pong");
        assert_eq!(output.new_messages[2].content, "done");
    }

    #[tokio::test]
    async fn repeat_round_increments_reply_count() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Message::assistant("first"),
            Message::assistant("second"),
        ]));
        let engine = TurnEngine::new(backend);

        let output = engine
            .run_turn(
                TurnRequest::new(vec![], Message::user("hi"))
                    .with_contributor(Arc::new(RepeatOnce)),
            )
            .await
            .unwrap();

        assert_eq!(output.reply_count, 1);
        let replies: Vec<&str> = output
            .new_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(replies, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn runaway_tool_loop_hits_the_step_cap() {
        // The backend requests the same tool forever.
        let backend = Arc::new(ScriptedBackend::new(vec![Message::assistant("")
            .with_tool_calls(vec![ToolCallRequest::new(
                "c1",
                "echo",
                json!({"text": "again"}),
            )])]));
        let engine = TurnEngine::new(backend).with_max_steps(20);

        let err = engine
            .run_turn(TurnRequest::new(vec![], Message::user("go")).with_tool(Arc::new(EchoTool)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StepLimitExceeded(20)));
    }

    #[tokio::test]
    async fn engine_from_config_applies_the_cap() {
        let config = EngineConfig {
            max_steps: 1,
            ..Default::default()
        };
        let backend = Arc::new(ScriptedBackend::new(vec![Message::assistant("hello")]));
        let engine = TurnEngine::from_config(backend, &config);

        let err = engine
            .run_turn(TurnRequest::new(vec![], Message::user("hi")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StepLimitExceeded(1)));
    }
}
