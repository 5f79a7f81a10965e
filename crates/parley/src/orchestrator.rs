use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::{ProviderError, SubmitError, ToolCallError};
use crate::models::chunk::StreamChunk;
use crate::models::content::{ContentPart, MessageContent};
use crate::models::conversation::{ChatModel, Conversation};
use crate::models::message::{Message, MessageId};
use crate::models::tool::{ToolCallRequest, ToolResult, WEB_SEARCH};
use crate::pacer::{RenderPacer, DEFAULT_PACING_PERIOD};
use crate::providers::base::{Provider, StreamRequest, ToolMode};
use crate::providers::factory::ProviderRegistry;
use crate::scroll::{ScrollBus, DEFAULT_SCROLL_COALESCE};
use crate::tool::{parse_tool_query, results_to_content, ToolExecutor};

const CHUNK_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Delay between two revealed characters
    pub pacing_period: Duration,
    /// Debounce window of the normal scroll channel
    pub scroll_coalesce: Duration,
    pub event_capacity: usize,
    /// Tool rounds allowed in one turn before further calls are ignored
    pub max_tool_rounds: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pacing_period: DEFAULT_PACING_PERIOD,
            scroll_coalesce: DEFAULT_SCROLL_COALESCE,
            event_capacity: 1024,
            max_tool_rounds: 4,
        }
    }
}

/// What the user submits: typed or transcribed text plus attachments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInput {
    pub text: String,
    pub attachments: Vec<ContentPart>,
}

impl UserInput {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, part: ContentPart) -> Self {
        self.attachments.push(part);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }

    fn into_content(self) -> MessageContent {
        if self.attachments.is_empty() {
            return MessageContent::text(self.text);
        }
        let mut parts = Vec::with_capacity(self.attachments.len() + 1);
        if !self.text.trim().is_empty() {
            parts.push(ContentPart::text(self.text));
        }
        parts.extend(self.attachments);
        MessageContent::Parts(parts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Streaming,
    ToolPending,
}

/// Everything a view needs to mirror the conversation as it changes
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    MessageAdded(Message),
    MessageRemoved(MessageId),
    /// Text became visible at the end of a message
    ContentRevealed { message_id: MessageId, text: String },
    ReasoningAppended { message_id: MessageId, text: String },
    ToolCallsRequested {
        message_id: MessageId,
        calls: Vec<ToolCallRequest>,
    },
    StateChanged(TurnState),
}

/// Stops the turn that is running when `cancel` is called
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cancel();
    }

    /// Install a fresh token for a new turn
    fn reset(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token.clone();
        token
    }
}

#[derive(Error, Debug)]
enum TurnAbort {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Response cancelled")]
    Cancelled,
}

impl TurnAbort {
    fn user_message(&self) -> String {
        match self {
            TurnAbort::Provider(err) => err.user_message(),
            TurnAbort::Cancelled => "⚠️ Response stopped.".to_string(),
        }
    }
}

enum StreamOutcome {
    Finished,
    ToolCalls(Vec<ToolCallRequest>),
}

/// Aborts the network read when the turn stops listening to it
struct ReadTask(JoinHandle<()>);

impl Drop for ReadTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn spawn_read(
    provider: Arc<dyn Provider>,
    model: String,
    history: Vec<Message>,
    tools: ToolMode,
) -> (ReadTask, mpsc::Receiver<Result<StreamChunk, ProviderError>>) {
    let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
    let handle = tokio::spawn(async move {
        let request = StreamRequest::new(&model, &history).with_tools(tools);
        let mut stream = match provider.stream(request).await {
            Ok(stream) => stream,
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        };
        while let Some(item) = stream.next().await {
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });
    (ReadTask(handle), rx)
}

async fn execute_call(
    executor: Option<&dyn ToolExecutor>,
    call: &ToolCallRequest,
) -> Result<Vec<ToolResult>, ToolCallError> {
    let executor = match executor {
        Some(executor) if call.function_name == WEB_SEARCH => executor,
        _ => return Err(ToolCallError::UnknownTool(call.function_name.clone())),
    };
    let query = parse_tool_query(&call.raw_arguments)?;
    tracing::debug!("Running {} for call {}", call.function_name, call.id);
    Ok(executor.execute(&call.function_name, &query).await?)
}

/// Closes the turn even when the `submit` future is dropped part way
struct ActiveTurn<'a> {
    orchestrator: &'a mut Orchestrator,
    finished: bool,
}

impl ActiveTurn<'_> {
    fn finish(mut self, outcome: Result<(), TurnAbort>) {
        self.finished = true;
        self.orchestrator.finish_turn(outcome);
    }
}

impl Drop for ActiveTurn<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Turn dropped before it finished");
            self.orchestrator.finish_turn(Err(TurnAbort::Cancelled));
        }
    }
}

/// Drives one conversation: sends it to the configured backend, reveals the
/// answer through the pacer and runs tool rounds until the model is done.
pub struct Orchestrator {
    conversation: Conversation,
    registry: ProviderRegistry,
    tools: Option<Arc<dyn ToolExecutor>>,
    config: OrchestratorConfig,
    state: TurnState,
    in_progress: Option<MessageId>,
    pacer: RenderPacer,
    scroll: ScrollBus,
    events: broadcast::Sender<ConversationEvent>,
    cancel: CancelHandle,
}

impl Orchestrator {
    pub fn new(
        conversation: Conversation,
        registry: ProviderRegistry,
        tools: Option<Arc<dyn ToolExecutor>>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            conversation,
            registry,
            tools,
            pacer: RenderPacer::new(config.pacing_period),
            scroll: ScrollBus::new(config.scroll_coalesce),
            config,
            state: TurnState::Idle,
            in_progress: None,
            events,
            cancel: CancelHandle::default(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub fn scroll(&self) -> &ScrollBus {
        &self.scroll
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Switch the model used by the next turn
    pub fn set_model(&mut self, model: ChatModel) -> Result<(), SubmitError> {
        if self.state != TurnState::Idle {
            return Err(SubmitError::Busy);
        }
        tracing::info!("Switching model to {} ({})", model.id, model.provider);
        self.conversation.model = model;
        Ok(())
    }

    /// Append the user's message and run the turn to completion.
    ///
    /// Failures during the turn end up in the conversation as a notice and
    /// are not returned. A turn stops early through the cancel handle or by
    /// dropping this future; either way the revealed text is kept, one notice
    /// is appended and the orchestrator is idle again.
    pub async fn submit(&mut self, input: UserInput) -> Result<(), SubmitError> {
        if self.state != TurnState::Idle {
            return Err(SubmitError::Busy);
        }
        if input.is_empty() {
            return Err(SubmitError::EmptyInput);
        }

        self.push_message(Message::user().with_content(input.into_content()));
        let token = self.cancel.reset();
        let mut turn = ActiveTurn {
            orchestrator: self,
            finished: false,
        };
        let outcome = turn.orchestrator.drive_turn(&token).await;
        turn.finish(outcome);
        Ok(())
    }

    async fn drive_turn(&mut self, token: &CancellationToken) -> Result<(), TurnAbort> {
        let kind = self.conversation.model.provider;
        let provider = self.registry.get(kind).ok_or_else(|| ProviderError::Auth {
            provider: kind,
            message: "no adapter is configured".to_string(),
        })?;

        let tools_available = self.tools.is_some() && provider.supports_tools();
        let mut tool_mode = if tools_available {
            ToolMode::Auto
        } else {
            ToolMode::Disabled
        };
        let mut rounds = 0;

        loop {
            self.set_state(TurnState::Streaming);
            let calls = match self.stream_response(&provider, tool_mode, token).await? {
                StreamOutcome::Finished => return Ok(()),
                StreamOutcome::ToolCalls(calls) => calls,
            };

            // The message asking for tools is complete
            if let Some(message_id) = self.in_progress.take() {
                let rest = self.pacer.flush();
                self.reveal(message_id, rest);
            }

            if rounds >= self.config.max_tool_rounds {
                tracing::warn!("Ignoring tool calls after {} rounds", rounds);
                self.push_message(Message::notice(format!(
                    "⚠️ Stopped after {} rounds of web searches without a final answer.",
                    rounds
                )));
                return Ok(());
            }
            rounds += 1;

            self.set_state(TurnState::ToolPending);
            self.run_tool_calls(&calls, token).await;
            if token.is_cancelled() {
                return Err(TurnAbort::Cancelled);
            }

            tool_mode = if tools_available {
                ToolMode::Suppressed
            } else {
                ToolMode::Disabled
            };
        }
    }

    async fn stream_response(
        &mut self,
        provider: &Arc<dyn Provider>,
        tools: ToolMode,
        token: &CancellationToken,
    ) -> Result<StreamOutcome, TurnAbort> {
        let message_id = self.open_assistant_message();
        let history: Vec<Message> = self
            .conversation
            .messages()
            .iter()
            .filter(|message| message.id != message_id)
            .cloned()
            .collect();
        tracing::debug!(
            provider = %provider.kind(),
            model = %self.conversation.model.id,
            tools = ?tools,
            "Requesting response"
        );

        let (_read_task, mut chunks) = spawn_read(
            provider.clone(),
            self.conversation.model.id.clone(),
            history,
            tools,
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(TurnAbort::Cancelled),
                item = chunks.recv() => match item {
                    None => return Ok(StreamOutcome::Finished),
                    Some(Err(err)) => return Err(TurnAbort::Provider(err)),
                    Some(Ok(chunk)) => {
                        if let Some(calls) = self.apply_chunk(message_id, chunk) {
                            return Ok(StreamOutcome::ToolCalls(calls));
                        }
                    }
                },
                Some(c) = self.pacer.tick(), if self.pacer.is_active() => {
                    self.reveal(message_id, c.to_string());
                }
            }
        }
    }

    /// Route one chunk; returns the tool calls when the model asked for any
    fn apply_chunk(
        &mut self,
        message_id: MessageId,
        chunk: StreamChunk,
    ) -> Option<Vec<ToolCallRequest>> {
        if let Some(reasoning) = chunk.reasoning_text() {
            if let Some(message) = self.conversation.get_mut(message_id) {
                message.append_reasoning(&reasoning);
            }
            self.emit(ConversationEvent::ReasoningAppended {
                message_id,
                text: reasoning,
            });
            self.scroll.signal_immediate();
        }

        if let Some(content) = chunk.content_delta.as_deref() {
            self.pacer.enqueue(content);
        }

        let calls = chunk.tool_calls.filter(|calls| !calls.is_empty())?;
        if let Some(message) = self.conversation.get_mut(message_id) {
            message
                .tool_calls
                .get_or_insert_with(Vec::new)
                .extend(calls.iter().cloned());
        }
        self.emit(ConversationEvent::ToolCallsRequested {
            message_id,
            calls: calls.clone(),
        });
        Some(calls)
    }

    async fn run_tool_calls(&mut self, calls: &[ToolCallRequest], token: &CancellationToken) {
        let executor = self.tools.clone();
        for call in calls {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = execute_call(executor.as_deref(), call) => result,
            };

            match result {
                Ok(results) => {
                    self.push_message(Message::tool(&call.id).with_text(results_to_content(&results)));
                }
                Err(ToolCallError::UnknownTool(name)) => {
                    tracing::info!("Skipping call {} to unknown tool {}", call.id, name);
                }
                Err(err) => {
                    tracing::warn!("Tool call {} failed: {}", call.id, err);
                    self.push_message(Message::notice(format!("⚠️ Web search failed: {}", err)));
                }
            }
        }
    }

    fn finish_turn(&mut self, outcome: Result<(), TurnAbort>) {
        let in_progress = self.in_progress.take();
        let rest = self.pacer.flush();
        if let Some(message_id) = in_progress {
            self.reveal(message_id, rest);
        }

        let blank = in_progress.filter(|id| {
            self.conversation
                .get(*id)
                .is_some_and(|message| message.is_blank())
        });
        if let Some(message_id) = blank {
            self.remove_message(message_id);
        }

        if let Err(abort) = outcome {
            tracing::error!("Turn aborted: {}", abort);
            self.push_message(Message::notice(abort.user_message()));
        }

        self.scroll.request_normal();
        self.set_state(TurnState::Idle);
    }

    fn open_assistant_message(&mut self) -> MessageId {
        if let Some(message_id) = self.in_progress {
            if self
                .conversation
                .last()
                .is_some_and(|message| message.id == message_id)
            {
                return message_id;
            }
        }
        let message_id = self.push_message(Message::assistant());
        self.in_progress = Some(message_id);
        message_id
    }

    fn reveal(&mut self, message_id: MessageId, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(message) = self.conversation.get_mut(message_id) {
            message.content.push_str(&text);
        }
        self.emit(ConversationEvent::ContentRevealed { message_id, text });
        self.scroll.signal_immediate();
    }

    fn push_message(&mut self, message: Message) -> MessageId {
        let message_id = self.conversation.push(message);
        if let Some(message) = self.conversation.last().cloned() {
            self.emit(ConversationEvent::MessageAdded(message));
        }
        self.scroll.request_normal();
        message_id
    }

    fn remove_message(&mut self, message_id: MessageId) {
        if self.conversation.pop_if(message_id).is_some() {
            self.emit(ConversationEvent::MessageRemoved(message_id));
            self.scroll.request_normal();
        }
    }

    fn set_state(&mut self, state: TurnState) {
        if self.state != state {
            self.state = state;
            self.emit(ConversationEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: ConversationEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}
