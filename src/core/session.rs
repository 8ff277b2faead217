//! # Session Controller
//!
//! Turns a character selection into a live conversation and drives message
//! sends. The presentation layer talks to nothing else in the core.
//!
//! ```text
//!          select_character                       send_message
//! Idle ──► LoadingHistory ──┬─ history ────► Ready ──────────► Sending
//!                           │                  ▲                  │
//!                           └► AwaitingGreeting┘◄── Done/Error ───┘
//!
//! any ──(unaddressable conversation)──► Error ──select_character──► ...
//! ```
//!
//! ## Replies
//!
//! `send_message` is synchronous: it appends the user message and an
//! in-progress placeholder, then hands back a [`PendingReply`] holding the
//! lazy frame stream. Whoever owns the event loop pumps that stream and feeds
//! each item back through [`SessionController::apply_frame`], or calls
//! [`SessionController::complete_reply`] to do both in one go.
//!
//! Every reply is tagged with a generation. Selecting another character or
//! clearing history bumps the generation, so frames from an abandoned reply
//! are recognised as stale and dropped. Streams are never cancelled.
//!
//! ## Persistence
//!
//! Completed exchanges are saved by a single background worker, one job at a
//! time in the order they were queued. `clear_history` goes through the same
//! queue, so it always runs after every save queued before it.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::chat::{
    ChatError, FrameStream, GreetingGateway, HistoryGateway, StreamFrame, StreamRequest,
    StreamingClient, TranscriptEntry,
};
use crate::core::conversation::Conversation;
use crate::core::message::{Message, MessageStore};

/// Shown in place of a reply that failed.
pub const DEFAULT_APOLOGY: &str = "Sorry, I had trouble responding. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    LoadingHistory,
    AwaitingGreeting,
    Ready,
    Sending,
    /// Setup failed. Recovered by selecting a character again.
    Error(String),
}

/// How the transcript was seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    /// Stored history with this many messages.
    History(usize),
    /// Greeting from the service.
    Greeting,
    /// Locally synthesized greeting.
    FallbackGreeting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Nothing but whitespace.
    Blank,
    /// A reply is already streaming.
    Busy,
    /// No conversation is ready.
    NotReady,
}

/// A reply that has been requested but not yet consumed.
pub struct PendingReply {
    generation: u64,
    frames: FrameStream,
}

impl PendingReply {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn into_parts(self) -> (u64, FrameStream) {
        (self.generation, self.frames)
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum SendOutcome {
    Started(PendingReply),
    /// The send was a no-op; nothing was appended.
    Ignored(IgnoreReason),
}

/// How a reply ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Completed,
    /// The service reported an error.
    ServerError(String),
    /// The connection failed or dropped.
    TransportError(String),
    /// The conversation moved on before the reply finished.
    Abandoned,
}

/// Result of applying one stream item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyProgress {
    Streaming,
    Finished(ReplyOutcome),
    /// The item belonged to an abandoned reply and was dropped.
    Stale,
}

#[derive(Debug)]
pub enum SessionError {
    /// Document or character id is blank.
    InvalidConversation,
    /// No character has been selected.
    NoConversation,
    /// The service refused to clear history. The transcript is untouched.
    Clear(ChatError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidConversation => {
                write!(f, "conversation needs both a document id and a character id")
            }
            SessionError::NoConversation => write!(f, "no character selected"),
            SessionError::Clear(e) => write!(f, "failed to clear history: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Clear(e) => Some(e),
            _ => None,
        }
    }
}

/// Behaviour knobs resolved from configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub apology: String,
    /// When false, stored history is neither fetched nor saved.
    pub history_enabled: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            apology: DEFAULT_APOLOGY.to_string(),
            history_enabled: true,
        }
    }
}

pub struct SessionController {
    history: Arc<dyn HistoryGateway>,
    greetings: Arc<dyn GreetingGateway>,
    streaming: Arc<dyn StreamingClient>,
    options: SessionOptions,
    conversation: Option<Conversation>,
    store: MessageStore,
    state: SessionState,
    generation: u64,
    /// User text of the reply currently streaming, saved with it on success.
    pending_user_text: Option<String>,
    /// Queue of the history worker, started on first use.
    history_jobs: Option<mpsc::UnboundedSender<HistoryJob>>,
}

impl SessionController {
    pub fn new(
        history: Arc<dyn HistoryGateway>,
        greetings: Arc<dyn GreetingGateway>,
        streaming: Arc<dyn StreamingClient>,
        options: SessionOptions,
    ) -> Self {
        Self {
            history,
            greetings,
            streaming,
            options,
            conversation: None,
            store: MessageStore::new(),
            state: SessionState::Idle,
            generation: 0,
            pending_user_text: None,
            history_jobs: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    /// Generation of the current (or most recent) reply.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.store.snapshot()
    }

    pub fn is_sending(&self) -> bool {
        self.state == SessionState::Sending
    }

    /// Starts a conversation with `conversation`, seeding the transcript from
    /// stored history or, failing that, a greeting.
    ///
    /// Any in-flight reply from a previous selection is abandoned.
    pub async fn select_character(&mut self, conversation: Conversation) -> Result<Seed, SessionError> {
        self.abandon_reply();
        self.store.clear();

        if !conversation.is_addressable() {
            warn!(
                "Rejecting conversation with blank ids (document={:?}, character={:?})",
                conversation.document_id,
                conversation.character_id()
            );
            self.conversation = None;
            self.state = SessionState::Error(SessionError::InvalidConversation.to_string());
            return Err(SessionError::InvalidConversation);
        }

        info!(
            "Selecting character {} ({}) in document {}",
            conversation.character.name,
            conversation.character_id(),
            conversation.document_id
        );
        self.conversation = Some(conversation.clone());

        if self.options.history_enabled {
            self.state = SessionState::LoadingHistory;
            match self.history.fetch_history(&conversation).await {
                Ok(messages) if !messages.is_empty() => {
                    let count = messages.len();
                    self.store.load(messages);
                    self.state = SessionState::Ready;
                    info!("Restored {count} messages from history");
                    return Ok(Seed::History(count));
                }
                Ok(_) => debug!("No stored history, requesting greeting"),
                Err(e) => warn!("History fetch failed, continuing without history: {e}"),
            }
        }

        Ok(self.seed_greeting(&conversation).await)
    }

    /// Sends `text` as the user. Returns the pending reply to pump, or the
    /// reason nothing happened.
    pub fn send_message(&mut self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(IgnoreReason::Blank);
        }
        match self.state {
            SessionState::Ready => {}
            SessionState::Sending => {
                debug!("Ignoring send while a reply is streaming");
                return SendOutcome::Ignored(IgnoreReason::Busy);
            }
            _ => return SendOutcome::Ignored(IgnoreReason::NotReady),
        }
        let Some(conversation) = self.conversation.as_ref() else {
            return SendOutcome::Ignored(IgnoreReason::NotReady);
        };

        let request = StreamRequest {
            document_id: conversation.document_id.clone(),
            character_id: conversation.character_id().to_string(),
            message: text.to_string(),
            conversation_history: self.store.completed().iter().map(TranscriptEntry::from).collect(),
        };

        self.store.append(Message::user(text));
        self.store.append(Message::placeholder());
        self.pending_user_text = Some(text.to_string());
        self.generation += 1;
        self.state = SessionState::Sending;
        debug!("Reply generation {} started", self.generation);

        SendOutcome::Started(PendingReply {
            generation: self.generation,
            frames: self.streaming.send(request),
        })
    }

    /// Applies one item of the reply tagged `generation`.
    pub fn apply_frame(
        &mut self,
        generation: u64,
        item: Result<StreamFrame, ChatError>,
    ) -> ReplyProgress {
        if !self.is_current(generation) {
            debug!(
                "Dropping item from stale reply {generation} (current {})",
                self.generation
            );
            return ReplyProgress::Stale;
        }

        match item {
            Ok(StreamFrame::Text(text)) => {
                self.store.replace_last(|m| m.content.push_str(&text));
                ReplyProgress::Streaming
            }
            Ok(StreamFrame::Done) => ReplyProgress::Finished(self.complete()),
            Ok(StreamFrame::Error(message)) => {
                warn!("Reply failed, service reported: {message}");
                self.fail();
                ReplyProgress::Finished(ReplyOutcome::ServerError(message))
            }
            Err(ChatError::Transport(message)) => {
                warn!("Reply failed, transport: {message}");
                self.fail();
                ReplyProgress::Finished(ReplyOutcome::TransportError(message))
            }
            Err(e) => {
                warn!("Reply failed: {e}");
                self.fail();
                ReplyProgress::Finished(ReplyOutcome::ServerError(e.to_string()))
            }
        }
    }

    /// The stream for `generation` ended. Without a terminal frame first,
    /// that is a transport failure.
    pub fn end_of_stream(&mut self, generation: u64) -> ReplyProgress {
        if !self.is_current(generation) {
            return ReplyProgress::Stale;
        }
        self.apply_frame(
            generation,
            Err(ChatError::Transport(
                "stream ended before a terminal frame".to_string(),
            )),
        )
    }

    /// Pumps `reply` to its end, applying every frame in arrival order.
    pub async fn complete_reply(&mut self, reply: PendingReply) -> ReplyOutcome {
        let (generation, mut frames) = reply.into_parts();
        while let Some(item) = frames.next().await {
            match self.apply_frame(generation, item) {
                ReplyProgress::Streaming => {}
                ReplyProgress::Finished(outcome) => return outcome,
                ReplyProgress::Stale => return ReplyOutcome::Abandoned,
            }
        }
        match self.end_of_stream(generation) {
            ReplyProgress::Finished(outcome) => outcome,
            _ => ReplyOutcome::Abandoned,
        }
    }

    /// Deletes stored history and reseeds a greeting.
    ///
    /// If the service refuses, the transcript is left as it was.
    pub async fn clear_history(&mut self) -> Result<Seed, SessionError> {
        let conversation = self.conversation.clone().ok_or(SessionError::NoConversation)?;

        if let Err(e) = self.clear_after_pending_saves(&conversation).await {
            warn!("Clear history failed for {}: {e}", conversation.character_id());
            return Err(SessionError::Clear(e));
        }

        self.abandon_reply();
        self.store.clear();
        Ok(self.seed_greeting(&conversation).await)
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state == SessionState::Sending
    }

    /// Makes any streaming reply stale.
    fn abandon_reply(&mut self) {
        if self.state == SessionState::Sending {
            info!("Abandoning reply generation {}", self.generation);
        }
        self.generation += 1;
        self.pending_user_text = None;
    }

    async fn seed_greeting(&mut self, conversation: &Conversation) -> Seed {
        self.state = SessionState::AwaitingGreeting;

        let (greeting, seed) = match self.greetings.fetch_greeting(conversation).await {
            Ok(greeting) => (greeting, Seed::Greeting),
            Err(e) => {
                warn!("Greeting fetch failed, using local greeting: {e}");
                (conversation.character.fallback_greeting(), Seed::FallbackGreeting)
            }
        };

        self.store.clear();
        self.store.append(Message::assistant(greeting));
        self.state = SessionState::Ready;
        seed
    }

    fn complete(&mut self) -> ReplyOutcome {
        self.store.replace_last(|m| m.in_progress = false);
        self.state = SessionState::Ready;

        let user_text = self.pending_user_text.take();
        let assistant_text = self.store.last().map(|m| m.content.clone()).unwrap_or_default();
        info!("Reply {} completed ({} bytes)", self.generation, assistant_text.len());

        if let (true, Some(user_text), Some(conversation)) = (
            self.options.history_enabled,
            user_text,
            self.conversation.clone(),
        ) {
            self.spawn_save(conversation, user_text, assistant_text);
        }
        ReplyOutcome::Completed
    }

    fn fail(&mut self) {
        let apology = self.options.apology.clone();
        self.store.replace_last(|m| {
            m.content = apology;
            m.in_progress = false;
        });
        self.pending_user_text = None;
        self.state = SessionState::Ready;
    }

    /// Queues the exchange for the history worker. Failures are only logged.
    fn spawn_save(&mut self, conversation: Conversation, user_text: String, assistant_text: String) {
        let job = HistoryJob::Save {
            conversation,
            user_text,
            assistant_text,
        };
        match self.history_queue() {
            Some(jobs) => {
                if jobs.send(job).is_err() {
                    warn!("History worker stopped, exchange not saved");
                }
            }
            None => warn!("No async runtime available, exchange not saved"),
        }
    }

    /// Clears stored history once every save queued before it has run.
    async fn clear_after_pending_saves(&mut self, conversation: &Conversation) -> Result<(), ChatError> {
        let Some(jobs) = self.history_queue() else {
            return self.history.clear_history(conversation).await;
        };
        let (done_tx, done_rx) = oneshot::channel();
        let job = HistoryJob::Clear {
            conversation: conversation.clone(),
            done: done_tx,
        };
        if jobs.send(job).is_err() {
            return Err(ChatError::Transport("history worker stopped".to_string()));
        }
        done_rx
            .await
            .unwrap_or_else(|_| Err(ChatError::Transport("history worker stopped".to_string())))
    }

    /// Sender for the history worker, spawning it if it is not running.
    fn history_queue(&mut self) -> Option<&mpsc::UnboundedSender<HistoryJob>> {
        let running = self.history_jobs.as_ref().is_some_and(|jobs| !jobs.is_closed());
        if !running {
            let runtime = tokio::runtime::Handle::try_current().ok()?;
            let (tx, rx) = mpsc::unbounded_channel();
            runtime.spawn(run_history_worker(Arc::clone(&self.history), rx));
            debug!("History worker started");
            self.history_jobs = Some(tx);
        }
        self.history_jobs.as_ref()
    }
}

/// Work for the history worker.
enum HistoryJob {
    Save {
        conversation: Conversation,
        user_text: String,
        assistant_text: String,
    },
    Clear {
        conversation: Conversation,
        done: oneshot::Sender<Result<(), ChatError>>,
    },
}

/// Runs history jobs strictly in queue order until the controller goes away.
async fn run_history_worker(
    history: Arc<dyn HistoryGateway>,
    mut jobs: mpsc::UnboundedReceiver<HistoryJob>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            HistoryJob::Save {
                conversation,
                user_text,
                assistant_text,
            } => match history
                .save_exchange(&conversation, &user_text, &assistant_text)
                .await
            {
                Ok(()) => debug!("Exchange saved for {}", conversation.character_id()),
                Err(e) => warn!(
                    "Failed to save exchange for {}: {e}",
                    conversation.character_id()
                ),
            },
            HistoryJob::Clear { conversation, done } => {
                let result = history.clear_history(&conversation).await;
                if done.send(result).is_err() {
                    debug!("Clear result dropped, caller went away");
                }
            }
        }
    }
    debug!("History worker finished");
}
