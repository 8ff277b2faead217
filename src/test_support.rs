//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use crate::chat::{
    ChatError, FrameStream, GreetingGateway, HistoryGateway, SessionSummary, StreamFrame,
    StreamRequest, StreamingClient,
};
use crate::core::conversation::{Character, Conversation};
use crate::core::message::Message;
use crate::core::session::{SessionController, SessionOptions};

fn server_down() -> ChatError {
    ChatError::Server {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

/// In-memory history gateway with switchable failures.
#[derive(Default)]
pub struct FakeHistory {
    messages: Vec<Message>,
    fail_fetch: bool,
    fail_save: bool,
    fail_clear: bool,
    first_save_delay: Option<Duration>,
    fetches: Mutex<usize>,
    clears: Mutex<usize>,
    saved: Mutex<Vec<(String, String)>>,
    persisted: Mutex<Vec<(String, String)>>,
}

impl FakeHistory {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_messages(messages: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            messages,
            ..Default::default()
        })
    }

    pub fn failing_fetch() -> Arc<Self> {
        Arc::new(Self {
            fail_fetch: true,
            ..Default::default()
        })
    }

    pub fn failing_save() -> Arc<Self> {
        Arc::new(Self {
            fail_save: true,
            ..Default::default()
        })
    }

    pub fn failing_clear(messages: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            messages,
            fail_clear: true,
            ..Default::default()
        })
    }

    /// The first save takes `delay` to land; later saves are immediate.
    pub fn slow_first_save(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            first_save_delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }

    pub fn clears(&self) -> usize {
        *self.clears.lock().unwrap()
    }

    /// Every save attempt as (user, assistant), including failed ones.
    pub fn saved(&self) -> Vec<(String, String)> {
        self.saved.lock().unwrap().clone()
    }

    /// Exchanges currently stored, in the order their saves landed.
    pub fn persisted(&self) -> Vec<(String, String)> {
        self.persisted.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryGateway for FakeHistory {
    async fn fetch_history(&self, _conversation: &Conversation) -> Result<Vec<Message>, ChatError> {
        *self.fetches.lock().unwrap() += 1;
        if self.fail_fetch {
            return Err(ChatError::Transport("connection refused".to_string()));
        }
        Ok(self.messages.clone())
    }

    async fn save_exchange(
        &self,
        _conversation: &Conversation,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), ChatError> {
        let exchange = (user_text.to_string(), assistant_text.to_string());
        let first = {
            let mut saved = self.saved.lock().unwrap();
            saved.push(exchange.clone());
            saved.len() == 1
        };
        if let (true, Some(delay)) = (first, self.first_save_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.fail_save {
            return Err(server_down());
        }
        self.persisted.lock().unwrap().push(exchange);
        Ok(())
    }

    async fn clear_history(&self, _conversation: &Conversation) -> Result<(), ChatError> {
        *self.clears.lock().unwrap() += 1;
        if self.fail_clear {
            return Err(server_down());
        }
        self.persisted.lock().unwrap().clear();
        Ok(())
    }

    async fn list_sessions(&self, _document_id: &str) -> Result<Vec<SessionSummary>, ChatError> {
        Ok(Vec::new())
    }
}

/// Greeting gateway returning a fixed greeting or always failing.
pub struct FakeGreetings {
    greeting: Option<String>,
    calls: Mutex<usize>,
}

impl FakeGreetings {
    pub fn ok(greeting: &str) -> Arc<Self> {
        Arc::new(Self {
            greeting: Some(greeting.to_string()),
            calls: Mutex::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            greeting: None,
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl GreetingGateway for FakeGreetings {
    async fn fetch_greeting(&self, _conversation: &Conversation) -> Result<String, ChatError> {
        *self.calls.lock().unwrap() += 1;
        self.greeting.clone().ok_or_else(server_down)
    }
}

/// Streaming client that replays scripted replies, one per `send`.
/// Once the script runs out, the last reply repeats.
pub struct ScriptedStream {
    replies: Mutex<VecDeque<Vec<Result<StreamFrame, ChatError>>>>,
    last: Mutex<Vec<Result<StreamFrame, ChatError>>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedStream {
    pub fn new(reply: Vec<Result<StreamFrame, ChatError>>) -> Arc<Self> {
        Self::sequence(vec![reply])
    }

    pub fn sequence(replies: Vec<Vec<Result<StreamFrame, ChatError>>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl StreamingClient for ScriptedStream {
    fn send(&self, request: StreamRequest) -> FrameStream {
        self.requests.lock().unwrap().push(request);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            *last = next;
        }
        Box::pin(stream::iter(last.clone()))
    }
}

pub fn luna() -> Conversation {
    Conversation::new(
        "doc-1",
        Character::new("luna", "Luna Lovegood", "A dreamy Ravenclaw with radish earrings"),
    )
}

/// Controller wired to the given fakes with default options.
pub fn controller(
    history: &Arc<FakeHistory>,
    greetings: &Arc<FakeGreetings>,
    stream: &Arc<ScriptedStream>,
) -> SessionController {
    SessionController::new(
        history.clone(),
        greetings.clone(),
        stream.clone(),
        SessionOptions::default(),
    )
}

/// Lets background tasks run until `condition` holds.
pub async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("background work did not finish");
}

/// Waits until `count` saves were attempted.
pub async fn wait_for_saves(history: &FakeHistory, count: usize) {
    wait_for(|| history.saved().len() >= count).await;
}
