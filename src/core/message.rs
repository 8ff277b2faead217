//! # Messages
//!
//! The transcript of the active conversation.
//!
//! ```text
//! MessageStore
//! └── messages: Vec<Message>   // insertion order == transcript order
//!         ...
//!         └── last  ← the only message allowed to be `in_progress`
//! ```
//!
//! Violating the in-progress invariant is a programming error, so the store
//! panics instead of returning a `Result`.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Still receiving streamed text.
    pub in_progress: bool,
}

impl Message {
    /// A completed message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            in_progress: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Empty assistant message awaiting a streamed reply.
    pub fn placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            in_progress: true,
        }
    }
}

/// Ordered message log for one conversation.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// True if the last message is still streaming.
    pub fn has_in_progress(&self) -> bool {
        self.messages.last().is_some_and(|m| m.in_progress)
    }

    /// Appends a message to the end of the transcript.
    ///
    /// # Panics
    /// If a message is already in progress.
    pub fn append(&mut self, message: Message) {
        assert!(
            !self.has_in_progress(),
            "MessageStore::append while a message is still in progress"
        );
        self.messages.push(message);
    }

    /// Mutates the in-progress last message.
    ///
    /// # Panics
    /// If no message is in progress.
    pub fn replace_last<F>(&mut self, transform: F)
    where
        F: FnOnce(&mut Message),
    {
        match self.messages.last_mut() {
            Some(last) if last.in_progress => transform(last),
            _ => panic!("MessageStore::replace_last with no message in progress"),
        }
    }

    /// Replaces the whole transcript (used when seeding from stored history).
    ///
    /// # Panics
    /// If any incoming message is marked in progress.
    pub fn load(&mut self, messages: Vec<Message>) {
        assert!(
            messages.iter().all(|m| !m.in_progress),
            "MessageStore::load with an in-progress message"
        );
        self.messages = messages;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Completed messages, excluding a trailing in-progress one.
    pub fn completed(&self) -> &[Message] {
        match self.messages.split_last() {
            Some((last, rest)) if last.in_progress => rest,
            _ => &self.messages,
        }
    }

    /// Owned copy for rendering.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }
}
