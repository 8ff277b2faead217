//! The conversation being held: which document, which character.
//!
//! Passed explicitly into the session controller; nothing in the core looks
//! these identifiers up from ambient storage.

/// A character extracted from a document. Ids are opaque.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Character {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }

    /// Greeting used when the service cannot provide one.
    pub fn fallback_greeting(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            return "Hello! How may I assist you today?".to_string();
        }

        let description = self.description.trim();
        if description.is_empty() {
            format!("Hello! I'm {name}. What would you like to talk about?")
        } else {
            let description = if description.ends_with(['.', '!', '?']) {
                description.to_string()
            } else {
                format!("{description}.")
            };
            format!("Hello! I'm {name}. {description} What would you like to talk about?")
        }
    }
}

/// Identifies a conversation: (document, character).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub document_id: String,
    pub character: Character,
}

impl Conversation {
    pub fn new(document_id: impl Into<String>, character: Character) -> Self {
        Self {
            document_id: document_id.into(),
            character,
        }
    }

    pub fn character_id(&self) -> &str {
        &self.character.id
    }

    /// Both ids must be non-blank for the service to address the conversation.
    pub fn is_addressable(&self) -> bool {
        !self.document_id.trim().is_empty() && !self.character.id.trim().is_empty()
    }
}
