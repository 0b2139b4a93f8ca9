//! Thread model representing a Gmail thread (conversation)

use serde::{Deserialize, Serialize};

use super::Message;

/// Unique identifier for a thread (Gmail thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A parsed thread: a conversation containing one or more messages
#[derive(Debug, Clone)]
pub struct Thread {
    pub id: ThreadId,
    /// Subject of the first message, if it has one
    pub subject: Option<String>,
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new(id: ThreadId, messages: Vec<Message>) -> Self {
        let subject = messages.first().and_then(|m| m.subject.clone());
        Self {
            id,
            subject,
            messages,
        }
    }
}
