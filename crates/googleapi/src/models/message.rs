//! Message model: a Gmail message and its MIME part tree

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ThreadId;

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Email header (name-value pair)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Body of a message part.
///
/// When `attachment_id` is set the real content lives in an attachment that
/// has to be fetched separately and `data` is usually empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePartBody {
    pub data: Option<String>,
    pub size: u64,
    pub attachment_id: Option<String>,
}

/// One node of a message's MIME tree
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePart {
    pub id: Option<String>,
    pub mime_type: String,
    pub headers: Vec<Header>,
    pub body: MessagePartBody,
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// All nodes of this subtree: each child's nodes in child order, then this node
    pub fn flatten(&self) -> Vec<&MessagePart> {
        let mut result = Vec::new();
        self.collect_into(&mut result);
        result
    }

    fn collect_into<'a>(&'a self, acc: &mut Vec<&'a MessagePart>) {
        for part in &self.parts {
            part.collect_into(acc);
        }
        acc.push(self);
    }
}

/// A single email message within a thread
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    /// Thread ID as reported on the message itself
    pub thread_id: ThreadId,
    pub date: DateTime<Utc>,
    /// Gmail's internal timestamp (milliseconds since epoch)
    pub internal_date: i64,
    pub snippet: String,
    pub payload: MessagePart,
    pub subject: Option<String>,
}

impl Message {
    pub fn new(
        id: MessageId,
        thread_id: ThreadId,
        date: DateTime<Utc>,
        internal_date: i64,
        snippet: String,
        payload: MessagePart,
    ) -> Self {
        let subject = subject_from_headers(&payload.headers);
        Self {
            id,
            thread_id,
            date,
            internal_date,
            snippet,
            payload,
            subject,
        }
    }

    /// Every part of the MIME tree, flattened (see [`MessagePart::flatten`])
    pub fn message_parts(&self) -> Vec<&MessagePart> {
        self.payload.flatten()
    }
}

/// Value of the first top-level header named exactly "Subject"
fn subject_from_headers(headers: &[Header]) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name == "Subject")
        .map(|h| h.value.clone())
}
