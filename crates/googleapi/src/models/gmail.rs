//! Converted, decoded view of threads and messages handed to callers

use chrono::{DateTime, Utc};

use super::{MessageId, ThreadId};

/// MIME types callers commonly filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeType {
    TextPlain,
    TextHtml,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::TextPlain => "text/plain",
            MimeType::TextHtml => "text/html",
        }
    }
}

/// Decoded body of one message part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmailMessageBodyPart {
    pub body: String,
    pub mime_type: String,
}

impl GmailMessageBodyPart {
    pub fn new(body: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// A message with all of its MIME parts decoded
#[derive(Debug, Clone)]
pub struct GmailMessage {
    pub msg_id: MessageId,
    pub thread_id: ThreadId,
    pub subject: Option<String>,
    pub date: DateTime<Utc>,
    /// One entry per flattened MIME part, in flattening order
    pub message_body_parts: Vec<GmailMessageBodyPart>,
}

impl GmailMessage {
    pub fn get_all_plain_text_parts(&self) -> Vec<&GmailMessageBodyPart> {
        self.get_all_parts_with_type(MimeType::TextPlain)
    }

    pub fn get_all_parts_with_type(&self, mime_type: MimeType) -> Vec<&GmailMessageBodyPart> {
        self.message_body_parts
            .iter()
            .filter(|part| part.mime_type == mime_type.as_str())
            .collect()
    }
}

/// A converted thread
#[derive(Debug, Clone)]
pub struct GmailThread {
    pub api_id: ThreadId,
    pub subject: Option<String>,
    pub messages: Vec<GmailMessage>,
}

/// Result of a thread query
#[derive(Debug, Clone, Default)]
pub struct GmailThreads {
    pub threads: Vec<GmailThread>,
}

impl GmailThreads {
    pub fn add(&mut self, thread: GmailThread) {
        self.threads.push(thread);
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Messages of all threads, thread by thread
    pub fn messages(&self) -> impl Iterator<Item = &GmailMessage> {
        self.threads.iter().flat_map(|t| t.messages.iter())
    }
}
