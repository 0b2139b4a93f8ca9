//! Gmail API integration
//!
//! This module provides:
//! - The live transport (`GmailTransport`) and its HTTP implementation
//! - Conversion of raw thread responses into decoded domain models
//! - `GmailWrapper`, the cache-aware thread fetching loop

mod client;
mod convert;
mod wrapper;

pub use client::{GmailClient, GmailTransport};
pub use convert::{
    ApiConversionContext, ApiItemType, MessagePartDescriptor, Progress, decode_base64_body,
    parse_api_message, parse_message_part, parse_thread,
};
pub use wrapper::{DEFAULT_PAGE_SIZE, GmailWrapper, RequestStats, ThreadQuery};

/// Response format for `threads.get`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadQueryFormat {
    Full,
    Minimal,
    Metadata,
    Raw,
}

impl ThreadQueryFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadQueryFormat::Full => "full",
            ThreadQueryFormat::Minimal => "minimal",
            ThreadQueryFormat::Metadata => "metadata",
            ThreadQueryFormat::Raw => "raw",
        }
    }
}

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing threads
    #[derive(Debug, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListThreadsResponse {
        #[serde(default)]
        pub threads: Vec<ThreadRef>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a thread as returned by `threads.list`
    #[derive(Debug, Clone, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadRef {
        pub id: String,
        #[serde(default)]
        pub snippet: Option<String>,
        #[serde(default)]
        pub history_id: Option<String>,
    }

    /// Full thread from `threads.get?format=full`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadResponse {
        pub id: String,
        #[serde(default)]
        pub history_id: Option<String>,
        #[serde(default)]
        pub messages: Vec<Message>,
    }

    /// Full message
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Message {
        pub id: String,
        pub thread_id: String,
        #[serde(default)]
        pub label_ids: Vec<String>,
        #[serde(default)]
        pub snippet: String,
        /// Milliseconds since epoch, as a decimal string
        pub internal_date: Option<String>,
        pub payload: Option<MessagePart>,
    }

    /// Message part (the payload is the root part)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        #[serde(default)]
        pub headers: Vec<Header>,
        pub body: Option<MessagePartBody>,
        #[serde(default)]
        pub parts: Vec<MessagePart>,
    }

    /// Message part body (base64url encoded, or a reference to an attachment)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePartBody {
        #[serde(default)]
        pub size: u64,
        pub data: Option<String>,
        pub attachment_id: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Thread from `threads.get?format=minimal`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MinimalThread {
        pub id: String,
        #[serde(default)]
        pub messages: Vec<MessageRef>,
    }

    /// Message reference (just ID and thread ID)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: Option<String>,
    }

    /// Response from `messages.attachments.get`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AttachmentResponse {
        pub attachment_id: Option<String>,
        #[serde(default)]
        pub size: u64,
        pub data: Option<String>,
    }
}
