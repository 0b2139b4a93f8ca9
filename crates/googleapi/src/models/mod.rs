//! Domain models for Gmail entities
//!
//! `Thread` / `Message` mirror the API's MIME structure; the `Gmail*` types
//! are the decoded form returned from queries.

mod gmail;
mod message;
mod thread;

pub use gmail::{GmailMessage, GmailMessageBodyPart, GmailThread, GmailThreads, MimeType};
pub use message::{Header, Message, MessageId, MessagePart, MessagePartBody};
pub use thread::{Thread, ThreadId};
