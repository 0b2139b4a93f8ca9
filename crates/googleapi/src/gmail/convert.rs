//! Gmail API response conversion
//!
//! Parses raw thread responses into the [`Thread`] / [`Message`] tree and
//! decodes every MIME part into a [`GmailThread`]. Parts that fail to decode
//! or have no inline data are recorded on the [`ApiConversionContext`] so the
//! caller can deal with them after the tree is built.

use anyhow::{Context, Result};
use base64::prelude::*;
use chrono::{TimeZone, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use super::api;
use crate::error::ConversionError;
use crate::models::{
    GmailMessage, GmailMessageBodyPart, GmailThread, Header, Message, MessageId, MessagePart,
    MessagePartBody, Thread, ThreadId,
};

/// Parse a full-format `threads.get` response
pub fn parse_thread(thread_response: &Value) -> Result<Thread> {
    let response = api::ThreadResponse::deserialize(thread_response)
        .context("Failed to parse thread response")?;

    let messages = response
        .messages
        .into_iter()
        .map(parse_api_message)
        .collect::<Result<Vec<_>>>()?;

    Ok(Thread::new(ThreadId::new(response.id), messages))
}

/// Convert an API message into the domain [`Message`]
pub fn parse_api_message(message: api::Message) -> Result<Message> {
    let payload = message
        .payload
        .ok_or(ConversionError::MissingField("payload"))
        .with_context(|| format!("Message {} cannot be converted", message.id))?;

    // Parse internal date (milliseconds since epoch)
    let internal_date: i64 = message
        .internal_date
        .as_deref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(0);
    let date = Utc
        .timestamp_millis_opt(internal_date)
        .single()
        .unwrap_or_else(Utc::now);

    Ok(Message::new(
        MessageId::new(message.id),
        ThreadId::new(message.thread_id),
        date,
        internal_date,
        message.snippet,
        parse_message_part(payload),
    ))
}

/// Recursively convert an API message part
pub fn parse_message_part(part: api::MessagePart) -> MessagePart {
    let body = part
        .body
        .map(|b| MessagePartBody {
            data: b.data,
            size: b.size,
            attachment_id: b.attachment_id,
        })
        .unwrap_or_default();

    MessagePart {
        id: part.part_id,
        mime_type: part.mime_type.unwrap_or_default(),
        headers: part
            .headers
            .into_iter()
            .map(|h| Header {
                name: h.name,
                value: h.value,
            })
            .collect(),
        body,
        parts: part.parts.into_iter().map(parse_message_part).collect(),
    }
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
/// Invalid UTF-8 sequences are replaced rather than rejected.
pub fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    decoders
        .iter()
        .find_map(|decoder| decoder.decode(data).ok())
        .map(|decoded| String::from_utf8_lossy(&decoded).into_owned())
}

/// Kind of item a [`Progress`] counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiItemType {
    Thread,
    Message,
}

impl ApiItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiItemType::Thread => "thread",
            ApiItemType::Message => "message",
        }
    }
}

/// Request and item counters for one query
#[derive(Debug, Clone)]
pub struct Progress {
    pub item_type: ApiItemType,
    pub limit: Option<usize>,
    pub requests_count: usize,
    pub all_items_count: usize,
    pub processed_items: usize,
    pub new_items_with_last_request: Option<usize>,
}

impl Progress {
    pub fn new(item_type: ApiItemType, limit: Option<usize>) -> Self {
        Self {
            item_type,
            limit,
            requests_count: 0,
            all_items_count: 0,
            processed_items: 0,
            new_items_with_last_request: None,
        }
    }

    pub fn incr_requests(&mut self) {
        self.requests_count += 1;
    }

    pub fn register_new_items(&mut self, number_of_new_items: usize, print_status: bool) {
        self.all_items_count += number_of_new_items;
        self.new_items_with_last_request = Some(number_of_new_items);
        if print_status {
            info!(
                "[Request #: {}] Received {} more {}s",
                self.requests_count,
                number_of_new_items,
                self.item_type.as_str()
            );
        }
    }

    pub fn incr_processed_items(&mut self) {
        self.processed_items += 1;
    }

    /// True once more items were processed than the limit allows
    pub fn is_limit_reached(&self) -> bool {
        match self.limit {
            Some(limit) if limit > 0 => self.processed_items > limit,
            _ => false,
        }
    }

    pub fn print_processing_items(&self) {
        debug!(
            "Processing {}s: {} / {}",
            self.item_type.as_str(),
            self.processed_items,
            self.all_items_count
        );
    }
}

/// Locates one decoded body part inside a [`GmailThread`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePartDescriptor {
    /// Thread ID reported by the message itself
    pub thread_id: ThreadId,
    pub message_id: MessageId,
    /// Index into `GmailThread::messages`
    pub message_index: usize,
    /// Index into `GmailMessage::message_body_parts`
    pub part_index: usize,
    pub part_id: Option<String>,
    pub mime_type: String,
    pub attachment_id: Option<String>,
}

/// State shared by every conversion step of one query
#[derive(Debug)]
pub struct ApiConversionContext {
    pub progress: Progress,
    decode_errors: Vec<MessagePartDescriptor>,
    empty_bodies: Vec<MessagePartDescriptor>,
}

impl ApiConversionContext {
    pub fn new(item_type: ApiItemType, limit: Option<usize>) -> Self {
        Self {
            progress: Progress::new(item_type, limit),
            decode_errors: Vec::new(),
            empty_bodies: Vec::new(),
        }
    }

    pub fn decode_errors(&self) -> &[MessagePartDescriptor] {
        &self.decode_errors
    }

    pub fn empty_bodies(&self) -> &[MessagePartDescriptor] {
        &self.empty_bodies
    }

    pub fn report_decode_error(&mut self, descriptor: MessagePartDescriptor) {
        warn!(
            "Failed to decode body of part {:?} ({}) in message {}, keeping original data",
            descriptor.part_id,
            descriptor.mime_type,
            descriptor.message_id.as_str()
        );
        self.decode_errors.push(descriptor);
    }

    pub fn report_empty_body(&mut self, descriptor: MessagePartDescriptor) {
        debug!(
            "Empty body in part {:?} ({}) of message {}",
            descriptor.part_id,
            descriptor.mime_type,
            descriptor.message_id.as_str()
        );
        self.empty_bodies.push(descriptor);
    }

    /// Parse and decode a raw thread response
    pub fn convert_thread(&mut self, thread_response: &Value) -> Result<GmailThread> {
        let thread = parse_thread(thread_response)?;
        Ok(GmailThread::from_thread(&thread, self))
    }

    /// Every empty-body descriptor collected so far must belong to `thread_id`
    pub fn check_thread_consistency(&self, thread_id: &ThreadId) -> Result<(), ConversionError> {
        match self.empty_bodies.iter().find(|d| &d.thread_id != thread_id) {
            Some(d) => Err(ConversionError::ThreadIdMismatch {
                thread_id: thread_id.as_str().to_string(),
                found: d.thread_id.as_str().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Drain the empty-body list, writing whatever `resolver` returns into
    /// the referenced body part of `thread`
    pub fn handle_empty_bodies<F>(&mut self, thread: &mut GmailThread, mut resolver: F) -> Result<()>
    where
        F: FnMut(&MessagePartDescriptor) -> Result<Option<String>>,
    {
        for descriptor in std::mem::take(&mut self.empty_bodies) {
            let Some(content) = resolver(&descriptor)? else {
                continue;
            };

            let part = thread
                .messages
                .get_mut(descriptor.message_index)
                .and_then(|m| m.message_body_parts.get_mut(descriptor.part_index));
            match part {
                Some(part) => part.body = content,
                None => warn!(
                    "No body part at message #{} part #{} of thread {}",
                    descriptor.message_index,
                    descriptor.part_index,
                    thread.api_id.as_str()
                ),
            }
        }
        Ok(())
    }

    /// Log and forget all decode errors; returns how many there were
    pub fn handle_encoding_errors(&mut self) -> usize {
        let count = self.decode_errors.len();
        for descriptor in self.decode_errors.drain(..) {
            warn!(
                "Undecodable body: thread {}, message {}, part {:?} ({})",
                descriptor.thread_id.as_str(),
                descriptor.message_id.as_str(),
                descriptor.part_id,
                descriptor.mime_type
            );
        }
        count
    }
}

impl GmailMessage {
    /// Decode every flattened part of `message`, reporting problems to `ctx`
    pub fn from_message(message: &Message, message_index: usize, ctx: &mut ApiConversionContext) -> Self {
        let mut message_body_parts = Vec::new();

        for (part_index, part) in message.message_parts().into_iter().enumerate() {
            let descriptor = || MessagePartDescriptor {
                thread_id: message.thread_id.clone(),
                message_id: message.id.clone(),
                message_index,
                part_index,
                part_id: part.id.clone(),
                mime_type: part.mime_type.clone(),
                attachment_id: part.body.attachment_id.clone(),
            };

            let body = match part.body.data.as_deref() {
                None | Some("") => {
                    ctx.report_empty_body(descriptor());
                    String::new()
                }
                Some(data) => match decode_base64_body(data) {
                    Some(decoded) => decoded,
                    None => {
                        ctx.report_decode_error(descriptor());
                        data.to_string()
                    }
                },
            };

            message_body_parts.push(GmailMessageBodyPart::new(body, part.mime_type.clone()));
        }

        Self {
            msg_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            subject: message.subject.clone(),
            date: message.date,
            message_body_parts,
        }
    }
}

impl GmailThread {
    pub fn from_thread(thread: &Thread, ctx: &mut ApiConversionContext) -> Self {
        let messages = thread
            .messages
            .iter()
            .enumerate()
            .map(|(idx, message)| GmailMessage::from_message(message, idx, ctx))
            .collect();

        Self {
            api_id: thread.id.clone(),
            subject: thread.subject.clone(),
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single_part_thread(data: Value) -> Value {
        json!({
            "id": "t1",
            "messages": [{
                "id": "m1",
                "threadId": "t1",
                "snippet": "",
                "internalDate": "1700000000000",
                "payload": {
                    "partId": "",
                    "mimeType": "text/plain",
                    "headers": [{"name": "Subject", "value": "Hi"}],
                    "body": {"size": 13, "data": data}
                }
            }]
        })
    }

    #[test]
    fn test_decode_base64_body() {
        // "Hello, World!" in base64url
        assert_eq!(decode_base64_body("SGVsbG8sIFdvcmxkIQ"), Some("Hello, World!".to_string()));
        // Padded
        assert_eq!(decode_base64_body("aGVsbG8="), Some("hello".to_string()));
        // URL-safe alphabet ("???" encodes to "Pz8_")
        assert_eq!(decode_base64_body("Pz8_"), Some("???".to_string()));
        assert_eq!(decode_base64_body("not-base64!!!"), None);
    }

    #[test]
    fn test_malformed_body_keeps_original_data() {
        let mut ctx = ApiConversionContext::new(ApiItemType::Thread, None);
        let thread = ctx
            .convert_thread(&single_part_thread(json!("not-base64!!!")))
            .unwrap();

        let part = &thread.messages[0].message_body_parts[0];
        assert_eq!(part.body, "not-base64!!!");
        assert_eq!(ctx.decode_errors().len(), 1);
        assert!(ctx.empty_bodies().is_empty());
    }

    #[test]
    fn test_empty_body_is_flagged_not_decode_error() {
        let mut ctx = ApiConversionContext::new(ApiItemType::Thread, None);
        let thread = ctx.convert_thread(&single_part_thread(json!(""))).unwrap();

        assert_eq!(thread.messages[0].message_body_parts[0].body, "");
        assert!(ctx.decode_errors().is_empty());
        assert_eq!(ctx.empty_bodies().len(), 1);
        assert_eq!(ctx.empty_bodies()[0].message_id, MessageId::new("m1"));
    }

    #[test]
    fn test_convert_thread_decodes_and_parses_metadata() {
        let mut ctx = ApiConversionContext::new(ApiItemType::Thread, None);
        let thread = ctx
            .convert_thread(&single_part_thread(json!("aGVsbG8=")))
            .unwrap();

        assert_eq!(thread.api_id, ThreadId::new("t1"));
        assert_eq!(thread.subject.as_deref(), Some("Hi"));
        let message = &thread.messages[0];
        assert_eq!(message.date.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(message.get_all_plain_text_parts()[0].body, "hello");
    }

    #[test]
    fn test_message_without_payload_is_an_error() {
        let response = json!({
            "id": "t1",
            "messages": [{"id": "m1", "threadId": "t1"}]
        });
        let mut ctx = ApiConversionContext::new(ApiItemType::Thread, None);
        assert!(ctx.convert_thread(&response).is_err());
    }

    #[test]
    fn test_handle_empty_bodies_overwrites_in_place() {
        let mut ctx = ApiConversionContext::new(ApiItemType::Thread, None);
        let mut thread = ctx.convert_thread(&single_part_thread(json!(""))).unwrap();

        let mut seen = Vec::new();
        ctx.handle_empty_bodies(&mut thread, |d| {
            seen.push(d.part_index);
            Ok(Some("resolved".to_string()))
        })
        .unwrap();

        assert_eq!(seen, vec![0]);
        assert_eq!(thread.messages[0].message_body_parts[0].body, "resolved");
        assert!(ctx.empty_bodies().is_empty());
    }

    #[test]
    fn test_thread_consistency_check() {
        let mut response = single_part_thread(json!(""));
        response["messages"][0]["threadId"] = json!("other");

        let mut ctx = ApiConversionContext::new(ApiItemType::Thread, None);
        ctx.convert_thread(&response).unwrap();

        let err = ctx.check_thread_consistency(&ThreadId::new("t1")).unwrap_err();
        assert!(matches!(err, ConversionError::ThreadIdMismatch { ref found, .. } if found == "other"));
        assert!(ctx.check_thread_consistency(&ThreadId::new("other")).is_ok());
    }

    #[test]
    fn test_progress_limit_is_exceeded_only_past_limit() {
        let mut progress = Progress::new(ApiItemType::Thread, Some(2));
        progress.incr_processed_items();
        progress.incr_processed_items();
        assert!(!progress.is_limit_reached());
        progress.incr_processed_items();
        assert!(progress.is_limit_reached());

        let mut unlimited = Progress::new(ApiItemType::Thread, None);
        unlimited.incr_processed_items();
        assert!(!unlimited.is_limit_reached());
    }
}
