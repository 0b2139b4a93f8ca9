//! Gmail API HTTP client
//!
//! Provides the live calls the thread fetching loop needs.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use log::trace;
use serde::Deserialize;
use serde_json::Value;

use super::ThreadQueryFormat;
use super::api::ListThreadsResponse;
use crate::auth::GoogleApiAuthorizer;

/// The live Gmail calls used by [`GmailWrapper`](super::GmailWrapper)
pub trait GmailTransport {
    /// One page of `threads.list`
    fn list_threads(
        &self,
        query: Option<&str>,
        max_results: Option<usize>,
        page_token: Option<&str>,
    ) -> Result<ListThreadsResponse>;

    /// Raw `threads.get` response
    fn get_thread(&self, thread_id: &str, format: ThreadQueryFormat) -> Result<Value>;

    /// Raw `messages.attachments.get` response
    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Value>;
}

/// Gmail API client for the authorized user
pub struct GmailClient {
    auth: GoogleApiAuthorizer,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Create a new Gmail client
    pub fn new(auth: GoogleApiAuthorizer) -> Self {
        Self { auth }
    }

    pub fn authorizer(&self) -> &GoogleApiAuthorizer {
        &self.auth
    }

    fn get_json(&self, url: &str, what: &str) -> Result<Value> {
        let access_token = self.auth.get_access_token()?;
        trace!("GET {}", url);

        let mut response = ureq::get(url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .with_context(|| format!("Failed to send {} request", what))?;

        response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse {} response", what))
    }
}

/// `threads.list` URL; `maxResults` is capped at the API maximum of 500
fn threads_url(
    base_url: &str,
    query: Option<&str>,
    max_results: Option<usize>,
    page_token: Option<&str>,
) -> String {
    let mut params = Vec::new();
    if let Some(q) = query {
        params.push(format!("q={}", urlencoding::encode(q)));
    }
    if let Some(max) = max_results {
        params.push(format!("maxResults={}", max.min(500)));
    }
    if let Some(token) = page_token {
        params.push(format!("pageToken={}", urlencoding::encode(token)));
    }

    let mut url = format!("{}/users/me/threads", base_url);
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

impl GmailTransport for GmailClient {
    fn list_threads(
        &self,
        query: Option<&str>,
        max_results: Option<usize>,
        page_token: Option<&str>,
    ) -> Result<ListThreadsResponse> {
        let url = threads_url(Self::BASE_URL, query, max_results, page_token);
        let value = self.get_json(&url, "list threads")?;
        ListThreadsResponse::deserialize(&value).context("Failed to parse list threads response")
    }

    fn get_thread(&self, thread_id: &str, format: ThreadQueryFormat) -> Result<Value> {
        let url = format!(
            "{}/users/me/threads/{}?format={}",
            Self::BASE_URL,
            urlencoding::encode(thread_id),
            format.as_str()
        );
        self.get_json(&url, "get thread")
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Value> {
        let url = format!(
            "{}/users/me/messages/{}/attachments/{}",
            Self::BASE_URL,
            urlencoding::encode(message_id),
            urlencoding::encode(attachment_id)
        );
        self.get_json(&url, "get attachment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://gmail.example/v1";

    #[test]
    fn test_threads_url_without_params() {
        assert_eq!(threads_url(BASE, None, None, None), "https://gmail.example/v1/users/me/threads");
    }

    #[test]
    fn test_threads_url_encodes_query_and_caps_page_size() {
        let url = threads_url(BASE, Some("from:a@b.com is:unread"), Some(1000), Some("tok/1"));
        assert_eq!(
            url,
            "https://gmail.example/v1/users/me/threads?q=from%3Aa%40b.com%20is%3Aunread&maxResults=500&pageToken=tok%2F1"
        );
    }

    #[test]
    fn test_list_threads_response_from_value() {
        let value = json!({
            "threads": [{"id": "t1", "snippet": "hi", "historyId": "7"}],
            "nextPageToken": "page2",
            "resultSizeEstimate": 1
        });
        let list = ListThreadsResponse::deserialize(&value).unwrap();
        assert_eq!(list.threads.len(), 1);
        assert_eq!(list.threads[0].id, "t1");
        assert_eq!(list.next_page_token.as_deref(), Some("page2"));
    }

    #[test]
    fn test_empty_result_page_has_no_threads_field() {
        let list = ListThreadsResponse::deserialize(&json!({"resultSizeEstimate": 0})).unwrap();
        assert!(list.threads.is_empty());
        assert!(list.next_page_token.is_none());
    }
}
