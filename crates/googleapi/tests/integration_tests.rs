//! Integration tests for the googleapi crate
//!
//! These tests drive `GmailWrapper::query_threads` against an in-memory
//! transport and check what ends up in the filesystem cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Result, bail};
use googleapi::cache::{
    CachingStrategy, CachingStrategyType, FileSystemEmailThreadCacheStrategy, GmailRequestType,
    NoCacheStrategy,
};
use googleapi::gmail::api::{ListThreadsResponse, ThreadRef};
use googleapi::gmail::{GmailTransport, GmailWrapper, ThreadQuery, ThreadQueryFormat};
use googleapi::{CacheConfig, CacheError, ConversionError, GmailThreads, MimeType};
use serde_json::{Value, json};
use tempfile::TempDir;

const PROJECT: &str = "test-project";
const EMAIL: &str = "john.doe@example.com";

/// Serves canned responses and records every call
#[derive(Default)]
struct MockTransport {
    pages: Vec<Vec<String>>,
    threads: HashMap<String, Value>,
    attachments: HashMap<(String, String), Value>,
    calls: RefCell<Vec<String>>,
}

impl MockTransport {
    fn with_pages(pages: Vec<Vec<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|p| p.into_iter().map(str::to_string).collect())
                .collect(),
            ..Self::default()
        }
    }

    fn thread(mut self, response: Value) -> Self {
        let id = response["id"].as_str().unwrap().to_string();
        self.threads.insert(id, response);
        self
    }

    fn attachment(mut self, message_id: &str, attachment_id: &str, data: &str) -> Self {
        self.attachments.insert(
            (message_id.to_string(), attachment_id.to_string()),
            json!({"attachmentId": attachment_id, "size": data.len(), "data": data}),
        );
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn count_calls(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl GmailTransport for MockTransport {
    fn list_threads(
        &self,
        query: Option<&str>,
        max_results: Option<usize>,
        page_token: Option<&str>,
    ) -> Result<ListThreadsResponse> {
        self.calls.borrow_mut().push(format!(
            "list:{}:{:?}:{:?}",
            query.unwrap_or(""),
            max_results,
            page_token
        ));

        let page = match page_token {
            Some(token) => token.trim_start_matches("page-").parse::<usize>()?,
            None => 0,
        };
        let ids = self.pages.get(page).cloned().unwrap_or_default();
        let next_page_token = (page + 1 < self.pages.len()).then(|| format!("page-{}", page + 1));

        Ok(ListThreadsResponse {
            threads: ids
                .into_iter()
                .map(|id| ThreadRef {
                    id,
                    snippet: None,
                    history_id: None,
                })
                .collect(),
            next_page_token,
            result_size_estimate: None,
        })
    }

    fn get_thread(&self, thread_id: &str, format: ThreadQueryFormat) -> Result<Value> {
        self.calls
            .borrow_mut()
            .push(format!("get:{}:{}", thread_id, format.as_str()));

        let Some(full) = self.threads.get(thread_id) else {
            bail!("404 thread {}", thread_id);
        };
        match format {
            ThreadQueryFormat::Minimal => {
                let messages: Vec<Value> = full["messages"]
                    .as_array()
                    .map(|msgs| {
                        msgs.iter()
                            .map(|m| json!({"id": m["id"], "threadId": m["threadId"]}))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(json!({"id": thread_id, "messages": messages}))
            }
            _ => Ok(full.clone()),
        }
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Value> {
        self.calls
            .borrow_mut()
            .push(format!("attachment:{}:{}", message_id, attachment_id));

        match self
            .attachments
            .get(&(message_id.to_string(), attachment_id.to_string()))
        {
            Some(response) => Ok(response.clone()),
            None => bail!("404 attachment {}", attachment_id),
        }
    }
}

fn message(id: &str, thread_id: &str, subject: &str, payload: Value) -> Value {
    let mut payload = payload;
    payload["headers"] = json!([
        {"name": "From", "value": "sender@example.com"},
        {"name": "Subject", "value": subject}
    ]);
    json!({
        "id": id,
        "threadId": thread_id,
        "snippet": "",
        "internalDate": "1700000000000",
        "payload": payload
    })
}

fn plain_thread(id: &str, body: &str) -> Value {
    json!({
        "id": id,
        "messages": [message(
            &format!("{}-m1", id),
            id,
            &format!("Subject of {}", id),
            json!({"partId": "", "mimeType": "text/plain", "body": {"size": 5, "data": body}})
        )]
    })
}

/// T1 / M1: part A references attachment AT1, part B carries "hello" inline
fn e2e_thread() -> Value {
    json!({
        "id": "T1",
        "messages": [message("M1", "T1", "Quarterly report", json!({
            "partId": "",
            "mimeType": "multipart/alternative",
            "body": {"size": 0},
            "parts": [
                {"partId": "0", "mimeType": "text/plain", "body": {"size": 9, "data": "", "attachmentId": "AT1"}},
                {"partId": "1", "mimeType": "text/html", "body": {"size": 5, "data": "aGVsbG8="}}
            ]
        }))]
    })
}

fn e2e_transport() -> MockTransport {
    // "full-text"
    MockTransport::with_pages(vec![vec!["T1"]])
        .thread(e2e_thread())
        .attachment("M1", "AT1", "ZnVsbC10ZXh0")
}

fn fs_wrapper(transport: MockTransport, basedir: &Path) -> GmailWrapper<MockTransport> {
    let config = CacheConfig::new(CachingStrategyType::FileSystem, basedir, PROJECT, EMAIL).unwrap();
    GmailWrapper::with_cache_config(transport, &config).unwrap()
}

fn bodies(threads: &GmailThreads) -> Vec<(String, String)> {
    threads
        .messages()
        .flat_map(|m| m.message_body_parts.iter())
        .map(|p| (p.mime_type.clone(), p.body.clone()))
        .collect()
}

#[test]
fn test_attachment_backfill_end_to_end() {
    let dir = TempDir::new().unwrap();
    let mut wrapper = fs_wrapper(e2e_transport(), dir.path());

    let threads = wrapper.query_threads(&ThreadQuery::new()).unwrap();

    assert_eq!(threads.len(), 1);
    let thread = &threads.threads[0];
    assert_eq!(thread.api_id.as_str(), "T1");
    assert_eq!(thread.subject.as_deref(), Some("Quarterly report"));
    assert_eq!(
        bodies(&threads),
        vec![
            ("text/plain".to_string(), "full-text".to_string()),
            ("text/html".to_string(), "hello".to_string()),
            ("multipart/alternative".to_string(), String::new()),
        ]
    );
    assert_eq!(thread.messages[0].get_all_parts_with_type(MimeType::TextHtml)[0].body, "hello");

    let transport = wrapper.transport();
    assert_eq!(transport.count_calls("get:T1:full"), 1);
    assert_eq!(transport.count_calls("attachment:M1:AT1"), 1);
    assert_eq!(wrapper.request_stats().requests(GmailRequestType::Attachments), 1);

    // Files written by the first run are visible to a freshly scanned cache
    let strategy = FileSystemEmailThreadCacheStrategy::new(dir.path(), PROJECT, EMAIL).unwrap();
    assert!(strategy.thread_json_path("T1").is_file());
    assert!(strategy.message_data_path("T1").is_file());
    assert!(strategy.attachment_path("T1", "M1", "AT1").is_file());
    assert!(strategy.thread_dir("T1").starts_with(dir.path().join("john_doe_example_com")));
    assert_eq!(strategy.get_cached_threads(), vec!["T1".to_string()]);
}

#[test]
fn test_second_run_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    fs_wrapper(e2e_transport(), dir.path())
        .query_threads(&ThreadQuery::new())
        .unwrap();

    // Message list is re-checked with a minimal lookup, but nothing else is fetched
    let mut wrapper = fs_wrapper(e2e_transport(), dir.path());
    let threads = wrapper.query_threads(&ThreadQuery::new()).unwrap();

    assert_eq!(bodies(&threads)[0].1, "full-text");
    let transport = wrapper.transport();
    assert_eq!(transport.count_calls("get:T1:minimal"), 1);
    assert_eq!(transport.count_calls("get:T1:full"), 0);
    assert_eq!(transport.count_calls("attachment:"), 0);

    // Single-message threads skip the minimal lookup too
    let mut wrapper = fs_wrapper(e2e_transport(), dir.path());
    let query = ThreadQuery::new().expect_one_message_per_thread(true);
    let threads = wrapper.query_threads(&query).unwrap();

    assert_eq!(bodies(&threads)[1].1, "hello");
    assert_eq!(wrapper.transport().count_calls("get:"), 0);
    assert_eq!(wrapper.transport().count_calls("list:"), 1);
}

#[test]
fn test_new_message_in_cached_thread_triggers_full_fetch() {
    let dir = TempDir::new().unwrap();
    let transport = MockTransport::with_pages(vec![vec!["t1"]]).thread(plain_thread("t1", "aGVsbG8="));
    fs_wrapper(transport, dir.path())
        .query_threads(&ThreadQuery::new())
        .unwrap();

    let mut grown = plain_thread("t1", "aGVsbG8=");
    let reply = message(
        "t1-m2",
        "t1",
        "Re: Subject of t1",
        json!({"partId": "", "mimeType": "text/plain", "body": {"size": 5, "data": "d29ybGQ"}}),
    );
    grown["messages"].as_array_mut().unwrap().push(reply);

    let transport = MockTransport::with_pages(vec![vec!["t1"]]).thread(grown);
    let mut wrapper = fs_wrapper(transport, dir.path());
    let threads = wrapper.query_threads(&ThreadQuery::new()).unwrap();

    assert_eq!(threads.messages().count(), 2);
    assert_eq!(bodies(&threads)[1].1, "world");
    assert_eq!(wrapper.transport().count_calls("get:t1:minimal"), 1);
    assert_eq!(wrapper.transport().count_calls("get:t1:full"), 1);

    let strategy = FileSystemEmailThreadCacheStrategy::new(dir.path(), PROJECT, EMAIL).unwrap();
    assert_eq!(strategy.cached_message_ids("t1").len(), 2);
}

#[test]
fn test_paging_follows_next_page_token() {
    let transport = MockTransport::with_pages(vec![vec!["a", "b"], vec!["c"]])
        .thread(plain_thread("a", "YQ"))
        .thread(plain_thread("b", "Yg"))
        .thread(plain_thread("c", "Yw"));
    let mut wrapper = GmailWrapper::new(transport, Box::new(NoCacheStrategy::new()));

    let threads = wrapper
        .query_threads(&ThreadQuery::new().query("label:inbox"))
        .unwrap();

    let ids: Vec<&str> = threads.threads.iter().map(|t| t.api_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(
        wrapper.transport().calls()[..1],
        ["list:label:inbox:None:None".to_string()]
    );
    assert!(wrapper
        .transport()
        .calls()
        .contains(&"list:label:inbox:None:Some(\"page-1\")".to_string()));

    let stats = wrapper.request_stats();
    assert_eq!(stats.requests(GmailRequestType::ThreadsList), 2);
    assert_eq!(stats.items(GmailRequestType::ThreadsList), 3);
    assert_eq!(stats.requests(GmailRequestType::ThreadsGet), 3);
}

#[test]
fn test_limit_stops_processing() {
    let transport = MockTransport::with_pages(vec![vec!["a", "b", "c"], vec!["d"]])
        .thread(plain_thread("a", "YQ"))
        .thread(plain_thread("b", "Yg"))
        .thread(plain_thread("c", "Yw"))
        .thread(plain_thread("d", "ZA"));
    let mut wrapper = GmailWrapper::new(transport, Box::new(NoCacheStrategy::new()));

    let threads = wrapper.query_threads(&ThreadQuery::new().limit(2)).unwrap();

    assert_eq!(threads.len(), 2);
    let transport = wrapper.transport();
    assert_eq!(transport.calls()[0], "list::Some(2):None");
    assert_eq!(transport.count_calls("list:"), 1);
    assert_eq!(transport.count_calls("get:c"), 0);
}

#[test]
fn test_no_cache_always_fetches() {
    for _ in 0..2 {
        let transport = MockTransport::with_pages(vec![vec!["T1"]])
            .thread(e2e_thread())
            .attachment("M1", "AT1", "ZnVsbC10ZXh0");
        let mut wrapper = GmailWrapper::new(transport, Box::new(NoCacheStrategy::new()));
        let threads = wrapper.query_threads(&ThreadQuery::new()).unwrap();

        assert_eq!(bodies(&threads)[0].1, "full-text");
        assert_eq!(wrapper.transport().count_calls("get:T1:full"), 1);
        assert_eq!(wrapper.transport().count_calls("attachment:"), 1);
    }
}

#[test]
fn test_empty_cached_thread_is_an_integrity_error() {
    let dir = TempDir::new().unwrap();
    let thread_dir = dir
        .path()
        .join("john_doe_example_com")
        .join("threads")
        .join("t1");
    std::fs::create_dir_all(&thread_dir).unwrap();
    std::fs::write(thread_dir.join("thread.json"), "{}").unwrap();
    std::fs::write(
        thread_dir.join("message_data"),
        r#"[{"message_id": "t1-m1", "message_date": "1700000000000"}]"#,
    )
    .unwrap();

    let transport = MockTransport::with_pages(vec![vec!["t1"]]).thread(plain_thread("t1", "aGVsbG8="));
    let mut wrapper = fs_wrapper(transport, dir.path());
    let err = wrapper
        .query_threads(&ThreadQuery::new().expect_one_message_per_thread(true))
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CacheError>(),
        Some(CacheError::EmptyCachedThread(id)) if id == "t1"
    ));
    assert_eq!(wrapper.transport().count_calls("get:"), 0);
}

#[test]
fn test_sanity_check_rejects_foreign_message() {
    let mut thread = e2e_thread();
    thread["messages"][0]["threadId"] = json!("OTHER");
    let transport = || {
        MockTransport::with_pages(vec![vec!["T1"]])
            .thread(thread.clone())
            .attachment("M1", "AT1", "ZnVsbC10ZXh0")
    };

    let mut wrapper = GmailWrapper::new(transport(), Box::new(NoCacheStrategy::new()));
    let err = wrapper.query_threads(&ThreadQuery::new()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConversionError>(),
        Some(ConversionError::ThreadIdMismatch { found, .. }) if found == "OTHER"
    ));

    let mut wrapper = GmailWrapper::new(transport(), Box::new(NoCacheStrategy::new()));
    let threads = wrapper
        .query_threads(&ThreadQuery::new().sanity_check(false))
        .unwrap();
    assert_eq!(bodies(&threads)[0].1, "full-text");
}

#[test]
fn test_undecodable_body_does_not_abort_query() {
    let transport = MockTransport::with_pages(vec![vec!["a", "b"]])
        .thread(plain_thread("a", "not-base64!!!"))
        .thread(plain_thread("b", "aGVsbG8="));
    let mut wrapper = GmailWrapper::new(transport, Box::new(NoCacheStrategy::new()));

    let threads = wrapper.query_threads(&ThreadQuery::new()).unwrap();

    let bodies: Vec<String> = bodies(&threads).into_iter().map(|(_, b)| b).collect();
    assert_eq!(bodies, vec!["not-base64!!!".to_string(), "hello".to_string()]);
}

#[test]
fn test_invalid_cache_config_fails_before_io() {
    let dir = TempDir::new().unwrap();
    let result = CacheConfig::new(CachingStrategyType::FileSystem, dir.path(), PROJECT, "");

    assert!(result.is_err());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_strategy_can_be_swapped() {
    let dir = TempDir::new().unwrap();
    let mut wrapper = GmailWrapper::new(e2e_transport(), Box::new(NoCacheStrategy::new()));
    wrapper.query_threads(&ThreadQuery::new()).unwrap();
    assert!(wrapper.fetching_context().get_cached_threads().is_empty());

    let fs_strategy = FileSystemEmailThreadCacheStrategy::new(dir.path(), PROJECT, EMAIL).unwrap();
    wrapper
        .fetching_context_mut()
        .set_caching_strategy(Box::new(fs_strategy));
    wrapper.query_threads(&ThreadQuery::new()).unwrap();

    assert_eq!(wrapper.fetching_context().get_cached_threads(), vec!["T1".to_string()]);
}
