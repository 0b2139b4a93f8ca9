//! Cache-aware thread fetching
//!
//! [`GmailWrapper::query_threads`] pages through `threads.list`, and for every
//! thread asks the active caching strategy whether the full payload can be
//! served locally before falling back to the live API. Parts whose body lives
//! in a separate attachment are backfilled the same way.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use super::api::{AttachmentResponse, MinimalThread};
use super::convert::{ApiConversionContext, ApiItemType, MessagePartDescriptor, decode_base64_body};
use super::{GmailClient, GmailTransport, ThreadQueryFormat};
use crate::auth::{AuthedSession, GoogleApiAuthorizer};
use crate::cache::{
    ApiFetchingContext, CacheResultItems, CachingStrategy, CachingStrategyType, GmailRequestType,
    ItemCacheState,
};
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::models::GmailThreads;

/// Page size the Gmail API uses when `maxResults` is not sent
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Parameters of one [`GmailWrapper::query_threads`] call
#[derive(Debug, Clone)]
pub struct ThreadQuery {
    /// Gmail search query (`q` parameter)
    pub query: Option<String>,
    /// Maximum number of threads to process
    pub limit: Option<usize>,
    /// Trust a cached thread without comparing its message list with the live one
    pub expect_one_message_per_thread: bool,
    pub sanity_check: bool,
}

impl Default for ThreadQuery {
    fn default() -> Self {
        Self {
            query: None,
            limit: None,
            expect_one_message_per_thread: false,
            sanity_check: true,
        }
    }
}

impl ThreadQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn expect_one_message_per_thread(mut self, value: bool) -> Self {
        self.expect_one_message_per_thread = value;
        self
    }

    pub fn sanity_check(mut self, value: bool) -> Self {
        self.sanity_check = value;
        self
    }

    /// `maxResults` to send, only when the limit fits in a single default page
    fn max_results(&self) -> Option<usize> {
        self.limit.filter(|&limit| limit > 0 && limit < DEFAULT_PAGE_SIZE)
    }
}

/// Live API calls made during the last query, per request type
#[derive(Debug, Clone, Default)]
pub struct RequestStats {
    requests: BTreeMap<GmailRequestType, usize>,
    items: BTreeMap<GmailRequestType, usize>,
}

impl RequestStats {
    pub fn record(&mut self, request_type: GmailRequestType, items: usize) {
        *self.requests.entry(request_type).or_default() += 1;
        *self.items.entry(request_type).or_default() += items;
    }

    pub fn requests(&self, request_type: GmailRequestType) -> usize {
        self.requests.get(&request_type).copied().unwrap_or(0)
    }

    pub fn items(&self, request_type: GmailRequestType) -> usize {
        self.items.get(&request_type).copied().unwrap_or(0)
    }

    pub fn log_summary(&self) {
        for request_type in [
            GmailRequestType::ThreadsList,
            GmailRequestType::ThreadsGet,
            GmailRequestType::Attachments,
        ] {
            info!(
                "API requests [{}]: {} requests, {} items",
                request_type,
                self.requests(request_type),
                self.items(request_type)
            );
        }
    }
}

/// Gmail thread access backed by a caching strategy
pub struct GmailWrapper<T: GmailTransport> {
    transport: T,
    fetching_context: ApiFetchingContext,
    request_stats: RequestStats,
}

impl<T: GmailTransport> GmailWrapper<T> {
    pub fn new(transport: T, strategy: Box<dyn CachingStrategy>) -> Self {
        Self {
            transport,
            fetching_context: ApiFetchingContext::new(strategy),
            request_stats: RequestStats::default(),
        }
    }

    pub fn with_cache_config(transport: T, cache_config: &CacheConfig) -> Result<Self> {
        Ok(Self::new(transport, cache_config.build_strategy()?))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn fetching_context(&self) -> &ApiFetchingContext {
        &self.fetching_context
    }

    pub fn fetching_context_mut(&mut self) -> &mut ApiFetchingContext {
        &mut self.fetching_context
    }

    pub fn request_stats(&self) -> &RequestStats {
        &self.request_stats
    }

    /// Fetch and convert threads matching `query`.
    ///
    /// Once more threads were processed than `query.limit`, the threads
    /// collected so far are returned.
    pub fn query_threads(&mut self, query: &ThreadQuery) -> Result<GmailThreads> {
        let mut ctx = ApiConversionContext::new(ApiItemType::Thread, query.limit);
        let mut threads = GmailThreads::default();
        let mut page_token: Option<String> = None;
        self.request_stats = RequestStats::default();

        'pages: loop {
            let response = self.transport.list_threads(
                query.query.as_deref(),
                query.max_results(),
                page_token.as_deref(),
            )?;
            ctx.progress.incr_requests();
            ctx.progress.register_new_items(response.threads.len(), true);
            self.request_stats
                .record(GmailRequestType::ThreadsList, response.threads.len());

            let thread_ids: Vec<String> = response.threads.iter().map(|t| t.id.clone()).collect();
            let mut cache_state = self
                .fetching_context
                .get_cache_state_for_threads(&thread_ids, query.expect_one_message_per_thread)?;
            debug!("Cache state of page: {:?}", cache_state.get_status_dict());

            for thread_id in &thread_ids {
                ctx.progress.incr_processed_items();
                if ctx.progress.is_limit_reached() {
                    warn!("Reached limit, stop processing more items.");
                    break 'pages;
                }
                ctx.progress.print_processing_items();

                let thread_response = self.fetch_thread(&mut cache_state, thread_id)?;
                let mut thread = ctx
                    .convert_thread(&thread_response)
                    .with_context(|| format!("Failed to convert thread {}", thread_id))?;

                if query.sanity_check {
                    ctx.check_thread_consistency(&thread.api_id)?;
                }

                let cache_thread_id = thread.api_id.as_str().to_string();
                ctx.handle_empty_bodies(&mut thread, |descriptor| {
                    self.resolve_empty_body(&cache_thread_id, descriptor)
                })?;
                threads.add(thread);
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let decode_errors = ctx.handle_encoding_errors();
        if decode_errors > 0 {
            warn!("{} message parts could not be decoded", decode_errors);
        }
        self.fetching_context.print_actions_performed();
        self.request_stats.log_summary();
        info!("Received {} threads", threads.len());

        Ok(threads)
    }

    /// Full-format payload of a thread, from the cache or the live API
    fn fetch_thread(&mut self, cache_state: &mut CacheResultItems, thread_id: &str) -> Result<Value> {
        if cache_state.state_of(thread_id) == Some(ItemCacheState::NotYetDetermined) {
            let live = self.transport.get_thread(thread_id, ThreadQueryFormat::Minimal)?;
            self.request_stats.record(GmailRequestType::ThreadsGet, 1);
            let live = MinimalThread::deserialize(&live)
                .with_context(|| format!("Failed to parse minimal thread {}", thread_id))?;
            let message_ids: Vec<String> = live.messages.into_iter().map(|m| m.id).collect();
            self.fetching_context
                .actualize_cache_state(cache_state, thread_id, &message_ids)?;
        }

        if cache_state.is_fully_cached(thread_id) {
            let data = cache_state.get_data_for_item(thread_id)?;
            if is_empty_payload(data) {
                return Err(CacheError::EmptyCachedThread(thread_id.to_string()).into());
            }
            debug!("Thread {} served from cache", thread_id);
            return Ok(data.clone());
        }

        let response = self.transport.get_thread(thread_id, ThreadQueryFormat::Full)?;
        self.request_stats.record(GmailRequestType::ThreadsGet, 1);
        self.fetching_context.process_thread(&response)?;
        Ok(response)
    }

    /// Content of an empty body part, taken from its attachment
    fn resolve_empty_body(
        &mut self,
        thread_id: &str,
        descriptor: &MessagePartDescriptor,
    ) -> Result<Option<String>> {
        let Some(attachment_id) = descriptor.attachment_id.as_deref() else {
            debug!(
                "Part {:?} of message {} has neither data nor attachment ID",
                descriptor.part_id,
                descriptor.message_id.as_str()
            );
            return Ok(None);
        };
        let message_id = descriptor.message_id.as_str();

        let cache_state = self
            .fetching_context
            .get_cache_state_for_message(thread_id, message_id, attachment_id)?;
        let attachment = if cache_state.is_fully_cached(message_id) {
            cache_state.get_data_for_item(message_id)?.clone()
        } else {
            let response = self.transport.get_attachment(message_id, attachment_id)?;
            self.request_stats.record(GmailRequestType::Attachments, 1);
            self.fetching_context.process_attachment_for_message(
                thread_id,
                message_id,
                attachment_id,
                &response,
            )?;
            response
        };

        let attachment = AttachmentResponse::deserialize(&attachment)
            .with_context(|| format!("Failed to parse attachment of message {}", message_id))?;
        match attachment.data.as_deref() {
            Some(data) if !data.is_empty() => Ok(Some(decode_base64_body(data).unwrap_or_else(|| {
                warn!("Failed to decode attachment of message {}, keeping original data", message_id);
                data.to_string()
            }))),
            _ => {
                warn!("Attachment of message {} has no data, body stays empty", message_id);
                Ok(None)
            }
        }
    }
}

impl GmailWrapper<GmailClient> {
    /// Wrapper for an authorized account, caching under the account's directory
    pub fn from_session(
        authorizer: GoogleApiAuthorizer,
        session: &AuthedSession,
        strategy: CachingStrategyType,
        output_basedir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let cache_config = CacheConfig::new(
            strategy,
            output_basedir,
            session.project_name.clone(),
            session.user_email.clone(),
        )?;
        info!(
            "Using {:?} cache for {} in {}",
            strategy,
            session.user_email,
            cache_config.account_dir().display()
        );
        Self::with_cache_config(GmailClient::new(authorizer), &cache_config)
    }
}

fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thread_query_defaults() {
        let query = ThreadQuery::new();
        assert!(query.sanity_check);
        assert!(!query.expect_one_message_per_thread);
        assert_eq!(query.max_results(), None);
    }

    #[test]
    fn test_max_results_only_below_page_size() {
        assert_eq!(ThreadQuery::new().limit(5).max_results(), Some(5));
        assert_eq!(ThreadQuery::new().limit(DEFAULT_PAGE_SIZE).max_results(), None);
        assert_eq!(ThreadQuery::new().limit(250).max_results(), None);
    }

    #[test]
    fn test_request_stats() {
        let mut stats = RequestStats::default();
        stats.record(GmailRequestType::ThreadsList, 3);
        stats.record(GmailRequestType::ThreadsList, 2);
        stats.record(GmailRequestType::Attachments, 1);

        assert_eq!(stats.requests(GmailRequestType::ThreadsList), 2);
        assert_eq!(stats.items(GmailRequestType::ThreadsList), 5);
        assert_eq!(stats.requests(GmailRequestType::ThreadsGet), 0);
    }

    #[test]
    fn test_empty_payload_detection() {
        assert!(is_empty_payload(&Value::Null));
        assert!(is_empty_payload(&json!({})));
        assert!(!is_empty_payload(&json!({"id": "t1"})));
    }
}
