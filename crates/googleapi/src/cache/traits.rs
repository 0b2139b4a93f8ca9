//! Caching strategy trait definition

use anyhow::Result;
use serde_json::Value;

use super::CacheResultItems;

/// Operations every Gmail caching algorithm provides
///
/// Payloads are the raw JSON documents returned by the Gmail API, persisted
/// verbatim so a cache hit can go through the same conversion path as a live
/// response.
pub trait CachingStrategy {
    /// Build the in-memory index from persisted data. Called once at construction.
    fn fill_cache(&mut self) -> Result<()>;

    /// Persist a full-format thread response
    fn process_threads(&mut self, thread_response: &Value) -> Result<()>;

    /// Classify `thread_ids` by cache coverage.
    ///
    /// With `expect_one_message_per_thread`, a known thread is trusted to be
    /// complete; otherwise it stays "not yet determined" until
    /// [`actualize_cache_state`](Self::actualize_cache_state) compares it with
    /// the live message list.
    fn get_cache_state_for_threads(
        &mut self,
        thread_ids: &[String],
        expect_one_message_per_thread: bool,
    ) -> Result<CacheResultItems>;

    /// Resolve a not-yet-determined thread against its live message IDs
    fn actualize_cache_state(
        &mut self,
        cache_state: &mut CacheResultItems,
        thread_id: &str,
        message_ids: &[String],
    ) -> Result<()>;

    /// Persist an attachment response for a message
    fn process_attachment_for_message(
        &mut self,
        thread_id: &str,
        message_id: &str,
        attachment_id: &str,
        attachment_response: &Value,
    ) -> Result<()>;

    /// Coverage of a single attachment, as a batch keyed by message ID
    fn get_cache_state_for_message(
        &mut self,
        thread_id: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<CacheResultItems>;

    /// IDs of all threads present in the cache
    fn get_cached_threads(&self) -> Vec<String>;

    /// Log accumulated cache activity
    fn print_actions_performed(&self);
}
