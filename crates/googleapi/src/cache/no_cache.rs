//! Strategy that never caches anything

use anyhow::Result;
use log::{debug, info};
use serde_json::Value;

use super::{CacheResultItems, CachingStrategy};

/// Reports every item as not cached and discards writes.
///
/// Keeps the fetch loop identical whether or not caching is enabled.
#[derive(Debug, Default)]
pub struct NoCacheStrategy;

impl NoCacheStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl CachingStrategy for NoCacheStrategy {
    fn fill_cache(&mut self) -> Result<()> {
        debug!("Invoked fill_cache of NoCacheStrategy");
        Ok(())
    }

    fn process_threads(&mut self, _thread_response: &Value) -> Result<()> {
        debug!("Invoked process_threads of NoCacheStrategy with an email thread");
        Ok(())
    }

    fn get_cache_state_for_threads(
        &mut self,
        thread_ids: &[String],
        _expect_one_message_per_thread: bool,
    ) -> Result<CacheResultItems> {
        Ok(CacheResultItems::new(thread_ids.iter().cloned(), "thread")
            .add_not_cached(thread_ids.iter().cloned()))
    }

    fn actualize_cache_state(
        &mut self,
        _cache_state: &mut CacheResultItems,
        thread_id: &str,
        _message_ids: &[String],
    ) -> Result<()> {
        debug!("Invoked actualize_cache_state of NoCacheStrategy for thread {}", thread_id);
        Ok(())
    }

    fn process_attachment_for_message(
        &mut self,
        _thread_id: &str,
        _message_id: &str,
        _attachment_id: &str,
        _attachment_response: &Value,
    ) -> Result<()> {
        debug!("Invoked process_attachment_for_message of NoCacheStrategy with an email attachment");
        Ok(())
    }

    fn get_cache_state_for_message(
        &mut self,
        _thread_id: &str,
        message_id: &str,
        _attachment_id: &str,
    ) -> Result<CacheResultItems> {
        Ok(CacheResultItems::new([message_id], "message attachment").add_not_cached([message_id]))
    }

    fn get_cached_threads(&self) -> Vec<String> {
        Vec::new()
    }

    fn print_actions_performed(&self) {
        info!("No cache actions were performed");
    }
}
