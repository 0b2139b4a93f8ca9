//! Fetching context: the orchestrator's single entry point into caching

use anyhow::Result;
use serde_json::Value;

use super::{CacheResultItems, CachingStrategy};

/// Delegates every call to the active [`CachingStrategy`]
pub struct ApiFetchingContext {
    strategy: Box<dyn CachingStrategy>,
}

impl ApiFetchingContext {
    pub fn new(strategy: Box<dyn CachingStrategy>) -> Self {
        Self { strategy }
    }

    pub fn caching_strategy(&self) -> &dyn CachingStrategy {
        self.strategy.as_ref()
    }

    /// Swap the active strategy, returning the previous one
    pub fn set_caching_strategy(&mut self, strategy: Box<dyn CachingStrategy>) -> Box<dyn CachingStrategy> {
        std::mem::replace(&mut self.strategy, strategy)
    }

    pub fn process_thread(&mut self, thread_response: &Value) -> Result<()> {
        self.strategy.process_threads(thread_response)
    }

    pub fn get_cache_state_for_threads(
        &mut self,
        thread_ids: &[String],
        expect_one_message_per_thread: bool,
    ) -> Result<CacheResultItems> {
        self.strategy
            .get_cache_state_for_threads(thread_ids, expect_one_message_per_thread)
    }

    pub fn actualize_cache_state(
        &mut self,
        cache_state: &mut CacheResultItems,
        thread_id: &str,
        message_ids: &[String],
    ) -> Result<()> {
        self.strategy
            .actualize_cache_state(cache_state, thread_id, message_ids)
    }

    pub fn process_attachment_for_message(
        &mut self,
        thread_id: &str,
        message_id: &str,
        attachment_id: &str,
        attachment_response: &Value,
    ) -> Result<()> {
        self.strategy
            .process_attachment_for_message(thread_id, message_id, attachment_id, attachment_response)
    }

    pub fn get_cache_state_for_message(
        &mut self,
        thread_id: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<CacheResultItems> {
        self.strategy
            .get_cache_state_for_message(thread_id, message_id, attachment_id)
    }

    pub fn get_cached_threads(&self) -> Vec<String> {
        self.strategy.get_cached_threads()
    }

    pub fn print_actions_performed(&self) {
        self.strategy.print_actions_performed()
    }
}
