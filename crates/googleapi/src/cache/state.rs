//! Per-request snapshot of cache coverage for a batch of item IDs

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde_json::Value;

use crate::error::CacheError;

/// How much of an item is available from the persisted cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemCacheState {
    NotCached,
    NotYetDetermined,
    PartiallyCached,
    FullyCached,
}

impl ItemCacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCacheState::NotCached => "not cached",
            ItemCacheState::NotYetDetermined => "cache level not yet determined",
            ItemCacheState::PartiallyCached => "partially cached",
            ItemCacheState::FullyCached => "fully cached",
        }
    }

    const ALL: [ItemCacheState; 4] = [
        ItemCacheState::FullyCached,
        ItemCacheState::PartiallyCached,
        ItemCacheState::NotCached,
        ItemCacheState::NotYetDetermined,
    ];
}

impl fmt::Display for ItemCacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of a batch. `data` is only populated for fully cached items.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedItem {
    pub id: String,
    pub data: Option<Value>,
    pub state: ItemCacheState,
}

impl CachedItem {
    fn new(id: String, data: Option<Value>, state: ItemCacheState) -> Self {
        Self { id, data, state }
    }
}

/// Cache coverage of a batch of requested items (threads or message attachments)
///
/// Every ID lives in exactly one of four buckets. The batch is built once per
/// operation (a thread-list page, a single attachment lookup) and dropped
/// afterwards; it is a computation result, not long-lived state.
#[derive(Debug, Clone)]
pub struct CacheResultItems {
    item_type: String,
    item_ids: Vec<String>,
    not_cached: BTreeMap<String, CachedItem>,
    partially_cached: BTreeMap<String, CachedItem>,
    not_yet_determined: BTreeMap<String, CachedItem>,
    fully_cached: BTreeMap<String, CachedItem>,
}

impl CacheResultItems {
    /// Create an empty batch for the requested `item_ids`.
    ///
    /// `item_type` is only used in error and log messages ("thread",
    /// "message attachment", ...).
    pub fn new<I, S>(item_ids: I, item_type: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            item_type: item_type.into(),
            item_ids: item_ids.into_iter().map(Into::into).collect(),
            not_cached: BTreeMap::new(),
            partially_cached: BTreeMap::new(),
            not_yet_determined: BTreeMap::new(),
            fully_cached: BTreeMap::new(),
        }
    }

    pub fn add_not_cached<I, S>(mut self, item_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in item_ids {
            self.place(CachedItem::new(id.into(), None, ItemCacheState::NotCached));
        }
        self
    }

    pub fn add_partially_cached<I, S>(mut self, item_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in item_ids {
            self.place(CachedItem::new(id.into(), None, ItemCacheState::PartiallyCached));
        }
        self
    }

    pub fn add_not_yet_determined<I, S>(mut self, item_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in item_ids {
            self.place(CachedItem::new(id.into(), None, ItemCacheState::NotYetDetermined));
        }
        self
    }

    pub fn add_fully_cached<I>(mut self, items_with_data: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (id, data) in items_with_data {
            self.place(CachedItem::new(id, Some(data), ItemCacheState::FullyCached));
        }
        self
    }

    /// Move `item_id` from not cached / not yet determined to partially cached
    pub fn mark_partially_cached(&mut self, item_id: &str) -> Result<(), CacheError> {
        let previous = self.transitionable_state(item_id)?;
        self.bucket_mut(previous).remove(item_id);
        self.partially_cached.insert(
            item_id.to_string(),
            CachedItem::new(item_id.to_string(), None, ItemCacheState::PartiallyCached),
        );
        Ok(())
    }

    /// Move `item_id` from not cached / not yet determined to fully cached
    pub fn mark_fully_cached(&mut self, item_id: &str, data: Value) -> Result<(), CacheError> {
        let previous = self.transitionable_state(item_id)?;
        self.bucket_mut(previous).remove(item_id);
        self.fully_cached.insert(
            item_id.to_string(),
            CachedItem::new(item_id.to_string(), Some(data), ItemCacheState::FullyCached),
        );
        Ok(())
    }

    pub fn are_all_fully_cached(&self) -> bool {
        self.not_cached.is_empty() && self.partially_cached.is_empty() && self.not_yet_determined.is_empty()
    }

    pub fn is_fully_cached(&self, item_id: &str) -> bool {
        self.fully_cached.contains_key(item_id)
    }

    /// Data stored for a fully cached item
    pub fn get_data_for_item(&self, item_id: &str) -> Result<&Value, CacheError> {
        self.fully_cached
            .get(item_id)
            .and_then(|item| item.data.as_ref())
            .ok_or_else(|| CacheError::NotFullyCached {
                item_type: self.item_type.clone(),
                id: item_id.to_string(),
                state: self.state_of(item_id),
            })
    }

    /// Bucket the item currently lives in, if any
    pub fn state_of(&self, item_id: &str) -> Option<ItemCacheState> {
        ItemCacheState::ALL
            .into_iter()
            .find(|state| self.bucket(*state).contains_key(item_id))
    }

    /// Number of items per state
    pub fn get_status_dict(&self) -> BTreeMap<ItemCacheState, usize> {
        ItemCacheState::ALL
            .into_iter()
            .map(|state| (state, self.bucket(state).len()))
            .collect()
    }

    /// Item IDs per state
    pub fn get_status_ids(&self) -> BTreeMap<ItemCacheState, Vec<String>> {
        ItemCacheState::ALL
            .into_iter()
            .map(|state| (state, self.bucket(state).keys().cloned().collect()))
            .collect()
    }

    /// Requested items that are in any state other than "not cached".
    ///
    /// Items added to the batch that were not part of the initial request
    /// are ignored.
    pub fn get_no_of_any_cached_for_items(&self) -> usize {
        let requested: HashSet<&str> = self.item_ids.iter().map(String::as_str).collect();
        [&self.fully_cached, &self.partially_cached, &self.not_yet_determined]
            .into_iter()
            .flat_map(|bucket| bucket.keys())
            .filter(|id| requested.contains(id.as_str()))
            .count()
    }

    /// Every item in any state other than "not cached", requested or not
    pub fn get_no_of_any_cached_all(&self) -> usize {
        self.fully_cached.len() + self.partially_cached.len() + self.not_yet_determined.len()
    }

    pub fn item_ids(&self) -> &[String] {
        &self.item_ids
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    pub fn not_cached_ids(&self) -> impl Iterator<Item = &String> {
        self.not_cached.keys()
    }

    pub fn partially_cached_ids(&self) -> impl Iterator<Item = &String> {
        self.partially_cached.keys()
    }

    pub fn not_yet_determined_ids(&self) -> impl Iterator<Item = &String> {
        self.not_yet_determined.keys()
    }

    pub fn fully_cached_ids(&self) -> impl Iterator<Item = &String> {
        self.fully_cached.keys()
    }

    /// Insert keeping the buckets disjoint
    fn place(&mut self, item: CachedItem) {
        for state in ItemCacheState::ALL {
            self.bucket_mut(state).remove(&item.id);
        }
        let state = item.state;
        self.bucket_mut(state).insert(item.id.clone(), item);
    }

    /// Work out which of the two legal source buckets holds `item_id`
    fn transitionable_state(&self, item_id: &str) -> Result<ItemCacheState, CacheError> {
        let not_cached = self.not_cached.contains_key(item_id);
        let not_yet_determined = self.not_yet_determined.contains_key(item_id);

        debug_assert!(
            !(not_cached && not_yet_determined),
            "{} {} is in two buckets",
            self.item_type,
            item_id
        );
        match (not_cached, not_yet_determined) {
            (true, false) => Ok(ItemCacheState::NotCached),
            (false, true) => Ok(ItemCacheState::NotYetDetermined),
            (false, false) => Err(CacheError::NotTransitionable {
                item_type: self.item_type.clone(),
                id: item_id.to_string(),
            }),
            // Unreachable while `place` keeps the buckets disjoint
            (true, true) => Err(CacheError::AmbiguousState {
                item_type: self.item_type.clone(),
                id: item_id.to_string(),
            }),
        }
    }

    fn bucket(&self, state: ItemCacheState) -> &BTreeMap<String, CachedItem> {
        match state {
            ItemCacheState::NotCached => &self.not_cached,
            ItemCacheState::NotYetDetermined => &self.not_yet_determined,
            ItemCacheState::PartiallyCached => &self.partially_cached,
            ItemCacheState::FullyCached => &self.fully_cached,
        }
    }

    fn bucket_mut(&mut self, state: ItemCacheState) -> &mut BTreeMap<String, CachedItem> {
        match state {
            ItemCacheState::NotCached => &mut self.not_cached,
            ItemCacheState::NotYetDetermined => &mut self.not_yet_determined,
            ItemCacheState::PartiallyCached => &mut self.partially_cached,
            ItemCacheState::FullyCached => &mut self.fully_cached,
        }
    }
}
