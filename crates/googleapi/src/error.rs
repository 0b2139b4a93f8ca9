//! Typed errors that callers may want to match on
//!
//! Everything else travels as `anyhow::Error` with context attached at the
//! I/O or HTTP boundary where it happened.

use crate::cache::ItemCacheState;

/// Bookkeeping between the persisted cache and its in-memory index has drifted,
/// or a cache-state batch was driven through an illegal transition.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(
        "{item_type} with ID '{id}' should be in the not yet determined or not cached collection \
         of {item_type}s but it wasn't in any of these"
    )]
    NotTransitionable { item_type: String, id: String },

    #[error(
        "{item_type} with ID '{id}' is in both the not yet determined and the not cached \
         collection of {item_type}s but should be only in one of these"
    )]
    AmbiguousState { item_type: String, id: String },

    #[error("Can't get data from a non-fully cached {item_type}. ID: {id}, state: {state:?}")]
    NotFullyCached {
        item_type: String,
        id: String,
        state: Option<ItemCacheState>,
    },

    #[error("Thread '{0}' is marked fully cached but its persisted data is empty")]
    EmptyCachedThread(String),

    #[error("Thread '{0}' is not in the cache index")]
    UnknownThread(String),
}

/// Missing or invalid settings, detected before any network or disk activity
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Must define output basedir")]
    MissingOutputBasedir,

    #[error("Both project name and user email should be set (project: {project:?}, email: {email:?})")]
    MissingAccountIdentity { project: String, email: String },
}

/// A converted thread does not agree with itself
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Thread '{thread_id}' contains a message part that belongs to thread '{found}'")]
    ThreadIdMismatch { thread_id: String, found: String },

    #[error("Gmail response has no '{0}' field")]
    MissingField(&'static str),
}
