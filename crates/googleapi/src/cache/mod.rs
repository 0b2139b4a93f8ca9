//! Gmail caching layer
//!
//! A [`CachingStrategy`] decides which threads, messages and attachments can
//! be served from persisted data. The orchestrator only talks to it through
//! [`ApiFetchingContext`].

mod context;
mod filesystem;
mod metrics;
mod no_cache;
mod state;
mod traits;

use std::path::Path;

use anyhow::Result;

pub use context::ApiFetchingContext;
pub use filesystem::{FileSystemEmailThreadCacheStrategy, MessageData};
pub use metrics::{CacheActionsPerformed, CacheMetrics, GmailRequestType, format_bytes};
pub use no_cache::NoCacheStrategy;
pub use state::{CacheResultItems, CachedItem, ItemCacheState};
pub use traits::CachingStrategy;

/// Which caching strategy backs a wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachingStrategyType {
    #[default]
    NoCache,
    FileSystem,
}

impl CachingStrategyType {
    /// Construct the strategy. The filesystem variant scans its directory immediately.
    pub fn build(
        self,
        output_basedir: &Path,
        project_name: &str,
        user_email: &str,
    ) -> Result<Box<dyn CachingStrategy>> {
        Ok(match self {
            CachingStrategyType::NoCache => Box::new(NoCacheStrategy::new()),
            CachingStrategyType::FileSystem => Box::new(FileSystemEmailThreadCacheStrategy::new(
                output_basedir,
                project_name,
                user_email,
            )?),
        })
    }
}

impl std::str::FromStr for CachingStrategyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "no_cache" | "nocache" => Ok(CachingStrategyType::NoCache),
            "fs" | "filesystem" | "file_system" => Ok(CachingStrategyType::FileSystem),
            other => anyhow::bail!("Unknown caching strategy: {}", other),
        }
    }
}
