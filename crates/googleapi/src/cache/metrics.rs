//! Read/write accounting for cache operations

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;

use log::{info, trace};

/// Gmail API request kinds, used to group cache and request accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GmailRequestType {
    ThreadsList,
    ThreadsGet,
    Messages,
    Attachments,
}

impl GmailRequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GmailRequestType::ThreadsList => "threads_list",
            GmailRequestType::ThreadsGet => "threads_get",
            GmailRequestType::Messages => "messages",
            GmailRequestType::Attachments => "attachments",
        }
    }
}

impl fmt::Display for GmailRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Items and bytes moved to or from the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub items_written: u64,
    pub bytes_written: u64,
    pub items_read: u64,
    pub bytes_read: u64,
}

impl CacheMetrics {
    pub fn for_read(items: u64, bytes: u64) -> Self {
        Self {
            items_read: items,
            bytes_read: bytes,
            ..Self::default()
        }
    }

    pub fn for_write(items: u64, bytes: u64) -> Self {
        Self {
            items_written: items,
            bytes_written: bytes,
            ..Self::default()
        }
    }
}

impl Add for CacheMetrics {
    type Output = CacheMetrics;

    fn add(self, other: CacheMetrics) -> CacheMetrics {
        CacheMetrics {
            items_written: self.items_written + other.items_written,
            bytes_written: self.bytes_written + other.bytes_written,
            items_read: self.items_read + other.items_read,
            bytes_read: self.bytes_read + other.bytes_read,
        }
    }
}

impl fmt::Display for CacheMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheMetrics {{ items written: {}, bytes written: {}, items read: {}, bytes read: {} }}",
            self.items_written,
            format_bytes(self.bytes_written),
            self.items_read,
            format_bytes(self.bytes_read)
        )
    }
}

/// Latest and accumulated metrics per request type
#[derive(Debug, Default)]
pub struct CacheActionsPerformed {
    latest: BTreeMap<GmailRequestType, CacheMetrics>,
    sum: BTreeMap<GmailRequestType, CacheMetrics>,
}

impl CacheActionsPerformed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, request_type: GmailRequestType, metrics: CacheMetrics) {
        self.latest.insert(request_type, metrics);
        let total = self.sum.entry(request_type).or_default();
        *total = *total + metrics;
        trace!("Added cache metrics for {}: {}", request_type, metrics);
    }

    pub fn total(&self, request_type: GmailRequestType) -> CacheMetrics {
        self.sum.get(&request_type).copied().unwrap_or_default()
    }

    pub fn latest(&self, request_type: GmailRequestType) -> Option<CacheMetrics> {
        self.latest.get(&request_type).copied()
    }

    pub fn print_all(&self) {
        for (request_type, metrics) in &self.sum {
            info!("Sum cache metrics for {}: {}", request_type, metrics);
        }
    }
}

/// Human readable byte count (1024-based)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_accumulate_per_request_type() {
        let mut actions = CacheActionsPerformed::new();
        actions.add(GmailRequestType::ThreadsGet, CacheMetrics::for_write(2, 100));
        actions.add(GmailRequestType::ThreadsGet, CacheMetrics::for_write(1, 50));
        actions.add(GmailRequestType::Messages, CacheMetrics::for_read(3, 30));

        assert_eq!(actions.total(GmailRequestType::ThreadsGet), CacheMetrics::for_write(3, 150));
        assert_eq!(
            actions.latest(GmailRequestType::ThreadsGet),
            Some(CacheMetrics::for_write(1, 50))
        );
        assert_eq!(actions.total(GmailRequestType::Messages).items_read, 3);
        assert_eq!(actions.total(GmailRequestType::Attachments), CacheMetrics::default());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }
}
