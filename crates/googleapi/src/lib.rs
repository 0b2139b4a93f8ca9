//! googleapi - typed wrappers around Google APIs
//!
//! This crate provides:
//! - OAuth2 authorization for Google services
//! - Gmail thread fetching with decoded message bodies
//! - An optional filesystem cache for threads and attachments
//! - A thin Calendar client

pub mod auth;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod error;
pub mod gmail;
pub mod models;

pub use auth::{AuthedSession, GoogleApiAuthorizer, ServiceType};
pub use cache::{
    ApiFetchingContext, CacheResultItems, CachedItem, CachingStrategy, CachingStrategyType,
    FileSystemEmailThreadCacheStrategy, ItemCacheState, NoCacheStrategy,
};
pub use calendar::{CalendarClient, CalendarEvent, EventTime};
pub use config::{CacheConfig, GoogleCredentials, convert_email_address_to_dirname};
pub use error::{CacheError, ConfigError, ConversionError};
pub use gmail::{GmailClient, GmailTransport, GmailWrapper, RequestStats, ThreadQuery, ThreadQueryFormat};
pub use models::{
    GmailMessage, GmailMessageBodyPart, GmailThread, GmailThreads, Message, MessageId, MessagePart,
    MimeType, Thread, ThreadId,
};
