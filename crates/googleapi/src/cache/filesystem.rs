//! Filesystem-backed Gmail cache
//!
//! Directory structure:
//! ```text
//! <output_basedir>/
//!   john_doe_gmail_com/
//!     threads/
//!       17a2b3c4d5e6f708/
//!         thread.json            # raw full-format thread response
//!         message_data           # [{"message_id": .., "message_date": ..}]
//!         messages/
//!           message_17a2b3c4d5e6f708_attachment_<sha256 of attachment id>.txt
//! ```
//!
//! Only the compact `message_data` documents are loaded at startup. Full
//! thread payloads are read on demand when a thread turns out to be fully
//! cached.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::metrics::{CacheActionsPerformed, CacheMetrics, GmailRequestType};
use super::{CacheResultItems, CachingStrategy};
use crate::config::{convert_email_address_to_dirname, validate_cache_settings};
use crate::error::{CacheError, ConversionError};

const THREADS_DIR_NAME: &str = "threads";
const MESSAGES_DIR_NAME: &str = "messages";
const THREAD_JSON_FILENAME: &str = "thread.json";
const MESSAGE_DATA_FILENAME: &str = "message_data";

/// One entry of a thread's `message_data` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    pub message_id: String,
    pub message_date: String,
}

/// (thread ID, message ID, attachment ID)
type AttachmentKey = (String, String, String);

/// Caching strategy that persists raw API responses as JSON files
pub struct FileSystemEmailThreadCacheStrategy {
    threads_dir: PathBuf,
    cached_thread_ids: BTreeSet<String>,
    /// Thread ID -> (message ID -> message date)
    thread_to_message_data: HashMap<String, BTreeMap<String, String>>,
    cached_message_attachments: HashSet<AttachmentKey>,
    unknown_messages_per_thread: HashMap<String, BTreeSet<String>>,
    actions: CacheActionsPerformed,
}

impl FileSystemEmailThreadCacheStrategy {
    /// Create the strategy and scan any previously persisted threads.
    ///
    /// Settings are validated before the filesystem is touched.
    pub fn new(output_basedir: impl AsRef<Path>, project_name: &str, user_email: &str) -> Result<Self> {
        let output_basedir = output_basedir.as_ref();
        validate_cache_settings(output_basedir, project_name, user_email)?;

        let account_dir = output_basedir.join(convert_email_address_to_dirname(user_email));
        let threads_dir = account_dir.join(THREADS_DIR_NAME);
        fs::create_dir_all(&threads_dir)
            .with_context(|| format!("Failed to create threads directory: {}", threads_dir.display()))?;

        let mut strategy = Self {
            threads_dir,
            cached_thread_ids: BTreeSet::new(),
            thread_to_message_data: HashMap::new(),
            cached_message_attachments: HashSet::new(),
            unknown_messages_per_thread: HashMap::new(),
            actions: CacheActionsPerformed::new(),
        };
        strategy.fill_cache()?;
        Ok(strategy)
    }

    pub fn threads_dir(&self) -> &Path {
        &self.threads_dir
    }

    pub fn thread_dir(&self, thread_id: &str) -> PathBuf {
        self.threads_dir.join(thread_id)
    }

    pub fn thread_json_path(&self, thread_id: &str) -> PathBuf {
        self.thread_dir(thread_id).join(THREAD_JSON_FILENAME)
    }

    pub fn message_data_path(&self, thread_id: &str) -> PathBuf {
        self.thread_dir(thread_id).join(MESSAGE_DATA_FILENAME)
    }

    /// File an attachment of a message is persisted to
    pub fn attachment_path(&self, thread_id: &str, message_id: &str, attachment_id: &str) -> PathBuf {
        self.thread_dir(thread_id)
            .join(MESSAGES_DIR_NAME)
            .join(attachment_filename(message_id, attachment_id))
    }

    /// Cached message IDs of a thread, as loaded at startup or written since
    pub fn cached_message_ids(&self, thread_id: &str) -> Vec<String> {
        self.thread_to_message_data
            .get(thread_id)
            .map(|messages| messages.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Message IDs seen live but missing from the cache at the last actualization
    pub fn unknown_messages(&self, thread_id: &str) -> Option<&BTreeSet<String>> {
        self.unknown_messages_per_thread.get(thread_id)
    }

    pub fn actions(&self) -> &CacheActionsPerformed {
        &self.actions
    }

    fn load_message_data(&mut self, thread_id: &str) -> Result<CacheMetrics> {
        let (value, metrics) = read_json(&self.message_data_path(thread_id))?;
        let message_data: Vec<MessageData> = serde_json::from_value(value)
            .with_context(|| format!("Malformed message data for thread {}", thread_id))?;
        self.thread_to_message_data.insert(
            thread_id.to_string(),
            message_data
                .into_iter()
                .map(|m| (m.message_id, m.message_date))
                .collect(),
        );
        Ok(metrics)
    }

    /// Caution: loads the whole thread including message payloads
    fn load_thread(&mut self, thread_id: &str) -> Result<Value> {
        if !self.cached_thread_ids.contains(thread_id) {
            return Err(CacheError::UnknownThread(thread_id.to_string()).into());
        }
        let (data, metrics) = read_json(&self.thread_json_path(thread_id))?;
        self.actions.add(GmailRequestType::ThreadsGet, metrics);
        Ok(data)
    }
}

impl CachingStrategy for FileSystemEmailThreadCacheStrategy {
    fn fill_cache(&mut self) -> Result<()> {
        let entries = fs::read_dir(&self.threads_dir)
            .with_context(|| format!("Failed to scan threads directory: {}", self.threads_dir.display()))?;

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(thread_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            match self.load_message_data(&thread_id) {
                Ok(metrics) => {
                    self.cached_thread_ids.insert(thread_id);
                    self.actions.add(GmailRequestType::Messages, metrics);
                }
                Err(e) => warn!("Ignoring cached thread {}: {:#}", thread_id, e),
            }
        }

        debug!(
            "Loaded message data for {} cached threads from {}",
            self.cached_thread_ids.len(),
            self.threads_dir.display()
        );
        trace!("Loaded message data: {:?}", self.thread_to_message_data);
        Ok(())
    }

    fn process_threads(&mut self, thread_response: &Value) -> Result<()> {
        let thread_id = thread_response
            .get("id")
            .and_then(Value::as_str)
            .ok_or(ConversionError::MissingField("id"))?
            .to_string();
        let message_data = message_data_of(thread_response);

        let thread_dir = self.thread_dir(&thread_id);
        fs::create_dir_all(&thread_dir)
            .with_context(|| format!("Failed to create thread directory: {}", thread_dir.display()))?;

        let thread_metrics = write_json(&self.thread_json_path(&thread_id), thread_response)?;
        let message_metrics = write_json(&self.message_data_path(&thread_id), &message_data)?;
        self.actions
            .add(GmailRequestType::ThreadsGet, thread_metrics + message_metrics);

        self.thread_to_message_data.insert(
            thread_id.clone(),
            message_data
                .into_iter()
                .map(|m| (m.message_id, m.message_date))
                .collect(),
        );
        self.unknown_messages_per_thread.remove(&thread_id);
        self.cached_thread_ids.insert(thread_id);
        Ok(())
    }

    fn get_cache_state_for_threads(
        &mut self,
        thread_ids: &[String],
        expect_one_message_per_thread: bool,
    ) -> Result<CacheResultItems> {
        let (known, unknown): (Vec<&String>, Vec<&String>) = thread_ids
            .iter()
            .partition(|id| self.cached_thread_ids.contains(id.as_str()));
        let mut not_cached: Vec<String> = unknown.into_iter().cloned().collect();

        if !expect_one_message_per_thread {
            // Known threads may have received new messages since they were cached
            return Ok(CacheResultItems::new(thread_ids.iter().cloned(), "thread")
                .add_not_yet_determined(known.into_iter().cloned())
                .add_not_cached(not_cached));
        }

        let mut fully_cached = Vec::with_capacity(known.len());
        for thread_id in known {
            let path = self.thread_json_path(thread_id);
            match read_json(&path) {
                Ok((data, metrics)) => {
                    self.actions.add(GmailRequestType::ThreadsGet, metrics);
                    fully_cached.push((thread_id.clone(), data));
                }
                Err(e) => {
                    warn!(
                        "Cannot open file for thread {}, adding it to not cached threads: {:#}",
                        thread_id, e
                    );
                    not_cached.push(thread_id.clone());
                }
            }
        }

        Ok(CacheResultItems::new(thread_ids.iter().cloned(), "thread")
            .add_not_cached(not_cached)
            .add_fully_cached(fully_cached))
    }

    fn actualize_cache_state(
        &mut self,
        cache_state: &mut CacheResultItems,
        thread_id: &str,
        message_ids: &[String],
    ) -> Result<()> {
        let cached = self.thread_to_message_data.get(thread_id);
        let unknown: BTreeSet<String> = message_ids
            .iter()
            .filter(|id| !cached.is_some_and(|messages| messages.contains_key(id.as_str())))
            .cloned()
            .collect();

        let has_unknown = !unknown.is_empty();
        if has_unknown {
            debug!("Thread {} has {} messages not in cache", thread_id, unknown.len());
        }
        self.unknown_messages_per_thread
            .insert(thread_id.to_string(), unknown);

        if has_unknown {
            cache_state.mark_partially_cached(thread_id)?;
            return Ok(());
        }

        // Unreadable payload: refetch, as on the fast path
        match self.load_thread(thread_id) {
            Ok(data) => cache_state.mark_fully_cached(thread_id, data)?,
            Err(e) => {
                warn!(
                    "Cannot open file for thread {}, fetching it again: {:#}",
                    thread_id, e
                );
                cache_state.mark_partially_cached(thread_id)?;
            }
        }
        Ok(())
    }

    fn process_attachment_for_message(
        &mut self,
        thread_id: &str,
        message_id: &str,
        attachment_id: &str,
        attachment_response: &Value,
    ) -> Result<()> {
        let path = self.attachment_path(thread_id, message_id, attachment_id);
        if let Some(messages_dir) = path.parent() {
            fs::create_dir_all(messages_dir).with_context(|| {
                format!("Failed to create messages directory: {}", messages_dir.display())
            })?;
        }

        let metrics = write_json(&path, attachment_response)?;
        self.actions.add(GmailRequestType::Attachments, metrics);
        self.cached_message_attachments.insert((
            thread_id.to_string(),
            message_id.to_string(),
            attachment_id.to_string(),
        ));
        Ok(())
    }

    fn get_cache_state_for_message(
        &mut self,
        thread_id: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<CacheResultItems> {
        let key = (
            thread_id.to_string(),
            message_id.to_string(),
            attachment_id.to_string(),
        );
        let path = self.attachment_path(thread_id, message_id, attachment_id);
        let items = CacheResultItems::new([message_id], "message attachment");

        if !self.cached_message_attachments.contains(&key) && !path.exists() {
            return Ok(items.add_not_cached([message_id]));
        }

        let (data, metrics) = read_json(&path)?;
        self.actions.add(GmailRequestType::Attachments, metrics);
        self.cached_message_attachments.insert(key);
        Ok(items.add_fully_cached([(message_id.to_string(), data)]))
    }

    fn get_cached_threads(&self) -> Vec<String> {
        self.cached_thread_ids.iter().cloned().collect()
    }

    fn print_actions_performed(&self) {
        self.actions.print_all();
    }
}

/// Cache file name for an attachment.
///
/// Attachment IDs are long and not filesystem safe, so only their digest is
/// used.
fn attachment_filename(message_id: &str, attachment_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(attachment_id.as_bytes());
    format!("message_{}_attachment_{:x}.txt", message_id, hasher.finalize())
}

fn message_data_of(thread_response: &Value) -> Vec<MessageData> {
    thread_response
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|msg| {
                    let message_id = msg.get("id")?.as_str()?.to_string();
                    let message_date = msg
                        .get("internalDate")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    Some(MessageData {
                        message_id,
                        message_date,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn read_json(path: &Path) -> Result<(Value, CacheMetrics)> {
    let content = fs::read(path).with_context(|| format!("Failed to read cache file: {}", path.display()))?;
    let value: Value = serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;
    Ok((value, CacheMetrics::for_read(1, content.len() as u64)))
}

/// Write pretty JSON atomically (write to temp, then rename)
fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<CacheMetrics> {
    let content = serde_json::to_vec_pretty(data)?;
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, &content)
        .with_context(|| format!("Failed to write cache file: {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to move cache file into place: {}", path.display()))?;
    Ok(CacheMetrics::for_write(1, content.len() as u64))
}
