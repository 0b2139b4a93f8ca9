//! gthreads - fetch Gmail threads through the local cache
//!
//! Authorizes against Gmail, runs one thread query and logs what came back.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use googleapi::cache::CachingStrategyType;
use googleapi::gmail::{GmailWrapper, ThreadQuery};
use googleapi::{GoogleApiAuthorizer, GoogleCredentials, ServiceType};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(name = "gthreads", about = "Query Gmail threads with an optional filesystem cache")]
struct Args {
    /// Gmail search query, e.g. "from:someone@example.com newer_than:7d"
    #[arg(short, long)]
    query: Option<String>,

    /// Stop after this many threads
    #[arg(short, long)]
    limit: Option<usize>,

    /// Caching strategy: "none" or "fs"
    #[arg(long, default_value = "fs")]
    cache: CachingStrategyType,

    /// Cache base directory (defaults to the user cache dir)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Project name; keys the stored OAuth token
    #[arg(long, default_value = "gthreads")]
    project: String,

    /// OAuth client credentials file (Google Cloud Console JSON)
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Trust cached threads without checking their message list
    #[arg(long)]
    expect_one_message_per_thread: bool,

    #[arg(long)]
    no_sanity_check: bool,

    /// Log the plain text parts of every message
    #[arg(long)]
    show_bodies: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let credentials = match &args.credentials {
        Some(path) => GoogleCredentials::from_file(path)?,
        None => GoogleCredentials::load().context(
            "Google credentials not found; pass --credentials or set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET",
        )?,
    };

    let output_dir = match args.output_dir.clone() {
        Some(dir) => dir,
        None => config::default_cache_dir().context("Could not determine cache directory")?,
    };

    let authorizer = GoogleApiAuthorizer::new(ServiceType::Gmail, credentials, Some(&args.project))?;
    let session = authorizer.authorize()?;
    let mut wrapper = GmailWrapper::from_session(authorizer, &session, args.cache, output_dir)?;

    let mut query = ThreadQuery::new()
        .expect_one_message_per_thread(args.expect_one_message_per_thread)
        .sanity_check(!args.no_sanity_check);
    if let Some(q) = &args.query {
        query = query.query(q);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }

    let threads = wrapper.query_threads(&query)?;

    for thread in &threads.threads {
        info!(
            "[{}] {} ({} messages)",
            thread.api_id.as_str(),
            thread.subject.as_deref().unwrap_or("<no subject>"),
            thread.messages.len()
        );
        if args.show_bodies {
            for message in &thread.messages {
                for part in message.get_all_plain_text_parts() {
                    info!("  {} {}: {}", message.date, message.msg_id.as_str(), part.body.trim());
                }
            }
        }
    }
    info!(
        "Fetched {} threads, {} messages",
        threads.len(),
        threads.messages().count()
    );

    Ok(())
}
