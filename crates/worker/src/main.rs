//! sitecache host entry point.
//!
//! Boots the worker (install, then activate) and serves JSON-line events
//! from stdin. Reports go to stdout; logging goes to stderr so it never
//! interleaves with the report stream.

use std::sync::Arc;

use anyhow::Result;
use sitecache_client::{FetchClient, FetchConfig};
use sitecache_core::{CacheDb, WorkerConfig};
use sitecache_worker::build_dispatcher;
use sitecache_worker::transport::{StdioHost, boot, serve, write_lines};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = Arc::new(WorkerConfig::load()?);
    let origin = config.origin_url()?;
    tracing::info!(
        origin = %origin,
        precache = %config.precache_cache(),
        runtime = %config.runtime_cache,
        db = %config.db_path.display(),
        "Starting sitecache host on stdio"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(config.as_ref()))?);

    let (reports, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_lines(tokio::io::stdout(), rx));

    let host = Arc::new(StdioHost::new(reports.clone()));
    let dispatcher = build_dispatcher(Arc::clone(&config), db, network, host)?;

    boot(&dispatcher, &origin, &reports).await?;
    serve(&dispatcher, &origin, BufReader::new(tokio::io::stdin()), reports).await?;

    // The host holds the last report sender.
    drop(dispatcher);
    writer.await??;

    tracing::info!("input closed; shutting down");
    Ok(())
}
