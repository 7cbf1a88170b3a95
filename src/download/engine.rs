//! Parallel, fail-fast download engine (C7).
//!
//! Generalizes the teacher's semaphore-bounded concurrent engine: instead of
//! retrying and accumulating per-item stats, the first worker failure
//! cancels every other in-flight download and the whole call fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::download_one;
use super::error::DownloadError;
use crate::auth::TokenProvider;
use crate::manifest::FileItem;
use crate::store::FileStore;
use crate::time::Deadline;

/// How often the supervising loop wakes to re-check the deadline.
const DEADLINE_POLL_GRANULARITY: Duration = Duration::from_secs(1);

/// One URL paired with the destination name it will be written to.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    /// The file's source URL.
    pub source: Url,
    /// The resource type the file belongs to (used only for naming).
    pub resource_type: String,
    /// The destination file name, e.g. `"Patient.0000.ndjson"`.
    pub destination_name: String,
}

/// Expands a manifest's `output` list into named download entries.
///
/// Destination names are `<type>.<NNNN>.<ext>`, with `NNNN` a zero-padded
/// 4-digit counter dense per resource type, assigned in the order each
/// type's URLs appear. A pure function of `(output, extension)`.
#[must_use]
pub fn plan_downloads(output: &[FileItem], extension: &str) -> Vec<DownloadEntry> {
    let mut next_index: HashMap<&str, u32> = HashMap::new();
    output
        .iter()
        .filter_map(|item| {
            let url = Url::parse(&item.url).ok()?;
            let index = next_index.entry(item.resource_type.as_str()).or_insert(0);
            let name = format!("{}.{:04}.{}", item.resource_type, index, extension);
            *index += 1;
            Some(DownloadEntry {
                source: url,
                resource_type: item.resource_type.clone(),
                destination_name: name,
            })
        })
        .collect()
}

/// Downloads every entry concurrently, bounded by `max_concurrent`.
///
/// Returns byte counts in input order. Fails fast: the first worker error
/// cancels the rest. The supervising loop also checks `deadline` at
/// [`DEADLINE_POLL_GRANULARITY`]; on expiry every in-flight download is
/// cancelled and [`DownloadError::DeadlineExceeded`] is returned. Already
/// written partial files are left in place in either failure path.
#[instrument(skip(client, tokens, store, entries, deadline), fields(count = entries.len(), max_concurrent))]
pub async fn download_all(
    client: Client,
    tokens: Option<Arc<TokenProvider>>,
    store: Arc<dyn FileStore>,
    entries: Vec<DownloadEntry>,
    max_concurrent: usize,
    deadline: &Deadline,
) -> Result<Vec<u64>, DownloadError> {
    let total = entries.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut join_set: JoinSet<(usize, Result<u64, DownloadError>)> = JoinSet::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let client = client.clone();
        let tokens = tokens.clone();
        let store = Arc::clone(&store);

        join_set.spawn(async move {
            #[allow(clippy::expect_used)]
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("download semaphore is never closed");
            let result = run_one(&client, tokens.as_ref(), store.as_ref(), &entry).await;
            (index, result)
        });
    }

    let mut sizes = vec![0u64; total];
    let mut remaining = total;

    while remaining > 0 {
        let tick = tokio::time::sleep(DEADLINE_POLL_GRANULARITY);
        tokio::select! {
            joined = join_set.join_next() => {
                match joined {
                    Some(Ok((index, Ok(bytes)))) => {
                        sizes[index] = bytes;
                        remaining -= 1;
                    }
                    Some(Ok((_, Err(err)))) => {
                        warn!(error = %err, "download worker failed, cancelling the rest");
                        join_set.abort_all();
                        return Err(err);
                    }
                    Some(Err(join_err)) => {
                        warn!(error = %join_err, "download task panicked, cancelling the rest");
                        join_set.abort_all();
                        return Err(DownloadError::Http {
                            url: "<panicked task>".to_string(),
                            status: 0,
                        });
                    }
                    None => break,
                }
            }
            () = tick => {
                if deadline.is_expired() {
                    warn!("deadline exceeded during download phase, cancelling in-flight downloads");
                    join_set.abort_all();
                    return Err(DownloadError::DeadlineExceeded);
                }
                debug!(remaining, "still downloading");
            }
        }
    }

    info!(total, "all downloads complete");
    Ok(sizes)
}

async fn run_one(
    client: &Client,
    tokens: Option<&Arc<TokenProvider>>,
    store: &dyn FileStore,
    entry: &DownloadEntry,
) -> Result<u64, DownloadError> {
    let mut handle = store
        .child(&entry.destination_name)
        .await
        .map_err(|e| DownloadError::Store {
            url: entry.source.to_string(),
            source: e,
        })?;
    download_one(client, tokens, &entry.source, handle.as_mut()).await
}
