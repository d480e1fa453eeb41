use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::layers::catalog::{CatalogClient, CatalogError};
use crate::layers::IssueMetadata;

/// Append-only result collection shared by the fetch tasks.
/// Appends are serialized; order is meaningless until the final sort.
#[derive(Default)]
pub struct ResultSink {
    results: Mutex<Vec<IssueMetadata>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, metadata: IssueMetadata) {
        self.results.lock().await.push(metadata);
    }

    pub fn into_results(self) -> Vec<IssueMetadata> {
        self.results.into_inner()
    }
}

enum Outcome {
    Collected,
    Skipped,
    Cancelled,
    Failed(CatalogError),
}

/// Fetch metadata for every candidate with bounded parallelism.
///
/// Individual failures are skipped; the whole call fails only when the
/// boundary was unreachable and nothing at all was collected. The cancel flag
/// is guaranteed to be set by the time this returns.
pub async fn fetch_all<C: CatalogClient>(
    catalog: &C,
    issue_ids: HashSet<u64>,
    sink: &ResultSink,
    concurrency: usize,
    cancel: &AtomicBool,
) -> Result<(), CatalogError> {
    let outcomes = stream::iter(issue_ids)
        .map(|issue_id| fetch_one(catalog, issue_id, sink, cancel))
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    cancel.store(true, Ordering::SeqCst);

    let collected_any = outcomes
        .iter()
        .any(|outcome| matches!(outcome, Outcome::Collected));
    if !collected_any {
        for outcome in outcomes {
            if let Outcome::Failed(err) = outcome {
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Direct-identifier fast path: one fetch, no concurrency machinery.
pub async fn fetch_single<C: CatalogClient>(
    catalog: &C,
    issue_id: u64,
    sink: &ResultSink,
) -> Result<(), CatalogError> {
    if let Some(metadata) = catalog.fetch_issue(issue_id).await? {
        sink.push(metadata).await;
    }
    Ok(())
}

async fn fetch_one<C: CatalogClient>(
    catalog: &C,
    issue_id: u64,
    sink: &ResultSink,
    cancel: &AtomicBool,
) -> Outcome {
    if cancel.load(Ordering::SeqCst) {
        return Outcome::Cancelled;
    }

    match catalog.fetch_issue(issue_id).await {
        Ok(Some(metadata)) => {
            // Re-check after the network call: the caller may have moved on.
            if cancel.load(Ordering::SeqCst) {
                return Outcome::Cancelled;
            }
            tracing::debug!("Adding Issue({}) '{}' to results", issue_id, metadata.title);
            sink.push(metadata).await;
            Outcome::Collected
        }
        Ok(None) => {
            tracing::debug!("Issue({}) not found", issue_id);
            Outcome::Skipped
        }
        Err(err) if err.is_transport() => {
            tracing::warn!("fetch of Issue({}) failed: {}", issue_id, err);
            Outcome::Failed(err)
        }
        Err(err) => {
            tracing::warn!("skipping Issue({}): {}", issue_id, err);
            Outcome::Skipped
        }
    }
}
