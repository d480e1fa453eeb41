use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Client;

use crate::layers::catalog::{CatalogClient, CatalogError};
use crate::layers::fetch::{self, ResultSink};
use crate::layers::ranking::{self, QueryContext};
use crate::layers::resolution;
use crate::layers::{IssueMetadata, Query, ID_COMICVINE};

/// Settings the host hands to the pipeline. The pipeline itself never reads
/// the environment or any persisted state.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub api_key: String,
    pub worker_threads: usize,
    pub timeout: Duration,
}

pub struct ComicvineSource<C> {
    catalog: C,
    http: Client,
    worker_threads: usize,
}

impl<C: CatalogClient> ComicvineSource<C> {
    pub fn new(catalog: C, worker_threads: usize) -> Self {
        Self {
            catalog,
            http: Client::new(),
            worker_threads,
        }
    }

    /// Identify catalog issues matching the query, best match first.
    ///
    /// A direct comicvine identifier short-circuits the whole resolution
    /// pipeline. `timeout` bounds the concurrent fetch phase; on expiry the
    /// results collected so far are returned.
    pub async fn identify(
        &self,
        query: &Query,
        timeout: Duration,
    ) -> Result<Vec<IssueMetadata>, CatalogError> {
        let sink = ResultSink::new();

        if let Some(issue_id) = query.issue_id() {
            tracing::debug!("Looking up Issue({}) directly", issue_id);
            fetch::fetch_single(&self.catalog, issue_id, &sink).await?;
            return Ok(sink.into_results());
        }

        if query.title.as_deref().unwrap_or("").is_empty() {
            tracing::debug!("no title and no identifier, nothing to identify");
            return Ok(Vec::new());
        }

        let context = QueryContext::new(query);
        let candidate_ids = resolution::resolve(
            &self.catalog,
            &context.title_tokens,
            context.issue_number.as_deref(),
            query.volume_id(),
            &query.authors,
        )
        .await?;
        tracing::info!("{} candidate issues to fetch", candidate_ids.len());

        let cancel = AtomicBool::new(false);
        let fetches = fetch::fetch_all(
            &self.catalog,
            candidate_ids,
            &sink,
            self.worker_threads,
            &cancel,
        );
        match tokio::time::timeout(timeout, fetches).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                cancel.store(true, Ordering::SeqCst);
                tracing::warn!("identify timed out, returning partial results");
            }
        }

        let mut results = sink.into_results();
        results.sort_by_key(|candidate| ranking::rank_key(&context, candidate));
        Ok(results)
    }

    /// Download cover images for the issue named by the identifier map.
    /// Failures on individual images are logged and skipped.
    pub async fn download_cover(
        &self,
        identifiers: &HashMap<String, u64>,
        timeout: Duration,
        best_only: bool,
    ) -> Result<Vec<(String, Vec<u8>)>, CatalogError> {
        let Some(&issue_id) = identifiers.get(ID_COMICVINE) else {
            return Ok(Vec::new());
        };

        let urls = self.catalog.fetch_cover_urls(issue_id, best_only).await?;
        let mut covers = Vec::new();
        for url in urls {
            tracing::debug!("Downloading cover from: {}", url);
            match self.download_image(&url, timeout).await {
                Ok(bytes) => covers.push((url, bytes)),
                Err(e) => tracing::warn!("Failed to download cover from {}: {}", url, e),
            }
        }
        Ok(covers)
    }

    async fn download_image(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, CatalogError> {
        let response = self.http.get(url).timeout(timeout).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Api(format!("HTTP {}", response.status())));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
