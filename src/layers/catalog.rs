use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::layers::IssueMetadata;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Comicvine is unreachable: {0}")]
    Unreachable(String),
    #[error("Comicvine rejected the API key")]
    Auth,
    #[error("Comicvine rate limit exceeded")]
    RateLimited,
    #[error("Comicvine API error: {0}")]
    Api(String),
}

impl CatalogError {
    /// True for failures of the catalog boundary itself, as opposed to a
    /// problem with one particular lookup.
    pub fn is_transport(&self) -> bool {
        matches!(self, CatalogError::Unreachable(_) | CatalogError::Auth)
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            CatalogError::Unreachable(err.to_string())
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                401 | 403 => CatalogError::Auth,
                429 => CatalogError::RateLimited,
                _ => CatalogError::Api(err.to_string()),
            }
        } else {
            CatalogError::Api(err.to_string())
        }
    }
}

/// Lookup operations the resolution pipeline needs from the catalog.
///
/// "Nothing found" is part of the success types (`None` / empty collections);
/// errors mean the boundary itself misbehaved.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn search_volumes(&self, tokens: &[String]) -> Result<Vec<u64>, CatalogError>;

    async fn list_issues(
        &self,
        volume_id: u64,
        issue_number: Option<String>,
    ) -> Result<Vec<u64>, CatalogError>;

    /// Issue ids credited to any of `authors`, or `None` when the names
    /// cannot be resolved to catalog people at all.
    async fn search_issues_by_author(
        &self,
        authors: &[String],
    ) -> Result<Option<HashSet<u64>>, CatalogError>;

    async fn fetch_issue(&self, issue_id: u64) -> Result<Option<IssueMetadata>, CatalogError>;

    async fn fetch_cover_urls(
        &self,
        issue_id: u64,
        best_only: bool,
    ) -> Result<Vec<String>, CatalogError>;
}

// Comicvine wire format: every endpoint wraps its payload in the same envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    status_code: i32,
    #[serde(default)]
    error: String,
    results: Option<T>,
}

const STATUS_OK: i32 = 1;
const STATUS_INVALID_KEY: i32 = 100;
const STATUS_NOT_FOUND: i32 = 101;
const STATUS_RATE_LIMITED: i32 = 107;

impl<T> Envelope<T> {
    fn into_results(self) -> Result<Option<T>, CatalogError> {
        match self.status_code {
            STATUS_OK => Ok(self.results),
            STATUS_NOT_FOUND => Ok(None),
            STATUS_INVALID_KEY => Err(CatalogError::Auth),
            STATUS_RATE_LIMITED => Err(CatalogError::RateLimited),
            code => Err(CatalogError::Api(format!("status {}: {}", code, self.error))),
        }
    }
}

#[derive(Deserialize)]
struct CvVolumeRef {
    id: u64,
    name: Option<String>,
}

#[derive(Deserialize)]
struct CvIssueRef {
    id: u64,
}

#[derive(Deserialize)]
struct CvPersonRef {
    id: u64,
}

#[derive(Deserialize)]
struct CvPersonDetail {
    #[serde(default)]
    issues: Vec<CvIssueRef>,
}

#[derive(Deserialize)]
struct CvNamedRef {
    name: String,
}

#[derive(Deserialize)]
struct CvPublisherRef {
    name: Option<String>,
}

#[derive(Deserialize)]
struct CvVolumeDetail {
    publisher: Option<CvPublisherRef>,
}

#[derive(Deserialize)]
struct CvImage {
    super_url: Option<String>,
    medium_url: Option<String>,
    thumb_url: Option<String>,
}

#[derive(Deserialize)]
struct CvIssue {
    id: u64,
    name: Option<String>,
    issue_number: Option<String>,
    volume: Option<CvVolumeRef>,
    #[serde(default)]
    person_credits: Vec<CvNamedRef>,
    cover_date: Option<String>,
    store_date: Option<String>,
    description: Option<String>,
    image: Option<CvImage>,
}

fn parse_pubdate(store_date: Option<&str>, cover_date: Option<&str>) -> Option<NaiveDate> {
    store_date
        .or(cover_date)
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

fn cover_urls_from_image(image: Option<CvImage>) -> Vec<String> {
    let Some(image) = image else {
        return Vec::new();
    };
    [image.super_url, image.medium_url, image.thumb_url]
        .into_iter()
        .flatten()
        .collect()
}

fn build_issue_metadata(issue: CvIssue, publisher: Option<String>) -> IssueMetadata {
    let volume_name = issue.volume.as_ref().and_then(|v| v.name.clone());
    let title = match (&volume_name, &issue.issue_number) {
        (Some(volume), Some(number)) => format!("{} #{}", volume, number),
        (Some(volume), None) => volume.clone(),
        (None, _) => issue
            .name
            .clone()
            .unwrap_or_else(|| format!("Issue {}", issue.id)),
    };
    let pubdate = parse_pubdate(issue.store_date.as_deref(), issue.cover_date.as_deref());

    IssueMetadata {
        comicvine_id: issue.id,
        comicvine_volume_id: issue.volume.as_ref().map(|v| v.id),
        title,
        issue_number: issue.issue_number,
        authors: issue.person_credits.into_iter().map(|p| p.name).collect(),
        publisher,
        pubdate,
        comments: issue.description,
        cover_urls: cover_urls_from_image(issue.image),
    }
}

pub struct ComicvineClient {
    client: Client,
    api_key: String,
    base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl ComicvineClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Api(format!("failed to build HTTP client: {e}")))?;

        // Comicvine throttles aggressively per API key; stay well under it.
        let quota = Quota::per_second(nonzero!(2u32));

        Ok(Self {
            client,
            api_key,
            base_url: "https://comicvine.gamespot.com/api".to_string(),
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    // `url` is the full request URL minus the api_key, so it is safe to log.
    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<Option<T>, CatalogError> {
        self.limiter.until_ready().await;

        tracing::info!("Querying Comicvine: {}", url);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => CatalogError::Auth,
                420 | 429 => CatalogError::RateLimited,
                code => CatalogError::Api(format!("HTTP {}", code)),
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| CatalogError::Api(format!("malformed response: {e}")))?;
        envelope.into_results()
    }

    async fn author_issue_ids(&self, name: &str) -> Result<Option<HashSet<u64>>, CatalogError> {
        let url = format!(
            "{}/people/?format=json&field_list=id&filter=name:{}",
            self.base_url,
            urlencoding::encode(name)
        );
        let people: Vec<CvPersonRef> = self.get(url).await?.unwrap_or_default();
        if people.is_empty() {
            tracing::debug!("no Comicvine person matches '{}'", name);
            return Ok(None);
        }

        let mut issue_ids = HashSet::new();
        for person in people {
            let url = format!(
                "{}/person/4040-{}/?format=json&field_list=issues",
                self.base_url, person.id
            );
            if let Some(detail) = self.get::<CvPersonDetail>(url).await? {
                issue_ids.extend(detail.issues.into_iter().map(|issue| issue.id));
            }
        }
        Ok(Some(issue_ids))
    }

    async fn volume_publisher(&self, volume_id: u64) -> Option<String> {
        let url = format!(
            "{}/volume/4050-{}/?format=json&field_list=publisher",
            self.base_url, volume_id
        );
        match self.get::<CvVolumeDetail>(url).await {
            Ok(detail) => detail.and_then(|d| d.publisher).and_then(|p| p.name),
            Err(e) => {
                tracing::debug!("publisher lookup failed for Volume({}): {}", volume_id, e);
                None
            }
        }
    }

    async fn issue_detail(&self, issue_id: u64) -> Result<Option<CvIssue>, CatalogError> {
        let url = format!(
            "{}/issue/4000-{}/?format=json&field_list=id,name,issue_number,volume,person_credits,cover_date,store_date,description,image",
            self.base_url, issue_id
        );
        self.get(url).await
    }
}

#[async_trait]
impl CatalogClient for ComicvineClient {
    async fn search_volumes(&self, tokens: &[String]) -> Result<Vec<u64>, CatalogError> {
        let query = tokens.join(" ");
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/search/?format=json&resources=volume&field_list=id,name&limit=25&query={}",
            self.base_url,
            urlencoding::encode(&query)
        );
        let volumes: Vec<CvVolumeRef> = self.get(url).await?.unwrap_or_default();
        tracing::debug!("{} candidate volumes for '{}'", volumes.len(), query);
        Ok(volumes.into_iter().map(|v| v.id).collect())
    }

    async fn list_issues(
        &self,
        volume_id: u64,
        issue_number: Option<String>,
    ) -> Result<Vec<u64>, CatalogError> {
        let mut filter = format!("volume:{}", volume_id);
        if let Some(number) = issue_number {
            filter.push_str(&format!(",issue_number:{}", number));
        }

        let url = format!(
            "{}/issues/?format=json&field_list=id&filter={}",
            self.base_url,
            urlencoding::encode(&filter)
        );
        let issues: Vec<CvIssueRef> = self.get(url).await?.unwrap_or_default();
        Ok(issues.into_iter().map(|issue| issue.id).collect())
    }

    async fn search_issues_by_author(
        &self,
        authors: &[String],
    ) -> Result<Option<HashSet<u64>>, CatalogError> {
        // "Unknown" is a placeholder the host uses for unattributed books,
        // not a name worth querying.
        let names: Vec<&String> = authors
            .iter()
            .filter(|name| !name.eq_ignore_ascii_case("unknown"))
            .collect();
        if names.is_empty() {
            return Ok(None);
        }

        let mut combined: Option<HashSet<u64>> = None;
        for name in names {
            if let Some(ids) = self.author_issue_ids(name).await? {
                combined.get_or_insert_with(HashSet::new).extend(ids);
            }
        }
        Ok(combined)
    }

    async fn fetch_issue(&self, issue_id: u64) -> Result<Option<IssueMetadata>, CatalogError> {
        let Some(issue) = self.issue_detail(issue_id).await? else {
            tracing::debug!("Issue({}) not found", issue_id);
            return Ok(None);
        };

        let publisher = match &issue.volume {
            Some(volume) => self.volume_publisher(volume.id).await,
            None => None,
        };
        Ok(Some(build_issue_metadata(issue, publisher)))
    }

    async fn fetch_cover_urls(
        &self,
        issue_id: u64,
        best_only: bool,
    ) -> Result<Vec<String>, CatalogError> {
        let Some(issue) = self.issue_detail(issue_id).await? else {
            return Ok(Vec::new());
        };
        let mut urls = cover_urls_from_image(issue.image);
        if best_only {
            urls.truncate(1);
        }
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_from_json(value: serde_json::Value) -> CvIssue {
        serde_json::from_value(value).expect("valid issue JSON")
    }

    #[test]
    fn test_envelope_ok_returns_results() {
        let envelope: Envelope<Vec<CvIssueRef>> = serde_json::from_value(json!({
            "status_code": 1,
            "error": "OK",
            "results": [{"id": 42}],
        }))
        .unwrap();
        let results = envelope.into_results().unwrap().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 42);
    }

    #[test]
    fn test_envelope_not_found_is_not_an_error() {
        let envelope: Envelope<CvIssue> = serde_json::from_value(json!({
            "status_code": 101,
            "error": "Object Not Found",
        }))
        .unwrap();
        assert!(envelope.into_results().unwrap().is_none());
    }

    #[test]
    fn test_envelope_invalid_key_is_auth_error() {
        let envelope: Envelope<CvIssue> = serde_json::from_value(json!({
            "status_code": 100,
            "error": "Invalid API Key",
        }))
        .unwrap();
        assert!(matches!(envelope.into_results(), Err(CatalogError::Auth)));
    }

    #[test]
    fn test_envelope_rate_limit_maps_to_rate_limited() {
        let envelope: Envelope<CvIssue> = serde_json::from_value(json!({
            "status_code": 107,
            "error": "Rate limit exceeded",
        }))
        .unwrap();
        assert!(matches!(
            envelope.into_results(),
            Err(CatalogError::RateLimited)
        ));
    }

    #[test]
    fn test_build_issue_metadata_composes_title_from_volume() {
        let issue = issue_from_json(json!({
            "id": 101,
            "name": "The Origin",
            "issue_number": "1",
            "volume": {"id": 2001, "name": "Magnus, Robot Fighter"},
            "person_credits": [{"name": "Jim Shooter"}, {"name": "Bill Reinhold"}],
            "cover_date": "2010-08-01",
            "store_date": "2010-06-09",
            "description": "<p>First issue.</p>",
            "image": {
                "super_url": "https://cv/super.jpg",
                "medium_url": "https://cv/medium.jpg",
                "thumb_url": "https://cv/thumb.jpg",
            },
        }));

        let meta = build_issue_metadata(issue, Some("Dark Horse".to_string()));
        assert_eq!(meta.comicvine_id, 101);
        assert_eq!(meta.comicvine_volume_id, Some(2001));
        assert_eq!(meta.title, "Magnus, Robot Fighter #1");
        assert_eq!(meta.issue_number.as_deref(), Some("1"));
        assert_eq!(meta.authors, vec!["Jim Shooter", "Bill Reinhold"]);
        assert_eq!(meta.publisher.as_deref(), Some("Dark Horse"));
        // store_date wins over cover_date when both are present
        assert_eq!(meta.pubdate, NaiveDate::from_ymd_opt(2010, 6, 9));
        assert_eq!(meta.cover_urls.len(), 3);
        assert_eq!(meta.cover_urls[0], "https://cv/super.jpg");
    }

    #[test]
    fn test_build_issue_metadata_falls_back_to_issue_name() {
        let issue = issue_from_json(json!({
            "id": 7,
            "name": "One-Shot Special",
        }));
        let meta = build_issue_metadata(issue, None);
        assert_eq!(meta.title, "One-Shot Special");
        assert!(meta.pubdate.is_none());
        assert!(meta.cover_urls.is_empty());
    }

    #[test]
    fn test_parse_pubdate_falls_back_to_cover_date() {
        assert_eq!(
            parse_pubdate(None, Some("2010-08-01")),
            NaiveDate::from_ymd_opt(2010, 8, 1)
        );
        assert_eq!(parse_pubdate(None, Some("not a date")), None);
        assert_eq!(parse_pubdate(None, None), None);
    }

    #[test]
    fn test_cover_urls_skip_missing_sizes() {
        let image: CvImage = serde_json::from_value(json!({
            "medium_url": "https://cv/medium.jpg",
        }))
        .unwrap();
        assert_eq!(
            cover_urls_from_image(Some(image)),
            vec!["https://cv/medium.jpg"]
        );
    }
}
