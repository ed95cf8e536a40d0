//! CORE v3 works adapter. Requires a bearer key; the adapter factory
//! skips this source entirely when none is configured.

use async_trait::async_trait;
use serde::Deserialize;

use litscout_common::text::{clean_text, coerce_year, normalize_doi};
use litscout_common::types::{DateRange, RawRecord, SourceId};

use crate::error::{Result, SourceError};
use crate::retry::{with_retry, RetryPolicy};
use crate::{check_status, SourceAdapter};

const SEARCH_URL: &str = "https://api.core.ac.uk/v3/search/works";

#[derive(Debug, Deserialize, Default)]
struct SearchBody {
    #[serde(default)]
    results: Vec<CoreWork>,
}

#[derive(Debug, Deserialize, Default)]
struct CoreWork {
    #[serde(default)]
    title: String,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(rename = "yearPublished", default)]
    year_published: Option<i64>,
    #[serde(rename = "downloadUrl", default)]
    download_url: Option<String>,
    #[serde(rename = "sourceFulltextUrls", default)]
    source_fulltext_urls: Vec<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(rename = "citationCount", default)]
    citation_count: Option<u32>,
}

impl CoreWork {
    fn into_raw(self) -> RawRecord {
        let url = self
            .download_url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.source_fulltext_urls.into_iter().next())
            .unwrap_or_default()
            .trim()
            .to_string();
        RawRecord {
            title: clean_text(&self.title),
            abstract_text: clean_text(self.abstract_text.as_deref().unwrap_or_default()),
            doi: normalize_doi(self.doi.as_deref().unwrap_or_default()),
            year: self
                .year_published
                .and_then(|y| coerce_year(&y.to_string())),
            open_access: !url.is_empty(),
            url,
            journal: clean_text(self.publisher.as_deref().unwrap_or_default()),
            cited_by_count: self.citation_count.unwrap_or(0),
            ..RawRecord::default()
        }
    }
}

pub struct CoreClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    api_key: String,
}

impl CoreClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy, api_key: String) -> Self {
        Self {
            client,
            policy,
            api_key,
        }
    }
}

#[async_trait]
impl SourceAdapter for CoreClient {
    fn id(&self) -> SourceId {
        SourceId::Core
    }

    async fn search(&self, query: &str, limit: usize, _range: &DateRange) -> Result<Vec<RawRecord>> {
        if self.api_key.is_empty() {
            return Err(SourceError::MissingApiKey("core".to_string()));
        }
        let payload = serde_json::json!({
            "q": query,
            "limit": limit.clamp(1, 100),
        });
        let works = with_retry(&self.policy, || async {
            let resp = self
                .client
                .post(SEARCH_URL)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await?;
            let body: SearchBody = check_status(resp).await?.json().await?;
            Ok(body.results)
        })
        .await?;
        Ok(works.into_iter().map(CoreWork::into_raw).collect())
    }
}
