//! Semantic Scholar graph API adapter.

use async_trait::async_trait;
use serde::Deserialize;

use litscout_common::text::{clean_text, normalize_doi};
use litscout_common::types::{DateRange, RawRecord, SourceId};

use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use crate::{check_status, SourceAdapter};

const SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const FIELDS: &str = "title,abstract,year,venue,externalIds,url,citationCount,isOpenAccess,authors";

#[derive(Debug, Deserialize, Default)]
struct SearchBody {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize, Default)]
struct Paper {
    #[serde(default)]
    title: String,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    venue: String,
    #[serde(rename = "externalIds", default)]
    external_ids: ExternalIds,
    #[serde(default)]
    url: String,
    #[serde(rename = "citationCount", default)]
    citation_count: u32,
    #[serde(rename = "isOpenAccess", default)]
    is_open_access: bool,
    #[serde(default)]
    authors: Vec<PaperAuthor>,
}

#[derive(Debug, Deserialize, Default)]
struct ExternalIds {
    #[serde(rename = "DOI", default)]
    doi: Option<String>,
    #[serde(rename = "PubMed", default)]
    pubmed: Option<String>,
    #[serde(rename = "PubMedCentral", default)]
    pubmed_central: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PaperAuthor {
    #[serde(default)]
    affiliations: Vec<String>,
}

impl Paper {
    fn into_raw(self) -> Option<RawRecord> {
        let title = clean_text(&self.title);
        if title.is_empty() {
            return None;
        }
        let pmcid = self
            .external_ids
            .pubmed_central
            .as_deref()
            .map(|s| {
                let v = s.trim().to_uppercase();
                if v.is_empty() || v.starts_with("PMC") {
                    v
                } else {
                    format!("PMC{v}")
                }
            })
            .unwrap_or_default();
        let venue = clean_text(&self.venue);
        let url = self.url.trim().to_string();
        let hint = format!("{venue} {url}").to_lowercase();
        let preprint_flag = ["medrxiv", "biorxiv", "arxiv", "preprint"]
            .iter()
            .any(|m| hint.contains(m));
        let institution_names = self
            .authors
            .iter()
            .flat_map(|a| a.affiliations.iter())
            .map(|aff| clean_text(aff))
            .filter(|n| !n.is_empty())
            .collect();
        Some(RawRecord {
            title,
            abstract_text: clean_text(self.abstract_text.as_deref().unwrap_or_default()),
            doi: normalize_doi(self.external_ids.doi.as_deref().unwrap_or_default()),
            pmid: self
                .external_ids
                .pubmed
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_string(),
            open_access: self.is_open_access || !pmcid.is_empty(),
            pmcid,
            year: self.year,
            journal: venue,
            url,
            cited_by_count: self.citation_count,
            institution_names,
            preprint_flag,
            ..RawRecord::default()
        })
    }
}

pub struct SemanticClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    api_key: String,
}

impl SemanticClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy, api_key: String) -> Self {
        Self {
            client,
            policy,
            api_key,
        }
    }
}

#[async_trait]
impl SourceAdapter for SemanticClient {
    fn id(&self) -> SourceId {
        SourceId::Semantic
    }

    async fn search(&self, query: &str, limit: usize, range: &DateRange) -> Result<Vec<RawRecord>> {
        let mut params = vec![
            ("query", query.to_string()),
            ("limit", limit.clamp(1, 100).to_string()),
            ("fields", FIELDS.to_string()),
        ];
        // The year parameter only narrows when the range pins a single year;
        // wider ranges are filtered client side.
        if let (Some(from), Some(to)) = (range.year_from(), range.year_to()) {
            if from == to {
                params.push(("year", from.to_string()));
            }
        }

        let papers = with_retry(&self.policy, || async {
            let mut req = self.client.get(SEARCH_URL).query(&params);
            if !self.api_key.is_empty() {
                req = req.header("x-api-key", &self.api_key);
            }
            let resp = req.send().await?;
            let body: SearchBody = check_status(resp).await?.json().await?;
            Ok(body.data)
        })
        .await?;

        Ok(papers
            .into_iter()
            .filter_map(Paper::into_raw)
            .filter(|raw| range.contains(raw.year))
            .collect())
    }
}
