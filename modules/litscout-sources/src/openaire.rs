//! OpenAIRE keyword-search adapter. The response metadata is a deeply
//! nested envelope with no stable schema, so recovery is deliberately
//! coarse: flatten the blob, pull a DOI and year out of it, and let
//! downstream enrichment fill in the rest.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use litscout_common::text::{clean_text, coerce_year, normalize_doi};
use litscout_common::types::{DateRange, RawRecord, SourceId};

use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use crate::{check_status, SourceAdapter};

const SEARCH_URL: &str = "https://api.openaire.eu/search/publications";

pub struct OpenAireClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OpenAireClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

fn raw_from_metadata(metadata: &Value) -> Option<RawRecord> {
    if metadata.is_null() {
        return None;
    }
    let blob = clean_text(&metadata.to_string());
    if blob.is_empty() {
        return None;
    }
    let title: String = blob.chars().take(500).collect();
    let doi_re = Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+").expect("valid regex");
    let doi = doi_re
        .find(&title)
        .map(|m| normalize_doi(m.as_str()))
        .unwrap_or_default();
    Some(RawRecord {
        title,
        doi,
        year: coerce_year(&blob),
        ..RawRecord::default()
    })
}

#[async_trait]
impl SourceAdapter for OpenAireClient {
    fn id(&self) -> SourceId {
        SourceId::OpenAire
    }

    async fn search(&self, query: &str, limit: usize, _range: &DateRange) -> Result<Vec<RawRecord>> {
        let params = vec![
            ("keywords", query.to_string()),
            ("size", limit.clamp(1, 100).to_string()),
            ("format", "json".to_string()),
        ];
        let body: Value = with_retry(&self.policy, || async {
            let resp = self.client.get(SEARCH_URL).query(&params).send().await?;
            Ok(check_status(resp).await?.json().await?)
        })
        .await?;

        let results = body
            .pointer("/response/results/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(results
            .iter()
            .filter_map(|rec| raw_from_metadata(rec.get("metadata").unwrap_or(&Value::Null)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_and_year_recovered_from_blob() {
        let metadata = serde_json::json!({
            "entity": {
                "result": {
                    "title": "Adjuvant chemotherapy trial (2017)",
                    "pid": "doi 10.1016/S0140-6736(16)32409-6"
                }
            }
        });
        let raw = raw_from_metadata(&metadata).unwrap();
        assert_eq!(raw.doi, "10.1016/s0140-6736(16)32409-6");
        assert_eq!(raw.year, Some(2017));
        assert!(!raw.title.is_empty());
    }

    #[test]
    fn null_metadata_yields_nothing() {
        assert!(raw_from_metadata(&Value::Null).is_none());
    }
}
