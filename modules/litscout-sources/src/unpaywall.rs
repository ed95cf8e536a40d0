//! Unpaywall client: open-access status and candidate fulltext locations
//! for a DOI, best PDF links first.

use serde::Deserialize;

use litscout_common::text::normalize_doi;

use crate::check_status;
use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};

const BASE_URL: &str = "https://api.unpaywall.org/v2";

#[derive(Debug, Deserialize, Default)]
struct UnpaywallBody {
    #[serde(default)]
    is_oa: bool,
    #[serde(default)]
    oa_status: String,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
    #[serde(default)]
    best_oa_location: Option<OaLocation>,
}

#[derive(Debug, Deserialize, Default)]
struct OaLocation {
    #[serde(default)]
    url_for_pdf: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// What enrichment needs from an Unpaywall response.
#[derive(Debug, Clone, Default)]
pub struct OaSummary {
    pub is_oa: bool,
    pub oa_status: String,
    /// Candidate fulltext URLs, PDF link before landing page per location,
    /// order preserved, duplicates removed.
    pub locations: Vec<String>,
}

impl From<UnpaywallBody> for OaSummary {
    fn from(body: UnpaywallBody) -> Self {
        let mut ordered: Vec<String> = Vec::new();
        let mut push = |value: &Option<String>, out: &mut Vec<String>| {
            if let Some(v) = value {
                let v = v.trim();
                if !v.is_empty() && !out.iter().any(|seen| seen == v) {
                    out.push(v.to_string());
                }
            }
        };
        for loc in &body.oa_locations {
            push(&loc.url_for_pdf, &mut ordered);
            push(&loc.url, &mut ordered);
        }
        if let Some(best) = &body.best_oa_location {
            push(&best.url_for_pdf, &mut ordered);
            push(&best.url, &mut ordered);
        }
        OaSummary {
            is_oa: body.is_oa,
            oa_status: body.oa_status.trim().to_string(),
            locations: ordered,
        }
    }
}

pub struct UnpaywallClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    email: String,
}

impl UnpaywallClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy, email: String) -> Self {
        Self {
            client,
            policy,
            email,
        }
    }

    pub async fn lookup(&self, doi: &str) -> Result<OaSummary> {
        let doi = normalize_doi(doi);
        if doi.is_empty() {
            return Ok(OaSummary::default());
        }
        let encoded: String = url::form_urlencoded::byte_serialize(doi.as_bytes()).collect();
        let url = format!("{BASE_URL}/{encoded}");
        with_retry(&self.policy, || async {
            let resp = self
                .client
                .get(&url)
                .query(&[("email", &self.email)])
                .send()
                .await?;
            let body: UnpaywallBody = check_status(resp).await?.json().await?;
            Ok(OaSummary::from(body))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_keep_priority_order_without_duplicates() {
        let body: UnpaywallBody = serde_json::from_value(serde_json::json!({
            "is_oa": true,
            "oa_status": "gold",
            "oa_locations": [
                { "url_for_pdf": "https://a.example/1.pdf", "url": "https://a.example/1" },
                { "url_for_pdf": null, "url": "https://b.example/2" }
            ],
            "best_oa_location": { "url_for_pdf": "https://a.example/1.pdf", "url": "https://a.example/1" }
        }))
        .unwrap();
        let summary = OaSummary::from(body);
        assert!(summary.is_oa);
        assert_eq!(summary.oa_status, "gold");
        assert_eq!(
            summary.locations,
            vec![
                "https://a.example/1.pdf",
                "https://a.example/1",
                "https://b.example/2"
            ]
        );
    }

    #[test]
    fn closed_record_summarizes_empty() {
        let body: UnpaywallBody =
            serde_json::from_value(serde_json::json!({ "is_oa": false })).unwrap();
        let summary = OaSummary::from(body);
        assert!(!summary.is_oa);
        assert!(summary.locations.is_empty());
    }
}
