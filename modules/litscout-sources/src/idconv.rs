//! NCBI PMC ID-conversion client: DOI or PMID in, PMCID out.

use serde::Deserialize;

use litscout_common::text::normalize_doi;

use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use crate::check_status;

const IDCONV_URL: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0/";
const TOOL: &str = "litscout";

#[derive(Debug, Deserialize, Default)]
struct IdConvBody {
    #[serde(default)]
    records: Vec<IdConvRecord>,
}

#[derive(Debug, Deserialize, Default)]
struct IdConvRecord {
    #[serde(default)]
    pmcid: String,
}

pub struct IdConvClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    email: String,
}

impl IdConvClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy, email: String) -> Self {
        Self {
            client,
            policy,
            email,
        }
    }

    /// Resolves a PMCID, preferring the DOI when both are present.
    /// An empty string means the service had no mapping.
    pub async fn lookup(&self, doi: &str, pmid: &str) -> Result<String> {
        let doi = normalize_doi(doi);
        let ids = if !doi.is_empty() {
            doi
        } else {
            pmid.trim().to_string()
        };
        if ids.is_empty() {
            return Ok(String::new());
        }
        let params = vec![
            ("tool", TOOL.to_string()),
            ("email", self.email.clone()),
            ("ids", ids),
            ("format", "json".to_string()),
        ];
        with_retry(&self.policy, || async {
            let resp = self.client.get(IDCONV_URL).query(&params).send().await?;
            let body: IdConvBody = check_status(resp).await?.json().await?;
            Ok(body
                .records
                .first()
                .map(|r| r.pmcid.trim().to_uppercase())
                .unwrap_or_default())
        })
        .await
    }
}
