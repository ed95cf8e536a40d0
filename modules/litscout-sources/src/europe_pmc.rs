//! Europe PMC REST adapter. Also serves preprint-server searches
//! (medRxiv/bioRxiv publish into the PPR index) and abstract backfill.

use async_trait::async_trait;
use serde::Deserialize;

use litscout_common::text::{clean_text, coerce_year, normalize_doi};
use litscout_common::types::{DateRange, RawRecord, SourceId};

use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use crate::{check_status, SourceAdapter};

const SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";

#[derive(Debug, Deserialize, Default)]
struct SearchBody {
    #[serde(rename = "resultList", default)]
    result_list: ResultList,
}

#[derive(Debug, Deserialize, Default)]
struct ResultList {
    #[serde(default)]
    result: Vec<EpmcResult>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct EpmcResult {
    #[serde(default)]
    id: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "abstractText", default)]
    abstract_text: String,
    #[serde(default)]
    doi: String,
    #[serde(default)]
    pmid: String,
    #[serde(default)]
    pmcid: String,
    #[serde(rename = "pubYear", default)]
    pub_year: String,
    #[serde(rename = "journalTitle", default)]
    journal_title: String,
    #[serde(rename = "citedByCount", default)]
    cited_by_count: u32,
    #[serde(rename = "isOpenAccess", default)]
    is_open_access: String,
    #[serde(rename = "isRetracted", default)]
    is_retracted: String,
}

fn flag(value: &str) -> bool {
    matches!(value.to_uppercase().as_str(), "Y" | "TRUE" | "1")
}

impl EpmcResult {
    pub(crate) fn into_raw(self) -> RawRecord {
        let pmcid = self.pmcid.trim().to_uppercase();
        let source_db = if self.source.is_empty() {
            "MED".to_string()
        } else {
            self.source.clone()
        };
        let url = if self.id.is_empty() {
            String::new()
        } else {
            format!("https://europepmc.org/article/{}/{}", source_db, self.id)
        };
        let open_access = flag(&self.is_open_access) || !pmcid.is_empty();
        RawRecord {
            title: clean_text(&self.title),
            abstract_text: clean_text(&self.abstract_text),
            doi: normalize_doi(&self.doi),
            pmid: self.pmid.trim().to_string(),
            pmcid,
            year: coerce_year(&self.pub_year),
            journal: clean_text(&self.journal_title),
            url,
            cited_by_count: self.cited_by_count,
            open_access,
            retracted_flag: flag(&self.is_retracted),
            preprint_flag: source_db.to_uppercase().starts_with("PPR"),
            ..RawRecord::default()
        }
    }
}

pub struct EuropePmcClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl EuropePmcClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub(crate) async fn search_raw(&self, query: &str, page_size: usize) -> Result<Vec<EpmcResult>> {
        let page_size = page_size.clamp(1, 1000).to_string();
        with_retry(&self.policy, || async {
            let resp = self
                .client
                .get(SEARCH_URL)
                .query(&[
                    ("query", query),
                    ("format", "json"),
                    ("resultType", "core"),
                    ("pageSize", &page_size),
                ])
                .send()
                .await?;
            let body: SearchBody = check_status(resp).await?.json().await?;
            Ok(body.result_list.result)
        })
        .await
    }

    /// Abstract backfill: match by PMID in the MED index, else by DOI.
    pub async fn fetch_abstract(&self, doi: &str, pmid: &str) -> Result<String> {
        let clause = if !pmid.is_empty() {
            format!("EXT_ID:{pmid} AND SRC:MED")
        } else if !doi.is_empty() {
            format!("DOI:{doi}")
        } else {
            return Ok(String::new());
        };
        let rows = self.search_raw(&clause, 1).await?;
        Ok(rows
            .first()
            .map(|r| clean_text(&r.abstract_text))
            .unwrap_or_default())
    }
}

/// Appends a FIRST_PDATE year-range clause when bounds are present.
pub(crate) fn date_filtered_query(query: &str, range: &DateRange) -> String {
    let q = query.trim();
    match (range.year_from(), range.year_to()) {
        (Some(from), Some(to)) => format!("({q}) AND FIRST_PDATE:[{from} TO {to}]"),
        (Some(from), None) => format!("({q}) AND FIRST_PDATE:[{from} TO *]"),
        (None, Some(to)) => format!("({q}) AND FIRST_PDATE:[1900 TO {to}]"),
        (None, None) => q.to_string(),
    }
}

#[async_trait]
impl SourceAdapter for EuropePmcClient {
    fn id(&self) -> SourceId {
        SourceId::EuropePmc
    }

    async fn search(&self, query: &str, limit: usize, range: &DateRange) -> Result<Vec<RawRecord>> {
        let q = date_filtered_query(query, range);
        let rows = self.search_raw(&q, limit).await?;
        Ok(rows.into_iter().map(EpmcResult::into_raw).collect())
    }
}
