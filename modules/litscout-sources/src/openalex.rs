//! OpenAlex works adapter. Abstracts arrive as an inverted index and are
//! reconstructed by position.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use litscout_common::text::{clean_text, normalize_doi, pmcid_from_text, pmid_from_url};
use litscout_common::types::{DateRange, RawRecord, SourceId};

use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use crate::{check_status, SourceAdapter};

const WORKS_URL: &str = "https://api.openalex.org/works";

#[derive(Debug, Deserialize, Default)]
struct WorksBody {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Deserialize, Default)]
struct Work {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    ids: WorkIds,
    #[serde(default)]
    doi: String,
    #[serde(default)]
    abstract_inverted_index: Option<HashMap<String, Vec<i64>>>,
    #[serde(default)]
    publication_year: Option<i32>,
    #[serde(default)]
    primary_location: Option<Location>,
    #[serde(default)]
    open_access: Option<OpenAccess>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    #[serde(default)]
    cited_by_count: u32,
    #[serde(default)]
    is_retracted: bool,
}

#[derive(Debug, Deserialize, Default)]
struct WorkIds {
    #[serde(default)]
    doi: String,
    #[serde(default)]
    pmid: String,
    #[serde(default)]
    pmcid: String,
}

#[derive(Debug, Deserialize, Default)]
struct Location {
    #[serde(default)]
    landing_page_url: String,
    #[serde(default)]
    source: Option<LocationSource>,
}

#[derive(Debug, Deserialize, Default)]
struct LocationSource {
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAccess {
    #[serde(default)]
    is_oa: bool,
}

#[derive(Debug, Deserialize, Default)]
struct Authorship {
    #[serde(default)]
    institutions: Vec<Institution>,
}

#[derive(Debug, Deserialize, Default)]
struct Institution {
    #[serde(default)]
    display_name: String,
}

/// Rebuilds abstract text from OpenAlex's word -> positions map.
pub(crate) fn abstract_from_index(index: &HashMap<String, Vec<i64>>) -> String {
    let mut by_pos: Vec<(i64, &str)> = Vec::new();
    for (word, positions) in index {
        for p in positions {
            by_pos.push((*p, word.as_str()));
        }
    }
    if by_pos.is_empty() {
        return String::new();
    }
    by_pos.sort_unstable_by_key(|(p, _)| *p);
    let words: Vec<&str> = by_pos.iter().map(|(_, w)| *w).collect();
    clean_text(&words.join(" "))
}

impl Work {
    fn into_raw(self) -> RawRecord {
        let doi_raw = if self.ids.doi.is_empty() {
            self.doi.clone()
        } else {
            self.ids.doi.clone()
        };
        let pmcid = pmcid_from_text(&self.ids.pmcid).unwrap_or_default();
        let loc = self.primary_location.unwrap_or_default();
        let url = if loc.landing_page_url.is_empty() {
            self.id.clone()
        } else {
            loc.landing_page_url.clone()
        };
        let journal = loc
            .source
            .map(|s| clean_text(&s.display_name))
            .unwrap_or_default();
        let institution_names = self
            .authorships
            .iter()
            .flat_map(|a| a.institutions.iter())
            .map(|i| clean_text(&i.display_name))
            .filter(|n| !n.is_empty())
            .collect();
        let open_access = self.open_access.map(|o| o.is_oa).unwrap_or(false) || !pmcid.is_empty();
        RawRecord {
            title: clean_text(&self.title),
            abstract_text: self
                .abstract_inverted_index
                .as_ref()
                .map(abstract_from_index)
                .unwrap_or_default(),
            doi: normalize_doi(&doi_raw),
            pmid: pmid_from_url(&self.ids.pmid).unwrap_or_default(),
            pmcid,
            year: self.publication_year,
            journal,
            url: url.trim().to_string(),
            cited_by_count: self.cited_by_count,
            institution_names,
            open_access,
            retracted_flag: self.is_retracted,
            ..RawRecord::default()
        }
    }
}

pub struct OpenAlexClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OpenAlexClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    async fn works(&self, params: &[(&str, String)]) -> Result<Vec<Work>> {
        with_retry(&self.policy, || async {
            let resp = self.client.get(WORKS_URL).query(params).send().await?;
            let body: WorksBody = check_status(resp).await?.json().await?;
            Ok(body.results)
        })
        .await
    }

    /// Abstract backfill by DOI.
    pub async fn fetch_abstract(&self, doi: &str) -> Result<String> {
        if doi.is_empty() {
            return Ok(String::new());
        }
        let params = vec![
            ("filter", format!("doi:{}", normalize_doi(doi))),
            ("per-page", "1".to_string()),
        ];
        let works = self.works(&params).await?;
        Ok(works
            .first()
            .and_then(|w| w.abstract_inverted_index.as_ref())
            .map(abstract_from_index)
            .unwrap_or_default())
    }
}

fn date_filter(range: &DateRange) -> Option<String> {
    match (range.year_from(), range.year_to()) {
        (Some(from), Some(to)) => Some(format!(
            "from_publication_date:{from}-01-01,to_publication_date:{to}-12-31"
        )),
        (Some(from), None) => Some(format!("from_publication_date:{from}-01-01")),
        (None, Some(to)) => Some(format!("to_publication_date:{to}-12-31")),
        (None, None) => None,
    }
}

#[async_trait]
impl SourceAdapter for OpenAlexClient {
    fn id(&self) -> SourceId {
        SourceId::OpenAlex
    }

    async fn search(&self, query: &str, limit: usize, range: &DateRange) -> Result<Vec<RawRecord>> {
        let mut params = vec![
            ("search", query.to_string()),
            ("per-page", limit.clamp(1, 200).to_string()),
        ];
        if let Some(filter) = date_filter(range) {
            params.push(("filter", filter));
        }
        let works = self.works(&params).await?;
        Ok(works.into_iter().map(Work::into_raw).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_index_reconstructs_in_order() {
        let mut index = HashMap::new();
        index.insert("survival".to_string(), vec![1]);
        index.insert("Overall".to_string(), vec![0]);
        index.insert("improved".to_string(), vec![2, 4]);
        index.insert("again".to_string(), vec![3]);
        assert_eq!(
            abstract_from_index(&index),
            "Overall survival improved again improved"
        );
        assert_eq!(abstract_from_index(&HashMap::new()), "");
    }

    #[test]
    fn work_maps_identifiers() {
        let work: Work = serde_json::from_value(serde_json::json!({
            "id": "https://openalex.org/W2100",
            "title": "Nab-paclitaxel plus gemcitabine",
            "ids": {
                "doi": "https://doi.org/10.1056/NEJMoa1304369",
                "pmid": "https://pubmed.ncbi.nlm.nih.gov/24131140",
                "pmcid": "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC4631139"
            },
            "publication_year": 2013,
            "cited_by_count": 5000,
            "open_access": { "is_oa": true },
            "primary_location": {
                "landing_page_url": "https://www.nejm.org/doi/10.1056/NEJMoa1304369",
                "source": { "display_name": "New England Journal of Medicine" }
            },
            "authorships": [
                { "institutions": [ { "display_name": "Scottsdale Healthcare" } ] }
            ]
        }))
        .unwrap();
        let raw = work.into_raw();
        assert_eq!(raw.doi, "10.1056/nejmoa1304369");
        assert_eq!(raw.pmid, "24131140");
        assert_eq!(raw.pmcid, "PMC4631139");
        assert_eq!(raw.journal, "New England Journal of Medicine");
        assert_eq!(raw.institution_names, vec!["Scottsdale Healthcare"]);
        assert!(raw.open_access);
    }
}
