//! Crossref works adapter. Crossref has no clean server-side year filter
//! for every record, so picked years are re-checked client side.

use async_trait::async_trait;
use serde::Deserialize;

use litscout_common::text::{clean_text, normalize_doi};
use litscout_common::types::{DateRange, RawRecord, SourceId};

use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use crate::{check_status, SourceAdapter};

const WORKS_URL: &str = "https://api.crossref.org/works";
const MAILTO: &str = "litscout@example.org";

#[derive(Debug, Deserialize, Default)]
struct Envelope {
    #[serde(default)]
    message: Message,
}

#[derive(Debug, Deserialize, Default)]
struct Message {
    #[serde(default)]
    items: Vec<Item>,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
}

#[derive(Debug, Deserialize, Default)]
struct Item {
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
    #[serde(rename = "DOI", default)]
    doi: String,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(rename = "is-referenced-by-count", default)]
    is_referenced_by_count: u32,
    #[serde(rename = "URL", default)]
    url: String,
    #[serde(rename = "type", default)]
    work_type: String,
    #[serde(default)]
    author: Vec<Author>,
    #[serde(rename = "published-print", default)]
    published_print: Option<DateField>,
    #[serde(rename = "published-online", default)]
    published_online: Option<DateField>,
    #[serde(default)]
    issued: Option<DateField>,
    #[serde(default)]
    created: Option<DateField>,
    #[serde(default)]
    published: Option<DateField>,
}

#[derive(Debug, Deserialize, Default)]
struct Author {
    #[serde(default)]
    affiliation: Vec<Affiliation>,
}

#[derive(Debug, Deserialize, Default)]
struct Affiliation {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct DateField {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<i64>>,
}

impl Item {
    /// First plausible year across the date fields, print first.
    fn pick_year(&self) -> Option<i32> {
        [
            &self.published_print,
            &self.published_online,
            &self.issued,
            &self.created,
            &self.published,
        ]
        .into_iter()
        .flatten()
        .find_map(|field| {
            let y = *field.date_parts.first()?.first()?;
            (1800..=2100).contains(&y).then_some(y as i32)
        })
    }

    fn into_raw(self) -> Option<RawRecord> {
        let title = clean_text(self.title.first().map(String::as_str).unwrap_or_default());
        if title.is_empty() {
            return None;
        }
        let year = self.pick_year();
        let rtype = self.work_type.to_lowercase();
        let preprint_flag = rtype.contains("posted-content") || rtype.contains("preprint");
        let institution_names = self
            .author
            .iter()
            .flat_map(|a| a.affiliation.iter())
            .map(|aff| clean_text(&aff.name))
            .filter(|n| !n.is_empty())
            .collect();
        let journal = clean_text(
            self.container_title
                .first()
                .map(String::as_str)
                .unwrap_or_default(),
        );
        Some(RawRecord {
            title,
            abstract_text: clean_text(&self.abstract_text),
            doi: normalize_doi(&self.doi),
            year,
            journal,
            url: self.url.trim().to_string(),
            cited_by_count: self.is_referenced_by_count,
            institution_names,
            preprint_flag,
            ..RawRecord::default()
        })
    }
}

pub struct CrossrefClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl CrossrefClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Abstract backfill: works/{doi}, JATS fragments stripped by clean_text.
    pub async fn fetch_abstract(&self, doi: &str) -> Result<String> {
        if doi.is_empty() {
            return Ok(String::new());
        }
        let encoded: String =
            url::form_urlencoded::byte_serialize(normalize_doi(doi).as_bytes()).collect();
        let url = format!("{WORKS_URL}/{encoded}");
        with_retry(&self.policy, || async {
            let resp = self
                .client
                .get(&url)
                .query(&[("mailto", MAILTO)])
                .send()
                .await?;
            let body: Envelope = check_status(resp).await?.json().await?;
            Ok(clean_text(&body.message.abstract_text))
        })
        .await
    }
}

#[async_trait]
impl SourceAdapter for CrossrefClient {
    fn id(&self) -> SourceId {
        SourceId::Crossref
    }

    async fn search(&self, query: &str, limit: usize, range: &DateRange) -> Result<Vec<RawRecord>> {
        let mut params = vec![
            ("query.bibliographic", query.to_string()),
            ("rows", limit.clamp(1, 1000).to_string()),
            ("mailto", MAILTO.to_string()),
        ];
        let mut filters = Vec::new();
        if let Some(from) = range.year_from() {
            filters.push(format!("from-pub-date:{from}-01-01"));
        }
        if let Some(to) = range.year_to() {
            filters.push(format!("until-pub-date:{to}-12-31"));
        }
        if !filters.is_empty() {
            params.push(("filter", filters.join(",")));
        }

        let items = with_retry(&self.policy, || async {
            let resp = self.client.get(WORKS_URL).query(&params).send().await?;
            let body: Envelope = check_status(resp).await?.json().await?;
            Ok(body.message.items)
        })
        .await?;

        Ok(items
            .into_iter()
            .filter_map(Item::into_raw)
            .filter(|raw| range.contains(raw.year))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(json: serde_json::Value) -> Item {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn year_prefers_print_date() {
        let it = item(serde_json::json!({
            "title": ["T"],
            "published-print": { "date-parts": [[2011, 5]] },
            "created": { "date-parts": [[2010, 12]] }
        }));
        assert_eq!(it.pick_year(), Some(2011));
    }

    #[test]
    fn year_falls_through_and_rejects_garbage() {
        let it = item(serde_json::json!({
            "title": ["T"],
            "issued": { "date-parts": [[9999]] },
            "created": { "date-parts": [[2015, 3, 2]] }
        }));
        assert_eq!(it.pick_year(), Some(2015));
    }

    #[test]
    fn untitled_items_are_dropped() {
        let it = item(serde_json::json!({ "DOI": "10.1/x" }));
        assert!(it.into_raw().is_none());
    }

    #[test]
    fn posted_content_is_preprint() {
        let it = item(serde_json::json!({
            "title": ["A preprint"],
            "type": "posted-content",
            "DOI": "10.1101/2024.01.01.573000"
        }));
        let raw = it.into_raw().unwrap();
        assert!(raw.preprint_flag);
        assert_eq!(raw.doi, "10.1101/2024.01.01.573000");
    }
}
