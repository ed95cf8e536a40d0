//! NCBI E-utilities adapter: esearch for PMIDs, esummary for metadata,
//! efetch for abstract backfill.

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::Value;

use litscout_common::text::{clean_text, coerce_year};
use litscout_common::types::{DateRange, RawRecord, SourceId};

use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use crate::{check_status, SourceAdapter};

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const ESUMMARY_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

pub struct PubMedClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    api_key: String,
}

impl PubMedClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy, api_key: String) -> Self {
        Self {
            client,
            policy,
            api_key,
        }
    }

    fn key_param(&self) -> Vec<(&'static str, String)> {
        if self.api_key.is_empty() {
            Vec::new()
        } else {
            vec![("api_key", self.api_key.clone())]
        }
    }

    async fn esearch_ids(&self, query: &str, retmax: usize) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(ESEARCH_URL)
            .query(&[
                ("db", "pubmed"),
                ("term", query),
                ("retmax", &retmax.to_string()),
                ("retmode", "json"),
            ])
            .query(&self.key_param())
            .send()
            .await?;
        let body: Value = check_status(resp).await?.json().await?;
        let ids = body["esearchresult"]["idlist"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn esummary(&self, ids: &[String]) -> Result<Vec<RawRecord>> {
        let resp = self
            .client
            .get(ESUMMARY_URL)
            .query(&[
                ("db", "pubmed"),
                ("id", &ids.join(",")),
                ("retmode", "json"),
            ])
            .query(&self.key_param())
            .send()
            .await?;
        let body: Value = check_status(resp).await?.json().await?;
        let result = &body["result"];

        let mut out = Vec::new();
        for pmid in ids {
            let Some(doc) = result.get(pmid).filter(|d| d.is_object()) else {
                continue;
            };
            let title = clean_text(doc["title"].as_str().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let mut doi = String::new();
            let mut pmcid = String::new();
            if let Some(article_ids) = doc["articleids"].as_array() {
                for aid in article_ids {
                    let value = aid["value"].as_str().unwrap_or_default().trim();
                    match aid["idtype"].as_str().unwrap_or_default() {
                        "doi" => doi = value.to_string(),
                        "pmc" => pmcid = value.to_uppercase(),
                        _ => {}
                    }
                }
            }
            let pubdate = doc["pubdate"].as_str().unwrap_or_default();
            out.push(RawRecord {
                title,
                doi,
                pmid: pmid.clone(),
                pmcid,
                year: coerce_year(pubdate),
                published_date: pubdate.to_string(),
                journal: clean_text(doc["fulljournalname"].as_str().unwrap_or_default()),
                url: format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"),
                ..RawRecord::default()
            });
        }
        Ok(out)
    }

    /// Abstract backfill: efetch XML, AbstractText sections joined with
    /// their labels preserved.
    pub async fn fetch_abstract(&self, pmid: &str) -> Result<String> {
        if pmid.is_empty() {
            return Ok(String::new());
        }
        let body = with_retry(&self.policy, || async {
            let resp = self
                .client
                .get(EFETCH_URL)
                .query(&[("db", "pubmed"), ("id", pmid), ("retmode", "xml")])
                .query(&self.key_param())
                .send()
                .await?;
            Ok(check_status(resp).await?.text().await?)
        })
        .await?;
        Ok(abstract_from_efetch_xml(&body))
    }
}

#[async_trait]
impl SourceAdapter for PubMedClient {
    fn id(&self) -> SourceId {
        SourceId::Pubmed
    }

    async fn search(&self, query: &str, limit: usize, range: &DateRange) -> Result<Vec<RawRecord>> {
        let term = apply_date_filter(query, range);
        let ids = with_retry(&self.policy, || self.esearch_ids(&term, limit)).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        with_retry(&self.policy, || self.esummary(&ids)).await
    }
}

// ---------------------------------------------------------------------------
// date filter
// ---------------------------------------------------------------------------

/// Coerces a year or ISO date into PubMed's Y/M/D form.
fn normalize_pubmed_date(value: &str) -> String {
    let v = value.trim();
    let year_re = Regex::new(r"^\d{4}$").expect("valid regex");
    let iso_re = Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex");
    let slash_re = Regex::new(r"^\d{4}/\d{2}/\d{2}$").expect("valid regex");
    if year_re.is_match(v) {
        return format!("{v}/01/01");
    }
    if iso_re.is_match(v) {
        return v.replace('-', "/");
    }
    if slash_re.is_match(v) {
        return v.to_string();
    }
    String::new()
}

fn apply_date_filter(query: &str, range: &DateRange) -> String {
    let mut start = range
        .from
        .as_deref()
        .map(normalize_pubmed_date)
        .unwrap_or_default();
    let mut end = range
        .to
        .as_deref()
        .map(normalize_pubmed_date)
        .unwrap_or_default();
    if start.is_empty() && end.is_empty() {
        return query.to_string();
    }
    if start.is_empty() {
        start = "1900/01/01".to_string();
    }
    if end.is_empty() {
        end = Utc::now().format("%Y/%m/%d").to_string();
    }
    format!(
        "({query}) AND (\"{start}\"[Date - Publication] : \"{end}\"[Date - Publication])"
    )
}

// ---------------------------------------------------------------------------
// efetch XML
// ---------------------------------------------------------------------------

fn abstract_from_efetch_xml(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut sections: Vec<String> = Vec::new();
    let mut in_abstract = false;
    let mut section_depth = 0usize;
    let mut label = String::new();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"Abstract" => in_abstract = true,
                b"AbstractText" if in_abstract => {
                    section_depth = 1;
                    text.clear();
                    label = e
                        .try_get_attribute("Label")
                        .ok()
                        .flatten()
                        .and_then(|a| a.unescape_value().ok())
                        .map(|v| v.trim().to_string())
                        .unwrap_or_default();
                }
                _ if section_depth > 0 => section_depth += 1,
                _ => {}
            },
            Ok(Event::Text(t)) if section_depth > 0 => {
                if let Ok(chunk) = t.unescape() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(&chunk);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"Abstract" => in_abstract = false,
                b"AbstractText" if section_depth == 1 => {
                    section_depth = 0;
                    let cleaned = clean_text(&text);
                    if !cleaned.is_empty() {
                        if label.is_empty() {
                            sections.push(cleaned);
                        } else {
                            sections.push(format!("{label}: {cleaned}"));
                        }
                    }
                }
                _ if section_depth > 0 => section_depth -= 1,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    clean_text(&sections.join(" "))
}
