//! Enrichment passes over the deduplicated candidate set: PMCID lookup,
//! open-access location resolution, and abstract backfill. Each pass is
//! budgeted so a huge candidate list cannot stampede the public APIs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use litscout_common::text::{clean_text, normalize_doi};
use litscout_common::types::{CanonicalRecord, ContentLevel, Strategy};
use litscout_sources::crossref::CrossrefClient;
use litscout_sources::error::Result as SourceResult;
use litscout_sources::europe_pmc::EuropePmcClient;
use litscout_sources::idconv::IdConvClient;
use litscout_sources::openalex::OpenAlexClient;
use litscout_sources::pubmed::PubMedClient;
use litscout_sources::unpaywall::UnpaywallClient;

use crate::normalize::{coverage_flags, relevance_score};

pub const ABSTRACT_MISS_REASON: &str = "not_found_in_pubmed_europepmc_crossref_openalex";

// ---------------------------------------------------------------------------
// PMCID cache
// ---------------------------------------------------------------------------

/// Run-lifetime memo of ID-conversion results, shared between the
/// enrichment pass and the acquisition engine's OA re-check.
#[derive(Default)]
pub struct PmcidCache {
    inner: Mutex<HashMap<String, String>>,
}

impl PmcidCache {
    fn key(doi: &str, pmid: &str) -> String {
        let doi = normalize_doi(doi);
        if !doi.is_empty() {
            format!("doi:{doi}")
        } else {
            format!("pmid:{pmid}")
        }
    }

    /// Cached PMCID lookup. Failures memoize an empty mapping so the same
    /// identifier is never retried within one run.
    pub async fn lookup(&self, idconv: &IdConvClient, doi: &str, pmid: &str) -> String {
        if doi.is_empty() && pmid.is_empty() {
            return String::new();
        }
        let key = Self::key(doi, pmid);
        if let Some(hit) = self.inner.lock().await.get(&key) {
            return hit.clone();
        }
        let pmcid = match idconv.lookup(doi, pmid).await {
            Ok(pmcid) => pmcid,
            Err(err) => {
                debug!(key = key.as_str(), error = %err, "PMCID lookup failed");
                String::new()
            }
        };
        self.inner.lock().await.insert(key, pmcid.clone());
        pmcid
    }
}

// ---------------------------------------------------------------------------
// pass 1: PMCID
// ---------------------------------------------------------------------------

/// Resolves missing PMCIDs for up to `limit` records. A hit implies an
/// open-access fulltext path.
pub async fn enrich_pmcids(
    records: &mut [CanonicalRecord],
    idconv: &IdConvClient,
    cache: &PmcidCache,
    limit: usize,
) {
    let mut looked = 0usize;
    let mut resolved = 0usize;
    for record in records.iter_mut() {
        if looked >= limit {
            break;
        }
        if !record.pmcid.is_empty() || (record.doi.is_empty() && record.pmid.is_empty()) {
            continue;
        }
        looked += 1;
        let pmcid = cache.lookup(idconv, &record.doi, &record.pmid).await;
        if !pmcid.is_empty() {
            record.pmcid = pmcid;
            record.open_access_flag = true;
            resolved += 1;
        }
    }
    info!(looked, resolved, "PMCID enrichment complete");
}

// ---------------------------------------------------------------------------
// pass 2: OA locations
// ---------------------------------------------------------------------------

/// Resolves open-access locations for up to `limit` DOI-bearing records.
pub async fn enrich_oa_locations(
    records: &mut [CanonicalRecord],
    unpaywall: &UnpaywallClient,
    limit: usize,
) {
    let mut looked = 0usize;
    let mut with_locations = 0usize;
    for record in records.iter_mut() {
        if looked >= limit {
            break;
        }
        if record.doi.is_empty() {
            continue;
        }
        looked += 1;
        let summary = match unpaywall.lookup(&record.doi).await {
            Ok(summary) => summary,
            Err(err) => {
                debug!(doi = record.doi.as_str(), error = %err, "Unpaywall lookup failed");
                continue;
            }
        };
        record.open_access_flag = record.open_access_flag || summary.is_oa;
        if !summary.oa_status.is_empty() {
            record.rights_status = summary.oa_status;
        }
        if !summary.locations.is_empty() {
            if record.url.is_empty() {
                record.url = summary.locations[0].clone();
            }
            record.oa_locations = summary.locations;
            with_locations += 1;
        }
    }
    info!(looked, with_locations, "Open-access location enrichment complete");
}

// ---------------------------------------------------------------------------
// pass 3: abstract backfill
// ---------------------------------------------------------------------------

/// One service the backfill chain can consult. Returns an empty string
/// when the service has no abstract for the given identifiers.
#[async_trait]
pub trait AbstractProvider: Send + Sync {
    /// Tag written to `abstract_source` when this provider supplies the text.
    fn origin(&self) -> &'static str;

    async fn fetch(&self, doi: &str, pmid: &str) -> SourceResult<String>;
}

#[async_trait]
impl AbstractProvider for PubMedClient {
    fn origin(&self) -> &'static str {
        "pubmed"
    }

    async fn fetch(&self, _doi: &str, pmid: &str) -> SourceResult<String> {
        if pmid.is_empty() {
            return Ok(String::new());
        }
        self.fetch_abstract(pmid).await
    }
}

#[async_trait]
impl AbstractProvider for EuropePmcClient {
    fn origin(&self) -> &'static str {
        "europe_pmc"
    }

    async fn fetch(&self, doi: &str, pmid: &str) -> SourceResult<String> {
        self.fetch_abstract(doi, pmid).await
    }
}

#[async_trait]
impl AbstractProvider for CrossrefClient {
    fn origin(&self) -> &'static str {
        "crossref"
    }

    async fn fetch(&self, doi: &str, _pmid: &str) -> SourceResult<String> {
        if doi.is_empty() {
            return Ok(String::new());
        }
        self.fetch_abstract(doi).await
    }
}

#[async_trait]
impl AbstractProvider for OpenAlexClient {
    fn origin(&self) -> &'static str {
        "openalex"
    }

    async fn fetch(&self, doi: &str, _pmid: &str) -> SourceResult<String> {
        if doi.is_empty() {
            return Ok(String::new());
        }
        self.fetch_abstract(doi).await
    }
}

/// The strict fallback chain: providers are consulted in order, the first
/// non-empty abstract wins, and the record is tagged with the service that
/// supplied it. Fetch errors skip to the next provider.
pub struct AbstractChain {
    providers: Vec<Arc<dyn AbstractProvider>>,
}

impl AbstractChain {
    /// The production order: PubMed efetch, Europe PMC, Crossref, OpenAlex.
    pub fn new(
        pubmed: PubMedClient,
        europe_pmc: EuropePmcClient,
        crossref: CrossrefClient,
        openalex: OpenAlexClient,
    ) -> Self {
        Self::from_providers(vec![
            Arc::new(pubmed),
            Arc::new(europe_pmc),
            Arc::new(crossref),
            Arc::new(openalex),
        ])
    }

    pub fn from_providers(providers: Vec<Arc<dyn AbstractProvider>>) -> Self {
        Self { providers }
    }

    async fn backfill_one(&self, doi: &str, pmid: &str) -> Option<(String, &'static str)> {
        for provider in &self.providers {
            match provider.fetch(doi, pmid).await {
                Ok(text) if !text.is_empty() => return Some((text, provider.origin())),
                Ok(_) => {}
                Err(err) => {
                    debug!(origin = provider.origin(), doi, pmid, error = %err, "Abstract fetch failed")
                }
            }
        }
        None
    }
}

/// Backfills missing abstracts with bounded concurrency. Coverage flags
/// are recomputed for records whose text changed.
pub async fn backfill_abstracts(
    records: &mut [CanonicalRecord],
    chain: &AbstractChain,
    max_workers: usize,
) {
    let mut pending: Vec<(usize, String, String)> = Vec::new();
    for (idx, record) in records.iter_mut().enumerate() {
        let cleaned = clean_text(&record.abstract_text);
        if !cleaned.is_empty() {
            record.abstract_text = cleaned;
            if record.abstract_source.is_empty() {
                record.abstract_source = record.source.clone();
            }
            record.reason_abstract_missing.clear();
            continue;
        }
        if !record.has_identifier() {
            record.reason_abstract_missing = ABSTRACT_MISS_REASON.to_string();
            continue;
        }
        pending.push((idx, record.doi.clone(), record.pmid.clone()));
    }
    if pending.is_empty() {
        return;
    }
    let attempted = pending.len();
    info!(attempted, "Backfilling abstracts");

    let results = stream::iter(pending)
        .map(|(idx, doi, pmid)| async move { (idx, chain.backfill_one(&doi, &pmid).await) })
        .buffer_unordered(max_workers.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut filled = 0usize;
    for (idx, outcome) in results {
        let record = &mut records[idx];
        match outcome {
            Some((text, origin)) => {
                record.abstract_text = text;
                record.abstract_source = origin.to_string();
                record.reason_abstract_missing.clear();
                record.coverage_flags = coverage_flags(&record.title, &record.abstract_text);
                filled += 1;
            }
            None => {
                record.reason_abstract_missing = ABSTRACT_MISS_REASON.to_string();
            }
        }
    }
    if filled < attempted {
        warn!(missing = attempted - filled, "Some abstracts could not be backfilled");
    }
    info!(filled, "Abstract backfill complete");
}

// ---------------------------------------------------------------------------
// finalization
// ---------------------------------------------------------------------------

/// Settles derived fields after all enrichment passes: OA flag from any
/// confirmed path, relevance rescored over backfilled text, content level.
pub fn finalize_enrichment(records: &mut [CanonicalRecord], strategy: Strategy) {
    for record in records.iter_mut() {
        record.open_access_flag =
            record.open_access_flag || !record.pmcid.is_empty() || !record.oa_locations.is_empty();
        record.relevance_score = relevance_score(record, strategy);
        if record.has_abstract() {
            record.reason_not_parsed.clear();
            record.content_level = ContentLevel::Abstract;
        } else {
            record.reason_not_parsed = "missing_abstract".to_string();
            record.content_level = ContentLevel::Metadata;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use litscout_sources::error::SourceError;

    use super::*;

    struct CannedProvider {
        origin: &'static str,
        text: &'static str,
        calls: AtomicUsize,
    }

    impl CannedProvider {
        fn new(origin: &'static str, text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                origin,
                text,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AbstractProvider for CannedProvider {
        fn origin(&self) -> &'static str {
            self.origin
        }

        async fn fetch(&self, _doi: &str, _pmid: &str) -> SourceResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl AbstractProvider for FailingProvider {
        fn origin(&self) -> &'static str {
            "pubmed"
        }

        async fn fetch(&self, _doi: &str, _pmid: &str) -> SourceResult<String> {
            Err(SourceError::Timeout)
        }
    }

    fn bare_record(doi: &str) -> CanonicalRecord {
        CanonicalRecord {
            title: "Pancreatic cancer outcomes".to_string(),
            doi: doi.to_string(),
            ..CanonicalRecord::default()
        }
    }

    #[tokio::test]
    async fn first_provider_with_text_wins_and_is_recorded() {
        let empty = CannedProvider::new("pubmed", "");
        let hit = CannedProvider::new("europe_pmc", "Median overall survival was 11 months.");
        let unused = CannedProvider::new("crossref", "should never be consulted");
        let chain = AbstractChain::from_providers(vec![
            empty.clone() as Arc<dyn AbstractProvider>,
            hit.clone(),
            unused.clone(),
        ]);

        let mut records = vec![bare_record("10.1000/backfill")];
        backfill_abstracts(&mut records, &chain, 2).await;

        let rec = &records[0];
        assert_eq!(rec.abstract_text, "Median overall survival was 11 months.");
        assert_eq!(rec.abstract_source, "europe_pmc");
        assert!(rec.reason_abstract_missing.is_empty());
        assert!(rec.coverage_flags.os);
        assert_eq!(empty.calls(), 1);
        assert_eq!(unused.calls(), 0, "chain must stop at the first hit");
    }

    #[tokio::test]
    async fn provider_errors_fall_through_to_the_next_service() {
        let hit = CannedProvider::new("openalex", "Safety profile was acceptable.");
        let chain = AbstractChain::from_providers(vec![
            Arc::new(FailingProvider) as Arc<dyn AbstractProvider>,
            hit,
        ]);

        let mut records = vec![bare_record("10.1000/fallthrough")];
        backfill_abstracts(&mut records, &chain, 2).await;

        assert_eq!(records[0].abstract_source, "openalex");
        assert!(records[0].reason_abstract_missing.is_empty());
    }

    #[tokio::test]
    async fn exhausted_chain_records_the_miss_reason() {
        let chain = AbstractChain::from_providers(vec![
            CannedProvider::new("pubmed", "") as Arc<dyn AbstractProvider>,
            CannedProvider::new("crossref", ""),
        ]);

        let mut records = vec![bare_record("10.1000/miss")];
        backfill_abstracts(&mut records, &chain, 2).await;

        assert!(records[0].abstract_text.is_empty());
        assert!(records[0].abstract_source.is_empty());
        assert_eq!(records[0].reason_abstract_missing, ABSTRACT_MISS_REASON);
    }

    #[tokio::test]
    async fn existing_abstracts_keep_their_origin_and_skip_the_chain() {
        let unused = CannedProvider::new("pubmed", "never used");
        let chain = AbstractChain::from_providers(vec![unused.clone() as Arc<dyn AbstractProvider>]);

        let mut rec = bare_record("10.1000/kept");
        rec.source = "openalex".to_string();
        rec.abstract_text = "  Response &amp; safety data.  ".to_string();
        let mut records = vec![rec];
        backfill_abstracts(&mut records, &chain, 2).await;

        assert_eq!(records[0].abstract_text, "Response & safety data.");
        assert_eq!(records[0].abstract_source, "openalex");
        assert_eq!(unused.calls(), 0);
    }

    #[test]
    fn finalization_sets_content_level_and_oa() {
        let mut records = vec![
            CanonicalRecord {
                title: "has text".to_string(),
                abstract_text: "Overall survival improved.".to_string(),
                pmcid: "PMC1".to_string(),
                ..CanonicalRecord::default()
            },
            CanonicalRecord {
                title: "bare".to_string(),
                ..CanonicalRecord::default()
            },
        ];
        finalize_enrichment(&mut records, Strategy::Recall);
        assert_eq!(records[0].content_level, ContentLevel::Abstract);
        assert!(records[0].open_access_flag);
        assert!(records[0].reason_not_parsed.is_empty());
        assert_eq!(records[1].content_level, ContentLevel::Metadata);
        assert_eq!(records[1].reason_not_parsed, "missing_abstract");
        assert!(!records[1].open_access_flag);
    }
}
