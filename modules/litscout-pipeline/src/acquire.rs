//! Full-text acquisition. Three channels are tried in strict order per
//! record: DOI resolution, the PMC BioC service by PMCID, and direct
//! open-access URLs. Only verified documents count as success; when every
//! channel fails the per-channel reasons are composed into one classified
//! error code on the manifest row.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};

use litscout_common::text::sanitize_uid;
use litscout_common::types::{CanonicalRecord, QualityGate};
use litscout_sources::error::{Result as SourceResult, SourceError};
use litscout_sources::idconv::IdConvClient;
use litscout_sources::retry::{with_retry, RetryPolicy};

use crate::enrich::PmcidCache;

const PMC_BIOC_URL_PREFIX: &str =
    "https://www.ncbi.nlm.nih.gov/research/bionlp/RESTful/pmcoa.cgi/BioC_xml/";
const PMC_NO_RESULT_PREFIX: &[u8] = b"[Error] : No result can be found";

// ---------------------------------------------------------------------------
// Manifest rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Success,
    Skipped,
    Failed,
    FilteredOut,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Success => "success",
            DownloadStatus::Skipped => "skipped",
            DownloadStatus::Failed => "failed",
            DownloadStatus::FilteredOut => "filtered_out",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            DownloadStatus::Success => 0,
            DownloadStatus::Skipped => 1,
            DownloadStatus::Failed => 2,
            DownloadStatus::FilteredOut => 3,
        }
    }
}

/// One manifest row per record, whether or not a download was attempted.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRow {
    pub uid: String,
    pub title: String,
    pub doi: String,
    pub pmid: String,
    pub pmcid: String,
    pub status: DownloadStatus,
    pub channel: String,
    pub local_path: String,
    pub error_code: String,
    pub error_message: String,
    pub reason_not_downloaded: String,
}

impl DownloadRow {
    fn pending(record: &CanonicalRecord) -> Self {
        DownloadRow {
            uid: record.uid.clone(),
            title: record.title.clone(),
            doi: record.doi.clone(),
            pmid: record.pmid.clone(),
            pmcid: record.pmcid.clone(),
            status: DownloadStatus::Failed,
            channel: String::new(),
            local_path: String::new(),
            error_code: String::new(),
            error_message: String::new(),
            reason_not_downloaded: String::new(),
        }
    }
}

/// Success first, then skipped, failed, filtered_out; uid breaks ties so
/// the manifest is byte-stable across runs.
pub fn sort_rows(rows: &mut [DownloadRow]) {
    rows.sort_by(|a, b| {
        a.status
            .rank()
            .cmp(&b.status.rank())
            .then_with(|| a.uid.cmp(&b.uid))
    });
}

/// Manifest rows for a run where downloads were not attempted at all.
pub fn skip_rows(records: &[CanonicalRecord]) -> Vec<DownloadRow> {
    records
        .iter()
        .map(|rec| {
            let mut row = DownloadRow::pending(rec);
            if rec.quality_gate == QualityGate::Reject {
                row.status = DownloadStatus::FilteredOut;
                row.reason_not_downloaded = if rec.rejection_reason.is_empty() {
                    "quality_reject".to_string()
                } else {
                    rec.rejection_reason.clone()
                };
            } else {
                row.status = DownloadStatus::Skipped;
                row.reason_not_downloaded = "download_skipped".to_string();
            }
            row
        })
        .collect()
}

/// Manifest rows for rejected records; they are never downloaded but stay
/// auditable in the manifest.
pub fn rejected_rows(records: &[CanonicalRecord]) -> Vec<DownloadRow> {
    records
        .iter()
        .filter(|rec| rec.quality_gate == QualityGate::Reject)
        .map(|rec| {
            let mut row = DownloadRow::pending(rec);
            let reason = if rec.rejection_reason.is_empty() {
                "quality_reject".to_string()
            } else {
                rec.rejection_reason.clone()
            };
            row.status = DownloadStatus::FilteredOut;
            row.error_code = "quality_reject".to_string();
            row.error_message = reason.clone();
            row.reason_not_downloaded = reason;
            row
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Folds a composite failure message into one machine-readable code.
pub fn classify_download_error(message: &str) -> &'static str {
    let m = message.to_lowercase();
    if m.is_empty() {
        return "unknown";
    }
    if m.contains("429") || m.contains("rate") {
        return "rate_limit";
    }
    if m.contains("403") || m.contains("forbidden") {
        return "forbidden";
    }
    if m.contains("timed out") || m.contains("timeout") {
        return "timeout";
    }
    if m.contains("pmc") && m.contains("no") {
        return "pmc_not_found";
    }
    if m.contains("not_a_document") {
        return "not_a_document";
    }
    if m.contains("download") && m.contains("failed") {
        return "download_failed";
    }
    if m.contains("provide direct") || m.contains("paywall") {
        return "paywalled";
    }
    "other_error"
}

// ---------------------------------------------------------------------------
// DOI channel seam
// ---------------------------------------------------------------------------

/// Resolves a DOI to a locally stored document. The default implementation
/// goes through doi.org; tests substitute their own.
#[async_trait]
pub trait DoiFetcher: Send + Sync {
    /// Fetches the document for `doi`, writing it next to `output_base`
    /// with an extension matching the payload. Returns the written path.
    async fn fetch(&self, doi: &str, output_base: &Path) -> SourceResult<PathBuf>;
}

pub struct HttpDoiFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpDoiFetcher {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl DoiFetcher for HttpDoiFetcher {
    async fn fetch(&self, doi: &str, output_base: &Path) -> SourceResult<PathBuf> {
        let url = format!("https://doi.org/{doi}");
        let (content_type, body) = fetch_document(&self.client, &self.policy, &url).await?;
        let path = if body.starts_with(b"%PDF") || content_type.contains("pdf") {
            output_base.with_extension("pdf")
        } else if content_type.contains("xml") {
            output_base.with_extension("xml")
        } else {
            return Err(SourceError::Unsupported("not_a_document".to_string()));
        };
        write_bytes(&path, &body).await?;
        Ok(path)
    }
}

async fn fetch_document(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    url: &str,
) -> SourceResult<(String, Vec<u8>)> {
    with_retry(policy, || async {
        let resp = client
            .get(url)
            .header(header::ACCEPT, "application/pdf, application/xml;q=0.9, */*;q=0.1")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                message: url.to_string(),
            });
        }
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let body = resp.bytes().await?.to_vec();
        Ok((content_type, body))
    })
    .await
}

async fn write_bytes(path: &Path, body: &[u8]) -> SourceResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
    }
    fs::write(path, body)
        .await
        .map_err(|e| SourceError::Network(e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AcquisitionEngine<'a> {
    client: &'a reqwest::Client,
    fetcher: Arc<dyn DoiFetcher>,
    idconv: &'a IdConvClient,
    cache: &'a PmcidCache,
    policy: RetryPolicy,
    oa_only: bool,
}

impl<'a> AcquisitionEngine<'a> {
    pub fn new(
        client: &'a reqwest::Client,
        fetcher: Arc<dyn DoiFetcher>,
        idconv: &'a IdConvClient,
        cache: &'a PmcidCache,
        policy: RetryPolicy,
        oa_only: bool,
    ) -> Self {
        Self { client, fetcher, idconv, cache, policy, oa_only }
    }

    /// Downloads every candidate with bounded concurrency. Row order is
    /// completion order; callers sort before persisting.
    pub async fn download_all(
        &self,
        records: &[CanonicalRecord],
        output_dir: &Path,
        max_workers: usize,
    ) -> Vec<DownloadRow> {
        let rows = stream::iter(records)
            .map(|rec| self.download_record(rec, output_dir))
            .buffer_unordered(max_workers.max(1))
            .collect::<Vec<_>>()
            .await;
        let success = rows
            .iter()
            .filter(|r| r.status == DownloadStatus::Success)
            .count();
        info!(attempted = rows.len(), success, "Download batch complete");
        rows
    }

    pub async fn download_record(&self, record: &CanonicalRecord, output_dir: &Path) -> DownloadRow {
        let mut row = DownloadRow::pending(record);
        let mut pmcid = record.pmcid.clone();
        let base = output_dir.join(sanitize_uid(&record.uid)).join("paper");

        // OA-only gate: without an OA path the record is filtered, not
        // failed, once a PMCID lookup also comes up empty.
        if self.oa_only && !record.open_access_flag && pmcid.is_empty() {
            if record.doi.is_empty() && record.pmid.is_empty() {
                row.status = DownloadStatus::FilteredOut;
                row.error_code = "oa_only_filtered".to_string();
                row.error_message = "oa-only enabled and record has no doi/pmcid".to_string();
                row.reason_not_downloaded = "oa_only_filtered".to_string();
                return row;
            }
            let looked = self.cache.lookup(self.idconv, &record.doi, &record.pmid).await;
            if looked.is_empty() {
                row.status = DownloadStatus::FilteredOut;
                row.error_code = "oa_only_filtered".to_string();
                row.error_message =
                    "oa-only enabled and no OA path (pmcid/open_access_flag) found".to_string();
                row.reason_not_downloaded = "oa_only_filtered".to_string();
                return row;
            }
            pmcid = looked;
            row.pmcid = pmcid.clone();
        }

        // 1) DOI resolution
        let oa_gated = self.oa_only && !record.open_access_flag && pmcid.is_empty();
        let doi_err = if !record.doi.is_empty() && !oa_gated {
            match self.fetcher.fetch(&record.doi, &base).await {
                Ok(path) => {
                    row.status = DownloadStatus::Success;
                    row.channel = "doi_resolver".to_string();
                    row.local_path = path.display().to_string();
                    return row;
                }
                Err(err) => err.to_string(),
            }
        } else {
            "doi_skipped".to_string()
        };

        // 2) PMC BioC by PMCID
        if pmcid.is_empty() && (!record.doi.is_empty() || !record.pmid.is_empty()) {
            pmcid = self.cache.lookup(self.idconv, &record.doi, &record.pmid).await;
            if !pmcid.is_empty() {
                row.pmcid = pmcid.clone();
            }
        }
        let pmc_err = if pmcid.is_empty() {
            "pmcid_not_found".to_string()
        } else {
            match self.fetch_pmc_bioc(&pmcid, &base).await {
                Ok(path) => {
                    row.status = DownloadStatus::Success;
                    row.channel = "pmc_bioc".to_string();
                    row.local_path = path.display().to_string();
                    return row;
                }
                Err(err) => err.to_string(),
            }
        };

        // 3) Direct OA locations, then the canonical URL
        let mut candidates: Vec<&str> = Vec::new();
        for u in &record.oa_locations {
            let u = u.trim();
            if !u.is_empty() && !candidates.contains(&u) {
                candidates.push(u);
            }
        }
        let canonical = record.url.trim();
        if !canonical.is_empty() && !candidates.contains(&canonical) {
            candidates.push(canonical);
        }
        let url_allowed = !self.oa_only || record.open_access_flag || !pmcid.is_empty();
        let url_err = if candidates.is_empty() || !url_allowed {
            "url_skipped".to_string()
        } else {
            let mut last = "download_failed".to_string();
            for (i, u) in candidates.iter().enumerate() {
                let target = if i == 0 {
                    base.with_extension("pdf")
                } else {
                    base.with_file_name(format!("paper_{i}.pdf"))
                };
                match self.fetch_direct_pdf(u, &target).await {
                    Ok(()) => {
                        row.status = DownloadStatus::Success;
                        row.channel = "direct_url".to_string();
                        row.local_path = target.display().to_string();
                        return row;
                    }
                    Err(err) => last = err.to_string(),
                }
            }
            last
        };

        let message = format!("doi:{doi_err}; pmc:{pmc_err}; url:{url_err}");
        debug!(uid = row.uid.as_str(), message = message.as_str(), "All download channels failed");
        row.error_code = classify_download_error(&message).to_string();
        row.reason_not_downloaded = row.error_code.clone();
        row.error_message = message;
        row
    }

    async fn fetch_pmc_bioc(&self, pmcid: &str, output_base: &Path) -> SourceResult<PathBuf> {
        let pmc = if pmcid.starts_with("PMC") {
            pmcid.to_string()
        } else {
            format!("PMC{pmcid}")
        };
        let url = format!("{PMC_BIOC_URL_PREFIX}{pmc}/unicode");
        let (_, body) = fetch_document(self.client, &self.policy, &url).await?;
        if body.starts_with(PMC_NO_RESULT_PREFIX) {
            return Err(SourceError::Unsupported("pmc_no_result".to_string()));
        }
        let path = output_base.with_extension("xml");
        write_bytes(&path, &body).await?;
        Ok(path)
    }

    async fn fetch_direct_pdf(&self, url: &str, target: &Path) -> SourceResult<()> {
        let (content_type, body) = fetch_document(self.client, &self.policy, url).await?;
        if !body.starts_with(b"%PDF") && !content_type.contains("pdf") {
            return Err(SourceError::Unsupported("not_a_document".to_string()));
        }
        write_bytes(target, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn idconv() -> IdConvClient {
        IdConvClient::new(
            reqwest::Client::new(),
            RetryPolicy { max_attempts: 1, base_delay: Duration::from_millis(1) },
            "test@example.org".to_string(),
        )
    }

    struct FileFetcher;

    #[async_trait]
    impl DoiFetcher for FileFetcher {
        async fn fetch(&self, _doi: &str, output_base: &Path) -> SourceResult<PathBuf> {
            let path = output_base.with_extension("pdf");
            write_bytes(&path, b"%PDF-1.5 stub").await?;
            Ok(path)
        }
    }

    #[test]
    fn error_classification_covers_channel_failures() {
        assert_eq!(classify_download_error(""), "unknown");
        assert_eq!(classify_download_error("HTTP 429 slow down"), "rate_limit");
        assert_eq!(classify_download_error("403 Forbidden"), "forbidden");
        assert_eq!(classify_download_error("request timed out"), "timeout");
        assert_eq!(
            classify_download_error("doi:x; pmc:pmc_no_result; url:url_skipped"),
            "pmc_not_found"
        );
        assert_eq!(classify_download_error("body was not_a_document"), "not_a_document");
        assert_eq!(classify_download_error("download failed"), "download_failed");
        assert_eq!(classify_download_error("please provide direct access"), "paywalled");
        assert_eq!(classify_download_error("mystery"), "other_error");
    }

    #[test]
    fn skip_rows_split_by_gate() {
        let mut pass = CanonicalRecord::default();
        pass.uid = "doi:10.1/a".to_string();
        let mut reject = CanonicalRecord::default();
        reject.uid = "doi:10.1/b".to_string();
        reject.quality_gate = QualityGate::Reject;
        reject.rejection_reason = "retracted".to_string();

        let rows = skip_rows(&[pass, reject]);
        assert_eq!(rows[0].status, DownloadStatus::Skipped);
        assert_eq!(rows[0].reason_not_downloaded, "download_skipped");
        assert_eq!(rows[1].status, DownloadStatus::FilteredOut);
        assert_eq!(rows[1].reason_not_downloaded, "retracted");
    }

    #[test]
    fn manifest_sorts_by_status_then_uid() {
        let mk = |uid: &str, status: DownloadStatus| DownloadRow {
            uid: uid.to_string(),
            title: String::new(),
            doi: String::new(),
            pmid: String::new(),
            pmcid: String::new(),
            status,
            channel: String::new(),
            local_path: String::new(),
            error_code: String::new(),
            error_message: String::new(),
            reason_not_downloaded: String::new(),
        };
        let mut rows = vec![
            mk("c", DownloadStatus::FilteredOut),
            mk("b", DownloadStatus::Success),
            mk("a", DownloadStatus::Success),
            mk("d", DownloadStatus::Failed),
        ];
        sort_rows(&mut rows);
        let uids: Vec<&str> = rows.iter().map(|r| r.uid.as_str()).collect();
        assert_eq!(uids, vec!["a", "b", "d", "c"]);
    }

    #[tokio::test]
    async fn oa_only_without_identifiers_is_filtered_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let idconv = idconv();
        let cache = PmcidCache::default();
        let engine = AcquisitionEngine::new(
            &client,
            Arc::new(FileFetcher),
            &idconv,
            &cache,
            RetryPolicy { max_attempts: 1, base_delay: Duration::from_millis(1) },
            true,
        );
        let rec = CanonicalRecord {
            uid: "hash:abc".to_string(),
            title: "closed access".to_string(),
            ..CanonicalRecord::default()
        };
        let row = engine.download_record(&rec, dir.path()).await;
        assert_eq!(row.status, DownloadStatus::FilteredOut);
        assert_eq!(row.error_code, "oa_only_filtered");
        assert_eq!(row.reason_not_downloaded, "oa_only_filtered");
    }

    #[tokio::test]
    async fn doi_channel_success_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let idconv = idconv();
        let cache = PmcidCache::default();
        let engine = AcquisitionEngine::new(
            &client,
            Arc::new(FileFetcher),
            &idconv,
            &cache,
            RetryPolicy { max_attempts: 1, base_delay: Duration::from_millis(1) },
            false,
        );
        let rec = CanonicalRecord {
            uid: "doi:10.1/x".to_string(),
            doi: "10.1/x".to_string(),
            open_access_flag: true,
            ..CanonicalRecord::default()
        };
        let row = engine.download_record(&rec, dir.path()).await;
        assert_eq!(row.status, DownloadStatus::Success);
        assert_eq!(row.channel, "doi_resolver");
        assert!(row.local_path.ends_with("paper.pdf"));
        assert!(std::path::Path::new(&row.local_path).exists());
    }

    #[tokio::test]
    async fn composite_message_when_every_channel_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let idconv = idconv();
        let cache = PmcidCache::default();
        let engine = AcquisitionEngine::new(
            &client,
            Arc::new(FileFetcher),
            &idconv,
            &cache,
            RetryPolicy { max_attempts: 1, base_delay: Duration::from_millis(1) },
            false,
        );
        // No identifiers and no URLs: every channel skips, nothing succeeds.
        let rec = CanonicalRecord {
            uid: "hash:y".to_string(),
            open_access_flag: true,
            ..CanonicalRecord::default()
        };
        let row = engine.download_record(&rec, dir.path()).await;
        assert_eq!(row.status, DownloadStatus::Failed);
        assert_eq!(row.error_message, "doi:doi_skipped; pmc:pmcid_not_found; url:url_skipped");
        assert_eq!(row.error_code, "pmc_not_found");
    }
}
