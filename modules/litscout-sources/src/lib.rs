pub mod core_ac;
pub mod crossref;
pub mod error;
pub mod europe_pmc;
pub mod idconv;
pub mod openaire;
pub mod openalex;
pub mod pubmed;
pub mod retry;
pub mod rxiv;
pub mod semantic;
pub mod unpaywall;

pub use error::{Result, SourceError};
pub use retry::{with_retry, RetryPolicy};

use std::sync::Arc;

use async_trait::async_trait;

use litscout_common::types::{DateRange, RawRecord, SourceId};

/// One external bibliographic service. Implementations own pagination,
/// date-filter syntax, and response parsing; transient failures are
/// retried internally so callers see one result per job.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    async fn search(
        &self,
        query: &str,
        limit: usize,
        range: &DateRange,
    ) -> Result<Vec<RawRecord>>;
}

/// Credentials handed to adapters that need them.
#[derive(Debug, Clone, Default)]
pub struct AdapterKeys {
    pub ncbi: String,
    pub core: String,
    pub semantic: String,
}

/// Builds one adapter per selected source. Sources whose required key is
/// absent are skipped with a warning rather than failing the run.
pub fn build_adapters(
    http: reqwest::Client,
    policy: RetryPolicy,
    selection: &[SourceId],
    keys: &AdapterKeys,
) -> Vec<Arc<dyn SourceAdapter>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for id in selection {
        match id {
            SourceId::Pubmed => adapters.push(Arc::new(pubmed::PubMedClient::new(
                http.clone(),
                policy,
                keys.ncbi.clone(),
            ))),
            SourceId::EuropePmc => adapters.push(Arc::new(europe_pmc::EuropePmcClient::new(
                http.clone(),
                policy,
            ))),
            SourceId::OpenAlex => {
                adapters.push(Arc::new(openalex::OpenAlexClient::new(http.clone(), policy)))
            }
            SourceId::Crossref => {
                adapters.push(Arc::new(crossref::CrossrefClient::new(http.clone(), policy)))
            }
            SourceId::Semantic => adapters.push(Arc::new(semantic::SemanticClient::new(
                http.clone(),
                policy,
                keys.semantic.clone(),
            ))),
            SourceId::OpenAire => {
                adapters.push(Arc::new(openaire::OpenAireClient::new(http.clone(), policy)))
            }
            SourceId::Core => {
                if keys.core.is_empty() {
                    tracing::warn!("CORE_API_KEY not set, skipping core source");
                    continue;
                }
                adapters.push(Arc::new(core_ac::CoreClient::new(
                    http.clone(),
                    policy,
                    keys.core.clone(),
                )));
            }
            SourceId::Medrxiv | SourceId::Biorxiv => {
                adapters.push(Arc::new(rxiv::RxivClient::new(http.clone(), policy, *id)))
            }
        }
    }
    adapters
}

/// Maps a non-success response into a typed error with the body preserved.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SourceError::Http {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}
