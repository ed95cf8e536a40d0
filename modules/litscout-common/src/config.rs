use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{DateRange, PreprintPolicy, SourceId, Strategy};

/// Full run configuration. CLI flags populate most of it; API keys come
/// from environment variables so they never land in run artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    // Retrieval
    pub queries: Vec<String>,
    pub sources: Vec<SourceId>,
    pub strategy: Strategy,
    pub retmax: usize,
    pub date_range: DateRange,

    // Concurrency and resilience
    pub max_workers: usize,
    pub max_retries: usize,
    pub request_timeout_secs: u64,

    // Gating
    pub quality_filter: bool,
    pub core_threshold: i32,
    pub extended_threshold: i32,
    pub young_article_window_years: i32,
    pub young_article_compensation: bool,
    pub preprint_policy: PreprintPolicy,

    // Enrichment budgets
    pub pmc_lookup_limit: usize,
    pub unpaywall_limit: usize,
    pub unpaywall_email: String,

    // Acquisition
    pub oa_only: bool,
    pub skip_download: bool,

    // Layout
    pub output_dir: PathBuf,
    pub run_id: String,

    // Credentials (env-sourced, optional)
    #[serde(skip)]
    pub ncbi_api_key: String,
    #[serde(skip)]
    pub core_api_key: String,
    #[serde(skip)]
    pub semantic_api_key: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            sources: SourceId::DEFAULTS.to_vec(),
            strategy: Strategy::Recall,
            retmax: 30,
            date_range: DateRange::default(),
            max_workers: 6,
            max_retries: 2,
            request_timeout_secs: 60,
            quality_filter: true,
            core_threshold: 70,
            extended_threshold: 50,
            young_article_window_years: 5,
            young_article_compensation: true,
            preprint_policy: PreprintPolicy::SeparateSheet,
            pmc_lookup_limit: 300,
            unpaywall_limit: 400,
            unpaywall_email: "paper-hub@example.org".to_string(),
            oa_only: true,
            skip_download: false,
            output_dir: PathBuf::from("runs"),
            run_id: String::new(),
            ncbi_api_key: String::new(),
            core_api_key: String::new(),
            semantic_api_key: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Pulls optional credentials from the environment. Missing keys are
    /// fine; adapters that require one report it per source instead of
    /// failing the run.
    pub fn load_credentials(&mut self) {
        self.ncbi_api_key = env::var("NCBI_API_KEY").unwrap_or_default();
        self.core_api_key = env::var("CORE_API_KEY").unwrap_or_default();
        self.semantic_api_key = env::var("SEMANTIC_SCHOLAR_API_KEY").unwrap_or_default();
        if let Ok(email) = env::var("UNPAYWALL_EMAIL") {
            if !email.trim().is_empty() {
                self.unpaywall_email = email.trim().to_string();
            }
        }
    }

    /// Root directory for this run's artifacts.
    pub fn run_dir(&self) -> PathBuf {
        self.output_dir.join(&self.run_id)
    }

    pub fn fulltext_dir(&self) -> PathBuf {
        self.run_dir().join("fulltext")
    }
}
