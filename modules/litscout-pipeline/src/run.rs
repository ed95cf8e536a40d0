//! End-to-end run orchestration. `run_curate` drives the full pipeline
//! from query expansion through download manifests; `run_search` stops
//! after dedup and PMCID enrichment for quick corpus exploration. Both
//! return a summary value the binary prints as pretty JSON.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use serde_json::json;
use tracing::info;

use litscout_common::config::PipelineConfig;
use litscout_common::text::clean_text;
use litscout_common::types::{CanonicalRecord, QualityGate, SourceId};
use litscout_sources::idconv::IdConvClient;
use litscout_sources::unpaywall::UnpaywallClient;
use litscout_sources::{build_adapters, AdapterKeys, RetryPolicy};

use crate::acquire::{
    rejected_rows, skip_rows, sort_rows, AcquisitionEngine, DownloadRow, DownloadStatus,
    HttpDoiFetcher,
};
use crate::dedup::dedup_records;
use crate::dimensions::{ensure_catalog, update_catalog};
use crate::enrich::{
    backfill_abstracts, enrich_oa_locations, enrich_pmcids, finalize_enrichment, AbstractChain,
    PmcidCache,
};
use crate::expand::expand_queries;
use crate::fanout::run_fanout;
use crate::guard;
use crate::normalize::open_access_hint;
use crate::registry::{annotate_record, ensure_registry, refresh_definition_sources};
use crate::report;
use crate::scoring::{apply_quality_scoring, count_gates, ScoringParams};

fn abstract_coverage(records: &[CanonicalRecord]) -> usize {
    records
        .iter()
        .filter(|r| !clean_text(&r.abstract_text).is_empty())
        .count()
}

fn abstract_chain(
    client: &reqwest::Client,
    policy: RetryPolicy,
    ncbi_api_key: &str,
) -> AbstractChain {
    AbstractChain::new(
        litscout_sources::pubmed::PubMedClient::new(client.clone(), policy, ncbi_api_key.to_string()),
        litscout_sources::europe_pmc::EuropePmcClient::new(client.clone(), policy),
        litscout_sources::crossref::CrossrefClient::new(client.clone(), policy),
        litscout_sources::openalex::OpenAlexClient::new(client.clone(), policy),
    )
}

fn status_count(rows: &[DownloadRow], status: DownloadStatus) -> usize {
    rows.iter().filter(|r| r.status == status).count()
}

// ---------------------------------------------------------------------------
// curate
// ---------------------------------------------------------------------------

pub async fn run_curate(
    mut config: PipelineConfig,
    client: reqwest::Client,
) -> anyhow::Result<serde_json::Value> {
    let policy = RetryPolicy::new(config.max_retries);
    let strategy = config.strategy;

    // Retrieval
    let expanded = expand_queries(&config.queries, strategy);
    let adapters = build_adapters(
        client.clone(),
        policy,
        &config.sources,
        &AdapterKeys {
            ncbi: config.ncbi_api_key.clone(),
            core: config.core_api_key.clone(),
            semantic: config.semantic_api_key.clone(),
        },
    );
    let outcome = run_fanout(
        &adapters,
        &expanded,
        config.retmax,
        &config.date_range,
        strategy,
        config.max_workers,
        Duration::from_secs(config.request_timeout_secs),
    )
    .await;
    let raw_candidates = outcome.records.len();
    let mut records = dedup_records(outcome.records);
    let deduped_candidates = records.len();
    let abstract_before = abstract_coverage(&records);

    // Enrichment
    let idconv = IdConvClient::new(client.clone(), policy, config.unpaywall_email.clone());
    let cache = PmcidCache::default();
    enrich_pmcids(&mut records, &idconv, &cache, config.pmc_lookup_limit).await;
    let unpaywall =
        UnpaywallClient::new(client.clone(), policy, config.unpaywall_email.clone());
    enrich_oa_locations(&mut records, &unpaywall, config.unpaywall_limit).await;
    let chain = abstract_chain(&client, policy, &config.ncbi_api_key);
    backfill_abstracts(&mut records, &chain, config.max_workers).await;
    let abstract_after = abstract_coverage(&records);
    finalize_enrichment(&mut records, strategy);

    // Run layout
    if config.run_id.is_empty() {
        config.run_id = Local::now().format("%Y%m%d_%H%M%S").to_string();
    }
    let run_dir = config.run_dir();
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating run directory {}", run_dir.display()))?;
    info!(run_id = config.run_id.as_str(), dir = %run_dir.display(), "Run directory ready");

    // Provenance annotation against the shared registry and catalog.
    let registry_path = config.output_dir.join("source_registry.json");
    let catalog_path = config.output_dir.join("dimension_catalog.json");
    let registry = ensure_registry(&registry_path)?;
    let mut catalog = ensure_catalog(&catalog_path, &config.run_id)?;
    {
        let index = registry.index();
        let by_dimension = catalog.by_dimension();
        for record in records.iter_mut() {
            annotate_record(record, &index, &by_dimension);
        }
    }
    let changelog = update_catalog(&catalog_path, &mut catalog, &records, &config.run_id)?;
    refresh_definition_sources(&mut records, &catalog.by_dimension());

    // Scoring and the regression guard.
    let params = ScoringParams {
        quality_filter: config.quality_filter,
        core_threshold: config.core_threshold.clamp(0, 100),
        extended_threshold: config.extended_threshold.clamp(0, 100),
        citation_age_window: config.young_article_window_years.max(1),
        young_compensation: config.young_article_compensation,
        preprint_policy: config.preprint_policy,
    };
    let mut quality_counts = apply_quality_scoring(&mut records, &params);
    let guard_outcome = guard::evaluate(&config.output_dir, &records, &config.run_id)?;
    let quality_guard_pass = guard_outcome.diff.quality_guard_pass;
    if !quality_guard_pass {
        guard::apply_holdout(&mut records);
        quality_counts = count_gates(&records);
    }

    // Tier partition.
    let core: Vec<CanonicalRecord> = gated(&records, QualityGate::CorePass);
    let extended: Vec<CanonicalRecord> = gated(&records, QualityGate::ExtendedReview);
    let preprint: Vec<CanonicalRecord> = gated(&records, QualityGate::PreprintExtended);
    let rejected: Vec<CanonicalRecord> = gated(&records, QualityGate::Reject);
    let download_candidates: Vec<CanonicalRecord> = records
        .iter()
        .filter(|r| r.quality_gate != QualityGate::Reject)
        .cloned()
        .collect();

    // Record exports.
    let candidate_jsonl = run_dir.join("candidate_papers_enriched.jsonl");
    report::write_jsonl(&candidate_jsonl, &records)?;
    let core_jsonl = run_dir.join("core_records.jsonl");
    report::write_jsonl(&core_jsonl, &core)?;
    let extended_jsonl = run_dir.join("extended_records.jsonl");
    report::write_jsonl(&extended_jsonl, &extended)?;
    let preprint_jsonl = run_dir.join("preprint_extended_records.jsonl");
    report::write_jsonl(&preprint_jsonl, &preprint)?;
    let rejected_jsonl = run_dir.join("rejected_records.jsonl");
    report::write_jsonl(&rejected_jsonl, &rejected)?;

    let quality_csv = run_dir.join("quality_scoring.csv");
    report::write_quality_scoring_csv(&quality_csv, &records)?;
    let changelog_csv = run_dir.join("dimension_changelog.csv");
    report::write_dimension_changelog_csv(&changelog_csv, &changelog)?;
    let provenance_csv = run_dir.join("institution_provenance.csv");
    report::write_institution_provenance_csv(&provenance_csv, &records)?;

    // Acquisition. OA-first: downloads only follow confirmed open paths.
    let mut rows = if config.skip_download {
        info!("Download phase skipped");
        skip_rows(&records)
    } else {
        let fetcher = Arc::new(HttpDoiFetcher::new(client.clone(), policy));
        let engine =
            AcquisitionEngine::new(&client, fetcher, &idconv, &cache, policy, config.oa_only);
        let mut rows = engine
            .download_all(&download_candidates, &config.fulltext_dir(), config.max_workers)
            .await;
        rows.extend(rejected_rows(&rejected));
        rows
    };
    sort_rows(&mut rows);
    let manifest_csv = run_dir.join("download_manifest.csv");
    report::write_download_manifest_csv(&manifest_csv, &rows)?;

    // Access audit and the author recovery queue.
    let downloads: HashMap<String, DownloadRow> =
        rows.iter().map(|r| (r.uid.clone(), r.clone())).collect();
    let audit_csv = run_dir.join("access_audit.csv");
    let content_levels = report::write_access_audit_csv(&audit_csv, &records, &downloads)?;
    let queue_csv = run_dir.join("author_recovery_queue.csv");
    let queued = report::write_author_recovery_queue_csv(&queue_csv, &records, &downloads)?;

    let errors_json = run_dir.join("source_errors.json");
    report::write_source_errors_json(&errors_json, &outcome.errors)?;

    Ok(json!({
        "run_id": config.run_id,
        "run_dir": run_dir.display().to_string(),
        "queries": config.queries.len(),
        "expanded_queries": expanded.len(),
        "sources": config.sources.iter().map(SourceId::as_str).collect::<Vec<_>>(),
        "raw_candidates": raw_candidates,
        "deduped_candidates": deduped_candidates,
        "abstract_before": abstract_before,
        "abstract_after": abstract_after,
        "abstract_coverage_delta": abstract_after as i64 - abstract_before as i64,
        "download_success": status_count(&rows, DownloadStatus::Success),
        "download_failed": status_count(&rows, DownloadStatus::Failed),
        "download_filtered_out": status_count(&rows, DownloadStatus::FilteredOut),
        "quality_filter": config.quality_filter,
        "thresholds": { "core": params.core_threshold, "extended": params.extended_threshold },
        "citation_age_window": params.citation_age_window,
        "preprint_policy": config.preprint_policy,
        "oa_only": config.oa_only,
        "quality_counts": quality_counts,
        "quality_guard_pass": quality_guard_pass,
        "core_records": core.len(),
        "extended_records": extended.len(),
        "preprint_extended_records": preprint.len(),
        "rejected_records": rejected.len(),
        "content_levels": content_levels,
        "author_recovery_queue": queued,
        "source_errors": outcome.errors.len(),
        "artifacts": {
            "candidate_papers_enriched": candidate_jsonl.display().to_string(),
            "core_records": core_jsonl.display().to_string(),
            "extended_records": extended_jsonl.display().to_string(),
            "preprint_extended_records": preprint_jsonl.display().to_string(),
            "rejected_records": rejected_jsonl.display().to_string(),
            "quality_scoring": quality_csv.display().to_string(),
            "dimension_changelog": changelog_csv.display().to_string(),
            "institution_provenance": provenance_csv.display().to_string(),
            "download_manifest": manifest_csv.display().to_string(),
            "access_audit": audit_csv.display().to_string(),
            "author_recovery_queue": queue_csv.display().to_string(),
        },
    }))
}

fn gated(records: &[CanonicalRecord], gate: QualityGate) -> Vec<CanonicalRecord> {
    records
        .iter()
        .filter(|r| r.quality_gate == gate)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

pub async fn run_search(
    config: PipelineConfig,
    client: reqwest::Client,
    out: &Path,
    error_log: Option<&Path>,
) -> anyhow::Result<serde_json::Value> {
    let policy = RetryPolicy::new(config.max_retries);
    let expanded = expand_queries(&config.queries, config.strategy);
    let adapters = build_adapters(
        client.clone(),
        policy,
        &config.sources,
        &AdapterKeys {
            ncbi: config.ncbi_api_key.clone(),
            core: config.core_api_key.clone(),
            semantic: config.semantic_api_key.clone(),
        },
    );
    let outcome = run_fanout(
        &adapters,
        &expanded,
        config.retmax,
        &config.date_range,
        config.strategy,
        config.max_workers,
        Duration::from_secs(config.request_timeout_secs),
    )
    .await;
    let raw_candidates = outcome.records.len();
    let mut records = dedup_records(outcome.records);

    let idconv = IdConvClient::new(client.clone(), policy, config.unpaywall_email.clone());
    let cache = PmcidCache::default();
    enrich_pmcids(&mut records, &idconv, &cache, config.pmc_lookup_limit).await;
    for record in records.iter_mut() {
        if let Ok(source) = record.source.parse::<SourceId>() {
            record.open_access_flag = record.open_access_flag
                || open_access_hint(source, &record.url, &record.pmcid);
        }
    }

    report::write_jsonl(out, &records)?;
    if let Some(log) = error_log {
        report::write_source_errors_json(log, &outcome.errors)?;
    }

    Ok(json!({
        "base_queries": config.queries.len(),
        "expanded_queries": expanded.len(),
        "sources": config.sources.iter().map(SourceId::as_str).collect::<Vec<_>>(),
        "raw_candidates": raw_candidates,
        "deduped_candidates": records.len(),
        "errors": outcome.errors.len(),
        "output_jsonl": out.display().to_string(),
    }))
}
