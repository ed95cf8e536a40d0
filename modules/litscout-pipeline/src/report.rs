//! Persisted run artifacts: tiered JSONL record files, the scoring and
//! provenance CSVs, the download manifest, the access audit, and the
//! author recovery queue. Every writer is a plain function over the final
//! record set so exports stay decoupled from pipeline stages.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use litscout_common::types::{
    CanonicalRecord, ContentLevel, CredibilityTier, QualityGate,
};

use crate::acquire::{DownloadRow, DownloadStatus};
use crate::dimensions::ChangelogEntry;
use crate::fanout::JobError;

// ---------------------------------------------------------------------------
// JSONL
// ---------------------------------------------------------------------------

pub fn write_jsonl(path: &Path, records: &[CanonicalRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for rec in records {
        serde_json::to_writer(&mut file, rec)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Quality scoring CSV
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct QualityScoringRow<'a> {
    uid: &'a str,
    title: &'a str,
    source: &'a str,
    year: Option<i32>,
    doi: &'a str,
    pmid: &'a str,
    pmcid: &'a str,
    dimension_id: &'a str,
    dimension_version: &'a str,
    definition_source: &'a str,
    value_source: &'a str,
    source_tier: &'a str,
    institution_tier: &'a str,
    country_group: &'a str,
    journal: &'a str,
    discipline_profile: &'a str,
    source_cred: i32,
    journal_cred: i32,
    citation_cred: i32,
    design_cred: i32,
    integrity_cred: i32,
    quality_penalty: i32,
    quality_penalty_reasons: &'a str,
    credibility_score: i32,
    credibility_tier: CredibilityTier,
    quality_gate: QualityGate,
    rejection_reason: &'a str,
    journal_tier: &'a str,
    citation_age_years: i32,
    citation_age_adjusted: f64,
    cited_by_count: u32,
    preprint_flag: bool,
    retracted_flag: bool,
    institution_signal: &'a str,
}

pub fn write_quality_scoring_csv(path: &Path, records: &[CanonicalRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for rec in records {
        writer.serialize(QualityScoringRow {
            uid: &rec.uid,
            title: &rec.title,
            source: &rec.source,
            year: rec.year,
            doi: &rec.doi,
            pmid: &rec.pmid,
            pmcid: &rec.pmcid,
            dimension_id: &rec.dimension_id,
            dimension_version: &rec.dimension_version,
            definition_source: &rec.definition_source,
            value_source: &rec.value_source,
            source_tier: &rec.source_tier,
            institution_tier: &rec.institution_tier,
            country_group: rec.country_group.as_str(),
            journal: &rec.journal,
            discipline_profile: &rec.discipline_profile,
            source_cred: rec.source_cred,
            journal_cred: rec.journal_cred,
            citation_cred: rec.citation_cred,
            design_cred: rec.design_cred,
            integrity_cred: rec.integrity_cred,
            quality_penalty: rec.quality_penalty,
            quality_penalty_reasons: &rec.quality_penalty_reasons,
            credibility_score: rec.credibility_score,
            credibility_tier: rec.credibility_tier,
            quality_gate: rec.quality_gate,
            rejection_reason: &rec.rejection_reason,
            journal_tier: &rec.journal_tier,
            citation_age_years: rec.citation_age_years,
            citation_age_adjusted: rec.citation_age_adjusted,
            cited_by_count: rec.cited_by_count,
            preprint_flag: rec.preprint_flag,
            retracted_flag: rec.retracted_flag,
            institution_signal: &rec.institution_signal,
        })?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Dimension changelog + institution provenance CSVs
// ---------------------------------------------------------------------------

pub fn write_dimension_changelog_csv(path: &Path, entries: &[ChangelogEntry]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct InstitutionProvenanceRow<'a> {
    uid: &'a str,
    title: &'a str,
    source: &'a str,
    value_source: &'a str,
    source_tier: &'a str,
    source_type_class: &'a str,
    institution_name: &'a str,
    institution_tier: &'a str,
    country: &'a str,
    country_group: &'a str,
    quality_gate: QualityGate,
}

/// One row per record that carries a recognized institutional affiliation.
pub fn write_institution_provenance_csv(
    path: &Path,
    records: &[CanonicalRecord],
) -> anyhow::Result<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut written = 0usize;
    for rec in records {
        if rec.institution_tier.is_empty() {
            continue;
        }
        writer.serialize(InstitutionProvenanceRow {
            uid: &rec.uid,
            title: &rec.title,
            source: &rec.source,
            value_source: &rec.value_source,
            source_tier: &rec.source_tier,
            source_type_class: &rec.source_type_class,
            institution_name: &rec.institution_name,
            institution_tier: &rec.institution_tier,
            country: &rec.country,
            country_group: rec.country_group.as_str(),
            quality_gate: rec.quality_gate,
        })?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

// ---------------------------------------------------------------------------
// Download manifest CSV
// ---------------------------------------------------------------------------

pub fn write_download_manifest_csv(path: &Path, rows: &[DownloadRow]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Access audit CSV
// ---------------------------------------------------------------------------

/// Records per locally available content level after the download phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentCounts {
    pub fulltext: usize,
    #[serde(rename = "abstract")]
    pub abstract_only: usize,
    pub metadata: usize,
}

fn content_level(record: &CanonicalRecord, drow: Option<&DownloadRow>) -> ContentLevel {
    if drow.is_some_and(|d| d.status == DownloadStatus::Success) {
        return ContentLevel::Fulltext;
    }
    if record.has_abstract() {
        return ContentLevel::Abstract;
    }
    ContentLevel::Metadata
}

fn next_step(record: &CanonicalRecord, drow: Option<&DownloadRow>) -> &'static str {
    if drow.is_some_and(|d| d.status == DownloadStatus::Success) {
        return "parsed_or_ready_for_extraction";
    }
    if record.doi.is_empty() && record.pmid.is_empty() {
        return "find_doi_or_pmid";
    }
    if !record.pmcid.is_empty() {
        return "retry_pmc_fetch";
    }
    if record.open_access_flag {
        return "retry_oa_location_or_direct_url";
    }
    if record.has_abstract() {
        return "metadata_and_abstract_available; consider institution access";
    }
    "run_author_recovery_or_registry_backfill"
}

#[derive(Serialize)]
struct AccessAuditRow<'a> {
    uid: &'a str,
    title: &'a str,
    doi: &'a str,
    pmid: &'a str,
    pmcid: &'a str,
    source: &'a str,
    dimension_id: &'a str,
    dimension_version: &'a str,
    definition_source: &'a str,
    value_source: &'a str,
    source_tier: &'a str,
    institution_tier: &'a str,
    country_group: &'a str,
    credibility_score: i32,
    credibility_tier: CredibilityTier,
    quality_gate: QualityGate,
    rejection_reason: &'a str,
    open_access_flag: bool,
    download_status: &'a str,
    channel: &'a str,
    content_level: ContentLevel,
    reason_not_downloaded: &'a str,
    reason_abstract_missing: &'a str,
    reason_not_parsed: &'a str,
    next_step: &'a str,
}

/// Writes the access audit and returns the content-level tally. Records
/// with no manifest row report download_status "failed" so gaps surface.
pub fn write_access_audit_csv(
    path: &Path,
    records: &[CanonicalRecord],
    downloads: &HashMap<String, DownloadRow>,
) -> anyhow::Result<ContentCounts> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut counts = ContentCounts::default();
    for rec in records {
        let drow = downloads.get(&rec.uid);
        let level = content_level(rec, drow);
        match level {
            ContentLevel::Fulltext => counts.fulltext += 1,
            ContentLevel::Abstract => counts.abstract_only += 1,
            ContentLevel::Metadata => counts.metadata += 1,
        }
        let reason_not_downloaded = drow
            .map(|d| {
                if d.reason_not_downloaded.is_empty() {
                    d.error_code.as_str()
                } else {
                    d.reason_not_downloaded.as_str()
                }
            })
            .unwrap_or("");
        writer.serialize(AccessAuditRow {
            uid: &rec.uid,
            title: &rec.title,
            doi: &rec.doi,
            pmid: &rec.pmid,
            pmcid: &rec.pmcid,
            source: &rec.source,
            dimension_id: &rec.dimension_id,
            dimension_version: &rec.dimension_version,
            definition_source: &rec.definition_source,
            value_source: &rec.value_source,
            source_tier: &rec.source_tier,
            institution_tier: &rec.institution_tier,
            country_group: rec.country_group.as_str(),
            credibility_score: rec.credibility_score,
            credibility_tier: rec.credibility_tier,
            quality_gate: rec.quality_gate,
            rejection_reason: &rec.rejection_reason,
            open_access_flag: rec.open_access_flag,
            download_status: drow.map(|d| d.status.as_str()).unwrap_or("failed"),
            channel: drow.map(|d| d.channel.as_str()).unwrap_or(""),
            content_level: level,
            reason_not_downloaded,
            reason_abstract_missing: &rec.reason_abstract_missing,
            reason_not_parsed: &rec.reason_not_parsed,
            next_step: next_step(rec, drow),
        })?;
    }
    writer.flush()?;
    Ok(counts)
}

// ---------------------------------------------------------------------------
// Author recovery queue CSV
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AuthorRecoveryRow<'a> {
    uid: &'a str,
    title: &'a str,
    doi: &'a str,
    pmid: &'a str,
    pmcid: &'a str,
    source: &'a str,
    reason: &'a str,
    suggested_action: &'a str,
}

/// Queues records an author or institutional repository could still
/// supply: not downloaded, but identified by DOI or PMID. Returns the
/// queue length.
pub fn write_author_recovery_queue_csv(
    path: &Path,
    records: &[CanonicalRecord],
    downloads: &HashMap<String, DownloadRow>,
) -> anyhow::Result<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut queued = 0usize;
    for rec in records {
        let drow = downloads.get(&rec.uid);
        if drow.is_some_and(|d| d.status == DownloadStatus::Success) {
            continue;
        }
        if rec.doi.is_empty() && rec.pmid.is_empty() {
            continue;
        }
        let reason = drow
            .map(|d| {
                if !d.reason_not_downloaded.is_empty() {
                    d.reason_not_downloaded.as_str()
                } else if !d.error_code.is_empty() {
                    d.error_code.as_str()
                } else {
                    "not_downloaded"
                }
            })
            .unwrap_or("not_downloaded");
        writer.serialize(AuthorRecoveryRow {
            uid: &rec.uid,
            title: &rec.title,
            doi: &rec.doi,
            pmid: &rec.pmid,
            pmcid: &rec.pmcid,
            source: &rec.source,
            reason,
            suggested_action: "collect_author_copy_or_institutional_repository_version",
        })?;
        queued += 1;
    }
    writer.flush()?;
    Ok(queued)
}

// ---------------------------------------------------------------------------
// Error log
// ---------------------------------------------------------------------------

/// Writes per-job source errors when any occurred. Returns whether a file
/// was written.
pub fn write_source_errors_json(path: &Path, errors: &[JobError]) -> anyhow::Result<bool> {
    if errors.is_empty() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(errors)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(errors = errors.len(), path = %path.display(), "Wrote source error log");
    Ok(true)
}
