//! Quality regression guard. Aggregate metrics over the core_pass cohort
//! are compared against a one-time baseline; any regression demotes the
//! whole core cohort to extended review for manual inspection instead of
//! silently shipping a degraded export.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use litscout_common::types::{CanonicalRecord, ContentLevel, QualityGate};

pub const HOLDOUT_REASON: &str = "quality_guard_holdout";

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Snapshot of the core cohort's health. An empty cohort reports the
/// worst abstract-only ratio so a later non-empty run can only improve it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GuardMetrics {
    pub core_median_credibility_score: f64,
    pub core_ab_tier_ratio: f64,
    pub core_abstract_only_ratio: f64,
    pub unresolved_conflict_count: f64,
}

pub fn guard_metrics(records: &[CanonicalRecord]) -> GuardMetrics {
    let core: Vec<&CanonicalRecord> = records
        .iter()
        .filter(|r| r.quality_gate == QualityGate::CorePass)
        .collect();
    if core.is_empty() {
        return GuardMetrics {
            core_median_credibility_score: 0.0,
            core_ab_tier_ratio: 0.0,
            core_abstract_only_ratio: 1.0,
            unresolved_conflict_count: 0.0,
        };
    }
    let mut scores: Vec<f64> = core.iter().map(|r| f64::from(r.credibility_score)).collect();
    scores.sort_by(|a, b| a.total_cmp(b));
    let mid = scores.len() / 2;
    let median = if scores.len() % 2 == 0 {
        (scores[mid - 1] + scores[mid]) / 2.0
    } else {
        scores[mid]
    };
    let n = core.len() as f64;
    let ab = core
        .iter()
        .filter(|r| matches!(r.journal_tier.as_str(), "A" | "B"))
        .count() as f64;
    let abstract_only = core
        .iter()
        .filter(|r| r.content_level != ContentLevel::Fulltext)
        .count() as f64;
    GuardMetrics {
        core_median_credibility_score: round6(median),
        core_ab_tier_ratio: round6(ab / n),
        core_abstract_only_ratio: round6(abstract_only / n),
        unresolved_conflict_count: 0.0,
    }
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Per-metric deltas, oriented so that positive means improvement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GuardDiff {
    pub core_median_credibility_score_diff: f64,
    pub core_ab_tier_ratio_diff: f64,
    pub core_abstract_only_ratio_diff: f64,
    pub unresolved_conflict_count_diff: f64,
    pub quality_guard_pass: bool,
}

pub fn guard_diff(baseline: &GuardMetrics, current: &GuardMetrics) -> GuardDiff {
    let score = round6(current.core_median_credibility_score - baseline.core_median_credibility_score);
    let ab = round6(current.core_ab_tier_ratio - baseline.core_ab_tier_ratio);
    // Lower is better for these two, so the sign is flipped.
    let abstract_only = round6(baseline.core_abstract_only_ratio - current.core_abstract_only_ratio);
    let conflicts = round6(baseline.unresolved_conflict_count - current.unresolved_conflict_count);
    let pass = [score, ab, abstract_only, conflicts].iter().all(|v| *v >= -1e-9);
    GuardDiff {
        core_median_credibility_score_diff: score,
        core_ab_tier_ratio_diff: ab,
        core_abstract_only_ratio_diff: abstract_only,
        unresolved_conflict_count_diff: conflicts,
        quality_guard_pass: pass,
    }
}

// ---------------------------------------------------------------------------
// Baseline store + evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GuardDiffFile<'a> {
    run_id: &'a str,
    baseline: &'a GuardMetrics,
    current: &'a GuardMetrics,
    diff: &'a GuardDiff,
}

/// Outcome of one guard evaluation, already persisted to disk.
#[derive(Debug, Clone, Copy)]
pub struct GuardOutcome {
    pub baseline: GuardMetrics,
    pub current: GuardMetrics,
    pub diff: GuardDiff,
}

/// Evaluates the guard for one run. The baseline file is written exactly
/// once, on the first run that finds it absent; after and diff snapshots
/// are rewritten every run.
pub fn evaluate(out_dir: &Path, records: &[CanonicalRecord], run_id: &str) -> anyhow::Result<GuardOutcome> {
    fs::create_dir_all(out_dir)?;
    let baseline_path = out_dir.join("quality_guard_baseline.json");
    let after_path = out_dir.join("quality_guard_after.json");
    let diff_path = out_dir.join("quality_guard_diff.json");

    let current = guard_metrics(records);
    let baseline = if baseline_path.exists() {
        let raw = fs::read_to_string(&baseline_path)
            .with_context(|| format!("reading guard baseline {}", baseline_path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing guard baseline {}", baseline_path.display()))?
    } else {
        fs::write(&baseline_path, serde_json::to_string_pretty(&current)?)?;
        info!(path = %baseline_path.display(), "Wrote quality guard baseline");
        current
    };

    let diff = guard_diff(&baseline, &current);
    fs::write(&after_path, serde_json::to_string_pretty(&current)?)?;
    let diff_file = GuardDiffFile { run_id, baseline: &baseline, current: &current, diff: &diff };
    fs::write(&diff_path, serde_json::to_string_pretty(&diff_file)?)?;

    Ok(GuardOutcome { baseline, current, diff })
}

/// Demotes every core_pass record to extended review. Applied when the
/// guard fails so the regressed cohort never reaches the core export.
pub fn apply_holdout(records: &mut [CanonicalRecord]) {
    let mut demoted = 0usize;
    for rec in records.iter_mut() {
        if rec.quality_gate != QualityGate::CorePass {
            continue;
        }
        rec.quality_gate = QualityGate::ExtendedReview;
        if rec.rejection_reason.is_empty() {
            rec.rejection_reason = HOLDOUT_REASON.to_string();
        } else {
            rec.rejection_reason = format!("{},{HOLDOUT_REASON}", rec.rejection_reason);
        }
        demoted += 1;
    }
    warn!(demoted, "Quality guard failed; core records held for review");
}
