//! Credibility scoring and the quality gate. Five additive sub-scores
//! (source, journal, citation, design, integrity) minus a capped penalty
//! produce a 0..100 credibility score, which the gate turns into a usage
//! tier. Hard rejects bypass the score entirely.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use regex::Regex;
use serde::Serialize;

use litscout_common::types::{
    CanonicalRecord, CredibilityTier, PreprintPolicy, QualityGate, SourceId,
};

// ---------------------------------------------------------------------------
// Keyword tables
// ---------------------------------------------------------------------------

const JOURNAL_TIER_A_KEYWORDS: [&str; 9] = [
    "lancet",
    "new england journal of medicine",
    "nejm",
    "jama",
    "journal of clinical oncology",
    "jco",
    "annals of oncology",
    "nature medicine",
    "bmj",
];

const JOURNAL_TIER_B_KEYWORDS: [&str; 8] = [
    "clinical cancer research",
    "esmo open",
    "oncology",
    "cancer",
    "gastroenterology",
    "annals of surgery",
    "pancreatology",
    "pharmacoeconomics",
];

const HIGH_INSTITUTION_KEYWORDS: [&str; 14] = [
    "harvard",
    "stanford",
    "oxford",
    "cambridge",
    "memorial sloan",
    "mayo clinic",
    "johns hopkins",
    "md anderson",
    "nih",
    "nci",
    "fudan",
    "peking",
    "tsinghua",
    "karolinska",
];

static QOL_ECON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bqaly\b|quality-adjusted|cost-effectiveness|icer|qalm|pharmacoeconomic")
        .expect("valid regex")
});
static OBSERVATIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"real[- ]world|registry|retrospective|cohort|observational|database analysis")
        .expect("valid regex")
});
static DESIGN_RANDOMIZED_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\brandomized\b",
        r"\brandomised\b",
        r"\bphase\s*iii\b",
        r"\bphase\s*3\b",
        r"\bmulticenter\b",
        r"\bmulticentre\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

const UNKNOWN_SOURCE_CRED_BASE: i32 = 8;

// ---------------------------------------------------------------------------
// Parameters and counts
// ---------------------------------------------------------------------------

/// Gate configuration for one run.
#[derive(Debug, Clone)]
pub struct ScoringParams {
    pub quality_filter: bool,
    pub core_threshold: i32,
    pub extended_threshold: i32,
    pub citation_age_window: i32,
    pub young_compensation: bool,
    pub preprint_policy: PreprintPolicy,
}

/// Records per gate after scoring (or after a guard holdout).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityCounts {
    pub core_pass: usize,
    pub extended_review: usize,
    pub preprint_extended: usize,
    pub reject: usize,
}

pub fn count_gates(records: &[CanonicalRecord]) -> QualityCounts {
    let mut counts = QualityCounts::default();
    for rec in records {
        match rec.quality_gate {
            QualityGate::CorePass => counts.core_pass += 1,
            QualityGate::ExtendedReview => counts.extended_review += 1,
            QualityGate::PreprintExtended => counts.preprint_extended += 1,
            QualityGate::Reject => counts.reject += 1,
        }
    }
    counts
}

// ---------------------------------------------------------------------------
// Sub-scores
// ---------------------------------------------------------------------------

fn discipline_profile(text: &str) -> &'static str {
    if QOL_ECON_RE.is_match(text) {
        return "qol_health_econ";
    }
    if OBSERVATIONAL_RE.is_match(text) {
        return "observational_realworld";
    }
    "clinical_trial"
}

fn source_cred_base(source: &str) -> i32 {
    SourceId::from_str(source)
        .map(|id| id.cred_base())
        .unwrap_or(UNKNOWN_SOURCE_CRED_BASE)
}

fn source_cred(record: &CanonicalRecord) -> i32 {
    let mut base = source_cred_base(&record.source);
    if !record.pmid.is_empty() {
        base += 1;
    }
    if !record.pmcid.is_empty() {
        base += 1;
    }
    base.clamp(0, 20)
}

fn journal_tier(journal: &str) -> &'static str {
    let j = journal.trim().to_lowercase();
    if j.is_empty() {
        return "U";
    }
    if JOURNAL_TIER_A_KEYWORDS.iter().any(|k| j.contains(k)) {
        return "A";
    }
    if JOURNAL_TIER_B_KEYWORDS.iter().any(|k| j.contains(k)) {
        return "B";
    }
    "C"
}

fn journal_cred(tier: &str) -> i32 {
    match tier {
        "A" => 25,
        "B" => 18,
        "C" => 10,
        _ => 5,
    }
}

fn institution_signal(record: &CanonicalRecord) -> &'static str {
    let joined = record
        .institution_names
        .iter()
        .map(|n| n.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if HIGH_INSTITUTION_KEYWORDS.iter().any(|k| joined.contains(k)) {
        return "high";
    }
    if !joined.trim().is_empty() {
        return "medium";
    }
    "low"
}

fn design_cred(record: &CanonicalRecord, profile: &str) -> (i32, bool) {
    let text = format!(
        "{} {} {}",
        record.title, record.abstract_text, record.study_design
    )
    .to_lowercase();
    let hits = DESIGN_RANDOMIZED_RES
        .iter()
        .filter(|re| re.is_match(&text))
        .count() as i32;
    let strong = hits >= 1;
    let score = match profile {
        "clinical_trial" => 10 + hits * 5,
        "qol_health_econ" => 8 + hits * 4,
        _ => 6 + hits * 3,
    };
    (score.clamp(0, 25), strong)
}

fn citation_stats(record: &CanonicalRecord, window: i32, current_year: i32) -> (u32, i32, f64) {
    let cited = record.cited_by_count;
    let year = record.year.unwrap_or(current_year);
    let age = (current_year - year + 1).max(1);
    let mut adjusted = f64::from(cited) / f64::from(age).powf(0.7);
    if age <= window.max(1) {
        adjusted *= 1.15;
    }
    (cited, age, (adjusted * 10_000.0).round() / 10_000.0)
}

fn citation_cred(profile: &str, cited: u32, age: i32, adjusted: f64, window: i32) -> i32 {
    let mut raw = match profile {
        "qol_health_econ" => adjusted * 3.2,
        "observational_realworld" => adjusted * 2.4,
        _ => adjusted * 2.1,
    };
    if age <= window.max(1) && cited <= 2 {
        raw += 2.0;
    }
    (raw.round() as i32).clamp(0, 20)
}

fn integrity_cred(record: &CanonicalRecord) -> i32 {
    let mut score = 0;
    if record.has_abstract() {
        score += 4;
    }
    if !record.doi.is_empty() {
        score += 2;
    }
    if !record.pmid.is_empty() || !record.pmcid.is_empty() {
        score += 2;
    }
    if record.open_access_flag {
        score += 1;
    }
    if matches!(record.source.as_str(), "pubmed" | "europe_pmc" | "openalex") {
        score += 1;
    }
    score.clamp(0, 10)
}

fn topic_mismatch(text: &str) -> bool {
    !text.contains("pancrea")
}

fn quality_penalty(
    record: &CanonicalRecord,
    topic_bad: bool,
    has_identifier: bool,
    profile: &str,
    preprint_flag: bool,
) -> (i32, String) {
    let mut penalty = 0;
    let mut reasons: Vec<&str> = Vec::new();

    if topic_bad {
        penalty += 35;
        reasons.push("topic_mismatch");
    }
    if !has_identifier {
        penalty += 35;
        reasons.push("no_identifier");
    }
    if preprint_flag {
        penalty += 10;
        reasons.push("preprint");
    }
    if record.retracted_flag {
        penalty += 40;
        reasons.push("retracted");
    }
    if !record.has_abstract() {
        penalty += 6;
        reasons.push("missing_abstract");
    }
    if source_cred_base(&record.source) <= 7 {
        penalty += 4;
        reasons.push("low_source_confidence");
    }
    if profile == "observational_realworld" && !record.title.to_lowercase().contains("random") {
        penalty += 2;
        reasons.push("non_randomized_design");
    }

    (penalty.clamp(0, 40), reasons.join(","))
}

fn credibility_tier(gate: QualityGate, score: i32) -> CredibilityTier {
    match gate {
        QualityGate::CorePass => CredibilityTier::High,
        QualityGate::ExtendedReview | QualityGate::PreprintExtended => CredibilityTier::Medium,
        QualityGate::Reject => {
            if score >= 70 {
                CredibilityTier::High
            } else if score >= 50 {
                CredibilityTier::Medium
            } else {
                CredibilityTier::Low
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Scores every record in place and assigns its quality gate. Returns the
/// per-gate counts.
pub fn apply_quality_scoring(
    records: &mut [CanonicalRecord],
    params: &ScoringParams,
) -> QualityCounts {
    let current_year = Utc::now().year();
    score_records(records, params, current_year);
    count_gates(records)
}

// Split from the public entry point so tests can pin the year.
fn score_records(records: &mut [CanonicalRecord], params: &ScoringParams, current_year: i32) {
    for rec in records.iter_mut() {
        let text = rec.search_text();
        let profile = discipline_profile(&text);
        let src_cred = source_cred(rec);
        let j_tier = journal_tier(&rec.journal);
        let j_cred = journal_cred(j_tier);
        let (cited, age, adjusted) = citation_stats(rec, params.citation_age_window, current_year);
        let cit_cred = citation_cred(profile, cited, age, adjusted, params.citation_age_window);
        let (des_cred, design_strong) = design_cred(rec, profile);
        let int_cred = integrity_cred(rec);
        let signal = institution_signal(rec);
        let preprint_flag = rec.preprint_flag
            || SourceId::from_str(&rec.source)
                .map(|id| id.is_preprint_server())
                .unwrap_or(false);
        let topic_bad = topic_mismatch(&text);
        let has_identifier = rec.has_identifier();
        let (penalty, penalty_reasons) =
            quality_penalty(rec, topic_bad, has_identifier, profile, preprint_flag);

        let raw = src_cred + j_cred + cit_cred + des_cred + int_cred - penalty;
        let mut score = raw.clamp(0, 100);

        let mut hard_reject: Vec<&str> = Vec::new();
        if rec.retracted_flag {
            hard_reject.push("retracted");
        }
        if topic_bad {
            hard_reject.push("topic_mismatch");
        }
        if !has_identifier {
            hard_reject.push("no_identifier");
        }

        // Fresh articles with near-zero citations get a second chance when
        // another strength vouches for them. Only records that would otherwise
        // fall below the extended threshold are lifted, and they keep a
        // distinct reason so the audit trail shows the compensation.
        let mut young_compensated = false;
        if params.young_compensation
            && score < params.extended_threshold
            && age <= params.citation_age_window
            && cit_cred <= 4
            && (j_tier == "A" || signal == "high" || design_strong)
        {
            young_compensated = true;
            score = params.extended_threshold;
        }

        let (gate, rejection_reason) = if !params.quality_filter {
            (QualityGate::CorePass, String::new())
        } else if !hard_reject.is_empty() {
            hard_reject.sort_unstable();
            hard_reject.dedup();
            (QualityGate::Reject, hard_reject.join(","))
        } else if preprint_flag && params.preprint_policy == PreprintPolicy::SeparateSheet {
            (QualityGate::PreprintExtended, "preprint_separate_sheet".to_string())
        } else if score >= params.core_threshold {
            (QualityGate::CorePass, String::new())
        } else if young_compensated {
            (QualityGate::ExtendedReview, "young_article_compensated".to_string())
        } else if score >= params.extended_threshold {
            (QualityGate::ExtendedReview, "below_core_threshold".to_string())
        } else {
            (QualityGate::Reject, "low_credibility_score".to_string())
        };

        rec.discipline_profile = profile.to_string();
        rec.source_cred = src_cred;
        rec.journal_tier = j_tier.to_string();
        rec.journal_cred = j_cred;
        rec.cited_by_count = cited;
        rec.citation_age_years = age;
        rec.citation_age_adjusted = adjusted;
        rec.citation_cred = cit_cred;
        rec.design_cred = des_cred;
        rec.integrity_cred = int_cred;
        rec.institution_signal = signal.to_string();
        rec.preprint_flag = preprint_flag;
        rec.credibility_score = score;
        rec.quality_penalty = penalty;
        rec.quality_penalty_reasons = penalty_reasons;
        rec.credibility_tier = credibility_tier(gate, score);
        rec.quality_gate = gate;
        rec.rejection_reason = rejection_reason;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ScoringParams {
        ScoringParams {
            quality_filter: true,
            core_threshold: 70,
            extended_threshold: 55,
            citation_age_window: 3,
            young_compensation: true,
            preprint_policy: PreprintPolicy::SeparateSheet,
        }
    }

    fn strong_record() -> CanonicalRecord {
        CanonicalRecord {
            title: "Randomized phase 3 trial in metastatic pancreatic cancer".to_string(),
            abstract_text: "Median overall survival improved in pancreatic adenocarcinoma."
                .to_string(),
            journal: "The Lancet Oncology".to_string(),
            source: "pubmed".to_string(),
            doi: "10.1000/trial".to_string(),
            pmid: "12345".to_string(),
            cited_by_count: 120,
            year: Some(2018),
            open_access_flag: true,
            ..CanonicalRecord::default()
        }
    }

    #[test]
    fn strong_record_passes_core() {
        let mut records = vec![strong_record()];
        score_records(&mut records, &params(), 2026);
        let rec = &records[0];
        assert_eq!(rec.quality_gate, QualityGate::CorePass);
        assert_eq!(rec.credibility_tier, CredibilityTier::High);
        assert_eq!(rec.journal_tier, "A");
        assert_eq!(rec.source_cred, 19);
        assert!(rec.design_cred >= 15);
        assert!(rec.rejection_reason.is_empty());
    }

    #[test]
    fn retraction_is_a_hard_reject() {
        let mut rec = strong_record();
        rec.retracted_flag = true;
        let mut records = vec![rec];
        score_records(&mut records, &params(), 2026);
        assert_eq!(records[0].quality_gate, QualityGate::Reject);
        assert_eq!(records[0].rejection_reason, "retracted");
        assert!(records[0].quality_penalty_reasons.contains("retracted"));
    }

    #[test]
    fn off_topic_and_unidentified_reasons_are_sorted_and_joined() {
        let mut rec = strong_record();
        rec.title = "A trial in melanoma".to_string();
        rec.abstract_text = "No relevant disease terms.".to_string();
        rec.doi.clear();
        rec.pmid.clear();
        rec.pmcid.clear();
        let mut records = vec![rec];
        score_records(&mut records, &params(), 2026);
        assert_eq!(records[0].quality_gate, QualityGate::Reject);
        assert_eq!(records[0].rejection_reason, "no_identifier,topic_mismatch");
    }

    #[test]
    fn preprints_route_to_their_own_sheet() {
        let mut rec = strong_record();
        rec.source = "medrxiv".to_string();
        rec.preprint_flag = false;
        let mut records = vec![rec];
        score_records(&mut records, &params(), 2026);
        assert!(records[0].preprint_flag);
        assert_eq!(records[0].quality_gate, QualityGate::PreprintExtended);
        assert_eq!(records[0].rejection_reason, "preprint_separate_sheet");
        assert_eq!(records[0].credibility_tier, CredibilityTier::Medium);
    }

    #[test]
    fn preprints_can_compete_under_allow_core() {
        let mut p = params();
        p.preprint_policy = PreprintPolicy::AllowCore;
        let mut rec = strong_record();
        rec.preprint_flag = true;
        let mut records = vec![rec];
        score_records(&mut records, &p, 2026);
        assert_ne!(records[0].quality_gate, QualityGate::PreprintExtended);
    }

    #[test]
    fn young_uncited_article_is_compensated() {
        let mut rec = strong_record();
        rec.year = Some(2026);
        rec.cited_by_count = 0;
        rec.journal = "Some Regional Bulletin".to_string();
        rec.open_access_flag = false;
        rec.abstract_text = "pancreatic cancer case series".to_string();
        rec.title = "Randomized pancreatic study".to_string();
        let mut records = vec![rec];
        score_records(&mut records, &params(), 2026);
        let rec = &records[0];
        assert!(rec.credibility_score >= 55);
        assert_ne!(rec.quality_gate, QualityGate::Reject);
    }

    #[test]
    fn compensated_article_carries_its_own_reason() {
        // Pre-lift: openaire 9 + tier A 25 + freshness 2 + design 10 +
        // integrity 6 = 52, below the extended threshold of 55.
        let rec = CanonicalRecord {
            title: "First-line therapy report in pancreatic adenocarcinoma".to_string(),
            abstract_text: "Early pancreatic adenocarcinoma response data from a single arm."
                .to_string(),
            journal: "The Lancet".to_string(),
            source: "openaire".to_string(),
            doi: "10.1000/young".to_string(),
            cited_by_count: 0,
            year: Some(2026),
            ..CanonicalRecord::default()
        };
        let mut records = vec![rec];
        score_records(&mut records, &params(), 2026);
        let rec = &records[0];
        assert_eq!(rec.quality_gate, QualityGate::ExtendedReview);
        assert_eq!(rec.rejection_reason, "young_article_compensated");
        assert_eq!(rec.credibility_score, 55);
    }

    #[test]
    fn naturally_extended_article_is_not_relabelled() {
        let mut p = params();
        p.core_threshold = 98;
        let mut records = vec![strong_record()];
        score_records(&mut records, &p, 2026);
        let rec = &records[0];
        assert_eq!(rec.quality_gate, QualityGate::ExtendedReview);
        assert_eq!(rec.rejection_reason, "below_core_threshold");
    }

    #[test]
    fn filter_off_admits_everything() {
        let mut p = params();
        p.quality_filter = false;
        let mut rec = strong_record();
        rec.retracted_flag = true;
        let mut records = vec![rec];
        score_records(&mut records, &p, 2026);
        assert_eq!(records[0].quality_gate, QualityGate::CorePass);
        assert!(records[0].rejection_reason.is_empty());
    }

    #[test]
    fn citation_stats_adjust_for_age() {
        let rec = CanonicalRecord {
            cited_by_count: 100,
            year: Some(2019),
            ..CanonicalRecord::default()
        };
        let (cited, age, adjusted) = citation_stats(&rec, 3, 2026);
        assert_eq!(cited, 100);
        assert_eq!(age, 8);
        // 100 / 8^0.7, no freshness bonus outside the window.
        assert!((adjusted - 23.3258).abs() < 1e-3);
    }

    #[test]
    fn journal_tiers_from_keywords() {
        assert_eq!(journal_tier("The Lancet"), "A");
        assert_eq!(journal_tier("Pancreatology"), "B");
        assert_eq!(journal_tier("Obscure Letters"), "C");
        assert_eq!(journal_tier("  "), "U");
    }

    #[test]
    fn unknown_source_is_penalized_below_confidence_floor() {
        assert_eq!(source_cred_base("mystery_feed"), 8);
        assert_eq!(source_cred_base("biorxiv"), 6);
        let mut rec = strong_record();
        rec.source = "biorxiv".to_string();
        let (_, reasons) = quality_penalty(&rec, false, true, "clinical_trial", true);
        assert!(reasons.contains("low_source_confidence"));
    }
}
