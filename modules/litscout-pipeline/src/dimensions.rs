//! Evidence dimension taxonomy: a curated set of clinical endpoints, a
//! text classifier that maps records onto them, and a persistent catalog
//! with promotion and deprecation lifecycle tracked across runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use litscout_common::types::CanonicalRecord;

pub const DIMENSION_VERSION: &str = "v1";
pub const CATALOG_VERSION: &str = "1.0";
pub const FALLBACK_DIMENSION: &str = "custom_clinical_signal";
pub const PROMOTION_RULE: &str = ">=2 independent source types and >=1 tier S/A source";

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DimensionStatus {
    Core,
    #[default]
    Candidate,
    Deprecated,
}

impl DimensionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionStatus::Core => "core",
            DimensionStatus::Candidate => "candidate",
            DimensionStatus::Deprecated => "deprecated",
        }
    }
}

struct Builtin {
    name: &'static str,
    category: &'static str,
    unit: &'static str,
    definition_source: &'static str,
    allowed_tasks: &'static [&'static str],
    default_status: DimensionStatus,
}

fn builtin(dimension_id: &str) -> Option<Builtin> {
    use DimensionStatus::{Candidate, Core};
    let b = match dimension_id {
        "os_median" => Builtin {
            name: "Median Overall Survival",
            category: "survival",
            unit: "months",
            definition_source: "RECIST/oncology-trial standard endpoint definitions",
            allowed_tasks: &["task1"],
            default_status: Core,
        },
        "os_hr_ci" => Builtin {
            name: "Overall Survival Hazard Ratio with CI",
            category: "survival",
            unit: "HR(95%CI)",
            definition_source: "CONSORT/clinical trial reporting convention",
            allowed_tasks: &["task1"],
            default_status: Candidate,
        },
        "pfs_median" => Builtin {
            name: "Median Progression-Free Survival",
            category: "survival",
            unit: "months",
            definition_source: "RECIST/oncology-trial standard endpoint definitions",
            allowed_tasks: &["task1"],
            default_status: Core,
        },
        "pfs_hr_ci" => Builtin {
            name: "Progression-Free Survival Hazard Ratio with CI",
            category: "survival",
            unit: "HR(95%CI)",
            definition_source: "CONSORT/clinical trial reporting convention",
            allowed_tasks: &["task1"],
            default_status: Candidate,
        },
        "orr" => Builtin {
            name: "Objective Response Rate",
            category: "tumor_control",
            unit: "%",
            definition_source: "RECIST objective response definition",
            allowed_tasks: &["task2"],
            default_status: Core,
        },
        "bicr_orr" => Builtin {
            name: "BICR Objective Response Rate",
            category: "tumor_control",
            unit: "%",
            definition_source: "RECIST independent central review standard",
            allowed_tasks: &["task2"],
            default_status: Candidate,
        },
        "dcr" => Builtin {
            name: "Disease Control Rate",
            category: "tumor_control",
            unit: "%",
            definition_source: "RECIST disease-control endpoint convention",
            allowed_tasks: &["task2"],
            default_status: Core,
        },
        "r0_resection_rate" => Builtin {
            name: "R0 Resection Rate",
            category: "tumor_control",
            unit: "%",
            definition_source: "Surgical oncology margin-negative resection standard",
            allowed_tasks: &["task2"],
            default_status: Candidate,
        },
        "pcr_rate" => Builtin {
            name: "Pathologic Complete Response Rate",
            category: "tumor_control",
            unit: "%",
            definition_source: "Pathology response reporting standard",
            allowed_tasks: &["task2"],
            default_status: Candidate,
        },
        "ca199_response_rate" => Builtin {
            name: "CA19-9 Response Rate",
            category: "tumor_control",
            unit: "%",
            definition_source: "Pancreatic cancer biomarker response convention",
            allowed_tasks: &["task2"],
            default_status: Candidate,
        },
        "ae_grade3plus" => Builtin {
            name: "Grade >=3 Adverse Event Rate",
            category: "safety_qol",
            unit: "%",
            definition_source: "CTCAE grade >=3 toxicity convention",
            allowed_tasks: &["task3"],
            default_status: Core,
        },
        "sae_rate" => Builtin {
            name: "Serious Adverse Event Rate",
            category: "safety_qol",
            unit: "%",
            definition_source: "Serious adverse event reporting convention",
            allowed_tasks: &["task3"],
            default_status: Candidate,
        },
        "trd_rate" => Builtin {
            name: "Treatment-Related Death Rate",
            category: "safety_qol",
            unit: "%",
            definition_source: "Trial safety mortality reporting standard",
            allowed_tasks: &["task3"],
            default_status: Core,
        },
        "ae_discontinuation_rate" => Builtin {
            name: "AE-driven Treatment Discontinuation Rate",
            category: "safety_qol",
            unit: "%",
            definition_source: "Treatment exposure and tolerability reporting standard",
            allowed_tasks: &["task3"],
            default_status: Candidate,
        },
        "ae_dose_reduction_rate" => Builtin {
            name: "AE-driven Dose Reduction Rate",
            category: "safety_qol",
            unit: "%",
            definition_source: "Dose intensity and safety reporting convention",
            allowed_tasks: &["task3"],
            default_status: Candidate,
        },
        "qol_score" => Builtin {
            name: "Quality of Life Composite Result",
            category: "safety_qol",
            unit: "score/text",
            definition_source: "EORTC/FACT/PRO reporting convention",
            allowed_tasks: &["task3"],
            default_status: Core,
        },
        "tudd" => Builtin {
            name: "Time Until Definitive Deterioration",
            category: "safety_qol",
            unit: "time",
            definition_source: "PRO deterioration-time endpoint convention",
            allowed_tasks: &["task3"],
            default_status: Candidate,
        },
        "qaly" => Builtin {
            name: "Quality Adjusted Life Year",
            category: "safety_qol",
            unit: "QALY",
            definition_source: "Health technology assessment methodology",
            allowed_tasks: &["task3"],
            default_status: Core,
        },
        "icer" => Builtin {
            name: "Incremental Cost-Effectiveness Ratio",
            category: "safety_qol",
            unit: "cost/QALY",
            definition_source: "Health technology assessment methodology",
            allowed_tasks: &["task3"],
            default_status: Candidate,
        },
        _ => return None,
    };
    Some(b)
}

const BUILTIN_IDS: [&str; 19] = [
    "os_median",
    "os_hr_ci",
    "pfs_median",
    "pfs_hr_ci",
    "orr",
    "bicr_orr",
    "dcr",
    "r0_resection_rate",
    "pcr_rate",
    "ca199_response_rate",
    "ae_grade3plus",
    "sae_rate",
    "trd_rate",
    "ae_discontinuation_rate",
    "ae_dose_reduction_rate",
    "qol_score",
    "tudd",
    "qaly",
    "icer",
];

// ---------------------------------------------------------------------------
// Catalog entries
// ---------------------------------------------------------------------------

/// One dimension row in the persistent catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionEntry {
    pub dimension_id: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub definition_source: String,
    pub allowed_tasks: Vec<String>,
    pub status: DimensionStatus,
    pub first_seen_run: String,
    pub last_seen_run: String,
    pub promotion_rule: String,
    #[serde(default)]
    pub missing_runs: u32,
}

/// Builds the entry for `dimension_id`: the curated definition when the
/// id is known, a text-discovery default otherwise.
pub fn default_entry(dimension_id: &str, run_id: &str) -> DimensionEntry {
    match builtin(dimension_id) {
        Some(b) => DimensionEntry {
            dimension_id: dimension_id.to_string(),
            name: b.name.to_string(),
            category: b.category.to_string(),
            unit: b.unit.to_string(),
            definition_source: b.definition_source.to_string(),
            allowed_tasks: b.allowed_tasks.iter().map(|t| t.to_string()).collect(),
            status: b.default_status,
            first_seen_run: run_id.to_string(),
            last_seen_run: run_id.to_string(),
            promotion_rule: PROMOTION_RULE.to_string(),
            missing_runs: 0,
        },
        None => DimensionEntry {
            dimension_id: dimension_id.to_string(),
            name: dimension_id.to_string(),
            category: "custom".to_string(),
            unit: "text".to_string(),
            definition_source: "auto_discovered_from_biomedical_text".to_string(),
            allowed_tasks: vec!["task1".to_string(), "task2".to_string(), "task3".to_string()],
            status: DimensionStatus::Candidate,
            first_seen_run: run_id.to_string(),
            last_seen_run: run_id.to_string(),
            promotion_rule: PROMOTION_RULE.to_string(),
            missing_runs: 0,
        },
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

fn priority(dimension_id: &str) -> usize {
    const ORDER: [&str; 8] = [
        "os_median",
        "pfs_median",
        "orr",
        "dcr",
        "ae_grade3plus",
        "qol_score",
        "qaly",
        "icer",
    ];
    ORDER
        .iter()
        .position(|d| *d == dimension_id)
        .unwrap_or(ORDER.len() + 10)
}

static HR_CI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"hazard ratio|\bhr\b|\b95% ci\b").expect("valid regex"));
static BICR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bbicr\b|independent central review").expect("valid regex"));
static SAE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsae\b|serious adverse event").expect("valid regex"));
static TRD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"treatment[- ]related death|grade\s*5").expect("valid regex"));
static DOSE_REDUCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dose reduction|reduced dose").expect("valid regex"));
static DISCONTINUATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"discontinuation|treatment interruption|stopped treatment").expect("valid regex")
});
static CA199_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"ca19-?9").expect("valid regex"));
static R0_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\br0\b|margin[- ]negative resection").expect("valid regex"));
static PCR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpcr\b|pathologic complete response").expect("valid regex"));
static TUDD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tudd|time until definitive deterioration").expect("valid regex"));

/// Maps a record onto dimension ids from its coverage flags plus finer
/// text rules. Deduplicated and ordered headline-endpoints-first; records
/// matching nothing fall back to the custom-signal bucket.
pub fn discover_dimension_ids(record: &CanonicalRecord) -> Vec<String> {
    let flags = record.coverage_flags;
    let text = record.search_text();
    let mut found: BTreeSet<&str> = BTreeSet::new();

    if flags.os {
        found.insert("os_median");
    }
    if flags.pfs {
        found.insert("pfs_median");
    }
    if flags.orr {
        found.insert("orr");
        found.insert("dcr");
    }
    if flags.ae {
        found.insert("ae_grade3plus");
    }
    if flags.qol {
        found.insert("qol_score");
    }
    if flags.qaly {
        found.insert("qaly");
        found.insert("icer");
    }

    if HR_CI_RE.is_match(&text) {
        found.insert("os_hr_ci");
        found.insert("pfs_hr_ci");
    }
    if BICR_RE.is_match(&text) {
        found.insert("bicr_orr");
    }
    if SAE_RE.is_match(&text) {
        found.insert("sae_rate");
    }
    if TRD_RE.is_match(&text) {
        found.insert("trd_rate");
    }
    if DOSE_REDUCTION_RE.is_match(&text) {
        found.insert("ae_dose_reduction_rate");
    }
    if DISCONTINUATION_RE.is_match(&text) {
        found.insert("ae_discontinuation_rate");
    }
    if CA199_RE.is_match(&text) {
        found.insert("ca199_response_rate");
    }
    if R0_RE.is_match(&text) {
        found.insert("r0_resection_rate");
    }
    if PCR_RE.is_match(&text) {
        found.insert("pcr_rate");
    }
    if TUDD_RE.is_match(&text) {
        found.insert("tudd");
    }

    if found.is_empty() {
        return vec![FALLBACK_DIMENSION.to_string()];
    }
    // BTreeSet iteration is alphabetical, so equal-priority ids keep a
    // deterministic order after the stable sort.
    let mut ids: Vec<String> = found.into_iter().map(|s| s.to_string()).collect();
    ids.sort_by_key(|id| priority(id));
    ids
}

// ---------------------------------------------------------------------------
// Catalog store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionCatalog {
    pub catalog_version: String,
    #[serde(default)]
    pub last_run: String,
    pub dimensions: Vec<DimensionEntry>,
}

impl DimensionCatalog {
    fn seeded(run_id: &str) -> Self {
        let mut ids = BUILTIN_IDS.to_vec();
        ids.sort_unstable();
        DimensionCatalog {
            catalog_version: CATALOG_VERSION.to_string(),
            last_run: String::new(),
            dimensions: ids.iter().map(|id| default_entry(id, run_id)).collect(),
        }
    }

    pub fn by_dimension(&self) -> HashMap<String, DimensionEntry> {
        self.dimensions
            .iter()
            .map(|d| (d.dimension_id.clone(), d.clone()))
            .collect()
    }
}

/// Loads the catalog from `path`, seeding the curated definitions when the
/// file is absent or holds no dimensions. The seeded catalog is persisted
/// immediately so the next run sees a stable baseline.
pub fn ensure_catalog(path: &Path, run_id: &str) -> anyhow::Result<DimensionCatalog> {
    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading dimension catalog {}", path.display()))?;
        if !raw.trim().is_empty() {
            let catalog: DimensionCatalog = serde_json::from_str(&raw)
                .with_context(|| format!("parsing dimension catalog {}", path.display()))?;
            if !catalog.dimensions.is_empty() {
                return Ok(catalog);
            }
        }
    }
    let catalog = DimensionCatalog::seeded(run_id);
    save_catalog(path, &catalog)?;
    info!(dimensions = catalog.dimensions.len(), "Seeded dimension catalog");
    Ok(catalog)
}

pub fn save_catalog(path: &Path, catalog: &DimensionCatalog) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(catalog)?;
    fs::write(path, body)
        .with_context(|| format!("writing dimension catalog {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Run update + changelog
// ---------------------------------------------------------------------------

/// One lifecycle event recorded in dimension_changelog.csv.
#[derive(Debug, Clone, Serialize)]
pub struct ChangelogEntry {
    pub run_id: String,
    pub dimension_id: String,
    pub action: String,
    pub old_status: String,
    pub new_status: String,
    pub reason: String,
    pub source_types: String,
    pub source_tiers: String,
    pub count: usize,
}

struct DimensionStats {
    source_types: BTreeSet<String>,
    source_tiers: BTreeSet<String>,
    count: usize,
}

impl DimensionStats {
    fn qualifies_core(&self) -> bool {
        self.source_types.len() >= 2
            && self.source_tiers.iter().any(|t| t == "S" || t == "A")
    }

    fn joined_types(&self) -> String {
        self.source_types.iter().cloned().collect::<Vec<_>>().join("|")
    }

    fn joined_tiers(&self) -> String {
        self.source_tiers.iter().cloned().collect::<Vec<_>>().join("|")
    }
}

fn build_stats(records: &[CanonicalRecord]) -> BTreeMap<String, DimensionStats> {
    let mut stats: BTreeMap<String, DimensionStats> = BTreeMap::new();
    for rec in records {
        for did in &rec.dimension_ids {
            let entry = stats.entry(did.clone()).or_insert_with(|| DimensionStats {
                source_types: BTreeSet::new(),
                source_tiers: BTreeSet::new(),
                count: 0,
            });
            let type_class = if rec.source_type_class.is_empty() {
                "literature".to_string()
            } else {
                rec.source_type_class.clone()
            };
            entry.source_types.insert(type_class);
            let tier = if rec.source_tier.is_empty() {
                "C".to_string()
            } else {
                rec.source_tier.clone()
            };
            entry.source_tiers.insert(tier);
            if !rec.institution_tier.is_empty() {
                entry.source_types.insert("institution".to_string());
            }
            entry.count += 1;
        }
    }
    stats
}

/// Applies one run's observations to the catalog. Newly observed ids are
/// added, observed candidates meeting the promotion rule become core, and
/// entries unseen for two consecutive runs are deprecated for good.
pub fn update_catalog(
    path: &Path,
    catalog: &mut DimensionCatalog,
    records: &[CanonicalRecord],
    run_id: &str,
) -> anyhow::Result<Vec<ChangelogEntry>> {
    let stats = build_stats(records);
    let mut changelog = Vec::new();
    let mut existing: BTreeMap<String, DimensionEntry> = catalog
        .dimensions
        .drain(..)
        .map(|d| (d.dimension_id.clone(), d))
        .collect();

    for (did, st) in &stats {
        match existing.get_mut(did) {
            None => {
                let mut row = default_entry(did, run_id);
                if st.qualifies_core() {
                    row.status = DimensionStatus::Core;
                }
                changelog.push(ChangelogEntry {
                    run_id: run_id.to_string(),
                    dimension_id: did.clone(),
                    action: "added".to_string(),
                    old_status: String::new(),
                    new_status: row.status.as_str().to_string(),
                    reason: "observed_in_current_run".to_string(),
                    source_types: st.joined_types(),
                    source_tiers: st.joined_tiers(),
                    count: st.count,
                });
                existing.insert(did.clone(), row);
            }
            Some(row) => {
                let old_status = row.status;
                row.last_seen_run = run_id.to_string();
                row.missing_runs = 0;
                if old_status == DimensionStatus::Candidate && st.qualifies_core() {
                    row.status = DimensionStatus::Core;
                    changelog.push(ChangelogEntry {
                        run_id: run_id.to_string(),
                        dimension_id: did.clone(),
                        action: "promoted".to_string(),
                        old_status: old_status.as_str().to_string(),
                        new_status: "core".to_string(),
                        reason: "met_promotion_rule".to_string(),
                        source_types: st.joined_types(),
                        source_tiers: st.joined_tiers(),
                        count: st.count,
                    });
                }
            }
        }
    }

    for (did, row) in existing.iter_mut() {
        if stats.contains_key(did) {
            continue;
        }
        row.missing_runs += 1;
        if row.missing_runs >= 2 && row.status != DimensionStatus::Deprecated {
            let old_status = row.status;
            row.status = DimensionStatus::Deprecated;
            changelog.push(ChangelogEntry {
                run_id: run_id.to_string(),
                dimension_id: did.clone(),
                action: "deprecated".to_string(),
                old_status: old_status.as_str().to_string(),
                new_status: "deprecated".to_string(),
                reason: "missing_for_two_consecutive_runs".to_string(),
                source_types: String::new(),
                source_tiers: String::new(),
                count: 0,
            });
        }
    }

    catalog.dimensions = existing.into_values().collect();
    catalog.last_run = run_id.to_string();
    save_catalog(path, catalog)?;
    Ok(changelog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use litscout_common::types::CoverageFlags;

    fn record_with(title: &str, abstract_text: &str) -> CanonicalRecord {
        let mut rec = CanonicalRecord {
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            ..CanonicalRecord::default()
        };
        rec.coverage_flags = crate::normalize::coverage_flags(title, abstract_text);
        rec
    }

    #[test]
    fn discovery_orders_headline_endpoints_first() {
        let rec = record_with(
            "Randomized trial",
            "Median overall survival and grade 3 adverse events; hazard ratio 0.71.",
        );
        let ids = discover_dimension_ids(&rec);
        assert_eq!(ids[0], "os_median");
        assert!(ids.contains(&"ae_grade3plus".to_string()));
        assert!(ids.contains(&"os_hr_ci".to_string()));
        let os_pos = ids.iter().position(|d| d == "os_median").unwrap();
        let hr_pos = ids.iter().position(|d| d == "os_hr_ci").unwrap();
        assert!(os_pos < hr_pos);
    }

    #[test]
    fn discovery_falls_back_to_custom_signal() {
        let rec = record_with("Proteomics of pancreatic tissue", "Mass spectrometry methods.");
        assert_eq!(discover_dimension_ids(&rec), vec![FALLBACK_DIMENSION.to_string()]);
    }

    #[test]
    fn orr_flag_implies_dcr() {
        let rec = record_with("Response", "Objective response rate was 34%.");
        let ids = discover_dimension_ids(&rec);
        assert!(ids.contains(&"orr".to_string()));
        assert!(ids.contains(&"dcr".to_string()));
    }

    #[test]
    fn seeded_catalog_has_all_curated_dimensions() {
        let catalog = DimensionCatalog::seeded("run1");
        assert_eq!(catalog.dimensions.len(), 19);
        let os = catalog
            .dimensions
            .iter()
            .find(|d| d.dimension_id == "os_median")
            .unwrap();
        assert_eq!(os.status, DimensionStatus::Core);
        assert_eq!(os.unit, "months");
        let sae = catalog
            .dimensions
            .iter()
            .find(|d| d.dimension_id == "sae_rate")
            .unwrap();
        assert_eq!(sae.status, DimensionStatus::Candidate);
    }

    fn annotated(dim: &str, type_class: &str, tier: &str) -> CanonicalRecord {
        CanonicalRecord {
            dimension_ids: vec![dim.to_string()],
            dimension_id: dim.to_string(),
            source_type_class: type_class.to_string(),
            source_tier: tier.to_string(),
            ..CanonicalRecord::default()
        }
    }

    #[test]
    fn candidate_promotes_on_two_source_types_with_strong_tier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dimensions.json");
        let mut catalog = ensure_catalog(&path, "run1").unwrap();

        let mut inst = annotated("sae_rate", "literature", "S");
        inst.institution_tier = "top".to_string();
        let records = vec![annotated("sae_rate", "literature", "S"), inst];
        let changelog = update_catalog(&path, &mut catalog, &records, "run1").unwrap();

        let promoted: Vec<_> = changelog.iter().filter(|c| c.action == "promoted").collect();
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].dimension_id, "sae_rate");
        assert_eq!(promoted[0].reason, "met_promotion_rule");
        let row = catalog
            .dimensions
            .iter()
            .find(|d| d.dimension_id == "sae_rate")
            .unwrap();
        assert_eq!(row.status, DimensionStatus::Core);
    }

    #[test]
    fn unseen_dimension_deprecates_after_two_runs_and_stays_deprecated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dimensions.json");
        let mut catalog = ensure_catalog(&path, "run1").unwrap();

        let records = vec![annotated("os_median", "literature", "S")];
        let c1 = update_catalog(&path, &mut catalog, &records, "run1").unwrap();
        assert!(c1.iter().all(|c| c.dimension_id != "tudd"));

        let c2 = update_catalog(&path, &mut catalog, &records, "run2").unwrap();
        let deprecated: Vec<_> = c2
            .iter()
            .filter(|c| c.action == "deprecated" && c.dimension_id == "tudd")
            .collect();
        assert_eq!(deprecated.len(), 1);
        assert_eq!(deprecated[0].reason, "missing_for_two_consecutive_runs");

        // A third silent run does not emit another deprecation event.
        let c3 = update_catalog(&path, &mut catalog, &records, "run3").unwrap();
        assert!(c3.iter().all(|c| c.dimension_id != "tudd"));
    }

    #[test]
    fn observation_resets_missing_run_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dimensions.json");
        let mut catalog = ensure_catalog(&path, "run1").unwrap();

        let without = vec![annotated("os_median", "literature", "S")];
        update_catalog(&path, &mut catalog, &without, "run1").unwrap();
        let with = vec![annotated("tudd", "literature", "C")];
        update_catalog(&path, &mut catalog, &with, "run2").unwrap();
        let row = catalog.dimensions.iter().find(|d| d.dimension_id == "tudd").unwrap();
        assert_eq!(row.missing_runs, 0);
        assert_eq!(row.last_seen_run, "run2");
    }

    #[test]
    fn novel_dimension_is_added_from_observation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dimensions.json");
        let mut catalog = ensure_catalog(&path, "run1").unwrap();

        let records = vec![annotated(FALLBACK_DIMENSION, "literature", "C")];
        let changelog = update_catalog(&path, &mut catalog, &records, "run1").unwrap();
        let added: Vec<_> = changelog.iter().filter(|c| c.action == "added").collect();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].reason, "observed_in_current_run");
        let row = catalog
            .dimensions
            .iter()
            .find(|d| d.dimension_id == FALLBACK_DIMENSION)
            .unwrap();
        assert_eq!(row.status, DimensionStatus::Candidate);
        assert_eq!(row.definition_source, "auto_discovered_from_biomedical_text");
    }
}
