//! Source registry: a persistent catalog of literature services, guideline
//! bodies, regulators, and named institutions, with the tiering metadata
//! the scorer and provenance reports read. Records are annotated in place
//! with registry lookups plus their classified dimensions.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use litscout_common::types::{CanonicalRecord, CountryGroup};

use crate::dimensions::{self, DimensionEntry, FALLBACK_DIMENSION};

pub const REGISTRY_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One registry row. Institution rows carry alias keywords matched against
/// author affiliations; service rows are keyed by the record's source id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRow {
    pub source_id: String,
    pub source_type: String,
    pub tier: String,
    pub country: String,
    #[serde(default)]
    pub institution_tier: String,
    #[serde(default)]
    pub reliability_rule: String,
    #[serde(default)]
    pub alias_keywords: Vec<String>,
}

fn row(
    source_id: &str,
    source_type: &str,
    tier: &str,
    country: &str,
    institution_tier: &str,
    reliability_rule: &str,
    aliases: &[&str],
) -> RegistryRow {
    RegistryRow {
        source_id: source_id.to_string(),
        source_type: source_type.to_string(),
        tier: tier.to_string(),
        country: country.to_string(),
        institution_tier: institution_tier.to_string(),
        reliability_rule: reliability_rule.to_string(),
        alias_keywords: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

fn default_rows() -> Vec<RegistryRow> {
    vec![
        row("pubmed", "literature", "S", "US", "", "indexed_biomedical_reference", &[]),
        row("europe_pmc", "literature", "S", "EU", "", "indexed_biomedical_reference", &[]),
        row("pmc", "literature", "S", "US", "", "fulltext_biomedical_archive", &["pmc", "pubmed central"]),
        row("openalex", "literature", "A", "INTL", "", "cross-indexed_scholarly_metadata", &[]),
        row("crossref", "literature", "A", "INTL", "", "doi_metadata_registry", &[]),
        row("nccn", "practice", "S", "US", "", "major_clinical_guideline", &["nccn"]),
        row("esmo", "practice", "S", "EU", "", "major_clinical_guideline", &["esmo"]),
        row("asco", "practice", "S", "US", "", "major_clinical_guideline", &["asco"]),
        row("csco", "practice", "A", "CN", "", "major_clinical_guideline", &["csco"]),
        row("fda", "regulatory", "S", "US", "", "regulatory_review_source", &["fda"]),
        row("ema", "regulatory", "S", "EU", "", "regulatory_review_source", &["ema"]),
        row("pmda", "regulatory", "S", "JP", "", "regulatory_review_source", &["pmda"]),
        row("clinicaltrials_gov", "regulatory", "A", "US", "", "trial_registry_result_source", &["clinicaltrials.gov", "nct"]),
        row("mayo_clinic", "institution", "A", "US", "top", "top_cancer_center", &["mayo clinic"]),
        row("md_anderson", "institution", "A", "US", "top", "top_cancer_center", &["md anderson"]),
        row("cleveland_clinic", "institution", "A", "US", "top", "top_cancer_center", &["cleveland clinic"]),
        row("msk", "institution", "A", "US", "top", "top_cancer_center", &["memorial sloan", "msk"]),
        row("dana_farber", "institution", "A", "US", "top", "top_cancer_center", &["dana-farber", "dana farber"]),
        row("sheba", "institution", "A", "IL", "top", "top_tertiary_center", &["sheba"]),
        row("rambam", "institution", "A", "IL", "top", "top_tertiary_center", &["rambam"]),
        row("assuta", "institution", "B", "IL", "high", "specialty_hospital", &["assuta"]),
        row("karolinska", "institution", "A", "SE", "top", "top_university_hospital", &["karolinska"]),
        row("uclh", "institution", "A", "UK", "top", "top_university_hospital", &["uclh", "university college london hospitals"]),
        row("gustave_roussy", "institution", "A", "FR", "top", "top_cancer_center", &["gustave roussy"]),
        row("pumch", "institution", "A", "CN", "top", "top_national_center", &["协和", "peking union medical college hospital", "pumch"]),
        row("west_china", "institution", "A", "CN", "top", "top_national_center", &["华西", "west china hospital"]),
        row("sjtu", "institution", "A", "CN", "top", "top_academic_center", &["上海交通大学", "shanghai jiao tong"]),
        row("fudan", "institution", "A", "CN", "top", "top_academic_center", &["复旦", "fudan"]),
        row("sun_yat_sen", "institution", "A", "CN", "top", "top_academic_center", &["中山", "sun yat-sen", "sysu"]),
    ]
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRegistry {
    pub registry_version: String,
    pub sources: Vec<RegistryRow>,
}

impl SourceRegistry {
    /// Index keyed by lowercase source id, plus institution rows for
    /// affiliation matching.
    pub fn index(&self) -> RegistryIndex<'_> {
        let mut source_map = HashMap::new();
        let mut institution_rows = Vec::new();
        for r in &self.sources {
            let sid = r.source_id.trim().to_lowercase();
            if sid.is_empty() {
                continue;
            }
            source_map.insert(sid, r);
            if r.source_type.eq_ignore_ascii_case("institution") {
                institution_rows.push(r);
            }
        }
        RegistryIndex { source_map, institution_rows }
    }
}

pub struct RegistryIndex<'a> {
    source_map: HashMap<String, &'a RegistryRow>,
    institution_rows: Vec<&'a RegistryRow>,
}

/// Loads the registry from `path`, seeding the default rows when the file
/// is absent or empty.
pub fn ensure_registry(path: &Path) -> anyhow::Result<SourceRegistry> {
    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading source registry {}", path.display()))?;
        if !raw.trim().is_empty() {
            let registry: SourceRegistry = serde_json::from_str(&raw)
                .with_context(|| format!("parsing source registry {}", path.display()))?;
            if !registry.sources.is_empty() {
                return Ok(registry);
            }
        }
    }
    let registry = SourceRegistry {
        registry_version: REGISTRY_VERSION.to_string(),
        sources: default_rows(),
    };
    save_registry(path, &registry)?;
    info!(sources = registry.sources.len(), "Seeded source registry");
    Ok(registry)
}

pub fn save_registry(path: &Path, registry: &SourceRegistry) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(registry)?;
    fs::write(path, body)
        .with_context(|| format!("writing source registry {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Institution matching + annotation
// ---------------------------------------------------------------------------

/// Best institution row by alias hits over joined lowercase affiliation
/// names. No hit means no institutional provenance.
fn match_institution<'a>(
    names: &[String],
    institution_rows: &[&'a RegistryRow],
) -> Option<&'a RegistryRow> {
    if names.is_empty() {
        return None;
    }
    let haystack = names
        .iter()
        .map(|n| n.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let mut best: Option<&RegistryRow> = None;
    let mut best_score = 0usize;
    for r in institution_rows {
        let score = r
            .alias_keywords
            .iter()
            .filter(|a| {
                let a = a.trim().to_lowercase();
                !a.is_empty() && haystack.contains(&a)
            })
            .count();
        if score > best_score {
            best_score = score;
            best = Some(r);
        }
    }
    best
}

/// Stamps registry and dimension provenance onto one record: source tier
/// and type, institutional affiliation when recognized, country grouping,
/// and the classified dimension ids with their catalog definition source.
pub fn annotate_record(
    record: &mut CanonicalRecord,
    index: &RegistryIndex<'_>,
    catalog_by_dimension: &HashMap<String, DimensionEntry>,
) {
    let source_key = record.source.trim().to_lowercase();
    let source_meta = index.source_map.get(&source_key);
    let source_tier = source_meta
        .map(|r| r.tier.to_uppercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "C".to_string());
    let source_type_class = source_meta
        .map(|r| r.source_type.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "literature".to_string());
    let source_country = source_meta
        .map(|r| r.country.clone())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "INTL".to_string());

    let inst_meta = match_institution(&record.institution_names, &index.institution_rows);
    let mut country = source_country;
    let mut institution_name = String::new();
    let mut institution_tier = String::new();
    if let Some(inst) = inst_meta {
        institution_name = inst.source_id.trim().to_string();
        institution_tier = inst.institution_tier.trim().to_string();
        if !inst.country.trim().is_empty() {
            country = inst.country.trim().to_string();
        }
    }

    let dim_ids = dimensions::discover_dimension_ids(record);
    let primary = dim_ids
        .first()
        .cloned()
        .unwrap_or_else(|| FALLBACK_DIMENSION.to_string());
    let definition_source = catalog_by_dimension
        .get(&primary)
        .map(|d| d.definition_source.clone())
        .unwrap_or_else(|| "auto_discovered_from_biomedical_text".to_string());

    let mut value_source = record.source.clone();
    if !record.journal.trim().is_empty() {
        value_source.push('|');
        value_source.push_str(record.journal.trim());
    }
    if !institution_name.is_empty() {
        value_source.push('|');
        value_source.push_str(&institution_name);
    }

    record.dimension_ids = dim_ids;
    record.dimension_id = primary;
    record.dimension_version = dimensions::DIMENSION_VERSION.to_string();
    record.definition_source = definition_source;
    record.value_source = value_source;
    record.source_tier = source_tier;
    record.source_type_class = source_type_class;
    record.institution_name = institution_name;
    record.institution_tier = institution_tier;
    record.country_group = CountryGroup::from_country(&country);
    record.country = country;
}

/// Re-reads definition_source per record after the catalog update, so
/// promotions within the same run are reflected in the exports.
pub fn refresh_definition_sources(
    records: &mut [CanonicalRecord],
    catalog_by_dimension: &HashMap<String, DimensionEntry>,
) {
    for record in records.iter_mut() {
        if let Some(entry) = catalog_by_dimension.get(&record.dimension_id) {
            record.definition_source = entry.definition_source.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SourceRegistry {
        SourceRegistry {
            registry_version: REGISTRY_VERSION.to_string(),
            sources: default_rows(),
        }
    }

    #[test]
    fn default_registry_has_expected_shape() {
        let reg = registry();
        assert_eq!(reg.sources.len(), 29);
        let idx = reg.index();
        assert_eq!(idx.institution_rows.len(), 16);
        assert_eq!(idx.source_map.get("pubmed").unwrap().tier, "S");
    }

    #[test]
    fn institution_match_prefers_most_alias_hits() {
        let reg = registry();
        let idx = reg.index();
        let names = vec![
            "Memorial Sloan Kettering Cancer Center (MSK)".to_string(),
            "Mayo Clinic".to_string(),
        ];
        let hit = match_institution(&names, &idx.institution_rows).unwrap();
        assert_eq!(hit.source_id, "msk");
    }

    #[test]
    fn cjk_aliases_match_affiliations() {
        let reg = registry();
        let idx = reg.index();
        let names = vec!["北京协和医院".to_string()];
        let hit = match_institution(&names, &idx.institution_rows).unwrap();
        assert_eq!(hit.source_id, "pumch");
    }

    #[test]
    fn annotation_fills_provenance_fields() {
        let reg = registry();
        let idx = reg.index();
        let catalog = crate::dimensions::DimensionCatalog {
            catalog_version: "1.0".to_string(),
            last_run: String::new(),
            dimensions: vec![crate::dimensions::default_entry("os_median", "run1")],
        };
        let by_dim = catalog.by_dimension();

        let mut rec = CanonicalRecord {
            source: "pubmed".to_string(),
            journal: "The Lancet Oncology".to_string(),
            title: "Overall survival in a randomized trial".to_string(),
            abstract_text: "Median overall survival was 11.1 months.".to_string(),
            institution_names: vec!["West China Hospital, Sichuan University".to_string()],
            ..CanonicalRecord::default()
        };
        rec.coverage_flags = crate::normalize::coverage_flags(&rec.title, &rec.abstract_text);
        annotate_record(&mut rec, &idx, &by_dim);

        assert_eq!(rec.source_tier, "S");
        assert_eq!(rec.source_type_class, "literature");
        assert_eq!(rec.institution_name, "west_china");
        assert_eq!(rec.institution_tier, "top");
        assert_eq!(rec.country, "CN");
        assert_eq!(rec.country_group, CountryGroup::ChinaTopCenters);
        assert_eq!(rec.dimension_id, "os_median");
        assert_eq!(rec.dimension_version, "v1");
        assert_eq!(rec.value_source, "pubmed|The Lancet Oncology|west_china");
    }

    #[test]
    fn unknown_source_gets_defaults() {
        let reg = registry();
        let idx = reg.index();
        let by_dim = HashMap::new();
        let mut rec = CanonicalRecord {
            source: "mystery_feed".to_string(),
            title: "no endpoints here".to_string(),
            ..CanonicalRecord::default()
        };
        annotate_record(&mut rec, &idx, &by_dim);
        assert_eq!(rec.source_tier, "C");
        assert_eq!(rec.source_type_class, "literature");
        assert_eq!(rec.country, "INTL");
        assert_eq!(rec.country_group, CountryGroup::Other);
        assert_eq!(rec.dimension_id, FALLBACK_DIMENSION);
        assert_eq!(rec.definition_source, "auto_discovered_from_biomedical_text");
    }
}
