//! Shared record types for the curation pipeline.
//!
//! `CanonicalRecord` is the single record schema every stage reads and
//! mutates. Source adapters emit `RawRecord`; the normalizer is the only
//! producer of `CanonicalRecord`s, so unknown upstream fields never leak
//! past the normalization boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Source identifiers
// ---------------------------------------------------------------------------

/// External bibliographic services the pipeline can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceId {
    #[serde(rename = "pubmed")]
    Pubmed,
    #[serde(rename = "europe_pmc")]
    EuropePmc,
    #[serde(rename = "openalex")]
    OpenAlex,
    #[serde(rename = "crossref")]
    Crossref,
    #[serde(rename = "semantic")]
    Semantic,
    #[serde(rename = "openaire")]
    OpenAire,
    #[serde(rename = "core")]
    Core,
    #[serde(rename = "medrxiv")]
    Medrxiv,
    #[serde(rename = "biorxiv")]
    Biorxiv,
}

impl SourceId {
    pub const ALL: [SourceId; 9] = [
        SourceId::Pubmed,
        SourceId::EuropePmc,
        SourceId::OpenAlex,
        SourceId::Crossref,
        SourceId::Semantic,
        SourceId::OpenAire,
        SourceId::Core,
        SourceId::Medrxiv,
        SourceId::Biorxiv,
    ];

    /// Sources queried when no explicit selection is given.
    pub const DEFAULTS: [SourceId; 6] = [
        SourceId::Pubmed,
        SourceId::EuropePmc,
        SourceId::OpenAlex,
        SourceId::Crossref,
        SourceId::Medrxiv,
        SourceId::Biorxiv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Pubmed => "pubmed",
            SourceId::EuropePmc => "europe_pmc",
            SourceId::OpenAlex => "openalex",
            SourceId::Crossref => "crossref",
            SourceId::Semantic => "semantic",
            SourceId::OpenAire => "openaire",
            SourceId::Core => "core",
            SourceId::Medrxiv => "medrxiv",
            SourceId::Biorxiv => "biorxiv",
        }
    }

    /// Fixed base contribution to source credibility.
    pub fn cred_base(&self) -> i32 {
        match self {
            SourceId::Pubmed => 18,
            SourceId::EuropePmc => 17,
            SourceId::OpenAlex => 14,
            SourceId::Crossref => 12,
            SourceId::Semantic => 11,
            SourceId::Core => 10,
            SourceId::OpenAire => 9,
            SourceId::Medrxiv => 6,
            SourceId::Biorxiv => 6,
        }
    }

    /// Everything this server hosts is a preprint.
    pub fn is_preprint_server(&self) -> bool {
        matches!(self, SourceId::Medrxiv | SourceId::Biorxiv)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceId::ALL
            .iter()
            .find(|id| id.as_str() == s.trim())
            .copied()
            .ok_or_else(|| format!("unsupported source id: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Run policies
// ---------------------------------------------------------------------------

/// Retrieval strategy controlling query expansion and relevance penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Recall,
    Balance,
    Precision,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Recall => "recall",
            Strategy::Balance => "balance",
            Strategy::Precision => "precision",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "recall" => Ok(Strategy::Recall),
            "balance" => Ok(Strategy::Balance),
            "precision" => Ok(Strategy::Precision),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// What to do with preprints that survive scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreprintPolicy {
    /// Route preprints to their own extended tier.
    #[default]
    SeparateSheet,
    /// Let preprints compete for core_pass on score alone.
    AllowCore,
}

impl FromStr for PreprintPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "separate_sheet" => Ok(PreprintPolicy::SeparateSheet),
            "allow_core" => Ok(PreprintPolicy::AllowCore),
            other => Err(format!("unknown preprint policy: {other}")),
        }
    }
}

/// Publication date bounds, each a year or a full date string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl DateRange {
    pub fn year_from(&self) -> Option<i32> {
        self.from.as_deref().and_then(crate::text::coerce_year)
    }

    pub fn year_to(&self) -> Option<i32> {
        self.to.as_deref().and_then(crate::text::coerce_year)
    }

    /// Records without a year pass through; only a known out-of-range year
    /// is excluded.
    pub fn contains(&self, year: Option<i32>) -> bool {
        let Some(y) = year else { return true };
        if let Some(from) = self.year_from() {
            if y < from {
                return false;
            }
        }
        if let Some(to) = self.year_to() {
            if y > to {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

// ---------------------------------------------------------------------------
// Record classification enums
// ---------------------------------------------------------------------------

/// Usage tier assigned by the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityGate {
    #[default]
    CorePass,
    ExtendedReview,
    PreprintExtended,
    Reject,
}

impl QualityGate {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityGate::CorePass => "core_pass",
            QualityGate::ExtendedReview => "extended_review",
            QualityGate::PreprintExtended => "preprint_extended",
            QualityGate::Reject => "reject",
        }
    }
}

impl fmt::Display for QualityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of a record's text is locally available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentLevel {
    #[default]
    Metadata,
    Abstract,
    Fulltext,
}

impl ContentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentLevel::Metadata => "metadata",
            ContentLevel::Abstract => "abstract",
            ContentLevel::Fulltext => "fulltext",
        }
    }
}

impl fmt::Display for ContentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse credibility class derived from gate and score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredibilityTier {
    High,
    Medium,
    #[default]
    Low,
}

impl CredibilityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredibilityTier::High => "high",
            CredibilityTier::Medium => "medium",
            CredibilityTier::Low => "low",
        }
    }
}

impl fmt::Display for CredibilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance grouping by country of the strongest institutional signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CountryGroup {
    ChinaTopCenters,
    DevelopedMarkets,
    #[default]
    Other,
}

impl CountryGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountryGroup::ChinaTopCenters => "china_top_centers",
            CountryGroup::DevelopedMarkets => "developed_markets",
            CountryGroup::Other => "other",
        }
    }

    pub fn from_country(country: &str) -> Self {
        const DEVELOPED: [&str; 18] = [
            "us", "usa", "uk", "gb", "eu", "fr", "de", "it", "es", "nl", "se", "ch", "ca", "au",
            "jp", "kr", "il", "sg",
        ];
        let c = country.trim().to_lowercase();
        if matches!(c.as_str(), "cn" | "china" | "prc") {
            return CountryGroup::ChinaTopCenters;
        }
        if DEVELOPED.contains(&c.as_str()) {
            return CountryGroup::DevelopedMarkets;
        }
        CountryGroup::Other
    }
}

impl fmt::Display for CountryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Coverage flags
// ---------------------------------------------------------------------------

/// Topic-signal booleans computed over title + abstract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageFlags {
    pub os: bool,
    pub pfs: bool,
    pub orr: bool,
    pub ae: bool,
    pub qol: bool,
    pub qaly: bool,
}

impl CoverageFlags {
    /// Number of distinct evidence topics the text speaks to.
    pub fn breadth(&self) -> u32 {
        [self.os, self.pfs, self.orr, self.ae, self.qol, self.qaly]
            .iter()
            .filter(|f| **f)
            .count() as u32
    }
}

// ---------------------------------------------------------------------------
// Raw adapter output
// ---------------------------------------------------------------------------

/// The loose shape every source adapter maps its response into.
/// Absent fields stay empty; the normalizer degrades them, never drops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub doi: String,
    pub pmid: String,
    pub pmcid: String,
    pub year: Option<i32>,
    pub published_date: String,
    pub journal: String,
    pub url: String,
    pub cited_by_count: u32,
    pub institution_names: Vec<String>,
    pub open_access: bool,
    pub preprint_flag: bool,
    pub retracted_flag: bool,
}

// ---------------------------------------------------------------------------
// Canonical record
// ---------------------------------------------------------------------------

/// One candidate publication flowing through the pipeline.
///
/// Created by a source adapter + the normalizer; mutated in place by the
/// deduplicator, enricher, classifier, registry annotation, scorer, and
/// quality guard. Never deleted; rejected records keep `quality_gate =
/// reject` for auditability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Stable identity key: doi-based, else pmid-based, else a hash of
    /// (normalized title, year, source).
    pub uid: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub doi: String,
    pub pmid: String,
    pub pmcid: String,
    pub year: Option<i32>,
    pub journal: String,
    pub source: String,
    pub url: String,
    pub cited_by_count: u32,
    pub institution_names: Vec<String>,
    pub study_design: String,
    pub coverage_flags: CoverageFlags,
    pub relevance_score: f64,
    pub matched_query: String,

    // Open-access state (enricher)
    pub open_access_flag: bool,
    pub oa_locations: Vec<String>,
    pub rights_status: String,
    pub abstract_source: String,
    pub reason_abstract_missing: String,
    pub reason_not_parsed: String,
    pub content_level: ContentLevel,

    // Preprint / retraction signals
    pub preprint_flag: bool,
    pub retracted_flag: bool,

    // Dimension classification
    #[serde(default)]
    pub dimension_ids: Vec<String>,
    #[serde(default)]
    pub dimension_id: String,
    #[serde(default)]
    pub dimension_version: String,
    #[serde(default)]
    pub definition_source: String,

    // Registry annotation
    #[serde(default)]
    pub value_source: String,
    #[serde(default)]
    pub source_tier: String,
    #[serde(default)]
    pub source_type_class: String,
    #[serde(default)]
    pub institution_name: String,
    #[serde(default)]
    pub institution_tier: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub country_group: CountryGroup,

    // Credibility scoring
    #[serde(default)]
    pub discipline_profile: String,
    #[serde(default)]
    pub source_cred: i32,
    #[serde(default)]
    pub journal_tier: String,
    #[serde(default)]
    pub journal_cred: i32,
    #[serde(default)]
    pub citation_age_years: i32,
    #[serde(default)]
    pub citation_age_adjusted: f64,
    #[serde(default)]
    pub citation_cred: i32,
    #[serde(default)]
    pub design_cred: i32,
    #[serde(default)]
    pub integrity_cred: i32,
    #[serde(default)]
    pub institution_signal: String,
    #[serde(default)]
    pub quality_penalty: i32,
    #[serde(default)]
    pub quality_penalty_reasons: String,
    #[serde(default)]
    pub credibility_score: i32,
    #[serde(default)]
    pub credibility_tier: CredibilityTier,
    #[serde(default)]
    pub quality_gate: QualityGate,
    #[serde(default)]
    pub rejection_reason: String,
}

impl CanonicalRecord {
    /// Title + abstract, lowercased, for pattern rules.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text).to_lowercase()
    }

    pub fn has_identifier(&self) -> bool {
        !self.doi.is_empty() || !self.pmid.is_empty() || !self.pmcid.is_empty()
    }

    pub fn has_abstract(&self) -> bool {
        !crate::text::clean_text(&self.abstract_text).is_empty()
    }
}
