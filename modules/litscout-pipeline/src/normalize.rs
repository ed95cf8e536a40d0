//! Normalization: adapter output into the canonical record schema.
//! Missing fields degrade the record, they never drop it.

use std::sync::LazyLock;

use regex::Regex;

use litscout_common::text::{clean_text, coerce_year, make_uid, normalize_doi};
use litscout_common::types::{CanonicalRecord, ContentLevel, CoverageFlags, RawRecord, SourceId, Strategy};

static OS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\boverall survival\b|\bos\b").expect("valid regex"));
static PFS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"progression[- ]free survival|\bpfs\b").expect("valid regex"));
static ORR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"objective response|\borr\b|\bdcr\b|\bcr\b").expect("valid regex"));
static AE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"adverse event|ctcae|grade\s*[34]|treatment-related death").expect("valid regex")
});
static QOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"quality of life|\bqol\b|eq-5d|qlq-c30|pain").expect("valid regex"));
static QALY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bqaly\b|quality-adjusted|\bqalm\b|cost-effectiveness").expect("valid regex")
});

/// Evidence-topic booleans over title + abstract.
pub fn coverage_flags(title: &str, abstract_text: &str) -> CoverageFlags {
    let text = format!("{title} {abstract_text}").to_lowercase();
    CoverageFlags {
        os: OS_RE.is_match(&text),
        pfs: PFS_RE.is_match(&text),
        orr: ORR_RE.is_match(&text),
        ae: AE_RE.is_match(&text),
        qol: QOL_RE.is_match(&text),
        qaly: QALY_RE.is_match(&text),
    }
}

/// Keyword-weighted relevance used to break duplicate-key ties and to
/// order the candidate list.
pub fn relevance_score(record: &CanonicalRecord, strategy: Strategy) -> f64 {
    let text = record.search_text();
    let mut score = 0.0;

    if text.contains("pancreatic") {
        score += 2.0;
    }
    if text.contains("cancer") || text.contains("adenocarcinoma") {
        score += 1.2;
    }
    if text.contains("random") {
        score += 1.2;
    }
    if text.contains("phase iii") || text.contains("phase 3") {
        score += 1.2;
    }
    if text.contains("metastatic") || text.contains("locally advanced") || text.contains("unresectable") {
        score += 1.0;
    }

    score += 0.8 * f64::from(record.coverage_flags.breadth());

    match record.source.as_str() {
        "pubmed" => score += 0.5,
        "crossref" | "semantic" => score += 0.2,
        _ => {}
    }

    match strategy {
        Strategy::Precision => {
            if !text.contains("pancreatic") {
                score -= 3.0;
            }
            if !text.contains("random") {
                score -= 1.5;
            }
        }
        Strategy::Recall => score += 0.2,
        Strategy::Balance => {}
    }

    (score * 10_000.0).round() / 10_000.0
}

/// Open-access guess before any enrichment confirms it.
pub fn open_access_hint(source: SourceId, url: &str, pmcid: &str) -> bool {
    if !pmcid.is_empty() || source.is_preprint_server() {
        return true;
    }
    let u = url.to_lowercase();
    u.contains("pmc") || u.contains("medrxiv") || u.contains("biorxiv") || u.ends_with(".pdf")
}

pub fn normalize(raw: RawRecord, source: SourceId, query: &str, strategy: Strategy) -> CanonicalRecord {
    let title = clean_text(&raw.title);
    let abstract_text = clean_text(&raw.abstract_text);
    let doi = normalize_doi(&raw.doi);
    let pmid = raw.pmid.trim().to_string();
    let pmcid = raw.pmcid.trim().to_uppercase();
    let year = raw
        .year
        .or_else(|| coerce_year(&raw.published_date))
        .or_else(|| coerce_year(&title))
        .or_else(|| coerce_year(&abstract_text));
    let url = raw.url.trim().to_string();
    let open_access = raw.open_access || open_access_hint(source, &url, &pmcid);
    let preprint_flag = raw.preprint_flag || source.is_preprint_server();
    let flags = coverage_flags(&title, &abstract_text);
    let has_abstract = !abstract_text.is_empty();

    let mut record = CanonicalRecord {
        uid: make_uid(&doi, &pmid, &title, year, source.as_str()),
        title,
        abstract_source: if has_abstract {
            source.as_str().to_string()
        } else {
            String::new()
        },
        reason_abstract_missing: if has_abstract {
            String::new()
        } else {
            "not_backfilled".to_string()
        },
        reason_not_parsed: if has_abstract {
            String::new()
        } else {
            "missing_abstract".to_string()
        },
        abstract_text,
        doi,
        pmid,
        pmcid,
        year,
        journal: clean_text(&raw.journal),
        source: source.as_str().to_string(),
        url,
        cited_by_count: raw.cited_by_count,
        institution_names: raw.institution_names,
        coverage_flags: flags,
        matched_query: query.to_string(),
        open_access_flag: open_access,
        preprint_flag,
        retracted_flag: raw.retracted_flag,
        content_level: ContentLevel::Metadata,
        ..CanonicalRecord::default()
    };
    record.relevance_score = relevance_score(&record, strategy);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawRecord {
        RawRecord {
            title: "Randomized phase III trial in metastatic pancreatic cancer".to_string(),
            abstract_text: "Overall survival and quality of life improved.".to_string(),
            doi: "10.1056/NEJMoa1011923".to_string(),
            pmid: "21561347".to_string(),
            year: Some(2011),
            journal: "N Engl J Med".to_string(),
            url: "https://pubmed.ncbi.nlm.nih.gov/21561347/".to_string(),
            ..RawRecord::default()
        }
    }

    #[test]
    fn coverage_flags_match_topic_patterns() {
        let flags = coverage_flags(
            "Overall survival and ORR",
            "Grade 3 adverse events; QALY and cost-effectiveness; EQ-5D",
        );
        assert!(flags.os && flags.orr && flags.ae && flags.qol && flags.qaly);
        assert!(!flags.pfs);
        assert_eq!(flags.breadth(), 5);
    }

    #[test]
    fn normalization_degrades_missing_fields() {
        let record = normalize(
            RawRecord {
                title: "Untitled cohort (2019)".to_string(),
                ..RawRecord::default()
            },
            SourceId::Crossref,
            "q",
            Strategy::Recall,
        );
        assert!(record.uid.starts_with("hash:"));
        assert_eq!(record.year, Some(2019));
        assert_eq!(record.reason_abstract_missing, "not_backfilled");
        assert_eq!(record.reason_not_parsed, "missing_abstract");
        assert!(record.abstract_source.is_empty());
    }

    #[test]
    fn uid_prefers_doi() {
        let record = normalize(raw(), SourceId::Pubmed, "q", Strategy::Recall);
        assert_eq!(record.uid, "doi:10.1056/nejmoa1011923");
        assert_eq!(record.abstract_source, "pubmed");
    }

    #[test]
    fn relevance_weights_follow_strategy() {
        let record = normalize(raw(), SourceId::Pubmed, "q", Strategy::Recall);
        // pancreatic 2.0 + cancer 1.2 + random 1.2 + phase iii 1.2 +
        // metastatic 1.0 + 3 flags (os, qol via "quality of life", orr? no)
        assert!(record.relevance_score > 6.0);

        let mut off_topic = normalize(
            RawRecord {
                title: "Colorectal screening".to_string(),
                ..RawRecord::default()
            },
            SourceId::OpenAire,
            "q",
            Strategy::Precision,
        );
        off_topic.relevance_score = relevance_score(&off_topic, Strategy::Precision);
        assert!(off_topic.relevance_score < 0.0);
    }

    #[test]
    fn oa_hint_from_pmcid_and_preprint_server() {
        assert!(open_access_hint(SourceId::Crossref, "", "PMC1"));
        assert!(open_access_hint(SourceId::Medrxiv, "", ""));
        assert!(open_access_hint(SourceId::Crossref, "https://x.org/a.pdf", ""));
        assert!(!open_access_hint(SourceId::Crossref, "https://x.org/a", ""));
    }
}
