//! Text normalization helpers shared by adapters and the pipeline.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x?[0-9a-fA-F]+);").expect("valid regex"));
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").expect("valid regex"));
static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
static UNSAFE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));
static PUBMED_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pubmed\.ncbi\.nlm\.nih\.gov/(\d+)").expect("valid regex"));
static PMCID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(PMC\d+)\b").expect("valid regex"));

/// Strips markup, unescapes common entities, and collapses whitespace.
/// Source APIs mix JATS fragments, HTML remnants, and plain text; this is
/// the one funnel everything passes through before comparison or export.
pub fn clean_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let without_tags = TAG_RE.replace_all(raw, " ");
    let unescaped = unescape_entities(&without_tags);
    WS_RE.replace_all(unescaped.trim(), " ").into_owned()
}

/// Minimal entity unescape covering what bibliographic APIs actually emit.
fn unescape_entities(text: &str) -> String {
    let text = NUMERIC_ENTITY_RE.replace_all(text, |caps: &regex::Captures| {
        let body = &caps[1];
        let code = if let Some(hex) = body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()
        } else {
            body.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

/// Lowercases a DOI and strips resolver prefixes so the same article keyed
/// via `https://doi.org/...` and a bare DOI collide.
pub fn normalize_doi(raw: &str) -> String {
    let mut doi = raw.trim().to_lowercase();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ] {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.to_string();
        }
    }
    doi.trim().to_string()
}

/// Extracts the first plausible publication year from a free-form date.
pub fn coerce_year(raw: &str) -> Option<i32> {
    YEAR_RE.find(raw).and_then(|m| m.as_str().parse().ok())
}

/// Title folded to a comparison key: lowercase alphanumerics with single
/// spaces, so punctuation and casing differences do not split duplicates.
pub fn normalize_title_key(title: &str) -> String {
    let cleaned = clean_text(title).to_lowercase();
    NON_ALNUM_RE.replace_all(&cleaned, " ").trim().to_string()
}

/// Stable record identity. DOI wins, then PMID, then a content hash over
/// (normalized title, year, source) so even identifier-less records dedup
/// deterministically across runs.
pub fn make_uid(doi: &str, pmid: &str, title: &str, year: Option<i32>, source: &str) -> String {
    let doi = normalize_doi(doi);
    if !doi.is_empty() {
        return format!("doi:{doi}");
    }
    let pmid = pmid.trim();
    if !pmid.is_empty() {
        return format!("pmid:{pmid}");
    }
    let key = format!(
        "{}|{}|{}",
        normalize_title_key(title),
        year.map(|y| y.to_string()).unwrap_or_default(),
        source
    );
    let digest = Sha256::digest(key.as_bytes());
    format!("hash:{}", &hex::encode(digest)[..16])
}

/// Filesystem-safe rendition of a uid for artifact names.
pub fn sanitize_uid(uid: &str) -> String {
    UNSAFE_PATH_RE.replace_all(uid, "_").to_string()
}

/// Pulls a PMID out of a PubMed URL.
pub fn pmid_from_url(url: &str) -> Option<String> {
    PUBMED_URL_RE.captures(url).map(|c| c[1].to_string())
}

/// Pulls a PMCID (with the PMC prefix) out of free text or a URL.
pub fn pmcid_from_text(text: &str) -> Option<String> {
    PMCID_RE.captures(text).map(|c| c[1].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_markup_and_entities() {
        let raw = "<jats:p>Overall survival &amp; safety of <i>nab</i>-paclitaxel</jats:p>";
        assert_eq!(
            clean_text(raw),
            "Overall survival & safety of nab -paclitaxel"
        );
    }

    #[test]
    fn clean_text_handles_numeric_entities() {
        assert_eq!(clean_text("CA19&#8209;9 and &#x2264;5%"), "CA19\u{2011}9 and \u{2264}5%");
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a \n\t b   c "), "a b c");
    }

    #[test]
    fn normalize_doi_strips_resolvers() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1056/NEJMoa1304369"),
            "10.1056/nejmoa1304369"
        );
        assert_eq!(normalize_doi("DOI:10.1/ABC"), "10.1/abc");
        assert_eq!(normalize_doi("10.1000/xyz"), "10.1000/xyz");
    }

    #[test]
    fn coerce_year_finds_first_year() {
        assert_eq!(coerce_year("2023-05-01"), Some(2023));
        assert_eq!(coerce_year("published May 1998, updated 2001"), Some(1998));
        assert_eq!(coerce_year("n/a"), None);
        assert_eq!(coerce_year("123456"), None);
    }

    #[test]
    fn uid_prefers_doi_then_pmid_then_hash() {
        assert_eq!(
            make_uid("10.1/A", "123", "T", Some(2020), "pubmed"),
            "doi:10.1/a"
        );
        assert_eq!(make_uid("", "123", "T", Some(2020), "pubmed"), "pmid:123");
        let h = make_uid("", "", "Some Title", Some(2020), "pubmed");
        assert!(h.starts_with("hash:"));
        assert_eq!(h.len(), "hash:".len() + 16);
    }

    #[test]
    fn hash_uid_ignores_title_punctuation() {
        let a = make_uid("", "", "FOLFIRINOX vs. Gemcitabine!", Some(2011), "crossref");
        let b = make_uid("", "", "folfirinox vs gemcitabine", Some(2011), "crossref");
        assert_eq!(a, b);
    }

    #[test]
    fn sanitize_uid_is_filesystem_safe() {
        assert_eq!(sanitize_uid("doi:10.1056/NEJMoa1304369"), "doi_10.1056_NEJMoa1304369");
    }

    #[test]
    fn identifier_extraction_from_urls() {
        assert_eq!(
            pmid_from_url("https://pubmed.ncbi.nlm.nih.gov/31562796/"),
            Some("31562796".to_string())
        );
        assert_eq!(
            pmcid_from_text("available at pmc6784591 in EuropePMC"),
            Some("PMC6784591".to_string())
        );
        assert_eq!(pmid_from_url("https://example.org/1"), None);
    }
}
