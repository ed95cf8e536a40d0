//! Deduplication across sources. Identity is DOI, else PMID, else the
//! normalized-title + year pair; the highest-relevance record wins its key.

use std::collections::HashMap;

use litscout_common::text::normalize_title_key;
use litscout_common::types::CanonicalRecord;

fn dedup_key(record: &CanonicalRecord) -> String {
    if !record.doi.is_empty() {
        return format!("doi:{}", record.doi.to_lowercase());
    }
    if !record.pmid.is_empty() {
        return format!("pmid:{}", record.pmid);
    }
    format!(
        "title:{}:{}",
        normalize_title_key(&record.title),
        record.year.map(|y| y.to_string()).unwrap_or_default()
    )
}

/// Collapses duplicates, keeping the higher relevance score per key
/// (first wins ties), then orders by relevance desc, year desc.
/// Idempotent: running it on its own output is a no-op.
pub fn dedup_records(records: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
    let mut best: HashMap<String, CanonicalRecord> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for record in records {
        let key = dedup_key(&record);
        match best.get(&key) {
            None => {
                order.push(key.clone());
                best.insert(key, record);
            }
            Some(prev) if record.relevance_score > prev.relevance_score => {
                best.insert(key, record);
            }
            Some(_) => {}
        }
    }

    let mut rows: Vec<CanonicalRecord> = order
        .into_iter()
        .filter_map(|key| best.remove(&key))
        .collect();
    rows.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.year.unwrap_or(0).cmp(&a.year.unwrap_or(0)))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(doi: &str, pmid: &str, title: &str, year: Option<i32>, relevance: f64) -> CanonicalRecord {
        CanonicalRecord {
            doi: doi.to_string(),
            pmid: pmid.to_string(),
            title: title.to_string(),
            year,
            relevance_score: relevance,
            source: "pubmed".to_string(),
            ..CanonicalRecord::default()
        }
    }

    #[test]
    fn shared_doi_collapses_to_higher_relevance() {
        let a = rec("10.1/x", "", "Title A from pubmed", Some(2020), 3.0);
        let mut b = rec("10.1/x", "", "Title A from crossref", Some(2020), 5.0);
        b.source = "crossref".to_string();
        let out = dedup_records(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, "crossref");
    }

    #[test]
    fn tie_keeps_first_record() {
        let a = rec("10.1/x", "", "first", Some(2020), 3.0);
        let b = rec("10.1/x", "", "second", Some(2020), 3.0);
        let out = dedup_records(vec![a, b]);
        assert_eq!(out[0].title, "first");
    }

    #[test]
    fn title_year_key_ignores_punctuation() {
        let a = rec("", "", "FOLFIRINOX: a trial!", Some(2011), 1.0);
        let b = rec("", "", "folfirinox a trial", Some(2011), 2.0);
        assert_eq!(dedup_records(vec![a, b]).len(), 1);
    }

    #[test]
    fn distinct_years_stay_separate() {
        let a = rec("", "", "same title", Some(2011), 1.0);
        let b = rec("", "", "same title", Some(2012), 1.0);
        assert_eq!(dedup_records(vec![a, b]).len(), 2);
    }

    #[test]
    fn output_sorted_by_relevance_then_year() {
        let out = dedup_records(vec![
            rec("10.1/a", "", "a", Some(2015), 1.0),
            rec("10.1/b", "", "b", Some(2020), 4.0),
            rec("10.1/c", "", "c", Some(2021), 4.0),
        ]);
        assert_eq!(out[0].doi, "10.1/c");
        assert_eq!(out[1].doi, "10.1/b");
        assert_eq!(out[2].doi, "10.1/a");
    }

    #[test]
    fn dedup_is_idempotent() {
        let rows = vec![
            rec("10.1/a", "", "a", Some(2015), 1.0),
            rec("10.1/a", "", "a dup", Some(2015), 0.5),
            rec("", "123", "b", Some(2020), 2.0),
        ];
        let once = dedup_records(rows);
        let twice = dedup_records(once.clone());
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.uid, b.uid);
            assert_eq!(a.title, b.title);
        }
    }
}
