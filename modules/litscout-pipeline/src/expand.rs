//! Query expansion. Each base query spawns strategy-dependent variants
//! targeting the evidence topics the pipeline scores on.

use std::path::Path;

use anyhow::{bail, Context, Result};

use litscout_common::types::Strategy;

/// Expands base queries per strategy, preserving order and dropping
/// case-insensitive duplicates. Deterministic for a given input.
pub fn expand_queries(base_queries: &[String], strategy: Strategy) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();

    for q in base_queries {
        expanded.push(q.clone());
        match strategy {
            Strategy::Precision => {
                expanded.push(format!(
                    "({q}) AND (randomized OR randomised) AND (phase III OR phase 3)"
                ));
            }
            Strategy::Balance => {
                expanded.push(format!(
                    "({q}) AND (overall survival OR progression-free survival OR ORR)"
                ));
                expanded.push(format!(
                    "({q}) AND (quality of life OR adverse event OR CTCAE)"
                ));
            }
            Strategy::Recall => {
                expanded.push(format!(
                    "({q}) AND (randomized OR randomised OR clinical trial)"
                ));
                expanded.push(format!(
                    "({q}) AND (overall survival OR progression-free survival OR ORR OR DCR)"
                ));
                expanded.push(format!(
                    "({q}) AND (adverse event OR CTCAE OR grade 3 OR treatment-related death)"
                ));
                expanded.push(format!(
                    "({q}) AND (quality of life OR QOL OR EQ-5D OR QLQ-C30 OR pain)"
                ));
                expanded.push(format!(
                    "({q}) AND (QALY OR quality-adjusted OR QALM OR cost-effectiveness)"
                ));
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    expanded
        .into_iter()
        .filter(|q| seen.insert(q.trim().to_lowercase()))
        .collect()
}

/// Reads newline-delimited queries; blank lines and `#` comments ignored.
pub fn read_queries_file(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("queries file not found: {}", path.display()))?;
    let queries: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    if queries.is_empty() {
        bail!("queries file contains no queries: {}", path.display());
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Vec<String> {
        vec!["pancreatic cancer chemotherapy".to_string()]
    }

    #[test]
    fn recall_adds_five_variants() {
        let out = expand_queries(&base(), Strategy::Recall);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], "pancreatic cancer chemotherapy");
    }

    #[test]
    fn balance_adds_two_precision_adds_one() {
        assert_eq!(expand_queries(&base(), Strategy::Balance).len(), 3);
        assert_eq!(expand_queries(&base(), Strategy::Precision).len(), 2);
    }

    #[test]
    fn expansion_is_deterministic_and_dedups_case_insensitively() {
        let queries = vec![
            "Pancreatic Cancer".to_string(),
            "pancreatic cancer".to_string(),
        ];
        let a = expand_queries(&queries, Strategy::Recall);
        let b = expand_queries(&queries, Strategy::Recall);
        assert_eq!(a, b);
        // The second base query and all its variants collapse into the first.
        assert_eq!(a.len(), 6);
        assert_eq!(a[0], "Pancreatic Cancer");
    }

    #[test]
    fn queries_file_skips_comments() {
        let dir = std::env::temp_dir().join("litscout-expand-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("queries.txt");
        std::fs::write(&path, "# comment\npancreatic cancer\n\n  gemcitabine  \n").unwrap();
        let queries = read_queries_file(&path).unwrap();
        assert_eq!(queries, vec!["pancreatic cancer", "gemcitabine"]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
