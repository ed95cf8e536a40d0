//! Retrieval scheduler: every (source, expanded query) pair becomes one
//! job, run with bounded concurrency. A failing job records an error and
//! never cancels its siblings.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use litscout_common::types::{CanonicalRecord, DateRange, Strategy};
use litscout_sources::SourceAdapter;

use crate::normalize::normalize;

#[derive(Debug, Clone, Serialize)]
pub struct JobError {
    pub source: String,
    pub query: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct FanoutOutcome {
    pub records: Vec<CanonicalRecord>,
    pub errors: Vec<JobError>,
}

pub async fn run_fanout(
    adapters: &[Arc<dyn SourceAdapter>],
    queries: &[String],
    retmax: usize,
    range: &DateRange,
    strategy: Strategy,
    max_workers: usize,
    job_timeout: Duration,
) -> FanoutOutcome {
    let jobs: Vec<(Arc<dyn SourceAdapter>, String)> = queries
        .iter()
        .flat_map(|q| adapters.iter().map(move |a| (a.clone(), q.clone())))
        .collect();
    info!(
        jobs = jobs.len(),
        sources = adapters.len(),
        queries = queries.len(),
        "Starting retrieval fan-out"
    );

    let results = stream::iter(jobs)
        .map(|(adapter, query)| async move {
            let source = adapter.id();
            match tokio::time::timeout(job_timeout, adapter.search(&query, retmax, range)).await {
                Ok(Ok(rows)) => {
                    let records: Vec<CanonicalRecord> = rows
                        .into_iter()
                        .map(|raw| normalize(raw, source, &query, strategy))
                        .collect();
                    (source, query, records, None)
                }
                Ok(Err(err)) => (source, query, Vec::new(), Some(err.to_string())),
                Err(_) => (
                    source,
                    query,
                    Vec::new(),
                    Some(format!("job timed out after {}s", job_timeout.as_secs())),
                ),
            }
        })
        .buffer_unordered(max_workers.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut outcome = FanoutOutcome::default();
    for (source, query, records, error) in results {
        if let Some(error) = error {
            warn!(source = source.as_str(), query = query.as_str(), error = error.as_str(), "Retrieval job failed");
            outcome.errors.push(JobError {
                source: source.to_string(),
                query,
                error,
            });
        } else {
            outcome.records.extend(records);
        }
    }
    info!(
        records = outcome.records.len(),
        errors = outcome.errors.len(),
        "Retrieval fan-out complete"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use litscout_common::types::{RawRecord, SourceId};
    use litscout_sources::{Result, SourceError};

    struct FakeAdapter {
        id: SourceId,
        fail: bool,
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn id(&self) -> SourceId {
            self.id
        }

        async fn search(&self, query: &str, _limit: usize, _range: &DateRange) -> Result<Vec<RawRecord>> {
            if self.fail {
                return Err(SourceError::Http {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(vec![RawRecord {
                title: format!("paper for {query}"),
                doi: format!("10.1/{}-{query}", self.id),
                year: Some(2020),
                ..RawRecord::default()
            }])
        }
    }

    #[tokio::test]
    async fn failed_jobs_do_not_cancel_others() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(FakeAdapter { id: SourceId::Pubmed, fail: false }),
            Arc::new(FakeAdapter { id: SourceId::Crossref, fail: true }),
        ];
        let queries = vec!["q1".to_string(), "q2".to_string()];
        let outcome = run_fanout(
            &adapters,
            &queries,
            10,
            &DateRange::default(),
            Strategy::Recall,
            4,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().all(|e| e.source == "crossref"));
        assert!(outcome
            .records
            .iter()
            .all(|r| r.matched_query == "q1" || r.matched_query == "q2"));
    }
}
