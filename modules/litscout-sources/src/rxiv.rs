//! medRxiv/bioRxiv adapter. Neither server offers a keyword search API,
//! so queries go through the Europe PMC preprint index (SRC:PPR) pinned
//! to the server's publisher name.

use async_trait::async_trait;

use litscout_common::types::{DateRange, RawRecord, SourceId};

use crate::error::Result;
use crate::europe_pmc::{date_filtered_query, EpmcResult, EuropePmcClient};
use crate::retry::RetryPolicy;
use crate::SourceAdapter;

pub struct RxivClient {
    epmc: EuropePmcClient,
    server: SourceId,
}

impl RxivClient {
    pub fn new(client: reqwest::Client, policy: RetryPolicy, server: SourceId) -> Self {
        Self {
            epmc: EuropePmcClient::new(client, policy),
            server,
        }
    }

    fn publisher(&self) -> &'static str {
        match self.server {
            SourceId::Biorxiv => "bioRxiv",
            _ => "medRxiv",
        }
    }
}

#[async_trait]
impl SourceAdapter for RxivClient {
    fn id(&self) -> SourceId {
        self.server
    }

    async fn search(&self, query: &str, limit: usize, range: &DateRange) -> Result<Vec<RawRecord>> {
        let pinned = format!(
            "({query}) AND SRC:PPR AND PUBLISHER:\"{}\"",
            self.publisher()
        );
        let q = date_filtered_query(&pinned, range);
        let rows = self.epmc.search_raw(&q, limit).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut raw = EpmcResult::into_raw(row);
                // Everything these servers host is an open-access preprint.
                raw.preprint_flag = true;
                raw.open_access = true;
                raw
            })
            .collect())
    }
}
