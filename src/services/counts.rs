//! Per-status totals for the filter badges.
//!
//! The status dimension is stripped before the backend call: the UI shows
//! "N results if you also select status X", so the counts must ignore
//! whatever status filter is currently active.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::auth::Actor;
use crate::cache::QueryCache;
use crate::errors::ServiceError;
use crate::filters::CanonicalFilter;
use crate::models::TransferStatus;
use crate::store::{StoreError, TransferCounts, TransferStore};

pub struct CountsService {
    store: Arc<dyn TransferStore>,
    cache: Arc<QueryCache>,
    legacy_batch_limit: u64,
}

impl CountsService {
    pub fn new(
        store: Arc<dyn TransferStore>,
        cache: Arc<QueryCache>,
        legacy_batch_limit: u64,
    ) -> Self {
        Self {
            store,
            cache,
            legacy_batch_limit,
        }
    }

    #[instrument(skip(self, actor, filter))]
    pub async fn fetch_counts(
        &self,
        actor: &Actor,
        filter: &CanonicalFilter,
    ) -> Result<TransferCounts, ServiceError> {
        let stripped = filter.without_status();
        let key = format!(
            "transfers:counts:{}:{}",
            actor.scope_key(),
            stripped.cache_key()
        );
        self.cache
            .get_or_fetch(&key, || self.query(actor, &stripped))
            .await
    }

    async fn query(
        &self,
        actor: &Actor,
        stripped: &CanonicalFilter,
    ) -> Result<TransferCounts, ServiceError> {
        match self.store.counts(stripped).await {
            Ok(counts) => Ok(counts.zero_filled()),
            Err(StoreError::FunctionMissing(function)) => {
                warn!(
                    function = %function,
                    "counts function unavailable, tallying from the legacy batch"
                );
                self.legacy_tally(actor, stripped).await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Degraded mode: tally the full-scan batch filtered by every dimension
    /// except status.
    async fn legacy_tally(
        &self,
        actor: &Actor,
        stripped: &CanonicalFilter,
    ) -> Result<TransferCounts, ServiceError> {
        let batch = self.store.fetch_batch(self.legacy_batch_limit).await?;
        let mut column_counts: BTreeMap<TransferStatus, u64> = BTreeMap::new();
        for record in batch
            .iter()
            .filter(|record| actor.facility_scope.allows(record.facility_id))
            .filter(|record| stripped.matches(record))
        {
            *column_counts.entry(record.status).or_insert(0) += 1;
        }
        Ok(TransferCounts {
            total_count: column_counts.values().sum(),
            column_counts,
        }
        .zero_filled())
    }
}
