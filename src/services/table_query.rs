//! Table read model: one page of transfers for a canonical filter.
//!
//! Two strategies sit behind one `fetch_page` interface, selected by a
//! capability probe rather than branching at call sites: the primary remote
//! list function, and a legacy full-scan path kept for backends where the
//! filtered function is not deployed yet. The probe result is sticky for the
//! process lifetime — a backend does not un-deploy a function mid-run, and a
//! restart re-probes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::auth::{Actor, FacilityScope};
use crate::cache::QueryCache;
use crate::errors::ServiceError;
use crate::filters::CanonicalFilter;
use crate::store::{StoreError, TransferPage, TransferStore};

pub struct TableQueryService {
    store: Arc<dyn TransferStore>,
    cache: Arc<QueryCache>,
    primary_unavailable: AtomicBool,
    legacy_batch_limit: u64,
}

impl TableQueryService {
    pub fn new(
        store: Arc<dyn TransferStore>,
        cache: Arc<QueryCache>,
        legacy_batch_limit: u64,
    ) -> Self {
        Self {
            store,
            cache,
            primary_unavailable: AtomicBool::new(false),
            legacy_batch_limit,
        }
    }

    /// Whether the service has fallen back to the legacy path. Degraded mode
    /// indicator for operators; never user-visible.
    pub fn degraded(&self) -> bool {
        self.primary_unavailable.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, actor), fields(page = filter.page, page_size = filter.page_size))]
    pub async fn fetch_page(
        &self,
        actor: &Actor,
        filter: &CanonicalFilter,
    ) -> Result<TransferPage, ServiceError> {
        let key = format!(
            "transfers:table:{}:{}",
            actor.scope_key(),
            filter.cache_key()
        );
        self.cache
            .get_or_fetch(&key, || self.query(actor, filter))
            .await
    }

    async fn query(
        &self,
        actor: &Actor,
        filter: &CanonicalFilter,
    ) -> Result<TransferPage, ServiceError> {
        if !self.primary_unavailable.load(Ordering::SeqCst) {
            match self.primary(actor, filter).await {
                Ok(page) => return Ok(page),
                Err(StoreError::FunctionMissing(function)) => {
                    warn!(
                        function = %function,
                        "primary list function unavailable, switching to legacy full-scan path"
                    );
                    self.primary_unavailable.store(true, Ordering::SeqCst);
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.legacy(actor, filter).await
    }

    async fn primary(
        &self,
        actor: &Actor,
        filter: &CanonicalFilter,
    ) -> Result<TransferPage, StoreError> {
        match &actor.facility_scope {
            FacilityScope::All => self.store.list(filter).await,
            FacilityScope::Facilities(ids) => self.store.list_enhanced(filter, ids).await,
        }
    }

    /// Legacy path: one large unfiltered batch, the five predicates applied
    /// client-side, pagination in memory. Functionally equivalent to the
    /// primary path but O(batch); relative batch order is preserved.
    async fn legacy(
        &self,
        actor: &Actor,
        filter: &CanonicalFilter,
    ) -> Result<TransferPage, ServiceError> {
        let batch = self.store.fetch_batch(self.legacy_batch_limit).await?;
        if batch.len() as u64 >= self.legacy_batch_limit {
            warn!(
                limit = self.legacy_batch_limit,
                "legacy batch hit its cap; older records are invisible in degraded mode"
            );
        }

        let rows: Vec<_> = batch
            .into_iter()
            .filter(|record| actor.facility_scope.allows(record.facility_id))
            .filter(|record| filter.matches(record))
            .collect();

        let total = rows.len() as u64;
        let start = ((filter.page - 1) * filter.page_size) as usize;
        let data = rows
            .into_iter()
            .skip(start)
            .take(filter.page_size as usize)
            .collect();

        Ok(TransferPage {
            data,
            total,
            page: filter.page,
            page_size: filter.page_size,
        })
    }
}
