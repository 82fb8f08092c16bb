//! Remote store adapter layer.
//!
//! Persistence lives in an external relational backend reached through named
//! remote functions; this module defines the trait over that surface plus
//! the wire types it exchanges. `remote` talks HTTP to the real backend,
//! `memory` is the in-process double used in development mode and tests.

pub mod memory;
pub mod remote;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::filters::CanonicalFilter;
use crate::models::{ReceivingOrg, TransferRequest, TransferStatus, TransferType};

pub use memory::InMemoryTransferStore;
pub use remote::RemoteTransferStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The capability-probe signal: the named backend function is not
    /// deployed. Read paths recover via the legacy fallback.
    #[error("backend function '{0}' is not available")]
    FunctionMissing(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The backend refused the call (validation or authorization re-check).
    /// The message is surfaced to the caller verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::FunctionMissing(function) => ServiceError::ServiceUnavailable(format!(
                "backend function '{}' is unavailable",
                function
            )),
            StoreError::NotFound(message) => ServiceError::NotFound(message),
            StoreError::Rejected(message) => ServiceError::BadRequest(message),
            StoreError::Transport(message) => ServiceError::ExternalServiceError(message),
            StoreError::Decode(message) => ServiceError::ExternalServiceError(message),
        }
    }
}

/// One page of transfers in backend-determined order (recency first).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferPage {
    pub data: Vec<TransferRequest>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Per-status totals for a filter set, status dimension excluded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferCounts {
    pub total_count: u64,
    pub column_counts: BTreeMap<TransferStatus, u64>,
}

impl TransferCounts {
    /// Every status key present, zero where the backend omitted it, and the
    /// total recomputed so it always equals the column sum.
    pub fn zero_filled(mut self) -> Self {
        for status in TransferStatus::ALL {
            self.column_counts.entry(status).or_insert(0);
        }
        self.total_count = self.column_counts.values().sum();
        self
    }
}

/// First page of every kanban column plus per-column totals, as returned by
/// the multi-column load function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanbanSnapshot {
    pub transfers: BTreeMap<TransferStatus, Vec<TransferRequest>>,
    pub column_counts: BTreeMap<TransferStatus, u64>,
    pub total_count: u64,
}

/// Creation payload. The request code is generated by the dispatcher before
/// this reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransferRequest {
    pub request_code: String,
    pub transfer_type: TransferType,
    pub equipment_id: i64,
    pub equipment_name: Option<String>,
    pub facility_id: Option<i64>,
    pub source_department_id: Option<i64>,
    pub destination_department_id: Option<i64>,
    pub receiving_org: Option<ReceivingOrg>,
    pub expected_return_date: Option<NaiveDate>,
    pub disposal_reason: Option<String>,
    pub reason: Option<String>,
    pub requested_by: Uuid,
    pub created_by: Uuid,
}

/// Editable payload fields. Type and equipment are immutable after creation
/// and deliberately absent here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TransferPatch {
    pub source_department_id: Option<i64>,
    pub destination_department_id: Option<i64>,
    pub receiving_org: Option<ReceivingOrg>,
    pub expected_return_date: Option<NaiveDate>,
    pub disposal_reason: Option<String>,
    pub reason: Option<String>,
    #[serde(skip_deserializing)]
    pub updated_by: Option<Uuid>,
}

/// A single status transition as sent to the backend. Timestamp fields are
/// only set for the state being reached; the backend re-validates the step
/// and refuses to overwrite a timestamp that is already set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: TransferStatus,
    pub updated_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub handed_over_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The remote function surface this subsystem consumes.
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// `transfer_request_list`: paginated, filterable read.
    async fn list(&self, filter: &CanonicalFilter) -> Result<TransferPage, StoreError>;

    /// `transfer_request_list_enhanced`: tenant-scoped variant enforcing the
    /// facility restriction server-side.
    async fn list_enhanced(
        &self,
        filter: &CanonicalFilter,
        facility_ids: &[i64],
    ) -> Result<TransferPage, StoreError>;

    /// Legacy full-scan read used by the fallback path: a large unfiltered
    /// batch in the same backend order as `list`.
    async fn fetch_batch(&self, limit: u64) -> Result<Vec<TransferRequest>, StoreError>;

    /// `transfer_request_counts`: per-status totals for a filter set.
    async fn counts(&self, filter: &CanonicalFilter) -> Result<TransferCounts, StoreError>;

    /// `get_transfers_kanban`: first page of every column in one call.
    async fn kanban(
        &self,
        filter: &CanonicalFilter,
        limit: u64,
    ) -> Result<KanbanSnapshot, StoreError>;

    /// `transfer_request_get`: single record by id.
    async fn get(&self, id: i64) -> Result<TransferRequest, StoreError>;

    /// `transfer_request_create`.
    async fn create(&self, input: &NewTransferRequest) -> Result<TransferRequest, StoreError>;

    /// `transfer_request_update`.
    async fn update(&self, id: i64, patch: &TransferPatch) -> Result<TransferRequest, StoreError>;

    /// `transfer_request_update_status`.
    async fn update_status(
        &self,
        id: i64,
        change: &StatusChange,
    ) -> Result<TransferRequest, StoreError>;

    /// `transfer_request_complete`: the final step has its own function so
    /// the backend can close out reporting snapshots atomically.
    async fn complete(
        &self,
        id: i64,
        change: &StatusChange,
    ) -> Result<TransferRequest, StoreError>;

    /// `transfer_request_delete`: legal only while pending approval; the
    /// backend re-checks.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}
