//! In-memory store double, used in development mode and throughout the test
//! suite. It mirrors the backend's own re-validation (step legality, delete
//! only while pending) so permission bypasses surface in tests, and it
//! counts calls so tests can assert that rejected operations never reach the
//! network.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::filters::CanonicalFilter;
use crate::lifecycle::next_status;
use crate::models::{TransferRequest, TransferStatus};

use super::{
    KanbanSnapshot, NewTransferRequest, StatusChange, StoreError, TransferCounts, TransferPage,
    TransferPatch, TransferStore,
};

pub struct InMemoryTransferStore {
    records: RwLock<Vec<TransferRequest>>,
    next_id: AtomicI64,
    read_calls: AtomicUsize,
    mutation_calls: AtomicUsize,
    primary_list_available: AtomicBool,
    counts_available: AtomicBool,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            read_calls: AtomicUsize::new(0),
            mutation_calls: AtomicUsize::new(0),
            primary_list_available: AtomicBool::new(true),
            counts_available: AtomicBool::new(true),
        }
    }

    /// Simulates a backend where the filtered list function is not deployed
    /// yet, forcing the legacy fallback path.
    pub fn disable_primary_list(&self) {
        self.primary_list_available.store(false, Ordering::SeqCst);
    }

    pub fn disable_counts(&self) {
        self.counts_available.store(false, Ordering::SeqCst);
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    /// Inserts a record as-is, assigning the next id if the caller left it
    /// at zero. Returns the stored record.
    pub fn seed(&self, mut record: TransferRequest) -> TransferRequest {
        if record.id == 0 {
            record.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        } else {
            // Keep the counter ahead of explicitly chosen ids.
            self.next_id
                .fetch_max(record.id + 1, Ordering::SeqCst);
        }
        let mut records = self.records.write().expect("store lock poisoned");
        records.push(record.clone());
        record
    }

    fn recency_first(mut rows: Vec<TransferRequest>) -> Vec<TransferRequest> {
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows
    }

    fn matching(&self, filter: &CanonicalFilter) -> Vec<TransferRequest> {
        let records = self.records.read().expect("store lock poisoned");
        Self::recency_first(
            records
                .iter()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect(),
        )
    }

    fn paginate(rows: Vec<TransferRequest>, page: u64, page_size: u64) -> TransferPage {
        let total = rows.len() as u64;
        let start = ((page - 1) * page_size) as usize;
        let data = rows
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        TransferPage {
            data,
            total,
            page,
            page_size,
        }
    }
}

#[async_trait]
impl TransferStore for InMemoryTransferStore {
    async fn list(&self, filter: &CanonicalFilter) -> Result<TransferPage, StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if !self.primary_list_available.load(Ordering::SeqCst) {
            return Err(StoreError::FunctionMissing(
                "transfer_request_list".to_string(),
            ));
        }
        Ok(Self::paginate(
            self.matching(filter),
            filter.page,
            filter.page_size,
        ))
    }

    async fn list_enhanced(
        &self,
        filter: &CanonicalFilter,
        facility_ids: &[i64],
    ) -> Result<TransferPage, StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if !self.primary_list_available.load(Ordering::SeqCst) {
            return Err(StoreError::FunctionMissing(
                "transfer_request_list_enhanced".to_string(),
            ));
        }
        let rows = self
            .matching(filter)
            .into_iter()
            .filter(|record| {
                record
                    .facility_id
                    .map(|id| facility_ids.contains(&id))
                    .unwrap_or(false)
            })
            .collect();
        Ok(Self::paginate(rows, filter.page, filter.page_size))
    }

    async fn fetch_batch(&self, limit: u64) -> Result<Vec<TransferRequest>, StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let records = self.records.read().expect("store lock poisoned");
        let mut rows = Self::recency_first(records.clone());
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn counts(&self, filter: &CanonicalFilter) -> Result<TransferCounts, StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if !self.counts_available.load(Ordering::SeqCst) {
            return Err(StoreError::FunctionMissing(
                "transfer_request_counts".to_string(),
            ));
        }
        let stripped = filter.without_status();
        let mut column_counts: BTreeMap<TransferStatus, u64> = BTreeMap::new();
        for record in self.matching(&stripped) {
            *column_counts.entry(record.status).or_insert(0) += 1;
        }
        Ok(TransferCounts {
            total_count: column_counts.values().sum(),
            column_counts,
        }
        .zero_filled())
    }

    async fn kanban(
        &self,
        filter: &CanonicalFilter,
        limit: u64,
    ) -> Result<KanbanSnapshot, StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let stripped = filter.without_status();
        let mut transfers = BTreeMap::new();
        let mut column_counts = BTreeMap::new();
        for status in TransferStatus::ALL {
            let rows: Vec<TransferRequest> = self
                .matching(&stripped)
                .into_iter()
                .filter(|record| record.status == status)
                .collect();
            column_counts.insert(status, rows.len() as u64);
            transfers.insert(status, rows.into_iter().take(limit as usize).collect());
        }
        let total_count = column_counts.values().sum();
        Ok(KanbanSnapshot {
            transfers,
            column_counts,
            total_count,
        })
    }

    async fn get(&self, id: i64) -> Result<TransferRequest, StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let records = self.records.read().expect("store lock poisoned");
        records
            .iter()
            .find(|record| record.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transfer request {} not found", id)))
    }

    async fn create(&self, input: &NewTransferRequest) -> Result<TransferRequest, StoreError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let record = TransferRequest {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            request_code: input.request_code.clone(),
            transfer_type: input.transfer_type,
            status: TransferStatus::PendingApproval,
            equipment_id: input.equipment_id,
            equipment_name: input.equipment_name.clone(),
            facility_id: input.facility_id,
            source_department_id: input.source_department_id,
            destination_department_id: input.destination_department_id,
            receiving_org: input.receiving_org.clone(),
            expected_return_date: input.expected_return_date,
            disposal_reason: input.disposal_reason.clone(),
            reason: input.reason.clone(),
            requested_by: Some(input.requested_by),
            approved_by: None,
            created_by: Some(input.created_by),
            updated_by: None,
            created_at: Utc::now(),
            updated_at: None,
            approved_at: None,
            handed_over_at: None,
            returned_at: None,
            completed_at: None,
        };
        let mut records = self.records.write().expect("store lock poisoned");
        records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: i64, patch: &TransferPatch) -> Result<TransferRequest, StoreError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.write().expect("store lock poisoned");
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("transfer request {} not found", id)))?;

        if !matches!(
            record.status,
            TransferStatus::PendingApproval | TransferStatus::Approved
        ) {
            return Err(StoreError::Rejected(format!(
                "transfer request {} can no longer be edited",
                id
            )));
        }

        if let Some(source) = patch.source_department_id {
            record.source_department_id = Some(source);
        }
        if let Some(destination) = patch.destination_department_id {
            record.destination_department_id = Some(destination);
        }
        if let Some(receiving_org) = &patch.receiving_org {
            record.receiving_org = Some(receiving_org.clone());
        }
        if let Some(expected_return_date) = patch.expected_return_date {
            record.expected_return_date = Some(expected_return_date);
        }
        if let Some(disposal_reason) = &patch.disposal_reason {
            record.disposal_reason = Some(disposal_reason.clone());
        }
        if let Some(reason) = &patch.reason {
            record.reason = Some(reason.clone());
        }
        record.updated_by = patch.updated_by;
        record.updated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn update_status(
        &self,
        id: i64,
        change: &StatusChange,
    ) -> Result<TransferRequest, StoreError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_status_change(id, change)
    }

    async fn complete(
        &self,
        id: i64,
        change: &StatusChange,
    ) -> Result<TransferRequest, StoreError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        if change.status != TransferStatus::Completed {
            return Err(StoreError::Rejected(
                "complete only accepts the completed status".to_string(),
            ));
        }
        self.apply_status_change(id, change)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.write().expect("store lock poisoned");
        let index = records
            .iter()
            .position(|record| record.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("transfer request {} not found", id)))?;
        if records[index].status != TransferStatus::PendingApproval {
            return Err(StoreError::Rejected(format!(
                "transfer request {} is no longer pending approval",
                id
            )));
        }
        records.remove(index);
        Ok(())
    }
}

impl InMemoryTransferStore {
    /// Shared tail of `update_status` and `complete`: the backend's own
    /// re-validation of the step plus once-only timestamp semantics.
    fn apply_status_change(
        &self,
        id: i64,
        change: &StatusChange,
    ) -> Result<TransferRequest, StoreError> {
        let mut records = self.records.write().expect("store lock poisoned");
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("transfer request {} not found", id)))?;

        match next_status(record.transfer_type, record.status) {
            Some(next) if next == change.status => {}
            _ => {
                return Err(StoreError::Rejected(format!(
                    "cannot move {} transfer request {} from {} to {}",
                    record.transfer_type, id, record.status, change.status
                )))
            }
        }

        record.status = change.status;
        record.updated_by = Some(change.updated_by);
        record.updated_at = Some(Utc::now());
        if record.approved_by.is_none() {
            record.approved_by = change.approved_by;
        }
        if record.approved_at.is_none() {
            record.approved_at = change.approved_at;
        }
        if record.handed_over_at.is_none() {
            record.handed_over_at = change.handed_over_at;
        }
        if record.returned_at.is_none() {
            record.returned_at = change.returned_at;
        }
        if record.completed_at.is_none() {
            record.completed_at = change.completed_at;
        }
        Ok(record.clone())
    }
}
