//! Transition dispatcher: the single write path of the subsystem.
//!
//! Every mutation follows the same shape: validate (permission fast-fail,
//! then graph legality), one remote call, invalidate every cached view of
//! the transfer collection, emit a domain event. There is no optimistic
//! local mutation — correctness comes from invalidate-and-refetch — and no
//! retry: a failed call leaves all state untouched and surfaces the
//! backend's message.

use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::permissions::{can_delete, can_edit, can_transition};
use crate::auth::Actor;
use crate::cache::QueryCache;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::lifecycle::{next_status, TransferAction};
use crate::models::{ReceivingOrg, TransferRequest, TransferStatus, TransferType};
use crate::store::{NewTransferRequest, StatusChange, TransferPatch, TransferStore};

/// Every cached view of the transfer collection lives under this prefix.
const TRANSFER_KEYSPACE: &str = "transfers:";

/// Creation input as accepted from the HTTP layer.
#[derive(Debug, Clone, serde::Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateTransferInput {
    pub transfer_type: TransferType,
    pub equipment_id: i64,
    pub equipment_name: Option<String>,
    pub facility_id: Option<i64>,
    pub source_department_id: Option<i64>,
    pub destination_department_id: Option<i64>,
    pub receiving_org: Option<ReceivingOrg>,
    pub expected_return_date: Option<chrono::NaiveDate>,
    pub disposal_reason: Option<String>,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

impl CreateTransferInput {
    /// Per-type payload requirements; anything missing fails validation
    /// before the backend is involved.
    fn validate_payload(&self) -> Result<(), ServiceError> {
        self.validate()?;
        match self.transfer_type {
            TransferType::Internal => {
                if self.source_department_id.is_none() || self.destination_department_id.is_none()
                {
                    return Err(ServiceError::ValidationError(
                        "internal transfers require a source and a destination department"
                            .to_string(),
                    ));
                }
            }
            TransferType::External => {
                if self.receiving_org.is_none() {
                    return Err(ServiceError::ValidationError(
                        "external transfers require receiving organization contact details"
                            .to_string(),
                    ));
                }
                if self.expected_return_date.is_none() {
                    return Err(ServiceError::ValidationError(
                        "external transfers require an expected return date".to_string(),
                    ));
                }
            }
            TransferType::Disposal => {
                if self
                    .disposal_reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|reason| !reason.is_empty())
                    .is_none()
                {
                    return Err(ServiceError::ValidationError(
                        "disposal transfers require a disposal reason".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Generates a request code like `TRF-20260807-4K2QX`.
fn generate_request_code() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("TRF-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

pub struct TransitionDispatcher {
    store: Arc<dyn TransferStore>,
    cache: Arc<QueryCache>,
    events: EventSender,
}

impl TransitionDispatcher {
    pub fn new(store: Arc<dyn TransferStore>, cache: Arc<QueryCache>, events: EventSender) -> Self {
        Self {
            store,
            cache,
            events,
        }
    }

    /// Executes a single forward step. Validation order matters: graph
    /// legality first (so an illegal step reads as such even for admins),
    /// then permission.
    #[instrument(skip(self, actor, record), fields(record_id = record.id, action = %action))]
    pub async fn dispatch(
        &self,
        actor: &Actor,
        record: &TransferRequest,
        action: TransferAction,
    ) -> Result<TransferRequest, ServiceError> {
        let target = action.target_status();
        match next_status(record.transfer_type, record.status) {
            Some(next) if next == target => {}
            _ => {
                return Err(ServiceError::InvalidStatus(format!(
                    "cannot move {} transfer {} from {} to {}",
                    record.transfer_type, record.request_code, record.status, target
                )))
            }
        }
        if !can_transition(actor, record, action) {
            return Err(ServiceError::Forbidden(format!(
                "not allowed to {} transfer {}",
                action, record.request_code
            )));
        }

        let change = Self::status_change(record, action, actor.user_id);
        let updated = if action == TransferAction::Complete {
            self.store.complete(record.id, &change).await?
        } else {
            self.store.update_status(record.id, &change).await?
        };

        self.cache.invalidate_prefix(TRANSFER_KEYSPACE);
        self.events
            .send(Event::TransferStatusChanged {
                transfer_id: record.id,
                from: record.status,
                to: updated.status,
                timestamp: Utc::now(),
            })
            .await;
        info!(
            record_id = record.id,
            from = %record.status,
            to = %updated.status,
            "transfer status changed"
        );
        Ok(updated)
    }

    /// Timestamps belong to the state being reached, and are stamped exactly
    /// once: the return timestamp is stamped when completion leaves the
    /// handed-over state.
    fn status_change(record: &TransferRequest, action: TransferAction, user: Uuid) -> StatusChange {
        let now = Utc::now();
        let mut change = StatusChange {
            status: action.target_status(),
            updated_by: user,
            approved_by: None,
            approved_at: None,
            handed_over_at: None,
            returned_at: None,
            completed_at: None,
        };
        match action {
            TransferAction::Approve => {
                change.approved_by = Some(user);
                change.approved_at = Some(now);
            }
            TransferAction::StartTransfer => {}
            TransferAction::HandOver => {
                change.handed_over_at = Some(now);
            }
            TransferAction::Complete => {
                if record.status == TransferStatus::HandedOver {
                    change.returned_at = Some(now);
                }
                change.completed_at = Some(now);
            }
        }
        change
    }

    /// Deletes a record. Only pending-approval records are deletable, and
    /// the check happens before any backend call.
    #[instrument(skip(self, actor, record), fields(record_id = record.id))]
    pub async fn delete(&self, actor: &Actor, record: &TransferRequest) -> Result<(), ServiceError> {
        if record.status != TransferStatus::PendingApproval {
            return Err(ServiceError::InvalidStatus(format!(
                "transfer {} is no longer pending approval and cannot be deleted",
                record.request_code
            )));
        }
        if !can_delete(actor, record) {
            return Err(ServiceError::Forbidden(format!(
                "not allowed to delete transfer {}",
                record.request_code
            )));
        }

        self.store.delete(record.id).await?;
        self.cache.invalidate_prefix(TRANSFER_KEYSPACE);
        self.events
            .send(Event::TransferDeleted {
                transfer_id: record.id,
                timestamp: Utc::now(),
            })
            .await;
        Ok(())
    }

    /// Creates a new transfer request; always lands in pending approval.
    #[instrument(skip(self, actor, input))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: CreateTransferInput,
    ) -> Result<TransferRequest, ServiceError> {
        if actor.role.is_view_only() {
            return Err(ServiceError::Forbidden(
                "auditors cannot create transfer requests".to_string(),
            ));
        }
        input.validate_payload()?;

        let new_request = NewTransferRequest {
            request_code: generate_request_code(),
            transfer_type: input.transfer_type,
            equipment_id: input.equipment_id,
            equipment_name: input.equipment_name,
            facility_id: input.facility_id,
            source_department_id: input.source_department_id,
            destination_department_id: input.destination_department_id,
            receiving_org: input.receiving_org,
            expected_return_date: input.expected_return_date,
            disposal_reason: input.disposal_reason,
            reason: input.reason,
            requested_by: actor.user_id,
            created_by: actor.user_id,
        };
        let created = self.store.create(&new_request).await?;

        self.cache.invalidate_prefix(TRANSFER_KEYSPACE);
        self.events
            .send(Event::TransferCreated {
                transfer_id: created.id,
                request_code: created.request_code.clone(),
                timestamp: Utc::now(),
            })
            .await;
        info!(record_id = created.id, code = %created.request_code, "transfer request created");
        Ok(created)
    }

    /// Edits the type payload of a record that has not started moving.
    /// Type and equipment are immutable and not part of the patch shape.
    #[instrument(skip(self, actor, record, patch), fields(record_id = record.id))]
    pub async fn update(
        &self,
        actor: &Actor,
        record: &TransferRequest,
        mut patch: TransferPatch,
    ) -> Result<TransferRequest, ServiceError> {
        if !can_edit(actor, record) {
            return Err(ServiceError::Forbidden(format!(
                "not allowed to edit transfer {}",
                record.request_code
            )));
        }
        patch.updated_by = Some(actor.user_id);
        let updated = self.store.update(record.id, &patch).await?;

        self.cache.invalidate_prefix(TRANSFER_KEYSPACE);
        self.events
            .send(Event::TransferUpdated {
                transfer_id: record.id,
                timestamp: Utc::now(),
            })
            .await;
        Ok(updated)
    }
}
