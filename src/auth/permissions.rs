//! Capability resolution for transfer records.
//!
//! Pure predicates over `(actor, record)`: no I/O, no clock, trivially unit
//! testable. The HTTP layer uses them to fast-fail and to build the
//! capability set behind role-conditioned menus; the backend re-enforces the
//! same rules on every mutation, so a resolver decision is never the sole
//! control.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Actor;
use crate::lifecycle::{next_status, TransferAction};
use crate::models::{TransferRequest, TransferStatus};

/// What the given actor may do with the given record, resolved in one pass
/// for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    pub can_edit: bool,
    pub can_delete: bool,
    /// Actions that are both the legal next step and permitted for this
    /// actor. At most one entry with the current status graph.
    pub allowed_actions: Vec<TransferAction>,
}

fn in_department(actor: &Actor, department_id: Option<i64>) -> bool {
    match (actor.department_id, department_id) {
        (Some(own), Some(dept)) => own == dept,
        _ => false,
    }
}

fn touches_record_departments(actor: &Actor, record: &TransferRequest) -> bool {
    in_department(actor, record.source_department_id)
        || in_department(actor, record.destination_department_id)
}

/// Editing is allowed while the record has not started moving: auditors
/// never, managerial roles always, department staff only on their own
/// source or destination side.
pub fn can_edit(actor: &Actor, record: &TransferRequest) -> bool {
    if actor.role.is_view_only() {
        return false;
    }
    if !matches!(
        record.status,
        TransferStatus::PendingApproval | TransferStatus::Approved
    ) {
        return false;
    }
    actor.role.is_managerial() || touches_record_departments(actor, record)
}

/// Deletion is narrower than editing: only while pending approval, and the
/// department match is against the source side specifically.
pub fn can_delete(actor: &Actor, record: &TransferRequest) -> bool {
    if actor.role.is_view_only() {
        return false;
    }
    if record.status != TransferStatus::PendingApproval {
        return false;
    }
    actor.role.is_managerial() || in_department(actor, record.source_department_id)
}

/// Permission check for a single transition action. Assumes nothing about
/// graph legality: callers validate the step against the status graph
/// separately, so a permission denial and an illegal step stay
/// distinguishable.
pub fn can_transition(actor: &Actor, record: &TransferRequest, action: TransferAction) -> bool {
    if actor.role.is_view_only() {
        return false;
    }
    match action {
        TransferAction::Approve => actor.role.is_managerial(),
        TransferAction::StartTransfer => {
            actor.role.is_managerial() || in_department(actor, record.source_department_id)
        }
        // The releasing side hands the equipment over.
        TransferAction::HandOver => {
            actor.role.is_managerial() || in_department(actor, record.source_department_id)
        }
        // The receiving side confirms completion where one exists; external
        // returns and disposals are confirmed by the source department.
        TransferAction::Complete => {
            let confirming = record
                .destination_department_id
                .or(record.source_department_id);
            actor.role.is_managerial() || in_department(actor, confirming)
        }
    }
}

/// Full capability set for a record, as consumed by the UI layer.
pub fn capabilities(actor: &Actor, record: &TransferRequest) -> Capabilities {
    let allowed_actions = next_status(record.transfer_type, record.status)
        .into_iter()
        .flat_map(|target| {
            [
                TransferAction::Approve,
                TransferAction::StartTransfer,
                TransferAction::HandOver,
                TransferAction::Complete,
            ]
            .into_iter()
            .filter(move |action| action.target_status() == target)
        })
        .filter(|action| can_transition(actor, record, *action))
        .collect();

    Capabilities {
        can_edit: can_edit(actor, record),
        can_delete: can_delete(actor, record),
        allowed_actions,
    }
}
