//! Status graph for the transfer workflow.
//!
//! Each transfer type walks a fixed, strictly forward sequence of statuses;
//! there is no cancel or rollback edge. The only way out of the workflow
//! before completion is deletion, and deletion is only legal while a record
//! is still in `pending_approval`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{TransferStatus, TransferType};

const INTERNAL_SEQUENCE: &[TransferStatus] = &[
    TransferStatus::PendingApproval,
    TransferStatus::Approved,
    TransferStatus::InTransfer,
    TransferStatus::Completed,
];

const EXTERNAL_SEQUENCE: &[TransferStatus] = &[
    TransferStatus::PendingApproval,
    TransferStatus::Approved,
    TransferStatus::InTransfer,
    TransferStatus::HandedOver,
    TransferStatus::Completed,
];

const DISPOSAL_SEQUENCE: &[TransferStatus] = &[
    TransferStatus::PendingApproval,
    TransferStatus::Approved,
    TransferStatus::Completed,
];

/// The ordered legal status sequence for a transfer type.
pub const fn allowed_statuses(transfer_type: TransferType) -> &'static [TransferStatus] {
    match transfer_type {
        TransferType::Internal => INTERNAL_SEQUENCE,
        TransferType::External => EXTERNAL_SEQUENCE,
        TransferType::Disposal => DISPOSAL_SEQUENCE,
    }
}

/// Position of `status` within the type's sequence, if it is legal there.
pub fn current_index(transfer_type: TransferType, status: TransferStatus) -> Option<usize> {
    allowed_statuses(transfer_type)
        .iter()
        .position(|s| *s == status)
}

/// Whether `status` is a member of the legal set for `transfer_type`.
pub fn is_legal(transfer_type: TransferType, status: TransferStatus) -> bool {
    current_index(transfer_type, status).is_some()
}

/// The single legal next status, or `None` when the workflow is finished
/// (or `status` is not legal for the type at all).
pub fn next_status(
    transfer_type: TransferType,
    status: TransferStatus,
) -> Option<TransferStatus> {
    let sequence = allowed_statuses(transfer_type);
    let index = sequence.iter().position(|s| *s == status)?;
    sequence.get(index + 1).copied()
}

/// The action vocabulary shared by the dispatcher and the HTTP surface.
/// Every action targets exactly one status; whether that status is the legal
/// next step for a given record is decided by [`next_status`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferAction {
    Approve,
    StartTransfer,
    HandOver,
    Complete,
}

impl TransferAction {
    pub fn target_status(self) -> TransferStatus {
        match self {
            TransferAction::Approve => TransferStatus::Approved,
            TransferAction::StartTransfer => TransferStatus::InTransfer,
            TransferAction::HandOver => TransferStatus::HandedOver,
            TransferAction::Complete => TransferStatus::Completed,
        }
    }
}
