use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The three fixed transfer categories. Fixed at creation, never changes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferType {
    /// Movement between two departments of the same facility.
    Internal,
    /// Loan or repair shipment to an outside organization, expected back.
    External,
    /// Write-off; the equipment leaves the inventory for good.
    Disposal,
}

/// Lifecycle states. Not every state is legal for every type; see
/// [`crate::lifecycle::allowed_statuses`].
///
/// The declaration order is the workflow order, which is what the derived
/// `Ord` is used for when sorting status sets canonically.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferStatus {
    PendingApproval,
    Approved,
    InTransfer,
    HandedOver,
    Completed,
}

impl TransferStatus {
    pub const ALL: [TransferStatus; 5] = [
        TransferStatus::PendingApproval,
        TransferStatus::Approved,
        TransferStatus::InTransfer,
        TransferStatus::HandedOver,
        TransferStatus::Completed,
    ];
}

/// Contact block for the receiving organization of an external transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReceivingOrg {
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A request to move one piece of equipment between departments, to an
/// external organization, or to disposal.
///
/// `status` is always a member of the legal status set for `transfer_type`.
/// Timestamps are set exactly once, by the transition that reaches the
/// corresponding state, and never cleared afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransferRequest {
    pub id: i64,
    /// Unique, system-generated, e.g. `TRF-20260807-4K2QX`.
    pub request_code: String,
    pub transfer_type: TransferType,
    pub status: TransferStatus,
    pub equipment_id: i64,
    /// Denormalized from the equipment record so free-text search does not
    /// need a join on the fallback path.
    pub equipment_name: Option<String>,
    /// Tenant scope, inherited from the equipment's owning facility.
    pub facility_id: Option<i64>,
    pub source_department_id: Option<i64>,
    pub destination_department_id: Option<i64>,
    pub receiving_org: Option<ReceivingOrg>,
    pub expected_return_date: Option<NaiveDate>,
    pub disposal_reason: Option<String>,
    pub reason: Option<String>,
    pub requested_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub handed_over_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransferRequest {
    /// Case-insensitive substring match over the searchable text fields:
    /// request code, reason and equipment name.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        if self.request_code.to_lowercase().contains(&needle) {
            return true;
        }
        if let Some(reason) = &self.reason {
            if reason.to_lowercase().contains(&needle) {
                return true;
            }
        }
        if let Some(name) = &self.equipment_name {
            if name.to_lowercase().contains(&needle) {
                return true;
            }
        }
        false
    }
}
