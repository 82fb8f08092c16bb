//! Filter normalization for the transfer read models.
//!
//! Both read models (table and kanban) and the counts endpoint share one
//! canonical filter shape. Canonicalization makes semantically equal filters
//! byte-identical, so they collide in the query cache instead of fanning out
//! into redundant backend calls.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::models::{TransferRequest, TransferStatus, TransferType};

pub const DEFAULT_PAGE_SIZE: u64 = 50;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Raw filter input as it arrives from the HTTP layer: unordered arrays,
/// free-form status/type strings, optional paging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferFilter {
    pub search: Option<String>,
    pub statuses: Vec<String>,
    pub types: Vec<String>,
    pub facility_id: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub assignee_ids: Vec<Uuid>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// Canonical form: arrays sorted ascending and deduplicated, empty arrays as
/// the explicit no-filter marker, paging defaulted. Two semantically equal
/// filters always produce the same `cache_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalFilter {
    pub search: Option<String>,
    pub statuses: Vec<TransferStatus>,
    pub types: Vec<TransferType>,
    pub facility_id: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub assignee_ids: Vec<Uuid>,
    pub page: u64,
    pub page_size: u64,
}

impl Default for CanonicalFilter {
    fn default() -> Self {
        Self {
            search: None,
            statuses: Vec::new(),
            types: Vec::new(),
            facility_id: None,
            date_from: None,
            date_to: None,
            assignee_ids: Vec::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Normalizes a raw filter. Unrecognized status/type values are dropped, not
/// rejected: stale clients keep working after an enum change on our side.
pub fn sanitize(raw: &TransferFilter) -> CanonicalFilter {
    let mut statuses: Vec<TransferStatus> = raw
        .statuses
        .iter()
        .filter_map(|value| {
            value.parse::<TransferStatus>().map_or_else(
                |_| {
                    debug!(value = %value, "dropping unrecognized status filter value");
                    None
                },
                Some,
            )
        })
        .collect();
    statuses.sort();
    statuses.dedup();

    let mut types: Vec<TransferType> = raw
        .types
        .iter()
        .filter_map(|value| {
            value.parse::<TransferType>().map_or_else(
                |_| {
                    debug!(value = %value, "dropping unrecognized type filter value");
                    None
                },
                Some,
            )
        })
        .collect();
    types.sort();
    types.dedup();

    let mut assignee_ids = raw.assignee_ids.clone();
    assignee_ids.sort();
    assignee_ids.dedup();

    let search = raw
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    CanonicalFilter {
        search,
        statuses,
        types,
        facility_id: raw.facility_id,
        date_from: raw.date_from,
        date_to: raw.date_to,
        assignee_ids,
        page: raw.page.unwrap_or(1).max(1),
        page_size: raw
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
    }
}

impl CanonicalFilter {
    /// Stable cache-key representation. Arrays are already sorted, so equal
    /// filters render identically byte for byte.
    pub fn cache_key(&self) -> String {
        let statuses = self
            .statuses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let types = self
            .types
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let assignees = self
            .assignee_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "q={};st={};ty={};fac={};from={};to={};asg={};p={};ps={}",
            self.search.as_deref().unwrap_or(""),
            statuses,
            types,
            self.facility_id.map(|f| f.to_string()).unwrap_or_default(),
            self.date_from.map(|d| d.to_string()).unwrap_or_default(),
            self.date_to.map(|d| d.to_string()).unwrap_or_default(),
            assignees,
            self.page,
            self.page_size,
        )
    }

    /// Counts ignore the status dimension and paging; stripping both keeps
    /// the counts cache key stable while the user pages through the table.
    pub fn without_status(&self) -> CanonicalFilter {
        CanonicalFilter {
            statuses: Vec::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            ..self.clone()
        }
    }

    /// Single-status variant used for per-column kanban scroll.
    pub fn with_status(&self, status: TransferStatus) -> CanonicalFilter {
        CanonicalFilter {
            statuses: vec![status],
            ..self.clone()
        }
    }

    pub fn with_page(&self, page: u64, page_size: u64) -> CanonicalFilter {
        CanonicalFilter {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            ..self.clone()
        }
    }

    /// The five filter predicates, applied client-side on the legacy
    /// full-scan path. The assignee dimension matches the requesting user.
    pub fn matches(&self, record: &TransferRequest) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&record.transfer_type) {
            return false;
        }
        if let Some(facility_id) = self.facility_id {
            if record.facility_id != Some(facility_id) {
                return false;
            }
        }
        let created = record.created_at.date_naive();
        if let Some(from) = self.date_from {
            if created < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if created > to {
                return false;
            }
        }
        if !self.assignee_ids.is_empty() {
            match record.requested_by {
                Some(requester) if self.assignee_ids.contains(&requester) => {}
                _ => return false,
            }
        }
        if let Some(search) = &self.search {
            if !record.matches_search(search) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(statuses: &[&str], types: &[&str]) -> TransferFilter {
        TransferFilter {
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
            types: types.iter().map(|s| s.to_string()).collect(),
            ..TransferFilter::default()
        }
    }

    #[test]
    fn array_order_does_not_change_the_canonical_form() {
        let a = sanitize(&raw(
            &["approved", "pending_approval", "in_transfer"],
            &["external", "internal"],
        ));
        let b = sanitize(&raw(
            &["in_transfer", "approved", "pending_approval"],
            &["internal", "external"],
        ));
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn unrecognized_values_are_dropped_silently() {
        let filter = sanitize(&raw(&["approved", "cancelled", "nope"], &["teleport"]));
        assert_eq!(filter.statuses, vec![TransferStatus::Approved]);
        assert!(filter.types.is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let filter = sanitize(&raw(&["approved", "approved"], &[]));
        assert_eq!(filter.statuses, vec![TransferStatus::Approved]);
    }

    #[test]
    fn paging_defaults_and_clamps() {
        let filter = sanitize(&TransferFilter::default());
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, DEFAULT_PAGE_SIZE);

        let filter = sanitize(&TransferFilter {
            page: Some(0),
            page_size: Some(0),
            ..TransferFilter::default()
        });
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, 1);
    }

    #[test]
    fn blank_search_normalizes_to_none() {
        let filter = sanitize(&TransferFilter {
            search: Some("   ".into()),
            ..TransferFilter::default()
        });
        assert_eq!(filter.search, None);
    }

    #[test]
    fn without_status_resets_paging_too() {
        let filter = sanitize(&TransferFilter {
            statuses: vec!["approved".into()],
            page: Some(7),
            ..TransferFilter::default()
        });
        let stripped = filter.without_status();
        assert!(stripped.statuses.is_empty());
        assert_eq!(stripped.page, 1);
        // Every other dimension survives the strip.
        assert_eq!(stripped.facility_id, filter.facility_id);
    }
}
