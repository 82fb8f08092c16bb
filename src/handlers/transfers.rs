//! HTTP surface of the transfer subsystem.
//!
//! Query parameters follow the client contract (camelCase, comma-separated
//! lists). Status and type values that do not match the fixed enums are
//! silently dropped; an out-of-range page size is rejected with 400.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::permissions::{self, Capabilities};
use crate::auth::Actor;
use crate::errors::ServiceError;
use crate::filters::{sanitize, TransferFilter, MAX_PAGE_SIZE};
use crate::lifecycle::TransferAction;
use crate::models::{TransferRequest, TransferStatus};
use crate::services::kanban::{ColumnPage, KanbanBoard};
use crate::services::transitions::CreateTransferInput;
use crate::store::{TransferCounts, TransferPage, TransferPatch};
use crate::{ApiResponse, AppState};

/// Filterable list parameters shared by the table, counts and kanban
/// endpoints. List-valued fields arrive comma-separated.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TransferListParams {
    /// Free-text search over request code, reason and equipment name.
    pub q: Option<String>,
    /// Comma-separated status values.
    pub statuses: Option<String>,
    /// Comma-separated type values.
    pub types: Option<String>,
    pub facility_id: Option<i64>,
    pub date_from: Option<chrono::NaiveDate>,
    pub date_to: Option<chrono::NaiveDate>,
    /// Comma-separated requester user ids.
    pub assignee_ids: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    /// Kanban only: per-column first-page size override.
    pub limit: Option<u64>,
}

fn split_csv(value: &Option<String>) -> Vec<String> {
    value
        .as_deref()
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl TransferListParams {
    fn into_filter(self) -> Result<TransferFilter, ServiceError> {
        if let Some(page_size) = self.page_size {
            if page_size == 0 || page_size > MAX_PAGE_SIZE {
                return Err(ServiceError::ValidationError(format!(
                    "pageSize must be between 1 and {}",
                    MAX_PAGE_SIZE
                )));
            }
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_PAGE_SIZE {
                return Err(ServiceError::ValidationError(format!(
                    "limit must be between 1 and {}",
                    MAX_PAGE_SIZE
                )));
            }
        }
        let assignee_ids = split_csv(&self.assignee_ids)
            .into_iter()
            // Malformed ids are dropped like unrecognized enum values.
            .filter_map(|id| id.parse().ok())
            .collect();
        Ok(TransferFilter {
            search: self.q,
            statuses: split_csv(&self.statuses),
            types: split_csv(&self.types),
            facility_id: self.facility_id,
            date_from: self.date_from,
            date_to: self.date_to,
            assignee_ids,
            page: self.page,
            page_size: self.page_size,
        })
    }
}

/// Tenant defense in depth: the store enforces facility scope server-side,
/// but an explicit request for a facility outside the actor's scope is
/// refused outright.
fn check_facility_scope(actor: &Actor, facility_id: Option<i64>) -> Result<(), ServiceError> {
    match facility_id {
        Some(id) if !actor.facility_scope.allows(Some(id)) => Err(ServiceError::Forbidden(
            format!("facility {} is outside your scope", id),
        )),
        _ => Ok(()),
    }
}

/// Loads a record for the actor, answering 404 for other tenants' ids so
/// scoped actors cannot probe the id space.
async fn load_scoped(
    state: &AppState,
    actor: &Actor,
    id: i64,
) -> Result<TransferRequest, ServiceError> {
    let record = state.store.get(id).await?;
    if !actor.facility_scope.allows(record.facility_id) {
        return Err(ServiceError::NotFound(format!(
            "transfer request {} not found",
            id
        )));
    }
    Ok(record)
}

/// Single record plus what the caller may do with it.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferDetail {
    pub transfer: TransferRequest,
    pub capabilities: Capabilities,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionBody {
    pub action: TransferAction,
}

pub fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route("/list", get(list_transfers))
        .route("/counts", get(transfer_counts))
        .route("/kanban", get(kanban_board))
        .route("/kanban/column", get(kanban_column))
        .route("/", post(create_transfer))
        .route(
            "/:id",
            get(get_transfer)
                .put(update_transfer)
                .delete(delete_transfer),
        )
        .route("/:id/status", put(update_transfer_status))
        .route("/:id/complete", post(complete_transfer))
}

/// One page of transfer requests matching the filter set.
#[utoipa::path(
    get,
    path = "/api/transfers/list",
    params(TransferListParams),
    responses(
        (status = 200, description = "One page of transfer requests", body = TransferPage),
        (status = 400, description = "Invalid filter values", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn list_transfers(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<TransferListParams>,
) -> Result<Json<TransferPage>, ServiceError> {
    let raw = params.into_filter()?;
    check_facility_scope(&actor, raw.facility_id)?;
    let filter = sanitize(&raw);
    let page = state.services.table.fetch_page(&actor, &filter).await?;
    Ok(Json(page))
}

/// Per-status totals for the filter set, ignoring any active status filter.
#[utoipa::path(
    get,
    path = "/api/transfers/counts",
    params(TransferListParams),
    responses(
        (status = 200, description = "Per-status totals", body = TransferCounts),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn transfer_counts(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<TransferListParams>,
) -> Result<Json<TransferCounts>, ServiceError> {
    let raw = params.into_filter()?;
    check_facility_scope(&actor, raw.facility_id)?;
    let filter = sanitize(&raw);
    let counts = state.services.counts.fetch_counts(&actor, &filter).await?;
    Ok(Json(counts))
}

/// Initial kanban load: the first page of every column plus totals.
#[utoipa::path(
    get,
    path = "/api/transfers/kanban",
    params(TransferListParams),
    responses(
        (status = 200, description = "Kanban board snapshot", body = KanbanBoard),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn kanban_board(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<TransferListParams>,
) -> Result<Json<KanbanBoard>, ServiceError> {
    let limit = params.limit;
    let raw = params.into_filter()?;
    check_facility_scope(&actor, raw.facility_id)?;
    let filter = sanitize(&raw);
    let board = state
        .services
        .kanban
        .load_board(&actor, &filter, limit)
        .await?;
    Ok(Json(board))
}

/// Column-scroll parameters: the single status plus the non-status filter
/// dimensions, repeated from the list contract.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ColumnScrollParams {
    /// The column to scroll.
    pub status: String,
    /// Incremental page number, starting at 2.
    pub page: u64,
    pub q: Option<String>,
    pub types: Option<String>,
    pub facility_id: Option<i64>,
    pub date_from: Option<chrono::NaiveDate>,
    pub date_to: Option<chrono::NaiveDate>,
    pub assignee_ids: Option<String>,
}

/// One incremental page of a single kanban column.
#[utoipa::path(
    get,
    path = "/api/transfers/kanban/column",
    params(ColumnScrollParams),
    responses(
        (status = 200, description = "Incremental column page", body = ColumnPage),
        (status = 400, description = "Unknown status or bad page", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn kanban_column(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<ColumnScrollParams>,
) -> Result<Json<ColumnPage>, ServiceError> {
    let status: TransferStatus = params.status.parse().map_err(|_| {
        ServiceError::ValidationError(format!("unknown status '{}'", params.status))
    })?;
    let raw = TransferListParams {
        q: params.q,
        types: params.types,
        facility_id: params.facility_id,
        date_from: params.date_from,
        date_to: params.date_to,
        assignee_ids: params.assignee_ids,
        ..TransferListParams::default()
    }
    .into_filter()?;
    check_facility_scope(&actor, raw.facility_id)?;
    let filter = sanitize(&raw);
    let column = state
        .services
        .kanban
        .load_column_page(&actor, &filter, status, params.page)
        .await?;
    Ok(Json(column))
}

/// A single transfer request with the caller's capability set.
#[utoipa::path(
    get,
    path = "/api/transfers/{id}",
    params(("id" = i64, Path, description = "Transfer request id")),
    responses(
        (status = 200, description = "Transfer request detail", body = TransferDetail),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn get_transfer(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<TransferDetail>, ServiceError> {
    let transfer = load_scoped(&state, &actor, id).await?;
    let capabilities = permissions::capabilities(&actor, &transfer);
    Ok(Json(TransferDetail {
        transfer,
        capabilities,
    }))
}

/// Creates a transfer request; it always starts in pending approval.
#[utoipa::path(
    post,
    path = "/api/transfers",
    request_body = CreateTransferInput,
    responses(
        (status = 201, description = "Created", body = TransferRequest),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn create_transfer(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreateTransferInput>,
) -> Result<impl IntoResponse, ServiceError> {
    check_facility_scope(&actor, input.facility_id)?;
    let created = state.services.transitions.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// Edits the type payload of a record that has not started moving.
#[utoipa::path(
    put,
    path = "/api/transfers/{id}",
    params(("id" = i64, Path, description = "Transfer request id")),
    request_body = TransferPatch,
    responses(
        (status = 200, description = "Updated", body = TransferRequest),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn update_transfer(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(patch): Json<TransferPatch>,
) -> Result<Json<ApiResponse<TransferRequest>>, ServiceError> {
    let record = load_scoped(&state, &actor, id).await?;
    let updated = state
        .services
        .transitions
        .update(&actor, &record, patch)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Executes one forward step of the status workflow.
#[utoipa::path(
    put,
    path = "/api/transfers/{id}/status",
    params(("id" = i64, Path, description = "Transfer request id")),
    request_body = TransitionBody,
    responses(
        (status = 200, description = "Transitioned", body = TransferRequest),
        (status = 400, description = "Illegal step", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn update_transfer_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<TransitionBody>,
) -> Result<Json<ApiResponse<TransferRequest>>, ServiceError> {
    let record = load_scoped(&state, &actor, id).await?;
    let updated = state
        .services
        .transitions
        .dispatch(&actor, &record, body.action)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Final step shortcut: equivalent to the `complete` action.
#[utoipa::path(
    post,
    path = "/api/transfers/{id}/complete",
    params(("id" = i64, Path, description = "Transfer request id")),
    responses(
        (status = 200, description = "Completed", body = TransferRequest),
        (status = 400, description = "Illegal step", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn complete_transfer(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<TransferRequest>>, ServiceError> {
    let record = load_scoped(&state, &actor, id).await?;
    let updated = state
        .services
        .transitions
        .dispatch(&actor, &record, TransferAction::Complete)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Deletes a pending-approval record.
#[utoipa::path(
    delete,
    path = "/api/transfers/{id}",
    params(("id" = i64, Path, description = "Transfer request id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "No longer pending approval", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    tag = "transfers"
)]
pub async fn delete_transfer(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    let record = load_scoped(&state, &actor, id).await?;
    state.services.transitions.delete(&actor, &record).await?;
    Ok(StatusCode::NO_CONTENT)
}
