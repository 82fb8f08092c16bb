//! MedEquip Transfer API Library
//!
//! This crate provides the equipment-transfer lifecycle engine of the
//! MedEquip platform: the status state machine, the permission engine, the
//! table/kanban read models and the transition dispatcher, fronted by an
//! axum HTTP surface and backed by remote procedure calls to an external
//! relational store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod cache;
pub mod config;
pub mod errors;
pub mod events;
pub mod filters;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod openapi;
pub mod services;
pub mod store;
pub mod tracing;

use std::sync::Arc;

use axum::{extract::State, middleware, response::Json, routing::get, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::AuthVerifier;
use crate::cache::QueryCache;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    CountsService, KanbanColumnLoader, TableQueryService, TransitionDispatcher,
};
use crate::store::TransferStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub auth: Arc<AuthVerifier>,
    pub store: Arc<dyn TransferStore>,
    pub cache: Arc<QueryCache>,
    pub services: AppServices,
    pub event_sender: EventSender,
}

/// The transfer subsystem's service set, wired once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub table: Arc<TableQueryService>,
    pub counts: Arc<CountsService>,
    pub kanban: Arc<KanbanColumnLoader>,
    pub transitions: Arc<TransitionDispatcher>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn TransferStore>,
        cache: Arc<QueryCache>,
        events: EventSender,
        config: &AppConfig,
    ) -> Self {
        let table = Arc::new(TableQueryService::new(
            store.clone(),
            cache.clone(),
            config.backend.legacy_batch_limit,
        ));
        let counts = Arc::new(CountsService::new(
            store.clone(),
            cache.clone(),
            config.backend.legacy_batch_limit,
        ));
        let kanban = Arc::new(KanbanColumnLoader::new(
            store.clone(),
            cache.clone(),
            table.clone(),
            config.kanban.column_page_size,
        ));
        let transitions = Arc::new(TransitionDispatcher::new(store, cache, events));
        Self {
            table,
            counts,
            kanban,
            transitions,
        }
    }
}

// Common response wrappers
#[derive(Serialize, utoipa::ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Assembles the application router: authenticated transfer routes, status
/// and health endpoints, API docs, request-id and trace layers.
pub fn app_router(state: AppState) -> Router {
    let transfers = handlers::transfers::transfer_routes().route_layer(
        middleware::from_fn_with_state(state.clone(), auth::require_session),
    );

    Router::new()
        .route("/api/status", get(api_status))
        .route("/health", get(health_check))
        .nest("/api/transfers", transfers)
        .merge(
            SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(crate::tracing::request_id_middleware))
        .with_state(state)
}

async fn api_status() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");
    Json(json!({
        "status": "ok",
        "version": version,
        "service": "medequip-api",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "checks": {
            "backend_mode": state.config.backend.mode,
            "list_path": if state.services.table.degraded() { "legacy" } else { "primary" },
            "cached_queries": state.cache.len(),
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
