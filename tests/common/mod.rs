//! Test harness: the full application router wired to the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use medequip_api::{
    app_router,
    auth::{AuthVerifier, Claims},
    cache::QueryCache,
    config::{AppConfig, BackendConfig, CacheConfig, KanbanConfig},
    events,
    models::{TransferRequest, TransferStatus, TransferType},
    store::InMemoryTransferStore,
    AppServices, AppState,
};

pub const TEST_SECRET: &str =
    "integration-test-secret-key-that-is-at-least-64-characters-long-000000";

pub struct TestApp {
    router: Router,
    pub store: Arc<InMemoryTransferStore>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            log_level: "warn".to_string(),
            log_json: false,
            jwt_secret: TEST_SECRET.to_string(),
            backend: BackendConfig::default(),
            cache: CacheConfig::default(),
            kanban: KanbanConfig::default(),
        };

        let store = Arc::new(InMemoryTransferStore::new());
        let cache = Arc::new(QueryCache::new(Duration::from_secs(60)));
        let (event_sender, mut event_rx) = events::channel(256);
        tokio::spawn(async move { while event_rx.recv().await.is_some() {} });

        let services = AppServices::new(
            store.clone() as Arc<dyn medequip_api::store::TransferStore>,
            cache.clone(),
            event_sender.clone(),
            &config,
        );
        let state = AppState {
            config,
            auth: Arc::new(AuthVerifier::new(TEST_SECRET)),
            store: store.clone(),
            cache,
            services,
            event_sender,
        };

        Self {
            router: app_router(state.clone()),
            store,
            state,
        }
    }

    pub fn token(
        &self,
        role: &str,
        department_id: Option<i64>,
        facility_ids: Option<Vec<i64>>,
    ) -> String {
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: role.to_string(),
            department_id,
            facility_ids,
            exp: (Utc::now().timestamp() + 3600) as usize,
            iat: Utc::now().timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .expect("token encodes")
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request builds"),
            None => builder.body(Body::empty()).expect("request builds"),
        };
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        self.request(Method::GET, path, token, None).await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn expect_status(response: Response, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    response_json(response).await
}

/// Seeds a record directly into the in-memory store.
pub fn seed_record(
    app: &TestApp,
    transfer_type: TransferType,
    status: TransferStatus,
    facility_id: Option<i64>,
    minutes_ago: i64,
) -> TransferRequest {
    let record = TransferRequest {
        id: 0,
        request_code: format!("TRF-20260807-{:05X}", rand_suffix()),
        transfer_type,
        status,
        equipment_id: 100,
        equipment_name: Some("Portable X-ray unit".to_string()),
        facility_id,
        source_department_id: Some(10),
        destination_department_id: match transfer_type {
            TransferType::Internal => Some(20),
            _ => None,
        },
        receiving_org: None,
        expected_return_date: None,
        disposal_reason: match transfer_type {
            TransferType::Disposal => Some("beyond economical repair".to_string()),
            _ => None,
        },
        reason: Some("scheduled maintenance rotation".to_string()),
        requested_by: None,
        approved_by: None,
        created_by: None,
        updated_by: None,
        created_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
        updated_at: None,
        approved_at: None,
        handed_over_at: None,
        returned_at: None,
        completed_at: None,
    };
    app.store.seed(record)
}

fn rand_suffix() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};
    static NEXT: AtomicU32 = AtomicU32::new(1);
    NEXT.fetch_add(1, Ordering::SeqCst)
}
