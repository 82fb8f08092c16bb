//! HTTP implementation of the remote function surface.
//!
//! Functions are invoked as `POST <base>/rpc/<name>` with a JSON body. A 404
//! whose body carries the code `function_not_found` means the function is
//! not deployed on this backend yet; that is the capability-probe signal the
//! read services use to select the legacy fallback path.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::config::BackendConfig;
use crate::filters::CanonicalFilter;
use crate::models::TransferRequest;

use super::{
    KanbanSnapshot, NewTransferRequest, StatusChange, StoreError, TransferCounts, TransferPage,
    TransferPatch, TransferStore,
};

const FUNCTION_NOT_FOUND_CODE: &str = "function_not_found";

pub struct RemoteTransferStore {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteTransferStore {
    pub fn new(config: &BackendConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    #[instrument(skip(self, body), fields(function = function))]
    async fn call<B, T>(&self, function: &str, body: &B) -> Result<T, StoreError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/rpc/{}", self.base_url, function);
        let mut request = self.http.post(&url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| StoreError::Decode(err.to_string()));
        }

        let payload = response.json::<Value>().await.unwrap_or(Value::Null);
        let code = payload.get("code").and_then(Value::as_str);
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("backend returned {}", status));

        if status == StatusCode::NOT_FOUND {
            if code == Some(FUNCTION_NOT_FOUND_CODE) {
                return Err(StoreError::FunctionMissing(function.to_string()));
            }
            return Err(StoreError::NotFound(message));
        }
        if status.is_client_error() {
            return Err(StoreError::Rejected(message));
        }
        Err(StoreError::Transport(message))
    }
}

#[async_trait::async_trait]
impl TransferStore for RemoteTransferStore {
    async fn list(&self, filter: &CanonicalFilter) -> Result<TransferPage, StoreError> {
        self.call("transfer_request_list", &json!({ "filter": filter }))
            .await
    }

    async fn list_enhanced(
        &self,
        filter: &CanonicalFilter,
        facility_ids: &[i64],
    ) -> Result<TransferPage, StoreError> {
        self.call(
            "transfer_request_list_enhanced",
            &json!({ "filter": filter, "facility_ids": facility_ids }),
        )
        .await
    }

    async fn fetch_batch(&self, limit: u64) -> Result<Vec<TransferRequest>, StoreError> {
        // The legacy call form: no filter arguments at all, just a bound.
        self.call("transfer_request_list", &json!({ "limit": limit }))
            .await
    }

    async fn counts(&self, filter: &CanonicalFilter) -> Result<TransferCounts, StoreError> {
        self.call("transfer_request_counts", &json!({ "filter": filter }))
            .await
    }

    async fn kanban(
        &self,
        filter: &CanonicalFilter,
        limit: u64,
    ) -> Result<KanbanSnapshot, StoreError> {
        self.call(
            "get_transfers_kanban",
            &json!({ "filter": filter, "limit": limit }),
        )
        .await
    }

    async fn get(&self, id: i64) -> Result<TransferRequest, StoreError> {
        self.call("transfer_request_get", &json!({ "id": id })).await
    }

    async fn create(&self, input: &NewTransferRequest) -> Result<TransferRequest, StoreError> {
        self.call("transfer_request_create", input).await
    }

    async fn update(&self, id: i64, patch: &TransferPatch) -> Result<TransferRequest, StoreError> {
        self.call(
            "transfer_request_update",
            &json!({ "id": id, "patch": patch }),
        )
        .await
    }

    async fn update_status(
        &self,
        id: i64,
        change: &StatusChange,
    ) -> Result<TransferRequest, StoreError> {
        self.call(
            "transfer_request_update_status",
            &json!({ "id": id, "change": change }),
        )
        .await
    }

    async fn complete(
        &self,
        id: i64,
        change: &StatusChange,
    ) -> Result<TransferRequest, StoreError> {
        self.call(
            "transfer_request_complete",
            &json!({ "id": id, "change": change }),
        )
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let _: Value = self
            .call("transfer_request_delete", &json!({ "id": id }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> BackendConfig {
        BackendConfig {
            mode: "remote".to_string(),
            base_url: server.uri(),
            api_key: None,
            request_timeout_secs: 5,
            legacy_batch_limit: 1000,
        }
    }

    #[tokio::test]
    async fn missing_function_maps_to_the_capability_probe_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/transfer_request_counts"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": "function_not_found",
                "message": "function transfer_request_counts does not exist",
            })))
            .mount(&server)
            .await;

        let store = RemoteTransferStore::new(&config_for(&server)).unwrap();
        let err = store
            .counts(&CanonicalFilter::default())
            .await
            .expect_err("counts should fail");
        assert!(matches!(err, StoreError::FunctionMissing(name) if name == "transfer_request_counts"));
    }

    #[tokio::test]
    async fn missing_record_is_not_found_rather_than_function_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/transfer_request_get"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": "record_not_found",
                "message": "transfer request 77 not found",
            })))
            .mount(&server)
            .await;

        let store = RemoteTransferStore::new(&config_for(&server)).unwrap();
        let err = store.get(77).await.expect_err("get should fail");
        assert!(matches!(err, StoreError::NotFound(msg) if msg.contains("77")));
    }

    #[tokio::test]
    async fn backend_rejection_message_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/transfer_request_delete"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "code": "invalid_state",
                "message": "transfer request 4 is no longer pending approval",
            })))
            .mount(&server)
            .await;

        let store = RemoteTransferStore::new(&config_for(&server)).unwrap();
        let err = store.delete(4).await.expect_err("delete should fail");
        assert!(
            matches!(err, StoreError::Rejected(msg) if msg.contains("no longer pending approval"))
        );
    }

    #[tokio::test]
    async fn successful_list_decodes_the_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/transfer_request_list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "total": 0,
                "page": 1,
                "pageSize": 50,
            })))
            .mount(&server)
            .await;

        let store = RemoteTransferStore::new(&config_for(&server)).unwrap();
        let page = store.list(&CanonicalFilter::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.page_size, 50);
    }
}
