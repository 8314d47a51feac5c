//! HTTP routes for the connector
//!
//! The extension's background page talks to these; responses meant for a
//! tab wait in the [`MailboxHost`] until `GET /tabs/:tab/responses` drains them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::connector::{
    ConnectDecision, ConnectOutcome, ConnectRequest, Connector, PreviewOutcome, SignResolution, TabId,
};
use crate::error::{ApiErrorCode, ConnectorError, DappError};
use crate::host::MailboxHost;
use crate::rpc::RpcRequest;
use crate::wallet::KeyError;

#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<Connector>,
    pub mailbox: Arc<MailboxHost>,
    pub app_name: String,
}

impl AppState {
    pub fn new(connector: Arc<Connector>, mailbox: Arc<MailboxHost>, app_name: impl Into<String>) -> Self {
        Self { connector, mailbox, app_name: app_name.into() }
    }
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn reject(err: ConnectorError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        ConnectorError::NotConnected(_) | ConnectorError::UnknownRequest { .. } | ConnectorError::WalletNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ConnectorError::AlreadyResolved(_) => StatusCode::CONFLICT,
        ConnectorError::Key(KeyError::WrongPassword) => StatusCode::UNAUTHORIZED,
        ConnectorError::Dapp(DappError::Api { code: ApiErrorCode::InvalidRequest, .. }) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "Request failed");
    }
    (status, Json(json!({ "error": err.to_dapp() })))
}

fn to_json<T: serde::Serialize>(value: T) -> ApiResult {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": DappError::internal(e.to_string()) }))))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/connections/next", get(next_connection))
        .route("/pending/next", get(next_pending))
        .route("/whitelist", get(list_whitelist))
        .route("/whitelist", delete(revoke_whitelist))
        .route("/tabs/:tab", delete(disconnect))
        .route("/tabs/:tab/connect", post(connect))
        .route("/tabs/:tab/connect/decision", post(decide))
        .route("/tabs/:tab/rpc", post(rpc))
        .route("/tabs/:tab/responses", get(responses))
        .route("/tabs/:tab/sign/:uid/preview", post(preview_sign))
        .route("/tabs/:tab/sign/:uid/confirm", post(confirm_sign))
        .route("/tabs/:tab/sign/:uid/reject", post(reject_sign))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(s): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "service": s.app_name, "protocol": s.connector.config().protocol}))
}

async fn connect(State(s): State<AppState>, Path(tab): Path<TabId>, Json(request): Json<ConnectRequest>) -> ApiResult {
    match s.connector.connect(tab, request).await.map_err(reject)? {
        ConnectOutcome::Immediate(response) => Ok(Json(json!({ "status": "immediate", "response": response }))),
        ConnectOutcome::Prompted => Ok(Json(json!({ "status": "prompted" }))),
    }
}

async fn next_connection(State(s): State<AppState>) -> ApiResult {
    to_json(s.connector.next_connection_request().await.map_err(reject)?)
}

async fn decide(State(s): State<AppState>, Path(tab): Path<TabId>, Json(decision): Json<ConnectDecision>) -> ApiResult {
    to_json(s.connector.resolve_connection(tab, decision).await.map_err(reject)?)
}

async fn disconnect(State(s): State<AppState>, Path(tab): Path<TabId>) -> ApiResult {
    let removed = s.connector.disconnect(tab).await.map_err(reject)?;
    Ok(Json(json!({ "removed": removed })))
}

async fn rpc(State(s): State<AppState>, Path(tab): Path<TabId>, Json(request): Json<RpcRequest>) -> ApiResult {
    to_json(s.connector.rpc(tab, request).await)
}

async fn responses(State(s): State<AppState>, Path(tab): Path<TabId>) -> ApiResult {
    to_json(s.mailbox.drain(tab).await)
}

async fn next_pending(State(s): State<AppState>) -> ApiResult {
    let next = s.connector.next_pending_sign().await.map_err(reject)?;
    Ok(Json(match next {
        Some((tab_id, request)) => json!({ "tabId": tab_id, "request": request }),
        None => Value::Null,
    }))
}

async fn preview_sign(State(s): State<AppState>, Path((tab, uid)): Path<(TabId, String)>) -> ApiResult {
    match s.connector.preview_sign(tab, &uid).await.map_err(reject)? {
        PreviewOutcome::Ready(preview) => Ok(Json(json!({ "status": "ready", "preview": preview }))),
        PreviewOutcome::Errored(error) => Ok(Json(json!({ "status": "errored", "error": error }))),
    }
}

#[derive(Deserialize, Default)]
struct ConfirmBody {
    #[serde(default)]
    password: Option<String>,
}

async fn confirm_sign(
    State(s): State<AppState>,
    Path((tab, uid)): Path<(TabId, String)>,
    body: Option<Json<ConfirmBody>>,
) -> ApiResult {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let resolution = s.connector.confirm_sign(tab, &uid, body.password.as_deref()).await.map_err(reject)?;
    Ok(Json(match resolution {
        SignResolution::Signed(value) => json!({ "status": "signed", "result": value }),
        SignResolution::Failed(error) => json!({ "status": "failed", "error": error }),
        SignResolution::Retry(reason) => json!({ "status": "retry", "reason": reason }),
    }))
}

async fn reject_sign(State(s): State<AppState>, Path((tab, uid)): Path<(TabId, String)>) -> ApiResult {
    s.connector.reject_sign(tab, &uid).await.map_err(reject)?;
    Ok(Json(json!({ "status": "rejected" })))
}

async fn list_whitelist(State(s): State<AppState>) -> ApiResult {
    let entries: Vec<Value> = s
        .connector
        .whitelist()
        .await
        .map_err(reject)?
        .into_iter()
        .map(|e| json!({ "url": e.url, "protocol": e.protocol, "walletId": e.wallet_id, "identified": e.auth.is_some() }))
        .collect();
    Ok(Json(Value::Array(entries)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeQuery {
    url: String,
    #[serde(default)]
    wallet_id: Option<String>,
}

async fn revoke_whitelist(State(s): State<AppState>, Query(q): Query<RevokeQuery>) -> ApiResult {
    let removed = s.connector.revoke(&q.url, q.wallet_id.as_deref()).await.map_err(reject)?;
    Ok(Json(json!({ "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingBackend;
    use crate::signing::SignerKind;
    use crate::storage::MemoryStorage;
    use crate::wallet::{EncryptedRootKey, RootKey, StaticWallet, WalletRegistry, WalletSnapshot};
    use crate::ConnectorConfig;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    const SITE: &str = "https://dex.example";

    async fn router() -> Router {
        let root = RootKey::from_bytes([7u8; 32]);
        let snapshot = WalletSnapshot::derive("w1", 0, &root, 1, 1).unwrap();
        let signer = SignerKind::Software(EncryptedRootKey::seal(&root, "pw").unwrap());
        let wallets = Arc::new(WalletRegistry::new());
        wallets.add(Arc::new(StaticWallet::new(snapshot, signer))).await;
        let mailbox = Arc::new(MailboxHost::new());
        let connector = Connector::builder(ConnectorConfig::new("test"), wallets, mailbox.clone(), Arc::new(RecordingBackend::new()))
            .storage(Arc::new(MemoryStorage::new()))
            .build();
        create_router(AppState::new(Arc::new(connector), mailbox, "test"))
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    fn rpc_body(function: &str, uid: &str) -> Value {
        json!({ "protocol": "cardano-connector", "function": function, "params": [], "uid": uid })
    }

    #[tokio::test]
    async fn test_connect_then_rpc_over_http() {
        let router = router().await;
        let (status, body) =
            send(&router, Method::POST, "/tabs/1/connect", Some(json!({ "url": SITE, "protocol": "cardano-connector" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "prompted");

        let (_, pending) = send(&router, Method::GET, "/connections/next", None).await;
        assert_eq!(pending["tabId"], 1);

        let decision = json!({ "decision": "accept", "wallet_id": "w1" });
        let (status, body) = send(&router, Method::POST, "/tabs/1/connect/decision", Some(decision.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let (status, _) = send(&router, Method::POST, "/tabs/1/connect/decision", Some(decision)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, mailbox) = send(&router, Method::GET, "/tabs/1/responses", None).await;
        assert_eq!(mailbox.as_array().map(Vec::len), Some(1));

        let (status, body) = send(&router, Method::POST, "/tabs/1/rpc", Some(rpc_body("get_network_id", "u1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dispatch"], "complete");
        assert_eq!(body["uid"], "u1");
        assert_eq!(body["return"]["ok"], 0);
    }

    #[tokio::test]
    async fn test_rpc_from_unconnected_tab_is_refused() {
        let router = router().await;
        let (status, body) = send(&router, Method::POST, "/tabs/9/rpc", Some(rpc_body("get_balance", "u9"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["return"]["err"]["code"], -3);

        let (_, body) = send(&router, Method::POST, "/tabs/9/rpc", Some(rpc_body("ping", "p"))).await;
        assert_eq!(body["return"]["ok"], true);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let router = router().await;
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/tabs/1/rpc")
            .header(header::ORIGIN, "chrome-extension://abc")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }
}
