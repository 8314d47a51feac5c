//! Connection lifecycle: prompt, whitelist auto-approval, identification
//! and revocation, driven through the public `Connector` API.

mod common;

use common::*;
use dapp_connector::connector::{ConnectionStatus, ConnectDecision, ConnectOutcome, ConnectRequest};
use dapp_connector::error::{ApiErrorCode, DappError};
use dapp_connector::wallet::KeyError;
use dapp_connector::{ConnectorError, Delivery, MemoryStorage, SignerKind, Surface, TabId};
use serde_json::json;
use std::sync::Arc;

fn accept(remember: bool, password: Option<&str>) -> ConnectDecision {
    ConnectDecision::Accept { wallet_id: WALLET_ID.into(), remember, password: password.map(String::from) }
}

/// Opens a connection request on `tab` and hands it to the popup.
async fn prompt(f: &Fixture, tab: TabId, request: ConnectRequest) {
    assert_eq!(f.connector.connect(tab, request).await.expect("connect"), ConnectOutcome::Prompted);
    let pending = f.connector.next_connection_request().await.expect("next").expect("pending");
    assert_eq!(pending.tab_id, tab);
}

/// Test: an unknown site is prompted, and acceptance delivers one success
#[tokio::test]
async fn prompted_connect_delivers_one_response() {
    let f = fixture().await;
    let outcome = f.connector.connect(1, ConnectRequest::new(SITE, PROTOCOL)).await.expect("connect");
    assert_eq!(outcome, ConnectOutcome::Prompted);
    assert_eq!(f.host.opened().await, vec![(1, Surface::Connect)]);

    let pending = f.connector.next_connection_request().await.expect("next").expect("pending");
    assert_eq!(pending.url, SITE);
    assert!(!pending.request_identification);
    // Handed out once only.
    assert!(f.connector.next_connection_request().await.expect("next").is_none());

    let response = f.connector.resolve_connection(1, accept(false, None)).await.expect("resolve");
    assert!(response.success);
    assert!(response.auth.is_none());

    let deliveries = f.host.drain(1).await;
    assert_eq!(deliveries.len(), 1);
    assert!(matches!(&deliveries[0], Delivery::Connect(r) if r.success));

    let site = f.connector.site(1).await.expect("site").expect("connected");
    assert_eq!(site.connected_wallet(), Some(WALLET_ID));
    assert!(f.connector.whitelist().await.expect("whitelist").is_empty());
}

/// Test: a second decision for the same request is refused
#[tokio::test]
async fn resolve_is_at_most_once() {
    let f = fixture().await;
    f.connect(1).await;
    let again = f.connector.resolve_connection(1, accept(false, None)).await;
    assert!(matches!(again, Err(ConnectorError::AlreadyResolved(1))));
    assert!(f.host.drain(1).await.is_empty());
}

/// Test: rejecting deletes the pending site and answers with a failure
#[tokio::test]
async fn reject_removes_site() {
    let f = fixture().await;
    prompt(&f, 2, ConnectRequest::new(SITE, PROTOCOL)).await;
    let response = f.connector.resolve_connection(2, ConnectDecision::Reject).await.expect("reject");
    assert!(!response.success);
    assert!(matches!(response.error, Some(DappError::Api { code: ApiErrorCode::Refused, .. })));
    assert!(f.connector.site(2).await.expect("site").is_none());

    let deliveries = f.host.drain(2).await;
    assert_eq!(deliveries.len(), 1);
    assert!(matches!(&deliveries[0], Delivery::Connect(r) if !r.success));
}

/// Test: a remembered site is auto-approved in another tab without a prompt
#[tokio::test]
async fn remembered_site_is_auto_approved() {
    let f = fixture().await;
    prompt(&f, 1, ConnectRequest::new(SITE, PROTOCOL)).await;
    f.connector.resolve_connection(1, accept(true, None)).await.expect("resolve");
    assert_eq!(f.connector.whitelist().await.expect("whitelist").len(), 1);

    let outcome = f.connector.connect(2, ConnectRequest::new(SITE, PROTOCOL).silent()).await.expect("connect");
    match outcome {
        ConnectOutcome::Immediate(response) => assert!(response.success),
        ConnectOutcome::Prompted => panic!("whitelisted site prompted"),
    }
    assert_eq!(f.host.opened().await.len(), 1, "only the first tab opened a window");
    assert_eq!(f.ok(2, "get_network_id", vec![]).await, json!(0));
}

/// Test: a silent connect without a whitelist entry fails and leaves no site behind
#[tokio::test]
async fn silent_connect_miss() {
    let f = fixture().await;
    let outcome = f.connector.connect(3, ConnectRequest::new(SITE, PROTOCOL).silent()).await.expect("connect");
    let ConnectOutcome::Immediate(response) = outcome else { panic!("silent connect prompted") };
    assert!(!response.success);
    assert!(f.connector.site(3).await.expect("site").is_none());
    assert!(f.host.opened().await.is_empty());
}

/// Test: reconnecting an already connected tab short-circuits
#[tokio::test]
async fn reconnect_connected_tab() {
    let f = fixture().await;
    f.connect(1).await;
    let outcome = f.connector.connect(1, ConnectRequest::new(SITE, PROTOCOL)).await.expect("connect");
    assert_eq!(outcome, ConnectOutcome::Immediate(dapp_connector::ConnectResponse::success(None)));
}

/// Test: a request for another protocol is answered with INVALID_REQUEST
#[tokio::test]
async fn wrong_protocol_is_invalid() {
    let f = fixture().await;
    let outcome = f.connector.connect(1, ConnectRequest::new(SITE, "other-protocol")).await.expect("connect");
    let ConnectOutcome::Immediate(response) = outcome else { panic!("prompted") };
    assert!(matches!(response.error, Some(DappError::Api { code: ApiErrorCode::InvalidRequest, .. })));
    assert!(f.connector.site(1).await.expect("site").is_none());
}

/// Test: identification derives a per-site key the page can sign and verify with
#[tokio::test]
async fn identification_grants_auth_key() {
    let f = fixture().await;
    let request = ConnectRequest::new(SITE, PROTOCOL).with_identification();
    f.connector.connect(4, request).await.expect("connect");
    let pending = f.connector.next_connection_request().await.expect("next").expect("pending");
    assert!(pending.request_identification);

    // Missing password: invalid, and the request stays pending.
    let err = f.connector.resolve_connection(4, accept(false, None)).await.expect_err("no password");
    assert!(matches!(err.to_dapp(), DappError::Api { code: ApiErrorCode::InvalidRequest, .. }));
    let err = f.connector.resolve_connection(4, accept(false, Some("wrong"))).await.expect_err("bad password");
    assert!(matches!(err, ConnectorError::Key(KeyError::WrongPassword)));
    let site = f.connector.site(4).await.expect("site").expect("still pending");
    assert!(matches!(site.status, ConnectionStatus::PendingRequest { .. }));

    let response = f.connector.resolve_connection(4, accept(false, Some(PASSWORD))).await.expect("resolve");
    let auth = response.auth.expect("auth public key");
    f.host.drain(4).await;

    let signature = f.ok(4, "auth_sign_hex_payload", vec![json!("deadbeef")]).await;
    let signature = signature.as_str().expect("hex signature").to_string();
    assert_eq!(f.ok(4, "auth_check_hex_payload", vec![json!("deadbeef"), json!(signature)]).await, json!(true));
    assert_eq!(f.ok(4, "auth_check_hex_payload", vec![json!("beef"), json!(signature)]).await, json!(false));

    // Same site, same wallet: the same identity every time.
    let g = fixture().await;
    prompt(&g, 4, ConnectRequest::new(SITE, PROTOCOL).with_identification()).await;
    let again = g.connector.resolve_connection(4, accept(false, Some(PASSWORD))).await.expect("resolve");
    assert_eq!(again.auth, Some(auth));
}

/// Test: auth functions are refused when the site never asked for identification
#[tokio::test]
async fn auth_without_identification_is_refused() {
    let f = fixture().await;
    f.connect(1).await;
    let dispatch = f.call(1, "auth_sign_hex_payload", vec![json!("00")], "u1").await;
    let err = dispatch.response().and_then(|r| r.result.err().cloned()).expect("error");
    assert!(matches!(err, DappError::Api { code: ApiErrorCode::Refused, .. }));
}

/// Test: hardware wallets cannot identify; the request ends in a failure
#[tokio::test]
async fn hardware_identification_refused() {
    let device = MockDevice::new(Vec::new());
    let f = fixture_with(Arc::new(MemoryStorage::new()), SignerKind::Ledger(device), funded_snapshot()).await;
    prompt(&f, 5, ConnectRequest::new(SITE, PROTOCOL).with_identification()).await;
    let response = f.connector.resolve_connection(5, accept(false, None)).await.expect("resolve");
    assert!(!response.success);
    assert!(f.connector.site(5).await.expect("site").is_none());
}

/// Test: accepting with an unknown wallet leaves the request pending
#[tokio::test]
async fn unknown_wallet_keeps_request() {
    let f = fixture().await;
    prompt(&f, 6, ConnectRequest::new(SITE, PROTOCOL)).await;
    let decision = ConnectDecision::Accept { wallet_id: "nope".into(), remember: false, password: None };
    let err = f.connector.resolve_connection(6, decision).await.expect_err("unknown wallet");
    assert!(matches!(err, ConnectorError::WalletNotFound(_)));
    f.connector.resolve_connection(6, accept(false, None)).await.expect("resolve");
}

/// Test: revoking forgets the site and disconnects its tabs
#[tokio::test]
async fn revoke_disconnects() {
    let f = fixture().await;
    prompt(&f, 1, ConnectRequest::new(SITE, PROTOCOL)).await;
    f.connector.resolve_connection(1, accept(true, None)).await.expect("resolve");

    assert_eq!(f.connector.revoke(SITE, Some("other-wallet")).await.expect("revoke"), 0);
    assert!(f.connector.site(1).await.expect("site").is_some());

    assert_eq!(f.connector.revoke(SITE, None).await.expect("revoke"), 1);
    assert!(f.connector.site(1).await.expect("site").is_none());
    let outcome = f.connector.connect(1, ConnectRequest::new(SITE, PROTOCOL)).await.expect("connect");
    assert_eq!(outcome, ConnectOutcome::Prompted);
}

/// Test: deleting a wallet drops its whitelist entries and connected tabs
#[tokio::test]
async fn deleted_wallet_is_pruned() {
    let f = fixture().await;
    prompt(&f, 1, ConnectRequest::new(SITE, PROTOCOL)).await;
    f.connector.resolve_connection(1, accept(true, None)).await.expect("resolve");
    f.wallets.remove(WALLET_ID).await;

    assert_eq!(f.connector.prune_missing_wallets().await.expect("prune"), 2);
    assert!(f.connector.whitelist().await.expect("whitelist").is_empty());
    assert!(f.connector.site(1).await.expect("site").is_none());
}

/// Test: a tab whose wallet vanished reports not enabled and loses its site
#[tokio::test]
async fn vanished_wallet_disables_tab() {
    let f = fixture().await;
    f.connect(1).await;
    assert_eq!(f.ok(1, "is_enabled", vec![]).await, json!(true));
    f.wallets.remove(WALLET_ID).await;
    assert_eq!(f.ok(1, "is_enabled", vec![]).await, json!(false));
    assert!(f.connector.site(1).await.expect("site").is_none());
}

/// Test: disconnect forgets the tab
#[tokio::test]
async fn disconnect_tab() {
    let f = fixture().await;
    f.connect(1).await;
    assert!(f.connector.disconnect(1).await.expect("disconnect"));
    assert!(!f.connector.disconnect(1).await.expect("disconnect"));
    assert_eq!(f.ok(1, "ping", vec![]).await, json!(true));
    assert_eq!(f.ok(1, "is_enabled", vec![]).await, json!(false));
}

/// Test: a decision for a request the popup never fetched is refused and changes nothing
#[tokio::test]
async fn decision_before_popup_is_invalid() {
    let f = fixture().await;
    f.connector.connect(7, ConnectRequest::new(SITE, PROTOCOL)).await.expect("connect");
    let err = f.connector.resolve_connection(7, accept(false, None)).await.expect_err("not shown yet");
    assert!(matches!(err.to_dapp(), DappError::Api { code: ApiErrorCode::InvalidRequest, .. }));
    let err = f.connector.resolve_connection(7, ConnectDecision::Reject).await.expect_err("not shown yet");
    assert!(matches!(err, ConnectorError::Dapp(_)));
    let site = f.connector.site(7).await.expect("site").expect("still pending");
    assert!(matches!(site.status, ConnectionStatus::PendingRequest { opened_window: false, .. }));
    assert!(f.host.drain(7).await.is_empty());

    f.connector.next_connection_request().await.expect("next").expect("pending");
    assert!(f.connector.resolve_connection(7, accept(false, None)).await.expect("resolve").success);
}
