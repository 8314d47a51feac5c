//! RPC dispatcher - validates, routes and answers one `rpc_request`.
//!
//! Nothing escapes [`RpcDispatcher::dispatch`]: errors become `{err}`
//! responses and a panic inside a handler is caught and reported as
//! `INTERNAL_ERROR` for that uid alone.

use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::params::Params;
use super::queries::{Call, Reply};
use super::{Dispatch, RpcFunction, RpcRequest, RpcResponse};
use crate::connector::{ConnectedSite, Context, TabId};
use crate::wallet::Wallet;
use crate::error::{ApiErrorCode, ConnectorResult, DappError};

pub struct RpcDispatcher {
    ctx: Arc<Context>,
}

impl RpcDispatcher {
    pub(crate) fn new(ctx: Arc<Context>) -> Self { Self { ctx } }

    pub async fn dispatch(&self, tab_id: TabId, request: RpcRequest) -> Dispatch {
        tracing::debug!(tab_id, uid = %request.uid, function = %request.function, "RPC request");
        let outcome = AssertUnwindSafe(self.route(tab_id, &request)).catch_unwind().await;

        let result = match outcome {
            Ok(Ok(Reply::Deferred)) => {
                tracing::debug!(tab_id, uid = %request.uid, "RPC deferred to confirmation");
                return Dispatch::Deferred { uid: request.uid };
            }
            Ok(Ok(Reply::Value(value))) => Ok(value),
            Ok(Err(err)) => {
                let dapp = err.to_dapp();
                if matches!(dapp, DappError::Api { code: ApiErrorCode::InternalError, .. }) {
                    tracing::error!(
                        tab_id,
                        uid = %request.uid,
                        function = %request.function,
                        params = ?request.params,
                        error = %err,
                        "RPC failed"
                    );
                } else {
                    tracing::warn!(tab_id, uid = %request.uid, function = %request.function, error = %dapp, "RPC rejected");
                }
                Err(dapp)
            }
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                tracing::error!(
                    tab_id,
                    uid = %request.uid,
                    function = %request.function,
                    params = ?request.params,
                    cause = %cause,
                    "RPC handler panicked"
                );
                Err(DappError::internal(format!("{} panicked: {cause}", request.function)))
            }
        };
        Dispatch::Complete(RpcResponse::new(&request.protocol, &request.uid, result))
    }

    async fn route(&self, tab_id: TabId, request: &RpcRequest) -> ConnectorResult<Reply> {
        if request.protocol != self.ctx.config.protocol {
            return Err(DappError::invalid_request(format!("unsupported protocol {}", request.protocol)).into());
        }
        let function = RpcFunction::parse(&request.function)
            .ok_or_else(|| DappError::invalid_request(format!("unknown function {}", request.function)))?;
        let params = Params::check(function, &request.params)?;
        if !function.requires_connection() {
            let enabled = function == RpcFunction::Ping || self.connection(tab_id).await?.is_some();
            return Ok(Reply::Value(json!(enabled)));
        }
        let Some((site, wallet)) = self.connection(tab_id).await? else {
            return Err(DappError::refused("no active connection").into());
        };

        Call { ctx: &self.ctx, tab_id, site: &site, wallet, request, params }.run(function).await
    }

    /// The tab's site and its wallet. A site whose wallet is gone is dropped.
    async fn connection(&self, tab_id: TabId) -> ConnectorResult<Option<(ConnectedSite, Arc<dyn Wallet>)>> {
        let Some(site) = self.ctx.sites.get(tab_id).await? else { return Ok(None) };
        let Some(wallet_id) = site.connected_wallet().map(str::to_string) else { return Ok(None) };
        match self.ctx.wallets.wallet(&wallet_id).await {
            Some(wallet) => Ok(Some((site, wallet))),
            None => {
                tracing::warn!(tab_id, %wallet_id, "Connected wallet is gone; dropping site");
                self.ctx.sites.remove(tab_id).await?;
                Ok(None)
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
