//! Connection negotiator - connect requests, whitelist auto-approval and the
//! user's accept/reject decision.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::sites::{ConnectedSite, ConnectionStatus, RequestType};
use super::whitelist::WhitelistEntry;
use super::{Context, TabId};
use crate::error::{ConnectorError, ConnectorResult, DappError};
use crate::host::Surface;
use crate::signing::SignerKind;
use crate::wallet::{AuthPublic, WalletAuthEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub url: String,
    pub protocol: String,
    #[serde(default)]
    pub request_identification: bool,
    #[serde(default)]
    pub only_silent: bool,
    #[serde(default)]
    pub image: Option<String>,
}

impl ConnectRequest {
    pub fn new(url: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self { url: url.into(), protocol: protocol.into(), request_identification: false, only_silent: false, image: None }
    }

    pub fn with_identification(mut self) -> Self { self.request_identification = true; self }
    pub fn silent(mut self) -> Self { self.only_silent = true; self }
}

/// `connect_response` as delivered to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPublic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DappError>,
}

impl ConnectResponse {
    pub fn success(auth: Option<AuthPublic>) -> Self { Self { success: true, auth, error: None } }

    pub fn failure(info: impl Into<String>) -> Self {
        Self { success: false, auth: None, error: Some(DappError::refused(info)) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Answered without user interaction.
    Immediate(ConnectResponse),
    /// A confirmation surface was requested; the answer arrives via the host.
    Prompted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ConnectDecision {
    Accept {
        wallet_id: String,
        #[serde(default)]
        remember: bool,
        #[serde(default)]
        password: Option<String>,
    },
    Reject,
}

/// What a connect popup needs to render its prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConnection {
    pub tab_id: TabId,
    pub url: String,
    pub protocol: String,
    pub request_identification: bool,
    pub image: Option<String>,
}

pub struct ConnectionNegotiator {
    ctx: Arc<Context>,
}

impl ConnectionNegotiator {
    pub(crate) fn new(ctx: Arc<Context>) -> Self { Self { ctx } }

    pub async fn connect(&self, tab_id: TabId, request: ConnectRequest) -> ConnectorResult<ConnectOutcome> {
        if request.protocol != self.ctx.config.protocol {
            return Ok(ConnectOutcome::Immediate(ConnectResponse {
                success: false,
                auth: None,
                error: Some(DappError::invalid_request(format!("unsupported protocol {}", request.protocol))),
            }));
        }
        let app_auth_id = request.request_identification.then(|| request.url.clone());

        if let Some(site) = self.ctx.sites.get(tab_id).await? {
            if let Some(response) = self.already_connected(&site, &request, app_auth_id.as_deref()).await {
                return Ok(ConnectOutcome::Immediate(response));
            }
        }

        if let Some(entry) = self.ctx.whitelist.find(&request.url, &request.protocol, app_auth_id.as_deref()).await? {
            if self.ctx.wallets.wallet(&entry.wallet_id).await.is_some() {
                return self.approve_from_whitelist(tab_id, &request, app_auth_id, entry).await;
            }
            tracing::warn!(url = %request.url, wallet_id = %entry.wallet_id, "Whitelisted wallet is gone");
            self.ctx.whitelist.remove_wallet(&entry.wallet_id).await?;
        }

        if request.only_silent {
            tracing::debug!(tab_id, url = %request.url, "Silent connect without whitelist entry");
            return Ok(ConnectOutcome::Immediate(ConnectResponse::failure("no active connection")));
        }

        let mut site = ConnectedSite::new(&request.url, &request.protocol, app_auth_id);
        site.image = request.image.clone();
        site.status = ConnectionStatus::PendingRequest {
            request_type: if request.request_identification { RequestType::Identify } else { RequestType::Connect },
            opened_window: false,
        };
        self.ctx.sites.put(tab_id, &site).await?;
        self.ctx.host.open_confirmation(tab_id, Surface::Connect).await?;
        tracing::info!(tab_id, url = %request.url, "Connection request awaiting user");
        Ok(ConnectOutcome::Prompted)
    }

    async fn already_connected(
        &self,
        site: &ConnectedSite,
        request: &ConnectRequest,
        app_auth_id: Option<&str>,
    ) -> Option<ConnectResponse> {
        let wallet_id = site.connected_wallet()?;
        if site.url != request.url || site.protocol != request.protocol {
            return None;
        }
        if app_auth_id.is_some() && (site.app_auth_id.as_deref() != app_auth_id || site.auth().is_none()) {
            return None;
        }
        self.ctx.wallets.wallet(wallet_id).await?;
        Some(ConnectResponse::success(app_auth_id.and(site.auth()).map(WalletAuthEntry::public)))
    }

    async fn approve_from_whitelist(
        &self,
        tab_id: TabId,
        request: &ConnectRequest,
        app_auth_id: Option<String>,
        entry: WhitelistEntry,
    ) -> ConnectorResult<ConnectOutcome> {
        let auth = if app_auth_id.is_some() { entry.auth.clone() } else { None };
        let mut site = ConnectedSite::new(&request.url, &request.protocol, app_auth_id);
        site.image = request.image.clone().or(entry.image);
        site.status = ConnectionStatus::Connected { wallet_id: entry.wallet_id.clone(), auth: auth.clone() };
        self.ctx.sites.put(tab_id, &site).await?;
        tracing::info!(tab_id, url = %request.url, wallet_id = %entry.wallet_id, "Auto-approved whitelisted site");
        Ok(ConnectOutcome::Immediate(ConnectResponse::success(auth.as_ref().map(WalletAuthEntry::public))))
    }

    /// Hands the oldest unopened connection request to a popup, exactly once.
    pub async fn next_request(&self) -> ConnectorResult<Option<PendingConnection>> {
        let Some((tab_id, site)) = self.ctx.sites.next_unopened_connection().await? else {
            return Ok(None);
        };
        Ok(Some(PendingConnection {
            tab_id,
            request_identification: site.app_auth_id.is_some(),
            url: site.url,
            protocol: site.protocol,
            image: site.image,
        }))
    }

    /// Applies the user's decision. Delivers exactly one `connect_response`;
    /// a second decision for the same request fails with `AlreadyResolved`.
    /// Only a request already handed out by `next_request` can be decided.
    pub async fn resolve(&self, tab_id: TabId, decision: ConnectDecision) -> ConnectorResult<ConnectResponse> {
        let site = self.ctx.sites.get(tab_id).await?.ok_or(ConnectorError::AlreadyResolved(tab_id))?;
        match site.status {
            ConnectionStatus::PendingRequest { opened_window: true, .. } => {}
            ConnectionStatus::PendingRequest { .. } => {
                return Err(DappError::invalid_request(format!(
                    "connection request for tab {tab_id} has not been shown to the user"
                ))
                .into());
            }
            _ => return Err(ConnectorError::AlreadyResolved(tab_id)),
        }

        let (wallet_id, remember, password) = match decision {
            ConnectDecision::Reject => {
                return self.terminate(tab_id, ConnectResponse::failure("user declined")).await;
            }
            ConnectDecision::Accept { wallet_id, remember, password } => (wallet_id, remember, password),
        };

        let wallet = self
            .ctx
            .wallets
            .wallet(&wallet_id)
            .await
            .ok_or_else(|| ConnectorError::WalletNotFound(wallet_id.clone()))?;

        let auth = match (&site.app_auth_id, wallet.signer()) {
            (None, _) => None,
            (Some(_), SignerKind::Ledger(_) | SignerKind::Trezor(_)) => {
                tracing::warn!(tab_id, wallet_id, "Hardware wallet cannot identify to sites");
                return self.terminate(tab_id, ConnectResponse::failure("hardware wallets cannot provide identification")).await;
            }
            (Some(app_auth_id), SignerKind::Software(sealed)) => {
                let password = password
                    .as_deref()
                    .ok_or_else(|| DappError::invalid_request("password required for identification"))?;
                let _guard = self.ctx.mutex.lock().await;
                let root = sealed.open(password)?;
                Some(WalletAuthEntry::derive(&root, &wallet_id, app_auth_id)?)
            }
        };

        let connected = self
            .ctx
            .sites
            .transition(tab_id, |site| {
                if !matches!(site.status, ConnectionStatus::PendingRequest { .. }) {
                    return Err(ConnectorError::AlreadyResolved(tab_id));
                }
                site.status = ConnectionStatus::Connected { wallet_id: wallet_id.clone(), auth: auth.clone() };
                Ok(())
            })
            .await?;

        if remember {
            self.ctx
                .whitelist
                .upsert(WhitelistEntry {
                    url: connected.url.clone(),
                    protocol: connected.protocol.clone(),
                    wallet_id: wallet_id.clone(),
                    app_auth_id: connected.app_auth_id.clone(),
                    auth: auth.clone(),
                    image: connected.image.clone(),
                })
                .await?;
        }

        let response = ConnectResponse::success(auth.as_ref().map(WalletAuthEntry::public));
        self.ctx.host.deliver_connect(tab_id, response.clone()).await?;
        tracing::info!(tab_id, wallet_id, remember, "Site connected");
        Ok(response)
    }

    async fn terminate(&self, tab_id: TabId, response: ConnectResponse) -> ConnectorResult<ConnectResponse> {
        if self.ctx.sites.remove(tab_id).await?.is_none() {
            return Err(ConnectorError::AlreadyResolved(tab_id));
        }
        self.ctx.host.deliver_connect(tab_id, response.clone()).await?;
        tracing::info!(tab_id, "Connection request refused");
        Ok(response)
    }
}
