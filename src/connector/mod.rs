//! Connector - per-tab connection state, whitelist, pending signs and the
//! facade tying them to wallets, the host and the chain backend.
//!
//! All state lives in [`Storage`]; a [`Connector`] rebuilt over the same
//! storage picks up every connected site and queued sign request.

mod mutex;
mod negotiator;
mod pending;
mod sites;
mod whitelist;

pub use mutex::WalletAccessMutex;
pub use negotiator::{ConnectDecision, ConnectOutcome, ConnectRequest, ConnectResponse, ConnectionNegotiator, PendingConnection};
pub use pending::{
    Continuation, PendingSign, PendingSignQueue, PreviewOutcome, SignKind, SignPayload, SignPreview, SignResolution,
};
pub use sites::{ConnectedSite, ConnectionStatus, RequestType, SiteRegistry, TabId};
pub use whitelist::{lookup, WhitelistEntry, WhitelistStore};

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::chain::UnspentOutput;
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::host::{ChainBackend, Host};
use crate::rpc::{Dispatch, RpcDispatcher, RpcRequest};
use crate::selection::{CoinSelector, GreedySelector};
use crate::storage::{MemoryStorage, Storage};
use crate::wallet::{SubmittedTxJournal, Wallet, WalletProvider, WalletSnapshot};

/// Shared state behind every connector component.
pub(crate) struct Context {
    pub config: ConnectorConfig,
    pub sites: SiteRegistry,
    pub whitelist: WhitelistStore,
    pub journal: SubmittedTxJournal,
    pub wallets: Arc<dyn WalletProvider>,
    pub host: Arc<dyn Host>,
    pub backend: Arc<dyn ChainBackend>,
    pub selector: Arc<dyn CoinSelector>,
    pub mutex: WalletAccessMutex,
}

impl Context {
    /// Wallet bound to a connected tab.
    pub async fn connected_wallet(&self, tab_id: TabId) -> ConnectorResult<Arc<dyn Wallet>> {
        let site = self.sites.get(tab_id).await?.ok_or(ConnectorError::NotConnected(tab_id))?;
        let wallet_id = site.connected_wallet().ok_or(ConnectorError::NotConnected(tab_id))?;
        self.wallets
            .wallet(wallet_id)
            .await
            .ok_or_else(|| ConnectorError::WalletNotFound(wallet_id.to_string()))
    }

    /// Current wallet state. Journal entries the ledger has caught up with
    /// are dropped on the way. Call with the wallet access mutex held.
    pub async fn snapshot(&self, wallet: &dyn Wallet) -> ConnectorResult<WalletSnapshot> {
        let snapshot = wallet.snapshot().await?;
        let dropped = self.journal.reconcile(&snapshot.wallet_id, &snapshot.utxos).await?;
        if dropped > 0 {
            tracing::debug!(wallet_id = %snapshot.wallet_id, dropped, "Reconciled submitted transactions");
        }
        Ok(snapshot)
    }

    /// UTXOs not consumed by a transaction this connector already submitted.
    pub async fn spendable(&self, snapshot: &WalletSnapshot) -> ConnectorResult<Vec<UnspentOutput>> {
        let spent = self.journal.spent_inputs(&snapshot.wallet_id).await?;
        if spent.is_empty() {
            return Ok(snapshot.utxos.clone());
        }
        Ok(snapshot.utxos.iter().filter(|u| !spent.contains(&u.input())).cloned().collect())
    }
}

pub struct ConnectorBuilder {
    config: ConnectorConfig,
    storage: Option<Arc<dyn Storage>>,
    wallets: Arc<dyn WalletProvider>,
    host: Arc<dyn Host>,
    backend: Arc<dyn ChainBackend>,
    selector: Option<Arc<dyn CoinSelector>>,
}

impl ConnectorBuilder {
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self { self.storage = Some(storage); self }
    pub fn selector(mut self, selector: Arc<dyn CoinSelector>) -> Self { self.selector = Some(selector); self }

    pub fn build(self) -> Connector {
        let storage = self.storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let ctx = Arc::new(Context {
            sites: SiteRegistry::new(storage.clone()),
            whitelist: WhitelistStore::new(storage.clone()),
            journal: SubmittedTxJournal::new(storage),
            config: self.config,
            wallets: self.wallets,
            host: self.host,
            backend: self.backend,
            selector: self.selector.unwrap_or_else(|| Arc::new(GreedySelector)),
            mutex: WalletAccessMutex::new(),
        });
        Connector {
            negotiator: ConnectionNegotiator::new(ctx.clone()),
            signs: PendingSignQueue::new(ctx.clone()),
            rpc: RpcDispatcher::new(ctx.clone()),
            ctx,
        }
    }
}

/// Entry point for the host: page messages in, user decisions in,
/// responses out through [`Host`].
pub struct Connector {
    ctx: Arc<Context>,
    negotiator: ConnectionNegotiator,
    signs: PendingSignQueue,
    rpc: RpcDispatcher,
}

impl Connector {
    pub fn builder(
        config: ConnectorConfig,
        wallets: Arc<dyn WalletProvider>,
        host: Arc<dyn Host>,
        backend: Arc<dyn ChainBackend>,
    ) -> ConnectorBuilder {
        ConnectorBuilder { config, storage: None, wallets, host, backend, selector: None }
    }

    pub fn config(&self) -> &ConnectorConfig { &self.ctx.config }

    pub fn mutex(&self) -> &WalletAccessMutex { &self.ctx.mutex }

    // Connections

    pub async fn connect(&self, tab_id: TabId, request: ConnectRequest) -> ConnectorResult<ConnectOutcome> {
        self.negotiator.connect(tab_id, request).await
    }

    pub async fn next_connection_request(&self) -> ConnectorResult<Option<PendingConnection>> {
        self.negotiator.next_request().await
    }

    pub async fn resolve_connection(&self, tab_id: TabId, decision: ConnectDecision) -> ConnectorResult<ConnectResponse> {
        self.negotiator.resolve(tab_id, decision).await
    }

    pub async fn site(&self, tab_id: TabId) -> ConnectorResult<Option<ConnectedSite>> {
        Ok(self.ctx.sites.get(tab_id).await?)
    }

    pub async fn sites(&self) -> ConnectorResult<Vec<(TabId, ConnectedSite)>> {
        Ok(self.ctx.sites.all().await?)
    }

    /// Tab closed or navigated away. Its pending signs go with it, unanswered.
    pub async fn disconnect(&self, tab_id: TabId) -> ConnectorResult<bool> {
        Ok(self.ctx.sites.remove(tab_id).await?.is_some())
    }

    // Whitelist

    pub async fn whitelist(&self) -> ConnectorResult<Vec<WhitelistEntry>> {
        Ok(self.ctx.whitelist.entries().await?)
    }

    /// Forgets `url` and disconnects every tab showing it.
    pub async fn revoke(&self, url: &str, wallet_id: Option<&str>) -> ConnectorResult<usize> {
        let removed = self.ctx.whitelist.revoke(url, wallet_id).await?;
        let tabs = self
            .ctx
            .sites
            .remove_where(|site| {
                site.url == url
                    && match (wallet_id, site.connected_wallet()) {
                        (None, _) => true,
                        (Some(w), Some(connected)) => w == connected,
                        (Some(_), None) => false,
                    }
            })
            .await?;
        tracing::info!(url, removed, tabs = tabs.len(), "Revoked site");
        Ok(removed)
    }

    /// Drops whitelist entries and connected sites whose wallet no longer exists.
    pub async fn prune_missing_wallets(&self) -> ConnectorResult<usize> {
        let known: BTreeSet<String> = self.ctx.wallets.wallet_ids().await.into_iter().collect();
        let removed = self.ctx.whitelist.retain(|e| known.contains(&e.wallet_id)).await?;
        let tabs = self
            .ctx
            .sites
            .remove_where(|site| site.connected_wallet().is_some_and(|w| !known.contains(w)))
            .await?;
        if removed > 0 || !tabs.is_empty() {
            tracing::info!(removed, tabs = tabs.len(), "Pruned sites of deleted wallets");
        }
        Ok(removed + tabs.len())
    }

    // RPC

    pub async fn rpc(&self, tab_id: TabId, request: RpcRequest) -> Dispatch {
        self.rpc.dispatch(tab_id, request).await
    }

    // Sign requests

    pub async fn next_pending_sign(&self) -> ConnectorResult<Option<(TabId, PendingSign)>> {
        self.signs.next().await
    }

    pub async fn preview_sign(&self, tab_id: TabId, uid: &str) -> ConnectorResult<PreviewOutcome> {
        self.signs.preview(tab_id, uid).await
    }

    pub async fn confirm_sign(&self, tab_id: TabId, uid: &str, password: Option<&str>) -> ConnectorResult<SignResolution> {
        self.signs.confirm(tab_id, uid, password).await
    }

    pub async fn reject_sign(&self, tab_id: TabId, uid: &str) -> ConnectorResult<()> {
        self.signs.reject(tab_id, uid).await.map(|_| ())
    }
}
