//! Site connection registry - one durable record per tab.
//!
//! Every mutation is a read-modify-write against [`Storage`] under one
//! registry lock, so "fetch the first unopened request and mark it opened"
//! is a single step.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::pending::PendingSign;
use crate::error::{ConnectorError, ConnectorResult, DappError};
use crate::paths;
use crate::storage::{get_typed, set_typed, Storage, StorageResult};
use crate::wallet::WalletAuthEntry;

pub type TabId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Connect,
    Identify,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Unset,
    PendingRequest {
        request_type: RequestType,
        opened_window: bool,
    },
    Connected {
        wallet_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth: Option<WalletAuthEntry>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedSite {
    pub url: String,
    pub protocol: String,
    #[serde(default)]
    pub app_auth_id: Option<String>,
    pub status: ConnectionStatus,
    #[serde(default)]
    pub pending_signs: BTreeMap<String, PendingSign>,
    #[serde(default)]
    pub image: Option<String>,
}

impl ConnectedSite {
    pub fn new(url: impl Into<String>, protocol: impl Into<String>, app_auth_id: Option<String>) -> Self {
        Self {
            url: url.into(),
            protocol: protocol.into(),
            app_auth_id,
            status: ConnectionStatus::Unset,
            pending_signs: BTreeMap::new(),
            image: None,
        }
    }

    pub fn connected_wallet(&self) -> Option<&str> {
        match &self.status {
            ConnectionStatus::Connected { wallet_id, .. } => Some(wallet_id),
            _ => None,
        }
    }

    pub fn auth(&self) -> Option<&WalletAuthEntry> {
        match &self.status {
            ConnectionStatus::Connected { auth, .. } => auth.as_ref(),
            _ => None,
        }
    }
}

pub struct SiteRegistry {
    storage: Arc<dyn Storage>,
    lock: Mutex<()>,
}

impl SiteRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self { Self { storage, lock: Mutex::new(()) } }

    async fn load(&self, tab_id: TabId) -> StorageResult<Option<ConnectedSite>> {
        get_typed(self.storage.as_ref(), &paths::connector::site(tab_id)).await
    }

    async fn store(&self, tab_id: TabId, site: &ConnectedSite) -> StorageResult<()> {
        set_typed(self.storage.as_ref(), &paths::connector::site(tab_id), site).await
    }

    async fn load_all(&self) -> StorageResult<Vec<(TabId, ConnectedSite)>> {
        let mut out = Vec::new();
        for key in self.storage.keys(paths::connector::SITES_PREFIX).await? {
            let Some(tab_id) = paths::connector::tab_from_key(&key) else { continue };
            if let Some(site) = self.load(tab_id).await? {
                out.push((tab_id, site));
            }
        }
        out.sort_by_key(|(tab_id, _)| *tab_id);
        Ok(out)
    }

    pub async fn get(&self, tab_id: TabId) -> StorageResult<Option<ConnectedSite>> { self.load(tab_id).await }

    pub async fn put(&self, tab_id: TabId, site: &ConnectedSite) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        self.store(tab_id, site).await
    }

    pub async fn remove(&self, tab_id: TabId) -> StorageResult<Option<ConnectedSite>> {
        let _guard = self.lock.lock().await;
        let site = self.load(tab_id).await?;
        if site.is_some() {
            self.storage.remove(&paths::connector::site(tab_id)).await?;
            tracing::info!(tab_id, "Removed connected site");
        }
        Ok(site)
    }

    pub async fn all(&self) -> StorageResult<Vec<(TabId, ConnectedSite)>> { self.load_all().await }

    /// Applies `f` to the tab's site and persists the result.
    pub async fn transition<F>(&self, tab_id: TabId, f: F) -> ConnectorResult<ConnectedSite>
    where
        F: FnOnce(&mut ConnectedSite) -> ConnectorResult<()>,
    {
        let _guard = self.lock.lock().await;
        let mut site = self.load(tab_id).await?.ok_or(ConnectorError::NotConnected(tab_id))?;
        f(&mut site)?;
        self.store(tab_id, &site).await?;
        Ok(site)
    }

    pub async fn remove_where<F>(&self, pred: F) -> StorageResult<Vec<TabId>>
    where
        F: Fn(&ConnectedSite) -> bool,
    {
        let _guard = self.lock.lock().await;
        let mut removed = Vec::new();
        for (tab_id, site) in self.load_all().await? {
            if pred(&site) {
                self.storage.remove(&paths::connector::site(tab_id)).await?;
                removed.push(tab_id);
            }
        }
        Ok(removed)
    }

    /// Inserts a pending sign, stamping it with the next global sequence number.
    pub async fn enqueue_sign(&self, tab_id: TabId, mut sign: PendingSign) -> ConnectorResult<u64> {
        let _guard = self.lock.lock().await;
        let mut site = self.load(tab_id).await?.ok_or(ConnectorError::NotConnected(tab_id))?;
        if site.pending_signs.contains_key(&sign.uid) {
            return Err(DappError::invalid_request(format!("duplicate uid {}", sign.uid)).into());
        }
        let seq: u64 = get_typed(self.storage.as_ref(), paths::connector::PENDING_SEQ).await?.unwrap_or(0) + 1;
        set_typed(self.storage.as_ref(), paths::connector::PENDING_SEQ, &seq).await?;
        sign.seq = seq;
        sign.opened_window = false;
        tracing::info!(tab_id, uid = %sign.uid, seq, kind = ?sign.payload.kind(), "Queued sign request");
        site.pending_signs.insert(sign.uid.clone(), sign);
        self.store(tab_id, &site).await?;
        Ok(seq)
    }

    /// Oldest not-yet-opened sign request across all tabs, marked opened.
    pub async fn next_unopened_sign(&self) -> StorageResult<Option<(TabId, PendingSign)>> {
        let _guard = self.lock.lock().await;
        let sites = self.load_all().await?;
        let oldest = sites
            .iter()
            .flat_map(|(tab_id, site)| site.pending_signs.values().map(move |p| (*tab_id, p)))
            .filter(|(_, p)| !p.opened_window)
            .min_by_key(|(_, p)| p.seq)
            .map(|(tab_id, p)| (tab_id, p.uid.clone()));
        let Some((tab_id, uid)) = oldest else { return Ok(None) };

        let Some((_, mut site)) = sites.into_iter().find(|(t, _)| *t == tab_id) else { return Ok(None) };
        let Some(sign) = site.pending_signs.get_mut(&uid) else { return Ok(None) };
        sign.opened_window = true;
        let sign = sign.clone();
        self.store(tab_id, &site).await?;
        tracing::debug!(tab_id, uid = %uid, "Handed sign request to confirmation surface");
        Ok(Some((tab_id, sign)))
    }

    /// First tab with an unopened connection request, marked opened.
    pub async fn next_unopened_connection(&self) -> StorageResult<Option<(TabId, ConnectedSite)>> {
        let _guard = self.lock.lock().await;
        for (tab_id, mut site) in self.load_all().await? {
            if let ConnectionStatus::PendingRequest { opened_window, .. } = &mut site.status {
                if !*opened_window {
                    *opened_window = true;
                    self.store(tab_id, &site).await?;
                    return Ok(Some((tab_id, site)));
                }
            }
        }
        Ok(None)
    }

    pub async fn get_sign(&self, tab_id: TabId, uid: &str) -> ConnectorResult<PendingSign> {
        let site = self.load(tab_id).await?.ok_or(ConnectorError::NotConnected(tab_id))?;
        site.pending_signs
            .get(uid)
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownRequest { tab_id, uid: uid.to_string() })
    }

    /// Removes and returns a pending sign. A second call for the same uid fails.
    pub async fn take_sign(&self, tab_id: TabId, uid: &str) -> ConnectorResult<PendingSign> {
        let _guard = self.lock.lock().await;
        let mut site = self.load(tab_id).await?.ok_or(ConnectorError::NotConnected(tab_id))?;
        let sign = site
            .pending_signs
            .remove(uid)
            .ok_or_else(|| ConnectorError::UnknownRequest { tab_id, uid: uid.to_string() })?;
        self.store(tab_id, &site).await?;
        Ok(sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::pending::{Continuation, SignPayload};
    use crate::chain::{Transaction, TxBody};
    use crate::rpc::ReturnType;
    use crate::storage::MemoryStorage;

    fn connected() -> ConnectedSite {
        let mut site = ConnectedSite::new("https://dex.example", "cardano-connector", None);
        site.status = ConnectionStatus::Connected { wallet_id: "w".into(), auth: None };
        site
    }

    fn sign(uid: &str) -> PendingSign {
        PendingSign::new(
            uid,
            "cardano-connector",
            SignPayload::Tx { tx: Transaction::new(TxBody::default()), partial_sign: false },
            Continuation { function: "sign_tx".into(), params: vec![], return_type: ReturnType::Object },
        )
    }

    #[tokio::test]
    async fn test_fifo_across_tabs() {
        let reg = SiteRegistry::new(Arc::new(MemoryStorage::new()));
        reg.put(9, &connected()).await.unwrap();
        reg.put(2, &connected()).await.unwrap();
        reg.enqueue_sign(9, sign("first")).await.unwrap();
        reg.enqueue_sign(2, sign("second")).await.unwrap();
        reg.enqueue_sign(9, sign("third")).await.unwrap();

        let order: Vec<String> = [
            reg.next_unopened_sign().await.unwrap(),
            reg.next_unopened_sign().await.unwrap(),
            reg.next_unopened_sign().await.unwrap(),
        ]
        .into_iter()
        .map(|n| n.unwrap().1.uid)
        .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
        assert!(reg.next_unopened_sign().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_sign_once() {
        let reg = SiteRegistry::new(Arc::new(MemoryStorage::new()));
        reg.put(1, &connected()).await.unwrap();
        reg.enqueue_sign(1, sign("u")).await.unwrap();
        assert!(reg.enqueue_sign(1, sign("u")).await.is_err());
        assert_eq!(reg.take_sign(1, "u").await.unwrap().uid, "u");
        assert!(matches!(reg.take_sign(1, "u").await, Err(ConnectorError::UnknownRequest { .. })));
    }

    #[tokio::test]
    async fn test_enqueue_requires_site() {
        let reg = SiteRegistry::new(Arc::new(MemoryStorage::new()));
        assert!(matches!(reg.enqueue_sign(5, sign("u")).await, Err(ConnectorError::NotConnected(5))));
    }

    #[tokio::test]
    async fn test_connection_request_opened_once() {
        let reg = SiteRegistry::new(Arc::new(MemoryStorage::new()));
        let mut site = ConnectedSite::new("https://a.example", "p", None);
        site.status = ConnectionStatus::PendingRequest { request_type: RequestType::Connect, opened_window: false };
        reg.put(4, &site).await.unwrap();
        assert_eq!(reg.next_unopened_connection().await.unwrap().map(|(t, _)| t), Some(4));
        assert!(reg.next_unopened_connection().await.unwrap().is_none());
    }
}
