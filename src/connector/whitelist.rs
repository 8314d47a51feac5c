//! Whitelist - sites the user chose to always allow.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::paths;
use crate::storage::{get_typed, set_typed, Storage, StorageResult};
use crate::wallet::WalletAuthEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistEntry {
    pub url: String,
    pub protocol: String,
    pub wallet_id: String,
    #[serde(default)]
    pub app_auth_id: Option<String>,
    #[serde(default)]
    pub auth: Option<WalletAuthEntry>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Entry matching `(url, protocol)`, and `app_auth_id` too when identification
/// is requested.
pub fn lookup<'a>(
    entries: &'a [WhitelistEntry],
    url: &str,
    protocol: &str,
    app_auth_id: Option<&str>,
) -> Option<&'a WhitelistEntry> {
    entries.iter().find(|e| {
        e.url == url
            && e.protocol == protocol
            && match app_auth_id {
                Some(id) => e.app_auth_id.as_deref() == Some(id) && e.auth.is_some(),
                None => true,
            }
    })
}

pub struct WhitelistStore {
    storage: Arc<dyn Storage>,
    lock: Mutex<()>,
}

impl WhitelistStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self { Self { storage, lock: Mutex::new(()) } }

    pub async fn entries(&self) -> StorageResult<Vec<WhitelistEntry>> {
        Ok(get_typed(self.storage.as_ref(), paths::connector::WHITELIST).await?.unwrap_or_default())
    }

    async fn save(&self, entries: &[WhitelistEntry]) -> StorageResult<()> {
        set_typed(self.storage.as_ref(), paths::connector::WHITELIST, entries).await
    }

    pub async fn find(&self, url: &str, protocol: &str, app_auth_id: Option<&str>) -> StorageResult<Option<WhitelistEntry>> {
        let entries = self.entries().await?;
        Ok(lookup(&entries, url, protocol, app_auth_id).cloned())
    }

    /// Replaces any entry for the same `(url, protocol, wallet)`.
    pub async fn upsert(&self, entry: WhitelistEntry) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.entries().await?;
        entries.retain(|e| !(e.url == entry.url && e.protocol == entry.protocol && e.wallet_id == entry.wallet_id));
        tracing::info!(url = %entry.url, wallet_id = %entry.wallet_id, "Whitelisted site");
        entries.push(entry);
        self.save(&entries).await
    }

    /// Removes entries for `url`, optionally only those for one wallet.
    pub async fn revoke(&self, url: &str, wallet_id: Option<&str>) -> StorageResult<usize> {
        self.retain(|e| !(e.url == url && wallet_id.map_or(true, |w| e.wallet_id == w))).await
    }

    pub async fn remove_wallet(&self, wallet_id: &str) -> StorageResult<usize> {
        self.retain(|e| e.wallet_id != wallet_id).await
    }

    pub async fn retain<F: Fn(&WhitelistEntry) -> bool>(&self, keep: F) -> StorageResult<usize> {
        let _guard = self.lock.lock().await;
        let mut entries = self.entries().await?;
        let before = entries.len();
        entries.retain(|e| keep(e));
        let removed = before - entries.len();
        if removed > 0 {
            self.save(&entries).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::wallet::RootKey;

    fn entry(url: &str, wallet: &str, app_auth_id: Option<&str>) -> WhitelistEntry {
        let auth = app_auth_id.map(|id| WalletAuthEntry::derive(&RootKey::from_bytes([1u8; 32]), wallet, id).unwrap());
        WhitelistEntry {
            url: url.into(),
            protocol: "p".into(),
            wallet_id: wallet.into(),
            app_auth_id: app_auth_id.map(str::to_string),
            auth,
            image: None,
        }
    }

    #[test]
    fn test_lookup_is_pure_and_matches_identification() {
        let entries = vec![entry("https://a", "w1", None), entry("https://b", "w1", Some("https://b"))];
        let snapshot = entries.clone();

        assert!(lookup(&entries, "https://a", "p", None).is_some());
        assert!(lookup(&entries, "https://a", "p", Some("https://a")).is_none());
        assert!(lookup(&entries, "https://b", "p", Some("https://b")).is_some());
        assert!(lookup(&entries, "https://a", "other", None).is_none());
        assert_eq!(entries, snapshot);
    }

    #[tokio::test]
    async fn test_upsert_revoke() {
        let store = WhitelistStore::new(Arc::new(MemoryStorage::new()));
        store.upsert(entry("https://a", "w1", None)).await.unwrap();
        store.upsert(entry("https://a", "w1", None)).await.unwrap();
        store.upsert(entry("https://a", "w2", None)).await.unwrap();
        assert_eq!(store.entries().await.unwrap().len(), 2);

        assert_eq!(store.revoke("https://a", Some("w2")).await.unwrap(), 1);
        assert_eq!(store.remove_wallet("w1").await.unwrap(), 1);
        assert!(store.find("https://a", "p", None).await.unwrap().is_none());
    }
}
