//! Wallet module - ledger snapshots and signer access.
//!
//! The connector never owns wallet state. It asks a [`WalletProvider`] for
//! a [`Wallet`], reads an immutable [`WalletSnapshot`] under the wallet access
//! mutex, and dispatches signing through the wallet's [`SignerKind`].
//!
//! # Architecture
//!
//! ```text
//! WalletProvider (WalletRegistry)
//!     │
//!     └── Wallet (StaticWallet)
//!           ├── snapshot() → utxos, addresses, stake/drep keys
//!           └── signer()   → Software(EncryptedRootKey) | Ledger | Trezor
//!
//! SubmittedTxJournal  (wallet/submitted/{wallet_id})
//!     └── inputs spent by local, unconfirmed submissions
//! ```

mod auth_entry;
mod journal;
pub mod keys;

pub use auth_entry::{AuthPublic, WalletAuthEntry};
pub use journal::{SubmittedTx, SubmittedTxJournal};
pub use keys::{DerivationPath, EncryptedRootKey, KeyError, KeyRole, RootKey};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::chain::{self, Address, Credential, UnspentOutput, Value};
use crate::signing::SignerKind;

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

pub type WalletResult<T> = Result<T, WalletError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress {
    pub address: Address,
    pub path: DerivationPath,
    pub role: KeyRole,
    #[serde(default)]
    pub used: bool,
}

/// Point-in-time view of one wallet's ledger state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    pub wallet_id: String,
    pub network_id: u8,
    #[serde(default)]
    pub utxos: Vec<UnspentOutput>,
    #[serde(default)]
    pub addresses: Vec<WalletAddress>,
    /// Stake public key hex.
    #[serde(default)]
    pub stake_key: Option<String>,
    /// DRep public key hex and its derivation path.
    #[serde(default)]
    pub drep_key: Option<String>,
    #[serde(default)]
    pub drep_path: Option<DerivationPath>,
    /// Asset fingerprint (`policy.name`) → metadata
    #[serde(default)]
    pub asset_metadata: BTreeMap<String, serde_json::Value>,
}

impl WalletSnapshot {
    /// Derives a fresh account-0 layout: `external` + `internal` base
    /// addresses, the reward address and the DRep key.
    pub fn derive(
        wallet_id: impl Into<String>,
        network_id: u8,
        root: &RootKey,
        external: u32,
        internal: u32,
    ) -> WalletResult<Self> {
        let stake_path = keys::path(0, KeyRole::Stake, 0);
        let stake = Credential::Key(root.key_hash(&stake_path)?);
        let mut addresses = Vec::new();
        for (role, count) in [(KeyRole::External, external), (KeyRole::Internal, internal)] {
            for index in 0..count {
                let path = keys::path(0, role, index);
                let payment = Credential::Key(root.key_hash(&path)?);
                addresses.push(WalletAddress {
                    address: Address::base(network_id, payment, stake.clone()),
                    path,
                    role,
                    used: false,
                });
            }
        }
        addresses.push(WalletAddress {
            address: Address::reward(network_id, stake),
            path: stake_path.clone(),
            role: KeyRole::Stake,
            used: false,
        });
        let drep_path = keys::path(0, KeyRole::Drep, 0);
        Ok(Self {
            wallet_id: wallet_id.into(),
            network_id,
            addresses,
            stake_key: Some(root.public_key_hex(&stake_path)?),
            drep_key: Some(root.public_key_hex(&drep_path)?),
            drep_path: Some(drep_path),
            ..Default::default()
        })
    }

    pub fn balance(&self) -> Value { self.utxos.iter().fold(Value::default(), |acc, u| acc.add(&u.value())) }

    fn payment_addresses(&self) -> impl Iterator<Item = &WalletAddress> {
        self.addresses.iter().filter(|a| matches!(a.role, KeyRole::External | KeyRole::Internal))
    }

    /// Payment addresses that appear on chain or currently hold funds.
    pub fn used_addresses(&self) -> Vec<&WalletAddress> {
        self.payment_addresses()
            .filter(|a| a.used || self.utxos.iter().any(|u| u.address == a.address))
            .collect()
    }

    pub fn unused_addresses(&self) -> Vec<&WalletAddress> {
        self.payment_addresses()
            .filter(|a| a.role == KeyRole::External)
            .filter(|a| !a.used && !self.utxos.iter().any(|u| u.address == a.address))
            .collect()
    }

    pub fn reward_addresses(&self) -> Vec<&WalletAddress> {
        self.addresses.iter().filter(|a| a.role == KeyRole::Stake).collect()
    }

    /// First unused internal address, else the first external one.
    pub fn change_address(&self) -> Option<&WalletAddress> {
        self.payment_addresses()
            .find(|a| a.role == KeyRole::Internal && !a.used && !self.utxos.iter().any(|u| u.address == a.address))
            .or_else(|| self.payment_addresses().find(|a| a.role == KeyRole::External))
    }

    pub fn find_address(&self, address: &Address) -> Option<&WalletAddress> {
        self.addresses.iter().find(|a| a.address == *address)
    }

    pub fn stake_key_hash(&self) -> Option<String> {
        self.reward_addresses()
            .first()
            .and_then(|a| a.address.stake())
            .and_then(Credential::key_hash)
            .map(str::to_string)
    }

    pub fn drep_key_hash(&self) -> Option<String> {
        let raw = hex::decode(self.drep_key.as_deref()?).ok()?;
        Some(chain::key_hash(&raw))
    }

    /// Derivation path of the wallet key with this hash: payment keys of
    /// base/enterprise addresses, the stake key, or the DRep key.
    pub fn path_for_key_hash(&self, key_hash: &str) -> Option<DerivationPath> {
        for addr in &self.addresses {
            let owned = match addr.role {
                KeyRole::External | KeyRole::Internal => addr.address.payment_key_hash(),
                KeyRole::Stake => addr.address.stake().and_then(Credential::key_hash),
                KeyRole::Drep => None,
            };
            if owned == Some(key_hash) {
                return Some(addr.path.clone());
            }
        }
        if self.drep_key_hash().as_deref() == Some(key_hash) {
            return self.drep_path.clone();
        }
        None
    }
}

#[async_trait]
pub trait Wallet: Send + Sync {
    fn id(&self) -> &str;
    async fn snapshot(&self) -> WalletResult<WalletSnapshot>;
    fn signer(&self) -> SignerKind;
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn wallet(&self, wallet_id: &str) -> Option<Arc<dyn Wallet>>;
    async fn wallet_ids(&self) -> Vec<String>;
}

/// Wallet backed by a snapshot held in memory; hosts refresh it on sync.
pub struct StaticWallet {
    id: String,
    snapshot: RwLock<WalletSnapshot>,
    signer: SignerKind,
}

impl StaticWallet {
    pub fn new(snapshot: WalletSnapshot, signer: SignerKind) -> Self {
        Self { id: snapshot.wallet_id.clone(), snapshot: RwLock::new(snapshot), signer }
    }

    pub async fn set_snapshot(&self, snapshot: WalletSnapshot) { *self.snapshot.write().await = snapshot; }
}

#[async_trait]
impl Wallet for StaticWallet {
    fn id(&self) -> &str { &self.id }

    async fn snapshot(&self) -> WalletResult<WalletSnapshot> { Ok(self.snapshot.read().await.clone()) }

    fn signer(&self) -> SignerKind { self.signer.clone() }
}

#[derive(Default)]
pub struct WalletRegistry {
    wallets: RwLock<BTreeMap<String, Arc<dyn Wallet>>>,
}

impl WalletRegistry {
    pub fn new() -> Self { Self::default() }

    pub async fn add(&self, wallet: Arc<dyn Wallet>) {
        self.wallets.write().await.insert(wallet.id().to_string(), wallet);
    }

    pub async fn remove(&self, wallet_id: &str) -> Option<Arc<dyn Wallet>> {
        self.wallets.write().await.remove(wallet_id)
    }
}

#[async_trait]
impl WalletProvider for WalletRegistry {
    async fn wallet(&self, wallet_id: &str) -> Option<Arc<dyn Wallet>> {
        self.wallets.read().await.get(wallet_id).cloned()
    }

    async fn wallet_ids(&self) -> Vec<String> { self.wallets.read().await.keys().cloned().collect() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> (RootKey, WalletSnapshot) {
        let root = RootKey::from_bytes([9u8; 32]);
        let snap = WalletSnapshot::derive("w", 0, &root, 2, 2).unwrap();
        (root, snap)
    }

    #[test]
    fn test_derived_layout() {
        let (root, snap) = snapshot();
        assert_eq!(snap.addresses.len(), 5);
        assert_eq!(snap.unused_addresses().len(), 2);
        assert!(snap.used_addresses().is_empty());
        assert_eq!(snap.change_address().map(|a| a.role), Some(KeyRole::Internal));

        let stake_hash = snap.stake_key_hash().unwrap();
        assert_eq!(snap.path_for_key_hash(&stake_hash), Some(keys::path(0, KeyRole::Stake, 0)));
        let drep_hash = root.key_hash(&keys::path(0, KeyRole::Drep, 0)).unwrap();
        assert_eq!(snap.path_for_key_hash(&drep_hash), Some(keys::path(0, KeyRole::Drep, 0)));
        assert!(snap.path_for_key_hash("00").is_none());
    }

    #[test]
    fn test_funded_address_counts_as_used() {
        let (_, mut snap) = snapshot();
        let addr = snap.addresses[0].address.clone();
        snap.utxos.push(UnspentOutput { tx_hash: "aa".into(), tx_index: 0, address: addr, amount: 5, assets: vec![] });
        assert_eq!(snap.used_addresses().len(), 1);
        assert_eq!(snap.unused_addresses().len(), 1);
        assert_eq!(snap.balance(), Value::coin(5));
    }
}
