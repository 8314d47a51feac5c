//! Shared fixtures: one software wallet with a few UTXOs, an in-process host
//! and a recording chain backend.

#![allow(dead_code)]

use async_trait::async_trait;
use dapp_connector::chain::{Asset, AssetId, UnspentOutput};
use dapp_connector::connector::{ConnectDecision, ConnectOutcome, ConnectRequest};
use dapp_connector::{
    Connector, ConnectorConfig, Delivery, DeviceRequest, DeviceResponse, EncryptedRootKey, HardwareDevice,
    HardwareError, MailboxHost, MemoryStorage, RecordingBackend, RootKey, RpcRequest, RpcResponse, SignerKind,
    StaticWallet, Storage, TabId, Wallet, WalletRegistry, WalletSnapshot,
};
use serde_json::Value as Json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const PASSWORD: &str = "correct horse battery staple";
pub const WALLET_ID: &str = "w1";
pub const PROTOCOL: &str = "cardano-connector";
pub const SITE: &str = "https://dex.example";

pub fn root() -> RootKey { RootKey::from_bytes([7u8; 32]) }

pub fn tx_hash(n: u8) -> String { hex::encode([n; 32]) }

pub fn policy() -> String { hex::encode([0xaa; 28]) }

/// Wallet layout: 3 external + 2 internal addresses.
pub fn snapshot() -> WalletSnapshot {
    WalletSnapshot::derive(WALLET_ID, 0, &root(), 3, 2).expect("snapshot")
}

pub fn utxo(snapshot: &WalletSnapshot, n: u8, amount: u64) -> UnspentOutput {
    UnspentOutput {
        tx_hash: tx_hash(n),
        tx_index: 0,
        address: snapshot.addresses[0].address.clone(),
        amount,
        assets: Vec::new(),
    }
}

pub fn nft_utxo(snapshot: &WalletSnapshot, n: u8, amount: u64, name: &str) -> UnspentOutput {
    let mut u = utxo(snapshot, n, amount);
    u.assets.push(Asset::new(&AssetId::new(policy(), name), 1));
    u
}

/// 1, 3 and 10 ADA plus an NFT-carrying UTXO.
pub fn funded_snapshot() -> WalletSnapshot {
    let mut s = snapshot();
    s.utxos = vec![
        utxo(&s, 1, 1_000_000),
        utxo(&s, 2, 3_000_000),
        utxo(&s, 3, 10_000_000),
        nft_utxo(&s, 4, 2_000_000, "01"),
    ];
    s
}

pub struct Fixture {
    pub connector: Connector,
    pub host: Arc<MailboxHost>,
    pub backend: Arc<RecordingBackend>,
    pub wallets: Arc<WalletRegistry>,
    pub wallet: Arc<StaticWallet>,
    pub storage: Arc<dyn Storage>,
}

pub fn sealed() -> EncryptedRootKey { EncryptedRootKey::seal(&root(), PASSWORD).expect("seal") }

pub async fn fixture() -> Fixture { fixture_with(Arc::new(MemoryStorage::new()), SignerKind::Software(sealed()), funded_snapshot()).await }

pub async fn fixture_with(storage: Arc<dyn Storage>, signer: SignerKind, snapshot: WalletSnapshot) -> Fixture {
    let wallet = Arc::new(StaticWallet::new(snapshot, signer));
    let wallets = Arc::new(WalletRegistry::new());
    wallets.add(wallet.clone()).await;
    rebuild(storage, wallets, wallet)
}

/// A fresh connector over the same storage and wallets, as after a restart.
pub fn rebuild(storage: Arc<dyn Storage>, wallets: Arc<WalletRegistry>, wallet: Arc<StaticWallet>) -> Fixture {
    let host = Arc::new(MailboxHost::new());
    let backend = Arc::new(RecordingBackend::new());
    let connector = Connector::builder(ConnectorConfig::new("test"), wallets.clone(), host.clone(), backend.clone())
        .storage(storage.clone())
        .build();
    Fixture { connector, host, backend, wallets, wallet, storage }
}

impl Fixture {
    pub async fn snapshot(&self) -> WalletSnapshot { self.wallet.snapshot().await.expect("snapshot") }

    /// Connects `tab` through the prompt and drains the connect response.
    pub async fn connect(&self, tab: TabId) {
        let outcome = self.connector.connect(tab, ConnectRequest::new(SITE, PROTOCOL)).await.expect("connect");
        assert_eq!(outcome, ConnectOutcome::Prompted);
        let pending = self.connector.next_connection_request().await.expect("next").expect("pending connection");
        assert_eq!(pending.tab_id, tab);
        let decision = ConnectDecision::Accept { wallet_id: WALLET_ID.into(), remember: false, password: None };
        let response = self.connector.resolve_connection(tab, decision).await.expect("resolve");
        assert!(response.success);
        self.host.drain(tab).await;
    }

    pub async fn call(&self, tab: TabId, function: &str, params: Vec<Json>, uid: &str) -> dapp_connector::Dispatch {
        self.connector.rpc(tab, RpcRequest::new(PROTOCOL, function, params, uid)).await
    }

    /// Ok value of a call that completes synchronously.
    pub async fn ok(&self, tab: TabId, function: &str, params: Vec<Json>) -> Json {
        let dispatch = self.call(tab, function, params, "sync").await;
        let response = dispatch.response().unwrap_or_else(|| panic!("{function} deferred"));
        response.result.ok().cloned().unwrap_or_else(|| panic!("{function} failed: {:?}", response.result))
    }

    pub async fn rpc_responses(&self, tab: TabId) -> Vec<RpcResponse> {
        self.host
            .drain(tab)
            .await
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Rpc(r) => Some(r),
                Delivery::Connect(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum DeviceBehavior {
    Sign,
    WrongHash,
    Fail(HardwareError),
}

/// Device that signs with the fixture root key, scripted per call.
pub struct MockDevice {
    script: Mutex<VecDeque<DeviceBehavior>>,
    pub seen: Mutex<Vec<DeviceRequest>>,
}

impl MockDevice {
    pub fn new(script: impl IntoIterator<Item = DeviceBehavior>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into_iter().collect()), seen: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl HardwareDevice for MockDevice {
    async fn sign(&self, request: DeviceRequest) -> Result<DeviceResponse, HardwareError> {
        self.seen.lock().await.push(request.clone());
        let behavior = self.script.lock().await.pop_front().unwrap_or(DeviceBehavior::Sign);
        let hash = hex::decode(&request.tx_hash).map_err(|e| HardwareError::DeviceUnreachable(e.to_string()))?;
        let root = root();
        let mut witnesses = Vec::new();
        for path in request.signing_paths() {
            let (vkey, signature) = root.sign(path, &hash).map_err(|e| HardwareError::DeviceUnreachable(e.to_string()))?;
            witnesses.push(dapp_connector::chain::VkeyWitness { vkey, signature });
        }
        match behavior {
            DeviceBehavior::Sign => Ok(DeviceResponse { tx_hash: request.tx_hash.clone(), witnesses }),
            DeviceBehavior::WrongHash => Ok(DeviceResponse { tx_hash: tx_hash(0xee), witnesses }),
            DeviceBehavior::Fail(err) => Err(err),
        }
    }
}

/// Selector that panics, for handler isolation tests.
pub struct PanickingSelector;

impl dapp_connector::CoinSelector for PanickingSelector {
    fn select(
        &self,
        _utxos: &[UnspentOutput],
        _target: &dapp_connector::chain::Value,
        _min_utxo_value: u64,
    ) -> Result<dapp_connector::selection::Selection, dapp_connector::SelectionError> {
        panic!("selector exploded")
    }
}
