//! dapp-connector: lets web pages talk to a wallet without ever touching keys.
//!
//! # Architecture
//!
//! ```text
//! Connector (entry point)
//!   │
//!   ├── ConnectionNegotiator ── WhitelistStore
//!   │     └── SiteRegistry (tabId → ConnectedSite, durable via Storage)
//!   │
//!   ├── RpcDispatcher
//!   │     ├── reads    → WalletSnapshot under WalletAccessMutex
//!   │     ├── selection → CoinSelector / collateral / TxBuilder
//!   │     └── signing  → PendingSignQueue (deferred, popup via Host)
//!   │
//!   └── PendingSignQueue
//!         └── signing: Software (sealed root key) | Ledger | Trezor
//!               └── ChainBackend + SubmittedTxJournal for reorg submissions
//! ```
//!
//! # Messages
//!
//! | Message | Method | Answer |
//! |---------|--------|--------|
//! | connect_request | `connector.connect(tab, req)` | immediate, or `connect_response` via [`Host`] |
//! | user decision | `connector.resolve_connection(tab, decision)` | one `connect_response` |
//! | rpc_request | `connector.rpc(tab, req)` | [`Dispatch::Complete`] or [`Dispatch::Deferred`] |
//! | sign decision | `connector.confirm_sign(tab, uid, pw)` / `reject_sign` | one `rpc_response` via [`Host`] |
//!
//! # Features
//!
//! - `server` - axum HTTP transport and the `dapp-connector` binary
//!
//! # Usage
//!
//! ```ignore
//! use dapp_connector::{Connector, ConnectorConfig, ConnectRequest, MailboxHost, RecordingBackend, WalletRegistry};
//!
//! let connector = Connector::builder(
//!     ConnectorConfig::new("myapp"),
//!     Arc::new(WalletRegistry::new()),
//!     Arc::new(MailboxHost::new()),
//!     Arc::new(RecordingBackend::new()),
//! )
//! .storage(Arc::new(FileStorage::open(dir).await?))
//! .build();
//!
//! connector.connect(7, ConnectRequest::new("https://dex.example", "cardano-connector")).await?;
//! ```

pub mod chain;
pub mod config;
pub mod connector;
pub mod error;
pub mod host;
pub mod logging;
pub mod paths;
pub mod rpc;
pub mod runtime;
pub mod selection;
#[cfg(feature = "server")]
pub mod server;
pub mod signing;
pub mod storage;
pub mod wallet;

// =============================================================================
// Re-exports
// =============================================================================
pub use config::{ConnectorConfig, Network, ProtocolParams};
pub use connector::{
    ConnectDecision, ConnectOutcome, ConnectRequest, ConnectResponse, Connector, ConnectorBuilder, PendingSign,
    PreviewOutcome, SignResolution, TabId, WalletAccessMutex, WhitelistEntry,
};
pub use error::{ConnectorError, ConnectorResult, DappError};
pub use host::{ChainBackend, Delivery, Host, MailboxHost, RecordingBackend, SubmitError, Surface};
pub use rpc::{Dispatch, ReturnType, RpcRequest, RpcResponse, RpcReturn};
pub use runtime::{install_signal_handlers, Shutdown};
pub use selection::{CoinSelector, GreedySelector, SelectionError};
pub use signing::{
    DeviceKind, DevicePayload, DeviceRequest, DeviceResponse, HardwareDevice, HardwareError, SignerKind,
};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use wallet::{
    EncryptedRootKey, RootKey, StaticWallet, Wallet, WalletAuthEntry, WalletProvider, WalletRegistry, WalletSnapshot,
};
