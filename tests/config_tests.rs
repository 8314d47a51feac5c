//! Data-root resolution and on-disk layout.

use dapp_connector::{ConnectorConfig, FileStorage, Network, Storage};
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::Mutex;
use tempfile::TempDir;

// Tests here mutate DAPP_CONNECTOR_ROOT; serialize them.
static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner())
}

/// Test: the data root is namespaced by app under DAPP_CONNECTOR_ROOT
#[test]
fn data_root_from_env() {
    let _guard = lock_env();
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var("DAPP_CONNECTOR_ROOT", dir.path());

    let config = ConnectorConfig::new("myapp");
    assert_eq!(config.data_root(), dir.path().join("myapp"));
    assert_eq!(config.storage_dir(), dir.path().join("myapp").join("state"));
    assert_eq!(config.wallets_dir(), dir.path().join("myapp").join("wallets"));

    std::env::remove_var("DAPP_CONNECTOR_ROOT");
}

/// Test: an explicit data dir wins over the environment
#[test]
fn explicit_data_dir_wins() {
    let _guard = lock_env();
    let env_dir = TempDir::new().expect("tempdir");
    let explicit = TempDir::new().expect("tempdir");
    std::env::set_var("DAPP_CONNECTOR_ROOT", env_dir.path());

    let config = ConnectorConfig::new("myapp").with_data_dir(explicit.path());
    assert_eq!(config.data_root(), explicit.path());

    std::env::remove_var("DAPP_CONNECTOR_ROOT");
}

/// Test: network names map to their ids
#[test]
fn network_ids() {
    assert_eq!(Network::from_str("mainnet").map(|n| n.network_id()), Some(1));
    assert_eq!(Network::from_str("preprod").map(|n| n.network_id()), Some(0));
    assert_eq!(Network::from_str("preview").map(|n| n.network_id()), Some(0));
    assert!(Network::from_str("testnet-9").is_none());

    let config = ConnectorConfig::new("x").with_network(Network::Mainnet).with_port(9000);
    assert_eq!((config.network, config.port), (Network::Mainnet, 9000));
}

/// Test: state written under the storage dir is readable by a second handle
#[tokio::test]
async fn file_storage_under_storage_dir() {
    let dir = TempDir::new().expect("tempdir");
    let config = ConnectorConfig::new("myapp").with_data_dir(dir.path());

    let first = FileStorage::open(config.storage_dir()).await.expect("open");
    first.set("site/7", json!({ "url": "https://dex.example" })).await.expect("set");

    let second = FileStorage::open(config.storage_dir()).await.expect("reopen");
    assert_eq!(second.get("site/7").await.expect("get"), Some(json!({ "url": "https://dex.example" })));
}
