//! dapp-connector CLI
//!
//!   dapp-connector serve [--port 8915]          → HTTP transport for the extension
//!   dapp-connector new-wallet <id> --password <pw> [--external 5 --internal 5]
//!   dapp-connector whitelist                    → List remembered sites
//!   dapp-connector revoke <url> [--wallet <id>] → Forget a site
//!   dapp-connector sites                        → List connected tabs
//!
//! Common options:
//!   --app <name> --network <mainnet|preprod|preview> --protocol <name> --data-dir <path>
//!
//! Wallets are JSON files under `<data-root>/wallets/`; connector state lives
//! under `<data-root>/state/`.

use anyhow::{anyhow, bail, Context as _, Result};
use dapp_connector::logging::init_logging;
use dapp_connector::server::{self, AppState};
use dapp_connector::{
    install_signal_handlers, Connector, ConnectorConfig, EncryptedRootKey, FileStorage, MailboxHost, Network,
    RecordingBackend, RootKey, SignerKind, StaticWallet, WalletRegistry, WalletSnapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// On-disk software wallet: sealed root key plus the last known ledger view.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletFile {
    root: EncryptedRootKey,
    snapshot: WalletSnapshot,
}

#[tokio::main]
async fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }
    if opts.version {
        println!("dapp-connector {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("serve") => cmd_serve(&opts).await,
        Some("new-wallet") => cmd_new_wallet(&opts).await,
        Some("whitelist") => cmd_whitelist(&opts).await,
        Some("revoke") => cmd_revoke(&opts).await,
        Some("sites") => cmd_sites(&opts).await,
        Some(cmd) => Err(anyhow!("Unknown command: {cmd}")),
        None => {
            print_usage();
            return;
        }
    };

    match result {
        Ok(output) if output.is_null() => {}
        Ok(output) => println!("{}", serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string())),
        Err(e) => {
            eprintln!("{}", json!({ "error": format!("{e:#}") }));
            std::process::exit(1);
        }
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    positional: Vec<String>,
    app: Option<String>,
    network: Option<String>,
    protocol: Option<String>,
    data_dir: Option<String>,
    port: Option<u16>,
    password: Option<String>,
    wallet: Option<String>,
    external: Option<u32>,
    internal: Option<u32>,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let next = args.get(i + 1).cloned();
            let mut consumed = true;
            match arg.as_str() {
                "--app" => opts.app = next,
                "--network" | "-n" => opts.network = next,
                "--protocol" => opts.protocol = next,
                "--data-dir" => opts.data_dir = next,
                "--port" | "-p" => opts.port = next.and_then(|p| p.parse().ok()),
                "--password" => opts.password = next,
                "--wallet" | "-w" => opts.wallet = next,
                "--external" => opts.external = next.and_then(|n| n.parse().ok()),
                "--internal" => opts.internal = next.and_then(|n| n.parse().ok()),
                "--help" | "-h" => {
                    opts.help = true;
                    consumed = false;
                }
                "--version" | "-V" => {
                    opts.version = true;
                    consumed = false;
                }
                _ => {
                    positional.push(arg.clone());
                    consumed = false;
                }
            }
            i += if consumed { 2 } else { 1 };
        }

        let mut positional = positional.into_iter();
        opts.command = positional.next();
        opts.positional = positional.collect();

        opts.app = opts.app.or_else(|| env::var("DAPP_CONNECTOR_APP").ok());
        opts.network = opts.network.or_else(|| env::var("DAPP_CONNECTOR_NETWORK").ok());
        opts.port = opts.port.or_else(|| env::var("DAPP_CONNECTOR_PORT").ok().and_then(|p| p.parse().ok()));
        opts
    }

    fn config(&self) -> Result<ConnectorConfig> {
        let mut config = ConnectorConfig::new(self.app.clone().unwrap_or_else(|| "dapp-connector".into()));
        if let Some(network) = &self.network {
            let network = Network::from_str(network).ok_or_else(|| anyhow!("Unknown network: {network}"))?;
            config = config.with_network(network);
        }
        if let Some(protocol) = &self.protocol {
            config = config.with_protocol(protocol.clone());
        }
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        Ok(config)
    }
}

/// Loads every `*.json` wallet file in `dir`. Unreadable files are skipped.
async fn load_wallets(dir: &Path) -> Result<WalletRegistry> {
    let registry = WalletRegistry::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "No wallets directory");
            return Ok(registry);
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let parsed = tokio::fs::read(&path)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|bytes| serde_json::from_slice::<WalletFile>(&bytes).map_err(anyhow::Error::from));
        match parsed {
            Ok(file) => {
                debug!(wallet_id = %file.snapshot.wallet_id, "Loaded wallet");
                registry.add(Arc::new(StaticWallet::new(file.snapshot, SignerKind::Software(file.root)))).await;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable wallet file"),
        }
    }
    Ok(registry)
}

async fn open_connector(opts: &ParsedArgs) -> Result<(Connector, Arc<MailboxHost>)> {
    let config = opts.config()?;
    let storage = FileStorage::open(config.storage_dir()).await.context("opening connector state")?;
    let wallets = load_wallets(&config.wallets_dir()).await?;
    let mailbox = Arc::new(MailboxHost::new());
    let connector = Connector::builder(config, Arc::new(wallets), mailbox.clone(), Arc::new(RecordingBackend::new()))
        .storage(Arc::new(storage))
        .build();
    Ok((connector, mailbox))
}

async fn cmd_serve(opts: &ParsedArgs) -> Result<serde_json::Value> {
    let (connector, mailbox) = open_connector(opts).await?;
    let pruned = connector.prune_missing_wallets().await?;
    let port = connector.config().port;
    let app = connector.config().app.clone();
    info!(app = %app, network = connector.config().network.as_str(), pruned, "Starting connector");

    let shutdown = install_signal_handlers();
    server::serve(AppState::new(Arc::new(connector), mailbox, app), port, shutdown).await?;
    Ok(serde_json::Value::Null)
}

async fn cmd_new_wallet(opts: &ParsedArgs) -> Result<serde_json::Value> {
    let wallet_id = opts.positional.first().ok_or_else(|| anyhow!("Usage: new-wallet <id> --password <pw>"))?;
    let password = opts.password.as_deref().ok_or_else(|| anyhow!("--password is required"))?;
    if wallet_id.is_empty() || wallet_id.contains(['/', '\\', '.']) {
        bail!("Invalid wallet id: {wallet_id}");
    }
    let config = opts.config()?;
    let dir = config.wallets_dir();
    let path = dir.join(format!("{wallet_id}.json"));
    if tokio::fs::try_exists(&path).await? {
        bail!("Wallet {wallet_id} already exists");
    }

    let root = RootKey::generate();
    let snapshot = WalletSnapshot::derive(
        wallet_id.as_str(),
        config.network.network_id(),
        &root,
        opts.external.unwrap_or(5),
        opts.internal.unwrap_or(5),
    )?;
    let file = WalletFile { root: EncryptedRootKey::seal(&root, password)?, snapshot };
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(&path, serde_json::to_vec_pretty(&file)?).await?;
    info!(wallet_id = %wallet_id, path = %path.display(), "Created wallet");

    let first = file.snapshot.unused_addresses().first().map(|a| a.address.to_hex());
    Ok(json!({ "walletId": wallet_id, "path": path.display().to_string(), "address": first }))
}

async fn cmd_whitelist(opts: &ParsedArgs) -> Result<serde_json::Value> {
    let (connector, _) = open_connector(opts).await?;
    let entries: Vec<_> = connector
        .whitelist()
        .await?
        .into_iter()
        .map(|e| json!({ "url": e.url, "protocol": e.protocol, "walletId": e.wallet_id, "identified": e.auth.is_some() }))
        .collect();
    Ok(json!(entries))
}

async fn cmd_revoke(opts: &ParsedArgs) -> Result<serde_json::Value> {
    let url = opts.positional.first().ok_or_else(|| anyhow!("Usage: revoke <url> [--wallet <id>]"))?;
    let (connector, _) = open_connector(opts).await?;
    let removed = connector.revoke(url, opts.wallet.as_deref()).await?;
    Ok(json!({ "url": url, "removed": removed }))
}

async fn cmd_sites(opts: &ParsedArgs) -> Result<serde_json::Value> {
    let (connector, _) = open_connector(opts).await?;
    let sites: Vec<_> = connector
        .sites()
        .await?
        .into_iter()
        .map(|(tab_id, site)| {
            json!({
                "tabId": tab_id,
                "url": site.url,
                "walletId": site.connected_wallet(),
                "pendingSigns": site.pending_signs.len(),
            })
        })
        .collect();
    Ok(json!(sites))
}

fn print_usage() {
    eprintln!(
        r#"dapp-connector - wallet connector for dApps

USAGE:
    dapp-connector <command> [options]

COMMANDS:
    serve                      Run the HTTP transport
    new-wallet <id>            Create a software wallet (--password required)
    whitelist                  List remembered sites
    revoke <url>               Forget a site (optionally --wallet <id>)
    sites                      List connected tabs

OPTIONS:
    --app <name>               App name (data root namespace)
    --network, -n <net>        mainnet, preprod, preview
    --protocol <name>          Connector protocol name
    --data-dir <path>          Override the data root
    --port, -p <port>          HTTP port (default 8915)
    --help, -h                 Show this help
    --version, -V              Show version

ENVIRONMENT:
    DAPP_CONNECTOR_ROOT        Data root
    DAPP_CONNECTOR_APP / _NETWORK / _PORT
    DAPP_CONNECTOR_LOG_JSON=1  JSON log output
    RUST_LOG                   Log filter (default info)
"#
    );
}
