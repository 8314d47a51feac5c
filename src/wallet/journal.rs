//! Submitted-transaction journal.
//!
//! Inputs of locally submitted transactions stay reserved until the ledger
//! snapshot no longer lists any of them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::chain::{TxInput, UnspentOutput};
use crate::paths;
use crate::storage::{get_typed, set_typed, Storage, StorageResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTx {
    pub tx_hash: String,
    pub spent_inputs: Vec<TxInput>,
    /// Unix millis
    pub submitted_at: i64,
}

impl SubmittedTx {
    pub fn new(tx_hash: impl Into<String>, spent_inputs: Vec<TxInput>) -> Self {
        Self { tx_hash: tx_hash.into(), spent_inputs, submitted_at: chrono::Utc::now().timestamp_millis() }
    }
}

/// Record and reconcile are read-modify-write of one key; `lock` serializes them.
#[derive(Clone)]
pub struct SubmittedTxJournal {
    storage: Arc<dyn Storage>,
    lock: Arc<Mutex<()>>,
}

impl SubmittedTxJournal {
    pub fn new(storage: Arc<dyn Storage>) -> Self { Self { storage, lock: Arc::new(Mutex::new(())) } }

    pub async fn entries(&self, wallet_id: &str) -> StorageResult<Vec<SubmittedTx>> {
        Ok(get_typed(self.storage.as_ref(), &paths::wallet::submitted(wallet_id)).await?.unwrap_or_default())
    }

    pub async fn record(&self, wallet_id: &str, tx: SubmittedTx) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.entries(wallet_id).await?;
        entries.retain(|e| e.tx_hash != tx.tx_hash);
        tracing::info!(wallet_id, tx_hash = %tx.tx_hash, inputs = tx.spent_inputs.len(), "Journaled submission");
        entries.push(tx);
        set_typed(self.storage.as_ref(), &paths::wallet::submitted(wallet_id), &entries).await
    }

    pub async fn spent_inputs(&self, wallet_id: &str) -> StorageResult<BTreeSet<TxInput>> {
        Ok(self.entries(wallet_id).await?.into_iter().flat_map(|e| e.spent_inputs).collect())
    }

    /// Drops entries none of whose inputs remain in `utxos`. Returns how many were dropped.
    pub async fn reconcile(&self, wallet_id: &str, utxos: &[UnspentOutput]) -> StorageResult<usize> {
        let live: BTreeSet<TxInput> = utxos.iter().map(UnspentOutput::input).collect();
        let _guard = self.lock.lock().await;
        let mut entries = self.entries(wallet_id).await?;
        let before = entries.len();
        entries.retain(|e| e.spent_inputs.iter().any(|i| live.contains(i)));
        let dropped = before - entries.len();
        if dropped > 0 {
            tracing::debug!(wallet_id, dropped, "Reconciled submitted-tx journal");
            if entries.is_empty() {
                self.storage.remove(&paths::wallet::submitted(wallet_id)).await?;
            } else {
                set_typed(self.storage.as_ref(), &paths::wallet::submitted(wallet_id), &entries).await?;
            }
        }
        Ok(dropped)
    }
}
