//! Host capabilities - what the embedding extension provides.
//!
//! The connector core never talks to a browser directly. It asks a [`Host`]
//! to open confirmation surfaces and to route responses back to a tab, and
//! a [`ChainBackend`] to submit transactions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::chain::Transaction;
use crate::connector::{ConnectResponse, TabId};
use crate::error::{DappError, TxSendErrorCode};
use crate::rpc::RpcResponse;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Tab {0} is gone")]
    TabClosed(TabId),
    #[error("Transport error: {0}")]
    Transport(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Which confirmation window the host should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Connect,
    Sign,
}

#[async_trait]
pub trait Host: Send + Sync {
    async fn open_confirmation(&self, tab_id: TabId, surface: Surface) -> HostResult<()>;
    async fn deliver_connect(&self, tab_id: TabId, response: ConnectResponse) -> HostResult<()>;
    async fn deliver_rpc(&self, tab_id: TabId, response: RpcResponse) -> HostResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    Connect(ConnectResponse),
    Rpc(RpcResponse),
}

/// In-process host: records opened surfaces and queues deliveries per tab
/// until a transport drains them.
#[derive(Default)]
pub struct MailboxHost {
    opened: Mutex<Vec<(TabId, Surface)>>,
    mailboxes: Mutex<BTreeMap<TabId, Vec<Delivery>>>,
}

impl MailboxHost {
    pub fn new() -> Self { Self::default() }

    pub async fn opened(&self) -> Vec<(TabId, Surface)> { self.opened.lock().await.clone() }

    pub async fn drain(&self, tab_id: TabId) -> Vec<Delivery> {
        self.mailboxes.lock().await.remove(&tab_id).unwrap_or_default()
    }

    pub async fn pending_count(&self, tab_id: TabId) -> usize {
        self.mailboxes.lock().await.get(&tab_id).map_or(0, Vec::len)
    }

    async fn push(&self, tab_id: TabId, delivery: Delivery) {
        self.mailboxes.lock().await.entry(tab_id).or_default().push(delivery);
    }
}

#[async_trait]
impl Host for MailboxHost {
    async fn open_confirmation(&self, tab_id: TabId, surface: Surface) -> HostResult<()> {
        tracing::debug!(tab_id, ?surface, "Open confirmation surface");
        self.opened.lock().await.push((tab_id, surface));
        Ok(())
    }

    async fn deliver_connect(&self, tab_id: TabId, response: ConnectResponse) -> HostResult<()> {
        self.push(tab_id, Delivery::Connect(response)).await;
        Ok(())
    }

    async fn deliver_rpc(&self, tab_id: TabId, response: RpcResponse) -> HostResult<()> {
        self.push(tab_id, Delivery::Rpc(response)).await;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Submission refused: {0}")]
    Refused(String),
    #[error("Submission failed: {0}")]
    Failure(String),
}

impl From<SubmitError> for DappError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Refused(info) => DappError::tx_send(TxSendErrorCode::Refused, info),
            SubmitError::Failure(info) => DappError::tx_send(TxSendErrorCode::Failure, info),
        }
    }
}

#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Submits a signed transaction; returns its hash.
    async fn submit(&self, tx: &Transaction) -> Result<String, SubmitError>;
}

/// Backend that accepts everything and keeps what it saw.
#[derive(Default)]
pub struct RecordingBackend {
    submitted: Mutex<Vec<Transaction>>,
    fail_next: Mutex<Option<SubmitError>>,
}

impl RecordingBackend {
    pub fn new() -> Self { Self::default() }

    pub async fn submitted(&self) -> Vec<Transaction> { self.submitted.lock().await.clone() }

    pub async fn fail_next(&self, error: SubmitError) { *self.fail_next.lock().await = Some(error); }
}

#[async_trait]
impl ChainBackend for RecordingBackend {
    async fn submit(&self, tx: &Transaction) -> Result<String, SubmitError> {
        if let Some(err) = self.fail_next.lock().await.take() {
            return Err(err);
        }
        let hash = tx.hash().map_err(|e| SubmitError::Refused(e.to_string()))?;
        self.submitted.lock().await.push(tx.clone());
        tracing::info!(tx_hash = %hash, "Transaction submitted");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TxBody;

    #[tokio::test]
    async fn test_mailbox_drain() {
        let host = MailboxHost::new();
        host.open_confirmation(3, Surface::Sign).await.unwrap();
        host.deliver_connect(3, ConnectResponse::failure("no")).await.unwrap();
        assert_eq!(host.pending_count(3).await, 1);
        assert_eq!(host.drain(3).await.len(), 1);
        assert!(host.drain(3).await.is_empty());
        assert_eq!(host.opened().await, vec![(3, Surface::Sign)]);
    }

    #[tokio::test]
    async fn test_backend_failure_once() {
        let backend = RecordingBackend::new();
        let tx = Transaction::new(TxBody::default());
        backend.fail_next(SubmitError::Failure("node down".into())).await;
        assert!(backend.submit(&tx).await.is_err());
        assert!(backend.submit(&tx).await.is_ok());
        assert_eq!(backend.submitted().await.len(), 1);
    }
}
