//! Pending sign queue - persisted, uid-keyed sign requests and their resolution.
//!
//! ```text
//! QUEUED ──enqueue──▶ AWAITING_WINDOW ──next()──▶ AWAITING_DECISION
//!                                                   │
//!                     confirm ─ ok ────────▶ CONFIRMED ─┐
//!                     reject ──────────────▶ REJECTED ──┼──▶ RESPONDED
//!                     spent/missing utxo ──▶ ERRORED ───┘
//!                     wrong password / device busy ──▶ stays AWAITING_DECISION
//! ```
//!
//! A request is deleted from the registry before its response is delivered,
//! so each uid gets exactly one `rpc_response`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{Context, TabId};
use crate::chain::{Address, Transaction, TxInput, TxOutput, UnspentOutput, WitnessSet};
use crate::error::{ConnectorResult, DappError, DataSignErrorCode, TxSignErrorCode, UtxoErrorCode};
use crate::rpc::{ReturnType, RpcResponse};
use crate::selection::REORG_COLLATERAL_INDEX;
use crate::signing::{
    self, build_request, merge_witness_sets, sign_transaction, verify_response, DataSignature, DeviceKind,
    DeviceRequest, HardwareDevice, HardwareError, SignError, SignerKind, SigningPlan,
};
use crate::wallet::{KeyError, RootKey, SubmittedTx, Wallet, WalletSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignKind {
    #[serde(rename = "data")]
    Data,
    #[serde(rename = "tx")]
    Tx,
    #[serde(rename = "tx-reorg")]
    TxReorg,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SignPayload {
    #[serde(rename = "data")]
    Data { address: Address, payload: String },
    #[serde(rename = "tx", rename_all = "camelCase")]
    Tx { tx: Transaction, partial_sign: bool },
    /// Self-payment producing a fresh collateral output at index 0.
    #[serde(rename = "tx-reorg")]
    TxReorg { tx: Transaction, required: u64 },
}

impl SignPayload {
    pub fn kind(&self) -> SignKind {
        match self {
            SignPayload::Data { .. } => SignKind::Data,
            SignPayload::Tx { .. } => SignKind::Tx,
            SignPayload::TxReorg { .. } => SignKind::TxReorg,
        }
    }

    fn declined(&self) -> DappError {
        match self.kind() {
            SignKind::Data => DappError::data_sign(DataSignErrorCode::UserDeclined, "user declined"),
            SignKind::Tx | SignKind::TxReorg => DappError::tx_sign(TxSignErrorCode::UserDeclined, "user declined"),
        }
    }

    fn proof_failure(&self, info: impl Into<String>) -> DappError {
        match self.kind() {
            SignKind::Data => DappError::data_sign(DataSignErrorCode::ProofGeneration, info),
            SignKind::Tx | SignKind::TxReorg => DappError::tx_sign(TxSignErrorCode::ProofGeneration, info),
        }
    }
}

/// The originating call, kept so the response can be rendered after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Continuation {
    pub function: String,
    pub params: Vec<serde_json::Value>,
    pub return_type: ReturnType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSign {
    pub uid: String,
    /// Global insertion order, assigned on enqueue.
    pub seq: u64,
    pub protocol: String,
    pub payload: SignPayload,
    pub continuation: Continuation,
    pub opened_window: bool,
    /// Unix millis
    pub created_at: i64,
}

impl PendingSign {
    pub fn new(uid: impl Into<String>, protocol: impl Into<String>, payload: SignPayload, continuation: Continuation) -> Self {
        Self {
            uid: uid.into(),
            seq: 0,
            protocol: protocol.into(),
            payload,
            continuation,
            opened_window: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn kind(&self) -> SignKind { self.payload.kind() }
}

/// What the confirmation surface shows before the user decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPreview {
    pub tab_id: TabId,
    pub request: PendingSign,
    pub signer: String,
    /// Required signers this wallet cannot provide.
    pub missing_signers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewOutcome {
    Ready(SignPreview),
    /// Auxiliary data was stale; the request was answered with this error and removed.
    Errored(DappError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignResolution {
    Signed(serde_json::Value),
    Failed(DappError),
    /// The request stays pending; the user may try again.
    Retry(String),
}

enum Signed {
    Witnesses(WitnessSet),
    Data(DataSignature),
    Reorg(Transaction),
}

enum Outcome {
    Signed(Signed),
    Failed(DappError),
    Retry(String),
}

pub struct PendingSignQueue {
    ctx: Arc<Context>,
}

impl PendingSignQueue {
    pub(crate) fn new(ctx: Arc<Context>) -> Self { Self { ctx } }

    pub async fn next(&self) -> ConnectorResult<Option<(TabId, PendingSign)>> {
        Ok(self.ctx.sites.next_unopened_sign().await?)
    }

    pub async fn preview(&self, tab_id: TabId, uid: &str) -> ConnectorResult<PreviewOutcome> {
        let request = self.ctx.sites.get_sign(tab_id, uid).await?;
        let wallet = self.ctx.connected_wallet(tab_id).await?;
        let stale = {
            let _guard = self.ctx.mutex.lock().await;
            let snapshot = self.ctx.snapshot(wallet.as_ref()).await?;
            match self.stale_inputs(&snapshot, &request.payload).await? {
                Some(err) => Err(err),
                None => Ok(missing_signers(&snapshot, &request.payload)),
            }
        };
        match stale {
            Ok(missing_signers) => Ok(PreviewOutcome::Ready(SignPreview {
                tab_id,
                request,
                signer: wallet.signer().as_str().to_string(),
                missing_signers,
            })),
            Err(err) => {
                self.respond(tab_id, uid, Err(err.clone())).await?;
                Ok(PreviewOutcome::Errored(err))
            }
        }
    }

    pub async fn confirm(&self, tab_id: TabId, uid: &str, password: Option<&str>) -> ConnectorResult<SignResolution> {
        let request = self.ctx.sites.get_sign(tab_id, uid).await?;
        Self::ensure_shown(&request)?;
        let wallet = self.ctx.connected_wallet(tab_id).await?;

        let outcome = match wallet.signer() {
            SignerKind::Software(sealed) => {
                let Some(password) = password else {
                    return Ok(SignResolution::Retry("password required".into()));
                };
                let _guard = self.ctx.mutex.lock().await;
                let snapshot = self.ctx.snapshot(wallet.as_ref()).await?;
                match self.stale_inputs(&snapshot, &request.payload).await? {
                    Some(err) => Outcome::Failed(err),
                    None => match sealed.open(password) {
                        Ok(root) => sign_software(&root, &snapshot, &request.payload),
                        Err(KeyError::WrongPassword) => {
                            tracing::warn!(tab_id, uid, "Wrong password for sign request");
                            Outcome::Retry("wrong password".into())
                        }
                        Err(e) => return Err(e.into()),
                    },
                }
            }
            SignerKind::Ledger(device) => self.sign_on_device(tab_id, &request, wallet.as_ref(), DeviceKind::Ledger, device).await?,
            SignerKind::Trezor(device) => self.sign_on_device(tab_id, &request, wallet.as_ref(), DeviceKind::Trezor, device).await?,
        };

        match outcome {
            Outcome::Retry(reason) => Ok(SignResolution::Retry(reason)),
            Outcome::Failed(err) => {
                self.respond(tab_id, uid, Err(err.clone())).await?;
                Ok(SignResolution::Failed(err))
            }
            Outcome::Signed(signed) => {
                // Claim the request before any side effect so a racing confirm cannot repeat it.
                let request = self.ctx.sites.take_sign(tab_id, uid).await?;
                let result = self.finalize(wallet.id(), &request, signed).await;
                self.deliver(tab_id, &request, result.clone()).await?;
                Ok(match result {
                    Ok(value) => SignResolution::Signed(value),
                    Err(err) => SignResolution::Failed(err),
                })
            }
        }
    }

    /// Builds the device request under the mutex, then waits on the device without it.
    async fn sign_on_device(
        &self,
        tab_id: TabId,
        request: &PendingSign,
        wallet: &dyn Wallet,
        kind: DeviceKind,
        device: Arc<dyn HardwareDevice>,
    ) -> ConnectorResult<Outcome> {
        let prepared = {
            let _guard = self.ctx.mutex.lock().await;
            let snapshot = self.ctx.snapshot(wallet).await?;
            match self.stale_inputs(&snapshot, &request.payload).await? {
                Some(err) => Err(err),
                None => prepare_device_request(kind, &snapshot, &request.payload),
            }
        };
        let device_request = match prepared {
            Ok(device_request) => device_request,
            Err(err) => return Ok(Outcome::Failed(err)),
        };

        tracing::info!(tab_id, uid = %request.uid, device = ?kind, "Awaiting hardware signature");
        Ok(match device.sign(device_request.clone()).await {
            Ok(response) => match verify_response(&device_request, response) {
                Ok(witnesses) => signed_from_witnesses(&request.payload, witnesses),
                Err(e) => Outcome::Failed(request.payload.proof_failure(e.to_string())),
            },
            Err(e) if e.is_recoverable() => {
                tracing::warn!(tab_id, uid = %request.uid, error = %e, "Hardware signing interrupted");
                Outcome::Retry(e.to_string())
            }
            Err(e) => Outcome::Failed(request.payload.proof_failure(e.to_string())),
        })
    }

    pub async fn reject(&self, tab_id: TabId, uid: &str) -> ConnectorResult<DappError> {
        Self::ensure_shown(&self.ctx.sites.get_sign(tab_id, uid).await?)?;
        let request = self.ctx.sites.take_sign(tab_id, uid).await?;
        let err = request.payload.declined();
        tracing::warn!(tab_id, uid, kind = ?request.kind(), "Sign request declined");
        self.deliver(tab_id, &request, Err(err.clone())).await?;
        Ok(err)
    }

    /// Decisions apply only to requests a confirmation surface has fetched.
    fn ensure_shown(request: &PendingSign) -> ConnectorResult<()> {
        if request.opened_window {
            return Ok(());
        }
        Err(DappError::invalid_request(format!("request {} has not been shown to the user", request.uid)).into())
    }

    async fn respond(&self, tab_id: TabId, uid: &str, result: Result<serde_json::Value, DappError>) -> ConnectorResult<()> {
        let request = self.ctx.sites.take_sign(tab_id, uid).await?;
        self.deliver(tab_id, &request, result).await
    }

    async fn deliver(
        &self,
        tab_id: TabId,
        request: &PendingSign,
        result: Result<serde_json::Value, DappError>,
    ) -> ConnectorResult<()> {
        let response = RpcResponse::new(&request.protocol, &request.uid, result);
        self.ctx.host.deliver_rpc(tab_id, response).await?;
        tracing::info!(tab_id, uid = %request.uid, function = %request.continuation.function, "Sign request resolved");
        Ok(())
    }

    /// Inputs consumed by a journaled submission are spent; reorg inputs must
    /// also still be in the wallet's UTXO set.
    async fn stale_inputs(&self, snapshot: &WalletSnapshot, payload: &SignPayload) -> ConnectorResult<Option<DappError>> {
        let spent = self.ctx.journal.spent_inputs(&snapshot.wallet_id).await?;
        let label = |i: &TxInput| format!("{}#{}", i.tx_hash, i.index);
        let check = |inputs: &[TxInput], must_exist: bool| -> Option<DappError> {
            let live: BTreeSet<TxInput> = snapshot.utxos.iter().map(UnspentOutput::input).collect();
            for input in inputs {
                if spent.contains(input) {
                    return Some(DappError::utxo(UtxoErrorCode::SpentUtxo, label(input)));
                }
                if must_exist && !live.contains(input) {
                    return Some(DappError::utxo(UtxoErrorCode::MissingUtxo, label(input)));
                }
            }
            None
        };
        Ok(match payload {
            SignPayload::Data { .. } => None,
            SignPayload::Tx { tx, .. } => check(&tx.body.inputs, false),
            SignPayload::TxReorg { tx, .. } => check(&tx.body.inputs, true),
        })
    }

    async fn finalize(&self, wallet_id: &str, request: &PendingSign, signed: Signed) -> Result<serde_json::Value, DappError> {
        let return_type = request.continuation.return_type;
        match signed {
            Signed::Witnesses(ws) => return_type.render(&ws).map_err(|e| DappError::internal(e.to_string())),
            Signed::Data(sig) => serde_json::to_value(sig).map_err(|e| DappError::internal(e.to_string())),
            Signed::Reorg(tx) => {
                let _guard = self.ctx.mutex.lock().await;
                let tx_hash = self.ctx.backend.submit(&tx).await.map_err(DappError::from)?;
                self.ctx
                    .journal
                    .record(wallet_id, SubmittedTx::new(&tx_hash, tx.body.inputs.clone()))
                    .await
                    .map_err(|e| DappError::internal(e.to_string()))?;
                let output: &TxOutput = tx
                    .body
                    .outputs
                    .get(REORG_COLLATERAL_INDEX as usize)
                    .ok_or_else(|| DappError::internal("reorg transaction has no outputs"))?;
                let collateral = UnspentOutput {
                    tx_hash,
                    tx_index: REORG_COLLATERAL_INDEX,
                    address: output.address.clone(),
                    amount: output.value.coin,
                    assets: Vec::new(),
                };
                return_type.render_list(&[collateral]).map_err(|e| DappError::internal(e.to_string()))
            }
        }
    }
}

fn missing_signers(snapshot: &WalletSnapshot, payload: &SignPayload) -> Vec<String> {
    match payload {
        SignPayload::Tx { tx, .. } | SignPayload::TxReorg { tx, .. } => SigningPlan::build(snapshot, tx).unresolved,
        SignPayload::Data { .. } => Vec::new(),
    }
}

fn sign_error_to_dapp(payload: &SignPayload, err: SignError) -> DappError {
    match err {
        SignError::AddressNotOwned(info) => DappError::data_sign(DataSignErrorCode::AddressNotPk, info),
        SignError::InvalidPayload(info) if payload.kind() == SignKind::Data => {
            DappError::data_sign(DataSignErrorCode::InvalidFormat, info)
        }
        other => payload.proof_failure(other.to_string()),
    }
}

/// Plan check shared by both signer kinds: without `partialSign` the wallet
/// must cover every required witness.
fn checked_plan(snapshot: &WalletSnapshot, tx: &Transaction, partial_sign: bool) -> Result<SigningPlan, SignError> {
    let plan = SigningPlan::build(snapshot, tx);
    if !partial_sign && !plan.is_complete() {
        let mut missing = plan.unresolved.clone();
        missing.extend(plan.foreign_inputs.iter().map(|i| format!("{}#{}", i.tx_hash, i.index)));
        return Err(SignError::MissingSigners(missing));
    }
    Ok(plan)
}

fn sign_software(root: &RootKey, snapshot: &WalletSnapshot, payload: &SignPayload) -> Outcome {
    let result = match payload {
        SignPayload::Tx { tx, partial_sign } => checked_plan(snapshot, tx, *partial_sign)
            .and_then(|plan| sign_transaction(root, tx, &plan))
            .map(Signed::Witnesses),
        SignPayload::TxReorg { tx, .. } => checked_plan(snapshot, tx, false)
            .and_then(|plan| sign_transaction(root, tx, &plan))
            .map(|ws| {
                let mut signed = tx.clone();
                signed.witness_set = merge_witness_sets(&tx.witness_set, &ws);
                Signed::Reorg(signed)
            }),
        SignPayload::Data { address, payload: hex_payload } => signing::signing_path(snapshot, address)
            .and_then(|path| signing::sign_data(root, &path, address, hex_payload))
            .map(Signed::Data),
    };
    match result {
        Ok(signed) => Outcome::Signed(signed),
        Err(e) => Outcome::Failed(sign_error_to_dapp(payload, e)),
    }
}

fn prepare_device_request(
    kind: DeviceKind,
    snapshot: &WalletSnapshot,
    payload: &SignPayload,
) -> Result<DeviceRequest, DappError> {
    let (tx, partial_sign) = match payload {
        SignPayload::Tx { tx, partial_sign } => (tx, *partial_sign),
        SignPayload::TxReorg { tx, .. } => (tx, false),
        SignPayload::Data { .. } => {
            return Err(sign_error_to_dapp(payload, SignError::Unsupported("hardware")));
        }
    };
    let plan = checked_plan(snapshot, tx, partial_sign).map_err(|e| sign_error_to_dapp(payload, e))?;
    build_request(kind, snapshot.network_id, tx, &plan)
        .map_err(|e: HardwareError| sign_error_to_dapp(payload, SignError::Hardware(e)))
}

fn signed_from_witnesses(payload: &SignPayload, witnesses: WitnessSet) -> Outcome {
    match payload {
        SignPayload::Tx { .. } => Outcome::Signed(Signed::Witnesses(witnesses)),
        SignPayload::TxReorg { tx, .. } => {
            let mut signed = tx.clone();
            signed.witness_set = merge_witness_sets(&tx.witness_set, &witnesses);
            Outcome::Signed(Signed::Reorg(signed))
        }
        SignPayload::Data { .. } => Outcome::Failed(payload.proof_failure("hardware data signing unsupported")),
    }
}
