//! Hardware signing - request construction and response checks.
//!
//! The device itself sits behind [`HardwareDevice`]. Building the request
//! needs wallet state and happens under the wallet access mutex; the device
//! call does not.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SigningPlan;
use crate::chain::{Encoded, Transaction, TxInput, VkeyWitness, WitnessSet};
use crate::wallet::DerivationPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Ledger,
    Trezor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMode {
    Ordinary,
    Multisig,
    PlutusTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRequest {
    pub mode: SigningMode,
    pub network_id: u8,
    /// Hash the device must report back.
    pub tx_hash: String,
    pub payload: DevicePayload,
}

impl DeviceRequest {
    pub fn device(&self) -> DeviceKind {
        match self.payload {
            DevicePayload::Ledger { .. } => DeviceKind::Ledger,
            DevicePayload::Trezor { .. } => DeviceKind::Trezor,
        }
    }

    /// Every path the device is asked to witness with, once each.
    pub fn signing_paths(&self) -> Vec<&DerivationPath> {
        let mut paths: Vec<&DerivationPath> = match &self.payload {
            DevicePayload::Ledger { witness_paths, .. } => witness_paths.iter().collect(),
            DevicePayload::Trezor { inputs, additional_signer_paths, .. } => {
                inputs.iter().filter_map(|i| i.path.as_ref()).chain(additional_signer_paths).collect()
            }
        };
        paths.sort();
        paths.dedup();
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "device", rename_all = "snake_case")]
pub enum DevicePayload {
    /// Ledger parses the body on-device: the encoded body and one flat
    /// list of witness paths, input keys first.
    Ledger { body_hex: String, witness_paths: Vec<DerivationPath> },
    /// Trezor takes the structured transaction, each input paired with the
    /// path that unlocks it, and additional signers listed apart.
    Trezor { tx: Transaction, inputs: Vec<TrezorInput>, additional_signer_paths: Vec<DerivationPath> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrezorInput {
    pub input: TxInput,
    /// `None` for inputs the wallet does not own.
    pub path: Option<DerivationPath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub tx_hash: String,
    pub witnesses: Vec<VkeyWitness>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),
    #[error("Cancelled on device")]
    UserCancelled,
    #[error("Transaction not supported by device: {0}")]
    UnsupportedTransaction(String),
    #[error("Device signed {got}, expected {expected}")]
    HashMismatch { expected: String, got: String },
}

impl HardwareError {
    /// Recoverable errors leave the request pending for another attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HardwareError::DeviceUnreachable(_) | HardwareError::UserCancelled)
    }
}

#[async_trait]
pub trait HardwareDevice: Send + Sync {
    async fn sign(&self, request: DeviceRequest) -> Result<DeviceResponse, HardwareError>;
}

pub fn signing_mode(tx: &Transaction) -> SigningMode {
    let ws = &tx.witness_set;
    if !tx.body.collateral_inputs.is_empty() || !ws.redeemers.is_empty() || !ws.plutus_scripts.is_empty() {
        SigningMode::PlutusTransaction
    } else if !ws.native_scripts.is_empty() {
        SigningMode::Multisig
    } else {
        SigningMode::Ordinary
    }
}

pub fn build_request(
    device: DeviceKind,
    network_id: u8,
    tx: &Transaction,
    plan: &SigningPlan,
) -> Result<DeviceRequest, HardwareError> {
    let mode = signing_mode(tx);
    match device {
        DeviceKind::Ledger if mode == SigningMode::Multisig && !plan.input_paths.is_empty() => {
            return Err(HardwareError::UnsupportedTransaction(
                "multisig mode cannot spend key-locked inputs".into(),
            ));
        }
        DeviceKind::Trezor if !tx.body.voters.is_empty() => {
            return Err(HardwareError::UnsupportedTransaction("voting procedures".into()));
        }
        DeviceKind::Trezor if tx.body.certificates.iter().any(|c| c.is_drep()) => {
            return Err(HardwareError::UnsupportedTransaction("DRep certificates".into()));
        }
        _ => {}
    }
    let unencodable = |e: crate::chain::ChainError| HardwareError::UnsupportedTransaction(e.to_string());
    let tx_hash = tx.hash().map_err(unencodable)?;
    let payload = match device {
        DeviceKind::Ledger => DevicePayload::Ledger {
            body_hex: tx.body.encode_hex().map_err(unencodable)?,
            witness_paths: plan.all_paths().cloned().collect(),
        },
        DeviceKind::Trezor => DevicePayload::Trezor {
            tx: tx.clone(),
            inputs: tx
                .body
                .inputs
                .iter()
                .chain(&tx.body.collateral_inputs)
                .map(|input| TrezorInput {
                    input: input.clone(),
                    path: plan.owned_inputs.iter().find(|(i, _)| i == input).map(|(_, p)| p.clone()),
                })
                .collect(),
            additional_signer_paths: plan.signer_paths.clone(),
        },
    };
    Ok(DeviceRequest { mode, network_id, tx_hash, payload })
}

/// Accepts the device's witnesses only if it signed the hash we computed.
pub fn verify_response(request: &DeviceRequest, response: DeviceResponse) -> Result<WitnessSet, HardwareError> {
    if response.tx_hash != request.tx_hash {
        return Err(HardwareError::HashMismatch { expected: request.tx_hash.clone(), got: response.tx_hash });
    }
    let mut vkeys = response.witnesses;
    vkeys.sort();
    vkeys.dedup();
    Ok(WitnessSet::from_vkeys(vkeys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Certificate, Credential, NativeScript, TxBody};
    use crate::wallet::{keys, KeyRole};

    fn plan_with_input() -> SigningPlan {
        let path = keys::path(0, KeyRole::External, 0);
        SigningPlan {
            input_paths: vec![path.clone()],
            owned_inputs: vec![(TxInput::new("aa", 0), path)],
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_per_device() {
        let mut plan = plan_with_input();
        plan.signer_paths.push(keys::path(0, KeyRole::Stake, 0));
        let tx = Transaction::new(TxBody {
            inputs: vec![TxInput::new("aa", 0), TxInput::new("bb", 1)],
            ..Default::default()
        });

        let ledger = build_request(DeviceKind::Ledger, 0, &tx, &plan).unwrap();
        let DevicePayload::Ledger { body_hex, witness_paths } = &ledger.payload else { panic!("not a ledger payload") };
        assert_eq!(TxBody::decode_hex(body_hex).unwrap(), tx.body);
        assert_eq!(witness_paths.len(), 2);

        let trezor = build_request(DeviceKind::Trezor, 0, &tx, &plan).unwrap();
        let DevicePayload::Trezor { inputs, additional_signer_paths, .. } = &trezor.payload else {
            panic!("not a trezor payload")
        };
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].path, Some(keys::path(0, KeyRole::External, 0)));
        assert_eq!(inputs[1].path, None);
        assert_eq!(additional_signer_paths, &vec![keys::path(0, KeyRole::Stake, 0)]);

        assert_eq!((ledger.device(), trezor.device()), (DeviceKind::Ledger, DeviceKind::Trezor));
        assert_eq!(ledger.tx_hash, trezor.tx_hash);
        assert_eq!(ledger.signing_paths(), trezor.signing_paths());
    }

    #[test]
    fn test_ledger_multisig_with_key_inputs_unsupported() {
        let mut tx = Transaction::new(TxBody::default());
        tx.witness_set.native_scripts.push(NativeScript::Pubkey { key_hash: "aa".into() });
        assert_eq!(signing_mode(&tx), SigningMode::Multisig);
        assert!(matches!(
            build_request(DeviceKind::Ledger, 0, &tx, &plan_with_input()),
            Err(HardwareError::UnsupportedTransaction(_))
        ));
        assert!(build_request(DeviceKind::Ledger, 0, &tx, &SigningPlan::default()).is_ok());
    }

    #[test]
    fn test_trezor_rejects_drep_certificates() {
        let drep = Credential::Key(hex::encode([3u8; 28]));
        let tx = Transaction::new(TxBody { certificates: vec![Certificate::DrepUpdate { drep }], ..Default::default() });
        assert!(build_request(DeviceKind::Trezor, 0, &tx, &plan_with_input()).is_err());
        let req = build_request(DeviceKind::Ledger, 0, &tx, &plan_with_input()).unwrap();
        assert_eq!(req.mode, SigningMode::Ordinary);
    }

    #[test]
    fn test_hash_mismatch_is_fatal() {
        let tx = Transaction::new(TxBody::default());
        let req = build_request(DeviceKind::Ledger, 0, &tx, &plan_with_input()).unwrap();
        let err = verify_response(&req, DeviceResponse { tx_hash: "00".into(), witnesses: vec![] }).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(HardwareError::UserCancelled.is_recoverable());

        let ok = DeviceResponse { tx_hash: req.tx_hash.clone(), witnesses: vec![] };
        assert!(verify_response(&req, ok).unwrap().is_empty());
    }
}
