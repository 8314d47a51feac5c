//! Signing dispatcher - software keys, hardware devices, witness merge.
//!
//! | Signer | Flow |
//! |--------|------|
//! | `Software` | unseal root with password → derive paths → ed25519 over tx hash |
//! | `Ledger` / `Trezor` | build [`DeviceRequest`] → device → verify hash → witnesses |
//!
//! Both produce a [`WitnessSet`](crate::chain::WitnessSet) that is merged
//! into the page's existing witnesses with [`merge_witness_sets`].

mod data;
mod hardware;
mod merge;
mod plan;
mod software;

pub use data::{sign_data, signing_path, verify_data, DataSignature, SignedMessage};
pub use hardware::{
    build_request, signing_mode, verify_response, DeviceKind, DevicePayload, DeviceRequest, DeviceResponse,
    HardwareDevice, HardwareError, SigningMode, TrezorInput,
};
pub use merge::merge_witness_sets;
pub use plan::{additional_signers, SigningPlan};
pub use software::sign_transaction;

use std::sync::Arc;

use crate::chain::ChainError;
use crate::wallet::{EncryptedRootKey, KeyError};

/// How a wallet signs.
#[derive(Clone)]
pub enum SignerKind {
    Software(EncryptedRootKey),
    Ledger(Arc<dyn HardwareDevice>),
    Trezor(Arc<dyn HardwareDevice>),
}

impl SignerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerKind::Software(_) => "software",
            SignerKind::Ledger(_) => "ledger",
            SignerKind::Trezor(_) => "trezor",
        }
    }
}

impl std::fmt::Debug for SignerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignerKind::{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Cannot produce every required witness: {0:?}")]
    MissingSigners(Vec<String>),
    #[error("Address is not a wallet key address: {0}")]
    AddressNotOwned(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Operation not supported by {0} signer")]
    Unsupported(&'static str),
}

pub type SignResult<T> = Result<T, SignError>;
