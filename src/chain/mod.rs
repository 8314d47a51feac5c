//! Chain model - values, addresses, transactions and witness sets.
//!
//! The connector treats serialization as an opaque library concern: every
//! chain type implements [`Encoded`], whose hex form is what pages exchange
//! when they ask for `returnType = encoded`.
//!
//! | Type | Module |
//! |------|--------|
//! | [`Value`], [`Asset`], [`AssetId`] | `value` |
//! | [`Address`], [`Credential`] | `address` |
//! | [`Transaction`], [`TxBody`], [`Certificate`] | `tx` |
//! | [`WitnessSet`], [`NativeScript`] | `witness` |
//! | [`UnspentOutput`] | `utxo` |

mod address;
mod codec;
mod tx;
mod utxo;
mod value;
mod witness;

pub use address::{Address, AddressKind, Credential};
pub use codec::Encoded;
pub use tx::{Certificate, Transaction, TxBody, TxInput, TxOutput, Voter, Withdrawal};
pub use utxo::UnspentOutput;
pub use value::{Asset, AssetId, Value};
pub use witness::{BootstrapWitness, ExUnits, NativeScript, Redeemer, VkeyWitness, WitnessSet};

/// Length in bytes of key hashes, script hashes and policy ids.
pub const HASH28_LEN: usize = 28;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Invalid address: {0}")]
    Address(String),
    #[error("Invalid value: {0}")]
    Value(String),
}

pub type ChainResult<T> = Result<T, ChainError>;

/// 28-byte blake3 digest of a public key, hex encoded.
pub fn key_hash(public_key: &[u8]) -> String {
    let digest = blake3::hash(public_key);
    hex::encode(&digest.as_bytes()[..HASH28_LEN])
}
