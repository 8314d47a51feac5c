use super::{Address, Asset, Encoded, TxInput, Value};
use serde::{Deserialize, Serialize};

/// An unspent output owned by the wallet. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutput {
    pub tx_hash: String,
    pub tx_index: u32,
    pub address: Address,
    pub amount: u64,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Encoded for UnspentOutput {}

impl UnspentOutput {
    pub fn input(&self) -> TxInput { TxInput::new(self.tx_hash.clone(), self.tx_index) }

    pub fn value(&self) -> Value { Value::new(self.amount, self.assets.clone()) }

    pub fn has_assets(&self) -> bool { self.assets.iter().any(|a| a.quantity > 0) }
}
