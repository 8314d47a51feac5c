use super::{Address, Asset, ChainResult, Credential, Encoded, Value, WitnessSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    pub tx_hash: String,
    pub index: u32,
}

impl TxInput {
    pub fn new(tx_hash: impl Into<String>, index: u32) -> Self { Self { tx_hash: tx_hash.into(), index } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Certificate {
    StakeRegistration { stake: Credential },
    StakeDeregistration { stake: Credential },
    StakeDelegation { stake: Credential, pool_id: String },
    VoteDelegation { stake: Credential, drep: String },
    DrepRegistration { drep: Credential, deposit: u64 },
    DrepUpdate { drep: Credential },
    DrepRetirement { drep: Credential, refund: u64 },
}

impl Certificate {
    /// Credential whose key must witness this certificate, if any.
    pub fn required_signer(&self) -> Option<&Credential> {
        match self {
            Certificate::StakeRegistration { .. } => None,
            Certificate::StakeDeregistration { stake }
            | Certificate::StakeDelegation { stake, .. }
            | Certificate::VoteDelegation { stake, .. } => Some(stake),
            Certificate::DrepRegistration { drep, .. }
            | Certificate::DrepUpdate { drep }
            | Certificate::DrepRetirement { drep, .. } => Some(drep),
        }
    }

    pub fn is_drep(&self) -> bool {
        matches!(
            self,
            Certificate::DrepRegistration { .. } | Certificate::DrepUpdate { .. } | Certificate::DrepRetirement { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub reward_address: Address,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "credential", rename_all = "snake_case")]
pub enum Voter {
    Drep(Credential),
    ConstitutionalCommittee(Credential),
    StakePool(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxBody {
    pub inputs: Vec<TxInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collateral_inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<Certificate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub withdrawals: Vec<Withdrawal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_signers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voters: Vec<Voter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mint: Vec<Asset>,
}

impl Encoded for TxBody {}

impl TxBody {
    /// blake3 over the canonical body encoding, hex encoded.
    pub fn hash(&self) -> ChainResult<String> {
        Ok(blake3::hash(&self.to_bytes()?).to_hex().to_string())
    }

    pub fn output_total(&self) -> Value { Value::sum(self.outputs.iter().map(|o| &o.value)) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub body: TxBody,
    #[serde(default)]
    pub witness_set: WitnessSet,
    #[serde(default = "default_valid")]
    pub is_valid: bool,
}

fn default_valid() -> bool { true }

impl Encoded for Transaction {}

impl Transaction {
    pub fn new(body: TxBody) -> Self { Self { body, witness_set: WitnessSet::default(), is_valid: true } }

    pub fn parse(raw: &str) -> ChainResult<Self> { Self::decode_hex(raw) }

    pub fn hash(&self) -> ChainResult<String> { self.body.hash() }
}
