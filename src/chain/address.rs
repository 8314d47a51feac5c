//! Shelley-style addresses: one header byte followed by 28-byte credentials.
//!
//! ```text
//! header = kind << 4 | network_id
//! base        0..=3   payment ‖ stake      (bit0: payment script, bit1: stake script)
//! enterprise  6 | 7   payment
//! reward     14 | 15  stake
//! ```

use super::{ChainError, ChainResult, HASH28_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "hash", rename_all = "snake_case")]
pub enum Credential {
    Key(String),
    Script(String),
}

impl Credential {
    pub fn hash(&self) -> &str {
        match self {
            Credential::Key(h) | Credential::Script(h) => h,
        }
    }

    pub fn key_hash(&self) -> Option<&str> {
        match self {
            Credential::Key(h) => Some(h),
            Credential::Script(_) => None,
        }
    }

    fn is_script(&self) -> bool { matches!(self, Credential::Script(_)) }

    fn bytes(&self) -> ChainResult<Vec<u8>> {
        let raw = hex::decode(self.hash())?;
        if raw.len() != HASH28_LEN {
            return Err(ChainError::Address(format!("credential must be {HASH28_LEN} bytes, got {}", raw.len())));
        }
        Ok(raw)
    }

    fn from_bytes(raw: &[u8], script: bool) -> Self {
        let h = hex::encode(raw);
        if script { Credential::Script(h) } else { Credential::Key(h) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Base,
    Enterprise,
    Reward,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Address {
    Base { network_id: u8, payment: Credential, stake: Credential },
    Enterprise { network_id: u8, payment: Credential },
    Reward { network_id: u8, stake: Credential },
}

impl Address {
    pub fn base(network_id: u8, payment: Credential, stake: Credential) -> Self {
        Address::Base { network_id, payment, stake }
    }

    pub fn enterprise(network_id: u8, payment: Credential) -> Self {
        Address::Enterprise { network_id, payment }
    }

    pub fn reward(network_id: u8, stake: Credential) -> Self {
        Address::Reward { network_id, stake }
    }

    pub fn kind(&self) -> AddressKind {
        match self {
            Address::Base { .. } => AddressKind::Base,
            Address::Enterprise { .. } => AddressKind::Enterprise,
            Address::Reward { .. } => AddressKind::Reward,
        }
    }

    pub fn network_id(&self) -> u8 {
        match self {
            Address::Base { network_id, .. }
            | Address::Enterprise { network_id, .. }
            | Address::Reward { network_id, .. } => *network_id,
        }
    }

    pub fn payment(&self) -> Option<&Credential> {
        match self {
            Address::Base { payment, .. } | Address::Enterprise { payment, .. } => Some(payment),
            Address::Reward { .. } => None,
        }
    }

    pub fn stake(&self) -> Option<&Credential> {
        match self {
            Address::Base { stake, .. } | Address::Reward { stake, .. } => Some(stake),
            Address::Enterprise { .. } => None,
        }
    }

    /// Payment key hash, if the payment part is a key (not a script).
    pub fn payment_key_hash(&self) -> Option<&str> { self.payment().and_then(Credential::key_hash) }

    pub fn to_bytes(&self) -> ChainResult<Vec<u8>> {
        if self.network_id() > 0x0f {
            return Err(ChainError::Address(format!("network id out of range: {}", self.network_id())));
        }
        let (kind, parts): (u8, Vec<&Credential>) = match self {
            Address::Base { payment, stake, .. } => {
                (u8::from(payment.is_script()) | (u8::from(stake.is_script()) << 1), vec![payment, stake])
            }
            Address::Enterprise { payment, .. } => (6 | u8::from(payment.is_script()), vec![payment]),
            Address::Reward { stake, .. } => (14 | u8::from(stake.is_script()), vec![stake]),
        };
        let mut out = vec![(kind << 4) | self.network_id()];
        for part in parts {
            out.extend(part.bytes()?);
        }
        Ok(out)
    }

    pub fn from_bytes(raw: &[u8]) -> ChainResult<Self> {
        let header = *raw.first().ok_or_else(|| ChainError::Address("empty address".into()))?;
        let (kind, network_id) = (header >> 4, header & 0x0f);
        let body = &raw[1..];
        let expect = |len: usize| -> ChainResult<()> {
            if body.len() == len { Ok(()) } else {
                Err(ChainError::Address(format!("address type {kind} needs {len} bytes, got {}", body.len())))
            }
        };
        match kind {
            0..=3 => {
                expect(HASH28_LEN * 2)?;
                let payment = Credential::from_bytes(&body[..HASH28_LEN], kind & 1 == 1);
                let stake = Credential::from_bytes(&body[HASH28_LEN..], kind & 2 == 2);
                Ok(Address::Base { network_id, payment, stake })
            }
            6 | 7 => {
                expect(HASH28_LEN)?;
                Ok(Address::Enterprise { network_id, payment: Credential::from_bytes(body, kind == 7) })
            }
            14 | 15 => {
                expect(HASH28_LEN)?;
                Ok(Address::Reward { network_id, stake: Credential::from_bytes(body, kind == 15) })
            }
            other => Err(ChainError::Address(format!("unsupported address type {other}"))),
        }
    }

    pub fn from_hex(raw: &str) -> ChainResult<Self> { Self::from_bytes(&hex::decode(raw.trim())?) }

    pub fn to_hex(&self) -> String {
        // Empty for malformed credentials; `to_bytes` reports the error.
        self.to_bytes().map(hex::encode).unwrap_or_default()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_hex()) }
}

impl TryFrom<String> for Address {
    type Error = ChainError;
    fn try_from(value: String) -> ChainResult<Self> { Address::from_hex(&value) }
}

impl From<Address> for String {
    fn from(value: Address) -> Self { value.to_hex() }
}
