use super::ChainResult;
use serde::{de::DeserializeOwned, Serialize};

/// Opaque wire encoding shared by every chain type.
pub trait Encoded: Serialize + DeserializeOwned {
    fn to_bytes(&self) -> ChainResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> ChainResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_hex(&self) -> ChainResult<String> {
        Ok(hex::encode(self.to_bytes()?))
    }

    fn decode_hex(raw: &str) -> ChainResult<Self> {
        Self::from_bytes(&hex::decode(raw.trim())?)
    }
}
