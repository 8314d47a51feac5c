//! Arbitrary-payload signing bound to one wallet address.
//!
//! The signed message is `"Signature1" ‖ len(protected) ‖ protected ‖ payload`
//! where `protected` is the raw address bytes.

use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::{SignError, SignResult};
use crate::chain::{Address, AddressKind, Credential, Encoded};
use crate::wallet::{DerivationPath, RootKey, WalletSnapshot};

const CONTEXT: &[u8] = b"Signature1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

impl Encoded for SignedMessage {}

/// `sign_data` result as returned to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSignature {
    /// Encoded [`SignedMessage`]
    pub signature: String,
    /// Public key hex
    pub key: String,
}

fn sig_structure(protected: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = CONTEXT.to_vec();
    out.extend_from_slice(&(protected.len() as u32).to_be_bytes());
    out.extend_from_slice(protected);
    out.extend_from_slice(payload);
    out
}

/// Path of the key behind `address`: payment key for base/enterprise, stake
/// key for reward addresses. Script credentials and foreign addresses fail.
pub fn signing_path(snapshot: &WalletSnapshot, address: &Address) -> SignResult<DerivationPath> {
    let credential = match address.kind() {
        AddressKind::Base | AddressKind::Enterprise => address.payment(),
        AddressKind::Reward => address.stake(),
    };
    let hash = credential
        .and_then(Credential::key_hash)
        .ok_or_else(|| SignError::AddressNotOwned(address.to_hex()))?;
    snapshot.path_for_key_hash(hash).ok_or_else(|| SignError::AddressNotOwned(address.to_hex()))
}

pub fn sign_data(root: &RootKey, path: &[u32], address: &Address, payload_hex: &str) -> SignResult<DataSignature> {
    let payload = hex::decode(payload_hex.trim()).map_err(|e| SignError::InvalidPayload(e.to_string()))?;
    let protected = address.to_bytes()?;
    let (key, signature) = root.sign(path, &sig_structure(&protected, &payload))?;
    let message = SignedMessage { protected: hex::encode(&protected), payload: hex::encode(&payload), signature };
    Ok(DataSignature { signature: message.encode_hex()?, key })
}

pub fn verify_data(sig: &DataSignature) -> SignResult<bool> {
    let message = SignedMessage::decode_hex(&sig.signature)?;
    let decode = |raw: &str| hex::decode(raw).map_err(|e| SignError::InvalidPayload(e.to_string()));
    let protected = decode(&message.protected)?;
    let payload = decode(&message.payload)?;
    let (Ok(key), Ok(signature)) = (
        <[u8; 32]>::try_from(decode(&sig.key)?.as_slice()),
        <[u8; 64]>::try_from(decode(&message.signature)?.as_slice()),
    ) else {
        return Ok(false);
    };
    let Ok(vkey) = VerifyingKey::from_bytes(&key) else {
        return Ok(false);
    };
    Ok(vkey.verify(&sig_structure(&protected, &payload), &Signature::from_bytes(&signature)).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_owned_address() {
        let root = RootKey::from_bytes([6u8; 32]);
        let snap = WalletSnapshot::derive("w", 1, &root, 1, 0).unwrap();
        let address = snap.addresses[0].address.clone();
        let path = signing_path(&snap, &address).unwrap();

        let sig = sign_data(&root, &path, &address, "48656c6c6f").unwrap();
        assert!(verify_data(&sig).unwrap());

        let mut tampered = SignedMessage::decode_hex(&sig.signature).unwrap();
        tampered.payload = "00".into();
        let forged = DataSignature { signature: tampered.encode_hex().unwrap(), key: sig.key.clone() };
        assert!(!verify_data(&forged).unwrap());
    }

    #[test]
    fn test_reward_address_uses_stake_key() {
        let root = RootKey::from_bytes([6u8; 32]);
        let snap = WalletSnapshot::derive("w", 1, &root, 1, 0).unwrap();
        let reward = snap.reward_addresses()[0].address.clone();
        assert_eq!(signing_path(&snap, &reward).unwrap(), snap.reward_addresses()[0].path);
    }

    #[test]
    fn test_rejects_foreign_and_bad_payload() {
        let root = RootKey::from_bytes([6u8; 32]);
        let snap = WalletSnapshot::derive("w", 1, &root, 1, 0).unwrap();
        let foreign = Address::enterprise(1, Credential::Key(hex::encode([1u8; 28])));
        assert!(matches!(signing_path(&snap, &foreign), Err(SignError::AddressNotOwned(_))));
        let script = Address::enterprise(1, Credential::Script(hex::encode([1u8; 28])));
        assert!(matches!(signing_path(&snap, &script), Err(SignError::AddressNotOwned(_))));

        let address = snap.addresses[0].address.clone();
        let path = signing_path(&snap, &address).unwrap();
        assert!(matches!(sign_data(&root, &path, &address, "xyz"), Err(SignError::InvalidPayload(_))));
    }
}
