//! Per-site identification keypair.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::keys::{KeyError, KeyResult, RootKey};

const AUTH_TAG: &[u8] = b"dapp-auth:";

/// ed25519 keypair derived from the wallet root and the app identifier.
/// The same (wallet, app) pair always yields the same keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAuthEntry {
    pub wallet_id: String,
    pub pub_key: String,
    priv_key: String,
}

impl std::fmt::Debug for WalletAuthEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletAuthEntry")
            .field("wallet_id", &self.wallet_id)
            .field("pub_key", &self.pub_key)
            .finish_non_exhaustive()
    }
}

/// Public half handed to the page in `connect_response.auth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPublic {
    pub wallet_id: String,
    pub pubkey: String,
}

impl WalletAuthEntry {
    pub fn derive(root: &RootKey, wallet_id: &str, app_auth_id: &str) -> KeyResult<Self> {
        let mut tag = AUTH_TAG.to_vec();
        tag.extend_from_slice(app_auth_id.as_bytes());
        let seed = root.derive_seed(&tag)?;
        let key = SigningKey::from_bytes(&seed);
        Ok(Self {
            wallet_id: wallet_id.to_string(),
            pub_key: hex::encode(key.verifying_key().as_bytes()),
            priv_key: hex::encode(&seed[..]),
        })
    }

    fn signing_key(&self) -> KeyResult<SigningKey> {
        let raw = zeroize::Zeroizing::new(decode_hex(&self.priv_key)?);
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength { expected: 32, got: raw.len() })?;
        Ok(SigningKey::from_bytes(&bytes))
    }

    pub fn sign_hex(&self, payload_hex: &str) -> KeyResult<String> {
        let payload = decode_hex(payload_hex)?;
        Ok(hex::encode(self.signing_key()?.sign(&payload).to_bytes()))
    }

    pub fn verify_hex(&self, payload_hex: &str, signature_hex: &str) -> KeyResult<bool> {
        let payload = decode_hex(payload_hex)?;
        let sig_raw = decode_hex(signature_hex)?;
        let sig_bytes: [u8; 64] = match sig_raw.as_slice().try_into() {
            Ok(b) => b,
            Err(_) => return Ok(false),
        };
        let pub_raw: [u8; 32] = decode_hex(&self.pub_key)?
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength { expected: 32, got: self.pub_key.len() / 2 })?;
        let vkey = VerifyingKey::from_bytes(&pub_raw).map_err(|e| KeyError::Encoding(e.to_string()))?;
        Ok(vkey.verify(&payload, &Signature::from_bytes(&sig_bytes)).is_ok())
    }

    pub fn public(&self) -> AuthPublic {
        AuthPublic { wallet_id: self.wallet_id.clone(), pubkey: self.pub_key.clone() }
    }
}

fn decode_hex(raw: &str) -> KeyResult<Vec<u8>> {
    hex::decode(raw.trim()).map_err(|e| KeyError::Encoding(format!("hex: {e}")))
}
