//! Root key handling: password sealing at rest and child key derivation.
//!
//! The root key is sealed with Argon2 + AES-256-GCM. A blake3 verifier of the
//! derived key lets a wrong password be detected before decryption.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use ed25519_dalek::{Signer as _, SigningKey};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::chain;

type HmacSha512 = Hmac<Sha512>;

const AAD_ROOT_KEY: &[u8] = b"dapp-connector-root-key";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

pub const HARDENED: u32 = 0x8000_0000;
pub const PURPOSE: u32 = 1852 | HARDENED;
pub const COIN_TYPE: u32 = 1815 | HARDENED;

pub type DerivationPath = Vec<u32>;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Wrong password")]
    WrongPassword,
    #[error("Key derivation failed: {0}")]
    Kdf(String),
    #[error("Cipher failure")]
    Cipher,
    #[error("Invalid encoding: {0}")]
    Encoding(String),
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

pub type KeyResult<T> = Result<T, KeyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    External,
    Internal,
    Stake,
    Drep,
}

impl KeyRole {
    pub fn index(self) -> u32 {
        match self {
            KeyRole::External => 0,
            KeyRole::Internal => 1,
            KeyRole::Stake => 2,
            KeyRole::Drep => 3,
        }
    }
}

/// `m/1852'/1815'/account'/role/index`
pub fn path(account: u32, role: KeyRole, index: u32) -> DerivationPath {
    vec![PURPOSE, COIN_TYPE, account | HARDENED, role.index(), index]
}

pub fn format_path(path: &[u32]) -> String {
    let mut out = String::from("m");
    for step in path {
        if step & HARDENED != 0 {
            out.push_str(&format!("/{}'", step & !HARDENED));
        } else {
            out.push_str(&format!("/{step}"));
        }
    }
    out
}

/// Wallet root signing key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; 32]);

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("RootKey(..)") }
}

impl RootKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self { Self(bytes) }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

    /// HMAC-SHA512 keyed by the root over `tag`, first 32 bytes as seed.
    pub(crate) fn derive_seed(&self, tag: &[u8]) -> KeyResult<Zeroizing<[u8; 32]>> {
        let mut mac = <HmacSha512 as Mac>::new_from_slice(&self.0).map_err(|e| KeyError::Kdf(e.to_string()))?;
        mac.update(tag);
        let mut digest = mac.finalize().into_bytes();
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&digest[..32]);
        digest.as_mut_slice().zeroize();
        Ok(seed)
    }

    pub fn derive(&self, path: &[u32]) -> KeyResult<SigningKey> {
        let mut tag = Vec::with_capacity(path.len() * 4);
        for step in path {
            tag.extend_from_slice(&step.to_be_bytes());
        }
        let seed = self.derive_seed(&tag)?;
        Ok(SigningKey::from_bytes(&seed))
    }

    pub fn public_key_hex(&self, path: &[u32]) -> KeyResult<String> {
        Ok(hex::encode(self.derive(path)?.verifying_key().as_bytes()))
    }

    pub fn key_hash(&self, path: &[u32]) -> KeyResult<String> {
        Ok(chain::key_hash(self.derive(path)?.verifying_key().as_bytes()))
    }

    /// Signs `message` with the child key at `path`; returns (vkey hex, signature hex).
    pub fn sign(&self, path: &[u32], message: &[u8]) -> KeyResult<(String, String)> {
        let key = self.derive(path)?;
        let signature = key.sign(message);
        Ok((hex::encode(key.verifying_key().as_bytes()), hex::encode(signature.to_bytes())))
    }
}

/// Password-sealed root key as stored alongside the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRootKey {
    salt: String,
    verifier: String,
    nonce: String,
    ciphertext: String,
}

impl EncryptedRootKey {
    pub fn seal(root: &RootKey, password: &str) -> KeyResult<Self> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let key = derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_ref()).map_err(|_| KeyError::Cipher)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: root.as_bytes(), aad: AAD_ROOT_KEY })
            .map_err(|_| KeyError::Cipher)?;

        Ok(Self {
            salt: encode_base64(&salt),
            verifier: blake3::hash(key.as_ref()).to_hex().to_string(),
            nonce: encode_base64(&nonce),
            ciphertext: encode_base64(&ciphertext),
        })
    }

    pub fn verify(&self, password: &str) -> KeyResult<bool> {
        let key = derive_key(password, &decode_base64(&self.salt)?)?;
        Ok(blake3::hash(key.as_ref()).to_hex().as_str() == self.verifier)
    }

    pub fn open(&self, password: &str) -> KeyResult<RootKey> {
        let key = derive_key(password, &decode_base64(&self.salt)?)?;
        if blake3::hash(key.as_ref()).to_hex().as_str() != self.verifier {
            return Err(KeyError::WrongPassword);
        }
        let nonce = decode_base64(&self.nonce)?;
        if nonce.len() != NONCE_LEN {
            return Err(KeyError::InvalidLength { expected: NONCE_LEN, got: nonce.len() });
        }
        let cipher = Aes256Gcm::new_from_slice(key.as_ref()).map_err(|_| KeyError::Cipher)?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce), Payload { msg: &decode_base64(&self.ciphertext)?, aad: AAD_ROOT_KEY })
                .map_err(|_| KeyError::Cipher)?,
        );
        let bytes: [u8; 32] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength { expected: 32, got: plaintext.len() })?;
        Ok(RootKey(bytes))
    }
}

fn derive_key(password: &str, salt: &[u8]) -> KeyResult<Zeroizing<[u8; 32]>> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, key.as_mut())
        .map_err(|e| KeyError::Kdf(e.to_string()))?;
    Ok(key)
}

fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn decode_base64(value: &str) -> KeyResult<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| KeyError::Encoding(format!("base64: {e}")))
}
