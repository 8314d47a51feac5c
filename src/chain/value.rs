//! Value - lovelace plus native assets, kept normalized.

use super::{ChainError, ChainResult, Encoded};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hex length of a policy id (28 bytes).
const POLICY_HEX_LEN: usize = 56;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetId {
    pub policy_id: String,
    pub name: String,
}

impl AssetId {
    pub fn new(policy_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { policy_id: policy_id.into().to_ascii_lowercase(), name: name.into().to_ascii_lowercase() }
    }

    /// Accepts `policy.name` or the concatenated `policyname` hex form.
    pub fn parse(token_id: &str) -> ChainResult<Self> {
        let (policy, name) = match token_id.split_once('.') {
            Some((p, n)) => (p, n),
            None if token_id.len() >= POLICY_HEX_LEN => token_id.split_at(POLICY_HEX_LEN),
            None => return Err(ChainError::Value(format!("bad token id: {token_id}"))),
        };
        if policy.len() != POLICY_HEX_LEN || hex::decode(policy).is_err() || hex::decode(name).is_err() {
            return Err(ChainError::Value(format!("bad token id: {token_id}")));
        }
        Ok(Self::new(policy, name))
    }

    pub fn fingerprint(&self) -> String { format!("{}.{}", self.policy_id, self.name) }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub policy_id: String,
    pub name: String,
    pub quantity: u64,
}

impl Asset {
    pub fn new(id: &AssetId, quantity: u64) -> Self {
        Self { policy_id: id.policy_id.clone(), name: id.name.clone(), quantity }
    }

    pub fn id(&self) -> AssetId { AssetId::new(&self.policy_id, &self.name) }
}

/// Lovelace and native assets carried by an output or requested by a target.
///
/// Deserialization merges repeated assets and rejects quantities that
/// overflow, so a decoded value is always normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawValue")]
pub struct Value {
    pub coin: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<Asset>,
}

#[derive(Deserialize)]
struct RawValue {
    coin: u64,
    #[serde(default)]
    assets: Vec<Asset>,
}

impl TryFrom<RawValue> for Value {
    type Error = ChainError;

    fn try_from(raw: RawValue) -> ChainResult<Self> { Value::try_new(raw.coin, raw.assets) }
}

impl Encoded for Value {}

impl Value {
    pub fn coin(coin: u64) -> Self { Self { coin, assets: Vec::new() } }

    /// Merges repeated assets, clamping at `u64::MAX`. Use [`Value::try_new`]
    /// for amounts that come from a page.
    pub fn new(coin: u64, assets: Vec<Asset>) -> Self {
        let mut map = BTreeMap::new();
        for asset in assets {
            let q = map.entry(asset.id()).or_insert(0u64);
            *q = q.saturating_add(asset.quantity);
        }
        Self::from_map(coin, map)
    }

    pub fn try_new(coin: u64, assets: Vec<Asset>) -> ChainResult<Self> {
        let mut map = BTreeMap::new();
        for asset in assets {
            let id = asset.id();
            let q = map.entry(id.clone()).or_insert(0u64);
            *q = q.checked_add(asset.quantity).ok_or_else(|| overflow(&id))?;
        }
        Ok(Self::from_map(coin, map))
    }

    fn from_map(coin: u64, map: BTreeMap<AssetId, u64>) -> Self {
        let assets = map.into_iter().filter(|(_, q)| *q > 0).map(|(id, q)| Asset::new(&id, q)).collect();
        Self { coin, assets }
    }

    pub fn asset_map(&self) -> BTreeMap<AssetId, u64> {
        let mut map = BTreeMap::new();
        for asset in &self.assets {
            let q = map.entry(asset.id()).or_insert(0u64);
            *q = q.saturating_add(asset.quantity);
        }
        map
    }

    pub fn quantity_of(&self, id: &AssetId) -> u64 {
        self.assets.iter().filter(|a| a.id() == *id).fold(0u64, |acc, a| acc.saturating_add(a.quantity))
    }

    pub fn has_assets(&self) -> bool { self.assets.iter().any(|a| a.quantity > 0) }

    pub fn is_zero(&self) -> bool { self.coin == 0 && !self.has_assets() }

    pub fn add(&self, other: &Value) -> Value {
        let mut map = self.asset_map();
        for (id, q) in other.asset_map() {
            let have = map.entry(id).or_insert(0);
            *have = have.saturating_add(q);
        }
        Self::from_map(self.coin.saturating_add(other.coin), map)
    }

    /// Exact addition; fails if the coin or any asset overflows.
    pub fn checked_add(&self, other: &Value) -> ChainResult<Value> {
        let coin = self.coin.checked_add(other.coin).ok_or_else(|| ChainError::Value("lovelace overflow".into()))?;
        let mut map = self.asset_map();
        for (id, q) in other.asset_map() {
            let have = map.entry(id.clone()).or_insert(0);
            *have = have.checked_add(q).ok_or_else(|| overflow(&id))?;
        }
        Ok(Self::from_map(coin, map))
    }

    /// Exact subtraction; `None` if any component would go negative.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        let coin = self.coin.checked_sub(other.coin)?;
        let mut map = self.asset_map();
        for (id, q) in other.asset_map() {
            let have = map.get_mut(&id)?;
            *have = have.checked_sub(q)?;
        }
        Some(Self::from_map(coin, map))
    }

    /// Component-wise subtraction clamped at zero.
    pub fn saturating_sub(&self, other: &Value) -> Value {
        let mut map = self.asset_map();
        for (id, q) in other.asset_map() {
            if let Some(have) = map.get_mut(&id) {
                *have = have.saturating_sub(q);
            }
        }
        Self::from_map(self.coin.saturating_sub(other.coin), map)
    }

    pub fn covers(&self, other: &Value) -> bool { self.checked_sub(other).is_some() }

    pub fn sum<'a>(values: impl IntoIterator<Item = &'a Value>) -> Value {
        values.into_iter().fold(Value::default(), |acc, v| acc.add(v))
    }

    pub fn try_sum<'a>(values: impl IntoIterator<Item = &'a Value>) -> ChainResult<Value> {
        values.into_iter().try_fold(Value::default(), |acc, v| acc.checked_add(v))
    }

    /// Classifies a page-supplied amount: a plain lovelace amount (number or
    /// decimal string), an encoded value (hex), or a structured object.
    pub fn parse_target(raw: &serde_json::Value) -> ChainResult<Value> {
        match raw {
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(Value::coin)
                .ok_or_else(|| ChainError::Value(format!("amount must be a non-negative integer: {n}"))),
            serde_json::Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s
                .parse::<u64>()
                .map(Value::coin)
                .map_err(|e| ChainError::Value(format!("amount {s}: {e}"))),
            serde_json::Value::String(s) => Value::decode_hex(s),
            serde_json::Value::Object(_) => Ok(serde_json::from_value::<Value>(raw.clone())?),
            other => Err(ChainError::Value(format!("unsupported amount: {other}"))),
        }
    }

}

fn overflow(id: &AssetId) -> ChainError { ChainError::Value(format!("quantity overflow for {}", id.fingerprint())) }
