use super::Encoded;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VkeyWitness {
    pub vkey: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapWitness {
    pub vkey: String,
    pub signature: String,
    pub chain_code: String,
    pub attributes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NativeScript {
    Pubkey { key_hash: String },
    All { scripts: Vec<NativeScript> },
    Any { scripts: Vec<NativeScript> },
    AtLeast { required: u32, scripts: Vec<NativeScript> },
    InvalidBefore { slot: u64 },
    InvalidHereafter { slot: u64 },
}

impl NativeScript {
    /// Every key hash referenced anywhere in the script tree.
    pub fn key_hashes(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_key_hashes(&mut out);
        out
    }

    fn collect_key_hashes(&self, out: &mut Vec<String>) {
        match self {
            NativeScript::Pubkey { key_hash } => out.push(key_hash.clone()),
            NativeScript::All { scripts } | NativeScript::Any { scripts } | NativeScript::AtLeast { scripts, .. } => {
                for script in scripts {
                    script.collect_key_hashes(out);
                }
            }
            NativeScript::InvalidBefore { .. } | NativeScript::InvalidHereafter { .. } => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redeemer {
    pub tag: String,
    pub index: u32,
    pub data: String,
    pub ex_units: ExUnits,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vkeys: Vec<VkeyWitness>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub native_scripts: Vec<NativeScript>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bootstraps: Vec<BootstrapWitness>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plutus_data: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plutus_scripts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redeemers: Vec<Redeemer>,
}

impl Encoded for WitnessSet {}

impl WitnessSet {
    pub fn from_vkeys(vkeys: Vec<VkeyWitness>) -> Self { Self { vkeys, ..Default::default() } }

    pub fn is_empty(&self) -> bool {
        self.vkeys.is_empty()
            && self.native_scripts.is_empty()
            && self.bootstraps.is_empty()
            && self.plutus_data.is_empty()
            && self.plutus_scripts.is_empty()
            && self.redeemers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_key_hashes() {
        let script = NativeScript::AtLeast {
            required: 1,
            scripts: vec![
                NativeScript::Pubkey { key_hash: "aa".into() },
                NativeScript::All {
                    scripts: vec![NativeScript::InvalidBefore { slot: 10 }, NativeScript::Pubkey { key_hash: "bb".into() }],
                },
            ],
        };
        assert_eq!(script.key_hashes(), vec!["aa".to_string(), "bb".to_string()]);
    }
}
