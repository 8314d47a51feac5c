//! RPC wire types.

use serde::{Deserialize, Serialize};

use crate::chain::{ChainResult, Encoded};
use crate::error::DappError;

/// How a function's result is rendered: structured JSON or the opaque
/// hex encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    #[default]
    Object,
    Encoded,
}

impl ReturnType {
    pub fn render<T: Encoded>(&self, value: &T) -> ChainResult<serde_json::Value> {
        match self {
            ReturnType::Object => Ok(serde_json::to_value(value)?),
            ReturnType::Encoded => Ok(serde_json::Value::String(value.encode_hex()?)),
        }
    }

    pub fn render_list<T: Encoded>(&self, values: &[T]) -> ChainResult<serde_json::Value> {
        values
            .iter()
            .map(|v| self.render(v))
            .collect::<ChainResult<Vec<_>>>()
            .map(serde_json::Value::Array)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub protocol: String,
    pub function: String,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
    pub uid: String,
    #[serde(default)]
    pub return_type: ReturnType,
}

impl RpcRequest {
    pub fn new(protocol: impl Into<String>, function: impl Into<String>, params: Vec<serde_json::Value>, uid: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            function: function.into(),
            params,
            uid: uid.into(),
            return_type: ReturnType::Object,
        }
    }

    pub fn encoded(mut self) -> Self {
        self.return_type = ReturnType::Encoded;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcReturn {
    Ok(serde_json::Value),
    Err(DappError),
}

impl RpcReturn {
    pub fn is_ok(&self) -> bool { matches!(self, RpcReturn::Ok(_)) }

    pub fn ok(&self) -> Option<&serde_json::Value> {
        match self {
            RpcReturn::Ok(v) => Some(v),
            RpcReturn::Err(_) => None,
        }
    }

    pub fn err(&self) -> Option<&DappError> {
        match self {
            RpcReturn::Ok(_) => None,
            RpcReturn::Err(e) => Some(e),
        }
    }
}

impl From<Result<serde_json::Value, DappError>> for RpcReturn {
    fn from(result: Result<serde_json::Value, DappError>) -> Self {
        match result {
            Ok(v) => RpcReturn::Ok(v),
            Err(e) => RpcReturn::Err(e),
        }
    }
}

/// `rpc_response`, routed to the page by `uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub protocol: String,
    pub uid: String,
    #[serde(rename = "return")]
    pub result: RpcReturn,
}

impl RpcResponse {
    pub fn new(protocol: &str, uid: &str, result: Result<serde_json::Value, DappError>) -> Self {
        Self { protocol: protocol.to_string(), uid: uid.to_string(), result: result.into() }
    }
}

/// Either the final answer or a promise that it will arrive through the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dispatch", rename_all = "snake_case")]
pub enum Dispatch {
    Complete(RpcResponse),
    Deferred { uid: String },
}

impl Dispatch {
    pub fn response(&self) -> Option<&RpcResponse> {
        match self {
            Dispatch::Complete(r) => Some(r),
            Dispatch::Deferred { .. } => None,
        }
    }
}

macro_rules! rpc_functions {
    ($($variant:ident => $name:literal, $min:literal ..= $max:literal;)+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RpcFunction {
            $($variant,)+
        }

        impl RpcFunction {
            pub const ALL: &'static [RpcFunction] = &[$(RpcFunction::$variant,)+];

            pub fn parse(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(RpcFunction::$variant),)+
                    _ => None,
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(RpcFunction::$variant => $name,)+
                }
            }

            /// Accepted parameter counts, inclusive.
            pub fn arity(&self) -> (usize, usize) {
                match self {
                    $(RpcFunction::$variant => ($min, $max),)+
                }
            }
        }
    };
}

rpc_functions! {
    Ping => "ping", 0..=0;
    IsEnabled => "is_enabled", 0..=0;
    GetBalance => "get_balance", 0..=1;
    GetUtxos => "get_utxos", 0..=2;
    GetUsedAddresses => "get_used_addresses", 0..=1;
    GetUnusedAddresses => "get_unused_addresses", 0..=0;
    GetRewardAddresses => "get_reward_addresses", 0..=0;
    GetChangeAddress => "get_change_address", 0..=0;
    GetNetworkId => "get_network_id", 0..=0;
    ListNfts => "list_nfts", 0..=0;
    GetStakeKey => "get_stake_key", 0..=0;
    GetDrepKey => "get_drep_key", 0..=0;
    AuthSignHexPayload => "auth_sign_hex_payload", 1..=1;
    AuthCheckHexPayload => "auth_check_hex_payload", 2..=2;
    CreateTx => "create_tx", 1..=1;
    SubmitTx => "submit_tx", 1..=1;
    SignTx => "sign_tx", 1..=2;
    SignData => "sign_data", 2..=2;
    GetCollateralUtxos => "get_collateral_utxos", 0..=1;
}

impl RpcFunction {
    /// `is_enabled` answers `false` instead of refusing.
    pub fn requires_connection(&self) -> bool { !matches!(self, RpcFunction::Ping | RpcFunction::IsEnabled) }
}

impl std::fmt::Display for RpcFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.name()) }
}
