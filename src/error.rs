//! Errors - the wire taxonomy pages see ([`DappError`]) and the internal
//! [`ConnectorError`] every layer funnels into.

use serde::{Deserialize, Serialize};

use crate::chain::ChainError;
use crate::connector::TabId;
use crate::host::HostError;
use crate::selection::SelectionError;
use crate::signing::SignError;
use crate::storage::StorageError;
use crate::wallet::{KeyError, WalletError};

/// Numeric error codes carried on the wire.
macro_rules! wire_code {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "i32", try_from = "i32")]
        pub enum $name { $($variant),+ }

        impl $name {
            pub fn code(self) -> i32 {
                match self { $($name::$variant => $value),+ }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> i32 { value.code() }
        }

        impl TryFrom<i32> for $name {
            type Error = String;
            fn try_from(value: i32) -> Result<Self, String> {
                match value {
                    $(v if v == $value => Ok($name::$variant),)+
                    other => Err(format!("unknown {} code {other}", stringify!($name))),
                }
            }
        }
    };
}

wire_code!(ApiErrorCode { InvalidRequest = -1, InternalError = -2, Refused = -3 });
wire_code!(TxSignErrorCode { ProofGeneration = 1, UserDeclined = 2 });
wire_code!(DataSignErrorCode { ProofGeneration = 1, AddressNotPk = 2, UserDeclined = 3, InvalidFormat = 4 });
wire_code!(TxSendErrorCode { Refused = 1, Failure = 2 });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtxoErrorCode {
    SpentUtxo,
    MissingUtxo,
}

/// Error value delivered inside `return: {err}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind")]
pub enum DappError {
    #[serde(rename = "APIError")]
    #[error("APIError {code:?}: {info}")]
    Api { code: ApiErrorCode, info: String },
    #[serde(rename = "TxSignError")]
    #[error("TxSignError {code:?}: {info}")]
    TxSign { code: TxSignErrorCode, info: String },
    #[serde(rename = "DataSignError")]
    #[error("DataSignError {code:?}: {info}")]
    DataSign { code: DataSignErrorCode, info: String },
    #[serde(rename = "TxSendError")]
    #[error("TxSendError {code:?}: {info}")]
    TxSend { code: TxSendErrorCode, info: String },
    #[serde(rename = "PaginateError")]
    #[error("PaginateError: maxSize {max_size}")]
    Paginate {
        #[serde(rename = "maxSize")]
        max_size: usize,
    },
    #[serde(rename = "UtxoError")]
    #[error("UtxoError {code:?}: {info}")]
    Utxo { code: UtxoErrorCode, info: String },
}

impl DappError {
    pub fn invalid_request(info: impl Into<String>) -> Self {
        DappError::Api { code: ApiErrorCode::InvalidRequest, info: info.into() }
    }

    pub fn internal(info: impl Into<String>) -> Self {
        DappError::Api { code: ApiErrorCode::InternalError, info: info.into() }
    }

    pub fn refused(info: impl Into<String>) -> Self {
        DappError::Api { code: ApiErrorCode::Refused, info: info.into() }
    }

    pub fn tx_sign(code: TxSignErrorCode, info: impl Into<String>) -> Self {
        DappError::TxSign { code, info: info.into() }
    }

    pub fn data_sign(code: DataSignErrorCode, info: impl Into<String>) -> Self {
        DappError::DataSign { code, info: info.into() }
    }

    pub fn tx_send(code: TxSendErrorCode, info: impl Into<String>) -> Self {
        DappError::TxSend { code, info: info.into() }
    }

    pub fn utxo(code: UtxoErrorCode, info: impl Into<String>) -> Self {
        DappError::Utxo { code, info: info.into() }
    }

    pub fn paginate(max_size: usize) -> Self { DappError::Paginate { max_size } }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Host error: {0}")]
    Host(#[from] HostError),
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),
    #[error("Signing error: {0}")]
    Sign(#[from] SignError),
    #[error("{0}")]
    Dapp(#[from] DappError),
    #[error("Tab {0} has no active connection")]
    NotConnected(TabId),
    #[error("No pending request {uid} for tab {tab_id}")]
    UnknownRequest { tab_id: TabId, uid: String },
    #[error("Connection request for tab {0} was already resolved")]
    AlreadyResolved(TabId),
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),
}

impl ConnectorError {
    /// Wire form of this error. Internal failures keep their message but
    /// never carry key material.
    pub fn to_dapp(&self) -> DappError {
        match self {
            ConnectorError::Dapp(e) => e.clone(),
            ConnectorError::NotConnected(_) | ConnectorError::WalletNotFound(_) => DappError::refused(self.to_string()),
            ConnectorError::UnknownRequest { .. } | ConnectorError::AlreadyResolved(_) => {
                DappError::invalid_request(self.to_string())
            }
            ConnectorError::Selection(e) => DappError::invalid_request(e.wire_info()),
            ConnectorError::Chain(e) => DappError::invalid_request(e.to_string()),
            other => DappError::internal(other.to_string()),
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let err = DappError::refused("no active connection");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"kind": "APIError", "code": -3, "info": "no active connection"})
        );
        assert_eq!(
            serde_json::to_value(DappError::paginate(7)).unwrap(),
            json!({"kind": "PaginateError", "maxSize": 7})
        );
        let back: DappError =
            serde_json::from_value(json!({"kind": "DataSignError", "code": 3, "info": "x"})).unwrap();
        assert_eq!(back, DappError::data_sign(DataSignErrorCode::UserDeclined, "x"));
    }

    #[test]
    fn test_connector_error_mapping() {
        assert!(matches!(
            ConnectorError::NotConnected(4).to_dapp(),
            DappError::Api { code: ApiErrorCode::Refused, .. }
        ));
        assert!(matches!(
            ConnectorError::WalletNotFound("w9".into()).to_dapp(),
            DappError::Api { code: ApiErrorCode::Refused, .. }
        ));
        assert!(matches!(
            ConnectorError::Storage(StorageError::Poisoned).to_dapp(),
            DappError::Api { code: ApiErrorCode::InternalError, .. }
        ));
        assert_eq!(TxSignErrorCode::UserDeclined.code(), 2);
        assert_eq!(DataSignErrorCode::InvalidFormat.code(), 4);
    }
}
