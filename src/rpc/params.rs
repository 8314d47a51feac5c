//! Positional parameter validation. Every check runs before a function
//! touches state, and every failure is `INVALID_REQUEST`.

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use super::RpcFunction;
use crate::chain::{Address, Transaction, Value};
use crate::error::DappError;
use crate::selection::Paginate;

pub(crate) struct Params<'a> {
    function: RpcFunction,
    values: &'a [Json],
}

impl<'a> Params<'a> {
    pub fn check(function: RpcFunction, values: &'a [Json]) -> Result<Self, DappError> {
        let (min, max) = function.arity();
        if values.len() < min || values.len() > max {
            let expected = if min == max { min.to_string() } else { format!("{min}-{max}") };
            return Err(DappError::invalid_request(format!(
                "{function} expects {expected} params, got {}",
                values.len()
            )));
        }
        Ok(Self { function, values })
    }

    fn invalid(&self, index: usize, what: &str) -> DappError {
        DappError::invalid_request(format!("{}: param {index} must be {what}", self.function))
    }

    /// `null` counts as absent.
    pub fn get(&self, index: usize) -> Option<&'a Json> {
        self.values.get(index).filter(|v| !v.is_null())
    }

    pub fn string(&self, index: usize) -> Result<&'a str, DappError> {
        self.get(index).and_then(Json::as_str).ok_or_else(|| self.invalid(index, "a string"))
    }

    pub fn hex(&self, index: usize) -> Result<&'a str, DappError> {
        let raw = self.string(index)?;
        if raw.len() % 2 != 0 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(self.invalid(index, "a hex string"));
        }
        Ok(raw)
    }

    pub fn bool_or(&self, index: usize, default: bool) -> Result<bool, DappError> {
        match self.get(index) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| self.invalid(index, "a boolean")),
        }
    }

    pub fn address(&self, index: usize) -> Result<Address, DappError> {
        Address::from_hex(self.string(index)?).map_err(|_| self.invalid(index, "an address"))
    }

    /// Hex-encoded or structured transaction.
    pub fn transaction(&self, index: usize) -> Result<Transaction, DappError> {
        match self.get(index) {
            Some(Json::String(raw)) => Transaction::parse(raw).map_err(|_| self.invalid(index, "a transaction")),
            Some(obj @ Json::Object(_)) => {
                serde_json::from_value(obj.clone()).map_err(|_| self.invalid(index, "a transaction"))
            }
            _ => Err(self.invalid(index, "a transaction")),
        }
    }

    pub fn amount(&self, index: usize) -> Result<Option<Value>, DappError> {
        self.get(index)
            .map(|raw| Value::parse_target(raw).map_err(|e| self.invalid(index, &format!("an amount ({e})"))))
            .transpose()
    }

    /// Plain lovelace amount only.
    pub fn coin(&self, index: usize) -> Result<Option<u64>, DappError> {
        match self.amount(index)? {
            Some(v) if v.has_assets() => Err(self.invalid(index, "a lovelace amount")),
            other => Ok(other.map(|v| v.coin)),
        }
    }

    pub fn paginate(&self, index: usize) -> Result<Option<Paginate>, DappError> {
        let page: Option<Paginate> = self.decode(index, "{page, limit}")?;
        match page {
            Some(Paginate { limit: 0, .. }) => Err(self.invalid(index, "a positive limit")),
            other => Ok(other),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, index: usize, what: &str) -> Result<Option<T>, DappError> {
        self.get(index)
            .map(|raw| serde_json::from_value(raw.clone()).map_err(|_| self.invalid(index, what)))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorCode;
    use serde_json::json;

    fn is_invalid(err: DappError) -> bool {
        matches!(err, DappError::Api { code: ApiErrorCode::InvalidRequest, .. })
    }

    #[test]
    fn test_arity() {
        assert!(Params::check(RpcFunction::Ping, &[]).is_ok());
        assert!(is_invalid(Params::check(RpcFunction::Ping, &[json!(1)]).err().unwrap()));
        assert!(is_invalid(Params::check(RpcFunction::SignData, &[json!("a")]).err().unwrap()));
        assert!(Params::check(RpcFunction::GetUtxos, &[json!(null), json!({"page": 0, "limit": 5})]).is_ok());
    }

    #[test]
    fn test_typed_accessors() {
        let values = [json!("2000000"), json!({"page": 1, "limit": 10})];
        let params = Params::check(RpcFunction::GetUtxos, &values).unwrap();
        assert_eq!(params.coin(0).unwrap(), Some(2_000_000));
        assert_eq!(params.paginate(1).unwrap(), Some(Paginate { page: 1, limit: 10 }));

        let values = [json!({"page": "x"})];
        let params = Params::check(RpcFunction::GetUsedAddresses, &values).unwrap();
        assert!(is_invalid(params.paginate(0).unwrap_err()));

        let values = [json!("abc")];
        let params = Params::check(RpcFunction::AuthSignHexPayload, &values).unwrap();
        assert!(is_invalid(params.hex(0).unwrap_err()));
    }
}
