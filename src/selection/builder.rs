//! Unsigned transaction building with a linear fee.

use std::collections::BTreeSet;

use super::{CoinSelector, Selection, SelectionError};
use crate::chain::{Address, Transaction, TxBody, TxInput, TxOutput, UnspentOutput, Value};
use crate::config::ProtocolParams;

const MAX_ROUNDS: usize = 8;

/// Rough serialized size used for fee estimation.
pub fn estimate_size(inputs: usize, outputs: usize) -> u64 {
    150 + 180 * inputs as u64 + 65 * outputs as u64
}

#[derive(Debug, Clone)]
pub struct BuiltTx {
    pub tx: Transaction,
    pub inputs: Vec<UnspentOutput>,
    pub change: Option<TxOutput>,
}

pub struct TxBuilder<'a> {
    params: &'a ProtocolParams,
    selector: &'a dyn CoinSelector,
    utxos: Vec<UnspentOutput>,
    must_include: Vec<UnspentOutput>,
    outputs: Vec<TxOutput>,
    change_address: Address,
}

impl<'a> TxBuilder<'a> {
    pub fn new(
        params: &'a ProtocolParams,
        selector: &'a dyn CoinSelector,
        utxos: Vec<UnspentOutput>,
        change_address: Address,
    ) -> Self {
        Self { params, selector, utxos, must_include: Vec::new(), outputs: Vec::new(), change_address }
    }

    pub fn output(mut self, output: TxOutput) -> Self { self.outputs.push(output); self }
    pub fn outputs(mut self, outputs: impl IntoIterator<Item = TxOutput>) -> Self { self.outputs.extend(outputs); self }
    pub fn must_include(mut self, utxos: impl IntoIterator<Item = UnspentOutput>) -> Self { self.must_include.extend(utxos); self }

    pub fn build(self) -> Result<BuiltTx, SelectionError> {
        let min = self.params.min_utxo_value;
        let included = self.must_include.iter().fold(Value::default(), |acc, u| acc.add(&u.value()));
        let pinned: BTreeSet<TxInput> = self.must_include.iter().map(UnspentOutput::input).collect();
        let pool: Vec<UnspentOutput> = self.utxos.iter().filter(|u| !pinned.contains(&u.input())).cloned().collect();
        let outputs_total = Value::sum(self.outputs.iter().map(|o| &o.value));

        let mut fee = self.params.linear_fee(estimate_size(self.must_include.len().max(1), self.outputs.len() + 1));
        let mut extra = 0u64;

        for _ in 0..MAX_ROUNDS {
            let needed = outputs_total.add(&Value::coin(fee));
            let residual = needed.add(&Value::coin(extra)).saturating_sub(&included);
            let selection = if residual.is_zero() {
                Selection::default()
            } else {
                match self.selector.select(&pool, &residual, min) {
                    Err(SelectionError::NotEnoughFunds) if extra > 0 => return Err(SelectionError::BelowMinimumUtxo),
                    other => other?,
                }
            };

            let total_in = included.add(&selection.input_value());
            let change = total_in.checked_sub(&needed).ok_or(SelectionError::NotEnoughFunds)?;
            if !change.is_zero() && change.coin < min {
                if extra >= min {
                    return Err(SelectionError::BelowMinimumUtxo);
                }
                extra = min;
                continue;
            }

            let inputs: Vec<UnspentOutput> = self.must_include.iter().cloned().chain(selection.inputs).collect();
            let change_out = (!change.is_zero()).then(|| TxOutput { address: self.change_address.clone(), value: change });
            let required_fee = self
                .params
                .linear_fee(estimate_size(inputs.len(), self.outputs.len() + usize::from(change_out.is_some())));
            if required_fee > fee {
                fee = required_fee;
                continue;
            }

            let mut outputs = self.outputs.clone();
            outputs.extend(change_out.clone());
            let body = TxBody {
                inputs: inputs.iter().map(UnspentOutput::input).collect(),
                outputs,
                fee,
                ..Default::default()
            };
            tracing::debug!(inputs = inputs.len(), fee, "Built transaction");
            return Ok(BuiltTx { tx: Transaction::new(body), inputs, change: change_out });
        }
        Err(SelectionError::NotEnoughFunds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Credential;
    use crate::selection::GreedySelector;

    fn addr(b: u8) -> Address { Address::enterprise(0, Credential::Key(hex::encode([b; 28]))) }

    fn utxo(hash: &str, amount: u64) -> UnspentOutput {
        UnspentOutput { tx_hash: hash.into(), tx_index: 0, address: addr(1), amount, assets: vec![] }
    }

    #[test]
    fn test_balances_with_fee() {
        let params = ProtocolParams::default();
        let built = TxBuilder::new(&params, &GreedySelector, vec![utxo("a", 10_000_000), utxo("b", 4_000_000)], addr(9))
            .output(TxOutput { address: addr(5), value: Value::coin(3_000_000) })
            .build()
            .unwrap();

        let body = &built.tx.body;
        let spent: u64 = built.inputs.iter().map(|u| u.amount).sum();
        let out: u64 = body.outputs.iter().map(|o| o.value.coin).sum();
        assert_eq!(spent, out + body.fee);
        assert!(body.fee >= params.linear_fee(estimate_size(body.inputs.len(), body.outputs.len())));
        assert_eq!(built.change.map(|c| c.address), Some(addr(9)));
    }

    #[test]
    fn test_must_include_is_spent() {
        let params = ProtocolParams::default();
        let built = TxBuilder::new(&params, &GreedySelector, vec![utxo("a", 10_000_000), utxo("b", 4_000_000)], addr(9))
            .must_include(vec![utxo("b", 4_000_000)])
            .output(TxOutput { address: addr(5), value: Value::coin(1_000_000) })
            .build()
            .unwrap();
        assert_eq!(built.inputs.len(), 1);
        assert_eq!(built.inputs[0].tx_hash, "b");
    }

    #[test]
    fn test_insufficient() {
        let params = ProtocolParams::default();
        let err = TxBuilder::new(&params, &GreedySelector, vec![utxo("a", 1_000_000)], addr(9))
            .output(TxOutput { address: addr(5), value: Value::coin(1_000_000) })
            .build()
            .unwrap_err();
        assert_eq!(err, SelectionError::NotEnoughFunds);
    }
}
