use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use super::SelectionError;
use crate::chain::{UnspentOutput, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<UnspentOutput>,
    /// `sum(inputs) - target`; zero or at least the minimum UTXO value in coin.
    pub change: Value,
}

impl Selection {
    pub fn input_value(&self) -> Value { self.inputs.iter().fold(Value::default(), |acc, u| acc.add(&u.value())) }
}

pub trait CoinSelector: Send + Sync {
    fn select(&self, utxos: &[UnspentOutput], target: &Value, min_utxo_value: u64) -> Result<Selection, SelectionError>;
}

/// Largest-first: every asset from its largest holders, then coin from the
/// largest outputs, then one more input if the change is too small.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySelector;

impl CoinSelector for GreedySelector {
    fn select(&self, utxos: &[UnspentOutput], target: &Value, min_utxo_value: u64) -> Result<Selection, SelectionError> {
        let total = utxos.iter().fold(Value::default(), |acc, u| acc.add(&u.value()));
        if !total.covers(target) {
            return Err(SelectionError::NotEnoughFunds);
        }

        let mut pool: Vec<&UnspentOutput> = utxos.iter().collect();
        pool.sort_by(|a, b| (&a.tx_hash, a.tx_index).cmp(&(&b.tx_hash, b.tx_index)));
        let mut picked: Vec<&UnspentOutput> = Vec::new();
        let mut have = Value::default();

        for (id, needed) in target.asset_map() {
            while have.quantity_of(&id) < needed {
                let best = pool
                    .iter()
                    .enumerate()
                    .filter(|(_, u)| u.value().quantity_of(&id) > 0)
                    .max_by_key(|(_, u)| (u.value().quantity_of(&id), Reverse(u.amount)))
                    .map(|(i, _)| i)
                    .ok_or(SelectionError::NotEnoughFunds)?;
                let utxo = pool.remove(best);
                have = have.add(&utxo.value());
                picked.push(utxo);
            }
        }

        while have.coin < target.coin {
            let best = pool
                .iter()
                .enumerate()
                .max_by_key(|(_, u)| (u.amount, Reverse(u.assets.len())))
                .map(|(i, _)| i)
                .ok_or(SelectionError::NotEnoughFunds)?;
            let utxo = pool.remove(best);
            have = have.add(&utxo.value());
            picked.push(utxo);
        }

        let mut change = have.checked_sub(target).ok_or(SelectionError::NotEnoughFunds)?;
        if !change.is_zero() && change.coin < min_utxo_value {
            let short = min_utxo_value - change.coin;
            let absorb = pool
                .iter()
                .enumerate()
                .filter(|(_, u)| u.amount >= short)
                .min_by_key(|(_, u)| (u.assets.len(), u.amount))
                .map(|(i, _)| i)
                .ok_or(SelectionError::BelowMinimumUtxo)?;
            let utxo = pool.remove(absorb);
            change = change.add(&utxo.value());
            picked.push(utxo);
        }

        Ok(Selection { inputs: picked.into_iter().cloned().collect(), change })
    }
}

/// `{page, limit}` as sent by pages; `page` is zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginate {
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Page out of range; {max_size} results")]
pub struct PaginateError {
    pub max_size: usize,
}

pub fn paginate<T: Clone>(items: &[T], page: Option<Paginate>) -> Result<Vec<T>, PaginateError> {
    let Some(Paginate { page, limit }) = page else {
        return Ok(items.to_vec());
    };
    let start = page.saturating_mul(limit);
    if start > items.len() {
        return Err(PaginateError { max_size: items.len() });
    }
    let end = start.saturating_add(limit).min(items.len());
    Ok(items[start..end].to_vec())
}
