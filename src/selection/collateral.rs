//! Collateral selection.
//!
//! Candidates are pure-coin outputs no larger than `required + surplus`,
//! taken smallest first. At most three are kept; the smallest is evicted
//! whenever the rest already covers the requirement. When the candidates
//! run out short, the caller must reorganize funds into a fresh output.

use serde::{Deserialize, Serialize};

use super::{BuiltTx, CoinSelector, SelectionError, TxBuilder};
use crate::chain::{Address, TxOutput, UnspentOutput, Value};
use crate::config::ProtocolParams;

pub const MAX_COLLATERAL_INPUTS: usize = 3;

/// Output index of the new collateral in a reorg transaction.
pub const REORG_COLLATERAL_INDEX: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollateralError {
    #[error("Required collateral {required} exceeds the maximum {max}")]
    ExceedsMaximum { required: u64, max: u64 },
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralSelection {
    pub utxos_to_use: Vec<UnspentOutput>,
    /// Set iff `utxos_to_use` falls short of the requirement.
    pub reorg_target_amount: Option<u64>,
}

fn total(utxos: &[UnspentOutput]) -> u64 { utxos.iter().map(|u| u.amount).sum() }

pub fn select_collateral(
    utxos: &[UnspentOutput],
    required: u64,
    params: &ProtocolParams,
) -> Result<CollateralSelection, CollateralError> {
    if required > params.max_collateral {
        return Err(CollateralError::ExceedsMaximum { required, max: params.max_collateral });
    }

    let ceiling = required.saturating_add(params.collateral_surplus);
    let mut candidates: Vec<&UnspentOutput> =
        utxos.iter().filter(|u| !u.has_assets() && u.amount <= ceiling).collect();
    candidates.sort_by(|a, b| (a.amount, &a.tx_hash, a.tx_index).cmp(&(b.amount, &b.tx_hash, b.tx_index)));

    // Kept ascending, so index 0 is always the smallest.
    let mut chosen: Vec<UnspentOutput> = Vec::new();
    for candidate in candidates {
        chosen.push(candidate.clone());
        while !chosen.is_empty()
            && (chosen.len() > MAX_COLLATERAL_INPUTS || total(&chosen) - chosen[0].amount >= required)
        {
            chosen.remove(0);
        }
        if total(&chosen) >= required {
            break;
        }
    }

    let sum = total(&chosen);
    if sum >= required {
        while chosen.len() > 1 && sum_without_smallest(&chosen) >= required {
            chosen.remove(0);
        }
        return Ok(CollateralSelection { utxos_to_use: chosen, reorg_target_amount: None });
    }

    tracing::debug!(required, have = sum, "Collateral short; reorg needed");
    Ok(CollateralSelection { utxos_to_use: chosen, reorg_target_amount: Some(required - sum) })
}

fn sum_without_smallest(chosen: &[UnspentOutput]) -> u64 { total(chosen) - chosen[0].amount }

/// Transaction paying one pure-coin output of `max(required, min_utxo)` back
/// to `change_address`, to serve as collateral once on chain.
pub fn build_reorg(
    utxos: Vec<UnspentOutput>,
    required: u64,
    change_address: Address,
    params: &ProtocolParams,
    selector: &dyn CoinSelector,
) -> Result<BuiltTx, CollateralError> {
    let amount = required.max(params.min_utxo_value);
    let built = TxBuilder::new(params, selector, utxos, change_address.clone())
        .output(TxOutput { address: change_address, value: Value::coin(amount) })
        .build()?;
    Ok(built)
}
