//! Coin selection, transaction building and collateral selection.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`CoinSelector`] / [`GreedySelector`] | cover a target value from a UTXO set |
//! | [`TxBuilder`] | outputs + linear fee + change, re-selecting until balanced |
//! | [`select_collateral`] | pick ≤ 3 pure-coin UTXOs or report the reorg amount |
//! | [`paginate`] | page/limit slicing for list results |

mod builder;
mod coin;
mod collateral;

pub use builder::{estimate_size, BuiltTx, TxBuilder};
pub use coin::{paginate, CoinSelector, GreedySelector, Paginate, PaginateError, Selection};
pub use collateral::{build_reorg, select_collateral, CollateralError, CollateralSelection, REORG_COLLATERAL_INDEX};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Not enough funds to cover the target")]
    NotEnoughFunds,
    #[error("Change would fall below the minimum UTXO value")]
    BelowMinimumUtxo,
}

impl SelectionError {
    /// Stable identifier carried in the `info` of the wire error.
    pub fn wire_info(&self) -> &'static str {
        match self {
            SelectionError::NotEnoughFunds => "not_enough_funds",
            SelectionError::BelowMinimumUtxo => "below_minimum_utxo",
        }
    }
}
