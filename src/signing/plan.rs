//! Which wallet keys a transaction needs.

use std::collections::BTreeSet;

use crate::chain::{Credential, Transaction, TxInput, Voter};
use crate::wallet::{DerivationPath, WalletSnapshot};

/// Key hashes that must witness the transaction beyond its spending inputs:
/// body required signers, native script keys, certificate credentials,
/// withdrawal reward keys and DRep voters.
pub fn additional_signers(tx: &Transaction) -> BTreeSet<String> {
    let body = &tx.body;
    let mut out: BTreeSet<String> = body.required_signers.iter().cloned().collect();
    for script in &tx.witness_set.native_scripts {
        out.extend(script.key_hashes());
    }
    for cert in &body.certificates {
        if let Some(hash) = cert.required_signer().and_then(Credential::key_hash) {
            out.insert(hash.to_string());
        }
    }
    for withdrawal in &body.withdrawals {
        if let Some(hash) = withdrawal.reward_address.stake().and_then(Credential::key_hash) {
            out.insert(hash.to_string());
        }
    }
    for voter in &body.voters {
        if let Voter::Drep(Credential::Key(hash)) = voter {
            out.insert(hash.clone());
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningPlan {
    /// Payment keys of owned spending and collateral inputs.
    pub input_paths: Vec<DerivationPath>,
    /// Each owned input with the path that unlocks it.
    pub owned_inputs: Vec<(TxInput, DerivationPath)>,
    /// Wallet keys among the additional signers.
    pub signer_paths: Vec<DerivationPath>,
    /// Additional signers the wallet does not hold.
    pub unresolved: Vec<String>,
    /// Inputs the wallet does not own.
    pub foreign_inputs: Vec<TxInput>,
}

impl SigningPlan {
    pub fn build(snapshot: &WalletSnapshot, tx: &Transaction) -> Self {
        let mut plan = SigningPlan::default();
        let mut seen: BTreeSet<DerivationPath> = BTreeSet::new();

        for input in tx.body.inputs.iter().chain(&tx.body.collateral_inputs) {
            let path = snapshot
                .utxos
                .iter()
                .find(|u| u.tx_hash == input.tx_hash && u.tx_index == input.index)
                .and_then(|u| u.address.payment_key_hash())
                .and_then(|hash| snapshot.path_for_key_hash(hash));
            match path {
                Some(path) => {
                    plan.owned_inputs.push((input.clone(), path.clone()));
                    if seen.insert(path.clone()) {
                        plan.input_paths.push(path);
                    }
                }
                None => plan.foreign_inputs.push(input.clone()),
            }
        }

        for hash in additional_signers(tx) {
            match snapshot.path_for_key_hash(&hash) {
                Some(path) => {
                    if seen.insert(path.clone()) {
                        plan.signer_paths.push(path);
                    }
                }
                None => plan.unresolved.push(hash),
            }
        }
        plan
    }

    pub fn all_paths(&self) -> impl Iterator<Item = &DerivationPath> {
        self.input_paths.iter().chain(&self.signer_paths)
    }

    /// True when the wallet alone can fully witness the transaction.
    pub fn is_complete(&self) -> bool { self.unresolved.is_empty() && self.foreign_inputs.is_empty() }
}
