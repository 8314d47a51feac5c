use super::{SignError, SignResult, SigningPlan};
use crate::chain::{Transaction, VkeyWitness, WitnessSet};
use crate::wallet::RootKey;

/// Witnesses every path in `plan` over the transaction hash.
pub fn sign_transaction(root: &RootKey, tx: &Transaction, plan: &SigningPlan) -> SignResult<WitnessSet> {
    let hash = hex::decode(tx.hash()?).map_err(|e| SignError::InvalidPayload(e.to_string()))?;
    let mut vkeys = Vec::new();
    for path in plan.all_paths() {
        let (vkey, signature) = root.sign(path, &hash)?;
        vkeys.push(VkeyWitness { vkey, signature });
    }
    vkeys.sort();
    Ok(WitnessSet::from_vkeys(vkeys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TxBody;
    use crate::wallet::{keys, KeyRole};
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    #[test]
    fn test_witness_verifies_against_hash() {
        let root = RootKey::from_bytes([2u8; 32]);
        let tx = Transaction::new(TxBody { fee: 1, ..Default::default() });
        let plan = SigningPlan { input_paths: vec![keys::path(0, KeyRole::External, 0)], ..Default::default() };
        let set = sign_transaction(&root, &tx, &plan).unwrap();
        assert_eq!(set.vkeys.len(), 1);

        let vkey: [u8; 32] = hex::decode(&set.vkeys[0].vkey).unwrap().try_into().unwrap();
        let sig: [u8; 64] = hex::decode(&set.vkeys[0].signature).unwrap().try_into().unwrap();
        let hash = hex::decode(tx.hash().unwrap()).unwrap();
        VerifyingKey::from_bytes(&vkey).unwrap().verify(&hash, &Signature::from_bytes(&sig)).unwrap();
    }
}
