use crate::chain::WitnessSet;

fn union<T: Ord + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out: Vec<T> = a.iter().chain(b).cloned().collect();
    out.sort();
    out.dedup();
    out
}

/// Sorted, de-duplicated union of every witness collection.
/// Commutative and associative.
pub fn merge_witness_sets(a: &WitnessSet, b: &WitnessSet) -> WitnessSet {
    WitnessSet {
        vkeys: union(&a.vkeys, &b.vkeys),
        native_scripts: union(&a.native_scripts, &b.native_scripts),
        bootstraps: union(&a.bootstraps, &b.bootstraps),
        plutus_data: union(&a.plutus_data, &b.plutus_data),
        plutus_scripts: union(&a.plutus_scripts, &b.plutus_scripts),
        redeemers: union(&a.redeemers, &b.redeemers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ExUnits, NativeScript, Redeemer, VkeyWitness};

    fn vk(n: u8) -> VkeyWitness { VkeyWitness { vkey: format!("{n:02x}"), signature: format!("5{n}") } }

    fn sets() -> (WitnessSet, WitnessSet, WitnessSet) {
        let a = WitnessSet {
            vkeys: vec![vk(3), vk(1)],
            plutus_data: vec!["d87980".into()],
            ..Default::default()
        };
        let b = WitnessSet {
            vkeys: vec![vk(1), vk(2)],
            native_scripts: vec![NativeScript::Pubkey { key_hash: "aa".into() }],
            redeemers: vec![Redeemer { tag: "spend".into(), index: 0, data: "00".into(), ex_units: ExUnits { mem: 1, steps: 2 } }],
            ..Default::default()
        };
        let c = WitnessSet { vkeys: vec![vk(4)], plutus_scripts: vec!["4e4d01".into()], ..Default::default() };
        (a, b, c)
    }

    #[test]
    fn test_merge_is_commutative() {
        let (a, b, _) = sets();
        assert_eq!(merge_witness_sets(&a, &b), merge_witness_sets(&b, &a));
        assert_eq!(merge_witness_sets(&a, &b).vkeys, vec![vk(1), vk(2), vk(3)]);
    }

    #[test]
    fn test_merge_is_associative() {
        let (a, b, c) = sets();
        let left = merge_witness_sets(&merge_witness_sets(&a, &b), &c);
        let right = merge_witness_sets(&a, &merge_witness_sets(&b, &c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_with_empty_normalizes() {
        let (a, _, _) = sets();
        let merged = merge_witness_sets(&a, &WitnessSet::default());
        assert_eq!(merged.vkeys, vec![vk(1), vk(3)]);
        assert_eq!(merge_witness_sets(&merged, &merged), merged);
    }
}
