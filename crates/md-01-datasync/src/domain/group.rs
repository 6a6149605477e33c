//! Delivery group identifiers.

use shared_crypto::Keccak256Hasher;
use shared_types::{GroupId, PublicKey};

/// Group id of the one-to-one channel between `a` and `b`.
///
/// Keys are hashed in sorted order, so both ends derive the same id.
pub fn one_to_one_group_id(a: &PublicKey, b: &PublicKey) -> GroupId {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Keccak256Hasher::new();
    hasher.update(low.as_bytes()).update(high.as_bytes());
    GroupId(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_distinct_pairs_distinct_groups() {
        let a = PublicKey([2; 33]);
        let b = PublicKey([3; 33]);
        let c = PublicKey([4; 33]);
        assert_ne!(one_to_one_group_id(&a, &b), one_to_one_group_id(&a, &c));
    }

    proptest! {
        #[test]
        fn prop_group_id_is_symmetric(x in any::<[u8; 32]>(), y in any::<[u8; 32]>()) {
            let mut a = [2u8; 33];
            a[1..].copy_from_slice(&x);
            let mut b = [3u8; 33];
            b[1..].copy_from_slice(&y);
            let (a, b) = (PublicKey(a), PublicKey(b));
            prop_assert_eq!(one_to_one_group_id(&a, &b), one_to_one_group_id(&b, &a));
        }
    }
}
