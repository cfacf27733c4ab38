//! Key sifting and QBER estimation.
//!
//! Sifting is the basis-reconciliation step of BB84: positions where Alice
//! and Bob used different bases carry no shared information and are dropped.
//! The QBER is then the Hamming distance between the two sifted halves,
//! taken over the whole sifted key.

use bb84_proto::{Bit, QuantumBit};

/// Output of [`sift`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiftResult {
    /// Alice's bits at basis-matched positions
    pub alice_key: Vec<Bit>,
    /// Bob's bits at basis-matched positions
    pub bob_key: Vec<Bit>,
    /// Positions (in the raw sequences) that survived
    pub matching_indices: Vec<usize>,
}

impl SiftResult {
    /// Sifted key length (identical for both parties).
    pub fn len(&self) -> usize {
        self.alice_key.len()
    }

    /// True when no position survived sifting.
    pub fn is_empty(&self) -> bool {
        self.alice_key.is_empty()
    }
}

/// Keep the positions where both parties used the same basis.
///
/// Only the common prefix `0..min(len)` is considered. Relative order is
/// preserved and both keys always have the same length.
pub fn sift(alice_bits: &[QuantumBit], bob_bits: &[QuantumBit]) -> SiftResult {
    let mut result = SiftResult::default();

    for (index, (alice, bob)) in alice_bits.iter().zip(bob_bits).enumerate() {
        if alice.basis == bob.basis {
            result.alice_key.push(alice.bit);
            result.bob_key.push(bob.bit);
            result.matching_indices.push(index);
        }
    }

    result
}

/// Fraction of positions where the two keys disagree.
///
/// Fails closed: keys of different length, or empty keys, yield `1.0`.
pub fn qber(alice_key: &[Bit], bob_key: &[Bit]) -> f64 {
    if alice_key.len() != bob_key.len() || alice_key.is_empty() {
        return 1.0;
    }

    let errors = alice_key.iter().zip(bob_key).filter(|(a, b)| a != b).count();
    errors as f64 / alice_key.len() as f64
}

/// Positions where the two keys disagree, over their common prefix.
pub fn error_indices(alice_key: &[Bit], bob_key: &[Bit]) -> Vec<usize> {
    alice_key
        .iter()
        .zip(bob_key)
        .enumerate()
        .filter_map(|(index, (a, b))| (a != b).then_some(index))
        .collect()
}

/// The sifted key without the positions named in `error_indices`.
pub fn finalize(sifted_key: &[Bit], error_indices: &[usize]) -> Vec<Bit> {
    sifted_key
        .iter()
        .enumerate()
        .filter(|(index, _)| !error_indices.contains(index))
        .map(|(_, bit)| *bit)
        .collect()
}

#[cfg(test)]
mod tests {
    use bb84_proto::Basis::{Diagonal, Rectilinear};

    use super::*;

    const O: Bit = Bit::One;
    const Z: Bit = Bit::Zero;

    #[test]
    fn sift_keeps_matching_positions_in_order() {
        let alice = [
            QuantumBit::new(O, Rectilinear),
            QuantumBit::new(Z, Diagonal),
            QuantumBit::new(O, Diagonal),
            QuantumBit::new(Z, Rectilinear),
        ];
        let bob = [
            QuantumBit::new(O, Rectilinear),
            QuantumBit::new(O, Rectilinear),
            QuantumBit::new(Z, Diagonal),
            QuantumBit::new(Z, Rectilinear),
        ];

        let result = sift(&alice, &bob);
        assert_eq!(result.alice_key, vec![O, O, Z]);
        assert_eq!(result.bob_key, vec![O, Z, Z]);
        assert_eq!(result.matching_indices, vec![0, 2, 3]);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn sift_uses_common_prefix() {
        let alice = [QuantumBit::new(O, Rectilinear), QuantumBit::new(Z, Diagonal)];
        let bob = [QuantumBit::new(O, Rectilinear)];

        let result = sift(&alice, &bob);
        assert_eq!(result.matching_indices, vec![0]);
    }

    #[test]
    fn single_mismatched_position_yields_empty_keys() {
        let result = sift(&[QuantumBit::new(O, Rectilinear)], &[QuantumBit::new(O, Diagonal)]);
        assert!(result.is_empty());
        assert!(result.bob_key.is_empty());
    }

    #[test]
    fn qber_fails_closed() {
        assert!((qber(&[], &[]) - 1.0).abs() < f64::EPSILON);
        assert!((qber(&[O], &[O, Z]) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn qber_is_hamming_ratio() {
        assert!(qber(&[O, Z, O, Z], &[O, Z, O, Z]).abs() < f64::EPSILON);
        assert!((qber(&[O, Z, O, Z], &[Z, Z, O, Z]) - 0.25).abs() < f64::EPSILON);
        assert!((qber(&[O, O], &[Z, Z]) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn error_indices_and_finalize() {
        let alice = [O, Z, O, Z, O];
        let bob = [O, O, O, Z, Z];

        let errors = error_indices(&alice, &bob);
        assert_eq!(errors, vec![1, 4]);

        let key = finalize(&alice, &errors);
        assert_eq!(key, vec![O, O, Z]);
        assert_eq!(finalize(&bob, &errors), key);
    }

    #[test]
    fn finalize_without_errors_is_identity() {
        let key = [O, Z, Z];
        assert_eq!(finalize(&key, &[]), key.to_vec());
        assert_eq!(finalize(&key, &[7]), key.to_vec());
    }
}
