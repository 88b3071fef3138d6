//! Hashed circular (Morgan / ECFP-style) fingerprints
//!
//! Each atom starts from an invariant built from element, degree, hydrogen
//! count, charge and aromaticity. Every iteration folds in the sorted
//! `(bond order, neighbor identifier)` pairs. All identifiers from every
//! iteration are folded into `n_bits` and packed LSB-first into bytes.

use crate::types::{BondOrder, ParsedMolecule};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over 64-bit words, stable across builds and platforms
fn hash_words(words: &[u64]) -> u64 {
    let mut hash = FNV_OFFSET;
    for word in words {
        for byte in word.to_le_bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

fn bond_code(order: BondOrder) -> u64 {
    match order {
        BondOrder::Single => 1,
        BondOrder::Double => 2,
        BondOrder::Triple => 3,
        BondOrder::Aromatic => 4,
    }
}

/// Morgan fingerprint of `radius` iterations folded into `n_bits` bits.
///
/// Returns `ceil(n_bits / 8)` bytes; bit `i` lives in byte `i / 8` at
/// position `i % 8`. An empty molecule gives an all-zero fingerprint.
pub fn morgan_fingerprint(molecule: &ParsedMolecule, radius: usize, n_bits: usize) -> Vec<u8> {
    let mut fingerprint = vec![0u8; n_bits.div_ceil(8)];
    if n_bits == 0 || molecule.atoms.is_empty() {
        return fingerprint;
    }

    let mut neighbors: Vec<Vec<(usize, u64)>> = vec![Vec::new(); molecule.atoms.len()];
    for bond in &molecule.bonds {
        let code = bond_code(bond.bond_order);
        neighbors[bond.source_index].push((bond.target_index, code));
        neighbors[bond.target_index].push((bond.source_index, code));
    }

    let mut identifiers: Vec<u64> = molecule
        .atoms
        .iter()
        .map(|atom| {
            hash_words(&[
                u64::from(atom.atomic_number),
                u64::from(atom.degree),
                u64::from(atom.implicit_hydrogens),
                atom.charge as i64 as u64,
                u64::from(atom.is_aromatic),
            ])
        })
        .collect();

    let mut set = |id: u64| {
        let bit = (id % n_bits as u64) as usize;
        fingerprint[bit / 8] |= 1 << (bit % 8);
    };

    identifiers.iter().copied().for_each(&mut set);

    for iteration in 0..radius {
        let next: Vec<u64> = identifiers
            .iter()
            .enumerate()
            .map(|(atom, &own)| {
                let mut environment: Vec<(u64, u64)> = neighbors[atom]
                    .iter()
                    .map(|&(other, code)| (code, identifiers[other]))
                    .collect();
                environment.sort_unstable();

                let mut words = Vec::with_capacity(2 + environment.len() * 2);
                words.push(iteration as u64 + 1);
                words.push(own);
                for (code, id) in environment {
                    words.push(code);
                    words.push(id);
                }
                hash_words(&words)
            })
            .collect();
        next.iter().copied().for_each(&mut set);
        identifiers = next;
    }

    fingerprint
}
