//! Fixed-width atom, bond and molecule feature encodings
//!
//! Every categorical sub-feature is one-hot inside its own region. Values that
//! do not fit a region fall into its last bin, so encoding never fails.

use crate::chem::elements;
use crate::types::{Atom, Bond, BondOrder};

/// Atomic numbers with a dedicated bin: C N O S F P Cl Br I B
const COMMON_ELEMENTS: [u8; 10] = [6, 7, 8, 16, 9, 15, 17, 35, 53, 5];

const ATOMIC_NUMBER_BINS: usize = COMMON_ELEMENTS.len() + 1;
const DEGREE_BINS: usize = 5;
const CHARGE_BINS: usize = 5;
const HYDROGEN_BINS: usize = 4;
const HYBRIDIZATION_BINS: usize = 7;
const CHIRALITY_BINS: usize = 4;
const RING_SIZE_BINS: usize = 7;
const ATOM_FLAGS: usize = 2;
const ATOM_SCALARS: usize = 4;

/// Width of every node feature vector
pub const NODE_FEATURE_DIM: usize = ATOMIC_NUMBER_BINS
    + DEGREE_BINS
    + CHARGE_BINS
    + HYDROGEN_BINS
    + HYBRIDIZATION_BINS
    + CHIRALITY_BINS
    + RING_SIZE_BINS
    + ATOM_FLAGS
    + ATOM_SCALARS;

const BOND_ORDER_BINS: usize = 4;
const BOND_FLAGS: usize = 2;
const STEREO_BINS: usize = 4;
const DIRECTION_BINS: usize = 3;

/// Width of every edge feature vector
pub const EDGE_FEATURE_DIM: usize = BOND_ORDER_BINS + BOND_FLAGS + STEREO_BINS + DIRECTION_BINS;

/// Number of molecule-level features
pub const GLOBAL_FEATURE_DIM: usize = 6;

// Hybridization bins: s, sp, sp2, sp3, sp3d, sp3d2, other
const HYBRIDIZATION_SP3: usize = 3;
const CHIRALITY_NONE: usize = 0;
const RING_SIZE_NONE: usize = 0;
const STEREO_NONE: usize = 0;
const DIRECTION_NONE: usize = 0;

const MASS_SCALE: f32 = 100.0;
const ELECTRONEGATIVITY_SCALE: f32 = 4.0;
const VDW_RADIUS_SCALE: f32 = 3.0;
const RADICAL_SCALE: f32 = 3.0;
// Radical electrons are not tracked by the parsers
const RADICAL_ELECTRONS: f32 = 0.0;

const COUNT_SCALE: f32 = 200.0;
const WEIGHT_SCALE: f32 = 1000.0;
const LOG_SIZE_SCALE: f32 = 6.0;

/// Sequential writer over fixed-width regions
struct Regions<'a> {
    out: &'a mut [f32],
    offset: usize,
}

impl<'a> Regions<'a> {
    fn new(out: &'a mut [f32]) -> Self {
        Self { out, offset: 0 }
    }

    /// One-hot inside a region of `width`; out of range goes to the last bin
    fn one_hot(&mut self, width: usize, bin: usize) {
        self.out[self.offset + bin.min(width - 1)] = 1.0;
        self.offset += width;
    }

    fn flag(&mut self, value: bool) {
        self.out[self.offset] = if value { 1.0 } else { 0.0 };
        self.offset += 1;
    }

    fn scalar(&mut self, value: f32) {
        self.out[self.offset] = value;
        self.offset += 1;
    }
}

/// Encode an atom into a `NODE_FEATURE_DIM` vector
pub fn encode_atom(atom: &Atom) -> [f32; NODE_FEATURE_DIM] {
    let mut features = [0.0f32; NODE_FEATURE_DIM];
    let mut regions = Regions::new(&mut features);

    let element_bin = COMMON_ELEMENTS
        .iter()
        .position(|&z| z == atom.atomic_number)
        .unwrap_or(ATOMIC_NUMBER_BINS - 1);
    regions.one_hot(ATOMIC_NUMBER_BINS, element_bin);
    regions.one_hot(DEGREE_BINS, usize::from(atom.degree));
    let charge_bin = (i32::from(atom.charge) + 2).clamp(0, CHARGE_BINS as i32 - 1) as usize;
    regions.one_hot(CHARGE_BINS, charge_bin);
    regions.one_hot(HYDROGEN_BINS, usize::from(atom.implicit_hydrogens));
    regions.one_hot(HYBRIDIZATION_BINS, HYBRIDIZATION_SP3);
    regions.one_hot(CHIRALITY_BINS, CHIRALITY_NONE);
    regions.one_hot(RING_SIZE_BINS, RING_SIZE_NONE);

    // No ring perception: aromatic atoms stand in for ring membership
    regions.flag(atom.is_aromatic);
    regions.flag(atom.is_aromatic);

    let element = elements::by_atomic_number(atom.atomic_number);
    regions.scalar(element.map_or(elements::CARBON.mass, |e| e.mass) / MASS_SCALE);
    regions.scalar(element.map_or(0.0, |e| e.electronegativity) / ELECTRONEGATIVITY_SCALE);
    regions.scalar(element.map_or(elements::CARBON.vdw_radius, |e| e.vdw_radius) / VDW_RADIUS_SCALE);
    regions.scalar(RADICAL_ELECTRONS / RADICAL_SCALE);

    features
}

/// Encode a bond into an `EDGE_FEATURE_DIM` vector
pub fn encode_bond(bond: &Bond) -> [f32; EDGE_FEATURE_DIM] {
    let mut features = [0.0f32; EDGE_FEATURE_DIM];
    let mut regions = Regions::new(&mut features);

    let order_bin = match bond.bond_order {
        BondOrder::Single => 0,
        BondOrder::Double => 1,
        BondOrder::Triple => 2,
        BondOrder::Aromatic => 3,
    };
    regions.one_hot(BOND_ORDER_BINS, order_bin);
    regions.flag(bond.conjugated);
    regions.flag(bond.in_ring);
    regions.one_hot(STEREO_BINS, STEREO_NONE);
    regions.one_hot(DIRECTION_BINS, DIRECTION_NONE);

    features
}

/// Molecule-level summary features, in order: atom count, bond count,
/// molecular weight, aromatic fraction, bond density, log size
pub fn encode_global(atoms: &[Atom], bonds: &[Bond]) -> [f32; GLOBAL_FEATURE_DIM] {
    let num_atoms = atoms.len() as f32;
    let num_bonds = bonds.len() as f32;

    let molecular_weight: f32 = atoms
        .iter()
        .map(|a| elements::mass_or_carbon(a.atomic_number))
        .sum();

    let aromatic_fraction = if atoms.is_empty() {
        0.0
    } else {
        atoms.iter().filter(|a| a.is_aromatic).count() as f32 / num_atoms
    };

    let bond_density = if atoms.len() > 1 {
        num_bonds / (num_atoms * (num_atoms - 1.0) / 2.0)
    } else {
        0.0
    };

    [
        num_atoms / COUNT_SCALE,
        num_bonds / COUNT_SCALE,
        molecular_weight / WEIGHT_SCALE,
        aromatic_fraction,
        bond_density,
        num_atoms.ln_1p() / LOG_SIZE_SCALE,
    ]
}
