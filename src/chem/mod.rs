/// Chemistry front end
///
/// This module contains:
/// - SMILES and V2000 MOL block parsers
/// - Fixed-width atom, bond and molecule feature encoders
/// - GraphBuilder producing model-ready molecular graphs
/// - Hashed Morgan fingerprints for Tanimoto similarity

pub mod elements;
pub mod encoder;
pub mod fingerprint;
pub mod graph_builder;
pub mod molfile;
pub mod parser;

#[cfg(test)]
mod tests;

pub use encoder::{encode_atom, encode_bond, encode_global, EDGE_FEATURE_DIM, GLOBAL_FEATURE_DIM, NODE_FEATURE_DIM};
pub use fingerprint::morgan_fingerprint;
pub use graph_builder::GraphBuilder;
pub use molfile::parse_mol_block;
pub use parser::{parse, SmilesParser};
