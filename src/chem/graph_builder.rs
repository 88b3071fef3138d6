//! Parsed molecule to encoded `MolecularGraph`

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chem::encoder::{encode_atom, encode_bond, encode_global};
use crate::chem::molfile::parse_mol_block;
use crate::chem::parser::SmilesParser;
use crate::config::{Config, FragmentPolicy};
use crate::error::{InferenceError, InferenceResult};
use crate::types::{MolecularGraph, MolecularInput, ParsedMolecule};

/// Builds immutable molecular graphs from SMILES or MOL blocks
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    parser: SmilesParser,
    max_atoms: usize,
    fragment_policy: FragmentPolicy,
}

impl GraphBuilder {
    pub fn new(parser: SmilesParser, max_atoms: usize, fragment_policy: FragmentPolicy) -> Self {
        Self {
            parser,
            max_atoms,
            fragment_policy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            SmilesParser::with_config(&config.parser),
            config.model.max_atoms,
            config.parser.fragment_policy,
        )
    }

    pub fn max_atoms(&self) -> usize {
        self.max_atoms
    }

    pub fn parser(&self) -> &SmilesParser {
        &self.parser
    }

    /// Parse a SMILES string and apply the fragment policy
    pub fn parse_smiles(&self, smiles: &str) -> InferenceResult<ParsedMolecule> {
        let parsed = self.parser.parse(smiles)?;
        Ok(self.apply_policy(parsed))
    }

    /// Build a graph from a SMILES string
    pub fn build(&self, smiles: &str) -> InferenceResult<MolecularGraph> {
        let parsed = self.parse_smiles(smiles)?;
        self.assemble(parsed, smiles.trim().to_string())
    }

    /// Build a graph from either supported notation
    pub fn build_input(&self, input: &MolecularInput) -> InferenceResult<MolecularGraph> {
        match input {
            MolecularInput::Smiles(smiles) => self.build(smiles),
            MolecularInput::MolBlock(block) => {
                let parsed = self.apply_policy(parse_mol_block(block)?);
                self.assemble(parsed, String::new())
            }
        }
    }

    /// Build graphs sequentially, stopping at the first failure
    pub fn build_batch(
        &self,
        inputs: &[MolecularInput],
        cancel: &CancellationToken,
    ) -> InferenceResult<Vec<MolecularGraph>> {
        let mut graphs = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(InferenceError::InferenceTimeout(format!(
                    "graph batch cancelled at item {}",
                    index
                )));
            }
            let graph = self.build_input(input).map_err(|e| InferenceError::BatchItem {
                index,
                source: Box::new(e),
            })?;
            graphs.push(graph);
        }
        Ok(graphs)
    }

    fn apply_policy(&self, parsed: ParsedMolecule) -> ParsedMolecule {
        match self.fragment_policy {
            FragmentPolicy::KeepAll => parsed,
            FragmentPolicy::LargestOnly => parsed.largest_fragment(),
        }
    }

    fn assemble(&self, parsed: ParsedMolecule, source_smiles: String) -> InferenceResult<MolecularGraph> {
        let atom_count = parsed.atoms.len();
        if atom_count == 0 {
            return Err(InferenceError::NoAtomsFound);
        }
        if atom_count > self.max_atoms {
            return Err(InferenceError::MoleculeTooLarge {
                atoms: atom_count,
                max: self.max_atoms,
            });
        }

        let node_features = parsed
            .atoms
            .iter()
            .map(|atom| encode_atom(atom).to_vec())
            .collect();

        let bond_count = parsed.bonds.len();
        let mut edge_index = Vec::with_capacity(bond_count * 2);
        let mut edge_features = Vec::with_capacity(bond_count * 2);
        for bond in &parsed.bonds {
            let features = encode_bond(bond).to_vec();
            edge_index.push([bond.source_index, bond.target_index]);
            edge_index.push([bond.target_index, bond.source_index]);
            edge_features.push(features.clone());
            edge_features.push(features);
        }

        let global_features = encode_global(&parsed.atoms, &parsed.bonds).to_vec();

        debug!(atom_count, bond_count, "Built molecular graph");

        Ok(MolecularGraph {
            node_features,
            edge_index,
            edge_features,
            global_features,
            atom_count,
            bond_count,
            source_smiles,
        })
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
