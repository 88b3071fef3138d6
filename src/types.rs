use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::chem::encoder::{EDGE_FEATURE_DIM, GLOBAL_FEATURE_DIM, NODE_FEATURE_DIM};
use crate::error::{InferenceError, InferenceResult};

/// Atom discovered while parsing a molecule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    /// Element symbol as written (lowercase for aromatic atoms)
    pub symbol: String,
    /// Atomic number, 0 when unknown
    pub atomic_number: u8,
    pub is_aromatic: bool,
    /// Formal charge
    pub charge: i8,
    /// Implicit (or bracket-explicit) hydrogen count
    pub implicit_hydrogens: u8,
    /// Number of explicit bonds
    pub degree: u8,
}

/// Bond order classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Explicit valence contribution, aromatic counted as 1
    pub fn explicit_valence(self) -> u32 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }
}

/// Undirected bond between two atom indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub source_index: usize,
    pub target_index: usize,
    pub bond_order: BondOrder,
    pub in_ring: bool,
    pub conjugated: bool,
}

/// Atoms and bonds produced by a parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMolecule {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
}

impl ParsedMolecule {
    /// Connected components as sorted atom index lists, in order of first atom
    pub fn fragments(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.atoms.len()];
        for bond in &self.bonds {
            adjacency[bond.source_index].push(bond.target_index);
            adjacency[bond.target_index].push(bond.source_index);
        }

        let mut seen = vec![false; self.atoms.len()];
        let mut fragments = Vec::new();
        for start in 0..self.atoms.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let mut component = Vec::new();
            while let Some(atom) = stack.pop() {
                component.push(atom);
                for &next in &adjacency[atom] {
                    if !seen[next] {
                        seen[next] = true;
                        stack.push(next);
                    }
                }
            }
            component.sort_unstable();
            fragments.push(component);
        }
        fragments
    }

    /// Keep only the fragment with the most atoms (first one on ties)
    pub fn largest_fragment(&self) -> ParsedMolecule {
        let fragments = self.fragments();
        if fragments.len() <= 1 {
            return self.clone();
        }

        let mut largest = &fragments[0];
        for fragment in &fragments[1..] {
            if fragment.len() > largest.len() {
                largest = fragment;
            }
        }

        let mut remap = vec![None; self.atoms.len()];
        for (new_index, &old_index) in largest.iter().enumerate() {
            remap[old_index] = Some(new_index);
        }

        let atoms = largest.iter().map(|&i| self.atoms[i].clone()).collect();
        let bonds = self
            .bonds
            .iter()
            .filter_map(|bond| {
                let source = remap[bond.source_index]?;
                let target = remap[bond.target_index]?;
                Some(Bond {
                    source_index: source,
                    target_index: target,
                    ..bond.clone()
                })
            })
            .collect();

        ParsedMolecule { atoms, bonds }
    }
}

/// Encoded molecular graph handed to the predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MolecularGraph {
    /// One feature vector per atom
    pub node_features: Vec<Vec<f32>>,
    /// Directed edges, two per bond
    pub edge_index: Vec<[usize; 2]>,
    /// One feature vector per directed edge
    pub edge_features: Vec<Vec<f32>>,
    /// Molecule-level summary statistics
    pub global_features: Vec<f32>,
    pub atom_count: usize,
    /// Number of undirected bonds
    pub bond_count: usize,
    /// Input notation, empty for MOL block input
    pub source_smiles: String,
}

impl MolecularGraph {
    /// Check the shape invariants of the graph
    pub fn validate(&self) -> InferenceResult<()> {
        if self.node_features.len() != self.atom_count {
            return Err(InferenceError::InvalidInput(format!(
                "graph has {} node vectors for {} atoms",
                self.node_features.len(),
                self.atom_count
            )));
        }
        if self.edge_index.len() != 2 * self.bond_count
            || self.edge_features.len() != 2 * self.bond_count
        {
            return Err(InferenceError::InvalidInput(format!(
                "graph has {} edges and {} edge vectors for {} bonds",
                self.edge_index.len(),
                self.edge_features.len(),
                self.bond_count
            )));
        }
        if let Some(bad) = self.node_features.iter().find(|f| f.len() != NODE_FEATURE_DIM) {
            return Err(InferenceError::DimensionMismatch {
                expected: NODE_FEATURE_DIM,
                actual: bad.len(),
            });
        }
        if let Some(bad) = self.edge_features.iter().find(|f| f.len() != EDGE_FEATURE_DIM) {
            return Err(InferenceError::DimensionMismatch {
                expected: EDGE_FEATURE_DIM,
                actual: bad.len(),
            });
        }
        if self.global_features.len() != GLOBAL_FEATURE_DIM {
            return Err(InferenceError::DimensionMismatch {
                expected: GLOBAL_FEATURE_DIM,
                actual: self.global_features.len(),
            });
        }
        if let Some(edge) = self
            .edge_index
            .iter()
            .find(|[s, t]| *s >= self.atom_count || *t >= self.atom_count)
        {
            return Err(InferenceError::InvalidInput(format!(
                "edge {:?} references an atom outside 0..{}",
                edge, self.atom_count
            )));
        }
        Ok(())
    }

    /// SHA256 hex digest of the source notation and features
    pub fn content_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_smiles.as_bytes());
        hasher.update((self.atom_count as u64).to_le_bytes());
        hasher.update((self.bond_count as u64).to_le_bytes());
        for value in self.node_features.iter().flatten() {
            hasher.update(value.to_le_bytes());
        }
        for [source, target] in &self.edge_index {
            hasher.update((*source as u64).to_le_bytes());
            hasher.update((*target as u64).to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Molecule input accepted by the graph builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", content = "data", rename_all = "snake_case")]
pub enum MolecularInput {
    Smiles(String),
    MolBlock(String),
}

/// L2-normalized embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub normalized_vector: Vec<f32>,
    /// Norm of the raw vector before normalization
    pub l2_norm: f64,
}

/// Discrete similarity verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimilarityLevel {
    High,
    Medium,
    Low,
    None,
}

impl fmt::Display for SimilarityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SimilarityLevel::High => "HIGH",
            SimilarityLevel::Medium => "MEDIUM",
            SimilarityLevel::Low => "LOW",
            SimilarityLevel::None => "NONE",
        };
        f.write_str(label)
    }
}

/// Typed molecule property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

/// String-keyed molecule properties
pub type MoleculeProperties = HashMap<String, PropertyValue>;

/// Result of a single orchestrated embedding
#[derive(Debug, Clone)]
pub struct EmbedOutput {
    pub request_id: String,
    pub embedding: EmbeddingResult,
    /// Wall-clock latency of the whole call
    pub latency: Duration,
    /// Inference time reported by the backend
    pub backend_time_ms: i64,
    /// Backend invocations including retries
    pub attempts: u32,
}

/// Per-item outcome of a batch embedding
#[derive(Debug)]
pub struct BatchEmbedItem {
    pub index: usize,
    pub result: InferenceResult<EmbedOutput>,
}

/// Pairwise similarity verdict
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityReport {
    /// Final score after fusion (or the raw fallback)
    pub score: f64,
    pub level: SimilarityLevel,
    /// Raw cosine similarity of the two embeddings
    pub cosine: f64,
    /// Individual named signals
    pub scores: HashMap<String, f64>,
    /// False when fusion fell back to the raw score
    pub fused: bool,
}

/// Match returned by the vector-search collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub molecule_id: String,
    pub smiles: String,
    pub score: f64,
    #[serde(default)]
    pub properties: MoleculeProperties,
}

/// Classified nearest-neighbor hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarMolecule {
    pub molecule_id: String,
    pub smiles: String,
    pub score: f64,
    pub level: SimilarityLevel,
    pub properties: MoleculeProperties,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(symbol: &str) -> Atom {
        Atom {
            symbol: symbol.to_string(),
            atomic_number: 6,
            is_aromatic: false,
            charge: 0,
            implicit_hydrogens: 0,
            degree: 0,
        }
    }

    fn bond(source: usize, target: usize) -> Bond {
        Bond {
            source_index: source,
            target_index: target,
            bond_order: BondOrder::Single,
            in_ring: false,
            conjugated: false,
        }
    }

    #[test]
    fn test_fragments_split_disconnected_components() {
        let molecule = ParsedMolecule {
            atoms: vec![atom("C"), atom("C"), atom("O"), atom("C"), atom("C"), atom("C")],
            bonds: vec![bond(0, 1), bond(3, 4), bond(4, 5)],
        };

        let fragments = molecule.fragments();
        assert_eq!(fragments, vec![vec![0, 1], vec![2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_largest_fragment_reindexes_bonds() {
        let molecule = ParsedMolecule {
            atoms: vec![atom("C"), atom("C"), atom("O"), atom("C"), atom("C"), atom("C")],
            bonds: vec![bond(0, 1), bond(3, 4), bond(4, 5)],
        };

        let largest = molecule.largest_fragment();
        assert_eq!(largest.atoms.len(), 3);
        assert_eq!(largest.bonds.len(), 2);
        assert_eq!(largest.bonds[0].source_index, 0);
        assert_eq!(largest.bonds[0].target_index, 1);
        assert_eq!(largest.bonds[1].source_index, 1);
        assert_eq!(largest.bonds[1].target_index, 2);
    }

    #[test]
    fn test_similarity_level_display() {
        assert_eq!(SimilarityLevel::High.to_string(), "HIGH");
        assert_eq!(SimilarityLevel::None.to_string(), "NONE");
    }

    #[test]
    fn test_property_value_untagged_serde() {
        let mut properties = MoleculeProperties::new();
        properties.insert("name".to_string(), PropertyValue::Text("ethanol".to_string()));
        properties.insert("logp".to_string(), PropertyValue::Number(-0.31));
        properties.insert("approved".to_string(), PropertyValue::Flag(true));

        let json = serde_json::to_string(&properties).unwrap();
        let back: MoleculeProperties = serde_json::from_str(&json).unwrap();
        assert_eq!(back, properties);
    }
}
