//! Request envelope and model output codecs
//!
//! `PackedF32` layout, all little-endian:
//! magic `MGF1`, then u32 atom count, bond count, node width, edge width and
//! global width, then node features (f32), edge index pairs (u32), edge
//! features (f32) and global features (f32). The source notation is not
//! carried; the request digest identifies it.

use crate::chem::encoder::{EDGE_FEATURE_DIM, GLOBAL_FEATURE_DIM, NODE_FEATURE_DIM};
use crate::config::InputFormat;
use crate::error::{InferenceError, InferenceResult};
use crate::types::MolecularGraph;

/// Output tensor holding the raw embedding
pub const EMBEDDING_OUTPUT: &str = "embedding";

const PACKED_MAGIC: &[u8; 4] = b"MGF1";
const PACKED_HEADER_LEN: usize = 4 + 5 * 4;

/// Serialize a graph into the configured wire format
pub fn encode_graph(graph: &MolecularGraph, format: InputFormat) -> InferenceResult<Vec<u8>> {
    match format {
        InputFormat::Json => Ok(serde_json::to_vec(graph)?),
        InputFormat::PackedF32 => encode_packed(graph),
    }
}

/// Deserialize and shape-check a graph envelope
pub fn decode_graph(bytes: &[u8], format: InputFormat) -> InferenceResult<MolecularGraph> {
    let graph: MolecularGraph = match format {
        InputFormat::Json => serde_json::from_slice(bytes)?,
        InputFormat::PackedF32 => decode_packed(bytes)?,
    };
    graph.validate()?;
    Ok(graph)
}

/// Little-endian f32 bytes of an embedding
pub fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian f32 embedding of exactly `dim` values
pub fn decode_embedding(bytes: &[u8], dim: usize) -> InferenceResult<Vec<f32>> {
    if bytes.len() != dim * 4 {
        return Err(InferenceError::InvalidOutput(format!(
            "embedding has {} bytes, expected {} ({} x f32)",
            bytes.len(),
            dim * 4,
            dim
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn to_u32(value: usize, what: &str) -> InferenceResult<u32> {
    u32::try_from(value).map_err(|_| InferenceError::InvalidInput(format!("{} {} does not fit u32", what, value)))
}

fn encode_packed(graph: &MolecularGraph) -> InferenceResult<Vec<u8>> {
    let edges = graph.edge_index.len();
    let capacity = PACKED_HEADER_LEN
        + 4 * (graph.atom_count * NODE_FEATURE_DIM + edges * (2 + EDGE_FEATURE_DIM) + GLOBAL_FEATURE_DIM);
    let mut out = Vec::with_capacity(capacity);

    out.extend_from_slice(PACKED_MAGIC);
    for value in [
        graph.atom_count,
        graph.bond_count,
        NODE_FEATURE_DIM,
        EDGE_FEATURE_DIM,
        GLOBAL_FEATURE_DIM,
    ] {
        out.extend_from_slice(&to_u32(value, "count")?.to_le_bytes());
    }

    for value in graph.node_features.iter().flatten() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    for [source, target] in &graph.edge_index {
        out.extend_from_slice(&to_u32(*source, "atom index")?.to_le_bytes());
        out.extend_from_slice(&to_u32(*target, "atom index")?.to_le_bytes());
    }
    for value in graph.edge_features.iter().flatten() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    for value in &graph.global_features {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

/// Cursor over a packed envelope
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> InferenceResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                InferenceError::InvalidInput(format!("packed graph truncated at byte {}", self.offset))
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u32(&mut self) -> InferenceResult<usize> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn f32s(&mut self, count: usize) -> InferenceResult<Vec<f32>> {
        let bytes = self.take(count.saturating_mul(4))?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

fn decode_packed(bytes: &[u8]) -> InferenceResult<MolecularGraph> {
    let mut reader = Reader { bytes, offset: 0 };
    if reader.take(4)? != PACKED_MAGIC {
        return Err(InferenceError::InvalidInput("packed graph has a bad magic header".to_string()));
    }

    let atom_count = reader.u32()?;
    let bond_count = reader.u32()?;
    let node_dim = reader.u32()?;
    let edge_dim = reader.u32()?;
    let global_dim = reader.u32()?;
    let edges = bond_count.saturating_mul(2);

    for (expected, actual) in [
        (NODE_FEATURE_DIM, node_dim),
        (EDGE_FEATURE_DIM, edge_dim),
        (GLOBAL_FEATURE_DIM, global_dim),
    ] {
        if expected != actual {
            return Err(InferenceError::DimensionMismatch { expected, actual });
        }
    }

    // Counts come from the header: size the payload before allocating for it
    let payload = atom_count
        .saturating_mul(node_dim)
        .saturating_add(edges.saturating_mul(2 + edge_dim))
        .saturating_add(global_dim)
        .saturating_mul(4);
    if payload != bytes.len() - PACKED_HEADER_LEN {
        return Err(InferenceError::InvalidInput(format!(
            "packed graph header declares {} payload bytes, found {}",
            payload,
            bytes.len() - PACKED_HEADER_LEN
        )));
    }

    let node_features = (0..atom_count)
        .map(|_| reader.f32s(node_dim))
        .collect::<InferenceResult<Vec<_>>>()?;
    let edge_index = (0..edges)
        .map(|_| Ok([reader.u32()?, reader.u32()?]))
        .collect::<InferenceResult<Vec<_>>>()?;
    let edge_features = (0..edges)
        .map(|_| reader.f32s(edge_dim))
        .collect::<InferenceResult<Vec<_>>>()?;
    let global_features = reader.f32s(global_dim)?;

    if reader.offset != bytes.len() {
        return Err(InferenceError::InvalidInput(format!(
            "packed graph has {} trailing bytes",
            bytes.len() - reader.offset
        )));
    }

    Ok(MolecularGraph {
        node_features,
        edge_index,
        edge_features,
        global_features,
        atom_count,
        bond_count,
        source_smiles: String::new(),
    })
}
