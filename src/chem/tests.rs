use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use crate::chem::{GraphBuilder, SmilesParser, EDGE_FEATURE_DIM, GLOBAL_FEATURE_DIM, NODE_FEATURE_DIM};
use crate::config::FragmentPolicy;
use crate::error::{InferenceError, ParseError};
use crate::types::MolecularInput;

fn builder(max_atoms: usize, policy: FragmentPolicy) -> GraphBuilder {
    GraphBuilder::new(SmilesParser::default(), max_atoms, policy)
}

#[test]
fn test_ethanol_graph_shape() {
    let graph = assert_ok!(GraphBuilder::default().build("CCO"));

    assert_eq!(graph.atom_count, 3);
    assert_eq!(graph.bond_count, 2);
    assert_eq!(graph.node_features.len(), 3);
    assert_eq!(graph.edge_index.len(), 4);
    assert_eq!(graph.edge_features.len(), 4);
    assert_eq!(graph.global_features.len(), GLOBAL_FEATURE_DIM);
    assert!(graph.node_features.iter().all(|f| f.len() == NODE_FEATURE_DIM));
    assert!(graph.edge_features.iter().all(|f| f.len() == EDGE_FEATURE_DIM));
    assert_eq!(graph.source_smiles, "CCO");
    assert_ok!(graph.validate());
}

#[test]
fn test_edges_are_doubled_with_identical_features() {
    let graph = assert_ok!(GraphBuilder::default().build("CC(=O)O"));

    assert_eq!(graph.atom_count, 4);
    assert_eq!(graph.bond_count, 3);
    for pair in 0..graph.bond_count {
        let forward = graph.edge_index[2 * pair];
        let reverse = graph.edge_index[2 * pair + 1];
        assert_eq!(forward, [reverse[1], reverse[0]]);
        assert_eq!(graph.edge_features[2 * pair], graph.edge_features[2 * pair + 1]);
    }

    // One double bond, seen from both directions
    let doubles = graph.edge_features.iter().filter(|f| f[1] == 1.0).count();
    assert_eq!(doubles, 2);
}

#[test]
fn test_molecule_too_large_before_encoding() {
    let result = builder(4, FragmentPolicy::KeepAll).build("CCCCC");
    match assert_err!(result) {
        InferenceError::MoleculeTooLarge { atoms, max } => {
            assert_eq!(atoms, 5);
            assert_eq!(max, 4);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_parse_errors_propagate() {
    let err = assert_err!(GraphBuilder::default().build(""));
    assert!(matches!(err, InferenceError::Parse(ParseError::EmptyInput)));
    assert!(err.is_validation());
}

#[test]
fn test_fragment_policy() {
    let keep = assert_ok!(builder(200, FragmentPolicy::KeepAll).build("CCO.[Na+]"));
    assert_eq!(keep.atom_count, 4);

    let largest = assert_ok!(builder(200, FragmentPolicy::LargestOnly).build("[Na+].CCO"));
    assert_eq!(largest.atom_count, 3);
    assert_eq!(largest.bond_count, 2);
    assert_ok!(largest.validate());

    // The limit applies after the policy
    assert_ok!(builder(3, FragmentPolicy::LargestOnly).build("CCO.[Na+]"));
    assert_err!(builder(3, FragmentPolicy::KeepAll).build("CCO.[Na+]"));
}

#[test]
fn test_build_from_mol_block() {
    let block = "ethanol


  3  2  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.2990    0.7500    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    2.5981    0.0000    0.0000 O   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0  0  0  0
  2  3  1  0  0  0  0
M  END
";
    let from_block = assert_ok!(GraphBuilder::default().build_input(&MolecularInput::MolBlock(block.to_string())));
    let from_smiles = assert_ok!(GraphBuilder::default().build("CCO"));

    assert_eq!(from_block.node_features, from_smiles.node_features);
    assert_eq!(from_block.edge_index, from_smiles.edge_index);
    assert!(from_block.source_smiles.is_empty());
}

#[test]
fn test_build_batch_reports_failing_index() {
    let inputs = vec![
        MolecularInput::Smiles("CCO".to_string()),
        MolecularInput::Smiles("C1CC".to_string()),
        MolecularInput::Smiles("c1ccccc1".to_string()),
    ];
    let err = assert_err!(GraphBuilder::default().build_batch(&inputs, &CancellationToken::new()));
    match err {
        InferenceError::BatchItem { index, source } => {
            assert_eq!(index, 1);
            assert!(matches!(
                *source,
                InferenceError::Parse(ParseError::UnmatchedRingClosure { label: 1 })
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_build_batch_respects_cancellation() {
    let inputs = vec![MolecularInput::Smiles("CCO".to_string())];
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = assert_err!(GraphBuilder::default().build_batch(&inputs, &cancel));
    assert!(matches!(err, InferenceError::InferenceTimeout(_)));

    let graphs = assert_ok!(GraphBuilder::default().build_batch(&inputs, &CancellationToken::new()));
    assert_eq!(graphs.len(), 1);
}

#[test]
fn test_digest_is_stable_and_content_sensitive() {
    let a = assert_ok!(GraphBuilder::default().build("CCO"));
    let b = assert_ok!(GraphBuilder::default().build("CCO"));
    let c = assert_ok!(GraphBuilder::default().build("CCN"));
    assert_eq!(a.content_digest(), b.content_digest());
    assert_ne!(a.content_digest(), c.content_digest());
    assert_eq!(a.content_digest().len(), 64);
}
