//! SMILES tokenizer and graph-primitive parser
//!
//! Covers the organic subset, bracket atoms (isotope, hydrogen count, charge),
//! branches, ring closures (single digits and `%NN` labels) and disconnected
//! fragments. Stereochemistry is read past and discarded.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::chem::elements;
use crate::config::ParserConfig;
use crate::error::ParseError;
use crate::types::{Atom, Bond, BondOrder, ParsedMolecule};

/// Default maximum SMILES length in characters
pub const DEFAULT_MAX_SMILES_LENGTH: usize = 5000;

fn charset() -> &'static Regex {
    static CHARSET: OnceLock<Regex> = OnceLock::new();
    CHARSET.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9@+\-\[\]()=#$:/\\.%]+$").expect("SMILES charset regex is valid")
    })
}

/// SMILES parser with a configurable input length limit
#[derive(Debug, Clone)]
pub struct SmilesParser {
    max_length: usize,
}

impl Default for SmilesParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SMILES_LENGTH)
    }
}

impl SmilesParser {
    /// Create a parser rejecting inputs longer than `max_length` characters
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Create a parser from parser configuration
    pub fn with_config(config: &ParserConfig) -> Self {
        Self::new(config.max_smiles_length)
    }

    /// Check length, character set and bracket balance without building atoms
    pub fn validate(&self, smiles: &str) -> Result<(), ParseError> {
        if smiles.is_empty() {
            return Err(ParseError::EmptyInput);
        }

        let length = smiles.chars().count();
        if length > self.max_length {
            return Err(ParseError::TooLong {
                length,
                max: self.max_length,
            });
        }

        if smiles.contains(">>") {
            return Err(ParseError::ReactionNotSupported);
        }

        if !charset().is_match(smiles) {
            let (position, ch) = smiles
                .chars()
                .enumerate()
                .find(|(_, c)| !is_smiles_char(*c))
                .unwrap_or((0, ' '));
            return Err(ParseError::InvalidCharacter { ch, position });
        }

        check_balance(smiles.as_bytes())
    }

    /// Parse a SMILES string into atoms and bonds
    pub fn parse(&self, smiles: &str) -> Result<ParsedMolecule, ParseError> {
        let smiles = smiles.trim();
        self.validate(smiles)?;

        let molecule = Scanner::new(smiles.as_bytes()).run()?;
        debug!(
            atoms = molecule.atoms.len(),
            bonds = molecule.bonds.len(),
            "Parsed SMILES"
        );
        Ok(molecule)
    }
}

/// Parse with the default length limit
pub fn parse(smiles: &str) -> Result<ParsedMolecule, ParseError> {
    SmilesParser::default().parse(smiles)
}

fn is_smiles_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@+-[]()=#$:/\\.%".contains(c)
}

/// Parentheses must balance; `]` must close an open `[` and brackets do not nest.
/// A `[` left open is reported later as an unclosed bracket atom.
fn check_balance(bytes: &[u8]) -> Result<(), ParseError> {
    let mut open_branches = Vec::new();
    let mut in_bracket = false;

    for (position, &b) in bytes.iter().enumerate() {
        match b {
            b'[' if in_bracket => return Err(ParseError::UnbalancedBrackets { position }),
            b'[' => in_bracket = true,
            b']' if !in_bracket => return Err(ParseError::UnbalancedBrackets { position }),
            b']' => in_bracket = false,
            b'(' if !in_bracket => open_branches.push(position),
            b')' if !in_bracket => {
                if open_branches.pop().is_none() {
                    return Err(ParseError::UnbalancedBrackets { position });
                }
            }
            _ => {}
        }
    }

    match open_branches.last() {
        Some(&position) => Err(ParseError::UnbalancedBrackets { position }),
        None => Ok(()),
    }
}

/// Ring label opened by an atom, with any bond order written at the opening
struct OpenRing {
    atom: usize,
    order: Option<BondOrder>,
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    from_bracket: Vec<bool>,
    bonded: HashSet<(usize, usize)>,
    prev: Option<usize>,
    branches: Vec<usize>,
    pending: Option<BondOrder>,
    rings: BTreeMap<u32, OpenRing>,
}

impl<'a> Scanner<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            atoms: Vec::new(),
            bonds: Vec::new(),
            from_bracket: Vec::new(),
            bonded: HashSet::new(),
            prev: None,
            branches: Vec::new(),
            pending: None,
            rings: BTreeMap::new(),
        }
    }

    fn run(mut self) -> Result<ParsedMolecule, ParseError> {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            match b {
                b'(' => {
                    let Some(prev) = self.prev else {
                        return Err(self.unexpected());
                    };
                    self.branches.push(prev);
                    self.pos += 1;
                }
                b')' => {
                    if self.pending.is_some() {
                        return Err(self.unexpected());
                    }
                    let Some(anchor) = self.branches.pop() else {
                        return Err(ParseError::UnbalancedBrackets { position: self.pos });
                    };
                    self.prev = Some(anchor);
                    self.pos += 1;
                }
                b'-' | b'=' | b'#' | b':' => {
                    if self.pending.is_some() || self.prev.is_none() {
                        return Err(self.unexpected());
                    }
                    self.pending = Some(match b {
                        b'-' => BondOrder::Single,
                        b'=' => BondOrder::Double,
                        b'#' => BondOrder::Triple,
                        _ => BondOrder::Aromatic,
                    });
                    self.pos += 1;
                }
                // Directional single bonds carry cis/trans information only
                b'/' | b'\\' => self.pos += 1,
                b'.' => {
                    if self.pending.is_some() {
                        return Err(self.unexpected());
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                b'0'..=b'9' | b'%' => self.ring_closure()?,
                b'[' => self.bracket_atom()?,
                b'A'..=b'Z' | b'a'..=b'z' => self.organic_atom()?,
                _ => return Err(self.unexpected()),
            }
        }

        if self.pending.is_some() {
            return Err(ParseError::UnexpectedToken {
                token: self.bytes[self.bytes.len() - 1] as char,
                position: self.bytes.len() - 1,
            });
        }
        if let Some((&label, _)) = self.rings.iter().next() {
            return Err(ParseError::UnmatchedRingClosure { label });
        }

        self.assign_implicit_hydrogens();
        Ok(ParsedMolecule {
            atoms: self.atoms,
            bonds: self.bonds,
        })
    }

    fn unexpected(&self) -> ParseError {
        ParseError::UnexpectedToken {
            token: self.bytes[self.pos] as char,
            position: self.pos,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn organic_atom(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let first = self.bytes[start];

        let two_letter = match self.peek(1) {
            Some(second) if first.is_ascii_uppercase() && second.is_ascii_lowercase() => {
                let candidate = ascii_str(&self.bytes[start..start + 2]);
                elements::organic(&candidate).map(|resolved| (candidate, resolved))
            }
            _ => None,
        };

        let (symbol, (element, aromatic)) = match two_letter {
            Some(found) => found,
            None => {
                let candidate = ascii_str(&self.bytes[start..start + 1]);
                match elements::organic(&candidate) {
                    Some(resolved) => (candidate, resolved),
                    None => {
                        return Err(ParseError::UnknownElement {
                            symbol: candidate,
                            position: start,
                        })
                    }
                }
            }
        };

        self.pos += symbol.len();
        self.push_atom(
            Atom {
                symbol,
                atomic_number: element.atomic_number,
                is_aromatic: aromatic,
                charge: 0,
                implicit_hydrogens: 0,
                degree: 0,
            },
            false,
        )
    }

    fn bracket_atom(&mut self) -> Result<(), ParseError> {
        let open = self.pos;
        let unclosed = ParseError::UnclosedBracket { position: open };
        self.pos += 1;

        // Isotope
        while matches!(self.peek(0), Some(b'0'..=b'9')) {
            self.pos += 1;
        }

        let Some(first) = self.peek(0) else {
            return Err(unclosed);
        };
        if !first.is_ascii_alphabetic() {
            return Err(self.unexpected());
        }

        let symbol_start = self.pos;
        let two_letter = match self.peek(1) {
            Some(second) if second.is_ascii_lowercase() => {
                let candidate = ascii_str(&self.bytes[symbol_start..symbol_start + 2]);
                elements::bracket(&candidate).map(|resolved| (candidate, resolved))
            }
            _ => None,
        };
        let (symbol, (element, aromatic)) = match two_letter {
            Some(found) => found,
            None => {
                let candidate = ascii_str(&self.bytes[symbol_start..symbol_start + 1]);
                match elements::bracket(&candidate) {
                    Some(resolved) => (candidate, resolved),
                    None => {
                        return Err(ParseError::UnknownElement {
                            symbol: candidate,
                            position: symbol_start,
                        })
                    }
                }
            }
        };
        self.pos += symbol.len();

        // Chirality
        while self.peek(0) == Some(b'@') {
            self.pos += 1;
        }

        let mut hydrogens = 0u8;
        if self.peek(0) == Some(b'H') {
            self.pos += 1;
            hydrogens = self.read_number().map_or(1, |n| n.min(u8::MAX as u32) as u8);
        }

        let charge = self.read_charge()?;

        // Atom class
        if self.peek(0) == Some(b':') {
            self.pos += 1;
            self.read_number();
        }

        match self.peek(0) {
            Some(b']') => self.pos += 1,
            Some(_) => return Err(self.unexpected()),
            None => return Err(unclosed),
        }

        self.push_atom(
            Atom {
                symbol,
                atomic_number: element.atomic_number,
                is_aromatic: aromatic,
                charge,
                implicit_hydrogens: hydrogens,
                degree: 0,
            },
            true,
        )
    }

    fn read_number(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(0), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        // Saturates at u32::MAX
        Some(self.bytes[start..self.pos].iter().fold(0u32, |acc, &d| {
            acc.saturating_mul(10).saturating_add(u32::from(d - b'0'))
        }))
    }

    /// Reads `+`, `++`, `+n`, `-`, `--`, `-n` or the bare `n+` / `n-` form
    fn read_charge(&mut self) -> Result<i8, ParseError> {
        let start = self.pos;
        let sign_of = |b: u8| match b {
            b'+' => Some(1i64),
            b'-' => Some(-1i64),
            _ => None,
        };

        let magnitude = match self.peek(0) {
            Some(b) if sign_of(b).is_some() => {
                let symbol = b;
                let sign = sign_of(b).unwrap_or(1);
                self.pos += 1;
                match self.read_number() {
                    Some(n) => sign * i64::from(n),
                    None => {
                        let mut count = 1;
                        while self.peek(0) == Some(symbol) {
                            count += 1;
                            self.pos += 1;
                        }
                        sign * count
                    }
                }
            }
            Some(b'0'..=b'9') => {
                let mark = self.pos;
                let digits = self.read_number();
                match (digits, self.peek(0).and_then(sign_of)) {
                    (Some(n), Some(sign)) => {
                        self.pos += 1;
                        sign * i64::from(n)
                    }
                    _ => {
                        self.pos = mark;
                        0
                    }
                }
            }
            _ => 0,
        };

        i8::try_from(magnitude).map_err(|_| ParseError::InvalidCharge { position: start })
    }

    fn ring_closure(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let label = if self.bytes[start] == b'%' {
            match (self.peek(1), self.peek(2)) {
                (Some(d1 @ b'0'..=b'9'), Some(d2 @ b'0'..=b'9')) => {
                    self.pos += 3;
                    u32::from(d1 - b'0') * 10 + u32::from(d2 - b'0')
                }
                _ => return Err(self.unexpected()),
            }
        } else {
            self.pos += 1;
            u32::from(self.bytes[start] - b'0')
        };

        let Some(current) = self.prev else {
            return Err(ParseError::UnexpectedToken {
                token: self.bytes[start] as char,
                position: start,
            });
        };

        let explicit = self.pending.take();
        match self.rings.remove(&label) {
            Some(open) => {
                let key = (open.atom.min(current), open.atom.max(current));
                if open.atom == current || self.bonded.contains(&key) {
                    return Err(ParseError::UnexpectedToken {
                        token: self.bytes[start] as char,
                        position: start,
                    });
                }
                self.add_bond(open.atom, current, explicit.or(open.order), true);
            }
            None => {
                self.rings.insert(
                    label,
                    OpenRing {
                        atom: current,
                        order: explicit,
                    },
                );
            }
        }
        Ok(())
    }

    fn push_atom(&mut self, atom: Atom, bracket: bool) -> Result<(), ParseError> {
        let index = self.atoms.len();
        self.atoms.push(atom);
        self.from_bracket.push(bracket);

        if let Some(prev) = self.prev {
            let explicit = self.pending.take();
            self.add_bond(prev, index, explicit, false);
        }
        self.pending = None;
        self.prev = Some(index);
        Ok(())
    }

    fn add_bond(
        &mut self,
        source: usize,
        target: usize,
        explicit: Option<BondOrder>,
        ring_closure: bool,
    ) {
        let key = (source.min(target), source.max(target));
        if !self.bonded.insert(key) {
            return;
        }

        let order = explicit.unwrap_or(
            if self.atoms[source].is_aromatic && self.atoms[target].is_aromatic {
                BondOrder::Aromatic
            } else {
                BondOrder::Single
            },
        );
        let aromatic = order == BondOrder::Aromatic;

        self.bonds.push(Bond {
            source_index: source,
            target_index: target,
            bond_order: order,
            in_ring: ring_closure || aromatic,
            conjugated: aromatic,
        });
        self.atoms[source].degree = self.atoms[source].degree.saturating_add(1);
        self.atoms[target].degree = self.atoms[target].degree.saturating_add(1);
    }

    fn assign_implicit_hydrogens(&mut self) {
        let mut valence = vec![0u32; self.atoms.len()];
        for bond in &self.bonds {
            let v = bond.bond_order.explicit_valence();
            valence[bond.source_index] += v;
            valence[bond.target_index] += v;
        }

        for (index, atom) in self.atoms.iter_mut().enumerate() {
            if !self.from_bracket[index] {
                atom.implicit_hydrogens =
                    elements::implicit_hydrogens(atom.atomic_number, valence[index], atom.is_aromatic);
            }
        }
    }
}

fn ascii_str(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ethanol() {
        let molecule = parse("CCO").unwrap();
        assert_eq!(molecule.atoms.len(), 3);
        assert_eq!(molecule.bonds.len(), 2);
        assert_eq!(molecule.atoms[0].implicit_hydrogens, 3);
        assert_eq!(molecule.atoms[1].degree, 2);
        assert_eq!(molecule.atoms[2].symbol, "O");
        assert_eq!(molecule.atoms[2].implicit_hydrogens, 1);
    }

    #[test]
    fn test_parse_acetic_acid_branch() {
        let molecule = parse("CC(=O)O").unwrap();
        assert_eq!(molecule.atoms.len(), 4);
        assert_eq!(molecule.bonds.len(), 3);

        let doubles: Vec<_> = molecule
            .bonds
            .iter()
            .filter(|b| b.bond_order == BondOrder::Double)
            .collect();
        assert_eq!(doubles.len(), 1);
        assert_eq!(doubles[0].source_index, 1);
        assert_eq!(doubles[0].target_index, 2);
        // The last oxygen bonds back to the branch anchor
        assert_eq!(molecule.bonds[2].source_index, 1);
        assert_eq!(molecule.bonds[2].target_index, 3);
        assert_eq!(molecule.atoms[1].degree, 3);
    }

    #[test]
    fn test_parse_benzene_ring_closure() {
        let molecule = parse("c1ccccc1").unwrap();
        assert_eq!(molecule.atoms.len(), 6);
        assert_eq!(molecule.bonds.len(), 6);
        assert!(molecule.atoms.iter().all(|a| a.is_aromatic));
        assert!(molecule.atoms.iter().all(|a| a.implicit_hydrogens == 1));
        assert!(molecule
            .bonds
            .iter()
            .all(|b| b.bond_order == BondOrder::Aromatic && b.in_ring && b.conjugated));
    }

    #[test]
    fn test_cyclohexane_closure_bond_in_ring() {
        let molecule = parse("C1CCCCC1").unwrap();
        assert_eq!(molecule.bonds.len(), 6);
        let closure = molecule.bonds.last().unwrap();
        assert_eq!((closure.source_index, closure.target_index), (0, 5));
        assert!(closure.in_ring);
        assert_eq!(closure.bond_order, BondOrder::Single);
    }

    #[test]
    fn test_explicit_order_overrides_aromatic_default() {
        let molecule = parse("c1ccccc1-c1ccccc1").unwrap();
        let linker = molecule
            .bonds
            .iter()
            .find(|b| b.source_index == 5 && b.target_index == 6)
            .unwrap();
        assert_eq!(linker.bond_order, BondOrder::Single);
    }

    #[test]
    fn test_ring_bond_order_at_opening() {
        let molecule = parse("C=1CCCC1").unwrap();
        let closure = molecule.bonds.last().unwrap();
        assert_eq!(closure.bond_order, BondOrder::Double);
    }

    #[test]
    fn test_percent_ring_label() {
        let molecule = parse("C%12CCC%12").unwrap();
        assert_eq!(molecule.atoms.len(), 4);
        assert_eq!(molecule.bonds.len(), 4);
    }

    #[test]
    fn test_two_letter_symbols() {
        let molecule = parse("ClCBr").unwrap();
        let symbols: Vec<_> = molecule.atoms.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["Cl", "C", "Br"]);

        // N-methylpyrrole: "Cn" is carbon then aromatic nitrogen
        let molecule = parse("Cn1cccc1").unwrap();
        assert_eq!(molecule.atoms[0].symbol, "C");
        assert_eq!(molecule.atoms[1].symbol, "n");
        assert_eq!(molecule.atoms[1].atomic_number, 7);
    }

    #[test]
    fn test_bracket_atoms() {
        let molecule = parse("[NH4+]").unwrap();
        let atom = &molecule.atoms[0];
        assert_eq!(atom.atomic_number, 7);
        assert_eq!(atom.implicit_hydrogens, 4);
        assert_eq!(atom.charge, 1);

        let molecule = parse("[13CH3][O-]").unwrap();
        assert_eq!(molecule.atoms[0].implicit_hydrogens, 3);
        assert_eq!(molecule.atoms[1].charge, -1);
        assert_eq!(molecule.atoms[1].implicit_hydrogens, 0);

        let molecule = parse("[Fe++]").unwrap();
        assert_eq!(molecule.atoms[0].charge, 2);
        let molecule = parse("[Cu+2]").unwrap();
        assert_eq!(molecule.atoms[0].charge, 2);
        let molecule = parse("[O--]").unwrap();
        assert_eq!(molecule.atoms[0].charge, -2);
        let molecule = parse("[Fe2+]").unwrap();
        assert_eq!(molecule.atoms[0].charge, 2);
    }

    #[test]
    fn test_bracket_aromatic_hydrogen() {
        let molecule = parse("c1cc[nH]c1").unwrap();
        let nitrogen = &molecule.atoms[3];
        assert!(nitrogen.is_aromatic);
        assert_eq!(nitrogen.implicit_hydrogens, 1);
        assert_eq!(molecule.bonds.len(), 5);
    }

    #[test]
    fn test_chirality_is_skipped() {
        let molecule = parse("N[C@@H](C)C(=O)O").unwrap();
        assert_eq!(molecule.atoms.len(), 6);
        assert_eq!(molecule.atoms[1].implicit_hydrogens, 1);
    }

    #[test]
    fn test_disconnected_fragments_kept() {
        let molecule = parse("[Na+].[Cl-]").unwrap();
        assert_eq!(molecule.atoms.len(), 2);
        assert!(molecule.bonds.is_empty());
        assert_eq!(molecule.fragments().len(), 2);
    }

    #[test]
    fn test_directional_bonds_ignored() {
        let molecule = parse("F/C=C/F").unwrap();
        assert_eq!(molecule.atoms.len(), 4);
        assert_eq!(molecule.bonds.len(), 3);
        assert_eq!(molecule.bonds[1].bond_order, BondOrder::Double);
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(parse(""), Err(ParseError::EmptyInput));
        assert_eq!(parse("   "), Err(ParseError::EmptyInput));
        assert_eq!(
            parse("CC O"),
            Err(ParseError::InvalidCharacter { ch: ' ', position: 2 })
        );
        assert_eq!(parse("CC>>CO"), Err(ParseError::ReactionNotSupported));
        assert_eq!(
            parse("CC(C"),
            Err(ParseError::UnbalancedBrackets { position: 2 })
        );
        assert_eq!(
            parse("CC)C"),
            Err(ParseError::UnbalancedBrackets { position: 2 })
        );
        assert_eq!(
            parse("C]"),
            Err(ParseError::UnbalancedBrackets { position: 1 })
        );
    }

    #[test]
    fn test_too_long() {
        let parser = SmilesParser::new(4);
        assert_eq!(
            parser.parse("CCCCC"),
            Err(ParseError::TooLong { length: 5, max: 4 })
        );
        assert!(parser.parse("CCCC").is_ok());
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(
            parse("C1CC"),
            Err(ParseError::UnmatchedRingClosure { label: 1 })
        );
        assert_eq!(
            parse("C[CH3"),
            Err(ParseError::UnclosedBracket { position: 1 })
        );
        assert!(matches!(
            parse("CXC"),
            Err(ParseError::UnknownElement { position: 1, .. })
        ));
        assert!(matches!(
            parse("(C)C"),
            Err(ParseError::UnexpectedToken { token: '(', position: 0 })
        ));
        assert!(matches!(
            parse("CC="),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse("C$C"),
            Err(ParseError::UnexpectedToken { token: '$', .. })
        ));
    }

    #[test]
    fn test_charge_out_of_range() {
        assert_eq!(
            parse("[C-2147483648]"),
            Err(ParseError::InvalidCharge { position: 2 })
        );
        assert_eq!(
            parse("[C+99999999999]"),
            Err(ParseError::InvalidCharge { position: 2 })
        );
        assert_eq!(
            parse("C[N200+]"),
            Err(ParseError::InvalidCharge { position: 3 })
        );
        assert_eq!(parse("[Fe+3]").unwrap().atoms[0].charge, 3);
    }

    #[test]
    fn test_ring_closure_onto_existing_bond() {
        assert_eq!(
            parse("C1C1"),
            Err(ParseError::UnexpectedToken { token: '1', position: 3 })
        );
        assert_eq!(
            parse("C12CC12"),
            Err(ParseError::UnexpectedToken { token: '2', position: 6 })
        );
        assert_eq!(parse("C12CCC12").unwrap().bonds.len(), 5);
    }
}
