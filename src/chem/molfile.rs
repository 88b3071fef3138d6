//! V2000 MOL block reader
//!
//! Reads the counts line, atom block, bond block and `M  CHG` charge
//! properties. Coordinates are ignored.

use crate::chem::elements;
use crate::error::ParseError;
use crate::types::{Atom, Bond, BondOrder, ParsedMolecule};

const HEADER_LINES: usize = 3;

/// Parse a V2000 MOL block into atoms and bonds
pub fn parse_mol_block(text: &str) -> Result<ParsedMolecule, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let lines: Vec<&str> = text.lines().collect();
    let counts_line = lines.get(HEADER_LINES).ok_or_else(|| ParseError::MolBlock {
        line: lines.len() + 1,
        reason: "missing counts line".to_string(),
    })?;
    if counts_line.contains("V3000") {
        return Err(ParseError::MolBlock {
            line: HEADER_LINES + 1,
            reason: "V3000 connection tables are not supported".to_string(),
        });
    }

    let atom_count = parse_count(counts_line, 0, HEADER_LINES + 1, "atom count")?;
    let bond_count = parse_count(counts_line, 3, HEADER_LINES + 1, "bond count")?;

    let atom_start = HEADER_LINES + 1;
    let bond_start = atom_start + atom_count;
    let props_start = bond_start + bond_count;
    if lines.len() < props_start {
        return Err(ParseError::MolBlock {
            line: lines.len() + 1,
            reason: format!(
                "expected {} atom and {} bond lines",
                atom_count, bond_count
            ),
        });
    }

    let mut atoms = Vec::with_capacity(atom_count);
    for (offset, line) in lines[atom_start..bond_start].iter().enumerate() {
        atoms.push(parse_atom_line(line, atom_start + offset + 1)?);
    }

    let mut bonds = Vec::with_capacity(bond_count);
    for (offset, line) in lines[bond_start..props_start].iter().enumerate() {
        let line_no = bond_start + offset + 1;
        let bond = parse_bond_line(line, line_no, atom_count)?;
        atoms[bond.source_index].degree = atoms[bond.source_index].degree.saturating_add(1);
        atoms[bond.target_index].degree = atoms[bond.target_index].degree.saturating_add(1);
        if bond.bond_order == BondOrder::Aromatic {
            atoms[bond.source_index].is_aromatic = true;
            atoms[bond.target_index].is_aromatic = true;
        }
        bonds.push(bond);
    }

    for (offset, line) in lines[props_start..].iter().enumerate() {
        let line_no = props_start + offset + 1;
        if line.starts_with("M  END") {
            break;
        }
        if line.starts_with("M  CHG") {
            apply_charges(line, line_no, &mut atoms)?;
        }
    }

    let mut valence = vec![0u32; atoms.len()];
    for bond in &bonds {
        let v = bond.bond_order.explicit_valence();
        valence[bond.source_index] += v;
        valence[bond.target_index] += v;
    }
    for (atom, used) in atoms.iter_mut().zip(valence) {
        if atom.charge == 0 {
            atom.implicit_hydrogens =
                elements::implicit_hydrogens(atom.atomic_number, used, atom.is_aromatic);
        }
    }

    Ok(ParsedMolecule { atoms, bonds })
}

/// Trimmed fixed-width column, empty when the line is short
fn field(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    if start >= end {
        return "";
    }
    line.get(start..end).map_or("", str::trim)
}

fn parse_count(line: &str, start: usize, line_no: usize, what: &str) -> Result<usize, ParseError> {
    field(line, start, start + 3)
        .parse()
        .map_err(|_| ParseError::MolBlock {
            line: line_no,
            reason: format!("invalid {}", what),
        })
}

fn parse_atom_line(line: &str, line_no: usize) -> Result<Atom, ParseError> {
    let symbol = field(line, 31, 34);
    if symbol.is_empty() {
        return Err(ParseError::MolBlock {
            line: line_no,
            reason: "missing atom symbol".to_string(),
        });
    }

    let atomic_number = elements::by_symbol(symbol).map_or(0, |e| e.atomic_number);
    let charge = match field(line, 36, 39) {
        "1" => 3,
        "2" => 2,
        "3" => 1,
        "5" => -1,
        "6" => -2,
        "7" => -3,
        _ => 0,
    };

    Ok(Atom {
        symbol: symbol.to_string(),
        atomic_number,
        is_aromatic: false,
        charge,
        implicit_hydrogens: 0,
        degree: 0,
    })
}

fn parse_bond_line(line: &str, line_no: usize, atom_count: usize) -> Result<Bond, ParseError> {
    let index = |start: usize| -> Result<usize, ParseError> {
        let raw: usize = field(line, start, start + 3).parse().map_err(|_| ParseError::MolBlock {
            line: line_no,
            reason: "invalid bond atom index".to_string(),
        })?;
        if raw == 0 || raw > atom_count {
            return Err(ParseError::MolBlock {
                line: line_no,
                reason: format!("bond atom {} outside 1..={}", raw, atom_count),
            });
        }
        Ok(raw - 1)
    };

    let source_index = index(0)?;
    let target_index = index(3)?;
    let bond_order = match field(line, 6, 9) {
        "1" => BondOrder::Single,
        "2" => BondOrder::Double,
        "3" => BondOrder::Triple,
        "4" => BondOrder::Aromatic,
        other => {
            return Err(ParseError::MolBlock {
                line: line_no,
                reason: format!("unsupported bond type '{}'", other),
            })
        }
    };
    let aromatic = bond_order == BondOrder::Aromatic;

    Ok(Bond {
        source_index,
        target_index,
        bond_order,
        in_ring: aromatic,
        conjugated: aromatic,
    })
}

fn apply_charges(line: &str, line_no: usize, atoms: &mut [Atom]) -> Result<(), ParseError> {
    let invalid = || ParseError::MolBlock {
        line: line_no,
        reason: "malformed M  CHG property".to_string(),
    };

    let tokens: Vec<&str> = line.split_whitespace().skip(2).collect();
    let (count, pairs) = tokens.split_first().ok_or_else(invalid)?;
    let count: usize = count.parse().map_err(|_| invalid())?;
    if count > pairs.len() / 2 {
        return Err(invalid());
    }

    for pair in pairs.chunks(2).take(count) {
        let atom: usize = pair[0].parse().map_err(|_| invalid())?;
        let charge: i8 = pair[1].parse().map_err(|_| invalid())?;
        let target = atom
            .checked_sub(1)
            .and_then(|i| atoms.get_mut(i))
            .ok_or_else(invalid)?;
        target.charge = charge;
    }
    Ok(())
}
