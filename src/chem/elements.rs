//! Periodic table lookup used by the parsers and the feature encoder.

/// Per-element constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub symbol: &'static str,
    pub atomic_number: u8,
    /// Standard atomic weight in daltons
    pub mass: f32,
    /// Pauling electronegativity, 0 when undefined
    pub electronegativity: f32,
    /// Van der Waals radius in angstroms
    pub vdw_radius: f32,
}

const fn el(
    symbol: &'static str,
    atomic_number: u8,
    mass: f32,
    electronegativity: f32,
    vdw_radius: f32,
) -> Element {
    Element {
        symbol,
        atomic_number,
        mass,
        electronegativity,
        vdw_radius,
    }
}

static ELEMENTS: &[Element] = &[
    el("H", 1, 1.008, 2.20, 1.20),
    el("He", 2, 4.0026, 0.0, 1.40),
    el("Li", 3, 6.94, 0.98, 1.82),
    el("Be", 4, 9.0122, 1.57, 1.53),
    el("B", 5, 10.81, 2.04, 1.92),
    el("C", 6, 12.011, 2.55, 1.70),
    el("N", 7, 14.007, 3.04, 1.55),
    el("O", 8, 15.999, 3.44, 1.52),
    el("F", 9, 18.998, 3.98, 1.47),
    el("Ne", 10, 20.180, 0.0, 1.54),
    el("Na", 11, 22.990, 0.93, 2.27),
    el("Mg", 12, 24.305, 1.31, 1.73),
    el("Al", 13, 26.982, 1.61, 1.84),
    el("Si", 14, 28.085, 1.90, 2.10),
    el("P", 15, 30.974, 2.19, 1.80),
    el("S", 16, 32.06, 2.58, 1.80),
    el("Cl", 17, 35.45, 3.16, 1.75),
    el("Ar", 18, 39.948, 0.0, 1.88),
    el("K", 19, 39.098, 0.82, 2.75),
    el("Ca", 20, 40.078, 1.00, 2.31),
    el("Sc", 21, 44.956, 1.36, 2.11),
    el("Ti", 22, 47.867, 1.54, 2.00),
    el("V", 23, 50.942, 1.63, 2.00),
    el("Cr", 24, 51.996, 1.66, 2.00),
    el("Mn", 25, 54.938, 1.55, 2.00),
    el("Fe", 26, 55.845, 1.83, 2.00),
    el("Co", 27, 58.933, 1.88, 2.00),
    el("Ni", 28, 58.693, 1.91, 1.63),
    el("Cu", 29, 63.546, 1.90, 1.40),
    el("Zn", 30, 65.38, 1.65, 1.39),
    el("Ga", 31, 69.723, 1.81, 1.87),
    el("Ge", 32, 72.630, 2.01, 2.11),
    el("As", 33, 74.922, 2.18, 1.85),
    el("Se", 34, 78.971, 2.55, 1.90),
    el("Br", 35, 79.904, 2.96, 1.85),
    el("Kr", 36, 83.798, 3.00, 2.02),
    el("Rb", 37, 85.468, 0.82, 3.03),
    el("Sr", 38, 87.62, 0.95, 2.49),
    el("Y", 39, 88.906, 1.22, 2.00),
    el("Zr", 40, 91.224, 1.33, 2.00),
    el("Nb", 41, 92.906, 1.60, 2.00),
    el("Mo", 42, 95.95, 2.16, 2.00),
    el("Tc", 43, 98.0, 1.90, 2.00),
    el("Ru", 44, 101.07, 2.20, 2.00),
    el("Rh", 45, 102.91, 2.28, 2.00),
    el("Pd", 46, 106.42, 2.20, 1.63),
    el("Ag", 47, 107.87, 1.93, 1.72),
    el("Cd", 48, 112.41, 1.69, 1.58),
    el("In", 49, 114.82, 1.78, 1.93),
    el("Sn", 50, 118.71, 1.96, 2.17),
    el("Sb", 51, 121.76, 2.05, 2.06),
    el("Te", 52, 127.60, 2.10, 2.06),
    el("I", 53, 126.90, 2.66, 1.98),
    el("Xe", 54, 131.29, 2.60, 2.16),
    el("Cs", 55, 132.91, 0.79, 3.43),
    el("Ba", 56, 137.33, 0.89, 2.68),
    el("Gd", 64, 157.25, 1.20, 2.00),
    el("Pt", 78, 195.08, 2.28, 1.75),
    el("Au", 79, 196.97, 2.54, 1.66),
    el("Hg", 80, 200.59, 2.00, 1.55),
    el("Tl", 81, 204.38, 1.62, 1.96),
    el("Pb", 82, 207.2, 2.33, 2.02),
    el("Bi", 83, 208.98, 2.02, 2.07),
];

/// Carbon, used wherever an element is unknown
pub const CARBON: Element = el("C", 6, 12.011, 2.55, 1.70);

/// Symbols allowed outside brackets
const ORGANIC_SUBSET: &[&str] = &["B", "C", "N", "O", "P", "S", "F", "Cl", "Br", "I"];

/// Aromatic symbols allowed outside brackets
const AROMATIC_ORGANIC: &[&str] = &["b", "c", "n", "o", "p", "s"];

/// Aromatic symbols allowed inside brackets
const AROMATIC_BRACKET: &[&str] = &["b", "c", "n", "o", "p", "s", "se", "as", "te"];

/// Look up an element by its capitalized symbol
pub fn by_symbol(symbol: &str) -> Option<&'static Element> {
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

/// Look up an element by atomic number
pub fn by_atomic_number(atomic_number: u8) -> Option<&'static Element> {
    ELEMENTS.iter().find(|e| e.atomic_number == atomic_number)
}

/// Resolve a symbol written outside brackets, returning the element and aromaticity
pub fn organic(symbol: &str) -> Option<(&'static Element, bool)> {
    if ORGANIC_SUBSET.contains(&symbol) {
        return by_symbol(symbol).map(|e| (e, false));
    }
    if AROMATIC_ORGANIC.contains(&symbol) {
        return by_symbol(&capitalize(symbol)).map(|e| (e, true));
    }
    None
}

/// Resolve a symbol written inside brackets, returning the element and aromaticity
pub fn bracket(symbol: &str) -> Option<(&'static Element, bool)> {
    if AROMATIC_BRACKET.contains(&symbol) {
        return by_symbol(&capitalize(symbol)).map(|e| (e, true));
    }
    by_symbol(symbol).map(|e| (e, false))
}

/// Mass for an atomic number, carbon mass when unknown
pub fn mass_or_carbon(atomic_number: u8) -> f32 {
    by_atomic_number(atomic_number).map_or(CARBON.mass, |e| e.mass)
}

/// Allowed valences for organic-subset atoms, lowest first
pub fn default_valences(atomic_number: u8) -> &'static [u8] {
    match atomic_number {
        5 => &[3],
        6 => &[4],
        7 => &[3, 5],
        8 => &[2],
        15 => &[3, 5],
        16 => &[2, 4, 6],
        9 | 17 | 35 | 53 => &[1],
        _ => &[],
    }
}

/// Implicit hydrogens from the lowest default valence that fits the explicit valence.
///
/// Aromatic bonds count as 1 in `explicit_valence`; an aromatic atom gives one more
/// electron to the ring.
pub fn implicit_hydrogens(atomic_number: u8, explicit_valence: u32, aromatic: bool) -> u8 {
    let pi = u32::from(aromatic);
    default_valences(atomic_number)
        .iter()
        .map(|&v| u32::from(v))
        .find(|&v| v >= explicit_valence)
        .map_or(0, |v| v.saturating_sub(explicit_valence + pi) as u8)
}

fn capitalize(symbol: &str) -> String {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
