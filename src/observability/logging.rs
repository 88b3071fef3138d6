//! Log-safe rendering of molecule notations

/// Longest notation prefix written to logs
pub const MAX_LOGGED_SMILES: usize = 64;

/// Truncate a notation for logging, keeping whole characters
pub fn loggable_smiles(smiles: &str) -> String {
    let trimmed = smiles.trim();
    if trimmed.chars().count() <= MAX_LOGGED_SMILES {
        return trimmed.to_string();
    }
    let mut shortened: String = trimmed.chars().take(MAX_LOGGED_SMILES - 3).collect();
    shortened.push_str("...");
    shortened
}
