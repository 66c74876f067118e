//! Method resolution order (C3 linearization)

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MroError {
    #[error("Cannot determine consistent method resolution order (MRO) for \"{class}\"")]
    Inconsistent { class: String },
}

/// Linearize `class` given its direct bases (in declaration order) and the
/// MRO of each base
pub fn linearize(class: &str, bases: &[String], base_mros: &[Vec<String>]) -> Result<Vec<String>, MroError> {
    let mut sequences: Vec<Vec<String>> = base_mros.iter().filter(|m| !m.is_empty()).cloned().collect();
    sequences.push(bases.to_vec());

    let mut result = vec![class.to_string()];
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }
        let head = sequences
            .iter()
            .map(|s| &s[0])
            .find(|candidate| !sequences.iter().any(|s| s[1..].contains(candidate)))
            .cloned();
        let Some(head) = head else {
            return Err(MroError::Inconsistent {
                class: class.to_string(),
            });
        };
        for seq in sequences.iter_mut() {
            if seq[0] == head {
                seq.remove(0);
            }
        }
        result.push(head);
    }
}

/// Depth-first, duplicates removed; used when C3 fails so analysis can go on
pub fn fallback(class: &str, base_mros: &[Vec<String>]) -> Vec<String> {
    let mut result = vec![class.to_string()];
    for entry in base_mros.iter().flatten() {
        if !result.contains(entry) {
            result.push(entry.clone());
        }
    }
    result
}
