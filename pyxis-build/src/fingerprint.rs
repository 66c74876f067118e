//! Module fingerprints

use crate::options::Options;
use pyxis_syntax::ContentHasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA-256 over a module's source and the options that affect its analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(source: &str, options: &Options) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.write_field(b'S', source);
        for (flag, value) in options.fingerprint_flags() {
            hasher.write_field(b'F', flag);
            hasher.write_str(&value);
        }
        Fingerprint(hasher.finalize())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0[..self.0.len().min(12)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::FollowImports;

    #[test]
    fn test_fingerprint_tracks_source_and_flags() {
        let options = Options::default();
        let base = Fingerprint::compute("x = 1\n", &options);
        assert_eq!(base, Fingerprint::compute("x = 1\n", &options));
        assert_eq!(base.as_str().len(), 64);
        assert_ne!(base, Fingerprint::compute("x = 2\n", &options));

        let mut other = options.clone();
        other.follow_imports = FollowImports::Skip;
        assert_ne!(base, Fingerprint::compute("x = 1\n", &other));

        let mut budget = options.clone();
        budget.extra_pass_budget = 10;
        assert_ne!(base, Fingerprint::compute("x = 1\n", &budget));

        let mut cosmetic = options;
        cosmetic.show_column_numbers = true;
        cosmetic.jobs = 4;
        assert_eq!(base, Fingerprint::compute("x = 1\n", &cosmetic));
    }
}
