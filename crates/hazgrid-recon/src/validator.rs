//! Grid conversion eligibility.

use std::collections::HashSet;

use hazgrid_core::DiscreteKey;
use hazgrid_core::config::InteropConfig;

/// Allow-list gate deciding which hazard types participate in grid
/// interoperability at all. Pure predicate, no state beyond the list.
#[derive(Debug, Clone)]
pub struct GridValidator {
    allowed: HashSet<String>,
}

impl GridValidator {
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn from_config(config: &InteropConfig) -> Self {
        Self::new(config.allowed.iter().cloned())
    }

    /// If false, no grid conversion may be attempted for this hazard type.
    pub fn needs_grid_conversion(&self, key: &DiscreteKey) -> bool {
        self.allowed.contains(&key.phen_sig())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_gates_by_phen_sig() {
        let validator = GridValidator::new(vec!["FL.W".to_string(), "WS.W".to_string()]);
        assert!(validator.needs_grid_conversion(&DiscreteKey::new("FL", "W")));
        assert!(!validator.needs_grid_conversion(&DiscreteKey::new("TO", "W")));
        // Subtype and ETN do not affect eligibility.
        let key = DiscreteKey::new("WS", "W").with_subtype("Blizzard").with_etn(5);
        assert!(validator.needs_grid_conversion(&key));
    }

    #[test]
    fn empty_list_rejects_everything() {
        let validator = GridValidator::new(Vec::new());
        assert!(!validator.needs_grid_conversion(&DiscreteKey::new("FL", "W")));
    }
}
