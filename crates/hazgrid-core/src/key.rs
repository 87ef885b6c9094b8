//! Discrete hazard keys.
//!
//! A discrete key encodes `phenomenon.significance[.subtype][:etn]`, e.g.
//! `FL.W` or `TO.W:1234`. Grid cells carry combined keys — one or more
//! discrete keys joined with `^` — or the `<None>` sentinel for empty
//! cells. Combined keys are kept in canonical (sorted) form so that cell
//! contents can be compared textually.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Sentinel cell value for "no hazard here".
pub const NONE_KEY: &str = "<None>";

/// Separator between keys sharing one cell.
pub const COMBINED_SEPARATOR: char = '^';

/// Error parsing a discrete key string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("malformed discrete key {0:?}: expected phen.sig[.subtype][:etn]")]
    Malformed(String),
    #[error("malformed etn in key {0:?}")]
    BadEtn(String),
}

/// A single hazard key: phenomenon, significance, optional subtype and ETN.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiscreteKey {
    pub phenomenon: String,
    pub significance: String,
    pub subtype: Option<String>,
    pub etn: Option<u32>,
}

impl DiscreteKey {
    pub fn new(phenomenon: &str, significance: &str) -> Self {
        Self {
            phenomenon: phenomenon.to_string(),
            significance: significance.to_string(),
            subtype: None,
            etn: None,
        }
    }

    pub fn with_subtype(mut self, subtype: &str) -> Self {
        self.subtype = Some(subtype.to_string());
        self
    }

    pub fn with_etn(mut self, etn: u32) -> Self {
        self.etn = Some(etn);
        self
    }

    /// The `phen.sig` pair, the unit of interoperability eligibility.
    pub fn phen_sig(&self) -> String {
        format!("{}.{}", self.phenomenon, self.significance)
    }
}

impl fmt::Display for DiscreteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.phenomenon, self.significance)?;
        if let Some(sub) = &self.subtype {
            write!(f, ".{sub}")?;
        }
        if let Some(etn) = self.etn {
            write!(f, ":{etn}")?;
        }
        Ok(())
    }
}

impl FromStr for DiscreteKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, etn) = match s.split_once(':') {
            Some((body, etn_str)) => {
                let etn = etn_str
                    .parse::<u32>()
                    .map_err(|_| KeyError::BadEtn(s.to_string()))?;
                (body, Some(etn))
            }
            None => (s, None),
        };
        let mut parts = body.splitn(3, '.');
        let phenomenon = parts.next().unwrap_or_default();
        let significance = parts.next().unwrap_or_default();
        if phenomenon.is_empty() || significance.is_empty() {
            return Err(KeyError::Malformed(s.to_string()));
        }
        Ok(DiscreteKey {
            phenomenon: phenomenon.to_string(),
            significance: significance.to_string(),
            subtype: parts.next().map(str::to_string),
            etn,
        })
    }
}

/// True if a cell value is the empty sentinel.
pub fn is_none_key(cell: &str) -> bool {
    cell.is_empty() || cell == NONE_KEY
}

/// Parse a combined cell value into its constituent keys.
///
/// The `<None>` sentinel parses to an empty list.
pub fn parse_combined(cell: &str) -> Result<Vec<DiscreteKey>, KeyError> {
    if is_none_key(cell) {
        return Ok(Vec::new());
    }
    cell.split(COMBINED_SEPARATOR).map(str::parse).collect()
}

/// Render keys as a canonical combined cell value (sorted, deduplicated).
pub fn format_combined(keys: &[DiscreteKey]) -> String {
    if keys.is_empty() {
        return NONE_KEY.to_string();
    }
    let mut sorted: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    sorted.sort();
    sorted.dedup();
    sorted.join(&COMBINED_SEPARATOR.to_string())
}

/// Canonicalize an arbitrary combined cell value.
pub fn canonical_combined(cell: &str) -> Result<String, KeyError> {
    Ok(format_combined(&parse_combined(cell)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_phen_sig() {
        let key: DiscreteKey = "FL.W".parse().unwrap();
        assert_eq!(key.phenomenon, "FL");
        assert_eq!(key.significance, "W");
        assert_eq!(key.subtype, None);
        assert_eq!(key.etn, None);
        assert_eq!(key.to_string(), "FL.W");
    }

    #[test]
    fn parse_with_subtype_and_etn() {
        let key: DiscreteKey = "SV.W.Convective:42".parse().unwrap();
        assert_eq!(key.subtype.as_deref(), Some("Convective"));
        assert_eq!(key.etn, Some(42));
        assert_eq!(key.to_string(), "SV.W.Convective:42");
        assert_eq!(key.phen_sig(), "SV.W");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("FL".parse::<DiscreteKey>().is_err());
        assert!("".parse::<DiscreteKey>().is_err());
        assert!("FL.W:abc".parse::<DiscreteKey>().is_err());
    }

    #[test]
    fn combined_round_trip() {
        let keys = parse_combined("WS.W^FL.W").unwrap();
        assert_eq!(keys.len(), 2);
        // Canonical form is sorted.
        assert_eq!(format_combined(&keys), "FL.W^WS.W");
    }

    #[test]
    fn none_sentinel() {
        assert!(parse_combined(NONE_KEY).unwrap().is_empty());
        assert_eq!(format_combined(&[]), NONE_KEY);
        assert!(is_none_key(""));
    }

    #[test]
    fn canonicalize_deduplicates() {
        assert_eq!(canonical_combined("FL.W^FL.W").unwrap(), "FL.W");
    }
}
