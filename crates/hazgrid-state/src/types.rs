//! The interoperability record: the join between a hazard event and the
//! grid region it was last synchronized with.

use serde::{Deserialize, Serialize};

use hazgrid_core::{EventId, ParmId, SiteId, TimeRange};

/// One hazard↔grid correspondence.
///
/// Identity is either `(site, phen, sig, event_id, time range)` or
/// `(site, phen, sig, event_id, etn)`; at most one record exists per
/// identity. The payload records the parm and geometry that were last
/// synchronized, and is the single source of truth for "has this pairing
/// already been reconciled".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteropRecord {
    pub site: SiteId,
    pub phenomenon: String,
    pub significance: String,
    pub event_id: EventId,
    /// Event tracking number; present on ETN-keyed records only.
    pub etn: Option<u32>,
    pub time_range: TimeRange,
    pub parm_id: ParmId,
    /// Geometry as of the last synchronization, geographic coordinates.
    pub geometry: geo::Geometry<f64>,
}

impl InteropRecord {
    /// The `{site}/{phen}.{sig}/` scan prefix shared by both key forms.
    pub fn key_prefix(site: &str, phenomenon: &str, significance: &str) -> String {
        format!("{site}/{phenomenon}.{significance}/")
    }

    /// Build the composite key for the records table.
    pub fn table_key(&self) -> String {
        let prefix = Self::key_prefix(&self.site, &self.phenomenon, &self.significance);
        match self.etn {
            Some(etn) => format!("{prefix}{}/etn-{etn}", self.event_id),
            None => format!(
                "{prefix}{}/{}",
                self.event_id,
                self.time_range.key_fragment()
            ),
        }
    }
}
