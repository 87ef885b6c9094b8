//! hazgrid.toml configuration parser.
//!
//! Carries the grid-interoperability allow-list and per-site grid
//! parameter descriptions. Everything here is read-only after load;
//! consumers receive it by value or reference, never through a global.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::time::TimeConstraints;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazGridConfig {
    pub interop: InteropConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteGridConfig>,
}

/// Which hazard types participate in grid interoperability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteropConfig {
    /// Allow-list of `phen.sig` strings, e.g. `["FL.W", "WS.W"]`.
    pub allowed: Vec<String>,
    /// Grid database type used when resolving parm info ("Fcst" or "Prac").
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "Fcst".to_string()
}

/// Grid geometry and time quantization for one site's hazard parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteGridConfig {
    /// Site identifier, e.g. "OAX".
    pub id: String,
    /// Parameter name (default "Hazards").
    #[serde(default = "default_parm")]
    pub parm: String,
    /// Grid columns.
    pub nx: usize,
    /// Grid rows.
    pub ny: usize,
    /// Longitude of the grid's lower-left corner, degrees.
    pub origin_lon: f64,
    /// Latitude of the grid's lower-left corner, degrees.
    pub origin_lat: f64,
    /// Grid width in degrees of longitude.
    pub extent_lon: f64,
    /// Grid height in degrees of latitude.
    pub extent_lat: f64,
    /// Storage time quantum in seconds (default one hour).
    #[serde(default = "default_quantum")]
    pub quantum_secs: i64,
}

fn default_parm() -> String {
    "Hazards".to_string()
}

fn default_quantum() -> i64 {
    3600
}

impl SiteGridConfig {
    pub fn time_constraints(&self) -> TimeConstraints {
        TimeConstraints {
            duration: self.quantum_secs,
            repeat: self.quantum_secs,
            start_offset: 0,
        }
    }
}

impl HazGridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HazGridConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: HazGridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for site in &self.sites {
            if site.nx == 0 || site.ny == 0 {
                anyhow::bail!("site {}: grid dimensions must be non-zero", site.id);
            }
            if site.extent_lon <= 0.0 || site.extent_lat <= 0.0 {
                anyhow::bail!("site {}: grid extent must be positive", site.id);
            }
            if site.quantum_secs <= 0 {
                anyhow::bail!("site {}: time quantum must be positive", site.id);
            }
        }
        let mut ids: Vec<&str> = self.sites.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.sites.len() {
            anyhow::bail!("duplicate site ids in configuration");
        }
        Ok(())
    }
}
