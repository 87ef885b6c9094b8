use std::path::Path;

use hazgrid_core::HazGridConfig;

pub fn validate(path: &str) -> anyhow::Result<()> {
    let config = HazGridConfig::from_file(Path::new(path))?;
    println!(
        "✓ {path} is valid: {} allowed hazard type(s), {} site(s)",
        config.interop.allowed.len(),
        config.sites.len()
    );
    for site in &config.sites {
        println!(
            "  {} — {} {}x{} @ ({}, {}), quantum {}s",
            site.id,
            site.parm,
            site.nx,
            site.ny,
            site.origin_lon,
            site.origin_lat,
            site.quantum_secs
        );
    }
    Ok(())
}
