//! Grid georeferencing.
//!
//! A `GridLocation` describes a regular lon/lat grid: lower-left origin,
//! extent in degrees, and cell counts. Cell (0, 0) is the south-west
//! corner; x grows east, y grows north. The affine transform between
//! geographic coordinates and cell space is the only "projection" the
//! engine performs itself; anything fancier is the grid subsystem's
//! problem.

use geo::Coord;
use serde::{Deserialize, Serialize};

use hazgrid_core::config::SiteGridConfig;
use hazgrid_core::{ParmId, TimeConstraints};

/// Spatial reference of a forecast grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLocation {
    pub nx: usize,
    pub ny: usize,
    /// Geographic coordinate of the grid's lower-left corner.
    pub origin: Coord<f64>,
    /// Width/height of the grid in degrees.
    pub extent: Coord<f64>,
}

impl GridLocation {
    pub fn new(nx: usize, ny: usize, origin: Coord<f64>, extent: Coord<f64>) -> Self {
        Self {
            nx,
            ny,
            origin,
            extent,
        }
    }

    pub fn cell_width(&self) -> f64 {
        self.extent.x / self.nx as f64
    }

    pub fn cell_height(&self) -> f64 {
        self.extent.y / self.ny as f64
    }

    /// Area of one cell in square degrees.
    pub fn cell_area(&self) -> f64 {
        self.cell_width() * self.cell_height()
    }

    /// Geographic coordinate of grid vertex (x, y); x in `0..=nx`,
    /// y in `0..=ny`.
    pub fn vertex(&self, x: i64, y: i64) -> Coord<f64> {
        Coord {
            x: self.origin.x + x as f64 * self.cell_width(),
            y: self.origin.y + y as f64 * self.cell_height(),
        }
    }

    /// Geographic coordinate of the center of cell (x, y).
    pub fn cell_center(&self, x: usize, y: usize) -> Coord<f64> {
        Coord {
            x: self.origin.x + (x as f64 + 0.5) * self.cell_width(),
            y: self.origin.y + (y as f64 + 0.5) * self.cell_height(),
        }
    }

    /// The cell containing a geographic coordinate, if inside the grid.
    pub fn cell_containing(&self, coord: Coord<f64>) -> Option<(usize, usize)> {
        let fx = (coord.x - self.origin.x) / self.cell_width();
        let fy = (coord.y - self.origin.y) / self.cell_height();
        if fx < 0.0 || fy < 0.0 {
            return None;
        }
        let (x, y) = (fx as usize, fy as usize);
        (x < self.nx && y < self.ny).then_some((x, y))
    }

    /// Inclusive cell index bounds covering a geographic bounding box,
    /// clamped to the grid. None if the box misses the grid entirely.
    pub fn cell_bounds(&self, min: Coord<f64>, max: Coord<f64>) -> Option<(usize, usize, usize, usize)> {
        let x0 = (min.x - self.origin.x) / self.cell_width();
        let y0 = (min.y - self.origin.y) / self.cell_height();
        let x1 = (max.x - self.origin.x) / self.cell_width();
        let y1 = (max.y - self.origin.y) / self.cell_height();
        if x1 < 0.0 || y1 < 0.0 || x0 >= self.nx as f64 || y0 >= self.ny as f64 {
            return None;
        }
        let clamp = |v: f64, hi: usize| (v.max(0.0) as usize).min(hi - 1);
        Some((
            clamp(x0, self.nx),
            clamp(y0, self.ny),
            clamp(x1, self.nx),
            clamp(y1, self.ny),
        ))
    }
}

/// Everything the engine needs to know about one site's hazard grid:
/// identity, spatial reference, and time quantization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridParmInfo {
    pub parm_id: ParmId,
    pub location: GridLocation,
    pub time_constraints: TimeConstraints,
}

impl GridParmInfo {
    /// Build parm info from a site's configuration entry.
    pub fn from_site_config(site: &SiteGridConfig, mode: &str) -> Self {
        Self {
            parm_id: ParmId::new(&site.parm, &site.id, mode),
            location: GridLocation::new(
                site.nx,
                site.ny,
                Coord {
                    x: site.origin_lon,
                    y: site.origin_lat,
                },
                Coord {
                    x: site.extent_lon,
                    y: site.extent_lat,
                },
            ),
            time_constraints: site.time_constraints(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc_10x10() -> GridLocation {
        // 10x10 cells over a 10x10 degree box anchored at (0, 0):
        // one cell per degree.
        GridLocation::new(
            10,
            10,
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
        )
    }

    #[test]
    fn cell_metrics() {
        let loc = loc_10x10();
        assert_eq!(loc.cell_width(), 1.0);
        assert_eq!(loc.cell_height(), 1.0);
        assert_eq!(loc.cell_area(), 1.0);
    }

    #[test]
    fn center_and_containing_agree() {
        let loc = loc_10x10();
        let center = loc.cell_center(3, 7);
        assert_eq!(center, Coord { x: 3.5, y: 7.5 });
        assert_eq!(loc.cell_containing(center), Some((3, 7)));
    }

    #[test]
    fn containing_rejects_outside() {
        let loc = loc_10x10();
        assert_eq!(loc.cell_containing(Coord { x: -0.1, y: 5.0 }), None);
        assert_eq!(loc.cell_containing(Coord { x: 10.1, y: 5.0 }), None);
    }

    #[test]
    fn bounds_clamped_to_grid() {
        let loc = loc_10x10();
        let bounds = loc.cell_bounds(Coord { x: -5.0, y: 8.5 }, Coord { x: 2.5, y: 50.0 });
        assert_eq!(bounds, Some((0, 8, 2, 9)));
        assert_eq!(
            loc.cell_bounds(Coord { x: 20.0, y: 20.0 }, Coord { x: 30.0, y: 30.0 }),
            None
        );
    }
}
