//! Bit grids: the raster footprint of one discrete key.

use serde::{Deserialize, Serialize};

/// A 2-D bit mask in grid cell space, row-major, `(0, 0)` at the
/// south-west corner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitGrid {
    width: usize,
    height: usize,
    bits: Vec<bool>,
}

impl BitGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width * height],
        }
    }

    /// Wrap an existing row-major mask. The mask length must be
    /// `width * height`; excess entries are ignored, missing ones read
    /// as unset.
    pub fn from_mask(width: usize, height: usize, mask: Vec<bool>) -> Self {
        let mut bits = mask;
        bits.resize(width * height, false);
        Self {
            width,
            height,
            bits,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.bits[y * self.width + x]
    }

    /// Signed-index variant; anything off-grid reads as unset.
    pub fn get_i(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        self.get(x as usize, y as usize)
    }

    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        if x < self.width && y < self.height {
            self.bits[y * self.width + x] = value;
        }
    }

    pub fn any(&self) -> bool {
        self.bits.iter().any(|&b| b)
    }

    pub fn count_set(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// OR another grid into this one. Grids must share dimensions.
    pub fn or_assign(&mut self, other: &BitGrid) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        for (dst, src) in self.bits.iter_mut().zip(&other.bits) {
            *dst |= *src;
        }
    }

    /// Cells set here but not in `other` (`self AND NOT other`).
    pub fn subtract(&self, other: &BitGrid) -> BitGrid {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        let bits = self
            .bits
            .iter()
            .zip(&other.bits)
            .map(|(&a, &b)| a && !b)
            .collect();
        BitGrid {
            width: self.width,
            height: self.height,
            bits,
        }
    }

    /// Iterate the coordinates of all set cells.
    pub fn iter_set(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b)
            .map(|(i, _)| (i % self.width, i / self.width))
    }

    /// Set every cell in the half-open rectangle `[x0, x1) × [y0, y1)`.
    pub fn fill_rect(&mut self, x0: usize, y0: usize, x1: usize, y1: usize) {
        for y in y0..y1.min(self.height) {
            for x in x0..x1.min(self.width) {
                self.bits[y * self.width + x] = true;
            }
        }
    }
}
