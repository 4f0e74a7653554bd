//! Outward square-spiral coordinate traversal.

/// Lazy iterator over (dx, dz) offsets tracing an outward square spiral
/// from the origin.
///
/// A scanner built with edge length `side` emits exactly `side²` offsets,
/// covering the centered `side × side` footprint once each, nearest rings
/// first. Not restartable mid-sequence; build a fresh scanner for every
/// scan pass.
#[derive(Debug)]
pub struct SpiralScanner {
    x: i32,
    z: i32,
    dx: i32,
    dz: i32,
    remaining: u64,
}

impl SpiralScanner {
    /// Creates a scanner covering a `side × side` footprint.
    #[must_use]
    pub fn new(side: u32) -> Self {
        Self {
            x: 0,
            z: 0,
            dx: 0,
            dz: -1,
            remaining: u64::from(side) * u64::from(side),
        }
    }
}

impl Iterator for SpiralScanner {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let out = (self.x, self.z);

        // Corner rule: rotate the direction 90 degrees at ring boundaries.
        if self.x == self.z
            || (self.x < 0 && self.x == -self.z)
            || (self.x > 0 && self.x == 1 - self.z)
        {
            let (dx, dz) = (self.dx, self.dz);
            self.dx = -dz;
            self.dz = dx;
        }

        self.x += self.dx;
        self.z += self.dz;

        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}
