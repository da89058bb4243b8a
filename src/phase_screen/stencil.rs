use super::Axis;

/// Conditioning points of the phase screen extrusion
///
/// The stencil coordinates are given as `(offset,along)` pairs where `offset` is the distance,
/// in lines, from the screen edge the new line is added to and `along` the position along the line.
/// The stencil is logarithmically decimated away from the edge:
/// the line at offset `2^(n-1)` (`0` for `n=0`) keeps `2^(max_n-n)+1` evenly spaced points.
/// One more point per stencil size factor is taken at offset `k*mx_size-1` in the middle of the line.
#[derive(Debug, Clone, PartialEq)]
pub struct Stencil {
    size: usize,
    coords: Vec<[usize; 2]>,
}
impl Stencil {
    pub fn new(stencil_size: usize, mx_size: usize, factor: usize) -> Self {
        let mut grid = vec![false; stencil_size * stencil_size];
        let mut set = |offset: usize, along: usize| {
            if offset < stencil_size && along < stencil_size {
                grid[offset * stencil_size + along] = true;
            }
        };
        let max_n = (stencil_size as f64).log2().floor() as u32;
        for n in 0..=max_n {
            let offset = if n == 0 { 0 } else { 1usize << (n - 1) };
            let n_points = (1usize << (max_n - n)) + 1;
            let step = (stencil_size - 1) as f64 / (n_points - 1) as f64;
            for k in 0..n_points {
                set(offset, (k as f64 * step).round() as usize);
            }
        }
        for k in 1..=factor {
            set(k * mx_size - 1, stencil_size / 2);
        }
        let coords = grid
            .into_iter()
            .enumerate()
            .filter(|(_, g)| *g)
            .map(|(k, _)| [k / stencil_size, k % stencil_size])
            .collect();
        Self {
            size: stencil_size,
            coords,
        }
    }
    /// Number of stencil points
    pub fn len(&self) -> usize {
        self.coords.len()
    }
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
    /// Stencil `(offset,along)` coordinates for a new line added before the first line
    pub fn head(&self) -> &[[usize; 2]] {
        &self.coords
    }
    /// Stencil `(offset,along)` coordinates for a new line added after the last line
    ///
    /// The tail stencil is the point reflection of the head stencil through the screen center.
    pub fn tail(&self) -> impl Iterator<Item = [usize; 2]> + '_ {
        let n = self.size - 1;
        self.coords.iter().map(move |[o, a]| [n - o, n - a])
    }
    /// Stencil coordinates followed by the coordinates of the new line at offset -1
    pub fn positions(&self) -> Vec<[i64; 2]> {
        self.coords
            .iter()
            .map(|[o, a]| [*o as i64, *a as i64])
            .chain((0..self.size as i64).map(|a| [-1, a]))
            .collect()
    }
    /// Maps `(offset,along)` stencil coordinates to `(row,column)` screen coordinates
    #[inline]
    pub fn to_screen(axis: Axis, [offset, along]: [usize; 2]) -> (usize, usize) {
        match axis {
            Axis::Row => (offset, along),
            Axis::Column => (along, offset),
        }
    }
}
