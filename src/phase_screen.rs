//! # Infinite phase screen
//!
//! Von Kármán turbulence phase screen that can be extruded indefinitely along both axes.
//!
//! New lines are drawn from the Gaussian distribution of the phase conditioned on a sparse
//! set of existing pixels (the [Stencil]):
//! `x = A z + B w` where `z` are the stencil values and `w` white noise.
//! The screen is stored in a fixed size ring buffer: adding a line overwrites the line
//! at the opposite edge of the screen.
//!
//! ```
//! use rsao::{Builder, FromBuilder, InfinitePhaseScreen, phase_screen::Axis};
//!
//! let mut screen = InfinitePhaseScreen::builder().size(32).build().unwrap();
//! let first = screen.get(0, 0);
//! screen.add_line(Axis::Row, false);
//! assert_eq!(screen.get(1, 0), first);
//! ```

use nalgebra::DVector;
use rand::{rngs::StdRng, Rng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::{utilities::Mat, FromBuilder};

mod builder;
mod covariance;
mod fourier;
mod stencil;

pub use builder::InfinitePhaseScreenBuilder;
pub use covariance::{ab_from_positions, phase_covariance};
pub use fourier::ft_phase_screen;
pub use stencil::Stencil;

#[derive(Debug, thiserror::Error)]
pub enum PhaseScreenError {
    #[error("phase screen size must be at least 2, found {0}")]
    Size(usize),
    #[error("invalid phase screen {0}: {1}")]
    Parameter(&'static str, f64),
    #[error("the stencil covariance matrix is singular")]
    SingularCovariance,
    #[error("the conditional covariance decomposition is not finite")]
    NonFinite,
    #[error("a {rows}x{cols} window does not fit in a {max}px phase screen")]
    Window { rows: usize, cols: usize, max: usize },
}

/// Extrusion axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    /// New lines are rows
    Row,
    /// New lines are columns
    Column,
}

/// Square ring buffer
///
/// The logical pixel `(i,j)` is stored at `((row0+i)%n,(col0+j)%n)`.
#[derive(Debug, Clone)]
struct RingScreen {
    data: Mat,
    row0: usize,
    col0: usize,
}
impl RingScreen {
    fn new(data: Mat) -> Self {
        Self {
            data,
            row0: 0,
            col0: 0,
        }
    }
    #[inline]
    fn n(&self) -> usize {
        self.data.nrows()
    }
    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        let n = self.n();
        self.data[((self.row0 + i) % n, (self.col0 + j) % n)]
    }
    #[inline]
    fn at(&self, axis: Axis, coords: [usize; 2]) -> f64 {
        let (i, j) = Stencil::to_screen(axis, coords);
        self.get(i, j)
    }
    /// Writes `line` into the physical line `p` along `axis`
    fn write(&mut self, axis: Axis, p: usize, line: &[f64]) {
        let n = self.n();
        match axis {
            Axis::Row => {
                for (k, v) in line.iter().enumerate() {
                    self.data[(p, (self.col0 + k) % n)] = *v;
                }
            }
            Axis::Column => {
                for (k, v) in line.iter().enumerate() {
                    self.data[((self.row0 + k) % n, p)] = *v;
                }
            }
        }
    }
    /// Drops the first line and appends `line` after the last one
    fn append(&mut self, axis: Axis, line: &[f64]) {
        let n = self.n();
        match axis {
            Axis::Row => {
                self.write(axis, self.row0, line);
                self.row0 = (self.row0 + 1) % n;
            }
            Axis::Column => {
                self.write(axis, self.col0, line);
                self.col0 = (self.col0 + 1) % n;
            }
        }
    }
    /// Drops the last line and prepends `line` before the first one
    fn prepend(&mut self, axis: Axis, line: &[f64]) {
        let n = self.n();
        match axis {
            Axis::Row => {
                let p = (self.row0 + n - 1) % n;
                self.write(axis, p, line);
                self.row0 = p;
            }
            Axis::Column => {
                let p = (self.col0 + n - 1) % n;
                self.write(axis, p, line);
                self.col0 = p;
            }
        }
    }
}

/// Infinite von Kármán phase screen
///
/// The phase is given in radians.
#[derive(Debug, Clone)]
pub struct InfinitePhaseScreen {
    requested_size: usize,
    mx_size: usize,
    stencil_size: usize,
    pixel_scale: f64,
    r0: f64,
    outer_scale: f64,
    inner_scale: f64,
    stencil: Stencil,
    a_mat: Mat,
    b_mat: Mat,
    screen: RingScreen,
    rng: StdRng,
}
impl FromBuilder for InfinitePhaseScreen {
    type ComponentBuilder = InfinitePhaseScreenBuilder;
}
impl InfinitePhaseScreen {
    /// Requested screen size
    pub fn size(&self) -> usize {
        self.requested_size
    }
    /// Size of the buffer, the largest window that can be sampled is `stencil_size-1`
    pub fn stencil_size(&self) -> usize {
        self.stencil_size
    }
    pub fn mx_size(&self) -> usize {
        self.mx_size
    }
    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }
    pub fn r0(&self) -> f64 {
        self.r0
    }
    pub fn outer_scale(&self) -> f64 {
        self.outer_scale
    }
    pub fn inner_scale(&self) -> f64 {
        self.inner_scale
    }
    pub fn stencil(&self) -> &Stencil {
        &self.stencil
    }
    /// Logical pixel `(i,j)` of the screen
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.screen.get(i, j)
    }
    /// Copy of the whole `stencil_size`x`stencil_size` screen in logical order
    pub fn full_screen(&self) -> Mat {
        let n = self.stencil_size;
        Mat::from_fn(n, n, |i, j| self.screen.get(i, j))
    }
    /// Draws a new line along `axis`
    ///
    /// The line is conditioned on the stencil at the tail of the screen if `after` is true
    /// and at the head otherwise.
    pub fn get_new_line(&mut self, axis: Axis, after: bool) -> Vec<f64> {
        let z = if after {
            DVector::from_iterator(
                self.stencil.len(),
                self.stencil.tail().map(|c| self.screen.at(axis, c)),
            )
        } else {
            DVector::from_iterator(
                self.stencil.len(),
                self.stencil.head().iter().map(|c| self.screen.at(axis, *c)),
            )
        };
        let rng = &mut self.rng;
        let w = DVector::from_iterator(
            self.stencil_size,
            (0..self.stencil_size).map(|_| rng.sample::<f64, _>(StandardNormal)),
        );
        let x = &self.a_mat * z + &self.b_mat * w;
        if after {
            // the tail stencil is reflected, so is the new line
            x.iter().rev().cloned().collect()
        } else {
            x.iter().cloned().collect()
        }
    }
    /// Extrudes the screen by one line along `axis`
    ///
    /// If `after` is true, the new line is appended after the last line and the first line is dropped,
    /// otherwise the new line is prepended before the first line and the last line is dropped.
    pub fn add_line(&mut self, axis: Axis, after: bool) {
        let line = self.get_new_line(axis, after);
        if after {
            self.screen.append(axis, &line);
        } else {
            self.screen.prepend(axis, &line);
        }
    }
    /// Bilinear sampling of the window starting at the fractional position `frac` (row, column)
    ///
    /// The output pixel `(i,j)` is the phase at `(i+frac[0],j+frac[1])`, with `0<=frac<1`.
    /// The size of `out` must be less than the stencil size.
    pub fn sample_window(&self, frac: [f64; 2], out: &mut Mat) -> Result<(), PhaseScreenError> {
        let (n, m) = out.shape();
        if n >= self.stencil_size || m >= self.stencil_size {
            return Err(PhaseScreenError::Window {
                rows: n,
                cols: m,
                max: self.stencil_size,
            });
        }
        let [fr, fc] = frac;
        for j in 0..m {
            for i in 0..n {
                out[(i, j)] = (1. - fr)
                    * ((1. - fc) * self.screen.get(i, j) + fc * self.screen.get(i, j + 1))
                    + fr * ((1. - fc) * self.screen.get(i + 1, j)
                        + fc * self.screen.get(i + 1, j + 1));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;

    fn screen(seed: u64) -> InfinitePhaseScreen {
        InfinitePhaseScreen::builder()
            .size(32)
            .pixel_scale(0.05)
            .r0(0.1)
            .outer_scale(10.)
            .seed(seed)
            .build()
            .unwrap()
    }

    #[test]
    fn sizes() {
        let screen = screen(1);
        assert_eq!(screen.mx_size(), 33);
        assert_eq!(screen.stencil_size(), 33);
        let screen = InfinitePhaseScreen::builder()
            .size(40)
            .stencil_size_factor(2)
            .build()
            .unwrap();
        assert_eq!(screen.mx_size(), 65);
        assert_eq!(screen.stencil_size(), 130);
    }

    #[test]
    fn sliding_window() {
        let mut screen = screen(3);
        let n = screen.stencil_size();
        let before = screen.full_screen();
        screen.add_line(Axis::Row, true);
        let after = screen.full_screen();
        // appending moves the lines up by one
        assert_eq!(
            after.rows(0, n - 1).into_owned(),
            before.rows(1, n - 1).into_owned()
        );
        screen.add_line(Axis::Column, false);
        let prepended = screen.full_screen();
        assert_eq!(
            prepended.columns(1, n - 1).into_owned(),
            after.columns(0, n - 1).into_owned()
        );
        assert!(prepended.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn window_sampling() {
        let screen = screen(5);
        let mut out = Mat::zeros(32, 32);
        screen.sample_window([0., 0.], &mut out).unwrap();
        assert_eq!(out[(4, 7)], screen.get(4, 7));
        screen.sample_window([0.5, 0.], &mut out).unwrap();
        assert!((out[(4, 7)] - 0.5 * (screen.get(4, 7) + screen.get(5, 7))).abs() < 1e-12);
    }

    #[test]
    fn window_too_large() {
        let screen = screen(5);
        let mut out = Mat::zeros(33, 8);
        assert!(matches!(
            screen.sample_window([0., 0.], &mut out),
            Err(PhaseScreenError::Window {
                rows: 33,
                cols: 8,
                max: 33
            })
        ));
    }

    #[test]
    fn same_seed_same_screen() {
        let mut a = screen(11);
        let mut b = screen(11);
        a.add_line(Axis::Row, true);
        b.add_line(Axis::Row, true);
        assert_eq!(a.full_screen(), b.full_screen());
    }

    // Structure function of the extruded lines against the von Kármán model
    #[test]
    fn extruded_statistics() {
        let (r0, l0, pixel_scale) = (0.1, 10., 0.05);
        let mut d = [0f64; 2];
        let mut d_across = 0f64;
        let mut count = [0usize; 2];
        let mut count_across = 0usize;
        for seed in 1..=6 {
            let mut screen = screen(seed);
            let n = screen.stencil_size();
            // the initial spectral screen is fully replaced
            for _ in 0..n {
                screen.add_line(Axis::Row, true);
            }
            for _ in 0..2 * n {
                screen.add_line(Axis::Row, true);
                let last = n - 1;
                for sep in 1..=2 {
                    for j in 0..n - sep {
                        d[sep - 1] += (screen.get(last, j + sep) - screen.get(last, j)).powi(2);
                        count[sep - 1] += 1;
                    }
                }
                for j in 0..n {
                    d_across += (screen.get(last, j) - screen.get(last - 1, j)).powi(2);
                    count_across += 1;
                }
            }
        }
        let c0 = phase_covariance(0., r0, l0);
        for sep in 1..=2 {
            let model = 2. * (c0 - phase_covariance(sep as f64 * pixel_scale, r0, l0));
            let estimate = d[sep - 1] / count[sep - 1] as f64;
            assert!(
                (estimate / model - 1.).abs() < 0.25,
                "D({sep}px): {estimate} vs {model}"
            );
        }
        let model = 2. * (c0 - phase_covariance(pixel_scale, r0, l0));
        let estimate = d_across / count_across as f64;
        assert!((estimate / model - 1.).abs() < 0.25);
    }
}
