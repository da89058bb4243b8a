use serde::{Deserialize, Serialize};

use crate::utilities::{make_xy, Mat};

use super::PyramidError;

/// A point of an extended source
///
/// The tip, tilt and focus coefficients are given in radians rms of the Noll normalized Zernike polynomials
/// over the input field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcePoint {
    pub tilt_x: f64,
    pub tilt_y: f64,
    pub focus: f64,
    pub flux: f64,
}

/// Extended source sampled as a collection of points
///
/// Each point replaces one step of the circular modulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedSource {
    points: Vec<SourcePoint>,
}
impl ExtendedSource {
    pub fn new(points: Vec<SourcePoint>) -> Result<Self, PyramidError> {
        if points.is_empty() {
            Err(PyramidError::ExtendedSource)
        } else {
            Ok(Self { points })
        }
    }
    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    pub fn points(&self) -> &[SourcePoint] {
        &self.points
    }
    /// Flux weights, the points fainter than `1e-5` times the brightest one are discarded
    pub fn flux(&self) -> Vec<f64> {
        let max = self
            .points
            .iter()
            .map(|p| p.flux.abs())
            .fold(0f64, f64::max);
        self.points
            .iter()
            .map(|p| if p.flux.abs() < max * 1e-5 { 0. } else { p.flux })
            .collect()
    }
    /// Phase in radians of each point over a `n`x`n` field
    pub fn phases(&self, n: usize) -> Vec<Mat> {
        let (xx, yy) = make_xy(n, 1., false, false);
        let z2 = xx.map(|x| 2. * x);
        let z3 = yy.map(|y| 2. * y);
        let z4 = xx.zip_map(&yy, |x, y| 3f64.sqrt() * (2. * (x * x + y * y) - 1.));
        self.points
            .iter()
            .map(|p| &z2 * p.tilt_x + &z3 * p.tilt_y - &z4 * p.focus)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faint_points() {
        let src = ExtendedSource::new(vec![
            SourcePoint {
                flux: 1.,
                ..Default::default()
            },
            SourcePoint {
                tilt_x: 1.,
                flux: 1e-7,
                ..Default::default()
            },
        ])
        .unwrap();
        assert_eq!(src.flux(), vec![1., 0.]);
        let phases = src.phases(8);
        assert!(phases[0].iter().all(|x| *x == 0.));
        assert!(phases[1][(0, 7)] > 0.);
    }

    #[test]
    fn no_point() {
        assert!(matches!(
            ExtendedSource::new(vec![]),
            Err(PyramidError::ExtendedSource)
        ));
    }
}
