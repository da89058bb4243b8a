//! # Electric field
//!
//! The complex field in the telescope pupil, stored as amplitude and phase (in nm).

use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::{
    layer::Layer,
    time::Tick,
    utilities::{CMat, Mat},
};

/// Pupil electric field of a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectricField {
    pub amplitude: Mat,
    /// Phase in nm
    pub phase: Mat,
    /// Pixel size in meters
    pub pixel_pitch: f64,
    /// Photon flux density in photon/s/m²
    pub s0: f64,
    pub generation_time: Tick,
}
impl ElectricField {
    /// Flat `n`x`n` field with unit amplitude
    pub fn new(n: usize, pixel_pitch: f64, s0: f64) -> Self {
        Self {
            amplitude: Mat::from_element(n, n, 1.),
            phase: Mat::zeros(n, n),
            pixel_pitch,
            s0,
            generation_time: 0,
        }
    }
    /// Resets the field to unit amplitude and zero phase
    pub fn reset(&mut self) {
        self.amplitude.fill(1.);
        self.phase.fill(0.);
    }
    pub fn size(&self) -> usize {
        self.amplitude.nrows()
    }
    /// Illuminated area in m²
    pub fn masked_area(&self) -> f64 {
        self.amplitude.sum() * self.pixel_pitch * self.pixel_pitch
    }
    /// Phase in radians at `wavelength` in nm
    pub fn phase_at_lambda(&self, wavelength: f64) -> Mat {
        let k = 2. * PI / wavelength;
        self.phase.map(|p| p * k)
    }
    /// Complex field `A exp(iφ)` at `wavelength` in nm
    pub fn ef_at_lambda(&self, wavelength: f64) -> CMat {
        let k = 2. * PI / wavelength;
        self.amplitude
            .zip_map(&self.phase, |a, p| Complex64::from_polar(a, p * k))
    }
    /// Multiplies the amplitude and adds the phase of the `layer` sub-rectangle starting at `topleft` (row, column)
    pub fn product_subrect(&mut self, layer: &Layer, topleft: (usize, usize)) {
        let n = self.size();
        self.amplitude
            .component_mul_assign(&layer.amplitude.view(topleft, (n, n)));
        self.phase += layer.phase.view(topleft, (n, n));
    }
    pub fn is_finite(&self) -> bool {
        self.amplitude
            .iter()
            .chain(self.phase.iter())
            .all(|x| x.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_at_lambda() {
        let mut ef = ElectricField::new(4, 0.5, 1e3);
        assert_eq!(ef.masked_area(), 4.);
        ef.phase.fill(125.);
        let e = ef.ef_at_lambda(500.);
        assert!((e[(0, 0)] - Complex64::new(0., 1.)).norm() < 1e-12);
        ef.reset();
        assert_eq!(ef.phase.sum(), 0.);
    }

    #[test]
    fn subrect() {
        let mut layer = Layer::new(6, 0.5, 0.);
        layer.phase = Mat::from_fn(6, 6, |i, j| (i * 6 + j) as f64);
        let mut ef = ElectricField::new(2, 0.5, 1.);
        ef.product_subrect(&layer, (2, 2));
        assert_eq!(ef.phase, Mat::from_row_slice(2, 2, &[14., 15., 20., 21.]));
        assert!(ef.is_finite());
    }
}
