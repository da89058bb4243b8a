use std::f64::consts::PI;

use num_complex::Complex64;

use crate::{
    electric_field::ElectricField,
    utilities::{CMat, Fft2},
};

/// Angular spectrum transfer function of a free-space propagation over `distance` meters
///
/// The transfer function of the `n`x`n` field sampled at `pixel_pitch` is given in the FFT order
/// for a wavelength in nm.
pub fn field_propagator(n: usize, pixel_pitch: f64, wavelength: f64, distance: f64) -> CMat {
    let df = 1. / (n as f64 * pixel_pitch);
    let freq = |k: usize| {
        if k <= n / 2 {
            k as f64 * df
        } else {
            (k as f64 - n as f64) * df
        }
    };
    let a = -PI * wavelength * 1e-9 * distance;
    CMat::from_fn(n, n, |i, j| {
        Complex64::from_polar(1., a * (freq(i).powi(2) + freq(j).powi(2)))
    })
}

/// Fresnel propagation between consecutive layers
///
/// After propagation, the phase is wrapped to `[-λ/2,λ/2]`.
#[derive(Debug, Clone)]
pub struct Fresnel {
    wavelength: f64,
    fft: Fft2,
    propagators: Vec<CMat>,
}
impl Fresnel {
    /// Propagators from each layer of `heights` to the next one, the last one to the ground
    pub fn new(n: usize, pixel_pitch: f64, wavelength: f64, heights: &[f64]) -> Self {
        let propagators = heights
            .iter()
            .enumerate()
            .map(|(j, h)| {
                let distance = heights.get(j + 1).map_or(*h, |next| h - next);
                field_propagator(n, pixel_pitch, wavelength, distance)
            })
            .collect();
        Self {
            wavelength,
            fft: Fft2::new(n, n),
            propagators,
        }
    }
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }
    /// Propagates the field after the layer `j`
    pub fn propagate(&self, j: usize, ef: &mut ElectricField) {
        let propagator = &self.propagators[j];
        let mut field = ef.ef_at_lambda(self.wavelength);
        self.fft.forward(&mut field);
        field.component_mul_assign(propagator);
        self.fft.inverse(&mut field);
        let k = self.wavelength / (2. * PI);
        for ((a, p), e) in ef
            .amplitude
            .iter_mut()
            .zip(ef.phase.iter_mut())
            .zip(field.iter())
        {
            *a = e.norm();
            *p = e.arg() * k;
        }
    }
}
