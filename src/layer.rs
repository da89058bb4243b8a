//! # Atmospheric layer
//!
//! A [Layer] is a phase and amplitude screen at a given height above the telescope pupil.
//! The turbulence layers are written by [AtmoEvolution](crate::AtmoEvolution) every tick and
//! read by [AtmoPropagation](crate::AtmoPropagation).

use serde::{Deserialize, Serialize};

use crate::{
    time::Tick,
    utilities::{make_mask, Mat},
};

/// Phase and amplitude screen at a given height
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Phase in nm
    pub phase: Mat,
    /// Amplitude transmission
    pub amplitude: Mat,
    /// Pixel size in meters
    pub pixel_pitch: f64,
    /// Height in meters
    pub height: f64,
    /// Clockwise rotation in degrees
    pub rotation_deg: f64,
    /// Shift `[x,y]` in pixels
    pub shift: [f64; 2],
    pub magnification: f64,
    pub generation_time: Tick,
}
impl Layer {
    /// Creates a flat `size`x`size` layer with unit amplitude
    pub fn new(size: usize, pixel_pitch: f64, height: f64) -> Self {
        Self {
            phase: Mat::zeros(size, size),
            amplitude: Mat::from_element(size, size, 1.),
            pixel_pitch,
            height,
            rotation_deg: 0.,
            shift: [0., 0.],
            magnification: 1.,
            generation_time: 0,
        }
    }
    /// Telescope pupil stop at height 0
    ///
    /// The amplitude is a disk inscribed in the `pixel_pupil`x`pixel_pupil` grid with a central
    /// obstruction of relative diameter `obsratio`.
    pub fn pupil_stop(pixel_pupil: usize, pixel_pitch: f64, obsratio: f64) -> Self {
        Self {
            amplitude: make_mask(pixel_pupil, 1., obsratio, false),
            ..Self::new(pixel_pupil, pixel_pitch, 0.)
        }
    }
    pub fn size(&self) -> usize {
        self.phase.nrows()
    }
    pub fn with_rotation(self, rotation_deg: f64) -> Self {
        Self {
            rotation_deg,
            ..self
        }
    }
    pub fn with_shift(self, shift: [f64; 2]) -> Self {
        Self { shift, ..self }
    }
    pub fn with_magnification(self, magnification: f64) -> Self {
        Self {
            magnification,
            ..self
        }
    }
    /// Checks if the layer geometry maps 1:1 onto a pupil grid of pitch `pixel_pitch`
    pub fn is_aligned(&self, pixel_pitch: f64) -> bool {
        self.shift == [0., 0.]
            && self.rotation_deg == 0.
            && self.magnification == 1.
            && self.pixel_pitch == pixel_pitch
    }
    /// Mean phase over the pixels with a non-zero amplitude
    pub fn masked_mean_phase(&self) -> f64 {
        let (sum, n) = self
            .phase
            .iter()
            .zip(self.amplitude.iter())
            .filter(|(_, a)| **a != 0.)
            .fold((0f64, 0usize), |(s, n), (p, _)| (s + p, n + 1));
        if n == 0 {
            0.
        } else {
            sum / n as f64
        }
    }
}
