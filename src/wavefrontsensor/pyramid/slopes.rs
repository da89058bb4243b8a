use std::ops::{Div, Sub};

use serde::{Deserialize, Serialize};

use crate::utilities::{Mask, Mat};

use super::{Pyramid, PyramidError};

/// Pyramid measurements
///
/// The measurements vector concatenates all the pairs [sx,sy]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slopes(pub(crate) Vec<f64>);
impl Slopes {
    /// Returns the length of the measurements vector
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Iterator over the x slopes
    pub fn sx(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().step_by(2).cloned()
    }
    /// Iterator over the y slopes
    pub fn sy(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().skip(1).step_by(2).cloned()
    }
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}
type V = nalgebra::DVector<f64>;
impl From<Slopes> for V {
    /// Converts the pyramid measurments into a [nalgebra] vector
    fn from(value: Slopes) -> Self {
        V::from_vec(value.0)
    }
}
impl Div<f64> for Slopes {
    type Output = Slopes;

    fn div(self, rhs: f64) -> Self::Output {
        Slopes(self.0.into_iter().map(|x| x / rhs).collect())
    }
}
impl Sub for Slopes {
    type Output = Slopes;

    fn sub(self, rhs: Self) -> Self::Output {
        Slopes(
            self.0
                .into_iter()
                .zip(rhs.0)
                .map(|(x, y)| x - y)
                .collect(),
        )
    }
}

/// Quad-cell processing of the pyramid detector frame
///
/// The four pupil images `a` (top-left), `b` (top-right), `c` (bottom-left) and `d` (bottom-right)
/// give the slopes `sx=(a+c-b-d)/f` and `sy=(a+b-c-d)/f` in each subaperture, `f` being the mean flux
/// per subaperture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuadCell {
    ccd_side: usize,
    pup_diam: usize,
    pup_dist: usize,
    mask: Option<Mask>,
    sxy0: Option<Slopes>,
    flux_threshold: f64,
}
impl From<&Pyramid> for QuadCell {
    fn from(pym: &Pyramid) -> Self {
        Self::new(
            pym.geometry().final_ccd_side,
            pym.pup_diam(),
            pym.pup_dist(),
        )
    }
}
impl QuadCell {
    /// Quad-cell of pupil images of `pup_diam` pixels separated by `pup_dist` pixels centered on a
    /// `ccd_side`x`ccd_side` frame
    pub fn new(ccd_side: usize, pup_diam: usize, pup_dist: usize) -> Self {
        Self {
            ccd_side,
            pup_diam,
            pup_dist,
            ..Default::default()
        }
    }
    /// Sets the valid subapertures mask
    ///
    /// The mask must be `pup_diam`x`pup_diam`.
    pub fn with_mask(self, mask: Mask) -> Result<Self, PyramidError> {
        let expected = (self.pup_diam, self.pup_diam);
        if mask.shape() != expected {
            return Err(PyramidError::MaskShape {
                expected,
                found: mask.shape(),
            });
        }
        Ok(Self {
            mask: Some(mask),
            ..self
        })
    }
    /// Sets the reference slopes
    pub fn with_reference(self, sxy0: Slopes) -> Self {
        Self {
            sxy0: Some(sxy0),
            ..self
        }
    }
    /// Sets the slopes to zero in the subapertures with a flux lower than `threshold` times the mean flux
    pub fn with_flux_threshold(self, threshold: f64) -> Self {
        Self {
            flux_threshold: threshold,
            ..self
        }
    }
    /// Top-left corners offset of the pupil images
    fn corners(&self) -> Result<[usize; 2], PyramidError> {
        let span = self.pup_dist + self.pup_diam;
        if span > self.ccd_side {
            return Err(PyramidError::CcdSide(self.ccd_side, span));
        }
        let lo = (self.ccd_side - span) / 2;
        Ok([lo, lo + self.pup_dist])
    }
    /// Takes the slopes of `frame` as the reference
    pub fn set_reference(&mut self, frame: &Mat) -> Result<&mut Self, PyramidError> {
        self.sxy0 = None;
        self.sxy0 = Some(self.slopes(frame)?);
        Ok(self)
    }
    /// Computes the slopes from the detector frame
    pub fn slopes(&self, frame: &Mat) -> Result<Slopes, PyramidError> {
        if frame.shape() != (self.ccd_side, self.ccd_side) {
            return Err(PyramidError::FrameSize {
                expected: self.ccd_side,
                found: frame.nrows(),
            });
        }
        let [lo, hi] = self.corners()?;
        let n = self.pup_diam;
        let quadrant = |i: usize, j: usize| frame.view((i, j), (n, n));
        let (a, b, c, d) = (
            quadrant(lo, lo),
            quadrant(lo, hi),
            quadrant(hi, lo),
            quadrant(hi, hi),
        );
        let sx = a + c - b - d;
        let sy = a + b - c - d;
        let flux = a + b + c + d;

        let valid: Vec<bool> = match &self.mask {
            Some(mask) => mask.iter().collect(),
            None => vec![true; n * n],
        };
        let (total, count) = flux
            .iter()
            .zip(&valid)
            .filter(|(_, v)| **v)
            .fold((0f64, 0usize), |(s, c), (f, _)| (s + f, c + 1));
        let mean_flux = total / count as f64;

        let mut sxy: Vec<f64> = sx
            .iter()
            .zip(sy.iter())
            .zip(flux.iter())
            .zip(&valid)
            .filter(|(_, v)| **v)
            .flat_map(|(((sx, sy), f), _)| {
                if *f < self.flux_threshold * mean_flux {
                    [0., 0.]
                } else {
                    [sx / mean_flux, sy / mean_flux]
                }
            })
            .collect();
        if !sxy.iter().all(|x| x.is_finite()) {
            return Err(PyramidError::NonFinite("slopes"));
        }
        if let Some(Slopes(sxy0)) = self.sxy0.as_ref() {
            sxy.iter_mut()
                .zip(sxy0)
                .for_each(|(sxy, sxy0)| *sxy -= sxy0);
        }
        Ok(Slopes(sxy))
    }
}
