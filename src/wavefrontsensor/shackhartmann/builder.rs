use serde::{Deserialize, Serialize};
use skyangle::Conversion;

use crate::{context::ExecutionContext, Builder};

use super::{ShackHartmann, ShackHartmannError};

/// [ShackHartmann] builder
///
/// Default properties:
///  - lenslet array : 20x20
///  - subaperture   : 8x8 pixels with a 2.5arcsec square field-of-view
///  - wavelength    : 750nm
///  - pixel pupil   : 160px
///  - pixel pitch   : 5cm
///  - FFT oversampling : 2
///
/// # Examples
///
/// ```
/// use rsao::{Builder, FromBuilder, ShackHartmann};
/// let wfs = ShackHartmann::builder()
///     .lenslet_array(20, 8)
///     .subaperture_fov(2.5)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShackHartmannBuilder {
    pub n_subap: usize,
    pub subap_npx: usize,
    /// Subaperture field-of-view in arcsec
    pub subap_fov: f64,
    pub wavelength: f64,
    pub pixel_pupil: usize,
    pub pixel_pitch: f64,
    pub fft_oversampling: usize,
    pub square_fov: bool,
    pub context: ExecutionContext,
}
impl Default for ShackHartmannBuilder {
    fn default() -> Self {
        Self {
            n_subap: 20,
            subap_npx: 8,
            subap_fov: 2.5,
            wavelength: 750.,
            pixel_pupil: 160,
            pixel_pitch: 0.05,
            fft_oversampling: 2,
            square_fov: true,
            context: ExecutionContext::default(),
        }
    }
}
impl ShackHartmannBuilder {
    /// Sets the number of lenslets across the pupil and the number of pixels across a subaperture
    pub fn lenslet_array(self, n_subap: usize, subap_npx: usize) -> Self {
        Self {
            n_subap,
            subap_npx,
            ..self
        }
    }
    /// Sets the subaperture field-of-view in arcsec
    pub fn subaperture_fov(self, subap_fov: f64) -> Self {
        Self { subap_fov, ..self }
    }
    pub fn wavelength(self, wavelength: f64) -> Self {
        Self { wavelength, ..self }
    }
    pub fn pixel_pupil(self, pixel_pupil: usize) -> Self {
        Self {
            pixel_pupil,
            ..self
        }
    }
    pub fn pixel_pitch(self, pixel_pitch: f64) -> Self {
        Self {
            pixel_pitch,
            ..self
        }
    }
    /// Sets the zero padding factor of the subaperture FFTs
    pub fn fft_oversampling(self, fft_oversampling: usize) -> Self {
        Self {
            fft_oversampling,
            ..self
        }
    }
    /// Uses a circular field stop instead of a square one
    pub fn circular_fov(self) -> Self {
        Self {
            square_fov: false,
            ..self
        }
    }
    pub fn context(self, context: ExecutionContext) -> Self {
        Self { context, ..self }
    }
}

/// Fourier sampling of the subapertures
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct SubapertureSampling {
    pub np_sub: usize,
    pub fft_size: usize,
    pub fft_pxscale: f64,
    pub fov_complete: f64,
    pub cut: usize,
}
impl ShackHartmannBuilder {
    pub(super) fn sampling(&self) -> Result<SubapertureSampling, ShackHartmannError> {
        if self.n_subap == 0 || self.pixel_pupil % self.n_subap != 0 {
            return Err(ShackHartmannError::Subapertures {
                pixel_pupil: self.pixel_pupil,
                n_subap: self.n_subap,
            });
        }
        if self.subap_npx == 0 {
            return Err(ShackHartmannError::Parameter("subap_npx", 0.));
        }
        if self.fft_oversampling == 0 {
            return Err(ShackHartmannError::Parameter("fft_oversampling", 0.));
        }
        if !(self.wavelength > 0.) {
            return Err(ShackHartmannError::Parameter("wavelength", self.wavelength));
        }
        if !(self.pixel_pitch > 0.) {
            return Err(ShackHartmannError::Parameter("pixel_pitch", self.pixel_pitch));
        }
        let np_sub = self.pixel_pupil / self.n_subap;
        let fft_size = np_sub * self.fft_oversampling;
        let fov_complete = (self.wavelength * 1e-9 / self.pixel_pitch).to_arcsec();
        if !(self.subap_fov > 0.) || self.subap_fov > fov_complete {
            return Err(ShackHartmannError::FieldOfView {
                fov: self.subap_fov,
                max: fov_complete,
            });
        }
        let fft_pxscale = fov_complete / fft_size as f64;
        let cut = (((fov_complete - self.subap_fov) / fft_pxscale / 2.).round_ties_even() * 2.)
            as usize;
        if cut >= fft_size {
            return Err(ShackHartmannError::FieldOfView {
                fov: self.subap_fov,
                max: fov_complete,
            });
        }
        Ok(SubapertureSampling {
            np_sub,
            fft_size,
            fft_pxscale,
            fov_complete,
            cut,
        })
    }
}

impl Builder for ShackHartmannBuilder {
    type Component = ShackHartmann;
    fn build(self) -> crate::Result<ShackHartmann> {
        let sampling = self.sampling()?;
        log::info!(
            "Shack-Hartmann: {0}x{0} subapertures of {1}px, FFT size {2}px, {3:.3}arcsec/px",
            self.n_subap,
            sampling.np_sub,
            sampling.fft_size,
            sampling.fft_pxscale
        );
        Ok(ShackHartmann::new(self, sampling))
    }
}
