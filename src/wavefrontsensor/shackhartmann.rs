//! # Shack-Hartmann wavefront sensor
//!
//! Diffractive model of a Shack-Hartmann wavefront sensor: the electric field in each lenslet
//! subaperture is Fourier transformed to the lenslet focal plane, cropped by the subaperture
//! field stop and binned to the detector pixels.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::{
    context::ExecutionContext,
    electric_field::ElectricField,
    time::Tick,
    utilities::{fftshift, make_mask, toccd, CMat, Fft2, Mat},
    FromBuilder,
};

use super::Intensity;

mod builder;
pub use builder::ShackHartmannBuilder;
use builder::SubapertureSampling;

#[derive(Debug, thiserror::Error)]
pub enum ShackHartmannError {
    #[error("{pixel_pupil}px pupil cannot be divided in {n_subap} subapertures")]
    Subapertures { pixel_pupil: usize, n_subap: usize },
    #[error("subaperture field-of-view of {fov}arcsec must be positive and less than {max:.3}arcsec")]
    FieldOfView { fov: f64, max: f64 },
    #[error("invalid Shack-Hartmann parameter {0}: {1}")]
    Parameter(&'static str, f64),
    #[error("expected an input field of {expected}px, found {found}px")]
    InputSize { expected: usize, found: usize },
    #[error("intensity has non-finite elements")]
    NonFinite,
}

/// Shack-Hartmann wavefront sensor
#[derive(Debug, Clone)]
pub struct ShackHartmann {
    n_subap: usize,
    subap_npx: usize,
    pixel_pupil: usize,
    wavelength: f64,
    sampling: SubapertureSampling,
    fp_mask: Mat,
    tlt_f: CMat,
    fft: Fft2,
    subapertures: Vec<(usize, usize)>,
    context: ExecutionContext,
    intensity: Intensity,
}
impl FromBuilder for ShackHartmann {
    type ComponentBuilder = ShackHartmannBuilder;
}
impl ShackHartmann {
    pub(super) fn new(builder: ShackHartmannBuilder, sampling: SubapertureSampling) -> Self {
        let SubapertureSampling {
            np_sub,
            fft_size,
            fov_complete,
            ..
        } = sampling;
        let fp_mask = make_mask(
            fft_size,
            builder.subap_fov / fov_complete,
            0.,
            builder.square_fov,
        );
        // half pixel tilt centering the spots in between 4 pixels
        let half = (np_sub / 2) as f64;
        let tlt_f = CMat::from_fn(np_sub, np_sub, |i, j| {
            let g = (i as f64 - half) + (j as f64 - half);
            Complex64::from_polar(1., -2. * PI * g / (2. * fft_size as f64))
        });
        let n = builder.n_subap;
        let subapertures = (0..n).flat_map(|i| (0..n).map(move |j| (i, j))).collect();
        Self {
            n_subap: n,
            subap_npx: builder.subap_npx,
            pixel_pupil: builder.pixel_pupil,
            wavelength: builder.wavelength,
            sampling,
            fp_mask,
            tlt_f,
            fft: Fft2::new(fft_size, fft_size),
            subapertures,
            context: builder.context,
            intensity: Intensity::new(n * builder.subap_npx),
        }
    }
    /// Number of lenslets across the pupil
    pub fn n_subap(&self) -> usize {
        self.n_subap
    }
    /// Number of detector pixels across a subaperture
    pub fn subap_npx(&self) -> usize {
        self.subap_npx
    }
    /// Sensing wavelength in nm
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }
    /// Detector pixel scale in arcsec
    pub fn pixel_scale(&self) -> f64 {
        let cutsize = self.sampling.fft_size - self.sampling.cut;
        cutsize as f64 * self.sampling.fft_pxscale / self.subap_npx as f64
    }
    pub fn intensity(&self) -> &Intensity {
        &self.intensity
    }
    /// Propagates the electric field `ef` through the lenslet array at time `t`
    pub fn trigger(
        &mut self,
        t: Tick,
        ef: &ElectricField,
    ) -> Result<&Intensity, ShackHartmannError> {
        if ef.size() != self.pixel_pupil {
            return Err(ShackHartmannError::InputSize {
                expected: self.pixel_pupil,
                found: ef.size(),
            });
        }
        let SubapertureSampling {
            np_sub,
            fft_size,
            cut,
            ..
        } = self.sampling;
        let cutsize = fft_size - cut;
        let field = ef.ef_at_lambda(self.wavelength);

        let spots = self.context.map(&self.subapertures, |&(i, j)| {
            let mut u = CMat::zeros(fft_size, fft_size);
            u.view_mut((0, 0), (np_sub, np_sub)).copy_from(
                &field
                    .view((i * np_sub, j * np_sub), (np_sub, np_sub))
                    .component_mul(&self.tlt_f),
            );
            self.fft.forward(&mut u);
            let energy: f64 = u.iter().map(|z| z.norm_sqr()).sum();
            let psf = fftshift(&u).zip_map(&self.fp_mask, |z, m| z.norm_sqr() * m);
            (
                psf.view((cut / 2, cut / 2), (cutsize, cutsize)).into_owned(),
                energy,
            )
        });

        let n = self.n_subap;
        let mut psf_image = Mat::zeros(n * cutsize, n * cutsize);
        let mut total = 0f64;
        for (&(i, j), (spot, energy)) in self.subapertures.iter().zip(spots) {
            psf_image
                .view_mut((i * cutsize, j * cutsize), (cutsize, cutsize))
                .copy_from(&spot);
            total += energy;
        }
        if total > 0. {
            psf_image /= total;
        }

        let side = n * self.subap_npx;
        let phot = ef.s0 * ef.masked_area();
        if phot == 0. {
            log::warn!("total intensity at the Shack-Hartmann entrance is zero");
        }
        let ccd = toccd(&psf_image, side, side) * phot;
        if !ccd.iter().all(|x| x.is_finite()) {
            return Err(ShackHartmannError::NonFinite);
        }
        self.intensity.set(ccd, t);
        Ok(&self.intensity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;
    use skyangle::Conversion;

    fn wfs() -> ShackHartmann {
        ShackHartmann::builder()
            .pixel_pupil(40)
            .pixel_pitch(0.02)
            .lenslet_array(5, 6)
            .subaperture_fov(3.)
            .fft_oversampling(4)
            .build()
            .unwrap()
    }

    /// Mean spot centroid in pixels relative to the subaperture center
    fn centroid(frame: &Mat, n: usize, npx: usize) -> [f64; 2] {
        let c = 0.5 * (npx as f64 - 1.);
        let mut sum = [0f64; 2];
        for i in 0..n {
            for j in 0..n {
                let block = frame.view((i * npx, j * npx), (npx, npx));
                let flux = block.sum();
                let (mut x, mut y) = (0., 0.);
                for r in 0..npx {
                    for s in 0..npx {
                        x += block[(r, s)] * (s as f64 - c);
                        y += block[(r, s)] * (r as f64 - c);
                    }
                }
                sum[0] += x / flux;
                sum[1] += y / flux;
            }
        }
        let m = (n * n) as f64;
        [sum[0] / m, sum[1] / m]
    }

    #[test]
    fn flat_wavefront() {
        let mut wfs = wfs();
        let ef = ElectricField::new(40, 0.02, 1e6);
        let phot = ef.s0 * ef.masked_area();
        let frame = wfs.trigger(3, &ef).unwrap();
        assert_eq!(frame.generation_time, 3);
        assert_eq!(frame.i.shape(), (30, 30));
        let total = frame.i.sum();
        assert!(total > 0.5 * phot && total <= phot * (1. + 1e-9));
        let [x, y] = centroid(&frame.i, 5, 6);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
    }

    #[test]
    fn tilted_wavefront() {
        let mut wfs = wfs();
        let mut ef = ElectricField::new(40, 0.02, 1e6);
        let angle = 0.5f64.from_arcsec();
        ef.phase = Mat::from_fn(40, 40, |_, j| angle * j as f64 * 0.02 * 1e9);
        let frame = wfs.trigger(0, &ef).unwrap();
        let [x, y] = centroid(&frame.i, 5, 6);
        let expected = 0.5 / wfs.pixel_scale();
        assert!(x > 0.7 * expected && x < 1.3 * expected, "{x} vs {expected}");
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn wrong_input_size() {
        let mut wfs = wfs();
        assert!(matches!(
            wfs.trigger(0, &ElectricField::new(32, 0.02, 1.)),
            Err(ShackHartmannError::InputSize { .. })
        ));
    }
}
