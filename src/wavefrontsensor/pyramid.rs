//! # Pyramid wavefront sensor
//!
//! Diffractive model of a modulated pyramid wavefront sensor.
//! The electric field is Fourier transformed to the pyramid focal plane, once per modulation step,
//! where the four facets of the pyramid add a tilt that separates the field into four pupil images
//! after an inverse Fourier transform.
//!
//! ```no_run
//! use rsao::{Builder, ElectricField, FromBuilder, Pyramid};
//!
//! let mut pym = Pyramid::builder()
//!     .pixel_pupil(160)
//!     .pixel_pitch(0.05)
//!     .wavelength(750.)
//!     .fov(2.1)
//!     .pup_diam(30)
//!     .output_resolution(80)
//!     .modulation(3., None)
//!     .build()?;
//! let ef = ElectricField::new(160, 0.05, 1e9);
//! pym.trigger(0, &ef)?;
//! let frame = &pym.intensity().i;
//! # Ok::<(), rsao::RsaoError>(())
//! ```

use std::f64::consts::PI;

use num_complex::Complex64;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    context::ExecutionContext,
    electric_field::ElectricField,
    time::{Tick, Timestamped},
    utilities::{
        fftshift, interpolation, make_mask, make_xy, median, pad_or_crop, roll, toccd, CMat,
        Fft2, Mat,
    },
    FromBuilder,
};

use super::Intensity;

mod builder;
mod extended;
pub mod geometry;
pub mod slopes;

pub use builder::{Modulation, PyramidBuilder};
pub use extended::{ExtendedSource, SourcePoint};
pub use geometry::PyramidGeometry;
pub use slopes::{QuadCell, Slopes};

#[derive(Debug, thiserror::Error)]
pub enum PyramidError {
    #[error("the pupil diameter and the input field size must be greater than 0")]
    PupilDiameter,
    #[error("pupil distance of {0}px is too small, the minimum is {1}px")]
    PupilDistance(usize, usize),
    #[error("detector size of {0}px is too small to hold the pupils, the minimum is {1}px")]
    CcdSide(usize, usize),
    #[error("field-of-view of {internal:.3}arcsec is larger than the maximum of {max:.3}arcsec, revise the FoV margin or the input field pitch")]
    FieldOfView { internal: f64, max: f64 },
    #[error("{steps} modulation steps under-sample the modulation circle, at least {limit} are required")]
    ModulationSampling { steps: usize, limit: usize },
    #[error("the extended source has no point")]
    ExtendedSource,
    #[error("invalid wavelength: {0}nm")]
    Wavelength(f64),
    #[error("expected an input field of {expected}px, found {found}px")]
    InputSize { expected: usize, found: usize },
    #[error("non-finite values in the pyramid {0}")]
    NonFinite(&'static str),
    #[error("expected a detector frame of {expected}px, found {found}px")]
    FrameSize { expected: usize, found: usize },
    #[error("expected a {expected:?} valid subapertures mask, found {found:?}")]
    MaskShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Pyramid wavefront sensor
#[derive(Debug, Clone)]
pub struct Pyramid {
    geometry: PyramidGeometry,
    pixel_pupil: usize,
    pup_diam: usize,
    pup_dist: usize,
    wavelength: f64,
    modulation: Modulation,
    rotation: f64,
    pup_shifts: [f64; 2],
    fp_mask: Mat,
    // focal plane mask times the pyramid facets phasor
    fp_pyramid: CMat,
    tlt_f: CMat,
    ttexp: Vec<CMat>,
    flux_factor: Vec<f64>,
    fft: Fft2,
    context: ExecutionContext,
    intensity: Intensity,
    psf_tot: Timestamped<Mat>,
    psf_bfm: Timestamped<Mat>,
    transmission: Timestamped<f64>,
}
impl FromBuilder for Pyramid {
    type ComponentBuilder = PyramidBuilder;
}

/// Phase of the four pyramid facets in units of waves
fn pyramid_tilt(builder: &PyramidBuilder, geometry: &PyramidGeometry) -> Mat {
    let a = geometry.fft_totsize / 2;
    let n = 2 * a;
    let mut pyr_tlt = match builder.tilt_coefficients {
        Some(k) => {
            let mean = 0.5 * (a as f64 - 1.);
            // facets order: top-left, bottom-left, bottom-right, top-right
            let offsets = [(0, 0), (a, 0), (a, a), (0, a)];
            let mut pyr_tlt = Mat::zeros(n, n);
            for (q, (i0, j0)) in offsets.into_iter().enumerate() {
                let mut facet = Mat::from_fn(a, a, |i, j| {
                    k[0][q] * (j as f64 - mean) + k[1][q] * (i as f64 - mean)
                });
                let min = facet.min();
                facet.add_scalar_mut(-min);
                pyr_tlt.view_mut((i0, j0), (a, a)).copy_from(&facet);
            }
            pyr_tlt
        }
        None => Mat::from_fn(n, n, |i, j| {
            let y = if i < a { i } else { n - 1 - i };
            let x = if j < a { j } else { n - 1 - j };
            (x + y) as f64
        }),
    };

    let (xx, yy) = make_xy(n, a as f64, false, false);
    let mut rng = StdRng::seed_from_u64(builder.seed);
    let half_res = geometry.fft_res / 2.;
    let edge = builder.edge_defect * half_res;
    if edge > 0. {
        let max = pyr_tlt.max();
        let mut count = 0;
        for ((p, x), y) in pyr_tlt.iter_mut().zip(xx.iter()).zip(yy.iter()) {
            if x.abs() <= edge || y.abs() <= edge {
                *p = max * rng.gen::<f64>();
                count += 1;
            }
        }
        log::debug!("{count} pixels randomized for the pyramid imperfect edges");
    }
    let tip = builder.tip_defect * half_res;
    if tip > 0. {
        let max = pyr_tlt.max();
        let mut count = 0;
        for ((p, x), y) in pyr_tlt.iter_mut().zip(xx.iter()).zip(yy.iter()) {
            if x.hypot(*y) <= tip {
                *p = max * rng.gen::<f64>();
                count += 1;
            }
        }
        log::debug!("{count} pixels randomized for the pyramid imperfect tip");
    }
    let maya = builder.tip_maya * half_res;
    if maya > 0. {
        let inside: Vec<usize> = xx
            .iter()
            .zip(yy.iter())
            .enumerate()
            .filter(|(_, (x, y))| x.hypot(**y) <= maya)
            .map(|(k, _)| k)
            .collect();
        let min = inside
            .iter()
            .map(|&k| pyr_tlt[k])
            .fold(f64::INFINITY, f64::min);
        inside.iter().for_each(|&k| pyr_tlt[k] = min);
        log::debug!("{} pixels flattened at the pyramid tip", inside.len());
    }
    pyr_tlt / geometry.tilt_scale
}

/// Modulation tilts spanning `[-π,π]` across the field
fn modulation_tilts(p: usize) -> (Mat, Mat) {
    let (xx, yy) = make_xy(p, (p / 2) as f64, false, false);
    let half_range = 0.5 * (xx.max() - xx.min());
    if half_range > 0. {
        (xx * (PI / half_range), yy * (PI / half_range))
    } else {
        (xx, yy)
    }
}

impl Pyramid {
    pub(crate) fn new(
        builder: PyramidBuilder,
        geometry: PyramidGeometry,
        steps: usize,
    ) -> Result<Self, PyramidError> {
        let p = geometry.fft_sampling;
        let n = geometry.fft_totsize;

        let fp_obsratio = builder
            .fp_obs
            .map_or(0., |fp_obs| fp_obs / (n as f64 / geometry.fft_res));
        let fp_mask = make_mask(n, geometry.fp_masking, fp_obsratio, false);
        let pyr_tlt = pyramid_tilt(&builder, &geometry);
        let fp_pyramid = pyr_tlt.zip_map(&fp_mask, |t, m| Complex64::from_polar(m, -2. * PI * t));

        let tlt_f = CMat::from_fn(p, p, |i, j| {
            Complex64::from_polar(1., -PI * (i + j) as f64 / n as f64)
        });

        let (ttexp, flux_factor) = match &builder.extended_source {
            Some(source) => (
                source
                    .phases(p)
                    .iter()
                    .map(|phase| phase.map(|x| Complex64::from_polar(1., -x)))
                    .collect(),
                source.flux(),
            ),
            None => {
                let (tilt_x, tilt_y) = modulation_tilts(p);
                let amplitude = builder.modulation.amplitude;
                let ttexp = (0..steps)
                    .map(|k| {
                        let (s, c) = (2. * PI * k as f64 / steps as f64).sin_cos();
                        tilt_x.zip_map(&tilt_y, |x, y| {
                            Complex64::from_polar(1., -amplitude * (s * x + c * y))
                        })
                    })
                    .collect();
                (ttexp, vec![1f64; steps])
            }
        };

        let final_side = geometry.final_ccd_side;
        Ok(Self {
            geometry,
            pixel_pupil: builder.pixel_pupil,
            pup_diam: builder.pup_diam,
            pup_dist: builder
                .pup_dist
                .unwrap_or(builder.pup_diam + 2 * builder.pup_margin),
            wavelength: builder.wavelength,
            modulation: Modulation {
                steps: Some(steps),
                ..builder.modulation
            },
            rotation: builder.rotation,
            pup_shifts: builder.pup_shifts,
            fp_mask,
            fp_pyramid,
            tlt_f,
            ttexp,
            flux_factor,
            fft: Fft2::new(n, n),
            context: builder.context,
            intensity: Intensity::new(final_side),
            psf_tot: Timestamped::new(Mat::zeros(n, n), 0),
            psf_bfm: Timestamped::new(Mat::zeros(n, n), 0),
            transmission: Timestamped::new(0., 0),
        })
    }
    pub fn geometry(&self) -> &PyramidGeometry {
        &self.geometry
    }
    /// Diameter of the pupil images in detector pixels
    pub fn pup_diam(&self) -> usize {
        self.pup_diam
    }
    /// Distance between the pupil images centers in detector pixels
    pub fn pup_dist(&self) -> usize {
        self.pup_dist
    }
    /// Sensing wavelength in nm
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }
    pub fn modulation(&self) -> &Modulation {
        &self.modulation
    }
    /// Number of modulation steps (or extended source points)
    pub fn modulation_steps(&self) -> usize {
        self.ttexp.len()
    }
    pub fn flux_factor(&self) -> &[f64] {
        &self.flux_factor
    }
    /// Focal plane field stop
    pub fn fp_mask(&self) -> &Mat {
        &self.fp_mask
    }
    /// Detector frame
    pub fn intensity(&self) -> &Intensity {
        &self.intensity
    }
    /// Focal plane PSF after the field stop
    pub fn psf_tot(&self) -> &Timestamped<Mat> {
        &self.psf_tot
    }
    /// Focal plane PSF before the field stop
    pub fn psf_bfm(&self) -> &Timestamped<Mat> {
        &self.psf_bfm
    }
    /// Fraction of the flux going through the field stop
    pub fn transmission(&self) -> &Timestamped<f64> {
        &self.transmission
    }
    /// Sets the rotation of the input field in degrees
    pub fn set_rotation(&mut self, rotation: f64) {
        self.rotation = rotation;
    }
    /// Sets the pupil images shift in detector pixels
    pub fn set_pup_shifts(&mut self, pup_shifts: [f64; 2]) {
        self.pup_shifts = pup_shifts;
    }

    /// Complex field at the sensor wavelength, rotated and magnified to the FFT sampling
    fn input_field(&self, ef: &ElectricField) -> CMat {
        let fov_res = self.geometry.fov_res;
        if self.rotation == 0. && fov_res == 1 {
            return ef.ef_at_lambda(self.wavelength);
        }
        let mut amplitude = ef.amplitude.clone();
        let mut phase = ef.phase_at_lambda(self.wavelength);
        if self.rotation != 0. {
            amplitude = interpolation::rotate_image(&amplitude, self.rotation)
                .map(|a| if a >= 0.5 { 1. } else { 0. });
            phase = interpolation::rotate_image(&phase, self.rotation);
        }
        let amplitude = interpolation::expand(&amplitude, fov_res);
        let phase = interpolation::expand(&phase, fov_res);
        amplitude.zip_map(&phase, Complex64::from_polar)
    }

    /// Propagates the electric field `ef` through the pyramid at time `t`
    pub fn trigger(&mut self, t: Tick, ef: &ElectricField) -> Result<&Intensity, PyramidError> {
        if ef.size() != self.pixel_pupil {
            return Err(PyramidError::InputSize {
                expected: self.pixel_pupil,
                found: ef.size(),
            });
        }
        let n = self.geometry.fft_totsize;
        let p = self.geometry.fft_sampling;

        let u_tlt_const = self.input_field(ef).component_mul(&self.tlt_f);

        let threshold = median(&self.flux_factor) * 1e-3;
        let steps: Vec<(usize, f64)> = self
            .flux_factor
            .iter()
            .enumerate()
            .filter(|(_, f)| **f > threshold)
            .map(|(k, f)| (k, *f))
            .collect();

        let zeros = || (Mat::zeros(n, n), Mat::zeros(n, n), Mat::zeros(n, n));
        let (pup, psf_bfm, psf_tot) = self.context.map_reduce(
            &steps,
            zeros,
            |&(k, w)| {
                let mut u = CMat::zeros(n, n);
                u.view_mut((0, 0), (p, p))
                    .copy_from(&u_tlt_const.component_mul(&self.ttexp[k]));
                self.fft.forward(&mut u);
                let mut u = fftshift(&u);
                let fpsf = u.map(|z| z.norm_sqr() * w);
                let fpsf_masked = fpsf.component_mul(&self.fp_mask);
                u.component_mul_assign(&self.fp_pyramid);
                self.fft.inverse(&mut u);
                (u.map(|z| z.norm_sqr() * w), fpsf, fpsf_masked)
            },
            |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
        );

        let half_padding = (self.geometry.fft_padding / 2) as isize;
        let mut pup = roll(&pup, half_padding, half_padding);

        let factor = 1. / self.flux_factor.iter().sum::<f64>();
        pup *= factor;
        let psf_tot = psf_tot * factor;
        let psf_bfm = psf_bfm * factor;

        let sum_bfm = psf_bfm.sum();
        let transmission = if sum_bfm > 0. {
            psf_tot.sum() / sum_bfm
        } else {
            0.
        };
        let phot = ef.s0 * ef.masked_area();
        let sum_pup = pup.sum();
        if sum_pup > 0. {
            pup *= phot / sum_pup * transmission;
        } else {
            log::warn!("total intensity at the pyramid entrance is zero");
        }

        if self.pup_shifts != [0., 0.] {
            let scale = n as f64 / self.geometry.toccd_side as f64;
            pup = interpolation::shift_image(
                &pup,
                [self.pup_shifts[0] * scale, self.pup_shifts[1] * scale],
            );
        }

        let side = self.geometry.toccd_side;
        let ccd = pad_or_crop(&toccd(&pup, side, side), self.geometry.final_ccd_side);
        if !ccd.iter().all(|x| x.is_finite()) {
            return Err(PyramidError::NonFinite("intensity"));
        }

        self.intensity.set(ccd, t);
        self.psf_tot.set(psf_tot, t);
        self.psf_bfm.set(psf_bfm, t);
        self.transmission.set(transmission, t);
        Ok(&self.intensity)
    }
}
