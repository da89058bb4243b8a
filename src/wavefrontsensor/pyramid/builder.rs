use serde::{Deserialize, Serialize};

use crate::{context::ExecutionContext, Builder, RsaoError};

use super::{
    geometry::{calc_geometry, GeometryRequest},
    ExtendedSource, Pyramid, PyramidError,
};

/// Circular modulation of the pyramid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modulation {
    /// Radius in λ/D
    pub amplitude: f64,
    /// Number of steps along the circle, derived from the amplitude if not set
    pub steps: Option<usize>,
}
impl Default for Modulation {
    fn default() -> Self {
        Self {
            amplitude: 3.,
            steps: None,
        }
    }
}
impl Modulation {
    /// Default number of modulation steps
    pub fn min_steps(&self) -> usize {
        ((self.amplitude / 2. * 8.).max(1.).round_ties_even() * 2.) as usize
    }
    /// Number of steps below which the modulation circle is under-sampled
    pub fn sampling_limit(&self) -> usize {
        (2. * std::f64::consts::PI * self.amplitude).round() as usize
    }
}

/// [Pyramid] builder
///
/// Default properties:
///  * pixel pupil       : 160px
///  * pixel pitch       : 5cm
///  * wavelength        : 750nm
///  * field of view     : 2.1arcsec
///  * pupil diameter    : 30px
///  * output resolution : 80px
///  * modulation        : 3λ/D
///  * FoV margins       : -10%/+50%
///  * pupil margin      : 2px
///  * FFT resolution    : 3px per λ/D
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PyramidBuilder {
    pub pixel_pupil: usize,
    pub pixel_pitch: f64,
    pub wavelength: f64,
    pub fov: f64,
    pub pup_diam: usize,
    pub output_resolution: usize,
    pub modulation: Modulation,
    pub fov_errinf: f64,
    pub fov_errsup: f64,
    pub pup_dist: Option<usize>,
    pub pup_margin: usize,
    pub fft_res: f64,
    /// Focal plane central obstruction diameter in λ/D
    pub fp_obs: Option<f64>,
    /// Pupil images shift in detector pixels
    pub pup_shifts: [f64; 2],
    /// Tilt coefficients of the four pyramid facets
    pub tilt_coefficients: Option<[[f64; 4]; 2]>,
    /// Width of the imperfect edges in λ/D
    pub edge_defect: f64,
    /// Size of the imperfect tip in λ/D
    pub tip_defect: f64,
    /// Size of the flattened tip in λ/D
    pub tip_maya: f64,
    pub min_pup_dist: Option<usize>,
    /// Input field rotation in degrees
    pub rotation: f64,
    pub seed: u64,
    pub extended_source: Option<ExtendedSource>,
    pub context: ExecutionContext,
}
impl Default for PyramidBuilder {
    fn default() -> Self {
        Self {
            pixel_pupil: 160,
            pixel_pitch: 0.05,
            wavelength: 750.,
            fov: 2.1,
            pup_diam: 30,
            output_resolution: 80,
            modulation: Modulation::default(),
            fov_errinf: 0.1,
            fov_errsup: 0.5,
            pup_dist: None,
            pup_margin: 2,
            fft_res: 3.,
            fp_obs: None,
            pup_shifts: [0., 0.],
            tilt_coefficients: None,
            edge_defect: 0.,
            tip_defect: 0.,
            tip_maya: 0.,
            min_pup_dist: None,
            rotation: 0.,
            seed: 0,
            extended_source: None,
            context: ExecutionContext::default(),
        }
    }
}
impl PyramidBuilder {
    /// Sets the input field size in pixels
    pub fn pixel_pupil(self, pixel_pupil: usize) -> Self {
        Self {
            pixel_pupil,
            ..self
        }
    }
    /// Sets the input field pixel size in meters
    pub fn pixel_pitch(self, pixel_pitch: f64) -> Self {
        Self {
            pixel_pitch,
            ..self
        }
    }
    /// Sets the sensing wavelength in nm
    pub fn wavelength(self, wavelength: f64) -> Self {
        Self { wavelength, ..self }
    }
    /// Sets the field-of-view in arcsec
    pub fn fov(self, fov: f64) -> Self {
        Self { fov, ..self }
    }
    /// Sets the diameter of the pupil images in detector pixels
    pub fn pup_diam(self, pup_diam: usize) -> Self {
        Self { pup_diam, ..self }
    }
    /// Sets the detector size in pixels
    pub fn output_resolution(self, output_resolution: usize) -> Self {
        Self {
            output_resolution,
            ..self
        }
    }
    /// Sets the modulation radius in λ/D and optionally the number of steps
    pub fn modulation(self, amplitude: f64, steps: Option<usize>) -> Self {
        Self {
            modulation: Modulation { amplitude, steps },
            ..self
        }
    }
    /// Sets the accepted relative reduction and enlargement of the field-of-view
    pub fn fov_margins(self, fov_errinf: f64, fov_errsup: f64) -> Self {
        Self {
            fov_errinf,
            fov_errsup,
            ..self
        }
    }
    /// Sets the distance between the pupil images centers in detector pixels
    pub fn pup_dist(self, pup_dist: usize) -> Self {
        Self {
            pup_dist: Some(pup_dist),
            ..self
        }
    }
    pub fn pup_margin(self, pup_margin: usize) -> Self {
        Self { pup_margin, ..self }
    }
    pub fn min_pup_dist(self, min_pup_dist: usize) -> Self {
        Self {
            min_pup_dist: Some(min_pup_dist),
            ..self
        }
    }
    /// Sets the minimum number of focal plane pixels per λ/D
    pub fn fft_res(self, fft_res: f64) -> Self {
        Self { fft_res, ..self }
    }
    /// Sets the diameter of the focal plane central obstruction in λ/D
    pub fn fp_obs(self, fp_obs: f64) -> Self {
        Self {
            fp_obs: Some(fp_obs),
            ..self
        }
    }
    /// Sets the pupil images shift in detector pixels
    pub fn pup_shifts(self, pup_shifts: [f64; 2]) -> Self {
        Self { pup_shifts, ..self }
    }
    /// Sets the facets tilts `[[x0,x1,x2,x3],[y0,y1,y2,y3]]`
    ///
    /// The facets are ordered top-left, bottom-left, bottom-right and top-right.
    pub fn tilt_coefficients(self, tilt_coefficients: [[f64; 4]; 2]) -> Self {
        Self {
            tilt_coefficients: Some(tilt_coefficients),
            ..self
        }
    }
    /// Sets the pyramid manufacturing defects in λ/D: edges width, tip size and flattened tip size
    pub fn defects(self, edge_defect: f64, tip_defect: f64, tip_maya: f64) -> Self {
        Self {
            edge_defect,
            tip_defect,
            tip_maya,
            ..self
        }
    }
    /// Sets the input field rotation in degrees
    pub fn rotation(self, rotation: f64) -> Self {
        Self { rotation, ..self }
    }
    /// Sets the seed of the defects random generator
    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
    /// Replaces the circular modulation with an extended source
    pub fn extended_source(self, extended_source: ExtendedSource) -> Self {
        Self {
            extended_source: Some(extended_source),
            ..self
        }
    }
    pub fn context(self, context: ExecutionContext) -> Self {
        Self { context, ..self }
    }
    /// Checks the number of modulation steps and returns it
    pub(super) fn modulation_steps(&self) -> Result<usize, PyramidError> {
        if let Some(source) = &self.extended_source {
            if source.is_empty() {
                return Err(PyramidError::ExtendedSource);
            }
            log::info!("pyramid extended source with {} points", source.len());
            return Ok(source.len());
        }
        let min_steps = self.modulation.min_steps();
        match self.modulation.steps {
            None => Ok(min_steps),
            Some(steps) => {
                let limit = self.modulation.sampling_limit();
                if steps < limit || steps == 0 {
                    return Err(PyramidError::ModulationSampling { steps, limit });
                }
                if steps < min_steps {
                    log::warn!(
                        "{steps} modulation steps is too low, {min_steps} steps are recommended"
                    );
                }
                Ok(steps)
            }
        }
    }
}

impl Builder for PyramidBuilder {
    type Component = Pyramid;
    fn build(self) -> crate::Result<Pyramid> {
        if !(self.wavelength > 0.) {
            return Err(PyramidError::Wavelength(self.wavelength).into());
        }
        let geometry = calc_geometry(&GeometryRequest {
            pixel_pupil: self.pixel_pupil,
            pixel_pitch: self.pixel_pitch,
            wavelength: self.wavelength,
            fov: self.fov,
            pup_diam: self.pup_diam,
            ccd_side: self.output_resolution,
            fov_errinf: self.fov_errinf,
            fov_errsup: self.fov_errsup,
            pup_dist: self.pup_dist,
            pup_margin: self.pup_margin,
            fft_res: self.fft_res,
            min_pup_dist: self.min_pup_dist,
        })?;
        let steps = self.modulation_steps()?;
        log::info!(
            "pyramid: {} modulation steps, FFT size {}px, detector {}px",
            steps,
            geometry.fft_totsize,
            geometry.final_ccd_side
        );
        Pyramid::new(self, geometry, steps).map_err(RsaoError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_steps() {
        let builder = PyramidBuilder::default();
        assert_eq!(builder.modulation.min_steps(), 24);
        assert_eq!(builder.modulation.sampling_limit(), 19);
        assert_eq!(builder.modulation_steps().unwrap(), 24);
    }

    #[test]
    fn under_sampled_modulation() {
        let builder = PyramidBuilder::default().modulation(3., Some(12));
        assert!(matches!(
            builder.modulation_steps(),
            Err(PyramidError::ModulationSampling {
                steps: 12,
                limit: 19
            })
        ));
        // too few steps but above the sampling limit is only a warning
        let builder = PyramidBuilder::default().modulation(3., Some(20));
        assert_eq!(builder.modulation_steps().unwrap(), 20);
    }

    #[test]
    fn extended_source_overrides_sampling() {
        use crate::wavefrontsensor::pyramid::SourcePoint;
        let source = ExtendedSource::new(vec![SourcePoint::default(); 4]).unwrap();
        let builder = PyramidBuilder::default()
            .modulation(3., Some(2))
            .extended_source(source);
        assert_eq!(builder.modulation_steps().unwrap(), 4);
    }

    #[test]
    fn toml_round_trip() {
        let builder = PyramidBuilder::default()
            .modulation(2., Some(16))
            .pup_dist(36);
        let s = toml::to_string(&builder).unwrap();
        let other: PyramidBuilder = toml::from_str(&s).unwrap();
        assert_eq!(builder, other);
    }
}
