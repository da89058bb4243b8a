//! # Atmosphere evolution
//!
//! [AtmoEvolution] drives one [InfinitePhaseScreen] per turbulence layer.
//! At each tick, the screens are advected by the wind: the screens are extruded by whole lines
//! and the sub-pixel residual of the displacement is rendered with a bilinear interpolation of
//! the screen window.
//! The screens are generated for a reference seeing and rescaled to the current seeing.

use skyangle::Conversion;

use crate::{
    context::ExecutionContext,
    layer::Layer,
    phase_screen::{Axis, InfinitePhaseScreen, PhaseScreenError},
    time::{tick_to_seconds, Tick},
    FromBuilder,
};

mod builder;
pub use builder::{AtmoEvolutionBuilder, AtmoEvolutionBuilderError};

/// Reference wavelength of the phase screens in meters
pub const REFERENCE_WAVELENGTH: f64 = 500e-9;

/// Fried parameter in meters from the seeing in arcsec at `wavelength` in meters
pub fn seeing_to_r0(seeing: f64, wavelength: f64) -> f64 {
    0.9759 * wavelength / seeing.from_arcsec()
}
/// Seeing in arcsec from the Fried parameter `r0` in meters at `wavelength` in meters
pub fn r0_to_seeing(r0: f64, wavelength: f64) -> f64 {
    (0.9759 * wavelength / r0).to_arcsec()
}
/// Fried parameter in meters from the integrated `cn2` in m^(1/3)
pub fn cn2_to_r0(cn2: f64, wavelength: f64) -> f64 {
    let k = 2. * std::f64::consts::PI / wavelength;
    (0.423 * k * k * cn2).powf(-3. / 5.)
}
/// Seeing in arcsec from the integrated `cn2` in m^(1/3)
pub fn cn2_to_seeing(cn2: f64, wavelength: f64) -> f64 {
    r0_to_seeing(cn2_to_r0(cn2, wavelength), wavelength)
}

#[derive(Debug, thiserror::Error)]
pub enum AtmosphereError {
    #[error("Cn2 total must be 1, found {0}")]
    Cn2Total(f64),
    #[error("Cn2 weights must be positive, found {0}")]
    Cn2Weight(f64),
    #[error("expected 1 or {expected} outer scales, found {found}")]
    OuterScale { expected: usize, found: usize },
    #[error("heights ({0}) and Cn2 ({1}) have different lengths")]
    ProfileLength(usize, usize),
    #[error("the atmosphere has no turbulence layer")]
    Empty,
    #[error("the random seed must be strictly positive")]
    Seed,
    #[error("expected {expected} wind values, found {found}")]
    Wind { expected: usize, found: usize },
    #[error("seeing must be positive, found {0}")]
    Seeing(f64),
    #[error("cannot create the phase screen of layer #{0}")]
    PhaseScreen(usize, #[source] PhaseScreenError),
    #[error("cannot render the layer at {0}m")]
    Render(f64, #[source] PhaseScreenError),
    #[error("non finite phase in the layer at {0}m")]
    NonFinite(f64),
    #[error("cannot create `::rsao::AtmoEvolutionBuilder`")]
    Builder(#[from] AtmoEvolutionBuilderError),
}
pub type Result<T> = std::result::Result<T, AtmosphereError>;

/// Phase screen advected by the wind
///
/// `origin` is the position of the layer window in the infinite screen (row, column)
/// and `start` the position of the first line of the screen buffer.
#[derive(Debug, Clone)]
struct Turbulence {
    screen: InfinitePhaseScreen,
    origin: [f64; 2],
    start: [i64; 2],
}
impl Turbulence {
    fn new(screen: InfinitePhaseScreen) -> Self {
        Self {
            screen,
            origin: [0.; 2],
            start: [0; 2],
        }
    }
    /// Moves the turbulence by `shift` pixels (row, column)
    fn advect(&mut self, shift: [f64; 2]) {
        for k in 0..2 {
            self.origin[k] -= shift[k];
        }
        for (k, axis) in [(0, Axis::Row), (1, Axis::Column)] {
            let target = self.origin[k].floor() as i64;
            while self.start[k] < target {
                self.screen.add_line(axis, true);
                self.start[k] += 1;
            }
            while self.start[k] > target {
                self.screen.add_line(axis, false);
                self.start[k] -= 1;
            }
        }
    }
    /// Writes the phase in nm into the layer
    fn render(&self, layer: &mut Layer, scale: f64) -> Result<()> {
        let frac = [
            self.origin[0] - self.start[0] as f64,
            self.origin[1] - self.start[1] as f64,
        ];
        self.screen
            .sample_window(frac, &mut layer.phase)
            .map_err(|e| AtmosphereError::Render(layer.height, e))?;
        layer.phase *= scale;
        if layer.phase.iter().all(|x| x.is_finite()) {
            Ok(())
        } else {
            Err(AtmosphereError::NonFinite(layer.height))
        }
    }
}

/// Multi-layer turbulence evolving with the wind
#[derive(Debug)]
pub struct AtmoEvolution {
    turbulence: Vec<Turbulence>,
    layers: Vec<Layer>,
    cn2: Vec<f64>,
    pixel_pitch: f64,
    airmass: f64,
    r0_ref: f64,
    last_t: Tick,
    context: ExecutionContext,
}
impl FromBuilder for AtmoEvolution {
    type ComponentBuilder = AtmoEvolutionBuilder;
}
impl AtmoEvolution {
    /// Layers, the pupil stop (if any) comes last
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
    pub fn n_layer(&self) -> usize {
        self.turbulence.len()
    }
    /// Layer heights along the line of sight in meters
    pub fn heights(&self) -> Vec<f64> {
        self.layers.iter().map(|l| l.height).collect()
    }
    pub fn cn2(&self) -> &[f64] {
        &self.cn2
    }
    pub fn airmass(&self) -> f64 {
        self.airmass
    }
    /// Fried parameter at zenith and 500nm of the reference seeing
    pub fn r0_ref(&self) -> f64 {
        self.r0_ref
    }
    /// Time of the last update
    pub fn last_t(&self) -> Tick {
        self.last_t
    }
    /// Phase scaling from the screen radians at the reference seeing to nm at the given seeing
    pub fn scale_coefficient(&self, seeing: f64) -> f64 {
        let r0 = seeing_to_r0(seeing, REFERENCE_WAVELENGTH) * self.airmass.powf(-3. / 5.);
        (self.r0_ref / r0).powf(5. / 6.) * REFERENCE_WAVELENGTH * 1e9
            / (2. * std::f64::consts::PI)
    }
    /// Updates the layers at time `t`
    ///
    /// The `seeing` is given in arcsec, the wind speed in m/s and the wind direction in degree for each layer.
    pub fn trigger(
        &mut self,
        t: Tick,
        seeing: f64,
        wind_speed: &[f64],
        wind_direction: &[f64],
    ) -> Result<()> {
        let n = self.turbulence.len();
        for found in [wind_speed.len(), wind_direction.len()] {
            if found != n {
                return Err(AtmosphereError::Wind { expected: n, found });
            }
        }
        if !(seeing > 0.) {
            return Err(AtmosphereError::Seeing(seeing));
        }
        let delta_time = tick_to_seconds(t.saturating_sub(self.last_t));
        let scale = self.scale_coefficient(seeing);
        let pixel_pitch = self.pixel_pitch;
        let mut work: Vec<_> = self
            .turbulence
            .iter_mut()
            .zip(self.layers.iter_mut())
            .zip(wind_speed.iter().zip(wind_direction))
            .map(|((turbulence, layer), (speed, direction))| {
                let delta = speed * delta_time / pixel_pitch;
                let (s, c) = direction.to_radians().sin_cos();
                let shift = [delta * s, delta * c].map(|x| if x.abs() < 1e-12 { 0. } else { x });
                (turbulence, layer, shift)
            })
            .collect();
        self.context
            .try_for_each_mut(&mut work, |(turbulence, layer, shift)| {
                turbulence.advect(*shift);
                turbulence.render(layer, scale)?;
                layer.generation_time = t;
                Ok::<(), AtmosphereError>(())
            })?;
        for layer in self.layers.iter_mut().skip(n) {
            layer.generation_time = t;
        }
        log::debug!("atmosphere updated at {}ns with a scale of {:.3}", t, scale);
        self.last_t = t;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Builder, Source, SourceDict};

    fn atmosphere() -> AtmoEvolution {
        AtmoEvolution::builder()
            .heights(vec![0., 1e3])
            .cn2(vec![0.5, 0.5])
            .pixel_pupil(24)
            .pixel_pitch(0.1)
            .build()
            .unwrap()
    }

    #[test]
    fn seeing_conversions() {
        let r0 = seeing_to_r0(0.65, REFERENCE_WAVELENGTH);
        assert!((r0 - 0.1549).abs() < 1e-3);
        assert!((r0_to_seeing(r0, REFERENCE_WAVELENGTH) - 0.65).abs() < 1e-12);
        let cn2 = 1e-13;
        assert!(
            (cn2_to_seeing(cn2, REFERENCE_WAVELENGTH)
                - r0_to_seeing(cn2_to_r0(cn2, REFERENCE_WAVELENGTH), REFERENCE_WAVELENGTH))
            .abs()
                < 1e-12
        );
    }

    #[test]
    fn cn2_validation() {
        assert!(AtmoEvolution::builder()
            .heights(vec![0., 1e3])
            .cn2(vec![0.5, 0.5])
            .pixel_pupil(16)
            .build()
            .is_ok());
        let err = AtmoEvolution::builder()
            .heights(vec![0., 1e3])
            .cn2(vec![0.2, 0.2])
            .pixel_pupil(16)
            .build();
        assert!(matches!(
            err,
            Err(crate::RsaoError::Atmosphere(AtmosphereError::Cn2Total(_)))
        ));
        let err = AtmoEvolution::builder()
            .heights(vec![0., 1e3])
            .cn2(vec![1. - 5e-7, 5e-7 + 4e-7])
            .pixel_pupil(16)
            .build();
        assert!(err.is_ok());
    }

    #[test]
    fn layer_size_from_field() {
        let mut sources = SourceDict::new();
        sources.insert(
            "off".to_string(),
            Source::builder().polar_coordinate([60., 30.]).build().unwrap(),
        );
        let atm = AtmoEvolution::builder()
            .heights(vec![0., 10e3])
            .cn2(vec![0.5, 0.5])
            .pixel_pupil(20)
            .pixel_pitch(0.1)
            .sources(sources)
            .build()
            .unwrap();
        // x = 60"cos(30°) = 51.96" -> 2*10km/0.1m*2.519e-4 = 50.4px
        assert_eq!(atm.layers()[0].size(), 20);
        assert_eq!(atm.layers()[1].size(), 72);
    }

    #[test]
    fn zero_wind_is_idempotent() {
        let mut atm = atmosphere();
        atm.trigger(1_000_000, 0.8, &[0., 0.], &[0., 90.]).unwrap();
        let phase: Vec<_> = atm.layers().iter().map(|l| l.phase.clone()).collect();
        atm.trigger(2_000_000, 0.8, &[0., 0.], &[0., 90.]).unwrap();
        for (layer, phase) in atm.layers().iter().zip(&phase) {
            assert_eq!(&layer.phase, phase);
            assert_eq!(layer.generation_time, 2_000_000);
        }
    }

    #[test]
    fn wind_moves_the_turbulence() {
        let mut atm = atmosphere();
        atm.trigger(0, 0.8, &[0., 0.], &[0., 0.]).unwrap();
        let before = atm.layers()[1].phase.clone();
        // 10m/s during 20ms along x: 2 pixels of 0.1m
        atm.trigger(20_000_000, 0.8, &[10., 10.], &[0., 0.]).unwrap();
        let after = &atm.layers()[1].phase;
        let n = before.nrows();
        for i in 0..n {
            for j in 0..n - 2 {
                assert!((after[(i, j + 2)] - before[(i, j)]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn seeing_scaling() {
        let atm = atmosphere();
        let s1 = atm.scale_coefficient(1.);
        let s2 = atm.scale_coefficient(2.);
        assert!((s2 / s1 - 2f64.powf(5. / 6.)).abs() < 1e-12);
        assert!((s1 - 500. / (2. * std::f64::consts::PI)).abs() < 1e-9);
    }

    #[test]
    fn wind_length_mismatch() {
        let mut atm = atmosphere();
        assert!(matches!(
            atm.trigger(0, 0.8, &[1.], &[0., 0.]),
            Err(AtmosphereError::Wind {
                expected: 2,
                found: 1
            })
        ));
    }
}
