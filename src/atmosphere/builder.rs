use std::{
    collections::BTreeMap,
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use skyangle::Conversion;

use crate::{
    context::ExecutionContext, layer::Layer, phase_screen::InfinitePhaseScreenBuilder,
    source::SourceDict, Builder, RsaoError,
};

use super::{seeing_to_r0, AtmoEvolution, AtmosphereError, Turbulence, REFERENCE_WAVELENGTH};

/// [AtmoEvolution] builder
///
/// Default properties:
///  * outer scale      : 25m
///  * pixel pitch      : 5cm
///  * heights          : [0m]
///  * Cn2              : [1]
///  * pixel pupil      : 160px
///  * sources          : none (on-axis field)
///  * zenith angle     : 0°
///  * field of view    : none
///  * pupil position   : [0,0]m
///  * seed             : 1
///  * inner scale      : 5mm
///  * reference seeing : 1"
///  * pupil stop       : none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmoEvolutionBuilder {
    pub outer_scale: Vec<f64>,
    pub pixel_pitch: f64,
    pub heights: Vec<f64>,
    pub cn2: Vec<f64>,
    pub pixel_pupil: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: SourceDict,
    pub zenith_angle: f64,
    pub fov: Option<f64>,
    pub force_fov: bool,
    pub fov_in_m: Option<f64>,
    pub pupil_position: [f64; 2],
    pub seed: u64,
    pub inner_scale: f64,
    pub reference_seeing: f64,
    pub pupil_stop: Option<f64>,
    pub context: ExecutionContext,
}
impl Default for AtmoEvolutionBuilder {
    fn default() -> Self {
        Self {
            outer_scale: vec![25.],
            pixel_pitch: 0.05,
            heights: vec![0.],
            cn2: vec![1.],
            pixel_pupil: 160,
            sources: SourceDict::new(),
            zenith_angle: 0.,
            fov: None,
            force_fov: false,
            fov_in_m: None,
            pupil_position: [0., 0.],
            seed: 1,
            inner_scale: 0.005,
            reference_seeing: 1.,
            pupil_stop: None,
            context: ExecutionContext::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AtmoEvolutionBuilderError {
    #[error("cannot open `::rsao::AtmoEvolutionBuilder` toml file: {1}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("cannot create `::rsao::AtmoEvolutionBuilder` toml file: {1}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("cannot read `::rsao::AtmoEvolutionBuilder` toml file: {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write `::rsao::AtmoEvolutionBuilder` toml file: {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("cannot deserialize `::rsao::AtmoEvolutionBuilder` from toml")]
    Load(#[from] toml::de::Error),
    #[error("cannot serialize `::rsao::AtmoEvolutionBuilder` into toml")]
    Save(#[from] toml::ser::Error),
}

/// ## `AtmoEvolution` builder
impl AtmoEvolutionBuilder {
    /// Load the atmosphere builder from a toml file
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, AtmoEvolutionBuilderError> {
        let mut file = File::open(&path)
            .map_err(|e| AtmoEvolutionBuilderError::Open(e, path.as_ref().to_path_buf()))?;
        let mut toml = String::new();
        file.read_to_string(&mut toml)
            .map_err(|e| AtmoEvolutionBuilderError::Read(e, path.as_ref().to_path_buf()))?;
        let builder: AtmoEvolutionBuilder = toml::from_str(&toml)?;
        Ok(builder)
    }
    /// Save the atmosphere builder into a toml file
    pub fn save<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> std::result::Result<(), AtmoEvolutionBuilderError> {
        let toml = toml::to_string_pretty(self)?;
        let mut file = File::create(&path)
            .map_err(|e| AtmoEvolutionBuilderError::Create(e, path.as_ref().to_path_buf()))?;
        write!(file, "# ::rsao::AtmoEvolutionBuilder\n\n{}", toml)
            .map_err(|e| AtmoEvolutionBuilderError::Write(e, path.as_ref().to_path_buf()))?;
        Ok(())
    }
    /// Sets the outer scale in meters, either one value for all the layers or one value per layer
    pub fn outer_scale(self, outer_scale: Vec<f64>) -> Self {
        Self {
            outer_scale,
            ..self
        }
    }
    /// Sets the pixel size in meters
    pub fn pixel_pitch(self, pixel_pitch: f64) -> Self {
        Self {
            pixel_pitch,
            ..self
        }
    }
    /// Sets the layer heights at zenith in meters
    pub fn heights(self, heights: Vec<f64>) -> Self {
        Self { heights, ..self }
    }
    /// Sets the Cn2 weights of the layers, the weights must sum to 1
    pub fn cn2(self, cn2: Vec<f64>) -> Self {
        Self { cn2, ..self }
    }
    /// Sets the pupil size in pixels
    pub fn pixel_pupil(self, pixel_pupil: usize) -> Self {
        Self {
            pixel_pupil,
            ..self
        }
    }
    /// Sets the sources the layers must cover
    pub fn sources(self, sources: SourceDict) -> Self {
        Self { sources, ..self }
    }
    /// Sets the zenith angle in degrees
    pub fn zenith_angle(self, zenith_angle: f64) -> Self {
        Self {
            zenith_angle,
            ..self
        }
    }
    /// Sets the minimum field of view diameter in arcsec
    pub fn fov(self, fov: f64) -> Self {
        Self {
            fov: Some(fov),
            ..self
        }
    }
    /// Forces the field of view diameter in arcsec, the sources are ignored for the layer sizes
    pub fn forced_fov(self, fov: f64) -> Self {
        Self {
            fov: Some(fov),
            force_fov: true,
            ..self
        }
    }
    /// Sets the width of the layers in meters
    pub fn fov_in_m(self, fov_in_m: f64) -> Self {
        Self {
            fov_in_m: Some(fov_in_m),
            ..self
        }
    }
    /// Sets the position of the pupil center in meters
    pub fn pupil_position(self, pupil_position: [f64; 2]) -> Self {
        Self {
            pupil_position,
            ..self
        }
    }
    /// Sets the random seed of the first layer, the following layers are seeded with `seed+i`
    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
    /// Sets the inner scale in meters
    pub fn inner_scale(self, inner_scale: f64) -> Self {
        Self {
            inner_scale,
            ..self
        }
    }
    /// Sets the seeing in arcsec the phase screens are generated for
    pub fn reference_seeing(self, reference_seeing: f64) -> Self {
        Self {
            reference_seeing,
            ..self
        }
    }
    /// Appends a pupil stop with a central obstruction of relative diameter `obsratio` to the layers
    pub fn pupil_stop(self, obsratio: f64) -> Self {
        Self {
            pupil_stop: Some(obsratio),
            ..self
        }
    }
    pub fn context(self, context: ExecutionContext) -> Self {
        Self { context, ..self }
    }
    /// Half field of view in arcsec
    fn alpha_fov(&self) -> f64 {
        match (self.fov, self.force_fov) {
            (Some(fov), true) => {
                log::info!("field of view is forced to a diameter of {}arcsec", fov);
                fov / 2.
            }
            (fov, _) => self
                .sources
                .values()
                .flat_map(|src| src.xy_arcsec())
                .map(f64::abs)
                .chain(fov.map(|fov| fov / 2.))
                .fold(0f64, f64::max),
        }
    }
    /// Sizes of the layers in pixels
    fn layer_sizes(&self, heights: &[f64]) -> Vec<usize> {
        if let Some(fov_in_m) = self.fov_in_m {
            let n = (fov_in_m / self.pixel_pitch / 2.) as usize * 2;
            return vec![n; heights.len()];
        }
        let alpha = self.alpha_fov().from_arcsec();
        let [x, y] = self.pupil_position;
        heights
            .iter()
            .map(|h| {
                let n = self.pixel_pupil as f64
                    + 2. * x.hypot(y) / self.pixel_pitch
                    + 2. * h.abs() / self.pixel_pitch * alpha;
                ((n / 2.).ceil() * 2.) as usize
            })
            .collect()
    }
    fn validate(&self) -> std::result::Result<(), AtmosphereError> {
        let n = self.heights.len();
        if n == 0 {
            return Err(AtmosphereError::Empty);
        }
        if self.cn2.len() != n {
            return Err(AtmosphereError::ProfileLength(n, self.cn2.len()));
        }
        if let Some(w) = self.cn2.iter().find(|w| !(**w > 0.)) {
            return Err(AtmosphereError::Cn2Weight(*w));
        }
        let total: f64 = self.cn2.iter().sum();
        if (total - 1.).abs() > 1e-6 {
            return Err(AtmosphereError::Cn2Total(total));
        }
        if !(self.outer_scale.len() == 1 || self.outer_scale.len() == n) {
            return Err(AtmosphereError::OuterScale {
                expected: n,
                found: self.outer_scale.len(),
            });
        }
        if self.seed == 0 {
            return Err(AtmosphereError::Seed);
        }
        Ok(())
    }
}
impl Builder for AtmoEvolutionBuilder {
    type Component = AtmoEvolution;
    /// Build the `AtmoEvolution`
    fn build(self) -> std::result::Result<AtmoEvolution, RsaoError> {
        self.validate()?;
        let airmass = 1. / self.zenith_angle.to_radians().cos();
        let r0_ref = seeing_to_r0(self.reference_seeing, REFERENCE_WAVELENGTH);
        log::info!(
            "Atmosphere r0 at {:.1}degree from zenith: {:.3}m",
            self.zenith_angle,
            r0_ref * airmass.powf(-3. / 5.)
        );
        let heights: Vec<f64> = self.heights.iter().map(|h| h * airmass).collect();
        let sizes = self.layer_sizes(&heights);
        let turbulence = heights
            .iter()
            .zip(&sizes)
            .zip(&self.cn2)
            .enumerate()
            .map(|(i, ((h, size), cn2))| {
                let r0 = r0_ref * cn2.powf(-3. / 5.);
                let outer_scale = self.outer_scale.get(i).unwrap_or(&self.outer_scale[0]);
                log::debug!(
                    "layer #{} at {:.0}m: {}px, r0={:.3}m, L0={}m",
                    i,
                    h,
                    size,
                    r0,
                    outer_scale
                );
                InfinitePhaseScreenBuilder::default()
                    .size(*size)
                    .pixel_scale(self.pixel_pitch)
                    .r0(r0)
                    .outer_scale(*outer_scale)
                    .inner_scale(self.inner_scale)
                    .seed(self.seed + i as u64)
                    .try_build()
                    .map(Turbulence::new)
                    .map_err(|e| AtmosphereError::PhaseScreen(i, e))
            })
            .collect::<std::result::Result<Vec<_>, AtmosphereError>>()?;
        let mut layers: Vec<Layer> = heights
            .iter()
            .zip(&sizes)
            .map(|(h, size)| Layer::new(*size, self.pixel_pitch, *h))
            .collect();
        if let Some(obsratio) = self.pupil_stop {
            layers.push(Layer::pupil_stop(
                self.pixel_pupil,
                self.pixel_pitch,
                obsratio,
            ));
        }
        Ok(AtmoEvolution {
            turbulence,
            layers,
            cn2: self.cn2,
            pixel_pitch: self.pixel_pitch,
            airmass,
            r0_ref,
            last_t: 0,
            context: self.context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_round_trip() {
        let builder = AtmoEvolutionBuilder::default()
            .heights(vec![30., 26500.])
            .cn2(vec![0.5, 0.5])
            .outer_scale(vec![23.])
            .zenith_angle(30.);
        let path = std::env::temp_dir().join("rsao_atmosphere.toml");
        builder.save(&path).unwrap();
        assert_eq!(AtmoEvolutionBuilder::load(&path).unwrap(), builder);
    }

    #[test]
    fn validation() {
        let builder = AtmoEvolutionBuilder::default().heights(vec![0., 1e3]);
        assert!(matches!(
            builder.clone().validate(),
            Err(AtmosphereError::ProfileLength(2, 1))
        ));
        assert!(matches!(
            builder
                .clone()
                .cn2(vec![0.5, 0.5])
                .outer_scale(vec![20., 30., 40.])
                .validate(),
            Err(AtmosphereError::OuterScale {
                expected: 2,
                found: 3
            })
        ));
        assert!(matches!(
            builder.clone().cn2(vec![1.5, -0.5]).validate(),
            Err(AtmosphereError::Cn2Weight(_))
        ));
        assert!(matches!(
            builder.cn2(vec![0.5, 0.5]).seed(0).validate(),
            Err(AtmosphereError::Seed)
        ));
    }

    #[test]
    fn pupil_stop_is_last() {
        let atm = AtmoEvolutionBuilder::default()
            .pixel_pupil(16)
            .pupil_stop(0.1)
            .build()
            .unwrap();
        assert_eq!(atm.n_layer(), 1);
        assert_eq!(atm.layers().len(), 2);
        assert!(atm.layers()[1].amplitude.sum() < 256.);
    }

    #[test]
    fn zenith_angle_stretches_heights() {
        let atm = AtmoEvolutionBuilder::default()
            .heights(vec![1e3])
            .pixel_pupil(16)
            .zenith_angle(60.)
            .build()
            .unwrap();
        assert!((atm.heights()[0] - 2e3).abs() < 1e-9);
        assert!((atm.airmass() - 2.).abs() < 1e-12);
    }
}
