use std::{
    collections::BTreeMap,
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    context::ExecutionContext,
    propagation::AtmoPropagationBuilder,
    source::{SourceBuilder, SourceDict},
    wavefrontsensor::SensorBuilder,
    AtmoEvolutionBuilder, Builder, RsaoError,
};

use super::Pipeline;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open `::rsao::SimulationConfig` toml file: {1}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("cannot create `::rsao::SimulationConfig` toml file: {1}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("cannot read `::rsao::SimulationConfig` toml file: {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write `::rsao::SimulationConfig` toml file: {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("cannot deserialize `::rsao::SimulationConfig` from toml")]
    Load(#[from] toml::de::Error),
    #[error("cannot serialize `::rsao::SimulationConfig` into toml")]
    Save(#[from] toml::ser::Error),
    #[error("the simulation has no source")]
    NoSource,
    #[error("sensor {sensor} looks at the unknown source {source_name}")]
    UnknownSource { sensor: String, source_name: String },
    #[error("expected {expected} wind values (one per layer), found {found}")]
    Wind { expected: usize, found: usize },
    #[error("invalid time step: {0}s")]
    TimeStep(f64),
}

/// A wavefront sensor and the source it looks at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub source: String,
    pub model: SensorBuilder,
}
impl SensorConfig {
    pub fn new<S: Into<String>, B: Into<SensorBuilder>>(source: S, model: B) -> Self {
        Self {
            source: source.into(),
            model: model.into(),
        }
    }
}

/// Simulation configuration
///
/// Default properties:
///  * time step      : 1ms
///  * number of steps: 1
///  * pupil          : 160px at 5cm
///  * seeing         : 0.65arcsec
///  * wind           : 5.5m/s toward 0°
///
/// # Examples
///
/// ```toml
/// time_step = 0.001
/// seeing = 0.65
/// wind_speed = [5.5, 5.5]
/// wind_direction = [0.0, 0.0]
///
/// [sources.ngs]
/// magnitude = 8.0
///
/// [atmosphere]
/// heights = [30.0, 26500.0]
/// cn2 = [0.5, 0.5]
///
/// [sensors.pwfs]
/// source = "ngs"
/// model = { kind = "pyramid", pup_diam = 30, output_resolution = 80 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time step in seconds
    pub time_step: f64,
    pub n_steps: usize,
    pub pixel_pupil: usize,
    pub pixel_pitch: f64,
    /// Seeing in arcsec
    pub seeing: f64,
    /// Wind speed in m/s of each layer
    pub wind_speed: Vec<f64>,
    /// Wind direction in degree of each layer
    pub wind_direction: Vec<f64>,
    pub sources: BTreeMap<String, SourceBuilder>,
    pub atmosphere: AtmoEvolutionBuilder,
    pub propagation: AtmoPropagationBuilder,
    pub sensors: BTreeMap<String, SensorConfig>,
    pub context: ExecutionContext,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: 1e-3,
            n_steps: 1,
            pixel_pupil: 160,
            pixel_pitch: 0.05,
            seeing: 0.65,
            wind_speed: vec![5.5],
            wind_direction: vec![0.],
            sources: BTreeMap::new(),
            atmosphere: AtmoEvolutionBuilder::default(),
            propagation: AtmoPropagationBuilder::default(),
            sensors: BTreeMap::new(),
            context: ExecutionContext::default(),
        }
    }
}

impl SimulationConfig {
    /// Load the simulation configuration from a toml file
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let mut file =
            File::open(&path).map_err(|e| ConfigError::Open(e, path.as_ref().to_path_buf()))?;
        let mut toml = String::new();
        file.read_to_string(&mut toml)
            .map_err(|e| ConfigError::Read(e, path.as_ref().to_path_buf()))?;
        Ok(toml::from_str(&toml)?)
    }
    /// Save the simulation configuration into a toml file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)?;
        let mut file =
            File::create(&path).map_err(|e| ConfigError::Create(e, path.as_ref().to_path_buf()))?;
        write!(file, "# ::rsao::SimulationConfig\n\n{}", toml)
            .map_err(|e| ConfigError::Write(e, path.as_ref().to_path_buf()))?;
        Ok(())
    }
    pub fn time_step(self, time_step: f64) -> Self {
        Self { time_step, ..self }
    }
    pub fn n_steps(self, n_steps: usize) -> Self {
        Self { n_steps, ..self }
    }
    /// Sets the pupil size in pixels and the pixel size in meters
    pub fn pupil(self, pixel_pupil: usize, pixel_pitch: f64) -> Self {
        Self {
            pixel_pupil,
            pixel_pitch,
            ..self
        }
    }
    pub fn seeing(self, seeing: f64) -> Self {
        Self { seeing, ..self }
    }
    /// Sets the wind speed (m/s) and direction (degree) of each layer
    pub fn wind(self, wind_speed: Vec<f64>, wind_direction: Vec<f64>) -> Self {
        Self {
            wind_speed,
            wind_direction,
            ..self
        }
    }
    /// Adds a source
    pub fn source<S: Into<String>>(mut self, name: S, source: SourceBuilder) -> Self {
        self.sources.insert(name.into(), source);
        self
    }
    pub fn atmosphere(self, atmosphere: AtmoEvolutionBuilder) -> Self {
        Self { atmosphere, ..self }
    }
    pub fn propagation(self, propagation: AtmoPropagationBuilder) -> Self {
        Self {
            propagation,
            ..self
        }
    }
    /// Adds a wavefront sensor
    pub fn sensor<S: Into<String>>(mut self, name: S, sensor: SensorConfig) -> Self {
        self.sensors.insert(name.into(), sensor);
        self
    }
    pub fn context(self, context: ExecutionContext) -> Self {
        Self { context, ..self }
    }
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.time_step > 0.) {
            return Err(ConfigError::TimeStep(self.time_step));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::NoSource);
        }
        if let Some((sensor, config)) = self
            .sensors
            .iter()
            .find(|(_, config)| !self.sources.contains_key(&config.source))
        {
            return Err(ConfigError::UnknownSource {
                sensor: sensor.clone(),
                source_name: config.source.clone(),
            });
        }
        let expected = self.atmosphere.heights.len();
        for found in [self.wind_speed.len(), self.wind_direction.len()] {
            if found != expected {
                return Err(ConfigError::Wind { expected, found });
            }
        }
        Ok(())
    }
}

impl Builder for SimulationConfig {
    type Component = Pipeline;
    /// Builds the simulation [Pipeline]
    fn build(self) -> std::result::Result<Pipeline, RsaoError> {
        self.validate()?;
        let sources = self
            .sources
            .into_iter()
            .map(|(name, builder)| builder.build().map(|src| (name, src)))
            .collect::<std::result::Result<SourceDict, RsaoError>>()?;

        let atmosphere = AtmoEvolutionBuilder {
            pixel_pupil: self.pixel_pupil,
            pixel_pitch: self.pixel_pitch,
            sources: sources.clone(),
            context: self.context,
            ..self.atmosphere
        }
        .build()?;
        let mut propagation = AtmoPropagationBuilder {
            sources,
            pixel_pupil: self.pixel_pupil,
            pixel_pitch: self.pixel_pitch,
            context: self.context,
            ..self.propagation
        }
        .build()?;
        propagation.setup(atmosphere.layers())?;

        let sensors = self
            .sensors
            .into_iter()
            .map(|(name, config)| {
                config
                    .model
                    .pupil(self.pixel_pupil, self.pixel_pitch)
                    .context(self.context)
                    .build()
                    .map(|sensor| (name, config.source, sensor))
            })
            .collect::<std::result::Result<Vec<_>, RsaoError>>()?;

        Ok(Pipeline::new(atmosphere, propagation, sensors)?
            .inputs(self.seeing, self.wind_speed, self.wind_direction)
            .time_step(self.time_step, self.n_steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{wavefrontsensor::ShackHartmannBuilder, FromBuilder, Source};

    fn config() -> SimulationConfig {
        SimulationConfig::default()
            .pupil(40, 0.05)
            .source("ngs", Source::builder().magnitude(8.))
            .sensor(
                "sh",
                SensorConfig::new("ngs", ShackHartmannBuilder::default().lenslet_array(10, 6)),
            )
    }

    #[test]
    fn toml_round_trip() {
        let config = config();
        let path = std::env::temp_dir().join("rsao_simulation_config.toml");
        config.save(&path).unwrap();
        let other = SimulationConfig::load(&path).unwrap();
        assert_eq!(config, other);
    }

    #[test]
    fn from_toml() {
        let config: SimulationConfig = toml::from_str(
            r#"
pixel_pupil = 40
pixel_pitch = 0.05
wind_speed = [5.5, 10.0]
wind_direction = [0.0, 90.0]

[sources.ngs]
magnitude = 8.0

[atmosphere]
heights = [30.0, 26500.0]
cn2 = [0.5, 0.5]

[sensors.sh]
source = "ngs"
model = { kind = "shack-hartmann", n_subap = 10, subap_npx = 6 }
"#,
        )
        .unwrap();
        assert_eq!(config.atmosphere.heights, vec![30., 26500.]);
        assert!(matches!(
            config.sensors["sh"].model,
            SensorBuilder::ShackHartmann(ShackHartmannBuilder { n_subap: 10, .. })
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            SimulationConfig::default().validate(),
            Err(ConfigError::NoSource)
        ));
        assert!(matches!(
            config()
                .sensor("pwfs", SensorConfig::new("lgs", SensorBuilder::default()))
                .validate(),
            Err(ConfigError::UnknownSource { .. })
        ));
        assert!(matches!(
            config().wind(vec![1., 2.], vec![0.]).validate(),
            Err(ConfigError::Wind {
                expected: 1,
                found: 2
            })
        ));
    }
}
