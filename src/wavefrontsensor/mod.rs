//! # Wavefront sensors
//!
//! The wavefront sensors turn the electric field of a source into a detector [Intensity].
//! Two diffractive models are available:
//!  - [Pyramid]: modulated pyramid wavefront sensor,
//!  - [ShackHartmann]: lenslet array wavefront sensor.
//!
//! Both are wrapped into the [Sensor] enum used by the simulation [Pipeline](crate::Pipeline).

use serde::{Deserialize, Serialize};

use crate::{electric_field::ElectricField, time::Tick, utilities::Mat, Builder, RsaoError};

pub mod pyramid;
pub mod shackhartmann;

#[doc(inline)]
pub use pyramid::{
    ExtendedSource, Pyramid, PyramidBuilder, PyramidError, PyramidGeometry, QuadCell, Slopes,
    SourcePoint,
};
#[doc(inline)]
pub use shackhartmann::{ShackHartmann, ShackHartmannBuilder, ShackHartmannError};

/// Detector frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intensity {
    /// Photon counts per pixel
    pub i: Mat,
    pub generation_time: Tick,
}
impl Intensity {
    /// Dark `n`x`n` frame
    pub fn new(n: usize) -> Self {
        Self {
            i: Mat::zeros(n, n),
            generation_time: 0,
        }
    }
    /// Updates the frame and its time stamp
    pub fn set(&mut self, i: Mat, t: Tick) {
        self.i = i;
        self.generation_time = t;
    }
    /// Total number of photons
    pub fn total(&self) -> f64 {
        self.i.sum()
    }
    /// Frame size in pixels
    pub fn size(&self) -> usize {
        self.i.nrows()
    }
}

/// Wavefront sensor models
#[derive(Debug, Clone)]
pub enum Sensor {
    Pyramid(Pyramid),
    ShackHartmann(ShackHartmann),
}
impl From<Pyramid> for Sensor {
    fn from(value: Pyramid) -> Self {
        Sensor::Pyramid(value)
    }
}
impl From<ShackHartmann> for Sensor {
    fn from(value: ShackHartmann) -> Self {
        Sensor::ShackHartmann(value)
    }
}
impl Sensor {
    /// Propagates the electric field `ef` to the detector at time `t`
    pub fn trigger(&mut self, t: Tick, ef: &ElectricField) -> crate::Result<&Intensity> {
        Ok(match self {
            Sensor::Pyramid(pym) => pym.trigger(t, ef)?,
            Sensor::ShackHartmann(sh) => sh.trigger(t, ef)?,
        })
    }
    /// Detector frame
    pub fn intensity(&self) -> &Intensity {
        match self {
            Sensor::Pyramid(pym) => pym.intensity(),
            Sensor::ShackHartmann(sh) => sh.intensity(),
        }
    }
    /// Sensing wavelength in nm
    pub fn wavelength(&self) -> f64 {
        match self {
            Sensor::Pyramid(pym) => pym.wavelength(),
            Sensor::ShackHartmann(sh) => sh.wavelength(),
        }
    }
}

/// [Sensor] builder
///
/// The model is selected with the `kind` key when deserialized:
/// ```toml
/// kind = "pyramid"
/// pup_diam = 30
/// output_resolution = 80
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SensorBuilder {
    Pyramid(PyramidBuilder),
    ShackHartmann(ShackHartmannBuilder),
}
impl Default for SensorBuilder {
    fn default() -> Self {
        SensorBuilder::Pyramid(PyramidBuilder::default())
    }
}
impl From<PyramidBuilder> for SensorBuilder {
    fn from(value: PyramidBuilder) -> Self {
        SensorBuilder::Pyramid(value)
    }
}
impl From<ShackHartmannBuilder> for SensorBuilder {
    fn from(value: ShackHartmannBuilder) -> Self {
        SensorBuilder::ShackHartmann(value)
    }
}
impl SensorBuilder {
    /// Sets the input field sampling of the sensor
    pub fn pupil(self, pixel_pupil: usize, pixel_pitch: f64) -> Self {
        match self {
            SensorBuilder::Pyramid(builder) => builder
                .pixel_pupil(pixel_pupil)
                .pixel_pitch(pixel_pitch)
                .into(),
            SensorBuilder::ShackHartmann(builder) => builder
                .pixel_pupil(pixel_pupil)
                .pixel_pitch(pixel_pitch)
                .into(),
        }
    }
    pub fn context(self, context: crate::ExecutionContext) -> Self {
        match self {
            SensorBuilder::Pyramid(builder) => builder.context(context).into(),
            SensorBuilder::ShackHartmann(builder) => builder.context(context).into(),
        }
    }
}
impl Builder for SensorBuilder {
    type Component = Sensor;
    fn build(self) -> std::result::Result<Sensor, RsaoError> {
        Ok(match self {
            SensorBuilder::Pyramid(builder) => builder.build()?.into(),
            SensorBuilder::ShackHartmann(builder) => builder.build()?.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FromBuilder;

    #[test]
    fn sensor_from_toml() {
        let builder: SensorBuilder = toml::from_str(
            r#"
kind = "shack-hartmann"
n_subap = 10
subap_npx = 6
"#,
        )
        .unwrap();
        let builder = builder.pupil(40, 0.05);
        let sensor = builder.build().unwrap();
        assert_eq!(sensor.intensity().size(), 60);
        assert_eq!(sensor.wavelength(), 750.);
    }

    #[test]
    fn sensor_trigger() {
        let mut sensor = Sensor::from(
            ShackHartmann::builder()
                .pixel_pupil(40)
                .lenslet_array(10, 4)
                .build()
                .unwrap(),
        );
        let ef = ElectricField::new(40, 0.05, 1e3);
        let frame = sensor.trigger(7, &ef).unwrap();
        assert_eq!(frame.generation_time, 7);
        assert!(frame.total() > 0.);
        assert!(sensor.trigger(8, &ElectricField::new(8, 0.05, 1.)).is_err());
    }
}
