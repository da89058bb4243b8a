use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    context::ExecutionContext, electric_field::ElectricField, source::SourceDict, Builder,
    RsaoError,
};

use super::{AtmoPropagation, PropagationError};

/// [AtmoPropagation] builder
///
/// Default properties:
///  * sources        : none
///  * pixel pupil    : 160px
///  * pixel pitch    : 5cm
///  * fresnel        : none
///  * pupil position : [0,0]m
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmoPropagationBuilder {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: SourceDict,
    pub pixel_pupil: usize,
    pub pixel_pitch: f64,
    pub fresnel: Option<f64>,
    pub pupil_position: [f64; 2],
    pub context: ExecutionContext,
}
impl Default for AtmoPropagationBuilder {
    fn default() -> Self {
        Self {
            sources: SourceDict::new(),
            pixel_pupil: 160,
            pixel_pitch: 0.05,
            fresnel: None,
            pupil_position: [0., 0.],
            context: ExecutionContext::default(),
        }
    }
}
impl AtmoPropagationBuilder {
    pub fn sources(self, sources: SourceDict) -> Self {
        Self { sources, ..self }
    }
    /// Sets the pupil size in pixels
    pub fn pixel_pupil(self, pixel_pupil: usize) -> Self {
        Self {
            pixel_pupil,
            ..self
        }
    }
    /// Sets the pupil pixel size in meters
    pub fn pixel_pitch(self, pixel_pitch: f64) -> Self {
        Self {
            pixel_pitch,
            ..self
        }
    }
    /// Enables the Fresnel propagation between layers at `wavelength` in nm
    pub fn fresnel(self, wavelength: f64) -> Self {
        Self {
            fresnel: Some(wavelength),
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
    pub fn context(self, context: ExecutionContext) -> Self {
        Self { context, ..self }
    }
}
impl Builder for AtmoPropagationBuilder {
    type Component = AtmoPropagation;
    fn build(self) -> std::result::Result<AtmoPropagation, RsaoError> {
        if self.sources.is_empty() {
            return Err(PropagationError::NoSource.into());
        }
        if self.pixel_pupil == 0 {
            return Err(PropagationError::PupilSize.into());
        }
        if let Some(wavelength) = self.fresnel {
            if !(wavelength > 0.) {
                return Err(PropagationError::Wavelength(wavelength).into());
            }
        }
        let fields = self
            .sources
            .values()
            .map(|src| ElectricField::new(self.pixel_pupil, self.pixel_pitch, src.phot_density()))
            .collect();
        Ok(AtmoPropagation {
            sources: self.sources.into_iter().collect(),
            fields,
            pixel_pupil: self.pixel_pupil,
            pixel_pitch: self.pixel_pitch,
            pupil_position: self.pupil_position,
            fresnel_wavelength: self.fresnel,
            fresnel: None,
            maps: Vec::new(),
            context: self.context,
        })
    }
}
