//! # Guide stars
//!
//! A [Source] is either a natural guide star at infinity or a laser guide star at a finite height.
//! Its position in the sky is given in polar coordinates: the distance to the optical axis
//! in arcsecond and the azimuth in degree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skyangle::Conversion;

use crate::{
    utilities::coordinates::{Polar, Rectangular},
    Builder, FromBuilder, RsaoError,
};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source wavelength must be positive, found {0}nm")]
    Wavelength(f64),
    #[error("source height must be positive, found {0}m")]
    Height(f64),
}

/// Named guide stars
pub type SourceDict = BTreeMap<String, Source>;

/// Photometric bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    V,
    R,
    I,
    J,
    H,
    K,
}
impl Band {
    const ALL: [Band; 6] = [Band::V, Band::R, Band::I, Band::J, Band::H, Band::K];
    /// Band center wavelength in nm
    pub fn wavelength(&self) -> f64 {
        match self {
            Band::V => 550.,
            Band::R => 640.,
            Band::I => 790.,
            Band::J => 1215.,
            Band::H => 1654.,
            Band::K => 2179.,
        }
    }
    /// Photon flux density of a zero magnitude star in photon/s/m²
    pub fn zero_point(&self) -> f64 {
        match self {
            Band::V => 9.0e9,
            Band::R => 1.0e10,
            Band::I => 7.2e9,
            Band::J => 5.1e9,
            Band::H => 2.9e9,
            Band::K => 1.9e9,
        }
    }
    /// The band with the center wavelength closest to `wavelength` in nm
    pub fn closest(wavelength: f64) -> Self {
        Self::ALL
            .into_iter()
            .min_by(|a, b| {
                (a.wavelength() - wavelength)
                    .abs()
                    .total_cmp(&(b.wavelength() - wavelength).abs())
            })
            .unwrap_or(Band::V)
    }
}

/// Guide star
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    polar_coordinate: [f64; 2],
    height: f64,
    magnitude: f64,
    wavelength_nm: f64,
    band: Band,
}
impl FromBuilder for Source {
    type ComponentBuilder = SourceBuilder;
}
impl Source {
    /// Distance to the optical axis in arcsec
    pub fn r_arcsec(&self) -> f64 {
        self.polar_coordinate[0]
    }
    /// Distance to the optical axis in radians
    pub fn r(&self) -> f64 {
        self.polar_coordinate[0].from_arcsec()
    }
    /// Azimuth in radians
    pub fn phi(&self) -> f64 {
        self.polar_coordinate[1].to_radians()
    }
    /// Height in meters, infinite for a natural guide star
    pub fn height(&self) -> f64 {
        self.height
    }
    pub fn is_at_infinity(&self) -> bool {
        self.height.is_infinite()
    }
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }
    /// Wavelength in nm
    pub fn wavelength(&self) -> f64 {
        self.wavelength_nm
    }
    pub fn band(&self) -> Band {
        self.band
    }
    /// Photon flux density in photon/s/m²
    pub fn phot_density(&self) -> f64 {
        self.band.zero_point() * 10f64.powf(-0.4 * self.magnitude)
    }
    /// Field position in arcsec
    pub fn xy_arcsec(&self) -> [f64; 2] {
        Rectangular::from(Polar::degrees(self.polar_coordinate[1], self.r_arcsec())).xy()
    }
}

/// [Source] builder
///
/// Default properties:
///  * polar coordinate : [0",0°]
///  * height           : infinite
///  * magnitude        : 0
///  * wavelength       : 750nm
///  * band             : closest to the wavelength
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceBuilder {
    polar_coordinate: [f64; 2],
    height: Option<f64>,
    magnitude: f64,
    wavelength_nm: f64,
    band: Option<Band>,
}
impl Default for SourceBuilder {
    fn default() -> Self {
        Self {
            polar_coordinate: [0., 0.],
            height: None,
            magnitude: 0.,
            wavelength_nm: 750.,
            band: None,
        }
    }
}
impl SourceBuilder {
    /// Sets the source polar coordinates: distance to the axis in arcsec and azimuth in degree
    pub fn polar_coordinate(self, polar_coordinate: [f64; 2]) -> Self {
        Self {
            polar_coordinate,
            ..self
        }
    }
    /// Sets the height of a laser guide star in meters
    pub fn height(self, height: f64) -> Self {
        Self {
            height: Some(height),
            ..self
        }
    }
    pub fn magnitude(self, magnitude: f64) -> Self {
        Self { magnitude, ..self }
    }
    /// Sets the wavelength in nm
    pub fn wavelength(self, wavelength_nm: f64) -> Self {
        Self {
            wavelength_nm,
            ..self
        }
    }
    pub fn band(self, band: Band) -> Self {
        Self {
            band: Some(band),
            ..self
        }
    }
}
impl Builder for SourceBuilder {
    type Component = Source;
    fn build(self) -> std::result::Result<Source, RsaoError> {
        if !(self.wavelength_nm > 0.) {
            return Err(SourceError::Wavelength(self.wavelength_nm).into());
        }
        let height = match self.height {
            Some(h) if !(h > 0.) => return Err(SourceError::Height(h).into()),
            Some(h) => h,
            None => f64::INFINITY,
        };
        Ok(Source {
            polar_coordinate: self.polar_coordinate,
            height,
            magnitude: self.magnitude,
            wavelength_nm: self.wavelength_nm,
            band: self.band.unwrap_or_else(|| Band::closest(self.wavelength_nm)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photometry() {
        let ngs = Source::builder().magnitude(5.).wavelength(550.).build().unwrap();
        assert_eq!(ngs.band(), Band::V);
        assert!((ngs.phot_density() - 9.0e9 * 1e-2).abs() < 1.);
        assert!(ngs.is_at_infinity());
    }

    #[test]
    fn laser_guide_star() {
        let lgs = Source::builder()
            .polar_coordinate([45., 90.])
            .height(90e3)
            .wavelength(589.)
            .build()
            .unwrap();
        assert!(!lgs.is_at_infinity());
        let [x, y] = lgs.xy_arcsec();
        assert!(x.abs() < 1e-9 && (y - 45.).abs() < 1e-9);
        assert!((lgs.r() - 45f64.from_arcsec()).abs() < 1e-15);
        assert!(Source::builder().height(-1.).build().is_err());
        assert!(Source::builder().wavelength(0.).build().is_err());
    }
}
