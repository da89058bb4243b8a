//! # Atmospheric propagation
//!
//! [AtmoPropagation] composes the pupil electric field of each source from the atmospheric layers.
//!
//! For each (source, layer) pair, the footprint of the pupil onto the layer is either extracted
//! directly from the center of the layer or resampled with a cached bilinear [Interp2D]
//! that accounts for the source direction, the cone of a laser guide star, the layer rotation,
//! shift and magnification and the pupil position.

use std::{collections::HashMap, sync::Arc};

use crate::{
    context::ExecutionContext,
    electric_field::ElectricField,
    layer::Layer,
    source::Source,
    time::Tick,
    utilities::{make_xy, Interp2D, Mat},
    FromBuilder,
};

mod builder;
mod fresnel;
pub use builder::AtmoPropagationBuilder;
pub use fresnel::{field_propagator, Fresnel};

#[derive(Debug, thiserror::Error)]
pub enum PropagationError {
    #[error("no source to propagate")]
    NoSource,
    #[error("no layer to propagate through")]
    NoLayer,
    #[error("the pupil must have at least one pixel")]
    PupilSize,
    #[error("layer #{layer} is above the source {source_name}")]
    InvalidGeometry { source_name: String, layer: usize },
    #[error("layer #{layer} ({size}px) does not cover the pupil footprint")]
    LayerSize { layer: usize, size: usize },
    #[error("layers must be sorted from highest to lowest or from lowest to highest")]
    NonMonotonicHeights,
    #[error("the propagation is not setup for the current layers")]
    NotSetup,
    #[error("the Fresnel propagation wavelength must be positive, found {0}nm")]
    Wavelength(f64),
    #[error("non finite electric field for source {0}")]
    NonFinite(String),
}
pub type Result<T> = std::result::Result<T, PropagationError>;

/// Mapping of a layer onto the pupil
#[derive(Debug, Clone)]
pub enum LayerMap {
    /// Sub-rectangle starting at (row, column)
    Direct { topleft: (usize, usize) },
    Interpolated(Arc<Interp2D>),
}
impl LayerMap {
    fn apply(&self, ef: &mut ElectricField, layer: &Layer, phase: &Mat) {
        match self {
            LayerMap::Direct { topleft } => ef.product_subrect(layer, *topleft),
            LayerMap::Interpolated(interp) => {
                ef.amplitude
                    .component_mul_assign(&interp.interpolate(&layer.amplitude));
                ef.phase += interp.interpolate(phase);
            }
        }
    }
}

/// Per source propagation through the atmospheric layers
#[derive(Debug)]
pub struct AtmoPropagation {
    sources: Vec<(String, Source)>,
    fields: Vec<ElectricField>,
    pixel_pupil: usize,
    pixel_pitch: f64,
    pupil_position: [f64; 2],
    fresnel_wavelength: Option<f64>,
    fresnel: Option<Fresnel>,
    maps: Vec<Vec<LayerMap>>,
    context: ExecutionContext,
}
impl FromBuilder for AtmoPropagation {
    type ComponentBuilder = AtmoPropagationBuilder;
}
impl AtmoPropagation {
    /// Output name of the electric field of a source
    pub fn output_name(source_name: &str) -> String {
        format!("out_{}_ef", source_name)
    }
    /// Electric field by output name `out_<source>_ef`
    pub fn output(&self, name: &str) -> Option<&ElectricField> {
        self.sources
            .iter()
            .position(|(source, _)| Self::output_name(source) == name)
            .map(|k| &self.fields[k])
    }
    /// Electric field of a source
    pub fn field(&self, source_name: &str) -> Option<&ElectricField> {
        self.sources
            .iter()
            .position(|(source, _)| source == source_name)
            .map(|k| &self.fields[k])
    }
    /// Output names and electric fields
    pub fn outputs(&self) -> impl Iterator<Item = (String, &ElectricField)> {
        self.sources
            .iter()
            .zip(&self.fields)
            .map(|((name, _), ef)| (Self::output_name(name), ef))
    }
    pub fn sources(&self) -> impl Iterator<Item = (&str, &Source)> {
        self.sources.iter().map(|(name, src)| (name.as_str(), src))
    }
    /// Layer maps of a source, available after [setup](AtmoPropagation::setup)
    pub fn layer_maps(&self, source_name: &str) -> Option<&[LayerMap]> {
        self.sources
            .iter()
            .position(|(source, _)| source == source_name)
            .and_then(|k| self.maps.get(k))
            .map(|maps| maps.as_slice())
    }
    pub fn is_setup(&self) -> bool {
        !self.maps.is_empty()
    }
    /// Layer position (column, row) in pixels of the pupil center seen from `source`
    fn pixel_position(&self, source: &Source, layer: &Layer) -> [f64; 2] {
        let (s, c) = source.phi().sin_cos();
        let pitch = layer.pixel_pitch;
        let [px, py] = self.pupil_position.map(|x| x / pitch);
        if source.is_at_infinity() {
            let r = source.r() * layer.height / pitch;
            [r * c + px, r * s + py]
        } else {
            let r = source.r() * source.height() / pitch;
            let ratio = layer.height / source.height();
            [(r * c - px) * ratio + px, (r * s - py) * ratio + py]
        }
    }
    /// Computes the mapping of every layer onto the pupil of every source
    ///
    /// Must be called before the first [trigger](AtmoPropagation::trigger) and whenever the layer geometry changes.
    /// Sources with the same geometry share the same interpolators.
    pub fn setup(&mut self, layers: &[Layer]) -> Result<()> {
        if layers.is_empty() {
            return Err(PropagationError::NoLayer);
        }
        let n = self.pixel_pupil;
        if let Some((layer, size)) = layers
            .iter()
            .enumerate()
            .map(|(k, l)| (k, l.size()))
            .find(|(_, size)| *size < n)
        {
            return Err(PropagationError::LayerSize { layer, size });
        }
        self.fresnel = match self.fresnel_wavelength {
            Some(wavelength) => {
                let heights: Vec<f64> = layers.iter().map(|l| l.height).collect();
                let ascending = heights.windows(2).all(|w| w[0] <= w[1]);
                let descending = heights.windows(2).all(|w| w[0] >= w[1]);
                if !(ascending || descending) {
                    return Err(PropagationError::NonMonotonicHeights);
                }
                Some(Fresnel::new(n, self.pixel_pitch, wavelength, &heights))
            }
            None => None,
        };
        let mut cache: HashMap<(usize, [u64; 5]), Arc<Interp2D>> = HashMap::new();
        let on_pupil_axis = self.pupil_position == [0., 0.];
        let mut maps = Vec::with_capacity(self.sources.len());
        for (name, source) in &self.sources {
            let mut source_maps = Vec::with_capacity(layers.len());
            for (k, layer) in layers.iter().enumerate() {
                let size = layer.size();
                let on_axis = layer.height == 0. || (source.is_at_infinity() && source.r() == 0.);
                if on_axis && on_pupil_axis && layer.is_aligned(self.pixel_pitch) {
                    let delta = (size - n) / 2;
                    source_maps.push(LayerMap::Direct {
                        topleft: (delta, delta),
                    });
                    continue;
                }
                if !(source.height() - layer.height > 0.) {
                    return Err(PropagationError::InvalidGeometry {
                        source_name: name.clone(),
                        layer: k,
                    });
                }
                let mut pupmeta = if source.is_at_infinity() {
                    n as f64
                } else {
                    n as f64 * (source.height() - layer.height.abs()).abs() / source.height()
                };
                pupmeta /= layer.magnification.max(1.);
                let ratio = 0.5 * pupmeta * self.pixel_pitch / layer.pixel_pitch;
                let [x, y] = self.pixel_position(source, layer);
                let center = 0.5 * (size as f64 - 1.);
                let origin = [center - layer.shift[0] + x, center - layer.shift[1] + y];
                let (s, c) = layer.rotation_deg.to_radians().sin_cos();
                let extent = ratio * (n as f64 - 1.) / n as f64 * (s.abs() + c.abs());
                let edge = (size - 1) as f64 + 1e-9;
                if origin
                    .iter()
                    .any(|o| o - extent < -1e-9 || o + extent > edge)
                {
                    return Err(PropagationError::LayerSize { layer: k, size });
                }
                let key = (
                    k,
                    [
                        origin[0].to_bits(),
                        origin[1].to_bits(),
                        ratio.to_bits(),
                        layer.rotation_deg.to_bits(),
                        size as u64,
                    ],
                );
                let interp = cache
                    .entry(key)
                    .or_insert_with(|| {
                        let (xx, yy) = make_xy(n, ratio, false, false);
                        Arc::new(Interp2D::new(
                            (size, size),
                            &xx,
                            &yy,
                            layer.rotation_deg,
                            origin,
                        ))
                    })
                    .clone();
                source_maps.push(LayerMap::Interpolated(interp));
            }
            maps.push(source_maps);
        }
        log::info!(
            "propagation setup: {} sources, {} layers, {} interpolators",
            self.sources.len(),
            layers.len(),
            cache.len()
        );
        self.maps = maps;
        Ok(())
    }
    /// Propagates the sources through the `layers` at time `t`
    pub fn trigger(&mut self, t: Tick, layers: &[Layer]) -> Result<()> {
        if self.maps.first().map(|m| m.len()) != Some(layers.len()) {
            return Err(PropagationError::NotSetup);
        }
        // magnified layers: the phase outside of the amplitude mask is set to the mean phase
        let phases: Vec<std::borrow::Cow<'_, Mat>> = layers
            .iter()
            .map(|layer| {
                if layer.magnification > 1. {
                    let mean = layer.masked_mean_phase();
                    std::borrow::Cow::Owned(
                        layer
                            .phase
                            .zip_map(&layer.amplitude, |p, a| if a == 0. { mean } else { p }),
                    )
                } else {
                    std::borrow::Cow::Borrowed(&layer.phase)
                }
            })
            .collect();
        let fresnel = self.fresnel.as_ref();
        let mut work: Vec<_> = self
            .fields
            .iter_mut()
            .zip(&self.maps)
            .zip(&self.sources)
            .collect();
        self.context
            .try_for_each_mut(&mut work, |((ef, maps), (name, _))| {
                ef.reset();
                for (j, ((map, layer), phase)) in
                    maps.iter().zip(layers).zip(&phases).enumerate()
                {
                    map.apply(ef, layer, phase);
                    if let Some(fresnel) = fresnel {
                        fresnel.propagate(j, ef);
                    }
                }
                if !ef.is_finite() {
                    return Err(PropagationError::NonFinite(name.clone()));
                }
                ef.generation_time = t;
                Ok(())
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Builder, SourceDict};

    fn sources() -> SourceDict {
        let mut sources = SourceDict::new();
        for (name, position) in [("a", [30., 45.]), ("b", [30., 45.]), ("c", [0., 0.])] {
            sources.insert(
                name.to_string(),
                Source::builder().polar_coordinate(position).build().unwrap(),
            );
        }
        sources.insert(
            "lgs".to_string(),
            Source::builder()
                .polar_coordinate([20., 0.])
                .height(90e3)
                .build()
                .unwrap(),
        );
        sources
    }

    fn layers() -> Vec<Layer> {
        let mut ground = Layer::new(32, 0.1, 0.);
        ground.phase = Mat::from_fn(32, 32, |i, j| (i + 2 * j) as f64);
        let mut high = Layer::new(48, 0.1, 10e3);
        high.phase = Mat::from_fn(48, 48, |i, j| (i * j) as f64 / 10.);
        vec![high, ground]
    }

    #[test]
    fn shared_interpolators() {
        let mut propagation = AtmoPropagation::builder()
            .sources(sources())
            .pixel_pupil(16)
            .pixel_pitch(0.1)
            .build()
            .unwrap();
        let layers = layers();
        propagation.setup(&layers).unwrap();
        let (a, b) = (
            propagation.layer_maps("a").unwrap(),
            propagation.layer_maps("b").unwrap(),
        );
        match (&a[0], &b[0]) {
            (LayerMap::Interpolated(ia), LayerMap::Interpolated(ib)) => {
                assert!(Arc::ptr_eq(ia, ib));
                assert_eq!(ia, ib);
            }
            _ => panic!("expected interpolated maps for the high layer"),
        }
        // ground layer and on-axis star: direct extraction
        assert!(matches!(
            propagation.layer_maps("a").unwrap()[1],
            LayerMap::Direct { topleft: (8, 8) }
        ));
        assert!(matches!(
            propagation.layer_maps("c").unwrap()[0],
            LayerMap::Direct { topleft: (16, 16) }
        ));
        propagation.trigger(10, &layers).unwrap();
        assert_eq!(propagation.field("a"), propagation.field("b"));
        let ef = propagation.output("out_c_ef").unwrap();
        assert_eq!(ef.generation_time, 10);
        assert_eq!(
            ef.phase[(0, 0)],
            layers[0].phase[(16, 16)] + layers[1].phase[(8, 8)]
        );
    }

    #[test]
    fn source_below_layer() {
        let mut sources = SourceDict::new();
        sources.insert(
            "low".to_string(),
            Source::builder().height(5e3).build().unwrap(),
        );
        let mut propagation = AtmoPropagation::builder()
            .sources(sources)
            .pixel_pupil(16)
            .pixel_pitch(0.1)
            .build()
            .unwrap();
        assert!(matches!(
            propagation.setup(&layers()),
            Err(PropagationError::InvalidGeometry { layer: 0, .. })
        ));
    }

    #[test]
    fn trigger_before_setup() {
        let mut propagation = AtmoPropagation::builder()
            .sources(sources())
            .pixel_pupil(16)
            .pixel_pitch(0.1)
            .build()
            .unwrap();
        assert!(matches!(
            propagation.trigger(0, &layers()),
            Err(PropagationError::NotSetup)
        ));
    }

    #[test]
    fn fresnel_needs_sorted_layers() {
        let mut propagation = AtmoPropagation::builder()
            .sources(sources())
            .pixel_pupil(16)
            .pixel_pitch(0.1)
            .fresnel(500.)
            .build()
            .unwrap();
        let mut layers = layers();
        layers.push(Layer::new(48, 0.1, 5e3));
        assert!(matches!(
            propagation.setup(&layers),
            Err(PropagationError::NonMonotonicHeights)
        ));
        layers.swap(1, 2);
        propagation.setup(&layers).unwrap();
        propagation.trigger(1, &layers).unwrap();
        assert!(propagation.outputs().all(|(_, ef)| ef.is_finite()));
    }

    #[test]
    fn footprint_outside_layer() {
        let mut sources = SourceDict::new();
        sources.insert(
            "ngs".to_string(),
            Source::builder()
                .polar_coordinate([60., 0.])
                .build()
                .unwrap(),
        );
        let mut propagation = AtmoPropagation::builder()
            .sources(sources)
            .pixel_pupil(64)
            .pixel_pitch(0.125)
            .build()
            .unwrap();
        // 60" at 26.5km is ~62px off-axis, the layer is only sized for the pupil
        let layers = vec![Layer::new(64, 0.125, 26500.)];
        assert!(matches!(
            propagation.setup(&layers),
            Err(PropagationError::LayerSize { layer: 0, size: 64 })
        ));
        let layers = vec![Layer::new(64 + 2 * 64, 0.125, 26500.)];
        propagation.setup(&layers).unwrap();
    }

    #[test]
    fn magnified_layer() {
        let mut sources = SourceDict::new();
        sources.insert("ngs".to_string(), Source::builder().build().unwrap());
        let mut propagation = AtmoPropagation::builder()
            .sources(sources)
            .pixel_pupil(16)
            .pixel_pitch(0.1)
            .build()
            .unwrap();
        let mut stop = Layer::pupil_stop(32, 0.1, 0.).with_magnification(2.);
        stop.phase.fill(7.);
        let layers = vec![stop];
        propagation.setup(&layers).unwrap();
        propagation.trigger(3, &layers).unwrap();
        let ef = propagation.field("ngs").unwrap();
        // the pupil stop is demagnified onto the pupil
        assert!(ef.phase.iter().all(|p| (p - 7.).abs() < 1e-12));
        assert!(ef.amplitude.sum() > 0.);
    }
}
