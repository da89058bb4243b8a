//!
//! # Adaptive optics simulation core
//!
//! `rsao` simulates the optical path of an adaptive optics system:
//! an atmosphere made of infinite, non-repeating turbulence phase screens
//! advected by the wind, the propagation of the turbulence through the
//! atmospheric layers toward the telescope pupil for natural and laser guide
//! stars, and the wavefront sensors (pyramid and Shack-Hartmann) that turn an
//! electric field into a detector frame.
//!
//! Every element is created with the builder associated to it:
//! ```no_run
//! use rsao::{Builder, FromBuilder, AtmoEvolution, Source, SourceDict};
//!
//! let mut sources = SourceDict::new();
//! sources.insert("ngs".to_string(), Source::builder().build()?);
//! let mut atm = AtmoEvolution::builder()
//!     .heights(vec![30., 26500.])
//!     .cn2(vec![0.5, 0.5])
//!     .pixel_pupil(160)
//!     .pixel_pitch(0.05)
//!     .sources(sources)
//!     .build()?;
//! atm.trigger(1_000_000, 0.65, &[5.5, 5.5], &[0., 0.])?;
//! # Ok::<(), rsao::RsaoError>(())
//! ```
//!
//! A complete simulation is described with a [`SimulationConfig`] (usually loaded from a toml file)
//! and run with the [`Pipeline`] it builds.

pub mod atmosphere;
pub mod context;
pub mod electric_field;
pub mod error;
pub mod layer;
pub mod phase_screen;
pub mod pipeline;
pub mod propagation;
pub mod scheduler;
pub mod source;
pub mod time;
pub mod utilities;
pub mod wavefrontsensor;

#[doc(inline)]
pub use self::atmosphere::{AtmoEvolution, AtmoEvolutionBuilder, AtmosphereError};
#[doc(inline)]
pub use self::context::{Backend, ExecutionContext};
#[doc(inline)]
pub use self::electric_field::ElectricField;
#[doc(inline)]
pub use self::error::RsaoError;
#[doc(inline)]
pub use self::layer::Layer;
#[doc(inline)]
pub use self::phase_screen::{InfinitePhaseScreen, PhaseScreenError};
#[doc(inline)]
pub use self::pipeline::{ConfigError, Pipeline, SensorConfig, SimulationConfig};
#[doc(inline)]
pub use self::propagation::{AtmoPropagation, AtmoPropagationBuilder, PropagationError};
#[doc(inline)]
pub use self::scheduler::{Graph, SchedulerError};
#[doc(inline)]
pub use self::source::{Band, Source, SourceBuilder, SourceDict};
#[doc(inline)]
pub use self::time::{Tick, Timestamped};
#[doc(inline)]
pub use self::wavefrontsensor::{
    Intensity, Pyramid, PyramidBuilder, PyramidError, Sensor, SensorBuilder, ShackHartmann,
    ShackHartmannBuilder, ShackHartmannError,
};

pub type Result<T> = std::result::Result<T, RsaoError>;

/// Builder type trait
pub trait Builder: Default {
    type Component;
    fn new() -> Self {
        Default::default()
    }
    fn build(self) -> Result<Self::Component>;
}

/// Access to the builder of a component
///
/// ```
/// use rsao::{Builder, FromBuilder, Source};
/// let src = Source::builder().magnitude(8.).build().unwrap();
/// ```
pub trait FromBuilder {
    type ComponentBuilder: Builder;
    fn builder() -> Self::ComponentBuilder {
        Self::ComponentBuilder::new()
    }
}
