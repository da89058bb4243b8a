#[derive(Debug, thiserror::Error)]
pub enum RsaoError {
    #[error("cannot build `::rsao::Source`")]
    Source(#[from] crate::source::SourceError),
    #[error("cannot build `::rsao::InfinitePhaseScreen`")]
    PhaseScreen(#[from] crate::PhaseScreenError),
    #[error("atmosphere evolution failed")]
    Atmosphere(#[from] crate::AtmosphereError),
    #[error("atmosphere propagation failed")]
    Propagation(#[from] crate::PropagationError),
    #[error("pyramid wavefront sensor failed")]
    Pyramid(#[from] crate::PyramidError),
    #[error("Shack-Hartmann wavefront sensor failed")]
    ShackHartmann(#[from] crate::ShackHartmannError),
    #[error("cannot schedule the simulation")]
    Scheduler(#[from] crate::SchedulerError),
    #[error("invalid simulation configuration")]
    Config(#[from] crate::pipeline::ConfigError),
}
