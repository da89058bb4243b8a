//! # Simulation pipeline
//!
//! The [Pipeline] drives the atmosphere, the propagation and the wavefront sensors one time step
//! after the other. The components are triggered in the order given by the dependency [Graph],
//! a component being triggered only if all of its inputs have been updated during the current step.
//!
//! ```no_run
//! use rsao::{Builder, FromBuilder, SimulationConfig, Source};
//!
//! let mut pipeline = SimulationConfig::default()
//!     .source("ngs", Source::builder().magnitude(8.))
//!     .build()?;
//! pipeline.run(10)?;
//! # Ok::<(), rsao::RsaoError>(())
//! ```

use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    electric_field::ElectricField,
    scheduler::{Graph, SchedulerError},
    time::{seconds_to_tick, Tick, Timestamped},
    wavefrontsensor::{Intensity, Sensor},
    AtmoEvolution, AtmoPropagation, Result,
};

mod config;
pub use config::{ConfigError, SensorConfig, SimulationConfig};

const ATMOSPHERE: &str = "atmosphere";
const PROPAGATION: &str = "propagation";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Node {
    Atmosphere,
    Propagation,
    Sensor(usize),
}

/// A wavefront sensor fed by the electric field of a source
#[derive(Debug, Clone)]
pub struct SensorNode {
    pub name: String,
    pub source: String,
    pub sensor: Sensor,
}

/// Time step driven simulation
#[derive(Debug)]
pub struct Pipeline {
    atmosphere: AtmoEvolution,
    propagation: AtmoPropagation,
    sensors: Vec<SensorNode>,
    graph: Graph,
    order: Vec<Node>,
    seeing: Timestamped<f64>,
    wind_speed: Timestamped<Vec<f64>>,
    wind_direction: Timestamped<Vec<f64>>,
    time_step: Tick,
    n_steps: usize,
    t: Tick,
}
impl Pipeline {
    /// Creates a new pipeline
    ///
    /// Each sensor is given with its name and the name of its source.
    pub fn new(
        atmosphere: AtmoEvolution,
        propagation: AtmoPropagation,
        sensors: Vec<(String, String, Sensor)>,
    ) -> Result<Self> {
        let mut graph = Graph::new();
        graph.add_node(ATMOSPHERE)?.add_node(PROPAGATION)?;
        graph.add_edge(ATMOSPHERE, PROPAGATION)?;
        for (name, _, _) in &sensors {
            graph.add_node(name.as_str())?;
            graph.add_edge(PROPAGATION, name)?;
        }
        let order = Self::schedule(&graph, &sensors)?;
        let n = atmosphere.n_layer();
        Ok(Self {
            atmosphere,
            propagation,
            sensors: sensors
                .into_iter()
                .map(|(name, source, sensor)| SensorNode {
                    name,
                    source,
                    sensor,
                })
                .collect(),
            graph,
            order,
            seeing: Timestamped::new(1., 0),
            wind_speed: Timestamped::new(vec![0.; n], 0),
            wind_direction: Timestamped::new(vec![0.; n], 0),
            time_step: seconds_to_tick(1e-3),
            n_steps: 1,
            t: 0,
        })
    }
    /// Maps the graph nodes, in trigger order, to the pipeline components
    fn schedule(
        graph: &Graph,
        sensors: &[(String, String, Sensor)],
    ) -> std::result::Result<Vec<Node>, SchedulerError> {
        graph
            .topological_order()?
            .into_iter()
            .map(|name| match name.as_str() {
                ATMOSPHERE => Ok(Node::Atmosphere),
                PROPAGATION => Ok(Node::Propagation),
                _ => sensors
                    .iter()
                    .position(|(sensor, _, _)| *sensor == name)
                    .map(Node::Sensor)
                    .ok_or(SchedulerError::UnknownNode(name)),
            })
            .collect()
    }
    /// Sets the seeing (arcsec), the wind speed (m/s) and the wind direction (degree)
    pub fn inputs(mut self, seeing: f64, wind_speed: Vec<f64>, wind_direction: Vec<f64>) -> Self {
        self.set_inputs(seeing, wind_speed, wind_direction);
        self
    }
    /// Sets the time step in seconds and the default number of steps
    pub fn time_step(self, time_step: f64, n_steps: usize) -> Self {
        Self {
            time_step: seconds_to_tick(time_step),
            n_steps,
            ..self
        }
    }
    /// Updates the seeing (arcsec), the wind speed (m/s) and the wind direction (degree)
    ///
    /// The new values are used from the next step on.
    pub fn set_inputs(&mut self, seeing: f64, wind_speed: Vec<f64>, wind_direction: Vec<f64>) {
        self.seeing.value = seeing;
        self.wind_speed.value = wind_speed;
        self.wind_direction.value = wind_direction;
    }
    /// Current simulation time
    pub fn time(&self) -> Tick {
        self.t
    }
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }
    pub fn graph(&self) -> &Graph {
        &self.graph
    }
    pub fn atmosphere(&self) -> &AtmoEvolution {
        &self.atmosphere
    }
    pub fn propagation(&self) -> &AtmoPropagation {
        &self.propagation
    }
    /// Electric field of a source
    pub fn field(&self, source_name: &str) -> Option<&ElectricField> {
        self.propagation.field(source_name)
    }
    pub fn sensors(&self) -> &[SensorNode] {
        &self.sensors
    }
    /// Detector frame of a sensor
    pub fn intensity(&self, sensor_name: &str) -> Option<&Intensity> {
        self.sensors
            .iter()
            .find(|node| node.name == sensor_name)
            .map(|node| node.sensor.intensity())
    }
    /// Checks that all the inputs of `node` have been updated at time `t`
    fn is_ready(&self, node: Node, t: Tick) -> bool {
        match node {
            Node::Atmosphere => {
                self.seeing.is_fresh(t)
                    && self.wind_speed.is_fresh(t)
                    && self.wind_direction.is_fresh(t)
            }
            Node::Propagation => self
                .atmosphere
                .layers()
                .iter()
                .all(|layer| layer.generation_time == t),
            Node::Sensor(k) => self
                .propagation
                .field(&self.sensors[k].source)
                .is_some_and(|ef| ef.generation_time == t),
        }
    }
    /// Advances the simulation by one time step
    pub fn step(&mut self) -> Result<Tick> {
        let t = self.t + self.time_step;
        self.seeing.generation_time = t;
        self.wind_speed.generation_time = t;
        self.wind_direction.generation_time = t;
        for k in 0..self.order.len() {
            let node = self.order[k];
            if !self.is_ready(node, t) {
                log::debug!("{node:?} skipped at {t}ns, its inputs are not up to date");
                continue;
            }
            match node {
                Node::Atmosphere => self.atmosphere.trigger(
                    t,
                    self.seeing.value,
                    &self.wind_speed.value,
                    &self.wind_direction.value,
                )?,
                Node::Propagation => self.propagation.trigger(t, self.atmosphere.layers())?,
                Node::Sensor(k) => {
                    let SensorNode { source, sensor, .. } = &mut self.sensors[k];
                    if let Some(ef) = self.propagation.field(source) {
                        sensor.trigger(t, ef)?;
                    }
                }
            }
        }
        self.t = t;
        Ok(t)
    }
    /// Runs `n_steps` time steps
    pub fn run(&mut self, n_steps: usize) -> Result<&mut Self> {
        let pb = ProgressBar::new(n_steps as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{eta_precise}] {bar:50.cyan/blue} {pos:>7}/{len:7}")
        {
            pb.set_style(style);
        }
        pb.set_message("Simulation");
        for _ in 0..n_steps {
            self.step()?;
            pb.inc(1);
        }
        pb.finish();
        Ok(self)
    }
    /// Runs the default number of time steps
    pub fn run_all(&mut self) -> Result<&mut Self> {
        self.run(self.n_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{wavefrontsensor::ShackHartmannBuilder, AtmoEvolutionBuilder, Builder, FromBuilder, Source};

    fn pipeline() -> Pipeline {
        SimulationConfig::default()
            .pupil(40, 0.05)
            .seeing(0.8)
            .wind(vec![10.], vec![30.])
            .source("ngs", Source::builder().magnitude(8.))
            .atmosphere(AtmoEvolutionBuilder::default().heights(vec![0.]).cn2(vec![1.]))
            .sensor(
                "sh",
                SensorConfig::new("ngs", ShackHartmannBuilder::default().lenslet_array(10, 6)),
            )
            .time_step(2e-3)
            .build()
            .unwrap()
    }

    #[test]
    fn schedule() {
        let pipeline = pipeline();
        assert_eq!(
            pipeline.order,
            vec![Node::Atmosphere, Node::Propagation, Node::Sensor(0)]
        );
    }

    #[test]
    fn steps() {
        let mut pipeline = pipeline();
        let t = pipeline.step().unwrap();
        assert_eq!(t, 2_000_000);
        assert!(pipeline.atmosphere().layers()[0].generation_time == t);
        assert_eq!(pipeline.field("ngs").unwrap().generation_time, t);
        let frame = pipeline.intensity("sh").unwrap();
        assert_eq!(frame.generation_time, t);
        assert!(frame.total() > 0.);
        pipeline.run(2).unwrap();
        assert_eq!(pipeline.time(), 6_000_000);
        assert_eq!(pipeline.intensity("sh").unwrap().generation_time, 6_000_000);
    }

    #[test]
    fn unscheduled_node() {
        let mut graph = Graph::new();
        graph
            .add_node(ATMOSPHERE)
            .unwrap()
            .add_node(PROPAGATION)
            .unwrap()
            .add_node("pwfs")
            .unwrap();
        assert_eq!(
            Pipeline::schedule(&graph, &[]).err(),
            Some(SchedulerError::UnknownNode("pwfs".to_string()))
        );
    }

    #[test]
    fn stale_inputs_are_skipped() {
        let mut pipeline = pipeline();
        let t = pipeline.t + pipeline.time_step;
        assert!(!pipeline.is_ready(Node::Propagation, t));
        assert!(!pipeline.is_ready(Node::Sensor(0), t));
    }

    #[test]
    fn sensor_name_clash() {
        let res = SimulationConfig::default()
            .pupil(40, 0.05)
            .wind(vec![10.], vec![30.])
            .source("ngs", Source::builder())
            .sensor(
                "atmosphere",
                SensorConfig::new("ngs", ShackHartmannBuilder::default().lenslet_array(10, 6)),
            )
            .build();
        assert!(matches!(res, Err(crate::RsaoError::Scheduler(_))));
    }
}
