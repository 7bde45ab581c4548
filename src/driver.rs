//! The top-level entry point: wires a built [`Fabric`] and a workload
//! into a simulation and runs it to completion.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::info;
use typed_builder::TypedBuilder;

use crate::{
    builder::Fabric,
    data::Record,
    entities::workload::Workload,
    frame::FrameDesc,
    simulation::Simulation,
    topology::NodeKind,
    units::Nanosecs,
};

#[derive(Debug, TypedBuilder)]
pub struct Config {
    pub fabric: Fabric,
    pub frames: Vec<FrameDesc>,
    /// Events past this instant are not executed.
    #[builder(default)]
    pub timeout: Option<Nanosecs>,
}

/// Runs the workload over the fabric and returns one record per
/// delivered frame, ordered by delivery time.
pub fn run(cfg: Config) -> Vec<Record> {
    let Fabric {
        topology,
        channels,
        ports,
        bridges,
        resources: _,
    } = cfg.fabric;

    let endpoints = topology
        .iter()
        .filter(|node| node.kind() == NodeKind::Vm)
        .filter_map(|node| {
            let addr = node.address()?;
            let port = node.devices().first().copied()?;
            Some((addr, port))
        })
        .collect::<FxHashMap<_, _>>();

    let mut frames = cfg.frames;
    frames.sort_by_key(|desc| desc.start);
    info!(
        nodes = topology.len(),
        endpoints = endpoints.len(),
        frames = frames.len(),
        "starting run"
    );

    let workload = Workload::new(frames.into(), endpoints);
    let sim = Simulation::builder()
        .topology(topology)
        .channels(channels)
        .ports(ports)
        .bridges(bridges)
        .workload(workload)
        .timeout(cfg.timeout.map(|t| t.into_time()))
        .build();
    sim.run()
}

/// Reads a JSON workload: a list of frame descriptors.
pub fn read_frames(path: impl AsRef<Path>) -> Result<Vec<FrameDesc>, Error> {
    let contents = fs::read_to_string(path)?;
    let frames = serde_json::from_str(&contents)?;
    Ok(frames)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse workload")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
