mod event;
mod schedule;

pub(crate) use event::{Context, Event, EventList};
pub(crate) use schedule::Schedule;

use rustc_hash::FxHashMap;
use tracing::info;
use typed_builder::TypedBuilder;

use crate::{
    data::Record,
    entities::{
        bridge::Bridge,
        channel::{ChannelCmd, ChannelId, SharedChannel},
        port::{Port, PortCmd, PortId},
        workload::{Workload, WorkloadCmd},
    },
    forward::TopoView,
    time::Time,
    topology::{AdjacencyTree, NodeId, Topology},
};

/// Every command the schedule can carry, dispatched to the owning
/// entity.
#[derive(Debug, Clone, Copy, derive_more::From)]
pub(crate) enum Command {
    Workload(WorkloadCmd),
    Port(PortCmd),
    Channel(ChannelCmd),
}

/// The event loop and the state it advances: one fabric's entities plus
/// the schedule. Entities never call each other directly; all
/// interaction flows through commands dispatched here.
#[derive(Debug, TypedBuilder)]
pub(crate) struct Simulation {
    #[builder(default, setter(skip))]
    cur_time: Time,
    #[builder(default, setter(skip))]
    schedule: Schedule,

    topology: Topology,
    /// Built lazily by the first topology-driven forwarding decision.
    #[builder(default, setter(skip))]
    tree: AdjacencyTree,
    channels: FxHashMap<ChannelId, SharedChannel>,
    ports: FxHashMap<PortId, Port>,
    bridges: FxHashMap<NodeId, Bridge>,
    workload: Workload,

    #[builder(default)]
    timeout: Option<Time>,
}

impl Simulation {
    /// Runs to completion (or to the timeout) and returns the delivery
    /// records collected at the endpoints, ordered by delivery time.
    pub(crate) fn run(mut self) -> Vec<Record> {
        self.schedule
            .push(Event::new(Time::ZERO, WorkloadCmd::new_step()));
        while let Some(event) = self.schedule.pop() {
            if self.timeout.is_some_and(|timeout| event.time() > timeout) {
                info!(time = %event.time(), "timeout reached, stopping");
                break;
            }
            debug_assert!(event.time() >= self.cur_time, "time went backwards");
            self.cur_time = event.time();
            let events = self.apply(event.cmd);
            for event in events {
                self.schedule.push(event);
            }
        }
        self.finish()
    }

    fn apply(&mut self, cmd: Command) -> EventList {
        match cmd {
            Command::Workload(WorkloadCmd::Step) => {
                self.workload.step(Context::at(self.cur_time))
            }
            Command::Port(cmd) => self.apply_port(cmd),
            Command::Channel(cmd) => self.apply_channel(cmd),
        }
    }

    fn apply_port(&mut self, cmd: PortCmd) -> EventList {
        let mut ctx = Context::at(self.cur_time);
        match cmd {
            PortCmd::Send { port, frame } => {
                let port = self.ports.get_mut(&port).expect("invalid port ID");
                let chan = self
                    .channels
                    .get_mut(&port.channel)
                    .expect("invalid channel ID");
                port.send(frame, chan, &mut ctx);
            }
            PortCmd::TrySend { port } => {
                let port = self.ports.get_mut(&port).expect("invalid port ID");
                let chan = self
                    .channels
                    .get_mut(&port.channel)
                    .expect("invalid channel ID");
                port.try_send(chan, &mut ctx);
            }
            PortCmd::TxComplete { port } => {
                let port = self.ports.get_mut(&port).expect("invalid port ID");
                let chan = self
                    .channels
                    .get_mut(&port.channel)
                    .expect("invalid channel ID");
                port.tx_complete(chan, &mut ctx);
            }
            PortCmd::Receive { port, frame, .. } => {
                let node = self.ports.get(&port).expect("invalid port ID").node;
                match self.bridges.get_mut(&node) {
                    // switch and host ports hand the frame to their bridge
                    Some(bridge) => {
                        let mut view = TopoView {
                            topology: &self.topology,
                            tree: &mut self.tree,
                            ports: &self.ports,
                            channels: &self.channels,
                        };
                        bridge.receive(port, frame, &mut view, &mut ctx);
                    }
                    // VM ports are endpoints
                    None => {
                        let port = self.ports.get_mut(&port).expect("invalid port ID");
                        port.deliver(frame, &ctx);
                    }
                }
            }
        }
        ctx.into_events()
    }

    fn apply_channel(&mut self, cmd: ChannelCmd) -> EventList {
        match cmd {
            ChannelCmd::PropagationComplete { channel, device } => {
                let chan = self
                    .channels
                    .get_mut(&channel)
                    .expect("invalid channel ID");
                chan.propagation_complete(device);
            }
        }
        EventList::new()
    }

    fn finish(self) -> Vec<Record> {
        let mut records = self
            .ports
            .into_values()
            .flat_map(|port| port.records)
            .collect::<Vec<_>>();
        records.sort_by_key(|rec| (rec.delivered, rec.id));
        records
    }
}
