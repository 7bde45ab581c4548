//! Fabric construction: tiers of switches, hosts, bipartite links
//! between them, and capacity-constrained VM placement.

use rand::{rngs::StdRng, Rng, SeedableRng};
use rustc_hash::FxHashMap;
use tracing::warn;
use typed_builder::TypedBuilder;

use crate::{
    backoff::{Backoff, BackoffConfig},
    entities::{
        bridge::{Bridge, BridgeHook},
        channel::{ChannelId, SharedChannel},
        port::{Port, PortId},
    },
    forward::{ForwardEngine, LearnForward},
    frame::{MacAddr, MacAllocator},
    resources::{HostResources, VmPlacementRequest},
    time::Delta,
    topology::{NodeId, NodeKind, Topology},
    units::{BitsPerSec, Gbps},
};

/// Which forwarding engine every bridge in the fabric runs.
#[derive(Debug, Clone, Copy)]
pub enum ForwardKind {
    /// Source-learning with flooding; entries expire after `ttl`.
    Learning { ttl: Delta },
    /// Topology-driven; parallel paths are picked at random from `seed`.
    Static { seed: u64 },
}

impl Default for ForwardKind {
    fn default() -> Self {
        Self::Learning {
            ttl: LearnForward::DEFAULT_TTL,
        }
    }
}

/// How VMs are spread over a host set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Fill the given hosts in order; stop at the first host that cannot
    /// cover a reservation.
    Explicit,
    /// Draw a host uniformly per VM, dropping exhausted hosts from the
    /// pool.
    Random,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("node {0} is not a switch")]
    NotASwitch(NodeId),
    #[error("node {0} is not a host")]
    NotAHost(NodeId),
    #[error("node {0} cannot sit on the downlink side of a tier")]
    BadTier(NodeId),
    #[error("node {0} has no bridge")]
    NoBridge(NodeId),
    #[error("reserved bandwidth must be nonzero")]
    ZeroReservation,
    #[error("reserved bandwidth {reserved} exceeds the hard limit {hard_limit}")]
    ReservationAboveLimit {
        reserved: BitsPerSec,
        hard_limit: BitsPerSec,
    },
}

/// Fabric-wide knobs. Link rate and delay apply to switch-tier links
/// created after the config is in effect; VM virtual links always run at
/// the placement's hard bandwidth limit with no delay.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct FabricConfig {
    #[builder(default = Gbps::new(1).into_bps(), setter(into))]
    pub link_rate: BitsPerSec,
    #[builder(default, setter(into))]
    pub link_delay: Delta,
    #[builder(default)]
    pub forward: ForwardKind,
    #[builder(default = true)]
    pub full_duplex: bool,
    /// Hold each sender's slot until its signal has fully propagated.
    #[builder(default = false)]
    pub source_prop: bool,
    #[builder(default)]
    pub backoff: BackoffConfig,
    #[builder(default)]
    pub seed: u64,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A fully constructed fabric, ready to run a workload.
#[derive(Debug)]
pub struct Fabric {
    pub(crate) topology: Topology,
    pub(crate) channels: FxHashMap<ChannelId, SharedChannel>,
    pub(crate) ports: FxHashMap<PortId, Port>,
    pub(crate) bridges: FxHashMap<NodeId, Bridge>,
    pub(crate) resources: FxHashMap<NodeId, HostResources>,
}

impl Fabric {
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn host_resources(&self, host: NodeId) -> Option<&HostResources> {
        self.resources.get(&host)
    }

    /// The endpoint address of a placed VM.
    pub fn vm_address(&self, vm: NodeId) -> Option<MacAddr> {
        self.topology.node(vm).address()
    }
}

/// Builds one fabric: nodes, links, bridges and VM placement, in the
/// order the caller asks for them.
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub struct FabricBuilder {
    cfg: FabricConfig,
    topology: Topology,
    channels: FxHashMap<ChannelId, SharedChannel>,
    ports: FxHashMap<PortId, Port>,
    #[derivative(Debug = "ignore")]
    bridges: FxHashMap<NodeId, Bridge>,
    resources: FxHashMap<NodeId, HostResources>,
    macs: MacAllocator,
    rng: StdRng,
}

impl FabricBuilder {
    pub fn new(cfg: FabricConfig) -> Self {
        Self {
            cfg,
            topology: Topology::new(),
            channels: FxHashMap::default(),
            ports: FxHashMap::default(),
            bridges: FxHashMap::default(),
            resources: FxHashMap::default(),
            macs: MacAllocator::new(),
            rng: StdRng::seed_from_u64(cfg.seed),
        }
    }

    /// Overrides the rate and delay used for links created from now on.
    pub fn set_link(&mut self, rate: impl Into<BitsPerSec>, delay: impl Into<Delta>) {
        self.cfg.link_rate = rate.into();
        self.cfg.link_delay = delay.into();
    }

    /// Creates `n` switch nodes, each with a bridge running the
    /// configured forwarding engine.
    pub fn create_switches(&mut self, n: usize) -> Vec<NodeId> {
        (0..n).map(|_| self.create_bridged(NodeKind::Switch)).collect()
    }

    /// Creates `n` host nodes, each bridged like a switch and carrying
    /// `bandwidth` of allocatable link capacity.
    pub fn create_hosts(&mut self, n: usize, bandwidth: impl Into<BitsPerSec>) -> Vec<NodeId> {
        let bandwidth = bandwidth.into();
        (0..n)
            .map(|_| {
                let id = self.create_bridged(NodeKind::Host);
                self.resources.insert(id, HostResources::new(bandwidth));
                id
            })
            .collect()
    }

    /// Adds a named counted resource (cores, memory, ...) to a host.
    pub fn add_host_resource(
        &mut self,
        host: NodeId,
        name: impl Into<String>,
        total: u64,
    ) -> Result<(), BuildError> {
        let res = self
            .resources
            .get_mut(&host)
            .ok_or(BuildError::NotAHost(host))?;
        res.add_named(name, total);
        Ok(())
    }

    /// Renames `nodes` to `{prefix}{index}`, indices in slice order.
    pub fn set_names(&mut self, nodes: &[NodeId], prefix: &str) {
        for (i, &node) in nodes.iter().enumerate() {
            self.topology.node_mut(node).name = format!("{prefix}{i}");
        }
    }

    /// Links two tiers completely: every `up` switch to every `down`
    /// node, using the current link rate and delay.
    pub fn connect(&mut self, ups: &[NodeId], downs: &[NodeId]) -> Result<(), BuildError> {
        for &up in ups {
            for &down in downs {
                self.connect_pair(up, down)?;
            }
        }
        Ok(())
    }

    /// Creates one channel between an uplink switch and a downlink
    /// switch or host, with a port and bridge attachment on each side.
    pub fn connect_pair(&mut self, up: NodeId, down: NodeId) -> Result<(), BuildError> {
        if self.topology.node(up).kind() != NodeKind::Switch {
            return Err(BuildError::NotASwitch(up));
        }
        if self.topology.node(down).kind() == NodeKind::Vm {
            return Err(BuildError::BadTier(down));
        }
        if !self.bridges.contains_key(&up) {
            return Err(BuildError::NoBridge(up));
        }
        if !self.bridges.contains_key(&down) {
            return Err(BuildError::NoBridge(down));
        }
        let chan = self.new_channel(self.cfg.link_rate, self.cfg.link_delay);
        for node in [up, down] {
            let addr = self.macs.allocate();
            let port = self.new_port(node, chan, addr);
            self.bridges
                .get_mut(&node)
                .expect("invalid node ID")
                .add_port(port);
        }
        self.topology.link(up, down);
        Ok(())
    }

    /// Splices an observation hook into a bridge's receive path. Hooks
    /// run in installation order.
    pub fn install_hook(
        &mut self,
        node: NodeId,
        hook: Box<dyn BridgeHook>,
    ) -> Result<(), BuildError> {
        self.bridges
            .get_mut(&node)
            .ok_or(BuildError::NoBridge(node))?
            .install_hook(hook);
        Ok(())
    }

    /// Places VMs over `hosts` per the request and policy. Returns the
    /// VMs actually created; a capacity shortfall ends placement early
    /// but keeps everything granted so far.
    ///
    /// Under `Explicit`, `count` VMs are requested on each host in slice
    /// order. Under `Random`, `count` VMs total are spread uniformly
    /// over the hosts that still have capacity.
    pub fn allocate_vms(
        &mut self,
        hosts: &[NodeId],
        req: &VmPlacementRequest,
        placement: Placement,
    ) -> Result<Vec<NodeId>, BuildError> {
        if req.reserved_bw == BitsPerSec::ZERO {
            return Err(BuildError::ZeroReservation);
        }
        if req.reserved_bw > req.hard_limit_bw {
            return Err(BuildError::ReservationAboveLimit {
                reserved: req.reserved_bw,
                hard_limit: req.hard_limit_bw,
            });
        }
        for &host in hosts {
            if self.topology.node(host).kind() != NodeKind::Host {
                return Err(BuildError::NotAHost(host));
            }
        }

        let mut vms = Vec::new();
        match placement {
            Placement::Explicit => {
                'outer: for &host in hosts {
                    for _ in 0..req.count {
                        match self.place_vm(host, req) {
                            Some(vm) => vms.push(vm),
                            None => {
                                warn!(
                                    host = self.topology.node(host).name(),
                                    placed = vms.len(),
                                    "placement shortfall, stopping"
                                );
                                break 'outer;
                            }
                        }
                    }
                }
            }
            Placement::Random => {
                let mut pool = hosts.to_vec();
                while vms.len() < req.count as usize && !pool.is_empty() {
                    let i = self.rng.gen_range(0..pool.len());
                    match self.place_vm(pool[i], req) {
                        Some(vm) => vms.push(vm),
                        None => {
                            pool.swap_remove(i);
                        }
                    }
                }
            }
        }
        Ok(vms)
    }

    pub fn finish(self) -> Fabric {
        Fabric {
            topology: self.topology,
            channels: self.channels,
            ports: self.ports,
            bridges: self.bridges,
            resources: self.resources,
        }
    }

    fn create_bridged(&mut self, kind: NodeKind) -> NodeId {
        let name = format!("node{}", self.topology.len());
        let node = self.topology.add_node(name, kind);
        let engine = match self.cfg.forward {
            ForwardKind::Learning { ttl } => ForwardEngine::learning(ttl),
            ForwardKind::Static { seed } => {
                ForwardEngine::fixed(seed.wrapping_add(node.into_usize() as u64))
            }
        };
        let bridge = Bridge::new(node, self.macs.allocate(), engine);
        self.bridges.insert(node, bridge);
        node
    }

    /// Reserves capacity on `host` and, if granted, creates the VM node
    /// with its virtual link.
    fn place_vm(&mut self, host: NodeId, req: &VmPlacementRequest) -> Option<NodeId> {
        let res = self.resources.get_mut(&host).expect("invalid host ID");
        if !res.try_reserve(req.reserved_bw, &req.resources) {
            return None;
        }

        let host_node = self.topology.node(host);
        let name = format!("{}:vm{}", host_node.name(), host_node.down_nodes().len());
        let vm = self.topology.add_node(name, NodeKind::Vm);
        let addr = self.macs.allocate();
        self.topology.node_mut(vm).address = Some(addr);

        // the virtual link is capped at the hard limit and has no delay
        let chan = self.new_channel(req.hard_limit_bw, Delta::ZERO);
        let host_addr = self.macs.allocate();
        let host_port = self.new_port(host, chan, host_addr);
        self.bridges
            .get_mut(&host)
            .expect("invalid host ID")
            .add_port(host_port);
        self.new_port(vm, chan, addr);
        self.topology.link(host, vm);
        Some(vm)
    }

    fn new_channel(&mut self, rate: BitsPerSec, delay: Delta) -> ChannelId {
        let id = ChannelId::new(self.channels.len());
        let chan = SharedChannel::builder()
            .id(id)
            .rate(rate)
            .delay(delay)
            .full_duplex(self.cfg.full_duplex)
            .source_prop(self.cfg.source_prop)
            .build();
        self.channels.insert(id, chan);
        id
    }

    fn new_port(&mut self, node: NodeId, channel: ChannelId, address: MacAddr) -> PortId {
        let id = PortId::new(self.ports.len());
        let chan = self.channels.get_mut(&channel).expect("invalid channel ID");
        let slot = chan.attach(id);
        let port = Port::builder()
            .id(id)
            .node(node)
            .channel(channel)
            .slot(slot)
            .address(address)
            .rate(chan.rate())
            .backoff(Backoff::new(
                self.cfg.backoff,
                self.cfg.seed ^ id.into_usize() as u64,
            ))
            .build();
        self.ports.insert(id, port);
        self.topology.node_mut(node).devices.push(id);
        id
    }
}
