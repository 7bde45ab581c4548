use rand::{rngs::StdRng, Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::{
    entities::{
        channel::{ChannelId, SharedChannel},
        port::{Port, PortId},
    },
    frame::MacAddr,
    time::{Delta, Time},
    topology::{AdjacencyTree, NodeId, Topology},
    units::Secs,
};

/// The borrows a forwarding decision may need: the node arena, the
/// shared adjacency snapshot (the topology context of one fabric), and
/// the port/channel registries for reachability checks.
pub(crate) struct TopoView<'a> {
    pub(crate) topology: &'a Topology,
    pub(crate) tree: &'a mut AdjacencyTree,
    pub(crate) ports: &'a FxHashMap<PortId, Port>,
    pub(crate) channels: &'a FxHashMap<ChannelId, SharedChannel>,
}

/// The egress policy a bridge consults, one instance per bridge.
#[derive(Debug)]
pub(crate) enum ForwardEngine {
    Learning(LearnForward),
    Static(StaticForward),
}

impl ForwardEngine {
    pub(crate) fn learning(ttl: Delta) -> Self {
        Self::Learning(LearnForward::new(ttl))
    }

    pub(crate) fn fixed(seed: u64) -> Self {
        Self::Static(StaticForward::new(seed))
    }

    pub(crate) fn learn(&mut self, incoming: PortId, src: MacAddr, now: Time) {
        match self {
            Self::Learning(f) => f.learn(incoming, src, now),
            // topology-driven forwarding has nothing to learn
            Self::Static(_) => {}
        }
    }

    pub(crate) fn out_port(
        &mut self,
        bridge: NodeId,
        bridge_ports: &[PortId],
        dst: MacAddr,
        view: &mut TopoView<'_>,
        now: Time,
    ) -> Option<PortId> {
        match self {
            Self::Learning(f) => f.out_port(dst, now),
            Self::Static(f) => f.out_port(bridge, bridge_ports, dst, view),
        }
    }

    /// Whether an unresolved destination is broadcast to all other ports
    /// (true) or dropped (false).
    pub(crate) fn flooding(&self) -> bool {
        match self {
            Self::Learning(_) => true,
            Self::Static(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LearnedEntry {
    port: PortId,
    expires: Time,
}

/// Adaptive forwarding: remembers which port each source address was
/// last seen on and routes unicast traffic back the same way until the
/// entry expires.
#[derive(Debug)]
pub(crate) struct LearnForward {
    ttl: Delta,
    table: FxHashMap<MacAddr, LearnedEntry>,
}

impl LearnForward {
    pub(crate) const DEFAULT_TTL: Delta = Secs::new(300).into_ms().into_us().into_ns().into_delta();

    pub(crate) fn new(ttl: Delta) -> Self {
        Self {
            ttl,
            table: FxHashMap::default(),
        }
    }

    /// Records/refreshes the source binding on every observed frame.
    fn learn(&mut self, incoming: PortId, src: MacAddr, now: Time) {
        self.table.insert(
            src,
            LearnedEntry {
                port: incoming,
                expires: now + self.ttl,
            },
        );
    }

    /// Expiry is checked lazily on lookup; there is no timer-driven
    /// eviction.
    fn out_port(&mut self, dst: MacAddr, now: Time) -> Option<PortId> {
        match self.table.get(&dst) {
            Some(entry) if entry.expires > now => Some(entry.port),
            Some(_) => {
                self.table.remove(&dst);
                None
            }
            None => None,
        }
    }
}

/// Topology-driven forwarding over the adjacency snapshot: route toward
/// the destination's subtree, or up toward the root. Candidate ports for
/// a destination are cached on first resolution and never invalidated,
/// even if the snapshot is later rebuilt.
#[derive(Debug)]
pub(crate) struct StaticForward {
    binding: FxHashMap<MacAddr, Vec<PortId>>,
    rng: StdRng,
}

impl StaticForward {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            binding: FxHashMap::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn out_port(
        &mut self,
        bridge: NodeId,
        bridge_ports: &[PortId],
        dst: MacAddr,
        view: &mut TopoView<'_>,
    ) -> Option<PortId> {
        if !view.tree.is_built() {
            view.tree.build(view.topology);
        }
        if !self.binding.contains_key(&dst) {
            let candidates = match view.tree.node_by_addr(dst) {
                Some(node) => view.tree.find_out_nodes_to_dst(bridge, node),
                // unknown endpoints route up toward the root
                None => view.tree.parents(bridge).to_vec(),
            };
            let ports = Self::ports_toward(bridge_ports, &candidates, view);
            self.binding.insert(dst, ports);
        }

        let ports = &self.binding[&dst];
        if ports.is_empty() {
            return None;
        }
        // spread load uniformly across parallel paths
        Some(ports[self.rng.gen_range(0..ports.len())])
    }

    /// The bridge ports whose attached channel reaches one of the chosen
    /// next-hop nodes.
    fn ports_toward(
        bridge_ports: &[PortId],
        candidates: &[NodeId],
        view: &TopoView<'_>,
    ) -> Vec<PortId> {
        bridge_ports
            .iter()
            .copied()
            .filter(|port| {
                let chan = &view.channels[&view.ports[port].channel];
                chan.ports()
                    .any(|peer| peer != *port && candidates.contains(&view.ports[&peer].node))
            })
            .collect()
    }
}
