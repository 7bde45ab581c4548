pub(crate) mod tree;

pub use tree::AdjacencyTree;

use crate::{entities::port::PortId, frame::MacAddr};

identifier!(NodeId);

/// What a fabric node is. Resolved once at construction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Switch,
    Host,
    Vm,
}

/// One node of the fabric tree: a switch, a host, or a virtual machine.
///
/// Nodes are created at setup and never destroyed; link lists are
/// append-only.
#[derive(Debug)]
pub struct FabricNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) ups: Vec<NodeId>,
    pub(crate) downs: Vec<NodeId>,
    pub(crate) devices: Vec<PortId>,
    /// Endpoint address; set for VMs only.
    pub(crate) address: Option<MacAddr>,
}

impl FabricNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn up_nodes(&self) -> &[NodeId] {
        &self.ups
    }

    pub fn down_nodes(&self) -> &[NodeId] {
        &self.downs
    }

    pub fn devices(&self) -> &[PortId] {
        &self.devices
    }

    pub fn address(&self) -> Option<MacAddr> {
        self.address
    }

    /// The device index handed out by the most recent link creation.
    pub fn last_device(&self) -> Option<PortId> {
        self.devices.last().copied()
    }
}

/// Arena of every node in one fabric. Node ids index into it and act as
/// opaque keys everywhere else.
#[derive(Debug, Default, derive_new::new)]
pub struct Topology {
    #[new(default)]
    nodes: Vec<FabricNode>,
}

impl Topology {
    pub(crate) fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(FabricNode {
            id,
            name: name.into(),
            kind,
            ups: Vec::new(),
            downs: Vec::new(),
            devices: Vec::new(),
            address: None,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &FabricNode {
        &self.nodes[id.into_usize()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut FabricNode {
        &mut self.nodes[id.into_usize()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FabricNode> {
        self.nodes.iter()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }

    pub fn find_by_prefix(&self, prefix: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.name.starts_with(prefix))
            .map(|n| n.id)
            .collect()
    }

    /// Records a parent/child relationship. Links are append-only; there
    /// is no detach.
    pub(crate) fn link(&mut self, up: NodeId, down: NodeId) {
        self.node_mut(up).downs.push(down);
        self.node_mut(down).ups.push(up);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup() {
        let mut topo = Topology::new();
        let a = topo.add_node("sw0", NodeKind::Switch);
        let b = topo.add_node("sw1", NodeKind::Switch);
        topo.add_node("host0", NodeKind::Host);
        assert_eq!(topo.find_by_name("sw1"), Some(b));
        assert_eq!(topo.find_by_name("sw9"), None);
        assert_eq!(topo.find_by_prefix("sw"), vec![a, b]);
    }

    #[test]
    fn links_are_appended_in_order() {
        let mut topo = Topology::new();
        let root = topo.add_node("root", NodeKind::Switch);
        let h0 = topo.add_node("h0", NodeKind::Host);
        let h1 = topo.add_node("h1", NodeKind::Host);
        topo.link(root, h0);
        topo.link(root, h1);
        assert_eq!(topo.node(root).down_nodes(), &[h0, h1]);
        assert_eq!(topo.node(h0).up_nodes(), &[root]);
    }
}
