use rustc_hash::FxHashMap;

use crate::frame::MacAddr;

use super::{NodeId, NodeKind, Topology};

/// An on-demand snapshot of the fabric's up/down relationships, used to
/// answer "which direction is the destination in" queries.
///
/// The snapshot is immutable between `build` calls and goes stale after
/// any topology mutation; it is rebuilt wholesale, never patched.
#[derive(Debug, Default, derive_new::new)]
pub struct AdjacencyTree {
    #[new(default)]
    built: bool,
    #[new(default)]
    addr_map: FxHashMap<MacAddr, NodeId>,
    #[new(default)]
    links: FxHashMap<NodeId, TreeNode>,
}

#[derive(Debug, Default)]
struct TreeNode {
    parents: Vec<NodeId>,
    children: Vec<NodeId>,
}

impl AdjacencyTree {
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Full O(N) rebuild from the node arena. Leaf nodes of kind Vm
    /// enter the address map.
    pub fn build(&mut self, topology: &Topology) {
        self.addr_map.clear();
        self.links.clear();
        for node in topology.iter() {
            self.links.insert(
                node.id,
                TreeNode {
                    parents: node.ups.clone(),
                    children: node.downs.clone(),
                },
            );
            if node.downs.is_empty() && node.kind == NodeKind::Vm {
                if let Some(addr) = node.address {
                    self.addr_map.insert(addr, node.id);
                }
            }
        }
        self.built = true;
    }

    pub fn node_by_addr(&self, addr: MacAddr) -> Option<NodeId> {
        self.addr_map.get(&addr).copied()
    }

    pub fn parents(&self, node: NodeId) -> &[NodeId] {
        self.links
            .get(&node)
            .map(|entry| entry.parents.as_slice())
            .unwrap_or(&[])
    }

    /// The subset of `src`'s children whose subtree contains `dst`, or
    /// `src`'s parent list if no child subtree does: route toward the
    /// root unless the destination is strictly below. `src == dst`
    /// yields the empty set.
    pub fn find_out_nodes_to_dst(&self, src: NodeId, dst: NodeId) -> Vec<NodeId> {
        if src == dst {
            return Vec::new();
        }
        let entry = self
            .links
            .get(&src)
            .expect("find_out_nodes_to_dst: src not in snapshot");
        let mut out: Vec<NodeId> = entry
            .children
            .iter()
            .copied()
            .filter(|&child| self.in_subtree(dst, child))
            .collect();
        if out.is_empty() {
            out = entry.parents.clone();
        }
        out
    }

    /// Depth-first walk down the cached child lists. Relies on the
    /// adjacency being acyclic, which link construction guarantees.
    fn in_subtree(&self, n: NodeId, root: NodeId) -> bool {
        if n == root {
            return true;
        }
        let mut frontier = vec![root];
        while let Some(node) = frontier.pop() {
            let Some(entry) = self.links.get(&node) else {
                continue;
            };
            for &child in &entry.children {
                if child == n {
                    return true;
                }
                frontier.push(child);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // root -> {s0, s1}; s0 -> {h0}; s1 -> {h1}; h0 -> {vm0}; h1 -> {vm1}
    fn sample() -> (Topology, Vec<NodeId>) {
        let mut topo = Topology::new();
        let root = topo.add_node("root", NodeKind::Switch);
        let s0 = topo.add_node("s0", NodeKind::Switch);
        let s1 = topo.add_node("s1", NodeKind::Switch);
        let h0 = topo.add_node("h0", NodeKind::Host);
        let h1 = topo.add_node("h1", NodeKind::Host);
        let vm0 = topo.add_node("vm0", NodeKind::Vm);
        let vm1 = topo.add_node("vm1", NodeKind::Vm);
        topo.node_mut(vm0).address = Some(MacAddr::from_u64(2));
        topo.node_mut(vm1).address = Some(MacAddr::from_u64(4));
        topo.link(root, s0);
        topo.link(root, s1);
        topo.link(s0, h0);
        topo.link(s1, h1);
        topo.link(h0, vm0);
        topo.link(h1, vm1);
        (topo, vec![root, s0, s1, h0, h1, vm0, vm1])
    }

    #[test]
    fn vm_addresses_enter_the_map() {
        let (topo, ids) = sample();
        let mut tree = AdjacencyTree::new();
        tree.build(&topo);
        assert_eq!(tree.node_by_addr(MacAddr::from_u64(2)), Some(ids[5]));
        assert_eq!(tree.node_by_addr(MacAddr::from_u64(9)), None);
    }

    #[test]
    fn routes_down_when_dst_is_below() {
        let (topo, ids) = sample();
        let (root, s0, h0, vm0) = (ids[0], ids[1], ids[3], ids[5]);
        let mut tree = AdjacencyTree::new();
        tree.build(&topo);
        // exactly the one child whose subtree holds the destination
        assert_eq!(tree.find_out_nodes_to_dst(root, vm0), vec![s0]);
        assert_eq!(tree.find_out_nodes_to_dst(s0, vm0), vec![h0]);
    }

    #[test]
    fn falls_back_to_parents_when_dst_is_elsewhere() {
        let (topo, ids) = sample();
        let (root, s0, vm1) = (ids[0], ids[1], ids[6]);
        let mut tree = AdjacencyTree::new();
        tree.build(&topo);
        // vm1 hangs under s1, so s0 must route up
        assert_eq!(tree.find_out_nodes_to_dst(s0, vm1), vec![root]);
    }

    #[test]
    fn self_destination_is_trivial() {
        let (topo, ids) = sample();
        let s0 = ids[1];
        let mut tree = AdjacencyTree::new();
        tree.build(&topo);
        assert!(tree.find_out_nodes_to_dst(s0, s0).is_empty());
    }

    #[test]
    fn rebuild_reflects_new_links() {
        let (mut topo, ids) = sample();
        let (root, s1) = (ids[0], ids[2]);
        let mut tree = AdjacencyTree::new();
        tree.build(&topo);

        let h2 = topo.add_node("h2", NodeKind::Host);
        let vm2 = topo.add_node("vm2", NodeKind::Vm);
        topo.node_mut(vm2).address = Some(MacAddr::from_u64(6));
        topo.link(s1, h2);
        topo.link(h2, vm2);

        // stale until rebuilt
        assert_eq!(tree.node_by_addr(MacAddr::from_u64(6)), None);
        tree.build(&topo);
        assert_eq!(tree.node_by_addr(MacAddr::from_u64(6)), Some(vm2));
        assert_eq!(tree.find_out_nodes_to_dst(root, vm2), vec![s1]);
    }
}
