//! The in-memory topology model: a weighted undirected graph over hosts and
//! switches plus the lookup indexes every hot path goes through.

pub mod types;

use itertools::Itertools;
use petgraph::graph::{NodeIndex, UnGraph};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::sidecar::Sidecar;

pub use types::{Host, LinkRecord, MacAddr, NodeId, PortId, Snapshot, SwitchId};

/// Edge weight parameters. The host-switch weight must be dominated by
/// switch-switch costs so host attachment never dominates the path metric.
#[derive(Debug, Clone, Copy)]
pub struct EdgeWeights {
    pub host_switch: f64,
    pub default_link: f64,
}

impl Default for EdgeWeights {
    fn default() -> Self {
        Self {
            host_switch: 0.1,
            default_link: 1.0,
        }
    }
}

/// The topology model. Built once per invocation from a controller snapshot
/// and the sidecar; borrowed read-only by the routing backends.
#[derive(Debug, Clone)]
pub struct Topology {
    graph: UnGraph<NodeId, f64>,
    id2idx: FxHashMap<NodeId, NodeIndex>,
    mac_to_ip: FxHashMap<MacAddr, String>,
    mac_to_location: FxHashMap<MacAddr, (SwitchId, PortId)>,
    port_map: FxHashMap<(NodeId, NodeId), PortId>,
    switch_set: FxHashSet<SwitchId>,
    hosts: Vec<Host>,
    host_switch_weight: f64,
}

impl Topology {
    /// Builds the graph and all indexes from a snapshot.
    ///
    /// Correctness properties:
    ///
    /// - With more than one switch, hosts cannot exist without links; an
    ///   empty link listing next to a populated host listing means the
    ///   controller's discovery is incomplete.
    /// - Every host's location must reference a switch in the switch set.
    ///
    /// A disconnected graph is valid; cross-component pairs are later skipped
    /// by the routing engine.
    pub fn build(
        snapshot: Snapshot,
        sidecar: &Sidecar,
        weights: EdgeWeights,
    ) -> Result<Self, TopologyError> {
        let Snapshot {
            mut hosts,
            switches,
            links,
        } = snapshot;

        let switch_set = switches.iter().cloned().collect::<FxHashSet<_>>();

        // CORRECTNESS: With more than one switch, hosts cannot exist without
        // links.
        if !hosts.is_empty() && links.is_empty() && switch_set.len() > 1 {
            return Err(TopologyError::Incomplete {
                nr_hosts: hosts.len(),
            });
        }
        // CORRECTNESS: Every host's location must reference a known switch.
        for host in &hosts {
            if !switch_set.contains(&host.switch) {
                return Err(TopologyError::UnknownSwitch {
                    mac: host.mac.clone(),
                    switch: host.switch.clone(),
                });
            }
        }

        hosts.sort_by(|a, b| a.mac.cmp(&b.mac));

        let mut mac_to_ip = FxHashMap::default();
        let mut mac_to_location = FxHashMap::default();
        let mut port_map = FxHashMap::default();
        for host in &hosts {
            mac_to_ip.insert(host.mac.clone(), host.primary_ip().to_owned());
            mac_to_location.insert(host.mac.clone(), (host.switch.clone(), host.port.clone()));
            port_map.insert(
                (
                    NodeId::switch(host.switch.clone()),
                    NodeId::host(host.mac.clone()),
                ),
                host.port.clone(),
            );
        }
        for link in &links {
            port_map.insert(
                (
                    NodeId::switch(link.src.clone()),
                    NodeId::switch(link.dst.clone()),
                ),
                link.src_port.clone(),
            );
        }

        let mut graph = UnGraph::default();
        let mut id2idx = FxHashMap::default();
        let mut idx_of = |graph: &mut UnGraph<NodeId, f64>, id: NodeId| -> NodeIndex {
            *id2idx
                .entry(id.clone())
                .or_insert_with(|| graph.add_node(id))
        };
        for switch in switches.iter().sorted() {
            idx_of(&mut graph, NodeId::switch(switch.clone()));
        }
        for host in &hosts {
            let h = idx_of(&mut graph, NodeId::host(host.mac.clone()));
            let s = idx_of(&mut graph, NodeId::switch(host.switch.clone()));
            graph.update_edge(h, s, weights.host_switch);
        }
        for link in &links {
            let a = idx_of(&mut graph, NodeId::switch(link.src.clone()));
            let b = idx_of(&mut graph, NodeId::switch(link.dst.clone()));
            // Both directions of a link are listed; weigh the edge once.
            if graph.find_edge(a, b).is_none() {
                let weight = link_weight(link, sidecar, weights.default_link);
                graph.add_edge(a, b, weight);
            }
        }

        let nr_components = petgraph::algo::connected_components(&graph);
        if nr_components > 1 {
            warn!(nr_components, "topology has disconnected components");
        }
        debug!(
            nr_hosts = hosts.len(),
            nr_switches = switch_set.len(),
            nr_edges = graph.edge_count(),
            "topology rebuilt"
        );

        Ok(Self {
            graph,
            id2idx,
            mac_to_ip,
            mac_to_location,
            port_map,
            switch_set,
            hosts,
            host_switch_weight: weights.host_switch,
        })
    }

    /// The physical port to emit on when standing at `from` with next hop
    /// `to`.
    pub fn port_between(&self, from: &NodeId, to: &NodeId) -> Option<&PortId> {
        self.port_map.get(&(from.clone(), to.clone()))
    }

    /// The attachment switch of a host.
    pub fn host_switch(&self, mac: &MacAddr) -> Option<&SwitchId> {
        self.mac_to_location.get(mac).map(|(switch, _)| switch)
    }

    /// The primary IP of a host.
    pub fn host_ip(&self, mac: &MacAddr) -> Option<&str> {
        self.mac_to_ip.get(mac).map(String::as_str)
    }

    /// The weight of the graph edge between two nodes, if one exists.
    pub fn edge_weight(&self, a: &NodeId, b: &NodeId) -> Option<f64> {
        let a = *self.id2idx.get(a)?;
        let b = *self.id2idx.get(b)?;
        let edge = self.graph.find_edge(a, b)?;
        self.graph.edge_weight(edge).copied()
    }

    pub fn contains_switch(&self, id: &SwitchId) -> bool {
        self.switch_set.contains(id)
    }

    pub fn idx_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.id2idx.get(id).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &NodeId {
        &self.graph[idx]
    }

    pub fn graph(&self) -> &UnGraph<NodeId, f64> {
        &self.graph
    }

    pub fn host_switch_weight(&self) -> f64 {
        self.host_switch_weight
    }

    pub fn nr_hosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn nr_switches(&self) -> usize {
        self.switch_set.len()
    }

    delegate::delegate! {
        to self.hosts {
            /// Returns an iterator over all hosts, ordered by MAC.
            #[call(iter)]
            pub fn hosts(&self) -> impl Iterator<Item = &Host>;
        }

        to self.graph {
            /// Returns the number of graph vertices (hosts + switches).
            #[call(node_count)]
            pub fn nr_nodes(&self) -> usize;

            /// Returns the number of graph edges.
            #[call(edge_count)]
            pub fn nr_edges(&self) -> usize;
        }
    }
}

/// The weight of a switch-switch edge: the sidecar distance keyed by datapath
/// ids, else the default with a recorded warning.
fn link_weight(link: &LinkRecord, sidecar: &Sidecar, default: f64) -> f64 {
    match sidecar.distance(link.src.dpid(), link.dst.dpid()) {
        Some(distance) => distance,
        None => {
            warn!(
                src = %link.src,
                dst = %link.dst,
                default,
                "no sidecar distance for link, using default weight"
            );
            default
        }
    }
}

/// Reasons a controller snapshot cannot form a usable topology.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Hosts were discovered but no links; the listing is incomplete.
    #[error("topology incomplete: {nr_hosts} hosts discovered but no links")]
    Incomplete { nr_hosts: usize },

    /// A host's location references a switch missing from the device listing.
    #[error("host {mac} attached to unknown switch {switch}")]
    UnknownSwitch { mac: MacAddr, switch: SwitchId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn empty_snapshot_succeeds() -> anyhow::Result<()> {
        let topo = Topology::build(Snapshot::default(), &Sidecar::default(), EdgeWeights::default())?;
        assert_eq!(topo.nr_nodes(), 0);
        Ok(())
    }

    #[test]
    fn hosts_without_links_fails() {
        let (mut snapshot, _) = testing::linear_chain();
        snapshot.links.clear();
        let res = Topology::build(snapshot, &Sidecar::default(), EdgeWeights::default());
        assert!(matches!(res, Err(TopologyError::Incomplete { nr_hosts: 2 })));
    }

    #[test]
    fn single_switch_needs_no_links() -> anyhow::Result<()> {
        let topo = Topology::build(
            testing::single_switch_pair(),
            &Sidecar::default(),
            EdgeWeights::default(),
        )?;
        assert_eq!(topo.nr_hosts(), 2);
        assert_eq!(topo.nr_switches(), 1);
        assert_eq!(topo.nr_edges(), 2);
        Ok(())
    }

    #[test]
    fn host_at_unknown_switch_fails() {
        let mut snapshot = testing::linear_chain().0;
        snapshot.hosts[0].switch = SwitchId::new("of:00000000000000ff");
        let res = Topology::build(snapshot, &Sidecar::default(), EdgeWeights::default());
        assert!(matches!(res, Err(TopologyError::UnknownSwitch { .. })));
    }

    #[test]
    fn indexes_answer_port_queries() -> anyhow::Result<()> {
        let (snapshot, sidecar) = testing::linear_chain();
        let topo = Topology::build(snapshot, &sidecar, EdgeWeights::default())?;

        let s1 = NodeId::switch(SwitchId::new("of:0000000000000001"));
        let s2 = NodeId::switch(SwitchId::new("of:0000000000000002"));
        let h1 = NodeId::host(MacAddr::new("02:00:00:00:00:01"));

        // Switch-to-switch ports come from the directed link listings.
        assert_eq!(topo.port_between(&s1, &s2), Some(&PortId::new("2")));
        assert_eq!(topo.port_between(&s2, &s1), Some(&PortId::new("1")));
        // Switch-to-host ports come from host locations.
        assert_eq!(topo.port_between(&s1, &h1), Some(&PortId::new("1")));
        // Hosts have no egress port map entries.
        assert_eq!(topo.port_between(&h1, &s1), None);
        Ok(())
    }

    #[test]
    fn host_lookups_use_indexes() -> anyhow::Result<()> {
        let (snapshot, sidecar) = testing::linear_chain();
        let topo = Topology::build(snapshot, &sidecar, EdgeWeights::default())?;
        let mac = MacAddr::new("02:00:00:00:00:01");
        assert_eq!(
            topo.host_switch(&mac),
            Some(&SwitchId::new("of:0000000000000001"))
        );
        assert_eq!(topo.host_ip(&mac), Some("10.0.0.1"));
        Ok(())
    }

    #[test]
    fn sidecar_weight_applies_in_either_key_order() -> anyhow::Result<()> {
        // The sidecar holds "0...1-0...2" only; both link directions resolve it.
        let (snapshot, sidecar) = testing::linear_chain();
        let topo = Topology::build(snapshot, &sidecar, EdgeWeights::default())?;
        let s1 = NodeId::switch(SwitchId::new("of:0000000000000001"));
        let s2 = NodeId::switch(SwitchId::new("of:0000000000000002"));
        assert_eq!(topo.edge_weight(&s1, &s2), Some(10.0));
        assert_eq!(topo.edge_weight(&s2, &s1), Some(10.0));
        Ok(())
    }

    #[test]
    fn missing_distance_falls_back_to_default() -> anyhow::Result<()> {
        let (snapshot, _) = testing::linear_chain();
        let weights = EdgeWeights {
            host_switch: 0.1,
            default_link: 1.0,
        };
        let topo = Topology::build(snapshot, &Sidecar::default(), weights)?;
        let s1 = NodeId::switch(SwitchId::new("of:0000000000000001"));
        let s2 = NodeId::switch(SwitchId::new("of:0000000000000002"));
        assert_eq!(topo.edge_weight(&s1, &s2), Some(1.0));
        Ok(())
    }

    #[test]
    fn host_edges_use_host_switch_weight() -> anyhow::Result<()> {
        let (snapshot, sidecar) = testing::linear_chain();
        let topo = Topology::build(snapshot, &sidecar, EdgeWeights::default())?;
        let h1 = NodeId::host(MacAddr::new("02:00:00:00:00:01"));
        let s1 = NodeId::switch(SwitchId::new("of:0000000000000001"));
        assert_eq!(topo.edge_weight(&h1, &s1), Some(0.1));
        Ok(())
    }

    #[test]
    fn duplicate_link_listings_collapse() -> anyhow::Result<()> {
        let (snapshot, sidecar) = testing::linear_chain();
        let nr_listings = snapshot.links.len();
        let topo = Topology::build(snapshot, &sidecar, EdgeWeights::default())?;
        // Two listings per physical link, plus one edge per host.
        assert_eq!(topo.nr_edges(), nr_listings / 2 + topo.nr_hosts());
        Ok(())
    }
}
