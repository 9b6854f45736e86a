//! The A* backend. A switch-only all-pairs distance table is computed once
//! per invocation; with it, the per-pair heuristic equals the true remaining
//! cost and every search degenerates to best-first with O(1) heuristic
//! lookups.

use petgraph::graph::NodeIndex;
use petgraph::visit::NodeFiltered;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::compile::{compile_path, RuleSet};
use crate::config::RouteOpts;
use crate::routing::{host_pairs, run_pair_batches, RouteBackend, RouteError, RouteOutcome, RouteStats};
use crate::topology::{MacAddr, NodeId, Topology};
use crate::utils;

#[derive(Debug, Default)]
pub struct AstarBackend;

impl RouteBackend for AstarBackend {
    fn name(&self) -> &'static str {
        "astar"
    }

    fn compute(&self, topo: &Topology, opts: &RouteOpts) -> Result<RouteOutcome, RouteError> {
        let nr_workers = opts.workers_for(topo.nr_nodes());
        let oracle = SwitchOracle::build(topo, nr_workers);
        let pairs = host_pairs(topo);

        Ok(run_pair_batches(&pairs, nr_workers, |chunk| {
            let mut cache = PathCache::default();
            let mut rules = RuleSet::default();
            let mut stats = RouteStats::default();
            for (src, dst) in chunk {
                if topo.host_ip(src) == topo.host_ip(dst) {
                    continue;
                }
                let found = match cache.get(src, dst) {
                    Some(hit) => hit,
                    None => {
                        let res = search(topo, &oracle, src, dst);
                        cache.insert(src, dst, res.clone());
                        res
                    }
                };
                match found {
                    Some((cost, path)) => {
                        stats.routed += 1;
                        stats.cost_sum += cost;
                        let compiled = compile_path(topo, &path, opts.priority, &mut rules);
                        stats.port_missing += compiled.port_missing;
                    }
                    None => {
                        stats.no_path += 1;
                        warn!(src = %src, dst = %dst, "no path between hosts");
                    }
                }
            }
            (rules, stats)
        }))
    }
}

fn search(
    topo: &Topology,
    oracle: &SwitchOracle,
    src: &MacAddr,
    dst: &MacAddr,
) -> Option<(f64, Vec<NodeId>)> {
    let start = topo.idx_of(&NodeId::host(src.clone()))?;
    let goal = topo.idx_of(&NodeId::host(dst.clone()))?;
    let (goal_anchor, goal_offset) = anchor_of(topo, goal);
    let (cost, path) = petgraph::algo::astar(
        topo.graph(),
        start,
        |n| n == goal,
        |e| *e.weight(),
        |n| {
            if n == goal {
                return 0.0;
            }
            let (anchor, offset) = anchor_of(topo, n);
            offset + goal_offset + oracle.distance(anchor, goal_anchor).unwrap_or(0.0)
        },
    )?;
    Some((cost, path.into_iter().map(|ix| topo.node(ix).clone()).collect()))
}

/// The anchor switch of a vertex: a host anchors at its attachment switch
/// with the host-edge weight as offset; a switch anchors at itself.
fn anchor_of(topo: &Topology, ix: NodeIndex) -> (NodeIndex, f64) {
    match topo.node(ix) {
        NodeId::Switch(_) => (ix, 0.0),
        NodeId::Host(mac) => {
            let anchor = topo
                .host_switch(mac)
                .and_then(|switch| topo.idx_of(&NodeId::switch(switch.clone())))
                .unwrap_or(ix);
            (anchor, topo.host_switch_weight())
        }
    }
}

/// The precomputed switch-to-switch all-pairs shortest-path table over the
/// switch-only subgraph. Missing entries mean the switches are disconnected.
#[derive(Debug)]
pub(crate) struct SwitchOracle {
    dist: FxHashMap<(NodeIndex, NodeIndex), f64>,
}

impl SwitchOracle {
    pub(crate) fn build(topo: &Topology, nr_workers: usize) -> Self {
        let graph = topo.graph();
        let sources = graph
            .node_indices()
            .filter(|&ix| graph[ix].is_switch())
            .collect::<Vec<_>>();
        let dist = utils::par_chunks(&sources, nr_workers, |chunk| {
            let switches_only = NodeFiltered::from_fn(graph, |ix| graph[ix].is_switch());
            let mut entries = Vec::new();
            for &src in chunk {
                let reached = petgraph::algo::dijkstra(&switches_only, src, None, |e| *e.weight());
                entries.extend(reached.into_iter().map(|(tgt, d)| ((src, tgt), d)));
            }
            entries
        })
        .collect();
        Self { dist }
    }

    pub(crate) fn distance(&self, a: NodeIndex, b: NodeIndex) -> Option<f64> {
        self.dist.get(&(a, b)).copied()
    }
}

/// Per-worker cache of completed searches, keyed by the sorted MAC pair. A
/// hit for the reverse direction returns the reversed path.
#[derive(Debug, Default)]
pub(crate) struct PathCache {
    inner: FxHashMap<(MacAddr, MacAddr), Option<(f64, Vec<NodeId>)>>,
}

impl PathCache {
    fn key(a: &MacAddr, b: &MacAddr) -> ((MacAddr, MacAddr), bool) {
        if a <= b {
            ((a.clone(), b.clone()), false)
        } else {
            ((b.clone(), a.clone()), true)
        }
    }

    pub(crate) fn get(&self, a: &MacAddr, b: &MacAddr) -> Option<Option<(f64, Vec<NodeId>)>> {
        let (key, reversed) = Self::key(a, b);
        self.inner.get(&key).map(|entry| {
            entry.as_ref().map(|(cost, path)| {
                let path = if reversed {
                    path.iter().rev().cloned().collect()
                } else {
                    path.clone()
                };
                (*cost, path)
            })
        })
    }

    pub(crate) fn insert(&mut self, a: &MacAddr, b: &MacAddr, entry: Option<(f64, Vec<NodeId>)>) {
        let (key, reversed) = Self::key(a, b);
        let entry = entry.map(|(cost, path)| {
            if reversed {
                (cost, path.into_iter().rev().collect())
            } else {
                (cost, path)
            }
        });
        self.inner.insert(key, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::Sidecar;
    use crate::testing;
    use crate::topology::{EdgeWeights, SwitchId, Topology};

    const EPS: f64 = 1e-9;

    #[test]
    fn oracle_matches_chain_distances() -> anyhow::Result<()> {
        let (snapshot, sidecar) = testing::linear_chain();
        let topo = Topology::build(snapshot, &sidecar, EdgeWeights::default())?;
        let oracle = SwitchOracle::build(&topo, 2);

        let idx = |name: &str| {
            topo.idx_of(&NodeId::switch(SwitchId::new(name)))
                .expect("missing switch")
        };
        let s1 = idx("of:0000000000000001");
        let s3 = idx("of:0000000000000003");
        assert!((oracle.distance(s1, s3).unwrap() - 20.0).abs() < EPS);
        assert!((oracle.distance(s1, s1).unwrap() - 0.0).abs() < EPS);
        Ok(())
    }

    #[test]
    fn oracle_omits_hosts() -> anyhow::Result<()> {
        let (snapshot, sidecar) = testing::linear_chain();
        let topo = Topology::build(snapshot, &sidecar, EdgeWeights::default())?;
        let oracle = SwitchOracle::build(&topo, 2);
        let h1 = topo
            .idx_of(&NodeId::host(MacAddr::new("02:00:00:00:00:01")))
            .unwrap();
        let s1 = topo
            .idx_of(&NodeId::switch(SwitchId::new("of:0000000000000001")))
            .unwrap();
        assert_eq!(oracle.distance(h1, s1), None);
        assert_eq!(oracle.distance(s1, h1), None);
        Ok(())
    }

    #[test]
    fn chain_route_has_expected_cost_and_rules() -> anyhow::Result<()> {
        let (snapshot, sidecar) = testing::linear_chain();
        let topo = Topology::build(snapshot, &sidecar, EdgeWeights::default())?;
        let outcome = AstarBackend.compute(&topo, &RouteOpts::default())?;

        assert_eq!(outcome.stats.pairs, 1);
        assert_eq!(outcome.stats.routed, 1);
        assert_eq!(outcome.stats.no_path, 0);
        // 0.1 + 10 + 10 + 0.1
        assert!((outcome.stats.cost_sum - 20.2).abs() < EPS);
        assert_eq!(outcome.rules.len(), 6);
        Ok(())
    }

    #[test]
    fn shared_switch_pair_routes_with_delivery_rules() -> anyhow::Result<()> {
        let snapshot = testing::single_switch_pair();
        let topo = Topology::build(snapshot, &Sidecar::default(), EdgeWeights::default())?;
        let outcome = AstarBackend.compute(&topo, &RouteOpts::default())?;
        assert_eq!(outcome.stats.routed, 1);
        assert_eq!(outcome.stats.no_path, 0);
        assert_eq!(outcome.stats.port_missing, 0);
        assert_eq!(outcome.rules.len(), 2);
        Ok(())
    }

    #[test]
    fn disconnected_pairs_are_counted_not_raised() -> anyhow::Result<()> {
        let snapshot = testing::split_network();
        let topo = Topology::build(snapshot, &Sidecar::default(), EdgeWeights::default())?;
        let outcome = AstarBackend.compute(&topo, &RouteOpts::default())?;
        // Three hosts: two on the connected side, one stranded. One routable
        // pair, two cross-component pairs.
        assert_eq!(outcome.stats.pairs, 3);
        assert_eq!(outcome.stats.routed, 1);
        assert_eq!(outcome.stats.no_path, 2);
        Ok(())
    }

    #[test]
    fn cache_returns_reversed_path_for_reverse_lookup() {
        let a = MacAddr::new("02:00:00:00:00:01");
        let b = MacAddr::new("02:00:00:00:00:02");
        let path = vec![
            NodeId::host(a.clone()),
            NodeId::switch(SwitchId::new("of:0000000000000001")),
            NodeId::host(b.clone()),
        ];
        let mut cache = PathCache::default();
        cache.insert(&a, &b, Some((0.2, path.clone())));

        let (cost, forward) = cache.get(&a, &b).unwrap().unwrap();
        assert_eq!(forward, path);
        assert!((cost - 0.2).abs() < EPS);

        let (_, backward) = cache.get(&b, &a).unwrap().unwrap();
        assert_eq!(backward, path.iter().rev().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn cache_remembers_missing_paths() {
        let a = MacAddr::new("02:00:00:00:00:01");
        let b = MacAddr::new("02:00:00:00:00:02");
        let mut cache = PathCache::default();
        assert!(cache.get(&a, &b).is_none());
        cache.insert(&a, &b, None);
        assert_eq!(cache.get(&b, &a), Some(None));
    }
}
