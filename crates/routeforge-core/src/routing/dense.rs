//! A dense arena view of the topology shared by the matrix-based backends:
//! vertices in one sorted vector addressed by [`VertexId`], adjacency in a
//! flat matrix. Zero means "no edge"; the diagonal is implicitly zero.

use ndarray::Array2;
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use crate::topology::{NodeId, Topology};

identifier!(VertexId, usize);

#[derive(Debug, Clone)]
pub(crate) struct DenseGraph {
    nodes: Vec<NodeId>,
    index: FxHashMap<NodeId, VertexId>,
    adj: Array2<f64>,
}

impl DenseGraph {
    pub(crate) fn new(topo: &Topology) -> Self {
        let mut nodes = topo
            .graph()
            .node_weights()
            .cloned()
            .collect::<Vec<NodeId>>();
        nodes.sort();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), VertexId::new(i)))
            .collect::<FxHashMap<_, _>>();

        let v = nodes.len();
        let mut adj = Array2::zeros((v, v));
        for edge in topo.graph().edge_references() {
            let a = index[topo.node(edge.source())].inner();
            let b = index[topo.node(edge.target())].inner();
            adj[[a, b]] = *edge.weight();
            adj[[b, a]] = *edge.weight();
        }

        Self { nodes, index, adj }
    }

    pub(crate) fn nr_vertices(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, id: VertexId) -> &NodeId {
        &self.nodes[id.inner()]
    }

    pub(crate) fn index_of(&self, node: &NodeId) -> Option<VertexId> {
        self.index.get(node).copied()
    }

    /// The edge weight between two vertices; `0.0` means no edge.
    pub(crate) fn weight(&self, a: VertexId, b: VertexId) -> f64 {
        self.adj[[a.inner(), b.inner()]]
    }

    /// The adjacency matrix flattened to `f32` with an infinity sentinel in
    /// place of missing edges, as the GPU kernels expect.
    #[cfg(feature = "gpu")]
    pub(crate) fn to_f32_with_sentinel(&self, sentinel: f32) -> Vec<f32> {
        let v = self.nr_vertices();
        let mut out = vec![sentinel; v * v];
        for i in 0..v {
            out[i * v + i] = 0.0;
        }
        for ((i, j), &w) in self.adj.indexed_iter() {
            if w > 0.0 {
                out[i * v + j] = w as f32;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{EdgeWeights, MacAddr, SwitchId, Topology};
    use crate::{sidecar::Sidecar, testing};

    #[test]
    fn arena_is_sorted_and_symmetric() -> anyhow::Result<()> {
        let (snapshot, sidecar) = testing::linear_chain();
        let topo = Topology::build(snapshot, &sidecar, EdgeWeights::default())?;
        let dense = DenseGraph::new(&topo);

        assert_eq!(dense.nr_vertices(), topo.nr_nodes());
        let h1 = dense
            .index_of(&NodeId::host(MacAddr::new("02:00:00:00:00:01")))
            .unwrap();
        let s1 = dense
            .index_of(&NodeId::switch(SwitchId::new("of:0000000000000001")))
            .unwrap();
        let s2 = dense
            .index_of(&NodeId::switch(SwitchId::new("of:0000000000000002")))
            .unwrap();
        assert_eq!(dense.weight(h1, s1), 0.1);
        assert_eq!(dense.weight(s1, h1), 0.1);
        assert_eq!(dense.weight(s1, s2), 10.0);
        assert_eq!(dense.weight(h1, s2), 0.0);
        Ok(())
    }

    #[test]
    fn empty_topology_is_empty_arena() -> anyhow::Result<()> {
        let topo = Topology::build(
            Default::default(),
            &Sidecar::default(),
            EdgeWeights::default(),
        )?;
        let dense = DenseGraph::new(&topo);
        assert_eq!(dense.nr_vertices(), 0);
        Ok(())
    }
}
