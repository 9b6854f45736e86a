//! The CPU Dijkstra backend: the dense `V x V` distance matrix computed by
//! parallel single-source workers, with paths reconstructed from the matrix
//! by predecessor backtracking.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ndarray::Array2;
use ordered_float::OrderedFloat;
use tracing::warn;

use crate::compile::{compile_path, RuleSet};
use crate::config::RouteOpts;
use crate::routing::dense::{DenseGraph, VertexId};
use crate::routing::{host_pairs, run_pair_batches, RouteBackend, RouteError, RouteOutcome, RouteStats};
use crate::topology::{NodeId, Topology};
use crate::utils;

/// Matching tolerance for predecessor discovery during backtracking.
const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Default)]
pub struct DijkstraCpuBackend;

impl RouteBackend for DijkstraCpuBackend {
    fn name(&self) -> &'static str {
        "dijkstra-cpu"
    }

    fn compute(&self, topo: &Topology, opts: &RouteOpts) -> Result<RouteOutcome, RouteError> {
        let dense = DenseGraph::new(topo);
        let nr_workers = opts.workers_for(dense.nr_vertices());
        let dist = all_pairs(&dense, nr_workers);
        let pairs = host_pairs(topo);

        Ok(run_pair_batches(&pairs, nr_workers, |chunk| {
            let mut rules = RuleSet::default();
            let mut stats = RouteStats::default();
            for (src, dst) in chunk {
                if topo.host_ip(src) == topo.host_ip(dst) {
                    continue;
                }
                let found = dense
                    .index_of(&NodeId::host(src.clone()))
                    .zip(dense.index_of(&NodeId::host(dst.clone())))
                    .and_then(|(s, t)| reconstruct(&dense, &dist, s, t));
                match found {
                    Some((cost, path)) => {
                        stats.routed += 1;
                        stats.cost_sum += cost;
                        let ids = path
                            .into_iter()
                            .map(|v| dense.node(v).clone())
                            .collect::<Vec<_>>();
                        let compiled = compile_path(topo, &ids, opts.priority, &mut rules);
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

/// The dense all-pairs distance matrix: one single-source run per vertex,
/// sources batched across workers, rows merged at the end.
pub(crate) fn all_pairs(dense: &DenseGraph, nr_workers: usize) -> Array2<f64> {
    let v = dense.nr_vertices();
    let sources = (0..v).collect::<Vec<_>>();
    let rows = utils::par_chunks(&sources, nr_workers, |chunk| {
        chunk
            .iter()
            .map(|&src| (src, single_source(dense, src)))
            .collect()
    });
    let mut dist = Array2::from_elem((v, v), f64::INFINITY);
    for (src, row) in rows {
        for (j, value) in row.into_iter().enumerate() {
            dist[[src, j]] = value;
        }
    }
    dist
}

fn single_source(dense: &DenseGraph, src: usize) -> Vec<f64> {
    let v = dense.nr_vertices();
    let mut dist = vec![f64::INFINITY; v];
    let mut visited = vec![false; v];
    let mut heap = BinaryHeap::new();
    dist[src] = 0.0;
    heap.push(Reverse((OrderedFloat(0.0), src)));
    while let Some(Reverse((OrderedFloat(d), u))) = heap.pop() {
        if visited[u] {
            continue;
        }
        visited[u] = true;
        for w in 0..v {
            let edge = dense.weight(VertexId::new(u), VertexId::new(w));
            if edge > 0.0 && !visited[w] && d + edge < dist[w] {
                dist[w] = d + edge;
                heap.push(Reverse((OrderedFloat(dist[w]), w)));
            }
        }
    }
    dist
}

/// Walks backwards from the target, at each step picking the predecessor `p`
/// with `dist[src][p] + edge(p, cur) == dist[src][cur]` within tolerance and
/// minimal `dist[src][p]`. Ties go to the lowest predecessor index, which
/// makes reconstruction deterministic within this backend.
pub(crate) fn reconstruct(
    dense: &DenseGraph,
    dist: &Array2<f64>,
    src: VertexId,
    dst: VertexId,
) -> Option<(f64, Vec<VertexId>)> {
    let (s, t) = (src.inner(), dst.inner());
    let total = dist[[s, t]];
    if !total.is_finite() {
        return None;
    }
    if s == t {
        return Some((0.0, vec![src]));
    }
    let v = dense.nr_vertices();
    let mut path = vec![dst];
    let mut cur = t;
    while cur != s {
        let mut best = f64::INFINITY;
        let mut pred = None;
        for p in 0..v {
            let edge = dense.weight(VertexId::new(p), VertexId::new(cur));
            if edge > 0.0
                && (dist[[s, p]] + edge - dist[[s, cur]]).abs() < TOLERANCE
                && dist[[s, p]] < best
            {
                best = dist[[s, p]];
                pred = Some(p);
            }
        }
        let p = pred?;
        path.push(VertexId::new(p));
        cur = p;
    }
    path.reverse();
    Some((total, path))
}
