//! The all-pairs routing engine. Three interchangeable backends compute
//! shortest paths for every host pair and compile them into one deduplicated
//! rule set; any backend may be selected at runtime.

pub mod astar;
pub(crate) mod dense;
pub mod dijkstra;
pub mod gpu;

use itertools::Itertools;
use rustc_hash::FxHashSet;

use crate::compile::RuleSet;
use crate::config::{BackendKind, RouteOpts};
use crate::topology::{MacAddr, Topology};
use crate::utils;

pub use astar::AstarBackend;
pub use dijkstra::DijkstraCpuBackend;
pub use gpu::DijkstraGpuBackend;

/// A routing strategy: topology in, deduplicated rules out. Backends must be
/// functionally interchangeable; for the same topology they emit rule sets of
/// minimal total metric cost, differing at most in equal-cost tie-breaks.
pub trait RouteBackend {
    fn name(&self) -> &'static str;

    fn compute(&self, topo: &Topology, opts: &RouteOpts) -> Result<RouteOutcome, RouteError>;
}

/// Instantiates the backend for a kind.
pub fn backend(kind: BackendKind) -> Box<dyn RouteBackend + Send + Sync> {
    match kind {
        BackendKind::Astar => Box::new(AstarBackend),
        BackendKind::DijkstraCpu => Box::new(DijkstraCpuBackend),
        BackendKind::DijkstraGpu => Box::new(DijkstraGpuBackend),
    }
}

/// The result of one all-pairs computation.
#[derive(Debug, Default)]
pub struct RouteOutcome {
    pub rules: RuleSet,
    pub stats: RouteStats,
}

/// Counters describing one all-pairs computation. The cost sum is invariant
/// across backends for the same topology.
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteStats {
    /// Host pairs considered.
    pub pairs: usize,
    /// Pairs with a usable path.
    pub routed: usize,
    /// Pairs skipped because the graph disconnects them.
    pub no_path: usize,
    /// Rules skipped because a port lookup missed.
    pub port_missing: usize,
    /// Sum of path costs over all routed pairs.
    pub cost_sum: f64,
}

impl RouteStats {
    pub fn absorb(&mut self, other: RouteStats) {
        self.pairs += other.pairs;
        self.routed += other.routed;
        self.no_path += other.no_path;
        self.port_missing += other.port_missing;
        self.cost_sum += other.cost_sum;
    }
}

/// Errors a backend can fail with. Disconnected pairs are not errors; they
/// are counted in [`RouteStats`].
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("built without GPU support; enable the `gpu` cargo feature")]
    GpuUnavailable,

    #[error("no GPU adapter available")]
    NoAdapter,

    #[error("failed to acquire GPU device: {0}")]
    Device(String),
}

/// Enumerates the unordered host pairs to route: hosts deduplicated by
/// primary IP, ordered by MAC so every backend sees the same pair list.
pub(crate) fn host_pairs(topo: &Topology) -> Vec<(MacAddr, MacAddr)> {
    let mut seen_ips = FxHashSet::default();
    let macs = topo
        .hosts()
        .filter(|host| seen_ips.insert(host.primary_ip().to_owned()))
        .map(|host| host.mac.clone())
        .sorted()
        .collect::<Vec<_>>();
    macs.into_iter().tuple_combinations().collect()
}

/// Runs `per_batch` over chunks of the pair list in parallel workers and
/// merges the per-batch rule sets and counters. Merging happens once per
/// batch; workers never contend on individual rules.
pub(crate) fn run_pair_batches<F>(
    pairs: &[(MacAddr, MacAddr)],
    nr_workers: usize,
    per_batch: F,
) -> RouteOutcome
where
    F: Fn(&[(MacAddr, MacAddr)]) -> (RuleSet, RouteStats) + Sync,
{
    let mut outcome = RouteOutcome::default();
    for (rules, stats) in utils::par_chunks(pairs, nr_workers, |chunk| vec![per_batch(chunk)]) {
        outcome.rules.extend(rules);
        outcome.stats.absorb(stats);
    }
    outcome.stats.pairs = pairs.len();
    outcome
}
