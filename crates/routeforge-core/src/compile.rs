//! The flow compiler: turns a host-to-host path into match/action rules for
//! every interior switch, in both directions. Rules accumulate in a hash set
//! so that segments shared between host pairs collapse to a single rule.

use rustc_hash::FxHashSet;
use tracing::warn;

use crate::topology::{MacAddr, NodeId, PortId, SwitchId, Topology};

/// One compiled forwarding rule. Equality and hashing cover every match and
/// action field, which is what makes set-based deduplication correct.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct FlowRule {
    pub switch: SwitchId,
    pub in_port: PortId,
    pub out_port: PortId,
    pub priority: u32,
    pub eth_src: MacAddr,
    pub eth_dst: MacAddr,
}

/// The growing, deduplicated rule set.
pub type RuleSet = FxHashSet<FlowRule>;

/// Counters for one compilation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompileStats {
    /// Rules emitted into the set, before deduplication.
    pub emitted: usize,
    /// Rules skipped because a port lookup missed.
    pub port_missing: usize,
}

impl CompileStats {
    pub fn absorb(&mut self, other: CompileStats) {
        self.emitted += other.emitted;
        self.port_missing += other.port_missing;
    }
}

/// Compiles a path whose endpoints are hosts into rules for both directions.
/// Each direction covers every switch on the path, the destination-side
/// attachment switch included: its out-port is the delivery port toward the
/// host, which is what lets a packet terminate without a controller
/// round-trip.
pub fn compile_path(
    topo: &Topology,
    path: &[NodeId],
    priority: u32,
    rules: &mut RuleSet,
) -> CompileStats {
    let mut stats = CompileStats::default();
    let (Some(NodeId::Host(fwd_src)), Some(NodeId::Host(fwd_dst))) = (path.first(), path.last())
    else {
        return stats;
    };
    one_direction(topo, path, fwd_src, fwd_dst, priority, rules, &mut stats);
    let reversed = path.iter().rev().cloned().collect::<Vec<_>>();
    one_direction(topo, &reversed, fwd_dst, fwd_src, priority, rules, &mut stats);
    stats
}

fn one_direction(
    topo: &Topology,
    path: &[NodeId],
    eth_src: &MacAddr,
    eth_dst: &MacAddr,
    priority: u32,
    rules: &mut RuleSet,
    stats: &mut CompileStats,
) {
    for i in 1..path.len().saturating_sub(1) {
        let NodeId::Switch(switch) = &path[i] else {
            continue;
        };
        let in_port = topo.port_between(&path[i], &path[i - 1]);
        let out_port = topo.port_between(&path[i], &path[i + 1]);
        match (in_port, out_port) {
            (Some(in_port), Some(out_port)) => {
                rules.insert(FlowRule {
                    switch: switch.clone(),
                    in_port: in_port.clone(),
                    out_port: out_port.clone(),
                    priority,
                    eth_src: eth_src.clone(),
                    eth_dst: eth_dst.clone(),
                });
                stats.emitted += 1;
            }
            _ => {
                stats.port_missing += 1;
                warn!(
                    switch = %switch,
                    prev = %path[i - 1],
                    next = %path[i + 1],
                    "port lookup missed, rule skipped"
                );
            }
        }
    }
}
