//! The orchestrator: one invocation drives update, compute, compile, and
//! install, and reports what happened. Each run is an atomic unit of work
//! over a fresh topology snapshot.

use std::time::{Duration, Instant};

use tracing::info;

use crate::client::{ClientError, Controller};
use crate::config::Config;
use crate::install::{self, DeleteReport, InstallReport};
use crate::routing::{self, RouteError, RouteStats};
use crate::sidecar::Sidecar;
use crate::topology::{EdgeWeights, Topology, TopologyError};

/// The phases of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Updating,
    Computing,
    Compiling,
    Installing,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Updating => "updating",
            Self::Computing => "computing",
            Self::Compiling => "compiling",
            Self::Installing => "installing",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What one `create_routes` run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub backend: &'static str,
    pub stats: RouteStats,
    pub nr_rules: usize,
    pub install: InstallReport,
    pub elapsed: Duration,
}

/// Fatal run errors. Everything recoverable is counted in the report instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to refresh topology from the controller")]
    Update(#[source] ClientError),

    #[error("invalid topology")]
    Topology(#[from] TopologyError),

    #[error("route computation failed")]
    Compute(#[from] RouteError),

    #[error("controller rejected the run")]
    Install(#[source] ClientError),
}

/// Computes and installs proactive routes for every host pair.
pub fn create_routes<C: Controller>(client: &C, config: &Config) -> Result<RunReport, Error> {
    let started = Instant::now();
    let backend = routing::backend(config.backend);

    info!(phase = %Phase::Updating, "refreshing topology from the controller");
    let snapshot = client.snapshot().map_err(Error::Update)?;
    let sidecar = match &config.sidecar_path {
        Some(path) => Sidecar::load_or_default(path),
        None => Sidecar::default(),
    };
    let weights = EdgeWeights {
        host_switch: config.host_switch_weight,
        default_link: config.default_edge_weight,
    };
    let topo = Topology::build(snapshot, &sidecar, weights)?;

    if topo.nr_hosts() < 2 {
        info!(phase = %Phase::Idle, nr_hosts = topo.nr_hosts(), "nothing to route");
        return Ok(RunReport {
            backend: backend.name(),
            stats: RouteStats::default(),
            nr_rules: 0,
            install: InstallReport::default(),
            elapsed: started.elapsed(),
        });
    }

    info!(
        phase = %Phase::Computing,
        backend = backend.name(),
        nr_hosts = topo.nr_hosts(),
        nr_switches = topo.nr_switches(),
        "computing all-pairs routes"
    );
    let outcome = backend.compute(&topo, &config.route_opts())?;

    info!(
        phase = %Phase::Compiling,
        nr_rules = outcome.rules.len(),
        routed = outcome.stats.routed,
        no_path = outcome.stats.no_path,
        port_missing = outcome.stats.port_missing,
        "compiled rule set"
    );

    info!(phase = %Phase::Installing, batch_size = config.batch_size, "installing rules");
    let install = install::install_rules(client, &outcome.rules, config.batch_size, &config.app_id)
        .map_err(Error::Install)?;

    let report = RunReport {
        backend: backend.name(),
        stats: outcome.stats,
        nr_rules: outcome.rules.len(),
        install,
        elapsed: started.elapsed(),
    };
    info!(
        phase = %Phase::Idle,
        nr_rules = report.nr_rules,
        created = report.install.created,
        failed = report.install.failed,
        unchanged = report.install.unchanged,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "run complete"
    );
    Ok(report)
}

/// Removes every flow installed by this pipeline, leaving other applications'
/// flows untouched.
pub fn delete_routes<C: Controller>(client: &C, config: &Config) -> Result<DeleteReport, Error> {
    info!(phase = %Phase::Installing, "deleting installed routes");
    let report =
        install::delete_owned(client, config.batch_size, &config.app_id).map_err(Error::Install)?;
    info!(phase = %Phase::Idle, deleted = report.deleted, "teardown complete");
    Ok(report)
}
