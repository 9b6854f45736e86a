//! Run configuration. Every option has a default; a JSON config file and CLI
//! flags can override them.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use typed_builder::TypedBuilder;

/// Which routing backend to run. Selected at runtime; every kind always
/// parses so a config file never needs recompilation to switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Astar,
    DijkstraCpu,
    DijkstraGpu,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Astar => "astar",
            Self::DijkstraCpu => "dijkstra-cpu",
            Self::DijkstraGpu => "dijkstra-gpu",
        }
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "astar" => Ok(Self::Astar),
            "dijkstra-cpu" => Ok(Self::DijkstraCpu),
            "dijkstra-gpu" => Ok(Self::DijkstraGpu),
            other => Err(UnknownBackend(other.to_owned())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown backend {0:?} (expected astar, dijkstra-cpu, or dijkstra-gpu)")]
pub struct UnknownBackend(String);

/// GPU kernel tuning. Correctness does not depend on any of these.
#[derive(Debug, Clone, Copy, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct GpuOpts {
    /// Threads per workgroup.
    #[builder(default = 256)]
    pub block_size: u32,
    /// Extra dispatch width; surplus workgroups exit immediately.
    #[builder(default = 1)]
    pub grid_multiplier: u32,
    /// Host pairs per path-reconstruction launch.
    #[builder(default = 1000)]
    pub batch_size: usize,
    /// Hop bound for reconstructed paths; longer paths count as unroutable.
    #[builder(default = 32)]
    pub max_path_length: u32,
}

impl Default for GpuOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Options consumed by the routing backends.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RouteOpts {
    /// Priority stamped on every emitted rule.
    #[builder(default = 10)]
    pub priority: u32,
    /// Cap on routing workers; `None` scales with the vertex count.
    #[builder(default)]
    pub max_workers: Option<usize>,
    #[builder(default)]
    pub gpu: GpuOpts,
}

impl RouteOpts {
    /// The worker count for a graph of `nr_vertices` vertices.
    pub fn workers_for(&self, nr_vertices: usize) -> usize {
        self.max_workers
            .unwrap_or_else(|| usize::min(16, usize::max(1, nr_vertices / 4)))
    }
}

impl Default for RouteOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct Config {
    #[builder(default = default_base_url(), setter(into))]
    pub controller_base_url: String,
    #[builder(default = String::from("onos"), setter(into))]
    pub username: String,
    #[builder(default = String::from("rocks"), setter(into))]
    pub password: String,
    /// The application id flows are installed under; deletion only ever
    /// touches flows carrying this id.
    #[builder(default = String::from("org.onosproject.cli"), setter(into))]
    pub app_id: String,
    #[builder(default = BackendKind::Astar)]
    pub backend: BackendKind,
    /// Maximum rules per install/delete batch.
    #[builder(default = 5000)]
    pub batch_size: usize,
    #[builder(default)]
    pub max_workers: Option<usize>,
    /// Fallback switch-switch edge weight when the sidecar has no entry.
    #[builder(default = 1.0)]
    pub default_edge_weight: f64,
    /// Fixed host-switch edge weight, dominated by switch-switch costs.
    #[builder(default = 0.1)]
    pub host_switch_weight: f64,
    /// Priority for emitted rules; must stay below controller-reserved
    /// priorities.
    #[builder(default = 10)]
    pub priority: u32,
    #[builder(default = Some(PathBuf::from("topology_data.json")))]
    pub sidecar_path: Option<PathBuf>,
    #[builder(default)]
    pub gpu: GpuOpts,
}

fn default_base_url() -> String {
    String::from("http://127.0.0.1:8181/onos/v1")
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Reads a config file, with defaults for anything unspecified.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn route_opts(&self) -> RouteOpts {
        RouteOpts::builder()
            .priority(self.priority)
            .max_workers(self.max_workers)
            .gpu(self.gpu)
            .build()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file")]
    Parse(#[from] serde_json::Error),
}
