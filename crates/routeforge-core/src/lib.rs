#![warn(unreachable_pub, missing_debug_implementations)]

//! The core route compiler library. One invocation snapshots the controller's
//! topology, computes shortest paths for every host pair with a
//! [runtime-selected backend](routing::RouteBackend), compiles them into a
//! deduplicated set of per-switch rules, and [installs](install) them in
//! bounded batches.

#[macro_use]
mod ident;

pub mod client;
pub mod compile;
pub mod config;
pub mod install;
pub mod routing;
pub mod run;
pub mod sidecar;
pub mod topology;

pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientError, Controller, RestController};
pub use compile::{FlowRule, RuleSet};
pub use config::{BackendKind, Config, GpuOpts, RouteOpts};
pub use run::{create_routes, delete_routes, Error, RunReport};
pub use sidecar::Sidecar;
pub use topology::{Topology, TopologyError};
