//! The installer: ships a compiled rule set to the controller in bounded
//! batches, and tears down previously installed rules. A rejected batch never
//! aborts the run; remaining batches proceed and the per-rule status vector
//! records the outcome.

use itertools::Itertools;
use rustc_hash::FxHashSet;
use tracing::{info, warn};

use crate::client::{ClientError, Controller, FlowRef};
use crate::compile::{FlowRule, RuleSet};

/// Per-rule installation outcome, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Accepted by the controller in this run.
    Created,
    /// Part of a rejected batch.
    Failed,
    /// Already present on the controller; not resubmitted.
    Unchanged,
}

/// The result of one installation pass.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub created: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub statuses: Vec<RuleOutcome>,
}

/// The result of one teardown pass.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    /// Flows owned by this pipeline that were submitted for deletion.
    pub deleted: usize,
    /// Owned flows whose delete batch the controller rejected.
    pub failed: usize,
    /// Flows left untouched because another application owns them.
    pub foreign: usize,
}

/// Installs a rule set in batches of at most `batch_size`. Rules already
/// present under `app_id` are counted as unchanged and skipped, which makes
/// re-running the pipeline a controller-side no-op.
pub fn install_rules<C: Controller>(
    client: &C,
    rules: &RuleSet,
    batch_size: usize,
    app_id: &str,
) -> Result<InstallReport, ClientError> {
    let existing = client
        .flows()?
        .into_iter()
        .filter(|flow| flow.app_id == app_id)
        .filter_map(|flow| flow.rule)
        .collect::<FxHashSet<_>>();

    let ordered = rules.iter().sorted().collect::<Vec<_>>();
    let mut report = InstallReport::default();
    let mut pending = Vec::new();
    for &rule in &ordered {
        if existing.contains(rule) {
            report.unchanged += 1;
            report.statuses.push(RuleOutcome::Unchanged);
        } else {
            pending.push(rule.clone());
            report.statuses.push(RuleOutcome::Created);
        }
    }

    let batch_size = batch_size.max(1);
    let mut failed_rules = FxHashSet::default();
    for batch in pending.chunks(batch_size) {
        match client.install_flows(batch) {
            Ok(()) => report.created += batch.len(),
            Err(err) => {
                warn!(batch_len = batch.len(), %err, "flow batch rejected, continuing");
                report.failed += batch.len();
                failed_rules.extend(batch.iter().cloned());
            }
        }
    }
    if !failed_rules.is_empty() {
        for (status, rule) in report.statuses.iter_mut().zip(&ordered) {
            if failed_rules.contains(*rule) {
                *status = RuleOutcome::Failed;
            }
        }
    }

    info!(
        created = report.created,
        failed = report.failed,
        unchanged = report.unchanged,
        "installation pass complete"
    );
    Ok(report)
}

/// Deletes every flow owned by `app_id`, leaving other applications' flows
/// untouched.
pub fn delete_owned<C: Controller>(
    client: &C,
    batch_size: usize,
    app_id: &str,
) -> Result<DeleteReport, ClientError> {
    let flows = client.flows()?;
    let mut report = DeleteReport::default();
    let owned = flows
        .into_iter()
        .filter(|flow| {
            if flow.app_id == app_id {
                true
            } else {
                report.foreign += 1;
                false
            }
        })
        .map(|flow| FlowRef {
            device: flow.device,
            flow_id: flow.flow_id,
        })
        .collect::<Vec<_>>();

    for batch in owned.chunks(batch_size.max(1)) {
        match client.remove_flows(batch) {
            Ok(()) => report.deleted += batch.len(),
            Err(err) => {
                warn!(batch_len = batch.len(), %err, "delete batch rejected, continuing");
                report.failed += batch.len();
            }
        }
    }

    info!(
        deleted = report.deleted,
        failed = report.failed,
        foreign = report.foreign,
        "teardown pass complete"
    );
    Ok(report)
}
