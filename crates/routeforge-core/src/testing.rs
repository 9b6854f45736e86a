//! Utilities for writing tests: canned topologies and an in-memory stand-in
//! for the controller.

use std::cell::{Cell, RefCell};

use crate::client::{ClientError, Controller, FlowRef, InstalledFlow};
use crate::compile::FlowRule;
use crate::sidecar::Sidecar;
use crate::topology::{Host, LinkRecord, MacAddr, PortId, Snapshot, SwitchId};

pub(crate) fn host(mac: &str, ip: &str, switch: &str, port: &str) -> Host {
    Host {
        mac: MacAddr::new(mac),
        ips: vec![ip.to_owned()],
        switch: SwitchId::new(switch),
        port: PortId::new(port),
    }
}

pub(crate) fn link(src: &str, src_port: &str, dst: &str, dst_port: &str) -> LinkRecord {
    LinkRecord {
        src: SwitchId::new(src),
        src_port: PortId::new(src_port),
        dst: SwitchId::new(dst),
        dst_port: PortId::new(dst_port),
        active: true,
    }
}

/// Both directed listings of one physical link, as the controller reports it.
pub(crate) fn both_ways(a: &str, a_port: &str, b: &str, b_port: &str) -> [LinkRecord; 2] {
    [link(a, a_port, b, b_port), link(b, b_port, a, a_port)]
}

/// Two hosts on one switch: no switch-switch links, no interior switches.
pub(crate) fn single_switch_pair() -> Snapshot {
    Snapshot {
        hosts: vec![
            host("02:00:00:00:00:01", "10.0.0.1", "of:0000000000000001", "1"),
            host("02:00:00:00:00:02", "10.0.0.2", "of:0000000000000001", "2"),
        ],
        switches: vec![SwitchId::new("of:0000000000000001")],
        links: Vec::new(),
    }
}

/// A linear three-switch chain with a host on each end and sidecar distances
/// of 10 per switch hop.
pub(crate) fn linear_chain() -> (Snapshot, Sidecar) {
    let switches = (1..=3)
        .map(|i| SwitchId::new(format!("of:000000000000000{i}")))
        .collect::<Vec<_>>();
    let mut links = Vec::new();
    links.extend(both_ways("of:0000000000000001", "2", "of:0000000000000002", "1"));
    links.extend(both_ways("of:0000000000000002", "2", "of:0000000000000003", "1"));
    let snapshot = Snapshot {
        hosts: vec![
            host("02:00:00:00:00:01", "10.0.0.1", "of:0000000000000001", "1"),
            host("02:00:00:00:00:02", "10.0.0.2", "of:0000000000000003", "2"),
        ],
        switches,
        links,
    };
    let mut sidecar = Sidecar::default();
    sidecar.insert_distance("0000000000000001", "0000000000000002", 10.0);
    sidecar.insert_distance("0000000000000002", "0000000000000003", 10.0);
    (snapshot, sidecar)
}

/// Two leaves, two spines, one host per leaf; every leaf-spine link costs 1,
/// so both spines are equal-cost choices.
pub(crate) fn spine_leaf() -> (Snapshot, Sidecar) {
    let l1 = "of:0000000000000001";
    let l2 = "of:0000000000000002";
    let sp1 = "of:0000000000000003";
    let sp2 = "of:0000000000000004";
    let mut links = Vec::new();
    links.extend(both_ways(l1, "2", sp1, "1"));
    links.extend(both_ways(l1, "3", sp2, "1"));
    links.extend(both_ways(l2, "2", sp1, "2"));
    links.extend(both_ways(l2, "3", sp2, "2"));
    let snapshot = Snapshot {
        hosts: vec![
            host("02:00:00:00:00:01", "10.0.0.1", l1, "1"),
            host("02:00:00:00:00:02", "10.0.0.2", l2, "1"),
        ],
        switches: [l1, l2, sp1, sp2].into_iter().map(SwitchId::new).collect(),
        links,
    };
    let mut sidecar = Sidecar::default();
    for (a, b) in [(l1, sp1), (l1, sp2), (l2, sp1), (l2, sp2)] {
        sidecar.insert_distance(
            a.trim_start_matches("of:"),
            b.trim_start_matches("of:"),
            1.0,
        );
    }
    (snapshot, sidecar)
}

/// Three switches, one unreachable from the others, with a host on each of
/// the two connected switches and a third host stranded on the isolated one.
pub(crate) fn split_network() -> Snapshot {
    Snapshot {
        hosts: vec![
            host("02:00:00:00:00:01", "10.0.0.1", "of:0000000000000001", "1"),
            host("02:00:00:00:00:02", "10.0.0.2", "of:0000000000000002", "1"),
            host("02:00:00:00:00:03", "10.0.0.3", "of:0000000000000004", "1"),
        ],
        switches: vec![
            SwitchId::new("of:0000000000000001"),
            SwitchId::new("of:0000000000000002"),
            SwitchId::new("of:0000000000000004"),
        ],
        links: both_ways("of:0000000000000001", "2", "of:0000000000000002", "2").to_vec(),
    }
}

/// An in-memory [`Controller`]: serves a fixed snapshot and keeps installed
/// flows in a table, overwriting on identical match fields as the real
/// controller does.
#[derive(Debug)]
pub(crate) struct MockController {
    snapshot: Snapshot,
    app_id: String,
    flows: RefCell<Vec<InstalledFlow>>,
    next_id: Cell<u64>,
    install_calls: Cell<usize>,
    reject_installs: Cell<bool>,
}

impl MockController {
    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            app_id: String::from("org.onosproject.cli"),
            flows: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            install_calls: Cell::new(0),
            reject_installs: Cell::new(false),
        }
    }

    pub(crate) fn app_id(&self) -> &str {
        &self.app_id
    }

    pub(crate) fn installed_flows(&self) -> Vec<InstalledFlow> {
        self.flows.borrow().clone()
    }

    pub(crate) fn install_calls(&self) -> usize {
        self.install_calls.get()
    }

    pub(crate) fn reject_installs(&self, reject: bool) {
        self.reject_installs.set(reject);
    }

    /// Adds a flow owned by another application, e.g. a controller-internal
    /// LLDP punt rule.
    pub(crate) fn seed_foreign_flow(&self, app_id: &str) {
        let id = self.bump_id();
        self.flows.borrow_mut().push(InstalledFlow {
            flow_id: id,
            device: SwitchId::new("of:0000000000000001"),
            app_id: app_id.to_owned(),
            rule: None,
        });
    }

    fn bump_id(&self) -> String {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id.to_string()
    }
}

impl Controller for MockController {
    fn hosts(&self) -> Result<Vec<Host>, ClientError> {
        Ok(self.snapshot.hosts.clone())
    }

    fn switches(&self) -> Result<Vec<SwitchId>, ClientError> {
        Ok(self.snapshot.switches.clone())
    }

    fn links(&self) -> Result<Vec<LinkRecord>, ClientError> {
        Ok(self.snapshot.links.clone())
    }

    fn flows(&self) -> Result<Vec<InstalledFlow>, ClientError> {
        Ok(self.flows.borrow().clone())
    }

    fn install_flows(&self, rules: &[FlowRule]) -> Result<(), ClientError> {
        self.install_calls.set(self.install_calls.get() + 1);
        if self.reject_installs.get() {
            return Err(ClientError::Rejected {
                context: "flow batch install",
                status: 500,
                body: String::from("mock rejection"),
            });
        }
        let mut flows = self.flows.borrow_mut();
        for rule in rules {
            if flows
                .iter()
                .any(|f| f.app_id == self.app_id && f.rule.as_ref() == Some(rule))
            {
                continue;
            }
            let id = self.bump_id();
            flows.push(InstalledFlow {
                flow_id: id,
                device: rule.switch.clone(),
                app_id: self.app_id.clone(),
                rule: Some(rule.clone()),
            });
        }
        Ok(())
    }

    fn remove_flows(&self, refs: &[FlowRef]) -> Result<(), ClientError> {
        let mut flows = self.flows.borrow_mut();
        flows.retain(|f| {
            !refs
                .iter()
                .any(|r| r.device == f.device && r.flow_id == f.flow_id)
        });
        Ok(())
    }
}
