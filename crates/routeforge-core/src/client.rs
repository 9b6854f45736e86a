//! The controller client: a thin request/response layer over the controller's
//! REST surface. The [`Controller`] trait is the seam the rest of the pipeline
//! programs against; [`RestController`] is the HTTP implementation.

use std::time::Duration;

use tracing::warn;

use crate::compile::FlowRule;
use crate::topology::{Host, LinkRecord, MacAddr, PortId, Snapshot, SwitchId};

/// An interface to the SDN controller: the source of topology truth and the
/// sink of compiled rules.
pub trait Controller {
    /// Enumerates discovered end-hosts.
    fn hosts(&self) -> Result<Vec<Host>, ClientError>;

    /// Enumerates switches (devices of type `SWITCH`).
    fn switches(&self) -> Result<Vec<SwitchId>, ClientError>;

    /// Enumerates infrastructure links, one listing per direction.
    fn links(&self) -> Result<Vec<LinkRecord>, ClientError>;

    /// Enumerates currently installed flows across all devices.
    fn flows(&self) -> Result<Vec<InstalledFlow>, ClientError>;

    /// Installs a batch of rules. All-or-nothing at the transport level; the
    /// installer handles partial failure across batches.
    fn install_flows(&self, rules: &[FlowRule]) -> Result<(), ClientError>;

    /// Removes a batch of flows by device and flow id.
    fn remove_flows(&self, refs: &[FlowRef]) -> Result<(), ClientError>;

    /// Fetches hosts, switches, and links in one pass.
    fn snapshot(&self) -> Result<Snapshot, ClientError> {
        Ok(Snapshot {
            hosts: self.hosts()?,
            switches: self.switches()?,
            links: self.links()?,
        })
    }
}

/// A flow as reported by the controller. `rule` is populated when the flow's
/// selector and treatment have the exact shape this pipeline emits, which is
/// what idempotence and deletion filtering key on.
#[derive(Debug, Clone)]
pub struct InstalledFlow {
    pub flow_id: String,
    pub device: SwitchId,
    pub app_id: String,
    pub rule: Option<FlowRule>,
}

/// A reference to an installed flow, used by batch deletion.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FlowRef {
    #[serde(rename = "deviceId")]
    pub device: SwitchId,
    #[serde(rename = "flowId")]
    pub flow_id: String,
}

/// Errors talking to the controller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The controller could not be reached or the response was unreadable.
    #[error("controller unreachable")]
    Unreachable(#[from] reqwest::Error),

    /// The controller answered with a non-success status.
    #[error("controller rejected {context}: status {status}")]
    Rejected {
        context: &'static str,
        status: u16,
        body: String,
    },
}

/// The blocking HTTP implementation of [`Controller`] for an ONOS-style
/// `/onos/v1` REST surface with basic auth.
#[derive(Debug)]
pub struct RestController {
    http: reqwest::blocking::Client,
    base_url: String,
    username: String,
    password: String,
    app_id: String,
}

impl RestController {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            username: username.into(),
            password: password.into(),
            app_id: app_id.into(),
        })
    }

    pub fn from_config(config: &crate::config::Config) -> Result<Self, ClientError> {
        Self::new(
            &config.controller_base_url,
            &config.username,
            &config.password,
            &config.app_id,
        )
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn get(&self, path: &str, context: &'static str) -> Result<reqwest::blocking::Response, ClientError> {
        let resp = self
            .http
            .get(self.url(path))
            .basic_auth(&self.username, Some(&self.password))
            .send()?;
        check(resp, context)
    }
}

impl Controller for RestController {
    fn hosts(&self) -> Result<Vec<Host>, ClientError> {
        let body: wire::HostsBody = self.get("hosts", "host listing")?.json()?;
        Ok(body.hosts.into_iter().filter_map(wire::into_host).collect())
    }

    fn switches(&self) -> Result<Vec<SwitchId>, ClientError> {
        let body: wire::DevicesBody = self.get("devices", "device listing")?.json()?;
        Ok(body
            .devices
            .into_iter()
            .filter(|d| d.kind == "SWITCH")
            .map(|d| SwitchId::new(d.id))
            .collect())
    }

    fn links(&self) -> Result<Vec<LinkRecord>, ClientError> {
        let body: wire::LinksBody = self.get("links", "link listing")?.json()?;
        Ok(body.links.into_iter().map(wire::into_link).collect())
    }

    fn flows(&self) -> Result<Vec<InstalledFlow>, ClientError> {
        let body: wire::FlowsBody = self.get("flows", "flow listing")?.json()?;
        Ok(body.flows.into_iter().map(wire::into_installed).collect())
    }

    fn install_flows(&self, rules: &[FlowRule]) -> Result<(), ClientError> {
        let payload = wire::FlowsOut {
            flows: rules.iter().map(wire::payload).collect(),
        };
        let resp = self
            .http
            .post(self.url("flows"))
            .query(&[("appId", self.app_id.as_str())])
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send()?;
        check(resp, "flow batch install")?;
        Ok(())
    }

    fn remove_flows(&self, refs: &[FlowRef]) -> Result<(), ClientError> {
        let payload = wire::FlowRefsOut { flows: refs };
        let resp = self
            .http
            .delete(self.url("flows"))
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send()?;
        check(resp, "flow batch delete")?;
        Ok(())
    }
}

fn check(
    resp: reqwest::blocking::Response,
    context: &'static str,
) -> Result<reqwest::blocking::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut body = resp.text().unwrap_or_default();
    body.truncate(200);
    Err(ClientError::Rejected {
        context,
        status: status.as_u16(),
        body,
    })
}

/// Serde mirrors of the controller's JSON shapes.
pub(crate) mod wire {
    use super::*;

    /// A value the controller serializes sometimes as a number and sometimes
    /// as a string (ports, flow ids).
    #[derive(Debug, Clone, serde::Deserialize)]
    #[serde(untagged)]
    pub(crate) enum Scalar {
        Num(u64),
        Text(String),
    }

    impl Scalar {
        pub(crate) fn into_string(self) -> String {
            match self {
                Self::Num(n) => n.to_string(),
                Self::Text(s) => s,
            }
        }
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct HostsBody {
        #[serde(default)]
        pub(crate) hosts: Vec<HostRec>,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct HostRec {
        pub(crate) mac: String,
        #[serde(default, rename = "ipAddresses")]
        pub(crate) ip_addresses: Vec<String>,
        #[serde(default)]
        pub(crate) locations: Vec<LocationRec>,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct LocationRec {
        #[serde(rename = "elementId")]
        pub(crate) element_id: String,
        pub(crate) port: Scalar,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct DevicesBody {
        #[serde(default)]
        pub(crate) devices: Vec<DeviceRec>,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct DeviceRec {
        pub(crate) id: String,
        #[serde(rename = "type")]
        pub(crate) kind: String,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct LinksBody {
        #[serde(default)]
        pub(crate) links: Vec<LinkRec>,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct LinkRec {
        pub(crate) src: EndpointRec,
        pub(crate) dst: EndpointRec,
        #[serde(default)]
        pub(crate) state: Option<String>,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct EndpointRec {
        pub(crate) device: String,
        pub(crate) port: Scalar,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct FlowsBody {
        #[serde(default)]
        pub(crate) flows: Vec<FlowRec>,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct FlowRec {
        pub(crate) id: Scalar,
        #[serde(rename = "deviceId")]
        pub(crate) device_id: String,
        #[serde(default, rename = "appId")]
        pub(crate) app_id: String,
        #[serde(default)]
        pub(crate) priority: u32,
        #[serde(default)]
        pub(crate) selector: SelectorRec,
        #[serde(default)]
        pub(crate) treatment: TreatmentRec,
    }

    #[derive(Debug, Default, serde::Deserialize)]
    pub(crate) struct SelectorRec {
        #[serde(default)]
        pub(crate) criteria: Vec<CriterionRec>,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct CriterionRec {
        #[serde(rename = "type")]
        pub(crate) kind: String,
        #[serde(default)]
        pub(crate) port: Option<Scalar>,
        #[serde(default)]
        pub(crate) mac: Option<String>,
    }

    #[derive(Debug, Default, serde::Deserialize)]
    pub(crate) struct TreatmentRec {
        #[serde(default)]
        pub(crate) instructions: Vec<InstructionRec>,
    }

    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct InstructionRec {
        #[serde(rename = "type")]
        pub(crate) kind: String,
        #[serde(default)]
        pub(crate) port: Option<Scalar>,
    }

    /// Converts a host record, skipping hosts the pipeline cannot route:
    /// no IP address or no attachment point yet.
    pub(crate) fn into_host(rec: HostRec) -> Option<Host> {
        let mac = MacAddr::new(&rec.mac);
        if rec.ip_addresses.is_empty() {
            warn!(%mac, "host has no IP address, skipped");
            return None;
        }
        let Some(location) = rec.locations.into_iter().next() else {
            warn!(%mac, "host has no attachment point, skipped");
            return None;
        };
        Some(Host {
            mac,
            ips: rec.ip_addresses,
            switch: SwitchId::new(location.element_id),
            port: PortId::new(location.port.into_string()),
        })
    }

    pub(crate) fn into_link(rec: LinkRec) -> LinkRecord {
        LinkRecord {
            src: SwitchId::new(rec.src.device),
            src_port: PortId::new(rec.src.port.into_string()),
            dst: SwitchId::new(rec.dst.device),
            dst_port: PortId::new(rec.dst.port.into_string()),
            active: rec.state.as_deref().map_or(true, |s| s == "ACTIVE"),
        }
    }

    pub(crate) fn into_installed(rec: FlowRec) -> InstalledFlow {
        let rule = parse_rule(&rec);
        InstalledFlow {
            flow_id: rec.id.into_string(),
            device: SwitchId::new(rec.device_id),
            app_id: rec.app_id,
            rule,
        }
    }

    fn parse_rule(rec: &FlowRec) -> Option<FlowRule> {
        let mut in_port = None;
        let mut eth_src = None;
        let mut eth_dst = None;
        for criterion in &rec.selector.criteria {
            match criterion.kind.as_str() {
                "IN_PORT" => in_port = criterion.port.clone(),
                "ETH_SRC" => eth_src = criterion.mac.clone(),
                "ETH_DST" => eth_dst = criterion.mac.clone(),
                _ => return None,
            }
        }
        let out_port = rec
            .treatment
            .instructions
            .iter()
            .find(|i| i.kind == "OUTPUT")
            .and_then(|i| i.port.clone())?;
        Some(FlowRule {
            switch: SwitchId::new(&rec.device_id),
            in_port: PortId::new(in_port?.into_string()),
            out_port: PortId::new(out_port.into_string()),
            priority: rec.priority,
            eth_src: MacAddr::new(eth_src?),
            eth_dst: MacAddr::new(eth_dst?),
        })
    }

    #[derive(Debug, serde::Serialize)]
    pub(crate) struct FlowsOut {
        pub(crate) flows: Vec<FlowPayload>,
    }

    #[derive(Debug, serde::Serialize)]
    pub(crate) struct FlowRefsOut<'a> {
        pub(crate) flows: &'a [FlowRef],
    }

    #[derive(Debug, serde::Serialize)]
    pub(crate) struct FlowPayload {
        pub(crate) priority: u32,
        #[serde(rename = "isPermanent")]
        pub(crate) is_permanent: bool,
        #[serde(rename = "deviceId")]
        pub(crate) device_id: String,
        pub(crate) treatment: TreatmentOut,
        pub(crate) selector: SelectorOut,
    }

    #[derive(Debug, serde::Serialize)]
    pub(crate) struct TreatmentOut {
        pub(crate) instructions: Vec<InstructionOut>,
    }

    #[derive(Debug, serde::Serialize)]
    pub(crate) struct SelectorOut {
        pub(crate) criteria: Vec<CriterionOut>,
    }

    #[derive(Debug, serde::Serialize)]
    pub(crate) struct InstructionOut {
        #[serde(rename = "type")]
        pub(crate) kind: &'static str,
        pub(crate) port: String,
    }

    #[derive(Debug, serde::Serialize)]
    pub(crate) struct CriterionOut {
        #[serde(rename = "type")]
        pub(crate) kind: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub(crate) port: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub(crate) mac: Option<String>,
    }

    pub(crate) fn payload(rule: &FlowRule) -> FlowPayload {
        FlowPayload {
            priority: rule.priority,
            is_permanent: true,
            device_id: rule.switch.as_str().to_owned(),
            treatment: TreatmentOut {
                instructions: vec![InstructionOut {
                    kind: "OUTPUT",
                    port: rule.out_port.as_str().to_owned(),
                }],
            },
            selector: SelectorOut {
                criteria: vec![
                    CriterionOut {
                        kind: "IN_PORT",
                        port: Some(rule.in_port.as_str().to_owned()),
                        mac: None,
                    },
                    CriterionOut {
                        kind: "ETH_SRC",
                        port: None,
                        mac: Some(rule.eth_src.as_str().to_owned()),
                    },
                    CriterionOut {
                        kind: "ETH_DST",
                        port: None,
                        mac: Some(rule.eth_dst.as_str().to_owned()),
                    },
                ],
            },
        }
    }
}
