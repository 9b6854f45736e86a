use std::fmt;

/// A layer-2 address in canonical form: lowercase hex with colons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MacAddr(String);

impl MacAddr {
    /// Canonicalizes a raw controller MAC string.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque controller device identifier, e.g. `of:0000000000000001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SwitchId(String);

impl SwitchId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The datapath id: the identifier with any `of:`-style transport prefix
    /// stripped. This is the key used by the sidecar distance file.
    pub fn dpid(&self) -> &str {
        self.0
            .split_once(':')
            .map_or(self.0.as_str(), |(_, rest)| rest)
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A controller port name. The wire format is numeric for most ports, but
/// logical ports can be named, so ports are kept as strings throughout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A vertex of the topology graph: either an end-host or a switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum NodeId {
    Host(MacAddr),
    Switch(SwitchId),
}

impl NodeId {
    pub fn host(mac: MacAddr) -> Self {
        Self::Host(mac)
    }

    pub fn switch(id: SwitchId) -> Self {
        Self::Switch(id)
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host(_))
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, Self::Switch(_))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(mac) => mac.fmt(f),
            Self::Switch(id) => id.fmt(f),
        }
    }
}

/// An end-host as discovered by the controller: a unique MAC, at least one IP
/// address, and exactly one attachment location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub mac: MacAddr,
    pub ips: Vec<String>,
    pub switch: SwitchId,
    pub port: PortId,
}

impl Host {
    /// The IP address used to deduplicate aliased host records.
    pub fn primary_ip(&self) -> &str {
        &self.ips[0]
    }
}

/// A directed link listing. The controller reports every physical link twice,
/// once per direction; pathfinding treats the pair as one undirected edge but
/// the source port of each direction feeds the port map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub src: SwitchId,
    pub src_port: PortId,
    pub dst: SwitchId,
    pub dst_port: PortId,
    pub active: bool,
}

/// One topology listing fetched from the controller.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub hosts: Vec<Host>,
    pub switches: Vec<SwitchId>,
    pub links: Vec<LinkRecord>,
}
