//! The out-of-band topology sidecar: a JSON file mapping `"A-B"` node pairs to
//! geographic distances and link bandwidths that the controller cannot report.
//! Keys are datapath ids or IPv4 addresses; lookup is unordered.

use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::warn;

/// Parsed sidecar data. A missing or empty sidecar is valid; every lookup then
/// misses and callers fall back to default edge weights.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Sidecar {
    #[serde(default)]
    distances: FxHashMap<String, f64>,
    #[serde(default)]
    bandwidth: FxHashMap<String, f64>,
}

impl Sidecar {
    /// Reads the sidecar from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SidecarError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Reads the sidecar from a JSON file, degrading to an empty sidecar with
    /// a warning when the file is absent or malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(sidecar) => sidecar,
            Err(err) => {
                warn!(path = %path.display(), %err, "sidecar unavailable, using default edge weights");
                Self::default()
            }
        }
    }

    /// The distance between two nodes, probing both key orders. Identical
    /// endpoints are zero distance by definition.
    pub fn distance(&self, a: &str, b: &str) -> Option<f64> {
        if a == b {
            return Some(0.0);
        }
        pair_lookup(&self.distances, a, b)
    }

    /// The bandwidth between two nodes, probing both key orders.
    pub fn bandwidth(&self, a: &str, b: &str) -> Option<f64> {
        pair_lookup(&self.bandwidth, a, b)
    }

    /// Records a distance entry. Programmatic topology builders use this in
    /// place of a file on disk.
    pub fn insert_distance(&mut self, a: &str, b: &str, distance: f64) {
        self.distances.insert(format!("{a}-{b}"), distance);
    }

    /// Records a bandwidth entry.
    pub fn insert_bandwidth(&mut self, a: &str, b: &str, mbps: f64) {
        self.bandwidth.insert(format!("{a}-{b}"), mbps);
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty() && self.bandwidth.is_empty()
    }
}

fn pair_lookup(map: &FxHashMap<String, f64>, a: &str, b: &str) -> Option<f64> {
    map.get(&format!("{a}-{b}"))
        .or_else(|| map.get(&format!("{b}-{a}")))
        .copied()
}

/// Reasons a sidecar file could not be read.
#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("failed to read sidecar file")]
    Io(#[from] std::io::Error),

    #[error("failed to parse sidecar file")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_unordered() {
        let mut sidecar = Sidecar::default();
        sidecar.insert_distance("a", "b", 5.0);
        assert_eq!(sidecar.distance("a", "b"), Some(5.0));
        assert_eq!(sidecar.distance("b", "a"), Some(5.0));
        assert_eq!(sidecar.distance("a", "c"), None);
    }

    #[test]
    fn same_node_is_zero() {
        let sidecar = Sidecar::default();
        assert_eq!(sidecar.distance("a", "a"), Some(0.0));
    }

    #[test]
    fn parses_sidecar_json() -> anyhow::Result<()> {
        let raw = r#"{
            "distances": {"0000000000000001-0000000000000002": 12.5},
            "bandwidth": {"0000000000000001-0000000000000002": 1000.0}
        }"#;
        let sidecar: Sidecar = serde_json::from_str(raw)?;
        assert_eq!(
            sidecar.distance("0000000000000002", "0000000000000001"),
            Some(12.5)
        );
        assert_eq!(
            sidecar.bandwidth("0000000000000001", "0000000000000002"),
            Some(1000.0)
        );
        Ok(())
    }

    #[test]
    fn missing_file_degrades_to_empty() {
        let sidecar = Sidecar::load_or_default("/nonexistent/topology_data.json");
        assert!(sidecar.is_empty());
    }

    #[test]
    fn missing_sections_are_empty() -> anyhow::Result<()> {
        let sidecar: Sidecar = serde_json::from_str("{}")?;
        assert!(sidecar.is_empty());
        Ok(())
    }

    #[test]
    fn loads_from_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("topology_data.json");
        std::fs::write(&path, r#"{"distances": {"a-b": 3.0}, "bandwidth": {}}"#)?;
        let sidecar = Sidecar::load(&path)?;
        assert_eq!(sidecar.distance("b", "a"), Some(3.0));
        Ok(())
    }
}
