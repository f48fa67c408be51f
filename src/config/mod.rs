//! Node configuration loading and management.
//!
//! Node capacities are loaded once from a YAML file and shared by reference
//! for the lifetime of the process.  The expected structure is:
//!
//! ```yaml
//! nodes:
//!   node01:
//!     cpus: [2, 3]
//!     max_utilisation: 0.85
//!     max_memory_mb: 4096
//!     tags: ["perception", "front"]
//! ```
//!
//! `max_utilisation` defaults to the manager's per-CPU threshold (0.90 unless
//! overridden), `max_memory_mb` defaults to unconstrained, and `tags` may be
//! omitted.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Per-CPU utilisation ceiling applied to nodes that do not set their own
/// `max_utilisation`.
pub const DEFAULT_MAX_UTILISATION: f64 = 0.90;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// This is kept private – callers work with [`NodeConfig`] / [`NodeConfigManager`]
/// instead.
#[derive(Debug, Deserialize)]
struct NodeConfigFile {
    nodes: HashMap<String, NodeConfigEntry>,
}

/// Per-node fields as they appear in the YAML file.
///
/// Every field except `cpus` is optional so that partial configs are accepted
/// gracefully (missing values fall back to their defaults).
#[derive(Debug, Deserialize)]
struct NodeConfigEntry {
    #[serde(default)]
    cpus: Vec<u32>,
    /// Per-CPU utilisation ceiling for this node.  Falls back to the
    /// manager's default threshold when absent.
    max_utilisation: Option<f64>,
    /// Maximum memory this node can allocate to tasks, in MB.
    /// Defaults to `u64::MAX` (unconstrained) when absent from YAML.
    #[serde(default = "default_max_memory_mb")]
    max_memory_mb: u64,
    /// Free-form labels a task's `target_node` may name instead of the
    /// node id.
    #[serde(default)]
    tags: Vec<String>,
}

/// Serde default for `max_memory_mb`: `u64::MAX` means "no constraint".
fn default_max_memory_mb() -> u64 {
    u64::MAX
}

// ── Public data structures ────────────────────────────────────────────────────

/// Capacity of a single compute node, immutable after load.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub node_id: String,
    /// CPU indices available for task placement, sorted ascending and
    /// deduplicated.
    pub cpus: Vec<u32>,
    /// Per-CPU utilisation ceiling for admission on this node.
    pub max_utilisation: f64,
    /// Maximum memory this node can allocate to tasks, in MB.
    /// `u64::MAX` means unconstrained (no YAML value supplied).
    pub max_memory_mb: u64,
    /// Labels usable as placement targets in addition to the node id.
    pub tags: Vec<String>,
}

impl NodeConfig {
    /// The fallback node used when the configuration file names no nodes.
    pub fn default_config(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            cpus: vec![0, 1, 2, 3],
            max_utilisation: DEFAULT_MAX_UTILISATION,
            max_memory_mb: 4096,
            tags: Vec::new(),
        }
    }

    /// Returns the number of CPUs available on this node.
    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    /// Returns `true` if `target` names this node, either by id or by one of
    /// its tags.
    pub fn matches_target(&self, target: &str) -> bool {
        self.node_id == target || self.tags.iter().any(|t| t == target)
    }
}

// ── NodeConfigManager ─────────────────────────────────────────────────────────

/// Loads and manages node configurations from a YAML file.
///
/// The node map is ordered by node id and is not mutated after
/// [`load_from_file`](Self::load_from_file) succeeds, so a `NodeConfigManager`
/// behind an `Arc` can be shared freely across threads.
#[derive(Debug)]
pub struct NodeConfigManager {
    /// Map of node id → [`NodeConfig`], sorted by node id.
    nodes: BTreeMap<String, NodeConfig>,

    /// Utilisation ceiling applied to nodes without an explicit
    /// `max_utilisation` entry.
    default_max_utilisation: f64,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl Default for NodeConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeConfigManager {
    /// Creates a new, empty `NodeConfigManager` with the standard 90 %
    /// per-CPU threshold.
    pub fn new() -> Self {
        Self::with_default_threshold(DEFAULT_MAX_UTILISATION)
    }

    /// Creates a manager whose nodes default to `threshold` when the YAML
    /// does not set `max_utilisation`.
    pub fn with_default_threshold(threshold: f64) -> Self {
        Self {
            nodes: BTreeMap::new(),
            default_max_utilisation: threshold,
            loaded: false,
        }
    }

    /// Parses `path` and populates the internal node map.
    ///
    /// * CPU lists are sorted and deduplicated.
    /// * If the file contains no nodes a single `"default_node"` is inserted.
    /// * Calling this method a second time replaces all previously loaded nodes.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or if the YAML is
    /// structurally invalid.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading node configuration from: {}", path.display());

        // Reset state before (re-)loading
        self.nodes.clear();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: NodeConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        for (node_id, entry) in file.nodes {
            let mut cpus = entry.cpus;
            cpus.sort_unstable();
            cpus.dedup();

            let node = NodeConfig {
                node_id: node_id.clone(),
                cpus,
                max_utilisation: entry
                    .max_utilisation
                    .unwrap_or(self.default_max_utilisation),
                max_memory_mb: entry.max_memory_mb,
                tags: entry.tags,
            };

            debug!(
                node = %node.node_id,
                cpus = ?node.cpus,
                max_utilisation = node.max_utilisation,
                max_memory_mb = node.max_memory_mb,
                tags = ?node.tags,
                "parsed node"
            );

            self.nodes.insert(node_id, node);
        }

        // Fallback: no nodes parsed → insert a default entry
        if self.nodes.is_empty() {
            warn!("No nodes found in configuration file, using default configuration");
            let default = NodeConfig::default_config("default_node");
            self.nodes.insert("default_node".to_string(), default);
        }

        self.loaded = true;

        info!(
            "Successfully loaded {} node configuration(s):",
            self.nodes.len()
        );
        for node in self.nodes.values() {
            info!(
                "  Node: {} | CPUs: {} | Memory: {}MB | Ceiling: {:.0}%",
                node.node_id,
                node.cpus.len(),
                node.max_memory_mb,
                node.max_utilisation * 100.0,
            );
        }

        Ok(())
    }

    /// Returns a reference to the [`NodeConfig`] for `node_id`, or `None` if
    /// no node with that id has been loaded.
    pub fn get_node_config(&self, node_id: &str) -> Option<&NodeConfig> {
        self.nodes.get(node_id)
    }

    /// Returns the full map of loaded node configurations, ordered by node id.
    pub fn get_all_nodes(&self) -> &BTreeMap<String, NodeConfig> {
        &self.nodes
    }

    /// Resolve a placement target to candidate nodes, in id order.
    ///
    /// An exact node id match wins and yields exactly that node; otherwise
    /// every node carrying `target` as a tag is a candidate.  An empty vector
    /// means the target names nothing in this configuration.
    pub fn resolve_target(&self, target: &str) -> Vec<&NodeConfig> {
        if let Some(node) = self.nodes.get(target) {
            return vec![node];
        }
        self.nodes
            .values()
            .filter(|n| n.tags.iter().any(|t| t == target))
            .collect()
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    // ── NodeConfig ────────────────────────────────────────────────────────────

    #[test]
    fn default_config_has_expected_values() {
        let cfg = NodeConfig::default_config("default_node");
        assert_eq!(cfg.node_id, "default_node");
        assert_eq!(cfg.cpus, vec![0, 1, 2, 3]);
        assert_eq!(cfg.max_memory_mb, 4096);
        assert!((cfg.max_utilisation - 0.90).abs() < 1e-12);
        assert!(cfg.tags.is_empty());
    }

    #[test]
    fn matches_target_by_id_and_tag() {
        let mut cfg = NodeConfig::default_config("node01");
        cfg.tags = vec!["perception".into()];
        assert!(cfg.matches_target("node01"));
        assert!(cfg.matches_target("perception"));
        assert!(!cfg.matches_target("node02"));
    }

    // ── NodeConfigManager: load_from_file ─────────────────────────────────────

    #[test]
    fn load_example_yaml() {
        let yaml = r#"
nodes:
  node01:
    cpus: [2, 3]
    max_memory_mb: 4096
    tags: ["perception"]
  node02:
    cpus: [2, 3, 4, 5]
    max_utilisation: 0.75
    max_memory_mb: 8192
  node03:
    cpus: [2, 3, 6, 7]
    max_memory_mb: 4096
"#;
        let f = yaml_tempfile(yaml);
        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        assert!(mgr.is_loaded());
        assert_eq!(mgr.get_all_nodes().len(), 3);

        let n1 = mgr.get_node_config("node01").unwrap();
        assert_eq!(n1.cpus, vec![2, 3]);
        assert_eq!(n1.max_memory_mb, 4096);
        assert!((n1.max_utilisation - 0.90).abs() < 1e-12); // default
        assert_eq!(n1.tags, vec!["perception"]);

        let n2 = mgr.get_node_config("node02").unwrap();
        assert_eq!(n2.cpus, vec![2, 3, 4, 5]);
        assert!((n2.max_utilisation - 0.75).abs() < 1e-12);
        assert_eq!(n2.max_memory_mb, 8192);
    }

    #[test]
    fn node_iteration_is_ordered_by_id() {
        let yaml = r#"
nodes:
  zebra:
    cpus: [0]
  alpha:
    cpus: [1]
  middle:
    cpus: [2]
"#;
        let f = yaml_tempfile(yaml);
        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        let ids: Vec<&str> = mgr.get_all_nodes().keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["alpha", "middle", "zebra"]);
    }

    #[test]
    fn cpu_lists_are_sorted_and_deduplicated() {
        let yaml = r#"
nodes:
  n1:
    cpus: [5, 2, 3, 2, 5]
"#;
        let f = yaml_tempfile(yaml);
        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        assert_eq!(mgr.get_node_config("n1").unwrap().cpus, vec![2, 3, 5]);
    }

    #[test]
    fn optional_fields_use_defaults_when_absent() {
        let yaml = r#"
nodes:
  minimal_node:
    cpus: [0]
"#;
        let f = yaml_tempfile(yaml);
        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        let node = mgr.get_node_config("minimal_node").unwrap();
        assert_eq!(node.max_memory_mb, u64::MAX); // default = unconstrained
        assert!((node.max_utilisation - 0.90).abs() < 1e-12);
        assert!(node.tags.is_empty());
    }

    #[test]
    fn custom_default_threshold_applies_to_unset_nodes() {
        let yaml = r#"
nodes:
  plain:
    cpus: [0]
  explicit:
    cpus: [0]
    max_utilisation: 0.5
"#;
        let f = yaml_tempfile(yaml);
        let mut mgr = NodeConfigManager::with_default_threshold(0.8);
        mgr.load_from_file(f.path()).unwrap();

        assert!((mgr.get_node_config("plain").unwrap().max_utilisation - 0.8).abs() < 1e-12);
        assert!((mgr.get_node_config("explicit").unwrap().max_utilisation - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_nodes_section_inserts_default_node() {
        let yaml = "nodes: {}\n";
        let f = yaml_tempfile(yaml);
        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        assert!(mgr.is_loaded());
        assert!(mgr.get_node_config("default_node").is_some());
    }

    #[test]
    fn missing_file_returns_error() {
        let mut mgr = NodeConfigManager::new();
        let result = mgr.load_from_file(Path::new("/nonexistent/path/config.yaml"));
        assert!(result.is_err());
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        let mut mgr = NodeConfigManager::new();
        let result = mgr.load_from_file(f.path());
        assert!(result.is_err());
        assert!(!mgr.is_loaded());
    }

    // ── NodeConfigManager: resolve_target ─────────────────────────────────────

    #[test]
    fn resolve_target_prefers_exact_node_id() {
        let yaml = r#"
nodes:
  node01:
    cpus: [0]
    tags: ["node02"]
  node02:
    cpus: [1]
"#;
        let f = yaml_tempfile(yaml);
        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        // "node02" is both node01's tag and node02's id — the id wins
        let resolved = mgr.resolve_target("node02");
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].node_id, "node02");
    }

    #[test]
    fn resolve_target_by_tag_returns_all_matches_in_id_order() {
        let yaml = r#"
nodes:
  node03:
    cpus: [0]
    tags: ["safety"]
  node01:
    cpus: [1]
    tags: ["safety"]
  node02:
    cpus: [2]
"#;
        let f = yaml_tempfile(yaml);
        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        let resolved = mgr.resolve_target("safety");
        let ids: Vec<&str> = resolved.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["node01", "node03"]);
    }

    #[test]
    fn resolve_target_unknown_returns_empty() {
        let yaml = "nodes:\n  n1:\n    cpus: [0]\n";
        let f = yaml_tempfile(yaml);
        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        assert!(mgr.resolve_target("nonexistent").is_empty());
    }

    // ── NodeConfigManager: reload ─────────────────────────────────────────────

    #[test]
    fn reload_replaces_previous_nodes() {
        let yaml1 = "nodes:\n  n1:\n    cpus: [0]\n";
        let yaml2 = "nodes:\n  n2:\n    cpus: [1]\n";

        let f1 = yaml_tempfile(yaml1);
        let f2 = yaml_tempfile(yaml2);

        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f1.path()).unwrap();
        assert!(mgr.get_node_config("n1").is_some());

        mgr.load_from_file(f2.path()).unwrap();
        assert!(mgr.get_node_config("n1").is_none(), "old node must be gone");
        assert!(mgr.get_node_config("n2").is_some());
    }
}
