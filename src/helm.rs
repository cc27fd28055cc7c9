use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::types::{ClusterSnapshot, Taint};

#[derive(Debug, Serialize)]
struct HelmValues {
    agent: AgentValues,
}

#[derive(Debug, Serialize)]
struct AgentValues {
    tolerations: Vec<Taint>,
}

/// The distinct taints across a cluster's nodes, deduplicated by
/// `(key, value)` so every node pool contributes one toleration.
pub fn cluster_taints(snapshot: &ClusterSnapshot) -> Vec<Taint> {
    let mut taints: BTreeMap<(String, Option<String>), Taint> = BTreeMap::new();
    for node in snapshot.node_usage.values() {
        for taint in &node.taints {
            taints.insert((taint.key.clone(), taint.value.clone()), taint.clone());
        }
    }
    taints.into_values().collect()
}

/// Write a `<cluster>.values.yaml` tolerations document into `dir` for each
/// cluster whose nodes carry taints. Returns the files written.
pub fn write_helm_values(
    clusters: &BTreeMap<String, ClusterSnapshot>,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (cluster, snapshot) in clusters {
        let tolerations = cluster_taints(snapshot);
        if tolerations.is_empty() {
            continue;
        }
        let path = dir.join(format!("{cluster}.values.yaml"));
        let file = File::create(&path)
            .with_context(|| format!("creating helm values file {}", path.display()))?;
        serde_yaml::to_writer(file, &HelmValues { agent: AgentValues { tolerations } })
            .with_context(|| format!("writing helm values for cluster {cluster}"))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CloudProvider, NodeUsage};

    fn node_with_taints(taints: Vec<Taint>) -> NodeUsage {
        NodeUsage {
            arch: "amd64".to_string(),
            os_image: "linux".to_string(),
            container_runtime: "containerd://1.6".to_string(),
            instance_type: "unknown".to_string(),
            provider: CloudProvider::Unknown,
            control_plane: false,
            cores: 2,
            capacity_pods: 110,
            capacity_cpu: 2.0,
            capacity_memory: 8 * 1024 * 1024 * 1024,
            usage_pods: 0,
            usage_cpu: 0.0,
            usage_memory: 0,
            headroom_pod: None,
            headroom_cpu: None,
            headroom_memory: None,
            taints,
        }
    }

    fn taint(key: &str, value: Option<&str>) -> Taint {
        Taint {
            key: key.to_string(),
            value: value.map(str::to_string),
            effect: "NoSchedule".to_string(),
        }
    }

    #[test]
    fn taints_deduplicate_by_key_and_value() {
        let mut snapshot = ClusterSnapshot::default();
        snapshot
            .node_usage
            .insert("n1".to_string(), node_with_taints(vec![taint("dedicated", Some("gpu"))]));
        snapshot
            .node_usage
            .insert("n2".to_string(), node_with_taints(vec![taint("dedicated", Some("gpu"))]));
        snapshot
            .node_usage
            .insert("n3".to_string(), node_with_taints(vec![taint("dedicated", None)]));

        let taints = cluster_taints(&snapshot);
        assert_eq!(taints.len(), 2);
    }

    #[test]
    fn values_file_written_only_for_tainted_clusters() {
        let dir = tempfile::tempdir().unwrap();
        let mut clusters = BTreeMap::new();

        let mut tainted = ClusterSnapshot::default();
        tainted
            .node_usage
            .insert("n1".to_string(), node_with_taints(vec![taint("dedicated", Some("gpu"))]));
        clusters.insert("prod".to_string(), tainted);

        let mut untainted = ClusterSnapshot::default();
        untainted.node_usage.insert("n1".to_string(), node_with_taints(Vec::new()));
        clusters.insert("staging".to_string(), untainted);

        let written = write_helm_values(&clusters, dir.path()).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("prod.values.yaml"));

        let content = std::fs::read_to_string(&written[0]).unwrap();
        let values: serde_yaml::Value = serde_yaml::from_str(&content).unwrap();
        let tolerations = &values["agent"]["tolerations"];
        assert_eq!(tolerations[0]["key"], "dedicated");
        assert_eq!(tolerations[0]["value"], "gpu");
        assert_eq!(tolerations[0]["effect"], "NoSchedule");
    }
}
