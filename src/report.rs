use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::types::{ClusterSnapshot, NodeUsage, Warning, WorkloadRef};

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct NodeInfoRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "arch")]
    arch: String,
    #[tabled(rename = "osImage")]
    os_image: String,
    #[tabled(rename = "containerRuntime")]
    container_runtime: String,
    #[tabled(rename = "instance_type")]
    instance_type: String,
    #[tabled(rename = "provider")]
    provider: String,
    #[tabled(rename = "control_plane")]
    control_plane: String,
}

#[derive(Tabled)]
struct NodeUsageRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "instance_type")]
    instance_type: String,
    #[tabled(rename = "cores")]
    cores: String,
    #[tabled(rename = "capacity_pods")]
    capacity_pods: String,
    #[tabled(rename = "capacity_cpu")]
    capacity_cpu: String,
    #[tabled(rename = "capacity_memory")]
    capacity_memory: String,
    #[tabled(rename = "usage_pods")]
    usage_pods: String,
    #[tabled(rename = "usage_cpu")]
    usage_cpu: String,
    #[tabled(rename = "usage_memory")]
    usage_memory: String,
    #[tabled(rename = "headroom_pod")]
    headroom_pod: String,
    #[tabled(rename = "headroom_cpu")]
    headroom_cpu: String,
    #[tabled(rename = "headroom_memory")]
    headroom_memory: String,
    #[tabled(rename = "taints")]
    taints: String,
}

#[derive(Tabled)]
struct WorkloadRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
}

#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
}

#[derive(Tabled)]
struct PriorityClassRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "PreemptionPolicy")]
    preemption_policy: String,
}

#[derive(Tabled)]
struct WarningRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Warning")]
    warning: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Render the analyzed snapshot map as sectioned text tables, optionally
/// restricted to a single cluster.
pub fn render_text(clusters: &BTreeMap<String, ClusterSnapshot>, only: Option<&str>) -> String {
    let mut out = String::new();
    for (cluster, snapshot) in clusters {
        if only.is_some_and(|c| c != cluster.as_str()) {
            continue;
        }
        render_cluster(&mut out, cluster, snapshot);
    }
    out
}

/// Serialize the analyzed snapshot map as a pretty JSON document.
pub fn render_json(clusters: &BTreeMap<String, ClusterSnapshot>) -> Result<String> {
    Ok(serde_json::to_string_pretty(clusters)?)
}

fn render_cluster(out: &mut String, cluster: &str, snapshot: &ClusterSnapshot) {
    let rule = "─".repeat("Cluster report for ".len() + cluster.len());
    let _ = write!(out, "\n{rule}\nCluster report for {cluster}\n{rule}\n\n");

    out.push_str("Cluster summary metrics\n");
    out.push_str(&summary_table(snapshot));
    out.push_str("\n\n");

    if !snapshot.node_usage.is_empty() {
        let nodes = nodes_by_size(snapshot);

        out.push_str("Node information\n");
        out.push_str(&table(nodes.iter().map(|(name, n)| NodeInfoRow {
            node: (*name).clone(),
            arch: n.arch.clone(),
            os_image: n.os_image.clone(),
            container_runtime: n.container_runtime.clone(),
            instance_type: n.instance_type.clone(),
            provider: n.provider.to_string(),
            control_plane: n.control_plane.to_string(),
        })));

        out.push_str("\n\nNode usage\n");
        out.push_str(&table(nodes.iter().map(|(name, n)| NodeUsageRow {
            node: (*name).clone(),
            instance_type: n.instance_type.clone(),
            cores: n.cores.to_string(),
            capacity_pods: n.capacity_pods.to_string(),
            capacity_cpu: format!("{:.2}", n.capacity_cpu),
            capacity_memory: fmt_mb(n.capacity_memory),
            usage_pods: n.usage_pods.to_string(),
            usage_cpu: format!("{:.2}", n.usage_cpu),
            usage_memory: fmt_mb(n.usage_memory),
            headroom_pod: n.headroom_pod.map(|h| h.to_string()).unwrap_or_else(dash),
            headroom_cpu: n.headroom_cpu.map(|h| format!("{h:.2}")).unwrap_or_else(dash),
            headroom_memory: n.headroom_memory.map(fmt_mb).unwrap_or_else(dash),
            taints: n.taints.iter().map(|t| t.key.clone()).collect::<Vec<_>>().join(", "),
        })));
    }

    if !snapshot.services.is_empty() {
        out.push_str("\n\nServices\n");
        out.push_str(&workload_table(&snapshot.services));
    }

    if !snapshot.deployments.is_empty() {
        out.push_str("\n\nDeployments\n");
        let mut deployments: Vec<&WorkloadRef> = snapshot.deployments.iter().collect();
        deployments.sort_by_key(|d| (d.namespace.clone(), d.name.clone()));
        out.push_str(&table(deployments.into_iter().map(|d| DeploymentRow {
            namespace: d.namespace.clone(),
            name: d.name.clone(),
            replicas: d.replicas.map(|r| r.to_string()).unwrap_or_default(),
        })));
    }

    if !snapshot.daemonsets.is_empty() {
        out.push_str("\n\nDaemonsets\n");
        out.push_str(&workload_table(&snapshot.daemonsets));
    }

    if !snapshot.priority_classes.is_empty() {
        out.push_str("\n\nPriorityClasses\n");
        out.push_str(&table(snapshot.priority_classes.values().map(|pc| PriorityClassRow {
            name: pc.name.clone(),
            value: pc.value.to_string(),
            preemption_policy: pc.preemption_policy.clone().unwrap_or_default(),
        })));
    }

    if snapshot.warnings.is_empty() {
        out.push_str("\n\nThere are no warnings\n");
    } else {
        out.push_str("\n\nWarnings\n");
        let mut warnings = snapshot.warnings.clone();
        warnings.sort_by_key(Warning::message);
        out.push_str(&table(warnings.iter().map(|w| WarningRow {
            resource: w.resource(),
            warning: w.message(),
            detail: w.detail(),
        })));
        out.push('\n');
    }
}

fn summary_table(snapshot: &ClusterSnapshot) -> String {
    let s = &snapshot.cluster_summary;
    let rows = [
        ("nr_nodes", s.nr_nodes),
        ("nr_pods", s.nr_pods),
        ("nr_deployments", s.nr_deployments),
        ("nr_replicasets", s.nr_replicasets),
        ("nr_daemonsets", s.nr_daemonsets),
        ("nr_services", s.nr_services),
        ("nr_namespaces", s.nr_namespaces),
    ];
    table(
        rows.into_iter()
            .map(|(metric, value)| MetricRow { metric: metric.to_string(), value: value.to_string() }),
    )
}

// Largest nodes first, same ordering the capacity overview tables use.
fn nodes_by_size(snapshot: &ClusterSnapshot) -> Vec<(&String, &NodeUsage)> {
    let mut nodes: Vec<(&String, &NodeUsage)> = snapshot.node_usage.iter().collect();
    nodes.sort_by(|a, b| {
        (b.1.cores, b.1.capacity_pods)
            .cmp(&(a.1.cores, a.1.capacity_pods))
            .then(b.1.capacity_cpu.total_cmp(&a.1.capacity_cpu))
            .then(b.1.capacity_memory.cmp(&a.1.capacity_memory))
    });
    nodes
}

fn workload_table(workloads: &[WorkloadRef]) -> String {
    let mut sorted: Vec<&WorkloadRef> = workloads.iter().collect();
    sorted.sort_by_key(|w| (w.namespace.clone(), w.name.clone()));
    table(
        sorted
            .into_iter()
            .map(|w| WorkloadRow { namespace: w.namespace.clone(), name: w.name.clone() }),
    )
}

fn table<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn fmt_mb(bytes: i64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

fn dash() -> String {
    "-".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::analyze_cluster;
    use crate::types::{CloudProvider, Taint};

    fn sample() -> BTreeMap<String, ClusterSnapshot> {
        let mut snapshot = ClusterSnapshot::default();
        snapshot.cluster_summary.nr_nodes = 1;
        snapshot.node_usage.insert(
            "node-a".to_string(),
            NodeUsage {
                arch: "arm64".to_string(),
                os_image: "Ubuntu 22.04".to_string(),
                container_runtime: "containerd://1.7".to_string(),
                instance_type: "t4g.medium".to_string(),
                provider: CloudProvider::AwsEks,
                control_plane: false,
                cores: 2,
                capacity_pods: 17,
                capacity_cpu: 2.0,
                capacity_memory: 4 * 1024 * 1024 * 1024,
                usage_pods: 3,
                usage_cpu: 0.35,
                usage_memory: 512 * 1024 * 1024,
                headroom_pod: None,
                headroom_cpu: None,
                headroom_memory: None,
                taints: vec![Taint {
                    key: "dedicated".to_string(),
                    value: Some("gpu".to_string()),
                    effect: "NoSchedule".to_string(),
                }],
            },
        );
        snapshot.services.push(WorkloadRef {
            name: "kubernetes".to_string(),
            namespace: "default".to_string(),
            uid: "svc-1".to_string(),
            replicas: None,
        });
        let mut clusters = BTreeMap::new();
        clusters.insert("prod".to_string(), analyze_cluster(snapshot));
        clusters
    }

    #[test]
    fn text_report_has_all_sections() {
        let text = render_text(&sample(), None);
        assert!(text.contains("Cluster report for prod"));
        assert!(text.contains("Cluster summary metrics"));
        assert!(text.contains("Node information"));
        assert!(text.contains("Node usage"));
        assert!(text.contains("Services"));
        assert!(text.contains("Warnings"));
        assert!(text.contains("node has taints"));
        // analyzed: headroom columns are filled in
        assert!(text.contains("14"));
    }

    #[test]
    fn no_warnings_path_is_reported_explicitly() {
        let mut clusters = BTreeMap::new();
        clusters.insert("empty".to_string(), analyze_cluster(ClusterSnapshot::default()));
        let text = render_text(&clusters, None);
        assert!(text.contains("There are no warnings"));
    }

    #[test]
    fn cluster_filter_skips_other_clusters() {
        let mut clusters = sample();
        clusters.insert("staging".to_string(), ClusterSnapshot::default());
        let text = render_text(&clusters, Some("staging"));
        assert!(text.contains("Cluster report for staging"));
        assert!(!text.contains("Cluster report for prod"));
    }

    #[test]
    fn json_report_round_trips() {
        let clusters = sample();
        let json = render_json(&clusters).unwrap();
        let back: BTreeMap<String, ClusterSnapshot> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, clusters);
    }
}
