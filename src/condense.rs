use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::warn;

use crate::index::ClusterIndex;
use crate::quantity::{parse_cpu, parse_memory};
use crate::types::{
    CloudProvider, ClusterSnapshot, ClusterSummary, NodeUsage, PriorityClassInfo, Taint,
    WorkloadRef,
};

const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";
const INSTANCE_TYPE_LABEL_LEGACY: &str = "beta.kubernetes.io/instance-type";
const CONTROL_PLANE_LABELS: &[&str] =
    &["node-role.kubernetes.io/control-plane", "node-role.kubernetes.io/controlplane"];

/// Reduce each indexed cluster to the normalized snapshot the analyzer and
/// report consume.
pub fn condense(clusters: &BTreeMap<String, ClusterIndex>) -> BTreeMap<String, ClusterSnapshot> {
    clusters
        .iter()
        .map(|(cluster, index)| (cluster.clone(), condense_cluster(cluster, index)))
        .collect()
}

fn condense_cluster(cluster: &str, index: &ClusterIndex) -> ClusterSnapshot {
    ClusterSnapshot {
        cluster_summary: summarize(index),
        node_usage: node_usage(cluster, index),
        deployments: index
            .deployments()
            .values()
            .filter_map(|d| workload_ref(&d.metadata, d.spec.as_ref().and_then(|s| s.replicas)))
            .collect(),
        daemonsets: index
            .daemon_sets()
            .values()
            .filter_map(|d| workload_ref(&d.metadata, None))
            .collect(),
        services: index
            .services()
            .values()
            .filter_map(|s| workload_ref(&s.metadata, None))
            .collect(),
        pods: index.pods().values().filter_map(|p| workload_ref(&p.metadata, None)).collect(),
        priority_classes: index
            .priority_classes()
            .values()
            .filter_map(|pc| {
                let name = pc.metadata.name.clone()?;
                Some((
                    name.clone(),
                    PriorityClassInfo {
                        name,
                        value: pc.value,
                        preemption_policy: pc.preemption_policy.clone(),
                    },
                ))
            })
            .collect(),
        warnings: Vec::new(),
    }
}

fn summarize(index: &ClusterIndex) -> ClusterSummary {
    ClusterSummary {
        nr_nodes: index.nodes().len(),
        nr_pods: index.pods().len(),
        nr_deployments: index.deployments().len(),
        nr_replicasets: index.replica_sets().len(),
        nr_daemonsets: index.daemon_sets().len(),
        nr_services: index.services().len(),
        nr_namespaces: index.namespaces().len(),
    }
}

fn workload_ref(meta: &ObjectMeta, replicas: Option<i32>) -> Option<WorkloadRef> {
    Some(WorkloadRef {
        name: meta.name.clone()?,
        namespace: meta.namespace.clone().unwrap_or_default(),
        uid: meta.uid.clone().unwrap_or_default(),
        replicas,
    })
}

fn node_usage(cluster: &str, index: &ClusterIndex) -> BTreeMap<String, NodeUsage> {
    let mut usage = BTreeMap::new();
    for node in index.nodes().values() {
        let Some(name) = node.metadata.name.clone() else { continue };
        usage.insert(name, condense_node(cluster, node));
    }
    accumulate_pod_requests(cluster, index.pods().values(), &mut usage);
    usage
}

fn condense_node(cluster: &str, node: &Node) -> NodeUsage {
    let empty = BTreeMap::new();
    let labels = node.metadata.labels.as_ref().unwrap_or(&empty);
    let node_info = node.status.as_ref().and_then(|s| s.node_info.as_ref());
    let capacity = node.status.as_ref().and_then(|s| s.capacity.as_ref());

    let capacity_cpu = capacity
        .and_then(|c| c.get("cpu"))
        .map(|q| parse_quantity_or_zero(cluster, "cpu capacity", q, parse_cpu))
        .unwrap_or(0.0);
    let capacity_memory = capacity
        .and_then(|c| c.get("memory"))
        .map(|q| parse_quantity_or_zero(cluster, "memory capacity", q, parse_memory))
        .unwrap_or(0);
    let capacity_pods = capacity
        .and_then(|c| c.get("pods"))
        .map(|q| parse_quantity_or_zero(cluster, "pod capacity", q, parse_memory))
        .unwrap_or(0);

    NodeUsage {
        arch: node_info.map(|i| i.architecture.clone()).unwrap_or_else(|| "unknown".to_string()),
        os_image: node_info.map(|i| i.os_image.clone()).unwrap_or_else(|| "unknown".to_string()),
        container_runtime: node_info
            .map(|i| i.container_runtime_version.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        instance_type: labels
            .get(INSTANCE_TYPE_LABEL)
            .or_else(|| labels.get(INSTANCE_TYPE_LABEL_LEGACY))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string()),
        provider: infer_provider(labels),
        control_plane: CONTROL_PLANE_LABELS.iter().any(|l| labels.contains_key(*l)),
        cores: capacity_cpu as i64,
        capacity_pods,
        capacity_cpu,
        capacity_memory,
        usage_pods: 0,
        usage_cpu: 0.0,
        usage_memory: 0,
        headroom_pod: None,
        headroom_cpu: None,
        headroom_memory: None,
        taints: node
            .spec
            .as_ref()
            .and_then(|s| s.taints.as_ref())
            .map(|taints| {
                taints
                    .iter()
                    .map(|t| Taint {
                        key: t.key.clone(),
                        value: t.value.clone(),
                        effect: t.effect.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Accumulate declared container requests of scheduled pods into their
/// node's usage totals. Pods without an assigned node (or naming a node the
/// index never saw) and containers without requests contribute nothing;
/// this undercounts real usage and is a documented limitation.
fn accumulate_pod_requests<'a>(
    cluster: &str,
    pods: impl Iterator<Item = &'a Pod>,
    usage: &mut BTreeMap<String, NodeUsage>,
) {
    for pod in pods {
        let Some(spec) = pod.spec.as_ref() else { continue };
        let Some(node_name) = spec.node_name.as_deref() else { continue };
        let Some(node) = usage.get_mut(node_name) else { continue };
        node.usage_pods += 1;
        for container in &spec.containers {
            let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref())
            else {
                continue;
            };
            if let Some(q) = requests.get("cpu") {
                match parse_cpu(&q.0) {
                    Ok(cores) => node.usage_cpu += cores,
                    Err(err) => warn!(cluster, node = node_name, %err, "skipping cpu request"),
                }
            }
            if let Some(q) = requests.get("memory") {
                match parse_memory(&q.0) {
                    Ok(bytes) => node.usage_memory += bytes,
                    Err(err) => warn!(cluster, node = node_name, %err, "skipping memory request"),
                }
            }
        }
    }
}

fn parse_quantity_or_zero<T: Default>(
    cluster: &str,
    what: &str,
    q: &Quantity,
    parse: impl Fn(&str) -> Result<T, crate::quantity::InvalidQuantity>,
) -> T {
    match parse(&q.0) {
        Ok(v) => v,
        Err(err) => {
            warn!(cluster, what, %err, "unparseable node quantity, defaulting to zero");
            T::default()
        }
    }
}

/// Best-effort provider inference from node label keys and values.
/// Providers are tested in a fixed order (AWS, then GCP, then Azure) and
/// the first matching label wins.
pub fn infer_provider(labels: &BTreeMap<String, String>) -> CloudProvider {
    for (key, value) in labels {
        for text in [key.as_str(), value.as_str()] {
            if text.contains("aws") || text.contains("amazon") {
                return CloudProvider::AwsEks;
            }
            if text.contains("gke") || text.contains("google") {
                return CloudProvider::GcpGke;
            }
            if text.contains("azure") {
                return CloudProvider::AzureAks;
            }
        }
    }
    CloudProvider::Unknown
}
