use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Cloud provider inferred from node labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudProvider {
    #[serde(rename = "AWS EKS")]
    AwsEks,
    #[serde(rename = "GCP GKE")]
    GcpGke,
    #[serde(rename = "Azure AKS")]
    AzureAks,
    #[serde(rename = "unknown")]
    Unknown,
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloudProvider::AwsEks => "AWS EKS",
            CloudProvider::GcpGke => "GCP GKE",
            CloudProvider::AzureAks => "Azure AKS",
            CloudProvider::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Scheduling exclusion marker carried through from node spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: String,
}

impl fmt::Display for Taint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}:{}", self.key, v, self.effect),
            None => write!(f, "{}:{}", self.key, self.effect),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub nr_nodes: usize,
    pub nr_pods: usize,
    pub nr_deployments: usize,
    pub nr_replicasets: usize,
    pub nr_daemonsets: usize,
    pub nr_services: usize,
    pub nr_namespaces: usize,
}

/// Per-node capacity and accumulated usage. Headroom fields stay `None`
/// until the capacity analyzer runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUsage {
    pub arch: String,
    #[serde(rename = "osImage")]
    pub os_image: String,
    #[serde(rename = "containerRuntime")]
    pub container_runtime: String,
    pub instance_type: String,
    pub provider: CloudProvider,
    pub control_plane: bool,
    pub cores: i64,
    pub capacity_pods: i64,
    pub capacity_cpu: f64,
    pub capacity_memory: i64,
    pub usage_pods: i64,
    pub usage_cpu: f64,
    pub usage_memory: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headroom_pod: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headroom_cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headroom_memory: Option<i64>,
    #[serde(default)]
    pub taints: Vec<Taint>,
}

/// A workload reduced to the fields the report needs. Only deployments
/// carry a replica count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityClassInfo {
    pub name: String,
    pub value: i32,
    #[serde(default, rename = "preemptionPolicy", skip_serializing_if = "Option::is_none")]
    pub preemption_policy: Option<String>,
}

/// Normalized point-in-time view of one cluster, produced by the condenser
/// and completed (headroom + warnings) by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub cluster_summary: ClusterSummary,
    pub node_usage: BTreeMap<String, NodeUsage>,
    pub deployments: Vec<WorkloadRef>,
    pub daemonsets: Vec<WorkloadRef>,
    pub services: Vec<WorkloadRef>,
    pub pods: Vec<WorkloadRef>,
    #[serde(default)]
    pub priority_classes: BTreeMap<String, PriorityClassInfo>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

/// Capacity dimension used by the node-size disparity rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityMetric {
    Pods,
    Cpu,
    Memory,
}

impl CapacityMetric {
    pub fn capacity_of(&self, node: &NodeUsage) -> f64 {
        match self {
            CapacityMetric::Pods => node.capacity_pods as f64,
            CapacityMetric::Cpu => node.capacity_cpu,
            CapacityMetric::Memory => node.capacity_memory as f64,
        }
    }
}

impl fmt::Display for CapacityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapacityMetric::Pods => "pods",
            CapacityMetric::Cpu => "cpu",
            CapacityMetric::Memory => "memory",
        };
        f.write_str(s)
    }
}

/// A capacity diagnostic raised by the analyzer. Each variant carries the
/// structured fields renderers and tests match on; the `resource`,
/// `message` and `detail` accessors give the three-column presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    AutoscalerPresent {
        service: String,
        namespace: String,
    },
    NodeTaints {
        node: String,
        taints: Vec<Taint>,
    },
    PodHeadroomLow {
        node: String,
        headroom: i64,
    },
    CpuHeadroomLow {
        node: String,
        headroom: f64,
    },
    MemoryHeadroomLow {
        node: String,
        headroom_bytes: i64,
    },
    NodeSizeDisparity {
        metric: CapacityMetric,
        nodes: Vec<String>,
    },
}

impl Warning {
    /// Scope the warning applies to: a node name or a cluster-wide marker.
    pub fn resource(&self) -> String {
        match self {
            Warning::AutoscalerPresent { .. } => "cluster-wide".to_string(),
            Warning::NodeTaints { node, .. }
            | Warning::PodHeadroomLow { node, .. }
            | Warning::CpuHeadroomLow { node, .. }
            | Warning::MemoryHeadroomLow { node, .. } => format!("Node {node}"),
            Warning::NodeSizeDisparity { .. } => "See nodes capacity overview".to_string(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Warning::AutoscalerPresent { .. } => {
                "cluster-autoscaler detected. Ensure the monitoring agent has a priority class \
                 high enough to stay scheduled while the cluster scales out"
                    .to_string()
            }
            Warning::NodeTaints { .. } => {
                "node has taints, make sure the agent daemonset tolerates them".to_string()
            }
            Warning::PodHeadroomLow { headroom, .. } => format!(
                "pod capacity warning: node pod headroom is only {headroom} pods, \
                 ensure the agent can be scheduled"
            ),
            Warning::CpuHeadroomLow { headroom, .. } => format!(
                "cpu capacity warning: node cpu headroom is only {headroom:.2} CPU, \
                 ensure the agent can be scheduled"
            ),
            Warning::MemoryHeadroomLow { headroom_bytes, .. } => format!(
                "memory capacity warning: node memory headroom is only {:.2} MB, \
                 ensure the agent can be scheduled",
                *headroom_bytes as f64 / 1024.0 / 1024.0
            ),
            Warning::NodeSizeDisparity { .. } => {
                "some nodes are much smaller than others, consider differentiated \
                 per-node-pool daemonset sizing"
                    .to_string()
            }
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Warning::AutoscalerPresent { service, namespace } => {
                format!("service: {service}, namespace: {namespace}")
            }
            Warning::NodeTaints { taints, .. } => {
                let rendered: Vec<String> = taints.iter().map(Taint::to_string).collect();
                format!("taints: {}", rendered.join(", "))
            }
            Warning::PodHeadroomLow { headroom, .. } => {
                format!("pod capacity headroom: {headroom}")
            }
            Warning::CpuHeadroomLow { headroom, .. } => format!("cpu headroom: {headroom:.2}"),
            Warning::MemoryHeadroomLow { headroom_bytes, .. } => format!(
                "memory headroom: {:.2} MB",
                *headroom_bytes as f64 / 1024.0 / 1024.0
            ),
            Warning::NodeSizeDisparity { metric, nodes } => {
                format!("{} capacity of {} below half the largest node", metric, nodes.join(", "))
            }
        }
    }
}
