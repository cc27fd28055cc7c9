use std::collections::BTreeMap;

use crate::types::{CapacityMetric, ClusterSnapshot, NodeUsage, Warning};

/// A node scheduling fewer than this many additional pods is worth flagging.
const POD_HEADROOM_FLOOR: i64 = 2;
/// Cores left once declared requests are subtracted.
const CPU_HEADROOM_FLOOR: f64 = 0.2;
/// 512 MiB.
const MEMORY_HEADROOM_FLOOR: i64 = 512 * 1024 * 1024;

/// Evaluate the capacity rule set against every snapshot. Returns new
/// snapshots with headroom recomputed from capacity and usage and the
/// warning list rebuilt, so repeated analysis yields identical results.
pub fn analyze(clusters: BTreeMap<String, ClusterSnapshot>) -> BTreeMap<String, ClusterSnapshot> {
    clusters
        .into_iter()
        .map(|(cluster, snapshot)| (cluster, analyze_cluster(snapshot)))
        .collect()
}

/// Run all rules for one cluster. Rules never short-circuit each other; the
/// disparity rule alone stops at the first metric that trips it.
pub fn analyze_cluster(mut snapshot: ClusterSnapshot) -> ClusterSnapshot {
    let mut warnings = Vec::new();

    for service in &snapshot.services {
        if service.name.contains("cluster-autoscaler") {
            warnings.push(Warning::AutoscalerPresent {
                service: service.name.clone(),
                namespace: service.namespace.clone(),
            });
        }
    }

    warnings.extend(node_warnings(&mut snapshot.node_usage));
    snapshot.warnings = warnings;
    snapshot
}

fn node_warnings(node_usage: &mut BTreeMap<String, NodeUsage>) -> Vec<Warning> {
    let mut warnings = Vec::new();
    for (name, node) in node_usage.iter_mut() {
        if !node.taints.is_empty() {
            warnings
                .push(Warning::NodeTaints { node: name.clone(), taints: node.taints.clone() });
        }

        let pod_headroom = node.capacity_pods - node.usage_pods;
        node.headroom_pod = Some(pod_headroom);
        if pod_headroom <= POD_HEADROOM_FLOOR {
            warnings.push(Warning::PodHeadroomLow { node: name.clone(), headroom: pod_headroom });
        }

        let cpu_headroom = node.capacity_cpu - node.usage_cpu;
        node.headroom_cpu = Some(cpu_headroom);
        if cpu_headroom < CPU_HEADROOM_FLOOR {
            warnings.push(Warning::CpuHeadroomLow { node: name.clone(), headroom: cpu_headroom });
        }

        let memory_headroom = node.capacity_memory - node.usage_memory;
        node.headroom_memory = Some(memory_headroom);
        if memory_headroom < MEMORY_HEADROOM_FLOOR {
            warnings.push(Warning::MemoryHeadroomLow {
                node: name.clone(),
                headroom_bytes: memory_headroom,
            });
        }
    }

    if let Some(disparity) = disparity_warning(node_usage) {
        warnings.push(disparity);
    }
    warnings
}

/// One warning at most: the first capacity metric for which some node falls
/// below half the largest node. Skipped outright for empty clusters.
fn disparity_warning(node_usage: &BTreeMap<String, NodeUsage>) -> Option<Warning> {
    if node_usage.is_empty() {
        return None;
    }
    for metric in [CapacityMetric::Pods, CapacityMetric::Cpu, CapacityMetric::Memory] {
        let max = node_usage
            .values()
            .map(|n| metric.capacity_of(n))
            .fold(f64::NEG_INFINITY, f64::max);
        let undersized: Vec<String> = node_usage
            .iter()
            .filter(|(_, n)| metric.capacity_of(n) < 0.5 * max)
            .map(|(name, _)| name.clone())
            .collect();
        if !undersized.is_empty() {
            return Some(Warning::NodeSizeDisparity { metric, nodes: undersized });
        }
    }
    None
}
