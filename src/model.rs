use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::index::{ClusterIndex, ObjectKind, RawObject};

/// Schema tags carried by model records.
pub mod schema {
    pub const CLUSTER: &str = "model_k8s_cluster::1.0.0";
    pub const NODE: &str = "model_k8s_node::1.0.0";
    pub const REPLICASET: &str = "model_k8s_replicaset::1.0.0";
    pub const DAEMONSET: &str = "model_k8s_daemonset::1.0.0";
    pub const DEPLOYMENT: &str = "model_k8s_deployment::1.0.0";
    pub const POD: &str = "model_k8s_pod::1.0.0";
    pub const SERVICE: &str = "model_k8s_service::1.0.0";
    pub const ENDPOINT: &str = "model_k8s_endpoint::1.0.0";
    pub const STATEFULSET: &str = "model_k8s_statefulset::1.0.0";
    pub const JOB: &str = "model_k8s_job::1.0.0";
    pub const CRONJOB: &str = "model_k8s_cronjob::1.0.0";
    pub const CONTAINER: &str = "model_container::1.0.0";

    /// The subset of the catalog the sizing report consumes.
    pub const K8S_DEFAULTS: &[&str] =
        &[CLUSTER, NODE, REPLICASET, DAEMONSET, DEPLOYMENT, POD, SERVICE];
}

/// Cluster-describing record: carries its own identity and the namespace
/// list instead of a `cluster_uid`.
#[derive(Debug, Deserialize)]
struct ClusterRecord {
    name: String,
    id: String,
    #[serde(default)]
    namespaces: Vec<String>,
}

/// Result of the last-write-wins reduction over a model-record stream.
#[derive(Debug, Default)]
pub struct ModelIndex {
    records: BTreeMap<String, (f64, Value)>,
    maxtime: f64,
}

impl ModelIndex {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest timestamp observed across accepted records, when any record
    /// carried one.
    pub fn horizon(&self) -> Option<DateTime<Utc>> {
        (self.maxtime > 0.0).then(|| DateTime::from_timestamp(self.maxtime as i64, 0)).flatten()
    }

    pub fn into_records(self) -> impl Iterator<Item = Value> {
        self.records.into_values().map(|(_, rec)| rec)
    }
}

/// Reduce a flat record stream so only the last write per record id
/// survives. "Last" means highest `time`; records without a timestamp count
/// as time zero, and equal timestamps resolve to the record encountered
/// later in the stream. Records whose `schema` is not in `allowed` are
/// silently dropped.
pub fn last_models<I>(records: I, allowed: &[&str]) -> ModelIndex
where
    I: IntoIterator<Item = Value>,
{
    let mut index = ModelIndex::default();
    for record in records {
        let Some(schema) = record.get("schema").and_then(Value::as_str) else {
            debug!("dropping model record without schema tag");
            continue;
        };
        if !allowed.contains(&schema) {
            debug!(schema, "dropping model record outside allow-list");
            continue;
        }
        let Some(id) = record.get("id").and_then(Value::as_str).map(str::to_owned) else {
            debug!(schema, "dropping model record without id");
            continue;
        };
        let time = record.get("time").and_then(Value::as_f64).unwrap_or(0.0);
        index.maxtime = index.maxtime.max(time);
        match index.records.get(&id) {
            Some((seen, _)) if *seen > time => {}
            _ => {
                index.records.insert(id, (time, record));
            }
        }
    }
    index
}

/// Build one `ClusterIndex` per cluster identifier from the surviving
/// records. Non-cluster records are grouped by their `cluster_uid`
/// (`"unknown"` when absent); a record carrying a `k8s_status` field has its
/// status replaced by it before typed parsing.
pub fn index_models(index: ModelIndex) -> Result<BTreeMap<String, ClusterIndex>> {
    let mut clusters: BTreeMap<String, ClusterIndex> = BTreeMap::new();
    for mut record in index.into_records() {
        let schema = record.get("schema").and_then(Value::as_str).unwrap_or_default().to_owned();

        if schema == schema::CLUSTER {
            let cluster: ClusterRecord = serde_json::from_value(record)
                .context("malformed cluster record in model stream")?;
            let entry = clusters.entry(cluster.id).or_default();
            entry.set_display_name(&cluster.name);
            for ns in &cluster.namespaces {
                entry.add_namespace(ns);
            }
            continue;
        }

        let cluster_uid = record
            .get("cluster_uid")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        normalize_status(&mut record);
        let Some(kind) = record.get("kind").and_then(Value::as_str) else {
            debug!(schema, "dropping model record without kind");
            continue;
        };
        let Some(kind) = ObjectKind::from_kind(kind) else {
            debug!(schema, kind, "dropping model record of unindexed kind");
            continue;
        };
        let object = RawObject::from_value(kind, record)
            .with_context(|| format!("malformed {} model record", kind.as_str()))?;
        clusters.entry(cluster_uid).or_default().insert(object);
    }
    Ok(clusters)
}

// Model records report the platform's own status under `status` and the
// Kubernetes one under `k8s_status`; indexing wants the Kubernetes one.
fn normalize_status(record: &mut Value) {
    let Some(object) = record.as_object_mut() else { return };
    if let Some(k8s_status) = object.remove("k8s_status") {
        object.insert("status".to_string(), k8s_status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_record(id: &str, time: f64, node_name: &str) -> Value {
        json!({
            "schema": schema::NODE,
            "id": id,
            "time": time,
            "cluster_uid": "clus-1",
            "kind": "Node",
            "metadata": {"name": node_name, "uid": id}
        })
    }

    #[test]
    fn unknown_schemas_are_dropped() {
        let records = vec![
            json!({"schema": "model_k8s_endpoint::1.0.0", "id": "e1"}),
            json!({"schema": "bogus", "id": "b1"}),
            node_record("n1", 10.0, "node-a"),
        ];
        let index = last_models(records, schema::K8S_DEFAULTS);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn highest_timestamp_wins_regardless_of_order() {
        let records = vec![
            node_record("n1", 20.0, "node-late"),
            node_record("n1", 10.0, "node-early"),
        ];
        let index = last_models(records, schema::K8S_DEFAULTS);
        assert_eq!(index.len(), 1);
        let clusters = index_models(index).unwrap();
        let node = clusters["clus-1"].nodes().values().next().unwrap();
        assert_eq!(node.metadata.name.as_deref(), Some("node-late"));
    }

    #[test]
    fn equal_timestamps_keep_the_later_record() {
        let records = vec![
            node_record("n1", 10.0, "node-first"),
            node_record("n1", 10.0, "node-second"),
        ];
        let clusters = index_models(last_models(records, schema::K8S_DEFAULTS)).unwrap();
        let node = clusters["clus-1"].nodes().values().next().unwrap();
        assert_eq!(node.metadata.name.as_deref(), Some("node-second"));
    }

    #[test]
    fn horizon_tracks_max_time() {
        let records = vec![node_record("n1", 1_700_000_000.0, "a"), node_record("n2", 5.0, "b")];
        let index = last_models(records, schema::K8S_DEFAULTS);
        assert_eq!(index.horizon().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn cluster_record_contributes_name_and_namespaces() {
        let records = vec![json!({
            "schema": schema::CLUSTER,
            "id": "clus-1",
            "time": 1.0,
            "name": "prod-east",
            "namespaces": ["default", "kube-system"]
        })];
        let clusters = index_models(last_models(records, schema::K8S_DEFAULTS)).unwrap();
        let index = &clusters["clus-1"];
        assert_eq!(index.display_name(), Some("prod-east"));
        assert_eq!(index.namespaces().len(), 2);
    }

    #[test]
    fn k8s_status_replaces_platform_status() {
        let records = vec![json!({
            "schema": schema::POD,
            "id": "p1",
            "time": 1.0,
            "cluster_uid": "clus-1",
            "kind": "Pod",
            "status": "active",
            "k8s_status": {"phase": "Running"},
            "metadata": {"name": "web-0", "namespace": "default", "uid": "p1"},
            "spec": {"containers": [{"name": "web"}], "nodeName": "node-a"}
        })];
        let clusters = index_models(last_models(records, schema::K8S_DEFAULTS)).unwrap();
        let pod = clusters["clus-1"].pods().values().next().unwrap();
        assert_eq!(pod.status.as_ref().and_then(|s| s.phase.as_deref()), Some("Running"));
    }

    #[test]
    fn records_without_cluster_uid_group_under_unknown() {
        let records = vec![json!({
            "schema": schema::SERVICE,
            "id": "s1",
            "kind": "Service",
            "metadata": {"name": "orphan", "namespace": "default", "uid": "s1"}
        })];
        let clusters = index_models(last_models(records, schema::K8S_DEFAULTS)).unwrap();
        assert!(clusters.contains_key("unknown"));
    }
}
