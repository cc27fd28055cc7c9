use std::collections::BTreeMap;

use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use k8s_openapi::api::scheduling::v1::PriorityClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

/// Object kinds the sizing report cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectKind {
    Namespace,
    Node,
    Pod,
    Deployment,
    ReplicaSet,
    DaemonSet,
    Service,
    PriorityClass,
}

impl ObjectKind {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Namespace" => Some(ObjectKind::Namespace),
            "Node" => Some(ObjectKind::Node),
            "Pod" => Some(ObjectKind::Pod),
            "Deployment" => Some(ObjectKind::Deployment),
            "ReplicaSet" => Some(ObjectKind::ReplicaSet),
            "DaemonSet" => Some(ObjectKind::DaemonSet),
            "Service" => Some(ObjectKind::Service),
            "PriorityClass" => Some(ObjectKind::PriorityClass),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Namespace => "Namespace",
            ObjectKind::Node => "Node",
            ObjectKind::Pod => "Pod",
            ObjectKind::Deployment => "Deployment",
            ObjectKind::ReplicaSet => "ReplicaSet",
            ObjectKind::DaemonSet => "DaemonSet",
            ObjectKind::Service => "Service",
            ObjectKind::PriorityClass => "PriorityClass",
        }
    }
}

/// One Kubernetes object of an indexed kind, parsed into its typed form at
/// the JSON boundary.
#[derive(Debug, Clone)]
pub enum RawObject {
    Namespace(Namespace),
    Node(Node),
    Pod(Pod),
    Deployment(Deployment),
    ReplicaSet(ReplicaSet),
    DaemonSet(DaemonSet),
    Service(Service),
    PriorityClass(PriorityClass),
}

/// Borrowed view of an indexed object, for cross-kind lookups by uid.
#[derive(Debug, Clone, Copy)]
pub enum RawObjectRef<'a> {
    Namespace(&'a Namespace),
    Node(&'a Node),
    Pod(&'a Pod),
    Deployment(&'a Deployment),
    ReplicaSet(&'a ReplicaSet),
    DaemonSet(&'a DaemonSet),
    Service(&'a Service),
    PriorityClass(&'a PriorityClass),
}

impl RawObject {
    /// Deserialize a JSON document into the typed object for `kind`.
    pub fn from_value(kind: ObjectKind, value: serde_json::Value) -> Result<Self> {
        let object = match kind {
            ObjectKind::Namespace => RawObject::Namespace(serde_json::from_value(value)?),
            ObjectKind::Node => RawObject::Node(serde_json::from_value(value)?),
            ObjectKind::Pod => RawObject::Pod(serde_json::from_value(value)?),
            ObjectKind::Deployment => RawObject::Deployment(serde_json::from_value(value)?),
            ObjectKind::ReplicaSet => RawObject::ReplicaSet(serde_json::from_value(value)?),
            ObjectKind::DaemonSet => RawObject::DaemonSet(serde_json::from_value(value)?),
            ObjectKind::Service => RawObject::Service(serde_json::from_value(value)?),
            ObjectKind::PriorityClass => RawObject::PriorityClass(serde_json::from_value(value)?),
        };
        Ok(object)
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            RawObject::Namespace(_) => ObjectKind::Namespace,
            RawObject::Node(_) => ObjectKind::Node,
            RawObject::Pod(_) => ObjectKind::Pod,
            RawObject::Deployment(_) => ObjectKind::Deployment,
            RawObject::ReplicaSet(_) => ObjectKind::ReplicaSet,
            RawObject::DaemonSet(_) => ObjectKind::DaemonSet,
            RawObject::Service(_) => ObjectKind::Service,
            RawObject::PriorityClass(_) => ObjectKind::PriorityClass,
        }
    }

    fn metadata(&self) -> &ObjectMeta {
        match self {
            RawObject::Namespace(o) => &o.metadata,
            RawObject::Node(o) => &o.metadata,
            RawObject::Pod(o) => &o.metadata,
            RawObject::Deployment(o) => &o.metadata,
            RawObject::ReplicaSet(o) => &o.metadata,
            RawObject::DaemonSet(o) => &o.metadata,
            RawObject::Service(o) => &o.metadata,
            RawObject::PriorityClass(o) => &o.metadata,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.metadata().uid.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }
}

/// Per-cluster index: one uid-keyed map per object kind plus a flat
/// uid-to-kind map. Inserting a uid evicts any previous observation of that
/// uid, so a uid lives in exactly one kind bucket at a time.
#[derive(Debug, Clone, Default)]
pub struct ClusterIndex {
    display_name: Option<String>,
    kinds: BTreeMap<String, ObjectKind>,
    namespaces: BTreeMap<String, Namespace>,
    nodes: BTreeMap<String, Node>,
    pods: BTreeMap<String, Pod>,
    deployments: BTreeMap<String, Deployment>,
    replica_sets: BTreeMap<String, ReplicaSet>,
    daemon_sets: BTreeMap<String, DaemonSet>,
    services: BTreeMap<String, Service>,
    priority_classes: BTreeMap<String, PriorityClass>,
}

impl ClusterIndex {
    pub fn insert(&mut self, object: RawObject) {
        let Some(uid) = object.uid().map(str::to_owned) else {
            debug!(kind = object.kind().as_str(), "dropping object without uid");
            return;
        };
        self.evict(&uid);
        self.kinds.insert(uid.clone(), object.kind());
        match object {
            RawObject::Namespace(o) => {
                self.namespaces.insert(uid, o);
            }
            RawObject::Node(o) => {
                self.nodes.insert(uid, o);
            }
            RawObject::Pod(o) => {
                self.pods.insert(uid, o);
            }
            RawObject::Deployment(o) => {
                self.deployments.insert(uid, o);
            }
            RawObject::ReplicaSet(o) => {
                self.replica_sets.insert(uid, o);
            }
            RawObject::DaemonSet(o) => {
                self.daemon_sets.insert(uid, o);
            }
            RawObject::Service(o) => {
                self.services.insert(uid, o);
            }
            RawObject::PriorityClass(o) => {
                self.priority_classes.insert(uid, o);
            }
        }
    }

    /// Record a namespace known only by name (model cluster records embed a
    /// namespace list instead of namespace objects).
    pub fn add_namespace(&mut self, name: &str) {
        let ns = Namespace {
            metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
            ..Default::default()
        };
        self.kinds.insert(name.to_string(), ObjectKind::Namespace);
        self.namespaces.insert(name.to_string(), ns);
    }

    fn evict(&mut self, uid: &str) {
        let Some(kind) = self.kinds.remove(uid) else { return };
        match kind {
            ObjectKind::Namespace => {
                self.namespaces.remove(uid);
            }
            ObjectKind::Node => {
                self.nodes.remove(uid);
            }
            ObjectKind::Pod => {
                self.pods.remove(uid);
            }
            ObjectKind::Deployment => {
                self.deployments.remove(uid);
            }
            ObjectKind::ReplicaSet => {
                self.replica_sets.remove(uid);
            }
            ObjectKind::DaemonSet => {
                self.daemon_sets.remove(uid);
            }
            ObjectKind::Service => {
                self.services.remove(uid);
            }
            ObjectKind::PriorityClass => {
                self.priority_classes.remove(uid);
            }
        }
    }

    /// Cross-kind lookup by uid.
    pub fn get(&self, uid: &str) -> Option<RawObjectRef<'_>> {
        match self.kinds.get(uid)? {
            ObjectKind::Namespace => self.namespaces.get(uid).map(RawObjectRef::Namespace),
            ObjectKind::Node => self.nodes.get(uid).map(RawObjectRef::Node),
            ObjectKind::Pod => self.pods.get(uid).map(RawObjectRef::Pod),
            ObjectKind::Deployment => self.deployments.get(uid).map(RawObjectRef::Deployment),
            ObjectKind::ReplicaSet => self.replica_sets.get(uid).map(RawObjectRef::ReplicaSet),
            ObjectKind::DaemonSet => self.daemon_sets.get(uid).map(RawObjectRef::DaemonSet),
            ObjectKind::Service => self.services.get(uid).map(RawObjectRef::Service),
            ObjectKind::PriorityClass => {
                self.priority_classes.get(uid).map(RawObjectRef::PriorityClass)
            }
        }
    }

    pub fn kind_of(&self, uid: &str) -> Option<ObjectKind> {
        self.kinds.get(uid).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn set_display_name(&mut self, name: &str) {
        self.display_name = Some(name.to_string());
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn namespaces(&self) -> &BTreeMap<String, Namespace> {
        &self.namespaces
    }

    pub fn nodes(&self) -> &BTreeMap<String, Node> {
        &self.nodes
    }

    pub fn pods(&self) -> &BTreeMap<String, Pod> {
        &self.pods
    }

    pub fn deployments(&self) -> &BTreeMap<String, Deployment> {
        &self.deployments
    }

    pub fn replica_sets(&self) -> &BTreeMap<String, ReplicaSet> {
        &self.replica_sets
    }

    pub fn daemon_sets(&self) -> &BTreeMap<String, DaemonSet> {
        &self.daemon_sets
    }

    pub fn services(&self) -> &BTreeMap<String, Service> {
        &self.services
    }

    pub fn priority_classes(&self) -> &BTreeMap<String, PriorityClass> {
        &self.priority_classes
    }
}

/// Index a pre-grouped collection: each cluster name maps to a flat array
/// of Kubernetes objects already scoped to that cluster, each declaring its
/// own `kind`. Objects of unindexed kinds are discarded; objects that fail
/// typed deserialization abort with context (malformed input is fatal).
pub fn index_grouped(
    grouped: BTreeMap<String, Vec<serde_json::Value>>,
) -> Result<BTreeMap<String, ClusterIndex>> {
    let mut clusters = BTreeMap::new();
    for (cluster, objects) in grouped {
        let index: &mut ClusterIndex = clusters.entry(cluster.clone()).or_default();
        for value in objects {
            let Some(kind) = value.get("kind").and_then(serde_json::Value::as_str) else {
                debug!(cluster = %cluster, "dropping object without kind");
                continue;
            };
            let Some(kind) = ObjectKind::from_kind(kind) else {
                debug!(cluster = %cluster, kind, "dropping object of unindexed kind");
                continue;
            };
            let object = RawObject::from_value(kind, value)
                .with_context(|| format!("malformed {} object in cluster {cluster}", kind.as_str()))?;
            index.insert(object);
        }
    }
    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_value(name: &str, uid: &str) -> serde_json::Value {
        json!({
            "kind": "Node",
            "metadata": {"name": name, "uid": uid}
        })
    }

    #[test]
    fn insert_routes_by_kind() {
        let mut index = ClusterIndex::default();
        let node: Node = serde_json::from_value(node_value("n1", "uid-1")).unwrap();
        index.insert(RawObject::Node(node));

        assert_eq!(index.nodes().len(), 1);
        assert_eq!(index.kind_of("uid-1"), Some(ObjectKind::Node));
        assert!(matches!(index.get("uid-1"), Some(RawObjectRef::Node(_))));
    }

    #[test]
    fn reinserted_uid_lives_in_one_bucket() {
        let mut index = ClusterIndex::default();
        let node: Node = serde_json::from_value(node_value("n1", "uid-1")).unwrap();
        index.insert(RawObject::Node(node));

        // same uid re-observed as a pod: the node entry must go away
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "p1", "uid": "uid-1"},
            "spec": {"containers": [{"name": "app"}]}
        }))
        .unwrap();
        index.insert(RawObject::Pod(pod));

        assert!(index.nodes().is_empty());
        assert_eq!(index.pods().len(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn object_without_uid_is_dropped() {
        let mut index = ClusterIndex::default();
        let node: Node = serde_json::from_value(json!({"metadata": {"name": "n1"}})).unwrap();
        index.insert(RawObject::Node(node));
        assert!(index.is_empty());
    }

    #[test]
    fn grouped_indexing_buckets_by_declared_kind() {
        let mut grouped = BTreeMap::new();
        grouped.insert(
            "prod".to_string(),
            vec![
                node_value("n1", "uid-n1"),
                json!({
                    "kind": "Service",
                    "metadata": {"name": "api", "namespace": "default", "uid": "uid-s1"}
                }),
                json!({"kind": "ConfigMap", "metadata": {"name": "cm", "uid": "uid-cm"}}),
            ],
        );
        let clusters = index_grouped(grouped).unwrap();
        let index = &clusters["prod"];
        assert_eq!(index.nodes().len(), 1);
        assert_eq!(index.services().len(), 1);
        // unindexed kinds are discarded, not errors
        assert_eq!(index.len(), 2);
    }
}
