use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use k8s_openapi::api::scheduling::v1::PriorityClass;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use tracing::{info, warn};

use crate::index::{ClusterIndex, RawObject};

#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Explicit kubeconfig path; the client default when unset.
    pub kubeconfig: Option<PathBuf>,
    /// Single context to collect from; all contexts when unset.
    pub context: Option<String>,
}

/// Build one `ClusterIndex` per kubectl context by listing every resource
/// kind the sizing report consumes. A kind that fails to list is skipped
/// with a warning; a context that yields nothing is dropped.
pub async fn collect_clusters(options: &CollectOptions) -> Result<BTreeMap<String, ClusterIndex>> {
    let kubeconfig = match &options.kubeconfig {
        Some(path) => Kubeconfig::read_from(path)
            .with_context(|| format!("reading kubeconfig {}", path.display()))?,
        None => Kubeconfig::read().context("reading default kubeconfig")?,
    };
    let contexts: Vec<String> = match &options.context {
        Some(context) => vec![context.clone()],
        None => kubeconfig.contexts.iter().map(|c| c.name.clone()).collect(),
    };

    let mut clusters = BTreeMap::new();
    for context in contexts {
        info!(context, "collecting cluster inventory");
        let config = Config::from_custom_kubeconfig(
            kubeconfig.clone(),
            &KubeConfigOptions { context: Some(context.clone()), ..Default::default() },
        )
        .await
        .with_context(|| format!("building client config for context {context}"))?;
        let client = Client::try_from(config)
            .with_context(|| format!("building client for context {context}"))?;

        let index = collect_cluster(&client, &context).await;
        if index.is_empty() {
            warn!(context, "no resources collected, skipping context");
            continue;
        }
        clusters.insert(context, index);
    }
    Ok(clusters)
}

async fn collect_cluster(client: &Client, context: &str) -> ClusterIndex {
    let mut index = ClusterIndex::default();
    list_into::<Namespace>(client, context, "namespaces", RawObject::Namespace, &mut index).await;
    list_into::<Node>(client, context, "nodes", RawObject::Node, &mut index).await;
    list_into::<Pod>(client, context, "pods", RawObject::Pod, &mut index).await;
    list_into::<Deployment>(client, context, "deployments", RawObject::Deployment, &mut index)
        .await;
    list_into::<ReplicaSet>(client, context, "replicasets", RawObject::ReplicaSet, &mut index)
        .await;
    list_into::<DaemonSet>(client, context, "daemonsets", RawObject::DaemonSet, &mut index).await;
    list_into::<Service>(client, context, "services", RawObject::Service, &mut index).await;
    list_into::<PriorityClass>(
        client,
        context,
        "priorityclasses",
        RawObject::PriorityClass,
        &mut index,
    )
    .await;
    index
}

async fn list_into<K>(
    client: &Client,
    context: &str,
    what: &str,
    wrap: fn(K) -> RawObject,
    index: &mut ClusterIndex,
) where
    K: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
    <K as kube::Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::all(client.clone());
    match api.list(&ListParams::default()).await {
        Ok(list) => {
            for item in list.items {
                index.insert(wrap(item));
            }
        }
        Err(err) => warn!(context, what, %err, "failed to list resources, skipping"),
    }
}
