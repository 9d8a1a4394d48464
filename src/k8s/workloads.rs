//! Builds metric selectors for named cluster resources.
use crate::error::{Error, Result};
use crate::k8s::metrics::{ResourceKind, ResourceSelector};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Node, Pod, ReplicationController};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::debug;

async fn uid_of<K>(api: Api<K>, name: &str) -> Result<String>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let object = api.get(name).await?;
    object
        .meta()
        .uid
        .clone()
        .ok_or_else(|| Error::Custom(format!("{name} has no uid")))
}

/// Looks up `name` and returns a selector carrying its uid (and, for
/// deployments, its pod label selector).
///
/// # Errors
///
/// Will return `Err` if the resource can not be retrieved from k8s cluster api
pub async fn selector_for(
    client: Client,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
) -> Result<ResourceSelector> {
    let uid = match kind {
        ResourceKind::Pod => uid_of(Api::<Pod>::namespaced(client, namespace), name).await?,
        ResourceKind::Node => uid_of(Api::<Node>::all(client), name).await?,
        ResourceKind::Deployment => {
            let deployment = Api::<Deployment>::namespaced(client, namespace).get(name).await?;
            let labels: BTreeMap<String, String> = deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.selector.match_labels.clone())
                .unwrap_or_default();
            let uid = deployment.metadata.uid.clone().unwrap_or_default();
            debug!("Deployment {}/{} selects pods by {:?}", namespace, name, labels);
            return Ok(ResourceSelector::new(kind, namespace, name, &uid).with_selector(labels));
        }
        ResourceKind::ReplicaSet => {
            uid_of(Api::<ReplicaSet>::namespaced(client, namespace), name).await?
        }
        ResourceKind::ReplicationController => {
            uid_of(Api::<ReplicationController>::namespaced(client, namespace), name).await?
        }
        ResourceKind::DaemonSet => {
            uid_of(Api::<DaemonSet>::namespaced(client, namespace), name).await?
        }
        ResourceKind::StatefulSet => {
            uid_of(Api::<StatefulSet>::namespaced(client, namespace), name).await?
        }
        ResourceKind::Job => uid_of(Api::<Job>::namespaced(client, namespace), name).await?,
    };

    Ok(ResourceSelector::new(kind, namespace, name, &uid))
}

/// Selectors for every pod in a snapshot.
#[must_use]
pub fn pod_selectors(pods: &[Pod]) -> Vec<ResourceSelector> {
    pods.iter()
        .filter_map(|pod| {
            let name = pod.metadata.name.as_deref()?;
            let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
            let uid = pod.metadata.uid.as_deref().unwrap_or(name);
            Some(ResourceSelector::new(ResourceKind::Pod, namespace, name, uid))
        })
        .collect()
}
