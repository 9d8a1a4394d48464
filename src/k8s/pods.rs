use crate::error::Result;
use crate::k8s::metrics::CachedResources;
use crate::k8s::utils::format_label_selector;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::api::ObjectList;
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::debug;

// return true if all of selector pairs can be found in pod labels
pub(crate) fn select<K, V>(selector: &BTreeMap<K, V>, pod_labels: &BTreeMap<K, V>) -> bool
where
    K: Ord + Eq,
    V: Eq,
{
    selector
        .iter()
        .all(|(key, value)| pod_labels.get(key) == Some(value))
}

/// Snapshot the pods of `namespace` for derived metric lookups.
///
/// # Errors
///
/// Will return `Err` if data can not be retrieved from k8s cluster api
pub async fn cache_pods(
    client: Client,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<CachedResources> {
    let lp = if labels.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(&format_label_selector(labels))
    };

    let pod_list: ObjectList<Pod> = Api::namespaced(client, namespace).list(&lp).await?;
    debug!("Cached {} pods from {}", pod_list.items.len(), namespace);

    Ok(CachedResources::with_pods(pod_list.items))
}
