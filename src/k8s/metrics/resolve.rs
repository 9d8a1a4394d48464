//! Maps logical selectors onto the native resources a backend can serve.
//!
//! Pods and nodes resolve to themselves. Workload kinds are expanded into the
//! pods they control, looked up in a snapshot of already listed pods.
use super::errors::MetricError;
use super::types::{Label, ResourceKind, ResourceSelector};
use crate::k8s::pods::select;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;
use tracing::debug;

/// Pods already listed by the caller.
///
/// `pods: None` means the snapshot was never populated, which is different
/// from an empty namespace.
#[derive(Debug, Clone, Default)]
pub struct CachedResources {
    pub pods: Option<Vec<Pod>>,
}

impl CachedResources {
    #[must_use]
    pub const fn with_pods(pods: Vec<Pod>) -> Self {
        Self { pods: Some(pods) }
    }
}

/// How a resource kind is turned into native resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// The backend knows the kind directly
    NativeLookup,
    /// Pods whose labels contain the selector's label set
    LabelMatch { target: ResourceKind },
    /// Pods whose controlling owner reference carries the selector's uid
    OwnerRef { target: ResourceKind },
}

/// Immutable kind to derivation table handed to a client at construction.
#[derive(Debug, Clone)]
pub struct DerivationTable {
    rules: HashMap<ResourceKind, Derivation>,
}

impl Default for DerivationTable {
    fn default() -> Self {
        let rules = [
            (ResourceKind::Pod, Derivation::NativeLookup),
            (ResourceKind::Node, Derivation::NativeLookup),
            // deployments own replica sets, not pods, so match on labels
            (
                ResourceKind::Deployment,
                Derivation::LabelMatch {
                    target: ResourceKind::Pod,
                },
            ),
            (
                ResourceKind::ReplicaSet,
                Derivation::OwnerRef {
                    target: ResourceKind::Pod,
                },
            ),
            (
                ResourceKind::ReplicationController,
                Derivation::OwnerRef {
                    target: ResourceKind::Pod,
                },
            ),
            (
                ResourceKind::DaemonSet,
                Derivation::OwnerRef {
                    target: ResourceKind::Pod,
                },
            ),
            (
                ResourceKind::StatefulSet,
                Derivation::OwnerRef {
                    target: ResourceKind::Pod,
                },
            ),
            (
                ResourceKind::Job,
                Derivation::OwnerRef {
                    target: ResourceKind::Pod,
                },
            ),
        ];

        Self {
            rules: rules.into_iter().collect(),
        }
    }
}

impl DerivationTable {
    #[must_use]
    pub fn with_rule(mut self, kind: ResourceKind, derivation: Derivation) -> Self {
        self.rules.insert(kind, derivation);
        self
    }

    /// Kinds without an entry are treated as native.
    #[must_use]
    pub fn lookup(&self, kind: ResourceKind) -> Derivation {
        self.rules
            .get(&kind)
            .copied()
            .unwrap_or(Derivation::NativeLookup)
    }
}

/// A selector expressed in native resources.
///
/// `resources[i]` and `label.get(target)[i]` describe the same resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelector {
    pub target: ResourceKind,
    pub namespace: String,
    pub resources: Vec<String>,
    pub label: Label,
}

/// Resolves `selector` into the native resources it stands for.
///
/// # Errors
///
/// Returns `MetricError::UnsupportedDerivation` when the kind derives from
/// anything but pods, and `MetricError::Resolution` when pods are needed but
/// `cache` was never populated.
pub fn resolve(
    selector: &ResourceSelector,
    cache: &CachedResources,
    derivations: &DerivationTable,
) -> Result<ResolvedSelector, MetricError> {
    let kind = selector.kind();

    let (target, pods) = match derivations.lookup(kind) {
        Derivation::NativeLookup => return Ok(native(kind, selector)),
        Derivation::LabelMatch { target } => {
            let pods = cached_pods(selector, cache, target)?;
            let wanted = selector.selector.clone().unwrap_or_default();
            if wanted.is_empty() {
                debug!(
                    "{} {}/{} has no label selector, no pods match",
                    kind, selector.namespace, selector.resource_name
                );
            }
            let matched: Vec<&Pod> = pods
                .filter(|pod| {
                    !wanted.is_empty()
                        && pod
                            .metadata
                            .labels
                            .as_ref()
                            .is_some_and(|labels| select(&wanted, labels))
                })
                .collect();
            (target, matched)
        }
        Derivation::OwnerRef { target } => {
            let pods = cached_pods(selector, cache, target)?;
            let matched: Vec<&Pod> = pods
                .filter(|pod| is_controlled_by(pod, &selector.uid))
                .collect();
            (target, matched)
        }
    };

    let mut resolved = ResolvedSelector {
        target,
        namespace: selector.namespace.clone(),
        resources: Vec::with_capacity(pods.len()),
        label: Label::new(),
    };
    for pod in pods {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let uid = pod.metadata.uid.as_deref().unwrap_or(&name).to_string();
        resolved.label.push(target, &uid);
        resolved.resources.push(name);
    }

    debug!(
        "Resolved {} {}/{} to {} {}(s)",
        kind,
        selector.namespace,
        selector.resource_name,
        resolved.resources.len(),
        target
    );
    Ok(resolved)
}

fn native(kind: ResourceKind, selector: &ResourceSelector) -> ResolvedSelector {
    let uid = if selector.uid.is_empty() {
        &selector.resource_name
    } else {
        &selector.uid
    };

    ResolvedSelector {
        target: kind,
        namespace: selector.namespace.clone(),
        resources: vec![selector.resource_name.clone()],
        label: Label::single(kind, uid),
    }
}

/// Pods of the selector's namespace, once the derivation target is known to be supported.
fn cached_pods<'a>(
    selector: &'a ResourceSelector,
    cache: &'a CachedResources,
    target: ResourceKind,
) -> Result<impl Iterator<Item = &'a Pod>, MetricError> {
    if target != ResourceKind::Pod {
        return Err(MetricError::UnsupportedDerivation {
            kind: selector.kind(),
            target,
        });
    }

    let pods = cache.pods.as_ref().ok_or_else(|| {
        MetricError::Resolution(format!(
            "pod cache is not populated, cannot resolve {} {}/{}",
            selector.kind(),
            selector.namespace,
            selector.resource_name
        ))
    })?;

    Ok(pods
        .iter()
        .filter(|pod| pod.metadata.namespace.as_deref() == Some(selector.namespace.as_str())))
}

fn is_controlled_by(pod: &Pod, uid: &str) -> bool {
    pod.metadata.owner_references.as_ref().is_some_and(|owners| {
        owners
            .iter()
            .any(|owner| owner.controller == Some(true) && owner.uid == uid)
    })
}
