//! Request minimization: selectors hitting the same backend path are merged
//! into one request, with a reverse index back to the original positions.
use super::resolve::ResolvedSelector;
use super::types::{Label, ResourceKind};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

/// A resolved selector bound to the backend route that serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSelector {
    pub path: String,
    pub target: ResourceKind,
    pub resources: Vec<String>,
    pub label: Label,
}

impl ResolvedSelector {
    #[must_use]
    pub fn route(self, path: String) -> NativeSelector {
        NativeSelector {
            path,
            target: self.target,
            resources: self.resources,
            label: self.label,
        }
    }
}

impl NativeSelector {
    /// `(name, uid)` pairs, falling back to the name when no uid is known.
    pub(crate) fn identities(&self) -> impl Iterator<Item = (&str, &str)> {
        let uids = self.label.get(self.target);
        self.resources.iter().enumerate().map(move |(i, name)| {
            let uid = uids.get(i).map_or(name.as_str(), String::as_str);
            (name.as_str(), uid)
        })
    }
}

/// All selectors sharing one path, as a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedSelector {
    pub path: String,
    pub target: ResourceKind,
    /// Unique resource names in first-seen order
    pub resources: Vec<String>,
    /// `label.get(target)[i]` is the uid of `resources[i]`
    pub label: Label,
}

impl CompressedSelector {
    /// Uid of `resources[index]`, or its name when no uid is known.
    #[must_use]
    pub fn uid(&self, index: usize) -> Option<&str> {
        let name = self.resources.get(index)?;
        Some(
            self.label
                .get(self.target)
                .get(index)
                .map_or(name.as_str(), String::as_str),
        )
    }
}

/// Path to the positions of the selectors merged under it.
pub type ReverseMapping = HashMap<String, Vec<usize>>;

/// Merges `selectors` by path. Output is ordered by first appearance of each
/// path; `reverse[path]` lists the input positions in input order.
#[must_use]
pub fn compress(selectors: &[NativeSelector]) -> (Vec<CompressedSelector>, ReverseMapping) {
    let mut order: Vec<&str> = Vec::new();
    let mut pending: HashMap<&str, (ResourceKind, Vec<(&str, &str)>)> = HashMap::new();
    let mut reverse = ReverseMapping::new();

    for (index, selector) in selectors.iter().enumerate() {
        let entry = pending.entry(selector.path.as_str()).or_insert_with(|| {
            order.push(selector.path.as_str());
            (selector.target, Vec::new())
        });
        entry.1.extend(selector.identities());
        reverse.entry(selector.path.clone()).or_default().push(index);
    }

    let compressed: Vec<CompressedSelector> = order
        .into_iter()
        .filter_map(|path| {
            let (target, identities) = pending.remove(path)?;
            let mut label = Label::new();
            let mut resources = Vec::new();
            for (name, uid) in identities.into_iter().unique_by(|(name, _)| *name) {
                resources.push(name.to_string());
                label.push(target, uid);
            }
            Some(CompressedSelector {
                path: path.to_string(),
                target,
                resources,
                label,
            })
        })
        .collect();

    debug!(
        "Compressed {} selectors into {} requests",
        selectors.len(),
        compressed.len()
    );
    (compressed, reverse)
}
