//! Write-once, multi-reader result handles.
//!
//! A download hands back promises right away and fills them from background
//! tasks. Each promise has exactly one `PromiseResolver`; consuming it is the
//! only way to write, so a promise can never be resolved twice.
use super::errors::MetricError;
use super::types::Metric;
use futures::future::try_join_all;
use std::ops::Index;
use tokio::sync::watch;

pub type MetricResult = Result<Metric, MetricError>;

/// Read side of a single metric result. Clones observe the same value.
#[derive(Debug, Clone)]
pub struct MetricPromise {
    rx: watch::Receiver<Option<MetricResult>>,
}

/// Write side of a `MetricPromise`.
///
/// Dropping it unresolved wakes readers with `MetricError::Abandoned`.
#[derive(Debug)]
pub struct PromiseResolver {
    tx: watch::Sender<Option<MetricResult>>,
}

impl MetricPromise {
    #[must_use]
    pub fn pending() -> (Self, PromiseResolver) {
        let (tx, rx) = watch::channel(None);
        (Self { rx }, PromiseResolver { tx })
    }

    #[must_use]
    pub fn resolved(result: MetricResult) -> Self {
        let (promise, resolver) = Self::pending();
        resolver.resolve(result);
        promise
    }

    /// Waits for the result. There is no timeout, callers that need one wrap
    /// this future themselves.
    ///
    /// # Errors
    ///
    /// Returns the error the promise was resolved with.
    pub async fn get(&self) -> MetricResult {
        let mut rx = self.rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone().unwrap_or(Err(MetricError::Abandoned)),
            Err(_) => Err(MetricError::Abandoned),
        }
    }

    /// The result if already resolved.
    #[must_use]
    pub fn try_get(&self) -> Option<MetricResult> {
        self.rx.borrow().clone()
    }
}

impl PromiseResolver {
    pub fn resolve(self, result: MetricResult) {
        self.tx.send_replace(Some(result));
    }
}

/// Ordered batch of promises; position `i` answers request `i`.
#[derive(Debug, Clone, Default)]
pub struct MetricPromises(Vec<MetricPromise>);

impl MetricPromises {
    #[must_use]
    pub fn pending(len: usize) -> (Self, Vec<PromiseResolver>) {
        let (promises, resolvers): (Vec<_>, Vec<_>) =
            (0..len).map(|_| MetricPromise::pending()).unzip();
        (Self(promises), resolvers)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricPromise> {
        self.0.iter()
    }

    pub fn push(&mut self, promise: MetricPromise) {
        self.0.push(promise);
    }

    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Waits for every promise, in order.
    ///
    /// # Errors
    ///
    /// Returns the first error any promise resolved with.
    pub async fn get_metrics(&self) -> Result<Vec<Metric>, MetricError> {
        try_join_all(self.0.iter().map(MetricPromise::get)).await
    }

    /// Waits for every promise, keeping per-position outcomes.
    pub async fn get_results(&self) -> Vec<MetricResult> {
        futures::future::join_all(self.0.iter().map(MetricPromise::get)).await
    }
}

impl Index<usize> for MetricPromises {
    type Output = MetricPromise;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl FromIterator<MetricPromise> for MetricPromises {
    fn from_iter<T: IntoIterator<Item = MetricPromise>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for MetricPromises {
    type Item = MetricPromise;
    type IntoIter = std::vec::IntoIter<MetricPromise>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
