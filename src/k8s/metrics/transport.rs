//! Raw GET access to a metrics backend.
use super::errors::MetricError;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::http::Request;
use tracing::debug;

/// Issues GET requests for backend-relative paths.
#[async_trait]
pub trait RawClient: Send + Sync {
    /// # Errors
    ///
    /// Returns `MetricError::Transport` when the backend is unreachable or
    /// answers with a non-success status.
    async fn get(&self, path: &str) -> core::result::Result<Bytes, MetricError>;
}

/// Backend reachable at a plain URL.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    /// # Errors
    ///
    /// Will return `Err` if the underlying HTTP client cannot be built
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RawClient for RemoteClient {
    async fn get(&self, path: &str) -> core::result::Result<Bytes, MetricError> {
        let url = format!("{}{path}", self.base_url);
        debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetricError::Transport(format!("GET {url} returned {status}")));
        }
        Ok(response.bytes().await?)
    }
}

/// Backend running as a cluster service, reached via the API server proxy.
#[derive(Clone)]
pub struct ServiceProxyClient {
    client: kube::Client,
    namespace: String,
    service: String,
}

impl ServiceProxyClient {
    #[must_use]
    pub fn new(client: kube::Client, namespace: &str, service: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            service: service.to_string(),
        }
    }

    fn proxy_uri(&self, path: &str) -> String {
        format!(
            "/api/v1/namespaces/{}/services/{}/proxy{path}",
            self.namespace, self.service
        )
    }
}

#[async_trait]
impl RawClient for ServiceProxyClient {
    async fn get(&self, path: &str) -> core::result::Result<Bytes, MetricError> {
        let uri = self.proxy_uri(path);
        debug!("GET {} (service proxy)", uri);

        let request = Request::get(uri)
            .body(Vec::new())
            .map_err(|e| MetricError::Transport(e.to_string()))?;
        let text = self.client.request_text(request).await?;
        Ok(Bytes::from(text))
    }
}
