// Client creation with custom user-agent support for kube 2.x
use crate::error::Result as KmResult;
use hyper::http::{HeaderName, HeaderValue};
use kube::{Client, Config};
use tracing::warn;

/// Create a new k8s client to interact with k8s cluster api
///
/// # Errors
///
/// Will return `Err` if the kube config can not be inferred or the client can not be built
pub async fn new(custom_user_agent: Option<&str>) -> KmResult<Client> {
    let mut config = Config::infer().await?;

    // identifies metric downloads in api server audit logs
    if let Some(user_agent) = custom_user_agent {
        match HeaderValue::from_str(user_agent) {
            Ok(header_value) => config
                .headers
                .push((HeaderName::from_static("user-agent"), header_value)),
            Err(e) => warn!("Ignoring invalid user agent {:?}: {}", user_agent, e),
        }
    }

    let client = Client::try_from(config)?;

    Ok(client)
}
