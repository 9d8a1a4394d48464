pub mod client;
pub mod metrics;
pub mod pods;
pub mod utils;
pub mod workloads;

/// Default user agent for `kubemetrics` - automatically uses the package version
///
/// Backend requests send `metrics::config::user_agent()`, which honors the
/// `KUBEMETRICS_USER_AGENT` environment variable before falling back to this.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
