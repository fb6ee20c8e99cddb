// ABOUTME: Services managed by the supervisor and the maintenance-mode keep list.
// ABOUTME: Maintenance mode stops every managed service not in keep_running.

use crate::types::ServiceName;
use nonempty::NonEmpty;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Every service the supervisor manages on this node.
    #[serde(default = "default_managed")]
    pub managed: NonEmpty<ServiceName>,

    /// Services needed to serve the deploy page; never stopped.
    #[serde(default = "default_keep_running")]
    pub keep_running: Vec<ServiceName>,
}

fn names(list: &[&'static str]) -> Vec<ServiceName> {
    list.iter().copied().map(ServiceName::from_static).collect()
}

fn default_managed() -> NonEmpty<ServiceName> {
    NonEmpty::from((
        ServiceName::from_static("postgresql"),
        names(&[
            "nginx",
            "puma",
            "redis",
            "sidekiq",
            "workhorse",
            "node-exporter",
        ]),
    ))
}

fn default_keep_running() -> Vec<ServiceName> {
    names(&["nginx", "puma", "redis"])
}

impl Default for ServicesConfig {
    fn default() -> Self {
        ServicesConfig {
            managed: default_managed(),
            keep_running: default_keep_running(),
        }
    }
}
