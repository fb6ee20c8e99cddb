// ABOUTME: Validated domain types shared across the upgrade workflow.
// ABOUTME: Versions, service names, and the node's role in a replicated cluster.

mod instance_type;
mod service_name;
mod version;

pub use instance_type::InstanceType;
pub use service_name::{ServiceName, ServiceNameError};
pub use version::{ParseVersionError, Version};
