// ABOUTME: Role of this node in the database topology.
// ABOUTME: Selects between the general upgrade path and the secondary path.

use std::fmt;

/// Where this node sits in the database topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceType {
    /// No HA controller is enabled on this node.
    SingleNode,
    /// Write primary of a replicated set.
    Primary,
    /// Streaming replica; upgraded to an empty cluster and re-seeded afterwards.
    Secondary,
}

impl InstanceType {
    /// Whether the node's data is migrated in place with `pg_upgrade`.
    pub fn migrates_in_place(&self) -> bool {
        !matches!(self, InstanceType::Secondary)
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceType::SingleNode => "single_node",
            InstanceType::Primary => "primary",
            InstanceType::Secondary => "secondary",
        };
        f.write_str(name)
    }
}
