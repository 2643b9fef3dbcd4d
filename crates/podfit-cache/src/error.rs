//! Error types for the cache crate.

use thiserror::Error;

/// Errors that can occur while updating node state.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The pod is not accounted on the node it was removed from.
    #[error("Pod not found: {pod} on node {node:?}")]
    PodNotFound {
        /// Key of the pod that was looked up.
        pod: String,
        /// Name of the node, empty when the node object is gone.
        node: String,
    },

    /// No state is held for the named node.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The node object carries no name.
    #[error("Node has no name")]
    UnnamedNode,

    /// The pod object carries no name, so no key can be derived.
    #[error("Invalid pod key: {0}")]
    InvalidPodKey(String),

    /// The pod has not been bound to a node.
    #[error("Pod not assigned to a node: {0}")]
    PodNotAssigned(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Check if this error reports a missing pod or node.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PodNotFound { .. } | Self::NodeNotFound(_))
    }
}

/// A specialized Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
