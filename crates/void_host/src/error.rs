//! Errors reported across the host boundary

use thiserror::Error;

use crate::handle::NodeHandle;

/// Errors a host may report for any operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("invalid node handle: {0:?}")]
    InvalidHandle(NodeHandle),

    #[error("no node matches '{0}'")]
    NodeNotFound(String),

    #[error("'{0}' is not a valid node type")]
    UnknownNodeType(String),

    #[error("no attribute named '{0}'")]
    AttributeNotFound(String),

    #[error("attribute '{0}' already exists")]
    DuplicateAttribute(String),

    #[error("invalid plug: {0}")]
    InvalidPlug(String),

    #[error("value does not fit {expected} plug: {found}")]
    KindMismatch { expected: String, found: String },

    #[error("plug '{0}' is locked")]
    Locked(String),

    #[error("plug '{0}' has an incoming connection")]
    Connected(String),

    #[error("'{0}' is already connected")]
    AlreadyConnected(String),

    #[error("'{src}' is not connected to '{dst}'")]
    NotConnected { src: String, dst: String },

    #[error("invalid name: '{0}'")]
    InvalidName(String),

    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("command '{0}' is not registered")]
    UnknownCommand(String),

    #[error("failed to register command '{0}': {1}")]
    CommandRegistration(String, String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("nothing to {0}")]
    EmptyHistory(&'static str),

    #[error("host refused the operation: {0}")]
    Injected(String),
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;
