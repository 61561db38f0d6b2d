//! Error taxonomy of the proxy

use std::fmt;

use thiserror::Error;
use void_host::HostError;

use crate::config::ConfigError;
use crate::modifier::{HistoryEntry, TransactionState};

/// Errors surfaced to client code
#[derive(Debug, Error)]
pub enum Error {
    /// The node or attribute is gone
    #[error("existence error: {0}")]
    Existence(String),

    /// Value or attribute kind mismatch while marshalling
    #[error("type error: {0}")]
    Type(String),

    /// Write to a locked plug, or to a connected one without force
    #[error("locked: {0}")]
    Locked(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The undo command could not be installed; undo closures will never run
    #[error("undo integration unavailable ({command}): {reason}")]
    UndoUnavailable { command: String, reason: String },

    /// A modifier that already committed or failed was used again
    #[error("modifier is {0:?} and accepts no further edits")]
    Finished(TransactionState),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{context}: {source}")]
    Host {
        context: String,
        #[source]
        source: HostError,
    },
}

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map a host failure onto the taxonomy, naming what it concerned
    pub fn from_host(context: impl Into<String>, error: HostError) -> Self {
        let context = context.into();
        match error {
            HostError::InvalidHandle(_) | HostError::NodeNotFound(_) | HostError::AttributeNotFound(_) => {
                Error::Existence(format!("{context}: {error}"))
            }
            HostError::UnknownNodeType(_) | HostError::KindMismatch { .. } | HostError::InvalidPlug(_) => {
                Error::Type(format!("{context}: {error}"))
            }
            HostError::Locked(_) | HostError::Connected(_) | HostError::AlreadyConnected(_) => {
                Error::Locked(format!("{context}: {error}"))
            }
            source => Error::Host { context, source },
        }
    }

    pub fn is_existence(&self) -> bool {
        matches!(self, Error::Existence(_))
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Error::Type(_))
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Error::Locked(_))
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Error::Transaction(_))
    }
}

impl From<HostError> for Error {
    fn from(error: HostError) -> Self {
        Error::from_host("host", error)
    }
}

/// A commit that failed part way, with every operation it attempted
#[derive(Debug, Error)]
pub struct TransactionError {
    pub history: Vec<HistoryEntry>,
    /// Whether the applied part was undone before this was raised
    pub rolled_back: bool,
    #[source]
    pub source: Box<Error>,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "An unexpected internal failure occurred ({}), these tasks were attempted:",
            self.source
        )?;
        for entry in &self.history {
            write!(f, "\n- {entry}")?;
        }
        if self.rolled_back {
            write!(f, "\nAll applied tasks were rolled back.")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use void_host::NodeHandle;

    #[test]
    fn test_host_error_mapping() {
        let e = Error::from_host("|A.x", HostError::InvalidHandle(NodeHandle::null()));
        assert!(e.is_existence());
        assert!(e.to_string().contains("|A.x"));

        let e = Error::from_host(
            "|A.x",
            HostError::KindMismatch {
                expected: "angle".into(),
                found: "string".into(),
            },
        );
        assert!(e.is_type());

        let e = Error::from_host("|A.x", HostError::Locked("A.x".into()));
        assert!(e.is_locked());

        let e: Error = HostError::Command("boom".into()).into();
        assert!(matches!(e, Error::Host { .. }));
    }

    #[test]
    fn test_transaction_message_lists_history() {
        let error = TransactionError {
            history: vec![
                HistoryEntry::new("create_node", vec!["\"transform\"".into()]),
                HistoryEntry::new("connect", vec!["|A.x".into(), "|B.y".into()]),
            ],
            rolled_back: true,
            source: Box::new(Error::Type("kind mismatch".into())),
        };
        let message = error.to_string();
        assert!(message.contains("- create_node(\"transform\")"));
        assert!(message.contains("- connect(|A.x, |B.y)"));
        assert!(message.ends_with("rolled back."));
    }
}
