//! # Void Proxy - identity-stable access to a host scene graph
//!
//! Wraps a [`void_host::Host`] in handles that are cheap to hold and safe to
//! keep around:
//!
//! ```text
//! Session ──► Registry ──► Node ──► Plug ──► codec ──► Host
//!    │                       │
//!    └──► Modifier ──────────┴──► NativeModifier ──► UndoBridge
//! ```
//!
//! ## Key Concepts
//!
//! - **Node**: one wrapper per host node, notified when the node leaves
//!   the graph or is destroyed
//! - **Plug**: a typed, unit-aware channel on a node
//! - **Modifier**: a batch of graph edits applied atomically, with
//!   readable history and host undo integration
//! - **UndoBridge**: the command that makes committed batches undoable

pub mod anim;
pub mod codec;
pub mod config;
pub mod dag;
pub mod error;
pub mod modifier;
pub mod node;
pub mod plug;
mod registry;
pub mod session;
pub mod set;
pub mod undo;
pub mod units;
pub mod value;

pub use anim::AnimCurve;
pub use config::{ConfigError, ProxyConfig};
pub use dag::DagNode;
pub use error::{Error, Result, TransactionError};
pub use modifier::{HistoryEntry, Modifier, ModifierOptions, TransactionState};
pub use node::{Node, NodeKind};
pub use plug::Plug;
pub use registry::Registry;
pub use session::{Session, Stats};
pub use set::ObjectSet;
pub use undo::{UndoBridge, UndoFn};
pub use units::{AngleUnit, DistanceUnit, TimeUnit, Unit};
pub use value::{RotateOrder, Value};

/// Prelude for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::modifier::{Modifier, ModifierOptions};
    pub use crate::node::Node;
    pub use crate::plug::Plug;
    pub use crate::session::Session;
    pub use crate::units::Unit;
    pub use crate::value::Value;
}
