//! # Void Host - the scene graph below the proxy
//!
//! Defines the boundary every scene proxy talks through:
//! - [`Host`]: node lookup, attributes, plugs, connections, notifications
//!   and the undo queue
//! - [`NativeModifier`]: a deferred buffer of graph edits
//! - [`NativeCommand`]: an undoable command run by the host
//!
//! and ships [`memory::MemoryHost`], a complete in-memory implementation
//! used for testing and prototyping.

pub mod attribute;
pub mod error;
pub mod handle;
pub mod host;
pub mod memory;

pub use attribute::{
    AttrId, AttrInfo, AttrKind, AttrSpec, DataType, Dimension, DisconnectBehavior, NumericType, PlugHandle, RawValue,
    IDENTITY_MATRIX,
};
pub use error::{HostError, HostResult};
pub use handle::{HandleAllocator, HandleMap, NodeHandle};
pub use host::{CallbackId, Capability, CommandFactory, Host, NativeCommand, NativeModifier, NodeCallback};
pub use memory::MemoryHost;

/// Prelude for common imports
pub mod prelude {
    pub use crate::attribute::{AttrKind, AttrSpec, PlugHandle, RawValue};
    pub use crate::error::{HostError, HostResult};
    pub use crate::handle::NodeHandle;
    pub use crate::host::{Capability, Host, NativeCommand, NativeModifier};
    pub use crate::memory::MemoryHost;
}
