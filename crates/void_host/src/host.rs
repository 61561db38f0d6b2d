//! The host boundary
//!
//! A host owns the scene graph: nodes, attributes, connections, the
//! undo queue and the notification machinery. Everything above this
//! boundary talks to the graph exclusively through [`Host`] and the
//! deferred edit buffer [`NativeModifier`].
//!
//! All methods take `&self`. Hosts are expected to use interior
//! mutability and must not hold internal borrows while invoking
//! callbacks or commands, since those re-enter the host.

use std::rc::Rc;

use crate::attribute::{AttrId, AttrInfo, AttrKind, AttrSpec, RawValue, PlugHandle};
use crate::error::HostResult;
use crate::handle::NodeHandle;

/// Capabilities a node may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Participates in the transform hierarchy
    Dag,
    Transform,
    Shape,
    /// Holds a membership list of other nodes
    Set,
    /// Holds time/value keys and evaluates them
    AnimCurve,
}

/// Token identifying a registered notification
pub type CallbackId = u64;

/// Notification invoked with the node it concerns
pub type NodeCallback = Rc<dyn Fn(NodeHandle)>;

/// Produces a fresh command instance each time the host executes one
pub type CommandFactory = Box<dyn Fn() -> Box<dyn NativeCommand>>;

/// A command the host can execute and later undo or redo
pub trait NativeCommand {
    fn do_it(&mut self) -> HostResult<()>;

    fn undo_it(&mut self) -> HostResult<()>;

    fn redo_it(&mut self) -> HostResult<()>;

    /// Whether the host should keep this command on its undo queue
    fn is_undoable(&self) -> bool {
        true
    }
}

/// Buffered graph edits, applied together by [`NativeModifier::do_it`].
///
/// Queueing an operation validates only what can be known up front.
/// `do_it` applies every operation not yet applied, in order, and stops
/// at the first failure leaving earlier ones applied. Calling it again
/// after queueing more operations applies only the new ones.
/// `undo_it` reverts every applied operation in reverse order.
pub trait NativeModifier {
    /// Queue creation of a node. The handle is usable immediately but
    /// the node only enters the graph once applied.
    fn create_node(&mut self, type_name: &str, parent: Option<NodeHandle>) -> HostResult<NodeHandle>;

    fn delete_node(&mut self, node: NodeHandle) -> HostResult<()>;

    fn rename_node(&mut self, node: NodeHandle, name: &str) -> HostResult<()>;

    /// Move a DAG node under `parent`, or to the world when `None`
    fn reparent_node(&mut self, node: NodeHandle, parent: Option<NodeHandle>) -> HostResult<()>;

    fn add_attribute(&mut self, node: NodeHandle, spec: AttrSpec) -> HostResult<()>;

    fn remove_attribute(&mut self, node: NodeHandle, attr: AttrId) -> HostResult<()>;

    fn set_value(&mut self, plug: PlugHandle, value: RawValue) -> HostResult<()>;

    fn connect(&mut self, src: PlugHandle, dst: PlugHandle) -> HostResult<()>;

    fn disconnect(&mut self, src: PlugHandle, dst: PlugHandle) -> HostResult<()>;

    fn do_it(&mut self) -> HostResult<()>;

    fn undo_it(&mut self) -> HostResult<()>;

    /// Number of queued operations, applied or not
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The scene graph as seen from above
pub trait Host {
    // --- nodes -----------------------------------------------------------

    /// Nodes in the graph whose name or path matches `path`
    fn lookup(&self, path: &str) -> Vec<NodeHandle>;

    /// Whether the handle still refers to a live node
    fn is_valid(&self, node: NodeHandle) -> bool;

    /// Whether the node is currently part of the graph, as opposed to
    /// deleted but kept alive by the undo queue
    fn in_graph(&self, node: NodeHandle) -> HostResult<bool>;

    /// Stable identity hash, unique among live nodes
    fn hash_code(&self, node: NodeHandle) -> HostResult<u64>;

    fn has_capability(&self, node: NodeHandle, capability: Capability) -> HostResult<bool>;

    fn type_name(&self, node: NodeHandle) -> HostResult<String>;

    fn name(&self, node: NodeHandle) -> HostResult<String>;

    /// Absolute path for DAG nodes, the name otherwise
    fn full_path(&self, node: NodeHandle) -> HostResult<String>;

    /// Shortest unambiguous path
    fn partial_path(&self, node: NodeHandle) -> HostResult<String>;

    fn parent(&self, node: NodeHandle) -> HostResult<Option<NodeHandle>>;

    fn children(&self, node: NodeHandle) -> HostResult<Vec<NodeHandle>>;

    /// Every connection touching the node as `(source, destination)`
    fn connections(&self, node: NodeHandle) -> HostResult<Vec<(PlugHandle, PlugHandle)>>;

    // --- attributes and plugs --------------------------------------------

    /// Top-level attributes of a node
    fn attributes(&self, node: NodeHandle) -> HostResult<Vec<AttrId>>;

    fn attribute(&self, node: NodeHandle, attr: AttrId) -> HostResult<AttrInfo>;

    /// Find an attribute by long or short name
    fn find_attribute(&self, node: NodeHandle, name: &str) -> HostResult<Option<AttrId>>;

    /// Plug for a named attribute with no array indices resolved
    fn find_plug(&self, node: NodeHandle, name: &str) -> HostResult<PlugHandle>;

    /// Element of an array plug by logical index
    fn element(&self, plug: &PlugHandle, logical_index: u32) -> HostResult<PlugHandle>;

    /// Child of a compound plug by position
    fn child(&self, plug: &PlugHandle, index: usize) -> HostResult<PlugHandle>;

    fn child_count(&self, plug: &PlugHandle) -> HostResult<usize>;

    /// Logical indices of the elements an array plug currently holds
    fn existing_indices(&self, plug: &PlugHandle) -> HostResult<Vec<u32>>;

    fn plug_kind(&self, plug: &PlugHandle) -> HostResult<AttrKind>;

    /// Whether the plug is an array not yet indexed into
    fn is_array(&self, plug: &PlugHandle) -> HostResult<bool>;

    fn is_compound(&self, plug: &PlugHandle) -> HostResult<bool>;

    /// Attribute path of a plug, e.g. `translate.translateX` or `input[2]`
    fn plug_name(&self, plug: &PlugHandle, long: bool) -> HostResult<String>;

    fn is_locked(&self, plug: &PlugHandle) -> HostResult<bool>;

    fn set_locked(&self, plug: &PlugHandle, locked: bool) -> HostResult<()>;

    fn is_keyable(&self, plug: &PlugHandle) -> HostResult<bool>;

    fn set_keyable(&self, plug: &PlugHandle, keyable: bool) -> HostResult<()>;

    fn default_value(&self, plug: &PlugHandle) -> HostResult<RawValue>;

    /// Read a scalar plug, evaluating connections. `time` is in seconds
    /// and defaults to the current time.
    fn get(&self, plug: &PlugHandle, time: Option<f64>) -> HostResult<RawValue>;

    /// Write a scalar plug directly, outside any modifier
    fn set(&self, plug: &PlugHandle, value: RawValue) -> HostResult<()>;

    /// Plugs connected to `plug`. `sources` yields plugs feeding into it,
    /// `destinations` yields plugs it feeds.
    fn connected_to(&self, plug: &PlugHandle, sources: bool, destinations: bool) -> HostResult<Vec<PlugHandle>>;

    // --- notifications ---------------------------------------------------

    /// Invoked once when the node is irrecoverably destroyed
    fn add_destroyed_callback(&self, node: NodeHandle, callback: NodeCallback) -> HostResult<CallbackId>;

    /// Invoked whenever the node leaves the graph
    fn add_removed_callback(&self, node: NodeHandle, callback: NodeCallback) -> HostResult<CallbackId>;

    /// Unknown ids are ignored
    fn remove_callbacks(&self, ids: &[CallbackId]);

    // --- edits -----------------------------------------------------------

    fn new_modifier(&self) -> Box<dyn NativeModifier>;

    // --- commands and undo queue ----------------------------------------

    fn register_command(&self, name: &str, factory: CommandFactory) -> HostResult<()>;

    fn has_command(&self, name: &str) -> bool;

    fn deregister_command(&self, name: &str) -> HostResult<()>;

    /// Instantiate and run a command, keeping it on the undo queue if undoable
    fn execute_command(&self, name: &str) -> HostResult<()>;

    fn undo(&self) -> HostResult<()>;

    fn redo(&self) -> HostResult<()>;

    /// Drop the undo queue, destroying nodes only it kept alive
    fn flush_undo(&self);

    /// Current time in seconds
    fn current_time(&self) -> f64;

    fn set_current_time(&self, seconds: f64);

    // --- sets ------------------------------------------------------------

    fn set_members(&self, set: NodeHandle) -> HostResult<Vec<NodeHandle>>;

    fn add_to_set(&self, set: NodeHandle, member: NodeHandle) -> HostResult<()>;

    fn remove_from_set(&self, set: NodeHandle, member: NodeHandle) -> HostResult<()>;

    fn clear_set(&self, set: NodeHandle) -> HostResult<()>;

    // --- animation -------------------------------------------------------

    /// Insert or replace a key on an animation curve; time in seconds,
    /// value in internal units
    fn add_key(&self, curve: NodeHandle, time: f64, value: f64) -> HostResult<()>;

    fn keys(&self, curve: NodeHandle) -> HostResult<Vec<(f64, f64)>>;

    // --- scene -----------------------------------------------------------

    /// Destroy everything and start over
    fn new_scene(&self);
}
