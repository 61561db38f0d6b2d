//! In-memory reference host
//!
//! A small, fully functional scene graph implementing [`Host`]. It backs
//! the test suites of everything above the host boundary and doubles as
//! a fixture builder: [`MemoryHost::create`] applies a one-off modifier.
//!
//! Deleted nodes stay alive, out of the graph, until the undo queue is
//! flushed or a new scene is started. Only then are they destroyed.

mod history;
mod modifier;
mod scene;
mod types;

use std::cell::RefCell;
use std::rc::Rc;

use crate::attribute::{AttrId, AttrInfo, AttrKind, PlugHandle, RawValue};
use crate::error::{HostError, HostResult};
use crate::handle::NodeHandle;
use crate::host::{CallbackId, Capability, CommandFactory, Host, NativeModifier, NodeCallback};

pub use modifier::MemoryModifier;
pub use types::NODE_TYPES;

use history::CommandTable;
use scene::{CallbackKind, Fired, Scene};

/// Invoke callbacks collected while the scene was borrowed
pub(crate) fn fire(fired: Fired) {
    for (node, callback) in fired {
        callback(node);
    }
}

/// Cheaply cloneable handle to one shared in-memory scene
#[derive(Clone, Default)]
pub struct MemoryHost {
    scene: Rc<RefCell<Scene>>,
    commands: Rc<RefCell<CommandTable>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node right away, optionally named and parented
    pub fn create(&self, type_name: &str, name: Option<&str>, parent: Option<NodeHandle>) -> HostResult<NodeHandle> {
        let mut modifier = self.new_modifier();
        let node = modifier.create_node(type_name, parent)?;
        if let Some(name) = name {
            modifier.rename_node(node, name)?;
        }
        modifier.do_it()?;
        Ok(node)
    }

    /// Delete a node outside the undo queue
    pub fn delete(&self, node: NodeHandle) -> HostResult<()> {
        let mut modifier = self.new_modifier();
        modifier.delete_node(node)?;
        modifier.do_it()
    }

    /// Make every subsequent plug read fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.scene.borrow_mut().fail_reads = fail;
    }

    /// Let the next `ops` modifier operations apply, then fail the one after.
    /// `None` lifts the limit.
    pub fn set_fail_after_ops(&self, ops: Option<usize>) {
        self.scene.borrow_mut().op_budget = ops;
    }

    /// Number of plug reads served so far
    pub fn reads(&self) -> u64 {
        self.scene.borrow().reads
    }

    /// Make command registration fail
    pub fn set_refuse_commands(&self, refuse: bool) {
        self.commands.borrow_mut().refuse_registration = refuse;
    }

    pub fn undo_depth(&self) -> usize {
        self.commands.borrow().undo_count()
    }

    pub fn redo_depth(&self) -> usize {
        self.commands.borrow().redo_count()
    }

    /// Live node count, including nodes out of the graph but not yet destroyed
    pub fn node_count(&self) -> usize {
        self.scene.borrow().live_count()
    }

    pub fn callback_count(&self) -> usize {
        self.scene.borrow().callback_count()
    }
}

impl Host for MemoryHost {
    fn lookup(&self, path: &str) -> Vec<NodeHandle> {
        self.scene.borrow().lookup(path)
    }

    fn is_valid(&self, node: NodeHandle) -> bool {
        self.scene.borrow().is_valid(node)
    }

    fn in_graph(&self, node: NodeHandle) -> HostResult<bool> {
        self.scene.borrow().in_graph(node)
    }

    fn hash_code(&self, node: NodeHandle) -> HostResult<u64> {
        self.scene.borrow().hash_code(node)
    }

    fn has_capability(&self, node: NodeHandle, capability: Capability) -> HostResult<bool> {
        self.scene.borrow().has_capability(node, capability)
    }

    fn type_name(&self, node: NodeHandle) -> HostResult<String> {
        self.scene.borrow().type_name(node)
    }

    fn name(&self, node: NodeHandle) -> HostResult<String> {
        self.scene.borrow().name(node)
    }

    fn full_path(&self, node: NodeHandle) -> HostResult<String> {
        self.scene.borrow().full_path(node)
    }

    fn partial_path(&self, node: NodeHandle) -> HostResult<String> {
        self.scene.borrow().partial_path(node)
    }

    fn parent(&self, node: NodeHandle) -> HostResult<Option<NodeHandle>> {
        self.scene.borrow().parent(node)
    }

    fn children(&self, node: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        self.scene.borrow().children(node)
    }

    fn connections(&self, node: NodeHandle) -> HostResult<Vec<(PlugHandle, PlugHandle)>> {
        self.scene.borrow().connections(node)
    }

    fn attributes(&self, node: NodeHandle) -> HostResult<Vec<AttrId>> {
        self.scene.borrow().attributes(node)
    }

    fn attribute(&self, node: NodeHandle, attr: AttrId) -> HostResult<AttrInfo> {
        self.scene.borrow().attribute(node, attr)
    }

    fn find_attribute(&self, node: NodeHandle, name: &str) -> HostResult<Option<AttrId>> {
        self.scene.borrow().find_attribute(node, name)
    }

    fn find_plug(&self, node: NodeHandle, name: &str) -> HostResult<PlugHandle> {
        self.scene.borrow().find_plug(node, name)
    }

    fn element(&self, plug: &PlugHandle, logical_index: u32) -> HostResult<PlugHandle> {
        self.scene.borrow().element(plug, logical_index)
    }

    fn child(&self, plug: &PlugHandle, index: usize) -> HostResult<PlugHandle> {
        self.scene.borrow().child(plug, index)
    }

    fn child_count(&self, plug: &PlugHandle) -> HostResult<usize> {
        self.scene.borrow().child_count(plug)
    }

    fn existing_indices(&self, plug: &PlugHandle) -> HostResult<Vec<u32>> {
        self.scene.borrow().existing_indices(plug)
    }

    fn plug_kind(&self, plug: &PlugHandle) -> HostResult<AttrKind> {
        self.scene.borrow().plug_kind(plug)
    }

    fn is_array(&self, plug: &PlugHandle) -> HostResult<bool> {
        self.scene.borrow().is_array(plug)
    }

    fn is_compound(&self, plug: &PlugHandle) -> HostResult<bool> {
        self.scene.borrow().is_compound(plug)
    }

    fn plug_name(&self, plug: &PlugHandle, long: bool) -> HostResult<String> {
        self.scene.borrow().plug_name(plug, long)
    }

    fn is_locked(&self, plug: &PlugHandle) -> HostResult<bool> {
        self.scene.borrow().is_locked(plug)
    }

    fn set_locked(&self, plug: &PlugHandle, locked: bool) -> HostResult<()> {
        self.scene.borrow_mut().set_locked(plug, locked)
    }

    fn is_keyable(&self, plug: &PlugHandle) -> HostResult<bool> {
        self.scene.borrow().is_keyable(plug)
    }

    fn set_keyable(&self, plug: &PlugHandle, keyable: bool) -> HostResult<()> {
        self.scene.borrow_mut().set_keyable(plug, keyable)
    }

    fn default_value(&self, plug: &PlugHandle) -> HostResult<RawValue> {
        self.scene.borrow().default_value(plug)
    }

    fn get(&self, plug: &PlugHandle, time: Option<f64>) -> HostResult<RawValue> {
        let mut scene = self.scene.borrow_mut();
        if scene.fail_reads {
            return Err(HostError::Injected("reads are disabled".into()));
        }
        scene.reads += 1;
        let time = time.unwrap_or(scene.time);
        scene.read(plug, time, 0)
    }

    fn set(&self, plug: &PlugHandle, value: RawValue) -> HostResult<()> {
        self.scene.borrow_mut().write(plug, value)
    }

    fn connected_to(&self, plug: &PlugHandle, sources: bool, destinations: bool) -> HostResult<Vec<PlugHandle>> {
        self.scene.borrow().connected_to(plug, sources, destinations)
    }

    fn add_destroyed_callback(&self, node: NodeHandle, callback: NodeCallback) -> HostResult<CallbackId> {
        self.scene
            .borrow_mut()
            .add_callback(node, CallbackKind::Destroyed, callback)
    }

    fn add_removed_callback(&self, node: NodeHandle, callback: NodeCallback) -> HostResult<CallbackId> {
        self.scene
            .borrow_mut()
            .add_callback(node, CallbackKind::Removed, callback)
    }

    fn remove_callbacks(&self, ids: &[CallbackId]) {
        // May be reached from a callback fired mid-teardown
        if let Ok(mut scene) = self.scene.try_borrow_mut() {
            scene.remove_callbacks(ids);
        }
    }

    fn new_modifier(&self) -> Box<dyn NativeModifier> {
        Box::new(MemoryModifier::new(self.scene.clone()))
    }

    fn register_command(&self, name: &str, factory: CommandFactory) -> HostResult<()> {
        let mut commands = self.commands.borrow_mut();
        if commands.refuse_registration {
            return Err(HostError::CommandRegistration(name.to_string(), "registration refused".into()));
        }
        if !commands.register(name, factory) {
            return Err(HostError::CommandRegistration(name.to_string(), "already registered".into()));
        }
        log::debug!("Registered command '{}'", name);
        Ok(())
    }

    fn has_command(&self, name: &str) -> bool {
        self.commands.borrow().contains(name)
    }

    fn deregister_command(&self, name: &str) -> HostResult<()> {
        if self.commands.borrow_mut().deregister(name) {
            Ok(())
        } else {
            Err(HostError::UnknownCommand(name.to_string()))
        }
    }

    fn execute_command(&self, name: &str) -> HostResult<()> {
        let factory = self
            .commands
            .borrow()
            .factory(name)
            .ok_or_else(|| HostError::UnknownCommand(name.to_string()))?;
        let mut command = (*factory)();
        command.do_it()?;
        if command.is_undoable() {
            let dropped = self.commands.borrow_mut().push(command);
            drop(dropped);
        }
        Ok(())
    }

    fn undo(&self) -> HostResult<()> {
        let mut command = self
            .commands
            .borrow_mut()
            .pop_undo()
            .ok_or(HostError::EmptyHistory("undo"))?;
        match command.undo_it() {
            Ok(()) => {
                self.commands.borrow_mut().push_to_redo(command);
                Ok(())
            }
            Err(e) => {
                log::error!("Undo failed: {}", e);
                self.commands.borrow_mut().push_to_undo(command);
                Err(e)
            }
        }
    }

    fn redo(&self) -> HostResult<()> {
        let mut command = self
            .commands
            .borrow_mut()
            .pop_redo()
            .ok_or(HostError::EmptyHistory("redo"))?;
        match command.redo_it() {
            Ok(()) => {
                self.commands.borrow_mut().push_to_undo(command);
                Ok(())
            }
            Err(e) => {
                log::error!("Redo failed: {}", e);
                self.commands.borrow_mut().push_to_redo(command);
                Err(e)
            }
        }
    }

    fn flush_undo(&self) {
        let dropped = self.commands.borrow_mut().clear();
        drop(dropped);
        let fired = self.scene.borrow_mut().destroy_orphans();
        fire(fired);
    }

    fn current_time(&self) -> f64 {
        self.scene.borrow().time
    }

    fn set_current_time(&self, seconds: f64) {
        self.scene.borrow_mut().time = seconds;
    }

    fn set_members(&self, set: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        self.scene.borrow().set_members(set)
    }

    fn add_to_set(&self, set: NodeHandle, member: NodeHandle) -> HostResult<()> {
        self.scene.borrow_mut().add_to_set(set, member)
    }

    fn remove_from_set(&self, set: NodeHandle, member: NodeHandle) -> HostResult<()> {
        self.scene.borrow_mut().remove_from_set(set, member)
    }

    fn clear_set(&self, set: NodeHandle) -> HostResult<()> {
        self.scene.borrow_mut().clear_set(set)
    }

    fn add_key(&self, curve: NodeHandle, time: f64, value: f64) -> HostResult<()> {
        self.scene.borrow_mut().add_key(curve, time, value)
    }

    fn keys(&self, curve: NodeHandle) -> HostResult<Vec<(f64, f64)>> {
        self.scene.borrow().keys(curve)
    }

    fn new_scene(&self) {
        let dropped = self.commands.borrow_mut().clear();
        drop(dropped);
        let fired = self.scene.borrow_mut().destroy_all();
        fire(fired);
    }
}
