//! Registered commands and the host undo queue

use std::collections::HashMap;
use std::rc::Rc;

use crate::host::{CommandFactory, NativeCommand};

/// Command registry plus undo/redo stacks of executed commands.
///
/// Commands are popped out before being undone or redone so the host
/// holds no borrow while they re-enter it.
pub(crate) struct CommandTable {
    factories: HashMap<String, Rc<CommandFactory>>,
    undo_stack: Vec<Box<dyn NativeCommand>>,
    redo_stack: Vec<Box<dyn NativeCommand>>,
    max_size: usize,
    pub refuse_registration: bool,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_SIZE)
    }
}

impl CommandTable {
    /// Default maximum queue length.
    pub const DEFAULT_MAX_SIZE: usize = 1000;

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            factories: HashMap::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size,
            refuse_registration: false,
        }
    }

    pub fn register(&mut self, name: &str, factory: CommandFactory) -> bool {
        if self.factories.contains_key(name) {
            return false;
        }
        self.factories.insert(name.to_string(), Rc::new(factory));
        true
    }

    pub fn deregister(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn factory(&self, name: &str) -> Option<Rc<CommandFactory>> {
        self.factories.get(name).cloned()
    }

    /// Push an executed command. Clears the redo stack.
    ///
    /// Returns whatever fell off either stack so the caller can drop it
    /// outside any borrow.
    pub fn push(&mut self, command: Box<dyn NativeCommand>) -> Vec<Box<dyn NativeCommand>> {
        self.undo_stack.push(command);
        let mut dropped: Vec<_> = self.redo_stack.drain(..).collect();
        while self.undo_stack.len() > self.max_size {
            dropped.push(self.undo_stack.remove(0));
        }
        dropped
    }

    pub fn pop_undo(&mut self) -> Option<Box<dyn NativeCommand>> {
        self.undo_stack.pop()
    }

    pub fn pop_redo(&mut self) -> Option<Box<dyn NativeCommand>> {
        self.redo_stack.pop()
    }

    /// Push a command to the undo stack (for redo completion).
    pub fn push_to_undo(&mut self, command: Box<dyn NativeCommand>) {
        self.undo_stack.push(command);
    }

    /// Push a command to the redo stack (for undo completion).
    pub fn push_to_redo(&mut self, command: Box<dyn NativeCommand>) {
        self.redo_stack.push(command);
    }

    /// Empty both stacks, handing back the commands
    pub fn clear(&mut self) -> Vec<Box<dyn NativeCommand>> {
        let mut dropped: Vec<_> = self.undo_stack.drain(..).collect();
        dropped.extend(self.redo_stack.drain(..));
        dropped
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}
