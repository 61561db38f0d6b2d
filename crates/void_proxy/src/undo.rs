//! Bridge from proxy closures to the host undo queue
//!
//! The host only knows how to undo commands it executed itself. The
//! bridge registers one command per installation and runs it once per
//! undoable commit. The command's `do_it` picks up the identifiers of
//! the closures recorded for that commit from a shared slot; its
//! `undo_it` and `redo_it` look them up again when the host navigates
//! its queue.
//!
//! The command name carries the crate version and an installation
//! identity, so several copies of the proxy can live in one host.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use void_host::{CommandFactory, Host, HostError, HostResult, NativeCommand};

use crate::error::{Error, Result};

/// Closure recorded for one side of a commit
pub type UndoFn = Box<dyn FnMut() -> Result<()>>;

type Shared = Rc<RefCell<UndoFn>>;

/// Identities handed to bridges without a configured one
static INSTALLATIONS: AtomicU64 = AtomicU64::new(0);

/// Hands closure identifiers from a commit to the command it runs
#[derive(Default)]
struct SharedSlot {
    undo: Option<String>,
    redo: Option<String>,
    undos: HashMap<String, Shared>,
    redos: HashMap<String, Shared>,
}

impl SharedSlot {
    fn is_empty(&self) -> bool {
        self.undo.is_none() && self.redo.is_none()
    }

    fn forget(&mut self, undo: Option<&String>, redo: Option<&String>) {
        if let Some(id) = undo {
            self.undos.remove(id);
        }
        if let Some(id) = redo {
            self.redos.remove(id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BridgeState {
    Uninstalled,
    Installed,
    /// The host refused the command. Closures are never invoked.
    Unavailable(String),
}

/// Command instance the host keeps on its undo queue
struct BridgeCommand {
    slot: Rc<RefCell<SharedSlot>>,
    undo: Option<String>,
    redo: Option<String>,
}

impl BridgeCommand {
    fn run(&self, id: Option<&String>, undo: bool) -> HostResult<()> {
        let Some(id) = id else {
            return Err(HostError::Command("no closure was recorded for this command".into()));
        };
        let closure = {
            let slot = self.slot.borrow();
            let table = if undo { &slot.undos } else { &slot.redos };
            table.get(id).cloned()
        };
        let closure = closure.ok_or_else(|| HostError::Command(format!("closure '{id}' is gone")))?;
        let mut closure = closure
            .try_borrow_mut()
            .map_err(|_| HostError::Command(format!("closure '{id}' is already running")))?;
        (*closure)().map_err(|e| HostError::Command(e.to_string()))
    }
}

impl NativeCommand for BridgeCommand {
    fn do_it(&mut self) -> HostResult<()> {
        let mut slot = self.slot.borrow_mut();
        self.undo = slot.undo.take();
        self.redo = slot.redo.take();
        Ok(())
    }

    fn undo_it(&mut self) -> HostResult<()> {
        self.run(self.undo.as_ref(), true)
    }

    fn redo_it(&mut self) -> HostResult<()> {
        self.run(self.redo.as_ref(), false)
    }
}

impl Drop for BridgeCommand {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.try_borrow_mut() {
            slot.forget(self.undo.as_ref(), self.redo.as_ref());
        }
    }
}

/// One installation of the undo command plus its shared slot
pub struct UndoBridge {
    command: String,
    slot: Rc<RefCell<SharedSlot>>,
    state: RefCell<BridgeState>,
    next_id: Cell<u64>,
}

impl UndoBridge {
    pub fn new(identity: Option<&str>) -> Self {
        let identity = match identity {
            Some(identity) => identity
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect(),
            None => INSTALLATIONS.fetch_add(1, Ordering::Relaxed).to_string(),
        };
        let version = env!("CARGO_PKG_VERSION").replace(['.', '-', '+'], "_");
        Self {
            command: format!("_voidProxyUndo_{version}_{identity}"),
            slot: Rc::new(RefCell::new(SharedSlot::default())),
            state: RefCell::new(BridgeState::Uninstalled),
            next_id: Cell::new(0),
        }
    }

    /// Name of the host command this bridge registers
    pub fn command_name(&self) -> &str {
        &self.command
    }

    pub fn is_installed(&self) -> bool {
        *self.state.borrow() == BridgeState::Installed
    }

    /// Whether installation was attempted and refused by the host
    pub fn is_unavailable(&self) -> bool {
        matches!(*self.state.borrow(), BridgeState::Unavailable(_))
    }

    fn unavailable(&self, reason: String) -> Error {
        Error::UndoUnavailable {
            command: self.command.clone(),
            reason,
        }
    }

    /// Register the command with the host, once
    pub fn install(&self, host: &dyn Host) -> Result<()> {
        let state = self.state.borrow().clone();
        match state {
            BridgeState::Installed => return Ok(()),
            BridgeState::Unavailable(reason) => return Err(self.unavailable(reason)),
            BridgeState::Uninstalled => {}
        }

        let slot = self.slot.clone();
        let factory: CommandFactory = Box::new(move || {
            Box::new(BridgeCommand {
                slot: slot.clone(),
                undo: None,
                redo: None,
            })
        });

        match host.register_command(&self.command, factory) {
            Ok(()) => {
                log::debug!("Installed undo command '{}'", self.command);
                *self.state.borrow_mut() = BridgeState::Installed;
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                log::error!(
                    "Could not install undo command '{}', undo is disabled: {}",
                    self.command,
                    reason
                );
                *self.state.borrow_mut() = BridgeState::Unavailable(reason.clone());
                Err(self.unavailable(reason))
            }
        }
    }

    /// Put one undo/redo pair on the host undo queue
    pub fn commit(&self, host: &dyn Host, undo: UndoFn, redo: UndoFn) -> Result<()> {
        self.install(host)?;

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let (undo_id, redo_id) = (format!("undo{id}"), format!("redo{id}"));

        {
            let mut slot = self.slot.borrow_mut();
            if !slot.is_empty() {
                log::warn!(
                    "Undo slot of '{}' was not empty, a previous commit never reached the host",
                    self.command
                );
                let (stale_undo, stale_redo) = (slot.undo.take(), slot.redo.take());
                slot.forget(stale_undo.as_ref(), stale_redo.as_ref());
            }
            slot.undos.insert(undo_id.clone(), Rc::new(RefCell::new(undo)));
            slot.redos.insert(redo_id.clone(), Rc::new(RefCell::new(redo)));
            slot.undo = Some(undo_id.clone());
            slot.redo = Some(redo_id.clone());
        }

        host.execute_command(&self.command).map_err(|e| {
            let mut slot = self.slot.borrow_mut();
            slot.undo = None;
            slot.redo = None;
            slot.forget(Some(&undo_id), Some(&redo_id));
            Error::from_host(self.command.clone(), e)
        })
    }

    /// Flush the host undo queue, empty the slot and drop the command
    pub fn uninstall(&self, host: &dyn Host) -> Result<()> {
        if !self.is_installed() {
            *self.state.borrow_mut() = BridgeState::Uninstalled;
            return Ok(());
        }
        host.flush_undo();
        {
            let mut slot = self.slot.borrow_mut();
            *slot = SharedSlot::default();
        }
        *self.state.borrow_mut() = BridgeState::Uninstalled;
        host.deregister_command(&self.command)
            .map_err(|e| Error::from_host(self.command.clone(), e))?;
        log::debug!("Uninstalled undo command '{}'", self.command);
        Ok(())
    }

    /// Whether no identifiers are waiting for the command to pick them up
    pub fn slot_is_empty(&self) -> bool {
        self.slot.borrow().is_empty()
    }

    /// Closures still reachable from commands on the host undo queue
    pub fn pending_closures(&self) -> usize {
        let slot = self.slot.borrow();
        slot.undos.len() + slot.redos.len()
    }
}

impl std::fmt::Debug for UndoBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoBridge")
            .field("command", &self.command)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
