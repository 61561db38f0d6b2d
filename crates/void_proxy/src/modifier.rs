//! Deferred graph edits
//!
//! A [`Modifier`] queues edits on the host's native edit buffer and
//! applies them together on [`Modifier::commit`]. Every edit is also
//! recorded as a [`HistoryEntry`] so a failed commit can say exactly
//! what it attempted. Atomic modifiers undo whatever part of a failed
//! commit went through before reporting it. Undoable ones put the
//! committed batch on the host undo queue through the undo bridge.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use void_host::{AttrSpec, HostError, NativeModifier, RawValue};

use crate::codec;
use crate::error::{Error, Result, TransactionError};
use crate::node::{Node, NodeData};
use crate::plug::Plug;
use crate::registry;
use crate::session::Context;
use crate::undo::UndoFn;
use crate::value::Value;

/// How a modifier behaves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierOptions {
    /// Put the commit on the host undo queue
    pub undoable: bool,
    /// Whether created nodes show up prominently to the user
    pub interesting: bool,
    /// Undo the applied part of a failed commit
    pub atomic: bool,
    /// Name pattern for created nodes; understands `{name}`, `{type}`
    /// and `{index}`
    pub template: Option<String>,
}

impl Default for ModifierOptions {
    fn default() -> Self {
        Self {
            undoable: true,
            interesting: true,
            atomic: true,
            template: None,
        }
    }
}

impl ModifierOptions {
    /// Applied right away and kept off the undo queue
    pub fn immediate() -> Self {
        Self {
            undoable: false,
            ..Self::default()
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// Lifecycle of a modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    /// Edits are being queued
    Accumulating,
    Committed,
    /// The applied edits were undone
    RolledBack,
    /// The commit failed and nothing was undone
    Failed,
}

/// One queued edit as it was requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub op: String,
    pub args: Vec<String>,
}

impl HistoryEntry {
    pub fn new(op: impl Into<String>, args: Vec<String>) -> Self {
        Self { op: op.into(), args }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.op, self.args.join(", "))
    }
}

fn repr(node: Option<&Node>) -> String {
    node.map_or_else(|| "None".to_string(), |node| node.label())
}

/// Name for the `index`th node created by a modifier
fn node_name(template: Option<&str>, name: Option<&str>, type_name: &str, index: usize) -> Option<String> {
    match template {
        Some(template) => Some(
            template
                .replace("{name}", name.unwrap_or(type_name))
                .replace("{type}", type_name)
                .replace("{index}", &index.to_string()),
        ),
        None => name.map(str::to_string),
    }
}

pub struct Modifier {
    ctx: Rc<Context>,
    options: ModifierOptions,
    native: Rc<RefCell<Box<dyn NativeModifier>>>,
    history: Vec<HistoryEntry>,
    /// Nodes created here, refreshed once they enter the graph
    created: Vec<Weak<NodeData>>,
    state: TransactionState,
}

impl Modifier {
    pub(crate) fn new(ctx: Rc<Context>, options: ModifierOptions) -> Self {
        let native = ctx.host.new_modifier();
        Self {
            ctx,
            options,
            native: Rc::new(RefCell::new(native)),
            history: Vec::new(),
            created: Vec::new(),
            state: TransactionState::Accumulating,
        }
    }

    pub fn options(&self) -> &ModifierOptions {
        &self.options
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Every edit requested so far, in order
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn record(&mut self, op: &str, args: Vec<String>) -> Result<()> {
        if self.state != TransactionState::Accumulating {
            return Err(Error::Finished(self.state));
        }
        self.history.push(HistoryEntry::new(op, args));
        Ok(())
    }

    // --- nodes -----------------------------------------------------------

    /// Queue a new node. The wrapper is usable right away; the node
    /// enters the graph on commit.
    pub fn create_node(&mut self, type_name: &str, name: Option<&str>, parent: Option<&Node>) -> Result<Node> {
        if let Some(parent) = parent {
            parent.guard()?;
        }
        self.record(
            "create_node",
            vec![format!("{type_name:?}"), format!("{name:?}"), repr(parent)],
        )?;

        let handle = self
            .native
            .borrow_mut()
            .create_node(type_name, parent.map(Node::handle))
            .map_err(|e| Error::from_host(type_name, e))?;

        let index = self.created.len();
        if let Some(name) = node_name(self.options.template.as_deref(), name, type_name, index) {
            self.native
                .borrow_mut()
                .rename_node(handle, &name)
                .map_err(|e| Error::from_host(name.clone(), e))?;
        }

        if !self.options.interesting {
            if let Ok(plug) = self.ctx.host.find_plug(handle, "isHistoricallyInteresting") {
                self.native
                    .borrow_mut()
                    .set_value(plug, RawValue::Int(0))
                    .map_err(|e| Error::from_host(type_name, e))?;
            }
        }

        let node = registry::resolve(&self.ctx, handle)?;
        self.created.push(node.downgrade());
        Ok(node)
    }

    pub fn delete_node(&mut self, node: &Node) -> Result<()> {
        node.guard()?;
        self.record("delete_node", vec![node.label()])?;
        self.native
            .borrow_mut()
            .delete_node(node.handle())
            .map_err(|e| node.fail(e))
    }

    pub fn rename(&mut self, node: &Node, name: &str) -> Result<()> {
        node.guard()?;
        self.record("rename", vec![node.label(), format!("{name:?}")])?;
        self.native
            .borrow_mut()
            .rename_node(node.handle(), name)
            .map_err(|e| node.fail(e))
    }

    /// Move a DAG node under `parent`, or to the world
    pub fn reparent(&mut self, node: &Node, parent: Option<&Node>) -> Result<()> {
        node.guard()?;
        if let Some(parent) = parent {
            parent.guard()?;
        }
        self.record("reparent", vec![node.label(), repr(parent)])?;
        self.native
            .borrow_mut()
            .reparent_node(node.handle(), parent.map(Node::handle))
            .map_err(|e| node.fail(e))
    }

    // --- attributes ------------------------------------------------------

    pub fn add_attr(&mut self, node: &Node, spec: AttrSpec) -> Result<()> {
        node.guard()?;
        self.record("add_attr", vec![node.label(), format!("{:?}", spec.name)])?;
        self.native
            .borrow_mut()
            .add_attribute(node.handle(), spec)
            .map_err(|e| node.fail(e))
    }

    pub fn delete_attr(&mut self, node: &Node, name: &str) -> Result<()> {
        node.guard()?;
        self.record("delete_attr", vec![node.label(), format!("{name:?}")])?;
        let attr = self
            .ctx
            .host
            .find_attribute(node.handle(), name)
            .map_err(|e| node.fail(e))?
            .ok_or_else(|| Error::Existence(format!("{}.{name} does not exist", node.label())))?;
        self.native
            .borrow_mut()
            .remove_attribute(node.handle(), attr)
            .map_err(|e| node.fail(e))
    }

    /// Queue a value write, distributed over the plug's leaves
    pub fn set_attr(&mut self, plug: &Plug, value: impl Into<Value>) -> Result<()> {
        plug.node().guard()?;
        let value = value.into();
        self.record("set_attr", vec![plug.label(), format!("{value:?}")])?;
        let plan = codec::plan(&*self.ctx.host, plug.handle(), &value, plug.unit())?;
        let mut native = self.native.borrow_mut();
        for (leaf, raw) in plan {
            native.set_value(leaf, raw).map_err(|e| plug.fail(e))?;
        }
        Ok(())
    }

    /// Queue a write of the plug's default value
    pub fn reset_attr(&mut self, plug: &Plug) -> Result<()> {
        let default = plug.default()?;
        self.set_attr(plug, default)
    }

    // --- connections -----------------------------------------------------

    /// Queue a connection from `src` into `dst`.
    ///
    /// With `force`, whatever currently drives `dst` is disconnected and
    /// those disconnections are applied before the connection is queued.
    /// The host mangles its undo record for a connect queued right after
    /// a disconnect of the same plug.
    pub fn connect(&mut self, src: &Plug, dst: &Plug, force: bool) -> Result<()> {
        src.node().guard()?;
        dst.node().guard()?;
        self.record("connect", vec![src.label(), dst.label(), force.to_string()])?;

        if force {
            let sources = self
                .ctx
                .host
                .connected_to(dst.handle(), true, false)
                .map_err(|e| dst.fail(e))?;
            if sources.iter().any(|s| s == src.handle()) {
                return Ok(());
            }
            if !sources.is_empty() {
                {
                    let mut native = self.native.borrow_mut();
                    for source in sources {
                        native
                            .disconnect(source, dst.handle().clone())
                            .map_err(|e| dst.fail(e))?;
                    }
                }
                self.flush()?;
            }
        }

        self.native
            .borrow_mut()
            .connect(src.handle().clone(), dst.handle().clone())
            .map_err(|e| dst.fail(e))
    }

    /// Queue removal of the connection between `plug` and `other`, in
    /// whichever direction it runs, or of every connection of `plug`
    pub fn disconnect(&mut self, plug: &Plug, other: Option<&Plug>) -> Result<()> {
        plug.node().guard()?;
        self.record(
            "disconnect",
            vec![plug.label(), other.map_or_else(|| "None".to_string(), Plug::label)],
        )?;

        let host = &*self.ctx.host;
        let incoming = host
            .connected_to(plug.handle(), true, false)
            .map_err(|e| plug.fail(e))?;
        let pairs = match other {
            Some(other) if incoming.contains(other.handle()) => {
                vec![(other.handle().clone(), plug.handle().clone())]
            }
            Some(other) => vec![(plug.handle().clone(), other.handle().clone())],
            None => {
                let outgoing = host
                    .connected_to(plug.handle(), false, true)
                    .map_err(|e| plug.fail(e))?;
                incoming
                    .into_iter()
                    .map(|src| (src, plug.handle().clone()))
                    .chain(outgoing.into_iter().map(|dst| (plug.handle().clone(), dst)))
                    .collect()
            }
        };

        let mut native = self.native.borrow_mut();
        for (src, dst) in pairs {
            native.disconnect(src, dst).map_err(|e| plug.fail(e))?;
        }
        Ok(())
    }

    // --- execution -------------------------------------------------------

    /// Apply what is queued so far without closing the modifier
    fn flush(&mut self) -> Result<()> {
        let result = self.native.borrow_mut().do_it();
        result.map_err(|e| self.fail(e))?;
        for node in self.created.iter().filter_map(Weak::upgrade) {
            Node::from_data(node).refresh();
        }
        Ok(())
    }

    fn fail(&mut self, error: HostError) -> Error {
        let source = Error::from_host("commit", error);
        log::error!("Transaction failed after {} operations: {}", self.history.len(), source);

        let rolled_back = self.options.atomic && {
            let undone = self.native.borrow_mut().undo_it();
            match undone {
                Ok(()) => true,
                Err(e) => {
                    log::error!("Rollback failed: {}", e);
                    false
                }
            }
        };
        self.state = if rolled_back {
            TransactionState::RolledBack
        } else {
            TransactionState::Failed
        };

        Error::Transaction(TransactionError {
            history: self.history.clone(),
            rolled_back,
            source: Box::new(source),
        })
    }

    /// Apply every queued edit, in order
    pub fn commit(&mut self) -> Result<()> {
        if self.state != TransactionState::Accumulating {
            return Err(Error::Finished(self.state));
        }
        self.flush()?;
        self.state = TransactionState::Committed;
        log::debug!("Committed {} operations", self.history.len());

        if self.options.undoable && self.ctx.config.undo() && !self.history.is_empty() {
            let native = self.native.clone();
            let undo: UndoFn = Box::new(move || {
                let result = native.borrow_mut().undo_it();
                result.map_err(|e| Error::from_host("undo", e))
            });
            let native = self.native.clone();
            let redo: UndoFn = Box::new(move || {
                let result = native.borrow_mut().do_it();
                result.map_err(|e| Error::from_host("redo", e))
            });
            self.ctx.bridge.commit(&*self.ctx.host, undo, redo)?;
        }
        Ok(())
    }

    /// Undo a committed modifier directly, bypassing the undo queue
    pub fn undo_it(&mut self) -> Result<()> {
        if self.state != TransactionState::Committed {
            return Err(Error::Finished(self.state));
        }
        let result = self.native.borrow_mut().undo_it();
        result.map_err(|e| Error::from_host("undo", e))?;
        self.state = TransactionState::RolledBack;
        Ok(())
    }
}

impl Drop for Modifier {
    fn drop(&mut self) {
        if self.state == TransactionState::Accumulating && !self.history.is_empty() {
            log::warn!(
                "Modifier dropped with {} uncommitted operations, first: {}",
                self.history.len(),
                self.history[0]
            );
        }
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifier")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("history", &self.history)
            .finish()
    }
}
