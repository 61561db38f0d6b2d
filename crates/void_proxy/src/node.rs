//! Node wrappers
//!
//! A [`Node`] is a cheap handle to the one wrapper the registry keeps for
//! a host node. The wrapper listens for the node's removal and
//! destruction, caches plug lookups and recently read values, and
//! refuses to touch a destroyed node unless rogue mode is on.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use void_host::{AttrSpec, CallbackId, Capability, Host, HostError, NodeCallback, NodeHandle, PlugHandle};

use crate::anim::AnimCurve;
use crate::dag::DagNode;
use crate::error::{Error, Result};
use crate::modifier::{Modifier, ModifierOptions};
use crate::plug::Plug;
use crate::registry;
use crate::session::Context;
use crate::set::ObjectSet;
use crate::units::Unit;
use crate::value::Value;

/// Wrapper flavour, picked by probing the node's capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Plain dependency node
    Dg,
    Dag,
    ObjectSet,
    AnimCurve,
}

type Hook = Rc<dyn Fn(&Node)>;

/// Per-wrapper state that can be dropped at any time
#[derive(Default)]
struct Transient {
    plugs: HashMap<String, PlugHandle>,
    values: HashMap<(String, Option<Unit>), Value>,
}

pub(crate) struct NodeData {
    ctx: Rc<Context>,
    handle: NodeHandle,
    hash: u64,
    kind: NodeKind,
    destroyed: Cell<bool>,
    removed: Cell<bool>,
    /// Last path seen, for messages about nodes the host forgot
    path: RefCell<String>,
    state: RefCell<Transient>,
    callbacks: RefCell<Vec<CallbackId>>,
    destroyed_hooks: RefCell<Vec<Hook>>,
    removed_hooks: RefCell<Vec<Hook>>,
}

impl NodeData {
    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

impl Drop for NodeData {
    fn drop(&mut self) {
        let ids = std::mem::take(self.callbacks.get_mut());
        if !ids.is_empty() {
            self.ctx.host.remove_callbacks(&ids);
        }
        self.ctx.registry.evict(self.hash, self as *const NodeData);
    }
}

#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    pub(crate) fn construct(ctx: &Rc<Context>, handle: NodeHandle, hash: u64, kind: NodeKind) -> Result<Node> {
        let context = || format!("{handle:?}");
        let path = ctx
            .host
            .full_path(handle)
            .map_err(|e| Error::from_host(context(), e))?;
        let in_graph = ctx
            .host
            .in_graph(handle)
            .map_err(|e| Error::from_host(context(), e))?;

        let data = Rc::new(NodeData {
            ctx: ctx.clone(),
            handle,
            hash,
            kind,
            destroyed: Cell::new(false),
            removed: Cell::new(!in_graph),
            path: RefCell::new(path),
            state: RefCell::new(Transient::default()),
            callbacks: RefCell::new(Vec::new()),
            destroyed_hooks: RefCell::new(Vec::new()),
            removed_hooks: RefCell::new(Vec::new()),
        });

        let weak = Rc::downgrade(&data);
        let on_destroyed: NodeCallback = Rc::new(move |_: NodeHandle| {
            if let Some(data) = weak.upgrade() {
                Node(data).mark_destroyed();
            }
        });
        let weak = Rc::downgrade(&data);
        let on_removed: NodeCallback = Rc::new(move |_: NodeHandle| {
            if let Some(data) = weak.upgrade() {
                Node(data).mark_removed();
            }
        });

        let destroyed = ctx
            .host
            .add_destroyed_callback(handle, on_destroyed)
            .map_err(|e| Error::from_host(context(), e))?;
        data.callbacks.borrow_mut().push(destroyed);
        let removed = ctx
            .host
            .add_removed_callback(handle, on_removed)
            .map_err(|e| Error::from_host(context(), e))?;
        data.callbacks.borrow_mut().push(removed);

        log::trace!("Wrapped {} as {:?}", data.path.borrow(), kind);
        Ok(Node(data))
    }

    pub(crate) fn from_data(data: Rc<NodeData>) -> Node {
        Node(data)
    }

    pub(crate) fn downgrade(&self) -> Weak<NodeData> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn ctx(&self) -> &Rc<Context> {
        &self.0.ctx
    }

    pub(crate) fn host(&self) -> &dyn Host {
        &*self.0.ctx.host
    }

    /// Last known path, without asking the host
    pub(crate) fn label(&self) -> String {
        self.0.path.borrow().clone()
    }

    pub(crate) fn fail(&self, error: HostError) -> Error {
        Error::from_host(self.label(), error)
    }

    /// Refuse to go on with a destroyed node, unless in rogue mode
    pub(crate) fn guard(&self) -> Result<()> {
        if self.0.destroyed.get() && !self.0.ctx.config.rogue() {
            return Err(Error::Existence(format!(
                "cannot perform operation on deleted node '{}'",
                self.0.path.borrow()
            )));
        }
        Ok(())
    }

    fn mark_destroyed(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        self.0.removed.set(true);

        let ids = std::mem::take(&mut *self.0.callbacks.borrow_mut());
        self.0.ctx.host.remove_callbacks(&ids);
        self.0.ctx.registry.evict(self.0.hash, Rc::as_ptr(&self.0));
        if let Ok(mut state) = self.0.state.try_borrow_mut() {
            *state = Transient::default();
        }
        log::debug!("{} was destroyed", self.0.path.borrow());

        let hooks = std::mem::take(&mut *self.0.destroyed_hooks.borrow_mut());
        for hook in hooks {
            hook(self);
        }
    }

    fn mark_removed(&self) {
        self.0.removed.set(true);
        let hooks = self.0.removed_hooks.borrow().clone();
        for hook in hooks {
            hook(self);
        }
    }

    /// Re-read the removed flag and last known path from the host
    pub(crate) fn refresh(&self) {
        if let Ok(in_graph) = self.host().in_graph(self.0.handle) {
            self.0.removed.set(!in_graph);
        }
        if let Ok(path) = self.host().full_path(self.0.handle) {
            *self.0.path.borrow_mut() = path;
        }
    }

    // --- identity --------------------------------------------------------

    pub fn handle(&self) -> NodeHandle {
        self.0.handle
    }

    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    /// Stable hash the registry knows this node by
    pub fn hash_code(&self) -> u64 {
        self.0.hash
    }

    pub fn hex(&self) -> String {
        format!("{:x}", self.0.hash)
    }

    /// Whether both are the same wrapper instance
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The host destroyed this node. Final.
    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// The node was taken out of the graph when last observed
    pub fn is_removed(&self) -> bool {
        self.0.removed.get()
    }

    /// Whether the node is in the graph right now
    pub fn exists(&self) -> bool {
        if self.is_destroyed() || !self.host().is_valid(self.0.handle) {
            return false;
        }
        self.refresh();
        !self.0.removed.get()
    }

    /// Whether the host still holds the node, in the graph or not
    pub fn is_alive(&self) -> bool {
        !self.is_destroyed() && self.host().is_valid(self.0.handle)
    }

    pub fn type_name(&self) -> Result<String> {
        self.guard()?;
        self.host().type_name(self.0.handle).map_err(|e| self.fail(e))
    }

    pub fn has_capability(&self, capability: Capability) -> Result<bool> {
        self.guard()?;
        self.host()
            .has_capability(self.0.handle, capability)
            .map_err(|e| self.fail(e))
    }

    // --- names -----------------------------------------------------------

    /// Node name, with or without its namespace
    pub fn name(&self, namespace: bool) -> Result<String> {
        self.guard()?;
        let name = self.host().name(self.0.handle).map_err(|e| self.fail(e))?;
        if namespace {
            return Ok(name);
        }
        Ok(name.rsplit(':').next().unwrap_or_default().to_string())
    }

    /// Namespace of the node, empty at the root namespace
    pub fn namespace(&self) -> Result<String> {
        let name = self.name(true)?;
        Ok(name
            .rsplit_once(':')
            .map(|(namespace, _)| namespace.to_string())
            .unwrap_or_default())
    }

    /// Full path for DAG nodes, the name otherwise
    pub fn path(&self) -> Result<String> {
        self.guard()?;
        let path = self.host().full_path(self.0.handle).map_err(|e| self.fail(e))?;
        *self.0.path.borrow_mut() = path.clone();
        Ok(path)
    }

    pub fn shortest_path(&self) -> Result<String> {
        self.guard()?;
        self.host().partial_path(self.0.handle).map_err(|e| self.fail(e))
    }

    // --- attributes ------------------------------------------------------

    /// Plug for an attribute name or path such as `input[2]` or
    /// `translate.translateX`
    pub fn plug(&self, name: &str) -> Result<Plug> {
        self.guard()?;
        let ctx = self.ctx();
        let started = ctx.config.timings.then(Instant::now);

        let cached = if ctx.config.caching() {
            self.0.state.borrow().plugs.get(name).cloned()
        } else {
            None
        };
        let handle = match cached {
            Some(handle) => {
                ctx.stats.bump_plug_reuse();
                handle
            }
            None => {
                let handle = self
                    .host()
                    .find_plug(self.0.handle, name)
                    .map_err(|e| Error::from_host(format!("{}.{name}", self.label()), e))?;
                if ctx.config.caching() {
                    self.0
                        .state
                        .borrow_mut()
                        .plugs
                        .insert(name.to_string(), handle.clone());
                }
                handle
            }
        };

        if let Some(started) = started {
            let elapsed = started.elapsed();
            log::trace!("Found {}.{} in {:?}", self.label(), name, elapsed);
            ctx.stats.record_timing(elapsed);
        }
        Ok(Plug::new(self.clone(), handle, None, Some(name.to_string())))
    }

    /// Plug reading and writing in `unit`
    pub fn plug_in(&self, name: &str, unit: Unit) -> Result<Plug> {
        Ok(self.plug(name)?.with_unit(unit))
    }

    /// Read an attribute
    pub fn get(&self, name: &str) -> Result<Value> {
        self.plug(name)?.read()
    }

    /// Last value read or written through `name` in `unit`, reading
    /// from the host only when nothing is cached
    pub fn get_cached(&self, name: &str, unit: Option<Unit>) -> Result<Value> {
        self.guard()?;
        if let Some(value) = self.recall(name, unit) {
            return Ok(value);
        }
        let mut plug = self.plug(name)?;
        if let Some(unit) = unit {
            plug = plug.with_unit(unit);
        }
        plug.read()
    }

    /// Write an attribute
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.plug(name)?.write(value)
    }

    /// Write several attributes, stopping at the first failure
    pub fn update<'a>(&self, values: impl IntoIterator<Item = (&'a str, Value)>) -> Result<()> {
        for (name, value) in values {
            self.set(name, value)?;
        }
        Ok(())
    }

    pub fn has_attr(&self, name: &str) -> Result<bool> {
        self.guard()?;
        let found = self
            .host()
            .find_attribute(self.0.handle, name)
            .map_err(|e| self.fail(e))?;
        Ok(found.is_some())
    }

    /// Add a dynamic attribute right away
    pub fn add_attr(&self, spec: AttrSpec) -> Result<Plug> {
        let name = spec.name.clone();
        let mut modifier = Modifier::new(self.ctx().clone(), ModifierOptions::immediate());
        modifier.add_attr(self, spec)?;
        modifier.commit()?;
        self.plug(&name)
    }

    /// Remove a dynamic attribute right away
    pub fn delete_attr(&self, name: &str) -> Result<()> {
        let mut modifier = Modifier::new(self.ctx().clone(), ModifierOptions::immediate());
        modifier.delete_attr(self, name)?;
        modifier.commit()?;
        self.clear();
        Ok(())
    }

    /// Rename right away
    pub fn rename(&self, name: &str) -> Result<()> {
        let mut modifier = Modifier::new(self.ctx().clone(), ModifierOptions::immediate());
        modifier.rename(self, name)?;
        modifier.commit()?;
        self.path()?;
        Ok(())
    }

    /// Forget cached plugs and values
    pub fn clear(&self) {
        *self.0.state.borrow_mut() = Transient::default();
    }

    pub(crate) fn remember(&self, key: &str, unit: Option<Unit>, value: Value) {
        if self.0.ctx.config.caching() {
            self.0
                .state
                .borrow_mut()
                .values
                .insert((key.to_string(), unit), value);
        }
    }

    pub(crate) fn recall(&self, key: &str, unit: Option<Unit>) -> Option<Value> {
        self.0
            .state
            .borrow()
            .values
            .get(&(key.to_string(), unit))
            .cloned()
    }

    /// Every readable top-level attribute with its current value
    pub fn dump(&self) -> Result<Vec<(String, Value)>> {
        self.guard()?;
        let attrs = self.host().attributes(self.0.handle).map_err(|e| self.fail(e))?;
        let mut out = Vec::with_capacity(attrs.len());
        for attr in attrs {
            let info = self.host().attribute(self.0.handle, attr).map_err(|e| self.fail(e))?;
            match self.plug(&info.name).and_then(|plug| plug.read()) {
                Ok(value) => out.push((info.name, value)),
                Err(e) => log::trace!("Skipped {}.{} in dump: {}", self.label(), info.name, e),
            }
        }
        Ok(out)
    }

    /// [`Node::dump`] as a JSON object
    pub fn dumps(&self) -> Result<String> {
        let mut map = serde_json::Map::new();
        for (name, value) in self.dump()? {
            let value = serde_json::to_value(&value)
                .map_err(|e| Error::Type(format!("{}.{name} cannot be serialized: {e}", self.label())))?;
            map.insert(name, value);
        }
        serde_json::to_string_pretty(&map).map_err(|e| Error::Type(format!("{}: {e}", self.label())))
    }

    /// Connections touching this node as `(source, destination)`.
    /// `source` keeps incoming ones, `destination` outgoing ones.
    pub fn connections(&self, source: bool, destination: bool) -> Result<Vec<(Plug, Plug)>> {
        self.guard()?;
        let connections = self
            .host()
            .connections(self.0.handle)
            .map_err(|e| self.fail(e))?;

        let mut out = Vec::new();
        for (src, dst) in connections {
            let incoming = dst.node == self.0.handle;
            let outgoing = src.node == self.0.handle;
            if !((source && incoming) || (destination && outgoing)) {
                continue;
            }
            let src_node = registry::resolve(self.ctx(), src.node)?;
            let dst_node = registry::resolve(self.ctx(), dst.node)?;
            out.push((Plug::new(src_node, src, None, None), Plug::new(dst_node, dst, None, None)));
        }
        Ok(out)
    }

    // --- hooks -----------------------------------------------------------

    /// Run `hook` once the host destroys the node
    pub fn on_destroyed(&self, hook: impl Fn(&Node) + 'static) {
        self.0.destroyed_hooks.borrow_mut().push(Rc::new(hook));
    }

    /// Run `hook` whenever the node leaves the graph
    pub fn on_removed(&self, hook: impl Fn(&Node) + 'static) {
        self.0.removed_hooks.borrow_mut().push(Rc::new(hook));
    }

    // --- flavours --------------------------------------------------------

    pub fn as_dag(&self) -> Option<DagNode> {
        (self.0.kind == NodeKind::Dag).then(|| DagNode::new(self.clone()))
    }

    pub fn as_set(&self) -> Option<ObjectSet> {
        (self.0.kind == NodeKind::ObjectSet).then(|| ObjectSet::new(self.clone()))
    }

    pub fn as_curve(&self) -> Option<AnimCurve> {
        (self.0.kind == NodeKind::AnimCurve).then(|| AnimCurve::new(self.clone()))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("path", &*self.0.path.borrow())
            .field("handle", &self.0.handle)
            .field("kind", &self.0.kind)
            .field("destroyed", &self.0.destroyed.get())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.path.borrow())
    }
}
