//! The single access point of the proxy
//!
//! A [`Session`] owns everything the proxy keeps between calls: the
//! identity registry, the undo bridge, counters and configuration. Use
//! one per host. Tests create a fresh one per case.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use void_host::{Host, NodeHandle};

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::modifier::{Modifier, ModifierOptions};
use crate::node::Node;
use crate::registry::{self, Registry};
use crate::undo::UndoBridge;

/// Cache effectiveness counters
#[derive(Debug, Default)]
pub struct Stats {
    node_init: Cell<u64>,
    node_reuse: Cell<u64>,
    plug_reuse: Cell<u64>,
    last_timing: Cell<Option<Duration>>,
}

impl Stats {
    /// Wrappers constructed
    pub fn node_init(&self) -> u64 {
        self.node_init.get()
    }

    /// Resolutions served from the registry
    pub fn node_reuse(&self) -> u64 {
        self.node_reuse.get()
    }

    /// Plug lookups served from a node's cache
    pub fn plug_reuse(&self) -> u64 {
        self.plug_reuse.get()
    }

    /// Duration of the last timed resolution or plug lookup
    pub fn last_timing(&self) -> Option<Duration> {
        self.last_timing.get()
    }

    pub(crate) fn bump_node_init(&self) {
        self.node_init.set(self.node_init.get() + 1);
    }

    pub(crate) fn bump_node_reuse(&self) {
        self.node_reuse.set(self.node_reuse.get() + 1);
    }

    pub(crate) fn bump_plug_reuse(&self) {
        self.plug_reuse.set(self.plug_reuse.get() + 1);
    }

    pub(crate) fn record_timing(&self, elapsed: Duration) {
        self.last_timing.set(Some(elapsed));
    }

    pub fn reset(&self) {
        self.node_init.set(0);
        self.node_reuse.set(0);
        self.plug_reuse.set(0);
        self.last_timing.set(None);
    }
}

/// State shared by every wrapper of one session
pub(crate) struct Context {
    pub host: Rc<dyn Host>,
    pub config: ProxyConfig,
    pub registry: Registry,
    pub stats: Stats,
    pub bridge: UndoBridge,
}

pub struct Session {
    ctx: Rc<Context>,
}

impl Session {
    /// Session configured from the environment
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self::with_config(host, ProxyConfig::from_env())
    }

    pub fn with_config(host: Rc<dyn Host>, config: ProxyConfig) -> Self {
        let bridge = UndoBridge::new(config.undo_identity.as_deref());
        log::debug!("Proxy session created, undo command '{}'", bridge.command_name());
        Self {
            ctx: Rc::new(Context {
                host,
                config,
                registry: Registry::default(),
                stats: Stats::default(),
                bridge,
            }),
        }
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.ctx.host
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.ctx.config
    }

    pub fn stats(&self) -> &Stats {
        &self.ctx.stats
    }

    pub fn undo_bridge(&self) -> &UndoBridge {
        &self.ctx.bridge
    }

    /// Wrapper for a native handle
    pub fn resolve(&self, handle: NodeHandle) -> Result<Node> {
        registry::resolve(&self.ctx, handle)
    }

    /// Wrapper for the first node matching a name or path
    pub fn encode(&self, path: &str) -> Result<Node> {
        let handle = self
            .ctx
            .host
            .lookup(path)
            .into_iter()
            .next()
            .ok_or_else(|| Error::Existence(format!("no node matches '{path}'")))?;
        self.resolve(handle)
    }

    /// Like [`Session::encode`], failing when the path is ambiguous
    pub fn encode_unique(&self, path: &str) -> Result<Node> {
        let matches = self.ctx.host.lookup(path);
        match matches.as_slice() {
            [] => Err(Error::Existence(format!("no node matches '{path}'"))),
            [handle] => self.resolve(*handle),
            _ => Err(Error::Existence(format!(
                "{} nodes match '{path}', expected exactly one",
                matches.len()
            ))),
        }
    }

    /// Every node matching a name or path
    pub fn ls(&self, path: &str) -> Result<Vec<Node>> {
        self.ctx
            .host
            .lookup(path)
            .into_iter()
            .map(|handle| self.resolve(handle))
            .collect()
    }

    /// Registered wrapper for a stable hash
    pub fn from_hash(&self, hash: u64) -> Option<Node> {
        registry::from_hash(&self.ctx, hash)
    }

    /// Registered wrapper for a hash as printed by [`Node::hex`]
    pub fn from_hex(&self, hex: &str) -> Option<Node> {
        let digits = hex.trim_start_matches("0x");
        u64::from_str_radix(digits, 16).ok().and_then(|hash| self.from_hash(hash))
    }

    /// Stable hash of a handle, bypassing the registry
    pub fn hash_of(&self, handle: NodeHandle) -> Result<u64> {
        registry::hash_of(&self.ctx, handle)
    }

    /// Number of registered wrappers
    pub fn registry_len(&self) -> usize {
        self.ctx.registry.len()
    }

    pub fn modifier(&self) -> Modifier {
        Modifier::new(self.ctx.clone(), ModifierOptions::default())
    }

    pub fn modifier_with(&self, options: ModifierOptions) -> Modifier {
        Modifier::new(self.ctx.clone(), options)
    }

    /// Run `edit` against a fresh transaction and commit it.
    /// Nothing is committed when `edit` fails.
    pub fn modify<T>(&self, edit: impl FnOnce(&mut Modifier) -> Result<T>) -> Result<T> {
        self.modify_with(ModifierOptions::default(), edit)
    }

    pub fn modify_with<T>(&self, options: ModifierOptions, edit: impl FnOnce(&mut Modifier) -> Result<T>) -> Result<T> {
        let mut modifier = self.modifier_with(options);
        let result = edit(&mut modifier)?;
        modifier.commit()?;
        Ok(result)
    }

    /// Create a single node in its own undoable transaction
    pub fn create_node(&self, type_name: &str, name: Option<&str>, parent: Option<&Node>) -> Result<Node> {
        self.modify(|m| m.create_node(type_name, name, parent))
    }

    /// Forget every registered wrapper
    pub fn clear(&self) {
        self.ctx.registry.clear();
    }

    /// Release everything this session holds in the host
    pub fn teardown(&self) -> Result<()> {
        self.ctx.registry.clear();
        self.ctx.stats.reset();
        self.ctx.bridge.uninstall(&*self.ctx.host)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.ctx.config)
            .field("registered", &self.ctx.registry.len())
            .field("bridge", &self.ctx.bridge)
            .finish()
    }
}
