//! Identity cache of node wrappers
//!
//! Maps the host's stable hash of a node to the one wrapper handed out
//! for it. Entries are weak: the registry never keeps a wrapper alive on
//! its own, and a wrapper whose last reference goes away is rebuilt on
//! the next resolution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Instant;

use void_host::{Capability, NodeHandle};

use crate::error::{Error, Result};
use crate::node::{Node, NodeData, NodeKind};
use crate::session::Context;

/// Wrapper kinds by capability, most specific first
const PROBES: &[(Capability, NodeKind)] = &[
    (Capability::Dag, NodeKind::Dag),
    (Capability::Set, NodeKind::ObjectSet),
    (Capability::AnimCurve, NodeKind::AnimCurve),
];

#[derive(Default)]
pub struct Registry {
    nodes: RefCell<HashMap<u64, Weak<NodeData>>>,
}

impl Registry {
    /// Live, non-destroyed wrapper registered under `hash`
    pub fn get(&self, hash: u64) -> Option<Node> {
        let data = self.nodes.borrow().get(&hash)?.upgrade()?;
        if data.is_destroyed() {
            return None;
        }
        Some(Node::from_data(data))
    }

    pub fn insert(&self, hash: u64, node: &Node) {
        self.nodes.borrow_mut().insert(hash, node.downgrade());
    }

    /// Drop the entry for `hash` if it still belongs to `data`
    pub(crate) fn evict(&self, hash: u64, data: *const NodeData) {
        match self.nodes.try_borrow_mut() {
            Ok(mut nodes) => {
                if nodes.get(&hash).is_some_and(|weak| Weak::as_ptr(weak) == data) {
                    nodes.remove(&hash);
                }
            }
            Err(_) => log::warn!("Registry busy, entry {:x} left to expire", hash),
        }
    }

    /// Number of entries, including ones whose wrapper was dropped
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every wrapper
    pub fn clear(&self) {
        let drained: Vec<_> = self.nodes.borrow_mut().drain().collect();
        log::debug!("Cleared {} registry entries", drained.len());
    }
}

/// Return the wrapper for `handle`, building it on first sight
pub(crate) fn resolve(ctx: &Rc<Context>, handle: NodeHandle) -> Result<Node> {
    let started = ctx.config.timings.then(Instant::now);

    if !ctx.host.is_valid(handle) {
        return Err(Error::Existence(format!("{handle:?} does not refer to a live node")));
    }
    let hash = ctx
        .host
        .hash_code(handle)
        .map_err(|e| Error::from_host(format!("{handle:?}"), e))?;

    if ctx.config.caching() {
        if let Some(node) = ctx.registry.get(hash) {
            if node.handle() == handle {
                node.refresh();
                ctx.stats.bump_node_reuse();
                return Ok(node);
            }
            log::debug!("Registry entry {:x} holds a stale handle, rebuilding", hash);
        }
    }

    let mut kind = NodeKind::Dg;
    for (capability, candidate) in PROBES {
        if ctx
            .host
            .has_capability(handle, *capability)
            .map_err(|e| Error::from_host(format!("{handle:?}"), e))?
        {
            kind = *candidate;
            break;
        }
    }

    let node = Node::construct(ctx, handle, hash, kind)?;
    if ctx.config.caching() {
        ctx.registry.insert(hash, &node);
    }
    ctx.stats.bump_node_init();

    if let Some(started) = started {
        let elapsed = started.elapsed();
        log::trace!("Resolved {:?} as {:?} in {:?}", handle, kind, elapsed);
        ctx.stats.record_timing(elapsed);
    }
    Ok(node)
}

/// Registered wrapper for a hash, without asking the host
pub(crate) fn from_hash(ctx: &Rc<Context>, hash: u64) -> Option<Node> {
    ctx.registry.get(hash)
}

/// Stable hash of a node without touching the registry
pub(crate) fn hash_of(ctx: &Rc<Context>, handle: NodeHandle) -> Result<u64> {
    ctx.host
        .hash_code(handle)
        .map_err(|e| Error::from_host(format!("{handle:?}"), e))
}
