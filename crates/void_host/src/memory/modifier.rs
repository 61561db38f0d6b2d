//! Deferred edit buffer of the in-memory host

use std::cell::RefCell;
use std::rc::Rc;

use crate::attribute::{AttrId, AttrSpec, PlugHandle, RawValue};
use crate::error::HostResult;
use crate::handle::NodeHandle;
use crate::host::NativeModifier;

use super::fire;
use super::scene::{Connection, Fired, PlugStore, Removal, Scene};

type Snapshot = Vec<(NodeHandle, PlugStore)>;

/// One queued edit plus whatever its inverse needs
enum Op {
    Create { node: NodeHandle, parent: Option<NodeHandle> },
    Delete { node: NodeHandle, removal: Removal },
    Rename { node: NodeHandle, name: String, previous: Option<String> },
    Reparent { node: NodeHandle, parent: Option<NodeHandle>, previous: Option<Option<NodeHandle>> },
    AddAttribute { node: NodeHandle, spec: AttrSpec, added: Vec<AttrId> },
    RemoveAttribute { node: NodeHandle, attr: AttrId, removed: Vec<AttrId>, connections: Vec<Connection> },
    SetValue { plug: PlugHandle, value: RawValue, previous: Snapshot },
    Connect { src: PlugHandle, dst: PlugHandle, previous: Snapshot },
    Disconnect { src: PlugHandle, dst: PlugHandle, previous: Snapshot },
}

impl Op {
    fn apply(&mut self, scene: &mut Scene) -> HostResult<Fired> {
        match self {
            Op::Create { node, parent } => {
                scene.insert(*node, *parent)?;
                log::debug!("Created {:?}", node);
            }
            Op::Delete { node, removal } => {
                let (taken, fired) = scene.remove(*node)?;
                *removal = taken;
                log::debug!("Deleted {:?}", node);
                return Ok(fired);
            }
            Op::Rename { node, name, previous } => {
                *previous = Some(scene.rename(*node, name)?);
            }
            Op::Reparent { node, parent, previous } => {
                *previous = Some(scene.reparent(*node, *parent)?);
            }
            Op::AddAttribute { node, spec, added } => {
                if added.is_empty() {
                    *added = scene.add_attribute(*node, spec.clone())?;
                } else {
                    scene.set_attrs_removed(*node, added, false)?;
                }
            }
            Op::RemoveAttribute { node, attr, removed, connections } => {
                let (ids, dropped) = scene.remove_attribute(*node, *attr)?;
                *removed = ids;
                *connections = dropped;
            }
            Op::SetValue { plug, value, previous } => {
                *previous = scene.snapshot(&[plug.node]);
                scene.write(plug, value.clone())?;
            }
            Op::Connect { src, dst, previous } => {
                *previous = scene.snapshot(&[src.node, dst.node]);
                scene.connect(src, dst)?;
            }
            Op::Disconnect { src, dst, previous } => {
                *previous = scene.snapshot(&[src.node, dst.node]);
                scene.disconnect(src, dst)?;
            }
        }
        Ok(Vec::new())
    }

    fn revert(&mut self, scene: &mut Scene) -> HostResult<Fired> {
        match self {
            Op::Create { node, .. } => {
                let (_, fired) = scene.remove(*node)?;
                return Ok(fired);
            }
            Op::Delete { removal, .. } => scene.restore(removal)?,
            Op::Rename { node, previous, .. } => {
                if let Some(previous) = previous.take() {
                    scene.rename(*node, &previous)?;
                }
            }
            Op::Reparent { node, previous, .. } => {
                if let Some(previous) = previous.take() {
                    scene.reparent(*node, previous)?;
                }
            }
            Op::AddAttribute { node, added, .. } => scene.set_attrs_removed(*node, added, true)?,
            Op::RemoveAttribute { node, removed, connections, .. } => {
                scene.set_attrs_removed(*node, removed, false)?;
                scene.add_connections(connections);
            }
            Op::SetValue { previous, .. } => scene.restore_stores(previous)?,
            Op::Connect { src, dst, previous } => {
                scene.remove_connections(&[(src.clone(), dst.clone())]);
                scene.restore_stores(previous)?;
            }
            Op::Disconnect { src, dst, previous } => {
                scene.add_connections(&[(src.clone(), dst.clone())]);
                scene.restore_stores(previous)?;
            }
        }
        Ok(Vec::new())
    }
}

/// [`NativeModifier`] over a shared in-memory scene
pub struct MemoryModifier {
    scene: Rc<RefCell<Scene>>,
    ops: Vec<Op>,
    applied: usize,
}

impl MemoryModifier {
    pub(crate) fn new(scene: Rc<RefCell<Scene>>) -> Self {
        Self {
            scene,
            ops: Vec::new(),
            applied: 0,
        }
    }

    fn push(&mut self, op: Op) -> HostResult<()> {
        self.ops.push(op);
        Ok(())
    }

    fn check_node(&self, node: NodeHandle) -> HostResult<()> {
        self.scene.borrow().name(node).map(|_| ())
    }
}

impl NativeModifier for MemoryModifier {
    fn create_node(&mut self, type_name: &str, parent: Option<NodeHandle>) -> HostResult<NodeHandle> {
        let node = self.scene.borrow_mut().create_record(type_name)?;
        self.push(Op::Create { node, parent })?;
        Ok(node)
    }

    fn delete_node(&mut self, node: NodeHandle) -> HostResult<()> {
        self.check_node(node)?;
        self.push(Op::Delete {
            node,
            removal: Removal::default(),
        })
    }

    fn rename_node(&mut self, node: NodeHandle, name: &str) -> HostResult<()> {
        self.check_node(node)?;
        self.push(Op::Rename {
            node,
            name: name.to_string(),
            previous: None,
        })
    }

    fn reparent_node(&mut self, node: NodeHandle, parent: Option<NodeHandle>) -> HostResult<()> {
        self.check_node(node)?;
        self.push(Op::Reparent {
            node,
            parent,
            previous: None,
        })
    }

    fn add_attribute(&mut self, node: NodeHandle, spec: AttrSpec) -> HostResult<()> {
        self.check_node(node)?;
        self.push(Op::AddAttribute {
            node,
            spec,
            added: Vec::new(),
        })
    }

    fn remove_attribute(&mut self, node: NodeHandle, attr: AttrId) -> HostResult<()> {
        self.check_node(node)?;
        self.push(Op::RemoveAttribute {
            node,
            attr,
            removed: Vec::new(),
            connections: Vec::new(),
        })
    }

    fn set_value(&mut self, plug: PlugHandle, value: RawValue) -> HostResult<()> {
        self.check_node(plug.node)?;
        self.push(Op::SetValue {
            plug,
            value,
            previous: Vec::new(),
        })
    }

    fn connect(&mut self, src: PlugHandle, dst: PlugHandle) -> HostResult<()> {
        self.check_node(src.node)?;
        self.check_node(dst.node)?;
        self.push(Op::Connect {
            src,
            dst,
            previous: Vec::new(),
        })
    }

    fn disconnect(&mut self, src: PlugHandle, dst: PlugHandle) -> HostResult<()> {
        self.check_node(src.node)?;
        self.check_node(dst.node)?;
        self.push(Op::Disconnect {
            src,
            dst,
            previous: Vec::new(),
        })
    }

    fn do_it(&mut self) -> HostResult<()> {
        let mut fired = Vec::new();
        let result = {
            let mut scene = self.scene.borrow_mut();
            let mut result = Ok(());
            while self.applied < self.ops.len() {
                let applied = scene
                    .consume_op()
                    .and_then(|()| self.ops[self.applied].apply(&mut scene));
                match applied {
                    Ok(events) => {
                        fired.extend(events);
                        self.applied += 1;
                    }
                    Err(e) => {
                        log::debug!("Modifier stopped at operation {}: {}", self.applied, e);
                        result = Err(e);
                        break;
                    }
                }
            }
            result
        };
        fire(fired);
        result
    }

    fn undo_it(&mut self) -> HostResult<()> {
        let mut fired = Vec::new();
        let result = {
            let mut scene = self.scene.borrow_mut();
            let mut result = Ok(());
            while self.applied > 0 {
                match self.ops[self.applied - 1].revert(&mut scene) {
                    Ok(events) => {
                        fired.extend(events);
                        self.applied -= 1;
                    }
                    Err(e) => {
                        log::error!("Failed to revert operation {}: {}", self.applied - 1, e);
                        result = Err(e);
                        break;
                    }
                }
            }
            result
        };
        fire(fired);
        result
    }

    fn len(&self) -> usize {
        self.ops.len()
    }
}
