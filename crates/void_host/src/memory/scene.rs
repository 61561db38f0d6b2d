//! Scene state of the in-memory host
//!
//! Values are pulled: reading a plug follows its incoming connection,
//! or the incoming connection of the nearest connected ancestor, all the
//! way up to a stored value, a default, or an animation curve.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::attribute::{AttrId, AttrInfo, AttrKind, AttrSpec, DisconnectBehavior, PlugHandle, RawValue};
use crate::error::{HostError, HostResult};
use crate::handle::{HandleMap, NodeHandle};
use crate::host::{CallbackId, Capability, NodeCallback};

use super::types;

pub(crate) type PlugKey = (AttrId, Vec<u32>);
pub(crate) type Connection = (PlugHandle, PlugHandle);
pub(crate) type Fired = Vec<(NodeHandle, NodeCallback)>;

const MAX_EVALUATION_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackKind {
    Removed,
    Destroyed,
}

struct CallbackEntry {
    node: NodeHandle,
    kind: CallbackKind,
    callback: NodeCallback,
}

#[derive(Debug, Clone)]
pub(crate) struct AttrDef {
    pub name: String,
    pub short_name: String,
    pub kind: AttrKind,
    pub array: bool,
    pub keyable: bool,
    pub dynamic: bool,
    pub default: RawValue,
    pub disconnect: DisconnectBehavior,
    pub enum_fields: Vec<(String, i64)>,
    pub parent: Option<AttrId>,
    pub children: Vec<AttrId>,
    pub removed: bool,
}

/// Per-node plug state, cloned wholesale for undo
#[derive(Debug, Clone, Default)]
pub(crate) struct PlugStore {
    values: HashMap<PlugKey, RawValue>,
    elements: HashMap<PlugKey, BTreeSet<u32>>,
    locked: HashSet<PlugKey>,
    keyable: HashMap<PlugKey, bool>,
}

pub(crate) struct NodeRecord {
    serial: u64,
    type_name: String,
    capabilities: Vec<Capability>,
    name: String,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    in_graph: bool,
    attrs: Vec<AttrDef>,
    store: PlugStore,
    members: Vec<NodeHandle>,
    keys: Vec<(f64, f64)>,
}

/// Nodes and connections taken out of the graph by a removal
#[derive(Debug, Clone, Default)]
pub(crate) struct Removal {
    pub nodes: Vec<NodeHandle>,
    pub connections: Vec<Connection>,
}

impl NodeRecord {
    fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn def(&self, attr: AttrId) -> HostResult<&AttrDef> {
        self.attrs
            .get(attr as usize)
            .filter(|def| !def.removed)
            .ok_or_else(|| HostError::AttributeNotFound(format!("{}.#{attr}", self.name)))
    }

    /// Attribute chain from the top-level attribute down to `attr`
    fn ancestry(&self, attr: AttrId) -> Vec<AttrId> {
        let mut chain = vec![attr];
        let mut current = attr;
        while let Some(parent) = self.attrs.get(current as usize).and_then(|d| d.parent) {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Number of array attributes from the top down to and including `attr`
    fn array_depth(&self, attr: AttrId) -> usize {
        self.ancestry(attr)
            .into_iter()
            .filter(|id| self.attrs[*id as usize].array)
            .count()
    }

    fn live_children(&self, attr: AttrId) -> Vec<AttrId> {
        self.attrs[attr as usize]
            .children
            .iter()
            .copied()
            .filter(|c| !self.attrs[*c as usize].removed)
            .collect()
    }

    fn is_same_or_descendant(&self, attr: AttrId, of: AttrId) -> bool {
        self.ancestry(attr).contains(&of)
    }

    fn find_attr(&self, name: &str) -> Option<AttrId> {
        self.attrs
            .iter()
            .position(|d| !d.removed && (d.name == name || d.short_name == name))
            .map(|i| i as AttrId)
    }

    fn info(&self, id: AttrId) -> HostResult<AttrInfo> {
        let def = self.def(id)?;
        Ok(AttrInfo {
            id,
            name: def.name.clone(),
            short_name: def.short_name.clone(),
            kind: def.kind,
            array: def.array,
            keyable: def.keyable,
            dynamic: def.dynamic,
            disconnect: def.disconnect,
            parent: def.parent,
            children: self.live_children(id),
            enum_fields: def.enum_fields.clone(),
        })
    }
}

fn push_spec(attrs: &mut Vec<AttrDef>, spec: AttrSpec, parent: Option<AttrId>, dynamic: bool) -> AttrId {
    let id = attrs.len() as AttrId;
    let short_name = spec.short_name.clone().unwrap_or_else(|| spec.name.clone());
    attrs.push(AttrDef {
        name: spec.name,
        short_name,
        kind: spec.kind,
        array: spec.array,
        keyable: spec.keyable,
        dynamic,
        default: spec.default,
        disconnect: spec.disconnect,
        enum_fields: spec.enum_fields,
        parent,
        children: Vec::new(),
        removed: false,
    });
    for child in spec.children {
        let child_id = push_spec(attrs, child, Some(id), dynamic);
        attrs[id as usize].children.push(child_id);
    }
    id
}

fn spec_names(spec: &AttrSpec, out: &mut Vec<String>) {
    out.push(spec.name.clone());
    if let Some(short) = &spec.short_name {
        out.push(short.clone());
    }
    for child in &spec.children {
        spec_names(child, out);
    }
}

fn validate_name(name: &str) -> HostResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ':');
    if valid {
        Ok(())
    } else {
        Err(HostError::InvalidName(name.to_string()))
    }
}

/// Parse `name` or `name[3]`
fn parse_segment(segment: &str) -> HostResult<(&str, Option<u32>)> {
    match segment.split_once('[') {
        None => Ok((segment, None)),
        Some((name, rest)) => {
            let index = rest
                .strip_suffix(']')
                .and_then(|i| i.parse::<u32>().ok())
                .ok_or_else(|| HostError::InvalidPlug(format!("malformed index in '{segment}'")))?;
            Ok((name, Some(index)))
        }
    }
}

/// One step from a plug down towards a descendant plug
enum Step {
    Child(usize),
    Element(u32),
}

fn interpolate(keys: &[(f64, f64)], time: f64) -> f64 {
    match keys {
        [] => 0.0,
        [(_, only)] => *only,
        _ => {
            let (first_time, first_value) = keys[0];
            let (last_time, last_value) = keys[keys.len() - 1];
            if time <= first_time {
                return first_value;
            }
            if time >= last_time {
                return last_value;
            }
            for pair in keys.windows(2) {
                let ((t0, v0), (t1, v1)) = (pair[0], pair[1]);
                if time >= t0 && time <= t1 {
                    let span = t1 - t0;
                    if span <= f64::EPSILON {
                        return v1;
                    }
                    return v0 + (v1 - v0) * (time - t0) / span;
                }
            }
            last_value
        }
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[derive(Default)]
pub(crate) struct Scene {
    nodes: HandleMap<NodeRecord>,
    connections: Vec<Connection>,
    callbacks: BTreeMap<CallbackId, CallbackEntry>,
    next_callback: CallbackId,
    next_serial: u64,
    pub time: f64,
    pub fail_reads: bool,
    pub reads: u64,
    /// Modifier operations allowed to apply before the next one fails
    pub op_budget: Option<usize>,
}

impl Scene {
    /// Charge one modifier operation against the injected budget
    pub fn consume_op(&mut self) -> HostResult<()> {
        match self.op_budget {
            Some(0) => Err(HostError::Injected("operation budget exhausted".into())),
            Some(ref mut left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    // --- nodes -----------------------------------------------------------

    fn node(&self, node: NodeHandle) -> HostResult<&NodeRecord> {
        self.nodes.get(node).ok_or(HostError::InvalidHandle(node))
    }

    fn node_mut(&mut self, node: NodeHandle) -> HostResult<&mut NodeRecord> {
        self.nodes.get_mut(node).ok_or(HostError::InvalidHandle(node))
    }

    pub fn is_valid(&self, node: NodeHandle) -> bool {
        self.nodes.contains(node)
    }

    pub fn live_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn in_graph(&self, node: NodeHandle) -> HostResult<bool> {
        Ok(self.node(node)?.in_graph)
    }

    pub fn hash_code(&self, node: NodeHandle) -> HostResult<u64> {
        Ok(splitmix64(self.node(node)?.serial))
    }

    pub fn has_capability(&self, node: NodeHandle, capability: Capability) -> HostResult<bool> {
        Ok(self.node(node)?.has(capability))
    }

    pub fn type_name(&self, node: NodeHandle) -> HostResult<String> {
        Ok(self.node(node)?.type_name.clone())
    }

    pub fn name(&self, node: NodeHandle) -> HostResult<String> {
        Ok(self.node(node)?.name.clone())
    }

    /// Allocate a node outside the graph
    pub fn create_record(&mut self, type_name: &str) -> HostResult<NodeHandle> {
        let node_type = types::builtin(type_name).ok_or_else(|| HostError::UnknownNodeType(type_name.to_string()))?;
        self.next_serial += 1;

        let mut attrs = Vec::new();
        for spec in node_type.attrs {
            push_spec(&mut attrs, spec, None, false);
        }

        Ok(self.nodes.insert(NodeRecord {
            serial: self.next_serial,
            type_name: type_name.to_string(),
            capabilities: node_type.capabilities,
            name: format!("{type_name}1"),
            parent: None,
            children: Vec::new(),
            in_graph: false,
            attrs,
            store: PlugStore::default(),
            members: Vec::new(),
            keys: Vec::new(),
        }))
    }

    /// Bring a created node into the graph
    pub fn insert(&mut self, node: NodeHandle, parent: Option<NodeHandle>) -> HostResult<()> {
        let is_dag = self.node(node)?.has(Capability::Dag);
        if let Some(parent) = parent {
            let record = self.node(parent)?;
            if !is_dag || !record.has(Capability::Dag) {
                return Err(HostError::InvalidHierarchy("only DAG nodes can be parented".into()));
            }
            if !record.in_graph {
                return Err(HostError::InvalidHierarchy(format!("parent '{}' is not in the graph", record.name)));
            }
        }

        let desired = self.node(node)?.name.clone();
        let name = self.unique_name(&desired, node);
        let record = self.node_mut(node)?;
        record.name = name;
        record.in_graph = true;
        record.parent = parent;

        if let Some(parent) = parent {
            let record = self.node_mut(parent)?;
            if !record.children.contains(&node) {
                record.children.push(node);
            }
        }
        Ok(())
    }

    fn collect_descendants(&self, node: NodeHandle, out: &mut Vec<NodeHandle>) {
        if let Some(record) = self.nodes.get(node) {
            for child in &record.children {
                if self.nodes.get(*child).is_some_and(|c| c.in_graph) {
                    out.push(*child);
                    self.collect_descendants(*child, out);
                }
            }
        }
    }

    /// Take a node and its descendants out of the graph
    pub fn remove(&mut self, node: NodeHandle) -> HostResult<(Removal, Fired)> {
        if !self.node(node)?.in_graph {
            return Ok((Removal::default(), Vec::new()));
        }
        let mut nodes = vec![node];
        self.collect_descendants(node, &mut nodes);

        let mut fired = Vec::new();
        for handle in &nodes {
            self.node_mut(*handle)?.in_graph = false;
            fired.extend(self.callbacks_for(*handle, CallbackKind::Removed));
        }

        let (connections, kept): (Vec<Connection>, Vec<Connection>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|(src, dst)| nodes.contains(&src.node) || nodes.contains(&dst.node));
        self.connections = kept;

        Ok((Removal { nodes, connections }, fired))
    }

    pub fn restore(&mut self, removal: &Removal) -> HostResult<()> {
        for handle in &removal.nodes {
            let desired = self.node(*handle)?.name.clone();
            let name = self.unique_name(&desired, *handle);
            let record = self.node_mut(*handle)?;
            record.name = name;
            record.in_graph = true;
        }
        self.connections.extend(removal.connections.iter().cloned());
        Ok(())
    }

    /// Release a node for good
    pub fn destroy(&mut self, node: NodeHandle) -> Fired {
        let fired = self.callbacks_for(node, CallbackKind::Destroyed);
        self.callbacks.retain(|_, entry| entry.node != node);
        self.connections.retain(|(src, dst)| src.node != node && dst.node != node);
        for (_, record) in self.nodes.iter_mut() {
            record.members.retain(|m| *m != node);
            record.children.retain(|c| *c != node);
            if record.parent == Some(node) {
                record.parent = None;
            }
        }
        self.nodes.remove(node);
        fired
    }

    /// Destroy every node no longer in the graph
    pub fn destroy_orphans(&mut self) -> Fired {
        let orphans: Vec<NodeHandle> = self
            .nodes
            .iter()
            .filter(|(_, record)| !record.in_graph)
            .map(|(handle, _)| handle)
            .collect();
        orphans.into_iter().flat_map(|h| self.destroy(h)).collect()
    }

    pub fn destroy_all(&mut self) -> Fired {
        let fired: Fired = self.nodes.handles().into_iter().flat_map(|h| self.destroy(h)).collect();
        self.connections.clear();
        self.time = 0.0;
        fired
    }

    fn name_taken(&self, name: &str, exclude: NodeHandle) -> bool {
        self.nodes
            .iter()
            .any(|(handle, record)| handle != exclude && record.in_graph && record.name == name)
    }

    fn unique_name(&self, desired: &str, exclude: NodeHandle) -> String {
        if !self.name_taken(desired, exclude) {
            return desired.to_string();
        }
        let base = desired.trim_end_matches(|c: char| c.is_ascii_digit());
        (1u64..)
            .map(|n| format!("{base}{n}"))
            .find(|candidate| !self.name_taken(candidate, exclude))
            .unwrap_or_else(|| desired.to_string())
    }

    /// Returns the previous name
    pub fn rename(&mut self, node: NodeHandle, name: &str) -> HostResult<String> {
        validate_name(name)?;
        let in_graph = self.node(node)?.in_graph;
        let name = if in_graph {
            self.unique_name(name, node)
        } else {
            name.to_string()
        };
        let record = self.node_mut(node)?;
        Ok(std::mem::replace(&mut record.name, name))
    }

    /// Returns the previous parent
    pub fn reparent(&mut self, node: NodeHandle, parent: Option<NodeHandle>) -> HostResult<Option<NodeHandle>> {
        if !self.node(node)?.has(Capability::Dag) {
            return Err(HostError::InvalidHierarchy("only DAG nodes can be parented".into()));
        }
        if let Some(parent) = parent {
            if !self.node(parent)?.has(Capability::Dag) {
                return Err(HostError::InvalidHierarchy("parent is not a DAG node".into()));
            }
            let mut below = vec![node];
            self.collect_descendants(node, &mut below);
            if below.contains(&parent) {
                return Err(HostError::InvalidHierarchy("cannot parent a node under itself".into()));
            }
        }

        let previous = self.node(node)?.parent;
        if let Some(old) = previous {
            self.node_mut(old)?.children.retain(|c| *c != node);
        }
        self.node_mut(node)?.parent = parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(node);
        }
        Ok(previous)
    }

    pub fn parent(&self, node: NodeHandle) -> HostResult<Option<NodeHandle>> {
        Ok(self.node(node)?.parent)
    }

    pub fn children(&self, node: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        Ok(self
            .node(node)?
            .children
            .iter()
            .copied()
            .filter(|c| self.nodes.get(*c).is_some_and(|r| r.in_graph))
            .collect())
    }

    pub fn full_path(&self, node: NodeHandle) -> HostResult<String> {
        let record = self.node(node)?;
        if !record.has(Capability::Dag) {
            return Ok(record.name.clone());
        }
        let mut parts = vec![record.name.clone()];
        let mut current = record.parent;
        while let Some(parent) = current {
            let record = self.node(parent)?;
            parts.push(record.name.clone());
            current = record.parent;
        }
        parts.reverse();
        Ok(format!("|{}", parts.join("|")))
    }

    /// Names are unique across the graph, so the name is always unambiguous
    pub fn partial_path(&self, node: NodeHandle) -> HostResult<String> {
        self.name(node)
    }

    pub fn lookup(&self, path: &str) -> Vec<NodeHandle> {
        let mut matches: Vec<(u64, NodeHandle)> = self
            .nodes
            .iter()
            .filter(|(_, record)| record.in_graph)
            .filter(|(handle, record)| {
                if path.starts_with('|') {
                    self.full_path(*handle).is_ok_and(|p| p == path)
                } else if path.contains('|') {
                    self.full_path(*handle).is_ok_and(|p| p.ends_with(&format!("|{path}")))
                } else {
                    record.name == path
                }
            })
            .map(|(handle, record)| (record.serial, handle))
            .collect();
        matches.sort();
        matches.into_iter().map(|(_, handle)| handle).collect()
    }

    // --- attributes --------------------------------------------------------

    pub fn attributes(&self, node: NodeHandle) -> HostResult<Vec<AttrId>> {
        let record = self.node(node)?;
        Ok(record
            .attrs
            .iter()
            .enumerate()
            .filter(|(_, def)| !def.removed && def.parent.is_none())
            .map(|(id, _)| id as AttrId)
            .collect())
    }

    pub fn attribute(&self, node: NodeHandle, attr: AttrId) -> HostResult<AttrInfo> {
        self.node(node)?.info(attr)
    }

    pub fn find_attribute(&self, node: NodeHandle, name: &str) -> HostResult<Option<AttrId>> {
        Ok(self.node(node)?.find_attr(name))
    }

    /// Returns the ids of the added attribute and its descendants
    pub fn add_attribute(&mut self, node: NodeHandle, spec: AttrSpec) -> HostResult<Vec<AttrId>> {
        let record = self.node_mut(node)?;
        let mut names = Vec::new();
        spec_names(&spec, &mut names);
        if let Some(taken) = names.iter().find(|n| record.find_attr(n).is_some()) {
            return Err(HostError::DuplicateAttribute(taken.clone()));
        }
        let start = record.attrs.len() as AttrId;
        push_spec(&mut record.attrs, spec, None, true);
        Ok((start..record.attrs.len() as AttrId).collect())
    }

    pub fn set_attrs_removed(&mut self, node: NodeHandle, ids: &[AttrId], removed: bool) -> HostResult<()> {
        let record = self.node_mut(node)?;
        for id in ids {
            if let Some(def) = record.attrs.get_mut(*id as usize) {
                def.removed = removed;
            }
        }
        Ok(())
    }

    /// Returns the ids taken away and the connections that went with them
    pub fn remove_attribute(&mut self, node: NodeHandle, attr: AttrId) -> HostResult<(Vec<AttrId>, Vec<Connection>)> {
        let record = self.node(node)?;
        let def = record.def(attr)?;
        if !def.dynamic {
            return Err(HostError::InvalidPlug(format!("'{}' is not a dynamic attribute", def.name)));
        }
        let ids: Vec<AttrId> = (0..record.attrs.len() as AttrId)
            .filter(|id| !record.attrs[*id as usize].removed && record.is_same_or_descendant(*id, attr))
            .collect();

        self.set_attrs_removed(node, &ids, true)?;

        let touches = |plug: &PlugHandle| plug.node == node && ids.contains(&plug.attr);
        let (dropped, kept): (Vec<Connection>, Vec<Connection>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|(src, dst)| touches(src) || touches(dst));
        self.connections = kept;
        Ok((ids, dropped))
    }

    // --- plugs -------------------------------------------------------------

    /// Definition and array depth of a plug's attribute
    fn plug_def(&self, plug: &PlugHandle) -> HostResult<(&NodeRecord, &AttrDef, usize)> {
        let record = self.node(plug.node)?;
        let def = record.def(plug.attr)?;
        let depth = record.array_depth(plug.attr);
        if plug.indices.len() > depth {
            return Err(HostError::InvalidPlug(format!("too many indices for '{}'", def.name)));
        }
        Ok((record, def, depth))
    }

    fn describe(&self, plug: &PlugHandle) -> String {
        let node = self.nodes.get(plug.node).map(|r| r.name.clone()).unwrap_or_default();
        match self.plug_name(plug, true) {
            Ok(name) => format!("{node}.{name}"),
            Err(_) => format!("{node}.#{}", plug.attr),
        }
    }

    pub fn find_plug(&self, node: NodeHandle, path: &str) -> HostResult<PlugHandle> {
        let record = self.node(node)?;
        let mut plug: Option<PlugHandle> = None;

        for segment in path.split('.') {
            let (name, index) = parse_segment(segment)?;
            let attr = match &plug {
                None => record.find_attr(name),
                Some(parent) => record
                    .live_children(parent.attr)
                    .into_iter()
                    .find(|c| {
                        let def = &record.attrs[*c as usize];
                        def.name == name || def.short_name == name
                    }),
            }
            .ok_or_else(|| HostError::AttributeNotFound(path.to_string()))?;

            let indices = plug.map(|p| p.indices).unwrap_or_default();
            let mut next = PlugHandle::with_indices(node, attr, indices);
            if let Some(index) = index {
                let def = &record.attrs[attr as usize];
                if !def.array || next.indices.len() + 1 != record.array_depth(attr) {
                    return Err(HostError::InvalidPlug(format!("'{name}' cannot be indexed here")));
                }
                next.indices.push(index);
            }
            plug = Some(next);
        }

        plug.ok_or_else(|| HostError::AttributeNotFound(path.to_string()))
    }

    pub fn element(&self, plug: &PlugHandle, logical_index: u32) -> HostResult<PlugHandle> {
        if !self.is_array(plug)? {
            return Err(HostError::InvalidPlug(format!("'{}' is not an array", self.describe(plug))));
        }
        let mut indices = plug.indices.clone();
        indices.push(logical_index);
        Ok(PlugHandle::with_indices(plug.node, plug.attr, indices))
    }

    pub fn child(&self, plug: &PlugHandle, index: usize) -> HostResult<PlugHandle> {
        let (record, def, depth) = self.plug_def(plug)?;
        if def.kind != AttrKind::Compound {
            return Err(HostError::InvalidPlug(format!("'{}' is not a compound", def.name)));
        }
        if def.array && plug.indices.len() < depth {
            return Err(HostError::InvalidPlug(format!("'{}' must be indexed before its children", def.name)));
        }
        let child = record
            .live_children(plug.attr)
            .get(index)
            .copied()
            .ok_or_else(|| HostError::InvalidPlug(format!("'{}' has no child {index}", def.name)))?;
        Ok(PlugHandle::with_indices(plug.node, child, plug.indices.clone()))
    }

    pub fn child_count(&self, plug: &PlugHandle) -> HostResult<usize> {
        let (record, def, _) = self.plug_def(plug)?;
        if def.kind == AttrKind::Compound {
            Ok(record.live_children(plug.attr).len())
        } else {
            Ok(0)
        }
    }

    pub fn existing_indices(&self, plug: &PlugHandle) -> HostResult<Vec<u32>> {
        if !self.is_array(plug)? {
            return Err(HostError::InvalidPlug(format!("'{}' is not an array", self.describe(plug))));
        }
        let record = self.node(plug.node)?;
        Ok(record
            .store
            .elements
            .get(&(plug.attr, plug.indices.clone()))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    pub fn plug_kind(&self, plug: &PlugHandle) -> HostResult<AttrKind> {
        Ok(self.plug_def(plug)?.1.kind)
    }

    pub fn is_array(&self, plug: &PlugHandle) -> HostResult<bool> {
        let (_, def, depth) = self.plug_def(plug)?;
        Ok(def.array && plug.indices.len() + 1 == depth)
    }

    pub fn is_compound(&self, plug: &PlugHandle) -> HostResult<bool> {
        Ok(self.plug_def(plug)?.1.kind == AttrKind::Compound)
    }

    pub fn plug_name(&self, plug: &PlugHandle, long: bool) -> HostResult<String> {
        let (record, _, _) = self.plug_def(plug)?;
        let mut parts = Vec::new();
        let mut next_index = 0;
        for id in record.ancestry(plug.attr) {
            let def = &record.attrs[id as usize];
            let mut part = if long { def.name.clone() } else { def.short_name.clone() };
            if def.array {
                if let Some(index) = plug.indices.get(next_index) {
                    part.push_str(&format!("[{index}]"));
                }
                next_index += 1;
            }
            parts.push(part);
        }
        Ok(parts.join("."))
    }

    /// Plug one level up: the array of an element, or the compound of a child
    fn parent_plug(&self, plug: &PlugHandle) -> HostResult<Option<PlugHandle>> {
        let (_, def, depth) = self.plug_def(plug)?;
        if def.array && plug.indices.len() == depth {
            let indices = plug.indices[..depth - 1].to_vec();
            return Ok(Some(PlugHandle::with_indices(plug.node, plug.attr, indices)));
        }
        Ok(def
            .parent
            .map(|parent| PlugHandle::with_indices(plug.node, parent, plug.indices.clone())))
    }

    fn steps_between(&self, ancestor: &PlugHandle, plug: &PlugHandle) -> HostResult<Vec<Step>> {
        let mut steps = Vec::new();
        let mut current = plug.clone();
        while current != *ancestor {
            let parent = self
                .parent_plug(&current)?
                .ok_or_else(|| HostError::InvalidPlug("plug is not below its ancestor".into()))?;
            if parent.attr == current.attr {
                steps.push(Step::Element(current.indices[current.indices.len() - 1]));
            } else {
                let record = self.node(current.node)?;
                let position = record
                    .live_children(parent.attr)
                    .iter()
                    .position(|c| *c == current.attr)
                    .ok_or_else(|| HostError::InvalidPlug("orphaned child attribute".into()))?;
                steps.push(Step::Child(position));
            }
            current = parent;
        }
        steps.reverse();
        Ok(steps)
    }

    fn follow(&self, plug: &PlugHandle, steps: &[Step]) -> HostResult<PlugHandle> {
        let mut current = plug.clone();
        for step in steps {
            current = match step {
                Step::Child(position) => self.child(&current, *position)?,
                Step::Element(index) => {
                    let mut indices = current.indices.clone();
                    indices.push(*index);
                    PlugHandle::with_indices(current.node, current.attr, indices)
                }
            };
        }
        Ok(current)
    }

    fn incoming(&self, plug: &PlugHandle) -> Option<&PlugHandle> {
        self.connections.iter().find(|(_, dst)| dst == plug).map(|(src, _)| src)
    }

    /// Source driving this plug, directly or through a connected ancestor
    fn driver(&self, plug: &PlugHandle) -> HostResult<Option<PlugHandle>> {
        if let Some(src) = self.incoming(plug) {
            return Ok(Some(src.clone()));
        }
        let mut current = plug.clone();
        while let Some(parent) = self.parent_plug(&current)? {
            if let Some(src) = self.incoming(&parent) {
                let steps = self.steps_between(&parent, plug)?;
                return Ok(Some(self.follow(src, &steps)?));
            }
            current = parent;
        }
        Ok(None)
    }

    fn is_leaf(&self, plug: &PlugHandle) -> HostResult<bool> {
        let (_, def, depth) = self.plug_def(plug)?;
        Ok(def.kind != AttrKind::Compound && plug.indices.len() == depth)
    }

    pub fn read(&self, plug: &PlugHandle, time: f64, depth: usize) -> HostResult<RawValue> {
        if depth > MAX_EVALUATION_DEPTH {
            return Err(HostError::InvalidPlug(format!("evaluation cycle at '{}'", self.describe(plug))));
        }
        if !self.is_leaf(plug)? {
            return Err(HostError::InvalidPlug(format!("'{}' has no scalar value", self.describe(plug))));
        }
        let (record, def, _) = self.plug_def(plug)?;

        if let Some(src) = self.driver(plug)? {
            let source = self.node(src.node)?;
            let value = if source.has(Capability::AnimCurve) && source.def(src.attr)?.name == "output" {
                RawValue::Double(interpolate(&source.keys, time))
            } else {
                self.read(&src, time, depth + 1)?
            };
            return Ok(value.clone().coerce(def.kind).unwrap_or(value));
        }

        Ok(record
            .store
            .values
            .get(&(plug.attr, plug.indices.clone()))
            .cloned()
            .unwrap_or_else(|| def.default.clone()))
    }

    pub fn default_value(&self, plug: &PlugHandle) -> HostResult<RawValue> {
        Ok(self.plug_def(plug)?.1.default.clone())
    }

    pub fn is_locked(&self, plug: &PlugHandle) -> HostResult<bool> {
        let record = self.node(plug.node)?;
        let mut current = Some(plug.clone());
        while let Some(p) = current {
            if record.store.locked.contains(&(p.attr, p.indices.clone())) {
                return Ok(true);
            }
            current = self.parent_plug(&p)?;
        }
        Ok(false)
    }

    pub fn set_locked(&mut self, plug: &PlugHandle, locked: bool) -> HostResult<()> {
        self.plug_def(plug)?;
        let key = (plug.attr, plug.indices.clone());
        let store = &mut self.node_mut(plug.node)?.store;
        if locked {
            store.locked.insert(key);
        } else {
            store.locked.remove(&key);
        }
        Ok(())
    }

    pub fn is_keyable(&self, plug: &PlugHandle) -> HostResult<bool> {
        let (record, def, _) = self.plug_def(plug)?;
        Ok(record
            .store
            .keyable
            .get(&(plug.attr, plug.indices.clone()))
            .copied()
            .unwrap_or(def.keyable))
    }

    pub fn set_keyable(&mut self, plug: &PlugHandle, keyable: bool) -> HostResult<()> {
        self.plug_def(plug)?;
        let key = (plug.attr, plug.indices.clone());
        self.node_mut(plug.node)?.store.keyable.insert(key, keyable);
        Ok(())
    }

    /// Register every array element along the plug's path
    fn touch(&mut self, plug: &PlugHandle) -> HostResult<()> {
        let record = self.node_mut(plug.node)?;
        let mut depth = 0;
        for id in record.ancestry(plug.attr) {
            if record.attrs[id as usize].array {
                if let Some(index) = plug.indices.get(depth) {
                    record
                        .store
                        .elements
                        .entry((id, plug.indices[..depth].to_vec()))
                        .or_default()
                        .insert(*index);
                }
                depth += 1;
            }
        }
        Ok(())
    }

    pub fn write(&mut self, plug: &PlugHandle, value: RawValue) -> HostResult<()> {
        if !self.is_leaf(plug)? {
            return Err(HostError::InvalidPlug(format!("'{}' cannot hold a value", self.describe(plug))));
        }
        if self.is_locked(plug)? {
            return Err(HostError::Locked(self.describe(plug)));
        }
        if self.driver(plug)?.is_some() {
            return Err(HostError::Connected(self.describe(plug)));
        }
        let kind = self.plug_def(plug)?.1.kind;
        let found = value.type_name();
        let value = value.coerce(kind).ok_or_else(|| HostError::KindMismatch {
            expected: kind.to_string(),
            found: found.to_string(),
        })?;

        self.touch(plug)?;
        self.node_mut(plug.node)?
            .store
            .values
            .insert((plug.attr, plug.indices.clone()), value);
        Ok(())
    }

    /// Scalar plugs at or below `plug`
    fn leaves(&self, plug: &PlugHandle) -> HostResult<Vec<PlugHandle>> {
        if self.is_array(plug)? {
            let mut out = Vec::new();
            for index in self.existing_indices(plug)? {
                out.extend(self.leaves(&self.element(plug, index)?)?);
            }
            return Ok(out);
        }
        if self.is_compound(plug)? {
            let mut out = Vec::new();
            for position in 0..self.child_count(plug)? {
                out.extend(self.leaves(&self.child(plug, position)?)?);
            }
            return Ok(out);
        }
        Ok(vec![plug.clone()])
    }

    fn clear_subtree(&mut self, plug: &PlugHandle, with_elements: bool) -> HostResult<()> {
        let record = self.node_mut(plug.node)?;
        let below = |record: &NodeRecord, key: &PlugKey| {
            record.is_same_or_descendant(key.0, plug.attr) && key.1.starts_with(&plug.indices)
        };
        let keys: Vec<PlugKey> = record.store.values.keys().filter(|k| below(record, k)).cloned().collect();
        for key in keys {
            record.store.values.remove(&key);
        }
        if with_elements {
            let keys: Vec<PlugKey> = record.store.elements.keys().filter(|k| below(record, k)).cloned().collect();
            for key in keys {
                record.store.elements.remove(&key);
            }
            let locked: Vec<PlugKey> = record.store.locked.iter().filter(|k| below(record, k)).cloned().collect();
            for key in locked {
                record.store.locked.remove(&key);
            }
        }
        Ok(())
    }

    pub fn connect(&mut self, src: &PlugHandle, dst: &PlugHandle) -> HostResult<()> {
        if src == dst {
            return Err(HostError::InvalidPlug("cannot connect a plug to itself".into()));
        }
        let shape = |plug: &PlugHandle| -> HostResult<(AttrKind, bool, usize)> {
            let is_array = self.is_array(plug)?;
            let (_, def, depth) = self.plug_def(plug)?;
            if !is_array && plug.indices.len() != depth {
                return Err(HostError::InvalidPlug(format!("'{}' is missing an array index", self.describe(plug))));
            }
            Ok((def.kind, is_array, self.child_count(plug)?))
        };
        let (src_kind, src_array, src_children) = shape(src)?;
        let (dst_kind, dst_array, dst_children) = shape(dst)?;

        if src_array != dst_array || !src_kind.connects_to(dst_kind) || src_children != dst_children {
            return Err(HostError::KindMismatch {
                expected: dst_kind.to_string(),
                found: src_kind.to_string(),
            });
        }
        if self.incoming(dst).is_some() {
            return Err(HostError::AlreadyConnected(self.describe(dst)));
        }
        if self.is_locked(dst)? {
            return Err(HostError::Locked(self.describe(dst)));
        }

        self.touch(src)?;
        self.touch(dst)?;
        self.connections.push((src.clone(), dst.clone()));
        Ok(())
    }

    pub fn disconnect(&mut self, src: &PlugHandle, dst: &PlugHandle) -> HostResult<()> {
        let position = self
            .connections
            .iter()
            .position(|(s, d)| s == src && d == dst)
            .ok_or_else(|| HostError::NotConnected {
                src: self.describe(src),
                dst: self.describe(dst),
            })?;

        let (_, def, depth) = self.plug_def(dst)?;
        let behavior = def.disconnect;
        let is_element = def.array && dst.indices.len() == depth;

        let mut kept = Vec::new();
        if behavior != DisconnectBehavior::Reset {
            for leaf in self.leaves(dst)? {
                if let Ok(value) = self.read(&leaf, self.time, 0) {
                    kept.push((leaf, value));
                }
            }
        }

        self.connections.remove(position);

        match behavior {
            DisconnectBehavior::Delete if is_element => {
                self.clear_subtree(dst, true)?;
                let array_key = (dst.attr, dst.indices[..depth - 1].to_vec());
                let index = dst.indices[depth - 1];
                if let Some(set) = self.node_mut(dst.node)?.store.elements.get_mut(&array_key) {
                    set.remove(&index);
                }
            }
            DisconnectBehavior::Reset => self.clear_subtree(dst, false)?,
            _ => {
                let store = &mut self.node_mut(dst.node)?.store;
                for (leaf, value) in kept {
                    store.values.insert((leaf.attr, leaf.indices), value);
                }
            }
        }
        Ok(())
    }

    pub fn connected_to(&self, plug: &PlugHandle, sources: bool, destinations: bool) -> HostResult<Vec<PlugHandle>> {
        self.plug_def(plug)?;
        let mut out = Vec::new();
        for (src, dst) in &self.connections {
            if sources && dst == plug {
                out.push(src.clone());
            }
            if destinations && src == plug {
                out.push(dst.clone());
            }
        }
        Ok(out)
    }

    pub fn connections(&self, node: NodeHandle) -> HostResult<Vec<Connection>> {
        self.node(node)?;
        Ok(self
            .connections
            .iter()
            .filter(|(src, dst)| src.node == node || dst.node == node)
            .cloned()
            .collect())
    }

    pub fn snapshot(&self, nodes: &[NodeHandle]) -> Vec<(NodeHandle, PlugStore)> {
        let mut out: Vec<(NodeHandle, PlugStore)> = Vec::new();
        for node in nodes {
            if out.iter().any(|(n, _)| n == node) {
                continue;
            }
            if let Some(record) = self.nodes.get(*node) {
                out.push((*node, record.store.clone()));
            }
        }
        out
    }

    pub fn restore_stores(&mut self, snapshots: &[(NodeHandle, PlugStore)]) -> HostResult<()> {
        for (node, store) in snapshots {
            self.node_mut(*node)?.store = store.clone();
        }
        Ok(())
    }

    pub fn remove_connections(&mut self, connections: &[Connection]) {
        self.connections.retain(|c| !connections.contains(c));
    }

    pub fn add_connections(&mut self, connections: &[Connection]) {
        self.connections.extend(connections.iter().cloned());
    }

    // --- sets and curves ---------------------------------------------------

    fn set_record(&mut self, set: NodeHandle) -> HostResult<&mut NodeRecord> {
        let record = self.node_mut(set)?;
        if !record.has(Capability::Set) {
            return Err(HostError::InvalidPlug(format!("'{}' is not a set", record.name)));
        }
        Ok(record)
    }

    pub fn set_members(&self, set: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        let record = self.node(set)?;
        Ok(record
            .members
            .iter()
            .copied()
            .filter(|m| self.nodes.get(*m).is_some_and(|r| r.in_graph))
            .collect())
    }

    pub fn add_to_set(&mut self, set: NodeHandle, member: NodeHandle) -> HostResult<()> {
        self.node(member)?;
        let record = self.set_record(set)?;
        if !record.members.contains(&member) {
            record.members.push(member);
        }
        Ok(())
    }

    pub fn remove_from_set(&mut self, set: NodeHandle, member: NodeHandle) -> HostResult<()> {
        self.set_record(set)?.members.retain(|m| *m != member);
        Ok(())
    }

    pub fn clear_set(&mut self, set: NodeHandle) -> HostResult<()> {
        self.set_record(set)?.members.clear();
        Ok(())
    }

    pub fn add_key(&mut self, curve: NodeHandle, time: f64, value: f64) -> HostResult<()> {
        let record = self.node_mut(curve)?;
        if !record.has(Capability::AnimCurve) {
            return Err(HostError::InvalidPlug(format!("'{}' is not an animation curve", record.name)));
        }
        match record.keys.iter().position(|(t, _)| (*t - time).abs() < 1e-9) {
            Some(position) => record.keys[position].1 = value,
            None => {
                record.keys.push((time, value));
                record.keys.sort_by(|a, b| a.0.total_cmp(&b.0));
            }
        }
        Ok(())
    }

    pub fn keys(&self, curve: NodeHandle) -> HostResult<Vec<(f64, f64)>> {
        Ok(self.node(curve)?.keys.clone())
    }

    // --- callbacks -----------------------------------------------------------

    pub fn add_callback(&mut self, node: NodeHandle, kind: CallbackKind, callback: NodeCallback) -> HostResult<CallbackId> {
        self.node(node)?;
        self.next_callback += 1;
        let id = self.next_callback;
        self.callbacks.insert(id, CallbackEntry { node, kind, callback });
        Ok(id)
    }

    pub fn remove_callbacks(&mut self, ids: &[CallbackId]) {
        for id in ids {
            self.callbacks.remove(id);
        }
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    fn callbacks_for(&self, node: NodeHandle, kind: CallbackKind) -> Fired {
        self.callbacks
            .values()
            .filter(|entry| entry.node == node && entry.kind == kind)
            .map(|entry| (node, entry.callback.clone()))
            .collect()
    }
}
