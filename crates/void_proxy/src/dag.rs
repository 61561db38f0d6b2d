//! Hierarchy-aware nodes

use std::ops::Deref;

use crate::error::Result;
use crate::modifier::{Modifier, ModifierOptions};
use crate::node::Node;
use crate::registry;

/// A node that lives in the transform hierarchy
#[derive(Clone, PartialEq, Eq)]
pub struct DagNode(Node);

impl DagNode {
    pub(crate) fn new(node: Node) -> Self {
        Self(node)
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    fn wrap(&self, handle: void_host::NodeHandle) -> Result<DagNode> {
        Ok(DagNode(registry::resolve(self.ctx(), handle)?))
    }

    fn matches(node: &DagNode, type_name: Option<&str>) -> Result<bool> {
        match type_name {
            Some(wanted) => Ok(node.type_name()? == wanted),
            None => Ok(true),
        }
    }

    /// Closest ancestor, optionally the closest one of `type_name`
    pub fn parent(&self, type_name: Option<&str>) -> Result<Option<DagNode>> {
        self.guard()?;
        let mut current = self.host().parent(self.handle()).map_err(|e| self.fail(e))?;
        while let Some(handle) = current {
            let parent = self.wrap(handle)?;
            if Self::matches(&parent, type_name)? {
                return Ok(Some(parent));
            }
            current = self.host().parent(handle).map_err(|e| parent.fail(e))?;
        }
        Ok(None)
    }

    /// Ancestors from the parent up to the root
    pub fn lineage(&self) -> Result<Vec<DagNode>> {
        let mut out = Vec::new();
        let mut current = self.parent(None)?;
        while let Some(node) = current {
            current = node.parent(None)?;
            out.push(node);
        }
        Ok(out)
    }

    /// Direct children, optionally only those of `type_name`
    pub fn children(&self, type_name: Option<&str>) -> Result<Vec<DagNode>> {
        self.children_where(|child| Self::matches(child, type_name))
    }

    pub fn children_where(&self, mut predicate: impl FnMut(&DagNode) -> Result<bool>) -> Result<Vec<DagNode>> {
        self.guard()?;
        let handles = self.host().children(self.handle()).map_err(|e| self.fail(e))?;
        let mut out = Vec::new();
        for handle in handles {
            let child = self.wrap(handle)?;
            if predicate(&child)? {
                out.push(child);
            }
        }
        Ok(out)
    }

    pub fn child(&self, type_name: Option<&str>) -> Result<Option<DagNode>> {
        Ok(self.children(type_name)?.into_iter().next())
    }

    /// Every node below this one, depth first
    pub fn descendants(&self, type_name: Option<&str>) -> Result<Vec<DagNode>> {
        self.descendants_where(|node| Self::matches(node, type_name))
    }

    pub fn descendants_where(&self, mut predicate: impl FnMut(&DagNode) -> Result<bool>) -> Result<Vec<DagNode>> {
        let mut out = Vec::new();
        let mut stack = self.children(None)?;
        stack.reverse();
        while let Some(node) = stack.pop() {
            let mut below = node.children(None)?;
            below.reverse();
            if predicate(&node)? {
                out.push(node);
            }
            stack.extend(below);
        }
        Ok(out)
    }

    pub fn descendant(&self, type_name: Option<&str>) -> Result<Option<DagNode>> {
        Ok(self.descendants(type_name)?.into_iter().next())
    }

    /// Depth below the root, 0 for top-level nodes
    pub fn level(&self) -> Result<usize> {
        Ok(self.lineage()?.len())
    }

    /// Top-level ancestor, or this node when it has no parent
    pub fn root(&self) -> Result<DagNode> {
        Ok(self.lineage()?.pop().unwrap_or_else(|| self.clone()))
    }

    /// Parent `child` under this node right away
    pub fn add_child(&self, child: &Node) -> Result<()> {
        let mut modifier = Modifier::new(self.ctx().clone(), ModifierOptions::immediate());
        modifier.reparent(child, Some(&self.0))?;
        modifier.commit()?;
        child.path()?;
        Ok(())
    }

    /// Move this node to the top of the hierarchy right away
    pub fn unparent(&self) -> Result<()> {
        let mut modifier = Modifier::new(self.ctx().clone(), ModifierOptions::immediate());
        modifier.reparent(&self.0, None)?;
        modifier.commit()?;
        self.path()?;
        Ok(())
    }
}

impl Deref for DagNode {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

impl std::fmt::Debug for DagNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DagNode({})", self.0)
    }
}
