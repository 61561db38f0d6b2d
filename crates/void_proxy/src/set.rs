//! Object sets

use std::ops::Deref;

use crate::error::Result;
use crate::node::Node;
use crate::registry;

#[derive(Clone, PartialEq, Eq)]
pub struct ObjectSet(Node);

impl ObjectSet {
    pub(crate) fn new(node: Node) -> Self {
        Self(node)
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    /// Direct members, nested sets included
    pub fn members(&self) -> Result<Vec<Node>> {
        self.guard()?;
        self.host()
            .set_members(self.handle())
            .map_err(|e| self.fail(e))?
            .into_iter()
            .map(|handle| registry::resolve(self.ctx(), handle))
            .collect()
    }

    pub fn member(&self) -> Result<Option<Node>> {
        Ok(self.members()?.into_iter().next())
    }

    pub fn contains(&self, node: &Node) -> Result<bool> {
        Ok(self.members()?.iter().any(|member| member.handle() == node.handle()))
    }

    pub fn add(&self, node: &Node) -> Result<()> {
        self.guard()?;
        node.guard()?;
        self.host()
            .add_to_set(self.handle(), node.handle())
            .map_err(|e| self.fail(e))
    }

    pub fn remove(&self, node: &Node) -> Result<()> {
        self.guard()?;
        self.host()
            .remove_from_set(self.handle(), node.handle())
            .map_err(|e| self.fail(e))
    }

    pub fn clear(&self) -> Result<()> {
        self.guard()?;
        self.host().clear_set(self.handle()).map_err(|e| self.fail(e))
    }

    /// Members with nested sets expanded, each node once
    pub fn flatten(&self) -> Result<Vec<Node>> {
        let mut out: Vec<Node> = Vec::new();
        let mut visited = vec![self.handle()];
        let mut pending = self.members()?;
        pending.reverse();
        while let Some(member) = pending.pop() {
            if let Some(nested) = member.as_set() {
                if visited.contains(&nested.handle()) {
                    continue;
                }
                visited.push(nested.handle());
                let mut inner = nested.members()?;
                inner.reverse();
                pending.extend(inner);
            } else if !out.iter().any(|n| n.handle() == member.handle()) {
                out.push(member);
            }
        }
        Ok(out)
    }
}

impl Deref for ObjectSet {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

impl std::fmt::Debug for ObjectSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectSet({})", self.0)
    }
}
