//! Animation curves

use std::ops::Deref;

use crate::error::Result;
use crate::node::Node;

/// A curve node mapping time in seconds to a value in storage units
#[derive(Clone, PartialEq, Eq)]
pub struct AnimCurve(Node);

impl AnimCurve {
    pub(crate) fn new(node: Node) -> Self {
        Self(node)
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    /// Insert or replace the key at `time`
    pub fn key(&self, time: f64, value: f64) -> Result<()> {
        self.guard()?;
        self.host()
            .add_key(self.handle(), time, value)
            .map_err(|e| self.fail(e))
    }

    /// Keys sorted by time
    pub fn keys(&self) -> Result<Vec<(f64, f64)>> {
        self.guard()?;
        self.host().keys(self.handle()).map_err(|e| self.fail(e))
    }
}

impl Deref for AnimCurve {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

impl std::fmt::Debug for AnimCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnimCurve({})", self.0)
    }
}
