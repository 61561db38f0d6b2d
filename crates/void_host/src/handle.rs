//! Generational handles for host-owned nodes
//!
//! A handle never dangles: once the slot it points at is released the
//! generation moves on and every outstanding copy stops resolving.

use std::fmt;

/// Opaque reference to a node owned by a host.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

impl NodeHandle {
    /// Create a handle from index and generation
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Create an invalid/null handle
    #[inline]
    pub const fn null() -> Self {
        Self {
            index: u32::MAX,
            generation: u32::MAX,
        }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.index == u32::MAX && self.generation == u32::MAX
    }

    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into raw bits, generation in the upper half
    #[inline]
    pub const fn to_bits(&self) -> u64 {
        (self.generation as u64) << 32 | self.index as u64
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NodeHandle(null)")
        } else {
            write!(f, "NodeHandle({}v{})", self.index, self.generation)
        }
    }
}

impl Default for NodeHandle {
    fn default() -> Self {
        Self::null()
    }
}

/// Allocates handles with generation tracking
#[derive(Debug, Default)]
pub struct HandleAllocator {
    generations: Vec<u32>,
    free_list: Vec<u32>,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new handle, reusing released slots first
    pub fn allocate(&mut self) -> NodeHandle {
        if let Some(index) = self.free_list.pop() {
            let generation = self.generations[index as usize];
            NodeHandle::new(index, generation)
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            NodeHandle::new(index, 0)
        }
    }

    /// Release a handle. Returns false if it was already stale.
    pub fn release(&mut self, handle: NodeHandle) -> bool {
        if !self.is_valid(handle) {
            return false;
        }
        let slot = &mut self.generations[handle.index() as usize];
        *slot = slot.wrapping_add(1);
        self.free_list.push(handle.index());
        true
    }

    pub fn is_valid(&self, handle: NodeHandle) -> bool {
        if handle.is_null() {
            return false;
        }
        match self.generations.get(handle.index() as usize) {
            Some(&generation) => generation == handle.generation() && !self.free_list.contains(&handle.index()),
            None => false,
        }
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.generations.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage keyed by node handle
#[derive(Debug)]
pub struct HandleMap<T> {
    allocator: HandleAllocator,
    slots: Vec<Option<T>>,
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self {
            allocator: HandleAllocator::new(),
            slots: Vec::new(),
        }
    }
}

impl<T> HandleMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> NodeHandle {
        let handle = self.allocator.allocate();
        let index = handle.index() as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(value);
        handle
    }

    pub fn remove(&mut self, handle: NodeHandle) -> Option<T> {
        if !self.allocator.release(handle) {
            return None;
        }
        self.slots.get_mut(handle.index() as usize)?.take()
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&T> {
        if !self.allocator.is_valid(handle) {
            return None;
        }
        self.slots.get(handle.index() as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut T> {
        if !self.allocator.is_valid(handle) {
            return None;
        }
        self.slots.get_mut(handle.index() as usize)?.as_mut()
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.allocator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocator.is_empty()
    }

    /// Iterate live entries
    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &T)> {
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            let value = slot.as_ref()?;
            let generation = self.allocator.generations[index];
            Some((NodeHandle::new(index as u32, generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeHandle, &mut T)> {
        let generations = &self.allocator.generations;
        self.slots.iter_mut().enumerate().filter_map(move |(index, slot)| {
            let value = slot.as_mut()?;
            Some((NodeHandle::new(index as u32, generations[index]), value))
        })
    }

    pub fn handles(&self) -> Vec<NodeHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }
}
