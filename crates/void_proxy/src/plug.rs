//! Attribute channels
//!
//! A [`Plug`] names one attribute of one node, optionally indexed into
//! arrays and compounds, plus the unit it reads and writes in. Plugs are
//! cheap and never registered anywhere; the owning node caches the
//! lookups behind them.

use std::fmt;

use void_host::{AttrKind, HostError, PlugHandle, RawValue};

use crate::codec;
use crate::error::{Error, Result};
use crate::modifier::{Modifier, ModifierOptions};
use crate::node::Node;
use crate::registry;
use crate::units::Unit;
use crate::value::Value;

#[derive(Clone)]
pub struct Plug {
    node: Node,
    handle: PlugHandle,
    unit: Option<Unit>,
    /// Name the owning node remembers values under
    key: Option<String>,
}

impl Plug {
    pub(crate) fn new(node: Node, handle: PlugHandle, unit: Option<Unit>, key: Option<String>) -> Self {
        Self { node, handle, unit, key }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn handle(&self) -> &PlugHandle {
        &self.handle
    }

    pub fn unit(&self) -> Option<Unit> {
        self.unit
    }

    /// Same plug, reading and writing in `unit`
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub(crate) fn label(&self) -> String {
        codec::label(self.node.host(), &self.handle)
    }

    pub(crate) fn fail(&self, error: HostError) -> Error {
        Error::from_host(self.label(), error)
    }

    /// Plug below this one, keyed by its attribute path
    fn derive(&self, handle: PlugHandle) -> Result<Plug> {
        let key = self
            .node
            .host()
            .plug_name(&handle, true)
            .map_err(|e| self.fail(e))?;
        Ok(Plug::new(self.node.clone(), handle, self.unit, Some(key)))
    }

    /// Wrap plugs on possibly other nodes
    fn wrap(&self, handles: Vec<PlugHandle>) -> Result<Vec<Plug>> {
        handles
            .into_iter()
            .map(|handle| {
                let node = registry::resolve(self.node.ctx(), handle.node)?;
                Ok(Plug::new(node, handle, None, None))
            })
            .collect()
    }

    // --- description -----------------------------------------------------

    /// `|node.attribute` path
    pub fn path(&self) -> Result<String> {
        self.node.guard()?;
        Ok(self.label())
    }

    /// Attribute path, long or short
    pub fn name(&self, long: bool) -> Result<String> {
        self.node.guard()?;
        self.node
            .host()
            .plug_name(&self.handle, long)
            .map_err(|e| self.fail(e))
    }

    pub fn kind(&self) -> Result<AttrKind> {
        self.node.guard()?;
        self.node.host().plug_kind(&self.handle).map_err(|e| self.fail(e))
    }

    pub fn type_name(&self) -> Result<String> {
        Ok(self.kind()?.to_string())
    }

    pub fn is_array(&self) -> Result<bool> {
        self.node.guard()?;
        self.node.host().is_array(&self.handle).map_err(|e| self.fail(e))
    }

    pub fn is_compound(&self) -> Result<bool> {
        self.node.guard()?;
        self.node.host().is_compound(&self.handle).map_err(|e| self.fail(e))
    }

    // --- reading ---------------------------------------------------------

    /// Current value in this plug's unit
    pub fn read(&self) -> Result<Value> {
        self.read_with(self.unit, None)
    }

    /// Value at `time` seconds, not cached
    pub fn read_at(&self, time: f64) -> Result<Value> {
        self.read_with(self.unit, Some(time))
    }

    pub fn read_with(&self, unit: Option<Unit>, time: Option<f64>) -> Result<Value> {
        self.node.guard()?;
        match codec::decode(self.node.host(), &self.handle, unit, time) {
            Ok(value) => {
                if let (Some(key), None) = (&self.key, time) {
                    self.node.remember(key, unit, value.clone());
                }
                Ok(value)
            }
            Err(e) => {
                log::error!("Failed to read {}: {}", self.label(), e);
                Err(e)
            }
        }
    }

    /// Last value read or written through this plug, falling back to
    /// the host
    pub fn read_cached(&self) -> Result<Value> {
        self.node.guard()?;
        if let Some(key) = &self.key {
            if let Some(value) = self.node.recall(key, self.unit) {
                return Ok(value);
            }
        }
        self.read()
    }

    pub fn as_double(&self) -> Result<f64> {
        let value = self.read()?;
        value
            .as_float()
            .ok_or_else(|| Error::Type(format!("{} holds {value:?}, not a number", self.label())))
    }

    pub fn as_vector(&self) -> Result<[f64; 3]> {
        let value = self.read()?;
        value
            .as_vector()
            .ok_or_else(|| Error::Type(format!("{} holds {value:?}, not a vector", self.label())))
    }

    pub fn as_matrix(&self) -> Result<[f64; 16]> {
        let value = self.read()?;
        value
            .as_matrix()
            .ok_or_else(|| Error::Type(format!("{} holds {value:?}, not a matrix", self.label())))
    }

    /// Default value, shaped like [`Plug::read`]
    pub fn default(&self) -> Result<Value> {
        self.node.guard()?;
        let host = self.node.host();
        codec::decode_with(host, &self.handle, self.unit, &mut |leaf: &PlugHandle| {
            host.default_value(leaf).map_err(|e| Error::from_host(codec::label(host, leaf), e))
        })
    }

    // --- writing ---------------------------------------------------------

    /// Write a value. Time series animate the plug instead.
    pub fn write(&self, value: impl Into<Value>) -> Result<()> {
        self.node.guard()?;
        let value = value.into();
        if self.locked()? {
            return Err(Error::Locked(format!("{} is locked", self.label())));
        }
        if let Value::Keys(keys) = &value {
            return self.animate(keys);
        }
        if self.source()?.is_some() {
            return Err(Error::Locked(format!(
                "{} is connected, disconnect it or write to its source",
                self.label()
            )));
        }

        let host = self.node.host();
        let plan = codec::plan(host, &self.handle, &value, self.unit).map_err(|e| {
            log::error!("Failed to write {}: {}", self.label(), e);
            e
        })?;
        for (leaf, _) in &plan {
            if leaf == &self.handle {
                continue;
            }
            let blocked = host.is_locked(leaf).map_err(|e| Error::from_host(codec::label(host, leaf), e))?
                || !host
                    .connected_to(leaf, true, false)
                    .map_err(|e| Error::from_host(codec::label(host, leaf), e))?
                    .is_empty();
            if blocked {
                return Err(Error::Locked(format!(
                    "{} is locked or connected, nothing was written to {}",
                    codec::label(host, leaf),
                    self.label()
                )));
            }
        }
        for (leaf, raw) in &plan {
            host.set(leaf, raw.clone()).map_err(|e| {
                log::error!("Failed to write {}: {}", codec::label(host, leaf), e);
                Error::from_host(codec::label(host, leaf), e)
            })?;
        }

        if let Some(key) = &self.key {
            if let Some(written) = codec::planned_value(host, &self.handle, self.unit, &plan) {
                self.node.remember(key, self.unit, written);
            }
        }
        Ok(())
    }

    /// Drive the plug with an animation curve holding `keys`
    fn animate(&self, keys: &[(f64, f64)]) -> Result<()> {
        let kind = self.kind()?;
        let curve_type = match kind {
            AttrKind::Distance => "animCurveTL",
            AttrKind::Angle => "animCurveTA",
            AttrKind::Time => "animCurveTT",
            kind if kind.is_numeric() => "animCurveTU",
            kind => {
                return Err(Error::Type(format!("{} of kind {kind} cannot be animated", self.label())));
            }
        };
        if let Some(unit) = self.unit {
            codec::check_unit(kind, unit)?;
        }

        let mut modifier = Modifier::new(self.node.ctx().clone(), ModifierOptions::immediate());
        let curve = modifier.create_node(curve_type, None, None)?;
        let output = curve.plug("output")?;
        modifier.connect(&output, self, true)?;
        modifier.commit()?;

        let host = self.node.host();
        for (time, value) in keys {
            let value = match self.unit {
                Some(unit) if kind.dimension().is_some() => unit.to_storage(*value),
                _ => *value,
            };
            host.add_key(curve.handle(), *time, value).map_err(|e| curve.fail(e))?;
        }
        log::debug!("Animated {} with {} keys", self.label(), keys.len());
        Ok(())
    }

    /// Write the default value back
    pub fn reset(&self) -> Result<()> {
        self.write(self.default()?)
    }

    // --- indexing --------------------------------------------------------

    /// Array element by logical index, or compound child by position.
    /// Negative indices count from the end.
    pub fn at(&self, index: i64) -> Result<Plug> {
        self.node.guard()?;
        let host = self.node.host();
        let out_of_range = |len: usize| Error::Existence(format!("{}[{index}] is out of range ({len})", self.label()));

        if self.is_array()? {
            let logical = if index < 0 {
                let indices = self.array_indices()?;
                let position = indices.len() as i64 + index;
                let position = usize::try_from(position).map_err(|_| out_of_range(indices.len()))?;
                indices[position]
            } else {
                u32::try_from(index).map_err(|_| out_of_range(0))?
            };
            let element = host.element(&self.handle, logical).map_err(|e| self.fail(e))?;
            return self.derive(element);
        }

        if self.is_compound()? {
            let count = host.child_count(&self.handle).map_err(|e| self.fail(e))?;
            let position = if index < 0 { count as i64 + index } else { index };
            let position = usize::try_from(position)
                .ok()
                .filter(|p| *p < count)
                .ok_or_else(|| out_of_range(count))?;
            let child = host.child(&self.handle, position).map_err(|e| self.fail(e))?;
            return self.derive(child);
        }

        Err(Error::Type(format!("{} is neither an array nor a compound", self.label())))
    }

    /// Compound child by long or short name
    pub fn child(&self, name: &str) -> Result<Plug> {
        let path = format!("{}.{name}", self.name(true)?);
        let handle = self
            .node
            .host()
            .find_plug(self.handle.node, &path)
            .map_err(|e| Error::from_host(format!("{}.{name}", self.label()), e))?;
        self.derive(handle)
    }

    /// Elements of an array or children of a compound
    pub fn count(&self) -> Result<usize> {
        if self.is_array()? {
            return Ok(self.array_indices()?.len());
        }
        if self.is_compound()? {
            return self.node.host().child_count(&self.handle).map_err(|e| self.fail(e));
        }
        Err(Error::Type(format!("{} is neither an array nor a compound", self.label())))
    }

    /// Logical indices currently held by an array
    pub fn array_indices(&self) -> Result<Vec<u32>> {
        self.node.guard()?;
        self.node
            .host()
            .existing_indices(&self.handle)
            .map_err(|e| self.fail(e))
    }

    /// First unused logical index at or after `start`
    pub fn next_available_index(&self, start: u32) -> Result<u32> {
        let used = self.array_indices()?;
        let mut index = start;
        while used.contains(&index) {
            index = index
                .checked_add(1)
                .ok_or_else(|| Error::Existence(format!("{} has no free index after {start}", self.label())))?;
        }
        Ok(index)
    }

    fn append_index(&self, autofill: bool) -> Result<u32> {
        if autofill {
            return self.next_available_index(0);
        }
        match self.array_indices()?.last() {
            None => Ok(0),
            Some(last) => last
                .checked_add(1)
                .ok_or_else(|| Error::Existence(format!("{} has no index after {last}", self.label()))),
        }
    }

    /// Write `value` into a new element at the end, or into the first gap
    /// with `autofill`
    pub fn append(&self, value: impl Into<Value>, autofill: bool) -> Result<Plug> {
        let index = self.append_index(autofill)?;
        let element = self.at(i64::from(index))?;
        element.write(value)?;
        Ok(element)
    }

    /// Connect `source` into a new element
    pub fn append_connection(&self, source: &Plug, autofill: bool) -> Result<Plug> {
        let index = self.append_index(autofill)?;
        let element = self.at(i64::from(index))?;
        source.connect(&element, false)?;
        Ok(element)
    }

    pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> Result<()> {
        for value in values {
            self.append(value, false)?;
        }
        Ok(())
    }

    // --- state -----------------------------------------------------------

    pub fn locked(&self) -> Result<bool> {
        self.node.guard()?;
        self.node.host().is_locked(&self.handle).map_err(|e| self.fail(e))
    }

    pub fn lock(&self) -> Result<()> {
        self.set_locked(true)
    }

    pub fn unlock(&self) -> Result<()> {
        self.set_locked(false)
    }

    fn set_locked(&self, locked: bool) -> Result<()> {
        self.node.guard()?;
        self.node
            .host()
            .set_locked(&self.handle, locked)
            .map_err(|e| self.fail(e))
    }

    pub fn is_keyable(&self) -> Result<bool> {
        self.node.guard()?;
        self.node.host().is_keyable(&self.handle).map_err(|e| self.fail(e))
    }

    pub fn keyable(&self, keyable: bool) -> Result<()> {
        self.node.guard()?;
        self.node
            .host()
            .set_keyable(&self.handle, keyable)
            .map_err(|e| self.fail(e))
    }

    /// Neither locked nor driven by a connection
    pub fn writable(&self) -> Result<bool> {
        Ok(!self.locked()? && self.source()?.is_none())
    }

    // --- connections -----------------------------------------------------

    /// Plugs feeding into this one (`source`) and fed by it (`destination`)
    pub fn connections(&self, source: bool, destination: bool) -> Result<Vec<Plug>> {
        self.node.guard()?;
        let handles = self
            .node
            .host()
            .connected_to(&self.handle, source, destination)
            .map_err(|e| self.fail(e))?;
        self.wrap(handles)
    }

    pub fn connection(&self, source: bool, destination: bool) -> Result<Option<Plug>> {
        Ok(self.connections(source, destination)?.into_iter().next())
    }

    /// Plug driving this one, if any
    pub fn source(&self) -> Result<Option<Plug>> {
        self.connection(true, false)
    }

    pub fn connected(&self) -> Result<bool> {
        self.node.guard()?;
        let handles = self
            .node
            .host()
            .connected_to(&self.handle, true, true)
            .map_err(|e| self.fail(e))?;
        Ok(!handles.is_empty())
    }

    /// Connect this plug into `other`. Without `force`, an `other` that is
    /// already driven is reported as locked.
    pub fn connect(&self, other: &Plug, force: bool) -> Result<()> {
        self.node.guard()?;
        if !force {
            if let Some(existing) = other.source()? {
                if existing.handle == self.handle {
                    return Ok(());
                }
                return Err(Error::Locked(format!(
                    "{} is already connected to {}",
                    other.label(),
                    existing.label()
                )));
            }
        }
        let mut modifier = Modifier::new(self.node.ctx().clone(), ModifierOptions::immediate());
        modifier.connect(self, other, force)?;
        modifier.commit()
    }

    /// Break the connection with `other`, or every connection
    pub fn disconnect(&self, other: Option<&Plug>) -> Result<()> {
        let mut modifier = Modifier::new(self.node.ctx().clone(), ModifierOptions::immediate());
        modifier.disconnect(self, other)?;
        modifier.commit()
    }

    /// Write a raw value straight to the host, skipping conversion
    pub fn write_raw(&self, value: RawValue) -> Result<()> {
        self.node.guard()?;
        self.node.host().set(&self.handle, value).map_err(|e| self.fail(e))
    }
}

impl PartialEq for Plug {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl fmt::Debug for Plug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plug")
            .field("path", &self.label())
            .field("unit", &self.unit)
            .finish()
    }
}

impl fmt::Display for Plug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
