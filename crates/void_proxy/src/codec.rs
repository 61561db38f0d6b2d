//! Conversion between [`Value`] and raw host storage
//!
//! Decoding walks arrays and compounds element by element and converts
//! each leaf according to its attribute kind. Encoding is the dual: it
//! distributes a value over the leaves of a plug and produces the raw
//! writes to perform, without performing them. Direct writes and
//! transactions both apply the same plan.

use std::collections::HashMap;

use void_host::{AttrKind, DataType, Host, NumericType, PlugHandle, RawValue};

use crate::error::{Error, Result};
use crate::units::Unit;
use crate::value::{quaternion_to_euler, Value};

/// Raw leaf writes, in application order
pub type Plan = Vec<(PlugHandle, RawValue)>;

/// Human readable address of a plug, `|parent|node.attr[2]`
pub fn label(host: &dyn Host, plug: &PlugHandle) -> String {
    let node = host
        .full_path(plug.node)
        .unwrap_or_else(|_| format!("{:?}", plug.node));
    match host.plug_name(plug, true) {
        Ok(name) => format!("{node}.{name}"),
        Err(_) => format!("{node}.<attribute {}>", plug.attr),
    }
}

fn host_error<'a>(host: &'a dyn Host, plug: &PlugHandle) -> impl FnOnce(void_host::HostError) -> Error + 'a {
    let plug = plug.clone();
    move |error| Error::from_host(label(host, &plug), error)
}

/// Prefix a type error with the plug it concerns
fn located(host: &dyn Host, plug: &PlugHandle, error: Error) -> Error {
    match error {
        Error::Type(message) => Error::Type(format!("{}: {message}", label(host, plug))),
        other => other,
    }
}

/// Fail unless `unit` may be used with an attribute of `kind`
pub fn check_unit(kind: AttrKind, unit: Unit) -> Result<()> {
    match kind.dimension() {
        Some(dimension) if dimension == unit.dimension() => Ok(()),
        Some(_) => Err(Error::Type(format!("Unsupported unit {unit} for {kind}"))),
        None => Ok(()),
    }
}

/// Read a plug, recursing into arrays and compounds
pub fn decode(host: &dyn Host, plug: &PlugHandle, unit: Option<Unit>, time: Option<f64>) -> Result<Value> {
    decode_with(host, plug, unit, &mut |leaf: &PlugHandle| {
        host.get(leaf, time).map_err(host_error(host, leaf))
    })
}

/// Decode a plug with a custom source for leaf values
pub(crate) fn decode_with(
    host: &dyn Host,
    plug: &PlugHandle,
    unit: Option<Unit>,
    read: &mut dyn FnMut(&PlugHandle) -> Result<RawValue>,
) -> Result<Value> {
    let on_error = |plug: &PlugHandle| host_error(host, plug);

    if host.is_array(plug).map_err(on_error(plug))? {
        let indices = host.existing_indices(plug).map_err(on_error(plug))?;
        let mut items = Vec::with_capacity(indices.len());
        for index in indices {
            let element = host.element(plug, index).map_err(on_error(plug))?;
            items.push(decode_with(host, &element, unit, read)?);
        }
        return Ok(Value::Tuple(items));
    }

    let kind = host.plug_kind(plug).map_err(on_error(plug))?;
    match kind {
        AttrKind::Compound => {
            let count = host.child_count(plug).map_err(on_error(plug))?;
            let mut items = Vec::with_capacity(count);
            for position in 0..count {
                let child = host.child(plug, position).map_err(on_error(plug))?;
                items.push(decode_with(host, &child, unit, read)?);
            }
            Ok(Value::Tuple(items))
        }
        // Carries no data, only the fact that it is there
        AttrKind::Message => Ok(Value::Bool(true)),
        AttrKind::Typed(DataType::Any | DataType::ComponentList | DataType::Invalid | DataType::NurbsCurve) => {
            Ok(Value::Null)
        }
        AttrKind::DoubleArray => Err(Error::Type(format!(
            "{}: kDoubleArray is not supported",
            label(host, plug)
        ))),
        AttrKind::Generic => Err(Error::Type(format!("{}: Unsupported type '{kind}'", label(host, plug)))),
        _ => {
            if let Some(unit) = unit {
                check_unit(kind, unit).map_err(|e| located(host, plug, e))?;
            }
            let raw = read(plug)?;
            from_raw(kind, raw, unit)
        }
    }
}

/// Convert one leaf value
fn from_raw(kind: AttrKind, raw: RawValue, unit: Option<Unit>) -> Result<Value> {
    if raw == RawValue::Null {
        return Ok(Value::Null);
    }
    let mismatch = |raw: &RawValue| Error::Type(format!("expected {kind}, host stored {}", raw.type_name()));

    let value = match kind {
        AttrKind::Numeric(NumericType::Boolean) => Value::Bool(raw.as_f64().ok_or_else(|| mismatch(&raw))? != 0.0),
        AttrKind::Numeric(n) if n.is_integral() => Value::Int(raw.as_f64().ok_or_else(|| mismatch(&raw))? as i64),
        AttrKind::Enum => Value::Int(raw.as_f64().ok_or_else(|| mismatch(&raw))? as i64),
        AttrKind::Numeric(_) => Value::Float(raw.as_f64().ok_or_else(|| mismatch(&raw))?),
        AttrKind::Distance | AttrKind::Angle | AttrKind::Time => {
            let stored = raw.as_f64().ok_or_else(|| mismatch(&raw))?;
            Value::Float(unit.map_or(stored, |unit| unit.from_storage(stored)))
        }
        AttrKind::Matrix | AttrKind::Typed(DataType::Matrix) => match raw {
            RawValue::Matrix(m) => Value::Matrix(m),
            other => return Err(mismatch(&other)),
        },
        AttrKind::Typed(DataType::String) => match raw {
            RawValue::String(s) => Value::String(s),
            other => return Err(mismatch(&other)),
        },
        _ => return Err(Error::Type(format!("Unsupported type '{kind}'"))),
    };
    Ok(value)
}

/// Work out the raw writes that store `value` in `plug`
pub fn plan(host: &dyn Host, plug: &PlugHandle, value: &Value, unit: Option<Unit>) -> Result<Plan> {
    let mut out = Vec::new();
    plan_into(host, plug, value, unit, &mut out)?;
    Ok(out)
}

fn plan_into(host: &dyn Host, plug: &PlugHandle, value: &Value, unit: Option<Unit>, out: &mut Plan) -> Result<()> {
    let on_error = |plug: &PlugHandle| host_error(host, plug);

    if host.is_array(plug).map_err(on_error(plug))? {
        let items = sequence(value).ok_or_else(|| {
            Error::Type(format!("{}: array expects a sequence, got {value:?}", label(host, plug)))
        })?;
        for (index, item) in items.iter().enumerate() {
            let element = host.element(plug, index as u32).map_err(on_error(plug))?;
            plan_into(host, &element, item, unit, out)?;
        }
        return Ok(());
    }

    let kind = host.plug_kind(plug).map_err(on_error(plug))?;
    match kind {
        AttrKind::Compound => {
            let count = host.child_count(plug).map_err(on_error(plug))?;
            let items = distribute(value, count).map_err(|e| located(host, plug, e))?;
            for (position, item) in items.iter().enumerate() {
                let child = host.child(plug, position).map_err(on_error(plug))?;
                plan_into(host, &child, item, unit, out)?;
            }
            Ok(())
        }
        AttrKind::Matrix | AttrKind::Typed(DataType::Matrix) => {
            let matrix = flatten_matrix(value).ok_or_else(|| {
                Error::Type(format!("{}: a matrix takes 16 values, got {value:?}", label(host, plug)))
            })?;
            out.push((plug.clone(), RawValue::Matrix(matrix)));
            Ok(())
        }
        _ => {
            let raw = leaf(host, plug, kind, value, unit).map_err(|e| located(host, plug, e))?;
            out.push((plug.clone(), raw));
            Ok(())
        }
    }
}

/// Items of a value written to an array
fn sequence(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Tuple(items) => Some(items.clone()),
        Value::Vector(v) => Some(v.iter().map(|x| Value::Float(*x)).collect()),
        _ => None,
    }
}

/// Split a value over the children of a compound
fn distribute(value: &Value, count: usize) -> Result<Vec<Value>> {
    let radians = |angles: [f64; 3]| angles.iter().map(|a| Value::radians(*a)).collect::<Vec<_>>();

    let items = match value {
        Value::Tuple(items) => items.clone(),
        Value::Vector(v) if count == 3 => v.iter().map(|x| Value::Float(*x)).collect(),
        Value::Euler { angles, .. } if count == 3 => radians(*angles),
        Value::Quaternion(q) if count == 3 => radians(quaternion_to_euler(*q)),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Quantity { .. } => vec![value.clone(); count],
        other => {
            return Err(Error::Type(format!("cannot write {other:?} to a compound of {count}")));
        }
    };
    if items.len() != count {
        return Err(Error::Type(format!("expected {count} values, got {}", items.len())));
    }
    Ok(items)
}

/// 16 doubles, given flat or as four rows of four
fn flatten_matrix(value: &Value) -> Option<[f64; 16]> {
    if let Some(matrix) = value.as_matrix() {
        return Some(matrix);
    }
    let rows = value.as_tuple()?;
    if rows.len() != 4 {
        return None;
    }
    let mut out = [0.0; 16];
    for (r, row) in rows.iter().enumerate() {
        let row = row.as_tuple()?;
        if row.len() != 4 {
            return None;
        }
        for (c, cell) in row.iter().enumerate() {
            out[r * 4 + c] = cell.as_float()?;
        }
    }
    Some(out)
}

fn leaf(host: &dyn Host, plug: &PlugHandle, kind: AttrKind, value: &Value, unit: Option<Unit>) -> Result<RawValue> {
    let raw = match (kind, value) {
        (_, Value::Tuple(_) | Value::Vector(_) | Value::Matrix(_) | Value::Euler { .. } | Value::Quaternion(_)) => {
            return Err(Error::Type(format!("Unsupported nested value {value:?} for {kind}")));
        }
        (_, Value::Keys(_)) => {
            return Err(Error::Type("time series are written through a plug, not a transaction".into()));
        }
        (_, Value::Null) => return Err(Error::Type("cannot write null".into())),
        (AttrKind::Message, _) => return Err(Error::Type("message attributes hold no value".into())),
        (AttrKind::DoubleArray, _) => return Err(Error::Type("kDoubleArray is not supported".into())),

        (AttrKind::Distance | AttrKind::Angle | AttrKind::Time, Value::Quantity { value, unit: given }) => {
            check_unit(kind, *given)?;
            RawValue::Double(given.to_storage(*value))
        }
        (AttrKind::Distance | AttrKind::Angle | AttrKind::Time, Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
            let number = value.as_float().unwrap_or_default();
            match unit {
                Some(unit) => {
                    check_unit(kind, unit)?;
                    RawValue::Double(unit.to_storage(number))
                }
                None => RawValue::Double(number),
            }
        }
        (_, Value::Quantity { unit: given, .. }) => {
            return Err(Error::Type(format!("{given} given for an attribute of kind {kind}")));
        }

        (AttrKind::Enum, Value::String(field)) => {
            let info = host
                .attribute(plug.node, plug.attr)
                .map_err(host_error(host, plug))?;
            let (_, index) = info
                .enum_fields
                .iter()
                .find(|(name, _)| name == field)
                .ok_or_else(|| Error::Type(format!("'{field}' is not a field of this enum")))?;
            RawValue::Int(*index)
        }
        (_, Value::String(s)) => RawValue::String(s.clone()),
        (_, Value::Bool(b)) => RawValue::Bool(*b),
        (_, Value::Int(i)) => RawValue::Int(*i),
        (_, Value::Float(f)) => RawValue::Double(*f),
    };

    let found = raw.type_name();
    raw.coerce(kind)
        .ok_or_else(|| Error::Type(format!("cannot store {found} in {kind}")))
}

/// Decode what `plug` will read once `plan` is applied, without asking
/// the host for values. `None` when the plan leaves some leaf untouched.
pub(crate) fn planned_value(host: &dyn Host, plug: &PlugHandle, unit: Option<Unit>, plan: &Plan) -> Option<Value> {
    let writes: HashMap<&PlugHandle, &RawValue> = plan.iter().map(|(p, v)| (p, v)).collect();
    decode_with(host, plug, unit, &mut |leaf: &PlugHandle| {
        writes
            .get(leaf)
            .map(|raw| (*raw).clone())
            .ok_or_else(|| Error::Existence("not planned".into()))
    })
    .ok()
}
