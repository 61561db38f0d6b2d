//! Integration tests for the in-memory host
//!
//! Covers graph edits through modifiers, paths, notifications, the
//! command undo queue and array bookkeeping.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use void_host::prelude::*;
use void_host::{AttrSpec, NativeCommand, NodeCallback};

fn transform(host: &MemoryHost, name: &str, parent: Option<NodeHandle>) -> NodeHandle {
    host.create("transform", Some(name), parent).unwrap()
}

#[test]
fn test_paths_follow_hierarchy() {
    let host = MemoryHost::new();
    let a = transform(&host, "A", None);
    let b = transform(&host, "B", Some(a));
    let net = host.create("network", Some("net"), None).unwrap();

    assert_eq!(host.full_path(b).unwrap(), "|A|B");
    assert_eq!(host.partial_path(b).unwrap(), "B");
    assert_eq!(host.full_path(net).unwrap(), "net");
    assert_eq!(host.parent(b).unwrap(), Some(a));
    assert_eq!(host.children(a).unwrap(), vec![b]);
    assert_eq!(host.lookup("B"), vec![b]);
    assert_eq!(host.lookup("|A|B"), vec![b]);
    assert!(host.lookup("|B").is_empty());
}

#[test]
fn test_modifier_is_undoable() {
    let host = MemoryHost::new();
    let a = transform(&host, "A", None);
    let tx = host.find_plug(a, "translateX").unwrap();

    let mut modifier = host.new_modifier();
    let created = modifier.create_node("transform", None).unwrap();
    modifier.rename_node(created, "C").unwrap();
    modifier.set_value(tx.clone(), RawValue::Double(3.0)).unwrap();
    assert!(!host.in_graph(created).unwrap());

    modifier.do_it().unwrap();
    assert_eq!(host.lookup("C"), vec![created]);
    assert_eq!(host.get(&tx, None).unwrap(), RawValue::Double(3.0));

    modifier.undo_it().unwrap();
    assert!(host.lookup("C").is_empty());
    assert_eq!(host.get(&tx, None).unwrap(), RawValue::Double(0.0));
    assert!(host.is_valid(created));
}

#[test]
fn test_operation_budget_stops_modifier() {
    let host = MemoryHost::new();
    host.set_fail_after_ops(Some(1));

    let mut modifier = host.new_modifier();
    let node = modifier.create_node("transform", None).unwrap();
    modifier.rename_node(node, "X").unwrap();

    let error = modifier.do_it().unwrap_err();
    assert!(matches!(error, HostError::Injected(_)));
    assert!(host.in_graph(node).unwrap());

    modifier.undo_it().unwrap();
    assert!(!host.in_graph(node).unwrap());
    host.set_fail_after_ops(None);
}

#[test]
fn test_removal_and_destruction_callbacks() {
    let host = MemoryHost::new();
    let a = transform(&host, "A", None);
    let removed = Rc::new(Cell::new(0));
    let destroyed = Rc::new(Cell::new(0));

    let counter = removed.clone();
    let on_removed: NodeCallback = Rc::new(move |_: NodeHandle| counter.set(counter.get() + 1));
    host.add_removed_callback(a, on_removed).unwrap();
    let counter = destroyed.clone();
    let on_destroyed: NodeCallback = Rc::new(move |_: NodeHandle| counter.set(counter.get() + 1));
    host.add_destroyed_callback(a, on_destroyed).unwrap();
    assert_eq!(host.callback_count(), 2);

    host.delete(a).unwrap();
    assert_eq!(removed.get(), 1);
    assert_eq!(destroyed.get(), 0);
    assert!(host.is_valid(a));

    host.flush_undo();
    assert_eq!(destroyed.get(), 1);
    assert!(!host.is_valid(a));
    assert!(matches!(host.name(a), Err(HostError::InvalidHandle(_))));
}

#[test]
fn test_connections_propagate_values() {
    let host = MemoryHost::new();
    let a = transform(&host, "A", None);
    let b = transform(&host, "B", None);
    let src = host.find_plug(a, "translateX").unwrap();
    let dst = host.find_plug(b, "translateY").unwrap();

    host.set(&src, RawValue::Double(2.5)).unwrap();
    let mut modifier = host.new_modifier();
    modifier.connect(src.clone(), dst.clone()).unwrap();
    modifier.do_it().unwrap();

    assert_eq!(host.get(&dst, None).unwrap(), RawValue::Double(2.5));
    assert_eq!(host.connected_to(&dst, true, false).unwrap(), vec![src.clone()]);
    assert!(matches!(
        host.set(&dst, RawValue::Double(1.0)),
        Err(HostError::Connected(_))
    ));

    let mut modifier = host.new_modifier();
    modifier.disconnect(src.clone(), dst.clone()).unwrap();
    modifier.do_it().unwrap();
    host.set(&src, RawValue::Double(9.0)).unwrap();
    assert_eq!(host.get(&dst, None).unwrap(), RawValue::Double(2.5));
}

#[test]
fn test_disconnected_elements_keep_logical_indices() {
    let host = MemoryHost::new();
    let sum = host.create("plusMinusAverage", None, None).unwrap();
    let input = host.find_plug(sum, "input1D").unwrap();

    let mut sources = Vec::new();
    let mut modifier = host.new_modifier();
    for index in 0..3 {
        let node = host.create("multDoubleLinear", None, None).unwrap();
        let output = host.find_plug(node, "output").unwrap();
        modifier
            .connect(output.clone(), host.element(&input, index).unwrap())
            .unwrap();
        sources.push(output);
    }
    modifier.do_it().unwrap();
    assert_eq!(host.existing_indices(&input).unwrap(), vec![0, 1, 2]);

    let mut modifier = host.new_modifier();
    modifier
        .disconnect(sources[1].clone(), host.element(&input, 1).unwrap())
        .unwrap();
    modifier.do_it().unwrap();
    assert_eq!(host.existing_indices(&input).unwrap(), vec![0, 2]);
    assert_eq!(
        host.plug_name(&host.element(&input, 2).unwrap(), true).unwrap(),
        "input1D[2]"
    );
}

#[test]
fn test_dynamic_attributes() {
    let host = MemoryHost::new();
    let node = host.create("network", None, None).unwrap();

    let mut modifier = host.new_modifier();
    modifier
        .add_attribute(node, AttrSpec::double("weight").short("w"))
        .unwrap();
    modifier.do_it().unwrap();

    let plug = host.find_plug(node, "w").unwrap();
    assert_eq!(host.plug_name(&plug, true).unwrap(), "weight");
    assert_eq!(host.plug_kind(&plug).unwrap(), AttrKind::Numeric(void_host::NumericType::Double));

    let mut modifier = host.new_modifier();
    modifier.add_attribute(node, AttrSpec::double("weight")).unwrap();
    assert!(matches!(modifier.do_it(), Err(HostError::DuplicateAttribute(_))));
}

struct Recorder {
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl NativeCommand for Recorder {
    fn do_it(&mut self) -> HostResult<()> {
        self.log.borrow_mut().push("do");
        Ok(())
    }

    fn undo_it(&mut self) -> HostResult<()> {
        self.log.borrow_mut().push("undo");
        Ok(())
    }

    fn redo_it(&mut self) -> HostResult<()> {
        self.log.borrow_mut().push("redo");
        Ok(())
    }
}

#[test]
fn test_command_undo_queue() {
    let host = MemoryHost::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let shared = log.clone();
    host.register_command(
        "record",
        Box::new(move || Box::new(Recorder { log: shared.clone() }) as Box<dyn NativeCommand>),
    )
    .unwrap();
    assert!(host.has_command("record"));

    host.execute_command("record").unwrap();
    assert_eq!(host.undo_depth(), 1);
    host.undo().unwrap();
    host.redo().unwrap();
    assert_eq!(*log.borrow(), vec!["do", "undo", "redo"]);

    host.flush_undo();
    assert_eq!(host.undo_depth(), 0);
    assert!(matches!(host.undo(), Err(HostError::EmptyHistory(_))));

    host.deregister_command("record").unwrap();
    assert!(matches!(host.execute_command("record"), Err(HostError::UnknownCommand(_))));
}

#[test]
fn test_refused_registration() {
    let host = MemoryHost::new();
    host.set_refuse_commands(true);
    let result = host.register_command(
        "never",
        Box::new(|| Box::new(Recorder { log: Rc::default() }) as Box<dyn NativeCommand>),
    );
    assert!(matches!(result, Err(HostError::CommandRegistration(..))));
    assert!(!host.has_command("never"));
}
