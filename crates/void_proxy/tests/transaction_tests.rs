//! Integration tests for modifiers and undo integration
//!
//! Tests batching, atomic rollback, failure reports, the undo bridge and
//! the connect/disconnect scenario end to end.

use std::cell::RefCell;
use std::rc::Rc;

use void_host::{AttrSpec, Host, MemoryHost};
use void_proxy::*;

fn setup_with(config: ProxyConfig) -> (MemoryHost, Session) {
    let _ = env_logger::builder().is_test(true).try_init();
    let host = MemoryHost::new();
    let session = Session::with_config(Rc::new(host.clone()), config);
    (host, session)
}

fn setup() -> (MemoryHost, Session) {
    setup_with(ProxyConfig::default())
}

#[test]
fn test_edits_apply_on_commit() {
    let (host, session) = setup();
    let mut modifier = session.modifier();

    let node = modifier.create_node("transform", Some("A"), None).unwrap();
    modifier.set_attr(&node.plug("translateX").unwrap(), 4.0).unwrap();
    assert!(host.lookup("A").is_empty());
    assert!(!node.exists());
    assert_eq!(modifier.state(), TransactionState::Accumulating);

    modifier.commit().unwrap();
    assert_eq!(modifier.state(), TransactionState::Committed);
    assert_eq!(host.lookup("A"), vec![node.handle()]);
    assert!(node.exists());
    assert_eq!(node.get("translateX").unwrap(), Value::Float(4.0));
    assert_eq!(node.path().unwrap(), "|A");
}

#[test]
fn test_finished_modifier_rejects_edits() {
    let (_host, session) = setup();
    let mut modifier = session.modifier();
    modifier.create_node("network", None, None).unwrap();
    modifier.commit().unwrap();

    assert!(matches!(
        modifier.create_node("network", None, None),
        Err(Error::Finished(TransactionState::Committed))
    ));
    assert!(matches!(
        modifier.commit(),
        Err(Error::Finished(TransactionState::Committed))
    ));
}

#[test]
fn test_atomic_rollback_on_invalid_connect() {
    let (host, session) = setup();
    let a = session.create_node("transform", Some("A"), None).unwrap();

    let result = session.modify(|m| {
        let x = m.create_node("transform", Some("X"), None)?;
        m.connect(&a.plug("translateX")?, &x.plug("message")?, false)
    });

    let error = match result {
        Err(Error::Transaction(error)) => error,
        other => panic!("expected a transaction error, got {other:?}"),
    };
    assert!(error.rolled_back);
    assert!(error.source.is_type());
    let ops: Vec<&str> = error.history.iter().map(|entry| entry.op.as_str()).collect();
    assert_eq!(ops, vec!["create_node", "connect"]);
    assert!(host.lookup("X").is_empty());

    let report = error.to_string();
    assert!(report.contains("create_node(\"transform\", Some(\"X\"), None)"));
    assert!(report.contains("|A.translateX"));
}

#[test]
fn test_atomic_rollback_on_host_failure() {
    let (host, session) = setup();
    let a = session.create_node("transform", Some("A"), None).unwrap();
    let mut modifier = session.modifier();
    modifier.create_node("transform", Some("X"), None).unwrap();
    modifier.set_attr(&a.plug("translateX").unwrap(), 2.0).unwrap();

    host.set_fail_after_ops(Some(2));
    let error = modifier.commit().unwrap_err();
    host.set_fail_after_ops(None);

    assert!(error.is_transaction());
    assert_eq!(modifier.state(), TransactionState::RolledBack);
    assert!(host.lookup("X").is_empty());
    assert_eq!(a.get("translateX").unwrap(), Value::Float(0.0));
}

#[test]
fn test_non_atomic_failure_keeps_applied_edits() {
    let (host, session) = setup();
    let options = ModifierOptions {
        atomic: false,
        ..ModifierOptions::default()
    };
    let mut modifier = session.modifier_with(options);
    modifier.create_node("transform", Some("X"), None).unwrap();
    modifier.create_node("transform", Some("Y"), None).unwrap();

    host.set_fail_after_ops(Some(2));
    let error = modifier.commit().unwrap_err();
    host.set_fail_after_ops(None);

    let Error::Transaction(error) = error else {
        panic!("expected a transaction error");
    };
    assert!(!error.rolled_back);
    assert_eq!(modifier.state(), TransactionState::Failed);
    assert_eq!(host.lookup("X").len(), 1);
    assert!(host.lookup("Y").is_empty());
}

#[test]
fn test_template_and_interesting() {
    let (_host, session) = setup();
    let options = ModifierOptions {
        interesting: false,
        ..ModifierOptions::default()
    }
    .with_template("rig_{name}_{index}");

    let (arm, leg) = session
        .modify_with(options, |m| {
            let arm = m.create_node("joint", Some("arm"), None)?;
            let leg = m.create_node("joint", None, None)?;
            Ok((arm, leg))
        })
        .unwrap();

    assert_eq!(arm.name(true).unwrap(), "rig_arm_0");
    assert_eq!(leg.name(true).unwrap(), "rig_joint_1");
    assert_eq!(arm.get("isHistoricallyInteresting").unwrap(), Value::Int(0));

    let plain = session.create_node("joint", None, None).unwrap();
    assert_eq!(plain.get("isHistoricallyInteresting").unwrap(), Value::Int(2));
}

#[test]
fn test_force_connect_replaces_source() {
    let (_host, session) = setup();
    let a = session.create_node("transform", Some("A"), None).unwrap();
    let b = session.create_node("transform", Some("B"), None).unwrap();
    let c = session.create_node("transform", Some("C"), None).unwrap();
    a.set("translateX", 1.0).unwrap();
    c.set("translateX", 2.0).unwrap();

    a.plug("translateX").unwrap().connect(&b.plug("translateX").unwrap(), true).unwrap();
    assert_eq!(b.get("translateX").unwrap(), Value::Float(1.0));

    c.plug("translateX").unwrap().connect(&b.plug("translateX").unwrap(), true).unwrap();
    let source = b.plug("translateX").unwrap().source().unwrap().unwrap();
    assert_eq!(*source.node(), c);
    assert_eq!(b.get("translateX").unwrap(), Value::Float(2.0));
}

#[test]
fn test_force_connect_is_undoable() {
    let (host, session) = setup();
    let a = session.create_node("transform", Some("A"), None).unwrap();
    let b = session.create_node("transform", Some("B"), None).unwrap();
    let c = session.create_node("transform", Some("C"), None).unwrap();
    let b_tx = b.plug("translateX").unwrap();
    a.plug("translateX").unwrap().connect(&b_tx, true).unwrap();

    let mut modifier = session.modifier();
    modifier.connect(&c.plug("translateX").unwrap(), &b_tx, true).unwrap();
    assert_eq!(modifier.state(), TransactionState::Accumulating);
    assert!(host.connected_to(b_tx.handle(), true, false).unwrap().is_empty());
    modifier.commit().unwrap();
    assert_eq!(*b_tx.source().unwrap().unwrap().node(), c);

    host.undo().unwrap();
    assert_eq!(*b_tx.source().unwrap().unwrap().node(), a);
    host.redo().unwrap();
    assert_eq!(*b_tx.source().unwrap().unwrap().node(), c);
}

#[test]
fn test_node_connections() {
    let (_host, session) = setup();
    let a = session.create_node("transform", Some("A"), None).unwrap();
    let b = session.create_node("transform", Some("B"), None).unwrap();
    a.plug("translateX").unwrap().connect(&b.plug("translateY").unwrap(), true).unwrap();

    let outgoing = a.connections(false, true).unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].1.path().unwrap(), "|B.translateY");
    assert!(a.connections(true, false).unwrap().is_empty());
    assert_eq!(b.connections(true, false).unwrap().len(), 1);
}

#[test]
fn test_disconnect_stops_propagation() {
    let (_host, session) = setup();
    let a = session.create_node("transform", Some("A"), None).unwrap();
    let b = session.create_node("transform", Some("B"), Some(&a)).unwrap();
    a.add_attr(AttrSpec::double("x").keyable(true)).unwrap();
    b.add_attr(AttrSpec::double("x").keyable(true)).unwrap();

    a.set("x", 5.0).unwrap();
    a.plug("x").unwrap().connect(&b.plug("x").unwrap(), true).unwrap();
    assert_eq!(b.get("x").unwrap(), Value::Float(5.0));
    assert_eq!(b.path().unwrap(), "|A|B");

    a.plug("x").unwrap().disconnect(Some(&b.plug("x").unwrap())).unwrap();
    assert!(!b.plug("x").unwrap().connected().unwrap());
    a.set("x", 7.0).unwrap();
    assert_eq!(b.get("x").unwrap(), Value::Float(5.0));
    assert_eq!(a.get("x").unwrap(), Value::Float(7.0));
}

// --- undo ----------------------------------------------------------------

#[test]
fn test_committed_modifier_is_undoable() {
    let (host, session) = setup();
    let node = session.create_node("transform", Some("A"), None).unwrap();
    let tx = node.plug("translateX").unwrap();
    session.modify(|m| m.set_attr(&tx, 4.0)).unwrap();
    assert_eq!(host.undo_depth(), 2);
    assert!(session.undo_bridge().slot_is_empty());

    host.undo().unwrap();
    assert_eq!(tx.read().unwrap(), Value::Float(0.0));
    host.redo().unwrap();
    assert_eq!(tx.read().unwrap(), Value::Float(4.0));

    host.undo().unwrap();
    host.undo().unwrap();
    assert!(!node.exists());
    assert!(host.lookup("A").is_empty());

    host.redo().unwrap();
    assert!(node.exists());
    assert!(session.undo_bridge().slot_is_empty());
}

#[test]
fn test_immediate_modifier_skips_undo_queue() {
    let (host, session) = setup();
    session
        .modify_with(ModifierOptions::immediate(), |m| m.create_node("transform", None, None))
        .unwrap();
    assert_eq!(host.undo_depth(), 0);
    assert!(!session.undo_bridge().is_installed());
}

#[test]
fn test_undo_disabled_by_config() {
    let (host, session) = setup_with(ProxyConfig {
        undo_enabled: false,
        ..ProxyConfig::default()
    });
    session.create_node("transform", None, None).unwrap();
    assert_eq!(host.undo_depth(), 0);
}

#[test]
fn test_bridge_runs_closures_in_order() {
    let host = MemoryHost::new();
    let bridge = UndoBridge::new(Some("order"));
    let calls = Rc::new(RefCell::new(Vec::new()));

    let log = calls.clone();
    let undo: UndoFn = Box::new(move || {
        log.borrow_mut().push("f");
        Ok(())
    });
    let log = calls.clone();
    let redo: UndoFn = Box::new(move || {
        log.borrow_mut().push("g");
        Ok(())
    });

    bridge.commit(&host, undo, redo).unwrap();
    assert!(bridge.slot_is_empty());
    assert!(calls.borrow().is_empty());

    host.undo().unwrap();
    host.redo().unwrap();
    assert_eq!(*calls.borrow(), vec!["f", "g"]);
    assert!(bridge.slot_is_empty());

    host.flush_undo();
    assert_eq!(bridge.pending_closures(), 0);
}

#[test]
fn test_refused_bridge_is_reported() {
    let (host, session) = setup();
    host.set_refuse_commands(true);

    let error = session.create_node("transform", Some("A"), None).unwrap_err();
    assert!(matches!(error, Error::UndoUnavailable { .. }));
    assert!(error.to_string().contains(session.undo_bridge().command_name()));
    assert!(session.undo_bridge().is_unavailable());
    assert_eq!(host.lookup("A").len(), 1);

    let error = session.modify(|m| m.create_node("network", None, None)).unwrap_err();
    assert!(matches!(error, Error::UndoUnavailable { .. }));
}

#[test]
fn test_sessions_use_distinct_commands() {
    let host = MemoryHost::new();
    let first = Session::with_config(Rc::new(host.clone()), ProxyConfig::default());
    let second = Session::with_config(Rc::new(host.clone()), ProxyConfig::default());
    assert_ne!(first.undo_bridge().command_name(), second.undo_bridge().command_name());

    first.create_node("transform", Some("A"), None).unwrap();
    second.create_node("transform", Some("B"), None).unwrap();
    assert_eq!(host.undo_depth(), 2);

    host.undo().unwrap();
    assert!(host.lookup("B").is_empty());
    assert_eq!(host.lookup("A").len(), 1);
}
