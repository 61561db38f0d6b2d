//! Integration tests for void_proxy
//!
//! Tests wrapper identity, lifecycle notifications, value conversion,
//! caching and array bookkeeping against the in-memory host.

use std::cell::Cell;
use std::f64::consts::PI;
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

// --- identity ------------------------------------------------------------

#[test]
fn test_resolve_returns_same_wrapper() {
    let (host, session) = setup();
    let a = host.create("transform", Some("A"), None).unwrap();

    let first = session.resolve(a).unwrap();
    let reused = session.stats().node_reuse();
    let second = session.resolve(a).unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(session.stats().node_reuse(), reused + 1);
    assert_eq!(session.stats().node_init(), 1);
    assert_eq!(session.encode("A").unwrap(), first);
    assert_eq!(session.from_hash(first.hash_code()).unwrap(), first);
    assert_eq!(session.from_hex(&first.hex()).unwrap(), first);
}

#[test]
fn test_dropped_wrapper_is_rebuilt() {
    let (host, session) = setup();
    let a = host.create("transform", Some("A"), None).unwrap();

    let node = session.resolve(a).unwrap();
    let hash = node.hash_code();
    assert_eq!(session.registry_len(), 1);
    assert_eq!(host.callback_count(), 2);

    drop(node);
    assert_eq!(session.registry_len(), 0);
    assert_eq!(host.callback_count(), 0);
    assert!(session.from_hash(hash).is_none());

    let again = session.resolve(a).unwrap();
    assert_eq!(again.hash_code(), hash);
    assert_eq!(session.stats().node_init(), 2);
}

#[test]
fn test_safe_mode_skips_caching() {
    let config = ProxyConfig {
        safe_mode: true,
        ..ProxyConfig::default()
    };
    let (host, session) = setup_with(config);
    let a = host.create("transform", Some("A"), None).unwrap();

    let first = session.resolve(a).unwrap();
    let second = session.resolve(a).unwrap();
    assert!(!first.ptr_eq(&second));
    assert_eq!(session.stats().node_reuse(), 0);
    assert_eq!(session.registry_len(), 0);

    first.plug("translateX").unwrap();
    first.plug("translateX").unwrap();
    assert_eq!(session.stats().plug_reuse(), 0);
}

#[test]
fn test_plug_lookups_are_cached() {
    let (_host, session) = setup();
    let node = session.create_node("transform", Some("A"), None).unwrap();

    node.plug("translateX").unwrap();
    assert_eq!(session.stats().plug_reuse(), 0);
    node.plug("translateX").unwrap();
    assert_eq!(session.stats().plug_reuse(), 1);
}

#[test]
fn test_wrapper_kind_follows_capabilities() {
    let (_host, session) = setup();
    let xform = session.create_node("transform", None, None).unwrap();
    let set = session.create_node("objectSet", None, None).unwrap();
    let curve = session.create_node("animCurveTU", None, None).unwrap();
    let net = session.create_node("network", None, None).unwrap();

    assert_eq!(xform.kind(), NodeKind::Dag);
    assert_eq!(set.kind(), NodeKind::ObjectSet);
    assert_eq!(curve.kind(), NodeKind::AnimCurve);
    assert_eq!(net.kind(), NodeKind::Dg);
    assert!(xform.as_dag().is_some());
    assert!(net.as_dag().is_none());
}

#[test]
fn test_encode_unique_rejects_missing() {
    let (_host, session) = setup();
    let error = session.encode_unique("nothing").unwrap_err();
    assert!(error.is_existence());
    assert!(error.to_string().contains("nothing"));
}

// --- lifecycle -----------------------------------------------------------

#[test]
fn test_delete_is_not_destruction() {
    let (host, session) = setup();
    let node = session.create_node("transform", Some("A"), None).unwrap();
    let removals = Rc::new(Cell::new(0));
    let counter = removals.clone();
    node.on_removed(move |_| counter.set(counter.get() + 1));

    session.modify(|m| m.delete_node(&node)).unwrap();
    assert_eq!(removals.get(), 1);
    assert!(node.is_removed());
    assert!(!node.is_destroyed());
    assert!(!node.exists());
    assert!(node.is_alive());

    host.undo().unwrap();
    assert!(node.exists());
    assert_eq!(node.get("visibility").unwrap(), Value::Bool(true));
}

fn assert_destruction_is_final(config: ProxyConfig) {
    let (host, session) = setup_with(config);
    let node = session.create_node("transform", Some("A"), None).unwrap();
    node.plug("translateX").unwrap();

    let destroyed = Rc::new(Cell::new(0));
    let counter = destroyed.clone();
    node.on_destroyed(move |_| counter.set(counter.get() + 1));

    session.modify(|m| m.delete_node(&node)).unwrap();
    host.flush_undo();

    assert!(node.is_destroyed());
    assert!(!node.exists());
    assert_eq!(destroyed.get(), 1);
    assert!(node.get("translateX").unwrap_err().is_existence());
    assert!(node.set("translateX", 1.0).unwrap_err().is_existence());
    assert!(node.path().unwrap_err().is_existence());
    assert!(session.resolve(node.handle()).unwrap_err().is_existence());

    host.new_scene();
    assert!(node.is_destroyed());
    assert_eq!(destroyed.get(), 1);
}

#[test]
fn test_destruction_is_final() {
    assert_destruction_is_final(ProxyConfig::default());
}

#[test]
fn test_destruction_is_final_in_rogue_mode() {
    assert_destruction_is_final(ProxyConfig {
        rogue_mode: true,
        ..ProxyConfig::default()
    });
}

#[test]
fn test_guard_message_names_node() {
    let (host, session) = setup();
    let node = session.create_node("transform", Some("pCube1"), None).unwrap();
    host.new_scene();

    let error = node.type_name().unwrap_err();
    assert_eq!(
        error.to_string(),
        "existence error: cannot perform operation on deleted node '|pCube1'"
    );
}

#[test]
fn test_new_scene_releases_registry() {
    let (host, session) = setup();
    let node = session.create_node("transform", Some("A"), None).unwrap();
    assert_eq!(session.registry_len(), 1);

    host.new_scene();
    assert_eq!(session.registry_len(), 0);
    assert_eq!(host.callback_count(), 0);
    drop(node);
}

// --- values --------------------------------------------------------------

fn node_with_attrs(session: &Session) -> Node {
    let node = session.create_node("transform", Some("A"), None).unwrap();
    node.add_attr(AttrSpec::long("count")).unwrap();
    node.add_attr(AttrSpec::double("weight")).unwrap();
    node.add_attr(AttrSpec::string("label")).unwrap();
    node.add_attr(AttrSpec::matrix("offset")).unwrap();
    node.add_attr(AttrSpec::time("delay")).unwrap();
    node.add_attr(AttrSpec::double("values").array()).unwrap();
    node.add_attr(AttrSpec::enumeration("mode", &[("off", 0), ("on", 1)])).unwrap();
    node
}

#[test]
fn test_round_trip_every_kind() {
    let (_host, session) = setup();
    let node = node_with_attrs(&session);

    node.set("visibility", false).unwrap();
    assert_eq!(node.get("visibility").unwrap(), Value::Bool(false));

    node.set("count", 7).unwrap();
    assert_eq!(node.get("count").unwrap(), Value::Int(7));

    node.set("weight", 0.25).unwrap();
    assert_eq!(node.get("weight").unwrap(), Value::Float(0.25));

    node.set("label", "hello").unwrap();
    assert_eq!(node.get("label").unwrap(), Value::from("hello"));

    node.set("translate", [1.0, 2.0, 3.0]).unwrap();
    assert!(node
        .get("translate")
        .unwrap()
        .approx_eq(&Value::Vector([1.0, 2.0, 3.0]), 1e-9));

    let mut matrix = [0.0; 16];
    for (i, cell) in matrix.iter_mut().enumerate() {
        *cell = i as f64 * 0.5;
    }
    node.set("offset", matrix).unwrap();
    assert_eq!(node.get("offset").unwrap(), Value::Matrix(matrix));

    node.set("values", vec![Value::Float(1.0), Value::Float(2.0)]).unwrap();
    assert_eq!(
        node.get("values").unwrap(),
        Value::Tuple(vec![Value::Float(1.0), Value::Float(2.0)])
    );

    node.set("scale", vec![Value::Float(2.0), Value::Float(3.0), Value::Float(4.0)])
        .unwrap();
    assert_eq!(node.plug("scale").unwrap().as_vector().unwrap(), [2.0, 3.0, 4.0]);

    node.set("mode", "on").unwrap();
    assert_eq!(node.get("mode").unwrap(), Value::Int(1));
}

#[test]
fn test_round_trip_units() {
    let (_host, session) = setup();
    let node = node_with_attrs(&session);

    let degrees = node.plug_in("rotateX", Unit::DEGREES).unwrap();
    degrees.write(90.0).unwrap();
    assert!(degrees.read().unwrap().approx_eq(&Value::Float(90.0), 1e-9));
    let radians = node.plug_in("rotateX", Unit::RADIANS).unwrap();
    assert!(radians.read().unwrap().approx_eq(&Value::Float(PI / 2.0), 1e-9));

    node.plug_in("translateY", Unit::METERS).unwrap().write(2.0).unwrap();
    let centimeters = node.plug_in("translateY", Unit::CENTIMETERS).unwrap();
    assert!(centimeters.read().unwrap().approx_eq(&Value::Float(200.0), 1e-9));

    node.set("translateZ", Value::quantity(10.0, Unit::MILLIMETERS)).unwrap();
    assert!(node
        .plug_in("translateZ", Unit::CENTIMETERS)
        .unwrap()
        .read()
        .unwrap()
        .approx_eq(&Value::Float(1.0), 1e-9));

    node.plug_in("delay", Unit::SECONDS).unwrap().write(1.5).unwrap();
    let millis = node.plug_in("delay", Unit::MILLISECONDS).unwrap();
    assert!(millis.read().unwrap().approx_eq(&Value::Float(1500.0), 1e-6));
}

#[test]
fn test_unit_mismatch_is_type_error() {
    let (_host, session) = setup();
    let node = session.create_node("transform", None, None).unwrap();

    let error = node.plug_in("rotateX", Unit::METERS).unwrap().read().unwrap_err();
    assert!(error.is_type());
    assert!(error.to_string().contains("rotateX"));

    let error = node.set("rotateX", Value::meters(1.0)).unwrap_err();
    assert!(error.is_type());
}

#[test]
fn test_cached_read_needs_no_host() {
    let (host, session) = setup();
    let node = node_with_attrs(&session);

    node.set("weight", 0.5).unwrap();
    node.plug_in("rotateY", Unit::DEGREES).unwrap().write(45.0).unwrap();
    let reads = host.reads();
    host.set_fail_reads(true);

    assert_eq!(node.get_cached("weight", None).unwrap(), Value::Float(0.5));
    assert!(node
        .get_cached("rotateY", Some(Unit::DEGREES))
        .unwrap()
        .approx_eq(&Value::Float(45.0), 1e-9));
    assert_eq!(node.plug("weight").unwrap().read_cached().unwrap(), Value::Float(0.5));
    assert_eq!(host.reads(), reads);

    assert!(node.get("weight").is_err());
    host.set_fail_reads(false);
}

#[test]
fn test_locked_plug_refuses_writes() {
    let (_host, session) = setup();
    let node = session.create_node("transform", None, None).unwrap();
    let plug = node.plug("translateX").unwrap();

    plug.lock().unwrap();
    assert!(plug.locked().unwrap());
    assert!(!plug.writable().unwrap());
    assert!(plug.write(1.0).unwrap_err().is_locked());

    plug.unlock().unwrap();
    plug.write(1.0).unwrap();
    assert_eq!(plug.as_double().unwrap(), 1.0);
}

#[test]
fn test_connected_plug_refuses_writes() {
    let (_host, session) = setup();
    let a = session.create_node("transform", Some("A"), None).unwrap();
    let b = session.create_node("transform", Some("B"), None).unwrap();
    a.plug("translateX").unwrap().connect(&b.plug("translateX").unwrap(), true).unwrap();

    let error = b.set("translateX", 3.0).unwrap_err();
    assert!(error.is_locked());

    let c = session.create_node("transform", Some("C"), None).unwrap();
    let error = c
        .plug("translateX")
        .unwrap()
        .connect(&b.plug("translateX").unwrap(), false)
        .unwrap_err();
    assert!(error.is_locked());
}

#[test]
fn test_blocked_child_leaves_compound_untouched() {
    let (_host, session) = setup();
    let a = session.create_node("transform", Some("A"), None).unwrap();
    let b = session.create_node("transform", Some("B"), None).unwrap();
    a.plug("translateX").unwrap().connect(&b.plug("translateZ").unwrap(), true).unwrap();

    let error = b.set("translate", [1.0, 2.0, 3.0]).unwrap_err();
    assert!(error.is_locked());
    assert_eq!(b.get("translateX").unwrap(), Value::Float(0.0));
    assert_eq!(b.get("translateY").unwrap(), Value::Float(0.0));

    b.plug("translateZ").unwrap().disconnect(None).unwrap();
    b.plug("translateY").unwrap().lock().unwrap();
    assert!(b.set("translate", [1.0, 2.0, 3.0]).unwrap_err().is_locked());
    assert_eq!(b.get("translateX").unwrap(), Value::Float(0.0));
}

#[test]
fn test_defaults_and_reset() {
    let (_host, session) = setup();
    let node = session.create_node("transform", None, None).unwrap();
    let scale = node.plug("scale").unwrap();

    assert_eq!(
        scale.default().unwrap(),
        Value::Tuple(vec![1.0.into(), 1.0.into(), 1.0.into()])
    );
    scale.write([3.0, 3.0, 3.0]).unwrap();
    scale.reset().unwrap();
    assert_eq!(scale.as_vector().unwrap(), [1.0, 1.0, 1.0]);
}

#[test]
fn test_compound_children() {
    let (_host, session) = setup();
    let node = session.create_node("transform", None, None).unwrap();
    let translate = node.plug("translate").unwrap();

    assert!(translate.is_compound().unwrap());
    assert_eq!(translate.count().unwrap(), 3);
    translate.at(-1).unwrap().write(5.0).unwrap();
    assert_eq!(translate.child("translateZ").unwrap().as_double().unwrap(), 5.0);
    assert_eq!(translate.at(2).unwrap().name(false).unwrap(), "t.tz");
}

#[test]
fn test_unsupported_kind_names_itself() {
    let (_host, session) = setup();
    let choice = session.create_node("choice", None, None).unwrap();
    let error = choice.get("output").unwrap_err();
    assert!(error.is_type());
    assert!(error.to_string().contains("Unsupported type"));
}

#[test]
fn test_dump_as_json() {
    let (_host, session) = setup();
    let node = session.create_node("network", Some("net"), None).unwrap();
    node.add_attr(AttrSpec::double("weight")).unwrap();
    node.set("weight", 2.0).unwrap();

    let dumped = node.dumps().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&dumped).unwrap();
    assert_eq!(parsed["weight"], serde_json::json!(2.0));
}

// --- arrays --------------------------------------------------------------

#[test]
fn test_array_logical_indices_survive_disconnect() {
    let (_host, session) = setup();
    let sum = session.create_node("plusMinusAverage", None, None).unwrap();
    let input = sum.plug("input1D").unwrap();

    for index in 0..3 {
        let source = session.create_node("multDoubleLinear", None, None).unwrap();
        source
            .plug("output")
            .unwrap()
            .connect(&input.at(index).unwrap(), false)
            .unwrap();
    }
    assert_eq!(input.array_indices().unwrap(), vec![0, 1, 2]);

    input.at(1).unwrap().disconnect(None).unwrap();
    assert_eq!(input.array_indices().unwrap(), vec![0, 2]);
    assert_eq!(input.at(-1).unwrap().name(true).unwrap(), "input1D[2]");
    assert_eq!(input.next_available_index(0).unwrap(), 1);
    assert_eq!(input.count().unwrap(), 2);
}

#[test]
fn test_array_append() {
    let (_host, session) = setup();
    let node = session.create_node("network", None, None).unwrap();
    let values = node.add_attr(AttrSpec::double("values").array()).unwrap();

    values.at(0).unwrap().write(1.0).unwrap();
    values.at(3).unwrap().write(4.0).unwrap();

    let appended = values.append(5.0, false).unwrap();
    assert_eq!(appended.name(true).unwrap(), "values[4]");
    let filled = values.append(2.0, true).unwrap();
    assert_eq!(filled.name(true).unwrap(), "values[1]");
    assert_eq!(values.array_indices().unwrap(), vec![0, 1, 3, 4]);
}

#[test]
fn test_append_past_last_index_is_existence_error() {
    let (_host, session) = setup();
    let node = session.create_node("network", None, None).unwrap();
    let values = node.add_attr(AttrSpec::double("values").array()).unwrap();

    values.at(i64::from(u32::MAX)).unwrap().write(1.0).unwrap();
    assert!(values.append(2.0, false).unwrap_err().is_existence());
    assert!(values.next_available_index(u32::MAX).unwrap_err().is_existence());
    assert_eq!(values.next_available_index(0).unwrap(), 0);
}

// --- hierarchy, sets, curves ---------------------------------------------

#[test]
fn test_dag_navigation() {
    let (_host, session) = setup();
    let root = session.create_node("transform", Some("root"), None).unwrap();
    let arm = session.create_node("joint", Some("arm"), Some(&root)).unwrap();
    let hand = session.create_node("joint", Some("hand"), Some(&arm)).unwrap();
    let loc = session.create_node("locator", Some("loc"), Some(&root)).unwrap();

    let hand = hand.as_dag().unwrap();
    assert_eq!(hand.path().unwrap(), "|root|arm|hand");
    assert_eq!(hand.level().unwrap(), 2);
    assert_eq!(*hand.root().unwrap(), root);
    assert_eq!(*hand.parent(Some("transform")).unwrap().unwrap(), root);

    let root_dag = root.as_dag().unwrap();
    let children: Vec<Node> = root_dag.children(None).unwrap().iter().map(|c| c.node().clone()).collect();
    assert_eq!(children, vec![arm.clone(), loc.clone()]);
    let joints = root_dag.descendants(Some("joint")).unwrap();
    assert_eq!(joints.len(), 2);
    assert_eq!(*root_dag.descendant(Some("locator")).unwrap().unwrap(), loc);

    let named_a: Vec<String> = root_dag
        .descendants_where(|node| Ok(node.name(false)?.starts_with('a') || node.name(false)? == "loc"))
        .unwrap()
        .iter()
        .map(|node| node.name(false).unwrap())
        .collect();
    assert_eq!(named_a, vec!["arm", "loc"]);

    root_dag.add_child(hand.node()).unwrap();
    assert_eq!(hand.path().unwrap(), "|root|hand");
}

#[test]
fn test_object_set_members() {
    let (_host, session) = setup();
    let a = session.create_node("transform", Some("A"), None).unwrap();
    let b = session.create_node("transform", Some("B"), None).unwrap();
    let inner = session.create_node("objectSet", Some("inner"), None).unwrap().as_set().unwrap();
    let outer = session.create_node("objectSet", Some("outer"), None).unwrap().as_set().unwrap();

    inner.add(&b).unwrap();
    outer.add(&a).unwrap();
    outer.add(inner.node()).unwrap();
    outer.add(&b).unwrap();

    assert_eq!(outer.members().unwrap().len(), 3);
    assert_eq!(outer.flatten().unwrap(), vec![a.clone(), b.clone()]);
    assert!(inner.contains(&b).unwrap());

    outer.remove(&a).unwrap();
    assert!(!outer.contains(&a).unwrap());
    outer.clear().unwrap();
    assert!(outer.members().unwrap().is_empty());
}

#[test]
fn test_time_series_animates_plug() {
    let (_host, session) = setup();
    let node = session.create_node("transform", None, None).unwrap();
    let tx = node.plug("translateX").unwrap();

    tx.write(Value::keys(&[(0.0, 0.0), (1.0, 10.0)])).unwrap();

    let source = tx.source().unwrap().unwrap();
    let curve = source.node().as_curve().unwrap();
    assert_eq!(curve.type_name().unwrap(), "animCurveTL");
    assert_eq!(curve.keys().unwrap(), vec![(0.0, 0.0), (1.0, 10.0)]);
    assert!(tx.read_at(0.5).unwrap().approx_eq(&Value::Float(5.0), 1e-9));
}

#[test]
fn test_time_series_refuses_locked_plug() {
    let (host, session) = setup();
    let node = session.create_node("transform", None, None).unwrap();
    let tx = node.plug("translateX").unwrap();
    tx.lock().unwrap();
    let before = host.node_count();

    let error = tx.write(Value::keys(&[(0.0, 1.0)])).unwrap_err();
    assert!(error.is_locked());
    assert_eq!(host.node_count(), before);
    assert!(tx.source().unwrap().is_none());
}

#[test]
fn test_time_series_ignores_unit_on_plain_numbers() {
    let (_host, session) = setup();
    let node = session.create_node("network", None, None).unwrap();
    node.add_attr(AttrSpec::double("weight")).unwrap();
    let weight = node.plug("weight").unwrap().with_unit(Unit::DEGREES);

    weight.write(90.0).unwrap();
    assert_eq!(weight.read().unwrap(), Value::Float(90.0));

    weight.write(Value::keys(&[(0.0, 90.0)])).unwrap();
    let curve = weight.source().unwrap().unwrap().node().as_curve().unwrap();
    assert_eq!(curve.type_name().unwrap(), "animCurveTU");
    assert_eq!(curve.keys().unwrap(), vec![(0.0, 90.0)]);
}

// --- session -------------------------------------------------------------

#[test]
fn test_teardown_releases_everything() {
    let (host, session) = setup();
    let node = session.create_node("transform", Some("A"), None).unwrap();
    assert!(session.undo_bridge().is_installed());

    session.teardown().unwrap();
    assert_eq!(session.registry_len(), 0);
    assert_eq!(session.stats().node_init(), 0);
    assert!(!session.undo_bridge().is_installed());
    assert!(!host.has_command(session.undo_bridge().command_name()));
    assert_eq!(session.undo_bridge().pending_closures(), 0);
    assert!(node.exists());
}

#[test]
fn test_config_from_toml() {
    let config = ProxyConfig::from_toml_str(
        r#"
        [proxy]
        rogue_mode = true
        undo_identity = "rig tools"
        "#,
    )
    .unwrap();
    assert!(config.rogue());
    assert!(config.caching());

    let session = Session::with_config(Rc::new(MemoryHost::new()), config);
    assert!(session.undo_bridge().command_name().ends_with("_rig_tools"));
}
