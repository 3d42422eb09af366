//! Integration tests for graph round trips
//!
//! Pause a heap, resume it in a fresh container, and check that identity, cycles
//! and every built-in value type come back intact.

use super::common::fixtures::{items, pause_now, pause_with, prop, round_trip, state};
use serde_json::json;
use statewire::heap::{RegExpData, STORE_RECURSIVE};
use statewire::{Container, Document, Heap, Object, Root, SnapshotConfig, Value};

fn field<'c>(container: &'c Container, parent: &Value, key: &str) -> &'c Object {
    let value = prop(container, parent, key);
    container.heap().get(value.as_object().expect("Expected an object property"))
}

/// Test that an object reached from two paths is stored once and resumes as one object
#[test]
fn test_shared_object_is_promoted_and_identity_preserved() {
    let mut heap = Heap::new();
    let shared = heap.object([("x", Value::from(1))]);
    let inner = heap.object([("c", Value::Object(shared))]);
    let root = heap.object([("a", Value::Object(shared)), ("b", Value::Object(inner))]);

    let (snapshot, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(root)]);

    let data = state(&snapshot);
    assert_eq!(data.objs.len(), 2, "Root and the shared object only");
    assert_eq!(data.objs[0], json!({"a": "\u{2}1", "b": {"c": "\u{2}1"}}));
    assert_eq!(data.objs[1], json!({"x": 1}));
    assert_eq!(data.roots, vec!["0".to_string()]);

    let resumed = container.root(0).unwrap();
    let a = prop(&container, &resumed, "a");
    let b = prop(&container, &resumed, "b");
    let c = prop(&container, &b, "c");
    assert_eq!(a, c, "Both paths should resolve to the same object");
    assert_eq!(prop(&container, &a, "x"), Value::from(1));
}

/// Test that a direct cycle terminates and resumes correctly linked
#[test]
fn test_cycle_round_trips() {
    let mut heap = Heap::new();
    let a = heap.object([("name", Value::from("a"))]);
    let b = heap.object([("back", Value::Object(a))]);
    if let Object::Plain(obj) = heap.get_mut(a) {
        obj.set("next", Value::Object(b));
    }

    let (_, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(a)]);

    let resumed_a = container.root(0).unwrap();
    let resumed_b = prop(&container, &resumed_a, "next");
    assert_eq!(prop(&container, &resumed_b, "back"), resumed_a);
    assert_eq!(prop(&container, &resumed_a, "name"), Value::from("a"));
}

/// Test that a Set whose second member contains the first keeps one shared member
#[test]
fn test_set_with_nested_member_keeps_identity() {
    let mut heap = Heap::new();
    let first = heap.object([("id", Value::from(1))]);
    let nested = heap.array([Value::Object(first)]);
    let set = heap.alloc(Object::Set(vec![Value::Object(first), Value::Object(nested)]));

    let (_, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(set)]);

    let resumed = container.root(0).unwrap();
    let members = items(&container, &resumed);
    assert_eq!(members.len(), 2);
    let inner = items(&container, &members[1]);
    assert_eq!(inner.len(), 1);
    assert_eq!(inner[0], members[0]);
}

/// Test that NaN is written through its tag and resumes as NaN
#[test]
fn test_nan_root() {
    let mut heap = Heap::new();
    let (snapshot, mut container) = round_trip(
        &mut heap,
        Document::new("div"),
        &[Root::new(Value::Number(f64::NAN))],
    );

    assert_eq!(state(&snapshot).objs, vec![json!("\u{e}NaN")]);
    assert!(container.root(0).unwrap().is_nan());
}

/// Test that primitives come back bit-identical
#[test]
fn test_primitive_fidelity() {
    let numbers = [
        0.0,
        -0.0,
        42.0,
        -7.25,
        1e21,
        f64::MAX,
        f64::MIN_POSITIVE,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ];
    let mut values = vec![
        Value::Undefined,
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::BigInt("-123456789012345678901234567890".to_string()),
        Value::Number(f64::NAN),
    ];
    values.extend(numbers.iter().map(|n| Value::Number(*n)));

    let mut heap = Heap::new();
    let root = heap.array(values.clone());
    let (_, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(root)]);

    let resumed = container.root(0).unwrap();
    let decoded = items(&container, &resumed);
    assert_eq!(decoded.len(), values.len());
    for (original, restored) in values.iter().zip(&decoded) {
        match (original, restored) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() => assert!(b.is_nan()),
            (Value::Number(a), Value::Number(b)) => {
                assert_eq!(a.to_bits(), b.to_bits(), "{a} should round-trip exactly")
            }
            _ => assert_eq!(original, restored),
        }
    }
}

/// Test that a repeated long string is stored once
#[test]
fn test_long_string_stored_once() {
    let long = "the quick brown fox jumps over";
    let mut heap = Heap::new();
    let root = heap.object([
        ("a", Value::from(long)),
        ("b", Value::from(long)),
        ("short", Value::from("tiny")),
    ]);

    let (snapshot, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(root)]);

    assert_eq!(snapshot.state.matches(long).count(), 1);
    let resumed = container.root(0).unwrap();
    assert_eq!(prop(&container, &resumed, "a"), Value::from(long));
    assert_eq!(prop(&container, &resumed, "b"), Value::from(long));
    assert_eq!(prop(&container, &resumed, "short"), Value::from("tiny"));
}

/// Test that raising the threshold keeps repeated strings inline
#[test]
fn test_long_string_threshold_is_configurable() {
    let long = "the quick brown fox jumps over";
    let mut heap = Heap::new();
    let root = heap.object([("a", Value::from(long)), ("b", Value::from(long))]);
    let mut doc = Document::new("div");
    let config = SnapshotConfig::default().with_long_string_threshold(100);

    let snapshot = pause_with(&mut heap, &mut doc, &[Root::new(root)], &config).unwrap();
    assert_eq!(snapshot.state.matches(long).count(), 2);
    assert_eq!(snapshot.stats.cells, 1);
}

/// Test that strings starting with a reserved byte survive unchanged
#[test]
fn test_reserved_prefix_strings_are_escaped() {
    let tricky = ["\u{1}abc", "\u{1a}", "\u{2}0", "\u{0}", "\u{1b}not reserved", "plain", ""];
    let mut heap = Heap::new();
    let root = heap.array(tricky.iter().map(|s| Value::from(*s)));

    let (snapshot, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(root)]);

    let data = state(&snapshot);
    assert_eq!(data.objs[0][0], json!("\u{1a}\u{1}abc"));
    assert_eq!(data.objs[0][4], json!("\u{1b}not reserved"));

    let resumed = container.root(0).unwrap();
    let decoded = items(&container, &resumed);
    let expected: Vec<Value> = tricky.iter().map(|s| Value::from(*s)).collect();
    assert_eq!(decoded, expected);
}

/// Test that `</` never appears in the embedded state
#[test]
fn test_closing_tags_are_escaped() {
    let payload = "</script><script>alert(1)</script>";
    let mut heap = Heap::new();
    let root = heap.object([("html", Value::from(payload))]);

    let (snapshot, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(root)]);

    assert!(!snapshot.state.contains("</"));
    assert!(snapshot.state.contains("<\\/script>"));
    let resumed = container.root(0).unwrap();
    assert_eq!(prop(&container, &resumed, "html"), Value::from(payload));
}

/// Test Date, RegExp, URL, Map and document round trips
#[test]
fn test_builtin_value_types() {
    let mut heap = Heap::new();
    let when = heap.alloc(Object::Date(86_400_000.0));
    let invalid = heap.alloc(Object::Date(f64::NAN));
    let re = heap.alloc(Object::RegExp(RegExpData {
        source: "^a+/b$".to_string(),
        flags: "gi".to_string(),
    }));
    let url = heap.alloc(Object::Url("https://example.com/a?b=1".to_string()));
    let value = heap.object([("v", Value::from(2))]);
    let map = heap.alloc(Object::Map(vec![
        (Value::from("key"), Value::Object(value)),
        (Value::from(1), Value::from("one")),
    ]));
    let document = heap.document();
    let root = heap.object([
        ("when", Value::Object(when)),
        ("invalid", Value::Object(invalid)),
        ("re", Value::Object(re)),
        ("url", Value::Object(url)),
        ("map", Value::Object(map)),
        ("doc", Value::Object(document)),
    ]);

    let (_, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(root)]);
    let resumed = container.root(0).unwrap();

    assert!(matches!(field(&container, &resumed, "when"), Object::Date(ms) if *ms == 86_400_000.0));
    assert!(matches!(field(&container, &resumed, "invalid"), Object::Date(ms) if ms.is_nan()));
    match field(&container, &resumed, "re") {
        Object::RegExp(re) => {
            assert_eq!(re.source, "^a+/b$");
            assert_eq!(re.flags, "gi");
        }
        other => panic!("Expected RegExp, got {other:?}"),
    }
    assert!(matches!(field(&container, &resumed, "url"), Object::Url(href) if href == "https://example.com/a?b=1"));
    assert!(matches!(field(&container, &resumed, "doc"), Object::Document));
    match field(&container, &resumed, "map") {
        Object::Map(entries) => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].0, Value::from("key"));
            assert_eq!(entries[1], (Value::from(1), Value::from("one")));
        }
        other => panic!("Expected Map, got {other:?}"),
    }
}

/// Test that error stacks only survive in dev mode
#[test]
fn test_error_stack_elided_outside_dev_mode() {
    for dev_mode in [false, true] {
        let mut heap = Heap::new();
        let error = heap.error("boom", Some("at render (app.js:1:1)".to_string()));
        let mut doc = Document::new("div");
        let config = SnapshotConfig::default().with_dev_mode(dev_mode);
        pause_with(&mut heap, &mut doc, &[Root::new(error)], &config).unwrap();

        let mut container = Container::new(doc, statewire::SymbolRegistry::new());
        container.resume().unwrap();
        let resumed = container.root(0).unwrap();
        match container.heap().get(resumed.as_object().unwrap()) {
            Object::Error(data) => {
                assert_eq!(data.message, "boom");
                assert_eq!(data.stack.is_some(), dev_mode);
            }
            other => panic!("Expected Error, got {other:?}"),
        }
    }
}

/// Test that element references re-link to the same document nodes
#[test]
fn test_element_references_relink() {
    let mut doc = Document::new("div");
    let root_node = doc.root();
    let header = doc.append_element(root_node, "header");
    let button = doc.append_element(header, "button");
    let label = doc.append_text(button, "Count: 0");

    let mut heap = Heap::new();
    let button_ref = heap.element(button);
    let label_ref = heap.element(label);
    let root = heap.object([("button", Value::Object(button_ref)), ("label", Value::Object(label_ref))]);

    let (snapshot, mut container) = round_trip(&mut heap, doc, &[Root::new(root)]);
    assert_eq!(snapshot.node_map, "1~1~I");
    assert_eq!(snapshot.stats.retained_nodes, 2);

    let resumed = container.root(0).unwrap();
    let restored = prop(&container, &resumed, "button");
    assert!(matches!(
        container.heap().get(restored.as_object().unwrap()),
        Object::Element(node) if *node == button
    ));
    let restored = prop(&container, &resumed, "label");
    assert!(matches!(
        container.heap().get(restored.as_object().unwrap()),
        Object::Element(node) if *node == label
    ));
}

/// Test that the container root element can itself be referenced
#[test]
fn test_container_root_element_relinks() {
    let mut doc = Document::new("div");
    let root_node = doc.root();
    let button = doc.append_element(root_node, "button");

    let mut heap = Heap::new();
    let host_ref = heap.element(root_node);
    let button_ref = heap.element(button);
    let root = heap.object([("host", Value::Object(host_ref)), ("button", Value::Object(button_ref))]);

    let (snapshot, mut container) = round_trip(&mut heap, doc, &[Root::new(root)]);
    assert!(snapshot.node_map.starts_with('^'));
    assert_eq!(snapshot.stats.retained_nodes, 2);

    let resumed = container.root(0).unwrap();
    let restored = prop(&container, &resumed, "host");
    assert!(matches!(
        container.heap().get(restored.as_object().unwrap()),
        Object::Element(node) if *node == root_node
    ));
    let restored = prop(&container, &resumed, "button");
    assert!(matches!(
        container.heap().get(restored.as_object().unwrap()),
        Object::Element(node) if *node == button
    ));
}

/// Test that a store root keeps its wrapper and flags
#[test]
fn test_store_root_keeps_flags() {
    let mut heap = Heap::new();
    let nested = heap.object([("deep", Value::Bool(true))]);
    let target = heap.object([("count", Value::from(1)), ("nested", Value::Object(nested))]);
    let store = heap.store(target, STORE_RECURSIVE);

    let (snapshot, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(store)]);

    let data = state(&snapshot);
    assert_eq!(data.roots, vec!["0!".to_string()]);
    assert_eq!(data.subs[0], vec![json!(STORE_RECURSIVE)]);

    let resumed = container.root(0).unwrap().as_object().unwrap();
    assert!(matches!(container.heap().get(resumed), Object::Store(_)));
    let heap = container.heap_mut();
    assert_eq!(heap.store_get(resumed, "count").unwrap(), Value::from(1));
    let nested = heap.store_get(resumed, "nested").unwrap().as_object().unwrap();
    assert!(matches!(heap.get(nested), Object::Store(_)), "Deep store wraps nested objects");
}

/// Test that pausing twice replaces the embedded snapshot
#[test]
fn test_repause_replaces_snapshot() {
    let mut heap = Heap::new();
    let root = heap.object([("n", Value::from(1))]);
    let mut doc = Document::new("div");

    pause_now(&mut heap, &mut doc, &[Root::new(root)]).unwrap();
    if let Object::Plain(obj) = heap.get_mut(root) {
        obj.set("n", Value::from(2));
    }
    let second = pause_now(&mut heap, &mut doc, &[Root::new(root)]).unwrap();

    assert_eq!(doc.snapshot_text(), Some(second.state.as_str()));
    let scripts = doc
        .children(doc.root())
        .iter()
        .filter(|id| doc.tag(**id) == Some("script"))
        .count();
    assert_eq!(scripts, 1);
}
