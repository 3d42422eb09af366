//! Integration tests for failure modes
//!
//! Covers fatal encode errors, the excluded-value escape hatch, promise settling,
//! and the decode-side preconditions.

use super::common::fixtures::{pause_now, prop, round_trip};
use serde_json::json;
use statewire::snapshot::{DecodeContext, EncodeContext, Serializer, Tag};
use statewire::{
    Container, DecodeError, Document, Heap, Object, Registry, Root, SerializeError, SnapshotData,
    SymbolRegistry, Value,
};

/// Test that an unserializable value names its path
#[test]
fn test_unserializable_value_reports_path() {
    let mut heap = Heap::new();
    let socket = heap.native("WebSocket");
    let list = heap.array([Value::Null, Value::Object(socket)]);
    let root = heap.object([("connections", Value::Object(list))]);

    let err = pause_now(&mut heap, &mut Document::new("div"), &[Root::new(root)]).unwrap_err();
    match err {
        SerializeError::UnserializableValue { path, type_name } => {
            assert_eq!(path, "roots[0].connections[1]");
            assert_eq!(type_name, "WebSocket");
        }
        other => panic!("Expected UnserializableValue, got {other}"),
    }
}

/// Test that excluded values resume as undefined
#[test]
fn test_excluded_values_become_undefined() {
    let mut heap = Heap::new();
    let timer = heap.native("Timer");
    heap.no_serialize(timer);
    let handler = heap.qrl("app.js", "tick", vec![Value::Object(timer)]);
    let root = heap.object([
        ("timer", Value::Object(timer)),
        ("tick", Value::Object(handler)),
    ]);

    let (_, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(root)]);

    let resumed = container.root(0).unwrap();
    assert_eq!(prop(&container, &resumed, "timer"), Value::Undefined);
    let tick = prop(&container, &resumed, "tick");
    match container.heap().get(tick.as_object().unwrap()) {
        Object::Qrl(qrl) => assert_eq!(qrl.captures, vec![Value::Undefined]),
        other => panic!("Expected a QRL, got {other:?}"),
    }
}

/// Test that an element outside the document cannot be paused
#[test]
fn test_detached_element_is_rejected() {
    let mut doc = Document::new("div");
    let orphan = doc.create_element("span");
    let mut heap = Heap::new();
    let element = heap.element(orphan);

    let err = pause_now(&mut heap, &mut doc, &[Root::new(element)]).unwrap_err();
    assert!(matches!(err, SerializeError::DetachedNode(_)));
}

/// Test that a pending promise is awaited and a rejection is preserved
#[tokio::test]
async fn test_rejected_promise_is_preserved() {
    let mut heap = Heap::new();
    let reason = heap.error("network down", Some("at fetch".to_string()));
    let promise = heap.promise(async move {
        tokio::task::yield_now().await;
        Err(Value::Object(reason))
    });
    let root = heap.object([("data", Value::Object(promise))]);

    let mut doc = Document::new("div");
    statewire::pause(
        &mut heap,
        &mut doc,
        &[Root::new(root)],
        &Registry::builtin(),
        &Default::default(),
    )
    .await
    .unwrap();

    let mut container = Container::new(doc, SymbolRegistry::new());
    container.resume().unwrap();
    let resumed = container.root(0).unwrap();
    let data = prop(&container, &resumed, "data");

    let rejection = container.await_promise(&data).await.unwrap_err();
    match container.heap().get(rejection.as_object().unwrap()) {
        Object::Error(error) => {
            assert_eq!(error.message, "network down");
            assert_eq!(error.stack, None);
        }
        other => panic!("Expected an Error, got {other:?}"),
    }
}

/// Test that a promise resolving to a new object pulls that object into the snapshot
#[tokio::test]
async fn test_resolved_promise_value_is_collected() {
    let mut heap = Heap::new();
    let payload = heap.object([("items", Value::from(3))]);
    let promise = heap.promise(async move { Ok(Value::Object(payload)) });

    let mut doc = Document::new("div");
    statewire::pause(
        &mut heap,
        &mut doc,
        &[Root::new(promise)],
        &Registry::builtin(),
        &Default::default(),
    )
    .await
    .unwrap();

    let mut container = Container::new(doc, SymbolRegistry::new());
    container.resume().unwrap();
    let resumed = container.root(0).unwrap();
    let value = container.await_promise(&resumed).await.unwrap();
    assert_eq!(prop(&container, &value, "items"), Value::from(3));
}

/// Test that a promise settling to another pending promise is drained in a later round
#[tokio::test]
async fn test_chained_promises_are_drained() {
    let mut heap = Heap::new();
    let payload = heap.object([("user", Value::from("ada"))]);
    let inner = heap.promise(async move {
        tokio::task::yield_now().await;
        Ok(Value::Object(payload))
    });
    let outer = heap.promise(async move {
        tokio::task::yield_now().await;
        Ok(Value::Object(inner))
    });

    let mut doc = Document::new("div");
    statewire::pause(
        &mut heap,
        &mut doc,
        &[Root::new(outer)],
        &Registry::builtin(),
        &Default::default(),
    )
    .await
    .unwrap();

    let mut container = Container::new(doc, SymbolRegistry::new());
    container.resume().unwrap();
    let resumed = container.root(0).unwrap();

    let inner = container.await_promise(&resumed).await.unwrap();
    assert!(matches!(
        container.heap().get(inner.as_object().unwrap()),
        Object::Promise(_)
    ));
    let value = container.await_promise(&inner).await.unwrap();
    assert_eq!(prop(&container, &value, "user"), Value::from("ada"));
}

/// Test that a document cannot be resumed twice
#[test]
fn test_already_resumed_is_rejected() {
    let mut heap = Heap::new();
    let root = heap.object([("n", Value::from(1))]);
    let (_, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(root)]);

    assert!(matches!(container.resume(), Err(DecodeError::AlreadyResumed)));

    let mut second = Container::new(container.document().clone(), SymbolRegistry::new());
    assert!(matches!(second.resume(), Err(DecodeError::AlreadyResumed)));
}

/// Test that a document without a snapshot is reported as malformed
#[test]
fn test_missing_snapshot_is_malformed() {
    let mut container = Container::new(Document::new("div"), SymbolRegistry::new());
    assert!(matches!(
        container.resume(),
        Err(DecodeError::MalformedSnapshot(_))
    ));
}

fn container_for(data: &SnapshotData, registry: Registry) -> Container {
    let mut doc = Document::new("div");
    doc.embed_snapshot(&data.to_text().unwrap(), "");
    let mut container = Container::new(doc, SymbolRegistry::new()).with_registry(registry);
    container.resume().unwrap();
    container
}

/// Test that a reference to a cell outside the table is fatal
#[test]
fn test_missing_object_id() {
    let data = SnapshotData {
        roots: vec!["0".to_string()],
        objs: vec![json!({"a": "\u{2}z"})],
        subs: vec![],
    };
    let mut container = container_for(&data, Registry::builtin());
    assert!(matches!(
        container.root(0),
        Err(DecodeError::MissingObjectId(35))
    ));
}

/// Test that a cell which failed after construction keeps its identity on retry
#[test]
fn test_failed_fill_keeps_placeholder_identity() {
    let data = SnapshotData {
        roots: vec!["0".to_string()],
        objs: vec![
            json!(["\u{2}1"]),
            json!({"back": "\u{2}0", "missing": "\u{2}z"}),
        ],
        subs: vec![],
    };
    let mut container = container_for(&data, Registry::builtin());
    assert!(matches!(
        container.root(0),
        Err(DecodeError::MissingObjectId(35))
    ));
    assert!(container.is_materialized(0));
    assert!(container.is_materialized(1));

    let list = container.root(0).unwrap();
    assert_eq!(container.get_object(0).unwrap(), list);
    assert!(container.get_object(1).unwrap().as_object().is_some());
}

/// Test that unknown tags degrade to literal strings
#[test]
fn test_unknown_tag_passes_through() {
    let data = SnapshotData {
        roots: vec!["0".to_string()],
        objs: vec![json!(["\u{19}future payload", "\u{1a}\u{19}escaped"])],
        subs: vec![],
    };
    let mut container = container_for(&data, Registry::builtin());
    let resumed = container.root(0).unwrap();
    match container.heap().get(resumed.as_object().unwrap()) {
        Object::Array(items) => {
            assert_eq!(items[0], Value::from("\u{19}future payload"));
            assert_eq!(items[1], Value::from("\u{19}escaped"));
        }
        other => panic!("Expected an array, got {other:?}"),
    }
}

/// Serializer whose construct step asks for its own payload ordinal.
struct SelfReferencing;

impl Serializer for SelfReferencing {
    fn tag(&self) -> Tag {
        Tag::new(0x18).unwrap()
    }

    fn test(&self, _value: &Value, _heap: &Heap) -> bool {
        false
    }

    fn encode(&self, _value: &Value, _ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        Ok(String::new())
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        ctx.resolve(payload)
    }
}

/// Test that a cell requesting itself during construction is rejected
#[test]
fn test_reentrant_decode_is_rejected() {
    let mut registry = Registry::builtin();
    registry.register(Box::new(SelfReferencing)).unwrap();
    let data = SnapshotData {
        roots: vec!["0".to_string()],
        objs: vec![json!("\u{18}0")],
        subs: vec![],
    };
    let mut container = container_for(&data, registry);
    assert!(matches!(
        container.root(0),
        Err(DecodeError::ReentrantDecode(0))
    ));
}

/// Test that decoding before resume is rejected
#[test]
fn test_decode_before_resume() {
    let mut container = Container::new(Document::new("div"), SymbolRegistry::new());
    assert!(matches!(container.get_object(0), Err(DecodeError::NotResumed)));
}
