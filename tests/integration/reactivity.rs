//! Integration tests for subscription replay
//!
//! Subscribers serialized with a signal or store must be re-attached on resume so
//! that writes notify exactly the hosts that were listening before the pause.

use super::common::fixtures::{component, round_trip, state};
use statewire::heap::{HeapError, STORE_IMMUTABLE};
use statewire::{DecodeError, Document, Heap, Root, Subscriber, Value};

/// Test that a store write notifies whole-object listeners and matching keyed listeners only
#[test]
fn test_store_subscription_replay() {
    let mut heap = Heap::new();
    let target = heap.object([("count", Value::from(0)), ("label", Value::from("x"))]);
    let store = heap.store(target, 0);
    let whole = component(&mut heap, "Whole");
    let counter = component(&mut heap, "Counter");
    let labeler = component(&mut heap, "Labeler");
    heap.subscribe(store, Subscriber::Host { host: whole });
    heap.subscribe(
        store,
        Subscriber::Keyed {
            host: counter,
            key: "count".to_string(),
        },
    );
    heap.subscribe(
        store,
        Subscriber::Keyed {
            host: labeler,
            key: "label".to_string(),
        },
    );

    let roots = [
        Root::new(store),
        Root::local(whole),
        Root::local(counter),
        Root::local(labeler),
    ];
    let (_, mut container) = round_trip(&mut heap, Document::new("div"), &roots);

    let store = container.root(0).unwrap().as_object().unwrap();
    let whole = container.root(1).unwrap().as_object().unwrap();
    let counter = container.root(2).unwrap().as_object().unwrap();
    let labeler = container.root(3).unwrap().as_object().unwrap();

    let notified = container.set_store(store, "count", Value::from(5)).unwrap();
    assert_eq!(
        notified,
        vec![
            Subscriber::Host { host: whole },
            Subscriber::Keyed {
                host: counter,
                key: "count".to_string()
            },
        ]
    );

    let notified = container.set_store(store, "label", Value::from("y")).unwrap();
    assert_eq!(
        notified,
        vec![
            Subscriber::Host { host: whole },
            Subscriber::Keyed {
                host: labeler,
                key: "label".to_string()
            },
        ]
    );

    let notified = container.set_store(store, "other", Value::from(1)).unwrap();
    assert_eq!(notified, vec![Subscriber::Host { host: whole }]);
}

/// Test that writing the same value again notifies nobody
#[test]
fn test_same_value_write_is_silent() {
    let mut heap = Heap::new();
    let signal = heap.signal(Value::from(1));
    let host = component(&mut heap, "App");
    heap.subscribe(signal, Subscriber::Host { host });

    let (_, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(signal)]);
    let signal = container.root(0).unwrap().as_object().unwrap();

    assert!(container.set_signal(signal, Value::from(1)).unwrap().is_empty());
    assert_eq!(container.set_signal(signal, Value::from(2)).unwrap().len(), 1);
}

/// Test that attribute and text bindings are patched in the resumed document
#[test]
fn test_signal_patches_attribute_and_text() {
    let mut doc = Document::new("div");
    let root = doc.root();
    let button = doc.append_element(root, "button");
    let label = doc.append_text(button, "0");

    let mut heap = Heap::new();
    let count = heap.signal(Value::from(0));
    let host = component(&mut heap, "Counter");
    let button_ref = heap.element(button);
    let label_ref = heap.element(label);
    heap.subscribe(
        count,
        Subscriber::Attribute {
            host,
            node: button_ref,
            prop: "data-count".to_string(),
        },
    );
    heap.subscribe(
        count,
        Subscriber::Text {
            host,
            node: label_ref,
        },
    );

    let (snapshot, mut container) = round_trip(&mut heap, doc, &[Root::new(count)]);
    assert_eq!(state(&snapshot).subs[0].len(), 2);

    let count = container.root(0).unwrap().as_object().unwrap();
    let notified = container.set_signal(count, Value::from(5)).unwrap();
    assert_eq!(notified.len(), 2);
    assert_eq!(container.document().text(label), Some("5"));
    assert_eq!(container.document().attribute(button, "data-count"), Some("5"));
}

/// Test that a local root does not drag its subscribers into the snapshot
#[test]
fn test_local_root_drops_unreached_subscribers() {
    let mut heap = Heap::new();
    let signal = heap.signal(Value::from(0));
    let kept = component(&mut heap, "Kept");
    let dropped = component(&mut heap, "Dropped");
    heap.subscribe(signal, Subscriber::Host { host: kept });
    heap.subscribe(signal, Subscriber::Host { host: dropped });

    let roots = [Root::local(signal), Root::local(kept)];
    let (snapshot, mut container) = round_trip(&mut heap, Document::new("div"), &roots);
    assert_eq!(state(&snapshot).subs[0].len(), 1);

    let signal = container.root(0).unwrap().as_object().unwrap();
    let kept = container.root(1).unwrap().as_object().unwrap();
    let notified = container.set_signal(signal, Value::from(1)).unwrap();
    assert_eq!(notified, vec![Subscriber::Host { host: kept }]);
}

/// Test that subscribed objects get the lowest ordinals
#[test]
fn test_subscribed_cells_sort_first() {
    let mut heap = Heap::new();
    let signal = heap.signal(Value::from("on"));
    let host = component(&mut heap, "App");
    heap.subscribe(signal, Subscriber::Host { host });
    let root = heap.object([("enabled", Value::Object(signal))]);

    let (snapshot, _) = round_trip(&mut heap, Document::new("div"), &[Root::new(root)]);

    let data = state(&snapshot);
    assert_eq!(data.subs.len(), 1);
    assert!(data.objs[0].as_str().is_some_and(|s| s.starts_with('\u{d}')));
    assert_ne!(data.roots[0], "0");
}

/// Test that store flags survive and an immutable store rejects writes
#[test]
fn test_immutable_store_rejects_writes_after_resume() {
    let mut heap = Heap::new();
    let target = heap.object([("name", Value::from("fixed"))]);
    let store = heap.store(target, STORE_IMMUTABLE);

    let (_, mut container) = round_trip(&mut heap, Document::new("div"), &[Root::new(store)]);
    let store = container.root(0).unwrap().as_object().unwrap();

    let err = container
        .set_store(store, "name", Value::from("changed"))
        .unwrap_err();
    assert!(matches!(err, DecodeError::Heap(HeapError::Immutable(key)) if key == "name"));
}
