//! Property tests for primitive fidelity
//!
//! Arbitrary strings (including ones that look like tags or close a script) and
//! arbitrary numbers must resume unchanged.

use super::common::fixtures::{items, round_trip};
use proptest::prelude::*;
use statewire::{Document, Heap, Root, Value};

fn tricky_string() -> impl Strategy<Value = String> {
    let alphabet = vec!['\u{0}', '\u{1a}', '\u{2}', '\u{d}', '<', '/', '!', 'a', 'b', 'z'];
    proptest::collection::vec(proptest::sample::select(alphabet), 0..24)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn strings_survive_pause_and_resume(text in tricky_string()) {
        let mut heap = Heap::new();
        let list = heap.array([Value::from(text.as_str()), Value::from(text.as_str())]);

        let (_, mut container) = round_trip(
            &mut heap,
            Document::new("div"),
            &[Root::new(text.as_str()), Root::new(list)],
        );

        prop_assert_eq!(container.root(0).unwrap(), Value::from(text.as_str()));
        let list = container.root(1).unwrap();
        for item in items(&container, &list) {
            prop_assert_eq!(item, Value::from(text.as_str()));
        }
    }

    #[test]
    fn numbers_survive_pause_and_resume(n in any::<f64>()) {
        let mut heap = Heap::new();
        let holder = heap.object([("n", Value::from(n))]);

        let (_, mut container) = round_trip(
            &mut heap,
            Document::new("div"),
            &[Root::new(n), Root::new(holder)],
        );

        let root = container.root(0).unwrap();
        let holder = container.root(1).unwrap();
        let nested = super::common::fixtures::prop(&container, &holder, "n");
        for resumed in [root, nested] {
            let back = resumed.as_f64().expect("Expected a number");
            if n.is_nan() {
                prop_assert!(back.is_nan());
            } else {
                prop_assert_eq!(back.to_bits(), n.to_bits());
            }
        }
    }
}
