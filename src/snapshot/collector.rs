//! Graph collector: walks the live graph from the roots and decides which values
//! get their own snapshot cell.
//!
//! A value is promoted to a cell when it is a root, when a tagged payload needs
//! its ordinal, when it is reactive, or when the walk reaches it a second time.
//! Everything else is written inline inside its single parent.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use tracing::debug;

use crate::config::SnapshotConfig;
use crate::dom::NodeId;
use crate::heap::{Heap, Object, ObjRef, PromiseState, Value};

use super::error::SerializeError;
use super::registry::Registry;

/// An externally reachable entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct Root {
    pub value: Value,
    /// Also collect the subscribers of reactive objects reached from this root.
    pub leaks: bool,
}

impl Root {
    /// A root whose reactive objects take their subscribers along (listeners).
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            leaks: true,
        }
    }

    /// A root whose subscribers are only kept if collected some other way.
    pub fn local(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            leaks: false,
        }
    }
}

/// Identity of a cell: an object handle or a primitive compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Object(ObjRef),
    Primitive(PrimitiveKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimitiveKey {
    Undefined,
    Null,
    Bool(bool),
    /// Bit pattern, so NaN and -0 are stable keys.
    Number(u64),
    BigInt(String),
    String(String),
}

impl PrimitiveKey {
    pub fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Undefined => PrimitiveKey::Undefined,
            Value::Null => PrimitiveKey::Null,
            Value::Bool(b) => PrimitiveKey::Bool(*b),
            Value::Number(n) => PrimitiveKey::Number(n.to_bits()),
            Value::BigInt(digits) => PrimitiveKey::BigInt(digits.clone()),
            Value::String(s) => PrimitiveKey::String(s.clone()),
            Value::Object(_) => return None,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            PrimitiveKey::Undefined => Value::Undefined,
            PrimitiveKey::Null => Value::Null,
            PrimitiveKey::Bool(b) => Value::Bool(*b),
            PrimitiveKey::Number(bits) => Value::Number(f64::from_bits(*bits)),
            PrimitiveKey::BigInt(digits) => Value::BigInt(digits.clone()),
            PrimitiveKey::String(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    SeenOnce,
    Promoted,
}

#[derive(Debug)]
struct PendingPromise {
    handle: ObjRef,
    leaks: bool,
    path: String,
}

#[derive(Debug, Default)]
struct CollectState {
    marks: HashMap<CellKey, Mark>,
    /// First-sighting order; ties for ordinal assignment break on it.
    order: Vec<CellKey>,
    excluded: HashSet<ObjRef>,
    pending: Vec<PendingPromise>,
    retained: HashSet<NodeId>,
    roots: Vec<(CellKey, bool)>,
}

/// Output of a collection pass, ready for the encoder.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// One entry per cell, in ordinal order. Cells with subscription edges come first.
    pub cells: Vec<CellKey>,
    pub ordinals: HashMap<CellKey, usize>,
    /// Ordinal of each root and whether it is referenced through its store wrapper.
    pub roots: Vec<(usize, bool)>,
    /// Length of the subscribed prefix of `cells`.
    pub subscribed: usize,
    /// Objects marked non-serializable that the walk reached.
    pub excluded: HashSet<ObjRef>,
    /// Document nodes referenced from the graph.
    pub retained: HashSet<NodeId>,
}

impl Collected {
    pub fn ordinal(&self, key: &CellKey) -> Option<usize> {
        self.ordinals.get(key).copied()
    }

    pub fn object_ordinal(&self, handle: ObjRef) -> Option<usize> {
        self.ordinal(&CellKey::Object(handle))
    }
}

/// Walk state handed to [`Serializer::collect`](super::registry::Serializer::collect).
pub struct Collector<'a> {
    heap: &'a Heap,
    registry: &'a Registry,
    long_string_threshold: usize,
    state: &'a mut CollectState,
    leaks: bool,
    path: Vec<String>,
}

impl<'a> Collector<'a> {
    fn new(
        heap: &'a Heap,
        registry: &'a Registry,
        config: &SnapshotConfig,
        state: &'a mut CollectState,
        leaks: bool,
        path: String,
    ) -> Self {
        Self {
            heap,
            registry,
            long_string_threshold: config.long_string_threshold,
            state,
            leaks,
            path: vec![path],
        }
    }

    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    pub fn leaks(&self) -> bool {
        self.leaks
    }

    /// Registers a child that must have its own ordinal (a tagged payload refers to it).
    pub fn capture(&mut self, value: &Value, segment: &str) -> Result<(), SerializeError> {
        self.path.push(segment.to_string());
        let result = self.visit(value, true);
        self.path.pop();
        result
    }

    /// Registers the subscribers of a reactive object when this walk leaks them.
    pub fn collect_subscribers(&mut self, target: ObjRef) -> Result<(), SerializeError> {
        if !self.leaks {
            return Ok(());
        }
        let heap = self.heap;
        let Some(manager) = heap.manager(target) else {
            return Ok(());
        };
        for (i, sub) in manager.subscribers().iter().enumerate() {
            self.capture(&Value::Object(sub.host()), &format!("#subs[{i}].host"))?;
            if let Some(node) = sub.node() {
                self.capture(&Value::Object(node), &format!("#subs[{i}].node"))?;
            }
        }
        Ok(())
    }

    /// Parks a pending promise until the current scan finishes.
    pub fn defer_promise(&mut self, handle: ObjRef) {
        self.state.pending.push(PendingPromise {
            handle,
            leaks: self.leaks,
            path: self.path_string(),
        });
    }

    /// Marks a document node as addressable from the snapshot.
    pub fn retain_node(&mut self, node: NodeId) {
        self.state.retained.insert(node);
    }

    pub fn path_string(&self) -> String {
        self.path.concat()
    }

    fn visit_root(&mut self, value: &Value) -> Result<(), SerializeError> {
        self.visit(value, true)?;
        let root = match value {
            Value::Object(handle) => {
                let (target, wrapped) = self.heap.unwrap_store(*handle);
                if self.heap.is_no_serialize(target) {
                    (CellKey::Primitive(PrimitiveKey::Undefined), false)
                } else {
                    (CellKey::Object(target), wrapped)
                }
            }
            primitive => match PrimitiveKey::of(primitive) {
                Some(key) => (CellKey::Primitive(key), false),
                None => (CellKey::Primitive(PrimitiveKey::Undefined), false),
            },
        };
        self.state.roots.push(root);
        Ok(())
    }

    fn visit(&mut self, value: &Value, forced: bool) -> Result<(), SerializeError> {
        match value {
            Value::Object(handle) => self.visit_object(*handle, forced),
            Value::String(s) if s.chars().count() > self.long_string_threshold => {
                self.see(CellKey::Primitive(PrimitiveKey::String(s.clone())), forced);
                Ok(())
            }
            primitive => {
                if forced {
                    if let Some(key) = PrimitiveKey::of(primitive) {
                        self.see(CellKey::Primitive(key), true);
                    }
                }
                Ok(())
            }
        }
    }

    fn visit_object(&mut self, handle: ObjRef, forced: bool) -> Result<(), SerializeError> {
        let heap = self.heap;
        let registry = self.registry;
        let (target, wrapped) = heap.unwrap_store(handle);

        if heap.is_no_serialize(target) {
            self.state.excluded.insert(target);
            if forced {
                self.see(CellKey::Primitive(PrimitiveKey::Undefined), true);
            }
            return Ok(());
        }

        let object = heap.get(target);
        let is_store_target = heap.store_of(target).is_some();
        let own_cell = forced || wrapped || is_store_target || object.is_reactive();
        if !self.see(CellKey::Object(target), own_cell) {
            return Ok(());
        }

        if is_store_target {
            self.collect_subscribers(target)?;
        }

        match object {
            Object::Plain(entries) => {
                for (key, child) in entries.iter() {
                    self.path.push(format!(".{key}"));
                    let result = self.visit(child, false);
                    self.path.pop();
                    result?;
                }
                Ok(())
            }
            Object::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    self.path.push(format!("[{i}]"));
                    let result = self.visit(child, false);
                    self.path.pop();
                    result?;
                }
                Ok(())
            }
            other => {
                let value = Value::Object(target);
                match registry.find(&value, heap) {
                    Some(serializer) => serializer.collect(&value, self),
                    None => Err(SerializeError::UnserializableValue {
                        path: self.path_string(),
                        type_name: other.type_name().to_string(),
                    }),
                }
            }
        }
    }

    /// Records a sighting. Returns true on the first one, when children still need walking.
    fn see(&mut self, key: CellKey, promote: bool) -> bool {
        match self.state.marks.get(&key) {
            Some(Mark::Promoted) => false,
            Some(Mark::SeenOnce) => {
                self.state.marks.insert(key, Mark::Promoted);
                false
            }
            None => {
                let mark = if promote { Mark::Promoted } else { Mark::SeenOnce };
                self.state.marks.insert(key.clone(), mark);
                self.state.order.push(key);
                true
            }
        }
    }
}

impl CollectState {
    fn finish(self, heap: &Heap) -> Collected {
        let marks = self.marks;
        let promoted: Vec<CellKey> = self
            .order
            .into_iter()
            .filter(|key| marks.get(key) == Some(&Mark::Promoted))
            .collect();
        let live: HashSet<CellKey> = promoted.iter().cloned().collect();
        let is_live = |handle: ObjRef| live.contains(&CellKey::Object(handle));

        let has_edges = |key: &CellKey| match key {
            CellKey::Object(handle) => {
                heap.store_of(*handle).is_some()
                    || heap.manager(*handle).is_some_and(|manager| {
                        manager
                            .subscribers()
                            .iter()
                            .any(|sub| is_live(sub.host()) && sub.node().map_or(true, is_live))
                    })
            }
            CellKey::Primitive(_) => false,
        };

        let (mut cells, rest): (Vec<CellKey>, Vec<CellKey>) =
            promoted.into_iter().partition(|key| has_edges(key));
        let subscribed = cells.len();
        cells.extend(rest);

        let ordinals: HashMap<CellKey, usize> = cells
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), i))
            .collect();
        let roots = self
            .roots
            .iter()
            .filter_map(|(key, wrapped)| ordinals.get(key).map(|ordinal| (*ordinal, *wrapped)))
            .collect();

        debug!(
            cells = cells.len(),
            subscribed,
            excluded = self.excluded.len(),
            retained = self.retained.len(),
            "Collected object graph"
        );

        Collected {
            cells,
            ordinals,
            roots,
            subscribed,
            excluded: self.excluded,
            retained: self.retained,
        }
    }
}

/// Walks the graph reachable from `roots`, draining promises as they are found.
///
/// Each round scans everything discovered so far, then awaits the whole batch of
/// pending promises and resumes the walk from their settled values. There is no
/// timeout: a promise that never settles stalls the pass.
pub async fn collect(
    heap: &mut Heap,
    registry: &Registry,
    roots: &[Root],
    config: &SnapshotConfig,
) -> Result<Collected, SerializeError> {
    let mut state = CollectState::default();
    for (i, root) in roots.iter().enumerate() {
        let mut collector = Collector::new(
            heap,
            registry,
            config,
            &mut state,
            root.leaks,
            format!("roots[{i}]"),
        );
        collector.visit_root(&root.value)?;
    }

    let mut round = 0usize;
    loop {
        let batch = std::mem::take(&mut state.pending);
        if batch.is_empty() {
            break;
        }
        round += 1;
        debug!(round, promises = batch.len(), "Awaiting pending promises");

        let mut parked = Vec::with_capacity(batch.len());
        let mut futures = Vec::with_capacity(batch.len());
        for pending in batch {
            match heap.take_promise_future(pending.handle) {
                Some(future) => {
                    parked.push(pending);
                    futures.push(future);
                }
                None => return Err(SerializeError::PendingPromise(pending.path)),
            }
        }

        let outcomes = join_all(futures).await;
        for (pending, outcome) in parked.iter().zip(outcomes) {
            heap.settle_promise(pending.handle, outcome);
        }

        for pending in parked {
            let settled = match heap.get(pending.handle) {
                Object::Promise(PromiseState::Resolved(value))
                | Object::Promise(PromiseState::Rejected(value)) => value.clone(),
                _ => return Err(SerializeError::PendingPromise(pending.path)),
            };
            let mut collector = Collector::new(
                heap,
                registry,
                config,
                &mut state,
                pending.leaks,
                pending.path,
            );
            collector.capture(&settled, ".settled")?;
        }
    }

    Ok(state.finish(heap))
}
