//! Resuming: lazily rebuilding the object graph from an embedded snapshot.
//!
//! Nothing is materialized by [`Container::resume`] itself; cells are decoded the
//! first time something asks for their ordinal. Each ordinal moves through
//! `Unrequested -> Computing -> Finalized`, and is cached as soon as its
//! placeholder exists so that circular children resolve to the same object.

pub mod loader;

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{anyhow, Context};
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::config::SnapshotConfig;
use crate::dom::{node_map, Document, NodeId, CONTAINER_STATE_ATTR, NODE_MAP_ATTR, STATE_RESUMED};
use crate::heap::{Heap, Object, ObjRef, PromiseState, Subscriber, Value};
use crate::snapshot::subs::{parse_edges, EdgeSpec};
use crate::snapshot::tags::{parse_reference, split_tagged, Tag};
use crate::snapshot::{DecodeContext, DecodeError, Registry, SnapshotData};

pub use loader::{ChunkLoader, LoadError, QrlFn, SymbolRegistry};

#[derive(Debug, Clone)]
enum Slot {
    Unrequested,
    Computing,
    Finalized(Value),
}

struct Resumed {
    data: SnapshotData,
    slots: Vec<Slot>,
    nodes: Vec<NodeId>,
}

/// A paused document brought back to life.
pub struct Container {
    document: Document,
    heap: Heap,
    registry: Rc<Registry>,
    config: SnapshotConfig,
    loader: Box<dyn ChunkLoader>,
    loaded: HashMap<(String, String), QrlFn>,
    resumed: Option<Resumed>,
}

impl Container {
    pub fn new(document: Document, loader: impl ChunkLoader + 'static) -> Self {
        Self {
            document,
            heap: Heap::new(),
            registry: Rc::new(Registry::builtin()),
            config: SnapshotConfig::default(),
            loader: Box::new(loader),
            loaded: HashMap::new(),
            resumed: None,
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Rc::new(registry);
        self
    }

    pub fn with_config(mut self, config: SnapshotConfig) -> Self {
        self.config = config;
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed.is_some()
    }

    /// Reads the embedded snapshot and node map and marks the document resumed.
    ///
    /// Fails with [`DecodeError::AlreadyResumed`] on a second call, or when the
    /// document was already resumed by another container.
    pub fn resume(&mut self) -> Result<(), DecodeError> {
        if self.resumed.is_some() || self.document.container_state() == Some(STATE_RESUMED) {
            return Err(DecodeError::AlreadyResumed);
        }
        let text = self
            .document
            .snapshot_text()
            .ok_or_else(|| DecodeError::MalformedSnapshot("document has no snapshot".to_string()))?;
        let data = SnapshotData::parse(text)?;
        if data.subs.len() > data.objs.len() {
            return Err(DecodeError::MalformedSnapshot(format!(
                "{} edge lists for {} cells",
                data.subs.len(),
                data.objs.len()
            )));
        }

        let root = self.document.root();
        let map = self.document.attribute(root, NODE_MAP_ATTR).unwrap_or_default();
        let nodes = node_map::decode(&self.document, map)?;

        info!(
            cells = data.objs.len(),
            roots = data.roots.len(),
            nodes = nodes.len(),
            "Resuming container"
        );
        self.resumed = Some(Resumed {
            slots: vec![Slot::Unrequested; data.objs.len()],
            data,
            nodes,
        });
        self.document
            .set_attribute(root, CONTAINER_STATE_ATTR, STATE_RESUMED);
        Ok(())
    }

    /// Number of cells in the resumed snapshot.
    pub fn len(&self) -> usize {
        self.resumed.as_ref().map_or(0, |r| r.data.objs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn root_count(&self) -> usize {
        self.resumed.as_ref().map_or(0, |r| r.data.roots.len())
    }

    /// Materializes root `index`.
    pub fn root(&mut self, index: usize) -> Result<Value, DecodeError> {
        let id = self
            .resumed
            .as_ref()
            .ok_or(DecodeError::NotResumed)?
            .data
            .roots
            .get(index)
            .cloned()
            .ok_or_else(|| DecodeError::MalformedSnapshot(format!("no root {index}")))?;
        self.resolve(&id)
    }

    pub fn roots(&mut self) -> Result<Vec<Value>, DecodeError> {
        (0..self.root_count()).map(|i| self.root(i)).collect()
    }

    /// Whether `ordinal` has been materialized yet.
    pub fn is_materialized(&self, ordinal: usize) -> bool {
        self.resumed
            .as_ref()
            .and_then(|r| r.slots.get(ordinal))
            .is_some_and(|slot| matches!(slot, Slot::Finalized(_)))
    }

    /// Returns the value of cell `ordinal`, decoding it on first request.
    pub fn get_object(&mut self, ordinal: usize) -> Result<Value, DecodeError> {
        let resumed = self.resumed.as_mut().ok_or(DecodeError::NotResumed)?;
        let cell = match resumed.slots.get(ordinal) {
            Some(Slot::Finalized(value)) => return Ok(value.clone()),
            Some(Slot::Computing) => return Err(DecodeError::ReentrantDecode(ordinal)),
            Some(Slot::Unrequested) => resumed.data.objs[ordinal].clone(),
            None => return Err(DecodeError::MissingObjectId(ordinal)),
        };
        resumed.slots[ordinal] = Slot::Computing;
        debug!(ordinal, "Materializing cell");

        let result = self.materialize(ordinal, &cell);
        // Once finalized, the placeholder may already be held by other cells; keep it.
        if result.is_err() && self.slot_is_computing(ordinal) {
            self.set_slot(ordinal, Slot::Unrequested);
        }
        result
    }

    fn slot_is_computing(&self, ordinal: usize) -> bool {
        self.resumed
            .as_ref()
            .and_then(|r| r.slots.get(ordinal))
            .is_some_and(|slot| matches!(slot, Slot::Computing))
    }

    fn set_slot(&mut self, ordinal: usize, slot: Slot) {
        if let Some(resumed) = self.resumed.as_mut() {
            resumed.slots[ordinal] = slot;
        }
    }

    fn materialize(&mut self, ordinal: usize, cell: &Json) -> Result<Value, DecodeError> {
        let value = match cell {
            Json::Array(items) => {
                let handle = self.heap.array(Vec::new());
                self.finalize(ordinal, Value::Object(handle))?;
                let decoded = items
                    .iter()
                    .map(|item| self.literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Object::Array(slot) = self.heap.get_mut(handle) {
                    *slot = decoded;
                }
                Value::Object(handle)
            }
            Json::Object(entries) => {
                let handle = self.heap.object(Vec::<(String, Value)>::new());
                self.finalize(ordinal, Value::Object(handle))?;
                let decoded = entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.literal(item)?)))
                    .collect::<Result<Vec<_>, DecodeError>>()?;
                if let Object::Plain(slot) = self.heap.get_mut(handle) {
                    *slot = decoded.into_iter().collect();
                }
                Value::Object(handle)
            }
            Json::String(s) => match split_tagged(s) {
                Some((tag, payload)) if tag != Tag::REFERENCE && tag != Tag::STRING => {
                    let registry = Rc::clone(&self.registry);
                    match registry.by_tag(tag) {
                        Some(serializer) => {
                            let value = serializer.decode(payload, self)?;
                            self.finalize(ordinal, value.clone())?;
                            serializer.fill(&value, payload, self)?;
                            value
                        }
                        None => {
                            let value = self.unknown_tag(s);
                            self.finalize(ordinal, value.clone())?;
                            value
                        }
                    }
                }
                _ => {
                    let value = self.literal(cell)?;
                    self.finalize(ordinal, value.clone())?;
                    value
                }
            },
            primitive => {
                let value = self.literal(primitive)?;
                self.finalize(ordinal, value.clone())?;
                value
            }
        };
        self.attach_edges(ordinal, &value)?;
        Ok(value)
    }

    /// Caches the constructed value, then applies store flags so wrappers resolved
    /// during fill carry them.
    fn finalize(&mut self, ordinal: usize, value: Value) -> Result<(), DecodeError> {
        let flags = match self.edge_list(ordinal) {
            Some(list) => parse_edges(&list)?.0,
            None => None,
        };
        if let (Some(flags), Some(target)) = (flags, value.as_object()) {
            self.heap.store(target, flags);
        }
        self.set_slot(ordinal, Slot::Finalized(value));
        Ok(())
    }

    fn edge_list(&self, ordinal: usize) -> Option<Vec<Json>> {
        self.resumed
            .as_ref()
            .and_then(|r| r.data.subs.get(ordinal))
            .filter(|list| !list.is_empty())
            .cloned()
    }

    /// Re-registers every serialized subscriber of cell `ordinal` with a fresh manager.
    fn attach_edges(&mut self, ordinal: usize, value: &Value) -> Result<(), DecodeError> {
        let Some(list) = self.edge_list(ordinal) else {
            return Ok(());
        };
        let Some(target) = value.as_object() else {
            return Ok(());
        };
        let (_, edges) = parse_edges(&list)?;
        for edge in edges {
            let host = self.object_at(edge.host())?;
            let node = edge.node().map(|n| self.object_at(n)).transpose()?;
            let sub = match (edge, node) {
                (EdgeSpec::Host { .. }, _) => Subscriber::Host { host },
                (EdgeSpec::Keyed { key, .. }, _) => Subscriber::Keyed { host, key },
                (EdgeSpec::Attribute { prop, .. }, Some(node)) => {
                    Subscriber::Attribute { host, node, prop }
                }
                (EdgeSpec::Text { .. }, Some(node)) => Subscriber::Text { host, node },
                _ => continue,
            };
            self.heap.subscribe(target, sub);
        }
        Ok(())
    }

    fn object_at(&mut self, ordinal: usize) -> Result<ObjRef, DecodeError> {
        self.get_object(ordinal)?
            .as_object()
            .ok_or_else(|| DecodeError::MalformedSnapshot(format!("cell {ordinal} is not an object")))
    }

    /// Decodes a value written in place inside a cell.
    fn literal(&mut self, json: &Json) -> Result<Value, DecodeError> {
        match json {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| DecodeError::MalformedSnapshot(format!("bad number {n}"))),
            Json::String(s) => self.string(s),
            Json::Array(items) => {
                let decoded = items
                    .iter()
                    .map(|item| self.literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Object(self.heap.array(decoded)))
            }
            Json::Object(entries) => {
                let decoded = entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.literal(item)?)))
                    .collect::<Result<Vec<_>, DecodeError>>()?;
                Ok(Value::Object(self.heap.object(decoded)))
            }
        }
    }

    fn string(&mut self, s: &str) -> Result<Value, DecodeError> {
        let Some((tag, payload)) = split_tagged(s) else {
            return Ok(Value::string(s));
        };
        match tag {
            Tag::STRING => Ok(Value::string(payload)),
            Tag::REFERENCE => self.resolve(payload),
            _ => {
                let registry = Rc::clone(&self.registry);
                match registry.by_tag(tag) {
                    Some(serializer) => {
                        let value = serializer.decode(payload, self)?;
                        serializer.fill(&value, payload, self)?;
                        Ok(value)
                    }
                    None => Ok(self.unknown_tag(s)),
                }
            }
        }
    }

    fn unknown_tag(&self, s: &str) -> Value {
        debug!(tag = s.as_bytes()[0], "Unknown tag, keeping literal string");
        Value::string(s)
    }

    /// Loads (once per chunk and symbol) and calls a lazy closure.
    ///
    /// This is the only place code is loaded; decoding a QRL never loads it.
    pub fn invoke(&mut self, qrl: &Value, args: &[Value]) -> anyhow::Result<Value> {
        let handle = qrl
            .as_object()
            .ok_or_else(|| anyhow!("cannot invoke {qrl:?}"))?;
        let (chunk, symbol, captures) = match self.heap.get(handle) {
            Object::Qrl(q) => (q.chunk.clone(), q.symbol.clone(), q.captures.clone()),
            other => return Err(anyhow!("cannot invoke a {}", other.type_name())),
        };
        let key = (chunk, symbol);
        let body = match self.loaded.get(&key) {
            Some(body) => Rc::clone(body),
            None => {
                let body = self
                    .loader
                    .load(&key.0, &key.1)
                    .with_context(|| format!("Failed to load {}#{}", key.0, key.1))?;
                self.loaded.insert(key.clone(), Rc::clone(&body));
                body
            }
        };
        debug!(chunk = %key.0, symbol = %key.1, "Invoking closure");
        body(self, &captures, args)
    }

    /// Writes a signal and patches every attribute and text node bound to it.
    pub fn set_signal(&mut self, signal: ObjRef, value: Value) -> Result<Vec<Subscriber>, DecodeError> {
        let notified = self.heap.signal_set(signal, value.clone())?;
        self.apply_patches(&notified, &value);
        Ok(notified)
    }

    /// Writes through a store and patches bound nodes.
    pub fn set_store(
        &mut self,
        store: ObjRef,
        key: &str,
        value: Value,
    ) -> Result<Vec<Subscriber>, DecodeError> {
        let notified = self.heap.store_set(store, key, value.clone())?;
        self.apply_patches(&notified, &value);
        Ok(notified)
    }

    fn apply_patches(&mut self, notified: &[Subscriber], value: &Value) {
        let text = value.to_display_string();
        for sub in notified {
            let node = match sub.node().map(|n| self.heap.get(n)) {
                Some(Object::Element(node)) => *node,
                _ => continue,
            };
            match sub {
                Subscriber::Attribute { prop, .. } => self.document.set_attribute(node, prop, &text),
                Subscriber::Text { .. } => self.document.set_text(node, &text),
                _ => {}
            }
        }
    }

    /// Settles a promise, awaiting it if it is still pending. Non-promises resolve to themselves.
    pub async fn await_promise(&mut self, value: &Value) -> Result<Value, Value> {
        let Some(handle) = value.as_object() else {
            return Ok(value.clone());
        };
        if let Some(future) = self.heap.take_promise_future(handle) {
            let outcome = future.await;
            self.heap.settle_promise(handle, outcome);
        }
        match self.heap.get(handle) {
            Object::Promise(PromiseState::Resolved(v)) => Ok(v.clone()),
            Object::Promise(PromiseState::Rejected(reason)) => Err(reason.clone()),
            _ => Ok(value.clone()),
        }
    }
}

impl DecodeContext for Container {
    fn heap(&mut self) -> &mut Heap {
        &mut self.heap
    }

    fn resolve(&mut self, id: &str) -> Result<Value, DecodeError> {
        let (ordinal, wrapped) = parse_reference(id)
            .ok_or_else(|| DecodeError::MalformedSnapshot(format!("bad reference {id:?}")))?;
        let value = self.get_object(ordinal)?;
        match (wrapped, value.as_object()) {
            (true, Some(target)) => Ok(Value::Object(self.heap.store(target, 0))),
            (true, None) => Err(DecodeError::MalformedSnapshot(format!(
                "store reference {id:?} to a primitive"
            ))),
            (false, _) => Ok(value),
        }
    }

    fn node(&self, index: usize) -> Result<NodeId, DecodeError> {
        self.resumed
            .as_ref()
            .and_then(|r| r.nodes.get(index))
            .copied()
            .ok_or(DecodeError::MissingNode(index))
    }

    fn dev_mode(&self) -> bool {
        self.config.dev_mode
    }
}
