//! Encoder: turns a [`Collected`] graph into the wire container.

use std::collections::HashMap;

use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::config::SnapshotConfig;
use crate::dom::NodeId;
use crate::heap::{Heap, Object, ObjRef, Value};

use super::collector::{CellKey, Collected, PrimitiveKey};
use super::error::SerializeError;
use super::registry::{EncodeContext, Registry};
use super::subs::encode_edges;
use super::tags::{escape_string, format_reference, Tag};
use super::SnapshotData;

/// Largest magnitude written as a JSON integer.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

struct Encoder<'a> {
    heap: &'a Heap,
    registry: &'a Registry,
    collected: &'a Collected,
    nodes: &'a HashMap<NodeId, usize>,
    config: &'a SnapshotConfig,
}

impl EncodeContext for Encoder<'_> {
    fn heap(&self) -> &Heap {
        self.heap
    }

    fn ordinal(&self, value: &Value) -> Result<String, SerializeError> {
        let (key, wrapped) = match value {
            Value::Object(handle) => {
                let (target, wrapped) = self.heap.unwrap_store(*handle);
                if self.collected.excluded.contains(&target) {
                    (CellKey::Primitive(PrimitiveKey::Undefined), false)
                } else {
                    (CellKey::Object(target), wrapped)
                }
            }
            primitive => match PrimitiveKey::of(primitive) {
                Some(key) => (CellKey::Primitive(key), false),
                None => return Err(SerializeError::MissingObjectId(format!("{primitive:?}"))),
            },
        };
        self.collected
            .ordinal(&key)
            .map(|ordinal| format_reference(ordinal, wrapped))
            .ok_or_else(|| SerializeError::MissingObjectId(format!("{value:?}")))
    }

    fn node_index(&self, node: NodeId) -> Result<usize, SerializeError> {
        self.nodes
            .get(&node)
            .copied()
            .ok_or_else(|| SerializeError::DetachedNode(node.to_string()))
    }

    fn dev_mode(&self) -> bool {
        self.config.dev_mode
    }
}

impl Encoder<'_> {
    fn cell(&self, key: &CellKey) -> Result<Json, SerializeError> {
        match key {
            CellKey::Object(handle) => self.object(*handle),
            CellKey::Primitive(primitive) => self.primitive(&primitive.to_value()),
        }
    }

    /// A child value: a reference when it has a cell, otherwise written in place.
    fn child(&self, value: &Value) -> Result<Json, SerializeError> {
        match value {
            Value::Object(handle) => {
                let (target, wrapped) = self.heap.unwrap_store(*handle);
                if self.collected.excluded.contains(&target) {
                    return Ok(Json::String(Tag::UNDEFINED.wrap("")));
                }
                match self.collected.object_ordinal(target) {
                    Some(ordinal) => Ok(reference(ordinal, wrapped)),
                    None => self.object(target),
                }
            }
            Value::String(s) if s.chars().count() > self.config.long_string_threshold => {
                let key = CellKey::Primitive(PrimitiveKey::String(s.clone()));
                match self.collected.ordinal(&key) {
                    Some(ordinal) => Ok(reference(ordinal, false)),
                    None => self.primitive(value),
                }
            }
            primitive => self.primitive(primitive),
        }
    }

    fn object(&self, handle: ObjRef) -> Result<Json, SerializeError> {
        match self.heap.get(handle) {
            Object::Plain(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries.iter() {
                    map.insert(key.to_string(), self.child(value)?);
                }
                Ok(Json::Object(map))
            }
            Object::Array(items) => items
                .iter()
                .map(|item| self.child(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            other => self.tagged(&Value::Object(handle), other.type_name()),
        }
    }

    fn primitive(&self, value: &Value) -> Result<Json, SerializeError> {
        match value {
            Value::Null => Ok(Json::Null),
            Value::Bool(b) => Ok(Json::Bool(*b)),
            Value::String(s) => Ok(Json::String(escape_string(s).into_owned())),
            Value::Number(n) if n.is_finite() => Ok(number(*n)),
            other => self.tagged(other, "primitive"),
        }
    }

    fn tagged(&self, value: &Value, type_name: &str) -> Result<Json, SerializeError> {
        let serializer = self.registry.find(value, self.heap).ok_or_else(|| {
            SerializeError::UnserializableValue {
                path: format!("{value:?}"),
                type_name: type_name.to_string(),
            }
        })?;
        let payload = serializer.encode(value, self)?;
        Ok(Json::String(serializer.tag().wrap(&payload)))
    }
}

fn reference(ordinal: usize, wrapped: bool) -> Json {
    Json::String(Tag::REFERENCE.wrap(&format_reference(ordinal, wrapped)))
}

/// Integral values are written without a fraction; `-0` keeps its sign.
fn number(n: f64) -> Json {
    let integral = n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER;
    if integral && !(n == 0.0 && n.is_sign_negative()) {
        Json::from(n as i64)
    } else {
        Json::from(n)
    }
}

/// Writes every collected cell, the root list and the subscribed prefix's edges.
pub fn encode(
    heap: &Heap,
    registry: &Registry,
    collected: &Collected,
    nodes: &HashMap<NodeId, usize>,
    config: &SnapshotConfig,
) -> Result<SnapshotData, SerializeError> {
    let encoder = Encoder {
        heap,
        registry,
        collected,
        nodes,
        config,
    };

    let objs = collected
        .cells
        .iter()
        .map(|key| encoder.cell(key))
        .collect::<Result<Vec<_>, _>>()?;

    let subs = collected.cells[..collected.subscribed]
        .iter()
        .map(|key| match key {
            CellKey::Object(handle) => encode_edges(heap, collected, *handle),
            CellKey::Primitive(_) => Vec::new(),
        })
        .collect::<Vec<_>>();

    let roots = collected
        .roots
        .iter()
        .map(|(ordinal, wrapped)| format_reference(*ordinal, *wrapped))
        .collect();

    debug!(
        cells = objs.len(),
        subscribed = subs.len(),
        "Encoded snapshot cells"
    );

    Ok(SnapshotData { roots, objs, subs })
}
