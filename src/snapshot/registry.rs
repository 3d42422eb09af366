//! Type registry: the ordered list of tagged serializers.
//!
//! Encoding asks each serializer's [`Serializer::test`] in registration order and
//! uses the first match. Decoding dispatches on the tag byte through a table, so
//! registration order never affects what a snapshot decodes to.

use std::fmt;

use thiserror::Error;

use crate::dom::NodeId;
use crate::heap::{Heap, Value};

use super::collector::Collector;
use super::error::{DecodeError, SerializeError};
use super::serializers;
use super::tags::{Tag, RESERVED_MAX};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tag {0} is already registered")]
    DuplicateTag(Tag),
}

/// What a serializer can ask of the encoder.
pub trait EncodeContext {
    fn heap(&self) -> &Heap;

    /// Ordinal text for a value the collector registered (`getOrdinal`).
    fn ordinal(&self, value: &Value) -> Result<String, SerializeError>;

    /// Node-map index of a retained node.
    fn node_index(&self, node: NodeId) -> Result<usize, SerializeError>;

    fn dev_mode(&self) -> bool;
}

/// What a serializer can ask of the decoder.
pub trait DecodeContext {
    fn heap(&mut self) -> &mut Heap;

    /// Materializes the value behind a reference payload (`<ordinal>` or `<ordinal>!`).
    fn resolve(&mut self, id: &str) -> Result<Value, DecodeError>;

    fn node(&self, index: usize) -> Result<NodeId, DecodeError>;

    fn dev_mode(&self) -> bool;
}

/// One tagged value type.
pub trait Serializer {
    fn tag(&self) -> Tag;

    /// Cheap type check.
    fn test(&self, value: &Value, heap: &Heap) -> bool;

    /// Registers the children this value needs in the snapshot.
    fn collect(&self, _value: &Value, _collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        Ok(())
    }

    /// Payload text, without the tag.
    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError>;

    /// Builds the value, possibly as a placeholder whose children arrive in [`fill`](Self::fill).
    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError>;

    /// Patches children onto a value returned by [`decode`](Self::decode).
    fn fill(
        &self,
        _value: &Value,
        _payload: &str,
        _ctx: &mut dyn DecodeContext,
    ) -> Result<(), DecodeError> {
        Ok(())
    }
}

const TABLE_SIZE: usize = RESERVED_MAX as usize + 1;

pub struct Registry {
    serializers: Vec<Box<dyn Serializer>>,
    by_tag: [Option<usize>; TABLE_SIZE],
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            serializers: Vec::new(),
            by_tag: [None; TABLE_SIZE],
        }
    }

    /// Registry with every built-in value type.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for serializer in serializers::builtins() {
            let registered = registry.register(serializer);
            debug_assert!(registered.is_ok(), "built-in tag collision: {registered:?}");
        }
        registry
    }

    pub fn register(&mut self, serializer: Box<dyn Serializer>) -> Result<(), RegistryError> {
        let tag = serializer.tag();
        let slot = &mut self.by_tag[tag.byte() as usize];
        if slot.is_some() {
            return Err(RegistryError::DuplicateTag(tag));
        }
        *slot = Some(self.serializers.len());
        self.serializers.push(serializer);
        Ok(())
    }

    /// First serializer claiming `value`.
    pub fn find(&self, value: &Value, heap: &Heap) -> Option<&dyn Serializer> {
        self.serializers
            .iter()
            .find(|s| s.test(value, heap))
            .map(|s| s.as_ref())
    }

    pub fn by_tag(&self, tag: Tag) -> Option<&dyn Serializer> {
        let index = (*self.by_tag.get(tag.byte() as usize)?)?;
        self.serializers.get(index).map(|s| s.as_ref())
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.serializers.iter().map(|s| s.tag())
    }

    pub fn len(&self) -> usize {
        self.serializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serializers.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tags()).finish()
    }
}
