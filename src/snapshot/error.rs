//! Error types for pausing and resuming containers.

use thiserror::Error;

use crate::dom::node_map::NodeMapError;
use crate::heap::HeapError;

use super::tags::Tag;

/// Failures while collecting or encoding a snapshot. All are fatal for the pass.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// A reachable value matched no serializer and was not marked as excluded.
    #[error("Unserializable value of type {type_name} at {path}")]
    UnserializableValue { path: String, type_name: String },

    /// An ordinal was requested for a value the collector never registered.
    #[error("No object id registered for {0}")]
    MissingObjectId(String),

    /// A referenced element is not part of the document.
    #[error("Element {0} is not attached to the container document")]
    DetachedNode(String),

    /// A serializer was handed a value its `test` does not accept.
    #[error("Expected {expected}, found {found}")]
    KindMismatch { expected: &'static str, found: String },

    #[error("Promise at {0} is still pending after collection")]
    PendingPromise(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while resuming a container or materializing an ordinal.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The snapshot has no cell for this ordinal.
    #[error("No object with id {0} in snapshot")]
    MissingObjectId(usize),

    /// An object asked for its own ordinal while it was being constructed.
    #[error("Object {0} requested itself before construction finished")]
    ReentrantDecode(usize),

    #[error("Container has already been resumed")]
    AlreadyResumed,

    #[error("Container has not been resumed yet")]
    NotResumed,

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Malformed {tag} payload {payload:?}")]
    MalformedPayload { tag: Tag, payload: String },

    #[error("No retained node with index {0}")]
    MissingNode(usize),

    #[error("Node map error: {0}")]
    NodeMap(#[from] NodeMapError),

    #[error("Heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DecodeError {
    pub fn payload(tag: Tag, payload: &str) -> Self {
        DecodeError::MalformedPayload {
            tag,
            payload: payload.to_string(),
        }
    }
}
