//! Arena holding the live application object graph.
//!
//! Objects are addressed by [`ObjRef`] handles, which double as identity for the
//! collector and encoder. Elements and the document root are interned so one node
//! maps to exactly one handle.

pub mod object;
pub mod reactive;
pub mod value;

use std::collections::{HashMap, HashSet};
use std::future::Future;

use futures::FutureExt;
use thiserror::Error;

use crate::dom::NodeId;

pub use object::{
    ComponentData, ComputedData, ErrorData, NativeData, Object, PlainObject, PromiseState, Qrl,
    RegExpData, ResourceData, ResourceStatus, SignalData, StoreData, TaskData, STORE_IMMUTABLE,
    STORE_RECURSIVE,
};
pub use reactive::{Subscriber, SubscriptionManager};
pub use value::{ObjRef, Value};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeapError {
    #[error("Expected {expected}, found {found}")]
    WrongKind { expected: &'static str, found: String },

    #[error("Store is immutable, cannot write {0:?}")]
    Immutable(String),

    #[error("Invalid array index {0:?}")]
    InvalidIndex(String),
}

#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
    pub(crate) managers: HashMap<ObjRef, SubscriptionManager>,
    no_serialize: HashSet<ObjRef>,
    /// Store target -> its single wrapper.
    stores: HashMap<ObjRef, ObjRef>,
    elements: HashMap<NodeId, ObjRef>,
    document: Option<ObjRef>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, object: Object) -> ObjRef {
        let handle = ObjRef(self.objects.len() as u32);
        self.objects.push(object);
        handle
    }

    /// Panics on a handle from another heap; handles are never freed.
    pub fn get(&self, handle: ObjRef) -> &Object {
        &self.objects[handle.index()]
    }

    pub fn get_mut(&mut self, handle: ObjRef) -> &mut Object {
        &mut self.objects[handle.index()]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn object<K: Into<String>>(&mut self, entries: impl IntoIterator<Item = (K, Value)>) -> ObjRef {
        self.alloc(Object::Plain(entries.into_iter().collect()))
    }

    pub fn array(&mut self, items: impl IntoIterator<Item = Value>) -> ObjRef {
        self.alloc(Object::Array(items.into_iter().collect()))
    }

    pub fn signal(&mut self, value: Value) -> ObjRef {
        self.alloc(Object::Signal(SignalData { value }))
    }

    pub fn qrl(
        &mut self,
        chunk: impl Into<String>,
        symbol: impl Into<String>,
        captures: Vec<Value>,
    ) -> ObjRef {
        self.alloc(Object::Qrl(Qrl {
            chunk: chunk.into(),
            symbol: symbol.into(),
            captures,
        }))
    }

    pub fn native(&mut self, type_name: impl Into<String>) -> ObjRef {
        self.alloc(Object::Native(NativeData {
            type_name: type_name.into(),
        }))
    }

    /// Returns the wrapper for `target`, creating it on first use.
    ///
    /// Wrapping a wrapper returns it unchanged. Flags of an existing wrapper are
    /// replaced when `flags` is non-zero.
    pub fn store(&mut self, target: ObjRef, flags: u32) -> ObjRef {
        let (target, _) = self.unwrap_store(target);
        if let Some(&existing) = self.stores.get(&target) {
            if flags != 0 {
                if let Object::Store(data) = self.get_mut(existing) {
                    data.flags = flags;
                }
            }
            return existing;
        }
        let wrapper = self.alloc(Object::Store(StoreData { target, flags }));
        self.stores.insert(target, wrapper);
        wrapper
    }

    /// Existing wrapper of a target, if any.
    pub fn store_of(&self, target: ObjRef) -> Option<ObjRef> {
        self.stores.get(&target).copied()
    }

    /// Resolves a store wrapper to its backing object; the flag says whether it was wrapped.
    pub fn unwrap_store(&self, handle: ObjRef) -> (ObjRef, bool) {
        match self.get(handle) {
            Object::Store(data) => (data.target, true),
            _ => (handle, false),
        }
    }

    pub fn store_flags(&self, target: ObjRef) -> Option<u32> {
        let wrapper = self.store_of(target)?;
        match self.get(wrapper) {
            Object::Store(data) => Some(data.flags),
            _ => None,
        }
    }

    pub fn element(&mut self, node: NodeId) -> ObjRef {
        if let Some(&existing) = self.elements.get(&node) {
            return existing;
        }
        let handle = self.alloc(Object::Element(node));
        self.elements.insert(node, handle);
        handle
    }

    pub fn document(&mut self) -> ObjRef {
        match self.document {
            Some(handle) => handle,
            None => {
                let handle = self.alloc(Object::Document);
                self.document = Some(handle);
                handle
            }
        }
    }

    /// Marks an object as intentionally non-serializable; it resumes as `undefined`.
    pub fn no_serialize(&mut self, handle: ObjRef) -> ObjRef {
        let (target, _) = self.unwrap_store(handle);
        self.no_serialize.insert(target);
        handle
    }

    pub fn is_no_serialize(&self, handle: ObjRef) -> bool {
        self.no_serialize.contains(&handle)
    }

    pub fn promise<F>(&mut self, future: F) -> ObjRef
    where
        F: Future<Output = Result<Value, Value>> + 'static,
    {
        self.alloc(Object::Promise(PromiseState::Pending(Some(
            future.boxed_local(),
        ))))
    }

    pub fn resolved_promise(&mut self, value: Value) -> ObjRef {
        self.alloc(Object::Promise(PromiseState::Resolved(value)))
    }

    pub fn rejected_promise(&mut self, reason: Value) -> ObjRef {
        self.alloc(Object::Promise(PromiseState::Rejected(reason)))
    }

    pub fn error(&mut self, message: impl Into<String>, stack: Option<String>) -> ObjRef {
        self.alloc(Object::Error(ErrorData {
            message: message.into(),
            stack,
        }))
    }

    pub(crate) fn take_promise_future(&mut self, handle: ObjRef) -> Option<object::PromiseFuture> {
        match self.get_mut(handle) {
            Object::Promise(PromiseState::Pending(future)) => future.take(),
            _ => None,
        }
    }

    pub(crate) fn settle_promise(&mut self, handle: ObjRef, outcome: Result<Value, Value>) {
        if let Object::Promise(state) = self.get_mut(handle) {
            *state = match outcome {
                Ok(value) => PromiseState::Resolved(value),
                Err(reason) => PromiseState::Rejected(reason),
            };
        }
    }
}
