use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use regex::{Regex, RegexBuilder};

use crate::dom::NodeId;

use super::value::{ObjRef, Value};

/// Deep store: nested plain objects/arrays read through it come back wrapped.
pub const STORE_RECURSIVE: u32 = 1;
/// Writes through the store are rejected.
pub const STORE_IMMUTABLE: u32 = 1 << 1;

/// Everything that can live in the heap arena.
#[derive(Debug)]
pub enum Object {
    Plain(PlainObject),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    /// Milliseconds since the Unix epoch; NaN is an invalid date.
    Date(f64),
    RegExp(RegExpData),
    /// Absolute URL href.
    Url(String),
    Error(ErrorData),
    Qrl(Qrl),
    Signal(SignalData),
    Computed(ComputedData),
    Resource(ResourceData),
    Task(TaskData),
    Component(ComponentData),
    Store(StoreData),
    Promise(PromiseState),
    Element(NodeId),
    Document,
    Native(NativeData),
}

impl Object {
    pub fn type_name(&self) -> &str {
        match self {
            Object::Plain(_) => "Object",
            Object::Array(_) => "Array",
            Object::Map(_) => "Map",
            Object::Set(_) => "Set",
            Object::Date(_) => "Date",
            Object::RegExp(_) => "RegExp",
            Object::Url(_) => "URL",
            Object::Error(_) => "Error",
            Object::Qrl(_) => "QRL",
            Object::Signal(_) => "Signal",
            Object::Computed(_) => "Computed",
            Object::Resource(_) => "Resource",
            Object::Task(_) => "Task",
            Object::Component(_) => "Component",
            Object::Store(_) => "Store",
            Object::Promise(_) => "Promise",
            Object::Element(_) => "Element",
            Object::Document => "Document",
            Object::Native(native) => &native.type_name,
        }
    }

    /// Reactive objects always get their own cell so edges can point at them.
    pub fn is_reactive(&self) -> bool {
        matches!(
            self,
            Object::Signal(_) | Object::Computed(_) | Object::Task(_) | Object::Component(_)
        )
    }
}

/// Insertion-ordered string-keyed object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlainObject {
    entries: Vec<(String, Value)>,
}

impl PlainObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Inserts or overwrites, keeping the original position of an existing key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for PlainObject {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut object = PlainObject::new();
        for (key, value) in iter {
            object.set(key, value);
        }
        object
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegExpData {
    pub source: String,
    pub flags: String,
}

impl RegExpData {
    /// Compiles the pattern, honouring the `i`, `m`, `s`, `x` and `U` flags.
    pub fn to_regex(&self) -> Result<Regex, regex::Error> {
        let mut builder = RegexBuilder::new(&self.source);
        for flag in self.flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                'U' => builder.swap_greed(true),
                _ => &mut builder,
            };
        }
        builder.build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorData {
    pub message: String,
    pub stack: Option<String>,
}

/// A serializable stand-in for a function: where to load it and what it closed over.
#[derive(Debug, Clone, PartialEq)]
pub struct Qrl {
    pub chunk: String,
    pub symbol: String,
    pub captures: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalData {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedData {
    /// The QRL computing the value.
    pub qrl: Value,
    /// Last computed value.
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Pending,
    Resolved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceData {
    pub status: ResourceStatus,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskData {
    pub flags: u32,
    pub index: u32,
    pub qrl: Value,
    /// Element hosting the task, `Undefined` when detached.
    pub element: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentData {
    pub render: Value,
    pub props: Value,
    pub element: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreData {
    pub target: ObjRef,
    pub flags: u32,
}

/// Opaque host value (live closure, socket, timer...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeData {
    pub type_name: String,
}

pub type PromiseFuture = LocalBoxFuture<'static, Result<Value, Value>>;

pub enum PromiseState {
    /// The future is taken out while the collector awaits it.
    Pending(Option<PromiseFuture>),
    Resolved(Value),
    Rejected(Value),
}

impl fmt::Debug for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromiseState::Pending(_) => f.write_str("Pending"),
            PromiseState::Resolved(v) => f.debug_tuple("Resolved").field(v).finish(),
            PromiseState::Rejected(v) => f.debug_tuple("Rejected").field(v).finish(),
        }
    }
}

/// Converts epoch millis into a chrono timestamp, `None` for invalid dates.
pub fn date_to_chrono(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
}

pub fn date_from_chrono(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64
}
