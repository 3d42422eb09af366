//! Subscription bookkeeping for reactive objects.
//!
//! Signals and store targets each own a [`SubscriptionManager`]. Writing through
//! the tracked container API returns the edges that must be re-run or patched;
//! scheduling them is the job of the reactive runtime.

use super::object::{Object, PlainObject, STORE_IMMUTABLE, STORE_RECURSIVE};
use super::value::{ObjRef, Value};
use super::{Heap, HeapError};

/// One edge from a reactive object to whoever must hear about writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subscriber {
    /// Any write notifies the host.
    Host { host: ObjRef },
    /// Only writes to `key` notify the host.
    Keyed { host: ObjRef, key: String },
    /// Attribute `prop` of `node` mirrors the value.
    Attribute { host: ObjRef, node: ObjRef, prop: String },
    /// Text node `node` mirrors the value.
    Text { host: ObjRef, node: ObjRef },
}

impl Subscriber {
    pub fn host(&self) -> ObjRef {
        match self {
            Subscriber::Host { host }
            | Subscriber::Keyed { host, .. }
            | Subscriber::Attribute { host, .. }
            | Subscriber::Text { host, .. } => *host,
        }
    }

    pub fn node(&self) -> Option<ObjRef> {
        match self {
            Subscriber::Attribute { node, .. } | Subscriber::Text { node, .. } => Some(*node),
            _ => None,
        }
    }

    fn matches(&self, key: Option<&str>) -> bool {
        match self {
            Subscriber::Keyed { key: wanted, .. } => key == Some(wanted.as_str()),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionManager {
    subs: Vec<Subscriber>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge unless an identical one is already registered.
    pub fn add(&mut self, sub: Subscriber) {
        if !self.subs.contains(&sub) {
            self.subs.push(sub);
        }
    }

    pub fn remove_host(&mut self, host: ObjRef) {
        self.subs.retain(|s| s.host() != host);
    }

    pub fn subscribers(&self) -> &[Subscriber] {
        &self.subs
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Edges interested in a write to `key` (`None` for a whole-value write).
    pub fn notify(&self, key: Option<&str>) -> Vec<Subscriber> {
        self.subs.iter().filter(|s| s.matches(key)).cloned().collect()
    }
}

impl Heap {
    pub fn subscribe(&mut self, target: ObjRef, sub: Subscriber) {
        let (target, _) = self.unwrap_store(target);
        self.managers.entry(target).or_default().add(sub);
    }

    pub fn manager(&self, target: ObjRef) -> Option<&SubscriptionManager> {
        self.managers.get(&target)
    }

    pub fn manager_mut(&mut self, target: ObjRef) -> &mut SubscriptionManager {
        self.managers.entry(target).or_default()
    }

    pub fn signal_get(&self, signal: ObjRef) -> Result<&Value, HeapError> {
        match self.get(signal) {
            Object::Signal(data) => Ok(&data.value),
            Object::Computed(data) => Ok(&data.value),
            other => Err(HeapError::WrongKind {
                expected: "Signal",
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Writes a signal and returns the edges to notify. Same-value writes notify nobody.
    pub fn signal_set(&mut self, signal: ObjRef, value: Value) -> Result<Vec<Subscriber>, HeapError> {
        match self.get_mut(signal) {
            Object::Signal(data) => {
                if data.value.same_value(&value) {
                    return Ok(Vec::new());
                }
                data.value = value;
            }
            other => {
                return Err(HeapError::WrongKind {
                    expected: "Signal",
                    found: other.type_name().to_string(),
                })
            }
        }
        Ok(self.notify(signal, None))
    }

    /// Reads a property through a store. Deep stores hand back nested containers wrapped.
    pub fn store_get(&mut self, store: ObjRef, key: &str) -> Result<Value, HeapError> {
        let data = self.store_data(store)?;
        let value = match self.get(data.target) {
            Object::Plain(obj) => obj.get(key).cloned().unwrap_or(Value::Undefined),
            Object::Array(items) => match key {
                "length" => Value::Number(items.len() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or(Value::Undefined),
            },
            other => {
                return Err(HeapError::WrongKind {
                    expected: "Object",
                    found: other.type_name().to_string(),
                })
            }
        };
        if data.flags & STORE_RECURSIVE != 0 {
            if let Value::Object(child) = value {
                if matches!(self.get(child), Object::Plain(_) | Object::Array(_)) {
                    return Ok(Value::Object(self.store(child, data.flags)));
                }
            }
        }
        Ok(value)
    }

    /// Writes a property through a store and returns the edges interested in `key`.
    pub fn store_set(
        &mut self,
        store: ObjRef,
        key: &str,
        value: Value,
    ) -> Result<Vec<Subscriber>, HeapError> {
        let data = self.store_data(store)?;
        if data.flags & STORE_IMMUTABLE != 0 {
            return Err(HeapError::Immutable(key.to_string()));
        }
        // Writing a wrapper stores its target so the backing graph never holds proxies.
        let value = match value {
            Value::Object(handle) => Value::Object(self.unwrap_store(handle).0),
            other => other,
        };
        let changed = match self.get_mut(data.target) {
            Object::Plain(obj) => match obj.get(key) {
                Some(old) if old.same_value(&value) => false,
                _ => {
                    obj.set(key, value);
                    true
                }
            },
            Object::Array(items) => {
                let index = key
                    .parse::<usize>()
                    .map_err(|_| HeapError::InvalidIndex(key.to_string()))?;
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                if items[index].same_value(&value) {
                    false
                } else {
                    items[index] = value;
                    true
                }
            }
            other => {
                return Err(HeapError::WrongKind {
                    expected: "Object",
                    found: other.type_name().to_string(),
                })
            }
        };
        if !changed {
            return Ok(Vec::new());
        }
        Ok(self.notify(data.target, Some(key)))
    }

    pub fn store_has(&self, store: ObjRef, key: &str) -> Result<bool, HeapError> {
        let data = self.store_data(store)?;
        Ok(match self.get(data.target) {
            Object::Plain(obj) => obj.has(key),
            Object::Array(items) => key.parse::<usize>().is_ok_and(|i| i < items.len()),
            _ => false,
        })
    }

    pub fn store_keys(&self, store: ObjRef) -> Result<Vec<String>, HeapError> {
        let data = self.store_data(store)?;
        Ok(match self.get(data.target) {
            Object::Plain(obj) => obj.keys().map(str::to_string).collect(),
            Object::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        })
    }

    /// Builds a plain object and returns a store wrapping it.
    pub fn new_store(&mut self, entries: PlainObject, flags: u32) -> ObjRef {
        let target = self.alloc(Object::Plain(entries));
        self.store(target, flags)
    }

    fn store_data(&self, store: ObjRef) -> Result<super::object::StoreData, HeapError> {
        match self.get(store) {
            Object::Store(data) => Ok(*data),
            other => Err(HeapError::WrongKind {
                expected: "Store",
                found: other.type_name().to_string(),
            }),
        }
    }

    fn notify(&self, target: ObjRef, key: Option<&str>) -> Vec<Subscriber> {
        let notified = self
            .managers
            .get(&target)
            .map(|m| m.notify(key))
            .unwrap_or_default();
        tracing::trace!(target = %target, key = ?key, count = notified.len(), "Reactive write");
        notified
    }
}
