//! Built-in serializers, one per tagged value type.
//!
//! Payloads that refer to other cells carry base-36 ordinals separated by single
//! spaces. Containers are decoded as empty placeholders and populated in `fill`,
//! which is what lets circular structures resolve.

use serde::{Deserialize, Serialize};

use crate::heap::value::format_number;
use crate::heap::{
    ComponentData, ComputedData, ErrorData, Heap, HeapError, Object, ObjRef, PromiseState,
    RegExpData, ResourceData, ResourceStatus, TaskData, Value,
};

use super::collector::Collector;
use super::error::{DecodeError, SerializeError};
use super::registry::{DecodeContext, EncodeContext, Serializer};
use super::tags::{format_ordinal, parse_ordinal, Tag};

/// Every built-in serializer, in encode-test order.
pub fn builtins() -> Vec<Box<dyn Serializer>> {
    vec![
        Box::new(UndefinedSerializer),
        Box::new(NonFiniteSerializer),
        Box::new(BigIntSerializer),
        Box::new(QrlSerializer),
        Box::new(SignalSerializer),
        Box::new(ComputedSerializer),
        Box::new(ResourceSerializer),
        Box::new(TaskSerializer),
        Box::new(ComponentSerializer),
        Box::new(ElementSerializer),
        Box::new(DocumentSerializer),
        Box::new(PromiseSerializer),
        Box::new(UrlSerializer),
        Box::new(DateSerializer),
        Box::new(RegExpSerializer),
        Box::new(ErrorSerializer),
        Box::new(SetSerializer),
        Box::new(MapSerializer),
    ]
}

fn object_of<'h>(value: &Value, heap: &'h Heap) -> Option<&'h Object> {
    value.as_object().map(|handle| heap.get(handle))
}

fn handle_of(value: &Value, expected: &'static str) -> Result<ObjRef, SerializeError> {
    value.as_object().ok_or_else(|| SerializeError::KindMismatch {
        expected,
        found: format!("{value:?}"),
    })
}

fn mismatch(expected: &'static str, found: &Object) -> SerializeError {
    SerializeError::KindMismatch {
        expected,
        found: found.type_name().to_string(),
    }
}

fn wrong_kind(expected: &'static str, found: &Object) -> DecodeError {
    DecodeError::Heap(HeapError::WrongKind {
        expected,
        found: found.type_name().to_string(),
    })
}

fn placeholder_handle(value: &Value, tag: Tag) -> Result<ObjRef, DecodeError> {
    value
        .as_object()
        .ok_or_else(|| DecodeError::payload(tag, &format!("{value:?}")))
}

/// Space-joined ordinals of `values`.
fn ordinals<'v>(
    values: impl IntoIterator<Item = &'v Value>,
    ctx: &dyn EncodeContext,
) -> Result<String, SerializeError> {
    let ids = values
        .into_iter()
        .map(|value| ctx.ordinal(value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids.join(" "))
}

/// Resolves every space-separated ordinal in `payload`.
fn resolve_all(payload: &str, ctx: &mut dyn DecodeContext) -> Result<Vec<Value>, DecodeError> {
    payload
        .split(' ')
        .filter(|id| !id.is_empty())
        .map(|id| ctx.resolve(id))
        .collect()
}

/// Resolves exactly `N` ordinals.
fn resolve_fixed<const N: usize>(
    tag: Tag,
    payload: &str,
    ctx: &mut dyn DecodeContext,
) -> Result<[Value; N], DecodeError> {
    let values = resolve_all(payload, ctx)?;
    values
        .try_into()
        .map_err(|_| DecodeError::payload(tag, payload))
}

fn capture_all(
    values: &[Value],
    collector: &mut Collector<'_>,
    field: &str,
) -> Result<(), SerializeError> {
    for (i, value) in values.iter().enumerate() {
        collector.capture(value, &format!(".{field}[{i}]"))?;
    }
    Ok(())
}

pub struct UndefinedSerializer;

impl Serializer for UndefinedSerializer {
    fn tag(&self) -> Tag {
        Tag::UNDEFINED
    }

    fn test(&self, value: &Value, _heap: &Heap) -> bool {
        value.is_undefined()
    }

    fn encode(&self, _value: &Value, _ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        Ok(String::new())
    }

    fn decode(&self, _payload: &str, _ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        Ok(Value::Undefined)
    }
}

/// `NaN`, `Infinity` and `-Infinity`, which JSON cannot carry.
pub struct NonFiniteSerializer;

impl Serializer for NonFiniteSerializer {
    fn tag(&self) -> Tag {
        Tag::NON_FINITE
    }

    fn test(&self, value: &Value, _heap: &Heap) -> bool {
        matches!(value, Value::Number(n) if !n.is_finite())
    }

    fn encode(&self, value: &Value, _ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        match value {
            Value::Number(n) if n.is_nan() => Ok("NaN".to_string()),
            Value::Number(n) if *n > 0.0 => Ok("Infinity".to_string()),
            Value::Number(_) => Ok("-Infinity".to_string()),
            other => Err(SerializeError::KindMismatch {
                expected: "number",
                found: format!("{other:?}"),
            }),
        }
    }

    fn decode(&self, payload: &str, _ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        match payload {
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            "-Infinity" => Ok(Value::Number(f64::NEG_INFINITY)),
            _ => Err(DecodeError::payload(self.tag(), payload)),
        }
    }
}

pub struct BigIntSerializer;

impl Serializer for BigIntSerializer {
    fn tag(&self) -> Tag {
        Tag::BIGINT
    }

    fn test(&self, value: &Value, _heap: &Heap) -> bool {
        matches!(value, Value::BigInt(_))
    }

    fn encode(&self, value: &Value, _ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        match value {
            Value::BigInt(digits) => Ok(digits.clone()),
            other => Err(SerializeError::KindMismatch {
                expected: "bigint",
                found: format!("{other:?}"),
            }),
        }
    }

    fn decode(&self, payload: &str, _ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let digits = payload.strip_prefix('-').unwrap_or(payload);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecodeError::payload(self.tag(), payload));
        }
        Ok(Value::BigInt(payload.to_string()))
    }
}

/// Lazy closure: `chunk#symbol`, followed by `[captures]` when it closed over anything.
pub struct QrlSerializer;

impl QrlSerializer {
    /// Captures only start after the symbol's `#`; chunk paths may contain brackets.
    fn split(payload: &str) -> Option<(&str, &str, Option<&str>)> {
        let body = match payload.strip_suffix(']') {
            Some(body) => body,
            None => {
                let hash = payload.rfind('#')?;
                let symbol = &payload[hash + 1..];
                if symbol.contains('[') {
                    return None;
                }
                return Some((&payload[..hash], symbol, None));
            }
        };
        let open = body.rfind('[')?;
        let head = &body[..open];
        let hash = head.rfind('#')?;
        Some((&head[..hash], &head[hash + 1..], Some(&body[open + 1..])))
    }
}

impl Serializer for QrlSerializer {
    fn tag(&self) -> Tag {
        Tag::QRL
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Qrl(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        if let Some(Object::Qrl(qrl)) = object_of(value, heap) {
            capture_all(&qrl.captures, collector, "captures")?;
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "QRL")?;
        match ctx.heap().get(handle) {
            Object::Qrl(qrl) => {
                let mut payload = format!("{}#{}", qrl.chunk, qrl.symbol);
                if !qrl.captures.is_empty() {
                    payload.push('[');
                    payload.push_str(&ordinals(&qrl.captures, ctx)?);
                    payload.push(']');
                }
                Ok(payload)
            }
            other => Err(mismatch("QRL", other)),
        }
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let (chunk, symbol, _) =
            Self::split(payload).ok_or_else(|| DecodeError::payload(self.tag(), payload))?;
        let handle = ctx.heap().qrl(chunk, symbol, Vec::new());
        Ok(Value::Object(handle))
    }

    fn fill(&self, value: &Value, payload: &str, ctx: &mut dyn DecodeContext) -> Result<(), DecodeError> {
        let Some((_, _, Some(captures))) = Self::split(payload) else {
            return Ok(());
        };
        let resolved = resolve_all(captures, ctx)?;
        let handle = placeholder_handle(value, self.tag())?;
        match ctx.heap().get_mut(handle) {
            Object::Qrl(qrl) => {
                qrl.captures = resolved;
                Ok(())
            }
            other => Err(wrong_kind("QRL", other)),
        }
    }
}

/// Signal: the ordinal of its current value.
pub struct SignalSerializer;

impl Serializer for SignalSerializer {
    fn tag(&self) -> Tag {
        Tag::SIGNAL
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Signal(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        if let Some(Object::Signal(signal)) = object_of(value, heap) {
            collector.capture(&signal.value, ".value")?;
            if let Some(handle) = value.as_object() {
                collector.collect_subscribers(handle)?;
            }
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Signal")?;
        match ctx.heap().get(handle) {
            Object::Signal(signal) => ctx.ordinal(&signal.value),
            other => Err(mismatch("Signal", other)),
        }
    }

    fn decode(&self, _payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        Ok(Value::Object(ctx.heap().signal(Value::Undefined)))
    }

    fn fill(&self, value: &Value, payload: &str, ctx: &mut dyn DecodeContext) -> Result<(), DecodeError> {
        let [current] = resolve_fixed::<1>(self.tag(), payload, ctx)?;
        let handle = placeholder_handle(value, self.tag())?;
        match ctx.heap().get_mut(handle) {
            Object::Signal(signal) => {
                signal.value = current;
                Ok(())
            }
            other => Err(wrong_kind("Signal", other)),
        }
    }
}

/// Computed: `qrl value`.
pub struct ComputedSerializer;

impl Serializer for ComputedSerializer {
    fn tag(&self) -> Tag {
        Tag::COMPUTED
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Computed(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        if let Some(Object::Computed(computed)) = object_of(value, heap) {
            collector.capture(&computed.qrl, ".qrl")?;
            collector.capture(&computed.value, ".value")?;
            if let Some(handle) = value.as_object() {
                collector.collect_subscribers(handle)?;
            }
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Computed")?;
        match ctx.heap().get(handle) {
            Object::Computed(computed) => ordinals([&computed.qrl, &computed.value], ctx),
            other => Err(mismatch("Computed", other)),
        }
    }

    fn decode(&self, _payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let handle = ctx.heap().alloc(Object::Computed(ComputedData {
            qrl: Value::Undefined,
            value: Value::Undefined,
        }));
        Ok(Value::Object(handle))
    }

    fn fill(&self, value: &Value, payload: &str, ctx: &mut dyn DecodeContext) -> Result<(), DecodeError> {
        let [qrl, current] = resolve_fixed::<2>(self.tag(), payload, ctx)?;
        let handle = placeholder_handle(value, self.tag())?;
        match ctx.heap().get_mut(handle) {
            Object::Computed(computed) => {
                computed.qrl = qrl;
                computed.value = current;
                Ok(())
            }
            other => Err(wrong_kind("Computed", other)),
        }
    }
}

/// Resource: status digit (`0` pending, `1` resolved, `2` rejected) and the value ordinal.
pub struct ResourceSerializer;

impl Serializer for ResourceSerializer {
    fn tag(&self) -> Tag {
        Tag::RESOURCE
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Resource(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        if let Some(Object::Resource(resource)) = object_of(value, heap) {
            collector.capture(&resource.value, ".value")?;
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Resource")?;
        match ctx.heap().get(handle) {
            Object::Resource(resource) => {
                let status = match resource.status {
                    ResourceStatus::Pending => 0,
                    ResourceStatus::Resolved => 1,
                    ResourceStatus::Rejected => 2,
                };
                Ok(format!("{status} {}", ctx.ordinal(&resource.value)?))
            }
            other => Err(mismatch("Resource", other)),
        }
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let status = match payload.split(' ').next() {
            Some("0") => ResourceStatus::Pending,
            Some("1") => ResourceStatus::Resolved,
            Some("2") => ResourceStatus::Rejected,
            _ => return Err(DecodeError::payload(self.tag(), payload)),
        };
        let handle = ctx.heap().alloc(Object::Resource(ResourceData {
            status,
            value: Value::Undefined,
        }));
        Ok(Value::Object(handle))
    }

    fn fill(&self, value: &Value, payload: &str, ctx: &mut dyn DecodeContext) -> Result<(), DecodeError> {
        let rest = payload
            .split_once(' ')
            .map(|(_, rest)| rest)
            .ok_or_else(|| DecodeError::payload(self.tag(), payload))?;
        let [current] = resolve_fixed::<1>(self.tag(), rest, ctx)?;
        let handle = placeholder_handle(value, self.tag())?;
        match ctx.heap().get_mut(handle) {
            Object::Resource(resource) => {
                resource.value = current;
                Ok(())
            }
            other => Err(wrong_kind("Resource", other)),
        }
    }
}

/// Task: `flags index qrl element`, the first two in base 36.
pub struct TaskSerializer;

impl Serializer for TaskSerializer {
    fn tag(&self) -> Tag {
        Tag::TASK
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Task(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        if let Some(Object::Task(task)) = object_of(value, heap) {
            collector.capture(&task.qrl, ".qrl")?;
            collector.capture(&task.element, ".element")?;
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Task")?;
        match ctx.heap().get(handle) {
            Object::Task(task) => Ok(format!(
                "{} {} {}",
                format_ordinal(task.flags as usize),
                format_ordinal(task.index as usize),
                ordinals([&task.qrl, &task.element], ctx)?
            )),
            other => Err(mismatch("Task", other)),
        }
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let mut parts = payload.split(' ');
        let number = |part: Option<&str>| {
            part.and_then(parse_ordinal)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| DecodeError::payload(Tag::TASK, payload))
        };
        let flags = number(parts.next())?;
        let index = number(parts.next())?;
        let handle = ctx.heap().alloc(Object::Task(TaskData {
            flags,
            index,
            qrl: Value::Undefined,
            element: Value::Undefined,
        }));
        Ok(Value::Object(handle))
    }

    fn fill(&self, value: &Value, payload: &str, ctx: &mut dyn DecodeContext) -> Result<(), DecodeError> {
        let refs = payload
            .splitn(3, ' ')
            .nth(2)
            .ok_or_else(|| DecodeError::payload(self.tag(), payload))?;
        let [qrl, element] = resolve_fixed::<2>(self.tag(), refs, ctx)?;
        let handle = placeholder_handle(value, self.tag())?;
        match ctx.heap().get_mut(handle) {
            Object::Task(task) => {
                task.qrl = qrl;
                task.element = element;
                Ok(())
            }
            other => Err(wrong_kind("Task", other)),
        }
    }
}

/// Component host context: `render props element`.
pub struct ComponentSerializer;

impl Serializer for ComponentSerializer {
    fn tag(&self) -> Tag {
        Tag::COMPONENT
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Component(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        if let Some(Object::Component(component)) = object_of(value, heap) {
            collector.capture(&component.render, ".render")?;
            collector.capture(&component.props, ".props")?;
            collector.capture(&component.element, ".element")?;
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Component")?;
        match ctx.heap().get(handle) {
            Object::Component(component) => ordinals(
                [&component.render, &component.props, &component.element],
                ctx,
            ),
            other => Err(mismatch("Component", other)),
        }
    }

    fn decode(&self, _payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let handle = ctx.heap().alloc(Object::Component(ComponentData {
            render: Value::Undefined,
            props: Value::Undefined,
            element: Value::Undefined,
        }));
        Ok(Value::Object(handle))
    }

    fn fill(&self, value: &Value, payload: &str, ctx: &mut dyn DecodeContext) -> Result<(), DecodeError> {
        let [render, props, element] = resolve_fixed::<3>(self.tag(), payload, ctx)?;
        let handle = placeholder_handle(value, self.tag())?;
        match ctx.heap().get_mut(handle) {
            Object::Component(component) => {
                component.render = render;
                component.props = props;
                component.element = element;
                Ok(())
            }
            other => Err(wrong_kind("Component", other)),
        }
    }
}

/// Element or text node: its index in the node map, base 36.
pub struct ElementSerializer;

impl Serializer for ElementSerializer {
    fn tag(&self) -> Tag {
        Tag::ELEMENT
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Element(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        if let Some(Object::Element(node)) = object_of(value, heap) {
            collector.retain_node(*node);
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Element")?;
        match ctx.heap().get(handle) {
            Object::Element(node) => Ok(format_ordinal(ctx.node_index(*node)?)),
            other => Err(mismatch("Element", other)),
        }
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let index = parse_ordinal(payload).ok_or_else(|| DecodeError::payload(self.tag(), payload))?;
        let node = ctx.node(index)?;
        Ok(Value::Object(ctx.heap().element(node)))
    }
}

pub struct DocumentSerializer;

impl Serializer for DocumentSerializer {
    fn tag(&self) -> Tag {
        Tag::DOCUMENT
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Document))
    }

    fn encode(&self, _value: &Value, _ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        Ok(String::new())
    }

    fn decode(&self, _payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        Ok(Value::Object(ctx.heap().document()))
    }
}

/// Settled promise: `+ordinal` when resolved, `-ordinal` when rejected.
///
/// Pending promises are awaited by the collector, so none reach the encoder.
pub struct PromiseSerializer;

impl Serializer for PromiseSerializer {
    fn tag(&self) -> Tag {
        Tag::PROMISE
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Promise(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        match object_of(value, heap) {
            Some(Object::Promise(PromiseState::Pending(_))) => {
                if let Some(handle) = value.as_object() {
                    collector.defer_promise(handle);
                }
                Ok(())
            }
            Some(Object::Promise(PromiseState::Resolved(settled)))
            | Some(Object::Promise(PromiseState::Rejected(settled))) => {
                collector.capture(settled, ".settled")
            }
            _ => Ok(()),
        }
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Promise")?;
        match ctx.heap().get(handle) {
            Object::Promise(PromiseState::Resolved(settled)) => Ok(format!("+{}", ctx.ordinal(settled)?)),
            Object::Promise(PromiseState::Rejected(reason)) => Ok(format!("-{}", ctx.ordinal(reason)?)),
            Object::Promise(PromiseState::Pending(_)) => {
                Err(SerializeError::PendingPromise(handle.to_string()))
            }
            other => Err(mismatch("Promise", other)),
        }
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let handle = match payload.chars().next() {
            Some('+') => ctx.heap().resolved_promise(Value::Undefined),
            Some('-') => ctx.heap().rejected_promise(Value::Undefined),
            _ => return Err(DecodeError::payload(self.tag(), payload)),
        };
        Ok(Value::Object(handle))
    }

    fn fill(&self, value: &Value, payload: &str, ctx: &mut dyn DecodeContext) -> Result<(), DecodeError> {
        let [settled] = resolve_fixed::<1>(self.tag(), &payload[1..], ctx)?;
        let handle = placeholder_handle(value, self.tag())?;
        let outcome = if payload.starts_with('+') {
            Ok(settled)
        } else {
            Err(settled)
        };
        ctx.heap().settle_promise(handle, outcome);
        Ok(())
    }
}

pub struct UrlSerializer;

impl Serializer for UrlSerializer {
    fn tag(&self) -> Tag {
        Tag::URL
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Url(_)))
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "URL")?;
        match ctx.heap().get(handle) {
            Object::Url(href) => Ok(href.clone()),
            other => Err(mismatch("URL", other)),
        }
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        Ok(Value::Object(ctx.heap().alloc(Object::Url(payload.to_string()))))
    }
}

/// Date: epoch milliseconds, `NaN` for an invalid date.
pub struct DateSerializer;

impl Serializer for DateSerializer {
    fn tag(&self) -> Tag {
        Tag::DATE
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Date(_)))
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Date")?;
        match ctx.heap().get(handle) {
            Object::Date(millis) if millis.is_finite() => Ok(format_number(*millis)),
            Object::Date(_) => Ok("NaN".to_string()),
            other => Err(mismatch("Date", other)),
        }
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let millis = match payload {
            "NaN" => f64::NAN,
            digits => digits
                .parse::<f64>()
                .map_err(|_| DecodeError::payload(Tag::DATE, payload))?,
        };
        Ok(Value::Object(ctx.heap().alloc(Object::Date(millis))))
    }
}

/// RegExp: `/source/flags`.
pub struct RegExpSerializer;

impl Serializer for RegExpSerializer {
    fn tag(&self) -> Tag {
        Tag::REGEXP
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::RegExp(_)))
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "RegExp")?;
        match ctx.heap().get(handle) {
            Object::RegExp(re) => Ok(format!("/{}/{}", re.source, re.flags)),
            other => Err(mismatch("RegExp", other)),
        }
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let body = payload
            .strip_prefix('/')
            .ok_or_else(|| DecodeError::payload(Tag::REGEXP, payload))?;
        let close = body
            .rfind('/')
            .ok_or_else(|| DecodeError::payload(Tag::REGEXP, payload))?;
        let handle = ctx.heap().alloc(Object::RegExp(RegExpData {
            source: body[..close].to_string(),
            flags: body[close + 1..].to_string(),
        }));
        Ok(Value::Object(handle))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorPayload {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stack: Option<String>,
}

/// Error: JSON `{"message", "stack"}`; the stack only survives in dev mode.
pub struct ErrorSerializer;

impl Serializer for ErrorSerializer {
    fn tag(&self) -> Tag {
        Tag::ERROR
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Error(_)))
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Error")?;
        match ctx.heap().get(handle) {
            Object::Error(error) => {
                let payload = ErrorPayload {
                    message: error.message.clone(),
                    stack: error.stack.clone().filter(|_| ctx.dev_mode()),
                };
                Ok(serde_json::to_string(&payload)?)
            }
            other => Err(mismatch("Error", other)),
        }
    }

    fn decode(&self, payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        let parsed: ErrorPayload = serde_json::from_str(payload)?;
        let handle = ctx.heap().alloc(Object::Error(ErrorData {
            message: parsed.message,
            stack: parsed.stack,
        }));
        Ok(Value::Object(handle))
    }
}

/// Set: the ordinal of every member.
pub struct SetSerializer;

impl Serializer for SetSerializer {
    fn tag(&self) -> Tag {
        Tag::SET
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Set(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        if let Some(Object::Set(items)) = object_of(value, heap) {
            capture_all(items, collector, "items")?;
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Set")?;
        match ctx.heap().get(handle) {
            Object::Set(items) => ordinals(items, ctx),
            other => Err(mismatch("Set", other)),
        }
    }

    fn decode(&self, _payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        Ok(Value::Object(ctx.heap().alloc(Object::Set(Vec::new()))))
    }

    fn fill(&self, value: &Value, payload: &str, ctx: &mut dyn DecodeContext) -> Result<(), DecodeError> {
        let members = resolve_all(payload, ctx)?;
        let handle = placeholder_handle(value, self.tag())?;
        match ctx.heap().get_mut(handle) {
            Object::Set(items) => {
                *items = members;
                Ok(())
            }
            other => Err(wrong_kind("Set", other)),
        }
    }
}

/// Map: alternating key and value ordinals.
pub struct MapSerializer;

impl Serializer for MapSerializer {
    fn tag(&self) -> Tag {
        Tag::MAP
    }

    fn test(&self, value: &Value, heap: &Heap) -> bool {
        matches!(object_of(value, heap), Some(Object::Map(_)))
    }

    fn collect(&self, value: &Value, collector: &mut Collector<'_>) -> Result<(), SerializeError> {
        let heap = collector.heap();
        if let Some(Object::Map(entries)) = object_of(value, heap) {
            for (i, (key, entry)) in entries.iter().enumerate() {
                collector.capture(key, &format!(".keys[{i}]"))?;
                collector.capture(entry, &format!(".values[{i}]"))?;
            }
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &dyn EncodeContext) -> Result<String, SerializeError> {
        let handle = handle_of(value, "Map")?;
        match ctx.heap().get(handle) {
            Object::Map(entries) => ordinals(entries.iter().flat_map(|(k, v)| [k, v]), ctx),
            other => Err(mismatch("Map", other)),
        }
    }

    fn decode(&self, _payload: &str, ctx: &mut dyn DecodeContext) -> Result<Value, DecodeError> {
        Ok(Value::Object(ctx.heap().alloc(Object::Map(Vec::new()))))
    }

    fn fill(&self, value: &Value, payload: &str, ctx: &mut dyn DecodeContext) -> Result<(), DecodeError> {
        let flat = resolve_all(payload, ctx)?;
        if flat.len() % 2 != 0 {
            return Err(DecodeError::payload(self.tag(), payload));
        }
        let mut pairs = Vec::with_capacity(flat.len() / 2);
        let mut iter = flat.into_iter();
        while let (Some(key), Some(entry)) = (iter.next(), iter.next()) {
            pairs.push((key, entry));
        }
        let handle = placeholder_handle(value, self.tag())?;
        match ctx.heap().get_mut(handle) {
            Object::Map(entries) => {
                *entries = pairs;
                Ok(())
            }
            other => Err(wrong_kind("Map", other)),
        }
    }
}
