//! Subscription edge lists.
//!
//! `subs[i]` describes who listens to `objs[i]`. A store target's list starts with
//! its flags as a bare number; every other entry is one edge string:
//!
//! | kind | shape                        |
//! |------|------------------------------|
//! | `0`  | `0 <host>`                   |
//! | `1`  | `1 <host> <key>`             |
//! | `2`  | `2 <host> <node> <attr>`     |
//! | `3`  | `3 <host> <node>`            |
//!
//! Keys and attribute names run to the end of the string, so they may contain spaces.

use serde_json::Value as Json;

use crate::heap::{Heap, ObjRef, Subscriber};

use super::collector::Collected;
use super::error::DecodeError;
use super::tags::{format_ordinal, parse_ordinal};

/// A decoded edge, still addressed by ordinals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeSpec {
    Host { host: usize },
    Keyed { host: usize, key: String },
    Attribute { host: usize, node: usize, prop: String },
    Text { host: usize, node: usize },
}

impl EdgeSpec {
    pub fn host(&self) -> usize {
        match self {
            EdgeSpec::Host { host }
            | EdgeSpec::Keyed { host, .. }
            | EdgeSpec::Attribute { host, .. }
            | EdgeSpec::Text { host, .. } => *host,
        }
    }

    pub fn node(&self) -> Option<usize> {
        match self {
            EdgeSpec::Attribute { node, .. } | EdgeSpec::Text { node, .. } => Some(*node),
            _ => None,
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            EdgeSpec::Host { host } => format!("0 {}", format_ordinal(*host)),
            EdgeSpec::Keyed { host, key } => format!("1 {} {key}", format_ordinal(*host)),
            EdgeSpec::Attribute { host, node, prop } => format!(
                "2 {} {} {prop}",
                format_ordinal(*host),
                format_ordinal(*node)
            ),
            EdgeSpec::Text { host, node } => {
                format!("3 {} {}", format_ordinal(*host), format_ordinal(*node))
            }
        }
    }

    pub fn parse(edge: &str) -> Result<Self, DecodeError> {
        let malformed = || DecodeError::MalformedSnapshot(format!("bad subscription edge {edge:?}"));
        let (kind, rest) = edge.split_once(' ').ok_or_else(malformed)?;
        let mut fields = rest.splitn(3, ' ');
        let mut ordinal = || fields.next().and_then(parse_ordinal).ok_or_else(malformed);

        match kind {
            "0" => Ok(EdgeSpec::Host { host: ordinal()? }),
            "1" => {
                let (host, key) = rest.split_once(' ').ok_or_else(malformed)?;
                Ok(EdgeSpec::Keyed {
                    host: parse_ordinal(host).ok_or_else(malformed)?,
                    key: key.to_string(),
                })
            }
            "2" => {
                let host = ordinal()?;
                let node = ordinal()?;
                let prop = fields.next().ok_or_else(malformed)?;
                Ok(EdgeSpec::Attribute {
                    host,
                    node,
                    prop: prop.to_string(),
                })
            }
            "3" => {
                let host = ordinal()?;
                let node = ordinal()?;
                Ok(EdgeSpec::Text { host, node })
            }
            _ => Err(malformed()),
        }
    }
}

/// Edge list for one cell. Edges whose host or node did not make it into the
/// snapshot are dropped.
pub fn encode_edges(heap: &Heap, collected: &Collected, target: ObjRef) -> Vec<Json> {
    let mut out = Vec::new();
    if let Some(flags) = heap.store_flags(target) {
        out.push(Json::from(flags));
    }
    let Some(manager) = heap.manager(target) else {
        return out;
    };
    for sub in manager.subscribers() {
        let Some(host) = collected.object_ordinal(sub.host()) else {
            continue;
        };
        let node = match sub.node() {
            Some(node) => match collected.object_ordinal(node) {
                Some(ordinal) => Some(ordinal),
                None => continue,
            },
            None => None,
        };
        let spec = match (sub, node) {
            (Subscriber::Host { .. }, _) => EdgeSpec::Host { host },
            (Subscriber::Keyed { key, .. }, _) => EdgeSpec::Keyed {
                host,
                key: key.clone(),
            },
            (Subscriber::Attribute { prop, .. }, Some(node)) => EdgeSpec::Attribute {
                host,
                node,
                prop: prop.clone(),
            },
            (Subscriber::Text { .. }, Some(node)) => EdgeSpec::Text { host, node },
            _ => continue,
        };
        out.push(Json::from(spec.to_wire()));
    }
    out
}

/// Splits a cell's edge list into store flags and edges.
pub fn parse_edges(list: &[Json]) -> Result<(Option<u32>, Vec<EdgeSpec>), DecodeError> {
    let mut flags = None;
    let mut edges = Vec::with_capacity(list.len());
    for (i, entry) in list.iter().enumerate() {
        match entry {
            Json::Number(n) if i == 0 => {
                let value = n
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| DecodeError::MalformedSnapshot(format!("bad store flags {n}")))?;
                flags = Some(value);
            }
            Json::String(edge) => edges.push(EdgeSpec::parse(edge)?),
            other => {
                return Err(DecodeError::MalformedSnapshot(format!(
                    "unexpected subscription entry {other}"
                )))
            }
        }
    }
    Ok((flags, edges))
}
