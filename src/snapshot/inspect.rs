//! Human-readable views of snapshot text, without materializing anything.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as Json;

use super::tags::{parse_reference, split_tagged, Tag};
use super::SnapshotData;

const PREVIEW_CHARS: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSummary {
    pub ordinal: usize,
    pub kind: String,
    pub edges: usize,
    pub root: bool,
    pub preview: String,
}

impl fmt::Display for CellSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.root { "*" } else { " " };
        write!(
            f,
            "{marker}{:>5}  {:<10} {:>3}  {}",
            self.ordinal, self.kind, self.edges, self.preview
        )
    }
}

/// Kind label for one cell.
pub fn kind_of(cell: &Json) -> String {
    match cell {
        Json::Null => "null".to_string(),
        Json::Bool(_) => "bool".to_string(),
        Json::Number(_) => "number".to_string(),
        Json::Array(_) => "array".to_string(),
        Json::Object(_) => "object".to_string(),
        Json::String(s) => match split_tagged(s) {
            Some((tag, _)) if tag == Tag::STRING => "string".to_string(),
            Some((tag, _)) => tag.name().to_string(),
            None => "string".to_string(),
        },
    }
}

fn preview(cell: &Json) -> String {
    let text = match cell {
        Json::String(s) => match split_tagged(s) {
            Some((tag, payload)) if tag != Tag::STRING => payload.escape_debug().to_string(),
            Some((_, payload)) => format!("{:?}", payload),
            None => format!("{:?}", s),
        },
        other => other.to_string(),
    };
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        text
    }
}

/// One summary per cell, in ordinal order.
pub fn describe(data: &SnapshotData) -> Vec<CellSummary> {
    let roots: Vec<usize> = data
        .roots
        .iter()
        .filter_map(|root| parse_reference(root).map(|(ordinal, _)| ordinal))
        .collect();
    data.objs
        .iter()
        .enumerate()
        .map(|(ordinal, cell)| CellSummary {
            ordinal,
            kind: kind_of(cell),
            edges: data
                .subs
                .get(ordinal)
                .map(|list| list.iter().filter(|e| e.is_string()).count())
                .unwrap_or(0),
            root: roots.contains(&ordinal),
            preview: preview(cell),
        })
        .collect()
}

/// Cell count per kind.
pub fn kind_counts(data: &SnapshotData) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for cell in &data.objs {
        *counts.entry(kind_of(cell)).or_insert(0) += 1;
    }
    counts
}
