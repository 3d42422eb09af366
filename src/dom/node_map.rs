//! Node map: aligns a pre-order document walk with the sparse set of nodes that
//! snapshot cells refer to.
//!
//! Alphabet:
//! - `0`-`9` run: skip that many element nodes
//! - letters: a text node; its length (in chars) in base 26, lowercase for leading
//!   digits and uppercase for the final digit (`A` = 0, `bB` = 27)
//! - `{` / `}`: enter / leave a fragment
//! - `~`: the next consumed node is retained; retained nodes are numbered in order
//! - `^`: only valid as the first instruction; retains the container root itself
//!
//! Nodes after the last instruction are not described (the snapshot script itself
//! is appended after the map is computed).

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::{Document, NodeId, WalkEvent};

pub const RETAIN: char = '~';
pub const FRAGMENT_OPEN: char = '{';
pub const FRAGMENT_CLOSE: char = '}';
pub const CONTAINER_ROOT: char = '^';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeMapError {
    #[error("Node map expected {expected} at instruction {position}, document has {found}")]
    Mismatch {
        position: usize,
        expected: &'static str,
        found: String,
    },

    #[error("Node map text length mismatch at instruction {position}: map says {expected}, node has {found}")]
    TextLength {
        position: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid node map character {ch:?} at {position}")]
    InvalidChar { position: usize, ch: char },

    #[error("Node map ends inside a text length")]
    Truncated,
}

/// Result of encoding: the instruction string and each retained node's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedNodeMap {
    pub instructions: String,
    pub index: HashMap<NodeId, usize>,
}

/// Encodes the walk of `doc`, marking every node in `retained`.
pub fn encode(doc: &Document, retained: &HashSet<NodeId>) -> EncodedNodeMap {
    let mut out = String::new();
    let mut index = HashMap::new();
    let mut skip = 0usize;
    // Whether the open run starts with a retained element.
    let mut run_retains = false;

    // The walk starts below the root, so the root gets its own marker.
    if retained.contains(&doc.root()) {
        out.push(CONTAINER_ROOT);
        index.insert(doc.root(), 0);
    }

    let flush = |out: &mut String, skip: &mut usize| {
        if *skip > 0 {
            out.push_str(&skip.to_string());
            *skip = 0;
        }
    };

    for event in doc.walk() {
        match event {
            WalkEvent::Element(id) => {
                if retained.contains(&id) {
                    // `~` applies to the first element of the following run.
                    flush(&mut out, &mut skip);
                    out.push(RETAIN);
                    index.insert(id, index.len());
                    run_retains = true;
                }
                skip += 1;
            }
            WalkEvent::Text(id) => {
                flush(&mut out, &mut skip);
                run_retains = false;
                if retained.contains(&id) {
                    out.push(RETAIN);
                    index.insert(id, index.len());
                }
                let len = doc.text(id).map(|t| t.chars().count()).unwrap_or(0);
                push_text_length(&mut out, len);
            }
            WalkEvent::EnterFragment(id) => {
                flush(&mut out, &mut skip);
                run_retains = false;
                if retained.contains(&id) {
                    out.push(RETAIN);
                    index.insert(id, index.len());
                }
                out.push(FRAGMENT_OPEN);
            }
            WalkEvent::ExitFragment(_) => {
                flush(&mut out, &mut skip);
                run_retains = false;
                out.push(FRAGMENT_CLOSE);
            }
        }
    }
    // A trailing run of plain elements needs no description.
    if run_retains {
        flush(&mut out, &mut skip);
    }
    EncodedNodeMap {
        instructions: out,
        index,
    }
}

/// Replays `instructions` against `doc` and returns retained nodes in index order.
pub fn decode(doc: &Document, instructions: &str) -> Result<Vec<NodeId>, NodeMapError> {
    let events = doc.walk();
    let mut cursor = 0usize;
    let mut retained = Vec::new();
    let mut retain_next = false;
    let chars: Vec<char> = instructions.chars().collect();
    let mut pos = 0usize;

    let describe = |event: Option<&WalkEvent>| match event {
        Some(WalkEvent::Element(_)) => "an element".to_string(),
        Some(WalkEvent::Text(_)) => "a text node".to_string(),
        Some(WalkEvent::EnterFragment(_)) => "a fragment start".to_string(),
        Some(WalkEvent::ExitFragment(_)) => "a fragment end".to_string(),
        None => "no more nodes".to_string(),
    };

    while pos < chars.len() {
        let ch = chars[pos];
        match ch {
            '0'..='9' => {
                let start = pos;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let run: String = chars[start..pos].iter().collect();
                let count: usize = run.parse().map_err(|_| NodeMapError::InvalidChar {
                    position: start,
                    ch,
                })?;
                for n in 0..count {
                    match events.get(cursor) {
                        Some(WalkEvent::Element(id)) => {
                            if n == 0 && retain_next {
                                retained.push(*id);
                                retain_next = false;
                            }
                            cursor += 1;
                        }
                        other => {
                            return Err(NodeMapError::Mismatch {
                                position: start,
                                expected: "an element",
                                found: describe(other),
                            })
                        }
                    }
                }
                continue;
            }
            'a'..='z' | 'A'..='Z' => {
                let start = pos;
                let (len, next) = read_text_length(&chars, pos)?;
                pos = next;
                match events.get(cursor) {
                    Some(WalkEvent::Text(id)) => {
                        let found = doc.text(*id).map(|t| t.chars().count()).unwrap_or(0);
                        if found != len {
                            return Err(NodeMapError::TextLength {
                                position: start,
                                expected: len,
                                found,
                            });
                        }
                        if retain_next {
                            retained.push(*id);
                            retain_next = false;
                        }
                        cursor += 1;
                    }
                    other => {
                        return Err(NodeMapError::Mismatch {
                            position: start,
                            expected: "a text node",
                            found: describe(other),
                        })
                    }
                }
                continue;
            }
            FRAGMENT_OPEN => match events.get(cursor) {
                Some(WalkEvent::EnterFragment(id)) => {
                    if retain_next {
                        retained.push(*id);
                        retain_next = false;
                    }
                    cursor += 1;
                }
                other => {
                    return Err(NodeMapError::Mismatch {
                        position: pos,
                        expected: "a fragment start",
                        found: describe(other),
                    })
                }
            },
            FRAGMENT_CLOSE => match events.get(cursor) {
                Some(WalkEvent::ExitFragment(_)) => cursor += 1,
                other => {
                    return Err(NodeMapError::Mismatch {
                        position: pos,
                        expected: "a fragment end",
                        found: describe(other),
                    })
                }
            },
            RETAIN => retain_next = true,
            CONTAINER_ROOT if pos == 0 => retained.push(doc.root()),
            other => {
                return Err(NodeMapError::InvalidChar {
                    position: pos,
                    ch: other,
                })
            }
        }
        pos += 1;
    }
    Ok(retained)
}

fn push_text_length(out: &mut String, len: usize) {
    let mut digits = Vec::new();
    let mut n = len;
    loop {
        digits.push((n % 26) as u8);
        n /= 26;
        if n == 0 {
            break;
        }
    }
    let last = digits.len() - 1;
    for (i, digit) in digits.iter().rev().enumerate() {
        let base = if i == last { b'A' } else { b'a' };
        out.push((base + digit) as char);
    }
}

fn read_text_length(chars: &[char], mut pos: usize) -> Result<(usize, usize), NodeMapError> {
    let mut n = 0usize;
    while pos < chars.len() {
        let ch = chars[pos];
        pos += 1;
        match ch {
            'a'..='z' => n = n * 26 + (ch as usize - 'a' as usize),
            'A'..='Z' => return Ok((n * 26 + (ch as usize - 'A' as usize), pos)),
            other => {
                return Err(NodeMapError::InvalidChar {
                    position: pos - 1,
                    ch: other,
                })
            }
        }
    }
    Err(NodeMapError::Truncated)
}
