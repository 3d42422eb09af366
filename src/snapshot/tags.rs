//! Reserved tag bytes and the small text helpers shared by encoder and decoder.

use std::borrow::Cow;
use std::fmt;

/// Highest reserved code point; anything above may start a literal string as-is.
pub const RESERVED_MAX: u8 = 0x1A;

/// Suffix on a reference payload meaning "the store wrapper of this target".
pub const STORE_SUFFIX: char = '!';

/// A single reserved byte prefixing a tagged cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u8);

impl Tag {
    pub const UNDEFINED: Tag = Tag(0x01);
    pub const REFERENCE: Tag = Tag(0x02);
    pub const QRL: Tag = Tag(0x03);
    pub const TASK: Tag = Tag(0x04);
    pub const RESOURCE: Tag = Tag(0x05);
    pub const URL: Tag = Tag(0x06);
    pub const DATE: Tag = Tag(0x07);
    pub const REGEXP: Tag = Tag(0x08);
    pub const ERROR: Tag = Tag(0x09);
    pub const DOCUMENT: Tag = Tag(0x0A);
    pub const COMPONENT: Tag = Tag(0x0B);
    pub const COMPUTED: Tag = Tag(0x0C);
    pub const SIGNAL: Tag = Tag(0x0D);
    pub const NON_FINITE: Tag = Tag(0x0E);
    pub const BIGINT: Tag = Tag(0x0F);
    pub const SET: Tag = Tag(0x10);
    pub const MAP: Tag = Tag(0x11);
    pub const ELEMENT: Tag = Tag(0x12);
    pub const PROMISE: Tag = Tag(0x13);
    pub const STRING: Tag = Tag(RESERVED_MAX);

    /// Returns `None` outside the reserved range.
    pub const fn new(byte: u8) -> Option<Tag> {
        if byte <= RESERVED_MAX {
            Some(Tag(byte))
        } else {
            None
        }
    }

    pub fn byte(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }

    /// Tag of a string's first character, if it is reserved.
    pub fn of(s: &str) -> Option<Tag> {
        let first = s.chars().next()?;
        if (first as u32) <= RESERVED_MAX as u32 {
            Some(Tag(first as u8))
        } else {
            None
        }
    }

    /// Prefixes `payload` with this tag.
    pub fn wrap(self, payload: &str) -> String {
        let mut out = String::with_capacity(payload.len() + 1);
        out.push(self.as_char());
        out.push_str(payload);
        out
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::UNDEFINED => "undefined",
            Tag::REFERENCE => "ref",
            Tag::QRL => "qrl",
            Tag::TASK => "task",
            Tag::RESOURCE => "resource",
            Tag::URL => "url",
            Tag::DATE => "date",
            Tag::REGEXP => "regexp",
            Tag::ERROR => "error",
            Tag::DOCUMENT => "document",
            Tag::COMPONENT => "component",
            Tag::COMPUTED => "computed",
            Tag::SIGNAL => "signal",
            Tag::NON_FINITE => "non-finite",
            Tag::BIGINT => "bigint",
            Tag::SET => "set",
            Tag::MAP => "map",
            Tag::ELEMENT => "element",
            Tag::PROMISE => "promise",
            Tag::STRING => "string",
            _ => "unknown",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02x})", self.name(), self.0)
    }
}

/// Escapes a literal string whose first character collides with a tag.
pub fn escape_string(s: &str) -> Cow<'_, str> {
    if Tag::of(s).is_some() {
        Cow::Owned(Tag::STRING.wrap(s))
    } else {
        Cow::Borrowed(s)
    }
}

/// Splits a tagged string into tag and payload.
pub fn split_tagged(s: &str) -> Option<(Tag, &str)> {
    let tag = Tag::of(s)?;
    Some((tag, &s[1..]))
}

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Formats an ordinal in base 36.
pub fn format_ordinal(mut n: usize) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[n % 36]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

pub fn parse_ordinal(s: &str) -> Option<usize> {
    if s.is_empty() {
        return None;
    }
    usize::from_str_radix(s, 36).ok()
}

/// Reference payload: base-36 ordinal, optionally followed by [`STORE_SUFFIX`].
pub fn parse_reference(payload: &str) -> Option<(usize, bool)> {
    match payload.strip_suffix(STORE_SUFFIX) {
        Some(ordinal) => Some((parse_ordinal(ordinal)?, true)),
        None => Some((parse_ordinal(payload)?, false)),
    }
}

pub fn format_reference(ordinal: usize, wrapped: bool) -> String {
    let mut payload = format_ordinal(ordinal);
    if wrapped {
        payload.push(STORE_SUFFIX);
    }
    payload
}
