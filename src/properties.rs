//! Plain property mapping and the `key=value` text format
//!
//! The format is the familiar line-oriented properties layout: `#` or `!`
//! comments, `key=value` / `key: value` / `key value` entries, backslash
//! escapes and backslash line continuations. Files are read and written as
//! UTF-8; `\uXXXX` escapes are understood on input but never produced.

use std::fmt;
use std::io::{Read, Write};

use crate::error::{ErrorCategory, ErrorKind, PropsError, Result};
use indexmap::IndexMap;
use zeroize::{Zeroize, Zeroizing};

/// Ordered mapping of property keys to values.
///
/// Iteration follows insertion order; replacing a value keeps the key in
/// its original position. Values are wiped from memory on drop.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: IndexMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Sets `key` to `value`, returning true if an existing value was replaced.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        match self.entries.insert(key.into(), value.into()) {
            Some(mut old) => {
                old.zeroize();
                true
            }
            None => false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Reads properties text from `reader`.
    pub fn load(reader: impl Read) -> Result<Self> {
        Self::parse(&read_text(reader)?)
    }

    /// Parses properties text. Later entries win over earlier ones.
    ///
    /// Lines end at `\n`, `\r\n` or a lone `\r`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut props = Properties::new();
        let mut lines = split_lines(text).enumerate();

        while let Some((idx, line)) = lines.next() {
            let trimmed = line.trim_start_matches(is_blank);
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                continue;
            }

            let mut logical = String::from(trimmed);
            while ends_with_continuation(&logical) {
                logical.pop();
                match lines.next() {
                    Some((_, next)) => logical.push_str(next.trim_start_matches(is_blank)),
                    None => break,
                }
            }

            let (key, value) = split_entry(&logical)
                .map_err(|e| e.with_context(format!("malformed entry on line {}", idx + 1)))?;
            logical.zeroize();
            props.set_property(key, value);
        }

        Ok(props)
    }

    /// Writes `comment` as a header followed by every entry, in order.
    pub fn store(&self, mut writer: impl Write, comment: &str) -> Result<()> {
        let mut text = String::new();
        for line in comment.lines() {
            text.push('#');
            text.push_str(line);
            text.push('\n');
        }
        for (key, value) in self.iter() {
            escape_into(key, true, &mut text);
            text.push('=');
            escape_into(value, false, &mut text);
            text.push('\n');
        }

        let written = writer
            .write_all(text.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| PropsError::io("failed to write properties", e));
        text.zeroize();
        written
    }
}

impl Drop for Properties {
    fn drop(&mut self) {
        for value in self.entries.values_mut() {
            value.zeroize();
        }
    }
}

impl fmt::Debug for Properties {
    // Values are secrets; only keys are shown.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Properties")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.set_property(k, v);
        }
        props
    }
}

/// Reads all of `reader` as UTF-8 text, wiped again on drop.
pub(crate) fn read_text(mut reader: impl Read) -> Result<Zeroizing<String>> {
    let mut text = Zeroizing::new(String::new());
    reader.read_to_string(&mut text).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            PropsError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::MalformedProperties,
                "properties input is not valid UTF-8",
                e,
            )
        } else {
            PropsError::io("failed to read properties", e)
        }
    })?;
    Ok(text)
}

pub(crate) fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let Some(end) = rest.find(['\n', '\r']) else {
            return Some(std::mem::take(&mut rest));
        };
        let line = &rest[..end];
        let skip = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[end + skip..];
        Some(line)
    })
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> Result<(String, String)> {
    let mut key_end = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                break;
            }
            c if is_blank(c) => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let mut rest = line[key_end..].trim_start_matches(is_blank);
    if let Some(after) = rest.strip_prefix(|c: char| c == '=' || c == ':') {
        rest = after.trim_start_matches(is_blank);
    }

    Ok((unescape(&line[..key_end])?, unescape(rest)?))
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => out.push(unicode_escape(&mut chars)?),
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}

/// Decodes the hex digits following `\u`, joining UTF-16 surrogate pairs.
fn unicode_escape(chars: &mut std::str::Chars<'_>) -> Result<char> {
    let high = hex4(chars)?;
    if !(0xD800..0xDC00).contains(&high) {
        return char::from_u32(high).ok_or_else(|| malformed("unpaired surrogate in \\u escape"));
    }

    if chars.next() != Some('\\') || chars.next() != Some('u') {
        return Err(malformed("high surrogate not followed by a \\u escape"));
    }
    let low = hex4(chars)?;
    if !(0xDC00..0xE000).contains(&low) {
        return Err(malformed("high surrogate not followed by a low surrogate"));
    }
    char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))
        .ok_or_else(|| malformed("invalid surrogate pair in \\u escape"))
}

fn hex4(chars: &mut std::str::Chars<'_>) -> Result<u32> {
    let mut value = 0;
    for _ in 0..4 {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| malformed("malformed \\uXXXX escape"))?;
        value = value * 16 + digit;
    }
    Ok(value)
}

fn malformed(msg: &str) -> PropsError {
    PropsError::with_kind(ErrorCategory::User, ErrorKind::MalformedProperties, msg)
}

fn escape_into(s: &str, is_key: bool, out: &mut String) {
    for (i, c) in s.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
}
