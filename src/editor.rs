//! Interactive entry editor
//!
//! Reads keys and values line by line and merges them into a store. A blank
//! key (or end of input) ends the session. Replacing an existing key needs
//! an explicit `y` or `yes`; blank values are never written.

use std::io::{BufRead, Write};

use crate::error::{PropsError, Result};
use crate::store::EncryptedProperties;
use tracing::debug;

const KEY_PROMPT: &str = "Enter key: ";
const REPLACE_PROMPT: &str = "Key already exists. Replace? ";
const VALUE_PROMPT: &str = "Enter value: ";

/// Line-oriented dialogue with the operator.
pub trait LineIo {
    /// Shows `text` without a line break and makes sure it is visible.
    fn prompt(&mut self, text: &str) -> Result<()>;

    /// Shows `line` followed by a line break.
    fn say(&mut self, line: &str) -> Result<()>;

    /// Reads one line without its terminator; `None` at end of input.
    fn read_line(&mut self) -> Result<Option<String>>;
}

/// [`LineIo`] over any buffered reader and writer, typically stdin/stdout.
pub struct StreamIo<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> StreamIo<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: BufRead, W: Write> LineIo for StreamIo<R, W> {
    fn prompt(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_all(text.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|e| PropsError::io("failed to write prompt", e))
    }

    fn say(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{}", line)
            .and_then(|()| self.writer.flush())
            .map_err(|e| PropsError::io("failed to write to terminal", e))
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| PropsError::io("failed to read input line", e))?;
        if read == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

/// What an editing session did to the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EditSummary {
    /// New keys written.
    pub added: usize,
    /// Existing keys overwritten after confirmation.
    pub replaced: usize,
    /// Existing keys the operator chose not to overwrite.
    pub declined: usize,
    /// Keys dropped because no value was given.
    pub skipped: usize,
}

enum State {
    AwaitKey,
    AwaitConfirm(String),
    AwaitValue { key: String, replacing: bool },
    Done,
}

/// Runs the key/value dialogue against `store` until a blank key or end of
/// input.
pub fn edit(store: &mut EncryptedProperties, io: &mut dyn LineIo) -> Result<EditSummary> {
    let mut summary = EditSummary::default();
    let mut state = State::AwaitKey;

    loop {
        state = match state {
            State::AwaitKey => {
                io.prompt(KEY_PROMPT)?;
                match io.read_line()? {
                    None => State::Done,
                    Some(key) if key.is_empty() => State::Done,
                    Some(key) if store.contains_key(&key) => State::AwaitConfirm(key),
                    Some(key) => State::AwaitValue {
                        key,
                        replacing: false,
                    },
                }
            }
            State::AwaitConfirm(key) => {
                io.prompt(REPLACE_PROMPT)?;
                match io.read_line()?.as_deref() {
                    Some("y") | Some("yes") => State::AwaitValue {
                        key,
                        replacing: true,
                    },
                    _ => {
                        debug!(key = %key, "kept existing value");
                        summary.declined += 1;
                        State::AwaitKey
                    }
                }
            }
            State::AwaitValue { key, replacing } => {
                io.prompt(VALUE_PROMPT)?;
                match io.read_line()? {
                    Some(value) if !value.is_empty() => {
                        debug!(key = %key, replacing, "set property");
                        store.set_property(key, value);
                        if replacing {
                            summary.replaced += 1;
                        } else {
                            summary.added += 1;
                        }
                    }
                    _ => {
                        debug!(key = %key, "no value given, entry skipped");
                        summary.skipped += 1;
                    }
                }
                State::AwaitKey
            }
            State::Done => break,
        };
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secretcrypt::PropertyCipher;
    use zeroize::Zeroizing;

    fn store_with(entries: &[(&str, &str)]) -> EncryptedProperties {
        let mut store =
            EncryptedProperties::new(PropertyCipher::new(Zeroizing::new(b"pw".to_vec())));
        for (k, v) in entries {
            store.set_property(*k, *v);
        }
        store
    }

    /// Runs the editor over a scripted input, returning the summary and the
    /// transcript of everything written.
    fn run_script(store: &mut EncryptedProperties, script: &str) -> (EditSummary, String) {
        let mut io = StreamIo::new(script.as_bytes(), Vec::new());
        let summary = edit(store, &mut io).unwrap();
        let (_, written) = io.into_inner();
        (summary, String::from_utf8(written).unwrap())
    }

    #[test]
    fn test_adds_new_entries() {
        let mut store = store_with(&[]);
        let (summary, transcript) = run_script(&mut store, "user\nadmin\npass\nhunter2\n\n");

        assert_eq!(store.get("user"), Some("admin"));
        assert_eq!(store.get("pass"), Some("hunter2"));
        assert_eq!(summary.added, 2);
        assert_eq!(
            transcript,
            "Enter key: Enter value: Enter key: Enter value: Enter key: "
        );
    }

    #[test]
    fn test_blank_key_ends_immediately() {
        let mut store = store_with(&[("a", "1")]);
        let (summary, transcript) = run_script(&mut store, "\nb\n2\n");

        assert_eq!(store.len(), 1);
        assert!(!store.contains_key("b"));
        assert_eq!(summary, EditSummary::default());
        assert_eq!(transcript, "Enter key: ");
    }

    #[test]
    fn test_end_of_input_ends_session() {
        let mut store = store_with(&[]);
        let (summary, _) = run_script(&mut store, "k\nv\n");

        assert_eq!(store.get("k"), Some("v"));
        assert_eq!(summary.added, 1);
    }

    #[test]
    fn test_replace_confirmed() {
        for answer in ["y", "yes"] {
            let mut store = store_with(&[("k", "v1")]);
            let script = format!("k\n{}\nv2\n\n", answer);
            let (summary, transcript) = run_script(&mut store, &script);

            assert_eq!(store.get("k"), Some("v2"));
            assert_eq!(summary.replaced, 1);
            assert_eq!(
                transcript,
                "Enter key: Key already exists. Replace? Enter value: Enter key: "
            );
        }
    }

    #[test]
    fn test_replace_declined_reprompts_for_key() {
        for answer in ["n", "Y", "YES", "yes please", " y", ""] {
            let mut store = store_with(&[("k", "v1")]);
            let script = format!("k\n{}\nother\nx\n\n", answer);
            let (summary, transcript) = run_script(&mut store, &script);

            assert_eq!(store.get("k"), Some("v1"), "answer {:?} replaced", answer);
            assert_eq!(store.get("other"), Some("x"));
            assert_eq!(summary.declined, 1);
            assert_eq!(
                transcript,
                "Enter key: Key already exists. Replace? Enter key: Enter value: Enter key: "
            );
        }
    }

    #[test]
    fn test_blank_value_for_existing_key_keeps_old_value() {
        let mut store = store_with(&[("k", "v1")]);
        let (summary, _) = run_script(&mut store, "k\ny\n\n\n");

        assert_eq!(store.get("k"), Some("v1"));
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.replaced, 0);
    }

    #[test]
    fn test_blank_value_for_new_key_discards_it() {
        let mut store = store_with(&[]);
        let (summary, _) = run_script(&mut store, "k2\n\n\n");

        assert!(!store.contains_key("k2"));
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_end_of_input_while_confirming() {
        let mut store = store_with(&[("k", "v1")]);
        let (summary, transcript) = run_script(&mut store, "k\n");

        assert_eq!(store.get("k"), Some("v1"));
        assert_eq!(summary.declined, 1);
        assert_eq!(
            transcript,
            "Enter key: Key already exists. Replace? Enter key: "
        );
    }

    #[test]
    fn test_end_of_input_while_awaiting_value() {
        let mut store = store_with(&[]);
        let (summary, _) = run_script(&mut store, "k");

        assert!(store.is_empty());
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_crlf_lines() {
        let mut store = store_with(&[("k", "v1")]);
        run_script(&mut store, "k\r\nyes\r\nv2\r\nnew\r\nvalue\r\n\r\n");

        assert_eq!(store.get("k"), Some("v2"));
        assert_eq!(store.get("new"), Some("value"));
    }

    #[test]
    fn test_values_keep_surrounding_spaces() {
        let mut store = store_with(&[]);
        run_script(&mut store, "k\n  padded  \n\n");

        assert_eq!(store.get("k"), Some("  padded  "));
    }
}
