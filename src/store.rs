//! Encrypting property store
//!
//! An [`EncryptedProperties`] is a plain [`Properties`] mapping paired with
//! the [`PropertyCipher`] it is serialized through. Keys are written in the
//! clear; every value is sealed and armored on the way out, regardless of
//! how the mapping was filled.
//!
//! Each sealed value carries the key it belongs to. A stored file also
//! carries a sealed verifier in a header comment listing every key with the
//! nonce of its sealed value. Opening the verifier checks the passphrase
//! even when there are no entries; comparing the list catches entries that
//! were added, removed or swapped for an older copy.

use std::io::{Read, Write};

use crate::error::{ErrorCategory, ErrorKind, PropsError, Result};
use crate::properties::{self, Properties};
use crate::secretcrypt::{self, PropertyCipher};
use crate::varmor;
use tracing::debug;
use zeroize::Zeroizing;

/// Header comment tag introducing the armored verifier.
const VERIFIER_TAG: &str = "sealprops-verifier=";

/// Leading bytes of every verifier payload.
const VERIFIER_MARKER: &[u8] = b"sealprops verifier 1\n";

/// Reads a property mapping from `reader`.
///
/// With a cipher the file must carry a verifier that opens under it and
/// matches the entries, and every value must be a sealed value bound to its
/// own key; one bad value fails the whole load. Without a cipher the text
/// is returned as parsed.
pub fn load(reader: impl Read, cipher: Option<&mut PropertyCipher>) -> Result<Properties> {
    let text = properties::read_text(reader)?;
    let raw = Properties::parse(&text)?;
    let Some(cipher) = cipher else {
        return Ok(raw);
    };

    let mut entries = Vec::with_capacity(raw.len());
    for (key, armored) in raw.iter() {
        let sealed = varmor::unwrap(armored)
            .map_err(|e| e.with_context(format!("failed to unarmor value of {}", key)))?;
        entries.push((key, sealed));
    }

    let verifier = find_verifier(&text).ok_or_else(|| {
        PropsError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "no sealed verifier found (is the file plaintext?)",
        )
    })?;
    let verifier = varmor::unwrap(verifier)
        .and_then(|sealed| cipher.open(&sealed))
        .map_err(|e| e.with_context("failed to open verifier"))?;
    if !verifier.starts_with(VERIFIER_MARKER) {
        return Err(mismatch("verifier does not hold an entry list"));
    }

    let mut plain = Properties::new();
    for (key, sealed) in &entries {
        let opened = cipher
            .open(sealed)
            .map_err(|e| e.with_context(format!("failed to decrypt value of {}", key)))?;
        plain.set_property(*key, unbind_entry(key, &opened)?);
    }

    let listed = verifier_payload(entries.iter().map(|(key, sealed)| (*key, sealed.as_slice())));
    if verifier.as_slice() != listed.as_slice() {
        return Err(mismatch("entries do not match the verifier"));
    }
    debug!(entries = plain.len(), "decrypted properties");
    Ok(plain)
}

fn find_verifier(text: &str) -> Option<&str> {
    properties::split_lines(text)
        .filter_map(|line| line.strip_prefix('#')?.strip_prefix(VERIFIER_TAG))
        .last()
        .map(str::trim_end)
}

/// Marker, then each key with the nonce its value was sealed under.
fn verifier_payload<'a>(entries: impl Iterator<Item = (&'a str, &'a [u8])>) -> Vec<u8> {
    let mut payload = VERIFIER_MARKER.to_vec();
    for (key, sealed) in entries {
        push_framed(&mut payload, key.as_bytes());
        push_framed(&mut payload, secretcrypt::nonce_of(sealed).unwrap_or_default());
    }
    payload
}

fn push_framed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn take_framed<'a>(rest: &mut &'a [u8]) -> Option<&'a [u8]> {
    let (len, tail) = rest.split_first_chunk::<8>()?;
    let len = usize::try_from(u64::from_be_bytes(*len)).ok()?;
    if tail.len() < len {
        return None;
    }
    let (field, tail) = tail.split_at(len);
    *rest = tail;
    Some(field)
}

/// Sealed plaintext of one entry: framed key, then framed value.
fn bind_entry(key: &str, value: &str) -> Zeroizing<Vec<u8>> {
    let mut plaintext = Zeroizing::new(Vec::with_capacity(16 + key.len() + value.len()));
    push_framed(&mut plaintext, key.as_bytes());
    push_framed(&mut plaintext, value.as_bytes());
    plaintext
}

fn unbind_entry(key: &str, opened: &[u8]) -> Result<String> {
    let mut rest = opened;
    let (Some(bound_key), Some(value)) = (take_framed(&mut rest), take_framed(&mut rest)) else {
        return Err(mismatch(format!("sealed value of {} is not a framed entry", key)));
    };
    if !rest.is_empty() {
        return Err(mismatch(format!("sealed value of {} has trailing bytes", key)));
    }
    if bound_key != key.as_bytes() {
        return Err(mismatch(format!("sealed value of {} belongs to another key", key)));
    }
    String::from_utf8(value.to_vec()).map_err(|e| {
        PropsError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedProperties,
            format!("decrypted value of {} is not valid UTF-8", key),
            e,
        )
    })
}

fn mismatch(msg: impl Into<String>) -> PropsError {
    PropsError::with_kind(ErrorCategory::User, ErrorKind::IntegrityMismatch, msg)
}

/// A property mapping that always encrypts when stored.
pub struct EncryptedProperties {
    props: Properties,
    cipher: PropertyCipher,
}

impl EncryptedProperties {
    /// An empty store.
    pub fn new(cipher: PropertyCipher) -> Self {
        Self::from_plain(Properties::new(), cipher)
    }

    /// Takes over an existing plain mapping.
    pub fn from_plain(props: Properties, cipher: PropertyCipher) -> Self {
        Self { props, cipher }
    }

    /// Reads and decrypts a stored file.
    pub fn load(reader: impl Read, mut cipher: PropertyCipher) -> Result<Self> {
        let props = load(reader, Some(&mut cipher))?;
        Ok(Self { props, cipher })
    }

    /// Splits the store back into its mapping and cipher.
    pub fn into_parts(self) -> (Properties, PropertyCipher) {
        (self.props, self.cipher)
    }

    pub fn properties(&self) -> &Properties {
        &self.props
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.props.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.props.get(key)
    }

    /// Sets `key` to `value`, returning true if an existing value was replaced.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        self.props.set_property(key, value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.props.keys()
    }

    /// Seals every value and writes the result with `comment` and the
    /// sealed verifier as header.
    pub fn store(&mut self, writer: impl Write, comment: &str) -> Result<()> {
        let mut sealed = Vec::with_capacity(self.props.len());
        for (key, value) in self.props.iter() {
            sealed.push((key, self.cipher.seal(&bind_entry(key, value))?));
        }
        let listed = verifier_payload(sealed.iter().map(|(key, value)| (*key, value.as_slice())));
        let verifier = varmor::wrap(&self.cipher.seal(&listed)?);

        let armored: Properties = sealed
            .iter()
            .map(|(key, value)| (*key, varmor::wrap(value)))
            .collect();
        armored.store(writer, &format!("{}\n{}{}", comment, VERIFIER_TAG, verifier))
    }
}
