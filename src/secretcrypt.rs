//! Value encryption using scrypt + XSalsa20Poly1305
//!
//! Every property value is sealed on its own, using:
//! - scrypt for key derivation from passphrase
//! - NaCl secretbox (XSalsa20Poly1305) for authenticated encryption
//!
//! The binary format of one sealed value is:
//! - salt: 8 bytes
//! - nonce: 24 bytes
//! - length: 8 bytes (big-endian signed int64)
//! - sealed box: variable length (includes 16-byte Poly1305 MAC)
//!
//! A cipher picks one salt per session and seals every value with the key
//! derived from it, so a whole file costs a single scrypt run. Keys are
//! cached per salt, which keeps opening a file equally cheap.

use std::collections::HashMap;

use crate::error::{ErrorCategory, ErrorKind, PropsError, Result};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use scrypt::{Params, scrypt};
use tracing::debug;
use zeroize::Zeroizing;

/// Length of salt in bytes
pub const SALT_LEN: usize = 8;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of derived key in bytes
const KEY_LEN: usize = 32;

/// scrypt N parameter (CPU/memory cost)
const SCRYPT_N: u32 = 32768;

/// scrypt r parameter (block size)
const SCRYPT_R: u32 = 8;

/// scrypt p parameter (parallelization)
const SCRYPT_P: u32 = 1;

type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

/// Derive a 32-byte key from a passphrase and salt using scrypt
fn derive_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<DerivedKey> {
    let params = Params::new(SCRYPT_N.ilog2() as u8, SCRYPT_R, SCRYPT_P, KEY_LEN).map_err(|e| {
        PropsError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::ScryptFailure,
            "failed to create scrypt params",
            e,
        )
    })?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt(passphrase, salt, &params, key.as_mut_slice()).map_err(|e| {
        PropsError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::ScryptFailure,
            "scrypt key derivation failed",
            e,
        )
    })?;

    Ok(key)
}

fn secretbox(key: &DerivedKey) -> Result<XSalsa20Poly1305> {
    XSalsa20Poly1305::new_from_slice(key.as_slice()).map_err(|_| {
        PropsError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "derived key has the wrong length",
        )
    })
}

/// The nonce of a sealed value, if it is long enough to carry one.
pub fn nonce_of(sealed: &[u8]) -> Option<&[u8]> {
    sealed.get(SALT_LEN..SALT_LEN + NONCE_LEN)
}

/// Passphrase-bound cipher for property values.
pub struct PropertyCipher {
    passphrase: Zeroizing<Vec<u8>>,
    sealing_salt: Option<[u8; SALT_LEN]>,
    keys: HashMap<[u8; SALT_LEN], DerivedKey>,
}

impl PropertyCipher {
    /// Creates a cipher. No key is derived until the first value is sealed
    /// or opened.
    pub fn new(passphrase: Zeroizing<Vec<u8>>) -> Self {
        Self {
            passphrase,
            sealing_salt: None,
            keys: HashMap::new(),
        }
    }

    fn key_for(&mut self, salt: &[u8; SALT_LEN]) -> Result<&DerivedKey> {
        if !self.keys.contains_key(salt) {
            debug!("deriving key for new salt");
            let key = derive_key(&self.passphrase, salt)?;
            self.keys.insert(*salt, key);
        }
        self.keys.get(salt).ok_or_else(|| {
            PropsError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "derived key missing from cache",
            )
        })
    }

    /// Seal a value under the session salt and a fresh random nonce.
    ///
    /// Returns the binary format: salt(8) + nonce(24) + length(8) + sealedbox(variable)
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let salt = match self.sealing_salt {
            Some(salt) => salt,
            None => {
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                self.sealing_salt = Some(salt);
                salt
            }
        };

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        self.seal_deterministic(plaintext, &salt, &nonce)
    }

    /// Seal a value using the provided salt and nonce.
    ///
    /// This function is ONLY for testing purposes to generate deterministic output.
    /// NEVER use this in production - always use `seal()` which generates a random nonce.
    pub fn seal_deterministic(
        &mut self,
        plaintext: &[u8],
        salt: &[u8; SALT_LEN],
        nonce: &[u8; NONCE_LEN],
    ) -> Result<Vec<u8>> {
        let cipher = secretbox(self.key_for(salt)?)?;

        let nonce_obj = Nonce::from(*nonce);
        let sealed_box = cipher.encrypt(&nonce_obj, plaintext).map_err(|e| {
            PropsError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::SecretboxFailure,
                format!("encryption failed: {}", e),
            )
        })?;

        let sealed_box_len = sealed_box.len() as i64;
        let mut output = Vec::with_capacity(
            SALT_LEN + NONCE_LEN + size_of_val(&sealed_box_len) + sealed_box.len(),
        );
        output.extend_from_slice(salt);
        output.extend_from_slice(nonce);
        output.extend_from_slice(&sealed_box_len.to_be_bytes());
        output.extend_from_slice(&sealed_box);

        Ok(output)
    }

    /// Open a sealed value.
    ///
    /// If no session salt has been chosen yet, the salt of the first value
    /// that opens successfully becomes the session salt.
    pub fn open(&mut self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let mut pos = 0;

        if sealed.len() < pos + SALT_LEN {
            return Err(truncated("input likely truncated while reading salt"));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&sealed[pos..pos + SALT_LEN]);
        pos += SALT_LEN;

        if sealed.len() < pos + NONCE_LEN {
            return Err(truncated("input likely truncated while reading nonce"));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&sealed[pos..pos + NONCE_LEN]);
        pos += NONCE_LEN;

        if sealed.len() < pos + size_of::<i64>() {
            return Err(truncated("input likely truncated while reading sealed box"));
        }
        let mut length_bytes = [0u8; 8];
        length_bytes.copy_from_slice(&sealed[pos..pos + size_of::<i64>()]);
        let sealed_box_len = i64::from_be_bytes(length_bytes);
        pos += size_of::<i64>();

        if sealed_box_len < 0 {
            return Err(binary_format(
                "negative sealed box length (when interpreted as a big-endian i64)",
            ));
        }

        // Check if length exceeds platform's maximum isize. *Valid* input
        // can fail this check if the platforms' isize is small.
        if sealed_box_len > isize::MAX as i64 {
            return Err(binary_format("sealed box length exceeds this system's max isize"));
        }

        let sealed_box_len = sealed_box_len as usize;

        if sealed.len() - pos < sealed_box_len {
            return Err(binary_format(
                "truncated or corrupt input; claimed length greater than available input",
            ));
        }
        let sealed_box = &sealed[pos..pos + sealed_box_len];
        pos += sealed_box_len;

        if pos < sealed.len() {
            return Err(PropsError::with_kind(
                ErrorCategory::User,
                ErrorKind::TrailingData,
                "invalid input: unexpected data after sealed box",
            ));
        }

        let cipher = secretbox(self.key_for(&salt)?)?;
        let nonce_obj = Nonce::from(nonce);
        let plaintext = cipher.decrypt(&nonce_obj, sealed_box).map_err(|_| {
            PropsError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                "corrupt input, tampered-with data, or bad passphrase",
            )
        })?;

        if self.sealing_salt.is_none() {
            self.sealing_salt = Some(salt);
        }

        Ok(Zeroizing::new(plaintext))
    }
}

fn truncated(msg: &str) -> PropsError {
    PropsError::with_kind(ErrorCategory::User, ErrorKind::TruncatedInput, msg)
}

fn binary_format(msg: &str) -> PropsError {
    PropsError::with_kind(ErrorCategory::User, ErrorKind::BinaryFormat, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(passphrase: &[u8]) -> PropertyCipher {
        PropertyCipher::new(Zeroizing::new(passphrase.to_vec()))
    }

    #[test]
    fn test_seal_open() {
        let mut c = cipher(b"test");

        let sealed = c.seal(b"hello").unwrap();
        assert_eq!(&*c.open(&sealed).unwrap(), b"hello");

        let sealed = c.seal(b"").unwrap();
        assert_eq!(&*c.open(&sealed).unwrap(), b"");
    }

    #[test]
    fn test_session_reuses_one_salt() {
        let mut c = cipher(b"test");

        let first = c.seal(b"one").unwrap();
        let second = c.seal(b"two").unwrap();

        assert_eq!(first[..SALT_LEN], second[..SALT_LEN]);
        assert_ne!(first[SALT_LEN..], second[SALT_LEN..]);
        assert_eq!(c.keys.len(), 1);
    }

    #[test]
    fn test_open_adopts_salt_for_sealing() {
        let mut writer = cipher(b"test");
        let sealed = writer.seal(b"value").unwrap();

        let mut reader = cipher(b"test");
        reader.open(&sealed).unwrap();
        let resealed = reader.seal(b"other").unwrap();

        assert_eq!(sealed[..SALT_LEN], resealed[..SALT_LEN]);
        assert_eq!(reader.keys.len(), 1);
    }

    #[test]
    fn test_wrong_passphrase() {
        let sealed = cipher(b"correct").seal(b"secret data").unwrap();
        let err = cipher(b"wrong").open(&sealed).unwrap_err();

        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert!(
            err.to_string()
                .contains("corrupt input, tampered-with data, or bad passphrase")
        );
    }

    #[test]
    fn test_failed_open_does_not_adopt_salt() {
        let sealed = cipher(b"correct").seal(b"secret").unwrap();
        let mut c = cipher(b"wrong");

        assert!(c.open(&sealed).is_err());
        assert!(c.sealing_salt.is_none());
    }

    #[test]
    fn test_truncated_salt() {
        let err = cipher(b"test").open(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::TruncatedInput));
        assert!(err.to_string().contains("while reading salt"));
    }

    #[test]
    fn test_truncated_nonce() {
        let err = cipher(b"test").open(&[0u8; SALT_LEN + 3]).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::TruncatedInput));
        assert!(err.to_string().contains("while reading nonce"));
    }

    #[test]
    fn test_truncated_length() {
        let err = cipher(b"test")
            .open(&[0u8; SALT_LEN + NONCE_LEN + 3])
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::TruncatedInput));
        assert!(err.to_string().contains("while reading sealed box"));
    }

    #[test]
    fn test_negative_length() {
        let mut sealed = vec![0u8; SALT_LEN + NONCE_LEN + 8];
        sealed[SALT_LEN + NONCE_LEN..].copy_from_slice(&(-1i64).to_be_bytes());

        let err = cipher(b"test").open(&sealed).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::BinaryFormat));
        assert!(err.to_string().contains("negative sealed box length"));
    }

    #[test]
    fn test_length_exceeds_available() {
        let mut c = cipher(b"test");
        let mut sealed = c.seal(b"hello").unwrap();
        sealed[SALT_LEN + NONCE_LEN..SALT_LEN + NONCE_LEN + 8]
            .copy_from_slice(&1_000_000i64.to_be_bytes());

        let err = c.open(&sealed).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::BinaryFormat));
    }

    #[test]
    fn test_trailing_data() {
        let mut c = cipher(b"test");
        let mut sealed = c.seal(b"hello").unwrap();
        sealed.push(0xFF);

        let err = c.open(&sealed).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::TrailingData));
    }

    #[test]
    fn test_known_sealed_value() {
        // Fixed salt and nonce pin down the exact wire format. Existing
        // files stop opening if these bytes change.
        let mut c = cipher(b"test");
        let salt = [0x42u8; SALT_LEN];
        let nonce = [0x24u8; NONCE_LEN];

        let sealed = c.seal_deterministic(b"test payload", &salt, &nonce).unwrap();

        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42,
            0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24,
            0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24,
            0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1c,
            0x44, 0x87, 0xfe, 0xcd, 0x6f, 0xcf, 0x10, 0x75,
            0x7b, 0x4c, 0xb9, 0xc6, 0x59, 0xda, 0x83, 0x61,
            0x28, 0xfc, 0xf4, 0x30, 0x39, 0x85, 0x4a, 0x66,
            0xcf, 0xb5, 0xcf, 0xd4,
        ];
        assert_eq!(sealed, expected);

        assert_eq!(&*c.open(&sealed).unwrap(), b"test payload");
    }
}
