//! Store loading
//!
//! Picks how the session's store comes to life: empty, decrypted from an
//! existing file, or read as plaintext and taken over for encryption. The
//! result is always an encrypting store.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::editor::LineIo;
use crate::error::{PropsError, Result};
use crate::passphrase::PassphraseReader;
use crate::secretcrypt::PropertyCipher;
use crate::store::{self, EncryptedProperties};
use tracing::info;

/// Where the loaded store's initial contents came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSource {
    /// No input, or the input file does not exist.
    New,
    /// Decrypted from this file.
    Encrypted(PathBuf),
    /// Read in the clear from this file.
    Plaintext(PathBuf),
}

pub struct LoadedStore {
    pub store: EncryptedProperties,
    pub source: StoreSource,
}

/// Loads the store named by `input`.
///
/// A status line describing the path taken is written to `io` before the
/// passphrase is requested. Failing to read or decrypt an existing file is
/// an error; it never falls back to an empty store.
pub fn load_store(
    input: Option<&Path>,
    input_encrypted: bool,
    passphrase: &mut dyn PassphraseReader,
    io: &mut dyn LineIo,
) -> Result<LoadedStore> {
    let existing = match input {
        Some(path) => {
            let exists = path
                .try_exists()
                .map_err(|e| PropsError::io(format!("failed to check {}", path.display()), e))?;
            exists.then_some(path)
        }
        None => None,
    };

    let Some(path) = existing else {
        io.say("Input properties file not found. Creating new.")?;
        let cipher = PropertyCipher::new(passphrase.read_passphrase()?);
        return Ok(LoadedStore {
            store: EncryptedProperties::new(cipher),
            source: StoreSource::New,
        });
    };

    let shown = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let label = if input_encrypted {
        "Encrypted"
    } else {
        "Plaintext"
    };
    io.say(&format!("{} properties found in {}", label, shown.display()))?;

    let file = File::open(path)
        .map_err(|e| PropsError::io(format!("failed to open {}", path.display()), e))?;
    let cipher = PropertyCipher::new(passphrase.read_passphrase()?);
    let context = || format!("failed to load {}", path.display());

    let (store, source) = if input_encrypted {
        let decrypted = EncryptedProperties::load(BufReader::new(file), cipher)
            .map_err(|e| e.with_context(context()))?;
        let (props, cipher) = decrypted.into_parts();
        (
            EncryptedProperties::from_plain(props, cipher),
            StoreSource::Encrypted(path.to_path_buf()),
        )
    } else {
        let props =
            store::load(BufReader::new(file), None).map_err(|e| e.with_context(context()))?;
        (
            EncryptedProperties::from_plain(props, cipher),
            StoreSource::Plaintext(path.to_path_buf()),
        )
    };

    info!(entries = store.len(), path = %path.display(), "loaded properties");
    Ok(LoadedStore { store, source })
}
