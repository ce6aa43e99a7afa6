//! Store persistence
//!
//! The output file is only touched once editing is over, and then only by
//! an atomic rename: readers see either the previous file or the complete
//! new one, never a partial write. This also makes it safe for the input
//! and output to be the same file.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::editor::LineIo;
use crate::error::{ErrorCategory, ErrorKind, PropsError, Result};
use crate::store::EncryptedProperties;
use tracing::{debug, info};

/// Header written at the top of every stored file.
pub const STORE_COMMENT: &str = "Encrypted Properties File generated by sealprops";

/// Encrypts `store` into `output`, replacing whatever was there.
pub fn persist_store(
    store: &mut EncryptedProperties,
    output: &Path,
    io: &mut dyn LineIo,
) -> Result<()> {
    write_atomic(output, |file| store.store(file, STORE_COMMENT))
        .map_err(|e| e.with_context(format!("failed to write to {}", output.display())))?;
    info!(entries = store.len(), path = %output.display(), "stored properties");
    io.say(&format!(
        "Encrypted Properties file output to {}",
        output.display()
    ))
}

/// Prints every entry, decrypted, in store order.
pub fn report_entries(store: &EncryptedProperties, io: &mut dyn LineIo) -> Result<()> {
    for (key, value) in store.properties().iter() {
        io.say(&format!("   {}={}", key, value))?;
    }
    Ok(())
}

/// Writes through `write` into a tempfile next to `path`, then renames it
/// over `path` (tempfile + fsync + rename).
fn write_atomic(path: &Path, write: impl FnOnce(&mut File) -> Result<()>) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        PropsError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to create tempfile in {}", dir.display()),
            e,
        )
    })?;

    write(temp_file.as_file_mut())?;

    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file.flush().map_err(|e| {
        PropsError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        PropsError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| {
                PropsError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to get tempfile metadata",
                    e,
                )
            })?
            .permissions();
        perms.set_mode(0o600);
        temp_file.as_file().set_permissions(perms).map_err(|e| {
            PropsError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to set tempfile permissions",
                e,
            )
        })?;
    }

    temp_file.persist(path).map_err(|e| {
        PropsError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;

    release_dir(dir);
    Ok(())
}

/// Best-effort fsync of the directory holding a freshly renamed file.
///
/// The new file is already in place when this runs, so a failure here must
/// not turn a completed write into an error. It is logged and dropped.
fn release_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            debug!(dir = %dir.display(), error = %e, "ignoring directory sync failure");
        }
    }

    #[cfg(not(unix))]
    let _ = dir;
}
