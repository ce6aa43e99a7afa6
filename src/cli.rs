//! Command-line options and the top-level run
//!
//! Arguments come as flat `--flag value` pairs. Pairs with an unknown flag
//! are dropped before the rest is handed to clap, so stray options never
//! stop a run.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::{debug, info};

use crate::editor::{self, LineIo};
use crate::error::{ErrorCategory, ErrorKind, PropsError, Result};
use crate::file_ops;
use crate::loader::{self, LoadedStore};
use crate::passphrase::{
    ConstantPassphraseReader, FilePassphraseReader, PassphraseReader, TerminalPassphraseReader,
};

/// Environment variable holding the passphrase for non-interactive use.
pub const PASSPHRASE_ENV: &str = "SEALPROPS_PASSPHRASE";

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "SEALPROPS_LOG";

const VALUE_FLAGS: &[&str] = &[
    "--in",
    "--out",
    "--in-encrypted",
    "--verbose",
    "--passphrase-file",
];

const STANDALONE_FLAGS: &[&str] = &["-h", "--help", "-V", "--version"];

#[derive(Parser, Debug)]
#[command(name = "sealprops")]
#[command(version)]
#[command(about = "Create and edit encrypted properties files.", long_about = None)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Encrypted or plaintext properties file to read; a new one is created
    /// if it does not exist
    #[arg(long = "in", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Encrypted properties file to write [default: the input file]
    #[arg(long = "out", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Whether the input file is encrypted
    #[arg(
        long = "in-encrypted",
        value_name = "BOOL",
        action = ArgAction::Set,
        default_value = "true",
        value_parser = parse_flag
    )]
    pub in_encrypted: bool,

    /// Print every entry, decrypted, after saving (insecure)
    #[arg(
        long,
        value_name = "BOOL",
        action = ArgAction::Set,
        default_value = "false",
        value_parser = parse_flag
    )]
    pub verbose: bool,

    /// Read the passphrase from this file instead of the terminal
    #[arg(long = "passphrase-file", value_name = "FILE")]
    pub passphrase_file: Option<PathBuf>,
}

/// `true` in any letter case is true; everything else is false.
fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    Ok(value.eq_ignore_ascii_case("true"))
}

/// Keeps the program name and every recognised `--flag value` pair.
///
/// Arguments are consumed two at a time. A pair whose flag is unknown is
/// dropped whole, as is a known flag with no value after it. Help and
/// version flags stand alone.
pub fn recognized_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut kept: Vec<OsString> = args.next().into_iter().collect();

    while let Some(flag) = args.next() {
        match flag.to_str() {
            Some(name) if STANDALONE_FLAGS.contains(&name) => kept.push(flag),
            Some(name) if VALUE_FLAGS.contains(&name) => {
                if let Some(value) = args.next() {
                    // `--flag=value` keeps values that start with `-` intact.
                    let mut joined = flag;
                    joined.push("=");
                    joined.push(value);
                    kept.push(joined);
                }
            }
            _ => {
                args.next();
            }
        }
    }

    kept
}

/// Fully resolved options for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    pub input_encrypted: bool,
    pub verbose: bool,
    pub passphrase_file: Option<PathBuf>,
}

impl TryFrom<Cli> for RunOptions {
    type Error = PropsError;

    fn try_from(cli: Cli) -> Result<Self> {
        // Without --out the input file is overwritten.
        let output = cli.output.or_else(|| cli.input.clone()).ok_or_else(|| {
            PropsError::with_kind(
                ErrorCategory::User,
                ErrorKind::Usage,
                "You must specify an input file or output file",
            )
        })?;

        Ok(Self {
            input: cli.input,
            output,
            input_encrypted: cli.in_encrypted,
            verbose: cli.verbose,
            passphrase_file: cli.passphrase_file,
        })
    }
}

/// Picks the passphrase source: `--passphrase-file`, then the
/// `SEALPROPS_PASSPHRASE` environment variable, then the terminal.
pub fn passphrase_reader(options: &RunOptions) -> Box<dyn PassphraseReader> {
    if let Some(path) = &options.passphrase_file {
        debug!(path = %path.display(), "reading passphrase from file");
        Box::new(FilePassphraseReader::new(path))
    } else if let Some(value) = std::env::var_os(PASSPHRASE_ENV) {
        debug!("reading passphrase from {}", PASSPHRASE_ENV);
        Box::new(ConstantPassphraseReader::new(value.into_encoded_bytes()))
    } else {
        Box::new(TerminalPassphraseReader::new())
    }
}

/// Loads the store, runs the edit dialogue, and writes the result.
pub fn run(
    options: &RunOptions,
    passphrase: &mut dyn PassphraseReader,
    io: &mut dyn LineIo,
) -> Result<()> {
    let LoadedStore { mut store, source } = loader::load_store(
        options.input.as_deref(),
        options.input_encrypted,
        passphrase,
        io,
    )?;
    debug!(?source, entries = store.len(), "store ready for editing");

    let summary = editor::edit(&mut store, io)?;
    info!(
        added = summary.added,
        replaced = summary.replaced,
        declined = summary.declined,
        skipped = summary.skipped,
        "editing finished"
    );

    file_ops::persist_store(&mut store, &options.output, io)?;

    if options.verbose {
        file_ops::report_entries(&store, io)?;
    }
    Ok(())
}
