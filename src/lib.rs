//! sealprops - interactive editor for passphrase-encrypted properties files

#![forbid(unsafe_code)]

pub mod cli;
pub mod editor;
pub mod error;
pub mod file_ops;
pub mod loader;
pub mod passphrase;
pub mod properties;
pub mod secretcrypt;
pub mod store;
pub mod varmor;
