//! Pure Rust SSH transport.
//!
//! ## Modules
//!
//! - [`keys`] - private key loading, passphrase detection, fingerprints
//! - [`client`] - connection, host key verification, authentication
//! - [`exec`] - remote command execution
//! - [`sftp`] - file download via SFTP

mod client;
pub mod config;
mod exec;
mod keys;
mod sftp;

pub use client::SshClient;
pub use config::{HostKeyPolicy, SshConfig};
pub use exec::{shell_quote, CommandOutput};
