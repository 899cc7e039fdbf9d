//! Private key loading, passphrase detection and fingerprints.

use std::path::Path;
use std::sync::Arc;

use ssh_key::{HashAlg, PrivateKey};

use crate::error::{BackupError, Result};

/// Check if an SSH key has a passphrase.
///
/// Returns `true` if the key is encrypted (requires passphrase), `false` if unencrypted.
pub fn key_has_passphrase(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();

    let key_data = std::fs::read_to_string(path).map_err(|e| {
        BackupError::Authentication(format!("Failed to read key file {}: {}", path.display(), e))
    })?;

    match PrivateKey::from_openssh(&key_data) {
        Ok(key) => Ok(key.is_encrypted()),
        // PEM keys: fall back to asking russh whether it can load them as-is.
        Err(_) => Ok(russh_keys::load_secret_key(path, None).is_err()
            && key_data.contains("ENCRYPTED")),
    }
}

/// Load the private key used for authentication.
///
/// Unreadable, malformed and locked keys are all reported as authentication
/// failures: the credential cannot be presented to the server.
pub fn load_private_key(
    path: impl AsRef<Path>,
    passphrase: Option<&str>,
) -> Result<Arc<russh_keys::PrivateKey>> {
    let path = path.as_ref();

    if passphrase.is_none() && key_has_passphrase(path)? {
        return Err(BackupError::Authentication(format!(
            "SSH key {} is encrypted. Set KEY_PASSPHRASE to unlock it.",
            path.display()
        )));
    }

    let key = russh_keys::load_secret_key(path, passphrase).map_err(|e| {
        BackupError::Authentication(format!("Failed to load key {}: {}", path.display(), e))
    })?;

    Ok(Arc::new(key))
}

/// Calculate the SHA256 fingerprint of an SSH key.
///
/// Returns fingerprint in the format: `SHA256:base64hash`
pub fn key_fingerprint(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();

    let key_data = std::fs::read_to_string(path).map_err(|e| {
        BackupError::Authentication(format!("Failed to read key file {}: {}", path.display(), e))
    })?;

    if let Ok(private_key) = PrivateKey::from_openssh(&key_data) {
        let fingerprint = private_key.public_key().fingerprint(HashAlg::Sha256);
        return Ok(fingerprint.to_string());
    }

    Err(BackupError::Authentication(format!(
        "Failed to parse SSH key from {}",
        path.display()
    )))
}
