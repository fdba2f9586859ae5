//! SSH key pair for a machine.
//!
//! Every machine gets its own ed25519 key, stored next to its record. An
//! existing key at the configured path is reused as is.

use std::path::{Path, PathBuf};

use ssh_key::{Algorithm, LineEnding, PrivateKey};

use crate::error::{DriverError, Result};

/// Path of the public half of a key
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut path = private_key.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// Make sure a key pair exists at `path` and return the OpenSSH public key.
pub fn ensure_key_pair(path: &Path) -> Result<String> {
    let pub_path = public_key_path(path);

    if path.exists() && pub_path.exists() {
        tracing::debug!("Reusing SSH key at {}", path.display());
        return read_public_key(&pub_path);
    }

    if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Ssh(format!("Failed to read private key: {}", e)))?;
        let private_key = PrivateKey::from_openssh(content)
            .map_err(|e| DriverError::Ssh(format!("Failed to parse private key: {}", e)))?;
        return write_public_key(&private_key, &pub_path);
    }

    generate_key_pair(path)
}

/// Generate a new ed25519 key pair without passphrase.
pub fn generate_key_pair(path: &Path) -> Result<String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DriverError::Ssh(format!("Failed to create key directory: {}", e)))?;
    }

    let private_key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
        .map_err(|e| DriverError::Ssh(format!("Failed to generate SSH key: {}", e)))?;

    let private_openssh = private_key
        .to_openssh(LineEnding::LF)
        .map_err(|e| DriverError::Ssh(format!("Failed to encode private key: {}", e)))?;

    std::fs::write(path, private_openssh.as_bytes())
        .map_err(|e| DriverError::Ssh(format!("Failed to write private key: {}", e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| DriverError::Ssh(format!("Failed to set key permissions: {}", e)))?;
    }

    let public_key = write_public_key(&private_key, &public_key_path(path))?;
    tracing::info!("Generated SSH key at {}", path.display());

    Ok(public_key)
}

fn write_public_key(private_key: &PrivateKey, pub_path: &Path) -> Result<String> {
    let public_openssh = private_key
        .public_key()
        .to_openssh()
        .map_err(|e| DriverError::Ssh(format!("Failed to encode public key: {}", e)))?;

    std::fs::write(pub_path, format!("{}\n", public_openssh))
        .map_err(|e| DriverError::Ssh(format!("Failed to write public key: {}", e)))?;

    Ok(public_openssh)
}

fn read_public_key(pub_path: &Path) -> Result<String> {
    std::fs::read_to_string(pub_path)
        .map(|s| s.trim().to_string())
        .map_err(|e| DriverError::Ssh(format!("Failed to read public key: {}", e)))
}
