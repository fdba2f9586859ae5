use std::path::{Path, PathBuf};

use crate::driver::machine::MachineRecord;
use crate::error::{DriverError, Result};

const RECORD_FILE: &str = "machine.json";
const KEY_FILE: &str = "id_ed25519";

/// Machine records on disk, one directory per machine:
/// `<config dir>/ionoscloud-machine/machines/<name>/machine.json`.
pub struct MachineStore {
    root: PathBuf,
}

impl MachineStore {
    pub fn open() -> Result<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            DriverError::Config("Could not determine config directory".to_string())
        })?;
        Ok(Self::at(config_dir.join("ionoscloud-machine").join("machines")))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn machine_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(DriverError::Config(format!("invalid machine name '{}'", name)));
        }
        Ok(self.root.join(name))
    }

    /// Where the machine's generated SSH key lives
    pub fn key_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.machine_dir(name)?.join(KEY_FILE))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.machine_dir(name)
            .map(|dir| dir.join(RECORD_FILE).exists())
            .unwrap_or(false)
    }

    pub fn load(&self, name: &str) -> Result<MachineRecord> {
        let path = self.machine_dir(name)?.join(RECORD_FILE);
        if !path.exists() {
            return Err(DriverError::MachineNotFound(name.to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the record atomically (temp file + rename).
    pub fn save(&self, record: &MachineRecord) -> Result<()> {
        let dir = self.machine_dir(&record.name)?;
        std::fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!("{}.tmp", RECORD_FILE));
        std::fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, dir.join(RECORD_FILE))?;

        tracing::debug!("Saved machine record {}", record.name);
        Ok(())
    }

    /// Delete the machine's record and key
    pub fn remove(&self, name: &str) -> Result<()> {
        let dir = self.machine_dir(name)?;
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join(RECORD_FILE).exists() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
