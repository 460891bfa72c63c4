//! Persistent set of disabled module names.
//!
//! One name per line. Writers take an exclusive lock on `<file>.lock` and
//! re-read the list under the lock, so two processes toggling different
//! modules both keep their change.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tempfile::NamedTempFile;

use crate::error::{RegistryError, Result};

#[derive(Debug, Clone)]
pub struct DisabledList {
    path: PathBuf,
    names: BTreeSet<String>,
}

impl DisabledList {
    /// Read the list once. A missing file is an empty list.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let names = read_names(&path)?;
        Ok(Self { path, names })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Record `name` as disabled or enabled. Returns whether the on-disk
    /// list changed; an unchanged list is not rewritten.
    pub fn set_disabled(&mut self, name: &str, disabled: bool) -> Result<bool> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| RegistryError::io(parent, e))?;

        let lock_path = lock_path(&self.path);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| RegistryError::io(&lock_path, e))?;
        // Released when `lock` is dropped.
        lock.lock_exclusive()
            .map_err(|e| RegistryError::io(&lock_path, e))?;

        let mut names = read_names(&self.path)?;
        let changed = if disabled {
            names.insert(name.to_string())
        } else {
            names.remove(name)
        };

        if changed {
            write_names(&self.path, parent, &names)?;
            tracing::debug!(
                module = name,
                disabled,
                path = %self.path.display(),
                "disabled list updated"
            );
        }
        self.names = names;
        Ok(changed)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".lock");
    PathBuf::from(s)
}

fn read_names(path: &Path) -> Result<BTreeSet<String>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(RegistryError::io(path, e)),
    }
}

fn write_names(path: &Path, dir: &Path, names: &BTreeSet<String>) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| RegistryError::io(dir, e))?;
    for name in names {
        writeln!(tmp, "{name}").map_err(|e| RegistryError::io(tmp.path(), e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| RegistryError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| RegistryError::io(path, e.error))?;
    Ok(())
}
