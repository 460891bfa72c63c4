//! On-disk cache of the last scan.
//!
//! The artifact is a single JSON document holding plain module records plus
//! the provider, deferred-service and alias indexes. Every key is optional
//! on read so older or hand-trimmed files still load.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::error::{RegistryError, Result};
use crate::module::{Module, Theme};

pub const CACHE_VERSION: u32 = 1;

/// Module data without the enabled flag or the provider indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleRecord {
    pub name: String,
    pub namespace: Option<String>,
    pub path: PathBuf,
    pub description: String,
    pub system: bool,
    pub dependencies: Vec<String>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheBlob {
    pub version: u32,
    pub modules: Vec<ModuleRecord>,
    pub themes: Vec<Theme>,
    /// module → namespace
    pub namespaces: BTreeMap<String, String>,
    /// module → path
    pub paths: BTreeMap<String, PathBuf>,
    /// module → eager providers
    pub providers: BTreeMap<String, Vec<String>>,
    /// module → service → provider
    pub deferred: BTreeMap<String, BTreeMap<String, String>>,
    /// module → alias → class
    pub aliases: BTreeMap<String, BTreeMap<String, String>>,
}

impl CacheBlob {
    pub fn from_parts<'a>(
        modules: impl IntoIterator<Item = &'a Module>,
        themes: impl IntoIterator<Item = &'a Theme>,
    ) -> Self {
        let mut blob = CacheBlob {
            version: CACHE_VERSION,
            themes: themes.into_iter().cloned().collect(),
            ..CacheBlob::default()
        };

        for m in modules {
            if let Some(ns) = &m.namespace {
                blob.namespaces.insert(m.name.clone(), ns.clone());
            }
            blob.paths.insert(m.name.clone(), m.path.clone());
            if !m.providers.is_empty() {
                blob.providers.insert(m.name.clone(), m.providers.clone());
            }
            if !m.deferred.is_empty() {
                blob.deferred.insert(m.name.clone(), m.deferred.clone());
            }
            if !m.aliases.is_empty() {
                blob.aliases.insert(m.name.clone(), m.aliases.clone());
            }
            blob.modules.push(ModuleRecord {
                name: m.name.clone(),
                namespace: m.namespace.clone(),
                path: m.path.clone(),
                description: m.description.clone(),
                system: m.system,
                dependencies: m.dependencies.clone(),
                extra: m.extra.clone(),
            });
        }
        blob
    }

    /// Reassemble modules, in stored order. All come back enabled; the
    /// disabled list is applied afterwards.
    pub fn modules(&self) -> Vec<Module> {
        self.modules
            .iter()
            .map(|rec| {
                let mut m = Module::new(rec.name.clone(), rec.path.clone());
                m.namespace = rec
                    .namespace
                    .clone()
                    .or_else(|| self.namespaces.get(&rec.name).cloned());
                if m.path.as_os_str().is_empty() {
                    if let Some(p) = self.paths.get(&rec.name) {
                        m.path = p.clone();
                    }
                }
                m.description = rec.description.clone();
                m.system = rec.system;
                m.dependencies = rec.dependencies.clone();
                m.extra = rec.extra.clone();
                m.providers = self.providers.get(&rec.name).cloned().unwrap_or_default();
                m.deferred = self.deferred.get(&rec.name).cloned().unwrap_or_default();
                m.aliases = self.aliases.get(&rec.name).cloned().unwrap_or_default();
                m
            })
            .collect()
    }
}

/// Reads and writes the cache artifact at a fixed location.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no cache has been written yet.
    pub fn load(&self) -> Result<Option<CacheBlob>> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RegistryError::io(&self.path, e)),
        };

        let blob: CacheBlob =
            serde_json::from_slice(&raw).map_err(|source| RegistryError::CacheCorrupt {
                path: self.path.clone(),
                source,
            })?;
        if blob.version != CACHE_VERSION {
            tracing::debug!(
                path = %self.path.display(),
                version = blob.version,
                "loading module cache written by a different version"
            );
        }
        Ok(Some(blob))
    }

    /// Write via a temp file in the same directory, then rename over the
    /// target. Readers never observe a half-written cache.
    pub fn store(&self, blob: &CacheBlob) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| RegistryError::io(parent, e))?;

        let body = serde_json::to_vec_pretty(blob).map_err(RegistryError::CacheEncode)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| RegistryError::io(parent, e))?;
        tmp.write_all(&body)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| RegistryError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| RegistryError::io(&self.path, e.error))?;

        tracing::debug!(path = %self.path.display(), modules = blob.modules.len(), "module cache written");
        Ok(())
    }

    /// Remove the artifact. Never fails.
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "module cache cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to clear module cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blog() -> Module {
        let mut m = Module::new("blog", "/srv/app/modules/blog").with_namespace("Acme\\Blog");
        m.description = "Blog".into();
        m.providers = vec!["Acme\\Blog\\BlogServiceProvider".into()];
        m.deferred
            .insert("blog.feed".into(), "Acme\\Blog\\FeedProvider".into());
        m.aliases.insert("Blog".into(), "Acme\\Blog\\Facades\\Blog".into());
        m.extra.insert("listeners".into(), json!(true));
        m
    }

    #[test]
    fn store_then_load_restores_modules() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("bootstrap/cache/modules.json"));
        let mut shop = Module::new("shop", "/srv/app/modules/shop").with_namespace("Acme\\Shop");
        shop.dependencies = vec!["blog".into()];
        let themes = vec![Theme::new("dark", "/srv/app/themes/dark")];

        let modules = vec![blog(), shop];
        store
            .store(&CacheBlob::from_parts(&modules, &themes))
            .unwrap();

        let blob = store.load().unwrap().expect("cache present");
        assert_eq!(blob.version, CACHE_VERSION);
        assert_eq!(blob.modules(), modules);
        assert_eq!(blob.themes, themes);
        assert_eq!(blob.namespaces["shop"], "Acme\\Shop");
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("modules.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = CacheStore::new(&path).load().unwrap_err();
        assert!(matches!(err, RegistryError::CacheCorrupt { .. }));
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.json");
        std::fs::write(
            &path,
            br#"{"modules": [{"name": "blog", "path": "/srv/blog"}]}"#,
        )
        .unwrap();

        let blob = CacheStore::new(&path).load().unwrap().unwrap();
        let modules = blob.modules();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "blog");
        assert!(modules[0].enabled);
        assert!(modules[0].providers.is_empty());
        assert!(blob.themes.is_empty());
    }

    #[test]
    fn clear_is_silent_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("modules.json"));
        store.clear();
        store.store(&CacheBlob::default()).unwrap();
        assert!(store.path().exists());
        store.clear();
        assert!(!store.path().exists());
    }
}
