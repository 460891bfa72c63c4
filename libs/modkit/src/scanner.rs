//! Filesystem discovery of modules and themes.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::contracts::ProviderInspector;
use crate::error::{ManifestError, RegistryError, Result};
use crate::manifest::{ModuleBlock, PackageManifest, ThemeBlock};
use crate::module::{Module, Theme};

/// Where and how to look for packages.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Application root. Relative search paths resolve against it and it is
    /// itself inspected when `include_root` is set.
    pub base_path: PathBuf,
    /// Directories or glob patterns whose first-level subdirectories are
    /// package candidates.
    pub paths: Vec<String>,
    pub include_root: bool,
    pub manifest_file: String,
}

impl ScanOptions {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            paths: vec!["modules".to_string()],
            include_root: true,
            manifest_file: "composer.json".to_string(),
        }
    }
}

/// Result of one scan, before ordering.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Modules in discovery order, `dependencies` already translated to
    /// module names.
    pub modules: Vec<Module>,
    pub themes: Vec<Theme>,
    /// package name → module name
    pub package_aliases: BTreeMap<String, String>,
    /// Per-package failures; the rest of the scan still completed.
    pub errors: Vec<ManifestError>,
}

struct Candidate {
    module: Module,
    requires: Vec<String>,
}

pub struct Scanner<'a> {
    options: &'a ScanOptions,
    inspector: &'a dyn ProviderInspector,
}

impl<'a> Scanner<'a> {
    pub fn new(options: &'a ScanOptions, inspector: &'a dyn ProviderInspector) -> Self {
        Self { options, inspector }
    }

    #[tracing::instrument(skip(self), fields(base = %self.options.base_path.display()))]
    pub fn scan(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        let mut candidates = Vec::new();

        for (dir, is_root) in self.package_dirs()? {
            self.inspect(&dir, is_root, &mut candidates, &mut report);
        }

        // Requirement links point at packages; keep only those that are modules.
        report.modules = candidates
            .into_iter()
            .map(|Candidate { mut module, requires }| {
                module.dependencies = requires
                    .iter()
                    .filter_map(|pkg| report.package_aliases.get(pkg))
                    .filter(|dep| **dep != module.name)
                    .cloned()
                    .collect();
                module
            })
            .collect();

        tracing::info!(
            modules = report.modules.len(),
            themes = report.themes.len(),
            errors = report.errors.len(),
            "scan finished"
        );
        Ok(report)
    }

    /// Candidate package directories, each inspected once. The root package
    /// comes first.
    fn package_dirs(&self) -> Result<Vec<(PathBuf, bool)>> {
        let base = &self.options.base_path;
        let mut seen = HashSet::new();
        let mut dirs = Vec::new();

        if self.options.include_root && base.is_dir() {
            seen.insert(canonical(base));
            dirs.push((canonical(base), true));
        }

        for pattern in &self.options.paths {
            let full = if Path::new(pattern).is_absolute() {
                PathBuf::from(pattern)
            } else {
                base.join(pattern)
            };
            let full = full.to_string_lossy().into_owned();
            let matches =
                glob::glob(&full).map_err(|source| RegistryError::InvalidSearchPath {
                    pattern: pattern.clone(),
                    source,
                })?;

            for entry in matches {
                let root = match entry {
                    Ok(p) if p.is_dir() => p,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "unreadable search path entry");
                        continue;
                    }
                };
                for dir in subdirectories(&root) {
                    let dir = canonical(&dir);
                    if seen.insert(dir.clone()) {
                        dirs.push((dir, false));
                    }
                }
            }
        }
        Ok(dirs)
    }

    fn inspect(
        &self,
        dir: &Path,
        is_root: bool,
        candidates: &mut Vec<Candidate>,
        report: &mut ScanReport,
    ) {
        let manifest_path = dir.join(&self.options.manifest_file);
        let manifest = match PackageManifest::read_in(dir, &self.options.manifest_file) {
            Ok(Some(m)) => m,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "skipping package");
                report.errors.push(e);
                return;
            }
        };
        tracing::info!(
            package = manifest.name.as_deref().unwrap_or("<unnamed>"),
            path = %dir.display(),
            "discovered package"
        );

        let module = manifest
            .module_block(&manifest_path)
            .and_then(|block| {
                block
                    .map(|b| self.build_module(&manifest, b, dir, is_root, &manifest_path))
                    .transpose()
            });
        match module {
            Ok(Some(candidate)) => {
                if let Some(package) = &manifest.name {
                    report
                        .package_aliases
                        .insert(package.clone(), candidate.module.name.clone());
                }
                candidates.push(candidate);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "skipping module block");
                report.errors.push(e);
            }
        }

        let theme = manifest
            .theme_block(&manifest_path)
            .and_then(|block| {
                block
                    .map(|b| build_theme(&manifest, b, dir, &manifest_path))
                    .transpose()
            });
        match theme {
            Ok(Some(theme)) => report.themes.push(theme),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "skipping theme block");
                report.errors.push(e);
            }
        }
    }

    fn build_module(
        &self,
        manifest: &PackageManifest,
        block: ModuleBlock,
        dir: &Path,
        is_root: bool,
        manifest_path: &Path,
    ) -> std::result::Result<Candidate, ManifestError> {
        let name = manifest.module_name(&block, manifest_path)?;
        let namespace = block
            .namespace
            .as_deref()
            .map(|ns| ns.trim_matches('\\'))
            .filter(|ns| !ns.is_empty())
            .map(str::to_string)
            .or_else(|| manifest.autoload_namespace())
            .ok_or_else(|| ManifestError::UnresolvableNamespace {
                path: manifest_path.to_path_buf(),
                module: name.clone(),
            })?;

        let mut module = Module::new(name, dir)
            .with_namespace(namespace)
            .with_system(is_root || block.system);
        module.description = manifest.description.clone().unwrap_or_default();
        module.aliases = block.aliases;
        module.extra = block.extra;

        for declaration in &block.providers {
            let provider = self.inspector.describe(&module.name, declaration);
            if provider.deferred && !provider.provides.is_empty() {
                for service in provider.provides {
                    module
                        .deferred
                        .entry(service)
                        .or_insert_with(|| provider.class.clone());
                }
                continue;
            }
            if provider.deferred {
                tracing::warn!(
                    module = %module.name,
                    provider = %provider.class,
                    "deferred provider declares no services, registering eagerly"
                );
            }
            if !module.providers.contains(&provider.class) {
                module.providers.push(provider.class);
            }
        }

        Ok(Candidate {
            module,
            requires: manifest.requires(),
        })
    }
}

fn build_theme(
    manifest: &PackageManifest,
    block: ThemeBlock,
    dir: &Path,
    manifest_path: &Path,
) -> std::result::Result<Theme, ManifestError> {
    let name = block
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| manifest.package_segment())
        .map(str::to_string)
        .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .ok_or_else(|| ManifestError::MissingName {
            path: manifest_path.to_path_buf(),
            block: "theme",
        })?;

    let mut theme = Theme::new(name, dir);
    theme.extends = block.extends.filter(|p| !p.trim().is_empty());
    Ok(theme)
}

fn subdirectories(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %root.display(), error = %e, "cannot list search path");
            return Vec::new();
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    dirs
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
