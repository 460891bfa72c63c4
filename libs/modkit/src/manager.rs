use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::assets::{AssetPublisher, PublishReport};
use crate::cache::CacheStore;
use crate::contracts::{ConfigProvider, ManifestProviderInspector, ProviderInspector};
use crate::error::{ManifestError, RegistryError, Result};
use crate::orderer::DependencyOrderer;
use crate::registration::RegistrationPlan;
use crate::registry::ModuleRegistry;
use crate::scanner::{ScanOptions, Scanner};
use crate::state::DisabledList;

/// Everything the manager needs to know about the application layout.
/// All paths are absolute or relative to the working directory.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub scan: ScanOptions,
    pub cache_file: PathBuf,
    pub disabled_file: PathBuf,
    pub public_path: PathBuf,
    pub modules_assets: String,
    pub themes_assets: String,
    /// Stamp asset URLs with the source file's mtime.
    pub assets_cache: bool,
    /// Theme used when a caller does not name one.
    pub theme: Option<String>,
    /// Reject dependency cycles instead of breaking them.
    pub strict_dependencies: bool,
}

impl ManagerOptions {
    /// Conventional layout under `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            cache_file: base_path.join("bootstrap/cache/modules.json"),
            disabled_file: base_path.join("storage/modules.disabled"),
            public_path: base_path.join("public"),
            modules_assets: "modules".to_string(),
            themes_assets: "themes".to_string(),
            assets_cache: false,
            theme: None,
            strict_dependencies: false,
            scan: ScanOptions::new(base_path),
        }
    }
}

/// Outcome of a scan.
#[derive(Debug, Default)]
pub struct ScanSummary {
    pub modules: usize,
    pub enabled: usize,
    pub themes: usize,
    pub errors: Vec<ManifestError>,
}

/// Owns the current registry snapshot and serialises changes to it.
///
/// Readers call [`ModuleManager::registry`] and keep the returned `Arc` for
/// as long as they like; writers publish a fresh snapshot.
pub struct ModuleManager {
    options: ManagerOptions,
    inspector: Box<dyn ProviderInspector>,
    cache: CacheStore,
    disabled: Mutex<DisabledList>,
    registry: ArcSwap<ModuleRegistry>,
}

impl ModuleManager {
    /// Manager with an empty registry and the disabled list loaded.
    pub fn new(options: ManagerOptions) -> Result<Self> {
        let disabled = DisabledList::load(&options.disabled_file)?;
        Ok(Self {
            cache: CacheStore::new(&options.cache_file),
            inspector: Box::new(ManifestProviderInspector),
            disabled: Mutex::new(disabled),
            registry: ArcSwap::from_pointee(ModuleRegistry::default()),
            options,
        })
    }

    pub fn with_inspector(mut self, inspector: Box<dyn ProviderInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Restore from the cache, or scan and write the cache when there is no
    /// usable one.
    pub fn boot(options: ManagerOptions) -> Result<Self> {
        let manager = Self::new(options)?;
        manager.load_or_scan()?;
        Ok(manager)
    }

    pub fn load_or_scan(&self) -> Result<()> {
        match self.restore() {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::info!(cache = %self.cache.path().display(), "no module cache, scanning");
                self.scan(true).map(|_| ())
            }
            Err(RegistryError::CacheCorrupt { path, source }) => {
                tracing::warn!(cache = %path.display(), error = %source, "module cache unreadable, rescanning");
                self.scan(true).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Current snapshot.
    pub fn registry(&self) -> Arc<ModuleRegistry> {
        self.registry.load_full()
    }

    /// Load the cache into a new snapshot. `Ok(false)` when there is no cache.
    pub fn restore(&self) -> Result<bool> {
        let Some(blob) = self.cache.load()? else {
            return Ok(false);
        };
        let mut registry = ModuleRegistry::from_blob(&blob);

        let disabled = self.disabled.lock();
        registry.apply_overlay(&disabled, &self.options.scan.manifest_file);
        tracing::info!(
            modules = registry.modules().count(),
            enabled = registry.enabled().count(),
            "module registry restored from cache"
        );
        self.registry.store(Arc::new(registry));
        Ok(true)
    }

    /// Scan and order without touching the current snapshot or the cache.
    pub fn discover(&self) -> Result<(ModuleRegistry, ScanSummary)> {
        let mut disabled = self.disabled.lock();
        self.discover_with(&mut disabled)
    }

    /// The disabled list is re-read first so changes made by other
    /// processes are picked up.
    fn discover_with(&self, disabled: &mut DisabledList) -> Result<(ModuleRegistry, ScanSummary)> {
        *disabled = DisabledList::load(&self.options.disabled_file)?;
        let report = Scanner::new(&self.options.scan, self.inspector.as_ref()).scan()?;
        let ordered = DependencyOrderer::new(self.options.strict_dependencies).order(report.modules)?;

        let mut registry = ModuleRegistry::new(ordered, report.themes);
        registry.apply_overlay(disabled, &self.options.scan.manifest_file);

        let summary = ScanSummary {
            modules: registry.modules().count(),
            enabled: registry.enabled().count(),
            themes: registry.themes().count(),
            errors: report.errors,
        };
        Ok((registry, summary))
    }

    /// Rescan, publish the result and optionally write the cache.
    ///
    /// The writer lock is held until the snapshot is published, so a
    /// concurrent `set_enabled` lands either before the overlay or after
    /// the store.
    pub fn scan(&self, store: bool) -> Result<ScanSummary> {
        let mut disabled = self.disabled.lock();
        let (registry, summary) = self.discover_with(&mut disabled)?;
        if store {
            self.cache.store(&registry.to_blob())?;
        }
        self.registry.store(Arc::new(registry));
        Ok(summary)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.registry.load().is_enabled(name)
    }

    pub fn enable(&self, name: &str) -> Result<bool> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> Result<bool> {
        self.set_enabled(name, false)
    }

    /// Persist the flag, then publish a snapshot reflecting it. Returns
    /// whether the disabled list changed.
    #[tracing::instrument(skip(self))]
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool> {
        let mut disabled = self.disabled.lock();
        let current = self.registry.load_full();

        let module = current.get(name)?;
        if !enabled && module.system {
            return Err(RegistryError::CannotDisableSystemModule(name.to_string()));
        }

        let changed = disabled.set_disabled(name, !enabled)?;

        let mut next = (*current).clone();
        next.apply_overlay(&disabled, &self.options.scan.manifest_file);
        self.registry.store(Arc::new(next));

        if changed {
            tracing::info!(module = name, enabled, "module state changed");
        }
        Ok(changed)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Plan for `theme`, or the configured theme when `None`.
    pub fn registration_plan(
        &self,
        theme: Option<&str>,
        config: &dyn ConfigProvider,
    ) -> Result<RegistrationPlan> {
        let theme = theme.or(self.options.theme.as_deref());
        RegistrationPlan::build(&self.registry(), theme, config)
    }

    pub fn asset_publisher(&self) -> AssetPublisher {
        AssetPublisher::new(
            &self.options.public_path,
            &self.options.modules_assets,
            &self.options.themes_assets,
        )
        .with_cache_busting(self.options.assets_cache)
    }

    pub fn publish_assets(&self) -> PublishReport {
        self.asset_publisher().publish(&self.registry())
    }

    /// Asset URL through the configured theme.
    pub fn asset_url(&self, module: &str, path: &str) -> Result<String> {
        self.asset_publisher()
            .asset_url(&self.registry(), self.options.theme.as_deref(), module, path)
    }
}
