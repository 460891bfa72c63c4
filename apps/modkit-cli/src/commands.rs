//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use modkit::{ManagerOptions, Module, ModuleManager, ScanOptions};
use modkit_bootstrap::{AppConfig, AppConfigProvider};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::{Commands, ModkitConfigAdapter};

#[derive(Tabled, Serialize)]
struct ModuleRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "State")]
    state: &'static str,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Tabled, Serialize)]
struct ThemeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Extends")]
    extends: String,
    #[tabled(rename = "Path")]
    path: String,
}

pub(crate) fn dispatch(config: AppConfig, command: Commands) -> Result<()> {
    let options = manager_options(&config);

    match command {
        Commands::List { enabled, json } => list(&options, enabled, json),
        Commands::Enable { name } => toggle(&options, &name, true),
        Commands::Disable { name } => toggle(&options, &name, false),
        Commands::Scan { pretend } => scan(&options, pretend),
        Commands::Resolve { namespace, path } => resolve(&options, namespace, path),
        Commands::Themes => themes(&options),
        Commands::Plan { theme } => plan(config, &options, theme.as_deref()),
        Commands::PublishAssets => publish_assets(&options),
        Commands::ClearCache => {
            ModuleManager::new(options)?.clear_cache();
            println!("Module cache cleared");
            Ok(())
        }
        Commands::Check => check(&options),
    }
}

/// Registry layout from the `registry` section, resolved against the base path.
pub(crate) fn manager_options(config: &AppConfig) -> ManagerOptions {
    let registry = &config.registry;
    let base = config.base_path();
    ManagerOptions {
        scan: ScanOptions {
            base_path: base,
            paths: registry.paths.clone(),
            include_root: registry.include_root,
            manifest_file: registry.manifest_file.clone(),
        },
        cache_file: config.registry_path(&registry.cache_file),
        disabled_file: config.registry_path(&registry.disabled_file),
        public_path: config.registry_path(&registry.public_path),
        modules_assets: registry.modules_assets.clone(),
        themes_assets: registry.themes_assets.clone(),
        assets_cache: registry.assets_cache,
        theme: registry.theme.clone(),
        strict_dependencies: registry.strict_dependencies,
    }
}

fn boot(options: &ManagerOptions) -> Result<ModuleManager> {
    ModuleManager::boot(options.clone()).context("failed to load module registry")
}

fn list(options: &ManagerOptions, only_enabled: bool, json: bool) -> Result<()> {
    let manager = boot(options)?;
    let registry = manager.registry();
    let base = canonical_base(&options.scan.base_path);

    let rows: Vec<ModuleRow> = registry
        .modules()
        .values()
        .filter(|m| !only_enabled || m.enabled)
        .map(|m| ModuleRow {
            name: m.name.clone(),
            namespace: m.namespace.clone().unwrap_or_default(),
            path: relative_to(&m.path, &base),
            state: state_label(m),
            description: m.description.clone(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("No modules found");
    } else {
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{table}");
    }
    Ok(())
}

fn toggle(options: &ManagerOptions, name: &str, enabled: bool) -> Result<()> {
    let manager = boot(options)?;
    let changed = manager.set_enabled(name, enabled)?;
    let verb = if enabled { "enabled" } else { "disabled" };
    if changed {
        println!("Module '{name}' {verb}");
    } else {
        println!("Module '{name}' is already {verb}");
    }
    Ok(())
}

fn scan(options: &ManagerOptions, pretend: bool) -> Result<()> {
    let manager = ModuleManager::new(options.clone())?;
    let summary = if pretend {
        let (registry, summary) = manager.discover()?;
        for module in registry.modules().values() {
            println!("  {} ({})", module.name, state_label(module));
        }
        summary
    } else {
        manager.scan(true)?
    };

    for err in &summary.errors {
        eprintln!("warning: {err}");
    }
    println!(
        "{} modules ({} enabled), {} themes{}",
        summary.modules,
        summary.enabled,
        summary.themes,
        if pretend { " [pretend, cache untouched]" } else { "" }
    );
    Ok(())
}

fn resolve(
    options: &ManagerOptions,
    namespace: Option<String>,
    path: Option<PathBuf>,
) -> Result<()> {
    let manager = boot(options)?;
    let registry = manager.registry();

    let module = match (namespace, path) {
        (Some(ns), _) => registry.by_namespace(&ns)?,
        (None, Some(path)) => {
            let path = std::path::absolute(&path)
                .with_context(|| format!("invalid path {}", path.display()))?;
            let path = std::fs::canonicalize(&path).unwrap_or(path);
            registry.by_path(path)?
        }
        (None, None) => bail!("either --namespace or --path is required"),
    };
    println!("{}", module.name);
    Ok(())
}

fn themes(options: &ManagerOptions) -> Result<()> {
    let manager = boot(options)?;
    let registry = manager.registry();
    let base = canonical_base(&options.scan.base_path);

    let rows: Vec<ThemeRow> = registry
        .themes()
        .values()
        .map(|t| ThemeRow {
            name: t.name.clone(),
            extends: t.extends.clone().unwrap_or_default(),
            path: relative_to(&t.path, &base),
        })
        .collect();

    if rows.is_empty() {
        println!("No themes found");
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{table}");
    Ok(())
}

fn plan(config: AppConfig, options: &ManagerOptions, theme: Option<&str>) -> Result<()> {
    let manager = boot(options)?;
    let provider = ModkitConfigAdapter(Arc::new(AppConfigProvider::new(config)));
    let plan = manager.registration_plan(theme, &provider)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn publish_assets(options: &ManagerOptions) -> Result<()> {
    let manager = boot(options)?;
    let report = manager.publish_assets();

    for link in &report.linked {
        println!("linked  {}", link.display());
    }
    for (target, reason) in &report.failed {
        eprintln!("failed  {}: {reason}", target.display());
    }
    if !report.is_clean() {
        bail!("{} asset link(s) could not be created", report.failed.len());
    }
    Ok(())
}

fn check(options: &ManagerOptions) -> Result<()> {
    let manager = ModuleManager::new(options.clone())?;
    let (registry, summary) = manager.discover()?;

    if let Some(theme) = &options.theme {
        registry
            .theme_chain(theme)
            .with_context(|| format!("configured theme '{theme}' is not installed"))?;
    }
    for err in &summary.errors {
        eprintln!("error: {err}");
    }
    if !summary.errors.is_empty() {
        bail!("{} package manifest(s) failed to load", summary.errors.len());
    }

    println!(
        "Configuration OK: {} modules, {} themes",
        summary.modules, summary.themes
    );
    Ok(())
}

fn state_label(module: &Module) -> &'static str {
    match (module.system, module.enabled) {
        (true, true) => "System",
        (true, false) => "System (disabled)",
        (false, true) => "Enabled",
        (false, false) => "Disabled",
    }
}

fn canonical_base(base: &Path) -> PathBuf {
    std::fs::canonicalize(base).unwrap_or_else(|_| base.to_path_buf())
}

/// `path` relative to `base`, or unchanged when it lives elsewhere.
fn relative_to(path: &Path, base: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}
