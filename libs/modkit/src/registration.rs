//! What the host application needs to wire enabled modules in.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::contracts::ConfigProvider;
use crate::error::Result;
use crate::module::Module;
use crate::registry::ModuleRegistry;

const MIGRATION_DIRS: [&str; 2] = ["src/Database/Migrations", "database/migrations"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleRegistration {
    pub name: String,
    pub namespace: Option<String>,
    pub path: PathBuf,
    pub providers: Vec<String>,
    pub deferred: BTreeMap<String, String>,
    pub aliases: BTreeMap<String, String>,
    /// Configuration bag for this module, if the host has one.
    pub config: Option<serde_json::Value>,
    /// View lookup order: theme overrides, most specific first, then the
    /// module's own views.
    pub views: Vec<PathBuf>,
    pub translations: Option<PathBuf>,
    pub migrations: Option<PathBuf>,
    pub listeners: Option<PathBuf>,
    /// Namespace of the classes under `listeners`.
    pub listener_namespace: Option<String>,
}

/// Enabled modules in registration order plus the merged provider tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistrationPlan {
    /// Active theme chain, most specific first.
    pub themes: Vec<String>,
    pub modules: Vec<ModuleRegistration>,
    /// Eager providers of every module, first occurrence kept.
    pub providers: Vec<String>,
    /// service → provider; the earliest module wins a collision.
    pub deferred: BTreeMap<String, String>,
    /// alias → class; the earliest module wins a collision.
    pub aliases: BTreeMap<String, String>,
}

impl RegistrationPlan {
    pub fn build(
        registry: &ModuleRegistry,
        theme: Option<&str>,
        config: &dyn ConfigProvider,
    ) -> Result<Self> {
        let theme_roots: Vec<(String, PathBuf)> = match theme {
            Some(name) => registry
                .theme_chain(name)?
                .into_iter()
                .map(|t| (t.name.clone(), t.path.clone()))
                .collect(),
            None => Vec::new(),
        };

        let mut plan = RegistrationPlan {
            themes: theme_roots.iter().map(|(n, _)| n.clone()).collect(),
            ..RegistrationPlan::default()
        };

        for module in registry.enabled() {
            for provider in &module.providers {
                if !plan.providers.contains(provider) {
                    plan.providers.push(provider.clone());
                }
            }
            for (service, provider) in &module.deferred {
                plan.deferred
                    .entry(service.clone())
                    .or_insert_with(|| provider.clone());
            }
            for (alias, class) in &module.aliases {
                plan.aliases
                    .entry(alias.clone())
                    .or_insert_with(|| class.clone());
            }
            plan.modules
                .push(module_registration(module, &theme_roots, config));
        }

        tracing::debug!(
            modules = plan.modules.len(),
            providers = plan.providers.len(),
            theme = theme.unwrap_or("-"),
            "registration plan built"
        );
        Ok(plan)
    }
}

fn module_registration(
    module: Module,
    theme_roots: &[(String, PathBuf)],
    config: &dyn ConfigProvider,
) -> ModuleRegistration {
    let mut views: Vec<PathBuf> = theme_roots
        .iter()
        .map(|(_, root)| root.join("views").join(&module.name))
        .filter(|dir| dir.is_dir())
        .collect();
    let own_views = module.path_of("resources/views");
    if own_views.is_dir() {
        views.push(own_views);
    }

    let translations = Some(module.path_of("resources/lang")).filter(|d| d.is_dir());
    let migrations = MIGRATION_DIRS
        .iter()
        .map(|sub| module.path_of(sub))
        .find(|d| d.is_dir());
    let listeners = Some(module.path_of("src/Listeners"))
        .filter(|d| module.discovers_listeners() && d.is_dir());
    let listener_namespace = listeners
        .as_ref()
        .and_then(|_| module.namespace_of("Listeners"));

    ModuleRegistration {
        config: config.get_module_config(&module.name).cloned(),
        views,
        translations,
        migrations,
        listeners,
        listener_namespace,
        name: module.name,
        namespace: module.namespace,
        path: module.path,
        providers: module.providers,
        deferred: module.deferred,
        aliases: module.aliases,
    }
}
