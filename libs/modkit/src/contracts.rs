//! Seams between the registry and the host application.

use serde::{Deserialize, Serialize};

use crate::manifest::ProviderDeclaration;

/// What the registry needs to know about a service provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub class: String,
    pub deferred: bool,
    /// Services a deferred provider registers on demand.
    pub provides: Vec<String>,
}

/// Classifies declared providers into eager and deferred ones.
///
/// Called once per provider at scan time; the answer ends up in the cache so
/// no host code runs while the registry boots.
pub trait ProviderInspector: Send + Sync {
    fn describe(&self, module: &str, declaration: &ProviderDeclaration) -> ProviderDescriptor;
}

/// Trusts whatever the package manifest declares.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestProviderInspector;

impl ProviderInspector for ManifestProviderInspector {
    fn describe(&self, _module: &str, declaration: &ProviderDeclaration) -> ProviderDescriptor {
        match declaration {
            ProviderDeclaration::Class(class) => ProviderDescriptor {
                class: class.clone(),
                deferred: false,
                provides: Vec::new(),
            },
            ProviderDeclaration::Detailed {
                class,
                deferred,
                provides,
            } => ProviderDescriptor {
                class: class.clone(),
                deferred: *deferred,
                provides: provides.clone(),
            },
        }
    }
}

/// Per-module configuration bags, keyed by module name.
pub trait ConfigProvider: Send + Sync {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;
}

/// Provider with no configuration at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConfig;

impl ConfigProvider for NoConfig {
    fn get_module_config(&self, _module_name: &str) -> Option<&serde_json::Value> {
        None
    }
}
