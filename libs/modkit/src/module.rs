use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LookupKind;
use crate::repository::Named;

/// A discovered, independently switchable unit of application functionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    /// Code namespace root, without a trailing separator.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Absolute install location.
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// System modules can never be disabled.
    #[serde(default)]
    pub system: bool,
    /// Eager service providers, registration order.
    #[serde(default)]
    pub providers: Vec<String>,
    /// service → provider, registered lazily by the host.
    #[serde(default)]
    pub deferred: BTreeMap<String, String>,
    /// short name → class.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Modules this one is registered after.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

fn enabled_by_default() -> bool {
    true
}

impl Module {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            path: path.into(),
            description: String::new(),
            enabled: true,
            system: false,
            providers: Vec::new(),
            deferred: BTreeMap::new(),
            aliases: BTreeMap::new(),
            dependencies: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }

    /// Module path joined with `sub`; the root itself when `sub` is empty.
    pub fn path_of(&self, sub: impl AsRef<Path>) -> PathBuf {
        let sub = sub.as_ref();
        if sub.as_os_str().is_empty() {
            self.path.clone()
        } else {
            self.path.join(sub)
        }
    }

    /// `Acme\Blog` + `Http\Controllers` → `Acme\Blog\Http\Controllers`.
    pub fn namespace_of(&self, sub: &str) -> Option<String> {
        let root = self.namespace.as_deref()?;
        let sub = sub.trim_start_matches('\\');
        if sub.is_empty() {
            Some(root.to_string())
        } else {
            Some(format!("{root}\\{sub}"))
        }
    }

    /// `<name>::<key>`, the convention for module views and translations.
    pub fn qualified(&self, key: &str) -> String {
        format!("{}::{}", self.name, key)
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Whether the module opted into event listener discovery.
    pub fn discovers_listeners(&self) -> bool {
        self.extra("listeners")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl Named for Module {
    const KIND: LookupKind = LookupKind::Module;

    fn name(&self) -> &str {
        &self.name
    }
}

/// Asset/view override layer. Themes form a chain through `extends`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub extends: Option<String>,
}

impl Theme {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            extends: None,
        }
    }

    pub fn extending(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn path_of(&self, sub: impl AsRef<Path>) -> PathBuf {
        let sub = sub.as_ref();
        if sub.as_os_str().is_empty() {
            self.path.clone()
        } else {
            self.path.join(sub)
        }
    }
}

impl Named for Theme {
    const KIND: LookupKind = LookupKind::Theme;

    fn name(&self) -> &str {
        &self.name
    }
}
