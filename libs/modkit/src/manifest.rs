//! Package manifest reader.
//!
//! Only the subset of a composer.json-style manifest the registry cares about
//! is modelled:
//!
//! ```json
//! {
//!   "name": "acme/blog",
//!   "description": "Blog module",
//!   "require": { "acme/core": "^1.0" },
//!   "autoload": { "psr-4": { "Acme\\Blog\\": "src/" } },
//!   "extra": {
//!     "module": {
//!       "name": "blog",
//!       "providers": [
//!         "Acme\\Blog\\BlogServiceProvider",
//!         { "class": "Acme\\Blog\\FeedProvider", "deferred": true, "provides": ["blog.feed"] }
//!       ],
//!       "aliases": { "Blog": "Acme\\Blog\\Facades\\Blog" },
//!       "listeners": true
//!     },
//!     "theme": { "name": "dark", "extends": "base" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ManifestError;

/// Parsed package manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub require: Map<String, Value>,
    #[serde(default)]
    pub autoload: Autoload,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Autoload {
    /// Namespace prefix → directory (or list of directories). Key order is
    /// preserved, the first key is the package's primary namespace.
    #[serde(default, rename = "psr-4")]
    pub psr4: Map<String, Value>,
}

/// `extra.module` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleBlock {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub providers: Vec<ProviderDeclaration>,
    #[serde(default)]
    pub system: bool,
    /// Everything else in the block.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `extra.theme` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThemeBlock {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extends: Option<String>,
}

/// A provider entry: either a bare class or a class with its deferral contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderDeclaration {
    Class(String),
    Detailed {
        class: String,
        #[serde(default)]
        deferred: bool,
        #[serde(default)]
        provides: Vec<String>,
    },
}

impl ProviderDeclaration {
    pub fn class(&self) -> &str {
        match self {
            ProviderDeclaration::Class(class) => class,
            ProviderDeclaration::Detailed { class, .. } => class,
        }
    }
}

impl PackageManifest {
    /// Read `dir/<file_name>`. `Ok(None)` when the directory has no manifest.
    pub fn read_in(dir: &Path, file_name: &str) -> Result<Option<Self>, ManifestError> {
        let path = dir.join(file_name);
        if !path.is_file() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    pub fn parse(raw: &str, path: &Path) -> Result<Self, ManifestError> {
        serde_json::from_str(raw).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The module block, if the package declares one.
    pub fn module_block(&self, path: &Path) -> Result<Option<ModuleBlock>, ManifestError> {
        self.block("module", path)
    }

    /// The theme block, if the package declares one.
    pub fn theme_block(&self, path: &Path) -> Result<Option<ThemeBlock>, ManifestError> {
        self.block("theme", path)
    }

    fn block<T>(&self, key: &str, path: &Path) -> Result<Option<T>, ManifestError>
    where
        T: Default + serde::de::DeserializeOwned,
    {
        match self.extra.get(key) {
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| ManifestError::Parse {
                    path: path.to_path_buf(),
                    source,
                }),
            Some(Value::Bool(true)) => Ok(Some(T::default())),
            _ => Ok(None),
        }
    }

    /// `vendor/name` → `name`; a name without a vendor is returned whole.
    pub fn package_segment(&self) -> Option<&str> {
        let name = self.name.as_deref()?;
        let segment = name.split_once('/').map(|(_, rest)| rest).unwrap_or(name);
        (!segment.is_empty()).then_some(segment)
    }

    /// First psr-4 root, without surrounding separators.
    pub fn autoload_namespace(&self) -> Option<String> {
        self.autoload
            .psr4
            .keys()
            .map(|ns| ns.trim_matches('\\'))
            .find(|ns| !ns.is_empty())
            .map(str::to_string)
    }

    /// Names of the packages this one requires.
    pub fn requires(&self) -> Vec<String> {
        self.require.keys().cloned().collect()
    }

    /// Module name: explicit, else derived from the package name.
    pub(crate) fn module_name(
        &self,
        block: &ModuleBlock,
        path: &Path,
    ) -> Result<String, ManifestError> {
        explicit_or_segment(block.name.as_deref(), self.package_segment())
            .ok_or_else(|| ManifestError::MissingName {
                path: path.to_path_buf(),
                block: "module",
            })
    }
}

fn explicit_or_segment(explicit: Option<&str>, segment: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or(segment)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(raw: &str) -> PackageManifest {
        PackageManifest::parse(raw, Path::new("composer.json")).unwrap()
    }

    #[test]
    fn reads_module_block_with_mixed_providers() {
        let m = parse(
            r#"{
                "name": "acme/blog",
                "extra": {
                    "module": {
                        "providers": [
                            "Acme\\Blog\\BlogServiceProvider",
                            {"class": "Acme\\Blog\\FeedProvider", "deferred": true, "provides": ["blog.feed"]}
                        ],
                        "aliases": {"Blog": "Acme\\Blog\\Facades\\Blog"},
                        "listeners": true
                    }
                }
            }"#,
        );
        let block = m.module_block(Path::new("composer.json")).unwrap().unwrap();

        assert_eq!(block.providers.len(), 2);
        assert_eq!(block.providers[0].class(), "Acme\\Blog\\BlogServiceProvider");
        assert_eq!(
            block.providers[1],
            ProviderDeclaration::Detailed {
                class: "Acme\\Blog\\FeedProvider".into(),
                deferred: true,
                provides: vec!["blog.feed".into()],
            }
        );
        assert_eq!(block.aliases["Blog"], "Acme\\Blog\\Facades\\Blog");
        assert_eq!(block.extra.get("listeners"), Some(&Value::Bool(true)));
        assert!(!block.extra.contains_key("providers"));
    }

    #[test]
    fn block_presence_rules() {
        let empty = parse(r#"{"extra": {"module": {}}}"#);
        assert!(empty.module_block(Path::new("x")).unwrap().is_some());

        let flag = parse(r#"{"extra": {"module": true}}"#);
        assert!(flag.module_block(Path::new("x")).unwrap().is_some());

        let off = parse(r#"{"extra": {"module": false}}"#);
        assert!(off.module_block(Path::new("x")).unwrap().is_none());

        let none = parse(r#"{"name": "acme/lib"}"#);
        assert!(none.module_block(Path::new("x")).unwrap().is_none());
        assert!(none.theme_block(Path::new("x")).unwrap().is_none());
    }

    #[test]
    fn malformed_block_is_a_parse_error() {
        let m = parse(r#"{"extra": {"module": {"providers": "not-a-list"}}}"#);
        let err = m.module_block(Path::new("pkg/composer.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
        assert_eq!(err.path(), &PathBuf::from("pkg/composer.json"));
    }

    #[test]
    fn namespace_comes_from_first_psr4_root() {
        let m = parse(
            r#"{"autoload": {"psr-4": {"Acme\\Blog\\": "src/", "Acme\\Blog\\Tests\\": "tests/"}}}"#,
        );
        assert_eq!(m.autoload_namespace().as_deref(), Some("Acme\\Blog"));

        let none = parse(r#"{"autoload": {"classmap": ["lib/"]}}"#);
        assert_eq!(none.autoload_namespace(), None);
    }

    #[test]
    fn module_name_falls_back_to_package_segment() {
        let m = parse(r#"{"name": "acme/blog-module"}"#);
        let block = ModuleBlock::default();
        assert_eq!(m.module_name(&block, Path::new("x")).unwrap(), "blog-module");

        let explicit = ModuleBlock {
            name: Some("blog".into()),
            ..ModuleBlock::default()
        };
        assert_eq!(m.module_name(&explicit, Path::new("x")).unwrap(), "blog");

        let anonymous = parse(r#"{}"#);
        assert!(matches!(
            anonymous.module_name(&block, Path::new("x")),
            Err(ManifestError::MissingName { .. })
        ));
    }

    #[test]
    fn requires_lists_package_names() {
        let m = parse(r#"{"require": {"php": ">=8.1", "acme/core": "^1.0"}}"#);
        assert_eq!(m.requires(), vec!["php".to_string(), "acme/core".to_string()]);
    }
}
