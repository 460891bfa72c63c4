use std::collections::HashSet;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::cache::CacheBlob;
use crate::error::{LookupKind, RegistryError, Result};
use crate::module::{Module, Theme};
use crate::repository::Repository;
use crate::state::DisabledList;

/// Immutable snapshot of every discovered module and theme, in
/// registration order, plus the prefix tables used for resolution.
///
/// Lookups by namespace and path are memoised per snapshot, so they take
/// `&self` and the memo dies with the snapshot.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: Repository<Module>,
    themes: Repository<Theme>,
    /// (namespace, module), most specific first.
    namespaces: Vec<(String, String)>,
    /// (path, module), most specific first.
    paths: Vec<(PathBuf, String)>,
    namespace_memo: DashMap<String, String>,
    path_memo: DashMap<PathBuf, String>,
}

impl ModuleRegistry {
    /// Build from modules already in registration order.
    pub fn new(modules: Vec<Module>, themes: Vec<Theme>) -> Self {
        let modules: Repository<Module> = modules.into_iter().collect();
        let themes: Repository<Theme> = themes.into_iter().collect();

        let mut namespaces: Vec<(String, String)> = modules
            .values()
            .filter_map(|m| m.namespace.clone().map(|ns| (ns, m.name.clone())))
            .collect();
        namespaces.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let mut paths: Vec<(PathBuf, String)> = modules
            .values()
            .map(|m| (m.path.clone(), m.name.clone()))
            .collect();
        paths.sort_by(|a, b| {
            b.0.as_os_str()
                .len()
                .cmp(&a.0.as_os_str().len())
                .then_with(|| a.0.cmp(&b.0))
        });

        Self {
            modules,
            themes,
            namespaces,
            paths,
            namespace_memo: DashMap::new(),
            path_memo: DashMap::new(),
        }
    }

    pub fn from_blob(blob: &CacheBlob) -> Self {
        Self::new(blob.modules(), blob.themes.clone())
    }

    pub fn to_blob(&self) -> CacheBlob {
        CacheBlob::from_parts(self.modules.values(), self.themes.values())
    }

    pub fn modules(&self) -> &Repository<Module> {
        &self.modules
    }

    pub fn themes(&self) -> &Repository<Theme> {
        &self.themes
    }

    /// Enabled modules, registration order.
    pub fn enabled(&self) -> Repository<Module> {
        self.modules.filter(|m| m.enabled)
    }

    pub fn get(&self, name: &str) -> Result<&Module> {
        self.modules.get(name)
    }

    pub fn by_name(&self, name: &str) -> Result<&Module> {
        self.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.modules.has(name)
    }

    /// Unknown modules are reported as not enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.modules.get(name).map(|m| m.enabled).unwrap_or(false)
    }

    pub fn theme(&self, name: &str) -> Result<&Theme> {
        self.themes.get(name)
    }

    /// Module owning the longest namespace that is `ns` itself or one of its
    /// `\`-separated ancestors. `Acme\Blog\Post` matches `Acme\Blog` but
    /// `Acme\Blogger` does not.
    pub fn by_namespace(&self, ns: &str) -> Result<&Module> {
        let query = ns.trim_start_matches('\\');
        if let Some(hit) = self.namespace_memo.get(query) {
            return self.modules.get(hit.value());
        }

        let owner = self
            .namespaces
            .iter()
            .find(|(prefix, _)| namespace_contains(prefix, query))
            .map(|(_, module)| module.clone())
            .ok_or_else(|| RegistryError::not_found(LookupKind::Namespace, ns))?;

        self.namespace_memo.insert(query.to_string(), owner.clone());
        self.modules.get(&owner)
    }

    /// Module whose directory is the longest component-wise prefix of `path`.
    pub fn by_path(&self, path: impl AsRef<Path>) -> Result<&Module> {
        let query = path.as_ref();
        if let Some(hit) = self.path_memo.get(query) {
            return self.modules.get(hit.value());
        }

        let owner = self
            .paths
            .iter()
            .find(|(prefix, _)| query.starts_with(prefix))
            .map(|(_, module)| module.clone())
            .ok_or_else(|| {
                RegistryError::not_found(LookupKind::Path, query.display().to_string())
            })?;

        self.path_memo.insert(query.to_path_buf(), owner.clone());
        self.modules.get(&owner)
    }

    /// `name` followed by its ancestors through `extends`. An unknown parent
    /// or a repeated theme ends the chain.
    pub fn theme_chain(&self, name: &str) -> Result<Vec<&Theme>> {
        let mut chain = vec![self.themes.get(name)?];
        let mut seen: HashSet<&str> = HashSet::from([name]);

        while let Some(parent) = chain.last().copied().and_then(|t| t.extends.as_deref()) {
            if !seen.insert(parent) {
                tracing::warn!(theme = name, repeated = parent, "theme chain loops");
                break;
            }
            match self.themes.get(parent) {
                Ok(theme) => chain.push(theme),
                Err(_) => {
                    tracing::warn!(theme = name, missing = parent, "theme extends unknown theme");
                    break;
                }
            }
        }
        Ok(chain)
    }

    /// Derive every module's enabled flag from the disabled list and whether
    /// `<path>/<manifest_file>` still exists. A module whose manifest is gone
    /// is force-disabled. System modules ignore the list.
    pub fn apply_overlay(&mut self, disabled: &DisabledList, manifest_file: &str) {
        for m in self.modules.values_mut() {
            let listed = disabled.is_disabled(&m.name);
            if listed && m.system {
                tracing::warn!(module = %m.name, "system module listed as disabled, ignoring");
            }
            let present = m.path.join(manifest_file).is_file();
            if !present {
                tracing::warn!(
                    module = %m.name,
                    path = %m.path.display(),
                    "module manifest missing, disabling"
                );
            }
            m.enabled = present && (m.system || !listed);
        }
    }

    /// Copy of this snapshot with one module's flag changed.
    pub fn with_enabled(&self, name: &str, enabled: bool) -> Result<ModuleRegistry> {
        let mut next = self.clone();
        next.modules.get_mut(name)?.enabled = enabled;
        Ok(next)
    }
}

fn namespace_contains(prefix: &str, query: &str) -> bool {
    match query.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('\\'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModuleRegistry {
        ModuleRegistry::new(
            vec![
                Module::new("core", "/srv/app").with_namespace("Acme"),
                Module::new("blog", "/srv/app/modules/blog").with_namespace("Acme\\Blog"),
                Module::new("blogger", "/srv/app/modules/blogger").with_namespace("Acme\\Blogger"),
            ],
            vec![
                Theme::new("base", "/srv/app/themes/base"),
                Theme::new("dark", "/srv/app/themes/dark").extending("base"),
                Theme::new("loop-a", "/srv/app/themes/a").extending("loop-b"),
                Theme::new("loop-b", "/srv/app/themes/b").extending("loop-a"),
            ],
        )
    }

    #[test]
    fn longest_namespace_prefix_wins() {
        let reg = registry();
        assert_eq!(reg.by_namespace("Acme\\Blog\\Post").unwrap().name, "blog");
        assert_eq!(reg.by_namespace("\\Acme\\Blog").unwrap().name, "blog");
        assert_eq!(reg.by_namespace("Acme\\Blogger\\Author").unwrap().name, "blogger");
        assert_eq!(reg.by_namespace("Acme\\Shop\\Item").unwrap().name, "core");
        // memoised answer is the same
        assert_eq!(reg.by_namespace("Acme\\Blog\\Post").unwrap().name, "blog");
    }

    #[test]
    fn namespace_match_is_segment_aware() {
        let reg = ModuleRegistry::new(
            vec![Module::new("blog", "/srv/blog").with_namespace("Acme\\Blog")],
            vec![],
        );
        let err = reg.by_namespace("Acme\\Blogger\\Post").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::NotFound { kind: LookupKind::Namespace, .. }
        ));
    }

    #[test]
    fn longest_path_prefix_wins() {
        let reg = registry();
        assert_eq!(
            reg.by_path("/srv/app/modules/blog/src/Post.php").unwrap().name,
            "blog"
        );
        assert_eq!(reg.by_path("/srv/app/config/app.php").unwrap().name, "core");
        assert!(reg.by_path("/srv/app/modules/blog-extra/x").unwrap().name == "core");
        assert!(reg.by_path("/opt/other").unwrap_err().is_not_found());
    }

    #[test]
    fn theme_chain_follows_extends_and_stops_on_loops() {
        let reg = registry();
        let chain: Vec<_> = reg
            .theme_chain("dark")
            .unwrap()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(chain, vec!["dark", "base"]);

        let looped: Vec<_> = reg
            .theme_chain("loop-a")
            .unwrap()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(looped, vec!["loop-a", "loop-b"]);

        assert!(reg.theme_chain("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn overlay_disables_listed_and_stale_modules() {
        let dir = tempfile::tempdir().unwrap();
        let mk = |name: &str| {
            let path = dir.path().join(name);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("composer.json"), "{}").unwrap();
            Module::new(name, path)
        };
        let mut core = mk("core");
        core.system = true;
        let gone = Module::new("gone", dir.path().join("gone"));
        let mut reg = ModuleRegistry::new(vec![core, mk("blog"), mk("shop"), gone], vec![]);

        let list_path = dir.path().join("modules.disabled");
        std::fs::write(&list_path, "shop\ncore\n").unwrap();
        let disabled = DisabledList::load(&list_path).unwrap();
        reg.apply_overlay(&disabled, "composer.json");

        assert!(reg.is_enabled("core"));
        assert!(reg.is_enabled("blog"));
        assert!(!reg.is_enabled("shop"));
        assert!(!reg.is_enabled("gone"));
        assert!(!reg.is_enabled("missing"));
        assert_eq!(reg.enabled().names(), vec!["core", "blog"]);
    }

    #[test]
    fn with_enabled_leaves_original_untouched() {
        let reg = registry();
        let next = reg.with_enabled("blog", false).unwrap();
        assert!(reg.is_enabled("blog"));
        assert!(!next.is_enabled("blog"));
        assert!(reg.with_enabled("ghost", false).unwrap_err().is_not_found());
    }
}
