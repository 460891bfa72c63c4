//! Publishing module and theme assets under the public web root.
//!
//! Modules expose `<module>/public`, themes expose `<theme>/assets`. Each is
//! symlinked into `<public_path>/<modules_assets>/<name>` or
//! `<public_path>/<themes_assets>/<name>`.

use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::error::{RegistryError, Result};
use crate::registry::ModuleRegistry;

#[derive(Debug, Clone)]
pub struct AssetPublisher {
    public_path: PathBuf,
    modules_assets: String,
    themes_assets: String,
    cache_busting: bool,
}

/// Outcome of a publish run. Failures never abort the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishReport {
    pub linked: Vec<PathBuf>,
    /// Targets occupied by something that is not a symlink.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl AssetPublisher {
    pub fn new(
        public_path: impl Into<PathBuf>,
        modules_assets: impl Into<String>,
        themes_assets: impl Into<String>,
    ) -> Self {
        Self {
            public_path: public_path.into(),
            modules_assets: modules_assets.into(),
            themes_assets: themes_assets.into(),
            cache_busting: false,
        }
    }

    /// Stamp asset URLs with the file's mtime (`app@1700000000.css`). The
    /// stamped name is a symlink next to the real file.
    pub fn with_cache_busting(mut self, enabled: bool) -> Self {
        self.cache_busting = enabled;
        self
    }

    #[tracing::instrument(skip_all, fields(public = %self.public_path.display()))]
    pub fn publish(&self, registry: &ModuleRegistry) -> PublishReport {
        let mut report = PublishReport::default();

        let modules_dir = self.public_path.join(&self.modules_assets);
        for module in registry.modules().values() {
            let source = module.path_of("public");
            if source.is_dir() {
                self.link(&source, &modules_dir.join(&module.name), &mut report);
            }
        }

        let themes_dir = self.public_path.join(&self.themes_assets);
        for theme in registry.themes().values() {
            let source = theme.path_of("assets");
            if source.is_dir() {
                self.link(&source, &themes_dir.join(&theme.name), &mut report);
            }
        }

        tracing::info!(
            linked = report.linked.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "assets published"
        );
        report
    }

    fn link(&self, source: &Path, target: &Path, report: &mut PublishReport) {
        match std::fs::symlink_metadata(target) {
            Ok(meta) if !meta.file_type().is_symlink() => {
                tracing::warn!(target = %target.display(), "asset target exists and is not a link, leaving it");
                report.skipped.push(target.to_path_buf());
                return;
            }
            _ => {}
        }

        match replace_link(source, target) {
            Ok(()) => {
                tracing::debug!(source = %source.display(), target = %target.display(), "asset link created");
                report.linked.push(target.to_path_buf());
            }
            Err(e) => {
                tracing::warn!(target = %target.display(), error = %e, "failed to link assets");
                report.failed.push((target.to_path_buf(), e.to_string()));
            }
        }
    }

    /// Public URL path of a module asset. The theme chain is searched for an
    /// override file at `<theme>/assets/<module>/<path>` first. Unknown
    /// modules and themes are `NotFound`.
    pub fn asset_url(
        &self,
        registry: &ModuleRegistry,
        theme: Option<&str>,
        module: &str,
        path: &str,
    ) -> Result<String> {
        let module = registry.get(module)?;
        let path = path.trim_start_matches('/');
        if let Some(theme) = theme {
            for t in registry.theme_chain(theme)? {
                let file = t.path_of("assets").join(&module.name).join(path);
                if file.is_file() {
                    let path = self.stamped(&file, path)?;
                    return Ok(format!(
                        "{}/{}/{}/{}",
                        self.themes_assets, t.name, module.name, path
                    ));
                }
            }
        }

        let file = module.path_of("public").join(path);
        let path = if file.is_file() {
            self.stamped(&file, path)?
        } else {
            path.to_string()
        };
        Ok(format!("{}/{}/{}", self.modules_assets, module.name, path))
    }

    /// `path` with the mtime stamp applied, linking the stamped name to
    /// `file`. Unchanged when cache busting is off.
    fn stamped(&self, file: &Path, path: &str) -> Result<String> {
        if !self.cache_busting {
            return Ok(path.to_string());
        }
        let mtime = std::fs::metadata(file)
            .and_then(|m| m.modified())
            .map_err(|e| RegistryError::io(file, e))?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let Some(versioned) = versioned_path(path, mtime) else {
            return Ok(path.to_string());
        };
        let (Some(dir), Some(name)) = (file.parent(), file.file_name()) else {
            return Ok(path.to_string());
        };
        let link = dir.join(Path::new(&versioned).file_name().unwrap_or(name));

        let is_link = std::fs::symlink_metadata(&link)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            let _ = std::fs::remove_file(&link);
            symlink_file(Path::new(name), &link).map_err(|e| RegistryError::io(&link, e))?;
            tracing::debug!(link = %link.display(), "versioned asset link created");
        }
        Ok(versioned)
    }
}

/// Insert `@<mtime>` before the first extension of the file name:
/// `css/app.min.css` becomes `css/app@<mtime>.min.css`. Names without an
/// extension (or dot-files) are not versioned.
fn versioned_path(path: &str, mtime: u64) -> Option<String> {
    let start = path.rfind('/').map_or(0, |i| i + 1);
    let dot = path[start..].find('.').filter(|&i| i > 0)? + start;
    if dot + 1 >= path.len() {
        return None;
    }
    Some(format!("{}@{}{}", &path[..dot], mtime, &path[dot..]))
}

fn replace_link(source: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::symlink_metadata(target).is_ok() {
        remove_link(target)?;
    }
    symlink_dir(source, target)
}

#[cfg(unix)]
fn symlink_dir(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink_dir(source: &Path, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(source, target)
}

#[cfg(unix)]
fn symlink_file(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink_file(source: &Path, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(source, target)
}

#[cfg(unix)]
fn remove_link(target: &Path) -> io::Result<()> {
    std::fs::remove_file(target)
}

#[cfg(windows)]
fn remove_link(target: &Path) -> io::Result<()> {
    // Directory symlinks are removed as directories on Windows.
    std::fs::remove_dir(target)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::module::{Module, Theme};

    fn fixture(root: &Path) -> ModuleRegistry {
        let blog = Module::new("blog", root.join("modules/blog"));
        std::fs::create_dir_all(blog.path_of("public/css")).unwrap();
        std::fs::write(blog.path_of("public/css/app.css"), "body{}").unwrap();
        let shop = Module::new("shop", root.join("modules/shop"));
        std::fs::create_dir_all(&shop.path).unwrap();

        let base = Theme::new("base", root.join("themes/base"));
        std::fs::create_dir_all(base.path_of("assets/blog/css")).unwrap();
        std::fs::write(base.path_of("assets/blog/css/app.css"), "body{}").unwrap();
        let dark = Theme::new("dark", root.join("themes/dark")).extending("base");
        std::fs::create_dir_all(&dark.path).unwrap();

        ModuleRegistry::new(vec![blog, shop], vec![base, dark])
    }

    #[test]
    fn publish_links_modules_and_themes() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let publisher = AssetPublisher::new(dir.path().join("public"), "modules", "themes");

        let report = publisher.publish(&reg);
        assert!(report.is_clean());
        assert_eq!(report.linked.len(), 2);

        let css = dir.path().join("public/modules/blog/css/app.css");
        assert!(css.is_file());
        assert!(dir.path().join("public/themes/base/blog").is_dir());
        assert!(!dir.path().join("public/modules/shop").exists());

        // Second run replaces the links in place.
        let again = publisher.publish(&reg);
        assert_eq!(again.linked.len(), 2);
        assert!(css.is_file());
    }

    #[test]
    fn real_directories_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let occupied = dir.path().join("public/modules/blog");
        std::fs::create_dir_all(&occupied).unwrap();

        let report = AssetPublisher::new(dir.path().join("public"), "modules", "themes").publish(&reg);
        assert_eq!(report.skipped, vec![occupied.clone()]);
        assert!(!std::fs::symlink_metadata(&occupied)
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn asset_url_prefers_theme_override() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let publisher = AssetPublisher::new(dir.path().join("public"), "modules", "themes");

        assert_eq!(
            publisher
                .asset_url(&reg, Some("dark"), "blog", "/css/app.css")
                .unwrap(),
            "themes/base/blog/css/app.css"
        );
        assert_eq!(
            publisher.asset_url(&reg, Some("dark"), "blog", "js/app.js").unwrap(),
            "modules/blog/js/app.js"
        );
        assert_eq!(
            publisher.asset_url(&reg, None, "blog", "css/app.css").unwrap(),
            "modules/blog/css/app.css"
        );
        assert!(publisher
            .asset_url(&reg, Some("ghost"), "blog", "x")
            .is_err());
    }

    #[test]
    fn asset_url_rejects_unknown_module() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let publisher = AssetPublisher::new(dir.path().join("public"), "modules", "themes");

        let err = publisher
            .asset_url(&reg, None, "ghost", "css/app.css")
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::NotFound { kind: crate::error::LookupKind::Module, ref key } if key == "ghost"
        ));
    }

    #[test]
    fn theme_override_must_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let theme = reg.theme("base").unwrap();
        std::fs::create_dir_all(theme.path_of("assets/blog/img")).unwrap();
        let publisher = AssetPublisher::new(dir.path().join("public"), "modules", "themes");

        assert_eq!(
            publisher.asset_url(&reg, Some("base"), "blog", "img").unwrap(),
            "modules/blog/img"
        );
    }

    #[test]
    fn cache_busting_stamps_and_links_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let publisher = AssetPublisher::new(dir.path().join("public"), "modules", "themes")
            .with_cache_busting(true);

        let source = reg.get("blog").unwrap().path_of("public/css/app.css");
        let mtime = std::fs::metadata(&source)
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let url = publisher.asset_url(&reg, None, "blog", "css/app.css").unwrap();
        assert_eq!(url, format!("modules/blog/css/app@{mtime}.css"));

        let link = source.with_file_name(format!("app@{mtime}.css"));
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(&link).unwrap(), "body{}");

        // Second call reuses the link.
        assert_eq!(publisher.asset_url(&reg, None, "blog", "css/app.css").unwrap(), url);

        // Missing files are not stamped.
        assert_eq!(
            publisher.asset_url(&reg, None, "blog", "js/app.js").unwrap(),
            "modules/blog/js/app.js"
        );
    }

    #[test]
    fn versioned_path_stamps_first_extension_of_file_name() {
        assert_eq!(versioned_path("css/app.css", 7).as_deref(), Some("css/app@7.css"));
        assert_eq!(
            versioned_path("v1.2/jquery.min.js", 7).as_deref(),
            Some("v1.2/jquery@7.min.js")
        );
        assert_eq!(versioned_path("img/.hidden", 7), None);
        assert_eq!(versioned_path("LICENSE", 7), None);
    }
}
