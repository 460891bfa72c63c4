use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths::home_dir::resolve_home_dir;

/// Application configuration: typed global sections plus a flexible
/// per-module configuration bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Locations of the application itself.
    pub app: AppSection,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Module discovery, cache and state locations.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Directory containing per-module YAML files (optional).
    #[serde(default)]
    pub modules_dir: Option<String>,
    /// Per-module configuration bag: module_name → arbitrary JSON/YAML value.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppSection {
    /// Tool home (logs). Normalized to an absolute path on load.
    #[serde(default)]
    pub home_dir: String,
    /// Application root the registry works in. Normalized to an absolute
    /// path on load; empty means the current directory.
    #[serde(default)]
    pub base_path: String,
}

/// Where modules are searched for and where registry state lives. Relative
/// paths are resolved against `app.base_path`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Directories or glob patterns whose subdirectories are packages.
    pub paths: Vec<String>,
    /// Treat the application root itself as a (system) package.
    pub include_root: bool,
    pub manifest_file: String,
    pub cache_file: String,
    pub disabled_file: String,
    pub public_path: String,
    pub modules_assets: String,
    pub themes_assets: String,
    /// Append `@<mtime>` to asset URLs.
    pub assets_cache: bool,
    /// Active theme.
    pub theme: Option<String>,
    /// Fail on dependency cycles instead of breaking them.
    pub strict_dependencies: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            paths: vec!["modules".to_string()],
            include_root: true,
            manifest_file: "composer.json".to_string(),
            cache_file: "bootstrap/cache/modules.json".to_string(),
            disabled_file: "storage/modules.disabled".to_string(),
            public_path: "public".to_string(),
            modules_assets: "modules".to_string(),
            themes_assets: "themes".to_string(),
            assets_cache: false,
            theme: None,
            strict_dependencies: false,
        }
    }
}

impl RegistryConfig {
    /// `rel` resolved against `base`; absolute values are kept.
    pub fn resolve(&self, base: &Path, rel: &str) -> PathBuf {
        let p = Path::new(rel);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            base.join(p)
        }
    }
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Section {
    /// "trace", "debug", "info", "warn", "error", "off"
    #[serde(default)]
    pub console_level: String,
    /// Log file, relative to the home dir. Empty disables the file sink.
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub file_level: String,
    /// Retention when `max_backups` is not set.
    #[serde(default)]
    pub max_age_days: Option<u32>,
    /// How many rotated files to keep.
    #[serde(default)]
    pub max_backups: Option<usize>,
    /// Rotate once the file grows past this size.
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/modkit.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            logging: Some(default_logging_config()),
            registry: RegistryConfig::default(),
            modules_dir: None,
            modules: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    /// Also normalizes `app.home_dir` (created) and `app.base_path` into absolute paths.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Optional sections stay None unless YAML/ENV provide them.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // Example: APP__REGISTRY__THEME=dark maps to registry.theme
            .merge(Env::prefixed("APP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| "Failed to extract config from figment".to_string())?;

        config.normalize().context("Failed to normalize app paths")?;

        if let Some(dir) = config.modules_dir.clone() {
            merge_module_files(&mut config.modules, dir)?;
        }

        Ok(config)
    }

    /// Load configuration from file or fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                c.normalize()
                    .context("Failed to normalize app paths (defaults)")?;
                Ok(c)
            }
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(base) = &args.base_path {
            self.app.base_path = absolute(base).to_string_lossy().into_owned();
        }

        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            match args.verbose {
                0 => {}
                1 => default_section.console_level = "debug".to_string(),
                _ => default_section.console_level = "trace".to_string(),
            }
        }
    }

    pub fn base_path(&self) -> PathBuf {
        PathBuf::from(&self.app.base_path)
    }

    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from(&self.app.home_dir)
    }

    /// A registry location resolved against the base path.
    pub fn registry_path(&self, rel: &str) -> PathBuf {
        self.registry.resolve(&self.base_path(), rel)
    }

    fn normalize(&mut self) -> Result<()> {
        normalize_home_dir_inplace(&mut self.app)?;
        self.app.base_path = absolute(&self.app.base_path)
            .to_string_lossy()
            .into_owned();
        Ok(())
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub base_path: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

const fn default_subdir() -> &'static str {
    ".modkit"
}

/// Normalize `app.home_dir` using `resolve_home_dir` and store the absolute path back.
fn normalize_home_dir_inplace(app: &mut AppSection) -> Result<()> {
    let opt = if app.home_dir.trim().is_empty() {
        None
    } else {
        Some(app.home_dir.clone())
    };

    let resolved: PathBuf = resolve_home_dir(opt, default_subdir(), /*create*/ true)
        .context("home_dir normalization failed")?;

    app.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}

/// Absolute form of `raw` against the working directory. Empty is the
/// working directory itself.
fn absolute(raw: &str) -> PathBuf {
    let p = Path::new(raw.trim());
    if p.is_absolute() {
        return p.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) if p.as_os_str().is_empty() => cwd,
        Ok(cwd) => cwd.join(p),
        Err(_) => p.to_path_buf(),
    }
}

fn merge_module_files(
    bag: &mut HashMap<String, serde_json::Value>,
    dir: impl AsRef<Path>,
) -> Result<()> {
    use std::fs;
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));
        if !path.is_file() || !is_yaml {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        let raw = fs::read_to_string(&path)?;
        let val: serde_yaml::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid module config {}", path.display()))?;
        bag.insert(name, serde_json::to_value(val)?);
    }
    Ok(())
}
