use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// What a failed lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Module,
    Theme,
    Namespace,
    Path,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LookupKind::Module => "module",
            LookupKind::Theme => "theme",
            LookupKind::Namespace => "module for namespace",
            LookupKind::Path => "module for path",
        };
        f.write_str(s)
    }
}

/// Problems with a single package manifest. Fatal for that package only;
/// the scanner collects them and keeps going.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed manifest {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest {path}: package has no name and the {block} block does not declare one")]
    MissingName { path: PathBuf, block: &'static str },
    #[error("manifest {path}: module '{module}' declares no namespace and has no psr-4 autoload root")]
    UnresolvableNamespace { path: PathBuf, module: String },
}

impl ManifestError {
    /// Manifest file the error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            ManifestError::Read { path, .. }
            | ManifestError::Parse { path, .. }
            | ManifestError::MissingName { path, .. }
            | ManifestError::UnresolvableNamespace { path, .. } => path,
        }
    }
}

/// Structured errors for the module registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: LookupKind, key: String },

    #[error("module '{0}' is a system module and cannot be disabled")]
    CannotDisableSystemModule(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("module cache {path} is corrupt")]
    CacheCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode module cache")]
    CacheEncode(#[source] serde_json::Error),

    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("invalid search path pattern '{pattern}'")]
    InvalidSearchPath {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    pub fn not_found(kind: LookupKind, key: impl Into<String>) -> Self {
        RegistryError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
