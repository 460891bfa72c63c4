use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Errors for resolving the application home directory.
#[derive(Debug, thiserror::Error)]
pub enum HomeDirError {
    #[error("{0} environment variable is not set")]
    EnvMissing(&'static str),
    #[error("home_dir must be an absolute path (after ~ expansion): {0}")]
    AbsoluteRequired(String),
    #[error("failed to create home_dir {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Variable holding the user's home for `~` expansion.
#[cfg(target_os = "windows")]
const USER_HOME_VARS: &[&str] = &["USERPROFILE", "HOME"];
#[cfg(not(target_os = "windows"))]
const USER_HOME_VARS: &[&str] = &["HOME"];

/// Variable holding the root for the default home directory.
#[cfg(target_os = "windows")]
const DEFAULT_ROOT_VAR: &str = "APPDATA";
#[cfg(not(target_os = "windows"))]
const DEFAULT_ROOT_VAR: &str = "HOME";

/// Resolve the application home directory.
///
/// A configured value may start with `~` and must be absolute once
/// expanded. Without one, `<root>/<default_subdir>` is used where root is
/// `%APPDATA%` on Windows and `$HOME` elsewhere. With `create`, the
/// directory is created.
pub fn resolve_home_dir(
    config_home: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let path = match config_home {
        Some(raw) => {
            let expanded = expand_tilde(&raw, user_home)?;
            if !expanded.is_absolute() {
                return Err(HomeDirError::AbsoluteRequired(
                    expanded.to_string_lossy().into_owned(),
                ));
            }
            expanded
        }
        None => {
            let root = env::var(DEFAULT_ROOT_VAR)
                .map_err(|_| HomeDirError::EnvMissing(DEFAULT_ROOT_VAR))?;
            Path::new(&root).join(default_subdir)
        }
    };

    if create {
        fs::create_dir_all(&path).map_err(|source| HomeDirError::Create {
            path: path.clone(),
            source,
        })?;
    }
    Ok(path)
}

fn user_home() -> Result<PathBuf, HomeDirError> {
    USER_HOME_VARS
        .iter()
        .find_map(|var| env::var(var).ok())
        .map(PathBuf::from)
        .ok_or(HomeDirError::EnvMissing(USER_HOME_VARS[0]))
}

/// `~` and `~/rest` expand against `home`; anything else is returned as is.
/// `home` is only consulted when expansion is needed.
fn expand_tilde(
    raw: &str,
    home: impl FnOnce() -> Result<PathBuf, HomeDirError>,
) -> Result<PathBuf, HomeDirError> {
    let Some(rest) = raw.strip_prefix('~') else {
        return Ok(PathBuf::from(raw));
    };
    if rest.is_empty() {
        return home();
    }
    match rest.strip_prefix('/').or_else(|| rest.strip_prefix('\\')) {
        Some(rest) => Ok(home()?.join(rest)),
        // `~user` forms are not expanded.
        None => Ok(PathBuf::from(raw)),
    }
}
