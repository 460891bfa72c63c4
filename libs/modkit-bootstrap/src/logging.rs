//! Console + rotating file logging driven by the `logging` config section.
//!
//! Every section other than `default` names a target prefix (for example
//! `modkit::scanner`). Console levels and file destinations are chosen per
//! prefix, the longest matching prefix wins. `RUST_LOG`, when set, caps both
//! sinks.

use crate::config::{LoggingConfig, Section};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Keeps the non-blocking console worker alive for the life of the process.
static CONSOLE_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Level names as written in config. Unknown names fall back to `info`.
fn parse_level(s: &str) -> LevelFilter {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" | "none" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

/// `target` equals `prefix` or lives below it (`prefix::...`).
fn under_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ================= rotating file sink =================

#[derive(Clone)]
struct RotatingFile(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl RotatingFile {
    fn open(path: &Path, section: &Section) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Keep N files when asked to, otherwise keep files by age.
        let limit = match section.max_backups {
            Some(n) => FileLimit::MaxFiles(n),
            None => FileLimit::Age(chrono::Duration::days(
                i64::from(section.max_age_days.unwrap_or(1)),
            )),
        };
        let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;

        Ok(Self(Arc::new(Mutex::new(FileRotate::new(
            path,
            AppendTimestamp::default(limit),
            ContentLimit::BytesSurpassed(max_bytes),
            Compression::None,
            None,
        )))))
    }
}

/// Writer handed to the fmt layer for one event; `None` discards.
struct SinkHandle(Option<RotatingFile>);

impl Write for SinkHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.0 {
            Some(file) => file.0.lock().write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.0 {
            Some(file) => file.0.lock().flush(),
            None => Ok(()),
        }
    }
}

/// Picks a log file per event by target prefix.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<RotatingFile>,
    /// Longest prefix first.
    routes: Vec<(String, RotatingFile)>,
}

impl FileRouter {
    fn build(sections: &Sections<'_>, base_dir: &Path) -> Self {
        let mut router = FileRouter {
            default: sections
                .default
                .and_then(|s| open_sink("default", s, base_dir)),
            ..FileRouter::default()
        };
        for (prefix, section) in &sections.subsystems {
            if let Some(file) = open_sink(prefix, section, base_dir) {
                router.routes.push((prefix.to_string(), file));
            }
        }
        router
    }

    fn route(&self, target: &str) -> Option<RotatingFile> {
        self.routes
            .iter()
            .find(|(prefix, _)| under_prefix(target, prefix))
            .map(|(_, file)| file.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.routes.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = SinkHandle;

    fn make_writer(&'a self) -> Self::Writer {
        SinkHandle(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        SinkHandle(self.route(meta.target()))
    }
}

fn open_sink(name: &str, section: &Section, base_dir: &Path) -> Option<RotatingFile> {
    if section.file.trim().is_empty() {
        return None;
    }
    let path = resolve_log_path(&section.file, base_dir);
    match RotatingFile::open(&path, section) {
        Ok(file) => Some(file),
        Err(e) => {
            // No subscriber yet, so stderr is the only channel.
            eprintln!(
                "Failed to open log file for '{}': {} ({})",
                name,
                path.display(),
                e
            );
            None
        }
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

// ================= per-sink filters =================

struct Sections<'a> {
    default: Option<&'a Section>,
    /// Longest prefix first.
    subsystems: Vec<(&'a str, &'a Section)>,
}

impl<'a> Sections<'a> {
    fn from_config(cfg: &'a LoggingConfig) -> Self {
        let mut subsystems: Vec<(&str, &Section)> = cfg
            .iter()
            .filter(|(k, _)| k.as_str() != "default")
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        subsystems.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
        Self {
            default: cfg.get("default"),
            subsystems,
        }
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.subsystems.is_empty()
    }

    fn console_targets(&self) -> Targets {
        let default = self
            .default
            .map(|s| parse_level(&s.console_level))
            .unwrap_or(LevelFilter::INFO);
        self.subsystems.iter().fold(
            Targets::new().with_default(default),
            |targets, (prefix, section)| {
                targets.with_target(prefix.to_string(), parse_level(&section.console_level))
            },
        )
    }

    /// Subsystems without a file of their own fall through to the default
    /// file at the default file level.
    fn file_targets(&self, has_default_file: bool) -> Targets {
        let default = match self.default {
            Some(s) if has_default_file => parse_level(&s.file_level),
            _ => LevelFilter::OFF,
        };
        self.subsystems
            .iter()
            .filter(|(_, section)| !section.file.trim().is_empty())
            .fold(
                Targets::new().with_default(default),
                |targets, (prefix, section)| {
                    targets.with_target(prefix.to_string(), parse_level(&section.file_level))
                },
            )
    }
}

// ================= public init =================

/// Install the global subscriber. `base_dir` anchors relative log paths
/// (normally the application home dir). Safe to call more than once; only
/// the first call installs anything.
pub fn init_logging_unified(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` records before the subscriber goes in.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let sections = Sections::from_config(cfg);
    if sections.is_empty() {
        init_minimal();
        return;
    }

    let router = FileRouter::build(&sections, base_dir);
    let console_targets = sections.console_targets();
    let file_targets = sections.file_targets(router.default.is_some());

    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let file_layer = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(file_targets)
    });

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().ok())
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// `init_logging_unified` with the built-in defaults when no section is
/// configured.
pub fn init_logging(cfg: Option<&LoggingConfig>, base_dir: &Path) {
    match cfg {
        Some(cfg) => init_logging_unified(cfg, base_dir),
        None => init_logging_unified(&crate::config::default_logging_config(), base_dir),
    }
}

fn init_minimal() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().ok())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339()),
        )
        .try_init();
}
