use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use modkit_bootstrap::{AppConfig, AppConfigProvider, CliArgs, ConfigProvider};

use std::path::PathBuf;
use std::sync::Arc;

mod commands;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Adapter to make `AppConfigProvider` implement `modkit::ConfigProvider`.
pub(crate) struct ModkitConfigAdapter(Arc<AppConfigProvider>);

impl modkit::ConfigProvider for ModkitConfigAdapter {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.get_module_config(module_name)
    }
}

/// ModKit - discover, order and toggle application modules
#[derive(Parser)]
#[command(name = "modkit")]
#[command(about = "ModKit - discover, order and toggle application modules")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Application root (overrides app.base_path)
    #[arg(short, long)]
    base_path: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List discovered modules
    List {
        /// Only enabled modules
        #[arg(long)]
        enabled: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Enable a module
    Enable { name: String },
    /// Disable a module (system modules are refused)
    Disable { name: String },
    /// Rescan the search paths and rewrite the cache
    Scan {
        /// Report what would be discovered without writing the cache
        #[arg(long)]
        pretend: bool,
    },
    /// Find the module owning a namespace or a file
    Resolve {
        #[arg(long, conflicts_with = "path", required_unless_present = "path")]
        namespace: Option<String>,
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// List discovered themes
    Themes,
    /// Print the registration plan as JSON
    Plan {
        /// Theme to resolve views through (defaults to registry.theme)
        #[arg(long)]
        theme: Option<String>,
    },
    /// Link module and theme assets into the public directory
    PublishAssets,
    /// Remove the cache artifact
    ClearCache,
    /// Validate configuration and manifests, then exit
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        base_path: cli
            .base_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    modkit_bootstrap::logging::init_logging(config.logging.as_ref(), &config.home_dir());

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    tracing::debug!(base_path = %config.base_path().display(), "modkit starting");

    let command = cli.command.unwrap_or(Commands::List {
        enabled: false,
        json: false,
    });
    commands::dispatch(config, command)
}
