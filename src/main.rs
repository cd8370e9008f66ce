use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use trainbrick::app::{build_system, simulated_adapter, DemoProgram};
#[cfg(feature = "ble")]
use trainbrick::spawn_adapter_thread_with;
use trainbrick::{init_logging, spawn_adapter_thread, AdapterHandle, AdapterThread, Config};

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATE"), ")");

#[derive(Parser)]
#[command(name = "trainbrick")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Drive LEGO Powered Up hubs over Bluetooth LE")]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the configured hubs and run the demo program
    Run {
        /// Use a simulated radio where every configured hub is in range
        #[arg(long)]
        simulate: bool,
        /// Seconds the outputs stay on
        #[arg(long, default_value_t = 3)]
        seconds: u64,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    ShowConfig,
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => Ok(Config::default_path()?),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load_or_default(path).with_context(|| format!("loading {}", path.display()))
}

async fn run(config: Config, simulate: bool, seconds: u64) -> Result<()> {
    let program = DemoProgram {
        run_time: Duration::from_secs(seconds),
    };
    let system = build_system(&config, program)?;

    let (handle, worker) = if simulate {
        tracing::info!("Running against simulated hubs");
        spawn_adapter_thread(simulated_adapter(&config))?
    } else {
        open_radio(&config)?
    };

    let outcome = system.run(handle).await;
    // The dispatcher sends quit on every exit path, so the worker ends
    tokio::task::spawn_blocking(move || worker.join()).await??;
    Ok(outcome?)
}

#[cfg(feature = "ble")]
fn open_radio(config: &Config) -> Result<(AdapterHandle, AdapterThread)> {
    let window = Duration::from_millis(config.scan.discover_window_ms);
    Ok(spawn_adapter_thread_with(move || trainbrick::BtleplugAdapter::new(window))?)
}

#[cfg(not(feature = "ble"))]
fn open_radio(_config: &Config) -> Result<(AdapterHandle, AdapterThread)> {
    anyhow::bail!("built without Bluetooth support; rebuild with `--features ble` or pass --simulate")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let path = config_path(&cli)?;

    match cli.command.unwrap_or(Commands::Run {
        simulate: false,
        seconds: 3,
    }) {
        Commands::Run { simulate, seconds } => {
            let config = load_config(&path)?;
            tracing::info!("Loaded {} hub(s) from {}", config.hubs.len(), path.display());
            run(config, simulate, seconds).await
        }
        Commands::InitConfig { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save_to_file(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::ShowConfig => {
            let config = load_config(&path)?;
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
