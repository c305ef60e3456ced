/*!
 * Cellmaster CLI
 */

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cellmaster::{
    error::{Result, EXIT_SUCCESS},
    logging, Bootstrap, MasterAutomaton, MasterConfig,
};
use cellmaster_hydra::PeerStatus;
use cellmaster_object_server::GcMetrics;
use tracing::info;

#[derive(Parser)]
#[command(name = "cellmaster")]
#[command(version, about = "Master cell control plane: zombie-object GC and chunk job tracking", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single-peer master until interrupted
    Run {
        /// Master config file (TOML)
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Snapshot to restore at start and write back on shutdown
        #[arg(short, long, value_name = "PATH")]
        snapshot: Option<PathBuf>,
    },

    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Snapshot helpers
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the default config as TOML
    Default,

    /// Parse and validate a config file
    Check {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// Summarize the objects in a snapshot
    Inspect {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.category(), e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, snapshot } => {
            let mut config = match config {
                Some(path) => MasterConfig::from_file(&path)?,
                None => MasterConfig::default(),
            };
            config.logging.verbose |= cli.verbose;
            run_master(config, snapshot)
        }
        Commands::Config(ConfigCommands::Default) => {
            print!("{}", toml::to_string_pretty(&MasterConfig::default())?);
            Ok(())
        }
        Commands::Config(ConfigCommands::Check { path }) => {
            let config = MasterConfig::from_file(&path)?;
            config.validate()?;
            println!(
                "{}: ok (cell {}, {} secondary cells)",
                path.display(),
                config.cell.cell_tag(),
                config.cell.secondary_cell_count()
            );
            Ok(())
        }
        Commands::Snapshot(SnapshotCommands::Inspect { path, json }) => {
            inspect_snapshot(&path, json)
        }
    }
}

fn run_master(config: MasterConfig, snapshot: Option<PathBuf>) -> Result<()> {
    logging::init_logging(&config.logging)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let mut bootstrap = Bootstrap::new(config)?;

        if let Some(path) = snapshot.as_deref().filter(|path| path.exists()) {
            bootstrap.load_snapshot(path).await?;
        }
        bootstrap.start();

        tokio::signal::ctrl_c().await?;
        info!("Interrupted, shutting down");

        let saved = match snapshot.as_deref() {
            Some(path) => bootstrap.save_snapshot(path).await,
            None => Ok(()),
        };
        bootstrap.stop().await;
        saved
    })
}

fn inspect_snapshot(path: &Path, json: bool) -> Result<()> {
    let mut automaton = MasterAutomaton::new(
        &MasterConfig::default(),
        Arc::new(PeerStatus::follower()),
        GcMetrics::new(),
    )?;
    automaton.load(BufReader::new(File::open(path)?))?;
    let summary = automaton.summary();

    if json {
        let text = serde_json::to_string_pretty(&summary).map_err(io::Error::from)?;
        println!("{}", text);
        return Ok(());
    }

    println!("Snapshot:       {}", path.display());
    println!("Objects:        {}", summary.simple_objects);
    println!("Chunks:         {}", summary.chunks);
    println!("Data centers:   {}", summary.data_centers.join(", "));
    println!("Zombies:        {}", summary.zombies.len());
    for id in &summary.zombies {
        println!("  {}", id);
    }
    Ok(())
}
