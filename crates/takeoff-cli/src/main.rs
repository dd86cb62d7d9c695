mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, project::ProjectSubcommand, version::VersionSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "takeoff",
    about = "Takeoff spreadsheet versions, Setup inspection and BTX tool generation",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest takeoff.yaml, else built-in defaults)
    #[arg(long, global = true, env = "TAKEOFF_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write or validate the configuration file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Manage the project registry
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Create and manage version tabs
    Version {
        #[command(subcommand)]
        subcommand: VersionSubcommand,
    },

    /// Show what a project's Setup tab currently selects
    Setup { project: String },

    /// List the BTX tools for a project's current selection
    Tools {
        project: String,

        /// Group tools into per-location bundles
        #[arg(long)]
        bundles: bool,
    },

    /// Run the HTTP API
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let source = root::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Config { subcommand } => cmd::config::run(&source, subcommand, cli.json),
        Commands::Project { subcommand } => cmd::project::run(&source, subcommand, cli.json),
        Commands::Version { subcommand } => cmd::version::run(&source, subcommand, cli.json),
        Commands::Setup { project } => cmd::setup::run(&source, &project, cli.json),
        Commands::Tools { project, bundles } => {
            cmd::tools::run(&source, &project, bundles, cli.json)
        }
        Commands::Serve { port } => cmd::serve::run(&source, port),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
