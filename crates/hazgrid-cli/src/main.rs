use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "hazgrid",
    about = "HazGrid — hazard-event / forecast-grid reconciliation engine",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration tooling
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect the interoperability record store
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },
    /// Replay a snapshot of events and grid notifications through the
    /// engine against in-memory stores.
    ///
    /// The snapshot is a JSON document with `events`, `grids`, and
    /// `notifications` arrays; the final state of all stores is printed
    /// after the run.
    Replay {
        /// Path to hazgrid.toml
        #[arg(short, long, default_value = "hazgrid.toml")]
        config: String,
        /// Path to the snapshot JSON file
        #[arg(short, long)]
        snapshot: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Parse and validate a hazgrid.toml file
    Validate {
        #[arg(short, long, default_value = "hazgrid.toml")]
        path: String,
    },
}

#[derive(Subcommand)]
enum RecordsAction {
    /// List every record in a record store database
    List {
        /// Path to the redb database file
        #[arg(short, long)]
        db: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hazgrid=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => commands::config::validate(&path),
        },
        Commands::Records { action } => match action {
            RecordsAction::List { db, format } => commands::records::list(&db, &format),
        },
        Commands::Replay {
            config,
            snapshot,
            format,
        } => commands::replay::replay(&config, &snapshot, &format),
    }
}
