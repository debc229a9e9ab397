mod cmd;
mod host;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, service::ServiceSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Activate proxy profiles and group selections on a running core",
    version,
    propagate_version = true
)]
struct Cli {
    /// State directory (default: ~/.switchyard)
    #[arg(long, global = true, env = "SWITCHYARD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log progress at info level
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make a profile the active one and restore its saved selections
    Activate {
        /// Profile uid
        profile: String,

        /// Re-apply even if the profile is already active
        #[arg(long)]
        force: bool,

        /// Don't announce a successful switch
        #[arg(long)]
        quiet: bool,
    },

    /// Re-apply the current profile (after a core restart)
    Reactivate,

    /// Pick a member of a selector group
    Select {
        group: String,
        member: String,

        /// Member being replaced (default: looked up from the core)
        #[arg(long)]
        previous: Option<String>,

        /// Switch without recording the choice in the current profile
        #[arg(long)]
        no_save: bool,
    },

    /// Re-apply the current profile's saved selections now
    Reconcile,

    /// Show profiles and the core's state
    Status,

    /// Download a profile from an http(s) URL
    Import { url: String },

    /// Manage the background service that runs the core
    Service {
        #[command(subcommand)]
        subcommand: ServiceSubcommand,
    },

    /// Inspect and validate config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Activate {
            profile,
            force,
            quiet,
        } => cmd::activate::run(&root, &profile, force, quiet, cli.json),
        Commands::Reactivate => cmd::reactivate::run(&root, cli.json),
        Commands::Select {
            group,
            member,
            previous,
            no_save,
        } => cmd::select::run(&root, &group, &member, previous.as_deref(), no_save, cli.json),
        Commands::Reconcile => cmd::reconcile::run(&root, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Import { url } => cmd::import::run(&root, &url, cli.json),
        Commands::Service { subcommand } => cmd::service::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
