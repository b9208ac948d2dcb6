use anyhow::Result;
use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

// CLI Commands (cmd_ prefix)
mod cmd_manager;
mod cmd_request;
mod cmd_status;

// Helper modules (no cmd_ prefix)
mod logger;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Format custom help template with grouped commands
fn format_help_template() -> &'static str {
    concat!(
        "{about-with-newline}\n\n",
        "{usage-heading}\n  {usage}\n\n",
        "Options:\n{options}\n\n",
        "Manager:\n",
        "  manager   Generate the cluster bundle and collect node bundles\n",
        "\n",
        "Requests:\n",
        "  request   Create a support bundle request\n",
        "  status    Show the state of a support bundle request\n",
        "\n",
        "See 'supportbundle <COMMAND> --help' for more information on a specific command.\n"
    )
}

#[derive(Parser)]
#[command(bin_name = "supportbundle")]
#[command(version = VERSION)]
#[command(about = concat!("supportbundle v", env!("CARGO_PKG_VERSION"), " - Cluster support bundle manager"))]
#[command(long_about = concat!(
    "supportbundle v", env!("CARGO_PKG_VERSION"), " - Cluster support bundle manager\n\n",
    "Collects a cluster-wide diagnostic snapshot, waits for every node to push\n",
    "its own bundle over HTTP, and merges everything into one zip archive."
))]
#[command(author)]
#[command(propagate_version = true)]
#[command(help_template = format_help_template())]
pub struct Cli {
    /// Directory holding support bundle status records
    #[arg(
        short = 'S',
        long = "status-dir",
        env = "SUPPORT_BUNDLE_STATUS_DIR",
        global = true,
        value_hint = ValueHint::DirPath
    )]
    status_dir: Option<PathBuf>,

    /// Only print errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn status_dir(&self) -> PathBuf {
        self.status_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(supportbundle::constants::DEFAULT_OUTPUT_DIR_NAME)
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    Manager(cmd_manager::ManagerCommand),
    Request(cmd_request::RequestCommand),
    Status(cmd_status::StatusCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger based on verbosity flags
    logger::init_logger(cli.verbose, cli.quiet);

    let status_dir = cli.status_dir();
    match cli.command {
        Commands::Manager(cmd) => cmd_manager::run(cmd, status_dir)?,
        Commands::Request(cmd) => cmd_request::run(cmd, status_dir)?,
        Commands::Status(cmd) => cmd_status::run(cmd, status_dir)?,
    }

    Ok(())
}

/// Macro to create clap help templates with examples
/// This works around the limitation that {bin} doesn't work in after_help
/// Uses env! macro to get binary name at compile time
#[macro_export]
macro_rules! clap_help {
    (examples: $examples:literal) => {{
        const BIN: &str = env!("CARGO_PKG_NAME");
        concat!(
            "{about-with-newline}\n",
            "{usage-heading} {usage}\n\n",
            "{all-args}\n\n",
            "Examples:\n",
            $examples
        )
        .replace("{bin}", BIN)
    }};
}
