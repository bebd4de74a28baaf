//! packrat - a minimal git clone client.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

use logging::LogFormat;

/// packrat - clone git repositories over protocol v2
#[derive(Parser, Debug)]
#[command(name = "packrat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty repository
    Init {
        /// Directory to initialize (default: current directory)
        path: Option<PathBuf>,
    },

    /// Clone a repository
    Clone {
        /// Remote repository URL
        url: String,
        /// Destination directory (default: derived from the URL)
        dest: Option<PathBuf>,
        /// JSON file with clone settings
        #[arg(long)]
        config: Option<PathBuf>,
        /// Service path appended to the URL
        #[arg(long)]
        upload_pack_path: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// User-Agent header
        #[arg(long)]
        user_agent: Option<String>,
        /// Do not write HEAD or the branch ref
        #[arg(long)]
        no_head: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(logging::level_for(cli.verbose), cli.log_format);

    let result = match cli.command {
        Commands::Init { path } => commands::init(path.as_deref()),
        Commands::Clone {
            url,
            dest,
            config,
            upload_pack_path,
            timeout,
            user_agent,
            no_head,
        } => commands::load_config(
            config.as_deref(),
            &commands::ConfigOverrides {
                upload_pack_path,
                timeout,
                user_agent,
                no_head,
            },
        )
        .and_then(|config| commands::clone(&url, dest.as_deref(), &config)),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
