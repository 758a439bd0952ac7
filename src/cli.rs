use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::SyncOptions;
use crate::error::SetupError;

/// Mirror directory trees to one or more destinations.
///
/// `watch` follows the target directories and relays every change, as JSON lines, to an
/// integration process. `receive` is the bundled integration: it applies those lines to
/// local destination directories.
#[derive(Parser, Debug)]
#[command(
    name = "mirror-relay",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch target directories and relay every change to an integration.
    ///
    /// Example: mirror-relay watch -t ~/docs -i mirror-relay --integration-arg receive
    /// -a destinations=/mnt/backup
    Watch(WatchArgs),

    /// Read frames from stdin and apply them to the destinations they name.
    ///
    /// Prints `ready` on stdout once it is reading.
    Receive,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directory to watch, recursively. Repeatable.
    #[arg(short, long = "target", value_name = "DIR")]
    pub targets: Vec<PathBuf>,

    /// Integration executable that receives frames on its stdin.
    #[arg(short, long, value_name = "PATH")]
    pub integration: Option<PathBuf>,

    /// Argument passed to the integration. Repeatable.
    #[arg(long = "integration-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub integration_args: Vec<String>,

    /// Pass-through argument attached to every frame, e.g. `destinations=/a,/b`. Repeatable.
    #[arg(short, long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub arguments: Vec<(String, String)>,

    /// Maximum payload bytes per frame (default 10000).
    #[arg(long, value_name = "BYTES")]
    pub max_chunk_bytes: Option<usize>,

    /// Replace each synced file with an empty `.placeholder` stub.
    #[arg(long)]
    pub placeholders: bool,

    /// Do not propagate ordinary deletes to the destinations.
    #[arg(long)]
    pub keep_deleted: bool,

    /// Seconds to wait for the integration's readiness line.
    #[arg(long, value_name = "SECS")]
    pub ready_timeout: Option<u64>,

    /// TOML file with defaults; flags given here override or extend it.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the startup summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    /// Merge the config file (if any) with the flags. Lists and maps are extended,
    /// scalars are overridden, switches can only turn their behaviour on.
    pub fn into_options(self) -> Result<SyncOptions, SetupError> {
        let mut options = match &self.config {
            Some(path) => SyncOptions::load(path)?,
            None => SyncOptions::default(),
        };

        options.targets.extend(self.targets);
        if self.integration.is_some() {
            options.integration = self.integration;
        }
        options.integration_args.extend(self.integration_args);
        options.arguments.extend(self.arguments);
        if let Some(bytes) = self.max_chunk_bytes {
            options.max_chunk_bytes = bytes;
        }
        if let Some(secs) = self.ready_timeout {
            options.ready_timeout_secs = secs;
        }
        if self.placeholders {
            options.use_placeholders = true;
        }
        if self.keep_deleted {
            options.remove_deleted_files = false;
        }

        Ok(options)
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))
}
