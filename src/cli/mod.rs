//! Offline inspection of a persisted change map.

use std::path::Path;

use clap::{CommandFactory, Parser, Subcommand};

use crate::map::ChangeMap;
use crate::tracker::Checkpointer;
use crate::{Error, Result};

pub mod init_lsn;
pub mod pagemap;
pub mod version;

#[derive(Debug, Clone)]
pub enum Command {
    Version(version::VersionArgs),
    InitLsn(init_lsn::InitLsnArgs),
    Pagemap(pagemap::PagemapArgs),
    None,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub command: Command,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            command: Command::None,
        }
    }
}

pub fn dispatch(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Version(v) => version::execute(v),
        Command::InitLsn(i) => init_lsn::execute(i),
        Command::Pagemap(p) => pagemap::execute(p),
        Command::None => Ok(()),
    }
}

#[derive(Parser, Debug)]
#[command(name = "pbktrack", version, about = "Block change tracking for incremental backups")]
struct Cli {
    #[command(subcommand)]
    command: Option<Subcommands>,
}

#[derive(Subcommand, Debug)]
enum Subcommands {
    /// Print the change tracking protocol version.
    Version(version::VersionArgs),
    /// Print the LSN the persisted change map starts tracking from.
    InitLsn(init_lsn::InitLsnArgs),
    /// List blocks changed since an LSN, one bitmap per segment file.
    Pagemap(pagemap::PagemapArgs),
}

/// Parse CLI arguments into internal representation.
pub fn parse_args<I, S>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = args.into_iter().map(Into::into).collect();
    let cli = Cli::parse_from(argv);
    let command = match cli.command {
        Some(Subcommands::Version(args)) => Command::Version(args),
        Some(Subcommands::InitLsn(args)) => Command::InitLsn(args),
        Some(Subcommands::Pagemap(args)) => Command::Pagemap(args),
        None => Command::None,
    };

    Ok(CliArgs { command })
}

/// Build the underlying clap `Command` (useful for help/usage contract tests).
pub fn clap_command() -> clap::Command {
    Cli::command()
}

/// Load a persisted map without attaching to a running tracker. A missing or
/// damaged map means tracking cannot answer.
pub(crate) fn open_map(path: &Path) -> Result<ChangeMap> {
    let checkpointer = Checkpointer::new(path);
    match checkpointer.load() {
        Ok(Some(map)) => Ok(map),
        Ok(None) => {
            tracing::warn!(path = %path.display(), "no persisted change map");
            Err(Error::TrackingDisabled.into())
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "persisted change map unusable"
            );
            Err(Error::TrackingDisabled.into())
        }
    }
}
