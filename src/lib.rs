use thiserror::Error;

pub mod cli;
pub mod logging;
pub mod map;
pub mod scan;
pub mod tracker;
pub mod walk;

pub type Result<T> = anyhow::Result<T>;

/// Version of the change tracking protocol reported to backup tools.
pub const PROTOCOL_VERSION: &str = "2.4";

#[derive(Error, Debug)]
pub enum Error {
    #[error("change tracking is disabled")]
    TrackingDisabled,
    #[error("change map is corrupt: {reason}")]
    CorruptMap { reason: String },
    #[error("invalid change map size {requested} bytes (allowed: 0 or {min}..={max})")]
    InvalidMapSize { requested: u64, min: u64, max: u64 },
    #[error("invalid LSN: {0}")]
    InvalidLsn(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("serialization error")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cli error: {0}")]
    Cli(String),
}

/// Entry point for the library, called by the CLI thin wrapper.
pub fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    logging::init_logging(logging::LogFormat::Human)?;

    let cli_args = cli::parse_args(args.into_iter().map(Into::into))?;
    cli::dispatch(cli_args)
}
