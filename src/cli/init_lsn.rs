//! Implementation of `pbktrack init-lsn` subcommand.

use std::path::PathBuf;

use clap::Args;

use crate::map::Lsn;
use crate::tracker::TrackerConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Args, Default)]
pub struct InitLsnArgs {
    /// Data directory the change map belongs to
    #[arg(short = 'D', long = "pgdata")]
    pub pgdata: Option<PathBuf>,

    /// Persisted map to read; `-D` is not needed when this is given
    #[arg(long = "map-file")]
    pub map_file: Option<PathBuf>,
}

pub fn execute(args: InitLsnArgs) -> Result<()> {
    let lsn = read_init_lsn(args)?;
    println!("{lsn}");
    Ok(())
}

pub fn read_init_lsn(args: InitLsnArgs) -> Result<Lsn> {
    let path = match (args.map_file, args.pgdata) {
        (Some(file), _) => file,
        (None, Some(pgdata)) => TrackerConfig::new(pgdata, 0).map_path(),
        (None, None) => return Err(Error::Cli("pgdata is required".into()).into()),
    };
    Ok(super::open_map(&path)?.init_lsn())
}
