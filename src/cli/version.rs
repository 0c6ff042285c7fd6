//! Implementation of `pbktrack version` subcommand.

use clap::Args;

use crate::{Result, PROTOCOL_VERSION};

#[derive(Debug, Clone, Args, Default)]
pub struct VersionArgs {}

pub fn execute(_args: VersionArgs) -> Result<()> {
    println!("{PROTOCOL_VERSION}");
    Ok(())
}
