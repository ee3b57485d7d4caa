// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

mod archive;
mod metadata;
mod repackage_war;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cliutil::{cli_main, Config};
use std::process::ExitCode;

use crate::archive::{do_pack, do_unpack, PackArgs, UnpackArgs};
use crate::metadata::{do_show_metadata, do_update_metadata, ShowMetadataArgs, UpdateMetadataArgs};
use crate::repackage_war::{do_repackage, RepackageArgs};

#[derive(Parser, Debug)]
#[command()]
struct Cli {
    #[clap(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Repackage(RepackageArgs),
    ShowMetadata(ShowMetadataArgs),
    UpdateMetadata(UpdateMetadataArgs),
    Unpack(UnpackArgs),
    Pack(PackArgs),
}

fn do_main() -> Result<()> {
    let cli = Cli::try_parse()?;
    match cli.commands {
        Commands::Repackage(args) => do_repackage(args),
        Commands::ShowMetadata(args) => do_show_metadata(args),
        Commands::UpdateMetadata(args) => do_update_metadata(args),
        Commands::Unpack(args) => do_unpack(args),
        Commands::Pack(args) => do_pack(args),
    }
}

fn main() -> ExitCode {
    cli_main(do_main, Config::from_env().log_command_line(false))
}
