// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::{Context, Result};
use bootstrap::{ExecutableResolver, Launcher};
use clap::Parser;
use cliutil::{cli_main, Config};
use std::{path::PathBuf, process::ExitCode};
use tracing::info;

/// Environment variable naming the archive to run when no argument is given.
const ARCHIVE_ENV: &str = "WARBOOT_ARCHIVE";

/// Runs a WAR file repackaged by `warpack repackage`.
///
/// The archive is extracted into a temporary directory, which is removed when
/// the application exits. The application receives the extracted directory
/// and the archive file name as `--<name>=<value>` arguments.
#[derive(Parser, Debug)]
#[command()]
struct Cli {
    /// The archive to run. Defaults to $WARBOOT_ARCHIVE, or to this
    /// executable itself when it was built with --self-executable.
    #[arg()]
    archive: Option<PathBuf>,
}

fn do_main() -> Result<ExitCode> {
    let cli = Cli::try_parse()?;

    let archive = match cli
        .archive
        .or_else(|| std::env::var_os(ARCHIVE_ENV).map(PathBuf::from))
    {
        Some(archive) => archive,
        None => std::env::current_exe().context("Failed to locate the running executable")?,
    };
    info!("Launching {}", archive.display());

    let exit_code = Launcher::new(&archive).launch(&ExecutableResolver)?;
    Ok(ExitCode::from(exit_code))
}

fn main() -> ExitCode {
    cli_main(do_main, Config::default())
}
