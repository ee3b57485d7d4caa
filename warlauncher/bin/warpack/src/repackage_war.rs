// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::{bail, Result};
use clap::Parser;
use repackage::{build_output_path, BootstrapPayload, RepackageOptions, Repackager};
use std::path::PathBuf;
use tracing::info;

/// Makes a WAR file executable by rewriting it in place to launch through
/// warboot.
#[derive(Parser, Debug)]
pub struct RepackageArgs {
    /// The WAR file to repackage.
    #[arg(long, conflicts_with = "build_dir")]
    war: Option<PathBuf>,

    /// The build output directory. The WAR file is
    /// <BUILD_DIR>/<ARTIFACT_ID>-<VERSION>.war.
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// The artifact ID the WAR file is named after.
    #[arg(long)]
    artifact_id: Option<String>,

    /// The artifact version the WAR file is named after.
    #[arg(long)]
    version: Option<String>,

    /// The identifier warboot invokes. Defaults to the Main-Class of the WAR
    /// file.
    #[arg(long)]
    entry_point: Option<String>,

    /// Name of the startup parameter receiving the extracted web root.
    #[arg(long)]
    web_root_param_name: Option<String>,

    /// Name of the startup parameter receiving the WAR file name.
    #[arg(long)]
    war_file_param_name: Option<String>,

    /// The warboot executable to embed. Defaults to the one installed next to
    /// this program.
    #[arg(long)]
    bootstrap: Option<PathBuf>,

    /// JSON file with default values for the options above. Flags given on
    /// the command line take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Prepends warboot to the archive so that it can be run directly.
    #[arg(long, overrides_with = "no_self_executable")]
    self_executable: bool,

    /// Writes a plain archive even if the config file asks for a
    /// self-executable one.
    #[arg(long, overrides_with = "self_executable")]
    no_self_executable: bool,
}

impl RepackageArgs {
    fn self_executable(&self) -> Option<bool> {
        match (self.self_executable, self.no_self_executable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    fn archive_path(&self) -> Result<PathBuf> {
        match (&self.war, &self.build_dir, &self.artifact_id, &self.version) {
            (Some(war), _, _, _) => Ok(war.clone()),
            (None, Some(build_dir), Some(artifact_id), Some(version)) => {
                Ok(build_output_path(build_dir, artifact_id, version))
            }
            _ => bail!("Either --war or --build-dir, --artifact-id and --version must be set"),
        }
    }
}

pub fn do_repackage(args: RepackageArgs) -> Result<()> {
    let archive = args.archive_path()?;
    let self_executable = args.self_executable();

    let defaults = match &args.config {
        Some(path) => RepackageOptions::deserialize_from(path)?,
        None => RepackageOptions::default(),
    };
    let options = defaults.merge(RepackageOptions {
        entry_point: args.entry_point,
        web_root_param_name: args.web_root_param_name,
        war_file_param_name: args.war_file_param_name,
        bootstrap: args.bootstrap,
        self_executable,
    });

    let payload = match &options.bootstrap {
        Some(path) => BootstrapPayload::from_executable(path)?,
        None => BootstrapPayload::locate_default()?,
    };

    let summary = Repackager::new(options, payload).repackage(&archive)?;
    info!("Wrote {}", summary.archive.display());
    Ok(())
}
