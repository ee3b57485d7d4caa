// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use warfile::{layout::is_bootstrap_entry, Manifest};

/// Extracts an archive into a directory.
#[derive(Parser, Debug)]
pub struct UnpackArgs {
    /// Skip the embedded warboot payload.
    #[arg(long)]
    exclude_bootstrap: bool,

    /// The archive to extract.
    #[arg()]
    archive: PathBuf,

    /// The directory to extract into. Created if missing.
    #[arg()]
    output_dir: PathBuf,
}

pub fn do_unpack(args: UnpackArgs) -> Result<()> {
    let content = if args.exclude_bootstrap {
        warfile::extract(&args.archive, &args.output_dir, is_bootstrap_entry)?
    } else {
        warfile::extract_all(&args.archive, &args.output_dir)?
    };
    info!(
        "Extracted {} files to {}",
        content.files.len(),
        args.output_dir.display()
    );
    Ok(())
}

/// Packs a directory into an archive.
#[derive(Parser, Debug)]
pub struct PackArgs {
    /// Manifest file to use instead of <INPUT_DIR>/META-INF/MANIFEST.MF.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// The directory to pack.
    #[arg()]
    input_dir: PathBuf,

    /// The archive to write. Overwritten if it exists.
    #[arg()]
    archive: PathBuf,
}

pub fn do_pack(args: PackArgs) -> Result<()> {
    let manifest = match &args.manifest {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("Failed to read {path:?}"))?;
            Some(Manifest::parse(&bytes).with_context(|| format!("{path:?}"))?)
        }
        None => None,
    };
    warfile::pack(&args.archive, &args.input_dir, manifest.as_ref())?;
    Ok(())
}
