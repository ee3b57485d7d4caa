// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use itertools::Itertools;
use std::path::PathBuf;
use warfile::Manifest;

/// Parse a single key-value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .with_context(|| format!("Invalid key-value: {:?}", s))?;
    ensure!(!key.is_empty(), "Invalid key-value: {:?}", s);
    Ok((key.to_string(), value.to_string()))
}

/// Shows the manifest attributes of an archive.
#[derive(Parser, Debug)]
pub struct ShowMetadataArgs {
    /// Show attributes sorted by name instead of in manifest order.
    #[arg(long)]
    sort: bool,

    /// The archive to inspect.
    #[arg()]
    archive: PathBuf,
}

pub fn do_show_metadata(args: ShowMetadataArgs) -> Result<()> {
    let manifest =
        Manifest::read(&args.archive).with_context(|| format!("{:?}", args.archive))?;
    let attributes: Vec<_> = if args.sort {
        manifest
            .iter()
            .sorted_by_key(|(name, _)| name.to_ascii_lowercase())
            .collect()
    } else {
        manifest.iter().collect()
    };
    for (name, value) in attributes {
        println!("{name}: {value}");
    }
    Ok(())
}

/// Sets manifest attributes of an archive in place.
#[derive(Parser, Debug)]
pub struct UpdateMetadataArgs {
    /// The archive to update.
    #[arg(long)]
    archive: PathBuf,

    /// Attributes to set. Format: name=value.
    #[arg(value_parser = parse_key_val)]
    values: Vec<(String, String)>,
}

pub fn do_update_metadata(args: UpdateMetadataArgs) -> Result<()> {
    warfile::update(&args.archive, args.values)
        .with_context(|| format!("{:?}", args.archive))?;
    Ok(())
}
