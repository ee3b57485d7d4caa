// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Reads every regular file under `root` into a map keyed by the path
/// relative to `root`. Directories are not recorded.
pub fn snapshot_tree(root: &Path) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(true).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative_path = entry.path().strip_prefix(root)?.to_path_buf();
        let contents = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {:?}", entry.path()))?;
        files.insert(relative_path, contents);
    }
    Ok(files)
}

/// Lists the entries of a directory by name, sorted. Returns an empty list if
/// the directory doesn't exist.
pub fn list_dir(dir: &Path) -> Result<Vec<String>> {
    if !dir.try_exists()? {
        return Ok(Vec::new());
    }
    let mut names = std::fs::read_dir(dir)?
        .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}
