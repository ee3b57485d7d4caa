// Copyright 2022 The ChromiumOS Authors.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::{bail, Context, Result};
use std::fs::{remove_dir, remove_file, set_permissions, symlink_metadata, Permissions};
use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

const S_IRWXU: u32 = 0o700;

/// Adds `u+rwx` to every directory under `path` so that their entries can be
/// unlinked. Directories that cannot be listed or chmod-ed are left alone; the
/// removal pass reports them.
fn grant_owner_access(path: &Path) {
    for entry in WalkDir::new(path)
        .into_iter()
        // walk isn't lazy, so if we have a directory with no permissions, it attempts to list its
        // contents (which fails since it has no permissions), then sets permissions.
        // Thus, we filter out any failures in the listing directory stage.
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let mode = metadata.mode();
        if mode & S_IRWXU != S_IRWXU {
            let new_mode = mode | S_IRWXU;
            if let Err(e) = set_permissions(entry.path(), Permissions::from_mode(new_mode)) {
                warn!(
                    "Failed to set permissions for {:?} to {:o}: {}",
                    entry.path(),
                    new_mode,
                    e
                );
            }
        }
    }
}

/// Recursively removes `path`, continuing past entries that fail to be
/// removed.
///
/// Unlike [`std::fs::remove_dir_all`], a failure to remove one file does not
/// stop the removal of its siblings. All failures are collected and returned
/// as a single error once every entry has been attempted.
///
/// Removing a path that does not exist succeeds, so it is safe to call this
/// function repeatedly on the same path.
pub fn remove_dir_all_best_effort(path: &Path) -> Result<()> {
    match symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {:?}", path)),
    }

    grant_owner_access(path);

    let mut failures: Vec<String> = Vec::new();
    for entry in WalkDir::new(path).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                failures.push(e.to_string());
                continue;
            }
        };
        let result = if entry.file_type().is_dir() {
            remove_dir(entry.path())
        } else {
            remove_file(entry.path())
        };
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => failures.push(format!("{}: {}", entry.path().display(), e)),
        }
    }

    if !failures.is_empty() {
        bail!(
            "Failed to remove {} entries under {:?}:\n{}",
            failures.len(),
            path,
            failures.join("\n")
        );
    }
    Ok(())
}
