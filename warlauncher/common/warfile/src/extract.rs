// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    collections::BTreeSet,
    fs::{File, Permissions},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use tracing::{debug, instrument};
use zip::ZipArchive;

use crate::error::ArchiveError;

/// The files written by [`extract`], as paths relative to the destination.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ExtractedContent {
    pub files: BTreeSet<PathBuf>,
}

/// Opens a zip archive for reading. Archives with data prepended to them
/// (e.g. self-executable archives) are accepted.
pub fn open_archive(path: &Path) -> Result<ZipArchive<File>, ArchiveError> {
    let file = File::open(path).map_err(ArchiveError::io(path))?;
    ZipArchive::new(file).map_err(|source| ArchiveError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns the number of bytes preceding the zip data of `archive`, e.g. the
/// launcher of a self-executable archive. Zero for a plain archive.
pub fn prefix_len(archive: &Path) -> Result<u64, ArchiveError> {
    let mut reader = open_archive(archive)?;
    let mut start = None;
    for index in 0..reader.len() {
        let entry = reader
            .by_index_raw(index)
            .map_err(|source| ArchiveError::ReadEntry {
                archive: archive.to_path_buf(),
                index,
                source,
            })?;
        let header_start = entry.header_start();
        start = Some(start.map_or(header_start, |start: u64| start.min(header_start)));
    }
    Ok(start.unwrap_or(0))
}

/// Extracts every entry of `archive` into `out_dir`.
pub fn extract_all(archive: &Path, out_dir: &Path) -> Result<ExtractedContent, ArchiveError> {
    extract(archive, out_dir, |_| false)
}

/// Extracts the entries of `archive` into `out_dir`, recreating their
/// relative paths.
///
/// Entries for which `exclude` returns true are skipped entirely. It receives
/// the entry path relative to the archive root, e.g. `WEB-INF/lib/dep.jar`.
///
/// File contents are copied verbatim and permission bits recorded in the
/// archive are restored. On error the remaining entries are not extracted and
/// the caller must treat `out_dir` as unusable.
#[instrument(skip(exclude))]
pub fn extract(
    archive: &Path,
    out_dir: &Path,
    exclude: impl Fn(&Path) -> bool,
) -> Result<ExtractedContent, ArchiveError> {
    let mut reader = open_archive(archive)?;
    let mut files = BTreeSet::new();

    for index in 0..reader.len() {
        let mut entry = reader
            .by_index(index)
            .map_err(|source| ArchiveError::ReadEntry {
                archive: archive.to_path_buf(),
                index,
                source,
            })?;
        let relative_path =
            entry
                .enclosed_name()
                .ok_or_else(|| ArchiveError::UnsafeEntry {
                    archive: archive.to_path_buf(),
                    name: entry.name().to_string(),
                })?;
        if relative_path.as_os_str().is_empty() {
            continue;
        }
        if exclude(&relative_path) {
            debug!("Skipping {:?}", relative_path);
            continue;
        }

        let out_path = out_dir.join(&relative_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(ArchiveError::io(&out_path))?;
            continue;
        }

        debug!("Extracting {:?}", relative_path);
        if let Some(dir) = out_path.parent() {
            std::fs::create_dir_all(dir).map_err(ArchiveError::io(dir))?;
        }
        let mut file = File::create(&out_path).map_err(ArchiveError::io(&out_path))?;
        std::io::copy(&mut entry, &mut file).map_err(ArchiveError::io(&out_path))?;
        if let Some(mode) = entry.unix_mode() {
            // Keep the file removable and rewritable by its owner.
            let mode = (mode & 0o777) | 0o600;
            file.set_permissions(Permissions::from_mode(mode))
                .map_err(ArchiveError::io(&out_path))?;
        }

        files.insert(relative_path);
    }

    Ok(ExtractedContent { files })
}
