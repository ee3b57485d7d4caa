// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    fs::{File, Permissions},
    io::{Read, Seek, Write},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Datelike, Local, Timelike};
use itertools::Itertools;
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{
    error::ArchiveError,
    layout::{MANIFEST_PATH, META_INF_DIR},
    manifest::{parent_dir, Manifest},
};

/// Converts a file modification time to a zip timestamp in local time.
/// Times outside the range representable in a zip header (before 1980)
/// are clamped to the zip epoch.
fn zip_time(time: SystemTime) -> zip::DateTime {
    let local: DateTime<Local> = time.into();
    let (Ok(year), Ok(month), Ok(day), Ok(hour), Ok(minute), Ok(second)) = (
        u16::try_from(local.year()),
        u8::try_from(local.month()),
        u8::try_from(local.day()),
        u8::try_from(local.hour()),
        u8::try_from(local.minute()),
        u8::try_from(local.second()),
    ) else {
        return zip::DateTime::default();
    };
    zip::DateTime::from_date_and_time(year, month, day, hour, minute, second).unwrap_or_default()
}

/// Returns the archive entry name of `path` relative to `root`, using forward
/// slashes.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .join("/"),
    )
}

fn is_dangling_link(path: &Path) -> bool {
    path.is_symlink() && !path.exists()
}

/// Returns true if `entry` is a symbolic link resolving outside `root`.
fn escapes_root(root: &Path, entry: &DirEntry) -> bool {
    if !entry.path_is_symlink() {
        return false;
    }
    match std::fs::canonicalize(entry.path()) {
        Ok(target) if target.starts_with(root) => false,
        Ok(target) => {
            warn!(
                "Skipping {:?}: it links to {:?} outside of the packed directory",
                entry.path(),
                target
            );
            true
        }
        Err(e) => {
            warn!("Skipping dangling link {:?}: {}", entry.path(), e);
            true
        }
    }
}

/// Writes the zip stream for `source_dir` into `out`.
fn write_entries<W: Write + Seek>(
    out: W,
    destination: &Path,
    source_dir: &Path,
    metadata: Option<&Manifest>,
) -> Result<(), ArchiveError> {
    let mut writer = ZipWriter::new(out);
    let write_error = |name: &str| {
        let name = name.to_string();
        move |source| ArchiveError::WriteEntry {
            archive: destination.to_path_buf(),
            name,
            source,
        }
    };

    if let Some(manifest) = metadata {
        // A fixed timestamp keeps the metadata entry byte-identical across runs.
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());
        let dir_name = format!("{META_INF_DIR}/");
        writer
            .add_directory(dir_name.as_str(), options)
            .map_err(write_error(&dir_name))?;
        writer
            .start_file(MANIFEST_PATH, options)
            .map_err(write_error(MANIFEST_PATH))?;
        writer
            .write_all(&manifest.render())
            .map_err(ArchiveError::io(destination))?;
    }

    let root = std::fs::canonicalize(source_dir).map_err(ArchiveError::io(source_dir))?;
    let walker = WalkDir::new(source_dir)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !escapes_root(&root, entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.loop_ancestor().is_some() => {
                return Err(ArchiveError::LinkCycle {
                    path: source.path().map(Path::to_path_buf).unwrap_or_default(),
                });
            }
            Err(source) if source.path().is_some_and(is_dangling_link) => {
                warn!("Skipping dangling link {:?}", source.path().unwrap_or(source_dir));
                continue;
            }
            Err(source) => {
                return Err(ArchiveError::Walk {
                    path: source_dir.to_path_buf(),
                    source,
                });
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = entry_name(source_dir, path) else {
            continue;
        };
        if metadata.is_some() && name == MANIFEST_PATH {
            debug!("Replacing {} with the supplied manifest", MANIFEST_PATH);
            continue;
        }

        let file_metadata = entry.metadata().map_err(|source| ArchiveError::Walk {
            path: path.to_path_buf(),
            source,
        })?;
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(file_metadata.permissions().mode() & 0o777);
        if let Ok(modified) = file_metadata.modified() {
            options = options.last_modified_time(zip_time(modified));
        }

        debug!("Adding {}", name);
        writer
            .start_file(name.as_str(), options)
            .map_err(write_error(&name))?;
        let mut input = File::open(path).map_err(ArchiveError::io(path))?;
        std::io::copy(&mut input, &mut writer).map_err(ArchiveError::io(path))?;
    }

    writer.finish().map_err(write_error(""))?;
    Ok(())
}

/// Data written in front of the zip stream: the first `len` bytes of `path`.
pub(crate) struct Prefix<'a> {
    pub path: &'a Path,
    pub len: u64,
}

pub(crate) fn pack_impl(
    destination: &Path,
    source_dir: &Path,
    metadata: Option<&Manifest>,
    prefix: Option<Prefix>,
) -> Result<(), ArchiveError> {
    let parent = parent_dir(destination);
    let mut temp = tempfile::Builder::new()
        .prefix(".warpack.")
        .tempfile_in(&parent)
        .map_err(ArchiveError::io(&parent))?;

    if let Some(Prefix { path, len }) = &prefix {
        let input = File::open(path).map_err(ArchiveError::io(path))?;
        std::io::copy(&mut input.take(*len), temp.as_file_mut())
            .map_err(ArchiveError::io(temp.path()))?;
    }

    write_entries(temp.as_file_mut(), destination, source_dir, metadata)?;

    let mode = if prefix.is_some() { 0o755 } else { 0o644 };
    temp.as_file()
        .set_permissions(Permissions::from_mode(mode))
        .map_err(ArchiveError::io(temp.path()))?;
    temp.persist(destination)
        .map_err(|e| ArchiveError::Io {
            path: PathBuf::from(destination),
            source: e.error,
        })?;
    Ok(())
}

/// Packs every regular file under `source_dir` into a new zip archive at
/// `destination`, preserving relative paths, modification times and
/// permission bits.
///
/// If `metadata` is supplied it is written as the archive's manifest and any
/// `META-INF/MANIFEST.MF` present under `source_dir` is skipped. Otherwise
/// every file is packed as-is.
///
/// Symbolic links are followed only when they resolve inside `source_dir`;
/// a link cycle is an error. The archive is written to a temporary file next
/// to `destination` and renamed into place on success, so a failed pack
/// never leaves a partial archive behind.
#[instrument]
pub fn pack(
    destination: &Path,
    source_dir: &Path,
    metadata: Option<&Manifest>,
) -> Result<(), ArchiveError> {
    pack_impl(destination, source_dir, metadata, None)
}

/// Like [`pack`], but prepends the contents of `launcher` to the archive and
/// marks the result executable. Running the result runs `launcher`, which
/// can open its own executable as a zip archive.
#[instrument]
pub fn pack_executable(
    destination: &Path,
    source_dir: &Path,
    metadata: Option<&Manifest>,
    launcher: &Path,
) -> Result<(), ArchiveError> {
    let prefix = Prefix {
        path: launcher,
        len: u64::MAX,
    };
    pack_impl(destination, source_dir, metadata, Some(prefix))
}
