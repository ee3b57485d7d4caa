// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::{Path, PathBuf};

use zip::result::ZipError;

use crate::layout::MANIFEST_PATH;

/// An error returned while reading or writing an archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to open archive {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("failed to read entry #{index} of {archive:?}")]
    ReadEntry {
        archive: PathBuf,
        index: usize,
        #[source]
        source: ZipError,
    },
    #[error("entry {name:?} of {archive:?} escapes the destination directory")]
    UnsafeEntry { archive: PathBuf, name: String },
    #[error("failed to write entry {name:?} to {archive:?}")]
    WriteEntry {
        archive: PathBuf,
        name: String,
        #[source]
        source: ZipError,
    },
    #[error("symbolic link cycle detected at {path:?}")]
    LinkCycle { path: PathBuf },
    #[error("failed to walk {path:?}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create a scratch directory in {path:?}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl ArchiveError {
    /// Returns a closure wrapping an [`std::io::Error`] on `path`, for use
    /// with `map_err`.
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// An error returned while reading or interpreting the metadata header.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("{archive:?} has no {} entry", MANIFEST_PATH)]
    Missing { archive: PathBuf },
    #[error("malformed manifest at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("invalid manifest attribute {name:?}: {reason}")]
    InvalidAttribute { name: String, reason: String },
    #[error("manifest attribute {name:?} not found")]
    MissingAttribute { name: String },
    #[error("failed to read manifest {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
