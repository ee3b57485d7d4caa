// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use tracing::{info_span, warn};

use crate::remove_dir_all_best_effort;

lazy_static! {
    /// `warlauncher.<program>.`
    static ref PROGRAM_PREFIX: OsString = {
        let exe = std::env::current_exe().unwrap_or_default();
        let name = exe
            .file_name()
            .unwrap_or(OsStr::new("__unknown__"))
            .to_string_lossy();
        format!("warlauncher.{}.", name).into()
    };
}

/// A uniquely named scratch directory owned by a single operation.
///
/// The directory is removed when the value is dropped unless
/// [`ScratchDir::into_path`] released it.
pub struct ScratchDir {
    dir: Option<PathBuf>,
}

impl ScratchDir {
    /// Creates a scratch directory under the system temporary directory.
    pub fn new() -> Result<Self> {
        Self::create_in(&std::env::temp_dir(), &*PROGRAM_PREFIX)
    }

    /// Creates a scratch directory under `parent` whose name starts with
    /// `prefix`.
    pub fn create_in(parent: &Path, prefix: impl AsRef<OsStr>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix.as_ref())
            .tempdir_in(parent)
            .with_context(|| {
                format!("Failed to create a scratch directory in {:?}", parent)
            })?;
        Ok(Self {
            dir: Some(dir.into_path()),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.as_deref().unwrap_or(Path::new(""))
    }

    /// Gives up ownership. The caller becomes responsible for removal.
    pub fn into_path(mut self) -> PathBuf {
        self.dir.take().unwrap_or_default()
    }

    /// Removes the directory now, reporting failures instead of logging them.
    pub fn close(mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => remove_dir_all_best_effort(&dir),
            None => Ok(()),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = &self.dir {
            let _span = info_span!("ScratchDir::drop", dir = ?dir).entered();
            if let Err(e) = remove_dir_all_best_effort(dir) {
                warn!("Failed to remove scratch directory: {:#}", e);
            }
        }
    }
}
