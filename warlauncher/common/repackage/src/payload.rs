// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    fs::Permissions,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use tracing::debug;
use warfile::layout::{BOOTSTRAP_DIR, BOOTSTRAP_ENTRY_POINT};

use crate::ConfigurationError;

/// The `warboot` executable embedded into repackaged archives.
#[derive(Clone, Debug)]
pub struct BootstrapPayload {
    executable: PathBuf,
}

impl BootstrapPayload {
    pub fn from_executable(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.is_file() {
            return Err(ConfigurationError::MissingPayload {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            executable: path.to_path_buf(),
        })
    }

    /// Uses the `warboot` executable installed next to the running program.
    pub fn locate_default() -> Result<Self, ConfigurationError> {
        let current_exe = std::env::current_exe().unwrap_or_default();
        let path = current_exe
            .parent()
            .unwrap_or(Path::new("."))
            .join(BOOTSTRAP_ENTRY_POINT);
        Self::from_executable(&path)
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Copies the payload into the reserved directory of an extracted archive
    /// tree rooted at `root`, replacing any previous copy. Returns the path
    /// of the copy.
    pub fn inject(&self, root: &Path) -> std::io::Result<PathBuf> {
        let dir = root.join(BOOTSTRAP_DIR);
        std::fs::create_dir_all(&dir)?;
        let destination = dir.join(BOOTSTRAP_ENTRY_POINT);
        debug!("Copying {:?} to {:?}", self.executable, destination);
        std::fs::copy(&self.executable, &destination)?;
        std::fs::set_permissions(&destination, Permissions::from_mode(0o755))?;
        Ok(destination)
    }
}
