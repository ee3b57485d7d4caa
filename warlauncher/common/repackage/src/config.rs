// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use warfile::MetadataError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Main-Class not present in the manifest and no entry point override is set")]
    NoEntryPoint,
    #[error("failed to read configuration file {path:?}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("bootstrap payload {path:?} is not a regular file")]
    MissingPayload { path: PathBuf },
    #[error("option cannot be stored in the manifest")]
    InvalidAttribute(#[from] MetadataError),
}

/// Settings of a repackage run. They can be stored in a JSON file, e.g.:
///
/// ```json
/// {
///   "entry-point": "com.example.App",
///   "web-root-param-name": "root",
///   "self-executable": true
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RepackageOptions {
    /// The identifier `warboot` invokes. If unset, the source archive's
    /// `Main-Class` is used.
    pub entry_point: Option<String>,

    /// Overrides the name of the startup parameter receiving the extracted
    /// web root.
    pub web_root_param_name: Option<String>,

    /// Overrides the name of the startup parameter receiving the archive
    /// file name.
    pub war_file_param_name: Option<String>,

    /// The `warboot` executable to embed.
    pub bootstrap: Option<PathBuf>,

    /// Prepends the bootstrap to the archive so that it can be run directly.
    /// Unset means no.
    pub self_executable: Option<bool>,
}

impl RepackageOptions {
    pub fn deserialize_from(path: &Path) -> Result<Self, ConfigurationError> {
        let read = || -> Result<Self> {
            Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
        };
        read().map_err(|source| ConfigurationError::Unreadable {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn serialize_to(&self, path: &Path) -> Result<()> {
        serde_json::to_writer_pretty(File::create(path)?, self)?;
        Ok(())
    }

    /// Returns these options with every value set in `overrides` replacing
    /// the current one.
    pub fn merge(self, overrides: RepackageOptions) -> Self {
        Self {
            entry_point: overrides.entry_point.or(self.entry_point),
            web_root_param_name: overrides.web_root_param_name.or(self.web_root_param_name),
            war_file_param_name: overrides.war_file_param_name.or(self.war_file_param_name),
            bootstrap: overrides.bootstrap.or(self.bootstrap),
            self_executable: overrides.self_executable.or(self.self_executable),
        }
    }
}

/// Returns the path of the WAR file a build produces: `<build_dir>/<artifact_id>-<version>.war`.
pub fn build_output_path(build_dir: &Path, artifact_id: &str, version: &str) -> PathBuf {
    build_dir.join(format!("{artifact_id}-{version}.war"))
}
