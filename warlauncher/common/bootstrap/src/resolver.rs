// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    collections::HashMap,
    ffi::OsString,
    io::ErrorKind,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};
use warfile::layout::{CLASSES_DIR, LIB_DIR};

use crate::process::{run_supervised, status_to_exit_code};

/// Environment variable through which [`ExecutableResolver`] passes the
/// code-loading path to the entry point, formatted like `PATH`.
pub const LOAD_PATH_ENV: &str = "WARBOOT_LOAD_PATH";

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("invalid entry point identifier {identifier:?}")]
    InvalidIdentifier { identifier: String },
    #[error("entry point {identifier:?} not found in the code-loading path")]
    NotFound { identifier: String },
    #[error("entry point {identifier:?} at {path:?} is not invocable: {reason}")]
    NotInvocable {
        identifier: String,
        path: PathBuf,
        reason: String,
    },
}

/// The ordered list of locations code is loaded from: the application's
/// classes directory followed by every entry of its library directory,
/// sorted by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadPath {
    classes_dir: PathBuf,
    libraries: Vec<PathBuf>,
}

impl LoadPath {
    /// Builds the load path of an extracted archive rooted at `root`. A
    /// missing library directory contributes no entries.
    pub fn build(root: &Path) -> std::io::Result<Self> {
        let lib_dir = root.join(LIB_DIR);
        let mut libraries = match std::fs::read_dir(&lib_dir) {
            Ok(entries) => entries
                .map(|entry| entry.map(|entry| entry.path()))
                .collect::<std::io::Result<Vec<_>>>()?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        libraries.sort();
        Ok(Self {
            classes_dir: root.join(CLASSES_DIR),
            libraries,
        })
    }

    pub fn classes_dir(&self) -> &Path {
        &self.classes_dir
    }

    pub fn libraries(&self) -> &[PathBuf] {
        &self.libraries
    }

    /// Iterates over every entry, classes directory first.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.classes_dir.as_path())
            .chain(self.libraries.iter().map(PathBuf::as_path))
    }

    /// Formats the load path as a `:`-separated list.
    pub fn to_env_value(&self) -> Result<OsString> {
        std::env::join_paths(self.iter()).context("Load path contains a ':'")
    }
}

/// Something that can be called with the startup parameters.
pub trait Invocable {
    /// Runs the entry point and returns the process exit code.
    fn invoke(&self, args: &[String]) -> Result<u8>;
}

/// Locates an entry point by identifier in a [`LoadPath`].
pub trait EntryPointResolver {
    fn resolve(
        &self,
        load_path: &LoadPath,
        identifier: &str,
    ) -> Result<Box<dyn Invocable>, ResolutionError>;
}

/// An entry point linked into the current program.
pub type EntryPointFn = fn(&[String]) -> Result<()>;

/// Resolves identifiers against a fixed in-process table. The load path is
/// ignored.
#[derive(Clone, Default)]
pub struct RegistryResolver {
    entry_points: HashMap<String, EntryPointFn>,
}

impl RegistryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, identifier: &str, entry_point: EntryPointFn) -> Self {
        self.entry_points.insert(identifier.to_string(), entry_point);
        self
    }
}

struct RegisteredEntryPoint {
    identifier: String,
    entry_point: EntryPointFn,
}

impl Invocable for RegisteredEntryPoint {
    fn invoke(&self, args: &[String]) -> Result<u8> {
        info!("Calling {} in-process", self.identifier);
        (self.entry_point)(args)?;
        Ok(0)
    }
}

impl EntryPointResolver for RegistryResolver {
    fn resolve(
        &self,
        _load_path: &LoadPath,
        identifier: &str,
    ) -> Result<Box<dyn Invocable>, ResolutionError> {
        let entry_point =
            *self
                .entry_points
                .get(identifier)
                .ok_or_else(|| ResolutionError::NotFound {
                    identifier: identifier.to_string(),
                })?;
        Ok(Box::new(RegisteredEntryPoint {
            identifier: identifier.to_string(),
            entry_point,
        }))
    }
}

/// Resolves identifiers to executable files in the extracted archive.
///
/// A dotted identifier `a.b.C` matches the file `a/b/C` under the classes
/// directory or under any library entry that is a directory, and also a
/// library entry whose file name is exactly `a.b.C`. Entries are searched in
/// load path order and the first match wins.
///
/// The match is run as a child process with the load path exported in
/// [`LOAD_PATH_ENV`]. Its exit status becomes the launch's exit code.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecutableResolver;

fn find_candidate(load_path: &LoadPath, identifier: &str) -> Option<PathBuf> {
    let relative_path: PathBuf = identifier.split('.').collect();
    load_path.iter().find_map(|entry| {
        if entry.is_dir() {
            let candidate = entry.join(&relative_path);
            if candidate.exists() {
                return Some(candidate);
            }
        } else if entry.file_name().is_some_and(|name| name == identifier) {
            return Some(entry.to_path_buf());
        }
        None
    })
}

impl EntryPointResolver for ExecutableResolver {
    #[instrument(skip(self, load_path))]
    fn resolve(
        &self,
        load_path: &LoadPath,
        identifier: &str,
    ) -> Result<Box<dyn Invocable>, ResolutionError> {
        if identifier.is_empty()
            || identifier.contains('/')
            || identifier
                .split('.')
                .any(|segment| segment.is_empty() || segment == "..")
        {
            return Err(ResolutionError::InvalidIdentifier {
                identifier: identifier.to_string(),
            });
        }

        let path =
            find_candidate(load_path, identifier).ok_or_else(|| ResolutionError::NotFound {
                identifier: identifier.to_string(),
            })?;
        debug!("Resolved {} to {:?}", identifier, path);

        let not_invocable = |reason: String| ResolutionError::NotInvocable {
            identifier: identifier.to_string(),
            path: path.clone(),
            reason,
        };
        let metadata = std::fs::metadata(&path).map_err(|e| not_invocable(e.to_string()))?;
        if !metadata.is_file() {
            return Err(not_invocable("not a regular file".into()));
        }
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(not_invocable("not executable".into()));
        }

        Ok(Box::new(ExecutableEntryPoint {
            program: path,
            load_path: load_path.clone(),
        }))
    }
}

struct ExecutableEntryPoint {
    program: PathBuf,
    load_path: LoadPath,
}

impl Invocable for ExecutableEntryPoint {
    fn invoke(&self, args: &[String]) -> Result<u8> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .env(LOAD_PATH_ENV, self.load_path.to_env_value()?);
        info!("Running {:?}", command);
        let status = run_supervised(&mut command)
            .with_context(|| format!("Failed to run {:?}", self.program))?;
        if !status.success() {
            info!("{:?} exited with {}", self.program, status);
        }
        Ok(status_to_exit_code(&status))
    }
}
