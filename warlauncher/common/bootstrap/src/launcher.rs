// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use path_absolutize::Absolutize;
use tracing::{info, instrument, warn};
use warfile::{layout::is_bootstrap_entry, ArchiveError, Manifest, MetadataError};

use crate::{
    cleanup::{self, CleanupHandle},
    resolver::{EntryPointResolver, LoadPath, ResolutionError},
};

/// The last step a launch completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchStage {
    Start,
    ScratchCreated,
    Extracted,
    CleanupRegistered,
    MetadataResolved,
    PathBuilt,
    Invoked,
}

impl fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::ScratchCreated => "scratch directory created",
            Self::Extracted => "archive extracted",
            Self::CleanupRegistered => "cleanup registered",
            Self::MetadataResolved => "metadata resolved",
            Self::PathBuilt => "load path built",
            Self::Invoked => "entry point invoked",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to create a scratch directory")]
    Scratch(#[source] anyhow::Error),
    #[error("failed to extract the archive")]
    Extract(#[source] ArchiveError),
    #[error("failed to read the archive metadata")]
    Metadata(#[source] MetadataError),
    #[error("failed to build the code-loading path from {path:?}")]
    LoadPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve the entry point")]
    Resolution(#[source] ResolutionError),
    #[error("entry point {identifier:?} failed")]
    Invocation {
        identifier: String,
        #[source]
        source: anyhow::Error,
    },
}

impl LaunchError {
    /// Returns the last stage that completed before the failure.
    pub fn stage(&self) -> LaunchStage {
        match self {
            Self::Scratch(_) => LaunchStage::Start,
            Self::Extract(_) => LaunchStage::ScratchCreated,
            Self::Metadata(_) => LaunchStage::CleanupRegistered,
            Self::LoadPath { .. } => LaunchStage::MetadataResolved,
            Self::Resolution(_) => LaunchStage::PathBuilt,
            Self::Invocation { .. } => LaunchStage::Invoked,
        }
    }
}

/// Returns the scratch directory prefix for `archive`: its file name up to
/// the first `.`, followed by a `.`.
fn scratch_prefix(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split('.').next() {
        Some(base) if !base.is_empty() => format!("{base}."),
        _ => "warboot.".to_string(),
    }
}

/// Runs a repackaged archive.
pub struct Launcher {
    archive: PathBuf,
    temp_base: PathBuf,
}

impl Launcher {
    pub fn new(archive: &Path) -> Self {
        Self {
            archive: archive.to_path_buf(),
            temp_base: std::env::temp_dir(),
        }
    }

    /// Sets the directory the scratch directory is created in. Defaults to
    /// the platform temporary directory.
    pub fn temp_base(self, dir: &Path) -> Self {
        Self {
            temp_base: dir.to_path_buf(),
            ..self
        }
    }

    /// Extracts the archive and resolves everything needed to invoke its
    /// entry point. The scratch directory is removed when the returned value
    /// is dropped, at process exit, or right away if preparation fails.
    #[instrument(skip_all, fields(archive = ?self.archive))]
    pub fn prepare(&self) -> Result<PreparedLaunch, LaunchError> {
        let temp_base = self
            .temp_base
            .absolutize()
            .map_err(|e| LaunchError::Scratch(e.into()))?;
        let prefix = scratch_prefix(&self.archive);
        let scratch = fileutil::ScratchDir::create_in(&temp_base, &prefix).map_err(LaunchError::Scratch)?;
        info!("Extracting into {}", scratch.path().display());

        // Until it is registered, the scratch directory is removed when
        // `scratch` goes out of scope.
        warfile::extract(&self.archive, scratch.path(), is_bootstrap_entry)
            .map_err(LaunchError::Extract)?;

        let cleanup = cleanup::register(scratch.into_path());
        if let Err(e) = cleanup::install_signal_watcher() {
            warn!("Scratch directory won't be removed on signals: {:#}", e);
        }
        let root = cleanup.path();

        let manifest = Manifest::read_from_dir(root).map_err(LaunchError::Metadata)?;
        let entry_point = manifest
            .entry_point()
            .map_err(LaunchError::Metadata)?
            .to_string();

        let load_path = LoadPath::build(root).map_err(|source| LaunchError::LoadPath {
            path: root.to_path_buf(),
            source,
        })?;

        let archive_name = self
            .archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(PreparedLaunch {
            arguments: vec![
                format!("--{}={}", manifest.web_root_param_name(), root.display()),
                format!("--{}={}", manifest.war_file_param_name(), archive_name),
            ],
            cleanup,
            entry_point,
            load_path,
        })
    }

    /// Prepares and invokes the archive's entry point, then removes the
    /// scratch directory. Returns the entry point's exit code.
    pub fn launch(&self, resolver: &dyn EntryPointResolver) -> Result<u8, LaunchError> {
        self.prepare()?.invoke(resolver)
    }
}

/// An extracted archive ready to be invoked.
pub struct PreparedLaunch {
    cleanup: CleanupHandle,
    entry_point: String,
    load_path: LoadPath,
    arguments: Vec<String>,
}

impl PreparedLaunch {
    pub fn scratch_dir(&self) -> &Path {
        self.cleanup.path()
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn load_path(&self) -> &LoadPath {
        &self.load_path
    }

    /// The startup parameters passed to the entry point.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Resolves and calls the entry point, then removes the scratch
    /// directory regardless of the outcome.
    #[instrument(skip_all, fields(entry_point = %self.entry_point))]
    pub fn invoke(mut self, resolver: &dyn EntryPointResolver) -> Result<u8, LaunchError> {
        let result = self.resolve_and_call(resolver);
        self.cleanup.run();
        result
    }

    fn resolve_and_call(&self, resolver: &dyn EntryPointResolver) -> Result<u8, LaunchError> {
        let invocable = resolver
            .resolve(&self.load_path, &self.entry_point)
            .map_err(LaunchError::Resolution)?;
        invocable
            .invoke(&self.arguments)
            .map_err(|source| LaunchError::Invocation {
                identifier: self.entry_point.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use testutil::{list_dir, ArchiveBuilder};

    use crate::resolver::RegistryResolver;

    fn sample_archive(path: &Path, attributes: &[(&str, &str)]) -> Result<()> {
        ArchiveBuilder::new()
            .manifest(attributes)
            .file("WEB-INF/classes/com/example/App", "app")
            .file("WEB-INF/lib/b.jar", "b")
            .file("WEB-INF/lib/a.jar", "a")
            .executable("META-INF/warboot/warboot", "launcher")
            .file("index.html", "<html></html>")
            .write(path)
    }

    #[test]
    fn scratch_prefix_uses_base_name() {
        assert_eq!(scratch_prefix(Path::new("/a/app.war")), "app.");
        assert_eq!(scratch_prefix(Path::new("my.app.war")), "my.");
        assert_eq!(scratch_prefix(Path::new("app")), "app.");
        assert_eq!(scratch_prefix(Path::new(".war")), "warboot.");
    }

    #[test]
    fn prepare_extracts_and_builds_arguments() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let war = dir.path().join("app.war");
        sample_archive(
            &war,
            &[
                ("Main-Class", "warboot"),
                ("entry-point", "com.example.App"),
                ("web-root-param-name", "root"),
            ],
        )?;
        let temp = dir.path().join("tmp");
        std::fs::create_dir(&temp)?;

        let prepared = Launcher::new(&war).temp_base(&temp).prepare()?;
        let scratch = prepared.scratch_dir().to_path_buf();

        assert!(scratch.is_absolute());
        assert!(scratch
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("app."));
        assert_eq!(prepared.entry_point(), "com.example.App");
        assert_eq!(
            prepared.arguments(),
            &[
                format!("--root={}", scratch.display()),
                "--web.filename=app.war".to_string(),
            ]
        );
        assert_eq!(
            prepared.load_path().libraries(),
            &[scratch.join("WEB-INF/lib/a.jar"), scratch.join("WEB-INF/lib/b.jar")]
        );
        assert!(scratch.join("index.html").exists());
        assert!(!scratch.join("META-INF/warboot").exists());

        drop(prepared);
        assert!(!scratch.try_exists()?);
        Ok(())
    }

    #[test]
    fn missing_entry_point_is_a_metadata_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let war = dir.path().join("app.war");
        sample_archive(&war, &[("Main-Class", "warboot")])?;
        let temp = dir.path().join("tmp");
        std::fs::create_dir(&temp)?;

        let err = Launcher::new(&war)
            .temp_base(&temp)
            .launch(&RegistryResolver::new())
            .unwrap_err();

        assert!(
            matches!(
                err,
                LaunchError::Metadata(MetadataError::MissingAttribute { .. })
            ),
            "{err:?}"
        );
        assert_eq!(err.stage(), LaunchStage::CleanupRegistered);
        assert!(list_dir(&temp)?.is_empty());
        Ok(())
    }

    #[test]
    fn extraction_failure_removes_scratch_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let war = dir.path().join("app.war");
        std::fs::write(&war, "not a zip")?;
        let temp = dir.path().join("tmp");
        std::fs::create_dir(&temp)?;

        let err = Launcher::new(&war)
            .temp_base(&temp)
            .launch(&RegistryResolver::new())
            .unwrap_err();

        assert!(matches!(err, LaunchError::Extract(_)), "{err:?}");
        assert_eq!(err.stage(), LaunchStage::ScratchCreated);
        assert!(list_dir(&temp)?.is_empty());
        Ok(())
    }

    #[test]
    fn unresolvable_entry_point_still_cleans_up() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let war = dir.path().join("app.war");
        sample_archive(&war, &[("entry-point", "com.example.Missing")])?;
        let temp = dir.path().join("tmp");
        std::fs::create_dir(&temp)?;

        let err = Launcher::new(&war)
            .temp_base(&temp)
            .launch(&RegistryResolver::new())
            .unwrap_err();

        assert!(matches!(err, LaunchError::Resolution(_)), "{err:?}");
        assert_eq!(err.stage(), LaunchStage::PathBuilt);
        assert!(list_dir(&temp)?.is_empty());
        Ok(())
    }

    fn failing_app(_args: &[String]) -> Result<()> {
        anyhow::bail!("boom")
    }

    #[test]
    fn failing_entry_point_still_cleans_up() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let war = dir.path().join("app.war");
        sample_archive(&war, &[("entry-point", "com.example.App")])?;
        let temp = dir.path().join("tmp");
        std::fs::create_dir(&temp)?;

        let err = Launcher::new(&war)
            .temp_base(&temp)
            .launch(&RegistryResolver::new().register("com.example.App", failing_app))
            .unwrap_err();

        assert!(matches!(err, LaunchError::Invocation { .. }), "{err:?}");
        assert_eq!(err.stage(), LaunchStage::Invoked);
        assert!(list_dir(&temp)?.is_empty());
        Ok(())
    }
}
