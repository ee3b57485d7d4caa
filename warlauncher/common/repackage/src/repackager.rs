// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::{info, instrument};
use warfile::{
    layout::BOOTSTRAP_ENTRY_POINT, parent_dir, ArchiveError, Manifest, MetadataError, ENTRY_POINT,
    MAIN_CLASS, ORIGINAL_MAIN_CLASS, WAR_FILE_PARAM_NAME, WEB_ROOT_PARAM_NAME,
};

use crate::{BootstrapPayload, ConfigurationError, RepackageOptions};

/// The last step a repackage run completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepackageStage {
    Start,
    Unpacked,
    MetadataRewritten,
    PayloadInjected,
    OriginalDeleted,
    Repacked,
    ScratchCleaned,
    Done,
}

impl fmt::Display for RepackageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Unpacked => "unpacked",
            Self::MetadataRewritten => "metadata rewritten",
            Self::PayloadInjected => "payload injected",
            Self::OriginalDeleted => "original deleted",
            Self::Repacked => "repacked",
            Self::ScratchCleaned => "scratch cleaned",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepackageErrorKind {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove the scratch directory")]
    Cleanup(#[source] anyhow::Error),
}

/// A failed repackage run. `stage` is the last step that completed; no
/// completed step is rolled back.
#[derive(Debug, thiserror::Error)]
#[error("failed to repackage {archive:?} (last completed stage: {stage})")]
pub struct RepackageError {
    pub archive: PathBuf,
    pub stage: RepackageStage,
    #[source]
    pub kind: RepackageErrorKind,
}

/// What a successful repackage run produced.
#[derive(Clone, Debug)]
pub struct RepackageSummary {
    pub archive: PathBuf,
    pub manifest: Manifest,
}

/// Computes the manifest of a repackaged archive from the source archive's
/// manifest.
///
/// `Main-Class` is pointed at the bootstrap and `entry-point` is set to, in
/// order of precedence: the explicit override, the source `Main-Class`, or
/// (for an archive that was already repackaged) its existing `entry-point`.
/// If none is available the entry point is never guessed.
pub fn rewrite_manifest(
    original: &Manifest,
    options: &RepackageOptions,
) -> Result<Manifest, ConfigurationError> {
    let original_main_class = original
        .main_class()
        .filter(|main_class| *main_class != BOOTSTRAP_ENTRY_POINT);
    let already_repackaged = original.main_class() == Some(BOOTSTRAP_ENTRY_POINT);

    let entry_point = options
        .entry_point
        .as_deref()
        .or(original_main_class)
        .or_else(|| {
            already_repackaged
                .then(|| original.get(ENTRY_POINT))
                .flatten()
        })
        .ok_or(ConfigurationError::NoEntryPoint)?
        .to_string();

    let mut manifest = original.clone();
    manifest.insert(MAIN_CLASS, BOOTSTRAP_ENTRY_POINT)?;
    manifest.insert(ENTRY_POINT, entry_point)?;
    if let Some(main_class) = original_main_class {
        manifest.insert(ORIGINAL_MAIN_CLASS, main_class)?;
    }
    if let Some(name) = &options.web_root_param_name {
        manifest.insert(WEB_ROOT_PARAM_NAME, name.as_str())?;
    }
    if let Some(name) = &options.war_file_param_name {
        manifest.insert(WAR_FILE_PARAM_NAME, name.as_str())?;
    }
    Ok(manifest)
}

fn failed_after<E: Into<RepackageErrorKind>>(
    archive: &Path,
    stage: RepackageStage,
) -> impl FnOnce(E) -> RepackageError + '_ {
    move |kind| RepackageError {
        archive: archive.to_path_buf(),
        stage,
        kind: kind.into(),
    }
}

/// Rewrites WAR files in place so that they launch through `warboot`.
pub struct Repackager {
    options: RepackageOptions,
    payload: BootstrapPayload,
}

impl Repackager {
    pub fn new(options: RepackageOptions, payload: BootstrapPayload) -> Self {
        Self { options, payload }
    }

    /// Repackages `archive` in place. On failure the scratch directory is
    /// removed, but the archive is left as the failing step left it.
    #[instrument(skip(self))]
    pub fn repackage(&self, archive: &Path) -> Result<RepackageSummary, RepackageError> {
        use RepackageStage::*;

        info!("Repackaging {} to be executable", archive.display());

        let parent = parent_dir(archive);
        let scratch = fileutil::ScratchDir::create_in(&parent, ".warpack.")
            .map_err(|source| ArchiveError::Scratch {
                path: parent.clone(),
                source,
            })
            .map_err(failed_after(archive, Start))?;
        let root = scratch.path();

        warfile::extract_all(archive, root).map_err(failed_after(archive, Start))?;

        let original = match Manifest::read_from_dir(root) {
            Ok(manifest) => manifest,
            Err(MetadataError::Missing { .. }) => Manifest::new(),
            Err(e) => return Err(failed_after(archive, Unpacked)(e)),
        };
        let manifest =
            rewrite_manifest(&original, &self.options).map_err(failed_after(archive, Unpacked))?;
        info!(
            "{} = {}",
            ENTRY_POINT,
            manifest.get(ENTRY_POINT).unwrap_or_default()
        );

        self.payload
            .inject(root)
            .map_err(|source| RepackageErrorKind::Io {
                path: root.to_path_buf(),
                source,
            })
            .map_err(failed_after(archive, MetadataRewritten))?;

        std::fs::remove_file(archive)
            .map_err(|source| RepackageErrorKind::Io {
                path: archive.to_path_buf(),
                source,
            })
            .map_err(failed_after(archive, PayloadInjected))?;

        if self.options.self_executable.unwrap_or(false) {
            warfile::pack_executable(archive, root, Some(&manifest), self.payload.executable())
        } else {
            warfile::pack(archive, root, Some(&manifest))
        }
        .map_err(failed_after(archive, OriginalDeleted))?;

        scratch
            .close()
            .map_err(RepackageErrorKind::Cleanup)
            .map_err(failed_after(archive, Repacked))?;

        info!("Repackaged {}", archive.display());
        Ok(RepackageSummary {
            archive: archive.to_path_buf(),
            manifest: manifest.with_defaults(),
        })
    }
}
