// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use tracing::instrument;
use zip::result::ZipError;

use crate::{
    error::{ArchiveError, MetadataError},
    extract::{extract_all, open_archive, prefix_len},
    layout::MANIFEST_PATH,
    pack::{pack_impl, Prefix},
};

pub const MANIFEST_VERSION: &str = "Manifest-Version";
pub const MAIN_CLASS: &str = "Main-Class";
pub const ENTRY_POINT: &str = "entry-point";
pub const WEB_ROOT_PARAM_NAME: &str = "web-root-param-name";
pub const WAR_FILE_PARAM_NAME: &str = "war-file-param-name";
pub const ORIGINAL_MAIN_CLASS: &str = "original-main-class";

pub const DEFAULT_MANIFEST_VERSION: &str = "1.0";
pub const DEFAULT_WEB_ROOT_PARAM: &str = "web.dir";
pub const DEFAULT_WAR_FILE_PARAM: &str = "web.filename";

/// Maximum length of a rendered manifest line in bytes, excluding the line
/// terminator.
const MAX_LINE_LEN: usize = 72;

/// The main section of a JAR-style manifest.
///
/// Attribute names compare case-insensitively. The insertion order of
/// attributes is preserved, except that `Manifest-Version` is always rendered
/// first. Per-entry sections following the main section are kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    attributes: Vec<(String, String)>,
    sections: Vec<String>,
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 70
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Checks that an attribute survives a render/parse round trip.
fn check_attribute(name: &str, value: &str) -> Result<(), MetadataError> {
    let reason = if !is_valid_name(name) {
        "names are 1 to 70 ASCII letters, digits, '-' or '_'"
    } else if value.contains(['\r', '\n', '\0']) {
        "values must not contain line breaks or NUL"
    } else {
        return Ok(());
    };
    Err(MetadataError::InvalidAttribute {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a manifest. Both CRLF and LF line endings are accepted.
    pub fn parse(bytes: &[u8]) -> Result<Self, MetadataError> {
        let text = std::str::from_utf8(bytes).map_err(|e| MetadataError::Malformed {
            line: 1,
            reason: format!("not valid UTF-8: {e}"),
        })?;

        let mut manifest = Manifest::new();
        let mut lines = text.lines().enumerate();
        let mut pending: Option<(String, String)> = None;

        for (index, line) in lines.by_ref() {
            let line_number = index + 1;
            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                match pending.as_mut() {
                    Some((_, value)) => value.push_str(continuation),
                    None => {
                        return Err(MetadataError::Malformed {
                            line: line_number,
                            reason: "continuation line without an attribute".into(),
                        })
                    }
                }
                continue;
            }
            if let Some((name, value)) = pending.take() {
                manifest.set(name, value);
            }
            let (name, value) = line
                .split_once(": ")
                .ok_or_else(|| MetadataError::Malformed {
                    line: line_number,
                    reason: format!("expected \"Name: value\", got {line:?}"),
                })?;
            if !is_valid_name(name) {
                return Err(MetadataError::Malformed {
                    line: line_number,
                    reason: format!("invalid attribute name {name:?}"),
                });
            }
            pending = Some((name.to_string(), value.to_string()));
        }
        if let Some((name, value)) = pending.take() {
            manifest.set(name, value);
        }

        manifest.sections = lines.map(|(_, line)| line.to_string()).collect();
        while manifest.sections.last().is_some_and(|line| line.is_empty()) {
            manifest.sections.pop();
        }

        Ok(manifest)
    }

    /// Renders the manifest with CRLF line endings, wrapping long lines at 72
    /// bytes. `Manifest-Version` is emitted first, defaulting to `1.0`.
    pub fn render(&self) -> Vec<u8> {
        let mut out = String::new();
        let version = self.get(MANIFEST_VERSION).unwrap_or(DEFAULT_MANIFEST_VERSION);
        write_attribute(&mut out, MANIFEST_VERSION, version);
        for (name, value) in &self.attributes {
            if !name.eq_ignore_ascii_case(MANIFEST_VERSION) {
                write_attribute(&mut out, name, value);
            }
        }
        out.push_str("\r\n");
        if !self.sections.is_empty() {
            for line in &self.sections {
                out.push_str(line);
                out.push_str("\r\n");
            }
            out.push_str("\r\n");
        }
        out.into_bytes()
    }

    /// Returns a copy with the attributes every written manifest carries
    /// (currently `Manifest-Version`) filled in.
    pub fn with_defaults(&self) -> Self {
        let mut manifest = self.clone();
        if manifest.get(MANIFEST_VERSION).is_none() {
            manifest
                .attributes
                .insert(0, (MANIFEST_VERSION.into(), DEFAULT_MANIFEST_VERSION.into()));
        }
        manifest
    }

    /// Returns the value of an attribute.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute, replacing any existing value in place.
    ///
    /// Fails without modifying the manifest if the attribute could not be
    /// parsed back once rendered.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Result<(), MetadataError> {
        let value = value.into();
        check_attribute(name, &value)?;
        self.set(name.to_string(), value);
        Ok(())
    }

    fn set(&mut self, name: String, value: String) {
        match self
            .attributes
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Removes an attribute and returns its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let position = self
            .attributes
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.attributes.remove(position).1)
    }

    /// Iterates over attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns a copy of this manifest with `changes` applied on top.
    pub fn with_override<K, V>(
        &self,
        changes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, MetadataError>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut manifest = self.clone();
        for (name, value) in changes {
            manifest.insert(name.as_ref(), value)?;
        }
        Ok(manifest)
    }

    /// The archive's primary entry point, if declared.
    pub fn main_class(&self) -> Option<&str> {
        self.get(MAIN_CLASS)
    }

    /// The identifier the bootstrap resolves and invokes. It is never
    /// guessed: a missing attribute is an error.
    pub fn entry_point(&self) -> Result<&str, MetadataError> {
        self.get(ENTRY_POINT)
            .ok_or_else(|| MetadataError::MissingAttribute {
                name: ENTRY_POINT.to_string(),
            })
    }

    /// Name of the startup parameter receiving the extracted web root.
    pub fn web_root_param_name(&self) -> &str {
        self.get(WEB_ROOT_PARAM_NAME).unwrap_or(DEFAULT_WEB_ROOT_PARAM)
    }

    /// Name of the startup parameter receiving the archive file name.
    pub fn war_file_param_name(&self) -> &str {
        self.get(WAR_FILE_PARAM_NAME).unwrap_or(DEFAULT_WAR_FILE_PARAM)
    }

    /// Reads the manifest of an archive, failing if it has none.
    pub fn read(archive: &Path) -> Result<Self, MetadataError> {
        Self::read_optional(archive)?.ok_or_else(|| MetadataError::Missing {
            archive: archive.to_path_buf(),
        })
    }

    /// Reads the manifest of an archive, returning `None` if it has none.
    #[instrument]
    pub fn read_optional(archive: &Path) -> Result<Option<Self>, MetadataError> {
        let mut reader = open_archive(archive)?;
        let mut entry = match reader.by_name(MANIFEST_PATH) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(source) => {
                return Err(ArchiveError::Open {
                    path: archive.to_path_buf(),
                    source,
                }
                .into())
            }
        };
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(ArchiveError::io(archive))?;
        Self::parse(&bytes).map(Some)
    }

    /// Reads the manifest from an extracted archive tree.
    pub fn read_from_dir(root: &Path) -> Result<Self, MetadataError> {
        let path = root.join(MANIFEST_PATH);
        let bytes = std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                MetadataError::Missing {
                    archive: root.to_path_buf(),
                }
            } else {
                MetadataError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        Self::parse(&bytes)
    }
}

/// Writes `name: value` followed by CRLF, splitting it into continuation
/// lines so that no line exceeds [`MAX_LINE_LEN`] bytes.
fn write_attribute(out: &mut String, name: &str, value: &str) {
    let line = format!("{name}: {value}");
    let mut rest = line.as_str();
    let mut limit = MAX_LINE_LEN;
    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }
        let mut split = limit;
        while !rest.is_char_boundary(split) {
            split -= 1;
        }
        out.push_str(&rest[..split]);
        out.push_str("\r\n ");
        rest = &rest[split..];
        // Continuation lines carry a leading space.
        limit = MAX_LINE_LEN - 1;
    }
}

/// Rewrites the metadata of an existing archive in place, keeping every
/// other entry and any data prepended to the zip stream.
///
/// Invalid attributes are rejected before the archive is touched.
#[instrument(skip(changes))]
pub fn update<K, V>(
    archive: &Path,
    changes: impl IntoIterator<Item = (K, V)>,
) -> Result<Manifest, MetadataError>
where
    K: AsRef<str>,
    V: Into<String>,
{
    let manifest = Manifest::read_optional(archive)?
        .unwrap_or_default()
        .with_override(changes)?;
    let prefix = match prefix_len(archive)? {
        0 => None,
        len => Some(Prefix { path: archive, len }),
    };

    let parent = parent_dir(archive);
    let scratch = fileutil::ScratchDir::create_in(&parent, ".warfile-update.").map_err(|source| ArchiveError::Scratch {
            path: parent.clone(),
            source,
        })?;

    extract_all(archive, scratch.path())?;
    pack_impl(archive, scratch.path(), Some(&manifest), prefix)?;

    Ok(manifest)
}

/// Returns the directory containing `path`, using `.` for bare file names.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use testutil::ArchiveBuilder;

    #[test]
    fn parses_main_section() -> anyhow::Result<()> {
        let manifest = Manifest::parse(
            b"Manifest-Version: 1.0\r\nMain-Class: com.example.App\r\nCreated-By: test\r\n\r\n",
        )?;
        assert_eq!(manifest.get("manifest-version"), Some("1.0"));
        assert_eq!(manifest.main_class(), Some("com.example.App"));
        assert_eq!(manifest.get("Created-By"), Some("test"));
        assert_eq!(manifest.get("entry-point"), None);
        Ok(())
    }

    #[test]
    fn parses_lf_and_continuations() -> anyhow::Result<()> {
        let manifest = Manifest::parse(b"Main-Class: com.example.\n VeryLong\n  App\n")?;
        assert_eq!(manifest.main_class(), Some("com.example.VeryLong App"));
        Ok(())
    }

    #[test]
    fn keeps_per_entry_sections() -> anyhow::Result<()> {
        let input = b"Manifest-Version: 1.0\r\n\r\nName: WEB-INF/lib/dep.jar\r\nSealed: true\r\n\r\n";
        let manifest = Manifest::parse(input)?;
        assert_eq!(manifest.get("Sealed"), None);
        assert_eq!(manifest.render(), input.to_vec());
        Ok(())
    }

    #[test]
    fn rejects_malformed_lines() {
        let err = Manifest::parse(b"Manifest-Version: 1.0\r\nno separator here\r\n").unwrap_err();
        assert!(
            matches!(err, MetadataError::Malformed { line: 2, .. }),
            "{err:?}"
        );

        let err = Manifest::parse(b" leading continuation\r\n").unwrap_err();
        assert!(matches!(err, MetadataError::Malformed { line: 1, .. }), "{err:?}");

        let err = Manifest::parse(b"Bad Name: x\r\n").unwrap_err();
        assert!(matches!(err, MetadataError::Malformed { .. }), "{err:?}");
    }

    #[test]
    fn renders_version_first_and_wraps_long_lines() -> anyhow::Result<()> {
        let mut manifest = Manifest::new();
        manifest.insert(MAIN_CLASS, "App")?;
        let long_value = "x".repeat(150);
        manifest.insert("Long-Attribute", long_value.clone())?;

        let rendered = manifest.render();
        let text = std::str::from_utf8(&rendered)?;
        assert!(text.starts_with("Manifest-Version: 1.0\r\nMain-Class: App\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
        for line in text.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LEN, "line too long: {line:?}");
        }

        let reparsed = Manifest::parse(&rendered)?;
        assert_eq!(reparsed.get("Long-Attribute"), Some(long_value.as_str()));
        assert_eq!(reparsed, manifest.with_defaults());
        Ok(())
    }

    #[test]
    fn wraps_on_char_boundaries() -> anyhow::Result<()> {
        let mut manifest = Manifest::new();
        let value = "é".repeat(60);
        manifest.insert("Description", value.clone())?;
        let reparsed = Manifest::parse(&manifest.render())?;
        assert_eq!(reparsed.get("Description"), Some(value.as_str()));
        Ok(())
    }

    #[test]
    fn insert_replaces_case_insensitively() -> anyhow::Result<()> {
        let mut manifest = Manifest::new();
        manifest.insert("Main-Class", "A")?;
        manifest.insert("main-class", "B")?;
        assert_eq!(manifest.iter().collect::<Vec<_>>(), vec![("Main-Class", "B")]);
        assert_eq!(manifest.remove("MAIN-CLASS"), Some("B".to_string()));
        assert_eq!(manifest.main_class(), None);
        Ok(())
    }

    #[test]
    fn insert_rejects_attributes_that_do_not_parse_back() {
        let mut manifest = Manifest::new();
        for (name, value) in [
            ("Bad Name", "x"),
            ("", "x"),
            ("Main-Class:", "x"),
            (ENTRY_POINT, "App\nEvil: yes"),
            (ENTRY_POINT, "App\r"),
        ] {
            let err = manifest.insert(name, value).unwrap_err();
            assert!(
                matches!(err, MetadataError::InvalidAttribute { .. }),
                "{name:?}={value:?}: {err:?}"
            );
        }
        assert_eq!(manifest, Manifest::new());

        let err = manifest
            .with_override([(ENTRY_POINT, "App"), ("Bad Name", "x")])
            .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidAttribute { .. }), "{err:?}");
    }

    #[test]
    fn parameter_names_fall_back_to_defaults() -> anyhow::Result<()> {
        let manifest = Manifest::new();
        assert_eq!(manifest.web_root_param_name(), "web.dir");
        assert_eq!(manifest.war_file_param_name(), "web.filename");

        let manifest = manifest.with_override([
            (WEB_ROOT_PARAM_NAME, "root"),
            (WAR_FILE_PARAM_NAME, "war"),
        ])?;
        assert_eq!(manifest.web_root_param_name(), "root");
        assert_eq!(manifest.war_file_param_name(), "war");
        Ok(())
    }

    #[test]
    fn missing_entry_point_is_an_error() {
        let err = Manifest::new().entry_point().unwrap_err();
        assert!(matches!(err, MetadataError::MissingAttribute { name } if name == ENTRY_POINT));
    }

    #[test]
    fn reads_manifest_from_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let war = dir.path().join("app.war");
        ArchiveBuilder::new()
            .manifest(&[("Main-Class", "App")])
            .file("WEB-INF/classes/App", "app")
            .write(&war)?;

        let manifest = Manifest::read(&war)?;
        assert_eq!(manifest.main_class(), Some("App"));
        Ok(())
    }

    #[test]
    fn reading_archive_without_manifest() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let war = dir.path().join("app.war");
        ArchiveBuilder::new()
            .file("WEB-INF/classes/App", "app")
            .write(&war)?;

        assert_eq!(Manifest::read_optional(&war)?, None);
        let err = Manifest::read(&war).unwrap_err();
        assert!(matches!(err, MetadataError::Missing { .. }), "{err:?}");
        Ok(())
    }

    #[test]
    fn update_rewrites_manifest_in_place() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let war = dir.path().join("app.war");
        ArchiveBuilder::new()
            .manifest(&[("Main-Class", "App"), ("Created-By", "test")])
            .file("WEB-INF/classes/App", "app")
            .write(&war)?;

        update(&war, [(ENTRY_POINT, "App"), (MAIN_CLASS, "Other")])?;

        let manifest = Manifest::read(&war)?;
        assert_eq!(manifest.main_class(), Some("Other"));
        assert_eq!(manifest.entry_point()?, "App");
        assert_eq!(manifest.get("Created-By"), Some("test"));
        assert_eq!(
            testutil::read_entry(&war, "WEB-INF/classes/App")?,
            Some(b"app".to_vec())
        );
        // Only the archive itself remains next to it.
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn update_with_invalid_attribute_keeps_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let war = dir.path().join("app.war");
        ArchiveBuilder::new()
            .manifest(&[("Main-Class", "App")])
            .file("WEB-INF/classes/App", "app")
            .write(&war)?;
        let original = std::fs::read(&war)?;

        let err = update(&war, [("Bad Name", "x")]).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidAttribute { .. }), "{err:?}");
        let err = update(&war, [(ENTRY_POINT, "App\nEvil")]).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidAttribute { .. }), "{err:?}");

        assert_eq!(std::fs::read(&war)?, original);
        assert_eq!(Manifest::read(&war)?.main_class(), Some("App"));
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn update_keeps_launcher_of_executable_archive() -> anyhow::Result<()> {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir()?;
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("WEB-INF/classes"))?;
        std::fs::write(tree.join("WEB-INF/classes/App"), "app")?;
        let launcher = dir.path().join("launcher");
        std::fs::write(&launcher, "#!/bin/sh\nexit 0\n")?;
        let war = dir.path().join("app.war");
        crate::pack::pack_executable(&war, &tree, None, &launcher)?;
        assert_eq!(prefix_len(&war)?, std::fs::metadata(&launcher)?.len());

        update(&war, [(ENTRY_POINT, "App")])?;

        assert!(std::fs::read(&war)?.starts_with(b"#!/bin/sh\nexit 0\n"));
        assert_eq!(std::fs::metadata(&war)?.mode() & 0o777, 0o755);
        assert_eq!(Manifest::read(&war)?.entry_point()?, "App");
        assert_eq!(
            testutil::read_entry(&war, "WEB-INF/classes/App")?,
            Some(b"app".to_vec())
        );
        Ok(())
    }
}
