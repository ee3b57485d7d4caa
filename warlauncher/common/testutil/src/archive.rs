// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use zip::{result::ZipError, write::SimpleFileOptions, ZipArchive, ZipWriter};

enum Entry {
    Dir(String),
    File {
        name: String,
        contents: Vec<u8>,
        mode: u32,
    },
}

/// Builds small zip archives for tests.
///
/// Entry names are written verbatim, so tests can also produce archives a
/// well-behaved packer never would (e.g. names containing `..`).
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<Entry>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `META-INF/MANIFEST.MF` with the given main attributes.
    pub fn manifest(self, attributes: &[(&str, &str)]) -> Self {
        let mut text = String::from("Manifest-Version: 1.0\r\n");
        for (name, value) in attributes {
            text.push_str(&format!("{name}: {value}\r\n"));
        }
        text.push_str("\r\n");
        self.file("META-INF/MANIFEST.MF", text)
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(Entry::Dir(name.to_string()));
        self
    }

    pub fn file(mut self, name: &str, contents: impl AsRef<[u8]>) -> Self {
        self.entries.push(Entry::File {
            name: name.to_string(),
            contents: contents.as_ref().to_vec(),
            mode: 0o644,
        });
        self
    }

    pub fn executable(mut self, name: &str, contents: impl AsRef<[u8]>) -> Self {
        self.entries.push(Entry::File {
            name: name.to_string(),
            contents: contents.as_ref().to_vec(),
            mode: 0o755,
        });
        self
    }

    pub fn write(self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create {path:?}"))?;
        let mut writer = ZipWriter::new(file);
        for entry in self.entries {
            match entry {
                Entry::Dir(name) => {
                    writer.add_directory(name, SimpleFileOptions::default())?;
                }
                Entry::File {
                    name,
                    contents,
                    mode,
                } => {
                    writer.start_file(
                        name,
                        SimpleFileOptions::default().unix_permissions(mode),
                    )?;
                    writer.write_all(&contents)?;
                }
            }
        }
        writer.finish()?;
        Ok(())
    }
}

/// Lists the entry names of an archive in the order they are stored.
pub fn list_entries(archive: &Path) -> Result<Vec<String>> {
    let mut reader = ZipArchive::new(File::open(archive)?)?;
    (0..reader.len())
        .map(|index| Ok(reader.by_index_raw(index)?.name().to_string()))
        .collect()
}

/// Reads a single archive entry, returning `None` if it doesn't exist.
pub fn read_entry(archive: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut reader = ZipArchive::new(File::open(archive)?)?;
    let mut entry = match reader.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;
    Ok(Some(contents))
}
