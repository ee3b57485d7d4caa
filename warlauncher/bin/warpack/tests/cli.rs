// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{path::Path, process::Command};

use anyhow::Result;
use pretty_assertions::assert_eq;
use testutil::{list_dir, read_entry, ArchiveBuilder};

fn warpack() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_warpack"));
    command.env("WARLAUNCHER_LOG_CONSOLE", "0");
    command
}

fn build_war(path: &Path, main_class: Option<&str>) -> Result<()> {
    let attributes: Vec<(&str, &str)> = main_class
        .map(|main_class| vec![("Main-Class", main_class)])
        .unwrap_or_default();
    ArchiveBuilder::new()
        .manifest(&attributes)
        .file("WEB-INF/classes/App.class", "app")
        .file("WEB-INF/lib/dep.jar", "dep")
        .write(path)
}

#[test]
fn repackage_and_show_metadata() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let bootstrap = dir.path().join("warboot");
    std::fs::write(&bootstrap, "launcher")?;
    let build = dir.path().join("target");
    std::fs::create_dir(&build)?;
    build_war(&build.join("shop-1.0.war"), Some("App"))?;

    let status = warpack()
        .arg("repackage")
        .arg("--build-dir")
        .arg(&build)
        .args(["--artifact-id", "shop", "--version", "1.0"])
        .arg("--bootstrap")
        .arg(&bootstrap)
        .args(["--war-file-param-name", "war"])
        .status()?;
    assert!(status.success());

    let war = build.join("shop-1.0.war");
    assert_eq!(list_dir(&build)?, vec!["shop-1.0.war"]);
    assert_eq!(
        read_entry(&war, "META-INF/warboot/warboot")?,
        Some(b"launcher".to_vec())
    );

    let output = warpack().arg("show-metadata").arg(&war).output()?;
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout)?,
        "Manifest-Version: 1.0\n\
         Main-Class: warboot\n\
         entry-point: App\n\
         original-main-class: App\n\
         war-file-param-name: war\n"
    );
    Ok(())
}

#[test]
fn repackage_without_entry_point_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let bootstrap = dir.path().join("warboot");
    std::fs::write(&bootstrap, "launcher")?;
    let war = dir.path().join("app.war");
    build_war(&war, None)?;
    let original = std::fs::read(&war)?;

    let output = warpack()
        .arg("repackage")
        .arg("--war")
        .arg(&war)
        .arg("--bootstrap")
        .arg(&bootstrap)
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("FATAL"), "{stderr}");
    assert!(stderr.contains("no entry point override"), "{stderr}");
    assert_eq!(std::fs::read(&war)?, original);
    Ok(())
}

#[test]
fn update_metadata_then_unpack() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let war = dir.path().join("app.war");
    build_war(&war, Some("App"))?;

    let status = warpack()
        .arg("update-metadata")
        .arg("--archive")
        .arg(&war)
        .args(["entry-point=App", "web-root-param-name=root"])
        .status()?;
    assert!(status.success());

    let out = dir.path().join("out");
    let status = warpack().arg("unpack").arg(&war).arg(&out).status()?;
    assert!(status.success());

    assert_eq!(
        std::fs::read_to_string(out.join("META-INF/MANIFEST.MF"))?,
        "Manifest-Version: 1.0\r\n\
         Main-Class: App\r\n\
         entry-point: App\r\n\
         web-root-param-name: root\r\n\
         \r\n"
    );
    assert_eq!(std::fs::read(out.join("WEB-INF/lib/dep.jar"))?, b"dep");
    Ok(())
}

#[test]
fn conflicting_log_settings_do_not_abort() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let war = dir.path().join("app.war");
    build_war(&war, Some("App"))?;

    let output = warpack()
        .env("WARLAUNCHER_LOG_FILE", dir.path().join("warpack.log"))
        .env("WARLAUNCHER_LOG_DIR", dir.path())
        .env_remove("WARLAUNCHER_LOG_CONSOLE")
        .arg("show-metadata")
        .arg(&war)
        .output()?;

    let stderr = String::from_utf8(output.stderr)?;
    assert!(output.status.success(), "{stderr}");
    assert!(stderr.contains("Ignoring the logging environment"), "{stderr}");
    assert!(!stderr.contains("panicked"), "{stderr}");
    assert_eq!(
        String::from_utf8(output.stdout)?,
        "Manifest-Version: 1.0\nMain-Class: App\n"
    );
    Ok(())
}
