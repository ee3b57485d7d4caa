// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Removal of scratch directories at process exit.
//!
//! A directory entered into the registry is removed exactly once, by
//! whichever happens first:
//!
//! - [`CleanupHandle::run`] or dropping the handle,
//! - normal process exit (via `atexit(3)`),
//! - a termination signal, if [`install_signal_watcher`] was called and no
//!   [`SignalDeferral`] is alive.
//!
//! Removal is best-effort: a file that cannot be deleted is logged and its
//! siblings are still removed.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard, Once,
    },
};

use anyhow::Result;
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};
use tracing::{debug, info, warn};

/// A list of directories to remove.
pub struct CleanupRegistry {
    paths: Mutex<Vec<PathBuf>>,
}

static GLOBAL_REGISTRY: CleanupRegistry = CleanupRegistry::new();

static INSTALL_ATEXIT: Once = Once::new();
static INSTALL_SIGNAL_WATCHER: Once = Once::new();
static SIGNAL_DEFERRALS: AtomicUsize = AtomicUsize::new(0);

impl CleanupRegistry {
    /// Creates an empty registry. Most callers want [`register`] instead.
    pub const fn new() -> Self {
        Self {
            paths: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        // Cleanup also runs while unwinding and at exit; a poisoned list is
        // still usable.
        self.paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enters `path` into the registry and returns a handle that removes it
    /// when run or dropped.
    pub fn register(&'static self, path: PathBuf) -> CleanupHandle {
        self.lock().push(path.clone());
        CleanupHandle {
            registry: self,
            path,
            done: false,
        }
    }

    /// Returns the directories that are still pending removal.
    pub fn pending(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    /// Takes `path` out of the registry. Returns false if it was not there,
    /// i.e. someone else already cleaned it up.
    fn take(&self, path: &Path) -> bool {
        let mut paths = self.lock();
        match paths.iter().position(|p| p == path) {
            Some(index) => {
                paths.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes every registered directory and empties the registry. Calling
    /// it again does nothing until new directories are registered.
    pub fn run_all(&self) {
        let paths = std::mem::take(&mut *self.lock());
        for path in paths {
            remove(&path);
        }
    }
}

fn remove(path: &Path) {
    info!("Removing {}", path.display());
    if let Err(e) = fileutil::remove_dir_all_best_effort(path) {
        warn!("Failed to clean up {}: {:#}", path.display(), e);
    }
}

/// Owns the removal of one registered directory.
pub struct CleanupHandle {
    registry: &'static CleanupRegistry,
    path: PathBuf,
    done: bool,
}

impl CleanupHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the directory now. Subsequent calls, as well as the exit-time
    /// and signal-time runs, are no-ops for this directory.
    pub fn run(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if self.registry.take(&self.path) {
            remove(&self.path);
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.run();
    }
}

extern "C" fn run_global_registry_at_exit() {
    GLOBAL_REGISTRY.run_all();
}

/// Registers `path` in the process-wide registry, which is run at process
/// exit.
pub fn register(path: PathBuf) -> CleanupHandle {
    INSTALL_ATEXIT.call_once(|| {
        // SAFETY: The callback is a plain function that never unwinds.
        if unsafe { libc::atexit(run_global_registry_at_exit) } != 0 {
            warn!("Failed to register the exit-time cleanup");
        }
    });
    GLOBAL_REGISTRY.register(path)
}

/// Removes every directory in the process-wide registry now.
pub fn run_registered() {
    GLOBAL_REGISTRY.run_all();
}

/// Keeps the signal watcher from acting while alive. Hold one while a child
/// process runs the application: the supervisor forwards signals to the
/// child and cleans up after it exits.
pub struct SignalDeferral(());

impl Drop for SignalDeferral {
    fn drop(&mut self) {
        SIGNAL_DEFERRALS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Makes the signal watcher ignore signals until the returned guard is
/// dropped.
pub fn defer_signals() -> SignalDeferral {
    SIGNAL_DEFERRALS.fetch_add(1, Ordering::SeqCst);
    SignalDeferral(())
}

fn signals_deferred() -> bool {
    SIGNAL_DEFERRALS.load(Ordering::SeqCst) > 0
}

/// Starts a thread that, on SIGINT, SIGTERM or SIGHUP, runs the process-wide
/// registry and then exits with status 128 + the signal number. Signals
/// received while a [`SignalDeferral`] is alive are ignored.
pub fn install_signal_watcher() -> Result<()> {
    let mut result = Ok(());
    INSTALL_SIGNAL_WATCHER.call_once(|| {
        result = Signals::new([SIGINT, SIGTERM, SIGHUP])
            .and_then(|mut signals| {
                std::thread::Builder::new()
                    .name("cleanup-signal-watcher".into())
                    .spawn(move || {
                        for signal in signals.forever() {
                            if signals_deferred() {
                                debug!("Signal {} is left to the supervisor", signal);
                                continue;
                            }
                            warn!("Received signal {}; cleaning up", signal);
                            run_registered();
                            std::process::exit(128 + signal);
                        }
                    })
                    .map(|_| ())
            })
            .map_err(anyhow::Error::from);
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn make_dir(root: &Path, name: &str) -> Result<PathBuf> {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("WEB-INF/lib"))?;
        std::fs::write(dir.join("WEB-INF/lib/dep.jar"), "dep")?;
        Ok(dir)
    }

    #[test]
    fn handle_removes_once() -> Result<()> {
        static REGISTRY: CleanupRegistry = CleanupRegistry::new();
        let root = tempfile::tempdir()?;
        let dir = make_dir(root.path(), "a")?;

        let mut handle = REGISTRY.register(dir.clone());
        assert_eq!(REGISTRY.pending(), vec![dir.clone()]);

        handle.run();
        assert!(!dir.try_exists()?);
        assert!(REGISTRY.pending().is_empty());

        // A directory with the same name created afterwards is not touched by
        // later runs.
        let dir = make_dir(root.path(), "a")?;
        handle.run();
        REGISTRY.run_all();
        drop(handle);
        assert!(dir.try_exists()?);
        Ok(())
    }

    #[test]
    fn run_all_removes_everything_once() -> Result<()> {
        static REGISTRY: CleanupRegistry = CleanupRegistry::new();
        let root = tempfile::tempdir()?;
        let a = make_dir(root.path(), "a")?;
        let b = make_dir(root.path(), "b")?;

        let handle_a = REGISTRY.register(a.clone());
        let handle_b = REGISTRY.register(b.clone());

        REGISTRY.run_all();
        assert!(!a.try_exists()?);
        assert!(!b.try_exists()?);

        let a = make_dir(root.path(), "a")?;
        REGISTRY.run_all();
        drop(handle_a);
        drop(handle_b);
        assert!(a.try_exists()?);
        Ok(())
    }

    #[test]
    fn drop_removes_directory() -> Result<()> {
        static REGISTRY: CleanupRegistry = CleanupRegistry::new();
        let root = tempfile::tempdir()?;
        let dir = make_dir(root.path(), "a")?;

        drop(REGISTRY.register(dir.clone()));

        assert!(!dir.try_exists()?);
        assert!(REGISTRY.pending().is_empty());
        Ok(())
    }

    #[test]
    fn missing_directories_are_ignored() -> Result<()> {
        static REGISTRY: CleanupRegistry = CleanupRegistry::new();
        let root = tempfile::tempdir()?;
        let missing = root.path().join("missing");
        let dir = make_dir(root.path(), "a")?;

        let _missing = REGISTRY.register(missing);
        let _dir = REGISTRY.register(dir.clone());
        REGISTRY.run_all();

        assert!(!dir.try_exists()?);
        Ok(())
    }

    #[test]
    fn deferrals_nest() {
        let outer = defer_signals();
        let inner = defer_signals();
        assert!(signals_deferred());
        drop(inner);
        assert!(signals_deferred());
        drop(outer);
    }

    #[test]
    fn global_registry_round_trip() -> Result<()> {
        let root = tempfile::tempdir()?;
        let dir = make_dir(root.path(), "global")?;

        let mut handle = register(dir.clone());
        assert!(GLOBAL_REGISTRY.pending().contains(&dir));
        handle.run();

        assert!(!dir.try_exists()?);
        assert!(!GLOBAL_REGISTRY.pending().contains(&dir));
        Ok(())
    }
}
