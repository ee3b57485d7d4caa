// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::Result;
use nix::sys::signal::Signal;
use signal_hook::{
    consts::signal::{SIGCHLD, SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    os::unix::process::ExitStatusExt,
    process::{Command, ExitStatus},
};
use tracing::instrument;

use crate::cleanup;

// run_supervised runs the entry point as a child process, with some special
// signal handling so that the parent survives until the child exits and can
// remove the scratch directory afterwards:
//   - Forwards SIGTERM and SIGHUP to the child process.
//   - Ignores SIGINT while the child is running. SIGINT is normally generated
//     by the terminal when Ctrl+C is pressed and is delivered to the whole
//     foreground process group, so the child receives it without our help.
//   - Keeps the cleanup signal watcher from acting until the child exits.
#[instrument(skip_all, fields(command = %cmd.get_program().to_string_lossy()))]
pub fn run_supervised(cmd: &mut Command) -> Result<ExitStatus> {
    // Register the signal handler before spawning the process to ensure we don't drop any signals.
    let mut signals = Signals::new([SIGCHLD, SIGINT, SIGTERM, SIGHUP])?;
    let _deferral = cleanup::defer_signals();

    let mut child = cmd.spawn()?;
    let pid = nix::unistd::Pid::from_raw(child.id().try_into()?);

    // The child may have exited before the first SIGCHLD was observed.
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    for signal in signals.forever() {
        match signal {
            SIGCHLD => match child.try_wait()? {
                Some(status) => return Ok(status),
                None => continue,
            },
            SIGINT => {}
            SIGTERM => nix::sys::signal::kill(pid, Signal::SIGTERM)?,
            SIGHUP => nix::sys::signal::kill(pid, Signal::SIGHUP)?,
            _ => unreachable!(),
        }
    }
    unreachable!()
}

/// Converts [`ExitStatus`] to a process exit code following the POSIX shell
/// convention.
///
/// It panics if [`ExitStatus`] does not represent a status of an exiting
/// process (e.g. process being stopped or continued). This won't happen as
/// long as you get [`ExitStatus`] from [`std::process`] methods, such as
/// [`Command::status`] or [`std::process::Child::wait`].
pub fn status_to_exit_code(status: &ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        code as u8
    } else if let Some(signal) = status.signal() {
        128 + signal as u8
    } else {
        panic!("ExitStatus does not represent process exit: {:?}", status);
    }
}
